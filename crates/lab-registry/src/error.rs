use crate::{Channel, CodecError, Operation};
use lab_transport::TransportError;
use thiserror::Error;

pub type Result<T, E = RegistryError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate resource path: {0}")]
    DuplicatePath(String),
    #[error("unknown device: {0}")]
    UnknownDevice(String),
    #[error("unknown resource path: {0}")]
    UnknownPath(String),
    #[error("{path} does not support {op}")]
    OperationNotSupported { path: String, op: Operation },
    #[error("{path} names unknown codec {codec:?}")]
    UnknownCodec { path: String, codec: String },
    #[error("telemetry field {field:?} feeds both {first} and {second}")]
    DuplicateField {
        field: String,
        first: String,
        second: String,
    },
    #[error("telemetry resource {0} needs both a field and a codec")]
    IncompleteTelemetryRoute(String),
    #[error("no {0} channel configured")]
    NoChannel(Channel),
    #[error("{path} expects a number, got {value:?}")]
    NotNumeric { path: String, value: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

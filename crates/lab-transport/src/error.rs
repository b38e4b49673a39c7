use thiserror::Error;

pub type Result<T, E = TransportError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("timeout")]
    Timeout,
    #[error("malformed reply: {0}")]
    MalformedReply(String),
    #[error("device replied with status {0}")]
    Status(u16),
    #[error("telemetry link closed")]
    Disconnected,
    #[error("resource not routed on this channel: {0}")]
    UnsupportedResource(String),
    #[error("cannot decode wire value: {0}")]
    Decode(String),
    #[error("telemetry field {field:?} already routed to {path}")]
    FieldInUse { field: String, path: String },
}

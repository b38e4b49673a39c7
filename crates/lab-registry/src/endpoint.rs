use crate::codec::ValueCodec;
use crate::{Operation, PostOutcome, RegistryError, Resource, Result, Value};
use lab_transport::{SyncResourcer, TelemetryResourcer};
use prometheus::IntCounter;
use std::sync::Arc;
use tracing::trace;

#[derive(Clone)]
pub(crate) enum Binding {
    Command {
        resourcer: Arc<SyncResourcer>,
        requests: Option<IntCounter>,
    },
    Telemetry {
        resourcer: Arc<TelemetryResourcer>,
        codec: Arc<dyn ValueCodec>,
    },
}

/// Runtime handle for one resource, bound to the resourcer of its channel.
#[derive(Clone)]
pub struct Endpoint {
    resource: Resource,
    binding: Binding,
}

impl Endpoint {
    pub(crate) fn new(resource: Resource, binding: Binding) -> Self {
        Self { resource, binding }
    }

    pub fn path(&self) -> &str {
        &self.resource.path
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn description(&self) -> &str {
        &self.resource.description
    }

    /// The resource's documentation, for interactive use.
    pub fn help(&self) -> &str {
        self.description()
    }

    pub fn supports(&self, op: Operation) -> bool {
        self.resource.supports(op)
    }

    fn require(&self, op: Operation) -> Result<()> {
        if self.supports(op) {
            Ok(())
        } else {
            Err(RegistryError::OperationNotSupported {
                path: self.resource.path.clone(),
                op,
            })
        }
    }

    /// Current value. Telemetry endpoints return [`Value::Absent`] until the
    /// first sample arrives.
    pub fn get(&self) -> Result<Value> {
        self.require(Operation::Read)?;
        let path = self.resource.path.as_str();
        match &self.binding {
            Binding::Command {
                resourcer,
                requests,
            } => {
                if let Some(c) = requests {
                    c.inc();
                }
                Ok(Value::Text(resourcer.get(path)?))
            }
            Binding::Telemetry { resourcer, codec } => match resourcer.get(path)? {
                None => Ok(Value::Absent),
                Some(raw) => {
                    let v = codec.decode(raw)?;
                    trace!(path, raw, value = v, "telemetry sample");
                    Ok(Value::Number(v))
                }
            },
        }
    }

    pub fn post(&self, value: impl Into<Value>) -> Result<PostOutcome> {
        self.require(Operation::Write)?;
        let value = value.into();
        let path = self.resource.path.as_str();
        match &self.binding {
            Binding::Command {
                resourcer,
                requests,
            } => {
                if let Some(c) = requests {
                    c.inc();
                }
                Ok(PostOutcome::Status(resourcer.post(path, &value)?))
            }
            Binding::Telemetry { resourcer, codec } => {
                let v = value.as_f64().ok_or_else(|| RegistryError::NotNumeric {
                    path: path.to_string(),
                    value: value.to_string(),
                })?;
                resourcer.post(path, codec.encode(v)?)?;
                Ok(PostOutcome::Queued)
            }
        }
    }

    /// Whether a telemetry sample arrived since the last `get` on this
    /// endpoint's stream. Always false for command endpoints.
    pub fn has_new_message(&self) -> bool {
        match &self.binding {
            Binding::Telemetry { resourcer, .. } => resourcer.has_new_message(),
            Binding::Command { .. } => false,
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("path", &self.resource.path)
            .field("channel", &self.resource.channel)
            .field("operations", &self.resource.operations)
            .finish()
    }
}

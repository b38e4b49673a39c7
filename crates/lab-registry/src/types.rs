use core::fmt;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Write,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read => f.write_str("read"),
            Operation::Write => f.write_str("write"),
        }
    }
}

/// Which device channel serves a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Synchronous request/response (the device's HTTP server).
    #[default]
    Command,
    /// Pushed stream (the device's websocket).
    Telemetry,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Command => f.write_str("command"),
            Channel::Telemetry => f.write_str("telemetry"),
        }
    }
}

/// Static description of one addressable piece of device state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub path: String,
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub channel: Channel,
    /// Record key on the telemetry stream, e.g. `angle`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Codec name for telemetry values, e.g. `angle` or `duty`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
}

impl Resource {
    pub fn command(path: &str, operations: &[Operation], description: &str) -> Self {
        Self {
            path: path.to_string(),
            operations: operations.to_vec(),
            description: description.to_string(),
            channel: Channel::Command,
            field: None,
            codec: None,
        }
    }

    pub fn telemetry(
        path: &str,
        operations: &[Operation],
        field: &str,
        codec: &str,
        description: &str,
    ) -> Self {
        Self {
            path: path.to_string(),
            operations: operations.to_vec(),
            description: description.to_string(),
            channel: Channel::Telemetry,
            field: Some(field.to_string()),
            codec: Some(codec.to_string()),
        }
    }

    pub fn supports(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        segments(&self.path)
    }
}

pub(crate) fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// `a//b/` and `/a/b` both become `/a/b`.
pub(crate) fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for seg in segments(path) {
        out.push('/');
        out.push_str(seg);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Every resource one device type exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalogue {
    pub device: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// A domain value read from or written to an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Number(f64),
    /// No telemetry sample has arrived yet.
    Absent,
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(t) => t.trim().parse().ok(),
            Value::Absent => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(t) => f.write_str(t),
            Value::Number(n) => write!(f, "{n}"),
            Value::Absent => f.write_str("-"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Result of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// The command channel replied with this status.
    Status(u16),
    /// Queued on the telemetry stream; delivery is not confirmed.
    Queued,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_paths() {
        assert_eq!(normalize("/a/b"), "/a/b");
        assert_eq!(normalize("a//b/"), "/a/b");
        assert_eq!(normalize(""), "/");
    }

    #[test]
    fn test_resource_operations() {
        let r = Resource::command("/test/parent_resource", &[Operation::Read], "parent");
        assert!(r.supports(Operation::Read));
        assert!(!r.supports(Operation::Write));
        assert_eq!(r.segments().collect::<Vec<_>>(), vec!["test", "parent_resource"]);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(10).to_string(), "10");
        assert_eq!(Value::from(12.5).to_string(), "12.5");
        assert_eq!(Value::from("LOG_INFO").as_text(), Some("LOG_INFO"));
        assert_eq!(Value::from(" 50 ").as_f64(), Some(50.0));
        assert_eq!(Value::Absent.as_f64(), None);
        assert!(Value::Absent.is_absent());
    }

    #[test]
    fn test_resource_yaml_shape() {
        let yaml = r#"
path: /sensors/encoder/angle
operations: [read]
channel: telemetry
field: angle
codec: angle
description: Pendulum angle in degrees.
"#;
        let r: Resource = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(r.channel, Channel::Telemetry);
        assert_eq!(r.field.as_deref(), Some("angle"));
        assert!(r.supports(Operation::Read));
    }
}

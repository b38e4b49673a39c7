use crate::{RegistryError, Result};
use lab_transport::{ReconnectPolicy, TelemetryConfig, STREAM_PATH};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reconnect {
    #[default]
    OnDemand,
    Never,
}

/// Where a device lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    pub address: String,
    pub http_port: u16,
    pub ws_port: u16,
    pub stream_path: String,
    /// Per-channel timeout in seconds.
    pub timeout_s: f64,
    /// Bound on how long a telemetry write may wait for the stream; defaults
    /// to `timeout_s`.
    pub send_timeout_s: Option<f64>,
    pub reconnect: Reconnect,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            http_port: 80,
            ws_port: 80,
            stream_path: STREAM_PATH.to_string(),
            timeout_s: 5.0,
            send_timeout_s: None,
            reconnect: Reconnect::OnDemand,
        }
    }
}

fn seconds(name: &str, s: f64) -> Result<Duration> {
    if s <= 0.0 {
        return Err(RegistryError::InvalidConfig(format!(
            "{name} must be positive, got {s}"
        )));
    }
    Duration::try_from_secs_f64(s)
        .map_err(|e| RegistryError::InvalidConfig(format!("{name}: {e}")))
}

impl LabConfig {
    pub fn timeout(&self) -> Result<Duration> {
        seconds("timeout_s", self.timeout_s)
    }

    pub fn telemetry_config(&self) -> Result<TelemetryConfig> {
        let timeout = self.timeout()?;
        let send_timeout = match self.send_timeout_s {
            Some(s) => seconds("send_timeout_s", s)?,
            None => timeout,
        };
        Ok(TelemetryConfig {
            recv_timeout: timeout,
            send_timeout,
            connect_timeout: timeout,
            reconnect: match self.reconnect {
                Reconnect::OnDemand => ReconnectPolicy::OnDemand,
                Reconnect::Never => ReconnectPolicy::Never,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let cfg: LabConfig = serde_yaml::from_str("address: 10.0.0.7\ntimeout_s: 0.5\n").unwrap();
        assert_eq!(cfg.address, "10.0.0.7");
        assert_eq!(cfg.http_port, 80);
        assert_eq!(cfg.stream_path, "/stream");
        assert_eq!(cfg.timeout().unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_send_timeout_defaults_to_timeout() {
        let cfg = LabConfig {
            timeout_s: 2.0,
            ..Default::default()
        };
        let t = cfg.telemetry_config().unwrap();
        assert_eq!(t.send_timeout, Duration::from_secs(2));
        assert_eq!(t.reconnect, ReconnectPolicy::OnDemand);

        let cfg = LabConfig {
            send_timeout_s: Some(0.25),
            reconnect: Reconnect::Never,
            ..cfg
        };
        let t = cfg.telemetry_config().unwrap();
        assert_eq!(t.send_timeout, Duration::from_millis(250));
        assert_eq!(t.reconnect, ReconnectPolicy::Never);
    }

    #[test]
    fn test_rejects_bad_timeouts() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let cfg = LabConfig {
                timeout_s: bad,
                ..Default::default()
            };
            assert!(cfg.timeout().is_err(), "{bad} accepted");
        }
    }
}

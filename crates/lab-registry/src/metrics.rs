use lab_transport::TelemetryStats;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct LabMetrics {
    pub command_requests: IntCounter,
    pub telemetry_connects: IntGauge,
    pub telemetry_received: IntGauge,
    pub telemetry_sent: IntGauge,
    pub telemetry_dropped: IntGauge,
    pub ticks: IntCounter,
    pub tick_overruns: IntCounter,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub lab: LabMetrics,
}

fn counter(name: &str, help: &str) -> Result<IntCounter, String> {
    IntCounter::new(name, help).map_err(|e| format!("metrics init error: {e}"))
}

fn gauge(name: &str, help: &str) -> Result<IntGauge, String> {
    IntGauge::new(name, help).map_err(|e| format!("metrics init error: {e}"))
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let lab = LabMetrics {
            command_requests: counter("lab_command_requests", "Command channel requests issued")?,
            telemetry_connects: gauge("lab_telemetry_connects", "Telemetry streams opened")?,
            telemetry_received: gauge("lab_telemetry_received", "Telemetry messages received")?,
            telemetry_sent: gauge("lab_telemetry_sent", "Telemetry writes sent")?,
            telemetry_dropped: gauge(
                "lab_telemetry_dropped",
                "Telemetry writes dropped before a stream was ready",
            )?,
            ticks: counter("lab_ticks", "Control-law ticks executed")?,
            tick_overruns: counter("lab_tick_overruns", "Ticks that ran past their period")?,
        };
        let _ = registry.register(Box::new(lab.command_requests.clone()));
        let _ = registry.register(Box::new(lab.telemetry_connects.clone()));
        let _ = registry.register(Box::new(lab.telemetry_received.clone()));
        let _ = registry.register(Box::new(lab.telemetry_sent.clone()));
        let _ = registry.register(Box::new(lab.telemetry_dropped.clone()));
        let _ = registry.register(Box::new(lab.ticks.clone()));
        let _ = registry.register(Box::new(lab.tick_overruns.clone()));
        Ok(Self { registry, lab })
    }

    /// Copy a telemetry resourcer's counters into the gauges.
    pub fn observe_telemetry(&self, stats: &TelemetryStats) {
        self.lab.telemetry_connects.set(stats.connects as i64);
        self.lab.telemetry_received.set(stats.received as i64);
        self.lab.telemetry_sent.set(stats.sent as i64);
        self.lab.telemetry_dropped.set(stats.dropped as i64);
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encodes_registered_metrics() {
        let hub = MetricsHub::new().unwrap();
        hub.lab.ticks.inc_by(3);
        hub.observe_telemetry(&TelemetryStats {
            connects: 1,
            received: 42,
            sent: 2,
            dropped: 0,
        });
        let text = hub.encode_text();
        assert!(text.contains("lab_ticks 3"));
        assert!(text.contains("lab_telemetry_received 42"));
    }
}

//! The aeropendulum rig: a propeller-driven arm with an angle encoder.

use crate::{Catalogue, LabConfig, Operation, Resource};

const RW: &[Operation] = &[Operation::Read, Operation::Write];
const R: &[Operation] = &[Operation::Read];
const W: &[Operation] = &[Operation::Write];

pub const DEVICE: &str = "aeropendulum";
pub const ANGLE: &str = "/sensors/encoder/angle";
pub const DUTY: &str = "/propeller/pwm/duty";

pub fn catalogue() -> Catalogue {
    Catalogue {
        device: DEVICE.to_string(),
        resources: vec![
            Resource::command(
                "/logger/level",
                RW,
                "The UART logging level.\n\
                 Values: 'LOG_TRACE', 'LOG_DEBUG', 'LOG_INFO', 'LOG_WARN', 'LOG_ERROR'",
            ),
            Resource::command(
                "/propeller/pwm/status",
                RW,
                "The status of the propeller.\nValues: 'initialized', 'disabled'",
            ),
            Resource::command(
                "/telemetry/period",
                RW,
                "The period of the websocket emitted telemetry [ms].\n\
                 Values: float from 1 to 60000",
            ),
            Resource::command(
                "/test/resource",
                RW,
                "The value of a dummy resource.\nValues: string up to 16 chars.",
            ),
            Resource::command(
                "/test/parent_resource",
                R,
                "The value of its child resources, as JSON.",
            ),
            Resource::command(
                "/test/parent_resource/child_a",
                RW,
                "The value of a child_a resource.\nValues: string up to 16 chars.",
            ),
            Resource::command(
                "/test/parent_resource/child_b",
                RW,
                "The value of a child_b resource.\nValues: string up to 16 chars.",
            ),
            Resource::telemetry(
                ANGLE,
                R,
                "angle",
                "angle",
                "Arm angle from the encoder [deg].\nValues: 22 upwards, absent until first sample",
            ),
            Resource::telemetry(
                DUTY,
                W,
                "duty",
                "duty",
                "Propeller PWM duty cycle [%].\nValues: float from 0 to 100",
            ),
        ],
    }
}

pub fn config() -> LabConfig {
    LabConfig {
        address: "192.168.100.41".to_string(),
        http_port: 80,
        ws_port: 80,
        timeout_s: 1.0,
        ..LabConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Channel;

    #[test]
    fn test_yaml_catalogue_matches_builtin() {
        let yaml = include_str!("../../../configs/devices/aeropendulum.yaml");
        let parsed: Catalogue = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed, catalogue());
    }

    #[test]
    fn test_telemetry_resources_are_routed() {
        let cat = catalogue();
        let angle = cat.resources.iter().find(|r| r.path == ANGLE).unwrap();
        assert_eq!(angle.channel, Channel::Telemetry);
        assert_eq!(angle.field.as_deref(), Some("angle"));
        assert!(!angle.supports(Operation::Write));
        let duty = cat.resources.iter().find(|r| r.path == DUTY).unwrap();
        assert_eq!(duty.codec.as_deref(), Some("duty"));
        assert!(!duty.supports(Operation::Read));
    }

    #[test]
    fn test_config_points_at_rig() {
        let cfg = config();
        assert_eq!(cfg.address, "192.168.100.41");
        assert_eq!(cfg.timeout().unwrap(), std::time::Duration::from_secs(1));
    }

    #[cfg(feature = "mock")]
    #[test]
    fn test_parent_resource_is_also_a_node() {
        use crate::LabSystem;
        use lab_transport::{MockConnection, MockTelemetry, TelemetryConfig};

        let sys = LabSystem::with_backends(
            MockConnection::new(),
            MockTelemetry::new(),
            TelemetryConfig::default(),
            &catalogue(),
        )
        .unwrap();
        let parent = sys.node("/test/parent_resource").unwrap();
        assert!(parent.endpoint().is_some());
        assert_eq!(parent.children(), vec!["child_a", "child_b"]);
        assert_eq!(
            sys.root().children(),
            vec!["logger", "propeller", "telemetry", "test", "sensors"]
        );
        assert_eq!(
            sys.node("/propeller/pwm").unwrap().children(),
            vec!["status", "duty"]
        );
        sys.close();
    }
}

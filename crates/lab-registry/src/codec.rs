//! Conversions between domain values and the register values a resource
//! carries on the wire.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("{codec}: value {value} outside {min}..={max}")]
    OutOfRange {
        codec: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{codec}: register 0x{raw:X} outside 0x{min:X}..=0x{max:X}")]
    RegisterOutOfRange {
        codec: &'static str,
        raw: u32,
        min: u32,
        max: u32,
    },
    #[error("{codec}: empty register span 0x{zero:X}..=0x{max:X}")]
    EmptySpan { codec: &'static str, zero: u32, max: u32 },
}

/// A per-resource encode/decode pair. Both directions must be total over
/// the domain the codec declares; anything else is an error, never a clamp.
pub trait ValueCodec: Send + Sync {
    fn name(&self) -> &'static str;

    fn encode(&self, value: f64) -> Result<u32, CodecError>;

    fn decode(&self, raw: u32) -> Result<f64, CodecError>;

    /// Domain accepted by `encode`, inclusive.
    fn domain(&self) -> (f64, f64);
}

/// Encoder angle: a pulse count offset from the pendulum's resting angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleCodec {
    pub start_deg: f64,
    pub deg_per_pulse: f64,
    pub max_raw: u32,
}

impl Default for AngleCodec {
    fn default() -> Self {
        Self {
            start_deg: 22.0,
            deg_per_pulse: 0.0625,
            max_raw: 0xFFFF,
        }
    }
}

impl ValueCodec for AngleCodec {
    fn name(&self) -> &'static str {
        "angle"
    }

    fn encode(&self, value: f64) -> Result<u32, CodecError> {
        let (min, max) = self.domain();
        if !(min..=max).contains(&value) {
            return Err(CodecError::OutOfRange {
                codec: self.name(),
                value,
                min,
                max,
            });
        }
        Ok(((value - self.start_deg) / self.deg_per_pulse).round() as u32)
    }

    fn decode(&self, raw: u32) -> Result<f64, CodecError> {
        if raw > self.max_raw {
            return Err(CodecError::RegisterOutOfRange {
                codec: self.name(),
                raw,
                min: 0,
                max: self.max_raw,
            });
        }
        Ok(f64::from(raw) * self.deg_per_pulse + self.start_deg)
    }

    fn domain(&self) -> (f64, f64) {
        (
            self.start_deg,
            self.start_deg + f64::from(self.max_raw) * self.deg_per_pulse,
        )
    }
}

/// Propeller PWM duty: percentage mapped onto the ESC's register span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCodec {
    zero: u32,
    max: u32,
}

impl Default for DutyCodec {
    fn default() -> Self {
        Self {
            zero: 0x1D6A,
            max: 0x2710,
        }
    }
}

impl DutyCodec {
    /// `zero` is the register for 0%, `max` the one for 100%.
    pub fn new(zero: u32, max: u32) -> Result<Self, CodecError> {
        if max <= zero {
            return Err(CodecError::EmptySpan {
                codec: "duty",
                zero,
                max,
            });
        }
        Ok(Self { zero, max })
    }

    pub fn zero(&self) -> u32 {
        self.zero
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    fn counts(&self) -> u32 {
        self.max.saturating_sub(self.zero)
    }

    fn span(&self) -> f64 {
        f64::from(self.counts())
    }
}

impl ValueCodec for DutyCodec {
    fn name(&self) -> &'static str {
        "duty"
    }

    /// Truncates toward the zero register, as the ESC firmware does.
    fn encode(&self, value: f64) -> Result<u32, CodecError> {
        let (min, max) = self.domain();
        if !(min..=max).contains(&value) {
            return Err(CodecError::OutOfRange {
                codec: self.name(),
                value,
                min,
                max,
            });
        }
        let offset = (value * self.span() / 100.0 + 1e-9).floor() as u32;
        Ok(self.zero.saturating_add(offset.min(self.counts())))
    }

    fn decode(&self, raw: u32) -> Result<f64, CodecError> {
        if raw < self.zero || raw > self.max {
            return Err(CodecError::RegisterOutOfRange {
                codec: self.name(),
                raw,
                min: self.zero,
                max: self.max,
            });
        }
        Ok(f64::from(raw - self.zero) * 100.0 / self.span())
    }

    fn domain(&self) -> (f64, f64) {
        (0.0, 100.0)
    }
}

/// Named codecs a catalogue may refer to.
#[derive(Clone)]
pub struct CodecTable {
    codecs: HashMap<String, Arc<dyn ValueCodec>>,
}

impl CodecTable {
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: &str, codec: Arc<dyn ValueCodec>) {
        self.codecs.insert(name.to_string(), codec);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ValueCodec>> {
        self.codecs.get(name).cloned()
    }
}

impl Default for CodecTable {
    /// The aeropendulum's `angle` and `duty` codecs.
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert("angle", Arc::new(AngleCodec::default()));
        table.insert("duty", Arc::new(DutyCodec::default()));
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_decodes_resting_position() {
        let c = AngleCodec::default();
        assert_eq!(c.decode(0x0000).unwrap(), 22.0);
        assert_eq!(c.decode(0x0110).unwrap(), 22.0 + 272.0 * 0.0625);
    }

    #[test]
    fn test_angle_round_trip_on_pulse_grid() {
        let c = AngleCodec::default();
        for raw in [0u32, 1, 16, 1088, 0x8000, 0xFFFF] {
            let deg = c.decode(raw).unwrap();
            assert_eq!(c.encode(deg).unwrap(), raw);
            assert_eq!(c.decode(c.encode(deg).unwrap()).unwrap(), deg);
        }
    }

    #[test]
    fn test_angle_boundaries() {
        let c = AngleCodec::default();
        let (min, max) = c.domain();
        assert_eq!(c.encode(min).unwrap(), 0);
        assert_eq!(c.encode(max).unwrap(), 0xFFFF);
        assert!(matches!(c.encode(max + 1.0), Err(CodecError::OutOfRange { .. })));
        assert!(matches!(c.encode(21.0), Err(CodecError::OutOfRange { .. })));
        assert!(matches!(c.encode(f64::NAN), Err(CodecError::OutOfRange { .. })));
        assert!(matches!(
            c.decode(0x1_0000),
            Err(CodecError::RegisterOutOfRange { .. })
        ));
    }

    #[test]
    fn test_duty_matches_esc_registers() {
        let c = DutyCodec::default();
        assert_eq!(c.encode(0.0).unwrap(), 0x1D6A);
        assert_eq!(c.encode(100.0).unwrap(), 0x2710);
        // 20% of the 2470-count span
        assert_eq!(c.encode(20.0).unwrap(), 0x1D6A + 494);
        // 10.5% truncates 259.35 counts to 259
        assert_eq!(c.encode(10.5).unwrap(), 0x1D6A + 259);
    }

    #[test]
    fn test_duty_round_trip() {
        let c = DutyCodec::default();
        for pct in [0.0, 10.0, 20.0, 30.0, 50.0, 70.0, 90.0, 100.0] {
            assert_eq!(c.decode(c.encode(pct).unwrap()).unwrap(), pct);
        }
    }

    #[test]
    fn test_duty_rejects_outside_domain() {
        let c = DutyCodec::default();
        assert!(c.encode(-0.1).is_err());
        assert!(c.encode(100.1).is_err());
        assert!(c.decode(0x1D69).is_err());
        assert!(c.decode(0x2711).is_err());
    }

    #[test]
    fn test_duty_requires_nonempty_span() {
        assert!(matches!(
            DutyCodec::new(0x2710, 0x1D6A),
            Err(CodecError::EmptySpan { .. })
        ));
        assert!(DutyCodec::new(0x2710, 0x2710).is_err());
        let c = DutyCodec::new(100, 200).unwrap();
        assert_eq!((c.zero(), c.max()), (100, 200));
        assert_eq!(c.encode(50.0).unwrap(), 150);
        assert_eq!(c.decode(200).unwrap(), 100.0);
    }

    #[test]
    fn test_default_table_has_device_codecs() {
        let t = CodecTable::default();
        assert_eq!(t.get("angle").map(|c| c.name()), Some("angle"));
        assert_eq!(t.get("duty").map(|c| c.name()), Some("duty"));
        assert!(t.get("torque").is_none());
    }
}

use crate::ControlError;
use std::time::Duration;

/// Cadence and settle times for one experiment run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    frequency_hz: f64,
    run_time_s: f64,
    before_loop_time_s: f64,
    after_loop_time_s: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            frequency_hz: 10.0,
            run_time_s: 10.0,
            before_loop_time_s: 0.0,
            after_loop_time_s: 0.0,
        }
    }
}

fn duration(name: &str, s: f64) -> Result<f64, ControlError> {
    if s >= 0.0 && Duration::try_from_secs_f64(s).is_ok() {
        Ok(s)
    } else {
        Err(ControlError::InvalidTiming(format!(
            "{name} must be finite and >= 0, got {s}"
        )))
    }
}

impl Timing {
    pub fn new(
        frequency_hz: f64,
        run_time_s: f64,
        before_loop_time_s: f64,
        after_loop_time_s: f64,
    ) -> Result<Self, ControlError> {
        let mut t = Self::default();
        t.set_loop_frequency(frequency_hz)?;
        t.set_run_time(run_time_s)?;
        t.set_before_loop_time(before_loop_time_s)?;
        t.set_after_loop_time(after_loop_time_s)?;
        Ok(t)
    }

    pub fn set_loop_frequency(&mut self, frequency_hz: f64) -> Result<&mut Self, ControlError> {
        if !(frequency_hz.is_finite()
            && frequency_hz > 0.0
            && Duration::try_from_secs_f64(1.0 / frequency_hz).is_ok())
        {
            return Err(ControlError::InvalidTiming(format!(
                "frequency_hz must be finite and > 0, got {frequency_hz}"
            )));
        }
        if frequency_hz > 1000.0 {
            tracing::warn!(frequency_hz, "loop frequency above 1 kHz, expect overruns");
        }
        self.frequency_hz = frequency_hz;
        Ok(self)
    }

    pub fn set_run_time(&mut self, seconds: f64) -> Result<&mut Self, ControlError> {
        self.run_time_s = duration("run_time", seconds)?;
        Ok(self)
    }

    pub fn set_before_loop_time(&mut self, seconds: f64) -> Result<&mut Self, ControlError> {
        self.before_loop_time_s = duration("before_loop_time", seconds)?;
        Ok(self)
    }

    pub fn set_after_loop_time(&mut self, seconds: f64) -> Result<&mut Self, ControlError> {
        self.after_loop_time_s = duration("after_loop_time", seconds)?;
        Ok(self)
    }

    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency_hz)
    }

    pub fn run_time(&self) -> Duration {
        Duration::from_secs_f64(self.run_time_s)
    }

    pub fn before_loop_time(&self) -> Duration {
        Duration::from_secs_f64(self.before_loop_time_s)
    }

    pub fn after_loop_time(&self) -> Duration {
        Duration::from_secs_f64(self.after_loop_time_s)
    }

    /// Control-law invocations in one full run.
    ///
    /// `run_time × frequency`, rounded down; the epsilon keeps products such
    /// as `0.3 × 10` from landing one short.
    pub fn tick_count(&self) -> u64 {
        (self.run_time_s * self.frequency_hz + 1e-9).floor() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_count_floors() {
        let t = Timing::new(10.0, 0.25, 0.1, 0.1).unwrap();
        assert_eq!(t.tick_count(), 2);
        assert_eq!(t.period(), Duration::from_millis(100));
        assert_eq!(Timing::new(10.0, 0.3, 0.0, 0.0).unwrap().tick_count(), 3);
        assert_eq!(Timing::new(5.0, 600.0, 1.0, 0.0).unwrap().tick_count(), 3000);
        assert_eq!(Timing::new(10.0, 0.0, 0.0, 0.0).unwrap().tick_count(), 0);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Timing::new(0.0, 1.0, 0.0, 0.0).is_err());
        assert!(Timing::new(-5.0, 1.0, 0.0, 0.0).is_err());
        assert!(Timing::new(f64::INFINITY, 1.0, 0.0, 0.0).is_err());
        assert!(Timing::new(10.0, -1.0, 0.0, 0.0).is_err());
        assert!(Timing::new(10.0, 1.0, f64::NAN, 0.0).is_err());
        assert!(matches!(
            Timing::new(10.0, 1.0, 0.0, f64::INFINITY),
            Err(ControlError::InvalidTiming(_))
        ));
    }

    #[test]
    fn test_setters_chain_and_keep_valid_state() {
        let mut t = Timing::default();
        t.set_loop_frequency(5.0)
            .unwrap()
            .set_run_time(2.0)
            .unwrap();
        assert_eq!(t.tick_count(), 10);
        assert!(t.set_run_time(-1.0).is_err());
        assert_eq!(t.run_time(), Duration::from_secs(2));
    }
}

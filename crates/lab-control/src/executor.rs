//! Fixed-cadence experiment runner.
//!
//! A run walks `Idle → Setup → Running → Teardown → Done`. The control law
//! runs once per tick; a tick that overruns its period delays the next one
//! instead of dropping it, so the tick count depends only on the timing
//! configuration. Teardown runs exactly once per run, after any failure.

use crate::experiment::{Experiment, Tick};
use crate::{CallbackError, Phase, Timing};
use lab_registry::MetricsHub;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Setup,
    Running,
    Teardown,
    Done,
}

/// What a successful run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunReport {
    pub ticks: u64,
    pub overruns: u64,
    pub stopped_early: bool,
    pub elapsed: Duration,
}

pub struct Executor {
    timing: Timing,
    state: State,
    failed: bool,
    metrics: Option<MetricsHub>,
}

impl Executor {
    pub fn new(timing: Timing) -> Self {
        Self {
            timing,
            state: State::Idle,
            failed: false,
            metrics: None,
        }
    }

    /// Count ticks and overruns in `hub`.
    pub fn with_metrics(mut self, hub: &MetricsHub) -> Self {
        self.metrics = Some(hub.clone());
        self
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Whether the last run recorded a failure.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Run `exp` to completion.
    ///
    /// Returns the first failure of the run; a teardown failure after an
    /// earlier one is chained onto it as `secondary`.
    pub fn run<E: Experiment + ?Sized>(&mut self, exp: &mut E) -> Result<RunReport, CallbackError> {
        let started = Instant::now();
        self.failed = false;
        let mut report = RunReport::default();
        info!(
            frequency_hz = self.timing.frequency_hz(),
            ticks = self.timing.tick_count(),
            "experiment starting"
        );

        self.state = State::Setup;
        let mut first = match guarded(Phase::Setup, || exp.before_the_loop()) {
            Ok(()) => None,
            Err(e) => Some(e),
        };

        if first.is_none() {
            settle(self.timing.before_loop_time());
            self.state = State::Running;
            if let Err(e) = self.tick_loop(exp, &mut report) {
                first = Some(e);
            }
        }
        self.failed = first.is_some();

        self.state = State::Teardown;
        let teardown = guarded(Phase::Teardown, || exp.after_the_loop());
        settle(self.timing.after_loop_time());
        self.state = State::Done;
        report.elapsed = started.elapsed();

        let outcome = match (first, teardown) {
            (None, Ok(())) => Ok(report),
            (None, Err(t)) => Err(t),
            (Some(f), Ok(())) => Err(f),
            (Some(f), Err(t)) => Err(f.chain(t)),
        };
        match &outcome {
            Ok(r) => info!(
                ticks = r.ticks,
                overruns = r.overruns,
                stopped_early = r.stopped_early,
                elapsed_ms = r.elapsed.as_millis() as u64,
                "experiment finished"
            ),
            Err(e) => {
                self.failed = true;
                error!(phase = %e.phase, error = %e, "experiment failed");
            }
        }
        outcome
    }

    fn tick_loop<E: Experiment + ?Sized>(
        &mut self,
        exp: &mut E,
        report: &mut RunReport,
    ) -> Result<(), CallbackError> {
        let period = self.timing.period();
        let total = self.timing.tick_count();
        let start = Instant::now();
        let mut next = start;

        for index in 0..total {
            settle(next.saturating_duration_since(Instant::now()));
            let mut tick = Tick::new(index, period, start.elapsed());
            guarded(Phase::Running, || exp.in_the_loop(&mut tick))?;
            report.ticks += 1;
            self.count_tick();

            if tick.is_stopped() {
                debug!(index, "control law stopped the loop");
                report.stopped_early = index + 1 < total;
                break;
            }

            next += period;
            let now = Instant::now();
            if next < now {
                warn!(
                    index,
                    late_us = now.duration_since(next).as_micros() as u64,
                    "tick overran its period"
                );
                next = now;
                report.overruns += 1;
                self.count_overrun();
            }
        }
        Ok(())
    }

    fn count_tick(&self) {
        if let Some(m) = &self.metrics {
            m.lab.ticks.inc();
        }
    }

    fn count_overrun(&self) {
        if let Some(m) = &self.metrics {
            m.lab.tick_overruns.inc();
        }
    }
}

fn settle(d: Duration) {
    if !d.is_zero() {
        std::thread::sleep(d);
    }
}

/// Run one callback, turning a panic into a failure of `phase` so that
/// teardown still happens.
fn guarded(
    phase: Phase,
    f: impl FnOnce() -> anyhow::Result<()>,
) -> Result<(), CallbackError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CallbackError::new(phase, e)),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(CallbackError::new(
                phase,
                anyhow::anyhow!("callback panicked: {msg}"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExperimentBuilder;

    fn fast(run_time: f64) -> Timing {
        Timing::new(200.0, run_time, 0.0, 0.0).unwrap()
    }

    #[test]
    fn test_states_and_report() {
        let mut exp = ExperimentBuilder::new(0u32)
            .in_the_loop(|n, _| {
                *n += 1;
                Ok(())
            })
            .build()
            .unwrap();
        let mut ex = Executor::new(fast(0.05));
        assert_eq!(ex.state(), State::Idle);
        let report = ex.run(&mut exp).unwrap();
        assert_eq!(ex.state(), State::Done);
        assert!(!ex.failed());
        assert_eq!(report.ticks, 10);
        assert!(!report.stopped_early);
        assert_eq!(*exp.state(), 10);
    }

    #[test]
    fn test_tick_indices_are_sequential() {
        let mut exp = ExperimentBuilder::new(Vec::new())
            .in_the_loop(|seen: &mut Vec<u64>, tick| {
                seen.push(tick.index());
                Ok(())
            })
            .build()
            .unwrap();
        Executor::new(fast(0.02)).run(&mut exp).unwrap();
        assert_eq!(exp.into_state(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_panic_in_control_law_still_tears_down() {
        let mut exp = ExperimentBuilder::new(0u32)
            .in_the_loop(|_, _| panic!("encoder unplugged"))
            .after_the_loop(|n| {
                *n += 1;
                Ok(())
            })
            .build()
            .unwrap();
        let mut ex = Executor::new(fast(0.05));
        let err = ex.run(&mut exp).unwrap_err();
        assert_eq!(err.phase, Phase::Running);
        assert!(err.to_string().contains("encoder unplugged"));
        assert!(ex.failed());
        assert_eq!(*exp.state(), 1);
    }

    #[test]
    fn test_executor_is_reusable() {
        let mut exp = ExperimentBuilder::new(0u32)
            .in_the_loop(|n, _| {
                *n += 1;
                Ok(())
            })
            .build()
            .unwrap();
        let mut ex = Executor::new(fast(0.01));
        ex.run(&mut exp).unwrap();
        ex.run(&mut exp).unwrap();
        assert_eq!(*exp.state(), 4);
    }

    #[test]
    fn test_metrics_count_ticks() {
        let hub = MetricsHub::new().unwrap();
        let mut exp = ExperimentBuilder::new(())
            .in_the_loop(|_, _| Ok(()))
            .build()
            .unwrap();
        Executor::new(fast(0.02))
            .with_metrics(&hub)
            .run(&mut exp)
            .unwrap();
        assert_eq!(hub.lab.ticks.get(), 4);
    }
}

//! lab-control: timed control experiments with failure-safe teardown
//!
//! An [`Experiment`] supplies setup, a per-tick control law and teardown.
//! The [`Executor`] runs setup once, ticks the control law at a fixed
//! frequency for the configured run time, then always runs teardown.

mod error;
pub use error::{CallbackError, ControlError, Phase};

mod timing;
pub use timing::Timing;

mod experiment;
pub use experiment::{ClosureExperiment, Experiment, ExperimentBuilder, Tick};

mod executor;
pub use executor::{Executor, RunReport, State};

/// Run `exp` once with `timing`.
pub fn run<E: Experiment + ?Sized>(exp: &mut E, timing: Timing) -> Result<RunReport, CallbackError> {
    Executor::new(timing).run(exp)
}

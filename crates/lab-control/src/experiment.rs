use crate::ControlError;
use std::time::Duration;

/// A timed control experiment.
///
/// All three callbacks are required. An experiment without a control law
/// does not compile:
///
/// ```compile_fail
/// use lab_control::Experiment;
///
/// struct Incomplete;
///
/// impl Experiment for Incomplete {
///     fn before_the_loop(&mut self) -> anyhow::Result<()> {
///         Ok(())
///     }
///     fn after_the_loop(&mut self) -> anyhow::Result<()> {
///         Ok(())
///     }
/// }
/// ```
///
/// A complete one:
///
/// ```
/// use lab_control::{Executor, Experiment, Tick, Timing};
///
/// struct Counter(u32);
///
/// impl Experiment for Counter {
///     fn before_the_loop(&mut self) -> anyhow::Result<()> {
///         self.0 = 0;
///         Ok(())
///     }
///     fn in_the_loop(&mut self, _tick: &mut Tick) -> anyhow::Result<()> {
///         self.0 += 1;
///         Ok(())
///     }
///     fn after_the_loop(&mut self) -> anyhow::Result<()> {
///         self.0 += 1;
///         Ok(())
///     }
/// }
///
/// let mut exp = Counter(0);
/// let timing = Timing::new(100.0, 0.05, 0.0, 0.0).unwrap();
/// Executor::new(timing).run(&mut exp).unwrap();
/// assert_eq!(exp.0, 6);
/// ```
pub trait Experiment {
    /// Runs once before the loop. A failure skips the loop but not
    /// `after_the_loop`.
    fn before_the_loop(&mut self) -> anyhow::Result<()>;

    /// The control law, called once per tick.
    fn in_the_loop(&mut self, tick: &mut Tick) -> anyhow::Result<()>;

    /// Runs exactly once per run, whatever happened before it.
    fn after_the_loop(&mut self) -> anyhow::Result<()>;
}

/// Per-tick context handed to the control law.
#[derive(Debug)]
pub struct Tick {
    index: u64,
    period: Duration,
    elapsed: Duration,
    stop: bool,
}

impl Tick {
    pub(crate) fn new(index: u64, period: Duration, elapsed: Duration) -> Self {
        Self {
            index,
            period,
            elapsed,
            stop: false,
        }
    }

    /// Zero-based tick number.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time since the loop started.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// End the loop after this tick. Teardown still runs.
    pub fn stop(&mut self) {
        self.stop = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stop
    }
}

type Hook<'a, S> = Box<dyn FnMut(&mut S) -> anyhow::Result<()> + 'a>;
type Law<'a, S> = Box<dyn FnMut(&mut S, &mut Tick) -> anyhow::Result<()> + 'a>;

/// Assembles an [`Experiment`] from closures over a state value.
pub struct ExperimentBuilder<'a, S> {
    state: S,
    before: Option<Hook<'a, S>>,
    control: Option<Law<'a, S>>,
    after: Option<Hook<'a, S>>,
}

impl<'a, S> ExperimentBuilder<'a, S> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            before: None,
            control: None,
            after: None,
        }
    }

    pub fn before_the_loop(mut self, f: impl FnMut(&mut S) -> anyhow::Result<()> + 'a) -> Self {
        self.before = Some(Box::new(f));
        self
    }

    pub fn in_the_loop(
        mut self,
        f: impl FnMut(&mut S, &mut Tick) -> anyhow::Result<()> + 'a,
    ) -> Self {
        self.control = Some(Box::new(f));
        self
    }

    pub fn after_the_loop(mut self, f: impl FnMut(&mut S) -> anyhow::Result<()> + 'a) -> Self {
        self.after = Some(Box::new(f));
        self
    }

    /// Fails with [`ControlError::MissingCallback`] when no control law was
    /// given. Missing setup or teardown hooks default to no-ops.
    pub fn build(self) -> Result<ClosureExperiment<'a, S>, ControlError> {
        let control = self.control.ok_or(ControlError::MissingCallback)?;
        Ok(ClosureExperiment {
            state: self.state,
            before: self.before,
            control,
            after: self.after,
        })
    }
}

pub struct ClosureExperiment<'a, S> {
    state: S,
    before: Option<Hook<'a, S>>,
    control: Law<'a, S>,
    after: Option<Hook<'a, S>>,
}

impl<'a, S> ClosureExperiment<'a, S> {
    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn into_state(self) -> S {
        self.state
    }
}

impl<'a, S> Experiment for ClosureExperiment<'a, S> {
    fn before_the_loop(&mut self) -> anyhow::Result<()> {
        match self.before.as_mut() {
            Some(f) => f(&mut self.state),
            None => Ok(()),
        }
    }

    fn in_the_loop(&mut self, tick: &mut Tick) -> anyhow::Result<()> {
        (self.control)(&mut self.state, tick)
    }

    fn after_the_loop(&mut self) -> anyhow::Result<()> {
        match self.after.as_mut() {
            Some(f) => f(&mut self.state),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_without_control_law_fails() {
        let res = ExperimentBuilder::new(0u32)
            .before_the_loop(|_| Ok(()))
            .after_the_loop(|_| Ok(()))
            .build();
        assert_eq!(res.err(), Some(ControlError::MissingCallback));
    }

    #[test]
    fn test_closures_share_state() {
        let mut exp = ExperimentBuilder::new(Vec::<&str>::new())
            .before_the_loop(|log| {
                log.push("before");
                Ok(())
            })
            .in_the_loop(|log, tick| {
                log.push("tick");
                tick.stop();
                Ok(())
            })
            .build()
            .unwrap();
        exp.before_the_loop().unwrap();
        let mut tick = Tick::new(0, Duration::from_millis(10), Duration::ZERO);
        exp.in_the_loop(&mut tick).unwrap();
        exp.after_the_loop().unwrap();
        assert!(tick.is_stopped());
        assert_eq!(exp.into_state(), vec!["before", "tick"]);
    }
}

use core::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ControlError {
    #[error("experiment has no control law")]
    MissingCallback,
    #[error("invalid timing: {0}")]
    InvalidTiming(String),
}

/// The experiment callback that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Running,
    Teardown,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Setup => f.write_str("before_the_loop"),
            Phase::Running => f.write_str("in_the_loop"),
            Phase::Teardown => f.write_str("after_the_loop"),
        }
    }
}

/// A failure raised by an experiment callback.
///
/// The first failure of a run is authoritative. A teardown failure that
/// follows it is kept in `secondary` rather than replacing it.
#[derive(Debug)]
pub struct CallbackError {
    pub phase: Phase,
    pub source: anyhow::Error,
    pub secondary: Option<Box<CallbackError>>,
}

impl CallbackError {
    pub fn new(phase: Phase, source: anyhow::Error) -> Self {
        Self {
            phase,
            source,
            secondary: None,
        }
    }

    pub(crate) fn chain(mut self, later: CallbackError) -> Self {
        self.secondary = Some(Box::new(later));
        self
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {:#}", self.phase, self.source)?;
        if let Some(s) = &self.secondary {
            write!(f, " (then {s})")?;
        }
        Ok(())
    }
}

impl std::error::Error for CallbackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_secondary() {
        let err = CallbackError::new(Phase::Running, anyhow::anyhow!("sensor lost"))
            .chain(CallbackError::new(Phase::Teardown, anyhow::anyhow!("motor busy")));
        assert_eq!(
            err.to_string(),
            "in_the_loop failed: sensor lost (then after_the_loop failed: motor busy)"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}

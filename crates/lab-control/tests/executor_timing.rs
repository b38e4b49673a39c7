use lab_control::{CallbackError, Executor, Experiment, ExperimentBuilder, Phase, Tick, Timing};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Counter {
    value: u32,
    setups: u32,
    teardowns: u32,
}

impl Experiment for Counter {
    fn before_the_loop(&mut self) -> anyhow::Result<()> {
        self.value = 0;
        self.setups += 1;
        Ok(())
    }

    fn in_the_loop(&mut self, _tick: &mut Tick) -> anyhow::Result<()> {
        self.value += 1;
        Ok(())
    }

    fn after_the_loop(&mut self) -> anyhow::Result<()> {
        self.value += 1;
        self.teardowns += 1;
        Ok(())
    }
}

#[test]
fn test_basic_executor_counts_ticks_then_teardown() {
    let mut exp = Counter::default();
    let mut timing = Timing::default();
    timing
        .set_loop_frequency(10.0)
        .unwrap()
        .set_before_loop_time(0.1)
        .unwrap()
        .set_after_loop_time(0.1)
        .unwrap()
        .set_run_time(0.25)
        .unwrap();

    let started = Instant::now();
    let report = Executor::new(timing).run(&mut exp).unwrap();

    assert_eq!(exp.value, 3);
    assert_eq!(report.ticks, 2);
    assert_eq!((exp.setups, exp.teardowns), (1, 1));
    // setup settle + two ticks (the first is immediate) + teardown settle
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[test]
fn test_zero_run_time_still_tears_down() {
    let mut exp = Counter::default();
    let report = lab_control::run(&mut exp, Timing::new(10.0, 0.0, 0.0, 0.0).unwrap()).unwrap();
    assert_eq!(report.ticks, 0);
    assert_eq!(exp.value, 1);
    assert_eq!(exp.teardowns, 1);
}

#[test]
fn test_setup_failure_skips_loop() {
    let mut exp = ExperimentBuilder::new((0u32, 0u32))
        .before_the_loop(|_| anyhow::bail!("device unreachable"))
        .in_the_loop(|(ticks, _), _| {
            *ticks += 1;
            Ok(())
        })
        .after_the_loop(|(_, teardowns)| {
            *teardowns += 1;
            Ok(())
        })
        .build()
        .unwrap();
    let err = Executor::new(Timing::new(50.0, 0.1, 0.0, 0.0).unwrap())
        .run(&mut exp)
        .unwrap_err();
    assert_eq!(err.phase, Phase::Setup);
    assert!(err.secondary.is_none());
    assert_eq!(*exp.state(), (0, 1));
}

#[test]
fn test_control_failure_aborts_then_tears_down_once() {
    let mut exp = ExperimentBuilder::new((0u32, 0u32))
        .in_the_loop(|(ticks, _), tick| {
            *ticks += 1;
            if tick.index() == 2 {
                anyhow::bail!("angle out of range");
            }
            Ok(())
        })
        .after_the_loop(|(_, teardowns)| {
            *teardowns += 1;
            Ok(())
        })
        .build()
        .unwrap();
    let mut ex = Executor::new(Timing::new(100.0, 0.1, 0.0, 0.0).unwrap());
    let err = ex.run(&mut exp).unwrap_err();
    assert_eq!(err.phase, Phase::Running);
    assert!(ex.failed());
    assert_eq!(*exp.state(), (3, 1));
}

#[test]
fn test_first_failure_is_authoritative() {
    let mut exp = ExperimentBuilder::new(())
        .in_the_loop(|_, _| anyhow::bail!("first"))
        .after_the_loop(|_| anyhow::bail!("second"))
        .build()
        .unwrap();
    let err: CallbackError = Executor::new(Timing::new(100.0, 0.05, 0.0, 0.0).unwrap())
        .run(&mut exp)
        .unwrap_err();
    assert_eq!(err.phase, Phase::Running);
    assert_eq!(err.source.to_string(), "first");
    let secondary = err.secondary.as_deref().unwrap();
    assert_eq!(secondary.phase, Phase::Teardown);
    assert_eq!(secondary.source.to_string(), "second");
}

#[test]
fn test_teardown_failure_alone_is_reported() {
    let mut exp = ExperimentBuilder::new(())
        .in_the_loop(|_, _| Ok(()))
        .after_the_loop(|_| anyhow::bail!("propeller stuck"))
        .build()
        .unwrap();
    let err = Executor::new(Timing::new(100.0, 0.02, 0.0, 0.0).unwrap())
        .run(&mut exp)
        .unwrap_err();
    assert_eq!(err.phase, Phase::Teardown);
    assert!(err.secondary.is_none());
}

#[test]
fn test_slow_ticks_are_delayed_not_dropped() {
    let mut exp = ExperimentBuilder::new(0u32)
        .in_the_loop(|n, tick| {
            *n += 1;
            if tick.index() < 3 {
                std::thread::sleep(tick.period() * 3);
            }
            Ok(())
        })
        .build()
        .unwrap();
    let report = Executor::new(Timing::new(100.0, 0.1, 0.0, 0.0).unwrap())
        .run(&mut exp)
        .unwrap();
    assert_eq!(*exp.state(), 10);
    assert_eq!(report.ticks, 10);
    assert!(report.overruns >= 3);
}

#[test]
fn test_stop_ends_loop_early() {
    let mut exp = ExperimentBuilder::new((0u32, false))
        .in_the_loop(|(n, _), tick| {
            *n += 1;
            if *n == 4 {
                tick.stop();
            }
            Ok(())
        })
        .after_the_loop(|(_, torn_down)| {
            *torn_down = true;
            Ok(())
        })
        .build()
        .unwrap();
    let report = Executor::new(Timing::new(100.0, 1.0, 0.0, 0.0).unwrap())
        .run(&mut exp)
        .unwrap();
    assert_eq!(report.ticks, 4);
    assert!(report.stopped_early);
    assert_eq!(*exp.state(), (4, true));
}

#[test]
fn test_missing_control_law_fails_before_run() {
    let res = ExperimentBuilder::new(()).after_the_loop(|_| Ok(())).build();
    assert!(matches!(res, Err(lab_control::ControlError::MissingCallback)));
}

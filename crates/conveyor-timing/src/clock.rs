use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use once_cell::sync::OnceCell;
use quanta::Mock;

use crate::Nanos;

pub type Clock = quanta::Clock;

/// Process-wide time source. Either the system clock or a `quanta` mock
/// installed once at startup so tests can drive simulated time.
#[derive(Clone, Debug)]
pub enum ClockSource {
    Mocked(Clock),
    System,
}

impl ClockSource {
    pub fn raw(&self) -> u64 {
        match self {
            ClockSource::Mocked(clock) => clock.raw(),
            ClockSource::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default(),
        }
    }

    #[inline]
    pub fn now(&self) -> Nanos {
        Nanos(self.raw())
    }
}

static GLOBAL_CLOCK: OnceCell<ClockSource> = OnceCell::new();

/// Installs a mock as the global clock and returns its controller.
/// Must run before anything has read the clock, and only from one thread.
pub fn init_global_with_mock() -> Arc<Mock> {
    let (mock, controller) = Clock::mock();
    let installed = GLOBAL_CLOCK.get_or_init(|| ClockSource::Mocked(mock));
    assert_eq!(installed.raw(), 0, "global clock was already initialized");
    controller.increment(1);
    controller
}

#[inline]
pub fn global_clock() -> &'static ClockSource {
    GLOBAL_CLOCK.get_or_init(|| ClockSource::System)
}

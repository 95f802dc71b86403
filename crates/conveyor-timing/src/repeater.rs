use crate::Nanos;

/// Interval gate: `fired` returns true at most once per interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Repeater {
    interval: Nanos,
    last_acted: Nanos,
}

impl Repeater {
    #[inline]
    pub fn every(interval: Nanos) -> Self {
        Self { interval, last_acted: Nanos::ZERO }
    }

    #[inline]
    pub fn fired(&mut self) -> bool {
        if self.last_acted.elapsed_saturating() >= self.interval {
            self.last_acted = Nanos::now();
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn interval(&self) -> Nanos {
        self.interval
    }

    #[inline]
    pub fn set_interval(&mut self, interval: Nanos) {
        self.interval = interval;
    }

    pub fn reset(&mut self) {
        self.last_acted = Nanos::now();
    }

    pub fn force_fire(&mut self) {
        self.last_acted = Nanos::ZERO;
    }
}

//! Time sources for the monitor loop.
//!
//! The loop reads monotonic time for throttling, wall time for snapshot
//! timestamps, and sleeps before reconnecting. All three go through `Clock`
//! so the loop can run under simulated time.

use chrono::{DateTime, Local};
use std::cell::Cell;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
    fn wall_time(&self) -> DateTime<Local>;
    fn sleep(&self, duration: Duration);
}

/// Real time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_time(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Simulated time. Only moves when advanced or slept on.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Local>,
    elapsed: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(Local::now())
    }

    pub fn starting_at(wall_origin: DateTime<Local>) -> Self {
        Self {
            origin: Instant::now(),
            wall_origin,
            elapsed: Cell::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.elapsed.set(self.elapsed.get() + by);
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }

    fn wall_time(&self) -> DateTime<Local> {
        let offset =
            chrono::Duration::from_std(self.elapsed.get()).unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + offset
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn wall_time(&self) -> DateTime<Local> {
        (**self).wall_time()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        let w0 = clock.wall_time();

        assert_eq!(clock.now(), t0);

        clock.advance(Duration::from_millis(1500));
        clock.sleep(Duration::from_millis(500));

        assert_eq!(clock.now() - t0, Duration::from_secs(2));
        assert_eq!((clock.wall_time() - w0).num_milliseconds(), 2000);
        assert_eq!(clock.elapsed(), Duration::from_secs(2));
    }
}

//! Timer contract (§2 port table) used for the POLL role's tick source and
//! the DE-line turnaround wait (§4.5.2).
//!
//! Grounded in `port_tmr.h`'s `tmr__init`/`tmr__poll`/`tmr__ena`/`tmr__dis`.
//! The periodic-callback shape of `tmr__init` collapses here into a plain
//! elapsed-time check driven from the host's own loop (`poll()` is already
//! the single pump per §4.5.4), rather than a second callback-driven timer
//! abstraction layered on top of it.

use std::time::{Duration, Instant};

/// Contract for a free-running interval timer: has `interval` elapsed since
/// it was last reset?
pub trait Timer: Send {
    fn reset(&mut self);
    fn elapsed(&self) -> bool;
    fn sleep(&self, dur: Duration);
}

/// A `std::time::Instant`-backed [`Timer`].
pub struct StdTimer {
    interval: Duration,
    last: Instant,
}

impl StdTimer {
    pub fn new(interval: Duration) -> Self {
        StdTimer {
            interval,
            last: Instant::now(),
        }
    }
}

impl Timer for StdTimer {
    fn reset(&mut self) {
        self.last = Instant::now();
    }

    fn elapsed(&self) -> bool {
        self.last.elapsed() >= self.interval
    }

    fn sleep(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_timer_has_not_elapsed() {
        let t = StdTimer::new(Duration::from_secs(60));
        assert!(!t.elapsed());
    }

    #[test]
    fn zero_interval_elapses_immediately() {
        let t = StdTimer::new(Duration::from_millis(0));
        assert!(t.elapsed());
    }
}

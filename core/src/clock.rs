//! Wall-clock capability. Every place that would otherwise call
//! `Tod::now()`/`SystemTime::now()` directly takes a `&dyn Clock` instead,
//! so tests can inject a virtual clock and replay the scenarios of spec §8
//! deterministically.

use crate::tod::Tod;
use std::sync::atomic::{AtomicI64, Ordering};

pub trait Clock: Send + Sync {
    /// Current time of day, per the host's local wall clock.
    fn now(&self) -> Tod;
}

/// The real host wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Tod {
        Tod::now()
    }
}

/// A clock whose value is set explicitly by the test driving it. Never
/// advances on its own — callers step it between injected events.
#[derive(Debug)]
pub struct VirtualClock {
    ticks: AtomicI64,
}

impl VirtualClock {
    pub fn at(tod: Tod) -> Self {
        VirtualClock { ticks: AtomicI64::new(tod.ticks()) }
    }

    pub fn set(&self, tod: Tod) {
        self.ticks.store(tod.ticks(), Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ticks: i64) {
        self.ticks.fetch_add(delta_ticks, Ordering::SeqCst);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Tod {
        Tod::from_ticks(self.ticks.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_holds_value_until_set() {
        let c = VirtualClock::at(Tod::parse("12:00:00.000").unwrap());
        assert_eq!(c.now(), Tod::parse("12:00:00.000").unwrap());
        c.advance(50_000); // +5s
        assert_eq!(c.now(), Tod::parse("12:00:05.000").unwrap());
    }
}

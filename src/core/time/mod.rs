//! Time source and timer handles
//!
//! The scheduler reads time through [`Clock`] and owns [`Timer`]
//! handles it arms and disarms. Expiry processing belongs to the timer
//! subsystem, which calls back into the scheduler (watchdog tick,
//! round-robin tick, time-partition window switch, sporadic budget).

use portable_atomic::{AtomicU64, Ordering};

use crate::types::Ticks;

/// Monotonic time source
pub trait Clock {
    /// Current monotonic date in ticks
    fn read_monotonic(&self) -> Ticks;

    /// Convert a tick count to nanoseconds
    fn ticks_to_ns(&self, ticks: Ticks) -> u64;

    /// Convert nanoseconds to ticks, rounding down
    fn ns_to_ticks(&self, ns: u64) -> Ticks;
}

/// Clock advanced by hand, for hosts and simulations
pub struct ManualClock {
    now: AtomicU64,
    ns_per_tick: u64,
}

impl ManualClock {
    /// Clock ticking once per nanosecond
    pub const fn new() -> Self {
        Self::with_resolution(1)
    }

    pub const fn with_resolution(ns_per_tick: u64) -> Self {
        ManualClock {
            now: AtomicU64::new(0),
            ns_per_tick,
        }
    }

    /// Move time forward, returning the new date
    pub fn advance(&self, ticks: Ticks) -> Ticks {
        self.now.fetch_add(ticks, Ordering::AcqRel) + ticks
    }

    pub fn set(&self, date: Ticks) {
        self.now.store(date, Ordering::Release);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn read_monotonic(&self) -> Ticks {
        self.now.load(Ordering::Acquire)
    }

    fn ticks_to_ns(&self, ticks: Ticks) -> u64 {
        ticks.saturating_mul(self.ns_per_tick)
    }

    fn ns_to_ticks(&self, ns: u64) -> Ticks {
        ns / self.ns_per_tick.max(1)
    }
}

/// Timer handle owned by the scheduler
///
/// Holds the arming state only; the timer wheel keeps the handle's
/// expiry date in its own queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    name: &'static str,
    date: Option<Ticks>,
    interval: Ticks,
    destroyed: bool,
}

impl Timer {
    pub const fn new(name: &'static str) -> Self {
        Timer {
            name,
            date: None,
            interval: 0,
            destroyed: false,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Arm the timer for `date`, then every `interval` ticks (0 = one-shot)
    pub fn start(&mut self, date: Ticks, interval: Ticks) {
        if self.destroyed {
            crate::fatal!("timer {} started after destruction", self.name);
        }
        self.date = Some(date);
        self.interval = interval;
    }

    pub fn stop(&mut self) {
        self.date = None;
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.date.is_some()
    }

    /// Next expiry date, if armed
    #[inline]
    pub fn date(&self) -> Option<Ticks> {
        self.date
    }

    #[inline]
    pub fn interval(&self) -> Ticks {
        self.interval
    }

    /// Ticks left before expiry at `now`, 0 if disarmed or overdue
    pub fn remaining(&self, now: Ticks) -> Ticks {
        self.date.map_or(0, |date| date.saturating_sub(now))
    }

    /// Account for one expiry: reload a periodic timer, disarm a one-shot
    pub fn expire(&mut self) {
        self.date = match (self.date, self.interval) {
            (Some(date), interval) if interval > 0 => Some(date + interval),
            _ => None,
        };
    }

    /// Disarm for good
    pub fn destroy(&mut self) {
        self.date = None;
        self.destroyed = true;
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

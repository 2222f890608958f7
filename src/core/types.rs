//! Core type definitions for the scheduler core
//!
//! These types provide strong typing for scheduler primitives.

use core::fmt;

use bitflags::bitflags;

use crate::config::CFG_NR_CPUS;

/// Thread priority. Higher value means higher priority within a class;
/// the idle class uses -1.
pub type Prio = i32;

/// Monotonic clock ticks
pub type Ticks = u64;

/// Processor number
pub type CpuId = u8;

/// Nesting counter
pub type NestingCtr = u8;

/// Stable handle of a thread slot in the thread table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThreadId(u16);

impl ThreadId {
    pub(crate) const fn new(index: usize) -> Self {
        ThreadId(index as u16)
    }

    /// Slot index in the thread table
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags! {
    /// Thread state bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ThreadState: u32 {
        /// Forcibly suspended
        const SUSPENDED = 1 << 0;
        /// Sleeping on a synchronization object
        const PENDING   = 1 << 1;
        /// Delayed (timed sleep)
        const DELAYED   = 1 << 2;
        /// Linked to a run queue
        const READY     = 1 << 3;
        /// Not started yet, or stopped
        const DORMANT   = 1 << 4;
        /// Terminated, resources pending release
        const ZOMBIE    = 1 << 5;
        /// In flight between two processors
        const MIGRATE   = 1 << 6;
        /// Holds the scheduler lock
        const LOCK      = 1 << 7;
        /// Root (idle) thread of a processor
        const ROOT      = 1 << 8;
        /// Shadow of a user-mode thread
        const USER      = 1 << 9;
        /// Started at least once
        const STARTED   = 1 << 10;
        /// Round-robin time slicing enabled
        const RRB       = 1 << 11;
        /// Running in relaxed (host-scheduled) mode
        const RELAXED   = 1 << 12;
        /// Held by the debugger
        const HELD      = 1 << 13;
        /// Cancellation requested
        const CANCELD   = 1 << 14;
        /// Forced out of a blocking call (watchdog signal)
        const KICKED    = 1 << 15;

        /// Any reason that keeps a thread off the run queues
        const BLOCK_BITS = Self::SUSPENDED.bits()
            | Self::PENDING.bits()
            | Self::DELAYED.bits()
            | Self::DORMANT.bits()
            | Self::RELAXED.bits()
            | Self::HELD.bits();
    }
}

impl ThreadState {
    /// One-letter status labels, in bit order, for textual listings
    const LABELS: [(ThreadState, char); 11] = [
        (ThreadState::SUSPENDED, 'S'),
        (ThreadState::PENDING, 'W'),
        (ThreadState::DELAYED, 'D'),
        (ThreadState::READY, 'R'),
        (ThreadState::DORMANT, 'U'),
        (ThreadState::ZOMBIE, 'Z'),
        (ThreadState::MIGRATE, 'm'),
        (ThreadState::LOCK, 'l'),
        (ThreadState::RRB, 'r'),
        (ThreadState::RELAXED, 'X'),
        (ThreadState::HELD, 'H'),
    ];

    /// Whether any blocking condition is present
    #[inline]
    pub fn is_blocked(self) -> bool {
        self.intersects(ThreadState::BLOCK_BITS)
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut any = false;
        for (bit, label) in Self::LABELS {
            if self.contains(bit) {
                write!(f, "{}", label)?;
                any = true;
            }
        }
        if !any {
            f.write_str("-")?;
        }
        Ok(())
    }
}

bitflags! {
    /// Per-CPU scheduler context status bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CtxStatus: u8 {
        /// A rescheduling decision is pending
        const RESCHED = 1 << 0;
        /// A context switch is in progress with the lock dropped
        const INSW    = 1 << 1;
        /// The host tick was deferred while real-time work ran
        const HTICK   = 1 << 2;
    }
}

/// Set of processors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CpuMask(u32);

impl CpuMask {
    pub const EMPTY: CpuMask = CpuMask(0);

    /// Mask covering every configured processor
    pub const fn all() -> Self {
        if CFG_NR_CPUS >= 32 {
            CpuMask(u32::MAX)
        } else {
            CpuMask((1u32 << CFG_NR_CPUS) - 1)
        }
    }

    pub const fn of(cpu: CpuId) -> Self {
        CpuMask(1u32 << cpu)
    }

    #[inline]
    pub fn set(&mut self, cpu: CpuId) {
        self.0 |= 1u32 << cpu;
    }

    #[inline]
    pub fn clear(&mut self, cpu: CpuId) {
        self.0 &= !(1u32 << cpu);
    }

    #[inline]
    pub const fn contains(self, cpu: CpuId) -> bool {
        (self.0 & (1u32 << cpu)) != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Iterate over the processors in the mask, lowest first
    pub fn iter(self) -> impl Iterator<Item = CpuId> {
        let bits = self.0;
        (0..32u8).filter(move |cpu| bits & (1u32 << cpu) != 0)
    }
}

/// Watchdog verdict for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WatchdogAction {
    /// The root thread is running; the counter was reset
    Idle,
    /// A real-time thread is running, below threshold
    Counting(u32),
    /// A user-mode runaway thread was sent the watchdog signal
    Signaled(ThreadId),
    /// A kernel runaway thread was cancelled
    Cancelled(ThreadId),
}

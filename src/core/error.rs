//! Error types for the scheduler core
//!
//! Recoverable conditions are reported through [`SchedResult`]. Broken
//! invariants are not errors: they go through [`fatal!`](crate::fatal)
//! and stop the system.

use core::fmt;

/// Scheduler error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum SchedError {
    // ============ Policy errors ============
    /// Priority outside the class range
    InvalidPriority = 1001,
    /// Malformed scheduling parameters
    InvalidParam = 1002,
    /// Time partition does not exist
    InvalidPartition = 1003,
    /// No time-partition schedule installed
    NoSchedule = 1004,
    /// Scheduling class is not registered
    ClassUnavailable = 1005,

    // ============ Thread errors ============
    /// Thread table is full
    NoMoreThreads = 2001,
    /// No thread behind this handle
    NoSuchThread = 2002,
    /// Operation not allowed on this thread (e.g. root thread)
    NotPermitted = 2003,
    /// Target processor is outside the thread affinity
    Affinity = 2004,
    /// Thread is blocked
    Blocked = 2005,

    // ============ Scheduler lock errors ============
    /// Scheduler is not locked
    SchedNotLocked = 3001,
    /// Lock nesting overflow
    LockNestingOvf = 3002,

    // ============ Introspection ============
    /// The thread list changed while being walked
    Again = 4001,
}

/// Result type alias for scheduler operations
pub type SchedResult<T> = Result<T, SchedError>;

impl SchedError {
    /// Numeric code
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SchedError::InvalidPriority => "priority out of range",
            SchedError::InvalidParam => "invalid scheduling parameters",
            SchedError::InvalidPartition => "invalid time partition",
            SchedError::NoSchedule => "no time-partition schedule",
            SchedError::ClassUnavailable => "scheduling class not available",
            SchedError::NoMoreThreads => "thread table full",
            SchedError::NoSuchThread => "no such thread",
            SchedError::NotPermitted => "operation not permitted",
            SchedError::Affinity => "processor outside affinity",
            SchedError::Blocked => "thread is blocked",
            SchedError::SchedNotLocked => "scheduler not locked",
            SchedError::LockNestingOvf => "scheduler lock nesting overflow",
            SchedError::Again => "thread list changed",
        };
        write!(f, "{} ({})", msg, self.code())
    }
}

/// Report a broken scheduler invariant and stop
///
/// Scheduling cannot continue on corrupted state, so this never returns.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        $crate::error!($($arg)*);
        panic!($($arg)*)
    }};
}

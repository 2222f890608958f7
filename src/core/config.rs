//! Compile-time configuration for the scheduler core
//!
//! These constants control the behavior and resource limits of the
//! scheduler. Runtime-tunable settings live in [`SchedConfig`].

use crate::types::{CpuId, Prio, Ticks};

/// Number of processors managed by the scheduler
pub const CFG_NR_CPUS: usize = 4;

/// Capacity of the thread table, root threads included
pub const CFG_MAX_THREADS: usize = 32;

/// Number of priority levels a run queue can index
pub const CFG_MLQ_LEVELS: usize = 128;

/// Distance between two consecutive class weights
pub const CFG_CLASS_WEIGHT_FACTOR: Prio = 1024;

/// Priority of the per-CPU root thread
pub const CFG_IDLE_PRIO: Prio = -1;

/// Real-time class priority range
pub const CFG_RT_MIN_PRIO: Prio = 0;
pub const CFG_RT_MAX_PRIO: Prio = 99;

/// Weak class priority range
pub const CFG_WEAK_MIN_PRIO: Prio = 0;
pub const CFG_WEAK_MAX_PRIO: Prio = 99;

/// Number of time partitions per processor
pub const CFG_TP_PARTITIONS: usize = 4;

/// Maximum number of windows in a time-partition schedule
pub const CFG_TP_MAX_WINDOWS: usize = 16;

/// Maximum pending replenishments per sporadic thread
pub const CFG_SPORADIC_MAX_REPL: usize = 8;

/// Watchdog timeout in seconds
pub const CFG_WATCHDOG_TIMEOUT_SECS: u32 = 4;

/// Watchdog timer period, in nanoseconds
pub const CFG_WATCHDOG_PERIOD_NS: u64 = 1_000_000_000;

/// Default round-robin quantum, in clock ticks
pub const CFG_RR_QUANTUM_DEFAULT: Ticks = 10;

/// Maximum length of a thread name
pub const CFG_THREAD_NAME_LEN: usize = 32;

/// Runtime scheduler settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    /// Number of processors to bring up, at most [`CFG_NR_CPUS`]
    pub nr_cpus: usize,
    /// Watchdog threshold, in watchdog ticks (seconds)
    pub watchdog_timeout: u32,
    /// The context switch code runs with the scheduler lock dropped
    pub unlocked_switch: bool,
}

impl SchedConfig {
    pub const fn new() -> Self {
        SchedConfig {
            nr_cpus: CFG_NR_CPUS,
            watchdog_timeout: CFG_WATCHDOG_TIMEOUT_SECS,
            unlocked_switch: crate::port::UNLOCKED_SWITCH,
        }
    }

    /// Whether `cpu` is one of the configured processors
    #[inline]
    pub const fn has_cpu(&self, cpu: CpuId) -> bool {
        (cpu as usize) < self.nr_cpus
    }
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self::new()
    }
}

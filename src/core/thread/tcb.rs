//! Thread control block
//!
//! The TCB holds everything the scheduler knows about a thread. Queue
//! linkage is not here: run queues keep it in their own side tables.

use heapless::String;

use crate::config::{CFG_RR_QUANTUM_DEFAULT, CFG_THREAD_NAME_LEN};
use crate::sched::class::{SchedClass, SporadicState};
use crate::time::Timer;
use crate::types::{CpuId, CpuMask, NestingCtr, Prio, ThreadState, Ticks};

/// Execution statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadStat {
    /// Context switches into this thread
    pub csw: u32,
    /// Total execution time
    pub account_total: Ticks,
    /// Start of the current observation period
    pub lastperiod_start: Ticks,
    /// Execution time at the start of the current observation period
    pub lastperiod_total: Ticks,
}

/// Thread Control Block
#[derive(Debug, Clone)]
pub struct Thread {
    // ============ Identification ============
    pub(crate) name: String<CFG_THREAD_NAME_LEN>,
    /// Host process the thread shadows, if any
    pub(crate) host_pid: Option<i32>,

    // ============ State ============
    pub(crate) state: ThreadState,
    /// Scheduler lock nesting
    pub(crate) lock_count: NestingCtr,

    // ============ Priority ============
    /// Base priority
    pub(crate) bprio: Prio,
    /// Current priority
    pub(crate) cprio: Prio,
    /// Weighted priority
    pub(crate) wprio: Prio,

    // ============ Scheduling ============
    pub(crate) sched_class: SchedClass,
    /// Class to restore when a priority boost ends
    pub(crate) base_class: Option<SchedClass>,
    /// Owning processor
    pub(crate) sched: CpuId,
    pub(crate) affinity: CpuMask,

    // ============ Time slicing ============
    pub(crate) rrperiod: Ticks,
    /// Round-robin credit left
    pub(crate) rrcredit: Ticks,

    // ============ Timers ============
    /// Resource timeout
    pub(crate) rtimer: Timer,
    /// Periodic release
    pub(crate) ptimer: Timer,

    // ============ Class private data ============
    pub(crate) tp_partition: Option<u8>,
    pub(crate) pss: Option<SporadicState>,

    // ============ Statistics ============
    pub(crate) stat: ThreadStat,
}

impl Thread {
    /// Dormant thread owned by `cpu`, not yet attached to a class
    pub(crate) fn new(name: &str, cpu: CpuId, affinity: CpuMask) -> Self {
        let mut tname = String::new();
        for c in name.chars() {
            if tname.push(c).is_err() {
                break;
            }
        }

        Thread {
            name: tname,
            host_pid: None,
            state: ThreadState::DORMANT,
            lock_count: 0,
            bprio: 0,
            cprio: 0,
            wprio: 0,
            sched_class: SchedClass::Idle,
            base_class: None,
            sched: cpu,
            affinity,
            rrperiod: CFG_RR_QUANTUM_DEFAULT,
            rrcredit: CFG_RR_QUANTUM_DEFAULT,
            rtimer: Timer::new("[rtimer]"),
            ptimer: Timer::new("[ptimer]"),
            tp_partition: None,
            pss: None,
            stat: ThreadStat::default(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn state(&self) -> ThreadState {
        self.state
    }

    #[inline]
    pub fn bprio(&self) -> Prio {
        self.bprio
    }

    #[inline]
    pub fn cprio(&self) -> Prio {
        self.cprio
    }

    #[inline]
    pub fn wprio(&self) -> Prio {
        self.wprio
    }

    #[inline]
    pub fn class(&self) -> SchedClass {
        self.sched_class
    }

    #[inline]
    pub fn base_class(&self) -> SchedClass {
        self.base_class.unwrap_or(self.sched_class)
    }

    #[inline]
    pub fn cpu(&self) -> CpuId {
        self.sched
    }

    #[inline]
    pub fn affinity(&self) -> CpuMask {
        self.affinity
    }

    #[inline]
    pub fn host_pid(&self) -> Option<i32> {
        self.host_pid
    }

    #[inline]
    pub fn rr_period(&self) -> Ticks {
        self.rrperiod
    }

    #[inline]
    pub fn stat(&self) -> &ThreadStat {
        &self.stat
    }

    pub fn tp_partition(&self) -> Option<u8> {
        self.tp_partition
    }

    pub fn sporadic(&self) -> Option<&SporadicState> {
        self.pss.as_ref()
    }

    pub fn resource_timer(&self) -> &Timer {
        &self.rtimer
    }

    pub fn periodic_timer(&self) -> &Timer {
        &self.ptimer
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.state.contains(ThreadState::ROOT)
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.state.is_blocked()
    }

    #[inline]
    pub fn is_zombie(&self) -> bool {
        self.state.contains(ThreadState::ZOMBIE)
    }

    /// Recompute the weighted priority from the class and current priority
    #[inline]
    pub(crate) fn update_wprio(&mut self) {
        self.wprio = self.cprio + self.sched_class.weight();
    }

    pub(crate) fn stop_timers(&mut self) {
        self.rtimer.stop();
        self.ptimer.stop();
        if let Some(pss) = self.pss.as_mut() {
            pss.stop_timers();
        }
    }
}

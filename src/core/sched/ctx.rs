//! Per-CPU scheduler context
//!
//! One context per processor, created at startup and destroyed at
//! shutdown. It owns the run queues of every class for that processor,
//! the running thread, the zombie slot and the timers the scheduler
//! arms on that processor.

use crate::config::{CFG_RT_MAX_PRIO, CFG_RT_MIN_PRIO, CFG_WEAK_MAX_PRIO, CFG_WEAK_MIN_PRIO};
use crate::time::Timer;
use crate::types::{CpuId, CpuMask, CtxStatus, ThreadId, Ticks};

use super::class::TpRq;
use super::runq::RunQueue;

/// Scheduler state of one processor
#[derive(Debug, Clone)]
pub struct SchedCtx {
    pub(crate) cpu: CpuId,
    pub(crate) status: CtxStatus,

    // ============ Threads ============
    /// Running thread, the root thread when nothing else runs
    pub(crate) curr: ThreadId,
    /// Root (idle) thread of this processor
    pub(crate) root: ThreadId,
    /// Thread switched away from, until the switch is finished
    pub(crate) last: Option<ThreadId>,
    /// Terminated thread waiting for finalization
    pub(crate) zombie: Option<ThreadId>,

    // ============ Watchdog ============
    pub(crate) wdcount: u32,

    // ============ SMP ============
    /// Processors this one asked to reschedule
    pub(crate) resched: CpuMask,

    // ============ Run queues ============
    pub(crate) rt: RunQueue,
    pub(crate) weak: RunQueue,
    pub(crate) sporadic: RunQueue,
    pub(crate) tp: TpRq,

    // ============ Timers ============
    /// Host tick relay
    pub(crate) htimer: Timer,
    pub(crate) wdtimer: Timer,
    /// Round-robin quantum of the running thread
    pub(crate) rrbtimer: Timer,

    /// Date of the last execution time accounting
    pub(crate) last_account_switch: Ticks,
}

impl SchedCtx {
    pub(crate) fn new(cpu: CpuId, root: ThreadId) -> Self {
        SchedCtx {
            cpu,
            status: CtxStatus::empty(),
            curr: root,
            root,
            last: None,
            zombie: None,
            wdcount: 0,
            resched: CpuMask::EMPTY,
            rt: RunQueue::new(CFG_RT_MIN_PRIO, CFG_RT_MAX_PRIO),
            weak: RunQueue::new(CFG_WEAK_MIN_PRIO, CFG_WEAK_MAX_PRIO),
            sporadic: RunQueue::new(CFG_RT_MIN_PRIO, CFG_RT_MAX_PRIO),
            tp: TpRq::new(),
            htimer: Timer::new("[host-timer]"),
            wdtimer: Timer::new("[watchdog]"),
            rrbtimer: Timer::new("[rrb]"),
            last_account_switch: 0,
        }
    }

    #[inline]
    pub fn cpu(&self) -> CpuId {
        self.cpu
    }

    #[inline]
    pub fn status(&self) -> CtxStatus {
        self.status
    }

    #[inline]
    pub fn curr(&self) -> ThreadId {
        self.curr
    }

    #[inline]
    pub fn root(&self) -> ThreadId {
        self.root
    }

    #[inline]
    pub fn last(&self) -> Option<ThreadId> {
        self.last
    }

    #[inline]
    pub fn zombie(&self) -> Option<ThreadId> {
        self.zombie
    }

    #[inline]
    pub fn watchdog_count(&self) -> u32 {
        self.wdcount
    }

    #[inline]
    pub fn resched_mask(&self) -> CpuMask {
        self.resched
    }

    #[inline]
    pub fn resched_pending(&self) -> bool {
        self.status.contains(CtxStatus::RESCHED)
    }

    #[inline]
    pub fn in_switch(&self) -> bool {
        self.status.contains(CtxStatus::INSW)
    }

    pub fn rt_queue(&self) -> &RunQueue {
        &self.rt
    }

    pub fn weak_queue(&self) -> &RunQueue {
        &self.weak
    }

    pub fn sporadic_queue(&self) -> &RunQueue {
        &self.sporadic
    }

    pub fn tp(&self) -> &TpRq {
        &self.tp
    }

    pub fn watchdog_timer(&self) -> &Timer {
        &self.wdtimer
    }

    pub fn host_timer(&self) -> &Timer {
        &self.htimer
    }

    pub fn rr_timer(&self) -> &Timer {
        &self.rrbtimer
    }

    /// Whether `tid` sits in any run queue of this processor
    pub fn is_queued(&self, tid: ThreadId) -> bool {
        self.rt.contains(tid)
            || self.weak.contains(tid)
            || self.sporadic.contains(tid)
            || self.tp.partitions.iter().any(|q| q.contains(tid))
    }

    /// Threads waiting in the run queues of this processor
    pub fn nr_queued(&self) -> usize {
        self.rt.len()
            + self.weak.len()
            + self.sporadic.len()
            + self.tp.partitions.iter().map(RunQueue::len).sum::<usize>()
    }

    /// Every run queue keeps its bitmap in sync with its buckets
    pub fn queues_consistent(&self) -> bool {
        self.rt.is_consistent()
            && self.weak.is_consistent()
            && self.sporadic.is_consistent()
            && self.tp.partitions.iter().all(RunQueue::is_consistent)
    }
}

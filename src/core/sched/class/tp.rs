//! Time-partitioned class
//!
//! Each processor runs a cyclic schedule of windows. A window grants
//! the processor to one partition (or to nobody, letting lower classes
//! run); only threads of the active partition are eligible.

use heapless::Vec;

use crate::config::{CFG_RT_MAX_PRIO, CFG_RT_MIN_PRIO, CFG_TP_MAX_WINDOWS, CFG_TP_PARTITIONS};
use crate::error::{SchedError, SchedResult};
use crate::thread::Thread;
use crate::time::Timer;
use crate::types::{CpuId, Ticks, ThreadId};

use super::super::ctx::SchedCtx;
use super::super::runq::RunQueue;
use super::{check_prio, ClassOps, PolicyParam, SchedClass};

/// One window of a partition schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpWindow {
    /// Start offset from the beginning of the major frame
    pub offset: Ticks,
    /// Partition granted the processor, `None` for an idle window
    pub ptid: Option<u8>,
}

/// Per-CPU time-partition state
#[derive(Debug, Clone)]
pub struct TpRq {
    pub(crate) partitions: [RunQueue; CFG_TP_PARTITIONS],
    windows: Vec<TpWindow, CFG_TP_MAX_WINDOWS>,
    /// Major frame length
    duration: Ticks,
    /// Index of the running window
    wcur: usize,
    /// Date the current major frame started
    frame_start: Ticks,
    /// Window switch timer
    pub(crate) timer: Timer,
}

impl TpRq {
    pub const fn new() -> Self {
        const Q: RunQueue = RunQueue::new(CFG_RT_MIN_PRIO, CFG_RT_MAX_PRIO);
        TpRq {
            partitions: [Q; CFG_TP_PARTITIONS],
            windows: Vec::new(),
            duration: 0,
            wcur: 0,
            frame_start: 0,
            timer: Timer::new("[tp-tick]"),
        }
    }

    /// Partition currently granted the processor
    pub fn active_partition(&self) -> Option<usize> {
        self.windows
            .get(self.wcur)
            .and_then(|w| w.ptid)
            .map(usize::from)
    }

    #[inline]
    pub fn has_schedule(&self) -> bool {
        !self.windows.is_empty()
    }

    pub fn windows(&self) -> &[TpWindow] {
        &self.windows
    }

    /// Validate a schedule without installing it
    pub fn check_schedule(windows: &[TpWindow], duration: Ticks) -> SchedResult<()> {
        if windows.is_empty() || windows.len() > CFG_TP_MAX_WINDOWS {
            return Err(SchedError::InvalidParam);
        }
        if windows[0].offset != 0 {
            return Err(SchedError::InvalidParam);
        }
        for pair in windows.windows(2) {
            if pair[1].offset <= pair[0].offset {
                return Err(SchedError::InvalidParam);
            }
        }
        if windows[windows.len() - 1].offset >= duration {
            return Err(SchedError::InvalidParam);
        }
        if windows
            .iter()
            .any(|w| matches!(w.ptid, Some(p) if p as usize >= CFG_TP_PARTITIONS))
        {
            return Err(SchedError::InvalidPartition);
        }
        Ok(())
    }

    /// Install a validated schedule starting at `now`
    pub(crate) fn install(&mut self, windows: &[TpWindow], duration: Ticks, now: Ticks) {
        self.windows.clear();
        for w in windows {
            // Capacity was checked by check_schedule().
            let _ = self.windows.push(*w);
        }
        self.duration = duration;
        self.wcur = 0;
        self.frame_start = now;
        self.arm_next();
    }

    /// Drop the schedule; no partition is active afterwards
    pub(crate) fn uninstall(&mut self) {
        self.windows.clear();
        self.duration = 0;
        self.wcur = 0;
        self.timer.stop();
    }

    /// Switch to the next window, returning the now active partition
    pub(crate) fn advance(&mut self) -> Option<usize> {
        if self.windows.is_empty() {
            return None;
        }
        self.wcur += 1;
        if self.wcur == self.windows.len() {
            self.wcur = 0;
            self.frame_start += self.duration;
        }
        self.arm_next();
        self.active_partition()
    }

    fn arm_next(&mut self) {
        let end = match self.windows.get(self.wcur + 1) {
            Some(next) => next.offset,
            None => self.duration,
        };
        self.timer.start(self.frame_start + end, 0);
    }

    fn queue(&mut self, thread: &Thread) -> &mut RunQueue {
        match thread.tp_partition {
            Some(ptid) => &mut self.partitions[ptid as usize],
            None => crate::fatal!("tp thread without partition"),
        }
    }
}

impl Default for TpRq {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct TpClass;

impl ClassOps for TpClass {
    fn enqueue(&self, ctx: &mut SchedCtx, tid: ThreadId, thread: &Thread) {
        ctx.tp.queue(thread).insert_back(tid, thread.cprio);
    }

    fn dequeue(&self, ctx: &mut SchedCtx, tid: ThreadId, thread: &Thread) {
        ctx.tp.queue(thread).remove(tid);
    }

    fn requeue(&self, ctx: &mut SchedCtx, tid: ThreadId, thread: &Thread) {
        ctx.tp.queue(thread).insert_front(tid, thread.cprio);
    }

    fn pick(&self, ctx: &mut SchedCtx) -> Option<ThreadId> {
        let ptid = ctx.tp.active_partition()?;
        ctx.tp.partitions[ptid].pop_highest()
    }

    fn declare(&self, _thread: &Thread, param: &PolicyParam) -> SchedResult<()> {
        match *param {
            PolicyParam::Tp { prio, ptid } => {
                if ptid < 0 || ptid as usize >= CFG_TP_PARTITIONS {
                    return Err(SchedError::InvalidPartition);
                }
                check_prio(SchedClass::Tp, prio)
            }
            _ => Err(SchedError::InvalidParam),
        }
    }

    fn setparam(&self, thread: &mut Thread, param: &PolicyParam) {
        if let PolicyParam::Tp { prio, ptid } = *param {
            thread.tp_partition = Some(ptid as u8);
            thread.cprio = prio;
        }
    }

    fn getparam(&self, thread: &Thread) -> PolicyParam {
        PolicyParam::Tp {
            prio: thread.cprio,
            ptid: thread.tp_partition.map_or(-1, i32::from),
        }
    }

    // Priority inheritance never moves a TP thread to another partition.
    // A thread boosted in from another class borrows the partition of
    // the thread it inherits from.
    fn trackprio(&self, thread: &mut Thread, param: Option<&PolicyParam>) {
        match param {
            Some(&PolicyParam::Tp { prio, ptid }) => {
                if thread.tp_partition.is_none() && ptid >= 0 {
                    thread.tp_partition = Some(ptid as u8);
                }
                thread.cprio = prio;
            }
            Some(p) => thread.cprio = p.prio(),
            None => thread.cprio = thread.bprio,
        }
    }

    fn forget(&self, thread: &mut Thread) {
        thread.tp_partition = None;
    }

    // A partition schedule is a per-CPU property; it cannot follow a
    // thread to another processor, so the thread becomes plain RT.
    fn migrate(&self, thread: &Thread, _dest: CpuId) -> Option<(SchedClass, PolicyParam)> {
        Some((SchedClass::Rt, PolicyParam::Rt { prio: thread.cprio }))
    }
}

//! Fixed-priority real-time class
//!
//! FIFO within a priority level; threads with round-robin enabled are
//! rotated to the back of their level when their quantum expires.

use crate::error::{SchedError, SchedResult};
use crate::thread::Thread;
use crate::types::ThreadId;

use super::super::ctx::SchedCtx;
use super::{check_prio, ClassOps, PolicyParam, SchedClass};

pub(crate) struct RtClass;

impl ClassOps for RtClass {
    fn enqueue(&self, ctx: &mut SchedCtx, tid: ThreadId, thread: &Thread) {
        ctx.rt.insert_back(tid, thread.cprio);
    }

    fn dequeue(&self, ctx: &mut SchedCtx, tid: ThreadId, _thread: &Thread) {
        ctx.rt.remove(tid);
    }

    fn requeue(&self, ctx: &mut SchedCtx, tid: ThreadId, thread: &Thread) {
        ctx.rt.insert_front(tid, thread.cprio);
    }

    fn pick(&self, ctx: &mut SchedCtx) -> Option<ThreadId> {
        ctx.rt.pop_highest()
    }

    fn declare(&self, _thread: &Thread, param: &PolicyParam) -> SchedResult<()> {
        match param {
            PolicyParam::Rt { prio } => check_prio(SchedClass::Rt, *prio),
            _ => Err(SchedError::InvalidParam),
        }
    }

    fn setparam(&self, thread: &mut Thread, param: &PolicyParam) {
        thread.cprio = param.prio();
    }

    fn getparam(&self, thread: &Thread) -> PolicyParam {
        PolicyParam::Rt { prio: thread.cprio }
    }

    fn round_robin(&self) -> bool {
        true
    }
}

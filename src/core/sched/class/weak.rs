//! Weak class: threads scheduled by the real-time core below any
//! real-time class, typically shadows of regular host threads.

use crate::error::{SchedError, SchedResult};
use crate::thread::Thread;
use crate::types::ThreadId;

use super::super::ctx::SchedCtx;
use super::{check_prio, ClassOps, PolicyParam, SchedClass};

pub(crate) struct WeakClass;

impl ClassOps for WeakClass {
    fn enqueue(&self, ctx: &mut SchedCtx, tid: ThreadId, thread: &Thread) {
        ctx.weak.insert_back(tid, thread.cprio);
    }

    fn dequeue(&self, ctx: &mut SchedCtx, tid: ThreadId, _thread: &Thread) {
        ctx.weak.remove(tid);
    }

    fn requeue(&self, ctx: &mut SchedCtx, tid: ThreadId, thread: &Thread) {
        ctx.weak.insert_front(tid, thread.cprio);
    }

    fn pick(&self, ctx: &mut SchedCtx) -> Option<ThreadId> {
        ctx.weak.pop_highest()
    }

    fn declare(&self, _thread: &Thread, param: &PolicyParam) -> SchedResult<()> {
        match param {
            PolicyParam::Weak { prio } => check_prio(SchedClass::Weak, *prio),
            _ => Err(SchedError::InvalidParam),
        }
    }

    fn setparam(&self, thread: &mut Thread, param: &PolicyParam) {
        thread.cprio = param.prio();
    }

    fn getparam(&self, thread: &Thread) -> PolicyParam {
        PolicyParam::Weak { prio: thread.cprio }
    }

    fn round_robin(&self) -> bool {
        true
    }
}

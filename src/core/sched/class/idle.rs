//! Idle class: the per-CPU root thread

use crate::config::CFG_IDLE_PRIO;
use crate::error::{SchedError, SchedResult};
use crate::thread::Thread;
use crate::types::ThreadId;

use super::super::ctx::SchedCtx;
use super::{ClassOps, PolicyParam};

pub(crate) struct IdleClass;

impl ClassOps for IdleClass {
    // The root thread is never linked to a queue: it is always available.
    fn enqueue(&self, _ctx: &mut SchedCtx, _tid: ThreadId, _thread: &Thread) {}

    fn dequeue(&self, _ctx: &mut SchedCtx, _tid: ThreadId, _thread: &Thread) {}

    fn requeue(&self, _ctx: &mut SchedCtx, _tid: ThreadId, _thread: &Thread) {}

    fn pick(&self, ctx: &mut SchedCtx) -> Option<ThreadId> {
        Some(ctx.root)
    }

    fn declare(&self, thread: &Thread, param: &PolicyParam) -> SchedResult<()> {
        if !thread.is_root() {
            return Err(SchedError::NotPermitted);
        }
        match param {
            PolicyParam::Idle { prio } if *prio == CFG_IDLE_PRIO => Ok(()),
            PolicyParam::Idle { .. } => Err(SchedError::InvalidPriority),
            _ => Err(SchedError::InvalidParam),
        }
    }

    fn setparam(&self, thread: &mut Thread, param: &PolicyParam) {
        thread.cprio = param.prio();
    }

    fn getparam(&self, thread: &Thread) -> PolicyParam {
        PolicyParam::Idle { prio: thread.cprio }
    }

    // Boosting the root thread while it holds a resource wanted by a
    // real-time thread is done through its class switch, not its priority.
    fn trackprio(&self, thread: &mut Thread, _param: Option<&PolicyParam>) {
        thread.cprio = CFG_IDLE_PRIO;
    }
}

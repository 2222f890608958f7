//! Runaway thread watchdog
//!
//! The watchdog timer of each processor ticks once per second. Each tick
//! that finds a real-time thread running instead of the root thread
//! counts; reaching the threshold evicts the thread.

use crate::kernel::Nucleus;
use crate::types::{CpuId, ThreadState, WatchdogAction};

impl Nucleus {
    /// Watchdog timer of `cpu` expired
    ///
    /// A user-mode thread is kicked out of its real-time loop with a
    /// signal and keeps running. A kernel thread is cancelled.
    pub fn watchdog_tick(&mut self, cpu: CpuId) -> WatchdogAction {
        let ctx = self.ctx_mut(cpu);
        ctx.wdtimer.expire();
        let curr = ctx.curr;

        if self.threads.thread(curr).is_root() {
            self.ctx_mut(cpu).wdcount = 0;
            return WatchdogAction::Idle;
        }

        let timeout = self.watchdog_timeout();
        let ctx = self.ctx_mut(cpu);
        ctx.wdcount += 1;
        if ctx.wdcount < timeout {
            return WatchdogAction::Counting(ctx.wdcount);
        }
        ctx.wdcount = 0;

        let thread = self.threads.thread_mut(curr);
        let user = thread.state.contains(ThreadState::USER);
        if user {
            thread.state.insert(ThreadState::KICKED);
            crate::warn!("watchdog triggered on cpu {}, signaling runaway thread {}", cpu, curr);
            return WatchdogAction::Signaled(curr);
        }

        thread.state.insert(ThreadState::CANCELD);
        crate::warn!("watchdog triggered on cpu {}, cancelling runaway thread {}", cpu, curr);
        if let Err(_err) = self.delete_thread(curr) {
            crate::error!("watchdog failed to cancel {}: {}", curr, _err);
        }
        WatchdogAction::Cancelled(curr)
    }
}

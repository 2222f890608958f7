//! Thread migration between processors
//!
//! Ownership moves by rewriting the owning processor of the thread
//! under the scheduler lock, so a thread belongs to exactly one context
//! at any time. What differs between the two flavours is when the
//! thread reaches the run queue of its new owner.

use crate::error::{SchedError, SchedResult};
use crate::kernel::Nucleus;
use crate::types::{CpuId, ThreadId, ThreadState};

impl Nucleus {
    /// Move a runnable thread to processor `dest`
    ///
    /// When `tid` runs on its processor and the port switches contexts
    /// with the lock dropped, the thread is only marked in flight: it
    /// joins the destination queue in [`finish_switch`](Nucleus::finish_switch)
    /// once it is off its stack. Otherwise it is queued on `dest` right
    /// away. Either way the source processor must reschedule.
    pub fn migrate(&mut self, tid: ThreadId, dest: CpuId) -> SchedResult<()> {
        if !self.migration_allowed(tid, dest)? {
            return Ok(());
        }
        if self.switching_out(tid) {
            return Err(SchedError::NotPermitted);
        }
        if self.threads.thread(tid).is_blocked() {
            return Err(SchedError::Blocked);
        }

        let source = self.transfer(tid, dest);
        let running = self.cpus[source as usize].curr == tid;

        if running && self.config.unlocked_switch {
            self.threads.thread_mut(tid).state.insert(ThreadState::MIGRATE);
        } else {
            self.putback(tid);
        }
        crate::debug!("thread {} migrating {} -> {}", tid, source, dest);
        Ok(())
    }

    /// Move a thread that is not running to processor `dest`
    ///
    /// A blocked thread only changes owner; it is queued on `dest` when
    /// it wakes up. A thread still on a processor, even blocked and
    /// about to be switched out, cannot move this way.
    pub fn migrate_passive(&mut self, tid: ThreadId, dest: CpuId) -> SchedResult<()> {
        if !self.migration_allowed(tid, dest)? {
            return Ok(());
        }
        let running = self.cpus.iter().any(|ctx| ctx.curr == tid);
        if running || self.switching_out(tid) {
            return Err(SchedError::NotPermitted);
        }

        let _source = self.transfer(tid, dest);

        let thread = self.threads.thread_mut(tid);
        if !thread.is_blocked() {
            thread.state.insert(ThreadState::READY);
            self.requeue(tid);
            self.resched(dest);
        }
        crate::debug!("thread {} moved {} -> {}", tid, _source, dest);
        Ok(())
    }

    /// Common checks; `Ok(false)` means there is nothing to do
    fn migration_allowed(&self, tid: ThreadId, dest: CpuId) -> SchedResult<bool> {
        let thread = self.threads.get(tid).ok_or(SchedError::NoSuchThread)?;
        if !self.config.has_cpu(dest) {
            return Err(SchedError::InvalidParam);
        }
        if thread.is_root() || thread.is_zombie() {
            return Err(SchedError::NotPermitted);
        }
        if thread.state.contains(ThreadState::MIGRATE) {
            return Err(SchedError::NotPermitted);
        }
        if !thread.affinity.contains(dest) {
            return Err(SchedError::Affinity);
        }
        Ok(thread.sched != dest)
    }

    /// Whether a processor is still saving the context of `tid`
    fn switching_out(&self, tid: ThreadId) -> bool {
        self.cpus
            .iter()
            .any(|ctx| ctx.in_switch() && ctx.last == Some(tid))
    }

    /// Unqueue `tid`, let its class react, then hand it to `dest`.
    /// Returns the source processor.
    fn transfer(&mut self, tid: ThreadId, dest: CpuId) -> CpuId {
        let thread = self.threads.thread(tid);
        let source = thread.sched;

        if thread.state.contains(ThreadState::READY) {
            self.dequeue(tid);
            self.threads.thread_mut(tid).state.remove(ThreadState::READY);
        }

        let thread = self.threads.thread(tid);
        if let Some((class, param)) = thread.sched_class.ops().migrate(thread, dest) {
            if let Err(err) = self.set_policy(tid, class, &param) {
                crate::fatal!("thread {} cannot switch to {} on migration: {}", tid, class, err);
            }
        }

        self.resched(source);
        self.threads.thread_mut(tid).sched = dest;
        source
    }

    /// Check the cross-structure scheduler invariants
    ///
    /// Every run queue bitmap matches its buckets; a thread is flagged
    /// READY iff it sits in exactly one run queue, the one of its owning
    /// processor; no thread runs on two processors.
    pub fn is_consistent(&self) -> bool {
        if !self.cpus.iter().all(|ctx| ctx.queues_consistent()) {
            return false;
        }

        for (tid, thread) in self.threads.iter() {
            let running = self.cpus.iter().filter(|ctx| ctx.curr == tid).count();
            if running > 1 {
                return false;
            }
            if thread.is_root() {
                continue;
            }

            let queued = self.cpus.iter().filter(|ctx| ctx.is_queued(tid)).count();
            let expected = usize::from(thread.state.contains(ThreadState::READY));
            if queued != expected {
                return false;
            }
            if queued == 1 && !self.cpus[thread.sched as usize].is_queued(tid) {
                return false;
            }
            if thread.state.contains(ThreadState::MIGRATE) && queued != 0 {
                return false;
            }
        }
        true
    }
}

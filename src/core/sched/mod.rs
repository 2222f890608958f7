//! Scheduler module
//!
//! Per-CPU dispatching across scheduling classes. Every operation here
//! is a method of [`Nucleus`], so it can only run with the scheduler
//! lock held and local interrupts off.
//!
//! A context switch is a two-step affair: [`Nucleus::schedule`] picks
//! the next thread and records the switch, then the port code switches
//! stacks and calls [`Nucleus::finish_switch`], which completes what
//! could not be done while the outgoing thread was still live (reaping
//! a zombie, queueing a thread that migrated while switching out).

pub mod class;
mod ctx;
mod introspect;
mod migrate;
mod rdy_list;
mod registry;
mod runq;
#[cfg(feature = "watchdog")]
mod watchdog;

pub use class::{
    PolicyParam, Replenishment, SchedClass, SporadicParam, SporadicState, TpRq, TpWindow,
};
pub use ctx::SchedCtx;
pub use introspect::{ThreadIter, ThreadSnapshot, ThreadStatIter, ThreadStatSnapshot};
pub use rdy_list::{QLink, ReadyList};
pub use registry::{ClassInfo, ClassRegistry};
pub use runq::RunQueue;

use crate::error::{SchedError, SchedResult};
use crate::kernel::Nucleus;
use crate::thread::Thread;
use crate::types::{CpuId, CpuMask, CtxStatus, Prio, ThreadId, ThreadState, Ticks};

/// A context switch decided by [`Nucleus::schedule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchFrame {
    pub cpu: CpuId,
    pub prev: ThreadId,
    pub next: ThreadId,
}

impl Nucleus {
    // ============ Queue plumbing ============

    /// Link `tid` to the run queue of its class on its processor
    pub(crate) fn enqueue(&mut self, tid: ThreadId) {
        let thread = self.threads.thread(tid);
        let ctx = &mut self.cpus[thread.sched as usize];
        thread.sched_class.ops().enqueue(ctx, tid, thread);
    }

    pub(crate) fn dequeue(&mut self, tid: ThreadId) {
        let thread = self.threads.thread(tid);
        let ctx = &mut self.cpus[thread.sched as usize];
        thread.sched_class.ops().dequeue(ctx, tid, thread);
    }

    pub(crate) fn requeue(&mut self, tid: ThreadId) {
        let thread = self.threads.thread(tid);
        let ctx = &mut self.cpus[thread.sched as usize];
        thread.sched_class.ops().requeue(ctx, tid, thread);
    }

    /// Requeue a runnable thread at the back of its level and ask its
    /// processor to reschedule
    pub fn putback(&mut self, tid: ThreadId) {
        let thread = self.threads.thread_mut(tid);
        let queued = thread.state.contains(ThreadState::READY);
        thread.state.insert(ThreadState::READY);
        let cpu = thread.sched;

        if queued {
            self.dequeue(tid);
        }
        self.enqueue(tid);
        self.resched(cpu);
    }

    // ============ Reschedule requests ============

    /// Mark `target` for rescheduling on behalf of `here`
    ///
    /// A remote target is also recorded in the IPI mask of `here`.
    pub fn set_resched(&mut self, here: CpuId, target: CpuId) {
        self.ctx_mut(target).status.insert(CtxStatus::RESCHED);
        #[cfg(feature = "smp")]
        if here != target {
            self.ctx_mut(here).resched.set(target);
        }
        #[cfg(not(feature = "smp"))]
        let _ = here;
    }

    /// Reschedule request issued from the calling processor
    pub(crate) fn resched(&mut self, target: CpuId) {
        let here = crate::port::cpu_id();
        let here = if self.config.has_cpu(here) { here } else { target };
        self.set_resched(here, target);
    }

    /// Take the set of processors `cpu` owes a reschedule IPI
    pub fn take_ipi_mask(&mut self, cpu: CpuId) -> CpuMask {
        core::mem::take(&mut self.ctx_mut(cpu).resched)
    }

    /// Kick every processor `cpu` asked to reschedule
    pub fn send_ipis(&mut self, cpu: CpuId) {
        let mask = self.take_ipi_mask(cpu);
        if !mask.is_empty() {
            crate::port::send_resched_ipi(mask);
        }
    }

    // ============ Dispatch ============

    /// Elect the thread that should run next on `cpu`
    ///
    /// The running thread stays a candidate unless it blocked or died;
    /// a thread holding the scheduler lock keeps the processor and the
    /// decision is deferred until it unlocks.
    pub fn pick_next(&mut self, cpu: CpuId) -> ThreadId {
        let curr = self.ctx_mut(cpu).curr;
        let thread = self.threads.thread(curr);

        if !thread.state.intersects(ThreadState::BLOCK_BITS | ThreadState::ZOMBIE) {
            if thread.state.contains(ThreadState::LOCK) {
                self.set_resched(cpu, cpu);
                return curr;
            }
            // In flight threads are queued by their destination
            let in_flight = thread.state.contains(ThreadState::MIGRATE) || thread.sched != cpu;
            if !thread.state.contains(ThreadState::READY) && !in_flight {
                self.requeue(curr);
                self.threads.thread_mut(curr).state.insert(ThreadState::READY);
            }
        }

        let ctx = &mut self.cpus[cpu as usize];
        for class in self.registry.iter_by_weight() {
            if let Some(tid) = class.ops().pick(ctx) {
                self.threads.thread_mut(tid).state.remove(ThreadState::READY);
                return tid;
            }
        }

        crate::fatal!("no runnable thread on cpu {}", cpu)
    }

    /// Run a scheduling decision on `cpu`
    ///
    /// Returns the switch to perform, or `None` when the running thread
    /// keeps the processor. The switch must be completed with
    /// [`finish_switch`](Nucleus::finish_switch).
    pub fn schedule(&mut self, cpu: CpuId) -> Option<SwitchFrame> {
        let ctx = self.ctx_mut(cpu);
        ctx.status.remove(CtxStatus::RESCHED);
        let prev = ctx.curr;

        let next = self.pick_next(cpu);
        if next == prev {
            return None;
        }

        if self.threads.thread(prev).is_zombie() {
            self.zombie_hooks(cpu, prev);
        }

        let now = self.clock.read_monotonic();
        self.switch_accounting(cpu, prev, next, now);

        let unlocked = self.config.unlocked_switch;
        let ctx = self.ctx_mut(cpu);
        ctx.last = Some(prev);
        ctx.curr = next;
        if unlocked {
            ctx.status.insert(CtxStatus::INSW);
        }

        crate::trace!("cpu {} switch {} -> {}", cpu, prev, next);
        crate::port::request_switch();

        Some(SwitchFrame { cpu, prev, next })
    }

    /// Book-keeping done on every switch from `prev` to `next`
    fn switch_accounting(&mut self, cpu: CpuId, prev: ThreadId, next: ThreadId, now: Ticks) {
        let ctx = &mut self.cpus[cpu as usize];
        let elapsed = now.saturating_sub(ctx.last_account_switch);
        ctx.last_account_switch = now;

        let rr_left = ctx.rrbtimer.remaining(now);
        ctx.rrbtimer.stop();

        let outgoing = self.threads.thread_mut(prev);
        #[cfg(feature = "stats")]
        {
            outgoing.stat.account_total += elapsed;
        }
        #[cfg(not(feature = "stats"))]
        let _ = elapsed;
        if outgoing.state.contains(ThreadState::RRB) {
            outgoing.rrcredit = if rr_left > 0 { rr_left } else { outgoing.rrperiod };
        }
        if let Some(pss) = outgoing.pss.as_mut() {
            pss.suspend(now);
        }

        let incoming = self.threads.thread_mut(next);
        #[cfg(feature = "stats")]
        {
            incoming.stat.csw = incoming.stat.csw.wrapping_add(1);
        }
        if let Some(pss) = incoming.pss.as_mut() {
            pss.resume(now);
        }
        let is_root = incoming.is_root();
        let rr = incoming.state.contains(ThreadState::RRB)
            && incoming.sched_class.ops().round_robin();
        let credit = incoming.rrcredit;

        let ctx = &mut self.cpus[cpu as usize];
        if rr {
            ctx.rrbtimer.start(now + credit, 0);
        }
        if is_root {
            ctx.wdcount = 0;
        }
    }

    /// Complete the last switch on `cpu`, once the outgoing thread is off
    /// its stack
    ///
    /// Returns the thread reaped by this switch, if any, for its owner
    /// to release.
    pub fn finish_switch(&mut self, cpu: CpuId) -> Option<Thread> {
        let ctx = self.ctx_mut(cpu);
        let unlocked = ctx.status.contains(CtxStatus::INSW);
        ctx.status.remove(CtxStatus::INSW);
        let last = ctx.last.take();

        if let (true, Some(last)) = (unlocked, last) {
            let thread = self.threads.thread(last);
            // Migrated while switching out
            if thread.sched != cpu {
                let runnable = !thread.is_blocked() && !thread.is_zombie();
                self.threads.thread_mut(last).state.remove(ThreadState::MIGRATE);
                if runnable {
                    self.putback(last);
                }
            }
            // Killed while the lock was dropped
            let thread = self.threads.thread(last);
            if thread.is_zombie() && self.ctx_mut(cpu).zombie != Some(last) {
                self.zombie_hooks(cpu, last);
            }
        }

        self.finalize_zombie(cpu)
    }

    // ============ Zombies ============

    /// Move a dying thread to the zombie slot of `cpu` and detach it
    /// from its class
    pub(crate) fn zombie_hooks(&mut self, cpu: CpuId, tid: ThreadId) {
        let ctx = self.ctx_mut(cpu);
        if let Some(zombie) = ctx.zombie {
            crate::fatal!("zombie slot of cpu {} already holds {}", cpu, zombie);
        }
        ctx.zombie = Some(tid);
        self.release_thread(tid);
        crate::debug!("thread {} finalizing on cpu {}", tid, cpu);
    }

    /// Reap the zombie of `cpu`
    fn finalize_zombie(&mut self, cpu: CpuId) -> Option<Thread> {
        let tid = self.ctx_mut(cpu).zombie.take()?;
        self.threads.remove(tid)
    }

    // ============ Policy ============

    /// Attach a thread to `class` with `param`
    ///
    /// The parameters are checked before anything changes: on error the
    /// thread keeps its previous class and parameters.
    pub fn set_policy(
        &mut self,
        tid: ThreadId,
        class: SchedClass,
        param: &PolicyParam,
    ) -> SchedResult<()> {
        self.registry.check(class)?;
        let thread = self.threads.get(tid).ok_or(SchedError::NoSuchThread)?;
        class.ops().declare(thread, param)?;

        let old = thread.base_class;
        let queued = thread.state.contains(ThreadState::READY);
        let cpu = thread.sched;

        if old != Some(class) {
            self.registry.attach(class);
        }
        if let Some(old) = old {
            if queued {
                self.dequeue(tid);
            }
            if old != class {
                old.ops().forget(self.threads.thread_mut(tid));
                self.registry.detach(old);
            }
        }

        let thread = self.threads.thread_mut(tid);
        thread.sched_class = class;
        thread.base_class = Some(class);
        class.ops().setparam(thread, param);
        thread.bprio = thread.cprio;
        thread.update_wprio();
        let started = thread.state.contains(ThreadState::STARTED);

        if queued {
            self.enqueue(tid);
        }
        if started {
            self.resched(cpu);
        }
        Ok(())
    }

    /// Make `tid` inherit the scheduling class and priority of `target`,
    /// or drop back to its own base policy when `target == tid`
    pub fn track_policy(&mut self, tid: ThreadId, target: ThreadId) -> SchedResult<()> {
        let inherited = {
            let target = self.threads.get(target).ok_or(SchedError::NoSuchThread)?;
            (target.sched_class, target.sched_class.ops().getparam(target))
        };
        let thread = self.threads.get(tid).ok_or(SchedError::NoSuchThread)?;
        let queued = thread.state.contains(ThreadState::READY);
        let cpu = thread.sched;

        if queued {
            self.dequeue(tid);
        }

        let thread = self.threads.thread_mut(tid);
        if tid == target {
            let base = thread.base_class();
            thread.sched_class = base;
            base.ops().trackprio(thread, None);
            if base != SchedClass::Tp {
                thread.tp_partition = None;
            }
        } else {
            let (class, param) = inherited;
            thread.sched_class = class;
            class.ops().trackprio(thread, Some(&param));
        }
        thread.update_wprio();

        if queued {
            self.enqueue(tid);
        }
        self.resched(cpu);
        Ok(())
    }

    /// Move a thread to priority `prio` within its current class
    fn change_prio(&mut self, tid: ThreadId, prio: Prio) {
        let thread = self.threads.thread_mut(tid);
        if thread.cprio == prio {
            return;
        }
        let queued = thread.state.contains(ThreadState::READY);
        let cpu = thread.sched;

        if queued {
            self.dequeue(tid);
        }
        let thread = self.threads.thread_mut(tid);
        thread.cprio = prio;
        thread.update_wprio();
        if queued {
            self.enqueue(tid);
        }
        self.resched(cpu);
    }

    // ============ Scheduler lock ============

    /// Make the running thread of `cpu` non-preemptible (nestable)
    pub fn lock_sched(&mut self, cpu: CpuId) -> SchedResult<()> {
        let curr = self.ctx(cpu).ok_or(SchedError::InvalidParam)?.curr;
        let thread = self.threads.thread_mut(curr);
        if thread.lock_count == u8::MAX {
            return Err(SchedError::LockNestingOvf);
        }
        thread.lock_count += 1;
        thread.state.insert(ThreadState::LOCK);
        Ok(())
    }

    /// Drop one scheduler lock level of the running thread of `cpu`
    ///
    /// Returns `true` when the last level went away with a reschedule
    /// pending, in which case the caller should run
    /// [`schedule`](Nucleus::schedule).
    pub fn unlock_sched(&mut self, cpu: CpuId) -> SchedResult<bool> {
        let curr = self.ctx(cpu).ok_or(SchedError::InvalidParam)?.curr;
        let thread = self.threads.thread_mut(curr);
        if thread.lock_count == 0 {
            return Err(SchedError::SchedNotLocked);
        }
        thread.lock_count -= 1;
        if thread.lock_count > 0 {
            return Ok(false);
        }
        thread.state.remove(ThreadState::LOCK);
        Ok(self.ctx_mut(cpu).resched_pending())
    }

    // ============ Round-robin ============

    /// Enable time slicing for `tid` with `quantum` ticks, 0 disables it
    pub fn set_rr(&mut self, tid: ThreadId, quantum: Ticks) -> SchedResult<()> {
        let now = self.clock.read_monotonic();
        let thread = self.threads.get_mut(tid).ok_or(SchedError::NoSuchThread)?;
        if quantum > 0 && !thread.sched_class.ops().round_robin() {
            return Err(SchedError::NotPermitted);
        }

        if quantum == 0 {
            thread.state.remove(ThreadState::RRB);
        } else {
            thread.state.insert(ThreadState::RRB);
            thread.rrperiod = quantum;
            thread.rrcredit = quantum;
        }

        let ctx = &mut self.cpus[thread.sched as usize];
        if ctx.curr == tid {
            if quantum == 0 {
                ctx.rrbtimer.stop();
            } else {
                ctx.rrbtimer.start(now + quantum, 0);
            }
        }
        Ok(())
    }

    /// Round-robin timer of `cpu` expired
    ///
    /// Moves the running thread behind its peers and returns `true` if
    /// its quantum was consumed.
    pub fn rr_tick(&mut self, cpu: CpuId) -> bool {
        let now = self.clock.read_monotonic();
        let ctx = self.ctx_mut(cpu);
        ctx.rrbtimer.expire();
        let curr = ctx.curr;

        let thread = self.threads.thread_mut(curr);
        let eligible = thread.state.contains(ThreadState::RRB)
            && !thread
                .state
                .intersects(ThreadState::LOCK | ThreadState::BLOCK_BITS | ThreadState::ZOMBIE)
            && thread.sched_class.ops().round_robin()
            && thread.sched == cpu;
        if !eligible {
            return false;
        }
        thread.rrcredit = thread.rrperiod;
        let period = thread.rrperiod;

        self.putback(curr);
        self.ctx_mut(cpu).rrbtimer.start(now + period, 0);
        true
    }

    // ============ Time partitions ============

    /// Install a partition schedule on `cpu`, starting now
    pub fn tp_install(
        &mut self,
        cpu: CpuId,
        windows: &[TpWindow],
        duration: Ticks,
    ) -> SchedResult<()> {
        self.registry.check(SchedClass::Tp)?;
        TpRq::check_schedule(windows, duration)?;
        let now = self.clock.read_monotonic();

        self.ctx(cpu).ok_or(SchedError::InvalidParam)?;
        self.ctx_mut(cpu).tp.install(windows, duration, now);
        self.resched(cpu);
        crate::info!("cpu {} tp schedule installed, {} windows", cpu, windows.len());
        Ok(())
    }

    /// Remove the partition schedule of `cpu`; TP threads stop running
    pub fn tp_uninstall(&mut self, cpu: CpuId) -> SchedResult<()> {
        self.ctx(cpu).ok_or(SchedError::InvalidParam)?;
        self.ctx_mut(cpu).tp.uninstall();
        self.resched(cpu);
        Ok(())
    }

    /// Window timer of `cpu` expired; returns the partition now active
    pub fn tp_tick(&mut self, cpu: CpuId) -> SchedResult<Option<usize>> {
        let ctx = self.cpus.get_mut(cpu as usize).ok_or(SchedError::InvalidParam)?;
        if !ctx.tp.has_schedule() {
            return Err(SchedError::NoSchedule);
        }
        let active = ctx.tp.advance();
        self.resched(cpu);
        Ok(active)
    }

    // ============ Sporadic server ============

    /// Budget timer of a sporadic thread expired
    pub fn sporadic_budget_expired(&mut self, tid: ThreadId) -> SchedResult<()> {
        let now = self.clock.read_monotonic();
        let thread = self.threads.get_mut(tid).ok_or(SchedError::NoSuchThread)?;
        let pss = thread.pss.as_mut().ok_or(SchedError::InvalidParam)?;
        pss.exhaust(now);
        let prio = pss.effective_prio();

        // A boosted thread keeps the inherited priority
        if thread.sched_class == SchedClass::Sporadic {
            self.change_prio(tid, prio);
        }
        Ok(())
    }

    /// Replenishment timer of a sporadic thread expired
    pub fn sporadic_replenish(&mut self, tid: ThreadId) -> SchedResult<Ticks> {
        let now = self.clock.read_monotonic();
        let thread = self.threads.get(tid).ok_or(SchedError::NoSuchThread)?;
        let running = self.cpus[thread.sched as usize].curr == tid;

        let thread = self.threads.thread_mut(tid);
        let pss = thread.pss.as_mut().ok_or(SchedError::InvalidParam)?;
        let was_exhausted = pss.budget == 0;
        let credit = pss.replenish(now);
        if running && was_exhausted && pss.budget > 0 {
            pss.resume(now);
        }
        let prio = pss.effective_prio();

        if thread.sched_class == SchedClass::Sporadic {
            self.change_prio(tid, prio);
        }
        Ok(credit)
    }
}

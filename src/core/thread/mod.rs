//! Thread management
//!
//! Threads live in a fixed arena ([`ThreadTable`]) and are addressed
//! by [`ThreadId`] handles. This module creates, starts, blocks,
//! unblocks and deletes them; queueing decisions are left to the
//! scheduler.

mod tcb;

pub use tcb::{Thread, ThreadStat};

use heapless::Vec;

use crate::config::CFG_MAX_THREADS;
use crate::error::{SchedError, SchedResult};
use crate::kernel::Nucleus;
use crate::sched::class::{PolicyParam, SchedClass};
use crate::types::{CpuId, CpuMask, ThreadId, ThreadState, Ticks};

/// Creation attributes
#[derive(Debug, Clone, Copy)]
pub struct ThreadAttr<'a> {
    name: &'a str,
    cpu: CpuId,
    affinity: CpuMask,
    host_pid: Option<i32>,
}

impl<'a> ThreadAttr<'a> {
    pub fn new(name: &'a str) -> Self {
        ThreadAttr {
            name,
            cpu: 0,
            affinity: CpuMask::all(),
            host_pid: None,
        }
    }

    /// Processor owning the thread initially
    pub fn on_cpu(mut self, cpu: CpuId) -> Self {
        self.cpu = cpu;
        self
    }

    pub fn affinity(mut self, affinity: CpuMask) -> Self {
        self.affinity = affinity;
        self
    }

    /// Shadow of the user-mode host process `pid`
    pub fn user(mut self, pid: i32) -> Self {
        self.host_pid = Some(pid);
        self
    }
}

/// Thread arena
///
/// `order` keeps creation order for listings; `revision` changes on
/// every insertion or removal so that readers walking the list without
/// holding the lock throughout can tell it moved under them.
#[derive(Debug)]
pub struct ThreadTable {
    slots: [Option<Thread>; CFG_MAX_THREADS],
    order: Vec<ThreadId, CFG_MAX_THREADS>,
    revision: u32,
}

impl ThreadTable {
    pub fn new() -> Self {
        ThreadTable {
            slots: core::array::from_fn(|_| None),
            order: Vec::new(),
            revision: 0,
        }
    }

    pub(crate) fn insert(&mut self, thread: Thread) -> SchedResult<ThreadId> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(SchedError::NoMoreThreads)?;
        let tid = ThreadId::new(index);

        self.order
            .push(tid)
            .map_err(|_| SchedError::NoMoreThreads)?;
        self.slots[index] = Some(thread);
        self.revision = self.revision.wrapping_add(1);

        Ok(tid)
    }

    pub(crate) fn remove(&mut self, tid: ThreadId) -> Option<Thread> {
        let thread = self.slots.get_mut(tid.index())?.take()?;
        if let Some(pos) = self.order.iter().position(|t| *t == tid) {
            self.order.remove(pos);
        }
        self.revision = self.revision.wrapping_add(1);
        Some(thread)
    }

    #[inline]
    pub fn get(&self, tid: ThreadId) -> Option<&Thread> {
        self.slots.get(tid.index())?.as_ref()
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, tid: ThreadId) -> Option<&mut Thread> {
        self.slots.get_mut(tid.index())?.as_mut()
    }

    /// Thread behind a handle the scheduler holds; a stale handle there
    /// means its bookkeeping is broken.
    pub(crate) fn thread(&self, tid: ThreadId) -> &Thread {
        match self.get(tid) {
            Some(thread) => thread,
            None => crate::fatal!("stale thread handle {}", tid),
        }
    }

    pub(crate) fn thread_mut(&mut self, tid: ThreadId) -> &mut Thread {
        match self.get_mut(tid) {
            Some(thread) => thread,
            None => crate::fatal!("stale thread handle {}", tid),
        }
    }

    #[inline]
    pub fn contains(&self, tid: ThreadId) -> bool {
        self.get(tid).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[inline]
    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Handle at position `pos` in creation order
    #[inline]
    pub fn nth(&self, pos: usize) -> Option<ThreadId> {
        self.order.get(pos).copied()
    }

    /// Threads in creation order
    pub fn iter(&self) -> impl Iterator<Item = (ThreadId, &Thread)> + '_ {
        self.order.iter().map(move |tid| (*tid, self.thread(*tid)))
    }
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Lifecycle ============

impl Nucleus {
    /// Create a dormant thread attached to `class`
    ///
    /// Nothing is left behind if the parameters are rejected.
    pub fn spawn(
        &mut self,
        attr: ThreadAttr<'_>,
        class: SchedClass,
        param: &PolicyParam,
    ) -> SchedResult<ThreadId> {
        if !self.config.has_cpu(attr.cpu) {
            return Err(SchedError::InvalidParam);
        }
        if !attr.affinity.contains(attr.cpu) {
            return Err(SchedError::Affinity);
        }
        self.registry.check(class)?;

        let mut thread = Thread::new(attr.name, attr.cpu, attr.affinity);
        if let Some(pid) = attr.host_pid {
            thread.host_pid = Some(pid);
            thread.state.insert(ThreadState::USER);
        }

        let tid = self.threads.insert(thread)?;
        if let Err(err) = self.set_policy(tid, class, param) {
            self.threads.remove(tid);
            crate::debug!("thread {} rejected by class {}", attr.name, class.name());
            return Err(err);
        }

        crate::trace!("thread {} created as {}", tid, class.name());
        Ok(tid)
    }

    /// Make a dormant thread runnable for the first time
    pub fn start(&mut self, tid: ThreadId) -> SchedResult<()> {
        let thread = self.threads.get_mut(tid).ok_or(SchedError::NoSuchThread)?;
        if !thread.state.contains(ThreadState::DORMANT) || thread.is_zombie() {
            return Err(SchedError::NotPermitted);
        }
        thread.state.insert(ThreadState::STARTED);
        self.resume(tid, ThreadState::DORMANT)
    }

    /// Add blocking conditions to a thread
    ///
    /// A runnable thread leaves its run queue; a running one keeps the
    /// processor until the next [`schedule`](Nucleus::schedule).
    pub fn suspend(&mut self, tid: ThreadId, mask: ThreadState) -> SchedResult<()> {
        let thread = self.threads.get(tid).ok_or(SchedError::NoSuchThread)?;
        if thread.is_root() || thread.is_zombie() {
            return Err(SchedError::NotPermitted);
        }
        let mask = mask & ThreadState::BLOCK_BITS;
        if mask.is_empty() {
            return Err(SchedError::InvalidParam);
        }
        // The source processor of a deferred migration still runs it
        let running = self.cpus.iter().position(|ctx| ctx.curr == tid);

        if thread.state.contains(ThreadState::READY) {
            self.dequeue(tid);
        }
        let thread = self.threads.thread_mut(tid);
        thread.state.remove(ThreadState::READY);
        thread.state.insert(mask);

        if let Some(cpu) = running {
            self.resched(cpu as CpuId);
        }
        Ok(())
    }

    /// Clear blocking conditions, queueing the thread once none is left
    pub fn resume(&mut self, tid: ThreadId, mask: ThreadState) -> SchedResult<()> {
        let thread = self.threads.get_mut(tid).ok_or(SchedError::NoSuchThread)?;
        if thread.is_zombie() {
            return Err(SchedError::NotPermitted);
        }
        let was_blocked = thread.is_blocked();
        thread.state.remove(mask & ThreadState::BLOCK_BITS);
        if !was_blocked || thread.is_blocked() {
            return Ok(());
        }
        thread.rtimer.stop();
        let cpu = thread.sched;

        // In flight threads are queued when their migration completes
        if !thread.state.contains(ThreadState::MIGRATE) {
            self.putback(tid);
        } else {
            self.resched(cpu);
        }
        Ok(())
    }

    /// Terminate a thread
    ///
    /// A thread that is not running is reaped at once and handed back.
    /// A running thread (or one being switched out with the lock
    /// dropped) turns zombie and is handed back by
    /// [`finish_switch`](Nucleus::finish_switch) once the processor left it.
    pub fn delete_thread(&mut self, tid: ThreadId) -> SchedResult<Option<Thread>> {
        let thread = self.threads.get(tid).ok_or(SchedError::NoSuchThread)?;
        if thread.is_root() {
            return Err(SchedError::NotPermitted);
        }
        if thread.is_zombie() {
            return Ok(None);
        }
        // After a deferred migration the owner is already the destination
        // while the source processor still runs or saves the thread.
        let holder = self.cpus.iter().position(|ctx| {
            ctx.curr == tid || (ctx.in_switch() && ctx.last == Some(tid))
        });

        if thread.state.contains(ThreadState::READY) {
            self.dequeue(tid);
        }
        let thread = self.threads.thread_mut(tid);
        thread.state.remove(ThreadState::READY);
        thread.state.insert(ThreadState::ZOMBIE);
        thread.stop_timers();

        if let Some(cpu) = holder {
            let cpu = cpu as CpuId;
            if self.cpus[cpu as usize].curr == tid {
                self.resched(cpu);
            }
            crate::debug!("thread {} zombified on cpu {}", tid, cpu);
            return Ok(None);
        }

        self.release_thread(tid);
        Ok(self.threads.remove(tid))
    }

    /// Drop every scheduler binding of a thread about to leave the arena
    pub(crate) fn release_thread(&mut self, tid: ThreadId) {
        let thread = self.threads.thread_mut(tid);
        thread.host_pid = None;
        thread.state.remove(ThreadState::USER);
        let class = thread.base_class();
        class.ops().forget(thread);
        self.registry.detach(class);
    }

    // ============ Timers ============

    /// Arm the periodic release timer, `period` 0 disarms it
    pub fn set_periodic(&mut self, tid: ThreadId, first: Ticks, period: Ticks) -> SchedResult<()> {
        let thread = self.threads.get_mut(tid).ok_or(SchedError::NoSuchThread)?;
        if period == 0 {
            thread.ptimer.stop();
        } else {
            thread.ptimer.start(first, period);
        }
        Ok(())
    }

    /// Arm the resource timeout `delay` ticks from now, 0 disarms it
    pub fn set_timeout(&mut self, tid: ThreadId, delay: Ticks) -> SchedResult<()> {
        let now = self.clock.read_monotonic();
        let thread = self.threads.get_mut(tid).ok_or(SchedError::NoSuchThread)?;
        if delay == 0 {
            thread.rtimer.stop();
        } else {
            thread.rtimer.start(now + delay, 0);
        }
        Ok(())
    }

    // ============ Queries ============

    pub fn thread(&self, tid: ThreadId) -> Option<&Thread> {
        self.threads.get(tid)
    }

    pub fn threads(&self) -> &ThreadTable {
        &self.threads
    }

    /// Current parameters of a thread, as its class sees them
    pub fn get_param(&self, tid: ThreadId) -> SchedResult<PolicyParam> {
        let thread = self.threads.get(tid).ok_or(SchedError::NoSuchThread)?;
        Ok(thread.sched_class.ops().getparam(thread))
    }
}

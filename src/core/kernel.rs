//! Scheduler state and initialization
//!
//! [`Nucleus`] gathers everything the scheduler shares between
//! processors: class registry, thread arena and the per-CPU contexts.
//! It is only reachable through [`SchedLock`], whose guard stands for
//! "global lock held, local interrupts off".

use core::fmt::Write;

use heapless::{String, Vec};
use portable_atomic::{AtomicU32, Ordering};

use crate::config::{SchedConfig, CFG_IDLE_PRIO, CFG_NR_CPUS};
use crate::critical::{IrqSpinGuard, IrqSpinLock};
use crate::error::{SchedError, SchedResult};
use crate::sched::{ClassInfo, ClassRegistry, PolicyParam, SchedClass, SchedCtx};
use crate::thread::{Thread, ThreadTable};
use crate::time::Clock;
use crate::types::{CpuId, CpuMask, CtxStatus, ThreadId, ThreadState};

// ============ Scheduler State ============

/// Shared scheduler state
pub struct Nucleus {
    pub(crate) config: SchedConfig,
    /// Watchdog threshold in watchdog ticks
    pub(crate) watchdog_timeout: AtomicU32,
    pub(crate) clock: &'static (dyn Clock + Sync),
    pub(crate) registry: ClassRegistry,
    pub(crate) threads: ThreadTable,
    pub(crate) cpus: Vec<SchedCtx, CFG_NR_CPUS>,
}

impl Nucleus {
    /// Register the enabled classes and bring up one context per
    /// configured processor
    pub fn new(config: SchedConfig, clock: &'static (dyn Clock + Sync)) -> SchedResult<Self> {
        Self::with_registry(config, clock, ClassRegistry::with_enabled_classes())
    }

    /// Same as [`new`](Nucleus::new) with a hand-built class registry
    pub fn with_registry(
        config: SchedConfig,
        clock: &'static (dyn Clock + Sync),
        registry: ClassRegistry,
    ) -> SchedResult<Self> {
        if config.nr_cpus == 0 || config.nr_cpus > CFG_NR_CPUS {
            return Err(SchedError::InvalidParam);
        }
        if !registry.is_registered(SchedClass::Idle) {
            return Err(SchedError::ClassUnavailable);
        }

        let mut nucleus = Nucleus {
            config,
            watchdog_timeout: AtomicU32::new(config.watchdog_timeout),
            clock,
            registry,
            threads: ThreadTable::new(),
            cpus: Vec::new(),
        };
        for cpu in 0..config.nr_cpus {
            nucleus.init_ctx(cpu as CpuId)?;
        }
        // Nothing to reschedule before the first thread is started
        for ctx in nucleus.cpus.iter_mut() {
            ctx.status.remove(CtxStatus::RESCHED);
            ctx.resched = CpuMask::EMPTY;
        }

        Ok(nucleus)
    }

    /// Create the root thread and the context of `cpu`
    fn init_ctx(&mut self, cpu: CpuId) -> SchedResult<()> {
        let mut name: String<16> = String::new();
        let _ = write!(name, "ROOT/{}", cpu);

        let mut root = Thread::new(&name, cpu, CpuMask::of(cpu));
        root.state = ThreadState::ROOT | ThreadState::STARTED;
        let root = self.threads.insert(root)?;

        let now = self.clock.read_monotonic();
        let mut ctx = SchedCtx::new(cpu, root);
        ctx.last_account_switch = now;
        #[cfg(feature = "watchdog")]
        {
            let period = self.clock.ns_to_ticks(crate::config::CFG_WATCHDOG_PERIOD_NS);
            ctx.wdtimer.start(now + period, period);
        }
        if self.cpus.push(ctx).is_err() {
            crate::fatal!("cpu {} context initialized twice", cpu);
        }

        self.set_policy(root, SchedClass::Idle, &PolicyParam::Idle { prio: CFG_IDLE_PRIO })?;

        crate::info!("cpu {} scheduler context ready", cpu);
        Ok(())
    }

    /// Release the timers owned by the context of `cpu`
    pub fn destroy_ctx(&mut self, cpu: CpuId) -> SchedResult<()> {
        let ctx = self.cpus.get_mut(cpu as usize).ok_or(SchedError::InvalidParam)?;
        ctx.htimer.destroy();
        ctx.wdtimer.destroy();
        ctx.rrbtimer.destroy();
        ctx.tp.timer.destroy();

        let root = ctx.root;
        self.threads.thread_mut(root).stop_timers();

        crate::info!("cpu {} scheduler context destroyed", cpu);
        Ok(())
    }

    #[inline]
    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    #[inline]
    pub fn clock(&self) -> &'static (dyn Clock + Sync) {
        self.clock
    }

    #[inline]
    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    /// Registered classes with their thread counts
    pub fn classes(&self) -> impl Iterator<Item = ClassInfo> + '_ {
        self.registry.classes()
    }

    #[inline]
    pub fn nr_cpus(&self) -> usize {
        self.cpus.len()
    }

    pub fn ctx(&self, cpu: CpuId) -> Option<&SchedCtx> {
        self.cpus.get(cpu as usize)
    }

    pub(crate) fn ctx_mut(&mut self, cpu: CpuId) -> &mut SchedCtx {
        match self.cpus.get_mut(cpu as usize) {
            Some(ctx) => ctx,
            None => crate::fatal!("no scheduler context for cpu {}", cpu),
        }
    }

    /// Running thread of `cpu`
    pub fn current(&self, cpu: CpuId) -> Option<ThreadId> {
        self.ctx(cpu).map(SchedCtx::curr)
    }

    #[inline]
    pub fn watchdog_timeout(&self) -> u32 {
        self.watchdog_timeout.load(Ordering::Relaxed)
    }

    /// Change the watchdog threshold, in watchdog ticks
    pub fn set_watchdog_timeout(&self, ticks: u32) -> SchedResult<()> {
        if ticks == 0 {
            return Err(SchedError::InvalidParam);
        }
        self.watchdog_timeout.store(ticks, Ordering::Relaxed);
        Ok(())
    }
}

// ============ Global Lock ============

/// Guard over the scheduler state
pub type SchedGuard<'a> = IrqSpinGuard<'a, Nucleus>;

/// The scheduler lock
pub struct SchedLock {
    inner: IrqSpinLock<Nucleus>,
}

impl SchedLock {
    pub fn new(nucleus: Nucleus) -> Self {
        SchedLock {
            inner: IrqSpinLock::new(nucleus),
        }
    }

    /// Mask local interrupts and take the lock
    #[inline]
    pub fn lock(&self) -> SchedGuard<'_> {
        self.inner.lock()
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SchedGuard<'_>> {
        self.inner.try_lock()
    }

    pub fn into_inner(self) -> Nucleus {
        self.inner.into_inner()
    }
}

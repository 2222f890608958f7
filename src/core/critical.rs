//! Interrupt masking and the scheduler spin lock
//!
//! Every path touching shared scheduler state runs with local
//! interrupts off *and* the global spin lock held. [`IrqSpinLock`]
//! bundles both so a guard is the only way to reach the protected data.

use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU32, Ordering};

/// Local interrupt masking depth (this processor)
static IRQ_DEPTH: AtomicU32 = AtomicU32::new(0);

/// RAII guard for critical sections
///
/// When this guard is created, interrupts are disabled.
/// When it is dropped, interrupts are restored to their previous state.
pub struct CriticalSection {
    restore: bool,
}

impl CriticalSection {
    /// Enter a critical section by disabling interrupts.
    ///
    /// Returns a guard that will restore interrupt state when dropped.
    #[inline(always)]
    pub fn enter() -> Self {
        #[cfg(target_arch = "arm")]
        let restore = {
            let was_active = cortex_m::register::primask::read().is_active();
            cortex_m::interrupt::disable();
            was_active
        };
        #[cfg(not(target_arch = "arm"))]
        let restore = true;

        IRQ_DEPTH.fetch_add(1, Ordering::Acquire);
        CriticalSection { restore }
    }

    /// Check if we're currently in a critical section
    #[inline(always)]
    pub fn is_active() -> bool {
        IRQ_DEPTH.load(Ordering::Acquire) != 0
    }
}

impl Drop for CriticalSection {
    #[inline(always)]
    fn drop(&mut self) {
        IRQ_DEPTH.fetch_sub(1, Ordering::Release);

        #[cfg(target_arch = "arm")]
        if self.restore {
            unsafe { cortex_m::interrupt::enable() };
        }
        #[cfg(not(target_arch = "arm"))]
        let _ = self.restore;
    }
}

/// Execute a closure with interrupts disabled
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let cs = CriticalSection::enter();
    f(&cs)
}

/// Check if currently executing in an ISR context
#[inline]
pub fn is_isr_context() -> bool {
    #[cfg(target_arch = "arm")]
    {
        let ipsr: u32;
        unsafe {
            core::arch::asm!(
                "mrs {}, IPSR",
                out(reg) ipsr,
                options(nomem, nostack, preserves_flags)
            );
        }
        ipsr != 0
    }

    #[cfg(not(target_arch = "arm"))]
    {
        false
    }
}

/// Spin lock taken with local interrupts masked
pub struct IrqSpinLock<T> {
    inner: spin::Mutex<T>,
}

impl<T> IrqSpinLock<T> {
    pub const fn new(value: T) -> Self {
        IrqSpinLock {
            inner: spin::Mutex::new(value),
        }
    }

    /// Mask interrupts, then spin until the lock is ours
    #[inline]
    pub fn lock(&self) -> IrqSpinGuard<'_, T> {
        let cs = CriticalSection::enter();
        let guard = self.inner.lock();
        IrqSpinGuard { guard, _cs: cs }
    }

    /// Take the lock only if it is free right now
    #[inline]
    pub fn try_lock(&self) -> Option<IrqSpinGuard<'_, T>> {
        let cs = CriticalSection::enter();
        self.inner
            .try_lock()
            .map(|guard| IrqSpinGuard { guard, _cs: cs })
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

/// Proof that the lock is held with interrupts off
///
/// Field order matters: the lock is released before interrupts are
/// restored.
pub struct IrqSpinGuard<'a, T> {
    guard: spin::MutexGuard<'a, T>,
    _cs: CriticalSection,
}

impl<T> Deref for IrqSpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IrqSpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

//! Real-time scheduler core
//!
//! The per-processor scheduler of a dual-kernel system:
//! - Scheduling classes (idle, weak, time partitions, sporadic server,
//!   fixed-priority real-time) dispatched by weight
//! - O(1) multi-level run queues
//! - Per-CPU contexts with deferred zombie finalization
//! - Active and passive thread migration
//! - Runaway thread watchdog
//! - Lock-friendly introspection listings

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod port;

// ============ Re-exports ============

pub use self::core::config;
pub use self::core::config::*;
pub use self::core::critical;
pub use self::core::error;
pub use self::core::error::{SchedError, SchedResult};
pub use self::core::kernel;
pub use self::core::kernel::{Nucleus, SchedGuard, SchedLock};
pub use self::core::prio;
pub use self::core::types;
pub use self::core::types::*;
pub use self::core::thread;
pub use self::core::thread::{Thread, ThreadAttr};
pub use self::core::sched;
pub use self::core::sched::{PolicyParam, SchedClass, SwitchFrame};
pub use self::core::time;

//! Port layer - CPU-specific implementations
//!
//! What the scheduler needs from the processor: who am I, request a
//! context switch, kick another processor.

#[cfg(target_arch = "arm")]
pub mod cortex_m4;

#[cfg(target_arch = "arm")]
pub use cortex_m4::*;

// Host implementation (tests and simulations)
#[cfg(not(target_arch = "arm"))]
pub mod stub {
    use crate::types::{CpuId, CpuMask};

    /// Host simulations exercise the unlocked switch protocol
    /// explicitly through `SchedConfig`
    pub const UNLOCKED_SWITCH: bool = false;

    pub fn request_switch() {
        // No-op for testing
    }

    pub fn send_resched_ipi(_mask: CpuMask) {
        // No-op for testing
    }

    pub fn cpu_id() -> CpuId {
        0
    }
}

#[cfg(not(target_arch = "arm"))]
pub use stub::*;

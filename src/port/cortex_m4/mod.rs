//! Cortex-M4 port
//!
//! Single processor. The switch itself runs in the PendSV handler at
//! the lowest exception priority with interrupts masked, so the
//! scheduler lock is never dropped across a switch.

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;

use crate::types::{CpuId, CpuMask};

/// PendSV switches with interrupts masked
pub const UNLOCKED_SWITCH: bool = false;

/// Initialize SysTick timer for system tick generation
///
/// # Example
/// For 16MHz clock with 1000Hz tick rate: reload = 16_000_000 / 1000 = 16_000
pub fn systick_init(reload: u32) {
    let mut p = unsafe { cortex_m::Peripherals::steal() };

    p.SYST.set_reload(reload - 1);
    p.SYST.clear_current();
    p.SYST.set_clock_source(SystClkSource::Core);
    p.SYST.enable_interrupt();
    p.SYST.enable_counter();
}

/// Give PendSV and SysTick the lowest priority so a switch never
/// preempts an interrupt handler
pub fn init_exceptions() {
    unsafe {
        let mut scb = cortex_m::Peripherals::steal().SCB;
        scb.set_priority(SystemHandler::PendSV, 0xF0);
        scb.set_priority(SystemHandler::SysTick, 0xF0);
    }
}

/// Ask for the context switch decided by the scheduler
#[inline(always)]
pub fn request_switch() {
    cortex_m::peripheral::SCB::set_pendsv();
}

/// No other processor to kick
#[inline(always)]
pub fn send_resched_ipi(_mask: CpuMask) {}

#[inline(always)]
pub fn cpu_id() -> CpuId {
    0
}

/// Body of the root thread
pub fn idle() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

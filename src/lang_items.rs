//! Language items and default exception handlers
//!
//! `fatal!` ends in a panic when a scheduler invariant breaks (stale
//! thread handle, double zombie, empty run queues). On the target that
//! panic traps here so the debugger stops on the faulting processor.

// defmt builds report the broken invariant over RTT before trapping
#[cfg(all(feature = "defmt", target_arch = "arm"))]
use defmt_rtt as _;

#[cfg(all(feature = "defmt", target_arch = "arm"))]
use panic_probe as _;

#[cfg(all(feature = "defmt", target_arch = "arm"))]
#[defmt::panic_handler]
fn defmt_panic() -> ! {
    cortex_m::asm::udf()
}

// Without defmt the message is lost; trap on the undefined instruction
#[cfg(all(not(feature = "defmt"), target_arch = "arm"))]
#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop { cortex_m::asm::udf(); }
}

// A fault while switching contexts leaves the scheduler lock held
#[cfg(target_arch = "arm")]
#[cortex_m_rt::exception]
unsafe fn HardFault(_ef: &cortex_m_rt::ExceptionFrame) -> ! {
    loop { cortex_m::asm::udf(); }
}

// Log lines are stamped with the cycle counter
#[cfg(all(feature = "defmt", target_arch = "arm"))]
defmt::timestamp!("{=u32}", cortex_m::peripheral::DWT::cycle_count());

//! Busy-wait stall primitive.
//!
//! The isolation protocol and register polling both need short, precise
//! delays between port accesses. Busy-loops on the TSC rather than yielding,
//! since these stalls run with interrupts often masked during bus
//! enumeration.

use core::arch::x86_64::_rdtsc;
use core::sync::atomic::{AtomicU64, Ordering};

/// TSC ticks per nanosecond, calibrated once by the host via [`calibrate`].
/// Defaults to 1 (a conservative, if inaccurate, lower bound) so a host that
/// never calibrates still gets *some* delay rather than a busy-loop of zero
/// iterations.
static TICKS_PER_NANOSECOND: AtomicU64 = AtomicU64::new(1);

/// Record the TSC frequency, in ticks per nanosecond, measured by the host
/// against a known-good clock source. Call once during bus initialization.
pub fn calibrate(ticks_per_nanosecond: u64) {
    TICKS_PER_NANOSECOND.store(ticks_per_nanosecond.max(1), Ordering::Relaxed);
}

fn rdtsc() -> u64 {
    unsafe { _rdtsc() }
}

/// Busy-wait for at least `nanoseconds`. Never returns early.
pub fn nanowait(nanoseconds: u64) {
    let ticks_per_ns = TICKS_PER_NANOSECOND.load(Ordering::Relaxed);
    let start = rdtsc();
    let target_delta = nanoseconds.saturating_mul(ticks_per_ns);
    while rdtsc().wrapping_sub(start) < target_delta {
        core::hint::spin_loop();
    }
}

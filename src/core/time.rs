//! Time conversion helpers
//!
//! Sleeps are issued to the kernel as a seconds part and a milliseconds
//! part, each converted to ticks on its own so long sleeps cannot overflow
//! the intermediate product.

/// Milliseconds per second
pub const MS_PER_S: u32 = 1000;

/// Microseconds per second
pub const US_PER_S: u64 = 1_000_000;

/// Split a duration into whole seconds and remaining milliseconds
#[inline]
pub const fn split_ms(ms: u32) -> (u32, u32) {
    (ms / MS_PER_S, ms % MS_PER_S)
}

/// Seconds to ticks, saturating
#[inline]
pub const fn s_to_ticks(s: u32, tick_rate_hz: u32) -> u32 {
    s.saturating_mul(tick_rate_hz)
}

/// Milliseconds (below one second) to ticks, rounded up so a sleep never
/// ends early
#[inline]
pub const fn ms_to_ticks(ms: u32, tick_rate_hz: u32) -> u32 {
    let ticks = (ms as u64 * tick_rate_hz as u64 + (MS_PER_S as u64 - 1)) / MS_PER_S as u64;
    if ticks > u32::MAX as u64 {
        u32::MAX
    } else {
        ticks as u32
    }
}

/// Tick period in microseconds
#[inline]
pub const fn tick_period_us(tick_rate_hz: u32) -> u64 {
    if tick_rate_hz == 0 {
        0
    } else {
        US_PER_S / tick_rate_hz as u64
    }
}

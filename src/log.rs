//! Logging macros for rtsys
//!
//! Every level forwards to `defmt` when the `defmt` feature is enabled.
//! Without it the macros expand to nothing, so log arguments are never
//! evaluated on release firmware.

#[cfg(all(feature = "defmt", target_arch = "arm"))]
use defmt_rtt as _;

#[cfg(all(feature = "defmt", target_arch = "arm"))]
use panic_probe as _;

/// Debug message
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::__sys_log!(debug, $($arg)*) };
}

/// Info message
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::__sys_log!(info, $($arg)*) };
}

/// Warning message
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::__sys_log!(warn, $($arg)*) };
}

/// Error message
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::__sys_log!(error, $($arg)*) };
}

/// Trace message
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::__sys_log!(trace, $($arg)*) };
}

#[cfg(feature = "defmt")]
#[doc(hidden)]
#[macro_export]
macro_rules! __sys_log {
    ($level:ident, $($arg:tt)*) => { defmt::$level!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __sys_log {
    ($level:ident, $($arg:tt)*) => {};
}

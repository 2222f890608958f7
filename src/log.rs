//! Logging macros for the scheduler core
//!
//! With the `defmt` feature the macros forward to `defmt`. Host unit
//! tests print to stderr. Otherwise they compile to nothing, so format
//! arguments must stay side-effect free.

/// Trace message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { defmt::trace!($($arg)*) };
}

/// Debug message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { defmt::debug!($($arg)*) };
}

/// Info message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { defmt::info!($($arg)*) };
}

/// Warning message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { defmt::warn!($($arg)*) };
}

/// Error message
#[cfg(feature = "defmt")]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { defmt::error!($($arg)*) };
}

// Host unit tests: only warnings and errors are worth the noise
#[cfg(all(not(feature = "defmt"), test))]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { std::eprintln!($($arg)*) };
}
#[cfg(all(not(feature = "defmt"), test))]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { std::eprintln!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! trace { ($($arg:tt)*) => {}; }
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! debug { ($($arg:tt)*) => {}; }
#[cfg(not(feature = "defmt"))]
#[macro_export]
macro_rules! info { ($($arg:tt)*) => {}; }
#[cfg(all(not(feature = "defmt"), not(test)))]
#[macro_export]
macro_rules! warn { ($($arg:tt)*) => {}; }
#[cfg(all(not(feature = "defmt"), not(test)))]
#[macro_export]
macro_rules! error { ($($arg:tt)*) => {}; }

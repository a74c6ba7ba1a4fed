// src/macros.rs

//! Logging shims used throughout the crate.
//!
//! Call sites always write `log_debug!(..)` and friends. With the `logging`
//! feature the shims expand to the matching `tracing` event. Without it
//! only errors are kept, printed to stderr with a crate prefix.

#![allow(unused_macros)]

// --- with `logging`: tracing events

/// Unexpected failure inside the transport.
#[cfg(feature = "logging")]
macro_rules! log_error {
    ($($arg:tt)*) => { tracing::error!($($arg)*) };
}

/// Recoverable problem, e.g. a consumer handler error.
#[cfg(feature = "logging")]
macro_rules! log_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

/// Transport lifecycle: stopping, stopped.
#[cfg(feature = "logging")]
macro_rules! log_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

/// Topic creation and drain state changes.
#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

// --- without `logging`: errors to stderr, everything else dropped

#[cfg(not(feature = "logging"))]
macro_rules! log_error {
    ($($arg:tt)*) => {
        eprintln!("mom-transport: {}", format_args!($($arg)*))
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "logging"))]
macro_rules! log_info {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Logging and Diagnostics
//!
//! This module provides the kernel's logging macros. They forward to the
//! `log` facade when the `logging` feature is enabled and compile to
//! nothing otherwise, so hot paths pay nothing in minimal builds.
//!
//! # Usage
//!
//! ```rust
//! use rustux_kobj::{log_debug, log_info};
//!
//! log_info!("port created: koid={}", 1024);
//! log_debug!("queue depth {}", 3);
//! ```

/// Log target used by every kernel message
pub const LOG_TARGET: &str = "rustux";

/// Trace-level logging (very verbose)
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        {
            ::log::trace!(target: $crate::kernel::debug::LOG_TARGET, $($arg)*);
        }
    }};
}

/// Debug-level logging
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        {
            ::log::debug!(target: $crate::kernel::debug::LOG_TARGET, $($arg)*);
        }
    }};
}

/// Informational logging
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        {
            ::log::info!(target: $crate::kernel::debug::LOG_TARGET, $($arg)*);
        }
    }};
}

/// Warning-level logging
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        {
            ::log::warn!(target: $crate::kernel::debug::LOG_TARGET, $($arg)*);
        }
    }};
}

/// Error-level logging
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        {
            ::log::error!(target: $crate::kernel::debug::LOG_TARGET, $($arg)*);
        }
    }};
}

/// Install a test logger
///
/// Safe to call from every test; only the first call takes effect.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

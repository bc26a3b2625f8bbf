// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Command Line Parsing
//!
//! This module parses boot arguments in `key=value` form and turns them
//! into the typed [`KernelConfig`] consumed by [`Kernel::new`].
//!
//! # Design
//!
//! - Arguments are separated by whitespace
//! - A key with no `=` gets an empty value
//! - Later occurrences of a key override earlier ones
//! - Numbers may be decimal or `0x`-prefixed hex
//!
//! # Usage
//!
//! ```rust
//! use rustux_kobj::kernel::cmdline::{Cmdline, KernelConfig};
//!
//! let cmdline = Cmdline::parse("kernel.port.capacity=64 kernel.handle.max=0x100");
//! assert_eq!(cmdline.get_u64("kernel.port.capacity", 0), 64);
//!
//! let config = KernelConfig::from_cmdline(&cmdline);
//! assert_eq!(config.max_handles, 256);
//! ```
//!
//! [`Kernel::new`]: crate::kernel::Kernel::new

use crate::log_warn;

/// ============================================================================
/// Command Line
/// ============================================================================

/// Parsed kernel command line
#[derive(Debug, Clone, Default)]
pub struct Cmdline {
    entries: Vec<(String, String)>,
}

impl Cmdline {
    /// Parse a command line string
    ///
    /// Control characters are treated as separators.
    pub fn parse(data: &str) -> Self {
        let mut cmdline = Self::default();
        cmdline.append(data);
        cmdline
    }

    /// Append more arguments
    pub fn append(&mut self, data: &str) {
        for arg in data.split(|c: char| c.is_whitespace() || c.is_control()) {
            if arg.is_empty() {
                continue;
            }

            let (key, value) = match arg.split_once('=') {
                Some((key, value)) => (key, value),
                None => (arg, ""),
            };

            if key.is_empty() {
                continue;
            }

            self.entries.retain(|(k, _)| k != key);
            self.entries.push((key.to_string(), value.to_string()));
        }
    }

    /// Get a value from the command line
    ///
    /// # Returns
    ///
    /// Value string if found (empty for a bare key), None otherwise
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get a boolean value from the command line
    ///
    /// Returns false if the value is "0", "false", or "off" and true for
    /// any other value (including a bare key).
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            None => default,
            Some(v) => !matches!(v, "0" | "false" | "off"),
        }
    }

    /// Get a u64 value from the command line
    ///
    /// Missing, empty or malformed values yield `default`.
    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        let Some(v) = self.get(key) else {
            return default;
        };

        let parsed = match v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => v.parse::<u64>(),
        };

        match parsed {
            Ok(n) => n,
            Err(_) => {
                log_warn!("cmdline: malformed number {}={:?}, using {}", key, v, default);
                default
            }
        }
    }

    /// Number of entries
    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

/// ============================================================================
/// Kernel Configuration
/// ============================================================================

/// Handle table size option
pub const OPT_HANDLE_MAX: &str = "kernel.handle.max";

/// Default port capacity option
pub const OPT_PORT_CAPACITY: &str = "kernel.port.capacity";

/// Maximum port capacity option
pub const OPT_PORT_MAX_CAPACITY: &str = "kernel.port.max-capacity";

/// Maximum pager-backed VMO size option
pub const OPT_PAGER_MAX_VMO_SIZE: &str = "kernel.pager.max-vmo-size";

/// Typed kernel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Handle slots per process
    pub max_handles: usize,

    /// Packet capacity of a port created with capacity 0
    pub port_default_capacity: usize,

    /// Upper bound for an explicit port capacity
    pub port_max_capacity: usize,

    /// Largest VMO a pager may back, in bytes
    pub pager_max_vmo_size: u64,
}

impl KernelConfig {
    /// Build a configuration from the command line, defaulting missing keys
    pub fn from_cmdline(cmdline: &Cmdline) -> Self {
        let defaults = Self::default();

        let mut config = Self {
            max_handles: cmdline.get_u64(OPT_HANDLE_MAX, defaults.max_handles as u64) as usize,
            port_default_capacity: cmdline
                .get_u64(OPT_PORT_CAPACITY, defaults.port_default_capacity as u64)
                as usize,
            port_max_capacity: cmdline
                .get_u64(OPT_PORT_MAX_CAPACITY, defaults.port_max_capacity as u64)
                as usize,
            pager_max_vmo_size: cmdline
                .get_u64(OPT_PAGER_MAX_VMO_SIZE, defaults.pager_max_vmo_size),
        };

        if config.max_handles == 0 {
            log_warn!("cmdline: {} must be non-zero", OPT_HANDLE_MAX);
            config.max_handles = defaults.max_handles;
        }
        if config.port_max_capacity == 0 {
            log_warn!("cmdline: {} must be non-zero", OPT_PORT_MAX_CAPACITY);
            config.port_max_capacity = defaults.port_max_capacity;
        }
        if config.port_default_capacity == 0 || config.port_default_capacity > config.port_max_capacity {
            config.port_default_capacity = config.port_max_capacity.min(defaults.port_default_capacity);
        }

        config
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_handles: 1024,
            port_default_capacity: 1024,
            port_max_capacity: 16384,
            pager_max_vmo_size: 1 << 30,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmdline_empty() {
        let cmdline = Cmdline::parse("");
        assert!(cmdline.get("test").is_none());
        assert_eq!(cmdline.count(), 0);
    }

    #[test]
    fn test_cmdline_values() {
        let cmdline = Cmdline::parse("a=1  b\tc=off a=2 =bogus");
        assert_eq!(cmdline.get("a"), Some("2"));
        assert_eq!(cmdline.get("b"), Some(""));
        assert!(cmdline.get_bool("b", false));
        assert!(!cmdline.get_bool("c", true));
        assert!(cmdline.get_bool("missing", true));
        assert_eq!(cmdline.count(), 3);
    }

    #[test]
    fn test_cmdline_numbers() {
        let cmdline = Cmdline::parse("dec=42 hex=0x2A bad=4x2");
        assert_eq!(cmdline.get_u64("dec", 0), 42);
        assert_eq!(cmdline.get_u64("hex", 0), 42);
        assert_eq!(cmdline.get_u64("bad", 7), 7);
        assert_eq!(cmdline.get_u64("none", 9), 9);
    }

    #[test]
    fn test_config_from_cmdline() {
        let cmdline = Cmdline::parse(
            "kernel.handle.max=16 kernel.port.capacity=4 kernel.port.max-capacity=8",
        );
        let config = KernelConfig::from_cmdline(&cmdline);
        assert_eq!(config.max_handles, 16);
        assert_eq!(config.port_default_capacity, 4);
        assert_eq!(config.port_max_capacity, 8);
        assert_eq!(config.pager_max_vmo_size, KernelConfig::default().pager_max_vmo_size);
    }

    #[test]
    fn test_config_sanitized() {
        let cmdline = Cmdline::parse("kernel.handle.max=0 kernel.port.max-capacity=16");
        let config = KernelConfig::from_cmdline(&cmdline);
        assert_eq!(config.max_handles, KernelConfig::default().max_handles);
        assert_eq!(config.port_default_capacity, 16);
    }
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Common type aliases used throughout the kernel

use std::time::{Duration, Instant};

/// Size type
pub type Size = usize;

/// Error code type (negative values indicate errors)
pub type Status = i32;

/// Kernel object identifier
///
/// Assigned once at object creation and never reused.
pub type Koid = u64;

/// The invalid koid
pub const KOID_INVALID: Koid = 0;

/// Time value in nanoseconds
pub type Nanoseconds = u64;

/// Page size (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page shift
pub const PAGE_SHIFT: usize = 12;

/// Round `value` up to the next page boundary
///
/// Returns `None` on overflow.
pub const fn page_round_up(value: u64) -> Option<u64> {
    let mask = PAGE_SIZE as u64 - 1;
    match value.checked_add(mask) {
        Some(v) => Some(v & !mask),
        None => None,
    }
}

/// Check page alignment
pub const fn is_page_aligned(value: u64) -> bool {
    value & (PAGE_SIZE as u64 - 1) == 0
}

/// ============================================================================
/// Deadline
/// ============================================================================

/// Deadline for blocking operations
///
/// `Immediate` never blocks, `Infinite` never times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Fail with `TimedOut` instead of blocking
    Immediate,

    /// Block until a fixed point in time
    At(Instant),

    /// Block forever
    Infinite,
}

impl Deadline {
    /// Deadline `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(at) => Deadline::At(at),
            None => Deadline::Infinite,
        }
    }

    /// Deadline from a relative timeout in nanoseconds
    ///
    /// `0` is immediate, `u64::MAX` is infinite (the syscall ABI encoding).
    pub fn from_nanos(timeout: Nanoseconds) -> Self {
        match timeout {
            0 => Deadline::Immediate,
            Nanoseconds::MAX => Deadline::Infinite,
            ns => Deadline::after(Duration::from_nanos(ns)),
        }
    }

    /// Check whether the deadline has passed
    pub fn has_expired(&self) -> bool {
        match self {
            Deadline::Immediate => true,
            Deadline::At(at) => Instant::now() >= *at,
            Deadline::Infinite => false,
        }
    }

    /// Point in time to stop waiting at, if any
    pub fn instant(&self) -> Option<Instant> {
        match self {
            Deadline::Immediate => Some(Instant::now()),
            Deadline::At(at) => Some(*at),
            Deadline::Infinite => None,
        }
    }
}

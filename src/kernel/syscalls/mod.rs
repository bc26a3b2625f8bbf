// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! System Call Interface
//!
//! This module provides the handle-based system call surface of the
//! object core. Every call acts on behalf of a [`Process`] and resolves its
//! handle arguments through that process's handle table, checking rights
//! before touching the object.
//!
//! # Design Rules
//!
//! - **Object-based**: All operations on handles with rights
//! - **Deterministic**: Same inputs produce the same outputs and errors
//! - **Atomic failure**: A failed call leaves tables and objects unchanged
//! - **Dead callers**: Calls made for a terminated process fail with
//!   `BadState`
//!
//! # Error Return Convention
//!
//! The `sys_*` functions return [`Result`]. The numeric ABI form used at the
//! trap boundary is produced by [`into_syscall_ret`]:
//!
//! ```text
//! Success: return value (positive or zero)
//! Failure: negative error code
//! ```
//!
//! [`Process`]: crate::kernel::process::Process

use crate::rustux::errors::*;
use crate::rustux::types::*;

// Syscall implementations
pub mod handle_ops;
pub mod object;
pub mod object_wait;
pub mod pager;
pub mod port;
pub mod vmo;

/// ============================================================================
/// Return Values
/// ============================================================================

/// Syscall return value
pub type SyscallRet = isize;

/// Convert a status code to a syscall return value
///
/// Status codes are already negative, so they pass through unchanged.
#[inline]
pub const fn err_to_ret(err: Status) -> SyscallRet {
    err as SyscallRet
}

/// Convert a success value to a syscall return value
#[inline]
pub const fn ok_to_ret(val: usize) -> SyscallRet {
    val as SyscallRet
}

/// Flatten a syscall result into its ABI form
#[inline]
pub fn into_syscall_ret(result: Result<usize>) -> SyscallRet {
    match result {
        Ok(val) => ok_to_ret(val),
        Err(err) => err_to_ret(err.to_status()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_values() {
        assert_eq!(ok_to_ret(0), 0);
        assert_eq!(ok_to_ret(42), 42);
        assert_eq!(err_to_ret(Error::BadHandle.to_status()), -11);
    }

    #[test]
    fn test_into_syscall_ret() {
        assert_eq!(into_syscall_ret(Ok(7)), 7);
        assert_eq!(into_syscall_ret(Err(Error::AccessDenied)), -30);
        assert_eq!(
            Error::from_status(into_syscall_ret(Err(Error::ShouldWait)) as Status),
            Error::ShouldWait
        );
    }
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Handle Operations
//!
//! This module implements handle-related system calls.
//!
//! # Syscalls Implemented
//!
//! - `handle_close` - Close a single handle
//! - `handle_close_many` - Close multiple handles
//! - `handle_duplicate` - Duplicate a handle
//! - `handle_replace` - Replace a handle
//! - `handle_transfer` - Move a handle to another process

use crate::kernel::object::{HandleValue, Rights, HANDLE_INVALID};
use crate::kernel::process::Process;
use crate::kernel::Kernel;
use crate::rustux::errors::*;

// Import logging macros
use crate::{log_debug, log_error};

/// ============================================================================
/// Handle Operations
/// ============================================================================

/// Close a single handle
///
/// Closing the "never a handle" invalid handle is not an error.
/// It's like free(NULL).
pub fn sys_handle_close(_kernel: &Kernel, process: &Process, handle_value: HandleValue) -> Result {
    log_debug!("sys_handle_close: handle={:#x}", handle_value);
    process.ensure_alive()?;

    if handle_value == HANDLE_INVALID {
        return Ok(());
    }

    process.handles().close(handle_value).map_err(|err| {
        log_debug!("sys_handle_close: {}", err);
        err
    })
}

/// Close multiple handles
///
/// Every handle is attempted. Invalid entries are skipped; the first
/// failure is reported after the rest were closed.
pub fn sys_handle_close_many(
    kernel: &Kernel,
    process: &Process,
    handles: &[HandleValue],
) -> Result {
    log_debug!("sys_handle_close_many: count={}", handles.len());
    process.ensure_alive()?;

    let mut result = Ok(());
    for &value in handles {
        if let Err(err) = sys_handle_close(kernel, process, value) {
            if result.is_ok() {
                result = Err(err);
            }
        }
    }
    result
}

/// Duplicate a handle
///
/// Requires `DUPLICATE` on the source. `rights` must be a subset of the
/// source rights, or `SAME_RIGHTS`.
pub fn sys_handle_duplicate(
    _kernel: &Kernel,
    process: &Process,
    handle_value: HandleValue,
    rights: Rights,
) -> Result<HandleValue> {
    log_debug!(
        "sys_handle_duplicate: handle={:#x} rights={:?}",
        handle_value,
        rights
    );
    process.ensure_alive()?;

    let value = process.handles().duplicate(handle_value, rights)?;
    log_debug!("sys_handle_duplicate: new handle={:#x}", value);
    Ok(value)
}

/// Replace a handle with one carrying `rights`
///
/// The old value is invalid afterwards. On failure the old handle stays.
pub fn sys_handle_replace(
    _kernel: &Kernel,
    process: &Process,
    handle_value: HandleValue,
    rights: Rights,
) -> Result<HandleValue> {
    log_debug!(
        "sys_handle_replace: handle={:#x} rights={:?}",
        handle_value,
        rights
    );
    process.ensure_alive()?;

    process.handles().replace(handle_value, rights)
}

/// Move a handle into `dest`'s table
///
/// Requires `TRANSFER`. Both processes must be alive.
pub fn sys_handle_transfer(
    _kernel: &Kernel,
    process: &Process,
    handle_value: HandleValue,
    dest: &Process,
) -> Result<HandleValue> {
    log_debug!(
        "sys_handle_transfer: handle={:#x} from={} to={}",
        handle_value,
        process.koid(),
        dest.koid()
    );
    process.ensure_alive()?;
    dest.ensure_alive()?;

    process
        .handles()
        .transfer(handle_value, dest.handles())
        .map_err(|err| {
            log_error!("sys_handle_transfer: {}", err);
            err
        })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::object::{EventDispatcher, RightsCheckable};
    use crate::kernel::KernelConfig;

    fn setup() -> (Kernel, std::sync::Arc<Process>, HandleValue) {
        let kernel = Kernel::new(KernelConfig::default());
        let process = kernel.create_process("handles");
        let event = process
            .handles()
            .add(EventDispatcher::create(&kernel).unwrap())
            .unwrap();
        (kernel, process, event)
    }

    #[test]
    fn test_close_invalid_is_ok() {
        let (kernel, process, _) = setup();
        assert_eq!(sys_handle_close(&kernel, &process, HANDLE_INVALID), Ok(()));
    }

    #[test]
    fn test_close_twice() {
        let (kernel, process, event) = setup();
        sys_handle_close(&kernel, &process, event).unwrap();
        assert_eq!(
            sys_handle_close(&kernel, &process, event),
            Err(Error::BadHandle)
        );
    }

    #[test]
    fn test_close_many_reports_first_failure() {
        let (kernel, process, event) = setup();
        let dup = sys_handle_duplicate(&kernel, &process, event, Rights::SAME_RIGHTS).unwrap();
        assert_eq!(
            sys_handle_close_many(&kernel, &process, &[event, 0x7fff_fff1, dup, HANDLE_INVALID]),
            Err(Error::BadHandle)
        );
        assert_eq!(process.handles().count(), 0);
    }

    #[test]
    fn test_duplicate_cannot_widen() {
        let (kernel, process, event) = setup();
        let narrow = sys_handle_duplicate(&kernel, &process, event, Rights::DUPLICATE | Rights::WAIT)
            .unwrap();
        assert_eq!(
            sys_handle_duplicate(&kernel, &process, narrow, Rights::WAIT | Rights::SIGNAL),
            Err(Error::AccessDenied)
        );
        assert_eq!(process.handles().count(), 2);
    }

    #[test]
    fn test_replace_invalidates_old() {
        let (kernel, process, event) = setup();
        let new = sys_handle_replace(&kernel, &process, event, Rights::WAIT).unwrap();
        assert_eq!(process.handles().get(event).unwrap_err(), Error::BadHandle);
        assert_eq!(process.handles().get(new).unwrap().rights(), Rights::WAIT);
    }

    #[test]
    fn test_transfer_between_processes() {
        let (kernel, process, event) = setup();
        let other = kernel.create_process("peer");
        let moved = sys_handle_transfer(&kernel, &process, event, &other).unwrap();
        assert_eq!(process.handles().count(), 0);
        assert_eq!(other.handles().count(), 1);
        assert!(other.handles().get(moved).is_ok());
    }

    #[test]
    fn test_dead_process() {
        let (kernel, process, event) = setup();
        process.terminate();
        assert_eq!(
            sys_handle_close(&kernel, &process, event),
            Err(Error::BadState)
        );
    }
}

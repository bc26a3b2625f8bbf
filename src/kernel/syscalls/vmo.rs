// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! VMO System Calls
//!
//! This module implements the VMO (Virtual Memory Object) system calls.
//!
//! # Syscalls Implemented
//!
//! - `vmo_create` - Create a new anonymous VMO
//! - `vmo_read` - Read from a VMO
//! - `vmo_write` - Write to a VMO
//! - `vmo_get_size` - Query the size of a VMO
//!
//! # Design
//!
//! - Handles to VMOs have rights (READ, WRITE, MAP, DUPLICATE)
//! - All operations validate handle rights before proceeding
//! - Reads and writes fault every page they touch; on a pager-backed VMO
//!   this blocks until the pager supplies the page

use crate::kernel::object::{HandleValue, Rights, VmoDispatcher};
use crate::kernel::process::Process;
use crate::kernel::Kernel;
use crate::rustux::errors::*;

// Import logging macros
use crate::{log_debug, log_trace};

/// Create an anonymous VMO
///
/// `size` is rounded up to whole pages. `options` must be 0.
pub fn sys_vmo_create(
    kernel: &Kernel,
    process: &Process,
    size: u64,
    options: u32,
) -> Result<HandleValue> {
    log_debug!("sys_vmo_create: size={:#x} options={:#x}", size, options);
    process.ensure_alive()?;

    let handle = VmoDispatcher::create(kernel, size, options)?;
    let value = process.handles().add(handle)?;
    log_debug!("sys_vmo_create: handle={:#x}", value);
    Ok(value)
}

/// Read from a VMO
///
/// Requires `READ`. Returns the number of bytes read, which is short when
/// the range runs past the end of the VMO.
pub fn sys_vmo_read(
    _kernel: &Kernel,
    process: &Process,
    handle_value: HandleValue,
    offset: u64,
    buf: &mut [u8],
) -> Result<usize> {
    log_trace!(
        "sys_vmo_read: handle={:#x} offset={:#x} len={}",
        handle_value,
        offset,
        buf.len()
    );
    process.ensure_alive()?;

    let vmo = process.handles().get_vmo(handle_value, Rights::READ)?;
    vmo.read(offset, buf)
}

/// Write to a VMO
///
/// Requires `WRITE`. Returns the number of bytes written.
pub fn sys_vmo_write(
    _kernel: &Kernel,
    process: &Process,
    handle_value: HandleValue,
    offset: u64,
    buf: &[u8],
) -> Result<usize> {
    log_trace!(
        "sys_vmo_write: handle={:#x} offset={:#x} len={}",
        handle_value,
        offset,
        buf.len()
    );
    process.ensure_alive()?;

    let vmo = process.handles().get_vmo(handle_value, Rights::WRITE)?;
    vmo.write(offset, buf)
}

/// Size of a VMO in bytes
pub fn sys_vmo_get_size(_kernel: &Kernel, process: &Process, handle_value: HandleValue) -> Result<u64> {
    log_trace!("sys_vmo_get_size: handle={:#x}", handle_value);
    process.ensure_alive()?;

    let vmo = process.handles().get_vmo(handle_value, Rights::empty())?;
    Ok(vmo.size())
}

// ============================================================================
// Tests
// ============================================================================

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Pager System Calls
//!
//! # Syscalls Implemented
//!
//! - `pager_create` - Create a pager
//! - `pager_create_vmo` - Create a VMO whose pages the pager supplies
//! - `pager_detach_vmo` - Stop serving a VMO
//! - `pager_supply_pages` - Move pages from an auxiliary VMO into a
//!   pager-backed VMO
//!
//! # Rights
//!
//! | Call | Handle | Right |
//! |------|--------|-------|
//! | `pager_create_vmo` | pager | `MANAGE_VMO` |
//! | `pager_create_vmo` | port | `WRITE` |
//! | `pager_detach_vmo` | pager | `MANAGE_VMO` |
//! | `pager_supply_pages` | pager | `MANAGE_VMO` |
//! | `pager_supply_pages` | aux vmo | `READ`, `WRITE` |

use crate::kernel::object::{HandleValue, PagerDispatcher, Rights};
use crate::kernel::process::Process;
use crate::kernel::Kernel;
use crate::rustux::errors::*;

// Import logging macros
use crate::{log_debug, log_info};

/// Create a pager
///
/// `options` must be 0.
pub fn sys_pager_create(kernel: &Kernel, process: &Process, options: u32) -> Result<HandleValue> {
    log_debug!("sys_pager_create: options={:#x}", options);
    process.ensure_alive()?;

    let handle = PagerDispatcher::create(kernel, options)?;
    let value = process.handles().add(handle)?;
    log_debug!("sys_pager_create: handle={:#x}", value);
    Ok(value)
}

/// Create a pager-backed VMO
///
/// Page requests for the VMO are queued on `port_value` with `key`.
pub fn sys_pager_create_vmo(
    kernel: &Kernel,
    process: &Process,
    pager_value: HandleValue,
    options: u32,
    port_value: HandleValue,
    key: u64,
    size: u64,
) -> Result<HandleValue> {
    log_debug!(
        "sys_pager_create_vmo: pager={:#x} options={:#x} port={:#x} key={} size={:#x}",
        pager_value,
        options,
        port_value,
        key,
        size
    );
    process.ensure_alive()?;

    let table = process.handles();
    let pager = table.get_pager(pager_value, Rights::MANAGE_VMO)?;
    let port = table.get_port(port_value, Rights::WRITE)?;

    let handle = pager.create_vmo(kernel, options, port, key, size)?;
    match table.try_add(handle) {
        Ok(value) => {
            log_info!("sys_pager_create_vmo: handle={:#x}", value);
            Ok(value)
        }
        Err((err, handle)) => {
            // The pager never learns about a VMO it could not be handed.
            if let Some(source) = handle.object().as_vmo().and_then(|vmo| vmo.page_source()) {
                source.discard();
            }
            drop(handle);
            Err(err)
        }
    }
}

/// Detach a VMO from its pager
///
/// Pending and future faults on the VMO fail with `BadState`.
pub fn sys_pager_detach_vmo(
    _kernel: &Kernel,
    process: &Process,
    pager_value: HandleValue,
    vmo_value: HandleValue,
) -> Result {
    log_debug!(
        "sys_pager_detach_vmo: pager={:#x} vmo={:#x}",
        pager_value,
        vmo_value
    );
    process.ensure_alive()?;

    let table = process.handles();
    let pager = table.get_pager(pager_value, Rights::MANAGE_VMO)?;
    let vmo = table.get_vmo(vmo_value, Rights::empty())?;
    pager.detach_vmo(&vmo)
}

/// Supply `[offset, offset + length)` of a pager-backed VMO
///
/// The pages are taken from `aux_value` starting at `aux_offset`. All
/// offsets and the length must be page aligned.
#[allow(clippy::too_many_arguments)]
pub fn sys_pager_supply_pages(
    _kernel: &Kernel,
    process: &Process,
    pager_value: HandleValue,
    vmo_value: HandleValue,
    offset: u64,
    length: u64,
    aux_value: HandleValue,
    aux_offset: u64,
) -> Result {
    log_debug!(
        "sys_pager_supply_pages: pager={:#x} vmo={:#x} offset={:#x} length={:#x} aux={:#x} aux_offset={:#x}",
        pager_value,
        vmo_value,
        offset,
        length,
        aux_value,
        aux_offset
    );
    process.ensure_alive()?;

    let table = process.handles();
    let pager = table.get_pager(pager_value, Rights::MANAGE_VMO)?;
    let vmo = table.get_vmo(vmo_value, Rights::empty())?;
    let aux = table.get_vmo(aux_value, Rights::READ | Rights::WRITE)?;
    pager.supply_pages(&vmo, offset, length, &aux, aux_offset)
}

// ============================================================================
// Tests
// ============================================================================

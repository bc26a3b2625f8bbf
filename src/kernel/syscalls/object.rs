// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Object System Calls
//!
//! Generic operations that apply to any kernel object.
//!
//! # Syscalls Implemented
//!
//! - `object_signal` - Set or clear user signals on an object
//! - `object_get_info` - Query information about an object
//! - `event_create` - Create an event object
//!
//! # Info Topics
//!
//! | Topic | Object | Right |
//! |-------|--------|-------|
//! | `HandleBasic` | any | none |
//! | `HandleCount` | any | `INSPECT` |
//! | `PortInfo` | port | `INSPECT` |
//! | `PagerInfo` | pager | `INSPECT` |
//! | `ProcessHandleStats` | calling process | none |

use crate::kernel::object::diagnostics::{
    process_handle_stats, HandleBasicInfo, PagerInfo, PortInfo, ProcessHandleStats,
};
use crate::kernel::object::{EventDispatcher, HandleValue, Rights, RightsCheckable, Signals};
use crate::kernel::process::Process;
use crate::kernel::Kernel;
use crate::rustux::errors::*;

// Import logging macros
use crate::log_debug;

/// ============================================================================
/// Object Signal
/// ============================================================================

/// Clear then set user signals on an object
///
/// Requires `SIGNAL`. Only the object's user-settable signals may be
/// named; anything else is `InvalidArgs`.
pub fn sys_object_signal(
    _kernel: &Kernel,
    process: &Process,
    handle_value: HandleValue,
    clear: Signals,
    set: Signals,
) -> Result {
    log_debug!(
        "sys_object_signal: handle={:#x} clear={:?} set={:?}",
        handle_value,
        clear,
        set
    );
    process.ensure_alive()?;

    let handle = process.handles().get(handle_value)?;
    handle.require(Rights::SIGNAL)?;
    handle.object().waitable().user_signal(clear, set)
}

/// Create an event
///
/// `options` must be 0.
pub fn sys_event_create(kernel: &Kernel, process: &Process, options: u32) -> Result<HandleValue> {
    log_debug!("sys_event_create: options={:#x}", options);
    process.ensure_alive()?;

    if options != 0 {
        return Err(Error::InvalidArgs);
    }
    let handle = EventDispatcher::create(kernel)?;
    let value = process.handles().add(handle)?;
    log_debug!("sys_event_create: handle={:#x}", value);
    Ok(value)
}

/// ============================================================================
/// Object Info
/// ============================================================================

/// Information topic
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoTopic {
    HandleBasic = 2,
    HandleCount = 4,
    PortInfo = 30,
    PagerInfo = 31,
    ProcessHandleStats = 32,
}

/// Result of `object_get_info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectInfo {
    HandleBasic(HandleBasicInfo),
    HandleCount(usize),
    Port(PortInfo),
    Pager(PagerInfo),
    ProcessHandleStats(ProcessHandleStats),
}

/// Query information about the object behind a handle
///
/// `ProcessHandleStats` describes the calling process and ignores
/// `handle_value`. A topic that does not apply to the object type is
/// `BadHandle`, as for any typed lookup.
pub fn sys_object_get_info(
    _kernel: &Kernel,
    process: &Process,
    handle_value: HandleValue,
    topic: InfoTopic,
) -> Result<ObjectInfo> {
    log_debug!(
        "sys_object_get_info: handle={:#x} topic={:?}",
        handle_value,
        topic
    );
    process.ensure_alive()?;

    let table = process.handles();
    let info = match topic {
        InfoTopic::HandleBasic => {
            let handle = table.get(handle_value)?;
            ObjectInfo::HandleBasic(HandleBasicInfo::from_parts(handle.object(), handle.rights()))
        }
        InfoTopic::HandleCount => {
            let handle = table.get(handle_value)?;
            handle.require(Rights::INSPECT)?;
            ObjectInfo::HandleCount(handle.object().dispatcher().base().ref_count())
        }
        InfoTopic::PortInfo => ObjectInfo::Port(table.get_port(handle_value, Rights::INSPECT)?.info()),
        InfoTopic::PagerInfo => {
            ObjectInfo::Pager(table.get_pager(handle_value, Rights::INSPECT)?.info())
        }
        InfoTopic::ProcessHandleStats => ObjectInfo::ProcessHandleStats(process_handle_stats(process)),
    };
    Ok(info)
}

// ============================================================================
// Tests
// ============================================================================

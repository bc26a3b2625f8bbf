// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Port System Calls
//!
//! This module implements the port-related system calls for inter-process
//! communication via packet queues.
//!
//! # Syscalls Implemented
//!
//! - `port_create` - Create a new port
//! - `port_queue` - Queue a packet to a port
//! - `port_wait` - Wait for a packet from a port
//! - `port_cancel` - Cancel async waits and their pending packets
//!
//! # Design
//!
//! - User mode may only queue `User` packets; signal and page packets are
//!   produced by the kernel
//! - `port_queue` never blocks: a full port is `NoResources` and nothing
//!   is queued
//! - Deadline-based waiting

use crate::kernel::object::{HandleValue, PacketKind, PortDispatcher, PortPacket, Queueable, Rights};
use crate::kernel::process::Process;
use crate::kernel::Kernel;
use crate::rustux::errors::*;
use crate::rustux::types::*;

// Import logging macros
use crate::{log_debug, log_trace};

/// Create a port
///
/// `capacity` 0 selects the configured default.
pub fn sys_port_create(kernel: &Kernel, process: &Process, capacity: usize) -> Result<HandleValue> {
    log_debug!("sys_port_create: capacity={}", capacity);
    process.ensure_alive()?;

    let handle = PortDispatcher::create(kernel, capacity)?;
    let value = process.handles().add(handle)?;
    log_debug!("sys_port_create: handle={:#x}", value);
    Ok(value)
}

/// Queue a user packet
///
/// Requires `WRITE`.
///
/// # Returns
///
/// - `Err(Error::InvalidArgs)` for a packet that is not a user packet
/// - `Err(Error::NoResources)` when the port is full
pub fn sys_port_queue(
    _kernel: &Kernel,
    process: &Process,
    handle_value: HandleValue,
    packet: PortPacket,
) -> Result {
    log_trace!(
        "sys_port_queue: handle={:#x} key={} kind={:?}",
        handle_value,
        packet.key,
        packet.kind
    );
    process.ensure_alive()?;

    if packet.kind != PacketKind::User {
        return Err(Error::InvalidArgs);
    }
    let port = process.handles().get_port(handle_value, Rights::WRITE)?;

    let packet = PortPacket {
        status: OK,
        ..packet
    };
    port.queue(packet)
}

/// Wait for the next packet
///
/// Requires `READ`. No table lock is held while blocked; closing the last
/// handle to the port ends the wait with `Canceled`.
pub fn sys_port_wait(
    _kernel: &Kernel,
    process: &Process,
    handle_value: HandleValue,
    deadline: Deadline,
) -> Result<PortPacket> {
    log_trace!("sys_port_wait: handle={:#x} deadline={:?}", handle_value, deadline);
    process.ensure_alive()?;

    let port = process.handles().get_port(handle_value, Rights::READ)?;
    port.wait(deadline)
}

/// Cancel async waits armed on the port for `(source, key)`
///
/// Requires `WRITE` on the port and `WAIT` on the source. Returns
/// `NotFound` when nothing was canceled.
pub fn sys_port_cancel(
    _kernel: &Kernel,
    process: &Process,
    handle_value: HandleValue,
    source_value: HandleValue,
    key: u64,
) -> Result {
    log_debug!(
        "sys_port_cancel: port={:#x} source={:#x} key={}",
        handle_value,
        source_value,
        key
    );
    process.ensure_alive()?;

    let port = process.handles().get_port(handle_value, Rights::WRITE)?;
    let source = process.handles().get_object(source_value, Rights::WAIT)?;
    port.cancel(source.koid(), key)
}

// ============================================================================
// Tests
// ============================================================================

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Object Diagnostics
//!
//! Read-only views of kernel objects for debugging and `object_get_info`.
//! Nothing here mutates object state; walkers copy what they need under
//! the owning lock and report after releasing it.

use super::{Handle, ObjectType, Rights, RightsCheckable};
use crate::kernel::process::Process;
use crate::kernel::Kernel;
use crate::log_info;
use crate::rustux::types::*;
use std::collections::BTreeMap;

/// ============================================================================
/// Snapshots
/// ============================================================================

/// One handle table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleInfo {
    pub value: u32,
    pub koid: Koid,
    pub object_type: ObjectType,
    pub rights: Rights,
}

/// Basic facts about a handle's object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleBasicInfo {
    pub koid: Koid,
    pub object_type: ObjectType,
    pub rights: Rights,

    /// Owning references (open handles) on the object
    pub handle_count: usize,
}

impl HandleBasicInfo {
    /// Snapshot `handle`
    pub fn of(handle: &Handle) -> Self {
        Self::from_parts(handle.object(), handle.rights())
    }

    pub(crate) fn from_parts(object: &super::KernelObject, rights: Rights) -> Self {
        Self {
            koid: object.koid(),
            object_type: object.object_type(),
            rights,
            handle_count: object.dispatcher().base().ref_count(),
        }
    }
}

/// Port queue state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortInfo {
    pub koid: Koid,
    pub capacity: usize,

    /// Packets waiting to be dequeued
    pub queued: usize,

    /// Arena slots in use (queued, reserved, or held by async waits)
    pub outstanding: usize,

    pub peak: usize,
    pub async_waits: usize,
    pub blocked_producers: usize,

    /// Readers parked in `wait`
    pub blocked_readers: usize,

    pub closed: bool,
}

/// One page source of a pager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSourceInfo {
    pub id: u64,
    pub key: u64,
    pub port_koid: Koid,
    pub vmo_koid: Option<Koid>,
    pub closed: bool,
    pub port_gone: bool,
    pub requests: u64,
}

/// Pager state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagerInfo {
    pub koid: Koid,
    pub sources: Vec<PageSourceInfo>,
}

/// Handle counts of one process by object type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessHandleStats {
    pub total: usize,
    pub by_type: BTreeMap<ObjectType, usize>,
}

/// Live objects by type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectCensus {
    pub total: usize,
    pub by_type: BTreeMap<ObjectType, usize>,
}

impl ObjectCensus {
    /// Live objects of `obj_type`
    pub fn count(&self, obj_type: ObjectType) -> usize {
        self.by_type.get(&obj_type).copied().unwrap_or(0)
    }
}

/// ============================================================================
/// Walkers
/// ============================================================================

/// Every handle a process holds
pub fn process_handles(process: &Process) -> Vec<HandleInfo> {
    let mut handles = Vec::new();
    process.handles().for_each(|info| handles.push(info));
    handles
}

/// Handle counts of a process by object type
pub fn process_handle_stats(process: &Process) -> ProcessHandleStats {
    let mut stats = ProcessHandleStats::default();
    process.handles().for_each(|info| {
        stats.total += 1;
        *stats.by_type.entry(info.object_type).or_insert(0) += 1;
    });
    stats
}

/// Count live objects
pub fn object_census(kernel: &Kernel) -> ObjectCensus {
    let mut census = ObjectCensus::default();
    kernel.for_each_object(|_, obj_type| {
        census.total += 1;
        *census.by_type.entry(obj_type).or_insert(0) += 1;
    });
    census
}

/// Log a process's handle table
pub fn dump_process(process: &Process) {
    let handles = process_handles(process);
    log_info!(
        "process {} ({}): {} handles",
        process.koid(),
        process.name(),
        handles.len()
    );
    for h in &handles {
        log_info!(
            "  {:#010x} koid={} type={} rights={:?}",
            h.value,
            h.koid,
            h.object_type.name(),
            h.rights
        );
    }
}

/// Log the object census and every process
pub fn dump_objects(kernel: &Kernel) {
    let census = object_census(kernel);
    log_info!("objects: {} live", census.total);
    for (obj_type, count) in &census.by_type {
        log_info!("  {:<8} {}", obj_type.name(), count);
    }
    for process in kernel.processes() {
        dump_process(&process);
    }
}

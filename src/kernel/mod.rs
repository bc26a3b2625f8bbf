// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Rustux Microkernel - Core Kernel Module
//!
//! This module contains the core kernel functionality and the [`Kernel`]
//! context that ties it together.
//!
//! # Design
//!
//! There is no global kernel state. A [`Kernel`] owns the koid allocator,
//! a weak registry of every live object (for enumeration) and the process
//! list; syscalls receive it explicitly. Several kernels can coexist in one
//! address space, which is how the test suites isolate themselves.
//!
//! # Usage
//!
//! ```rust
//! use rustux_kobj::kernel::{Kernel, KernelConfig};
//!
//! let kernel = Kernel::new(KernelConfig::default());
//! let process = kernel.create_process("init");
//! assert_eq!(process.name(), "init");
//! kernel.shutdown();
//! ```

pub mod cmdline;
pub mod debug;
pub mod lib;
pub mod object;
pub mod process;
pub mod sync;
pub mod syscalls;
pub mod vm;

#[cfg(test)]
mod tests;

pub use cmdline::{Cmdline, KernelConfig};

use crate::kernel::object::{Dispatcher, KernelObject, ObjectType};
use crate::kernel::process::{Process, ProcessList};
use crate::kernel::sync::SpinMutex;
use crate::rustux::types::*;
use crate::{log_debug, log_info};
use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::BTreeMap;
use std::sync::Arc;

/// First koid handed out; lower values are reserved
pub const KOID_FIRST: Koid = 1024;

/// ============================================================================
/// Koid Allocator
/// ============================================================================

/// Monotonic kernel object id allocator
pub struct KoidAllocator {
    next: AtomicU64,
}

impl KoidAllocator {
    /// Create an allocator starting at [`KOID_FIRST`]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(KOID_FIRST),
        }
    }

    /// Allocate a fresh koid; values are never reused
    pub fn alloc(&self) -> Koid {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for KoidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// ============================================================================
/// Object Registry
/// ============================================================================

/// Live objects by koid
///
/// Objects enter on creation and leave when they are finalized, so the
/// registry only ever holds objects that still have handles.
pub struct ObjectRegistry {
    records: SpinMutex<BTreeMap<Koid, ObjectType>>,
}

impl ObjectRegistry {
    fn new() -> Self {
        Self {
            records: SpinMutex::new(BTreeMap::new()),
        }
    }

    fn insert(&self, koid: Koid, obj_type: ObjectType) {
        self.records.lock().insert(koid, obj_type);
    }

    pub(crate) fn remove(&self, koid: Koid) {
        self.records.lock().remove(&koid);
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check if no object is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// ============================================================================
/// Kernel Context
/// ============================================================================

/// Kernel context
pub struct Kernel {
    config: KernelConfig,
    koids: KoidAllocator,
    objects: Arc<ObjectRegistry>,
    processes: Arc<ProcessList>,
}

impl Kernel {
    /// Create a kernel with the given configuration
    pub fn new(config: KernelConfig) -> Self {
        log_info!(
            "kernel: max_handles={} port_capacity={}/{} pager_max_vmo={:#x}",
            config.max_handles,
            config.port_default_capacity,
            config.port_max_capacity,
            config.pager_max_vmo_size
        );
        Self {
            config,
            koids: KoidAllocator::new(),
            objects: Arc::new(ObjectRegistry::new()),
            processes: Arc::new(ProcessList::new(Vec::new())),
        }
    }

    /// Create a kernel configured from a command line string
    pub fn from_cmdline(cmdline: &str) -> Self {
        Self::new(KernelConfig::from_cmdline(&Cmdline::parse(cmdline)))
    }

    /// Active configuration
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Allocate a koid
    pub fn alloc_koid(&self) -> Koid {
        self.koids.alloc()
    }

    /// Record a new object for enumeration
    ///
    /// The object removes itself when its last handle is closed.
    pub fn register_object(&self, object: &KernelObject) {
        let base = object.dispatcher().base();
        base.set_registry(Arc::downgrade(&self.objects));
        self.objects.insert(base.koid(), base.obj_type());
    }

    /// Live object registry
    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    /// Walk every live (not yet finalized) object
    pub fn for_each_object(&self, mut f: impl FnMut(Koid, ObjectType)) {
        let live: Vec<(Koid, ObjectType)> = self
            .objects
            .records
            .lock()
            .iter()
            .map(|(k, t)| (*k, *t))
            .collect();
        for (koid, obj_type) in live {
            f(koid, obj_type);
        }
    }

    /// Create a process
    ///
    /// The process stays in the kernel's list until it terminates.
    pub fn create_process(&self, name: &str) -> Arc<Process> {
        let process = Arc::new(Process::new(
            self.alloc_koid(),
            name,
            self.config.max_handles,
            Arc::downgrade(&self.processes),
        ));
        log_debug!("process created: koid={} name={}", process.koid(), name);
        self.processes.lock().push(process.clone());
        process
    }

    /// Live processes in creation order
    pub fn processes(&self) -> Vec<Arc<Process>> {
        self.processes.lock().clone()
    }

    /// Terminate every process in creation order
    pub fn shutdown(&self) {
        let processes: Vec<Arc<Process>> = core::mem::take(&mut *self.processes.lock());
        log_info!("kernel shutdown: {} processes", processes.len());
        for process in processes {
            process.terminate();
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

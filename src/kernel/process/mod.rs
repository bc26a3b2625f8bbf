// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Process Management
//!
//! A process here is a named owner of a handle table. Syscalls resolve
//! handle values against the calling process's table.
//!
//! # Process States
//!
//! ```text
//! Running -> Dead
//! ```
//!
//! Termination closes every handle the process holds and takes the
//! process off its kernel's list. It is idempotent, and every later
//! syscall on the process fails with `BadState`.
//!
//! # Usage
//!
//! ```rust
//! use rustux_kobj::kernel::{Kernel, KernelConfig};
//!
//! let kernel = Kernel::new(KernelConfig::default());
//! let process = kernel.create_process("app");
//! process.terminate();
//! assert!(!process.is_alive());
//! ```

use crate::kernel::object::HandleTable;
use crate::kernel::sync::SpinMutex;
use crate::log_debug;
use crate::rustux::errors::*;
use crate::rustux::types::*;
use std::sync::{Arc, Weak};

/// Processes a kernel keeps alive
pub(crate) type ProcessList = SpinMutex<Vec<Arc<Process>>>;

/// ============================================================================
/// Process State
/// ============================================================================

/// Process state
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Process is running
    Running = 0,

    /// Process is dead (handles closed)
    Dead = 1,
}

impl ProcessState {
    /// Check if process is alive
    pub const fn is_alive(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// ============================================================================
/// Process
/// ============================================================================

/// Process
pub struct Process {
    koid: Koid,
    name: String,
    state: SpinMutex<ProcessState>,
    handles: HandleTable,
    list: Weak<ProcessList>,
}

impl Process {
    /// Create a running process with an empty handle table
    pub(crate) fn new(koid: Koid, name: &str, max_handles: usize, list: Weak<ProcessList>) -> Self {
        Self {
            koid,
            name: name.to_string(),
            state: SpinMutex::new(ProcessState::Running),
            handles: HandleTable::new(koid, max_handles),
            list,
        }
    }

    /// Process koid
    pub fn koid(&self) -> Koid {
        self.koid
    }

    /// Process name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    pub fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    /// Check if process is alive
    pub fn is_alive(&self) -> bool {
        self.state().is_alive()
    }

    /// Fail with `BadState` unless the process is alive
    pub fn ensure_alive(&self) -> Result {
        if self.is_alive() {
            Ok(())
        } else {
            Err(Error::BadState)
        }
    }

    /// Handle table
    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Terminate the process, closing every handle
    pub fn terminate(&self) {
        {
            let mut state = self.state.lock();
            if *state == ProcessState::Dead {
                return;
            }
            *state = ProcessState::Dead;
        }
        let closed = self.handles.close_all();

        // The list may hold the last reference; drop it outside the lock.
        let removed = self.list.upgrade().and_then(|list| {
            let mut list = list.lock();
            let pos = list.iter().position(|p| p.koid == self.koid)?;
            Some(list.remove(pos))
        });
        drop(removed);

        log_debug!(
            "process terminated: koid={} name={} handles_closed={}",
            self.koid,
            self.name,
            closed
        );
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// ============================================================================
/// Tests
/// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::object::EventDispatcher;
    use crate::kernel::{Kernel, KernelConfig};

    #[test]
    fn test_process_state() {
        assert!(ProcessState::Running.is_alive());
        assert!(!ProcessState::Dead.is_alive());
    }

    #[test]
    fn test_terminate_closes_handles() {
        let kernel = Kernel::new(KernelConfig::default());
        let process = kernel.create_process("p");
        let hv = process
            .handles()
            .add(EventDispatcher::create(&kernel).unwrap())
            .unwrap();
        let object = process.handles().get(hv).unwrap().object().clone();

        process.terminate();
        assert!(object.dispatcher().base().is_destroyed());
        assert_eq!(process.ensure_alive(), Err(Error::BadState));
        assert_eq!(process.handles().count(), 0);

        // Idempotent.
        process.terminate();
        assert_eq!(process.state(), ProcessState::Dead);
    }
}

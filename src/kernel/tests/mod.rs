// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Rustux Kernel Test Suite
//!
//! Cross-module tests of the object core. Unit tests live next to the code
//! they cover; the suites here drive several objects together, mostly
//! through the syscall layer and often from several threads.
//!
//! # Organization
//!
//! - [`handle_tests`] - Reference counting, rights and handle tables
//! - [`port_tests`] - Packet ordering, capacity and async waits
//! - [`pager_tests`] - Demand paging, detach and teardown races
//! - [`conformance`] - End-to-end scenarios run as one named suite

mod handle_tests;

use crate::kernel::debug::init_test_logging;
use crate::kernel::object::{HandleValue, Rights};
use crate::kernel::process::Process;
use crate::kernel::{Kernel, KernelConfig};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// A kernel with one process
pub(crate) struct TestKernel {
    pub kernel: Kernel,
    pub process: Arc<Process>,
}

impl TestKernel {
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        init_test_logging();
        let kernel = Kernel::new(config);
        let process = kernel.create_process("test");
        Self { kernel, process }
    }

    /// Rights of a handle in the test process
    pub fn rights(&self, value: HandleValue) -> Rights {
        use crate::kernel::object::RightsCheckable;
        self.process.handles().get(value).map_or(Rights::empty(), |h| h.rights())
    }
}

/// Spin until `cond` holds, failing the test after a generous timeout
pub(crate) fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

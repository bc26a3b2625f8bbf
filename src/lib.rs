// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Rustux Kernel Object Core
//!
//! This crate contains the resource-management core of the Rustux
//! microkernel: kernel objects and their reference counting, handles and
//! rights, waitable signal state, bounded ports and the demand-paging
//! protocol spoken between the kernel and a user-mode pager.
//!
//! # Layout
//!
//! - [`rustux`] - Common types, status codes and the kernel error type
//! - [`kernel`] - The kernel proper: objects, VM, sync, processes, syscalls
//!
//! # Usage
//!
//! ```rust
//! use rustux_kobj::kernel::{Kernel, KernelConfig};
//! use rustux_kobj::kernel::syscalls::port::{sys_port_create, sys_port_queue, sys_port_wait};
//! use rustux_kobj::kernel::object::PortPacket;
//! use rustux_kobj::rustux::types::Deadline;
//!
//! let kernel = Kernel::new(KernelConfig::default());
//! let process = kernel.create_process("demo");
//!
//! let port = sys_port_create(&kernel, &process, 0).unwrap();
//! sys_port_queue(&kernel, &process, port, PortPacket::user(7, [1, 2, 3, 4])).unwrap();
//! let packet = sys_port_wait(&kernel, &process, port, Deadline::Immediate).unwrap();
//! assert_eq!(packet.key, 7);
//! ```

pub mod rustux;
pub mod kernel;

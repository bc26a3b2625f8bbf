// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Virtual Memory Subsystem
//!
//! The parts of the VM layer the object core depends on. Address spaces
//! and page tables live elsewhere; this module holds the kernel side of
//! the demand-paging protocol.
//!
//! # Organization
//!
//! - [`page_source`] - Bridge from a pager-backed VMO to its pager's port

pub mod page_source;

pub use page_source::PageSource;

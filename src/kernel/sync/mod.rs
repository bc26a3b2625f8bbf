// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Synchronization Primitives
//!
//! This module provides core synchronization primitives for the Rustux kernel.
//!
//! # Primitives
//!
//! - **SpinMutex**: Short, non-blocking critical sections (object state)
//! - **Event**: Single-signal primitive a thread can block on with a deadline
//!
//! # Design
//!
//! Spinlocks guard object fields and are never held across a blocking
//! operation. Anything that parks a thread goes through [`Event`] or the
//! port queue's condition variables.

pub mod event;
pub mod spin;

// Re-exports
pub use self::event::*;
pub use self::spin::*;

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Event
//!
//! Events allow threads to wait for a signal and be woken up when the
//! event is signaled. The signaler may attach a wait result which every
//! woken thread receives (e.g. `Canceled` when the waited object died).
//!
//! # Design
//!
//! - **Manual reset**: Event remains signaled until explicitly unsignaled
//! - **Auto reset**: Event automatically resets after waking one waiter
//! - **Deadlines**: Waits honour a [`Deadline`]
//!
//! # Usage
//!
//! ```rust
//! use rustux_kobj::kernel::sync::{Event, EventFlags};
//! use rustux_kobj::rustux::types::Deadline;
//!
//! let event = Event::new(false, EventFlags::empty());
//! event.signal();
//! assert!(event.wait_deadline(Deadline::Immediate).is_ok());
//! event.unsignal();
//! ```

use crate::rustux::errors::*;
use crate::rustux::types::Deadline;
use parking_lot::{Condvar, Mutex};

/// ============================================================================
/// Event Flags
/// ============================================================================

/// Event flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFlags {
    /// Auto-unsignal after waking one thread
    pub auto_unsignal: bool,
}

impl EventFlags {
    /// No flags
    pub const fn empty() -> Self {
        Self { auto_unsignal: false }
    }

    /// Auto unsignal flag
    pub const fn auto_unsignal() -> Self {
        Self { auto_unsignal: true }
    }
}

/// ============================================================================
/// Event
/// ============================================================================

struct EventState {
    signaled: bool,
    result: Result,
}

/// Event synchronization primitive
///
/// Threads can wait on events and be woken when the event is signaled.
pub struct Event {
    state: Mutex<EventState>,
    cond: Condvar,
    flags: EventFlags,
}

impl Event {
    /// Create a new event
    ///
    /// # Arguments
    ///
    /// * `initial` - Initial signaled state
    /// * `flags` - Event flags
    pub fn new(initial: bool, flags: EventFlags) -> Self {
        Self {
            state: Mutex::new(EventState {
                signaled: initial,
                result: Ok(()),
            }),
            cond: Condvar::new(),
            flags,
        }
    }

    /// Check if the event is signaled
    pub fn is_signaled(&self) -> bool {
        self.state.lock().signaled
    }

    /// Signal the event with a successful wait result
    pub fn signal(&self) {
        self.signal_etc(Ok(()));
    }

    /// Signal the event, handing `result` to the woken waiters
    pub fn signal_etc(&self, result: Result) {
        let mut state = self.state.lock();
        state.signaled = true;
        state.result = result;

        if self.flags.auto_unsignal {
            self.cond.notify_one();
        } else {
            self.cond.notify_all();
        }
    }

    /// Clear the signal state
    pub fn unsignal(&self) {
        self.state.lock().signaled = false;
    }

    /// Wait for the event to be signaled
    ///
    /// # Returns
    ///
    /// - The result passed to `signal_etc` if signaled
    /// - `Err(Error::TimedOut)` if the deadline passed first
    pub fn wait_deadline(&self, deadline: Deadline) -> Result {
        let mut state = self.state.lock();

        loop {
            if state.signaled {
                if self.flags.auto_unsignal {
                    state.signaled = false;
                }
                return state.result;
            }

            match deadline {
                Deadline::Immediate => return Err(Error::TimedOut),
                Deadline::Infinite => self.cond.wait(&mut state),
                Deadline::At(at) => {
                    if self.cond.wait_until(&mut state, at).timed_out() && !state.signaled {
                        return Err(Error::TimedOut);
                    }
                }
            }
        }
    }

    /// Wait forever
    pub fn wait(&self) -> Result {
        self.wait_deadline(Deadline::Infinite)
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new(false, EventFlags::empty())
    }
}

/// ============================================================================
/// Tests
/// ============================================================================

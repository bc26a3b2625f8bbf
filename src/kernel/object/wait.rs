// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Synchronous Signal Waits
//!
//! A [`SignalWaiter`] pairs a one-shot observer with a kernel [`Event`] so
//! a thread can block until an object's signals match.
//!
//! # Design
//!
//! The waiter is armed before the caller inspects whatever state the
//! signal guards. A transition that happens between arming and blocking is
//! therefore never missed:
//!
//! ```text
//! arm(mask)          -> observer installed (fires now if already matching)
//! check state        -> done? disarm and return
//! wait(deadline)     -> woken by match, cancel, or timeout
//! ```

use super::signals::{SignalObserver, SignalState, Signals, WaitMode, WaiterToken};
use crate::kernel::sync::{Event, SpinMutex};
use crate::rustux::errors::*;
use crate::rustux::types::Deadline;
use std::sync::Arc;

/// Observer that wakes a blocked thread
struct WaitStateObserver {
    event: Event,
    observed: SpinMutex<Signals>,
}

impl SignalObserver for WaitStateObserver {
    fn on_match(&self, observed: Signals) {
        *self.observed.lock() = observed;
        self.event.signal();
    }

    fn on_cancel(&self, observed: Signals) {
        *self.observed.lock() = observed;
        self.event.signal_etc(Err(Error::Canceled));
    }
}

/// One armed synchronous wait
pub struct SignalWaiter<'a> {
    state: &'a SignalState,
    observer: Arc<WaitStateObserver>,
    token: WaiterToken,
}

impl<'a> SignalWaiter<'a> {
    /// Arm a wait for any of `mask` on `state`
    ///
    /// Fails with `Canceled` if the object is already dead.
    pub fn arm(state: &'a SignalState, mask: Signals) -> Result<Self> {
        let observer = Arc::new(WaitStateObserver {
            event: Event::default(),
            observed: SpinMutex::new(Signals::empty()),
        });
        let token = state.register_waiter(mask, WaitMode::OneShot, observer.clone())?;
        Ok(Self {
            state,
            observer,
            token,
        })
    }

    /// Block until the wait fires
    ///
    /// # Returns
    ///
    /// - The signals observed when the wait fired
    /// - `Err(Error::TimedOut)` if the deadline passed first
    /// - `Err(Error::Canceled)` if the object was destroyed
    pub fn wait(self, deadline: Deadline) -> Result<Signals> {
        match self.observer.event.wait_deadline(deadline) {
            Ok(()) => Ok(*self.observer.observed.lock()),
            Err(Error::TimedOut) => {
                if self.state.cancel_waiter(self.token) {
                    return Err(Error::TimedOut);
                }
                // Fired between the timeout and the cancel.
                self.observer.event.wait_deadline(Deadline::Immediate)?;
                Ok(*self.observer.observed.lock())
            }
            Err(e) => Err(e),
        }
    }

    /// Drop the wait without blocking
    pub fn disarm(self) {
        self.state.cancel_waiter(self.token);
    }
}

/// Block until any of `mask` is asserted on `state`
pub fn wait_signals(state: &SignalState, mask: Signals, deadline: Deadline) -> Result<Signals> {
    SignalWaiter::arm(state, mask)?.wait(deadline)
}

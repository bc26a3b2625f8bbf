// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Object Signal State
//!
//! Every kernel object carries a signal bitmask and a list of observers
//! that are notified when the bitmask changes in a way they are interested
//! in. Synchronous waits, async port waits, page faults and page sources
//! are all built on top of this.
//!
//! # Design
//!
//! - **Callbacks under the lock**: Matching observers run while the state
//!   lock is held, so `cancel_waiter` returning means the callback will not
//!   run afterwards
//! - **Fire on registration**: Registering an observer whose interest is
//!   already satisfied fires it before `register_waiter` returns
//! - **Cancellation**: When the owning object dies, every remaining
//!   observer receives `on_cancel` and further registrations fail
//!
//! Observers must not call back into the signal state that invoked them.

use crate::kernel::sync::SpinMutex;
use crate::rustux::errors::*;
use bitflags::bitflags;
use std::sync::Arc;

bitflags! {
    /// Object signal bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Signals: u32 {
        /// Data can be read (port has packets)
        const READABLE = 1 << 0;
        /// Data can be written
        const WRITABLE = 1 << 1;
        /// The other side went away
        const PEER_CLOSED = 1 << 2;
        /// Event-style signaled state
        const SIGNALED = 1 << 3;
        /// Pulsed when a pager supplied pages to a VMO
        const VMO_PAGES_SUPPLIED = 1 << 4;
        /// Asserted once a VMO is detached from its pager
        const VMO_DETACHED = 1 << 5;
        /// The handle being waited on was closed
        const HANDLE_CLOSED = 1 << 23;

        const USER_0 = 1 << 24;
        const USER_1 = 1 << 25;
        const USER_2 = 1 << 26;
        const USER_3 = 1 << 27;
        const USER_4 = 1 << 28;
        const USER_5 = 1 << 29;
        const USER_6 = 1 << 30;
        const USER_7 = 1 << 31;

        /// All user signals
        const USER_ALL = 0xff << 24;
    }
}

/// Identifies one observer registration
pub type WaiterToken = u64;

/// How long an observer stays registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Removed after the first match
    OneShot,

    /// Stays until canceled, firing on every matching change
    Persistent,
}

/// Receives signal notifications
pub trait SignalObserver: Send + Sync {
    /// Interest matched; called with the owner's signal lock held
    fn on_match(&self, observed: Signals);

    /// The owning object was destroyed; called with the owner's signal
    /// lock held
    fn on_cancel(&self, observed: Signals);
}

struct Registration {
    token: WaiterToken,
    interest: Signals,
    mode: WaitMode,
    observer: Arc<dyn SignalObserver>,
}

struct SignalInner {
    signals: Signals,
    observers: Vec<Registration>,
    next_token: WaiterToken,
    canceled: bool,
}

/// ============================================================================
/// Signal State
/// ============================================================================

/// Signal bitmask plus its observers
pub struct SignalState {
    inner: SpinMutex<SignalInner>,
}

impl SignalState {
    /// Create a signal state with `initial` bits asserted
    pub fn new(initial: Signals) -> Self {
        Self {
            inner: SpinMutex::new(SignalInner {
                signals: initial,
                observers: Vec::new(),
                next_token: 1,
                canceled: false,
            }),
        }
    }

    /// Current signal bits
    pub fn current(&self) -> Signals {
        self.inner.lock().signals
    }

    /// Register an observer
    ///
    /// # Returns
    ///
    /// - A token for `cancel_waiter`
    /// - `Err(Error::Canceled)` if the owner is already dead
    pub fn register_waiter(
        &self,
        interest: Signals,
        mode: WaitMode,
        observer: Arc<dyn SignalObserver>,
    ) -> Result<WaiterToken> {
        let mut inner = self.inner.lock();
        if inner.canceled {
            return Err(Error::Canceled);
        }

        let token = inner.next_token;
        inner.next_token += 1;

        let current = inner.signals;
        if current.intersects(interest) {
            observer.on_match(current);
            if mode == WaitMode::OneShot {
                return Ok(token);
            }
        }

        inner.observers.push(Registration {
            token,
            interest,
            mode,
            observer,
        });
        Ok(token)
    }

    /// Remove a registration
    ///
    /// The remaining observers keep their registration order. Returns false if it already fired (one-shot) or was never installed.
    pub fn cancel_waiter(&self, token: WaiterToken) -> bool {
        let mut inner = self.inner.lock();
        match inner.observers.iter().position(|r| r.token == token) {
            Some(pos) => {
                inner.observers.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Clear then set signal bits, notifying matching observers
    ///
    /// An observer fires when one of its interest bits changed and at least
    /// one of them is asserted afterwards.
    pub fn set_signals(&self, clear: Signals, set: Signals) {
        let mut inner = self.inner.lock();
        let old = inner.signals;
        let new = (old - clear) | set;
        if new == old {
            return;
        }
        inner.signals = new;

        let changed = old ^ new;
        inner.observers.retain(|r| {
            if r.interest.intersects(changed) && r.interest.intersects(new) {
                r.observer.on_match(new);
                r.mode == WaitMode::Persistent
            } else {
                true
            }
        });
    }

    /// Assert then immediately deassert `pulse`, waking its observers
    pub fn pulse(&self, pulse: Signals) {
        self.set_signals(Signals::empty(), pulse);
        self.set_signals(pulse, Signals::empty());
    }

    /// Cancel every observer; the owner is being destroyed
    pub fn cancel_all(&self) {
        let mut inner = self.inner.lock();
        inner.canceled = true;
        let signals = inner.signals;
        for r in inner.observers.drain(..) {
            r.observer.on_cancel(signals);
        }
    }

    /// Number of installed observers
    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }

    /// Whether `cancel_all` has run
    pub fn is_canceled(&self) -> bool {
        self.inner.lock().canceled
    }
}

/// ============================================================================
/// Tests
/// ============================================================================

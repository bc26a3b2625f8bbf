// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Event Objects
//!
//! Events are the simplest waitable objects: they carry no state beyond
//! their signal bits. User mode sets and clears `SIGNALED` and the user
//! signals, and waits on them like on any other object.
//!
//! # Usage
//!
//! ```rust
//! use rustux_kobj::kernel::object::{EventDispatcher, Signals, Waitable};
//! use rustux_kobj::kernel::{Kernel, KernelConfig};
//!
//! let kernel = Kernel::new(KernelConfig::default());
//! let handle = EventDispatcher::create(&kernel).unwrap();
//! let event = handle.object().as_event().unwrap();
//! event.user_signal(Signals::empty(), Signals::SIGNALED).unwrap();
//! assert!(event.signal_state().current().contains(Signals::SIGNALED));
//! ```

use super::{Dispatcher, Handle, KernelObject, KernelObjectBase, ObjectType, Rights, Signals, Waitable};
use crate::kernel::Kernel;
use crate::rustux::errors::*;
use std::sync::Arc;

/// Event object
pub struct EventDispatcher {
    base: KernelObjectBase,
}

impl EventDispatcher {
    /// Create an event, returning a handle with the default rights
    pub fn create(kernel: &Kernel) -> Result<Handle> {
        let event = Arc::new(Self {
            base: KernelObjectBase::new(kernel.alloc_koid(), ObjectType::Event, Signals::empty()),
        });
        let rights = event.default_rights();
        let object = KernelObject::Event(event);
        kernel.register_object(&object);
        Ok(Handle::adopt(object, rights))
    }
}

impl Dispatcher for EventDispatcher {
    fn base(&self) -> &KernelObjectBase {
        &self.base
    }

    fn default_rights(&self) -> Rights {
        Rights::BASIC | Rights::SIGNAL
    }

    fn allowed_user_signals(&self) -> Signals {
        Signals::SIGNALED | Signals::USER_ALL
    }
}

impl Waitable for EventDispatcher {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelConfig;

    #[test]
    fn test_event_signal_mask() {
        let kernel = Kernel::new(KernelConfig::default());
        let handle = EventDispatcher::create(&kernel).unwrap();
        let event = handle.object().as_event().unwrap();

        event
            .user_signal(Signals::empty(), Signals::SIGNALED | Signals::USER_2)
            .unwrap();
        assert_eq!(
            event.signal_state().current(),
            Signals::SIGNALED | Signals::USER_2
        );

        assert_eq!(
            event.user_signal(Signals::empty(), Signals::READABLE),
            Err(Error::InvalidArgs)
        );
        event.user_signal(Signals::SIGNALED, Signals::empty()).unwrap();
        assert_eq!(event.signal_state().current(), Signals::USER_2);
    }
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Object Wait System Calls
//!
//! This module implements waiting on object signals.
//!
//! # Syscalls Implemented
//!
//! - `object_wait_one` - Block until a signal is asserted on one object
//! - `object_wait_async` - Arm a port to receive a packet when a signal is
//!   asserted
//!
//! # Design
//!
//! - Synchronous waits register a one-shot observer and block on a
//!   per-wait event; no handle table lock is held while blocked
//! - Closing the last handle to the object ends the wait with `Canceled`

use crate::kernel::object::wait::wait_signals;
use crate::kernel::object::{HandleValue, Rights, RightsCheckable, Signals, WaitMode};
use crate::kernel::process::Process;
use crate::kernel::Kernel;
use crate::rustux::errors::*;
use crate::rustux::types::*;

// Import logging macros
use crate::log_debug;

/// Deliver one packet, then disarm
pub const WAIT_ASYNC_ONCE: u32 = 0;

/// Deliver a packet every time the trigger is asserted
pub const WAIT_ASYNC_REPEATING: u32 = 1;

/// Wait for any of `signals` on one object
///
/// Requires `WAIT`.
///
/// # Returns
///
/// - The signals observed when the wait was satisfied
/// - `Err(Error::TimedOut)` when the deadline passed
/// - `Err(Error::Canceled)` when the object was destroyed while waiting
pub fn sys_object_wait_one(
    _kernel: &Kernel,
    process: &Process,
    handle_value: HandleValue,
    signals: Signals,
    deadline: Deadline,
) -> Result<Signals> {
    log_debug!(
        "sys_object_wait_one: handle={:#x} signals={:?} deadline={:?}",
        handle_value,
        signals,
        deadline
    );
    process.ensure_alive()?;

    let handle = process.handles().get(handle_value)?;
    handle.require(Rights::WAIT)?;

    let observed = wait_signals(handle.object().waitable().signal_state(), signals, deadline)?;
    log_debug!("sys_object_wait_one: observed={:?}", observed);
    Ok(observed)
}

/// Arm `port` to receive a signal packet with `key`
///
/// Requires `WAIT` on the object and `WRITE` on the port. `options` is
/// [`WAIT_ASYNC_ONCE`] or [`WAIT_ASYNC_REPEATING`].
pub fn sys_object_wait_async(
    _kernel: &Kernel,
    process: &Process,
    handle_value: HandleValue,
    port_value: HandleValue,
    key: u64,
    signals: Signals,
    options: u32,
) -> Result {
    log_debug!(
        "sys_object_wait_async: handle={:#x} port={:#x} key={} signals={:?} options={}",
        handle_value,
        port_value,
        key,
        signals,
        options
    );
    process.ensure_alive()?;

    let mode = match options {
        WAIT_ASYNC_ONCE => WaitMode::OneShot,
        WAIT_ASYNC_REPEATING => WaitMode::Persistent,
        _ => return Err(Error::InvalidArgs),
    };

    let source = process.handles().get(handle_value)?;
    source.require(Rights::WAIT)?;
    let port = process.handles().get_port(port_value, Rights::WRITE)?;

    port.wait_async(source.object(), key, signals, mode)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::object::{EventDispatcher, PacketKind, PortDispatcher, Waitable};
    use crate::kernel::KernelConfig;
    use std::thread;
    use std::time::Duration;

    struct Fixture {
        kernel: Kernel,
        process: std::sync::Arc<Process>,
        event: HandleValue,
    }

    impl Fixture {
        fn new() -> Self {
            let kernel = Kernel::new(KernelConfig::default());
            let process = kernel.create_process("waiter");
            let event = process
                .handles()
                .add(EventDispatcher::create(&kernel).unwrap())
                .unwrap();
            Self {
                kernel,
                process,
                event,
            }
        }

        fn signal(&self, set: Signals) {
            let event = self.process.handles().get_event(self.event, Rights::empty()).unwrap();
            event.user_signal(Signals::empty(), set).unwrap();
        }
    }

    #[test]
    fn test_wait_one_already_signaled() {
        let f = Fixture::new();
        f.signal(Signals::SIGNALED);
        let observed = sys_object_wait_one(
            &f.kernel,
            &f.process,
            f.event,
            Signals::SIGNALED,
            Deadline::Immediate,
        )
        .unwrap();
        assert!(observed.contains(Signals::SIGNALED));
    }

    #[test]
    fn test_wait_one_timeout() {
        let f = Fixture::new();
        assert_eq!(
            sys_object_wait_one(
                &f.kernel,
                &f.process,
                f.event,
                Signals::SIGNALED,
                Deadline::after(Duration::from_millis(10)),
            ),
            Err(Error::TimedOut)
        );
        let event = f.process.handles().get_event(f.event, Rights::empty()).unwrap();
        assert_eq!(event.signal_state().observer_count(), 0);
    }

    #[test]
    fn test_wait_one_wakes() {
        let f = Fixture::new();
        let event = f.process.handles().get_event(f.event, Rights::empty()).unwrap();
        let signaler = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            event.user_signal(Signals::empty(), Signals::USER_0).unwrap();
        });
        let observed = sys_object_wait_one(
            &f.kernel,
            &f.process,
            f.event,
            Signals::USER_0,
            Deadline::Infinite,
        )
        .unwrap();
        assert!(observed.contains(Signals::USER_0));
        signaler.join().unwrap();
    }

    #[test]
    fn test_wait_requires_right() {
        let f = Fixture::new();
        let no_wait = f.process.handles().duplicate(f.event, Rights::DUPLICATE).unwrap();
        assert_eq!(
            sys_object_wait_one(
                &f.kernel,
                &f.process,
                no_wait,
                Signals::SIGNALED,
                Deadline::Immediate,
            ),
            Err(Error::AccessDenied)
        );
    }

    #[test]
    fn test_wait_async_delivers() {
        let f = Fixture::new();
        let port = f
            .process
            .handles()
            .add(PortDispatcher::create(&f.kernel, 4).unwrap())
            .unwrap();

        sys_object_wait_async(
            &f.kernel,
            &f.process,
            f.event,
            port,
            9,
            Signals::SIGNALED,
            WAIT_ASYNC_ONCE,
        )
        .unwrap();
        f.signal(Signals::SIGNALED);

        let port = f.process.handles().get_port(port, Rights::READ).unwrap();
        let packet = port.wait(Deadline::Immediate).unwrap();
        assert_eq!(packet.key, 9);
        assert_eq!(packet.kind, PacketKind::SignalOne);
        assert!(packet.signal().unwrap().observed.contains(Signals::SIGNALED));
    }

    #[test]
    fn test_wait_async_bad_options() {
        let f = Fixture::new();
        let port = f
            .process
            .handles()
            .add(PortDispatcher::create(&f.kernel, 4).unwrap())
            .unwrap();
        assert_eq!(
            sys_object_wait_async(&f.kernel, &f.process, f.event, port, 1, Signals::SIGNALED, 7),
            Err(Error::InvalidArgs)
        );
        // A port is not an async wait source.
        assert_eq!(
            sys_object_wait_async(
                &f.kernel,
                &f.process,
                port,
                port,
                1,
                Signals::READABLE,
                WAIT_ASYNC_ONCE
            ),
            Err(Error::InvalidArgs)
        );
    }
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Handle and Reference Counting Tests

use super::TestKernel;
use crate::kernel::object::diagnostics::object_census;
use crate::kernel::object::{
    Dispatcher, EventDispatcher, HandleValue, ObjectType, PortDispatcher, Rights, Signals, Waitable,
};
use crate::kernel::syscalls::handle_ops::*;
use crate::kernel::syscalls::object::sys_event_create;
use crate::kernel::syscalls::object_wait::sys_object_wait_one;
use crate::kernel::KernelConfig;
use crate::rustux::errors::*;
use crate::rustux::types::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

#[test]
fn test_object_lives_while_any_handle_does() {
    let t = TestKernel::new();
    let event = sys_event_create(&t.kernel, &t.process, 0).unwrap();
    let dups: Vec<HandleValue> = (0..4)
        .map(|_| sys_handle_duplicate(&t.kernel, &t.process, event, Rights::SAME_RIGHTS).unwrap())
        .collect();
    let dispatcher = t.process.handles().get_event(event, Rights::empty()).unwrap();

    sys_handle_close(&t.kernel, &t.process, event).unwrap();
    for (i, &dup) in dups.iter().enumerate() {
        assert!(!dispatcher.base().is_destroyed());
        assert_eq!(dispatcher.base().ref_count(), dups.len() - i);
        sys_handle_close(&t.kernel, &t.process, dup).unwrap();
    }
    assert!(dispatcher.base().is_destroyed());
    assert_eq!(object_census(&t.kernel).count(ObjectType::Event), 0);
}

#[test]
fn test_transferred_handle_keeps_object_alive() {
    let t = TestKernel::new();
    let other = t.kernel.create_process("other");
    let event = sys_event_create(&t.kernel, &t.process, 0).unwrap();
    let dispatcher = t.process.handles().get_event(event, Rights::empty()).unwrap();

    let moved = sys_handle_transfer(&t.kernel, &t.process, event, &other).unwrap();
    t.process.terminate();
    assert!(!dispatcher.base().is_destroyed());

    sys_handle_close(&t.kernel, &other, moved).unwrap();
    assert!(dispatcher.base().is_destroyed());
}

#[test]
fn test_transfer_to_dead_process_keeps_handle() {
    let t = TestKernel::new();
    let other = t.kernel.create_process("other");
    let event = sys_event_create(&t.kernel, &t.process, 0).unwrap();
    other.terminate();

    assert_eq!(
        sys_handle_transfer(&t.kernel, &t.process, event, &other),
        Err(Error::BadState)
    );
    assert!(t.process.handles().get(event).is_ok());
}

#[test]
fn test_transfer_requires_right() {
    let t = TestKernel::new();
    let other = t.kernel.create_process("other");
    let event = sys_event_create(&t.kernel, &t.process, 0).unwrap();
    let pinned = sys_handle_replace(&t.kernel, &t.process, event, Rights::WAIT).unwrap();

    assert_eq!(
        sys_handle_transfer(&t.kernel, &t.process, pinned, &other),
        Err(Error::AccessDenied)
    );
    assert_eq!(other.handles().count(), 0);
}

#[test]
fn test_table_limit_leaves_table_unchanged() {
    let t = TestKernel::with_config(KernelConfig {
        max_handles: 2,
        ..KernelConfig::default()
    });
    let event = sys_event_create(&t.kernel, &t.process, 0).unwrap();
    sys_handle_duplicate(&t.kernel, &t.process, event, Rights::SAME_RIGHTS).unwrap();

    assert_eq!(
        sys_handle_duplicate(&t.kernel, &t.process, event, Rights::SAME_RIGHTS),
        Err(Error::NoResources)
    );
    assert_eq!(
        sys_event_create(&t.kernel, &t.process, 0),
        Err(Error::NoResources)
    );
    assert_eq!(t.process.handles().count(), 2);
    let dispatcher = t.process.handles().get_event(event, Rights::empty()).unwrap();
    assert_eq!(dispatcher.base().ref_count(), 2);
    // The event made by the failed create was finalized right away.
    assert_eq!(object_census(&t.kernel).count(ObjectType::Event), 1);
}

#[test]
fn test_close_wakes_waiter_with_canceled() {
    let t = Arc::new(TestKernel::new());
    let event = sys_event_create(&t.kernel, &t.process, 0).unwrap();

    let waiter = {
        let t = t.clone();
        thread::spawn(move || {
            sys_object_wait_one(&t.kernel, &t.process, event, Signals::SIGNALED, Deadline::Infinite)
        })
    };
    let dispatcher = t.process.handles().get_event(event, Rights::empty()).unwrap();
    super::wait_until("waiter to register", || {
        dispatcher.signal_state().observer_count() == 1
    });

    sys_handle_close(&t.kernel, &t.process, event).unwrap();
    assert_eq!(waiter.join().unwrap(), Err(Error::Canceled));
}

#[test]
fn test_concurrent_duplicate_and_close() {
    let t = Arc::new(TestKernel::new());
    let port = t
        .process
        .handles()
        .add(PortDispatcher::create(&t.kernel, 0).unwrap())
        .unwrap();
    let dispatcher = t.process.handles().get_port(port, Rights::empty()).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let t = t.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let dup =
                        sys_handle_duplicate(&t.kernel, &t.process, port, Rights::SAME_RIGHTS)
                            .unwrap();
                    sys_handle_close(&t.kernel, &t.process, dup).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(dispatcher.base().ref_count(), 1);
    assert!(!dispatcher.base().is_destroyed());
    sys_handle_close(&t.kernel, &t.process, port).unwrap();
    assert!(dispatcher.base().is_destroyed());
}

#[test]
fn test_handle_outlives_table_entry() {
    let t = TestKernel::new();
    let handle = EventDispatcher::create(&t.kernel).unwrap();
    let value = t.process.handles().add(handle.duplicate(Rights::SAME_RIGHTS).unwrap()).unwrap();

    t.process.terminate();
    assert!(!handle.object().dispatcher().base().is_destroyed());
    assert_eq!(t.process.handles().get(value).unwrap_err(), Error::BadHandle);
}

/// ============================================================================
/// Rights Monotonicity
/// ============================================================================

fn rights_strategy() -> impl Strategy<Value = Rights> {
    (0u32..(1 << 17)).prop_map(Rights::from_bits_truncate)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every chain of duplicates carries a subset of its parent's rights,
    /// and a rejected duplicate changes nothing.
    #[test]
    fn prop_duplicate_never_widens(requests in proptest::collection::vec(rights_strategy(), 1..12)) {
        let t = TestKernel::new();
        let event = sys_event_create(&t.kernel, &t.process, 0).unwrap();
        let mut current = event;

        for requested in requests {
            let parent = t.rights(current);
            let before = t.process.handles().count();
            match sys_handle_duplicate(&t.kernel, &t.process, current, requested) {
                Ok(dup) => {
                    let rights = t.rights(dup);
                    prop_assert!(parent.contains(rights));
                    prop_assert_eq!(rights, requested);
                    current = dup;
                }
                Err(err) => {
                    let widening = !parent.contains(requested);
                    let no_dup = !parent.contains(Rights::DUPLICATE);
                    prop_assert!(widening || no_dup);
                    prop_assert_eq!(err, Error::AccessDenied);
                    prop_assert_eq!(t.process.handles().count(), before);
                }
            }
        }
    }

    /// Replace never widens either, and a failed replace keeps the handle.
    #[test]
    fn prop_replace_never_widens(requested in rights_strategy()) {
        let t = TestKernel::new();
        let event = sys_event_create(&t.kernel, &t.process, 0).unwrap();
        let parent = t.rights(event);

        match sys_handle_replace(&t.kernel, &t.process, event, requested) {
            Ok(new) => {
                prop_assert!(parent.contains(t.rights(new)));
                prop_assert!(t.process.handles().get(event).is_err());
            }
            Err(err) => {
                prop_assert_eq!(err, Error::AccessDenied);
                prop_assert_eq!(t.rights(event), parent);
            }
        }
    }
}

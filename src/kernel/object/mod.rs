// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Objects & IPC (Zircon-style)
//!
//! This module implements the capability-based kernel object model.
//! All kernel resources are accessed through handles with rights,
//! ensuring fine-grained access control.
//!
//! # Design
//!
//! - **Closed object set**: [`KernelObject`] is a tagged enum over every
//!   constructible object type; behaviour is shared through the
//!   [`Dispatcher`], [`Waitable`], [`Queueable`] and [`RightsCheckable`]
//!   traits rather than an inheritance chain
//! - **Owning references**: Every handle holds one owning reference on its
//!   object. When the last one is dropped the object is finalized exactly
//!   once (`on_zero_handles`) and every registered waiter is canceled
//! - **Memory**: Object memory is held by `Arc`. Internal collaborators
//!   (a pager's port, a page source's VMO) keep memory alive without
//!   keeping the object open
//!
//! # Modules
//!
//! - [`handle`] - Handle, rights and handle table
//! - [`signals`] - Signal bitmask and waiter registrations
//! - [`wait`] - Synchronous waiting on signals
//! - [`event`] - Event objects
//! - [`port`] - Ports and packets
//! - [`vmo`] - Virtual memory objects
//! - [`pager`] - User-mode pagers
//! - [`diagnostics`] - Read-only walkers for introspection

pub mod handle;
pub mod signals;
pub mod wait;
pub mod event;
pub mod port;
pub mod vmo;
pub mod pager;
pub mod diagnostics;

use crate::kernel::sync::SpinOnce;
use crate::kernel::ObjectRegistry;
use crate::rustux::errors::*;
use crate::rustux::types::*;
use crate::{log_debug, log_trace};
use core::sync::atomic::{fence, AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

// Re-exports
pub use event::EventDispatcher;
pub use handle::{Handle, HandleTable, HandleValue, Rights, RightsCheckable, HANDLE_INVALID};
pub use pager::PagerDispatcher;
pub use port::{PacketKind, PacketPayload, PortDispatcher, PortPacket, Queueable};
pub use signals::{SignalObserver, SignalState, Signals, WaitMode, WaiterToken};
pub use vmo::VmoDispatcher;

/// ============================================================================
/// Kernel Object Types
/// ============================================================================

/// Kernel object type
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectType {
    /// No object
    None = 0,

    /// Process object
    Process = 1,

    /// Thread object
    Thread = 2,

    /// Virtual Memory Object
    Vmo = 3,

    /// Event object
    Event = 5,

    /// Port (packet queue)
    Port = 6,

    /// FIFO
    Fifo = 17,

    /// User-mode pager
    Pager = 28,
}

impl ObjectType {
    /// Create from raw value
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Process,
            2 => Self::Thread,
            3 => Self::Vmo,
            5 => Self::Event,
            6 => Self::Port,
            17 => Self::Fifo,
            28 => Self::Pager,
            _ => Self::None,
        }
    }

    /// Get raw value
    pub const fn into_raw(self) -> u32 {
        self as u32
    }

    /// Get name as string
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Process => "process",
            Self::Thread => "thread",
            Self::Vmo => "vmo",
            Self::Event => "event",
            Self::Port => "port",
            Self::Fifo => "fifo",
            Self::Pager => "pager",
        }
    }
}

/// ============================================================================
/// Kernel Object Base
/// ============================================================================

/// Kernel object base
///
/// All kernel objects embed this common structure.
pub struct KernelObjectBase {
    /// Kernel object id
    koid: Koid,

    /// Object type
    obj_type: ObjectType,

    /// Owning reference count (handles)
    ref_count: AtomicUsize,

    /// Set once `on_zero_handles` has been scheduled
    destroyed: AtomicBool,

    /// Observable signals and their waiters
    signals: SignalState,

    /// Registry that enumerates this object, set once at creation
    registry: SpinOnce<Weak<ObjectRegistry>>,
}

impl KernelObjectBase {
    /// Create a new kernel object base holding one owning reference
    pub fn new(koid: Koid, obj_type: ObjectType, initial: Signals) -> Self {
        Self {
            koid,
            obj_type,
            ref_count: AtomicUsize::new(1),
            destroyed: AtomicBool::new(false),
            signals: SignalState::new(initial),
            registry: SpinOnce::new(),
        }
    }

    /// Kernel object id
    pub fn koid(&self) -> Koid {
        self.koid
    }

    /// Object type
    pub fn obj_type(&self) -> ObjectType {
        self.obj_type
    }

    /// Signal state
    pub fn signals(&self) -> &SignalState {
        &self.signals
    }

    /// Take another owning reference
    ///
    /// Resurrecting an object whose count already reached zero is a
    /// kernel bug.
    pub fn add_ref(&self) {
        let prev = self.ref_count.fetch_add(1, Ordering::Relaxed);
        assert!(prev != 0, "koid {}: add_ref on a dead object", self.koid);
    }

    /// Drop an owning reference
    ///
    /// Returns true if this was the last reference. All prior uses by
    /// other owners happen-before the caller observes `true`.
    pub fn drop_ref(&self) -> bool {
        let prev = self.ref_count.fetch_sub(1, Ordering::Release);
        assert!(prev != 0, "koid {}: drop_ref underflow", self.koid);
        if prev == 1 {
            fence(Ordering::Acquire);
            true
        } else {
            false
        }
    }

    /// Get reference count
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Relaxed)
    }

    /// Check if the object has been finalized
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Mark the object destroyed
    ///
    /// Destroying an object twice is a kernel bug.
    pub fn mark_destroyed(&self) {
        let was = self.destroyed.swap(true, Ordering::AcqRel);
        assert!(!was, "koid {}: destroyed twice", self.koid);
    }

    /// Remember the registry to leave when finalized
    pub(crate) fn set_registry(&self, registry: Weak<ObjectRegistry>) {
        self.registry.call_once(|| registry);
    }

    /// Leave the kernel's object registry
    fn unregister(&self) {
        if let Some(registry) = self.registry.get().and_then(Weak::upgrade) {
            registry.remove(self.koid);
        }
    }
}

/// ============================================================================
/// Capability Traits
/// ============================================================================

/// Behaviour common to every kernel object
pub trait Dispatcher: Send + Sync + 'static {
    /// Shared object state
    fn base(&self) -> &KernelObjectBase;

    /// Rights a freshly created handle carries
    fn default_rights(&self) -> Rights;

    /// Signals user mode may set or clear with `object_signal`
    fn allowed_user_signals(&self) -> Signals {
        Signals::empty()
    }

    /// Whether `object_wait_async` may target this object
    fn supports_async_wait(&self) -> bool {
        true
    }

    /// Finalization hook
    ///
    /// Runs exactly once, after the last owning reference was dropped and
    /// before the object's waiters are canceled.
    fn on_zero_handles(&self) {}

    /// Kernel object id
    fn koid(&self) -> Koid {
        self.base().koid()
    }

    /// Object type
    fn object_type(&self) -> ObjectType {
        self.base().obj_type()
    }
}

/// Objects whose signal state can be observed
pub trait Waitable: Dispatcher {
    /// Signal state of this object
    fn signal_state(&self) -> &SignalState {
        self.base().signals()
    }

    /// Set or clear user-settable signals
    fn user_signal(&self, clear: Signals, set: Signals) -> Result {
        let allowed = self.allowed_user_signals();
        if !allowed.contains(clear | set) {
            return Err(Error::InvalidArgs);
        }
        self.signal_state().set_signals(clear, set);
        Ok(())
    }
}

/// Drop one owning reference, finalizing the object if it was the last
fn release_ref(dispatcher: &dyn Dispatcher) {
    let base = dispatcher.base();
    if base.drop_ref() {
        base.mark_destroyed();
        log_debug!(
            "object destroyed: koid={} type={}",
            base.koid(),
            base.obj_type().name()
        );
        dispatcher.on_zero_handles();
        base.signals().cancel_all();
        base.unregister();
    }
}

/// ============================================================================
/// Kernel Object
/// ============================================================================

/// Reference to any constructible kernel object
#[derive(Clone)]
pub enum KernelObject {
    /// Event
    Event(Arc<EventDispatcher>),

    /// Port
    Port(Arc<PortDispatcher>),

    /// Virtual memory object
    Vmo(Arc<VmoDispatcher>),

    /// Pager
    Pager(Arc<PagerDispatcher>),
}

impl KernelObject {
    /// Borrow as the common dispatcher interface
    pub fn dispatcher(&self) -> &dyn Dispatcher {
        match self {
            Self::Event(d) => d.as_ref(),
            Self::Port(d) => d.as_ref(),
            Self::Vmo(d) => d.as_ref(),
            Self::Pager(d) => d.as_ref(),
        }
    }

    /// Borrow as a waitable object
    pub fn waitable(&self) -> &dyn Waitable {
        match self {
            Self::Event(d) => d.as_ref(),
            Self::Port(d) => d.as_ref(),
            Self::Vmo(d) => d.as_ref(),
            Self::Pager(d) => d.as_ref(),
        }
    }

    /// Shared pointer to the dispatcher
    pub fn to_dispatcher_arc(&self) -> Arc<dyn Dispatcher> {
        match self {
            Self::Event(d) => d.clone(),
            Self::Port(d) => d.clone(),
            Self::Vmo(d) => d.clone(),
            Self::Pager(d) => d.clone(),
        }
    }

    /// Kernel object id
    pub fn koid(&self) -> Koid {
        self.dispatcher().koid()
    }

    /// Object type
    pub fn object_type(&self) -> ObjectType {
        self.dispatcher().object_type()
    }

    /// Downcast to a port
    pub fn as_port(&self) -> Option<&Arc<PortDispatcher>> {
        match self {
            Self::Port(d) => Some(d),
            _ => None,
        }
    }

    /// Downcast to a pager
    pub fn as_pager(&self) -> Option<&Arc<PagerDispatcher>> {
        match self {
            Self::Pager(d) => Some(d),
            _ => None,
        }
    }

    /// Downcast to a VMO
    pub fn as_vmo(&self) -> Option<&Arc<VmoDispatcher>> {
        match self {
            Self::Vmo(d) => Some(d),
            _ => None,
        }
    }

    /// Downcast to an event
    pub fn as_event(&self) -> Option<&Arc<EventDispatcher>> {
        match self {
            Self::Event(d) => Some(d),
            _ => None,
        }
    }

    /// Take an owning reference
    pub(crate) fn add_ref(&self) {
        log_trace!("add_ref koid={}", self.koid());
        self.dispatcher().base().add_ref();
    }

    /// Drop an owning reference
    pub(crate) fn release(&self) {
        release_ref(self.dispatcher());
    }
}

impl core::fmt::Debug for KernelObject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}({})", self.object_type().name(), self.koid())
    }
}

/// ============================================================================
/// Tests
/// ============================================================================

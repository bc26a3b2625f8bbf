// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Ports
//!
//! A port is a bounded FIFO of packets. User mode queues and dequeues
//! packets directly; the kernel queues packets when an async wait fires and
//! when a page source needs pages.
//!
//! # Design
//!
//! - **Packet arena**: Every queued packet lives in a fixed-capacity
//!   [`Arena`] slot; the FIFO holds slot indices. The capacity bounds kernel
//!   memory used by the port
//! - **Async waits**: `wait_async` reserves one slot per registration, so a
//!   firing observer never fails for lack of space. One-shot waits free the
//!   slot when their packet is dequeued; repeating waits keep it and bump
//!   `count` while the packet is still queued
//! - **Backpressure**: Kernel producers that must not drop a packet use
//!   [`PortDispatcher::reserve_blocking`], which parks until a slot frees up
//!   and lets the caller take its own lock before committing
//! - **Closing**: When the last handle goes, queued packets are dropped,
//!   readers wake with `Canceled`, producers with `PeerClosed`, and every
//!   registration the port holds on other objects is canceled
//!
//! Ports cannot themselves be the target of an async wait, which rules out
//! two ports observing each other.
//!
//! # Lock Order
//!
//! ```text
//! source signal state -> port queue -> port signal state
//! ```
//!
//! # Usage
//!
//! ```rust
//! use rustux_kobj::kernel::object::{PortDispatcher, PortPacket, Queueable};
//! use rustux_kobj::kernel::{Kernel, KernelConfig};
//! use rustux_kobj::rustux::types::Deadline;
//!
//! let kernel = Kernel::new(KernelConfig::default());
//! let handle = PortDispatcher::create(&kernel, 4).unwrap();
//! let port = handle.object().as_port().unwrap();
//! port.queue(PortPacket::user(1, [0; 4])).unwrap();
//! assert_eq!(port.wait(Deadline::Immediate).unwrap().key, 1);
//! ```

use super::diagnostics::PortInfo;
use super::signals::{SignalObserver, Signals, WaitMode, WaiterToken};
use super::{Dispatcher, Handle, KernelObject, KernelObjectBase, ObjectType, Rights, Waitable};
use crate::kernel::lib::arena::{Arena, SlotIndex};
use crate::kernel::Kernel;
use crate::rustux::errors::*;
use crate::rustux::types::*;
use crate::{log_debug, log_trace};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Weak};

/// ============================================================================
/// Packets
/// ============================================================================

/// Packet kind
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Queued by user mode
    User = 0,

    /// One-shot async wait fired
    SignalOne = 1,

    /// Repeating async wait fired
    SignalRep = 2,

    /// Page source request
    PageRequest = 3,
}

/// Pager packet command
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCommand {
    /// Supply the range
    Read = 0,

    /// The VMO was detached; no more requests will follow
    Complete = 1,
}

/// Signal packet payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalPacket {
    /// Signals the wait was armed for
    pub trigger: Signals,

    /// Signals observed when it fired
    pub observed: Signals,

    /// Times it fired while the packet was queued
    pub count: u64,
}

/// Page request payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePacket {
    pub command: PageCommand,
    pub offset: u64,
    pub length: u64,
}

/// Packet payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketPayload {
    User([u64; 4]),
    Signal(SignalPacket),
    Page(PagePacket),
}

/// Port packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPacket {
    /// Caller-chosen key
    pub key: u64,

    /// Packet kind
    pub kind: PacketKind,

    /// Completion status (`Canceled` when the source went away)
    pub status: Status,

    /// Payload
    pub payload: PacketPayload,
}

impl PortPacket {
    /// User packet
    pub const fn user(key: u64, data: [u64; 4]) -> Self {
        Self {
            key,
            kind: PacketKind::User,
            status: OK,
            payload: PacketPayload::User(data),
        }
    }

    /// Page request for `[offset, offset + length)`
    pub const fn page_request(key: u64, offset: u64, length: u64) -> Self {
        Self::page(key, PageCommand::Read, offset, length)
    }

    /// Detach notice for a VMO of `length` bytes
    pub const fn page_complete(key: u64, length: u64) -> Self {
        Self::page(key, PageCommand::Complete, 0, length)
    }

    const fn page(key: u64, command: PageCommand, offset: u64, length: u64) -> Self {
        Self {
            key,
            kind: PacketKind::PageRequest,
            status: OK,
            payload: PacketPayload::Page(PagePacket {
                command,
                offset,
                length,
            }),
        }
    }

    /// Signal payload, if any
    pub fn signal(&self) -> Option<&SignalPacket> {
        match &self.payload {
            PacketPayload::Signal(s) => Some(s),
            _ => None,
        }
    }

    /// Page payload, if any
    pub fn page_payload(&self) -> Option<&PagePacket> {
        match &self.payload {
            PacketPayload::Page(p) => Some(p),
            _ => None,
        }
    }
}

/// Objects packets can be queued on
pub trait Queueable {
    /// Queue without blocking
    ///
    /// # Returns
    ///
    /// - `Err(Error::NoResources)` when full
    /// - `Err(Error::PeerClosed)` once closed
    fn queue(&self, packet: PortPacket) -> Result;

    /// Queue, waiting for space while `abandon()` stays false
    fn queue_blocking(&self, packet: PortPacket, abandon: &dyn Fn() -> bool) -> Result;
}

/// ============================================================================
/// Port State
/// ============================================================================

type WaitId = u64;

struct Entry {
    packet: PortPacket,
    wait: Option<WaitId>,
}

struct AsyncWait {
    source: Weak<dyn Dispatcher>,
    source_koid: Koid,
    key: u64,
    trigger: Signals,
    mode: WaitMode,
    token: Option<WaiterToken>,
    slot: SlotIndex,
    armed: bool,
    queued: bool,
}

struct PortState {
    packets: Arena<Entry>,
    fifo: VecDeque<SlotIndex>,
    waits: BTreeMap<WaitId, AsyncWait>,
    next_wait: WaitId,
    blocked_producers: usize,
    blocked_readers: usize,
    closed: bool,
}

const EMPTY_PACKET: PortPacket = PortPacket::user(0, [0; 4]);

/// ============================================================================
/// Port Dispatcher
/// ============================================================================

/// Port object
pub struct PortDispatcher {
    base: KernelObjectBase,
    state: Mutex<PortState>,

    /// Readers waiting for a packet
    readable: Condvar,

    /// Producers waiting for a free slot
    space: Condvar,
}

impl PortDispatcher {
    /// Create a port
    ///
    /// `capacity` 0 selects the configured default; a capacity above the
    /// configured maximum is `InvalidArgs`.
    pub fn create(kernel: &Kernel, capacity: usize) -> Result<Handle> {
        let config = kernel.config();
        let capacity = match capacity {
            0 => config.port_default_capacity,
            c if c > config.port_max_capacity => return Err(Error::InvalidArgs),
            c => c,
        };

        let port = Arc::new(Self {
            base: KernelObjectBase::new(kernel.alloc_koid(), ObjectType::Port, Signals::empty()),
            state: Mutex::new(PortState {
                packets: Arena::new("port-packets", capacity),
                fifo: VecDeque::new(),
                waits: BTreeMap::new(),
                next_wait: 1,
                blocked_producers: 0,
                blocked_readers: 0,
                closed: false,
            }),
            readable: Condvar::new(),
            space: Condvar::new(),
        });
        log_debug!("port created: koid={} capacity={}", port.koid(), capacity);

        let rights = port.default_rights();
        let object = KernelObject::Port(port);
        kernel.register_object(&object);
        Ok(Handle::adopt(object, rights))
    }

    /// Put a live slot on the FIFO and wake a reader
    fn enqueue_locked(&self, st: &mut PortState, slot: SlotIndex) {
        st.fifo.push_back(slot);
        self.base.signals().set_signals(Signals::empty(), Signals::READABLE);
        self.readable.notify_one();
    }

    /// Wait for and remove the next packet
    ///
    /// # Returns
    ///
    /// - The oldest queued packet
    /// - `Err(Error::TimedOut)` if none arrived before `deadline`
    /// - `Err(Error::Canceled)` if the port closed
    pub fn wait(&self, deadline: Deadline) -> Result<PortPacket> {
        let mut st = self.state.lock();
        loop {
            if st.closed {
                return Err(Error::Canceled);
            }
            if let Some(slot) = st.fifo.pop_front() {
                return Ok(self.dequeue_locked(&mut st, slot));
            }

            let timed_out = match deadline {
                Deadline::Immediate => return Err(Error::TimedOut),
                Deadline::Infinite => {
                    st.blocked_readers += 1;
                    self.readable.wait(&mut st);
                    st.blocked_readers -= 1;
                    false
                }
                Deadline::At(at) => {
                    st.blocked_readers += 1;
                    let result = self.readable.wait_until(&mut st, at);
                    st.blocked_readers -= 1;
                    result.timed_out()
                }
            };
            if timed_out && st.fifo.is_empty() && !st.closed {
                return Err(Error::TimedOut);
            }
        }
    }

    fn dequeue_locked(&self, st: &mut PortState, slot: SlotIndex) -> PortPacket {
        let (packet, wait) = {
            let entry = st.packets.get(slot);
            (entry.packet, entry.wait)
        };

        let keep_slot = match wait.and_then(|id| st.waits.get_mut(&id).map(|w| (id, w))) {
            Some((id, w)) => {
                w.queued = false;
                let keep = w.armed && w.mode == WaitMode::Persistent;
                if !keep {
                    st.waits.remove(&id);
                }
                keep
            }
            None => false,
        };

        if !keep_slot {
            st.packets.free(slot);
            self.space.notify_one();
        }
        if st.fifo.is_empty() {
            self.base.signals().set_signals(Signals::READABLE, Signals::empty());
        }

        log_trace!("port {} dequeue key={} kind={:?}", self.koid(), packet.key, packet.kind);
        packet
    }

    /// Reserve a slot, parking until one is free
    ///
    /// Gives up with `Canceled` once `abandon()` is true and with
    /// `PeerClosed` once the port closes. `abandon` is evaluated with the
    /// port lock held; call [`wake_producers`](Self::wake_producers) after
    /// making it true.
    pub fn reserve_blocking(&self, abandon: &dyn Fn() -> bool) -> Result<PacketReservation<'_>> {
        let mut st = self.state.lock();
        loop {
            if st.closed {
                return Err(Error::PeerClosed);
            }
            if abandon() {
                // Pass on a wake-up this thread may have consumed.
                if st.packets.has_room() {
                    self.space.notify_one();
                }
                return Err(Error::Canceled);
            }
            if st.packets.has_room() {
                let slot = st.packets.alloc(Entry {
                    packet: EMPTY_PACKET,
                    wait: None,
                })?;
                return Ok(PacketReservation {
                    port: self,
                    slot: Some(slot),
                });
            }

            st.blocked_producers += 1;
            self.space.wait(&mut st);
            st.blocked_producers -= 1;
        }
    }

    fn commit(&self, slot: SlotIndex, packet: PortPacket) -> Result {
        let mut st = self.state.lock();
        if st.closed {
            st.packets.free(slot);
            return Err(Error::PeerClosed);
        }
        st.packets.get_mut(slot).packet = packet;
        self.enqueue_locked(&mut st, slot);
        Ok(())
    }

    fn release_reservation(&self, slot: SlotIndex) {
        let mut st = self.state.lock();
        st.packets.free(slot);
        self.space.notify_one();
    }

    /// Wake every producer parked in `reserve_blocking`
    pub fn wake_producers(&self) {
        let _st = self.state.lock();
        self.space.notify_all();
    }

    /// ========================================================================
    /// Async Waits
    /// ========================================================================

    /// Arm an async wait on `source`
    ///
    /// When any of `trigger` is asserted on `source`, a signal packet with
    /// `key` is queued. Fails with `NoResources` if no slot can be reserved.
    pub fn wait_async(
        self: &Arc<Self>,
        source: &KernelObject,
        key: u64,
        trigger: Signals,
        mode: WaitMode,
    ) -> Result {
        let dispatcher = source.dispatcher();
        if dispatcher.koid() == self.koid() {
            return Err(Error::InvalidArgs);
        }
        if !dispatcher.supports_async_wait() {
            return Err(Error::NotSupported);
        }

        let id = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            if st.closed {
                return Err(Error::PeerClosed);
            }
            let id = st.next_wait;
            let slot = st.packets.alloc(Entry {
                packet: EMPTY_PACKET,
                wait: Some(id),
            })?;
            st.next_wait += 1;
            st.waits.insert(
                id,
                AsyncWait {
                    source: Arc::downgrade(&source.to_dispatcher_arc()),
                    source_koid: dispatcher.koid(),
                    key,
                    trigger,
                    mode,
                    token: None,
                    slot,
                    armed: true,
                    queued: false,
                },
            );
            id
        };

        let observer = Arc::new(PortObserver {
            port: self.clone(),
            id,
        });
        let signals = dispatcher.base().signals();
        match signals.register_waiter(trigger, mode, observer) {
            Ok(token) => {
                let orphaned = {
                    let mut st = self.state.lock();
                    match st.waits.get_mut(&id) {
                        Some(w) => {
                            if w.armed {
                                w.token = Some(token);
                            }
                            false
                        }
                        None => true,
                    }
                };
                // Canceled or closed while registering.
                if orphaned {
                    signals.cancel_waiter(token);
                }
                log_trace!("port {} wait_async source={} key={}", self.koid(), dispatcher.koid(), key);
                Ok(())
            }
            Err(e) => {
                let mut guard = self.state.lock();
                let st = &mut *guard;
                if let Some(w) = st.waits.remove(&id) {
                    if w.queued {
                        st.fifo.retain(|&s| s != w.slot);
                    }
                    st.packets.free(w.slot);
                    self.space.notify_one();
                }
                Err(e)
            }
        }
    }

    /// Observer callback: the wait fired or its source died
    fn deliver(&self, id: WaitId, observed: Signals, status: Result) {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        if st.closed {
            return;
        }
        let Some(w) = st.waits.get_mut(&id) else {
            return;
        };
        if !w.armed {
            return;
        }

        let canceled = status.is_err();
        if canceled {
            w.armed = false;
            w.token = None;
        } else if w.mode == WaitMode::OneShot {
            w.armed = false;
        }

        let entry = st.packets.get_mut(w.slot);
        if w.queued {
            if let PacketPayload::Signal(sig) = &mut entry.packet.payload {
                sig.observed = observed;
                sig.count += 1;
            }
            if let Err(e) = status {
                entry.packet.status = e.to_status();
            }
            return;
        }

        entry.packet = PortPacket {
            key: w.key,
            kind: match w.mode {
                WaitMode::OneShot => PacketKind::SignalOne,
                WaitMode::Persistent => PacketKind::SignalRep,
            },
            status: match status {
                Ok(()) => OK,
                Err(e) => e.to_status(),
            },
            payload: PacketPayload::Signal(SignalPacket {
                trigger: w.trigger,
                observed,
                count: 1,
            }),
        };
        w.queued = true;
        let slot = w.slot;
        self.enqueue_locked(st, slot);
    }

    /// Cancel async waits registered with `(source_koid, key)`
    ///
    /// Undelivered packets of those waits are removed as well. Returns
    /// `NotFound` when nothing matched, including a one-shot wait whose
    /// packet was already dequeued.
    pub fn cancel(&self, source_koid: Koid, key: u64) -> Result {
        let targets: Vec<(WaitId, Weak<dyn Dispatcher>, Option<WaiterToken>)> = {
            let st = self.state.lock();
            if st.closed {
                return Err(Error::NotFound);
            }
            st.waits
                .iter()
                .filter(|(_, w)| w.source_koid == source_koid && w.key == key)
                .map(|(id, w)| (*id, w.source.clone(), w.token))
                .collect()
        };
        if targets.is_empty() {
            return Err(Error::NotFound);
        }

        // Outside the port lock: the source's signal lock comes first.
        for (_, source, token) in &targets {
            if let (Some(source), Some(token)) = (source.upgrade(), token) {
                source.base().signals().cancel_waiter(*token);
            }
        }

        let mut guard = self.state.lock();
        let st = &mut *guard;
        let mut removed = false;
        for (id, _, _) in &targets {
            if let Some(w) = st.waits.remove(id) {
                if w.queued {
                    st.fifo.retain(|&s| s != w.slot);
                }
                st.packets.free(w.slot);
                removed = true;
            }
        }

        if !removed {
            return Err(Error::NotFound);
        }
        if st.fifo.is_empty() && !st.closed {
            self.base.signals().set_signals(Signals::READABLE, Signals::empty());
        }
        self.space.notify_all();
        Ok(())
    }

    /// ========================================================================
    /// Diagnostics
    /// ========================================================================

    /// Snapshot of the port's queue
    pub fn info(&self) -> PortInfo {
        let st = self.state.lock();
        PortInfo {
            koid: self.koid(),
            capacity: st.packets.capacity(),
            queued: st.fifo.len(),
            outstanding: st.packets.outstanding(),
            peak: st.packets.peak(),
            async_waits: st.waits.len(),
            blocked_producers: st.blocked_producers,
            blocked_readers: st.blocked_readers,
            closed: st.closed,
        }
    }
}

impl Dispatcher for PortDispatcher {
    fn base(&self) -> &KernelObjectBase {
        &self.base
    }

    fn default_rights(&self) -> Rights {
        Rights::BASIC | Rights::IO
    }

    fn supports_async_wait(&self) -> bool {
        false
    }

    fn on_zero_handles(&self) {
        let registrations: Vec<(Weak<dyn Dispatcher>, WaiterToken)> = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            st.closed = true;

            let fifo: Vec<SlotIndex> = st.fifo.drain(..).collect();
            for slot in fifo {
                if st.packets.get(slot).wait.is_none() {
                    st.packets.free(slot);
                }
            }

            let waits = core::mem::take(&mut st.waits);
            let mut registrations = Vec::new();
            for (_, w) in waits {
                st.packets.free(w.slot);
                if let (true, Some(token)) = (w.armed, w.token) {
                    registrations.push((w.source, token));
                }
            }

            self.readable.notify_all();
            self.space.notify_all();
            registrations
        };

        self.base.signals().set_signals(Signals::READABLE, Signals::empty());
        for (source, token) in &registrations {
            if let Some(source) = source.upgrade() {
                source.base().signals().cancel_waiter(*token);
            }
        }
        log_debug!(
            "port closed: koid={} canceled_waits={}",
            self.koid(),
            registrations.len()
        );
    }
}

impl Waitable for PortDispatcher {}

impl Queueable for PortDispatcher {
    fn queue(&self, packet: PortPacket) -> Result {
        let mut st = self.state.lock();
        if st.closed {
            return Err(Error::PeerClosed);
        }
        let slot = st.packets.alloc(Entry { packet, wait: None })?;
        self.enqueue_locked(&mut st, slot);
        Ok(())
    }

    fn queue_blocking(&self, packet: PortPacket, abandon: &dyn Fn() -> bool) -> Result {
        self.reserve_blocking(abandon)?.commit(packet)
    }
}

/// A reserved packet slot
///
/// Dropping an uncommitted reservation returns the slot.
pub struct PacketReservation<'a> {
    port: &'a PortDispatcher,
    slot: Option<SlotIndex>,
}

impl PacketReservation<'_> {
    /// Queue `packet` in the reserved slot
    ///
    /// Fails with `PeerClosed` if the port closed since the reservation.
    pub fn commit(mut self, packet: PortPacket) -> Result {
        match self.slot.take() {
            Some(slot) => self.port.commit(slot, packet),
            None => Err(Error::BadState),
        }
    }
}

impl Drop for PacketReservation<'_> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.port.release_reservation(slot);
        }
    }
}

/// Queues a signal packet when its wait fires
struct PortObserver {
    port: Arc<PortDispatcher>,
    id: WaitId,
}

impl SignalObserver for PortObserver {
    fn on_match(&self, observed: Signals) {
        self.port.deliver(self.id, observed, Ok(()));
    }

    fn on_cancel(&self, observed: Signals) {
        self.port.deliver(self.id, observed, Err(Error::Canceled));
    }
}

/// ============================================================================
/// Tests
/// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::object::EventDispatcher;
    use crate::kernel::KernelConfig;
    use pretty_assertions::assert_eq;
    use std::thread;
    use std::time::Duration;

    fn setup(capacity: usize) -> (Kernel, Handle) {
        let kernel = Kernel::new(KernelConfig::default());
        let port = PortDispatcher::create(&kernel, capacity).unwrap();
        (kernel, port)
    }

    #[test]
    fn test_create_capacity() {
        let kernel = Kernel::new(KernelConfig::default());
        let port = PortDispatcher::create(&kernel, 0).unwrap();
        assert_eq!(port.object().as_port().unwrap().info().capacity, 1024);
        assert_eq!(
            PortDispatcher::create(&kernel, 16385).unwrap_err(),
            Error::InvalidArgs
        );
    }

    #[test]
    fn test_fifo_and_readable() {
        let (_kernel, handle) = setup(4);
        let port = handle.object().as_port().unwrap();
        for key in 0..3 {
            port.queue(PortPacket::user(key, [key; 4])).unwrap();
        }
        assert!(port.signal_state().current().contains(Signals::READABLE));

        for key in 0..3 {
            assert_eq!(port.wait(Deadline::Immediate).unwrap().key, key);
        }
        assert!(!port.signal_state().current().contains(Signals::READABLE));
        assert_eq!(port.wait(Deadline::Immediate), Err(Error::TimedOut));
    }

    #[test]
    fn test_capacity_exhausted() {
        let (_kernel, handle) = setup(2);
        let port = handle.object().as_port().unwrap();
        port.queue(PortPacket::user(1, [0; 4])).unwrap();
        port.queue(PortPacket::user(2, [0; 4])).unwrap();
        assert_eq!(port.queue(PortPacket::user(3, [0; 4])), Err(Error::NoResources));
        port.wait(Deadline::Immediate).unwrap();
        port.queue(PortPacket::user(3, [0; 4])).unwrap();
        assert_eq!(port.info().peak, 2);
    }

    #[test]
    fn test_wait_timeout() {
        let (_kernel, handle) = setup(2);
        let port = handle.object().as_port().unwrap();
        let deadline = Deadline::after(Duration::from_millis(10));
        assert_eq!(port.wait(deadline), Err(Error::TimedOut));
    }

    #[test]
    fn test_one_shot_async_wait() {
        let (kernel, handle) = setup(4);
        let port = handle.object().as_port().unwrap();
        let event = EventDispatcher::create(&kernel).unwrap();

        port.wait_async(event.object(), 9, Signals::USER_0, WaitMode::OneShot)
            .unwrap();
        assert_eq!(port.info().outstanding, 1);

        let state = event.object().waitable().signal_state();
        state.set_signals(Signals::empty(), Signals::USER_0);
        state.set_signals(Signals::USER_0, Signals::empty());
        state.set_signals(Signals::empty(), Signals::USER_0);

        let packet = port.wait(Deadline::Immediate).unwrap();
        assert_eq!(packet.key, 9);
        assert_eq!(packet.kind, PacketKind::SignalOne);
        assert_eq!(packet.status, OK);
        assert_eq!(packet.signal().unwrap().trigger, Signals::USER_0);
        assert_eq!(port.wait(Deadline::Immediate), Err(Error::TimedOut));
        assert_eq!(port.info().outstanding, 0);
    }

    #[test]
    fn test_persistent_coalesces() {
        let (kernel, handle) = setup(4);
        let port = handle.object().as_port().unwrap();
        let event = EventDispatcher::create(&kernel).unwrap();
        port.wait_async(event.object(), 3, Signals::USER_1, WaitMode::Persistent)
            .unwrap();

        let state = event.object().waitable().signal_state();
        for _ in 0..3 {
            state.pulse(Signals::USER_1);
        }
        let packet = port.wait(Deadline::Immediate).unwrap();
        assert_eq!(packet.kind, PacketKind::SignalRep);
        assert_eq!(packet.signal().unwrap().count, 3);
        assert_eq!(port.wait(Deadline::Immediate), Err(Error::TimedOut));

        // Still armed.
        state.pulse(Signals::USER_1);
        assert_eq!(port.wait(Deadline::Immediate).unwrap().signal().unwrap().count, 1);
        assert_eq!(port.info().outstanding, 1);
    }

    #[test]
    fn test_source_destroyed() {
        let (kernel, handle) = setup(4);
        let port = handle.object().as_port().unwrap();
        let event = EventDispatcher::create(&kernel).unwrap();
        port.wait_async(event.object(), 5, Signals::USER_0, WaitMode::OneShot)
            .unwrap();

        drop(event);
        let packet = port.wait(Deadline::Immediate).unwrap();
        assert_eq!(packet.key, 5);
        assert_eq!(packet.status, Error::Canceled.to_status());
    }

    #[test]
    fn test_cancel() {
        let (kernel, handle) = setup(4);
        let port = handle.object().as_port().unwrap();
        let event = EventDispatcher::create(&kernel).unwrap();
        let state = event.object().waitable().signal_state();

        port.wait_async(event.object(), 1, Signals::USER_0, WaitMode::OneShot)
            .unwrap();
        assert_eq!(state.observer_count(), 1);
        port.cancel(event.koid(), 1).unwrap();
        assert_eq!(state.observer_count(), 0);
        assert_eq!(port.cancel(event.koid(), 1), Err(Error::NotFound));

        // Fired but undelivered: the packet is removed.
        port.wait_async(event.object(), 2, Signals::USER_0, WaitMode::OneShot)
            .unwrap();
        state.set_signals(Signals::empty(), Signals::USER_0);
        port.cancel(event.koid(), 2).unwrap();
        assert_eq!(port.wait(Deadline::Immediate), Err(Error::TimedOut));
        assert_eq!(port.info().outstanding, 0);
    }

    #[test]
    fn test_cancel_after_delivery() {
        let (kernel, handle) = setup(4);
        let port = handle.object().as_port().unwrap();
        let event = EventDispatcher::create(&kernel).unwrap();
        port.wait_async(event.object(), 1, Signals::USER_0, WaitMode::OneShot)
            .unwrap();
        event
            .object()
            .waitable()
            .signal_state()
            .set_signals(Signals::empty(), Signals::USER_0);
        port.wait(Deadline::Immediate).unwrap();
        assert_eq!(port.cancel(event.koid(), 1), Err(Error::NotFound));
    }

    #[test]
    fn test_wait_on_self_rejected() {
        let (_kernel, handle) = setup(4);
        let port = handle.object().as_port().unwrap();
        assert_eq!(
            port.wait_async(handle.object(), 0, Signals::READABLE, WaitMode::OneShot),
            Err(Error::InvalidArgs)
        );
    }

    #[test]
    fn test_async_wait_slot_limit() {
        let (kernel, handle) = setup(1);
        let port = handle.object().as_port().unwrap();
        let event = EventDispatcher::create(&kernel).unwrap();
        port.wait_async(event.object(), 1, Signals::USER_0, WaitMode::OneShot)
            .unwrap();
        assert_eq!(
            port.wait_async(event.object(), 2, Signals::USER_0, WaitMode::OneShot),
            Err(Error::NoResources)
        );
        assert_eq!(port.queue(PortPacket::user(0, [0; 4])), Err(Error::NoResources));
    }

    #[test]
    fn test_close_wakes_reader_and_cancels_waits() {
        let (kernel, handle) = setup(4);
        let port = handle.object().as_port().unwrap().clone();
        let event = EventDispatcher::create(&kernel).unwrap();
        port.wait_async(event.object(), 1, Signals::USER_0, WaitMode::Persistent)
            .unwrap();

        let reader = {
            let port = port.clone();
            thread::spawn(move || port.wait(Deadline::Infinite))
        };
        thread::sleep(Duration::from_millis(20));

        drop(handle);
        assert_eq!(reader.join().unwrap(), Err(Error::Canceled));
        assert_eq!(event.object().waitable().signal_state().observer_count(), 0);
        assert_eq!(port.queue(PortPacket::user(0, [0; 4])), Err(Error::PeerClosed));
        assert!(port.info().closed);
    }

    #[test]
    fn test_reservation_backpressure() {
        let (_kernel, handle) = setup(1);
        let port = handle.object().as_port().unwrap().clone();
        port.queue(PortPacket::user(1, [0; 4])).unwrap();

        let producer = {
            let port = port.clone();
            thread::spawn(move || port.queue_blocking(PortPacket::user(2, [0; 4]), &|| false))
        };
        while port.info().blocked_producers == 0 {
            thread::yield_now();
        }

        assert_eq!(port.wait(Deadline::Infinite).unwrap().key, 1);
        producer.join().unwrap().unwrap();
        assert_eq!(port.wait(Deadline::Immediate).unwrap().key, 2);
    }

    #[test]
    fn test_reservation_dropped() {
        let (_kernel, handle) = setup(1);
        let port = handle.object().as_port().unwrap();
        let reservation = port.reserve_blocking(&|| false).unwrap();
        assert_eq!(port.queue(PortPacket::user(0, [0; 4])), Err(Error::NoResources));
        drop(reservation);
        port.queue(PortPacket::user(0, [0; 4])).unwrap();
    }

    #[test]
    fn test_reservation_abandoned() {
        let (_kernel, handle) = setup(1);
        let port = handle.object().as_port().unwrap();
        port.queue(PortPacket::user(0, [0; 4])).unwrap();
        assert_eq!(port.reserve_blocking(&|| true).err(), Some(Error::Canceled));
    }
}

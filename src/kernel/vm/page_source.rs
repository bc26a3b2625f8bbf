// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Page Sources
//!
//! A page source connects one pager-backed VMO to the port its pager
//! listens on. Faults turn into page-request packets on that port; the
//! pager answers with `supply_pages`.
//!
//! # Design
//!
//! - **No lost or late requests**: `request` waits for port space without
//!   holding the source lock, then takes the lock, re-checks `closed` and
//!   commits. `close` sets `closed` under the same lock, so once it returns
//!   no request packet can be queued
//! - **Port lifetime**: The source holds the port's memory but not a handle.
//!   An observer on the port's signal state notices when the port is
//!   destroyed and fails all faults on the VMO with `PeerClosed`
//! - **Pager lifetime**: The back-reference to the pager is weak, so a
//!   source never keeps its pager alive
//!
//! # Lock Order
//!
//! ```text
//! page source state -> port queue -> port signal state
//! ```

use crate::kernel::object::diagnostics::PageSourceInfo;
use crate::kernel::object::{
    Dispatcher, PagerDispatcher, PortDispatcher, PortPacket, Queueable, SignalObserver, Signals,
    VmoDispatcher, WaitMode, Waitable, WaiterToken,
};
use crate::kernel::sync::SpinMutex;
use crate::rustux::errors::*;
use crate::rustux::types::*;
use crate::{log_debug, log_trace, log_warn};
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

struct SourceState {
    closed: bool,
    port_observer: Option<WaiterToken>,
}

/// Kernel side of one pager-backed VMO
pub struct PageSource {
    /// Id within the owning pager
    id: u64,

    pager: Weak<PagerDispatcher>,
    port: Arc<PortDispatcher>,
    key: u64,
    vmo: SpinMutex<Weak<VmoDispatcher>>,
    state: SpinMutex<SourceState>,

    /// Mirrors `state.closed` for the lock-free abandon check
    closed: AtomicBool,

    /// The port was destroyed
    port_gone: AtomicBool,

    /// Requests queued so far
    requests: AtomicU64,
}

impl PageSource {
    /// Create a source queueing requests with `key` on `port`
    ///
    /// Fails with `PeerClosed` if the port is already destroyed.
    pub(crate) fn new(
        id: u64,
        pager: Weak<PagerDispatcher>,
        port: Arc<PortDispatcher>,
        key: u64,
    ) -> Result<Arc<Self>> {
        let source = Arc::new(Self {
            id,
            pager,
            port,
            key,
            vmo: SpinMutex::new(Weak::new()),
            state: SpinMutex::new(SourceState {
                closed: false,
                port_observer: None,
            }),
            closed: AtomicBool::new(false),
            port_gone: AtomicBool::new(false),
            requests: AtomicU64::new(0),
        });

        let observer = Arc::new(PortClosedObserver {
            source: Arc::downgrade(&source),
        });
        // Empty interest: only cancellation (port destruction) is delivered.
        let token = source
            .port
            .signal_state()
            .register_waiter(Signals::empty(), WaitMode::Persistent, observer)
            .map_err(|_| Error::PeerClosed)?;
        source.state.lock().port_observer = Some(token);
        Ok(source)
    }

    /// Attach the VMO this source backs
    pub(crate) fn bind_vmo(&self, vmo: &Arc<VmoDispatcher>) {
        *self.vmo.lock() = Arc::downgrade(vmo);
        if self.port_gone.load(Ordering::SeqCst) {
            vmo.mark_peer_closed();
        }
        if self.closed.load(Ordering::SeqCst) {
            vmo.mark_detached();
        }
    }

    /// Id within the owning pager
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Key stamped on every packet
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Port requests go to
    pub fn port(&self) -> &Arc<PortDispatcher> {
        &self.port
    }

    /// Check whether `pager` created this source
    pub fn is_owned_by(&self, pager: &PagerDispatcher) -> bool {
        core::ptr::eq(self.pager.as_ptr(), pager)
    }

    /// Backed VMO, while it exists
    pub fn vmo(&self) -> Option<Arc<VmoDispatcher>> {
        self.vmo.lock().upgrade()
    }

    /// Check whether the source was closed
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Check whether the port was destroyed
    pub fn is_port_gone(&self) -> bool {
        self.port_gone.load(Ordering::SeqCst)
    }

    /// Requests queued so far
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    fn gone_error(&self) -> Error {
        if self.closed.load(Ordering::SeqCst) {
            Error::BadState
        } else {
            Error::PeerClosed
        }
    }

    /// Ask the pager for `[offset, offset + length)`
    ///
    /// Blocks while the port is full.
    ///
    /// # Returns
    ///
    /// - `Err(Error::BadState)` once the source is closed
    /// - `Err(Error::PeerClosed)` once the port is gone
    pub fn request(&self, offset: u64, length: u64) -> Result {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::BadState);
        }
        if self.port_gone.load(Ordering::SeqCst) {
            return Err(Error::PeerClosed);
        }

        let abandon = || self.closed.load(Ordering::SeqCst) || self.port_gone.load(Ordering::SeqCst);
        let reservation = self.port.reserve_blocking(&abandon).map_err(|e| match e {
            Error::Canceled => self.gone_error(),
            other => other,
        })?;

        let state = self.state.lock();
        if state.closed {
            drop(state);
            drop(reservation);
            return Err(Error::BadState);
        }
        reservation.commit(PortPacket::page_request(self.key, offset, length))?;
        self.requests.fetch_add(1, Ordering::Relaxed);
        drop(state);

        log_trace!("page source {} request offset={:#x} length={:#x}", self.id, offset, length);
        Ok(())
    }

    /// Detach from the pager
    ///
    /// Idempotent. After it returns no request packet will be queued, faults
    /// on the VMO fail with `BadState`, and the pager no longer tracks this
    /// source. The first close queues a completion notice on the port.
    pub fn close(&self) {
        self.shutdown(true);
    }

    /// Close a source whose VMO never reached user mode
    ///
    /// Same as [`close`](Self::close) but the pager is not told.
    pub(crate) fn discard(&self) {
        self.shutdown(false);
    }

    fn shutdown(&self, notify: bool) {
        let first = {
            let mut state = self.state.lock();
            let first = !state.closed;
            state.closed = true;
            self.closed.store(true, Ordering::SeqCst);
            first.then(|| state.port_observer.take())
        };

        if let Some(token) = first {
            self.port.wake_producers();
            if let Some(token) = token {
                self.port.signal_state().cancel_waiter(token);
            }

            let vmo = self.vmo();
            if let Some(vmo) = &vmo {
                vmo.mark_detached();
            }
            if notify && !self.port_gone.load(Ordering::SeqCst) {
                let size = vmo.as_ref().map_or(0, |v| v.size());
                if let Err(e) = self.port.queue(PortPacket::page_complete(self.key, size)) {
                    log_warn!("page source {}: complete packet dropped: {}", self.id, e);
                }
            }
            log_debug!("page source closed: id={} key={}", self.id, self.key);
        }

        if let Some(pager) = self.pager.upgrade() {
            pager.release_source(self.id);
        }
    }

    /// Snapshot for diagnostics
    pub fn info(&self) -> PageSourceInfo {
        PageSourceInfo {
            id: self.id,
            key: self.key,
            port_koid: self.port.koid(),
            vmo_koid: self.vmo().map(|v| v.koid()),
            closed: self.is_closed(),
            port_gone: self.is_port_gone(),
            requests: self.request_count(),
        }
    }
}

/// Notices the port's destruction
struct PortClosedObserver {
    source: Weak<PageSource>,
}

impl SignalObserver for PortClosedObserver {
    fn on_match(&self, _observed: Signals) {}

    fn on_cancel(&self, _observed: Signals) {
        let Some(source) = self.source.upgrade() else {
            return;
        };
        source.port_gone.store(true, Ordering::SeqCst);
        if let Some(vmo) = source.vmo() {
            vmo.mark_peer_closed();
        }
        log_debug!("page source {}: port destroyed", source.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::object::port::{PacketKind, PageCommand};
    use crate::kernel::{Kernel, KernelConfig};

    fn setup(capacity: usize) -> (Kernel, crate::kernel::object::Handle, Arc<PortDispatcher>) {
        let kernel = Kernel::new(KernelConfig::default());
        let handle = PortDispatcher::create(&kernel, capacity).unwrap();
        let port = handle.object().as_port().unwrap().clone();
        (kernel, handle, port)
    }

    #[test]
    fn test_request_queues_packet() {
        let (_kernel, _handle, port) = setup(4);
        let source = PageSource::new(1, Weak::new(), port.clone(), 42).unwrap();

        source.request(0x2000, 0x1000).unwrap();
        let packet = port.wait(Deadline::Immediate).unwrap();
        assert_eq!(packet.key, 42);
        assert_eq!(packet.kind, PacketKind::PageRequest);
        let page = packet.page_payload().unwrap();
        assert_eq!(page.command, PageCommand::Read);
        assert_eq!((page.offset, page.length), (0x2000, 0x1000));
        assert_eq!(source.request_count(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (_kernel, _handle, port) = setup(4);
        let source = PageSource::new(1, Weak::new(), port.clone(), 1).unwrap();
        assert_eq!(port.signal_state().observer_count(), 1);

        source.close();
        source.close();
        assert!(source.is_closed());
        assert_eq!(port.signal_state().observer_count(), 0);
        assert_eq!(source.request(0, 0x1000), Err(Error::BadState));

        // Exactly one completion notice.
        let packet = port.wait(Deadline::Immediate).unwrap();
        assert_eq!(packet.page_payload().unwrap().command, PageCommand::Complete);
        assert_eq!(port.wait(Deadline::Immediate), Err(Error::TimedOut));
    }

    #[test]
    fn test_discard_queues_nothing() {
        let (_kernel, _handle, port) = setup(4);
        let source = PageSource::new(1, Weak::new(), port.clone(), 1).unwrap();

        source.discard();
        assert!(source.is_closed());
        assert_eq!(port.signal_state().observer_count(), 0);
        assert_eq!(port.wait(Deadline::Immediate), Err(Error::TimedOut));

        // A later close does not send a late notice either.
        source.close();
        assert_eq!(port.wait(Deadline::Immediate), Err(Error::TimedOut));
    }

    #[test]
    fn test_port_destroyed() {
        let (_kernel, handle, port) = setup(4);
        let source = PageSource::new(1, Weak::new(), port, 1).unwrap();
        drop(handle);
        assert!(source.is_port_gone());
        assert_eq!(source.request(0, 0x1000), Err(Error::PeerClosed));
    }

    #[test]
    fn test_close_unblocks_producer() {
        let (_kernel, _handle, port) = setup(1);
        port.queue(PortPacket::user(0, [0; 4])).unwrap();
        let source = PageSource::new(1, Weak::new(), port.clone(), 1).unwrap();

        let requester = {
            let source = source.clone();
            std::thread::spawn(move || source.request(0, 0x1000))
        };
        while port.info().blocked_producers == 0 {
            std::thread::yield_now();
        }
        source.close();
        assert_eq!(requester.join().unwrap(), Err(Error::BadState));
    }
}

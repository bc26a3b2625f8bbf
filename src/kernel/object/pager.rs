// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! User-Mode Pagers
//!
//! A pager object lets a user process provide the contents of VMOs on
//! demand. Each VMO it creates gets a [`PageSource`] that turns faults into
//! page-request packets on a port of the pager's choosing; the pager answers
//! with [`supply_pages`](PagerDispatcher::supply_pages).
//!
//! # Design
//!
//! - **Registry**: The pager owns its sources in a registry keyed by id.
//!   Sources point back weakly
//! - **Teardown**: When the last pager handle closes, sources are taken out
//!   one at a time and closed with the registry lock released; closing a
//!   source calls back into the pager, so the lock is never held across it
//!
//! # Usage
//!
//! ```rust
//! use rustux_kobj::kernel::object::{PagerDispatcher, PortDispatcher};
//! use rustux_kobj::kernel::{Kernel, KernelConfig};
//!
//! let kernel = Kernel::new(KernelConfig::default());
//! let pager = PagerDispatcher::create(&kernel, 0).unwrap();
//! let port = PortDispatcher::create(&kernel, 0).unwrap();
//! let vmo = pager
//!     .object()
//!     .as_pager()
//!     .unwrap()
//!     .create_vmo(&kernel, 0, port.object().as_port().unwrap().clone(), 7, 0x3000)
//!     .unwrap();
//! assert!(vmo.object().as_vmo().unwrap().is_pager_backed());
//! ```

use super::diagnostics::PagerInfo;
use super::{
    Dispatcher, Handle, KernelObject, KernelObjectBase, ObjectType, PortDispatcher, Rights,
    Signals, VmoDispatcher, Waitable,
};
use crate::kernel::sync::SpinMutex;
use crate::kernel::vm::PageSource;
use crate::kernel::Kernel;
use crate::rustux::errors::*;
use crate::rustux::types::*;
use crate::{log_debug, log_info};
use std::collections::BTreeMap;
use std::sync::Arc;

struct PagerState {
    sources: BTreeMap<u64, Arc<PageSource>>,
    next_id: u64,
    dead: bool,
}

/// Pager object
pub struct PagerDispatcher {
    base: KernelObjectBase,
    state: SpinMutex<PagerState>,
}

impl PagerDispatcher {
    /// Create a pager. `options` must be 0.
    pub fn create(kernel: &Kernel, options: u32) -> Result<Handle> {
        if options != 0 {
            return Err(Error::InvalidArgs);
        }
        let pager = Arc::new(Self {
            base: KernelObjectBase::new(kernel.alloc_koid(), ObjectType::Pager, Signals::empty()),
            state: SpinMutex::new(PagerState {
                sources: BTreeMap::new(),
                next_id: 1,
                dead: false,
            }),
        });
        log_debug!("pager created: koid={}", pager.koid());

        let rights = pager.default_rights();
        let object = KernelObject::Pager(pager);
        kernel.register_object(&object);
        Ok(Handle::adopt(object, rights))
    }

    /// Create and register a page source
    ///
    /// Fails with `BadState` once the pager is being destroyed and with
    /// `PeerClosed` if `port` is already gone.
    pub fn create_source(self: &Arc<Self>, port: Arc<PortDispatcher>, key: u64) -> Result<Arc<PageSource>> {
        let id = {
            let mut state = self.state.lock();
            if state.dead {
                return Err(Error::BadState);
            }
            let id = state.next_id;
            state.next_id += 1;
            id
        };

        let source = PageSource::new(id, Arc::downgrade(self), port, key)?;

        let registered = {
            let mut state = self.state.lock();
            if !state.dead {
                state.sources.insert(id, source.clone());
            }
            !state.dead
        };
        if !registered {
            source.discard();
            return Err(Error::BadState);
        }
        Ok(source)
    }

    /// Create a VMO backed by this pager
    ///
    /// Requests for the VMO are queued on `port` with `key`. `size` is
    /// rounded up to whole pages and may not exceed the configured maximum.
    pub fn create_vmo(
        self: &Arc<Self>,
        kernel: &Kernel,
        options: u32,
        port: Arc<PortDispatcher>,
        key: u64,
        size: u64,
    ) -> Result<Handle> {
        if options != 0 {
            return Err(Error::InvalidArgs);
        }
        let size = page_round_up(size).ok_or(Error::OutOfRange)?;
        if size > kernel.config().pager_max_vmo_size {
            return Err(Error::OutOfRange);
        }

        let source = self.create_source(port, key)?;
        let (vmo, handle) = VmoDispatcher::create_paged(kernel, size, source.clone());
        source.bind_vmo(&vmo);

        log_info!(
            "pager {}: vmo created koid={} size={:#x} key={}",
            self.koid(),
            vmo.koid(),
            size,
            key
        );
        Ok(handle)
    }

    /// Forget a source; idempotent
    pub(crate) fn release_source(&self, id: u64) {
        let removed = self.state.lock().sources.remove(&id);
        drop(removed);
    }

    fn owned_source<'a>(&self, vmo: &'a VmoDispatcher) -> Result<&'a Arc<PageSource>> {
        let source = vmo.page_source().ok_or(Error::InvalidArgs)?;
        if !source.is_owned_by(self) {
            return Err(Error::InvalidArgs);
        }
        Ok(source)
    }

    /// Detach `vmo` from this pager
    ///
    /// Pending and future faults on the VMO fail with `BadState`.
    pub fn detach_vmo(&self, vmo: &VmoDispatcher) -> Result {
        self.owned_source(vmo)?.close();
        Ok(())
    }

    /// Move pages from `aux` into `vmo`
    ///
    /// All offsets and the length must be page aligned. Supplied pages wake
    /// every thread faulting on them.
    pub fn supply_pages(
        &self,
        vmo: &VmoDispatcher,
        offset: u64,
        length: u64,
        aux: &VmoDispatcher,
        aux_offset: u64,
    ) -> Result {
        self.owned_source(vmo)?;
        if !is_page_aligned(offset) || !is_page_aligned(length) || !is_page_aligned(aux_offset) {
            return Err(Error::InvalidArgs);
        }
        let end = offset.checked_add(length).ok_or(Error::OutOfRange)?;
        let aux_end = aux_offset.checked_add(length).ok_or(Error::OutOfRange)?;
        if end > vmo.size() || aux_end > aux.size() {
            return Err(Error::OutOfRange);
        }
        if aux.is_pager_backed() {
            return Err(Error::NotSupported);
        }
        if vmo.is_detached() {
            return Err(Error::BadState);
        }
        if length == 0 {
            return Ok(());
        }

        vmo.supply_from(offset >> PAGE_SHIFT, aux, aux_offset >> PAGE_SHIFT, length >> PAGE_SHIFT)?;
        log_debug!(
            "pager {}: supplied vmo={} offset={:#x} length={:#x}",
            self.koid(),
            vmo.koid(),
            offset,
            length
        );
        Ok(())
    }

    /// Number of registered sources
    pub fn source_count(&self) -> usize {
        self.state.lock().sources.len()
    }

    /// Snapshot for diagnostics
    pub fn info(&self) -> PagerInfo {
        let sources: Vec<Arc<PageSource>> = self.state.lock().sources.values().cloned().collect();
        PagerInfo {
            koid: self.koid(),
            sources: sources.iter().map(|s| s.info()).collect(),
        }
    }
}

impl Dispatcher for PagerDispatcher {
    fn base(&self) -> &KernelObjectBase {
        &self.base
    }

    fn default_rights(&self) -> Rights {
        Rights::BASIC | Rights::MANAGE_VMO
    }

    fn on_zero_handles(&self) {
        self.state.lock().dead = true;

        let mut closed = 0;
        loop {
            let next = self.state.lock().sources.pop_first();
            match next {
                Some((_, source)) => {
                    source.close();
                    closed += 1;
                }
                None => break,
            }
        }
        log_debug!("pager destroyed: koid={} sources_closed={}", self.koid(), closed);
    }
}

impl Waitable for PagerDispatcher {}

/// ============================================================================
/// Tests
/// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelConfig;

    struct Fixture {
        kernel: Kernel,
        pager: Handle,
        port: Handle,
    }

    impl Fixture {
        fn new() -> Self {
            let kernel = Kernel::new(KernelConfig::default());
            let pager = PagerDispatcher::create(&kernel, 0).unwrap();
            let port = PortDispatcher::create(&kernel, 8).unwrap();
            Self { kernel, pager, port }
        }

        fn pager(&self) -> &Arc<PagerDispatcher> {
            self.pager.object().as_pager().unwrap()
        }

        fn port(&self) -> Arc<PortDispatcher> {
            self.port.object().as_port().unwrap().clone()
        }

        fn vmo(&self, size: u64) -> Handle {
            self.pager().create_vmo(&self.kernel, 0, self.port(), 1, size).unwrap()
        }
    }

    #[test]
    fn test_create_vmo_sizes() {
        let f = Fixture::new();
        let vmo = f.vmo(1);
        assert_eq!(vmo.object().as_vmo().unwrap().size(), PAGE_SIZE as u64);
        assert_eq!(f.pager().source_count(), 1);

        let max = f.kernel.config().pager_max_vmo_size;
        assert_eq!(
            f.pager().create_vmo(&f.kernel, 0, f.port(), 1, max + 1).unwrap_err(),
            Error::OutOfRange
        );
        assert_eq!(
            f.pager().create_vmo(&f.kernel, 1, f.port(), 1, 0x1000).unwrap_err(),
            Error::InvalidArgs
        );
    }

    #[test]
    fn test_supply_validation() {
        let f = Fixture::new();
        let vmo = f.vmo(0x2000);
        let vmo = vmo.object().as_vmo().unwrap();
        let aux = VmoDispatcher::create(&f.kernel, 0x2000, 0).unwrap();
        let aux = aux.object().as_vmo().unwrap();

        assert_eq!(f.pager().supply_pages(vmo, 1, 0x1000, aux, 0), Err(Error::InvalidArgs));
        assert_eq!(f.pager().supply_pages(vmo, 0x1000, 0x2000, aux, 0), Err(Error::OutOfRange));
        // Not ours.
        assert_eq!(f.pager().supply_pages(aux, 0, 0x1000, aux, 0), Err(Error::InvalidArgs));

        f.pager().supply_pages(vmo, 0, 0x2000, aux, 0).unwrap();
        assert_eq!(vmo.committed_pages(), 2);
        assert_eq!(vmo.pending_pages(), 0);
    }

    #[test]
    fn test_detach() {
        let f = Fixture::new();
        let handle = f.vmo(0x1000);
        let vmo = handle.object().as_vmo().unwrap();

        f.pager().detach_vmo(vmo).unwrap();
        assert!(vmo.is_detached());
        assert_eq!(f.pager().source_count(), 0);
        assert_eq!(vmo.fault_page(0), Err(Error::BadState));
        // Idempotent.
        f.pager().detach_vmo(vmo).unwrap();

        // A supply after detach leaves the donor untouched.
        let aux = VmoDispatcher::create(&f.kernel, 0x1000, 0).unwrap();
        let aux = aux.object().as_vmo().unwrap();
        aux.write(0, &[3u8; 4]).unwrap();
        assert_eq!(f.pager().supply_pages(vmo, 0, 0x1000, aux, 0), Err(Error::BadState));
        assert_eq!(aux.committed_pages(), 1);

        let other = PagerDispatcher::create(&f.kernel, 0).unwrap();
        assert_eq!(
            other.object().as_pager().unwrap().detach_vmo(vmo),
            Err(Error::InvalidArgs)
        );
    }

    #[test]
    fn test_destroy_closes_sources() {
        let f = Fixture::new();
        let a = f.vmo(0x1000);
        let b = f.vmo(0x1000);
        let pager = f.pager().clone();
        assert_eq!(pager.info().sources.len(), 2);

        drop(f.pager);
        assert_eq!(pager.source_count(), 0);
        assert!(a.object().as_vmo().unwrap().is_detached());
        assert!(b.object().as_vmo().unwrap().is_detached());
        assert_eq!(
            pager.create_source(f.port.object().as_port().unwrap().clone(), 3).err(),
            Some(Error::BadState)
        );
    }
}

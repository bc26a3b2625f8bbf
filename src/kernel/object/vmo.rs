// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Virtual Memory Objects (VMOs)
//!
//! VMOs are page-granular memory objects. An anonymous VMO commits
//! zero-filled pages on first touch; a pager-backed VMO asks its
//! [`PageSource`] for every missing page and blocks the faulting thread
//! until the pager supplies it.
//!
//! # Design
//!
//! - **Page-based**: Memory is managed in page-sized chunks, committed
//!   lazily
//! - **Faults**: A fault arms a signal wait *before* inspecting the page
//!   map, so a supply racing with the fault is never missed. The first
//!   faulting thread for a page sends the request; later ones only wait
//! - **Outcome signals**: `VMO_PAGES_SUPPLIED` is pulsed after a supply,
//!   `VMO_DETACHED` and `PEER_CLOSED` stay asserted and fail pending faults
//!   with `BadState` and `PeerClosed`
//!
//! # Usage
//!
//! ```rust
//! use rustux_kobj::kernel::object::VmoDispatcher;
//! use rustux_kobj::kernel::{Kernel, KernelConfig};
//!
//! let kernel = Kernel::new(KernelConfig::default());
//! let handle = VmoDispatcher::create(&kernel, 0x1000, 0).unwrap();
//! let vmo = handle.object().as_vmo().unwrap();
//! vmo.write(0, b"hello").unwrap();
//! let mut buf = [0u8; 5];
//! vmo.read(0, &mut buf).unwrap();
//! assert_eq!(&buf, b"hello");
//! ```

use super::wait::SignalWaiter;
use super::{Dispatcher, Handle, KernelObject, KernelObjectBase, ObjectType, Rights, Signals, Waitable};
use crate::kernel::sync::SpinMutex;
use crate::kernel::vm::PageSource;
use crate::kernel::Kernel;
use crate::rustux::errors::*;
use crate::rustux::types::*;
use crate::log_trace;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One page of memory
pub type Page = Box<[u8]>;

fn zero_page() -> Page {
    vec![0u8; PAGE_SIZE].into_boxed_slice()
}

/// ============================================================================
/// Page Map
/// ============================================================================

#[derive(Default)]
struct VmoPages {
    /// Committed pages by page index
    present: BTreeMap<u64, Page>,

    /// Page indices with a request in flight
    pending: BTreeSet<u64>,

    /// Detached from the pager
    detached: bool,

    /// The pager's port is gone
    peer_closed: bool,
}

/// ============================================================================
/// VMO Dispatcher
/// ============================================================================

/// Virtual memory object
pub struct VmoDispatcher {
    base: KernelObjectBase,
    size: u64,
    pages: SpinMutex<VmoPages>,
    source: Option<Arc<PageSource>>,
}

impl VmoDispatcher {
    /// Create an anonymous VMO
    ///
    /// `size` is rounded up to whole pages. `options` must be 0.
    pub fn create(kernel: &Kernel, size: u64, options: u32) -> Result<Handle> {
        if options != 0 {
            return Err(Error::InvalidArgs);
        }
        let size = page_round_up(size).ok_or(Error::OutOfRange)?;
        let (_, handle) = Self::create_internal(kernel, size, None);
        Ok(handle)
    }

    /// Create a VMO backed by `source`
    pub(crate) fn create_paged(
        kernel: &Kernel,
        size: u64,
        source: Arc<PageSource>,
    ) -> (Arc<Self>, Handle) {
        Self::create_internal(kernel, size, Some(source))
    }

    fn create_internal(
        kernel: &Kernel,
        size: u64,
        source: Option<Arc<PageSource>>,
    ) -> (Arc<Self>, Handle) {
        let vmo = Arc::new(Self {
            base: KernelObjectBase::new(kernel.alloc_koid(), ObjectType::Vmo, Signals::empty()),
            size,
            pages: SpinMutex::new(VmoPages::default()),
            source,
        });
        let rights = vmo.default_rights();
        let object = KernelObject::Vmo(vmo.clone());
        kernel.register_object(&object);
        (vmo, Handle::adopt(object, rights))
    }

    /// Size in bytes (page aligned)
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Size in pages
    pub fn page_count(&self) -> u64 {
        self.size >> PAGE_SHIFT
    }

    /// Page source, for pager-backed VMOs
    pub fn page_source(&self) -> Option<&Arc<PageSource>> {
        self.source.as_ref()
    }

    /// Check whether a pager backs this VMO
    pub fn is_pager_backed(&self) -> bool {
        self.source.is_some()
    }

    /// Number of committed pages
    pub fn committed_pages(&self) -> usize {
        self.pages.lock().present.len()
    }

    /// Number of pages with a request in flight
    pub fn pending_pages(&self) -> usize {
        self.pages.lock().pending.len()
    }

    /// Check whether the VMO was detached from its pager
    pub fn is_detached(&self) -> bool {
        self.pages.lock().detached
    }

    /// Check whether page `index` is committed
    pub fn is_page_present(&self, index: u64) -> bool {
        self.pages.lock().present.contains_key(&index)
    }

    /// ========================================================================
    /// Faults
    /// ========================================================================

    /// Make page `index` present
    ///
    /// Anonymous VMOs commit a zero page. Pager-backed VMOs request the page
    /// and block until it is supplied.
    ///
    /// # Returns
    ///
    /// - `Err(Error::OutOfRange)` if `index` is past the end
    /// - `Err(Error::BadState)` if the VMO was detached
    /// - `Err(Error::PeerClosed)` if the pager's port is gone
    /// - `Err(Error::Canceled)` if the VMO was destroyed while waiting
    pub fn fault_page(&self, index: u64) -> Result {
        if index >= self.page_count() {
            return Err(Error::OutOfRange);
        }

        let Some(source) = &self.source else {
            self.pages.lock().present.entry(index).or_insert_with(zero_page);
            return Ok(());
        };

        let interest = Signals::VMO_PAGES_SUPPLIED | Signals::VMO_DETACHED | Signals::PEER_CLOSED;
        loop {
            let waiter = SignalWaiter::arm(self.base.signals(), interest)?;

            let checked = {
                let mut pages = self.pages.lock();
                if pages.present.contains_key(&index) {
                    Err(Ok(()))
                } else if pages.detached {
                    Err(Err(Error::BadState))
                } else if pages.peer_closed {
                    Err(Err(Error::PeerClosed))
                } else {
                    Ok(pages.pending.insert(index))
                }
            };
            let first = match checked {
                Ok(first) => first,
                Err(done) => {
                    waiter.disarm();
                    return done;
                }
            };

            if first {
                log_trace!("vmo {} fault page {}", self.koid(), index);
                let offset = index << PAGE_SHIFT;
                if let Err(e) = source.request(offset, PAGE_SIZE as u64) {
                    self.pages.lock().pending.remove(&index);
                    waiter.disarm();
                    return Err(e);
                }
            }

            waiter.wait(Deadline::Infinite)?;
        }
    }

    fn for_each_chunk(
        &self,
        offset: u64,
        len: usize,
        mut f: impl FnMut(&mut VmoPages, u64, usize, usize, usize) -> Result,
    ) -> Result<usize> {
        if offset >= self.size {
            return Err(Error::OutOfRange);
        }
        let len = core::cmp::min(len as u64, self.size - offset) as usize;
        let end = offset + len as u64;

        let mut done = 0;
        let mut current = offset;
        while current < end {
            let index = current >> PAGE_SHIFT;
            let in_page = (current & (PAGE_SIZE as u64 - 1)) as usize;
            let chunk = core::cmp::min((end - current) as usize, PAGE_SIZE - in_page);

            self.fault_page(index)?;
            f(&mut *self.pages.lock(), index, in_page, done, chunk)?;

            done += chunk;
            current += chunk as u64;
        }
        Ok(len)
    }

    /// Read from VMO
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset to read from
    /// * `buf` - Buffer to read into
    ///
    /// Faults every page touched. Returns the number of bytes read.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.for_each_chunk(offset, buf.len(), |pages, index, in_page, done, chunk| {
            let page = pages.present.get(&index).ok_or(Error::BadState)?;
            buf[done..done + chunk].copy_from_slice(&page[in_page..in_page + chunk]);
            Ok(())
        })
    }

    /// Write to VMO
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset to write to
    /// * `buf` - Buffer to write from
    pub fn write(&self, offset: u64, buf: &[u8]) -> Result<usize> {
        self.for_each_chunk(offset, buf.len(), |pages, index, in_page, done, chunk| {
            let page = pages.present.get_mut(&index).ok_or(Error::BadState)?;
            page[in_page..in_page + chunk].copy_from_slice(&buf[done..done + chunk]);
            Ok(())
        })
    }

    /// ========================================================================
    /// Pager Support
    /// ========================================================================

    /// Move `count` pages from `aux` starting at page `aux_first` into this
    /// VMO starting at page `first`
    ///
    /// Both page maps stay locked for the whole move, this VMO's first, so a
    /// concurrent detach sees either the whole move or none of it. Pages
    /// missing from `aux` arrive zero-filled; pages already present here keep
    /// their contents. Only anonymous VMOs can donate pages.
    pub(crate) fn supply_from(&self, first: u64, aux: &VmoDispatcher, aux_first: u64, count: u64) -> Result {
        if aux.is_pager_backed() {
            return Err(Error::NotSupported);
        }
        let end = first.checked_add(count).ok_or(Error::OutOfRange)?;
        let aux_end = aux_first.checked_add(count).ok_or(Error::OutOfRange)?;
        if end > self.page_count() || aux_end > aux.page_count() {
            return Err(Error::OutOfRange);
        }

        {
            let mut pages = self.pages.lock();
            if pages.detached {
                return Err(Error::BadState);
            }
            let mut donor = aux.pages.lock();
            for (index, aux_index) in (first..end).zip(aux_first..aux_end) {
                let page = donor.present.remove(&aux_index).unwrap_or_else(zero_page);
                pages.pending.remove(&index);
                pages.present.entry(index).or_insert(page);
            }
        }
        self.base.signals().pulse(Signals::VMO_PAGES_SUPPLIED);
        Ok(())
    }

    /// Fail all current and future faults with `BadState`
    pub(crate) fn mark_detached(&self) {
        {
            let mut pages = self.pages.lock();
            pages.detached = true;
            pages.pending.clear();
        }
        self.base.signals().set_signals(Signals::empty(), Signals::VMO_DETACHED);
    }

    /// Fail all current and future faults with `PeerClosed`
    pub(crate) fn mark_peer_closed(&self) {
        {
            let mut pages = self.pages.lock();
            pages.peer_closed = true;
            pages.pending.clear();
        }
        self.base.signals().set_signals(Signals::empty(), Signals::PEER_CLOSED);
    }
}

impl Dispatcher for VmoDispatcher {
    fn base(&self) -> &KernelObjectBase {
        &self.base
    }

    fn default_rights(&self) -> Rights {
        Rights::BASIC | Rights::IO | Rights::PROPERTY | Rights::MAP | Rights::SIGNAL
    }

    fn allowed_user_signals(&self) -> Signals {
        Signals::USER_ALL
    }

    fn on_zero_handles(&self) {
        if let Some(source) = &self.source {
            source.close();
        }
    }
}

impl Waitable for VmoDispatcher {}

/// ============================================================================
/// Tests
/// ============================================================================

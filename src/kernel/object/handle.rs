// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Handle & Rights Model
//!
//! This module implements the capability-based handle system.
//! All kernel resources are accessed through handles with rights,
//! ensuring fine-grained access control.
//!
//! # Design
//!
//! - **Handles**: Capability tokens referencing kernel objects. A handle
//!   owns one reference on its object; dropping the handle releases it
//! - **Rights**: Bitmask specifying permitted operations. Rights can only
//!   shrink when a handle is duplicated or replaced
//! - **Enforcement**: Every lookup validates type and rights before the
//!   object is touched
//! - **Values**: Handle values encode a slot index and a generation, so a
//!   value stays invalid after its slot is reused
//!
//! # Usage
//!
//! ```rust
//! use rustux_kobj::kernel::object::{EventDispatcher, HandleTable, Rights, RightsCheckable};
//! use rustux_kobj::kernel::{Kernel, KernelConfig};
//!
//! let kernel = Kernel::new(KernelConfig::default());
//! let table = HandleTable::new(1, 16);
//! let value = table.add(EventDispatcher::create(&kernel).unwrap()).unwrap();
//! let dup = table.duplicate(value, Rights::WAIT).unwrap();
//! assert_eq!(table.get(dup).unwrap().rights(), Rights::WAIT);
//! ```

use super::diagnostics::HandleInfo;
use super::{
    EventDispatcher, KernelObject, ObjectType, PagerDispatcher, PortDispatcher, VmoDispatcher,
};
use crate::kernel::sync::SpinMutex;
use crate::log_trace;
use crate::rustux::errors::*;
use crate::rustux::types::*;
use bitflags::bitflags;
use std::sync::Arc;

/// ============================================================================
/// Handle Rights
/// ============================================================================

bitflags! {
    /// Handle rights bitmask
    ///
    /// Rights are permissions that control what operations can be performed
    /// on a kernel object through a handle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Rights: u32 {
        const DUPLICATE = 1 << 0;
        const TRANSFER = 1 << 1;
        const READ = 1 << 2;
        const WRITE = 1 << 3;
        const EXECUTE = 1 << 4;
        const MAP = 1 << 5;
        const GET_PROPERTY = 1 << 6;
        const SET_PROPERTY = 1 << 7;
        const ENUMERATE = 1 << 8;
        const DESTROY = 1 << 9;
        const SET_POLICY = 1 << 10;
        const GET_POLICY = 1 << 11;
        const SIGNAL = 1 << 12;
        const SIGNAL_PEER = 1 << 13;
        const WAIT = 1 << 14;
        const INSPECT = 1 << 15;
        /// Create, detach and supply pager-backed VMOs
        const MANAGE_VMO = 1 << 16;

        /// Sentinel: keep the source handle's rights
        const SAME_RIGHTS = 1 << 31;
    }
}

impl Rights {
    /// Rights every transferable object carries
    pub const BASIC: Self = Self::TRANSFER
        .union(Self::DUPLICATE)
        .union(Self::WAIT)
        .union(Self::INSPECT);

    /// Read and write
    pub const IO: Self = Self::READ.union(Self::WRITE);

    /// Property access
    pub const PROPERTY: Self = Self::GET_PROPERTY.union(Self::SET_PROPERTY);

    /// Require specific rights
    ///
    /// # Returns
    ///
    /// - Ok(()) if all rights are present
    /// - Err(Error::AccessDenied) if any right is missing
    pub fn require(self, required: Self) -> Result {
        if self.contains(required) {
            Ok(())
        } else {
            Err(Error::AccessDenied)
        }
    }

    /// Resolve the rights of a derived handle
    ///
    /// `SAME_RIGHTS` keeps `self`; otherwise `requested` must be a subset
    /// of `self` or the call fails with `AccessDenied`.
    pub fn derive(self, requested: Self) -> Result<Self> {
        if requested.contains(Self::SAME_RIGHTS) {
            return Ok(self);
        }
        if !self.contains(requested) {
            return Err(Error::AccessDenied);
        }
        Ok(requested)
    }
}

/// Access checks on anything that carries rights
pub trait RightsCheckable {
    /// Rights held
    fn rights(&self) -> Rights;

    /// Fail with `AccessDenied` unless every right in `required` is held
    fn require(&self, required: Rights) -> Result {
        self.rights().require(required)
    }

    /// Check a single right
    fn has_right(&self, right: Rights) -> bool {
        self.rights().contains(right)
    }
}

/// ============================================================================
/// Handle
/// ============================================================================

/// Capability: an object reference plus rights
///
/// Owns one reference on the object for its whole lifetime.
pub struct Handle {
    object: KernelObject,
    rights: Rights,
}

impl Handle {
    /// Wrap a freshly created object, adopting its initial reference
    pub(crate) fn adopt(object: KernelObject, rights: Rights) -> Self {
        Self { object, rights }
    }

    /// Create a new handle, taking a fresh reference on `object`
    pub fn new(object: KernelObject, rights: Rights) -> Self {
        object.add_ref();
        Self { object, rights }
    }

    /// Referenced object
    pub fn object(&self) -> &KernelObject {
        &self.object
    }

    /// Koid of the referenced object
    pub fn koid(&self) -> Koid {
        self.object.koid()
    }

    /// Type of the referenced object
    pub fn object_type(&self) -> ObjectType {
        self.object.object_type()
    }

    /// Duplicate with the same or fewer rights
    ///
    /// Requires `DUPLICATE` on this handle.
    pub fn duplicate(&self, rights: Rights) -> Result<Handle> {
        self.require(Rights::DUPLICATE)?;
        let rights = self.rights.derive(rights)?;
        Ok(Handle::new(self.object.clone(), rights))
    }
}

impl RightsCheckable for Handle {
    fn rights(&self) -> Rights {
        self.rights
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.object.release();
    }
}

impl core::fmt::Debug for Handle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Handle")
            .field("object", &self.object)
            .field("rights", &self.rights)
            .finish()
    }
}

/// ============================================================================
/// Handle Values
/// ============================================================================

/// Process-local handle value
pub type HandleValue = u32;

/// Never a valid handle value
pub const HANDLE_INVALID: HandleValue = 0;

const INDEX_BITS: u32 = 20;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: u32 = (1 << 11) - 1;

/// Largest table size the value encoding can address
pub const MAX_HANDLE_SLOTS: usize = 1 << INDEX_BITS;

fn encode(index: usize, generation: u32) -> HandleValue {
    1 | ((index as u32 & INDEX_MASK) << 1) | ((generation & GENERATION_MASK) << (INDEX_BITS + 1))
}

fn decode(value: HandleValue) -> Option<(usize, u32)> {
    if value & 1 == 0 {
        return None;
    }
    let index = (value >> 1) & INDEX_MASK;
    let generation = value >> (INDEX_BITS + 1);
    Some((index as usize, generation))
}

/// ============================================================================
/// Handle Table
/// ============================================================================

struct HandleSlot {
    generation: u32,
    handle: Option<Handle>,
}

struct TableInner {
    slots: Vec<HandleSlot>,
    free: Vec<usize>,
    count: usize,
    closed: bool,
}

impl TableInner {
    fn lookup(&self, value: HandleValue) -> Result<&Handle> {
        let (index, generation) = decode(value).ok_or(Error::BadHandle)?;
        match self.slots.get(index) {
            Some(slot) if slot.generation == generation => {
                slot.handle.as_ref().ok_or(Error::BadHandle)
            }
            _ => Err(Error::BadHandle),
        }
    }

    fn has_room(&self, max: usize) -> bool {
        !self.free.is_empty() || self.slots.len() < max
    }

    fn insert(&mut self, max: usize, handle: Handle) -> core::result::Result<HandleValue, Handle> {
        if self.closed {
            return Err(handle);
        }
        let index = match self.free.pop() {
            Some(index) => index,
            None if self.slots.len() < max => {
                self.slots.push(HandleSlot {
                    generation: 0,
                    handle: None,
                });
                self.slots.len() - 1
            }
            None => return Err(handle),
        };

        let slot = &mut self.slots[index];
        slot.handle = Some(handle);
        self.count += 1;
        Ok(encode(index, slot.generation))
    }

    fn take(&mut self, value: HandleValue) -> Result<Handle> {
        self.lookup(value)?;
        let (index, _) = decode(value).ok_or(Error::BadHandle)?;
        let slot = &mut self.slots[index];
        let handle = slot.handle.take().ok_or(Error::BadHandle)?;
        slot.generation = (slot.generation + 1) & GENERATION_MASK;
        self.free.push(index);
        self.count -= 1;
        Ok(handle)
    }

    fn insert_error(&self) -> Error {
        if self.closed {
            Error::BadState
        } else {
            Error::NoResources
        }
    }
}

/// Handle table
///
/// Maps a process's handle values to handles.
pub struct HandleTable {
    /// Koid of the owning process (orders locks between tables)
    owner: Koid,

    /// Maximum number of live handles
    max_handles: usize,

    inner: SpinMutex<TableInner>,
}

impl HandleTable {
    /// Create an empty handle table
    pub fn new(owner: Koid, max_handles: usize) -> Self {
        Self {
            owner,
            max_handles: max_handles.clamp(1, MAX_HANDLE_SLOTS),
            inner: SpinMutex::new(TableInner {
                slots: Vec::new(),
                free: Vec::new(),
                count: 0,
                closed: false,
            }),
        }
    }

    /// Koid of the owning process
    pub fn owner(&self) -> Koid {
        self.owner
    }

    /// Add a handle to the table
    ///
    /// # Returns
    ///
    /// - Handle value for userspace
    /// - `Err(Error::NoResources)` if the table is full (the handle is dropped)
    /// - `Err(Error::BadState)` if the table was closed
    pub fn add(&self, handle: Handle) -> Result<HandleValue> {
        // Dropped outside the table lock: it may finalize the object.
        self.try_add(handle).map_err(|(err, handle)| {
            drop(handle);
            err
        })
    }

    /// Add a handle, giving it back on failure
    ///
    /// Lets the caller tear down an object that never reached user mode.
    pub fn try_add(&self, handle: Handle) -> core::result::Result<HandleValue, (Error, Handle)> {
        let result = {
            let mut inner = self.inner.lock();
            let err = inner.insert_error();
            inner.insert(self.max_handles, handle).map_err(|h| (err, h))
        };
        if let Ok(value) = result {
            log_trace!("handle add: table={} value={:#x}", self.owner, value);
        }
        result
    }

    /// Look up a handle, returning its object and rights
    pub fn get(&self, value: HandleValue) -> Result<HandleRef> {
        let inner = self.inner.lock();
        let handle = inner.lookup(value)?;
        Ok(HandleRef {
            object: handle.object.clone(),
            rights: handle.rights,
        })
    }

    /// Look up a handle and check rights
    pub fn get_object(&self, value: HandleValue, required: Rights) -> Result<KernelObject> {
        let handle = self.get(value)?;
        handle.require(required)?;
        Ok(handle.object)
    }

    /// Look up a port handle
    pub fn get_port(&self, value: HandleValue, required: Rights) -> Result<Arc<PortDispatcher>> {
        self.get_typed(value, required, |o| o.as_port().cloned())
    }

    /// Look up a pager handle
    pub fn get_pager(&self, value: HandleValue, required: Rights) -> Result<Arc<PagerDispatcher>> {
        self.get_typed(value, required, |o| o.as_pager().cloned())
    }

    /// Look up a VMO handle
    pub fn get_vmo(&self, value: HandleValue, required: Rights) -> Result<Arc<VmoDispatcher>> {
        self.get_typed(value, required, |o| o.as_vmo().cloned())
    }

    /// Look up an event handle
    pub fn get_event(&self, value: HandleValue, required: Rights) -> Result<Arc<EventDispatcher>> {
        self.get_typed(value, required, |o| o.as_event().cloned())
    }

    fn get_typed<T>(
        &self,
        value: HandleValue,
        required: Rights,
        cast: impl FnOnce(&KernelObject) -> Option<T>,
    ) -> Result<T> {
        let handle = self.get(value)?;
        let typed = cast(&handle.object).ok_or(Error::BadHandle)?;
        handle.require(required)?;
        Ok(typed)
    }

    /// Remove a handle, handing ownership to the caller
    pub fn remove(&self, value: HandleValue) -> Result<Handle> {
        self.inner.lock().take(value)
    }

    /// Close a handle
    pub fn close(&self, value: HandleValue) -> Result {
        let handle = self.remove(value)?;
        log_trace!("handle close: table={} value={:#x}", self.owner, value);
        drop(handle);
        Ok(())
    }

    /// Duplicate a handle in the table
    ///
    /// Requires `DUPLICATE`. The new rights must be a subset of the source
    /// rights (or `SAME_RIGHTS`); nothing is inserted on failure.
    pub fn duplicate(&self, value: HandleValue, rights: Rights) -> Result<HandleValue> {
        let mut inner = self.inner.lock();
        let source = inner.lookup(value)?;
        let dup = source.duplicate(rights)?;

        if !inner.has_room(self.max_handles) || inner.closed {
            let err = inner.insert_error();
            drop(inner);
            drop(dup);
            return Err(err);
        }

        match inner.insert(self.max_handles, dup) {
            Ok(value) => Ok(value),
            Err(dup) => {
                let err = inner.insert_error();
                drop(inner);
                drop(dup);
                Err(err)
            }
        }
    }

    /// Replace a handle with one carrying the same or fewer rights
    ///
    /// On success `value` is invalid; on failure nothing changes.
    pub fn replace(&self, value: HandleValue, rights: Rights) -> Result<HandleValue> {
        let (old, new_value) = {
            let mut inner = self.inner.lock();
            let source = inner.lookup(value)?;
            let rights = source.rights.derive(rights)?;
            let replacement = Handle::new(source.object.clone(), rights);

            let old = inner.take(value)?;
            match inner.insert(self.max_handles, replacement) {
                Ok(new_value) => (old, new_value),
                // The slot just freed is always available.
                Err(_) => unreachable!("handle slot vanished during replace"),
            }
        };
        // Never the last reference: the replacement holds one.
        drop(old);
        Ok(new_value)
    }

    /// Move a handle into another table
    ///
    /// Requires `TRANSFER`. If `dest` is full or closed the handle stays in
    /// this table.
    pub fn transfer(&self, value: HandleValue, dest: &HandleTable) -> Result<HandleValue> {
        if core::ptr::eq(self, dest) {
            let mut inner = self.inner.lock();
            inner.lookup(value)?.require(Rights::TRANSFER)?;
            let handle = inner.take(value)?;
            return match inner.insert(self.max_handles, handle) {
                Ok(v) => Ok(v),
                Err(_) => unreachable!("handle slot vanished during transfer"),
            };
        }

        let (mut src, mut dst) = if self.owner <= dest.owner {
            let src = self.inner.lock();
            let dst = dest.inner.lock();
            (src, dst)
        } else {
            let dst = dest.inner.lock();
            let src = self.inner.lock();
            (src, dst)
        };

        src.lookup(value)?.require(Rights::TRANSFER)?;
        if dst.closed || !dst.has_room(dest.max_handles) {
            return Err(dst.insert_error());
        }

        let handle = src.take(value)?;
        match dst.insert(dest.max_handles, handle) {
            Ok(new_value) => Ok(new_value),
            Err(_) => unreachable!("destination table filled while locked"),
        }
    }

    /// Close every handle and refuse new ones
    ///
    /// Returns the number of handles closed.
    pub fn close_all(&self) -> usize {
        let handles: Vec<Handle> = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.free.clear();
            inner.count = 0;
            inner.slots.drain(..).filter_map(|s| s.handle).collect()
        };
        let count = handles.len();
        drop(handles);
        count
    }

    /// Walk every live handle
    pub fn for_each(&self, mut f: impl FnMut(HandleInfo)) {
        let infos: Vec<HandleInfo> = {
            let inner = self.inner.lock();
            inner
                .slots
                .iter()
                .enumerate()
                .filter_map(|(index, slot)| {
                    slot.handle.as_ref().map(|h| HandleInfo {
                        value: encode(index, slot.generation),
                        koid: h.koid(),
                        object_type: h.object_type(),
                        rights: h.rights,
                    })
                })
                .collect()
        };
        infos.into_iter().for_each(&mut f);
    }

    /// Get handle count
    pub fn count(&self) -> usize {
        self.inner.lock().count
    }

    /// Maximum number of live handles
    pub fn max_handles(&self) -> usize {
        self.max_handles
    }

    /// Check if handle table is full
    pub fn is_full(&self) -> bool {
        !self.inner.lock().has_room(self.max_handles)
    }
}

/// Borrowed view of a table entry
///
/// Holds memory, not an owning reference: it does not keep the object open.
#[derive(Debug, Clone)]
pub struct HandleRef {
    object: KernelObject,
    rights: Rights,
}

impl HandleRef {
    /// Referenced object
    pub fn object(&self) -> &KernelObject {
        &self.object
    }
}

impl RightsCheckable for HandleRef {
    fn rights(&self) -> Rights {
        self.rights
    }
}

/// ============================================================================
/// Tests
/// ============================================================================

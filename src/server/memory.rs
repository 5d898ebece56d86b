//! Typed memory areas backing the server's data model.
//!
//! An area couples a Modbus address range with locked backing bytes. Areas
//! are value-like handles: cloning shares the backing storage, so the same
//! area (or store) can be registered with several servers. Derived areas
//! view a sub-range of their base area's bytes, which allows exposing the
//! same data under different types, e.g. as coils and as holding registers.

use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    error::Error,
    frame::{Address, Quantity, ADDRESS_SPACE},
};

/// A callback attached to a memory area.
///
/// `on_read` hooks refresh computed values (e.g. an uptime counter) right
/// before the area is accessed; `on_write` hooks observe freshly written
/// data after the response frame went out. The slice covers the bytes of
/// the area the hook is attached to.
pub type AreaHook = Arc<dyn Fn(&mut [u8]) + Send + Sync>;

/// The four Modbus memory types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    /// Single-bit, read/write.
    Coils,
    /// Single-bit, read-only.
    DiscreteInputs,
    /// 16-bit big-endian, read/write.
    HoldingRegisters,
    /// 16-bit big-endian, read-only.
    InputRegisters,
}

impl MemoryKind {
    /// Whether items of this kind are addressed as single bits.
    #[must_use]
    pub const fn is_bits(self) -> bool {
        matches!(self, Self::Coils | Self::DiscreteInputs)
    }
}

/// A typed address range with locked backing bytes.
#[derive(Clone)]
pub struct MemoryArea {
    kind: MemoryKind,
    base_address: Address,
    item_count: u32,
    storage: Arc<Mutex<Vec<u8>>>,
    offset: usize,
    len: usize,
    on_read: Option<AreaHook>,
    on_write: Option<AreaHook>,
    parent: Option<Box<MemoryArea>>,
}

impl MemoryArea {
    /// Create an area owning its backing bytes.
    ///
    /// The addressable item count is derived from the data size: one item
    /// per bit for bit kinds and one per two bytes for register kinds,
    /// clamped to the end of the address space.
    #[must_use]
    pub fn new(kind: MemoryKind, base_address: Address, data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            kind,
            base_address,
            item_count: derive_item_count(kind, base_address, len),
            storage: Arc::new(Mutex::new(data)),
            offset: 0,
            len,
            on_read: None,
            on_write: None,
            parent: None,
        }
    }

    /// Create an area with zero-initialized backing bytes.
    #[must_use]
    pub fn zeroed(kind: MemoryKind, base_address: Address, byte_len: usize) -> Self {
        Self::new(kind, base_address, vec![0; byte_len])
    }

    /// Create an area aliasing `byte_len` bytes of `base`, starting at
    /// `byte_offset` within the base area.
    ///
    /// The derived area shares the base area's lock, and hook lookups fall
    /// through to the base unless the derived area installs its own hooks.
    pub fn derived(
        kind: MemoryKind,
        base_address: Address,
        base: &MemoryArea,
        byte_offset: usize,
        byte_len: usize,
    ) -> Result<Self, Error> {
        if byte_offset + byte_len > base.len {
            return Err(Error::InvalidArgument("derived area exceeds its base"));
        }
        Ok(Self {
            kind,
            base_address,
            item_count: derive_item_count(kind, base_address, byte_len),
            storage: Arc::clone(&base.storage),
            offset: base.offset + byte_offset,
            len: byte_len,
            on_read: None,
            on_write: None,
            parent: Some(Box::new(base.clone())),
        })
    }

    /// Install a hook that runs right before the area is accessed.
    #[must_use]
    pub fn on_read(mut self, hook: AreaHook) -> Self {
        self.on_read = Some(hook);
        self
    }

    /// Install a hook that runs after written data has been acknowledged.
    #[must_use]
    pub fn on_write(mut self, hook: AreaHook) -> Self {
        self.on_write = Some(hook);
        self
    }

    #[must_use]
    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    #[must_use]
    pub fn base_address(&self) -> Address {
        self.base_address
    }

    /// Number of addressable items in this area.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.item_count
    }

    /// Whether the area fully contains `[address, address + quantity)`.
    #[must_use]
    pub fn covers(&self, address: Address, quantity: Quantity) -> bool {
        self.base_address <= address
            && u32::from(self.base_address) + self.item_count
                >= u32::from(address) + u32::from(quantity)
    }

    /// Lock the backing storage and borrow the area's bytes.
    ///
    /// Application code sharing an area with a running server must hold
    /// this guard for the duration of any non-atomic access.
    pub fn lock(&self) -> AreaGuard<'_> {
        AreaGuard {
            guard: self.raw_lock(),
            offset: self.offset,
            len: self.len,
        }
    }

    /// Lock the storage, fire the `on_read` hook and pass the area's bytes
    /// to `f`. The hook fires before every access, including writes.
    pub(crate) fn with_bytes<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut storage = self.raw_lock();
        if let Some((hook, owner_offset, owner_len)) = self.resolve_hook(|area| &area.on_read) {
            hook(&mut storage[owner_offset..owner_offset + owner_len]);
        }
        f(&mut storage[self.offset..self.offset + self.len])
    }

    /// Fire the `on_write` hook, if any is installed on this area or on one
    /// of its bases.
    pub(crate) fn notify_written(&self) {
        if let Some((hook, owner_offset, owner_len)) = self.resolve_hook(|area| &area.on_write) {
            let mut storage = self.raw_lock();
            hook(&mut storage[owner_offset..owner_offset + owner_len]);
        }
    }

    fn raw_lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Walk this area and its base chain for the first installed hook,
    /// together with the byte range of the area owning it.
    fn resolve_hook(
        &self,
        pick: fn(&MemoryArea) -> &Option<AreaHook>,
    ) -> Option<(AreaHook, usize, usize)> {
        let mut area = self;
        loop {
            if let Some(hook) = pick(area) {
                return Some((Arc::clone(hook), area.offset, area.len));
            }
            area = area.parent.as_deref()?;
        }
    }
}

impl fmt::Debug for MemoryArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryArea")
            .field("kind", &self.kind)
            .field("base_address", &self.base_address)
            .field("item_count", &self.item_count)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

fn derive_item_count(kind: MemoryKind, base_address: Address, byte_len: usize) -> u32 {
    let cap = u64::from(ADDRESS_SPACE - u32::from(base_address));
    let items = if kind.is_bits() {
        byte_len as u64 * 8
    } else {
        byte_len as u64 / 2
    };
    items.min(cap) as u32
}

/// Scoped access to a memory area's bytes, see [`MemoryArea::lock`].
#[derive(Debug)]
pub struct AreaGuard<'a> {
    guard: MutexGuard<'a, Vec<u8>>,
    offset: usize,
    len: usize,
}

impl Deref for AreaGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard[self.offset..self.offset + self.len]
    }
}

impl DerefMut for AreaGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.guard[self.offset..self.offset + self.len]
    }
}

/// An insertion-ordered collection of memory areas.
///
/// Lookups return the first area that fully covers the requested range, so
/// overlapping areas can shadow each other deliberately.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    areas: Vec<MemoryArea>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an area. Insertion order is lookup order.
    pub fn push(&mut self, area: MemoryArea) {
        self.areas.push(area);
    }

    /// The first area of the given kind fully covering
    /// `[address, address + quantity)`.
    #[must_use]
    pub fn find(&self, kind: MemoryKind, address: Address, quantity: Quantity) -> Option<&MemoryArea> {
        self.areas
            .iter()
            .find(|area| area.kind() == kind && area.covers(address, quantity))
    }
}

impl Extend<MemoryArea> for MemoryStore {
    fn extend<T: IntoIterator<Item = MemoryArea>>(&mut self, iter: T) {
        self.areas.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_count_for_bit_kinds() {
        let area = MemoryArea::zeroed(MemoryKind::Coils, 0, 2);
        assert_eq!(area.item_count(), 16);

        // Clamped at the end of the address space.
        let area = MemoryArea::zeroed(MemoryKind::Coils, 0xFFF8, 2);
        assert_eq!(area.item_count(), 8);
    }

    #[test]
    fn item_count_for_register_kinds() {
        let area = MemoryArea::zeroed(MemoryKind::HoldingRegisters, 0, 5);
        assert_eq!(area.item_count(), 2);

        let area = MemoryArea::zeroed(MemoryKind::InputRegisters, 0xFFFF, 8);
        assert_eq!(area.item_count(), 1);
    }

    #[test]
    fn coverage() {
        let area = MemoryArea::zeroed(MemoryKind::HoldingRegisters, 10, 20);
        assert!(area.covers(10, 10));
        assert!(area.covers(15, 5));
        assert!(!area.covers(9, 2));
        assert!(!area.covers(15, 6));
    }

    #[test]
    fn find_returns_first_covering_area() {
        let mut store = MemoryStore::new();
        store.push(MemoryArea::zeroed(MemoryKind::HoldingRegisters, 0, 10));
        store.push(MemoryArea::zeroed(MemoryKind::HoldingRegisters, 0, 200));
        store.push(MemoryArea::zeroed(MemoryKind::Coils, 0, 10));

        let area = store.find(MemoryKind::HoldingRegisters, 0, 5).unwrap();
        assert_eq!(area.item_count(), 5);

        // Too large for the first area, served by the second.
        let area = store.find(MemoryKind::HoldingRegisters, 0, 50).unwrap();
        assert_eq!(area.item_count(), 100);

        assert!(store.find(MemoryKind::DiscreteInputs, 0, 1).is_none());
        assert!(store.find(MemoryKind::Coils, 70, 16).is_none());
    }

    #[test]
    fn derived_area_aliases_base_bytes() {
        let base = MemoryArea::new(MemoryKind::HoldingRegisters, 0, vec![0; 8]);
        let coils = MemoryArea::derived(MemoryKind::Coils, 0, &base, 2, 4).unwrap();
        assert_eq!(coils.item_count(), 32);

        base.lock()[2] = 0xFF;
        assert_eq!(coils.lock()[0], 0xFF);

        coils.lock()[1] = 0x0F;
        assert_eq!(base.lock()[3], 0x0F);
    }

    #[test]
    fn derived_area_must_fit_base() {
        let base = MemoryArea::zeroed(MemoryKind::HoldingRegisters, 0, 8);
        assert!(MemoryArea::derived(MemoryKind::Coils, 0, &base, 6, 4).is_err());
    }

    #[test]
    fn hooks_forward_to_base() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let reads = Arc::new(AtomicUsize::new(0));
        let on_read = {
            let reads = Arc::clone(&reads);
            Arc::new(move |_: &mut [u8]| {
                reads.fetch_add(1, Ordering::SeqCst);
            })
        };
        let base = MemoryArea::zeroed(MemoryKind::HoldingRegisters, 0, 8).on_read(on_read);
        let derived = MemoryArea::derived(MemoryKind::Coils, 0, &base, 0, 8).unwrap();

        derived.with_bytes(|_| ());
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        // The derived area's own hook shadows the base's.
        let derived = derived.on_read(Arc::new(|bytes: &mut [u8]| {
            bytes[0] = 0x42;
        }));
        derived.with_bytes(|bytes| assert_eq!(bytes[0], 0x42));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn on_read_refreshes_computed_values() {
        let area = MemoryArea::zeroed(MemoryKind::InputRegisters, 0, 2).on_read(Arc::new(
            |bytes: &mut [u8]| {
                bytes.copy_from_slice(&[0x12, 0x34]);
            },
        ));
        area.with_bytes(|bytes| assert_eq!(bytes, &[0x12, 0x34]));
    }

    #[test]
    fn on_write_hook_fires_on_notify() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let writes = Arc::new(AtomicUsize::new(0));
        let on_write = {
            let writes = Arc::clone(&writes);
            Arc::new(move |_: &mut [u8]| {
                writes.fetch_add(1, Ordering::SeqCst);
            })
        };
        let base = MemoryArea::zeroed(MemoryKind::Coils, 0, 1).on_write(on_write);
        let derived = MemoryArea::derived(MemoryKind::Coils, 0, &base, 0, 1).unwrap();

        derived.notify_written();
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }
}

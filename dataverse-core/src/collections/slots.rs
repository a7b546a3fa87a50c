//! Per-position and per-key derivation caches.
//!
//! Collections hand out one derivation per index or key and must hand out
//! the same one again while it is in use. An entry is in use while someone
//! besides the cache holds it or taps it. Unused entries are swept when the
//! owner asks (after a mutation) and whenever the cache has doubled since
//! its last sweep.

use std::borrow::Borrow;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::ops::RangeBounds;

use crate::reactive::Derivation;

const MIN_SWEEP: usize = 16;

pub(crate) struct SlotCache<K, T> {
    slots: RefCell<BTreeMap<K, Derivation<T>>>,
    sweep_at: Cell<usize>,
}

impl<K: Ord + Clone, T> SlotCache<K, T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: RefCell::new(BTreeMap::new()),
            sweep_at: Cell::new(MIN_SWEEP),
        }
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<Derivation<T>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.slots.borrow().get(key).cloned()
    }

    /// The derivation under `key`, or a new one from `make`.
    ///
    /// `make` runs without the cache borrowed, so it may use other caches
    /// (or this one, for other keys).
    pub(crate) fn get_or_insert_with<Q>(&self, key: &Q, make: impl FnOnce() -> Derivation<T>) -> Derivation<T>
    where
        K: Borrow<Q>,
        Q: Ord + ToOwned<Owned = K> + ?Sized,
    {
        if let Some(slot) = self.get(key) {
            return slot;
        }

        let slot = make();
        let len = {
            let mut slots = self.slots.borrow_mut();
            slots.insert(key.to_owned(), slot.clone());
            slots.len()
        };
        if len >= self.sweep_at.get() {
            self.sweep();
        }
        slot
    }

    /// Entries with keys in `range`, in key order.
    pub(crate) fn in_range<R: RangeBounds<K>>(&self, range: R) -> Vec<(K, Derivation<T>)> {
        self.slots
            .borrow()
            .range(range)
            .map(|(key, slot)| (key.clone(), slot.clone()))
            .collect()
    }

    /// Drop every entry nobody else holds or taps.
    pub(crate) fn sweep(&self) {
        let unused: Vec<Derivation<T>> = {
            let mut slots = self.slots.borrow_mut();
            let keys: Vec<K> = slots
                .iter()
                .filter(|(_, slot)| slot.is_unused())
                .map(|(key, _)| key.clone())
                .collect();
            let unused = keys.iter().filter_map(|key| slots.remove(key)).collect();
            self.sweep_at.set((slots.len() * 2).max(MIN_SWEEP));
            unused
        };
        // Releasing a slot can release the nodes it captured.
        drop(unused);
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.borrow().len()
    }
}

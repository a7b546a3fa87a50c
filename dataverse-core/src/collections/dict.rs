//! Derived dictionaries.
//!
//! A [`DictView`] exposes one stable derivation per key, the ordered key
//! list, and a [`DictDiff`] whenever the key set changes. Value changes under
//! an existing key are only visible through that key's derivation.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::slots::SlotCache;
use crate::error::Result;
use crate::reactive::{Derivation, Emitter, Runtime, Source, Tappable, WeakRuntime};

/// Keys added to and removed from a dictionary in one mutation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictDiff {
    pub added_keys: Vec<String>,
    pub deleted_keys: Vec<String>,
}

/// A keyed collection of derivations.
pub trait DictView<V> {
    /// The derivation for `key`; `None` while the key is absent.
    ///
    /// Repeated calls with the same key return the same derivation.
    fn at(&self, key: &str) -> Derivation<Option<V>>;

    /// The keys, in insertion order.
    fn keys(&self) -> Derivation<Vec<String>>;

    fn changes(&self) -> Tappable<DictDiff>;
}

/// Shared handle to a [`DictView`].
pub struct DerivedDict<V> {
    view: Rc<dyn DictView<V>>,
    runtime: WeakRuntime,
}

impl<V: Clone + 'static> DerivedDict<V> {
    pub(crate) fn from_view(view: Rc<dyn DictView<V>>, runtime: WeakRuntime) -> Self {
        Self { view, runtime }
    }

    pub(crate) fn runtime(&self) -> &WeakRuntime {
        &self.runtime
    }

    pub fn at(&self, key: &str) -> Derivation<Option<V>> {
        self.view.at(key)
    }

    pub fn keys(&self) -> Derivation<Vec<String>> {
        self.view.keys()
    }

    /// Key set changes.
    pub fn changes(&self) -> Tappable<DictDiff> {
        self.view.changes()
    }

    /// Apply `f` to every value.
    pub fn map_values<U, F>(&self, f: F) -> DerivedDict<U>
    where
        U: Clone + 'static,
        F: Fn(&V) -> U + 'static,
    {
        let mapped = MappedValues {
            source: self.clone(),
            f: Rc::new(f),
            slots: SlotCache::new(),
        };
        DerivedDict::from_view(Rc::new(mapped), self.runtime.clone())
    }

    /// Materialize the current entries as one derivation.
    pub fn to_map(&self) -> Derivation<IndexMap<String, V>> {
        let view = Rc::clone(&self.view);
        let keys = view.keys();
        self.runtime.derive(move |t| {
            let mut entries = IndexMap::new();
            for key in t.get(&keys)? {
                if let Some(value) = t.get(&view.at(&key))? {
                    entries.insert(key, value);
                }
            }
            Ok(entries)
        })
    }

    /// Check whether two handles share a view.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.view, &other.view)
    }
}

impl<V> Clone for DerivedDict<V> {
    fn clone(&self) -> Self {
        Self {
            view: Rc::clone(&self.view),
            runtime: self.runtime.clone(),
        }
    }
}

impl<V> fmt::Debug for DerivedDict<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedDict")
            .field("view", &Rc::as_ptr(&self.view))
            .finish()
    }
}

struct MappedValues<V, U> {
    source: DerivedDict<V>,
    f: Rc<dyn Fn(&V) -> U>,
    slots: SlotCache<String, Option<U>>,
}

impl<V: Clone + 'static, U: Clone + 'static> DictView<U> for MappedValues<V, U> {
    fn at(&self, key: &str) -> Derivation<Option<U>> {
        self.slots.get_or_insert_with(key, || {
            let (source, f, key) = (self.source.clone(), Rc::clone(&self.f), key.to_owned());
            self.source
                .runtime()
                .derive(move |t| Ok(t.get(&source.at(&key))?.as_ref().map(|v| f(v))))
        })
    }

    fn keys(&self) -> Derivation<Vec<String>> {
        self.source.keys()
    }

    fn changes(&self) -> Tappable<DictDiff> {
        self.source.changes()
    }
}

struct State<V> {
    entries: RefCell<IndexMap<String, V>>,
    /// Per-key cells, including absent keys someone is watching. Unused
    /// cells are dropped on the next mutation.
    cells: SlotCache<String, Option<V>>,
    keys: Source<Vec<String>>,
    changes: Emitter<DictDiff>,
    runtime: WeakRuntime,
}

impl<V: Clone + 'static> DictView<V> for State<V> {
    fn at(&self, key: &str) -> Derivation<Option<V>> {
        self.cells.get_or_insert_with(key, || {
            let value = self.entries.borrow().get(key).cloned();
            (*self.runtime.source(value)).clone()
        })
    }

    fn keys(&self) -> Derivation<Vec<String>> {
        (*self.keys).clone()
    }

    fn changes(&self) -> Tappable<DictDiff> {
        self.changes.tappable()
    }
}

/// A mutable, observable dictionary with insertion-ordered keys.
pub struct SourceDict<V> {
    state: Rc<State<V>>,
}

impl<V: Clone + 'static> SourceDict<V> {
    pub(crate) fn new<I>(runtime: &Runtime, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, V)>,
    {
        let entries: IndexMap<String, V> = entries.into_iter().collect();
        let keys = runtime.source(entries.keys().cloned().collect());
        Self {
            state: Rc::new(State {
                entries: RefCell::new(entries),
                cells: SlotCache::new(),
                keys,
                changes: Emitter::new(),
                runtime: runtime.downgrade(),
            }),
        }
    }

    /// Get the derived-dict view of this dictionary.
    pub fn as_derived(&self) -> DerivedDict<V> {
        DerivedDict::from_view(
            Rc::clone(&self.state) as Rc<dyn DictView<V>>,
            self.state.runtime.clone(),
        )
    }

    /// Insert or replace the value under `key`, returning the old one.
    pub fn set(&self, key: impl Into<String>, value: V) -> Result<Option<V>> {
        self.state.runtime.upgrade()?;
        let key = key.into();

        let (old, added) = {
            let mut entries = self.state.entries.borrow_mut();
            let old = entries.insert(key.clone(), value.clone());
            let added = old.is_none();
            (old, added)
        };

        let diff = DictDiff {
            added_keys: if added { vec![key.clone()] } else { Vec::new() },
            deleted_keys: Vec::new(),
        };
        self.publish(&key, Some(value), diff)?;
        Ok(old)
    }

    /// Remove `key`, returning its value.
    pub fn remove(&self, key: &str) -> Result<Option<V>> {
        self.state.runtime.upgrade()?;

        let old = self.state.entries.borrow_mut().shift_remove(key);
        if old.is_some() {
            let diff = DictDiff {
                added_keys: Vec::new(),
                deleted_keys: vec![key.to_owned()],
            };
            self.publish(key, None, diff)?;
        }
        Ok(old)
    }

    /// Write the key's cell and the key list, then signal, then emit the
    /// diff if the key set changed.
    fn publish(&self, key: &str, value: Option<V>, diff: DictDiff) -> Result<()> {
        self.state.cells.sweep();
        let cell = self.state.cells.get(key).map(Source::from_derivation);
        let keys_changed = !diff.added_keys.is_empty() || !diff.deleted_keys.is_empty();

        if let Some(cell) = &cell {
            cell.replace_silently(value)?;
        }
        if keys_changed {
            let keys = self.state.entries.borrow().keys().cloned().collect();
            self.state.keys.replace_silently(keys)?;
        }

        tracing::trace!(key, ?diff, "dict updated");

        let runtime = self.state.runtime.upgrade()?;
        runtime.inner().batch(|| {
            if let Some(cell) = &cell {
                cell.notify()?;
            }
            if keys_changed {
                self.state.keys.notify()?;
                self.state.changes.emit(&diff);
            }
            Ok(())
        })
    }

    /// Get the value under `key` right now, without tracking.
    pub fn get(&self, key: &str) -> Option<V> {
        self.state.entries.borrow().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.entries.borrow().contains_key(key)
    }

    /// Get a copy of the current entries.
    pub fn snapshot(&self) -> IndexMap<String, V> {
        self.state.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.state.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Clone for SourceDict<V> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for SourceDict<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDict")
            .field("entries", &self.state.entries.borrow())
            .finish()
    }
}

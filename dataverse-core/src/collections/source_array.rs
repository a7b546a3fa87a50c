//! Mutable arrays.
//!
//! A [`SourceArray`] owns a `Vec` and exposes it as an [`ArrayView`]. Each
//! mutation is one splice; it is applied to storage, to the per-position
//! cells it touches and to the length before anyone is told, and then
//! announced in this order:
//!
//! 1. touched position cells, ascending;
//! 2. the length, if it changed;
//! 3. the [`SpliceDiff`].
//!
//! All three happen in one batch, so reactions run once per splice.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::array::{ArrayView, DerivedArray};
use super::slots::SlotCache;
use super::splice::SpliceDiff;
use crate::error::{Error, Result};
use crate::reactive::{Derivation, Emitter, Runtime, Source, Tappable, WeakRuntime};

struct State<V> {
    items: RefCell<Vec<V>>,

    /// Per-position value cells, read by the slots.
    cells: SlotCache<usize, Option<V>>,

    /// The derivations handed out by `index`.
    slots: SlotCache<usize, V>,

    length: Source<usize>,
    changes: Emitter<SpliceDiff>,
    runtime: WeakRuntime,
}

impl<V: Clone + 'static> State<V> {
    fn cell(&self, index: usize) -> Source<Option<V>> {
        let cell = self.cells.get_or_insert_with(&index, || {
            let value = self.items.borrow().get(index).cloned();
            (*self.runtime.source(value)).clone()
        });
        Source::from_derivation(cell)
    }
}

impl<V: Clone + 'static> ArrayView<V> for State<V> {
    fn length(&self) -> Derivation<usize> {
        (*self.length).clone()
    }

    fn index(&self, index: usize) -> Derivation<V> {
        self.slots.get_or_insert_with(&index, || {
            let cell = self.cell(index);
            let length = self.length.clone();
            self.runtime.derive(move |t| match t.get(&cell)? {
                Some(value) => Ok(value),
                None => Err(Error::IndexOutOfRange {
                    index,
                    len: t.get_untracked(&length)?,
                }),
            })
        })
    }

    fn changes(&self) -> Tappable<SpliceDiff> {
        self.changes.tappable()
    }
}

/// A mutable, observable array.
///
/// # Example
///
/// ```rust
/// use dataverse_core::{Runtime, SpliceDiff};
///
/// let runtime = Runtime::new();
/// let numbers = runtime.array(vec![10, 20, 30]);
/// let second = numbers.as_derived().index(1);
///
/// numbers.insert(1, 99).unwrap();
/// assert_eq!(numbers.snapshot(), vec![10, 99, 20, 30]);
/// assert_eq!(second.get().unwrap(), 99);
/// ```
pub struct SourceArray<V> {
    state: Rc<State<V>>,
}

impl<V: Clone + 'static> SourceArray<V> {
    pub(crate) fn new(runtime: &Runtime, items: Vec<V>) -> Self {
        let length = runtime.source(items.len());
        Self {
            state: Rc::new(State {
                items: RefCell::new(items),
                cells: SlotCache::new(),
                slots: SlotCache::new(),
                length,
                changes: Emitter::new(),
                runtime: runtime.downgrade(),
            }),
        }
    }

    /// Get the derived-array view of this array.
    pub fn as_derived(&self) -> DerivedArray<V> {
        DerivedArray::from_view(
            Rc::clone(&self.state) as Rc<dyn ArrayView<V>>,
            self.state.runtime.clone(),
        )
    }

    /// Replace `delete_count` elements at `start` with `items`, returning
    /// the removed elements.
    ///
    /// # Panics
    ///
    /// If `start + delete_count` is past the end.
    pub fn splice<I>(&self, start: usize, delete_count: usize, items: I) -> Result<Vec<V>>
    where
        I: IntoIterator<Item = V>,
    {
        let runtime = self.state.runtime.upgrade()?;

        let added: Vec<V> = items.into_iter().collect();
        let diff = SpliceDiff::new(start, delete_count, added.len());

        let (removed, len_before, len_after) = {
            let mut items = self.state.items.borrow_mut();
            let len_before = items.len();
            diff.assert_valid(len_before);
            let removed: Vec<V> = items.splice(start..start + delete_count, added).collect();
            (removed, len_before, items.len())
        };

        if diff.is_noop() {
            return Ok(removed);
        }

        // Slots hold their cells, so they go first.
        self.state.slots.sweep();
        self.state.cells.sweep();
        let touched: Vec<(usize, Source<Option<V>>)> = self
            .state
            .cells
            .in_range(start..)
            .into_iter()
            .filter(|(index, _)| diff.touches(*index))
            .map(|(index, cell)| (index, Source::from_derivation(cell)))
            .collect();

        for (index, cell) in &touched {
            let value = self.state.items.borrow().get(*index).cloned();
            cell.replace_silently(value)?;
        }
        if len_after != len_before {
            self.state.length.replace_silently(len_after)?;
        }

        tracing::trace!(
            start = diff.start_index,
            deleted = diff.delete_count,
            added = diff.add_count,
            "array spliced"
        );

        runtime.inner().batch(|| {
            for (_, cell) in &touched {
                cell.notify()?;
            }
            if len_after != len_before {
                self.state.length.notify()?;
            }
            self.state.changes.emit(&diff);
            Ok::<_, Error>(())
        })?;

        Ok(removed)
    }

    /// Append an element.
    pub fn push(&self, value: V) -> Result<()> {
        let len = self.len();
        self.splice(len, 0, [value]).map(drop)
    }

    /// Insert an element at `index`, shifting later elements right.
    pub fn insert(&self, index: usize, value: V) -> Result<()> {
        self.splice(index, 0, [value]).map(drop)
    }

    /// Remove and return the element at `index`.
    ///
    /// # Panics
    ///
    /// If `index` is out of bounds.
    pub fn remove(&self, index: usize) -> Result<V> {
        let mut removed = self.splice(index, 1, [])?;
        match removed.pop() {
            Some(value) => Ok(value),
            None => unreachable!("splice of one element removed nothing"),
        }
    }

    /// Replace the element at `index`, returning the old one.
    pub fn set(&self, index: usize, value: V) -> Result<V> {
        let mut removed = self.splice(index, 1, [value])?;
        match removed.pop() {
            Some(value) => Ok(value),
            None => unreachable!("splice of one element removed nothing"),
        }
    }

    /// Remove every element.
    pub fn clear(&self) -> Result<Vec<V>> {
        let len = self.len();
        self.splice(0, len, [])
    }

    /// Get the element at `index` right now, without tracking.
    pub fn get(&self, index: usize) -> Option<V> {
        self.state.items.borrow().get(index).cloned()
    }

    /// Get a copy of the current elements.
    pub fn snapshot(&self) -> Vec<V> {
        self.state.items.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.state.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone + PartialEq + 'static> SourceArray<V> {
    /// Replace the whole contents with `items` as a single minimal splice.
    pub fn replace_all(&self, items: Vec<V>) -> Result<SpliceDiff> {
        let diff = SpliceDiff::between(&self.state.items.borrow(), &items);
        let added = items
            .into_iter()
            .skip(diff.start_index)
            .take(diff.add_count);
        self.splice(diff.start_index, diff.delete_count, added)?;
        Ok(diff)
    }
}

impl<V> Clone for SourceArray<V> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for SourceArray<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceArray")
            .field("items", &self.state.items.borrow())
            .field("tappers", &self.state.changes.tapper_count())
            .finish()
    }
}

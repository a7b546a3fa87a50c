//! Element-wise mapping of a derived array.
//!
//! Mapping is positional and one-to-one, so the length and the diffs of the
//! source are the length and the diffs of the result.

use std::rc::Rc;

use super::array::{ArrayView, DerivedArray};
use super::slots::SlotCache;
use super::splice::SpliceDiff;
use crate::error::Result;
use crate::reactive::{Derivation, Tappable, Tracker};

type MapFn<V, U> = Rc<dyn Fn(&mut Tracker, &Derivation<V>) -> Result<U>>;

pub(crate) struct Mapped<V, U> {
    source: DerivedArray<V>,
    f: MapFn<V, U>,
    slots: SlotCache<usize, U>,
}

impl<V: Clone + 'static, U: Clone + 'static> Mapped<V, U> {
    pub(crate) fn build<F>(source: &DerivedArray<V>, f: F) -> DerivedArray<U>
    where
        F: Fn(&mut Tracker, &Derivation<V>) -> Result<U> + 'static,
    {
        let mapped = Mapped {
            source: source.clone(),
            f: Rc::new(f),
            slots: SlotCache::new(),
        };
        DerivedArray::from_view(Rc::new(mapped), source.runtime().clone())
    }
}

impl<V: Clone + 'static, U: Clone + 'static> ArrayView<U> for Mapped<V, U> {
    fn length(&self) -> Derivation<usize> {
        self.source.length()
    }

    fn index(&self, index: usize) -> Derivation<U> {
        self.slots.get_or_insert_with(&index, || {
            let (source, f) = (self.source.clone(), Rc::clone(&self.f));
            self.source.runtime().derive(move |t| {
                let element = source.index(index);
                // Past the end, fail like the source does, whatever `f` reads.
                t.get(&element)?;
                f(t, &element)
            })
        })
    }

    fn changes(&self) -> Tappable<SpliceDiff> {
        self.source.changes()
    }
}

//! Folding a derived array into one value.
//!
//! The fold always starts over from the seed: it reads the length and every
//! element derivation, so any structural or element change re-runs it.
//! Nothing assumes the folding function is associative.

use super::array::DerivedArray;
use crate::error::Result;
use crate::reactive::{Derivation, Tracker};

/// One step of [`DerivedArray::reduce_derived`]: the next accumulator, or a
/// derivation to read it from.
pub enum Fold<A> {
    Value(A),
    Derived(Derivation<A>),
}

pub(crate) fn build<V, A, F>(source: &DerivedArray<V>, seed: A, f: F) -> Derivation<A>
where
    V: Clone + 'static,
    A: Clone + 'static,
    F: Fn(A, &V, usize) -> Result<A> + 'static,
{
    let view = source.view().clone();
    let length = view.length();

    source.runtime().derive(move |t| {
        let len = t.get(&length)?;
        let mut acc = seed.clone();
        for index in 0..len {
            let value = t.get(&view.index(index))?;
            acc = f(acc, &value, index)?;
        }
        Ok(acc)
    })
}

pub(crate) fn build_derived<V, A, F>(source: &DerivedArray<V>, seed: &Derivation<A>, f: F) -> Derivation<A>
where
    V: Clone + 'static,
    A: Clone + 'static,
    F: Fn(&mut Tracker, A, &V, usize) -> Result<Fold<A>> + 'static,
{
    let view = source.view().clone();
    let (length, seed) = (view.length(), seed.clone());

    source.runtime().derive(move |t| {
        let len = t.get(&length)?;
        let mut acc = t.get(&seed)?;
        for index in 0..len {
            let value = t.get(&view.index(index))?;
            acc = match f(t, acc, &value, index)? {
                Fold::Value(next) => next,
                Fold::Derived(next) => t.get(&next)?,
            };
        }
        Ok(acc)
    })
}

//! Derived arrays.
//!
//! An [`ArrayView`] is anything that looks like an ordered collection of
//! derivations: a length, a stable derivation per position, and a stream of
//! [`SpliceDiff`]s. [`DerivedArray`] is the shared handle over a view and
//! carries the combinators.

use std::fmt;
use std::rc::Rc;

use super::concat::Concat;
use super::map::Mapped;
use super::reduce::{self, Fold};
use super::splice::SpliceDiff;
use crate::error::Result;
use crate::reactive::{Derivation, Tappable, Tracker, WeakRuntime};

/// An ordered collection of derivations.
pub trait ArrayView<V> {
    /// The number of elements.
    fn length(&self) -> Derivation<usize>;

    /// The derivation for logical position `index`.
    ///
    /// Repeated calls with the same index return the same derivation. It
    /// signals only for diffs that can change the value at `index`, and
    /// fails with [`Error::IndexOutOfRange`](crate::Error::IndexOutOfRange)
    /// while `index` is past the end.
    fn index(&self, index: usize) -> Derivation<V>;

    /// One diff per atomic mutation.
    fn changes(&self) -> Tappable<SpliceDiff>;
}

/// Shared handle to an [`ArrayView`].
pub struct DerivedArray<V> {
    view: Rc<dyn ArrayView<V>>,
    runtime: WeakRuntime,
}

impl<V: Clone + 'static> DerivedArray<V> {
    pub(crate) fn from_view(view: Rc<dyn ArrayView<V>>, runtime: WeakRuntime) -> Self {
        Self { view, runtime }
    }

    pub(crate) fn view(&self) -> &Rc<dyn ArrayView<V>> {
        &self.view
    }

    pub(crate) fn runtime(&self) -> &WeakRuntime {
        &self.runtime
    }

    /// The number of elements, as a derivation.
    pub fn length(&self) -> Derivation<usize> {
        self.view.length()
    }

    /// The stable derivation for position `index`.
    pub fn index(&self, index: usize) -> Derivation<V> {
        self.view.index(index)
    }

    /// Structural changes, one diff per mutation.
    pub fn changes(&self) -> Tappable<SpliceDiff> {
        self.view.changes()
    }

    /// `self` followed by `right`.
    pub fn concat(&self, right: &DerivedArray<V>) -> DerivedArray<V> {
        Concat::build(self, right)
    }

    /// Apply `f` to each element's derivation.
    ///
    /// `f` reads the element through the tracker, so a change inside one
    /// slot only recomputes that slot of the result.
    pub fn map<U, F>(&self, f: F) -> DerivedArray<U>
    where
        U: Clone + 'static,
        F: Fn(&mut Tracker, &Derivation<V>) -> Result<U> + 'static,
    {
        Mapped::build(self, f)
    }

    /// Fold the current elements left to right, starting from `seed`.
    ///
    /// The fold is redone in full whenever the length or any element
    /// changes.
    pub fn reduce<A, F>(&self, seed: A, f: F) -> Derivation<A>
    where
        A: Clone + 'static,
        F: Fn(A, &V, usize) -> Result<A> + 'static,
    {
        reduce::build(self, seed, f)
    }

    /// Fold like [`reduce`](Self::reduce), with a seed that is itself a
    /// derivation and steps that may hand back a derivation instead of a
    /// value.
    ///
    /// Everything the fold reads (the seed, each returned derivation, and
    /// whatever `f` reads through the tracker) is a dependency of the
    /// result.
    pub fn reduce_derived<A, F>(&self, seed: &Derivation<A>, f: F) -> Derivation<A>
    where
        A: Clone + 'static,
        F: Fn(&mut Tracker, A, &V, usize) -> Result<Fold<A>> + 'static,
    {
        reduce::build_derived(self, seed, f)
    }

    /// Materialize the current elements as one derivation.
    pub fn to_vec(&self) -> Derivation<Vec<V>> {
        self.reduce(Vec::new(), |mut acc, value, _| {
            acc.push(value.clone());
            Ok(acc)
        })
    }

    /// Check whether two handles share a view.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.view, &other.view)
    }
}

impl<V> Clone for DerivedArray<V> {
    fn clone(&self) -> Self {
        Self {
            view: Rc::clone(&self.view),
            runtime: self.runtime.clone(),
        }
    }
}

impl<V> fmt::Debug for DerivedArray<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedArray")
            .field("view", &Rc::as_ptr(&self.view))
            .finish()
    }
}

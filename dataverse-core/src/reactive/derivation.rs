//! Derivation Handles
//!
//! A [`Derivation<T>`] is a typed handle to a node in a runtime's arena. It
//! is cheap to clone; all clones refer to the same node, and the node is
//! released when the last clone is dropped.
//!
//! # How Derivations Work
//!
//! 1. A new derivation is cold: nothing is computed or cached.
//!
//! 2. `get()` on a cold derivation computes the value from scratch every
//!    time, so it can never be stale.
//!
//! 3. The first tap on `changes()` makes it hot: it computes once, caches the
//!    value and subscribes to everything the computation read.
//!
//! 4. When one of those dependencies changes, the derivation is marked dirty
//!    and signals its own tappers once. It recomputes on the next `get()`.
//!
//! 5. The last untap makes it cold again: subscriptions are dropped along
//!    with the cache.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use super::emitter::{Emitter, Tappable};
use super::runtime::{Runtime, RuntimeInner, WeakRuntime};
use super::tap::Tap;
use crate::error::{Error, Result};
use crate::graph::{Lifecycle, NodeId};

/// Owner token of a node. The node is released when this is dropped.
pub(crate) struct NodeHandle {
    id: NodeId,
    runtime: Weak<RuntimeInner>,
    changes: Tappable<()>,
}

impl NodeHandle {
    pub(crate) fn new(id: NodeId, runtime: Weak<RuntimeInner>, changes: Tappable<()>) -> Self {
        Self {
            id,
            runtime,
            changes,
        }
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.arena().release(self.id);
        }
    }
}

/// Clone the concrete value out of a type-erased node value.
///
/// # Panics
///
/// If the node holds a different type than its handle claims, which cannot
/// happen through the public API.
pub(crate) fn downcast<T: Clone + 'static>(value: Rc<dyn Any>, id: NodeId) -> T {
    match value.downcast_ref::<T>() {
        Some(value) => value.clone(),
        None => panic!(
            "derivation {id} does not hold a value of type {}",
            std::any::type_name::<T>()
        ),
    }
}

/// A lazily computed, cached, dependency-tracked value.
pub struct Derivation<T> {
    handle: Rc<NodeHandle>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Derivation<T> {
    pub(crate) fn from_handle(handle: NodeHandle) -> Self {
        Self {
            handle: Rc::new(handle),
            _marker: PhantomData,
        }
    }

    /// A handle whose runtime is already gone. Every read fails with
    /// [`Error::RuntimeDropped`].
    pub(crate) fn orphan() -> Self {
        Self::from_handle(NodeHandle::new(
            NodeId::new(),
            Weak::new(),
            Emitter::new().tappable(),
        ))
    }

    /// Get the derivation's node ID.
    pub fn id(&self) -> NodeId {
        self.handle.id
    }

    /// The "re-pull me" signal. Carries no payload; call [`get`](Self::get)
    /// to learn the new value.
    ///
    /// The first tap makes the derivation hot, the last untap makes it cold.
    pub fn changes(&self) -> Tappable<()> {
        self.handle.changes.clone()
    }

    /// Tap [`changes`](Self::changes) with a payload-less callback.
    pub fn tap(&self, callback: impl Fn() + 'static) -> Result<Tap> {
        self.handle.changes.tap(move |_| callback())
    }

    /// Get the current lifecycle state.
    pub fn lifecycle(&self) -> Result<Lifecycle> {
        let runtime = self.upgrade()?;
        let lifecycle = runtime.arena().with(self.id(), |node| node.lifecycle);
        Ok(lifecycle)
    }

    /// Check whether the derivation is hot.
    pub fn is_hot(&self) -> bool {
        matches!(self.lifecycle(), Ok(Lifecycle::Hot))
    }

    /// The backtrace captured when the derivation was created, if the
    /// runtime was configured with `keep_traces`.
    pub fn creation_trace(&self) -> Option<String> {
        let runtime = self.handle.runtime.upgrade()?;
        runtime
            .arena()
            .try_with(self.id(), |node| node.trace.as_ref().map(|trace| trace.to_string()))
            .flatten()
    }

    /// Get the runtime owning this derivation.
    pub fn runtime(&self) -> Result<Runtime> {
        self.upgrade().map(Runtime::from_inner)
    }

    pub(crate) fn weak_runtime(&self) -> WeakRuntime {
        WeakRuntime::new(Weak::clone(&self.handle.runtime))
    }

    pub(crate) fn belongs_to(&self, runtime: &Rc<RuntimeInner>) -> bool {
        std::ptr::eq(self.handle.runtime.as_ptr(), Rc::as_ptr(runtime))
    }

    /// Check whether two handles refer to the same node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.handle, &other.handle)
    }

    pub(crate) fn upgrade(&self) -> Result<Rc<RuntimeInner>> {
        self.handle.runtime.upgrade().ok_or(Error::RuntimeDropped)
    }

    pub(crate) fn handle(&self) -> Rc<NodeHandle> {
        Rc::clone(&self.handle)
    }

    /// True when this is the only handle and nothing taps the node.
    pub(crate) fn is_unused(&self) -> bool {
        Rc::strong_count(&self.handle) == 1 && !self.handle.changes.has_tappers()
    }
}

impl<T: Clone + 'static> Derivation<T> {
    /// Get the current value.
    ///
    /// Hot derivations return their cache, recomputing first if dirty. Cold
    /// derivations compute from scratch on every call.
    pub fn get(&self) -> Result<T> {
        let runtime = self.upgrade()?;
        let value = runtime.value_of(self.id());
        runtime.arena().collect_garbage();
        Ok(downcast(value?, self.id()))
    }

    /// Derive a new value from this one.
    pub fn map<U, F>(&self, f: F) -> Derivation<U>
    where
        U: Clone + 'static,
        F: Fn(&T) -> U + 'static,
    {
        let source = self.clone();
        self.weak_runtime().derive(move |tracker| {
            let value = tracker.get(&source)?;
            Ok(f(&value))
        })
    }

    /// Derive a value by picking another derivation based on this one.
    ///
    /// The result depends on this derivation and on whichever derivation `f`
    /// returned last.
    pub fn flat_map<U, F>(&self, f: F) -> Derivation<U>
    where
        U: Clone + 'static,
        F: Fn(&T) -> Derivation<U> + 'static,
    {
        let source = self.clone();
        self.weak_runtime().derive(move |tracker| {
            let value = tracker.get(&source)?;
            let inner = f(&value);
            tracker.get(&inner)
        })
    }
}

impl<T> Clone for Derivation<T> {
    fn clone(&self) -> Self {
        Self {
            handle: Rc::clone(&self.handle),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Derivation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derivation")
            .field("id", &self.id())
            .field("lifecycle", &self.lifecycle().ok())
            .field("tappers", &self.handle.changes.tapper_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::cell::Cell;

    fn counted<T: Clone + 'static>(
        runtime: &Runtime,
        source: &Derivation<T>,
        f: impl Fn(T) -> T + 'static,
    ) -> (Derivation<T>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let source = source.clone();
        let derivation = runtime.derive(move |t| {
            calls_clone.set(calls_clone.get() + 1);
            Ok(f(t.get(&source)?))
        });
        (derivation, calls)
    }

    #[test]
    fn cold_derivation_is_never_stale() {
        let runtime = Runtime::new();
        let count = runtime.source(1);
        let (doubled, calls) = counted(&runtime, &count, |v| v * 2);

        assert_eq!(doubled.get().unwrap(), 2);
        count.set(5).unwrap();
        assert_eq!(doubled.get().unwrap(), 10);
        count.set(7).unwrap();
        assert_eq!(doubled.get().unwrap(), 14);

        // Cold: every read recomputes and nothing is subscribed.
        assert_eq!(calls.get(), 3);
        assert!(!doubled.is_hot());
        assert!(!count.changes().has_tappers());
    }

    #[test]
    fn hot_derivation_caches_until_dirty() {
        let runtime = Runtime::new();
        let count = runtime.source(1);
        let (doubled, calls) = counted(&runtime, &count, |v| v * 2);

        let tap = doubled.tap(|| {}).unwrap();
        assert!(doubled.is_hot());
        assert_eq!(calls.get(), 1);

        assert_eq!(doubled.get().unwrap(), 2);
        assert_eq!(doubled.get().unwrap(), 2);
        assert_eq!(calls.get(), 1);

        count.set(4).unwrap();
        assert_eq!(calls.get(), 1, "recompute is lazy");
        assert_eq!(doubled.get().unwrap(), 8);
        assert_eq!(doubled.get().unwrap(), 8);
        assert_eq!(calls.get(), 2);

        tap.untap();
        assert!(!doubled.is_hot());
        assert!(!count.changes().has_tappers());
    }

    #[test]
    fn signals_are_coalesced_per_dirty_marking() {
        let runtime = Runtime::new();
        let a = runtime.source(1);
        let b = runtime.source(2);
        let (a2, b2) = (a.clone(), b.clone());
        let sum = runtime.derive(move |t| Ok(t.get(&a2)? + t.get(&b2)?));

        let signals = Rc::new(Cell::new(0));
        let signals_clone = signals.clone();
        let _tap = sum.tap(move || signals_clone.set(signals_clone.get() + 1)).unwrap();

        a.set(10).unwrap();
        b.set(20).unwrap();
        a.set(11).unwrap();
        assert_eq!(signals.get(), 1);

        assert_eq!(sum.get().unwrap(), 31);
        b.set(0).unwrap();
        assert_eq!(signals.get(), 2);
    }

    #[test]
    fn dynamic_dependencies_are_diffed() {
        let runtime = Runtime::new();
        let use_left = runtime.source(true);
        let left = runtime.source("left");
        let right = runtime.source("right");

        let (flag, l, r) = (use_left.clone(), left.clone(), right.clone());
        let picked = runtime.derive(move |t| {
            if t.get(&flag)? {
                t.get(&l)
            } else {
                t.get(&r)
            }
        });

        let _tap = picked.tap(|| {}).unwrap();
        assert_eq!(picked.get().unwrap(), "left");
        assert!(left.changes().has_tappers());
        assert!(!right.changes().has_tappers());

        use_left.set(false).unwrap();
        assert_eq!(picked.get().unwrap(), "right");
        assert!(!left.changes().has_tappers());
        assert!(right.changes().has_tappers());

        // Changing the dropped dependency does not dirty the node any more.
        left.set("ignored").unwrap();
        assert_eq!(picked.get().unwrap(), "right");
    }

    #[test]
    fn dependencies_become_hot_with_their_dependent() {
        let runtime = Runtime::new();
        let base = runtime.source(5);
        let (doubled, doubled_calls) = counted(&runtime, &base, |v| v * 2);
        let (plus_ten, _) = counted(&runtime, &doubled, |v| v + 10);

        let tap = plus_ten.tap(|| {}).unwrap();
        assert!(doubled.is_hot());
        assert_eq!(doubled_calls.get(), 1, "dependency computed once on activation");
        assert_eq!(plus_ten.get().unwrap(), 20);

        base.set(10).unwrap();
        assert_eq!(plus_ten.get().unwrap(), 30);
        assert_eq!(doubled_calls.get(), 2);

        tap.untap();
        assert!(!doubled.is_hot());
        assert!(!base.changes().has_tappers());
    }

    #[test]
    fn failed_activation_stays_cold() {
        let runtime = Runtime::new();
        let input = runtime.source(0);
        let input_clone = input.clone();
        let checked = runtime.derive(move |t| {
            let v = t.get(&input_clone)?;
            if v == 0 {
                Err(Error::computation("zero"))
            } else {
                Ok(100 / v)
            }
        });

        let result = checked.tap(|| {});
        assert!(matches!(result, Err(Error::Computation(_))));
        assert!(!checked.is_hot());
        assert!(!checked.changes().has_tappers());
        assert!(!input.changes().has_tappers());

        input.set(4).unwrap();
        let _tap = checked.tap(|| {}).unwrap();
        assert_eq!(checked.get().unwrap(), 25);
    }

    #[test]
    fn failed_recompute_retries_on_next_access() {
        let runtime = Runtime::new();
        let input = runtime.source(5);
        let input_clone = input.clone();
        let checked = runtime.derive(move |t| {
            let v = t.get(&input_clone)?;
            if v == 0 {
                Err(Error::computation("zero"))
            } else {
                Ok(100 / v)
            }
        });

        let _tap = checked.tap(|| {}).unwrap();
        assert_eq!(checked.get().unwrap(), 20);

        input.set(0).unwrap();
        assert!(checked.get().is_err());
        assert!(checked.is_hot());
        assert!(input.changes().has_tappers(), "still subscribed after a failure");

        // Still failing: the dirty flag survived the error.
        assert!(checked.get().is_err());

        input.set(50).unwrap();
        assert_eq!(checked.get().unwrap(), 2);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let runtime = Runtime::new();
        let slot: Rc<std::cell::RefCell<Option<Derivation<i32>>>> = Rc::default();
        let slot_clone = slot.clone();
        let looped = runtime.derive(move |t| match slot_clone.borrow().clone() {
            Some(me) => t.get(&me),
            None => Ok(0),
        });
        *slot.borrow_mut() = Some(looped.clone());

        assert!(matches!(looped.get(), Err(Error::DependencyCycle { .. })));
        assert!(matches!(looped.tap(|| {}), Err(Error::DependencyCycle { .. })));
        assert!(!looped.is_hot());
        assert!(runtime.inner().arena().evaluating().borrow().is_empty());

        // Break the loop so the nodes can be released.
        slot.borrow_mut().take();
    }

    #[test]
    fn map_and_flat_map() {
        let runtime = Runtime::new();
        let which = runtime.source(0_usize);
        let options = vec![runtime.constant("zero"), runtime.constant("one")];

        let label = which.map(|n| format!("#{n}"));
        let picked = which.flat_map(move |n| options[*n].clone());

        assert_eq!(label.get().unwrap(), "#0");
        assert_eq!(picked.get().unwrap(), "zero");

        let _tap = picked.tap(|| {}).unwrap();
        which.set(1).unwrap();
        assert_eq!(label.get().unwrap(), "#1");
        assert_eq!(picked.get().unwrap(), "one");
    }

    #[test]
    fn handle_outliving_runtime() {
        let runtime = Runtime::new();
        let value = runtime.source(1);
        let doubled = value.map(|v| v * 2);
        drop(runtime);

        assert!(matches!(doubled.get(), Err(Error::RuntimeDropped)));
        assert!(matches!(value.set(3), Err(Error::RuntimeDropped)));
        assert!(!doubled.is_hot());
    }

    #[test]
    fn dropping_last_handle_releases_node() {
        let runtime = Runtime::new();
        let base = runtime.source(1);
        let before = runtime.node_count();

        let doubled = base.map(|v| v * 2);
        assert_eq!(runtime.node_count(), before + 1);

        let clone = doubled.clone();
        drop(doubled);
        assert_eq!(runtime.node_count(), before + 1);

        drop(clone);
        assert_eq!(runtime.node_count(), before);
    }

    #[test]
    fn creation_traces_follow_config() {
        let plain = Runtime::new();
        assert!(plain.constant(1).creation_trace().is_none());

        let traced = Runtime::with_config(Config {
            keep_traces: true,
            ..Config::default()
        });
        assert!(traced.constant(1).creation_trace().is_some());
    }
}

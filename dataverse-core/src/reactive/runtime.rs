//! Reactive Runtime
//!
//! The runtime owns the node arena and drives every node through its
//! Cold/Hot state machine.
//!
//! # How It Works
//!
//! 1. Creating a derivation inserts a cold, dirty node into the arena and
//!    wires its change emitter: the "observed" hook activates the node, the
//!    "unobserved" hook deactivates it.
//!
//! 2. Activation marks the node hot and computes it through a subscribing
//!    [`Tracker`]. Every dependency read is tapped with a callback that only
//!    knows the runtime (weakly) and the dependent's `NodeId`.
//!
//! 3. When a dependency signals, the runtime:
//!    a. Marks the dependent dirty
//!    b. Re-emits on the dependent's own emitter, but only on the
//!       clean-to-dirty transition
//!    c. Does nothing else: recomputation is lazy, on the next `get`
//!
//! 4. Recomputation diffs subscriptions: dependencies read again keep their
//!    taps, new ones are tapped, stale ones are untapped.
//!
//! 5. Deactivation untaps everything upstream and drops the cache. Cold
//!    nodes compute from scratch on every read.
//!
//! # Batches
//!
//! Every source notification runs inside a batch. Work deferred with
//! [`RuntimeInner::defer`] (reaction runs) waits until the outermost batch
//! ends, so it only ever sees a graph whose signals have all been delivered.
//!
//! # Single-threaded
//!
//! Everything is `Rc`/`RefCell`. Handles are `!Send`; a runtime and all of
//! its derivations live on one thread.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use super::context::{EvalGuard, Subscriptions, Tracker};
use super::derivation::{Derivation, NodeHandle};
use super::emitter::Emitter;
use super::source::Source;
use super::tap::Tap;
use crate::collections::{SourceArray, SourceDict};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::{Arena, ComputeFn, DirtyState, Lifecycle, Node, NodeId, NodeKind};

enum Plan {
    Ready(Rc<dyn Any>),
    Recompute(ComputeFn),
    Transient(ComputeFn),
}

/// Shared state behind a [`Runtime`] and every handle it created.
pub(crate) struct RuntimeInner {
    arena: Arena,
    config: Config,
    batch_depth: Cell<usize>,
    deferred: RefCell<VecDeque<Rc<dyn Fn()>>>,
}

/// Leaves a batch on drop, so a panicking batch still unwinds the depth.
struct BatchExit<'rt>(&'rt RuntimeInner);

impl Drop for BatchExit<'_> {
    fn drop(&mut self) {
        self.0.batch_depth.set(self.0.batch_depth.get() - 1);
    }
}

impl RuntimeInner {
    fn new(config: Config) -> Self {
        Self {
            arena: Arena::new(),
            config,
            batch_depth: Cell::new(0),
            deferred: RefCell::new(VecDeque::new()),
        }
    }

    pub(crate) fn arena(&self) -> &Arena {
        &self.arena
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    fn trace(&self) -> Option<Backtrace> {
        self.config.keep_traces.then(Backtrace::force_capture)
    }

    /// Register a root node holding `value`.
    pub(crate) fn create_source(self: &Rc<Self>, value: Rc<dyn Any>) -> NodeHandle {
        let id = NodeId::new();
        let changes = Emitter::new();
        let node = Node::source(id, value, changes.clone()).with_trace(self.trace());
        self.arena.insert(node);
        NodeHandle::new(id, Rc::downgrade(self), changes.tappable())
    }

    /// Register a derived node. It starts cold.
    pub(crate) fn create_derived(self: &Rc<Self>, compute: ComputeFn) -> NodeHandle {
        let id = NodeId::new();
        let changes = Emitter::new();

        let runtime = Rc::downgrade(self);
        changes.on_observed(move || match runtime.upgrade() {
            Some(runtime) => runtime.activate(id),
            None => Err(Error::RuntimeDropped),
        });

        let runtime = Rc::downgrade(self);
        changes.on_unobserved(move || {
            if let Some(runtime) = runtime.upgrade() {
                runtime.deactivate(id);
            }
        });

        let node = Node::derived(id, compute, changes.clone()).with_trace(self.trace());
        self.arena.insert(node);
        NodeHandle::new(id, Rc::downgrade(self), changes.tappable())
    }

    /// Get a node's current value, computing it if needed.
    pub(crate) fn value_of(self: &Rc<Self>, id: NodeId) -> Result<Rc<dyn Any>> {
        let plan = self.arena.with(id, |node| match &node.kind {
            NodeKind::Source => match &node.value {
                Some(value) => Plan::Ready(Rc::clone(value)),
                None => unreachable!("source {id} has no value"),
            },
            NodeKind::Derived(compute) => match (&node.value, node.is_fresh()) {
                (Some(value), true) => Plan::Ready(Rc::clone(value)),
                _ if node.lifecycle == Lifecycle::Hot => Plan::Recompute(Rc::clone(compute)),
                _ => Plan::Transient(Rc::clone(compute)),
            },
        });

        match plan {
            Plan::Ready(value) => Ok(value),
            Plan::Recompute(compute) => self.recompute(id, compute),
            Plan::Transient(compute) => {
                let _guard = EvalGuard::enter(self, id)?;
                let mut tracker = Tracker::transient(Rc::clone(self), id);
                compute(&mut tracker)
            }
        }
    }

    /// Recompute a hot node and diff its subscriptions.
    fn recompute(self: &Rc<Self>, id: NodeId, compute: ComputeFn) -> Result<Rc<dyn Any>> {
        let _guard = EvalGuard::enter(self, id)?;
        tracing::trace!(node = %id, "recomputing derivation");

        let previous = self.arena.with_mut(id, |node| mem::take(&mut node.upstream));
        let mut tracker = Tracker::subscribing(Rc::clone(self), id, previous);
        let outcome = compute(&mut tracker);
        let (previous, current) = tracker.into_subscriptions();

        let still_hot = self
            .arena
            .try_with(id, |node| node.lifecycle == Lifecycle::Hot)
            .unwrap_or(false);

        if !still_hot {
            // Went cold (or was released) while computing.
            untap_all(previous);
            untap_all(current);
            return outcome;
        }

        match outcome {
            Ok(value) => {
                let stale = self.arena.with_mut(id, |node| {
                    node.upstream = current;
                    node.dirty = DirtyState::Clean;
                    node.value.replace(Rc::clone(&value))
                });
                drop(stale);
                untap_all(previous);
                Ok(value)
            }
            Err(err) => {
                let mut upstream = current;
                upstream.extend(previous);
                let stale = self.arena.with_mut(id, |node| {
                    node.upstream = upstream;
                    node.dirty = DirtyState::Dirty;
                    node.value.take()
                });
                drop(stale);
                Err(err)
            }
        }
    }

    /// Cold to hot: compute once, subscribing to everything read.
    ///
    /// On failure the node stays hot, dirty and uncached, holding whatever
    /// it subscribed to. Whoever tapped it decides what happens next: a
    /// plain tap is rolled back (which deactivates the node), a dependent
    /// keeps it so the failure can recover. Cycles always go cold.
    fn activate(self: &Rc<Self>, id: NodeId) -> Result<()> {
        let registered = self
            .arena
            .try_with_mut(id, |node| {
                node.lifecycle = Lifecycle::Hot;
                node.dirty = DirtyState::Dirty;
            })
            .is_some();

        if !registered {
            return Ok(());
        }

        tracing::debug!(node = %id, "derivation became hot");
        match self.value_of(id) {
            Ok(_) => Ok(()),
            Err(err @ Error::DependencyCycle { .. }) => {
                // A node on a cycle may be tapping itself.
                self.deactivate(id);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Hot to cold: untap everything upstream and drop the cache.
    fn deactivate(&self, id: NodeId) {
        let taken = self
            .arena
            .try_with_mut(id, |node| {
                (node.lifecycle == Lifecycle::Hot).then(|| {
                    node.lifecycle = Lifecycle::Cold;
                    node.dirty = DirtyState::Dirty;
                    (mem::take(&mut node.upstream), node.value.take())
                })
            })
            .flatten();

        if let Some((upstream, cache)) = taken {
            tracing::debug!(node = %id, "derivation went cold");
            untap_all(upstream);
            drop(cache);
        }
    }

    /// Tap `dependency` on behalf of `dependent`.
    ///
    /// If activating the dependency fails, the tap is kept anyway and the
    /// error is returned next to it: the dependency stays subscribed to its
    /// own inputs and signals the dependent once they change. Cycles are the
    /// exception; that tap is dropped so no loop of hot nodes is left behind.
    pub(crate) fn subscribe(
        self: &Rc<Self>,
        dependency: NodeId,
        dependent: NodeId,
    ) -> (Option<Tap>, Result<()>) {
        let changes = self.arena.with(dependency, |node| node.changes.clone());
        let runtime = Rc::downgrade(self);
        let (tap, activated) = changes.tap_retaining(move |_| {
            if let Some(runtime) = runtime.upgrade() {
                runtime.invalidate(dependent);
            }
        });

        match activated {
            Err(err @ Error::DependencyCycle { .. }) => {
                tap.untap();
                (None, Err(err))
            }
            activated => (Some(tap), activated),
        }
    }

    /// A dependency changed: mark dirty and signal, once per dirty marking.
    fn invalidate(&self, id: NodeId) {
        let changes = self
            .arena
            .try_with_mut(id, |node| node.mark_dirty().then(|| node.changes.clone()))
            .flatten();

        if let Some(changes) = changes {
            tracing::trace!(node = %id, "derivation invalidated");
            changes.emit(&());
        }
    }

    /// Replace a source's value without signalling. Returns the old value so
    /// the caller can drop it outside any borrow.
    pub(crate) fn write(&self, id: NodeId, value: Rc<dyn Any>) -> Option<Rc<dyn Any>> {
        self.arena.with_mut(id, |node| {
            debug_assert!(node.is_source(), "write to derived node {id}");
            node.value.replace(value)
        })
    }

    /// Signal a source's tappers.
    pub(crate) fn notify(&self, id: NodeId) {
        let changes = self.arena.with(id, |node| node.changes.clone());
        tracing::trace!(node = %id, "source changed");
        self.batch(|| changes.emit(&()));
    }

    /// Run `f`, holding deferred work until the outermost batch returns.
    pub(crate) fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.batch_depth.set(self.batch_depth.get() + 1);
        let result = {
            let _exit = BatchExit(self);
            f()
        };
        if self.batch_depth.get() == 0 {
            self.flush();
        }
        result
    }

    /// Run `job` once the current batch ends, or now if there is none.
    pub(crate) fn defer(&self, job: Rc<dyn Fn()>) {
        if self.batch_depth.get() > 0 {
            self.deferred.borrow_mut().push_back(job);
        } else {
            job();
        }
    }

    fn flush(&self) {
        loop {
            let job = self.deferred.borrow_mut().pop_front();
            match job {
                Some(job) => job(),
                None => break,
            }
        }
    }
}

fn untap_all(subscriptions: Subscriptions) {
    for subscription in subscriptions.values() {
        subscription.untap();
    }
}

/// The owner of a derivation graph.
///
/// Cloning a `Runtime` is cheap; clones share the same graph. Handles created
/// by a runtime keep working only as long as some clone of it is alive.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: Config) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(config)),
        }
    }

    pub(crate) fn from_inner(inner: Rc<RuntimeInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Rc<RuntimeInner> {
        &self.inner
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime::new(Rc::downgrade(&self.inner))
    }

    /// Get the configuration this runtime was created with.
    pub fn config(&self) -> &Config {
        self.inner.config()
    }

    /// Create a settable root derivation.
    pub fn source<T: Clone + 'static>(&self, value: T) -> Source<T> {
        let handle = self.inner.create_source(Rc::new(value));
        Source::from_derivation(Derivation::from_handle(handle))
    }

    /// Create a derivation from a compute function.
    ///
    /// The function reads other derivations through the [`Tracker`]; those
    /// reads are its dependencies. Nothing runs until the derivation is read
    /// or tapped.
    pub fn derive<T, F>(&self, compute: F) -> Derivation<T>
    where
        T: Clone + 'static,
        F: Fn(&mut Tracker) -> Result<T> + 'static,
    {
        let compute: ComputeFn =
            Rc::new(move |tracker| compute(tracker).map(|value| Rc::new(value) as Rc<dyn Any>));
        Derivation::from_handle(self.inner.create_derived(compute))
    }

    /// Create a derivation that always yields `value`.
    pub fn constant<T: Clone + 'static>(&self, value: T) -> Derivation<T> {
        self.derive(move |_| Ok(value.clone()))
    }

    /// Create a mutable array.
    pub fn array<V: Clone + 'static>(&self, items: Vec<V>) -> SourceArray<V> {
        SourceArray::new(self, items)
    }

    /// Create a mutable dictionary.
    pub fn dict<V, I>(&self, entries: I) -> SourceDict<V>
    where
        V: Clone + 'static,
        I: IntoIterator<Item = (String, V)>,
    {
        SourceDict::new(self, entries)
    }

    /// Run `f` as one batch: reactions triggered by writes inside it run
    /// once, after it returns.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.batch(f)
    }

    /// Get the number of live nodes.
    pub fn node_count(&self) -> usize {
        self.inner.arena().len()
    }

    /// Remove released nodes whose removal had to be deferred.
    pub fn collect_garbage(&self) {
        self.inner.arena().collect_garbage();
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.node_count())
            .field("config", self.config())
            .finish()
    }
}

/// A runtime reference that does not keep the graph alive.
///
/// Combinators capture this instead of a [`Runtime`] so that a derivation
/// never owns the runtime it lives in.
#[derive(Clone)]
pub(crate) struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub(crate) fn new(inner: Weak<RuntimeInner>) -> Self {
        Self(inner)
    }

    pub(crate) fn upgrade(&self) -> Result<Runtime> {
        self.0
            .upgrade()
            .map(Runtime::from_inner)
            .ok_or(Error::RuntimeDropped)
    }

    /// Like [`Runtime::derive`]. If the runtime is gone, the result is a
    /// handle whose reads fail with [`Error::RuntimeDropped`].
    pub(crate) fn derive<T, F>(&self, compute: F) -> Derivation<T>
    where
        T: Clone + 'static,
        F: Fn(&mut Tracker) -> Result<T> + 'static,
    {
        match self.upgrade() {
            Ok(runtime) => runtime.derive(compute),
            Err(_) => Derivation::orphan(),
        }
    }

    /// Like [`Runtime::source`], with the same fallback as
    /// [`derive`](Self::derive).
    pub(crate) fn source<T: Clone + 'static>(&self, value: T) -> Source<T> {
        match self.upgrade() {
            Ok(runtime) => runtime.source(value),
            Err(_) => Source::from_derivation(Derivation::orphan()),
        }
    }
}

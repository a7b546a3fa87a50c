//! Graph Nodes
//!
//! This module defines the node records that live in the arena.

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::error::Result;
use crate::reactive::{Emitter, Subscriptions, Tracker};

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type-erased compute function of a derived node.
pub(crate) type ComputeFn = Rc<dyn Fn(&mut Tracker) -> Result<Rc<dyn Any>>>;

/// The kind of node in the dependency graph.
#[derive(Clone)]
pub(crate) enum NodeKind {
    /// A root node. Its value is written from outside; it has no upstream.
    Source,

    /// A node computed from other nodes.
    Derived(ComputeFn),
}

/// Whether a derivation is currently observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No tappers, no upstream subscriptions, no cache.
    Cold,

    /// At least one tapper; subscribed to everything read by the last
    /// computation.
    Hot,
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The cached value is up-to-date.
    Clean,

    /// An upstream changed since the last computation.
    Dirty,
}

/// A node in the dependency graph.
pub(crate) struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) dirty: DirtyState,

    /// Sources: always present. Derived nodes: the cache, only while hot.
    pub(crate) value: Option<Rc<dyn Any>>,

    /// Subscriptions this node holds on the nodes it read, keyed by the
    /// upstream node and kept in read order.
    pub(crate) upstream: Subscriptions,

    /// "Re-pull me" signal.
    pub(crate) changes: Emitter<()>,

    pub(crate) trace: Option<Rc<Backtrace>>,
}

impl Node {
    /// Create a root node holding `value`.
    pub(crate) fn source(id: NodeId, value: Rc<dyn Any>, changes: Emitter<()>) -> Self {
        Self {
            id,
            kind: NodeKind::Source,
            lifecycle: Lifecycle::Cold,
            dirty: DirtyState::Clean,
            value: Some(value),
            upstream: IndexMap::new(),
            changes,
            trace: None,
        }
    }

    /// Create a derived node. It starts cold and dirty.
    pub(crate) fn derived(id: NodeId, compute: ComputeFn, changes: Emitter<()>) -> Self {
        Self {
            id,
            kind: NodeKind::Derived(compute),
            lifecycle: Lifecycle::Cold,
            dirty: DirtyState::Dirty,
            value: None,
            upstream: IndexMap::new(),
            changes,
            trace: None,
        }
    }

    pub(crate) fn with_trace(mut self, trace: Option<Backtrace>) -> Self {
        self.trace = trace.map(Rc::new);
        self
    }

    /// Check whether this is a root node.
    pub(crate) fn is_source(&self) -> bool {
        matches!(self.kind, NodeKind::Source)
    }

    /// Check whether the node can hand out its cached value as is.
    pub(crate) fn is_fresh(&self) -> bool {
        self.lifecycle == Lifecycle::Hot && self.dirty == DirtyState::Clean && self.value.is_some()
    }

    /// Mark the node as needing recomputation.
    ///
    /// Returns `true` when dependents need to hear about it: on the
    /// clean-to-dirty transition of a hot node, and on every marking of a hot
    /// node whose last computation failed (it has no cache to protect).
    pub(crate) fn mark_dirty(&mut self) -> bool {
        if self.lifecycle != Lifecycle::Hot {
            return false;
        }
        let was_clean = self.dirty == DirtyState::Clean;
        self.dirty = DirtyState::Dirty;
        was_clean || self.value.is_none()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("source", &self.is_source())
            .field("lifecycle", &self.lifecycle)
            .field("dirty", &self.dirty)
            .field("cached", &self.value.is_some())
            .field("upstream", &self.upstream.keys().collect::<Vec<_>>())
            .finish()
    }
}

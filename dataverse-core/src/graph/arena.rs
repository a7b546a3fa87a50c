//! Node Arena
//!
//! All nodes of a runtime live in one arena, addressed by [`NodeId`]. Edges
//! are not stored as references between nodes: a dependent holds [`Tap`]s on
//! its dependencies' emitters, and those emitters hold callbacks that only
//! know the dependent's ID. Nothing here forms a reference cycle.
//!
//! # Borrowing
//!
//! The arena is a `RefCell`. Accessors take a closure and never let the
//! borrow escape, and callers must not run user code or emit inside those
//! closures. Anything that may own user values (caches, compute closures,
//! taps) is moved out and dropped after the borrow ends, because dropping a
//! handle can release another node.
//!
//! Releasing a node goes through a graveyard: the ID is queued, then removed
//! as soon as the arena is not borrowed.
//!
//! [`Tap`]: crate::reactive::Tap

use std::cell::RefCell;
use std::collections::HashMap;

use indexmap::IndexSet;

use super::node::{Node, NodeId};

/// Storage for every node of one runtime.
pub(crate) struct Arena {
    nodes: RefCell<HashMap<NodeId, Node>>,

    /// Nodes currently evaluating, innermost last.
    evaluating: RefCell<IndexSet<NodeId>>,

    /// Released nodes waiting for the arena to be free.
    graveyard: RefCell<Vec<NodeId>>,
}

impl Arena {
    pub(crate) fn new() -> Self {
        Self {
            nodes: RefCell::new(HashMap::new()),
            evaluating: RefCell::new(IndexSet::new()),
            graveyard: RefCell::new(Vec::new()),
        }
    }

    /// Add a node to the arena.
    pub(crate) fn insert(&self, node: Node) -> NodeId {
        let id = node.id;
        self.nodes.borrow_mut().insert(id, node);
        id
    }

    /// Read a node.
    ///
    /// # Panics
    ///
    /// If the node is not in the arena. Live handles keep their node
    /// registered, so this is a bookkeeping bug.
    pub(crate) fn with<R>(&self, id: NodeId, f: impl FnOnce(&Node) -> R) -> R {
        let nodes = self.nodes.borrow();
        match nodes.get(&id) {
            Some(node) => f(node),
            None => panic!("derivation {id} is not registered in this runtime"),
        }
    }

    /// Mutate a node. Panics like [`Arena::with`].
    pub(crate) fn with_mut<R>(&self, id: NodeId, f: impl FnOnce(&mut Node) -> R) -> R {
        let mut nodes = self.nodes.borrow_mut();
        match nodes.get_mut(&id) {
            Some(node) => f(node),
            None => panic!("derivation {id} is not registered in this runtime"),
        }
    }

    /// Read a node that may already have been released.
    pub(crate) fn try_with<R>(&self, id: NodeId, f: impl FnOnce(&Node) -> R) -> Option<R> {
        self.nodes.borrow().get(&id).map(f)
    }

    /// Mutate a node that may already have been released.
    pub(crate) fn try_with_mut<R>(&self, id: NodeId, f: impl FnOnce(&mut Node) -> R) -> Option<R> {
        self.nodes.borrow_mut().get_mut(&id).map(f)
    }

    /// Get the total number of nodes in the arena.
    pub(crate) fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// The evaluation stack, used by the cycle guard.
    pub(crate) fn evaluating(&self) -> &RefCell<IndexSet<NodeId>> {
        &self.evaluating
    }

    /// Queue a node for removal and remove whatever can be removed now.
    pub(crate) fn release(&self, id: NodeId) {
        self.graveyard.borrow_mut().push(id);
        self.collect_garbage();
    }

    /// Remove queued nodes.
    ///
    /// A removed node's upstream subscriptions are untapped, which may cool
    /// down (but never remove) other nodes. Dropping the node may release
    /// more nodes; those are picked up by the same loop.
    pub(crate) fn collect_garbage(&self) {
        loop {
            let Some(id) = self.graveyard.borrow_mut().pop() else {
                break;
            };

            let removed = match self.nodes.try_borrow_mut() {
                Ok(mut nodes) => nodes.remove(&id),
                Err(_) => {
                    // Someone up the stack is using the arena; they will
                    // collect once they are done.
                    self.graveyard.borrow_mut().push(id);
                    break;
                }
            };

            if let Some(node) = removed {
                tracing::trace!(node = %id, "releasing derivation");
                for subscription in node.upstream.values() {
                    subscription.untap();
                }
                drop(node);
            }
        }
    }
}

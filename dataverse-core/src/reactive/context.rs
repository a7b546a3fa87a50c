//! Evaluation Context
//!
//! Every compute function receives a [`Tracker`]. Reading another derivation
//! through it is what makes that derivation a dependency; there is no
//! ambient "currently running computation".
//!
//! # Modes
//!
//! - A *transient* tracker belongs to a cold evaluation. It records nothing:
//!   dependencies are read (and computed, if they are cold themselves) but
//!   nobody subscribes to them.
//! - A *subscribing* tracker belongs to a hot derivation's recomputation. It
//!   taps each dependency the first time it is read, before reading the
//!   value, so the dependency is already hot and cached by the time its
//!   value is needed. Subscriptions carried over from the previous
//!   computation are reused rather than re-tapped. A dependency whose
//!   activation fails stays tapped, so its recovery reaches the owner.
//!
//! # Cycle guard
//!
//! [`EvalGuard`] keeps the set of nodes currently evaluating. Entering a node
//! that is already on the stack fails with
//! [`Error::DependencyCycle`](crate::Error::DependencyCycle) instead of
//! recursing forever.

use std::rc::Rc;

use indexmap::IndexMap;

use super::derivation::{downcast, Derivation, NodeHandle};
use super::runtime::RuntimeInner;
use super::tap::Tap;
use crate::error::{Error, Result};
use crate::graph::NodeId;

/// A dependent's hold on one dependency: the tap that invalidates it, and a
/// handle that keeps the dependency registered for as long as the tap lives.
pub(crate) struct Subscription {
    tap: Tap,
    _dependency: Rc<NodeHandle>,
}

impl Subscription {
    pub(crate) fn untap(&self) {
        self.tap.untap();
    }
}

/// Subscriptions of one node, keyed by dependency, in read order.
pub(crate) type Subscriptions = IndexMap<NodeId, Subscription>;

enum Mode {
    Transient,
    Subscribing {
        previous: Subscriptions,
        current: Subscriptions,
    },
}

/// The evaluation context handed to compute functions.
pub struct Tracker {
    runtime: Rc<RuntimeInner>,
    owner: NodeId,
    mode: Mode,
}

impl Tracker {
    pub(crate) fn transient(runtime: Rc<RuntimeInner>, owner: NodeId) -> Self {
        Self {
            runtime,
            owner,
            mode: Mode::Transient,
        }
    }

    pub(crate) fn subscribing(
        runtime: Rc<RuntimeInner>,
        owner: NodeId,
        previous: Subscriptions,
    ) -> Self {
        Self {
            runtime,
            owner,
            mode: Mode::Subscribing {
                previous,
                current: IndexMap::new(),
            },
        }
    }

    /// Read a derivation's current value and record it as a dependency.
    pub fn get<T: Clone + 'static>(&mut self, derivation: &Derivation<T>) -> Result<T> {
        let id = self.check_runtime(derivation);

        if let Mode::Subscribing { previous, current } = &mut self.mode {
            if !current.contains_key(&id) {
                match previous.shift_remove(&id) {
                    Some(subscription) => {
                        current.insert(id, subscription);
                    }
                    None => {
                        let (tap, activated) = self.runtime.subscribe(id, self.owner);
                        if let Some(tap) = tap {
                            let subscription = Subscription {
                                tap,
                                _dependency: derivation.handle(),
                            };
                            current.insert(id, subscription);
                        }
                        activated?;
                    }
                }
            }
        }

        let value = self.runtime.value_of(id)?;
        Ok(downcast(value, id))
    }

    /// Read a derivation's current value without depending on it.
    pub fn get_untracked<T: Clone + 'static>(&self, derivation: &Derivation<T>) -> Result<T> {
        let id = self.check_runtime(derivation);
        let value = self.runtime.value_of(id)?;
        Ok(downcast(value, id))
    }

    /// The node being computed.
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    /// Whether reads subscribe (the owner is hot).
    pub fn is_subscribing(&self) -> bool {
        matches!(self.mode, Mode::Subscribing { .. })
    }

    /// Split a subscribing tracker into the subscriptions left over from the
    /// previous computation and the ones made (or kept) by this one.
    pub(crate) fn into_subscriptions(self) -> (Subscriptions, Subscriptions) {
        match self.mode {
            Mode::Transient => (Subscriptions::new(), Subscriptions::new()),
            Mode::Subscribing { previous, current } => (previous, current),
        }
    }

    fn check_runtime<T>(&self, derivation: &Derivation<T>) -> NodeId {
        assert!(
            derivation.belongs_to(&self.runtime),
            "derivation {} read from a computation of another runtime",
            derivation.id()
        );
        derivation.id()
    }
}

/// Guard that marks a node as evaluating until dropped.
///
/// Dropping pops the node even if the computation panicked, so the stack
/// stays balanced.
pub(crate) struct EvalGuard<'rt> {
    runtime: &'rt RuntimeInner,
    id: NodeId,
}

impl<'rt> EvalGuard<'rt> {
    pub(crate) fn enter(runtime: &'rt RuntimeInner, id: NodeId) -> Result<Self> {
        let mut stack = runtime.arena().evaluating().borrow_mut();

        if stack.contains(&id) {
            return Err(Error::DependencyCycle { node: id });
        }

        let depth = runtime.config().max_evaluation_depth;
        if stack.len() >= depth {
            return Err(Error::EvaluationTooDeep { depth });
        }

        stack.insert(id);
        Ok(Self { runtime, id })
    }
}

impl Drop for EvalGuard<'_> {
    fn drop(&mut self) {
        let popped = self.runtime.arena().evaluating().borrow_mut().pop();

        // Guards are scoped, so they must unwind in order.
        debug_assert_eq!(
            popped,
            Some(self.id),
            "EvalGuard mismatch: expected {:?}, got {:?}",
            self.id,
            popped
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::reactive::Runtime;

    #[test]
    fn guard_tracks_evaluation_stack() {
        let runtime = Runtime::new();
        let inner = runtime.inner();
        let id1 = NodeId::new();
        let id2 = NodeId::new();

        {
            let _outer = EvalGuard::enter(inner, id1).unwrap();
            {
                let _inner = EvalGuard::enter(inner, id2).unwrap();
                assert_eq!(inner.arena().evaluating().borrow().len(), 2);
            }
            assert_eq!(inner.arena().evaluating().borrow().len(), 1);
        }

        assert!(inner.arena().evaluating().borrow().is_empty());
    }

    #[test]
    fn reentering_a_node_is_a_cycle() {
        let runtime = Runtime::new();
        let inner = runtime.inner();
        let id = NodeId::new();

        let _guard = EvalGuard::enter(inner, id).unwrap();
        let err = EvalGuard::enter(inner, id).err().unwrap();
        assert!(matches!(err, Error::DependencyCycle { node } if node == id));

        // The failed attempt must not have touched the stack.
        assert_eq!(inner.arena().evaluating().borrow().len(), 1);
    }

    #[test]
    fn depth_limit() {
        let runtime = Runtime::with_config(Config {
            max_evaluation_depth: 2,
            ..Config::default()
        });
        let inner = runtime.inner();

        let _a = EvalGuard::enter(inner, NodeId::new()).unwrap();
        let _b = EvalGuard::enter(inner, NodeId::new()).unwrap();
        let err = EvalGuard::enter(inner, NodeId::new()).err().unwrap();
        assert!(matches!(err, Error::EvaluationTooDeep { depth: 2 }));
    }

    #[test]
    fn transient_tracker_records_nothing() {
        let runtime = Runtime::new();
        let source = runtime.source(3);

        let mut tracker = Tracker::transient(Rc::clone(runtime.inner()), NodeId::new());
        assert!(!tracker.is_subscribing());
        assert_eq!(tracker.get(&source).unwrap(), 3);

        let (previous, current) = tracker.into_subscriptions();
        assert!(previous.is_empty());
        assert!(current.is_empty());
        assert!(!source.changes().has_tappers());
    }
}

//! Dependency Graph
//!
//! This module holds the storage side of the derivation graph.
//!
//! # Overview
//!
//! Every derivation is a [`Node`] in an [`Arena`], addressed by a stable
//! [`NodeId`]:
//!
//! - Source nodes hold a value written from outside the engine.
//! - Derived nodes hold a compute function and, while hot, a cached value.
//!
//! Edges are the taps a dependent holds on its dependencies (forward) and the
//! callbacks registered in the dependencies' emitters (backward). Both are
//! keyed by `NodeId`, never by reference, so the graph can change shape on
//! every recomputation without ownership cycles.
//!
//! The lifecycle logic that walks these edges lives in
//! [`reactive::runtime`](crate::reactive).

mod arena;
mod node;

pub(crate) use arena::Arena;
pub(crate) use node::{ComputeFn, Node, NodeKind};
pub use node::{DirtyState, Lifecycle, NodeId};

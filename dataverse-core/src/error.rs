//! Error types for the derivation engine.
//!
//! Errors are synchronous and local to the call that triggered them. Bugs in
//! the engine's own bookkeeping (diffs outside the array bounds, a node missing
//! from the arena, a value of the wrong type) are not represented here: they
//! panic, since continuing would hand corrupted state to consumers.

use thiserror::Error;

use crate::graph::NodeId;

/// Boxed error produced by user-supplied compute, fold or map functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by [`Derivation::get`](crate::Derivation::get),
/// [`Tappable::tap`](crate::Tappable::tap) and friends.
#[derive(Error, Debug)]
pub enum Error {
    /// A user-supplied function failed while computing a value.
    #[error("computation failed: {0}")]
    Computation(#[source] BoxError),

    /// A derivation was asked for its value while it was already being
    /// evaluated further up the stack.
    #[error("dependency cycle detected at derivation {node}")]
    DependencyCycle { node: NodeId },

    /// Evaluation nested deeper than the configured maximum.
    #[error("evaluation nested too deep (max {depth})")]
    EvaluationTooDeep { depth: usize },

    /// An array slot was read past the end of the array.
    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// The handle outlived the runtime that owned its node.
    #[error("the runtime owning this derivation has been dropped")]
    RuntimeDropped,
}

impl Error {
    /// Wrap an arbitrary error or message as a computation failure.
    pub fn computation(err: impl Into<BoxError>) -> Self {
        Error::Computation(err.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

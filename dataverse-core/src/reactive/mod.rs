//! Reactive Primitives
//!
//! This module implements the core of the engine: emitters, derivations and
//! the runtime that moves derivations between their cold and hot states.
//!
//! # Concepts
//!
//! ## Emitters
//!
//! An [`Emitter`] is a typed publish/subscribe channel that knows how many
//! tappers it has. Going from zero to one tapper and back runs lifecycle
//! hooks. Everything else in the crate is built on that signal.
//!
//! ## Derivations
//!
//! A [`Derivation`] is a value computed from other derivations. Reading one
//! through a [`Tracker`] inside a compute function makes it a dependency.
//! Unobserved derivations are cold: they compute on every read and hold no
//! subscriptions. Observed derivations are hot: they cache, subscribe to
//! what they read, and signal when that goes stale.
//!
//! ## Sources
//!
//! A [`Source`] is a derivation whose value is set from outside.
//!
//! ## Reactions
//!
//! A [`Reaction`] is the consumer end: it keeps a derivation hot and runs a
//! callback with each new value.
//!
//! # Implementation Notes
//!
//! Dependency tracking is explicit. There is no thread-local "current
//! computation"; the tracker is an argument, so a read outside a compute
//! function can never be mistaken for a dependency.

mod context;
mod derivation;
mod emitter;
mod reaction;
mod runtime;
mod source;
mod tap;

pub use context::Tracker;
pub use derivation::Derivation;
pub use emitter::{Emitter, Tappable, WeakEmitter};
pub use reaction::Reaction;
pub use runtime::Runtime;
pub use source::Source;
pub use tap::{Tap, TapGuard, TapId};

pub(crate) use context::Subscriptions;
pub(crate) use runtime::{RuntimeInner, WeakRuntime};

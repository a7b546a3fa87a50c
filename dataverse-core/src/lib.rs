//! DataVerse Core
//!
//! This crate provides the derivation engine underneath DataVerse. It
//! implements:
//!
//! - Emitters with observed/unobserved lifecycle hooks
//! - Lazily evaluated, dependency-tracked derivations with a cold/hot lifecycle
//! - Derived arrays and dictionaries that propagate minimal diffs
//! - Pointers that resolve key paths through nested collections
//!
//! Everything is single-threaded and synchronous. Nothing here performs I/O.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: emitters, derivations, sources and the runtime
//! - `graph`: node storage and the per-node state machine data
//! - `collections`: derived arrays and dictionaries, and their combinators
//! - `pointer`: path lookups over dynamic values
//!
//! # Example
//!
//! ```rust
//! use dataverse_core::{Reaction, Runtime};
//!
//! let runtime = Runtime::new();
//! let numbers = runtime.array(vec![1, 2, 3]);
//! let doubled = numbers.as_derived().map(|t, x| Ok(t.get(x)? * 2));
//! let total = doubled.reduce(0, |acc, v, _| Ok(acc + v));
//!
//! let reaction = Reaction::new(&total, |sum| println!("total: {sum}")).unwrap();
//! numbers.push(4).unwrap();
//!
//! assert_eq!(total.get().unwrap(), 20);
//! assert_eq!(reaction.run_count(), 2);
//! ```

pub mod collections;
pub mod config;
pub mod error;
pub mod graph;
pub mod pointer;
pub mod reactive;

pub use collections::{
    ArrayView, DerivedArray, DerivedDict, DictDiff, DictView, Fold, SourceArray, SourceDict,
    SpliceDiff,
};
pub use config::Config;
pub use error::{BoxError, Error, Result};
pub use graph::{Lifecycle, NodeId};
pub use pointer::{Path, PathKey, Pointer, Value};
pub use reactive::{
    Derivation, Emitter, Reaction, Runtime, Source, Tap, TapGuard, TapId, Tappable, Tracker,
    WeakEmitter,
};

//! Collection Derivations
//!
//! Arrays and dictionaries whose elements are derivations of their own.
//!
//! # Overview
//!
//! Reading a whole collection through one derivation would invalidate every
//! consumer on every change. Instead a collection exposes:
//!
//! - one stable derivation per position ([`ArrayView::index`]) or per key
//!   ([`DictView::at`]), which only signals when its own value may change;
//! - a length or key-list derivation;
//! - a structured diff stream ([`SpliceDiff`] / [`DictDiff`]) for consumers
//!   that patch incrementally.
//!
//! [`SourceArray`] and [`SourceDict`] are the mutable roots. The combinators
//! on [`DerivedArray`] (`concat`, `map`, `reduce`, `to_vec`) build new views
//! without copying.

mod array;
mod concat;
mod dict;
mod map;
mod reduce;
mod slots;
mod source_array;
mod splice;

pub use array::{ArrayView, DerivedArray};
pub use dict::{DerivedDict, DictDiff, DictView, SourceDict};
pub use reduce::Fold;
pub use source_array::SourceArray;
pub use splice::SpliceDiff;

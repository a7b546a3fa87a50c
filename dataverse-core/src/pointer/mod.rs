//! Pointers
//!
//! Key-path lookups over a [`Value`] structure whose containers are
//! collection derivations. A missing segment is not an error: the pointer
//! resolves to `None`.

mod path;
#[allow(clippy::module_inception)]
mod pointer;
mod value;

pub use path::{Path, PathKey};
pub use pointer::Pointer;
pub use value::Value;

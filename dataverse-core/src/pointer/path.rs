//! Path segments.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// One step of a path: a dictionary key or an array position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathKey {
    Index(usize),
    Key(String),
}

/// A sequence of path segments. Most paths are short.
pub type Path = SmallVec<[PathKey; 4]>;

impl PathKey {
    /// The position this segment names when applied to an array.
    ///
    /// String keys that are plain decimal numbers count as positions.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathKey::Index(index) => Some(*index),
            PathKey::Key(key) if is_decimal(key) => key.parse().ok(),
            PathKey::Key(_) => None,
        }
    }

    /// The key this segment names when applied to a dictionary.
    pub fn as_key(&self) -> String {
        match self {
            PathKey::Index(index) => index.to_string(),
            PathKey::Key(key) => key.clone(),
        }
    }
}

fn is_decimal(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

impl From<&str> for PathKey {
    fn from(key: &str) -> Self {
        PathKey::Key(key.to_owned())
    }
}

impl From<String> for PathKey {
    fn from(key: String) -> Self {
        PathKey::Key(key)
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        PathKey::Index(index)
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Index(index) => write!(f, "[{index}]"),
            PathKey::Key(key) => write!(f, ".{key}"),
        }
    }
}

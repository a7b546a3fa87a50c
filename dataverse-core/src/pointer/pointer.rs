//! Pointers: lazy key-path lookups.
//!
//! A pointer is a chain of derivations, one per path segment. Each segment
//! reads its parent's resolved value and looks up one key in it. While a
//! pointer is hot, a change deep in the structure only recomputes the
//! segments from the container that changed down to the leaf; the prefix
//! keeps its cached resolution.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::path::{Path, PathKey};
use super::value::Value;
use crate::collections::{DerivedArray, DerivedDict};
use crate::error::{Error, Result};
use crate::reactive::{Derivation, Tappable, Tracker};

struct Inner {
    path: Path,
    derivation: Derivation<Option<Value>>,
    children: RefCell<HashMap<PathKey, Pointer>>,
}

/// A path into a [`Value`] structure. Resolves to `None` wherever the path
/// does not exist.
///
/// # Example
///
/// ```rust
/// use dataverse_core::{Pointer, Runtime, Value};
/// use serde_json::json;
///
/// let runtime = Runtime::new();
/// let root = runtime.constant(Value::from_json(&runtime, json!({"a": {"b": 1}})));
///
/// assert_eq!(Pointer::new(&root, ["a", "b"]).get().unwrap(), Some(Value::Number(1.0)));
/// assert_eq!(Pointer::new(&root, ["a", "c"]).get().unwrap(), None);
/// ```
#[derive(Clone)]
pub struct Pointer {
    inner: Rc<Inner>,
}

impl Pointer {
    /// A pointer to `root` itself.
    pub fn root(root: &Derivation<Value>) -> Self {
        Self::from_parts(Path::new(), root.map(|value| Some(value.clone())))
    }

    /// A pointer to `path` under `root`.
    pub fn new<I, K>(root: &Derivation<Value>, path: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<PathKey>,
    {
        path.into_iter()
            .fold(Self::root(root), |pointer, key| pointer.prop(key))
    }

    fn from_parts(path: Path, derivation: Derivation<Option<Value>>) -> Self {
        Self {
            inner: Rc::new(Inner {
                path,
                derivation,
                children: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// The pointer one segment further down.
    ///
    /// Children are cached, so pointers built from a common parent share
    /// their prefix derivations.
    pub fn prop(&self, key: impl Into<PathKey>) -> Pointer {
        let key = key.into();
        if let Some(child) = self.inner.children.borrow().get(&key) {
            return child.clone();
        }

        let parent = self.inner.derivation.clone();
        let step = key.clone();
        let derivation = match parent.runtime() {
            Ok(runtime) => runtime.derive(move |t| match t.get(&parent)? {
                Some(container) => resolve(t, &container, &step),
                None => Ok(None),
            }),
            Err(_) => Derivation::orphan(),
        };

        let mut path = self.inner.path.clone();
        path.push(key.clone());
        let child = Pointer::from_parts(path, derivation);

        self.inner.children.borrow_mut().insert(key, child.clone());
        child
    }

    pub fn path(&self) -> &[PathKey] {
        &self.inner.path
    }

    /// Resolve the path now. `Ok(None)` means it does not exist.
    pub fn get(&self) -> Result<Option<Value>> {
        self.inner.derivation.get()
    }

    /// The derivation behind this pointer, for use inside other
    /// computations.
    pub fn derivation(&self) -> &Derivation<Option<Value>> {
        &self.inner.derivation
    }

    pub fn changes(&self) -> Tappable<()> {
        self.inner.derivation.changes()
    }
}

impl DerivedArray<Value> {
    /// A pointer rooted at this array.
    pub fn pointer(&self) -> Pointer {
        let array = self.clone();
        Pointer::root(&self.runtime().derive(move |_| Ok(Value::Array(array.clone()))))
    }
}

impl DerivedDict<Value> {
    /// A pointer rooted at this dictionary.
    pub fn pointer(&self) -> Pointer {
        let dict = self.clone();
        Pointer::root(&self.runtime().derive(move |_| Ok(Value::Dict(dict.clone()))))
    }
}

/// Look up one segment in `container`.
fn resolve(t: &mut Tracker, container: &Value, key: &PathKey) -> Result<Option<Value>> {
    match container {
        Value::Dict(dict) => t.get(&dict.at(&key.as_key())),
        Value::Array(array) => {
            let Some(index) = key.as_index() else {
                return Ok(None);
            };
            match t.get(&array.index(index)) {
                Ok(value) => Ok(Some(value)),
                Err(Error::IndexOutOfRange { .. }) => Ok(None),
                Err(err) => Err(err),
            }
        }
        _ => Ok(None),
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path: String = self.inner.path.iter().map(ToString::to_string).collect();
        f.debug_struct("Pointer")
            .field("path", &path)
            .field("derivation", &self.inner.derivation)
            .finish()
    }
}

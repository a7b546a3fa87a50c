//! Source Implementation
//!
//! A Source is a root derivation: its value is written from outside the
//! engine rather than computed.
//!
//! # How Sources Work
//!
//! 1. A source is read like any other derivation; computations that read it
//!    through a tracker subscribe to it while they are hot.
//!
//! 2. `set` replaces the value and signals every tapper, whether or not the
//!    value actually changed. External stores call it from their own change
//!    callbacks.
//!
//! 3. Sources have no upstream and never go hot or cold in a way that
//!    matters: their value is always present.

use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use super::derivation::Derivation;
use crate::error::Result;

/// A settable root derivation.
///
/// # Example
///
/// ```rust
/// use dataverse_core::Runtime;
///
/// let runtime = Runtime::new();
/// let count = runtime.source(1);
/// let doubled = count.map(|v| v * 2);
///
/// count.set(5).unwrap();
/// assert_eq!(doubled.get().unwrap(), 10);
/// ```
pub struct Source<T> {
    derivation: Derivation<T>,
}

impl<T> Source<T> {
    pub(crate) fn from_derivation(derivation: Derivation<T>) -> Self {
        Self { derivation }
    }

    /// Get the read-only derivation of this source.
    pub fn as_derivation(&self) -> &Derivation<T> {
        &self.derivation
    }
}

impl<T: Clone + 'static> Source<T> {
    /// Replace the value and signal tappers.
    pub fn set(&self, value: T) -> Result<()> {
        self.replace_silently(value)?;
        self.notify()
    }

    /// Set the value to `f(current)`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        let current = self.derivation.get()?;
        self.set(f(&current))
    }

    /// Write the value without signalling. Used when several writes must land
    /// before anyone is told.
    pub(crate) fn replace_silently(&self, value: T) -> Result<()> {
        let runtime = self.derivation.upgrade()?;
        let stale = runtime.write(self.derivation.id(), Rc::new(value));
        drop(stale);
        Ok(())
    }

    /// Signal tappers without writing.
    pub(crate) fn notify(&self) -> Result<()> {
        let runtime = self.derivation.upgrade()?;
        runtime.notify(self.derivation.id());
        runtime.arena().collect_garbage();
        Ok(())
    }
}

impl<T> Deref for Source<T> {
    type Target = Derivation<T>;

    fn deref(&self) -> &Derivation<T> {
        &self.derivation
    }
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        Self {
            derivation: self.derivation.clone(),
        }
    }
}

impl<T> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Source").field(&self.derivation).finish()
    }
}

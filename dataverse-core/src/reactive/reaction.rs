//! Reaction Implementation
//!
//! A Reaction keeps a derivation hot and runs a callback with its value
//! whenever it changes.
//!
//! # How Reactions Work
//!
//! 1. When created, the reaction taps the derivation (making it hot), pulls
//!    the value and runs the callback once.
//!
//! 2. When the derivation signals, the reaction schedules a pull for the end
//!    of the current batch. Every write to a source is a batch, so the pull
//!    sees the graph after the whole write has propagated, and the callback
//!    runs once per write however many paths the signal took.
//!
//! 3. A pull that fails after creation does not run the callback; the error
//!    is kept until [`Reaction::take_error`] collects it, and the reaction
//!    keeps listening.
//!
//! # Cleanup
//!
//! Dropping a reaction (or calling [`Reaction::dispose`]) untaps. If it was
//! the derivation's last tapper, the derivation goes cold.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::derivation::Derivation;
use super::tap::Tap;
use crate::error::{Error, Result};

#[derive(Default)]
struct State {
    tap: RefCell<Option<Tap>>,
    queued: Cell<bool>,
    runs: Cell<usize>,
    error: RefCell<Option<Error>>,
}

impl State {
    fn pull<T: Clone + 'static>(&self, derivation: &Derivation<T>, callback: &dyn Fn(&T)) {
        if self.tap.borrow().is_none() {
            return;
        }
        match derivation.get() {
            Ok(value) => {
                self.runs.set(self.runs.get() + 1);
                callback(&value);
            }
            Err(err) => {
                *self.error.borrow_mut() = Some(err);
            }
        }
    }

    fn dispose(&self) {
        let tap = self.tap.borrow_mut().take();
        if let Some(tap) = tap {
            tap.untap();
        }
    }
}

/// A callback driven by a derivation's changes.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use dataverse_core::{Reaction, Runtime};
///
/// let runtime = Runtime::new();
/// let count = runtime.source(1);
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let seen_clone = seen.clone();
/// let reaction = Reaction::new(&count, move |v| seen_clone.borrow_mut().push(*v)).unwrap();
///
/// count.set(2).unwrap();
/// assert_eq!(*seen.borrow(), vec![1, 2]);
/// assert_eq!(reaction.run_count(), 2);
/// ```
pub struct Reaction {
    state: Rc<State>,
}

impl Reaction {
    /// Tap `derivation`, run `callback` with its current value, and run it
    /// again after every change.
    ///
    /// Fails if the derivation cannot be made hot or its first value cannot
    /// be computed; nothing stays tapped in that case.
    pub fn new<T, F>(derivation: &Derivation<T>, callback: F) -> Result<Self>
    where
        T: Clone + 'static,
        F: Fn(&T) + 'static,
    {
        let state = Rc::new(State::default());
        let callback: Rc<dyn Fn(&T)> = Rc::new(callback);

        let run: Rc<dyn Fn()> = {
            let weak = Rc::downgrade(&state);
            let (source, on_change) = (derivation.clone(), Rc::clone(&callback));
            Rc::new(move || {
                if let Some(state) = weak.upgrade() {
                    state.queued.set(false);
                    state.pull(&source, &*on_change);
                }
            })
        };

        let runtime = Rc::downgrade(&derivation.upgrade()?);
        let weak = Rc::downgrade(&state);
        let tap = derivation.tap(move || {
            let Some(state) = weak.upgrade() else {
                return;
            };
            if state.queued.replace(true) {
                return;
            }
            match runtime.upgrade() {
                Some(runtime) => runtime.defer(Rc::clone(&run)),
                None => run(),
            }
        })?;
        *state.tap.borrow_mut() = Some(tap);

        match derivation.get() {
            Ok(value) => {
                state.runs.set(1);
                callback(&value);
                Ok(Self { state })
            }
            Err(err) => {
                state.dispose();
                Err(err)
            }
        }
    }

    /// Stop reacting. Idempotent.
    pub fn dispose(&self) {
        self.state.dispose();
    }

    /// Check whether the reaction has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.state.tap.borrow().is_none()
    }

    /// Get the number of times the callback has run.
    pub fn run_count(&self) -> usize {
        self.state.runs.get()
    }

    /// Take the error of the most recent failed pull, if any.
    pub fn take_error(&self) -> Option<Error> {
        self.state.error.borrow_mut().take()
    }
}

impl Drop for Reaction {
    fn drop(&mut self) {
        self.state.dispose();
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .field("failed", &self.state.error.borrow().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Runtime;

    #[test]
    fn runs_on_creation_and_on_change() {
        let runtime = Runtime::new();
        let count = runtime.source(1);
        let doubled = count.map(|v| v * 2);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let reaction = Reaction::new(&doubled, move |v| seen_clone.borrow_mut().push(*v)).unwrap();
        assert!(doubled.is_hot());

        count.set(2).unwrap();
        count.set(3).unwrap();
        assert_eq!(*seen.borrow(), vec![2, 4, 6]);
        assert_eq!(reaction.run_count(), 3);
    }

    #[test]
    fn runs_once_per_write_across_diamonds() {
        let runtime = Runtime::new();
        let base = runtime.source(1);
        let left = base.map(|v| v + 1);
        let right = base.map(|v| v * 10);
        let (l, r) = (left.clone(), right.clone());
        let joined = runtime.derive(move |t| Ok((t.get(&l)?, t.get(&r)?)));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let _reaction = Reaction::new(&joined, move |pair| seen_clone.borrow_mut().push(*pair)).unwrap();

        base.set(2).unwrap();
        assert_eq!(*seen.borrow(), vec![(2, 10), (3, 20)]);

        runtime.batch(|| {
            base.set(3).unwrap();
            base.set(4).unwrap();
        });
        assert_eq!(*seen.borrow(), vec![(2, 10), (3, 20), (5, 40)]);
    }

    #[test]
    fn does_not_run_after_disposal() {
        let runtime = Runtime::new();
        let count = runtime.source(1);

        let reaction = Reaction::new(&count, |_| {}).unwrap();
        reaction.dispose();
        assert!(reaction.is_disposed());
        assert!(!count.changes().has_tappers());

        count.set(2).unwrap();
        assert_eq!(reaction.run_count(), 1);

        // Idempotent.
        reaction.dispose();
    }

    #[test]
    fn drop_cools_the_derivation() {
        let runtime = Runtime::new();
        let count = runtime.source(1);
        let doubled = count.map(|v| v * 2);

        let reaction = Reaction::new(&doubled, |_| {}).unwrap();
        assert!(doubled.is_hot());
        drop(reaction);
        assert!(!doubled.is_hot());
    }

    #[test]
    fn failed_first_pull_leaves_nothing_tapped() {
        let runtime = Runtime::new();
        let failing = runtime.derive::<i32, _>(|_| Err(Error::computation("nope")));

        let result = Reaction::new(&failing, |_| {});
        assert!(matches!(result, Err(Error::Computation(_))));
        assert!(!failing.changes().has_tappers());
    }

    #[test]
    fn later_failures_are_kept() {
        let runtime = Runtime::new();
        let divisor = runtime.source(1);
        let divisor_clone = divisor.clone();
        let quotient = runtime.derive(move |t| match t.get(&divisor_clone)? {
            0 => Err(Error::computation("division by zero")),
            d => Ok(12 / d),
        });

        let reaction = Reaction::new(&quotient, |_| {}).unwrap();
        assert!(reaction.take_error().is_none());

        divisor.set(0).unwrap();
        assert!(matches!(reaction.take_error(), Some(Error::Computation(_))));
        assert!(reaction.take_error().is_none());
        assert_eq!(reaction.run_count(), 1);

        divisor.set(3).unwrap();
        assert_eq!(reaction.run_count(), 2);
        assert!(!reaction.is_disposed());
    }
}

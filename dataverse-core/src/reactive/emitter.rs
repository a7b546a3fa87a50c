//! Emitter and Tappable
//!
//! An [`Emitter`] is a typed publish/subscribe primitive. Tappers are kept in
//! tap order, and emission calls them in that order. The emitter also tracks
//! how many tappers it has and runs lifecycle hooks when that number goes
//! from zero to one ("observed") and from one to zero ("unobserved").
//! Derivations use those hooks to switch between their cold and hot states.
//!
//! A [`Tappable`] is the read-only half: it can be tapped, but not emitted on.
//! Owners keep the `Emitter` and hand out `Tappable`s.
//!
//! # Re-entrancy
//!
//! No borrow is held while a tapper or hook runs. A tapper may tap or untap
//! anything, including the emitter that is calling it:
//!
//! - taps added during an emission round are not called in that round;
//! - a tapper untapped during the round, before its turn, is skipped.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::tap::{Tap, TapId, Untap};
use crate::error::Result;

type Callback<P> = Rc<dyn Fn(&P)>;
type ObservedHook = Rc<dyn Fn() -> Result<()>>;
type UnobservedHook = Rc<dyn Fn()>;

struct State<P> {
    tappers: IndexMap<TapId, Callback<P>>,
    on_observed: Vec<ObservedHook>,
    on_unobserved: Vec<UnobservedHook>,
}

struct Shared<P> {
    state: RefCell<State<P>>,
}

impl<P: 'static> Shared<P> {
    fn tap(self: &Rc<Self>, callback: Callback<P>) -> Result<Tap> {
        let (tap, observed) = self.tap_retaining(callback);
        match observed {
            Ok(()) => Ok(tap),
            Err(err) => {
                tap.untap();
                Err(err)
            }
        }
    }

    /// Register `callback` and run the observed hooks, keeping the tapper
    /// even if a hook fails.
    fn tap_retaining(self: &Rc<Self>, callback: Callback<P>) -> (Tap, Result<()>) {
        let id = TapId::new();

        let hooks = {
            let mut state = self.state.borrow_mut();
            state.tappers.insert(id, callback);
            if state.tappers.len() == 1 {
                state.on_observed.clone()
            } else {
                Vec::new()
            }
        };

        let tap = Tap::new(id, Rc::downgrade(self) as Weak<dyn Untap>);
        let observed = hooks.iter().try_for_each(|hook| hook());
        (tap, observed)
    }

    fn emit(&self, payload: &P) {
        let snapshot: SmallVec<[(TapId, Callback<P>); 4]> = self
            .state
            .borrow()
            .tappers
            .iter()
            .map(|(id, callback)| (*id, Rc::clone(callback)))
            .collect();

        for (id, callback) in snapshot {
            let live = self.state.borrow().tappers.contains_key(&id);
            if live {
                callback(payload);
            }
        }
    }
}

impl<P> Untap for Shared<P> {
    fn untap(&self, id: TapId) {
        let (removed, hooks) = {
            let mut state = self.state.borrow_mut();
            let removed = state.tappers.shift_remove(&id);
            let hooks = if removed.is_some() && state.tappers.is_empty() {
                state.on_unobserved.clone()
            } else {
                Vec::new()
            };
            (removed, hooks)
        };
        // The callback may own handles whose drop re-enters this emitter.
        drop(removed);

        for hook in hooks {
            hook();
        }
    }
}

/// The writable side of a publish/subscribe channel.
pub struct Emitter<P> {
    shared: Rc<Shared<P>>,
}

impl<P: 'static> Emitter<P> {
    /// Create an emitter with no tappers and no hooks.
    pub fn new() -> Self {
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(State {
                    tappers: IndexMap::new(),
                    on_observed: Vec::new(),
                    on_unobserved: Vec::new(),
                }),
            }),
        }
    }

    /// Get the read-only view of this emitter.
    pub fn tappable(&self) -> Tappable<P> {
        Tappable {
            shared: Rc::clone(&self.shared),
        }
    }

    /// Call every current tapper with `payload`, in tap order.
    pub fn emit(&self, payload: &P) {
        self.shared.emit(payload);
    }

    /// Register a tapper. See [`Tappable::tap`].
    pub fn tap(&self, callback: impl Fn(&P) + 'static) -> Result<Tap> {
        self.shared.tap(Rc::new(callback))
    }

    /// Like [`tap`](Self::tap), but a failing observed hook leaves the
    /// tapper registered. The caller owns the tap either way.
    pub(crate) fn tap_retaining(&self, callback: impl Fn(&P) + 'static) -> (Tap, Result<()>) {
        self.shared.tap_retaining(Rc::new(callback))
    }

    /// Check whether anyone is tapped in.
    pub fn has_tappers(&self) -> bool {
        self.tapper_count() > 0
    }

    /// Get the number of active taps.
    pub fn tapper_count(&self) -> usize {
        self.shared.state.borrow().tappers.len()
    }

    /// Run `hook` whenever the tapper count goes from zero to one.
    ///
    /// The hook runs synchronously inside the `tap` call that caused the
    /// transition. If it fails, that tap is undone like an untap (so the
    /// unobserved hooks run) and the error is returned from `tap`.
    pub fn on_observed(&self, hook: impl Fn() -> Result<()> + 'static) {
        self.shared
            .state
            .borrow_mut()
            .on_observed
            .push(Rc::new(hook));
    }

    /// Run `hook` whenever the tapper count goes from one to zero.
    pub fn on_unobserved(&self, hook: impl Fn() + 'static) {
        self.shared
            .state
            .borrow_mut()
            .on_unobserved
            .push(Rc::new(hook));
    }

    /// Get a weak handle, for hooks and tappers that must not keep the
    /// emitter alive.
    pub fn downgrade(&self) -> WeakEmitter<P> {
        WeakEmitter {
            shared: Rc::downgrade(&self.shared),
        }
    }
}

impl<P: 'static> Default for Emitter<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Clone for Emitter<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<P> fmt::Debug for Emitter<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("tapper_count", &self.shared.state.borrow().tappers.len())
            .finish()
    }
}

/// Weak counterpart of [`Emitter`].
pub struct WeakEmitter<P> {
    shared: Weak<Shared<P>>,
}

impl<P: 'static> WeakEmitter<P> {
    /// Emit if the emitter is still alive.
    pub fn emit(&self, payload: &P) {
        if let Some(shared) = self.shared.upgrade() {
            shared.emit(payload);
        }
    }
}

impl<P> Clone for WeakEmitter<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

/// Read-only view of an [`Emitter`]: tap in, nothing else.
pub struct Tappable<P> {
    shared: Rc<Shared<P>>,
}

impl<P: 'static> Tappable<P> {
    /// Register `callback` to be called on every emission.
    ///
    /// If this is the first tapper, the emitter's "observed" hooks run
    /// before this returns; their failure is returned here and leaves the
    /// tapper count unchanged.
    pub fn tap(&self, callback: impl Fn(&P) + 'static) -> Result<Tap> {
        self.shared.tap(Rc::new(callback))
    }

    /// Check whether anyone is tapped in.
    pub fn has_tappers(&self) -> bool {
        !self.shared.state.borrow().tappers.is_empty()
    }

    /// Get the number of active taps.
    pub fn tapper_count(&self) -> usize {
        self.shared.state.borrow().tappers.len()
    }
}

impl<P> Clone for Tappable<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<P> fmt::Debug for Tappable<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tappable")
            .field("tapper_count", &self.shared.state.borrow().tappers.len())
            .finish()
    }
}

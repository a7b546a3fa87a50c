//! Tap handles.
//!
//! Tapping an [`Emitter`](super::Emitter) returns a [`Tap`]. The handle is
//! the only way to stop receiving emissions, so whoever taps is responsible
//! for untapping. [`TapGuard`] ties that to a scope.

use std::fmt;
use std::rc::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TapId(u64);

impl TapId {
    /// Generate a new unique tap ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TapId {
    fn default() -> Self {
        Self::new()
    }
}

/// Something a tap can be removed from.
pub(crate) trait Untap {
    fn untap(&self, id: TapId);
}

/// Handle to a registered tapper.
///
/// Untapping is idempotent. Dropping a `Tap` does *not* untap; convert it
/// with [`Tap::into_guard`] for that.
pub struct Tap {
    id: TapId,
    source: Weak<dyn Untap>,
}

impl Tap {
    pub(crate) fn new(id: TapId, source: Weak<dyn Untap>) -> Self {
        Self { id, source }
    }

    /// Get the tap's unique ID.
    pub fn id(&self) -> TapId {
        self.id
    }

    /// Stop receiving emissions.
    ///
    /// If this was the emitter's last tapper, its "unobserved" hooks run
    /// before this returns.
    pub fn untap(&self) {
        if let Some(source) = self.source.upgrade() {
            source.untap(self.id);
        }
    }

    /// Turn this handle into a guard that untaps when dropped.
    pub fn into_guard(self) -> TapGuard {
        TapGuard { tap: Some(self) }
    }
}

impl fmt::Debug for Tap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tap")
            .field("id", &self.id)
            .field("live", &(self.source.strong_count() > 0))
            .finish()
    }
}

/// Scoped tap: untaps on drop, including unwinding and early returns.
#[derive(Debug)]
pub struct TapGuard {
    tap: Option<Tap>,
}

impl TapGuard {
    /// Get the underlying tap's ID.
    pub fn id(&self) -> Option<TapId> {
        self.tap.as_ref().map(Tap::id)
    }

    /// Give up the guard without untapping.
    pub fn into_inner(mut self) -> Option<Tap> {
        self.tap.take()
    }
}

impl Drop for TapGuard {
    fn drop(&mut self) {
        if let Some(tap) = self.tap.take() {
            tap.untap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        untapped: RefCell<Vec<TapId>>,
    }

    impl Untap for Recorder {
        fn untap(&self, id: TapId) {
            self.untapped.borrow_mut().push(id);
        }
    }

    #[test]
    fn tap_ids_are_unique() {
        let id1 = TapId::new();
        let id2 = TapId::new();
        let id3 = TapId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn guard_untaps_on_drop() {
        let recorder = Rc::new(Recorder::default());
        let weak: Weak<dyn Untap> = Rc::downgrade(&recorder) as Weak<dyn Untap>;
        let id = TapId::new();

        {
            let _guard = Tap::new(id, weak).into_guard();
            assert!(recorder.untapped.borrow().is_empty());
        }

        assert_eq!(*recorder.untapped.borrow(), vec![id]);
    }

    #[test]
    fn into_inner_disarms_guard() {
        let recorder = Rc::new(Recorder::default());
        let weak: Weak<dyn Untap> = Rc::downgrade(&recorder) as Weak<dyn Untap>;

        let guard = Tap::new(TapId::new(), weak).into_guard();
        let tap = guard.into_inner();
        assert!(tap.is_some());
        assert!(recorder.untapped.borrow().is_empty());
    }

    #[test]
    fn untap_after_source_dropped_is_noop() {
        let recorder = Rc::new(Recorder::default());
        let weak: Weak<dyn Untap> = Rc::downgrade(&recorder) as Weak<dyn Untap>;
        let tap = Tap::new(TapId::new(), weak);

        drop(recorder);
        tap.untap();
    }
}

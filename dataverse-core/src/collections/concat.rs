//! Concatenation of two derived arrays.
//!
//! Diffs from the left side pass through unchanged. Diffs from the right
//! side are shifted by the left length at the time of the event; that length
//! is tracked incrementally from the left diffs while the concat is observed.
//!
//! A slot reads the left element at its position first. Only when that is
//! out of range does it read the left length and fall through to the right,
//! so slots on the left side never hear about the left length changing.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::array::{ArrayView, DerivedArray};
use super::slots::SlotCache;
use super::splice::SpliceDiff;
use crate::error::Error;
use crate::reactive::{Derivation, Emitter, Tap, Tappable, WeakRuntime};

pub(crate) struct Concat<V> {
    left: DerivedArray<V>,
    right: DerivedArray<V>,
    length: Derivation<usize>,
    slots: SlotCache<usize, V>,
    changes: Emitter<SpliceDiff>,
    runtime: WeakRuntime,
}

impl<V: Clone + 'static> Concat<V> {
    pub(crate) fn build(left: &DerivedArray<V>, right: &DerivedArray<V>) -> DerivedArray<V> {
        let runtime = left.runtime().clone();

        let (left_length, right_length) = (left.length(), right.length());
        let length = runtime.derive(move |t| Ok(t.get(&left_length)? + t.get(&right_length)?));

        let changes = Emitter::new();
        wire_changes(&changes, left, right);

        let concat = Concat {
            left: left.clone(),
            right: right.clone(),
            length,
            slots: SlotCache::new(),
            changes,
            runtime: runtime.clone(),
        };
        DerivedArray::from_view(Rc::new(concat), runtime)
    }
}

/// Forward both sides' diffs while someone listens to `changes`.
fn wire_changes<V: Clone + 'static>(
    changes: &Emitter<SpliceDiff>,
    left: &DerivedArray<V>,
    right: &DerivedArray<V>,
) {
    let taps: Rc<RefCell<Vec<Tap>>> = Rc::default();
    let left_len = Rc::new(Cell::new(0));

    let (out, left, right) = (changes.downgrade(), left.clone(), right.clone());
    let (on_observed_taps, on_observed_len) = (Rc::clone(&taps), Rc::clone(&left_len));
    changes.on_observed(move || {
        on_observed_len.set(left.length().get()?);

        let (out_left, len) = (out.clone(), Rc::clone(&on_observed_len));
        let left_tap = left.changes().tap(move |diff| {
            len.set(diff.apply_len(len.get()));
            out_left.emit(diff);
        })?;

        let (out_right, len) = (out.clone(), Rc::clone(&on_observed_len));
        let right_tap = match right.changes().tap(move |diff| out_right.emit(&diff.shifted(len.get()))) {
            Ok(tap) => tap,
            Err(err) => {
                left_tap.untap();
                return Err(err);
            }
        };

        on_observed_taps.borrow_mut().extend([left_tap, right_tap]);
        Ok(())
    });

    changes.on_unobserved(move || {
        let taps = std::mem::take(&mut *taps.borrow_mut());
        for tap in taps {
            tap.untap();
        }
    });
}

impl<V: Clone + 'static> ArrayView<V> for Concat<V> {
    fn length(&self) -> Derivation<usize> {
        self.length.clone()
    }

    fn index(&self, index: usize) -> Derivation<V> {
        self.slots.get_or_insert_with(&index, || {
            let (left, right) = (self.left.clone(), self.right.clone());
            let (left_length, length) = (self.left.length(), self.length.clone());
            self.runtime.derive(move |t| match t.get(&left.index(index)) {
                Err(past_left @ Error::IndexOutOfRange { .. }) => {
                    let split = t.get(&left_length)?;
                    let Some(offset) = index.checked_sub(split) else {
                        return Err(past_left);
                    };
                    match t.get(&right.index(offset)) {
                        Err(Error::IndexOutOfRange { .. }) => Err(Error::IndexOutOfRange {
                            index,
                            len: t.get_untracked(&length)?,
                        }),
                        read => read,
                    }
                }
                read => read,
            })
        })
    }

    fn changes(&self) -> Tappable<SpliceDiff> {
        self.changes.tappable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Runtime;

    #[test]
    fn concatenates_values() {
        let runtime = Runtime::new();
        let left = runtime.array(vec![1, 2]);
        let right = runtime.array(vec![3, 4]);
        let both = left.as_derived().concat(&right.as_derived());

        assert_eq!(both.to_vec().get().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(both.length().get().unwrap(), 4);
        assert_eq!(both.index(2).get().unwrap(), 3);
    }

    #[test]
    fn right_diffs_are_shifted_by_left_length() {
        let runtime = Runtime::new();
        let left = runtime.array(vec![1, 2]);
        let right = runtime.array(vec![3, 4]);
        let both = left.as_derived().concat(&right.as_derived());

        let diffs = Rc::new(RefCell::new(Vec::new()));
        let diffs_clone = diffs.clone();
        let _tap = both
            .changes()
            .tap(move |diff| diffs_clone.borrow_mut().push(*diff))
            .unwrap()
            .into_guard();

        right.insert(0, 9).unwrap();
        left.push(5).unwrap();
        right.remove(0).unwrap();
        left.remove(0).unwrap();
        right.push(6).unwrap();

        assert_eq!(
            *diffs.borrow(),
            vec![
                SpliceDiff::new(2, 0, 1),
                SpliceDiff::new(2, 0, 1),
                SpliceDiff::new(3, 1, 0),
                SpliceDiff::new(0, 1, 0),
                SpliceDiff::new(4, 0, 1),
            ]
        );
        assert_eq!(both.to_vec().get().unwrap(), vec![2, 5, 3, 4, 6]);
    }

    #[test]
    fn sides_are_tapped_only_while_observed() {
        let runtime = Runtime::new();
        let left = runtime.array(vec![1]);
        let right = runtime.array(vec![2]);
        let both = left.as_derived().concat(&right.as_derived());

        let tap = both.changes().tap(|_| {}).unwrap();
        assert!(left.as_derived().changes().has_tappers());
        assert!(right.as_derived().changes().has_tappers());

        tap.untap();
        assert!(!left.as_derived().changes().has_tappers());
        assert!(!right.as_derived().changes().has_tappers());
    }

    #[test]
    fn hot_slot_follows_the_boundary() {
        let runtime = Runtime::new();
        let left = runtime.array(vec![1, 2]);
        let right = runtime.array(vec![3, 4]);
        let both = left.as_derived().concat(&right.as_derived());

        let slot = both.index(2);
        let _tap = slot.tap(|| {}).unwrap();
        assert_eq!(slot.get().unwrap(), 3);

        left.remove(0).unwrap();
        assert_eq!(slot.get().unwrap(), 4);

        left.insert(0, 0).unwrap();
        left.insert(0, -1).unwrap();
        // [-1, 0, 2] ++ [3, 4]
        assert_eq!(slot.get().unwrap(), 2);
    }

    #[test]
    fn left_slots_do_not_hear_left_length_changes() {
        let runtime = Runtime::new();
        let left = runtime.array(vec![1, 2]);
        let right = runtime.array(vec![3, 4]);
        let both = left.as_derived().concat(&right.as_derived());

        let first = both.index(0);
        let signals = Rc::new(Cell::new(0));
        let signals_clone = signals.clone();
        let _tap = first
            .tap(move || signals_clone.set(signals_clone.get() + 1))
            .unwrap()
            .into_guard();

        left.push(5).unwrap();
        left.insert(1, 9).unwrap();
        right.insert(0, 0).unwrap();
        assert_eq!(signals.get(), 0);
        assert_eq!(first.get().unwrap(), 1);

        left.set(0, 7).unwrap();
        assert_eq!(signals.get(), 1);
        assert_eq!(first.get().unwrap(), 7);
    }

    #[test]
    fn left_slot_falls_through_when_left_shrinks() {
        let runtime = Runtime::new();
        let left = runtime.array(vec![1, 2]);
        let right = runtime.array(vec![3, 4]);
        let both = left.as_derived().concat(&right.as_derived());

        let second = both.index(1);
        let _tap = second.tap(|| {}).unwrap().into_guard();
        assert_eq!(second.get().unwrap(), 2);

        left.remove(0).unwrap();
        assert_eq!(second.get().unwrap(), 3);

        left.clear().unwrap();
        assert_eq!(second.get().unwrap(), 4);

        left.push(8).unwrap();
        left.push(9).unwrap();
        assert_eq!(second.get().unwrap(), 9);
    }

    #[test]
    fn out_of_range_reports_concat_bounds() {
        let runtime = Runtime::new();
        let left = runtime.array(vec![1, 2]);
        let right = runtime.array(vec![3, 4]);
        let both = left.as_derived().concat(&right.as_derived());

        assert!(matches!(
            both.index(5).get(),
            Err(Error::IndexOutOfRange { index: 5, len: 4 })
        ));
        assert!(matches!(
            both.index(4).get(),
            Err(Error::IndexOutOfRange { index: 4, len: 4 })
        ));
    }
}

//! Splice diffs.
//!
//! A [`SpliceDiff`] says that `delete_count` elements starting at
//! `start_index` were replaced by `add_count` new ones. It is always relative
//! to the length *before* the mutation.

use serde::{Deserialize, Serialize};

/// One contiguous replacement in an ordered collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpliceDiff {
    pub start_index: usize,
    pub delete_count: usize,
    pub add_count: usize,
}

impl SpliceDiff {
    pub fn new(start_index: usize, delete_count: usize, add_count: usize) -> Self {
        Self {
            start_index,
            delete_count,
            add_count,
        }
    }

    /// The minimal diff turning `old` into `new`: the span left after
    /// trimming the longest common prefix and suffix.
    pub fn between<V: PartialEq>(old: &[V], new: &[V]) -> Self {
        let prefix = old
            .iter()
            .zip(new.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let max_suffix = old.len().min(new.len()) - prefix;
        let suffix = old
            .iter()
            .rev()
            .zip(new.iter().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();

        Self::new(prefix, old.len() - prefix - suffix, new.len() - prefix - suffix)
    }

    /// Check whether this diff changes nothing.
    pub fn is_noop(&self) -> bool {
        self.delete_count == 0 && self.add_count == 0
    }

    /// The same diff, `offset` positions further right.
    pub fn shifted(&self, offset: usize) -> Self {
        Self {
            start_index: self.start_index + offset,
            ..*self
        }
    }

    /// The collection length after applying this diff to one of `len`.
    pub fn apply_len(&self, len: usize) -> usize {
        self.assert_valid(len);
        len - self.delete_count + self.add_count
    }

    /// Check whether the value at logical position `index` may differ after
    /// this diff.
    ///
    /// A same-size replacement only touches its own span. Anything that
    /// changes the length shifts every later position.
    pub fn touches(&self, index: usize) -> bool {
        if self.delete_count == self.add_count {
            index >= self.start_index && index < self.start_index + self.add_count
        } else {
            index >= self.start_index
        }
    }

    /// # Panics
    ///
    /// If the diff reaches past the end of a collection of length `len`.
    /// That is a bookkeeping bug upstream, never a recoverable condition.
    pub fn assert_valid(&self, len: usize) {
        assert!(
            self.start_index <= len && self.delete_count <= len - self.start_index,
            "splice diff {self:?} out of bounds for length {len}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let diff = SpliceDiff::new(1, 0, 1);
        let json = serde_json::to_string(&diff).unwrap();
        assert_eq!(json, r#"{"startIndex":1,"deleteCount":0,"addCount":1}"#);
    }

    #[test]
    fn between_trims_prefix_and_suffix() {
        assert_eq!(
            SpliceDiff::between(&[10, 20, 30], &[10, 99, 20, 30]),
            SpliceDiff::new(1, 0, 1)
        );
        assert_eq!(SpliceDiff::between(&[1, 2, 3], &[1, 3]), SpliceDiff::new(1, 1, 0));
        assert_eq!(SpliceDiff::between(&[1, 2, 3], &[1, 9, 3]), SpliceDiff::new(1, 1, 1));
        assert_eq!(SpliceDiff::between::<i32>(&[], &[1, 2]), SpliceDiff::new(0, 0, 2));
        assert!(SpliceDiff::between(&[1, 2], &[1, 2]).is_noop());
    }

    #[test]
    fn between_with_repeated_elements_stays_in_bounds() {
        // Prefix and suffix overlap candidates must not double count.
        let diff = SpliceDiff::between(&[1, 1], &[1, 1, 1]);
        assert_eq!(diff, SpliceDiff::new(2, 0, 1));
        diff.assert_valid(2);
    }

    #[test]
    fn touches() {
        let replace = SpliceDiff::new(2, 2, 2);
        assert!(!replace.touches(1));
        assert!(replace.touches(2));
        assert!(replace.touches(3));
        assert!(!replace.touches(4));

        let insert = SpliceDiff::new(2, 0, 1);
        assert!(!insert.touches(1));
        assert!(insert.touches(2));
        assert!(insert.touches(100));
    }

    #[test]
    fn shifted_and_apply_len() {
        let diff = SpliceDiff::new(0, 1, 3);
        assert_eq!(diff.shifted(2), SpliceDiff::new(2, 1, 3));
        assert_eq!(diff.apply_len(4), 6);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn start_past_end_panics() {
        SpliceDiff::new(4, 0, 1).assert_valid(3);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn delete_past_end_panics() {
        SpliceDiff::new(2, 2, 0).assert_valid(3);
    }
}

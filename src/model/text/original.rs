//! Pre-edit views of post-edit text.
//!
//! After a modification only the new text exists, but the updater still needs
//! to look at what the tokens it is about to discard used to contain. An
//! [OriginalText] answers those reads without copying: an index below the
//! removal offset reads straight from the post-edit text, an index inside the
//! removed run reads from the removed slice, and anything after that reads from
//! the post-edit text shifted by the length difference.

use std::sync;

use crate::model::text::CharSequence;

#[derive(Clone)]
pub struct OriginalText<T> {
    post: T,
    remove_offset: usize,
    removed: sync::Arc<[char]>,
    inserted_length: usize,
}

impl<T: CharSequence> OriginalText<T> {
    pub fn new(post: T, remove_offset: usize, removed: impl Into<sync::Arc<[char]>>, inserted_length: usize) -> OriginalText<T> {
        assert!(remove_offset + inserted_length <= post.len(), "inserted run {}+{} does not fit in post-edit text of length {}", remove_offset, inserted_length, post.len());

        OriginalText {
            post,
            remove_offset,
            removed: removed.into(),
            inserted_length,
        }
    }

    /// Length of the text as it was before the edit.
    pub fn length(&self) -> usize {
        self.post.len() - self.inserted_length + self.removed.len()
    }

    pub fn char_at(&self, index: usize) -> char {
        assert!(index < self.length(), "index {} out of bounds for original length {}", index, self.length());

        if index < self.remove_offset {
            self.post.char_at(index)
        } else if index < self.removed_end() {
            self.removed[index - self.remove_offset]
        } else {
            self.post.char_at(index - self.removed.len() + self.inserted_length)
        }
    }

    /// Copies `[start, end)` of the original text, one zone at a time.
    pub fn to_chars(&self, start: usize, end: usize) -> Vec<char> {
        assert!(start <= end && end <= self.length(), "range {}..{} out of bounds for original length {}", start, end, self.length());

        let mut out = Vec::with_capacity(end - start);

        let before_end = end.min(self.remove_offset);
        if start < before_end {
            out.extend(self.post.to_chars(start, before_end));
        }

        let removed_start = start.max(self.remove_offset);
        let removed_end = end.min(self.removed_end());
        if removed_start < removed_end {
            out.extend_from_slice(&self.removed[removed_start - self.remove_offset..removed_end - self.remove_offset]);
        }

        let after_start = start.max(self.removed_end());
        if after_start < end {
            let shift_start = after_start - self.removed.len() + self.inserted_length;
            let shift_end = end - self.removed.len() + self.inserted_length;
            out.extend(self.post.to_chars(shift_start, shift_end));
        }

        out
    }

    pub fn post_edit_text(&self) -> &T {
        &self.post
    }

    pub fn remove_offset(&self) -> usize {
        self.remove_offset
    }

    pub fn removed_slice(&self) -> &[char] {
        &self.removed
    }

    pub fn inserted_length(&self) -> usize {
        self.inserted_length
    }

    fn removed_end(&self) -> usize {
        self.remove_offset + self.removed.len()
    }
}

impl<T: CharSequence> CharSequence for OriginalText<T> {
    fn len(&self) -> usize {
        self.length()
    }

    fn char_at(&self, index: usize) -> char {
        OriginalText::char_at(self, index)
    }

    fn to_chars(&self, start: usize, end: usize) -> Vec<char> {
        OriginalText::to_chars(self, start, end)
    }
}

impl<T> std::fmt::Debug for OriginalText<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginalText")
            .field("remove_offset", &self.remove_offset)
            .field("removed", &self.removed.iter().collect::<String>())
            .field("inserted_length", &self.inserted_length)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::model::text::SubSequence;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    /// Applies the edit to `original` and builds the view back on top of the result.
    fn edit(original: &str, remove_offset: usize, remove_length: usize, inserted: &str) -> OriginalText<Vec<char>> {
        let original = chars(original);
        let mut post = original[..remove_offset].to_vec();
        post.extend(inserted.chars());
        post.extend_from_slice(&original[remove_offset + remove_length..]);

        OriginalText::new(post, remove_offset, original[remove_offset..remove_offset + remove_length].to_vec(), inserted.chars().count())
    }

    fn assert_reconstructs(original: &str, view: &OriginalText<Vec<char>>) {
        let expected = chars(original);
        assert_eq!(view.length(), expected.len());

        for (i, c) in expected.iter().enumerate() {
            assert_eq!(view.char_at(i), *c, "char_at({})", i);
        }

        for i in 0..=expected.len() {
            for j in i..=expected.len() {
                assert_eq!(view.to_chars(i, j), expected[i..j].to_vec(), "to_chars({}, {})", i, j);
            }
        }
    }

    #[test]
    fn remove_prefix_insert_longer() {
        let view = edit("abcdef", 0, 2, "xyz");
        assert_eq!(view.post_edit_text().iter().collect::<String>(), "xyzcdef");
        assert_eq!(view.length(), 6);
        assert_reconstructs("abcdef", &view);
    }

    #[test]
    fn pure_insert_and_pure_remove() {
        assert_reconstructs("abcdef", &edit("abcdef", 3, 0, "123"));
        assert_reconstructs("abcdef", &edit("abcdef", 2, 3, ""));
        assert_reconstructs("abcdef", &edit("abcdef", 6, 0, "tail"));
        assert_reconstructs("abcdef", &edit("abcdef", 0, 6, ""));
    }

    #[test]
    fn empty_texts() {
        let view = edit("", 0, 0, "");
        assert_eq!(view.length(), 0);
        assert_eq!(view.to_chars(0, 0), Vec::<char>::new());

        assert_reconstructs("", &edit("", 0, 0, "inserted"));
        assert_reconstructs("gone", &edit("gone", 0, 4, ""));
    }

    #[test]
    fn ranges_inside_removed_slice() {
        let view = edit("0123456789", 2, 6, "ab");
        assert_eq!(view.to_chars(3, 6), chars("345"));
        assert_eq!(view.to_chars(2, 8), chars("234567"));
        assert_eq!(view.to_chars(4, 4), Vec::<char>::new());
    }

    #[test]
    fn ranges_spanning_all_zones() {
        let view = edit("0123456789", 3, 2, "wxyz");
        assert_eq!(view.to_chars(1, 8), chars("1234567"));
        assert_eq!(view.to_chars(0, 10), chars("0123456789"));
    }

    #[test]
    fn exhaustive_small_edits() {
        let originals = ["", "a", "ab", "abcdef", "héllo wörld"];
        let insertions = ["", "x", "xyz", "ü\n"];

        for original in originals {
            let length = original.chars().count();
            for remove_offset in 0..=length {
                for remove_length in 0..=(length - remove_offset) {
                    for inserted in insertions {
                        let view = edit(original, remove_offset, remove_length, inserted);
                        assert_reconstructs(original, &view);
                        itertools::assert_equal(view.post_edit_text().iter().copied().skip(remove_offset).take(inserted.chars().count()), inserted.chars());
                    }
                }
            }
        }
    }

    #[test]
    fn views_compose_with_windows() {
        let view = edit("abcdefgh", 2, 3, "XY");
        let window = SubSequence::new(&view, 1, 5);
        assert_eq!(window.to_string_range(0, 5), "bcdef");
        assert_eq!(window.char_at(2), 'd');
    }

    #[test]
    #[should_panic]
    fn char_at_past_original_end_panics() {
        edit("abc", 1, 1, "xyz").char_at(3);
    }
}

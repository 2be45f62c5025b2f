//! The text input that token hierarchies are built over.
//!
//! A [TextBuffer] keeps its characters in an [imbl::Vector] behind a
//! `parking_lot` reader/writer lock. Every accepted edit is described by a
//! [Modification] and handed to the registered [ModificationHook]s while the
//! write lock is still held, so nothing can observe the new text before the
//! hooks have caught up with it.

pub mod original;

use std::sync;

use tracing::debug;

use crate::model::versioned;
use crate::model::versioned::Change;

pub use original::OriginalText;

pub type Text = imbl::Vector<char>;

/// Random access to a run of characters. Indexing past the end panics, the
/// same way slice indexing does.
pub trait CharSequence {
    fn len(&self) -> usize;
    fn char_at(&self, index: usize) -> char;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies out the characters in `[start, end)`.
    fn to_chars(&self, start: usize, end: usize) -> Vec<char> {
        assert!(start <= end && end <= self.len(), "range {}..{} out of bounds for length {}", start, end, self.len());
        (start..end).map(|i| self.char_at(i)).collect()
    }

    fn to_string_range(&self, start: usize, end: usize) -> String {
        self.to_chars(start, end).into_iter().collect()
    }
}

impl CharSequence for Text {
    fn len(&self) -> usize {
        imbl::Vector::len(self)
    }

    fn char_at(&self, index: usize) -> char {
        self[index]
    }
}

impl CharSequence for [char] {
    fn len(&self) -> usize {
        <[char]>::len(self)
    }

    fn char_at(&self, index: usize) -> char {
        self[index]
    }

    fn to_chars(&self, start: usize, end: usize) -> Vec<char> {
        self[start..end].to_vec()
    }
}

impl CharSequence for Vec<char> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn char_at(&self, index: usize) -> char {
        self[index]
    }

    fn to_chars(&self, start: usize, end: usize) -> Vec<char> {
        self[start..end].to_vec()
    }
}

impl<T: CharSequence + ?Sized> CharSequence for &T {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn char_at(&self, index: usize) -> char {
        (**self).char_at(index)
    }

    fn to_chars(&self, start: usize, end: usize) -> Vec<char> {
        (**self).to_chars(start, end)
    }
}

/// A window `[start, start + len)` onto another sequence. Embedded token lists
/// see their parent token's content through one of these.
#[derive(Clone, Copy)]
pub struct SubSequence<'a> {
    base: &'a dyn CharSequence,
    start: usize,
    len: usize,
}

impl<'a> SubSequence<'a> {
    pub fn new(base: &'a dyn CharSequence, start: usize, len: usize) -> SubSequence<'a> {
        assert!(start + len <= base.len(), "window {}+{} out of bounds for length {}", start, len, base.len());
        SubSequence { base, start, len }
    }
}

impl<'a> CharSequence for SubSequence<'a> {
    fn len(&self) -> usize {
        self.len
    }

    fn char_at(&self, index: usize) -> char {
        assert!(index < self.len, "index {} out of bounds for length {}", index, self.len);
        self.base.char_at(self.start + index)
    }

    fn to_chars(&self, start: usize, end: usize) -> Vec<char> {
        assert!(start <= end && end <= self.len, "range {}..{} out of bounds for length {}", start, end, self.len);
        self.base.to_chars(self.start + start, self.start + end)
    }
}

impl<'a> std::fmt::Debug for SubSequence<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubSequence")
            .field("start", &self.start)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// One accepted change to a text buffer: `removed` was taken out at `offset`
/// and `inserted` put in its place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Modification {
    offset: usize,
    removed: sync::Arc<[char]>,
    inserted: sync::Arc<[char]>,
}

impl Modification {
    pub fn new(offset: usize, removed: &str, inserted: &str) -> Modification {
        Modification {
            offset,
            removed: removed.chars().collect(),
            inserted: inserted.chars().collect(),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn removed_length(&self) -> usize {
        self.removed.len()
    }

    pub fn inserted_length(&self) -> usize {
        self.inserted.len()
    }

    /// End of the removed region, in pre-edit coordinates.
    pub fn removed_end(&self) -> usize {
        self.offset + self.removed.len()
    }

    /// End of the inserted region, in post-edit coordinates.
    pub fn inserted_end(&self) -> usize {
        self.offset + self.inserted.len()
    }

    pub fn removed_chars(&self) -> &[char] {
        &self.removed
    }

    pub fn inserted_chars(&self) -> &[char] {
        &self.inserted
    }

    pub fn removed_text(&self) -> String {
        self.removed.iter().collect()
    }

    pub fn inserted_text(&self) -> String {
        self.inserted.iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.inserted.is_empty()
    }

    /// Reconstructs the pre-edit text on top of `post`, which must be the text
    /// as it was right after this modification.
    pub fn original_text<T: CharSequence>(&self, post: T) -> OriginalText<T> {
        OriginalText::new(post, self.offset, self.removed.clone(), self.inserted.len())
    }
}

#[derive(Clone, Debug)]
pub enum Edit {
    Insert { offset: usize, text: String },
    Remove { offset: usize, length: usize },
    Replace { offset: usize, length: usize, text: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditError {
    OffsetOutOfBounds { offset: usize, length: usize },
    RangeOutOfBounds { offset: usize, removed: usize, length: usize },
}

impl std::fmt::Display for EditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditError::OffsetOutOfBounds { offset, length } => write!(f, "edit offset {} is past the end of a {}-character text", offset, length),
            EditError::RangeOutOfBounds { offset, removed, length } => write!(f, "cannot remove {} characters at {} from a {}-character text", removed, offset, length),
        }
    }
}

impl std::error::Error for EditError {}

impl Edit {
    fn parts(&self) -> (usize, usize, &str) {
        match self {
            Edit::Insert { offset, text } => (*offset, 0, text.as_str()),
            Edit::Remove { offset, length } => (*offset, *length, ""),
            Edit::Replace { offset, length, text } => (*offset, *length, text.as_str()),
        }
    }
}

impl versioned::Change<Text> for Edit {
    type ApplyError = EditError;
    type ApplyRecord = Modification;

    fn apply(self, text: &mut Text) -> Result<(Edit, Modification), EditError> {
        let (offset, length, inserted) = self.parts();
        let text_length = CharSequence::len(&*text);

        if offset > text_length {
            return Err(EditError::OffsetOutOfBounds { offset, length: text_length });
        }

        match offset.checked_add(length) {
            Some(end) if end <= text_length => {},
            _ => return Err(EditError::RangeOutOfBounds { offset, removed: length, length: text_length }),
        }

        /* Preconditions passed; split out the removed run and stitch the new text in. */
        let mut removed = text.split_off(offset);
        let after = removed.split_off(length);
        text.extend(inserted.chars());
        text.append(after);

        let modification = Modification {
            offset,
            removed: removed.iter().copied().collect(),
            inserted: inserted.chars().collect(),
        };

        Ok((self, modification))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct HookId(u64);

/// Called synchronously inside the buffer's write critical section after every
/// non-empty modification. `text` is the post-edit text.
pub trait ModificationHook: Send + Sync {
    fn text_modified(&self, text: &Text, modification: &Modification);
}

/// A shared read lock on a buffer's text. Holding one keeps every writer out,
/// so a burst of cursor operations sees one consistent token structure.
pub struct TextReadGuard<'a>(parking_lot::RwLockReadGuard<'a, Text>);

impl<'a> std::ops::Deref for TextReadGuard<'a> {
    type Target = Text;

    fn deref(&self) -> &Text {
        &self.0
    }
}

pub struct TextBuffer {
    uid: u64,
    text: parking_lot::RwLock<Text>,
    hooks: parking_lot::Mutex<Vec<(HookId, sync::Weak<dyn ModificationHook>)>>,
}

impl TextBuffer {
    pub fn new(initial: &str) -> TextBuffer {
        TextBuffer {
            uid: versioned::next_uid(),
            text: parking_lot::RwLock::new(initial.chars().collect()),
            hooks: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Stable identity for this buffer, used as the registry key.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Takes a shared read lock. Recursive, so code already holding one can
    /// call into cursors that take their own.
    pub fn read(&self) -> TextReadGuard<'_> {
        TextReadGuard(self.text.read_recursive())
    }

    pub fn len(&self) -> usize {
        CharSequence::len(&*self.read())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contents(&self) -> String {
        self.read().iter().collect()
    }

    pub fn apply(&self, edit: Edit) -> Result<Modification, EditError> {
        let mut text = self.text.write();
        let (_, modification) = edit.apply(&mut *text)?;

        if modification.is_empty() {
            return Ok(modification);
        }

        debug!(buffer = self.uid, offset = modification.offset(), removed = modification.removed_length(), inserted = modification.inserted_length(), "text modified");

        for hook in self.live_hooks() {
            hook.text_modified(&text, &modification);
        }

        Ok(modification)
    }

    pub fn insert(&self, offset: usize, text: &str) -> Result<Modification, EditError> {
        self.apply(Edit::Insert { offset, text: text.to_string() })
    }

    pub fn remove(&self, offset: usize, length: usize) -> Result<Modification, EditError> {
        self.apply(Edit::Remove { offset, length })
    }

    pub fn replace(&self, offset: usize, length: usize, text: &str) -> Result<Modification, EditError> {
        self.apply(Edit::Replace { offset, length, text: text.to_string() })
    }

    /// Runs `f` with the write lock held but without changing the text.
    pub fn exclusive<R>(&self, f: impl FnOnce(&Text) -> R) -> R {
        let text = self.text.write();
        f(&text)
    }

    pub fn add_hook(&self, hook: sync::Weak<dyn ModificationHook>) -> HookId {
        let id = HookId(versioned::next_uid());
        self.hooks.lock().push((id, hook));
        id
    }

    pub fn remove_hook(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.lock();
        let before = hooks.len();
        hooks.retain(|(hook_id, _)| *hook_id != id);
        hooks.len() != before
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.lock().iter().filter(|(_, hook)| hook.strong_count() > 0).count()
    }

    fn live_hooks(&self) -> Vec<sync::Arc<dyn ModificationHook>> {
        let mut hooks = self.hooks.lock();
        hooks.retain(|(_, hook)| hook.strong_count() > 0);
        hooks.iter().filter_map(|(_, hook)| hook.upgrade()).collect()
    }
}

impl std::fmt::Debug for TextBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextBuffer")
            .field("uid", &self.uid)
            .field("length", &self.len())
            .finish_non_exhaustive()
    }
}

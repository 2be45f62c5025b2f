use std::sync;

use crate::model::text::Modification;
use crate::model::text::OriginalText;
use crate::model::text::Text;
use crate::model::token::TokenInfo;
use crate::model::versioned::Stamp;

/// One contiguous replacement inside one token list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenChange<K> {
    /// Indices of the embedding tokens leading from the root list to the list
    /// that changed. Empty for the root list.
    pub path: Vec<usize>,
    /// Index of the first replaced token in that list.
    pub index: usize,
    /// The replaced tokens, with offsets in the pre-edit text.
    pub removed: Vec<TokenInfo<K>>,
    /// The replacement tokens, with offsets in the post-edit text.
    pub added: Vec<TokenInfo<K>>,
    /// Offset of the replaced run in the post-edit text.
    pub start_offset: usize,
    pub full_rebuild: bool,
}

impl<K> TokenChange<K> {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    pub fn added_count(&self) -> usize {
        self.added.len()
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// End of the added run in the post-edit text.
    pub fn end_offset(&self) -> usize {
        self.start_offset + self.added.iter().map(|t| t.length).sum::<usize>()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventCause {
    Modification(Modification),
    Rebuild,
}

/// Everything that happened to a hierarchy's tokens as the result of one
/// edit or rebuild. Root-level changes come before the embedded changes they
/// caused.
#[derive(Clone, Debug)]
pub struct TokenHierarchyEvent<K> {
    pub stamp: Stamp,
    pub cause: EventCause,
    pub changes: Vec<TokenChange<K>>,
    original: Option<OriginalText<Text>>,
}

impl<K> TokenHierarchyEvent<K> {
    pub(crate) fn new(stamp: Stamp, cause: EventCause, changes: Vec<TokenChange<K>>, original: Option<OriginalText<Text>>) -> Self {
        TokenHierarchyEvent { stamp, cause, changes, original }
    }

    /// The pre-edit text, for edit-caused events.
    pub fn original_text(&self) -> Option<&OriginalText<Text>> {
        self.original.as_ref()
    }

    pub fn modification(&self) -> Option<&Modification> {
        match &self.cause {
            EventCause::Modification(modification) => Some(modification),
            EventCause::Rebuild => None,
        }
    }

    pub fn is_full_rebuild(&self) -> bool {
        self.changes.iter().any(|change| change.full_rebuild && change.path.is_empty())
    }

    /// Smallest post-edit range covering every change, or `None` if nothing
    /// changed.
    pub fn affected_range(&self) -> Option<(usize, usize)> {
        self.changes.iter().fold(None, |range, change| {
            let (start, end) = (change.start_offset, change.end_offset());
            Some(match range {
                None => (start, end),
                Some((s, e)) => (s.min(start), e.max(end)),
            })
        })
    }
}

/// Receives events synchronously, while the text is still write-locked.
/// Implementations must not touch the buffer or the hierarchy from inside
/// `token_hierarchy_changed`; they can only look at the event.
pub trait TokenHierarchyListener<K>: Send + Sync {
    fn token_hierarchy_changed(&self, event: &TokenHierarchyEvent<K>);
}

impl<K, F: Fn(&TokenHierarchyEvent<K>) + Send + Sync> TokenHierarchyListener<K> for F {
    fn token_hierarchy_changed(&self, event: &TokenHierarchyEvent<K>) {
        self(event)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ListenerId(pub(crate) u64);

pub(crate) type ListenerList<K> = Vec<(ListenerId, sync::Arc<dyn TokenHierarchyListener<K>>)>;

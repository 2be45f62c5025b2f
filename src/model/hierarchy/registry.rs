use std::collections::HashMap;
use std::sync;

use tracing::debug;

use crate::logic::lexer::LanguageRef;
use crate::model::hierarchy::TokenHierarchy;
use crate::model::text::TextBuffer;
use crate::model::token::TokenKind;

/// Hands out at most one hierarchy per buffer.
pub struct HierarchyRegistry<K: TokenKind> {
    hierarchies: parking_lot::Mutex<HashMap<u64, sync::Arc<TokenHierarchy<K>>>>,
}

impl<K: TokenKind> HierarchyRegistry<K> {
    pub fn new() -> HierarchyRegistry<K> {
        HierarchyRegistry {
            hierarchies: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Returns the buffer's hierarchy, creating one with `language` if there
    /// isn't one yet.
    pub fn get_or_create(&self, buffer: &sync::Arc<TextBuffer>, language: impl FnOnce() -> LanguageRef<K>) -> sync::Arc<TokenHierarchy<K>> {
        self.hierarchies.lock().entry(buffer.uid()).or_insert_with(|| {
            debug!(buffer = buffer.uid(), "registering token hierarchy");
            TokenHierarchy::new(buffer.clone(), language())
        }).clone()
    }

    pub fn get(&self, buffer: &TextBuffer) -> Option<sync::Arc<TokenHierarchy<K>>> {
        self.hierarchies.lock().get(&buffer.uid()).cloned()
    }

    /// Disposes of the buffer's hierarchy and forgets it. Returns false if
    /// there wasn't one.
    pub fn dispose(&self, buffer: &TextBuffer) -> bool {
        /* don't hold the registry lock while disposing; that takes the text lock */
        let removed = self.hierarchies.lock().remove(&buffer.uid());
        match removed {
            Some(hierarchy) => {
                hierarchy.dispose();
                true
            },
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.hierarchies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: TokenKind> Default for HierarchyRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: TokenKind> std::fmt::Debug for HierarchyRegistry<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyRegistry")
            .field("hierarchies", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::lang::calc;
    use crate::lang::calc::CalcKind;
    use crate::model::hierarchy::Error;

    #[test]
    fn one_hierarchy_per_buffer() {
        let registry: HierarchyRegistry<CalcKind> = HierarchyRegistry::new();
        let a = sync::Arc::new(TextBuffer::new("a"));
        let b = sync::Arc::new(TextBuffer::new("b"));

        let first = registry.get_or_create(&a, calc::language);
        let again = registry.get_or_create(&a, || panic!("should not create a second hierarchy"));
        assert!(sync::Arc::ptr_eq(&first, &again));

        let other = registry.get_or_create(&b, calc::language);
        assert!(!sync::Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);

        assert!(sync::Arc::ptr_eq(&registry.get(&a).unwrap(), &first));
        assert_eq!(a.hook_count(), 1);
    }

    #[test]
    fn dispose_forgets_and_detaches() {
        let registry: HierarchyRegistry<CalcKind> = HierarchyRegistry::new();
        let buffer = sync::Arc::new(TextBuffer::new("a + b"));
        let hierarchy = registry.get_or_create(&buffer, calc::language);
        hierarchy.tokens().unwrap();

        assert!(registry.dispose(&buffer));
        assert!(!registry.dispose(&buffer));
        assert!(registry.get(&buffer).is_none());
        assert!(registry.is_empty());
        assert_eq!(buffer.hook_count(), 0);
        assert_eq!(hierarchy.tokens(), Err(Error::Disposed));

        /* a fresh one can be registered afterwards */
        let replacement = registry.get_or_create(&buffer, calc::language);
        assert!(!sync::Arc::ptr_eq(&hierarchy, &replacement));
        assert_eq!(replacement.tokens().unwrap().len(), 5);
    }
}

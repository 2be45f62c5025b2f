//! A token hierarchy keeps one text buffer lexed.
//!
//! The hierarchy hooks itself into its [TextBuffer] and updates its token
//! lists inside the buffer's write critical section, so a reader holding the
//! text read lock always sees tokens that match the text. Listeners are called
//! at the same point, in registration order, before the write lock is
//! released.
//!
//! Locks are always taken text first, then the token lists. Cursors capture the
//! hierarchy stamp when they are created and refuse to work once it has moved
//! on.

pub mod event;
pub mod registry;
pub mod sequence;

use std::future;
use std::pin;
use std::sync;
use std::sync::atomic;
use std::task;

use tracing::debug;
use tracing::error;
use tracing::instrument;
use tracing::trace;

use crate::config;
use crate::logic::lexer::LanguageRef;
use crate::logic::lexer::LexerError;
use crate::logic::updater;
use crate::logic::updater::ListContext;
use crate::logic::updater::LocalEdit;
use crate::logic::updater::TokenListUpdater;
use crate::model::text::HookId;
use crate::model::text::Modification;
use crate::model::text::ModificationHook;
use crate::model::text::Text;
use crate::model::text::TextBuffer;
use crate::model::token::Token;
use crate::model::token::TokenInfo;
use crate::model::token::TokenKind;
use crate::model::token::TokenList;
use crate::model::versioned::AtomicStamp;
use crate::model::versioned::Stamp;
use crate::util;

pub use event::EventCause;
pub use event::ListenerId;
pub use event::TokenChange;
pub use event::TokenHierarchyEvent;
pub use event::TokenHierarchyListener;
pub use registry::HierarchyRegistry;
pub use sequence::TokenSequence;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The hierarchy changed after the cursor was created.
    StaleCursor { captured: Stamp, current: Stamp },
    Disposed,
    Lexer(LexerError),
}

impl From<LexerError> for Error {
    fn from(e: LexerError) -> Self {
        Error::Lexer(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::StaleCursor { captured, current } => write!(f, "token sequence from generation {} used after the hierarchy moved to generation {}", captured.generation(), current.generation()),
            Error::Disposed => write!(f, "token hierarchy has been disposed"),
            Error::Lexer(e) => write!(f, "lexer failed: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Lexer(e) => Some(e),
            _ => None,
        }
    }
}

enum Root<K: TokenKind> {
    /// Nobody has asked for tokens yet.
    Unbuilt,
    Built(TokenList<K>),
    /// The lexer broke its contract. Stays this way until [TokenHierarchy::rebuild].
    Broken(LexerError),
    Disposed,
}

pub struct TokenHierarchy<K: TokenKind> {
    buffer: sync::Arc<TextBuffer>,
    language: LanguageRef<K>,
    config: Option<sync::Arc<config::Config>>,

    root: parking_lot::RwLock<Root<K>>,
    stamp: AtomicStamp,
    disposed: atomic::AtomicBool,

    hook: parking_lot::Mutex<Option<HookId>>,
    listeners: parking_lot::Mutex<event::ListenerList<K>>,
    next_listener: atomic::AtomicU64,
    notifier: util::Notifier,
}

impl<K: TokenKind> TokenHierarchy<K> {
    /// Creates a hierarchy over `buffer`. Tokens are not lexed until first needed.
    pub fn new(buffer: sync::Arc<TextBuffer>, language: LanguageRef<K>) -> sync::Arc<Self> {
        Self::create(buffer, language, None)
    }

    /// Like [TokenHierarchy::new], but ignores the process-wide configuration
    /// in favor of `config`.
    pub fn with_config(buffer: sync::Arc<TextBuffer>, language: LanguageRef<K>, config: sync::Arc<config::Config>) -> sync::Arc<Self> {
        Self::create(buffer, language, Some(config))
    }

    fn create(buffer: sync::Arc<TextBuffer>, language: LanguageRef<K>, config: Option<sync::Arc<config::Config>>) -> sync::Arc<Self> {
        let hierarchy = sync::Arc::new(TokenHierarchy {
            buffer,
            language,
            config,
            root: parking_lot::RwLock::new(Root::Unbuilt),
            stamp: AtomicStamp::new(),
            disposed: atomic::AtomicBool::new(false),
            hook: parking_lot::Mutex::new(None),
            listeners: parking_lot::Mutex::new(Vec::new()),
            next_listener: atomic::AtomicU64::new(1),
            notifier: util::Notifier::new(),
        });

        let hook: sync::Weak<dyn ModificationHook> = sync::Arc::downgrade(&hierarchy) as sync::Weak<dyn ModificationHook>;
        *hierarchy.hook.lock() = Some(hierarchy.buffer.add_hook(hook));

        debug!(buffer = hierarchy.buffer.uid(), language = hierarchy.language.name(), "created token hierarchy");
        hierarchy
    }

    pub fn buffer(&self) -> &sync::Arc<TextBuffer> {
        &self.buffer
    }

    pub fn language(&self) -> &LanguageRef<K> {
        &self.language
    }

    pub fn stamp(&self) -> Stamp {
        self.stamp.load()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(atomic::Ordering::Acquire)
    }

    pub fn is_built(&self) -> bool {
        matches!(*self.root.read_recursive(), Root::Built(_))
    }

    pub fn config(&self) -> sync::Arc<config::Config> {
        match &self.config {
            Some(config) => config.clone(),
            None => config::get(),
        }
    }

    /// A cursor over the root token list, positioned before the first token.
    pub fn token_sequence(self: &sync::Arc<Self>) -> Result<TokenSequence<K>, Error> {
        let text = self.buffer.read();
        self.check_disposed()?;
        self.root_list(&text)?;
        Ok(TokenSequence::new(self.clone(), self.stamp.load()))
    }

    /// Snapshots the root token list.
    pub fn tokens(&self) -> Result<Vec<TokenInfo<K>>, Error> {
        let text = self.buffer.read();
        self.check_disposed()?;
        Ok(self.root_list(&text)?.infos(0))
    }

    pub fn add_listener(&self, listener: impl TokenHierarchyListener<K> + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, atomic::Ordering::Relaxed));
        self.listeners.lock().push((id, sync::Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Discards every token list and lexes the whole text again, notifying
    /// listeners with a single full-rebuild change. Must not be called from a
    /// listener.
    #[instrument(skip_all, fields(buffer = self.buffer.uid()))]
    pub fn rebuild(&self) -> Result<(), Error> {
        let result = self.buffer.exclusive(|text| {
            let event = {
                let mut root = self.root.write();
                if let Root::Disposed = &*root {
                    return Err(Error::Disposed);
                }

                let stamp = self.stamp.advance();
                let removed = match &*root {
                    Root::Built(list) => list.infos(0),
                    _ => Vec::new(),
                };

                match updater::lex_all(&self.language, text, stamp.generation()) {
                    Ok(list) => {
                        let change = TokenChange {
                            path: Vec::new(),
                            index: 0,
                            removed,
                            added: list.infos(0),
                            start_offset: 0,
                            full_rebuild: true,
                        };
                        *root = Root::Built(list);
                        TokenHierarchyEvent::new(stamp, EventCause::Rebuild, vec![change], None)
                    },
                    Err(error) => {
                        error!(%error, "lexer failed during rebuild");
                        *root = Root::Broken(error.clone());
                        return Err(Error::Lexer(error));
                    },
                }
            };

            self.dispatch(&event);
            Ok(())
        });

        self.notifier.notify();
        result
    }

    /// Detaches from the buffer and drops every token. Every later query fails
    /// with [Error::Disposed]. Must not be called from a listener.
    pub fn dispose(&self) {
        if let Some(id) = self.hook.lock().take() {
            self.buffer.remove_hook(id);
        }

        self.buffer.exclusive(|_| {
            *self.root.write() = Root::Disposed;
            self.disposed.store(true, atomic::Ordering::Release);
            self.stamp.advance();
        });

        debug!(buffer = self.buffer.uid(), "disposed token hierarchy");
        self.notifier.notify();
    }

    /// Resolves once the hierarchy stamp differs from `stamp`.
    pub fn wait_for_update(&self, stamp: Stamp) -> UpdateFuture<'_, K> {
        UpdateFuture {
            hierarchy: self,
            stamp,
        }
    }

    /// Resolves the list at `path` and runs `f` on it, all under the text read
    /// lock, provided `stamp` is still current.
    pub(crate) fn with_list<R>(&self, stamp: Stamp, path: &[usize], f: impl FnOnce(&TokenList<K>, &Text) -> Result<R, Error>) -> Result<R, Error> {
        let text = self.buffer.read();
        self.check_disposed()?;

        let current = self.stamp.load();
        if stamp.is_outdated(&current) {
            return Err(Error::StaleCursor { captured: stamp, current });
        }

        let root = self.root_list(&text)?;
        let mut list: &TokenList<K> = &root;
        for &index in path {
            list = list.get(index).and_then(Token::embedded).ok_or(Error::StaleCursor { captured: stamp, current })?;
        }

        f(list, &text)
    }

    fn check_disposed(&self) -> Result<(), Error> {
        if self.is_disposed() {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    /// The root list, lexing it first if necessary. The caller must hold the
    /// text read lock that `text` came from.
    fn root_list(&self, text: &Text) -> Result<parking_lot::MappedRwLockReadGuard<'_, TokenList<K>>, Error> {
        let mut guard = self.root.read_recursive();

        if matches!(*guard, Root::Unbuilt) {
            drop(guard);
            let mut write = self.root.write();
            if matches!(*write, Root::Unbuilt) {
                *write = self.lex_root(text);
            }
            guard = parking_lot::RwLockWriteGuard::downgrade(write);
        }

        parking_lot::RwLockReadGuard::try_map(guard, |root| match root {
            Root::Built(list) => Some(list),
            _ => None,
        }).map_err(|guard| match &*guard {
            Root::Broken(error) => Error::Lexer(error.clone()),
            _ => Error::Disposed,
        })
    }

    fn lex_root(&self, text: &Text) -> Root<K> {
        match updater::lex_all(&self.language, text, self.stamp.load().generation()) {
            Ok(list) => {
                debug!(tokens = list.len(), "lexed root token list");
                Root::Built(list)
            },
            Err(error) => {
                error!(%error, "lexer failed");
                Root::Broken(error)
            },
        }
    }

    #[instrument(skip_all, fields(buffer = self.buffer.uid(), offset = modification.offset()))]
    fn update(&self, text: &Text, modification: &Modification) -> Option<TokenHierarchyEvent<K>> {
        let mut root = self.root.write();
        if let Root::Disposed = &*root {
            return None;
        }

        let stamp = self.stamp.advance();
        let Root::Built(list) = &mut *root else {
            /* nothing lexed yet (or the lexer is broken); the stamp bump is all there is to do */
            return None;
        };

        let config = self.config();
        let original = modification.original_text(text.clone());
        let mut updater = TokenListUpdater::new(&config, stamp.generation());

        match updater.update(list, text, &original, LocalEdit::from(modification), &ListContext::root()) {
            Ok(()) => Some(TokenHierarchyEvent::new(stamp, EventCause::Modification(modification.clone()), updater.into_changes(), Some(original))),
            Err(error) => {
                error!(%error, "lexer failed while updating tokens");
                *root = Root::Broken(error);
                None
            },
        }
    }

    fn dispatch(&self, event: &TokenHierarchyEvent<K>) {
        /* snapshot, so a listener can add or remove listeners without deadlocking */
        let listeners: Vec<sync::Arc<dyn TokenHierarchyListener<K>>> = self.listeners.lock().iter().map(|(_, listener)| listener.clone()).collect();

        trace!(listeners = listeners.len(), changes = event.changes.len(), "dispatching token hierarchy event");
        for listener in listeners {
            listener.token_hierarchy_changed(event);
        }
    }
}

impl<K: TokenKind> ModificationHook for TokenHierarchy<K> {
    fn text_modified(&self, text: &Text, modification: &Modification) {
        if let Some(event) = self.update(text, modification) {
            self.dispatch(&event);
        }
        self.notifier.notify();
    }
}

impl<K: TokenKind> Drop for TokenHierarchy<K> {
    fn drop(&mut self) {
        if let Some(id) = self.hook.get_mut().take() {
            self.buffer.remove_hook(id);
        }
    }
}

impl<K: TokenKind> std::fmt::Debug for TokenHierarchy<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenHierarchy")
            .field("buffer", &self.buffer.uid())
            .field("language", &self.language.name())
            .field("stamp", &self.stamp.load())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

pub struct UpdateFuture<'a, K: TokenKind> {
    hierarchy: &'a TokenHierarchy<K>,
    stamp: Stamp,
}

impl<'a, K: TokenKind> future::Future for UpdateFuture<'a, K> {
    type Output = Stamp;

    fn poll(self: pin::Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Stamp> {
        let current = self.hierarchy.stamp.load();
        if current.is_outdated(&self.stamp) {
            return task::Poll::Ready(current);
        }

        self.hierarchy.notifier.enroll(cx);

        /* check whether we were updated while we were enrolling */
        let current = self.hierarchy.stamp.load();
        if current.is_outdated(&self.stamp) {
            task::Poll::Ready(current)
        } else {
            task::Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use crate::lang::calc;
    use crate::lang::calc::CalcKind;
    use crate::model::text::CharSequence;

    fn setup(source: &str) -> (sync::Arc<TextBuffer>, sync::Arc<TokenHierarchy<CalcKind>>) {
        let buffer = sync::Arc::new(TextBuffer::new(source));
        let hierarchy = TokenHierarchy::new(buffer.clone(), calc::language());
        (buffer, hierarchy)
    }

    fn shape(tokens: &[TokenInfo<CalcKind>]) -> Vec<(CalcKind, usize, usize)> {
        tokens.iter().map(|t| (t.kind, t.offset, t.length)).collect()
    }

    fn fresh_shape(buffer: &TextBuffer) -> Vec<(CalcKind, usize, usize)> {
        let text = buffer.read();
        shape(&updater::lex_all(&calc::language(), &*text, 0).unwrap().infos(0))
    }

    #[test]
    fn is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TokenHierarchy<CalcKind>>();
        assert_send_sync::<TokenSequence<CalcKind>>();
    }

    #[test]
    fn lexes_lazily() {
        let (buffer, hierarchy) = setup("a + b");
        assert!(!hierarchy.is_built());

        /* edits before the first query only move the stamp */
        let before = hierarchy.stamp();
        buffer.insert(0, "z").unwrap();
        assert!(before.is_outdated(&hierarchy.stamp()));
        assert!(!hierarchy.is_built());

        assert_eq!(shape(&hierarchy.tokens().unwrap()), fresh_shape(&buffer));
        assert!(hierarchy.is_built());
    }

    #[test]
    fn edits_update_tokens_and_notify_in_order() {
        let (buffer, hierarchy) = setup("abc+uv-xy");
        let before = hierarchy.tokens().unwrap();

        let log = sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let first = log.clone();
        hierarchy.add_listener(move |event: &TokenHierarchyEvent<CalcKind>| {
            first.lock().push(("first", event.stamp, event.changes.clone()));
        });
        let second = log.clone();
        hierarchy.add_listener(move |event: &TokenHierarchyEvent<CalcKind>| {
            second.lock().push(("second", event.stamp, event.changes.clone()));
        });

        buffer.insert(3, "x").unwrap();
        let after = hierarchy.tokens().unwrap();
        assert_eq!(shape(&after), fresh_shape(&buffer));

        let log = log.lock();
        assert_eq!(log.iter().map(|(name, _, _)| *name).collect::<Vec<_>>(), vec!["first", "second"]);
        assert_eq!(log[0].1, hierarchy.stamp());

        let changes = &log[0].2;
        assert_eq!(changes.len(), 1);
        assert_eq!((changes[0].index, changes[0].removed_count(), changes[0].added_count()), (0, 2, 2));
        assert_eq!(changes[0].removed[0].id, before[0].id);
        assert_eq!(changes[0].added[0].id, after[0].id);
        assert_eq!(after[2..].iter().map(|t| t.id).collect::<Vec<_>>(), before[2..].iter().map(|t| t.id).collect::<Vec<_>>());
    }

    #[test]
    fn events_carry_original_text() {
        let (buffer, hierarchy) = setup("one two");
        hierarchy.tokens().unwrap();

        let seen = sync::Arc::new(parking_lot::Mutex::new(None));
        let seen_clone = seen.clone();
        hierarchy.add_listener(move |event: &TokenHierarchyEvent<CalcKind>| {
            let original = event.original_text().unwrap();
            *seen_clone.lock() = Some((original.to_string_range(0, original.length()), event.modification().cloned()));
        });

        buffer.replace(4, 3, "three").unwrap();
        let seen = seen.lock();
        let (original, modification) = seen.as_ref().unwrap();
        assert_eq!(original, "one two");
        assert_eq!(modification.as_ref().unwrap().inserted_text(), "three");
    }

    #[test]
    fn removed_listeners_stop_hearing() {
        let (buffer, hierarchy) = setup("a");
        hierarchy.tokens().unwrap();

        let count = sync::Arc::new(atomic::AtomicUsize::new(0));
        let count_clone = count.clone();
        let id = hierarchy.add_listener(move |_: &TokenHierarchyEvent<CalcKind>| {
            count_clone.fetch_add(1, atomic::Ordering::SeqCst);
        });

        buffer.insert(1, "b").unwrap();
        assert!(hierarchy.remove_listener(id));
        assert!(!hierarchy.remove_listener(id));
        buffer.insert(2, "c").unwrap();

        assert_eq!(count.load(atomic::Ordering::SeqCst), 1);
        assert_eq!(hierarchy.listener_count(), 0);
    }

    #[test]
    fn cursors_go_stale_after_edits() {
        let (buffer, hierarchy) = setup("a + b");
        let mut sequence = hierarchy.token_sequence().unwrap();
        assert!(sequence.move_next().unwrap());

        buffer.insert(0, "x").unwrap();
        assert_matches!(sequence.move_next(), Err(Error::StaleCursor { .. }));
        assert_matches!(sequence.token(), Err(Error::StaleCursor { .. }));
        assert!(!sequence.is_valid());

        let mut fresh = hierarchy.token_sequence().unwrap();
        assert!(fresh.move_next().unwrap());
        assert_eq!(fresh.token().unwrap().unwrap().length, 2);
    }

    #[test]
    fn rebuild_replaces_everything() {
        let (_buffer, hierarchy) = setup("a + b");
        let before = hierarchy.tokens().unwrap();
        let sequence = hierarchy.token_sequence().unwrap();

        let events = sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let events_clone = events.clone();
        hierarchy.add_listener(move |event: &TokenHierarchyEvent<CalcKind>| {
            events_clone.lock().push(event.clone());
        });

        hierarchy.rebuild().unwrap();
        let after = hierarchy.tokens().unwrap();
        assert_eq!(shape(&after), shape(&before));
        assert!(after.iter().zip(before.iter()).all(|(a, b)| a.id != b.id));

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].cause, EventCause::Rebuild);
        assert!(events[0].is_full_rebuild());
        assert_eq!(events[0].changes[0].removed_count(), 5);
        assert_eq!(events[0].changes[0].added_count(), 5);

        assert!(!sequence.is_valid());
    }

    #[test]
    fn dispose_detaches() {
        let (buffer, hierarchy) = setup("a + b");
        hierarchy.tokens().unwrap();
        let sequence = hierarchy.token_sequence().unwrap();
        assert_eq!(buffer.hook_count(), 1);

        hierarchy.dispose();
        assert!(hierarchy.is_disposed());
        assert_eq!(buffer.hook_count(), 0);
        assert_matches!(hierarchy.tokens(), Err(Error::Disposed));
        assert_matches!(hierarchy.token_sequence(), Err(Error::Disposed));
        assert_matches!(sequence.token_count(), Err(Error::Disposed));
        assert_matches!(hierarchy.rebuild(), Err(Error::Disposed));

        buffer.insert(0, "still editable").unwrap();
    }

    #[test]
    fn dropping_hierarchy_unhooks() {
        let (buffer, hierarchy) = setup("a");
        assert_eq!(buffer.hook_count(), 1);
        drop(hierarchy);
        assert_eq!(buffer.hook_count(), 0);
    }

    #[test]
    fn update_future_resolves_after_edit() {
        use std::future::Future;

        let (buffer, hierarchy) = setup("a");
        let stamp = hierarchy.stamp();
        let mut future = Box::pin(hierarchy.wait_for_update(stamp));

        let waker = futures::task::noop_waker();
        let mut cx = task::Context::from_waker(&waker);
        assert!(future.as_mut().poll(&mut cx).is_pending());
        assert_eq!(hierarchy.notifier.enrolled(), 1);

        buffer.insert(0, "b").unwrap();
        assert_eq!(future.as_mut().poll(&mut cx), task::Poll::Ready(hierarchy.stamp()));
    }

    #[test]
    fn block_on_update_from_another_thread() {
        let (buffer, hierarchy) = setup("a");
        let stamp = hierarchy.stamp();

        thread::scope(|scope| {
            scope.spawn(|| buffer.insert(1, "b").unwrap());
            let updated = futures::executor::block_on(hierarchy.wait_for_update(stamp));
            assert!(stamp.is_outdated(&updated));
        });
    }

    #[test]
    fn per_hierarchy_config() {
        let buffer = sync::Arc::new(TextBuffer::new("abc+uv-xy"));
        let config = sync::Arc::new(config::Config::default().with(config::Change::relex_limit(1)));
        let hierarchy = TokenHierarchy::with_config(buffer.clone(), calc::language(), config);
        hierarchy.tokens().unwrap();

        let full = sync::Arc::new(atomic::AtomicBool::new(false));
        let full_clone = full.clone();
        hierarchy.add_listener(move |event: &TokenHierarchyEvent<CalcKind>| {
            full_clone.store(event.is_full_rebuild(), atomic::Ordering::SeqCst);
        });

        buffer.insert(3, "x").unwrap();
        assert!(full.load(atomic::Ordering::SeqCst));
        assert_eq!(shape(&hierarchy.tokens().unwrap()), fresh_shape(&buffer));
    }

    #[test]
    fn readers_run_alongside_a_writer() {
        let (buffer, hierarchy) = setup("alpha + beta * (gamma - 12.5) // note\n");
        hierarchy.tokens().unwrap();

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let mut sequence = match hierarchy.token_sequence() {
                            Ok(sequence) => sequence,
                            Err(e) => panic!("unexpected error: {}", e),
                        };

                        let mut last_end = 0;
                        loop {
                            match sequence.move_next() {
                                Ok(true) => {},
                                Ok(false) => break,
                                Err(Error::StaleCursor { .. }) => break,
                                Err(e) => panic!("unexpected error: {}", e),
                            }

                            match sequence.token() {
                                Ok(Some(token)) => {
                                    assert_eq!(token.offset, last_end);
                                    last_end = token.end();
                                },
                                Ok(None) => unreachable!(),
                                Err(Error::StaleCursor { .. }) => break,
                                Err(e) => panic!("unexpected error: {}", e),
                            }
                        }
                    }
                });
            }

            scope.spawn(|| {
                for i in 0..100 {
                    if i % 2 == 0 {
                        buffer.insert(6, "x ").unwrap();
                    } else {
                        buffer.remove(6, 2).unwrap();
                    }
                }
            });
        });

        assert_eq!(shape(&hierarchy.tokens().unwrap()), fresh_shape(&buffer));
    }

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    struct Char;

    impl TokenKind for Char {
        fn name(self) -> &'static str {
            "char"
        }
    }

    /// One token per character; '!' breaks the lexer contract.
    #[derive(Debug)]
    struct Fussy;

    impl crate::logic::lexer::Language for Fussy {
        type Kind = Char;

        fn name(&self) -> &str {
            "fussy"
        }

        fn next_token(&self, input: &mut crate::logic::lexer::LexerInput<'_>, state: crate::logic::lexer::LexerState) -> Option<crate::logic::lexer::Lexeme<Char>> {
            if input.read()? == '!' {
                input.backup(1);
            }
            Some(input.token(Char, state))
        }
    }

    #[test]
    fn lexer_failures_are_sticky_until_rebuild() {
        let buffer = sync::Arc::new(TextBuffer::new("abc"));
        let hierarchy = TokenHierarchy::new(buffer.clone(), sync::Arc::new(Fussy) as LanguageRef<Char>);
        assert_eq!(hierarchy.tokens().unwrap().len(), 3);

        buffer.insert(1, "!").unwrap();
        assert_matches!(hierarchy.tokens(), Err(Error::Lexer(LexerError::ZeroLengthToken { offset: 1, .. })));

        buffer.remove(1, 1).unwrap();
        assert_matches!(hierarchy.tokens(), Err(Error::Lexer(_)));

        hierarchy.rebuild().unwrap();
        assert_eq!(hierarchy.tokens().unwrap().len(), 3);
    }
}

//! Incremental relexing of token lists.
//!
//! After an edit, the updater relexes from a point far enough before the edit
//! that no surviving token could have seen the changed characters, and stops as
//! soon as a freshly lexed token lines up with an old one: same kind, same
//! length, same lexer state afterwards, at the old token's start shifted by the
//! edit. From there on the old tokens are still right, so only the run in
//! between is replaced. When no such point turns up the whole list is relexed.
//!
//! Embedded token lists ride along where they can. A replacement token that
//! has the same kind as the token it replaces, starts at the same place, and
//! swallowed the whole edit inside its embedding region gets the old embedded
//! list, updated recursively with the edit translated into its coordinates.
//! Tokens whose text did not change keep their embedded list as it was.
//! Everything else is left to be rebuilt lazily.

use tracing::event;
use tracing::instrument;
use tracing::Level;

use crate::config::Config;
use crate::logic::lexer;
use crate::logic::lexer::LanguageRef;
use crate::logic::lexer::LexerError;
use crate::logic::lexer::LexerState;
use crate::model::hierarchy::event::TokenChange;
use crate::model::text::CharSequence;
use crate::model::text::Modification;
use crate::model::text::SubSequence;
use crate::model::token::Token;
use crate::model::token::TokenKind;
use crate::model::token::TokenList;

/// Lexes `text` from the start in the initial state.
pub fn lex_all<K: TokenKind>(language: &LanguageRef<K>, text: &dyn CharSequence, stamp: u64) -> Result<TokenList<K>, LexerError> {
    let mut tokens = Vec::new();
    let mut offset = 0;
    let mut state = LexerState::INITIAL;

    while let Some(lexed) = lexer::lex_one(&**language, text, offset, state)? {
        offset+= lexed.length;
        state = lexed.state;
        tokens.push(Token::from_lexed(lexed));
    }

    Ok(TokenList::new(language.clone(), tokens, stamp))
}

/// Returns the embedded list of `token`, lexing it first if it hasn't been
/// built yet, together with the embedding's start skip. `token_start` is the
/// token's offset in `text`. Tokens without an embedding give `None`.
pub fn build_embedded<'t, K: TokenKind>(token: &'t Token<K>, host: &LanguageRef<K>, text: &dyn CharSequence, token_start: usize, stamp: u64) -> Result<Option<(&'t TokenList<K>, usize)>, LexerError> {
    let embedding = match host.embedding(token.kind()) {
        Some(embedding) if embedding.fits(token.length()) => embedding,
        _ => return Ok(None),
    };

    let list = token.embedded_cell().get_or_try_init(|| {
        let content = SubSequence::new(text, token_start + embedding.start_skip, token.length() - embedding.start_skip - embedding.end_skip);
        lex_all(&embedding.language, &content, stamp).map(Box::new)
    })?;

    Ok(Some((&**list, embedding.start_skip)))
}

/// An edit in the coordinates of one token list.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LocalEdit {
    pub offset: usize,
    pub removed: usize,
    pub inserted: usize,
}

impl LocalEdit {
    /// End of the removed run, pre-edit.
    pub fn removed_end(&self) -> usize {
        self.offset + self.removed
    }

    /// End of the inserted run, post-edit.
    pub fn inserted_end(&self) -> usize {
        self.offset + self.inserted
    }

    fn shift(&self, old_offset: usize) -> usize {
        old_offset - self.removed + self.inserted
    }
}

impl From<&Modification> for LocalEdit {
    fn from(modification: &Modification) -> Self {
        LocalEdit {
            offset: modification.offset(),
            removed: modification.removed_length(),
            inserted: modification.inserted_length(),
        }
    }
}

/// Where a token list sits in the hierarchy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListContext {
    pub path: Vec<usize>,
    /// Offset of the list's start in the post-edit document.
    pub base: usize,
    /// Offset of the list's start in the pre-edit document.
    pub original_base: usize,
}

impl ListContext {
    pub fn root() -> ListContext {
        ListContext::default()
    }

    fn child(&self, index: usize, base: usize, original_base: usize) -> ListContext {
        let mut path = self.path.clone();
        path.push(index);
        ListContext { path, base, original_base }
    }
}

enum Relexed<K: TokenKind> {
    /// These tokens replace the old ones from the diff start through `last`.
    Resynced { last: usize, tokens: Vec<Token<K>> },
    /// Relexing started at the beginning and ran to the end, so these tokens
    /// are the whole new list.
    Complete(Vec<Token<K>>),
    Abandoned(&'static str),
}

/// Finds the first token that has to be relexed for an edit at `offset`, and
/// its start. The list must not be empty.
fn diff_start<K: TokenKind>(list: &TokenList<K>, lookbehind: usize, offset: usize) -> (usize, usize) {
    let tokens = list.tokens();

    let (mut index, mut start) = match list.locate(offset) {
        /* on a boundary, the token before it may extend */
        Some((index, start)) if start == offset && index > 0 => (index - 1, start - tokens[index - 1].length()),
        Some(found) => found,
        /* appending */
        None => {
            let last = tokens.len() - 1;
            (last, list.span() - tokens[last].length())
        },
    };

    let floor = offset.saturating_sub(lookbehind);
    while index > 0 && start > floor {
        index-= 1;
        start-= tokens[index].length();
    }

    /* back up over every earlier token that looked at the edited region */
    let reach = list.max_lookahead();
    let mut j = index;
    let mut end = start;
    while j > 0 && end + reach > offset {
        let previous = &tokens[j - 1];
        let previous_start = end - previous.length();
        if end + previous.lookahead() > offset {
            index = j - 1;
            start = previous_start;
        }
        j-= 1;
        end = previous_start;
    }

    (index, start)
}

/// Applies one edit to a token list (and whatever embedded lists it can carry
/// over), recording every replacement it makes.
pub struct TokenListUpdater<'a, K: TokenKind> {
    config: &'a Config,
    stamp: u64,
    changes: Vec<TokenChange<K>>,
}

impl<'a, K: TokenKind> TokenListUpdater<'a, K> {
    pub fn new(config: &'a Config, stamp: u64) -> TokenListUpdater<'a, K> {
        TokenListUpdater {
            config,
            stamp,
            changes: Vec::new(),
        }
    }

    pub fn changes(&self) -> &[TokenChange<K>] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<TokenChange<K>> {
        self.changes
    }

    /// Relexes `list` from scratch against `text`.
    pub fn rebuild(&mut self, list: &mut TokenList<K>, text: &dyn CharSequence, context: &ListContext) -> Result<(), LexerError> {
        let fresh = lex_all(list.language(), text, self.stamp)?;
        self.replace_all(list, fresh, context);
        Ok(())
    }

    fn replace_all(&mut self, list: &mut TokenList<K>, fresh: TokenList<K>, context: &ListContext) {
        let removed = list.infos(context.original_base);
        list.replace_all(fresh);

        self.changes.push(TokenChange {
            path: context.path.clone(),
            index: 0,
            removed,
            added: list.infos(context.base),
            start_offset: context.base,
            full_rebuild: true,
        });
    }

    /// Brings `list`, which was lexed from `original`, up to date with `text`.
    #[instrument(skip_all, fields(depth = context.path.len(), offset = edit.offset, removed = edit.removed, inserted = edit.inserted))]
    pub fn update(&mut self, list: &mut TokenList<K>, text: &dyn CharSequence, original: &dyn CharSequence, edit: LocalEdit, context: &ListContext) -> Result<(), LexerError> {
        debug_assert_eq!(list.span() + edit.inserted, text.len() + edit.removed, "token list out of step with its text");

        if list.is_empty() {
            return self.rebuild(list, text, context);
        }

        let (first, first_start) = diff_start(list, list.language().lookbehind(), edit.offset);

        match self.relex(list, text, original, edit, first, first_start)? {
            Relexed::Resynced { last, tokens } => {
                event!(Level::DEBUG, first, last, added = tokens.len(), "resynchronized");
                self.splice(list, text, original, edit, context, (first, first_start), last, tokens)
            },
            Relexed::Complete(tokens) => {
                event!(Level::DEBUG, added = tokens.len(), "relexed entire list");
                let fresh = TokenList::new(list.language().clone(), tokens, self.stamp);
                self.replace_all(list, fresh, context);
                Ok(())
            },
            Relexed::Abandoned(reason) => {
                event!(Level::DEBUG, reason, "falling back to full relex");
                self.rebuild(list, text, context)
            },
        }
    }

    fn relex(&self, old: &TokenList<K>, text: &dyn CharSequence, original: &dyn CharSequence, edit: LocalEdit, first: usize, first_start: usize) -> Result<Relexed<K>, LexerError> {
        let language = old.language();
        let old_tokens = old.tokens();
        let confirmations = self.config.resync_confirmations.max(1);

        /* the token ahead of the relexed run keeps its state only if nothing it looked at changed */
        if self.config.validate_resync && first > 0 {
            let seen_end = first_start + old_tokens[first - 1].lookahead();
            let before = original.to_chars(first_start, seen_end.min(original.len()));
            let after = text.to_chars(first_start, seen_end.min(text.len()));
            if before != after {
                event!(Level::WARN, first, first_start, "token before the relex start looked at edited text");
                return Ok(Relexed::Abandoned("relex start failed validation"));
            }
        }

        let mut state = match first {
            0 => LexerState::INITIAL,
            _ => old_tokens[first - 1].state(),
        };
        let mut position = first_start;
        let mut tokens = Vec::new();

        /* the first old token not yet known to be behind the relex position, with its pre-edit start */
        let mut candidate = first;
        let mut candidate_start = first_start;
        let mut matched = 0;

        loop {
            if self.config.relex_limit != 0 && tokens.len() >= self.config.relex_limit {
                return Ok(Relexed::Abandoned("relex limit reached"));
            }

            let lexed = match lexer::lex_one(&**language, text, position, state)? {
                Some(lexed) => lexed,
                None if first == 0 => return Ok(Relexed::Complete(tokens)),
                None => return Ok(Relexed::Abandoned("reached end of input without resynchronizing")),
            };

            let start = position;
            position+= lexed.length;
            state = lexed.state;
            tokens.push(Token::from_lexed(lexed));

            if self.config.trace_tokens {
                event!(Level::TRACE, kind = lexed.kind.name(), start, length = lexed.length, lookahead = lexed.lookahead, "relexed token");
            }

            if start < edit.inserted_end() {
                continue;
            }

            while candidate < old_tokens.len() && (candidate_start < edit.removed_end() || edit.shift(candidate_start) < start) {
                candidate_start+= old_tokens[candidate].length();
                candidate+= 1;
            }

            if candidate == old_tokens.len() {
                if first == 0 {
                    continue;
                }
                return Ok(Relexed::Abandoned("ran past the last old token"));
            }

            let old_token = &old_tokens[candidate];
            if edit.shift(candidate_start) == start && old_token.kind() == lexed.kind && old_token.length() == lexed.length && old_token.state() == lexed.state {
                matched+= 1;
                if matched >= confirmations {
                    return Ok(Relexed::Resynced { last: candidate, tokens });
                }
            } else {
                matched = 0;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn splice(&mut self, list: &mut TokenList<K>, text: &dyn CharSequence, original: &dyn CharSequence, edit: LocalEdit, context: &ListContext, (first, first_start): (usize, usize), last: usize, mut tokens: Vec<Token<K>>) -> Result<(), LexerError> {
        let removed = list.infos_in(first..last + 1, context.original_base + first_start);

        let mut new_starts = Vec::with_capacity(tokens.len());
        let mut added = Vec::with_capacity(tokens.len());
        let mut offset = first_start;
        for token in &tokens {
            new_starts.push(offset);
            added.push(token.info(context.base + offset));
            offset+= token.length();
        }

        /* the change for this list goes ahead of any its embedded lists report */
        let slot = self.changes.len();

        let language = list.language().clone();
        let mut old_start = first_start;
        for old in &mut list.tokens_mut()[first..=last] {
            let start = old_start;
            let end = start + old.length();
            old_start = end;

            let Some(mut embedded) = old.take_embedded() else {
                continue;
            };

            let (new_start, touched) = if end <= edit.offset {
                (start, false)
            } else if start >= edit.removed_end() {
                (edit.shift(start), false)
            } else {
                (start, true)
            };

            let Ok(j) = new_starts.binary_search(&new_start) else {
                continue;
            };
            let new = &mut tokens[j];

            if new.kind() != old.kind() {
                continue;
            }

            if !touched {
                if new.length() == old.length() {
                    new.set_embedded(embedded);
                }
                continue;
            }

            let Some(embedding) = language.embedding(old.kind()) else {
                continue;
            };

            let inner_start = start + embedding.start_skip;
            if inner_start > edit.offset
                || edit.removed_end() + embedding.end_skip > end
                || new.length() + edit.removed != old.length() + edit.inserted
                || !embedding.fits(new.length()) {
                continue;
            }

            let skips = embedding.start_skip + embedding.end_skip;
            let new_content = SubSequence::new(text, new_start + embedding.start_skip, new.length() - skips);
            let old_content = SubSequence::new(original, inner_start, old.length() - skips);
            let inner_edit = LocalEdit {
                offset: edit.offset - inner_start,
                ..edit
            };
            let inner_context = context.child(first + j, context.base + new_start + embedding.start_skip, context.original_base + inner_start);

            self.update(&mut embedded, &new_content, &old_content, inner_edit, &inner_context)?;
            new.set_embedded(embedded);
        }

        self.changes.insert(slot, TokenChange {
            path: context.path.clone(),
            index: first,
            removed,
            added,
            start_offset: context.base + first_start,
            full_rebuild: false,
        });

        list.splice(first..last + 1, tokens, self.stamp);
        Ok(())
    }
}

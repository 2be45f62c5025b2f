use std::ops;
use std::sync::atomic;

use once_cell::sync::OnceCell;

use crate::logic::lexer::Lexed;
use crate::logic::lexer::LanguageRef;
use crate::logic::lexer::LexerState;

/// A closed, per-hierarchy enumeration of token kinds. Host and embedded
/// languages of one hierarchy share the enum.
pub trait TokenKind: Copy + Eq + std::hash::Hash + std::fmt::Debug + Send + Sync + 'static {
    fn name(self) -> &'static str;
}

/// Identity of a token object. Assigned when the token is lexed and never
/// reused, so "was this token recreated?" is a comparison of ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TokenId(u64);

static NEXT_TOKEN_ID: atomic::AtomicU64 = atomic::AtomicU64::new(1);

impl TokenId {
    fn next() -> TokenId {
        TokenId(NEXT_TOKEN_ID.fetch_add(1, atomic::Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn for_test(id: u64) -> TokenId {
        TokenId(id)
    }
}

pub struct Token<K: TokenKind> {
    id: TokenId,
    kind: K,
    length: usize,
    /// How far past its end the lexer looked to produce this token.
    lookahead: usize,
    /// Lexer state after this token.
    state: LexerState,
    embedded: OnceCell<Box<TokenList<K>>>,
}

impl<K: TokenKind> Token<K> {
    pub(crate) fn from_lexed(lexed: Lexed<K>) -> Token<K> {
        Token {
            id: TokenId::next(),
            kind: lexed.kind,
            length: lexed.length,
            lookahead: lexed.lookahead,
            state: lexed.state,
            embedded: OnceCell::new(),
        }
    }

    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn kind(&self) -> K {
        self.kind
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    pub fn state(&self) -> LexerState {
        self.state
    }

    /// The embedded token list, if it has been built.
    pub fn embedded(&self) -> Option<&TokenList<K>> {
        self.embedded.get().map(|list| &**list)
    }

    pub(crate) fn embedded_cell(&self) -> &OnceCell<Box<TokenList<K>>> {
        &self.embedded
    }

    pub(crate) fn take_embedded(&mut self) -> Option<Box<TokenList<K>>> {
        self.embedded.take()
    }

    pub(crate) fn set_embedded(&mut self, list: Box<TokenList<K>>) {
        self.embedded = OnceCell::from(list);
    }

    pub fn info(&self, offset: usize) -> TokenInfo<K> {
        TokenInfo {
            id: self.id,
            kind: self.kind,
            offset,
            length: self.length,
        }
    }
}

impl<K: TokenKind> std::fmt::Debug for Token<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("length", &self.length)
            .field("lookahead", &self.lookahead)
            .field("state", &self.state)
            .field("embedded", &self.embedded.get().is_some())
            .finish()
    }
}

/// A plain snapshot of one token, with its offset resolved.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TokenInfo<K> {
    pub id: TokenId,
    pub kind: K,
    pub offset: usize,
    pub length: usize,
}

impl<K> TokenInfo<K> {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// A contiguous, gap-free run of tokens covering `[0, span)`. Offsets are not
/// stored; they are the running sum of the lengths before a token.
pub struct TokenList<K: TokenKind> {
    tokens: Vec<Token<K>>,
    span: usize,
    language: LanguageRef<K>,
    /// Generation of the hierarchy stamp when this list was last built or spliced.
    stamp: u64,
    /* upper bound on any token's lookahead; splices only ever raise it */
    max_lookahead: usize,
}

impl<K: TokenKind> TokenList<K> {
    pub(crate) fn new(language: LanguageRef<K>, tokens: Vec<Token<K>>, stamp: u64) -> TokenList<K> {
        TokenList {
            span: tokens.iter().map(Token::length).sum(),
            max_lookahead: tokens.iter().map(Token::lookahead).max().unwrap_or(0),
            tokens,
            language,
            stamp,
        }
    }

    pub(crate) fn tokens(&self) -> &[Token<K>] {
        &self.tokens
    }

    pub(crate) fn max_lookahead(&self) -> usize {
        self.max_lookahead
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn span(&self) -> usize {
        self.span
    }

    pub fn language(&self) -> &LanguageRef<K> {
        &self.language
    }

    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    pub fn get(&self, index: usize) -> Option<&Token<K>> {
        self.tokens.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token<K>> {
        self.tokens.iter()
    }

    /// Offset of the token at `index` (or of the end, for `index == len`).
    pub fn offset_of(&self, index: usize) -> usize {
        self.tokens[..index].iter().map(Token::length).sum()
    }

    /// Finds the token whose span contains `offset`, returning its index and
    /// start offset.
    pub fn locate(&self, offset: usize) -> Option<(usize, usize)> {
        let mut start = 0;
        for (index, token) in self.tokens.iter().enumerate() {
            if offset < start + token.length {
                return Some((index, start));
            }
            start+= token.length;
        }
        None
    }

    /// Snapshots every token, offsetting them by `base`.
    pub fn infos(&self, base: usize) -> Vec<TokenInfo<K>> {
        self.infos_in(0..self.tokens.len(), base)
    }

    /// Snapshots the tokens in `range`. `range_start` is the offset of the
    /// first of them.
    pub(crate) fn infos_in(&self, range: ops::Range<usize>, range_start: usize) -> Vec<TokenInfo<K>> {
        let mut offset = range_start;
        self.tokens[range].iter().map(|token| {
            let info = token.info(offset);
            offset+= token.length;
            info
        }).collect()
    }

    pub(crate) fn tokens_mut(&mut self) -> &mut [Token<K>] {
        &mut self.tokens
    }

    /// Replaces the tokens in `range` with `replacement`, handing back the old ones.
    pub(crate) fn splice(&mut self, range: ops::Range<usize>, replacement: Vec<Token<K>>, stamp: u64) -> Vec<Token<K>> {
        self.max_lookahead = replacement.iter().map(Token::lookahead).fold(self.max_lookahead, usize::max);
        let removed: Vec<Token<K>> = self.tokens.splice(range, replacement).collect();
        self.span = self.tokens.iter().map(Token::length).sum();
        self.stamp = stamp;
        removed
    }

    pub(crate) fn replace_all(&mut self, replacement: TokenList<K>) -> Vec<Token<K>> {
        let old = std::mem::replace(self, replacement);
        old.tokens
    }
}

impl<K: TokenKind> std::fmt::Debug for TokenList<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenList")
            .field("language", &self.language.name())
            .field("span", &self.span)
            .field("stamp", &self.stamp)
            .field("tokens", &self.tokens)
            .finish()
    }
}

//! The resumable lexer capability consumed by token hierarchies.
//!
//! A [Language] turns characters into tokens one at a time. It must be
//! deterministic and able to resume at any token boundary given only the
//! [LexerState] stored on the token before that boundary; the incremental
//! updater relies on this to restart in the middle of a document.

use std::sync;

use crate::model::text::CharSequence;
use crate::model::token::TokenKind;

/// Opaque resumable lexer state, recorded after every token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct LexerState(pub u32);

impl LexerState {
    pub const INITIAL: LexerState = LexerState(0);
}

/// What a lexer hands back for one token.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Lexeme<K> {
    pub kind: K,
    pub length: usize,
    pub state: LexerState,
}

/// Character source for a single `next_token` call. Tracks how far the lexer
/// looked, so tokens can record their lookahead.
pub struct LexerInput<'a> {
    text: &'a dyn CharSequence,
    start: usize,
    position: usize,
    /* one past the furthest index inspected; an attempted read at end of input counts */
    furthest: usize,
}

impl<'a> LexerInput<'a> {
    pub fn new(text: &'a dyn CharSequence, start: usize) -> LexerInput<'a> {
        LexerInput {
            text,
            start,
            position: start,
            furthest: start,
        }
    }

    /// Reads the next character, or `None` at end of input.
    pub fn read(&mut self) -> Option<char> {
        if self.position < self.text.len() {
            let c = self.text.char_at(self.position);
            self.position+= 1;
            self.furthest = self.furthest.max(self.position);
            Some(c)
        } else {
            self.furthest = self.furthest.max(self.position + 1);
            None
        }
    }

    pub fn peek(&mut self) -> Option<char> {
        let c = self.read();
        if c.is_some() {
            self.backup(1);
        }
        c
    }

    /// Un-reads `count` characters. Cannot back up past the token start.
    pub fn backup(&mut self, count: usize) {
        assert!(count <= self.read_length(), "backed up {} characters past the token start", count - self.read_length());
        self.position-= count;
    }

    /// Reads characters while `predicate` holds and returns how many it took.
    pub fn read_while(&mut self, mut predicate: impl FnMut(char) -> bool) -> usize {
        let mut count = 0;
        while let Some(c) = self.read() {
            if !predicate(c) {
                self.backup(1);
                break;
            }
            count+= 1;
        }
        count
    }

    pub fn read_length(&self) -> usize {
        self.position - self.start
    }

    /// Offset of the token being lexed within the text being lexed.
    pub fn offset(&self) -> usize {
        self.start
    }

    /// Builds a lexeme covering everything read so far.
    pub fn token<K>(&self, kind: K, state: LexerState) -> Lexeme<K> {
        Lexeme {
            kind,
            length: self.read_length(),
            state,
        }
    }

    fn lookahead_past(&self, end: usize) -> usize {
        self.furthest.saturating_sub(end)
    }
}

pub trait Language: Send + Sync + std::fmt::Debug {
    type Kind: TokenKind;

    fn name(&self) -> &str;

    /// Lexes one token starting at the input's offset, or returns `None` if
    /// the input is exhausted.
    fn next_token(&self, input: &mut LexerInput<'_>, state: LexerState) -> Option<Lexeme<Self::Kind>>;

    /// Characters before an edit that must be re-lexed regardless of recorded
    /// lookahead.
    fn lookbehind(&self) -> usize {
        0
    }

    /// Which sub-language, if any, lives inside tokens of this kind.
    fn embedding(&self, _kind: Self::Kind) -> Option<Embedding<Self::Kind>> {
        None
    }
}

pub type LanguageRef<K> = sync::Arc<dyn Language<Kind = K>>;

/// A sub-language inside a token, skipping `start_skip` characters at the
/// front and `end_skip` at the back (quotes, comment delimiters).
#[derive(Clone)]
pub struct Embedding<K> {
    pub language: LanguageRef<K>,
    pub start_skip: usize,
    pub end_skip: usize,
}

impl<K> Embedding<K> {
    pub fn new(language: LanguageRef<K>, start_skip: usize, end_skip: usize) -> Embedding<K> {
        Embedding { language, start_skip, end_skip }
    }

    /// Whether a token of `length` characters is long enough to hold the
    /// embedding's delimiters.
    pub fn fits(&self, length: usize) -> bool {
        self.start_skip + self.end_skip <= length
    }
}

impl<K: TokenKind> std::fmt::Debug for Embedding<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedding")
            .field("language", &self.language.name())
            .field("start_skip", &self.start_skip)
            .field("end_skip", &self.end_skip)
            .finish()
    }
}

/// A lexer broke its contract. These indicate a misconfigured language and
/// are never recovered from locally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexerError {
    ZeroLengthToken { language: String, offset: usize, kind: String },
    TokenPastEnd { language: String, offset: usize, length: usize, available: usize },
    PrematureEnd { language: String, offset: usize, remaining: usize },
}

impl std::fmt::Display for LexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexerError::ZeroLengthToken { language, offset, kind } => write!(f, "{} lexer produced a zero-length {} token at {}", language, kind, offset),
            LexerError::TokenPastEnd { language, offset, length, available } => write!(f, "{} lexer produced a {}-character token at {} with only {} characters left", language, length, offset, available),
            LexerError::PrematureEnd { language, offset, remaining } => write!(f, "{} lexer reported end of input at {} with {} characters left", language, offset, remaining),
        }
    }
}

impl std::error::Error for LexerError {}

/// A checked lexeme plus the lookahead it needed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Lexed<K> {
    pub kind: K,
    pub length: usize,
    pub lookahead: usize,
    pub state: LexerState,
}

/// Runs the lexer once at `offset` and enforces its contract: tokens are never
/// empty, never run past the input, and end of input is only reported at the end.
pub fn lex_one<K: TokenKind>(language: &dyn Language<Kind = K>, text: &dyn CharSequence, offset: usize, state: LexerState) -> Result<Option<Lexed<K>>, LexerError> {
    let available = text.len() - offset;
    let mut input = LexerInput::new(text, offset);

    match language.next_token(&mut input, state) {
        None if available == 0 => Ok(None),
        None => Err(LexerError::PrematureEnd {
            language: language.name().to_string(),
            offset,
            remaining: available,
        }),
        Some(lexeme) if lexeme.length == 0 => Err(LexerError::ZeroLengthToken {
            language: language.name().to_string(),
            offset,
            kind: lexeme.kind.name().to_string(),
        }),
        Some(lexeme) if lexeme.length > available => Err(LexerError::TokenPastEnd {
            language: language.name().to_string(),
            offset,
            length: lexeme.length,
            available,
        }),
        Some(lexeme) => Ok(Some(Lexed {
            kind: lexeme.kind,
            length: lexeme.length,
            lookahead: input.lookahead_past(offset + lexeme.length),
            state: lexeme.state,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    enum Kind {
        Word,
        Gap,
    }

    impl TokenKind for Kind {
        fn name(self) -> &'static str {
            match self {
                Kind::Word => "word",
                Kind::Gap => "gap",
            }
        }
    }

    /// Words and single-space gaps. A word peeks one character past its end.
    #[derive(Debug)]
    struct Words;

    impl Language for Words {
        type Kind = Kind;

        fn name(&self) -> &str {
            "words"
        }

        fn next_token(&self, input: &mut LexerInput<'_>, state: LexerState) -> Option<Lexeme<Kind>> {
            match input.read()? {
                ' ' => Some(input.token(Kind::Gap, state)),
                _ => {
                    input.read_while(|c| c != ' ');
                    Some(input.token(Kind::Word, state))
                }
            }
        }
    }

    #[derive(Debug)]
    struct Stuck;

    impl Language for Stuck {
        type Kind = Kind;

        fn name(&self) -> &str {
            "stuck"
        }

        fn next_token(&self, input: &mut LexerInput<'_>, state: LexerState) -> Option<Lexeme<Kind>> {
            Some(input.token(Kind::Gap, state))
        }
    }

    #[derive(Debug)]
    struct Quitter;

    impl Language for Quitter {
        type Kind = Kind;

        fn name(&self) -> &str {
            "quitter"
        }

        fn next_token(&self, _input: &mut LexerInput<'_>, _state: LexerState) -> Option<Lexeme<Kind>> {
            None
        }
    }

    #[derive(Debug)]
    struct Greedy;

    impl Language for Greedy {
        type Kind = Kind;

        fn name(&self) -> &str {
            "greedy"
        }

        fn next_token(&self, _input: &mut LexerInput<'_>, state: LexerState) -> Option<Lexeme<Kind>> {
            Some(Lexeme { kind: Kind::Word, length: 100, state })
        }
    }

    #[test]
    fn lookahead_is_recorded() {
        let text: Vec<char> = "ab cd".chars().collect();

        let word = lex_one(&Words, &text, 0, LexerState::INITIAL).unwrap().unwrap();
        assert_eq!(word, Lexed { kind: Kind::Word, length: 2, lookahead: 1, state: LexerState::INITIAL });

        let gap = lex_one(&Words, &text, 2, LexerState::INITIAL).unwrap().unwrap();
        assert_eq!(gap.lookahead, 0);

        /* running into end of input counts as looking one past it */
        let last = lex_one(&Words, &text, 3, LexerState::INITIAL).unwrap().unwrap();
        assert_eq!((last.length, last.lookahead), (2, 1));

        assert_eq!(lex_one(&Words, &text, 5, LexerState::INITIAL).unwrap(), None);
    }

    #[test]
    fn contract_violations() {
        let text: Vec<char> = "abc".chars().collect();

        assert_matches!(lex_one(&Stuck, &text, 1, LexerState::INITIAL), Err(LexerError::ZeroLengthToken { offset: 1, .. }));
        assert_matches!(lex_one(&Quitter, &text, 0, LexerState::INITIAL), Err(LexerError::PrematureEnd { remaining: 3, .. }));
        assert_matches!(lex_one(&Greedy, &text, 2, LexerState::INITIAL), Err(LexerError::TokenPastEnd { available: 1, .. }));
    }

    #[test]
    fn embedding_debug_names_language() {
        let language: LanguageRef<Kind> = sync::Arc::new(Words);
        let embedding = Embedding::new(language, 1, 2);
        assert_eq!(format!("{:?}", embedding), r#"Embedding { language: "words", start_skip: 1, end_skip: 2 }"#);
        assert!(embedding.fits(3));
        assert!(!embedding.fits(2));
    }

    #[test]
    fn input_backup_and_peek() {
        let text: Vec<char> = "xyz".chars().collect();
        let mut input = LexerInput::new(&text, 0);

        assert_eq!(input.peek(), Some('x'));
        assert_eq!(input.read_length(), 0);
        assert_eq!(input.read(), Some('x'));
        assert_eq!(input.read(), Some('y'));
        input.backup(1);
        assert_eq!(input.read_length(), 1);
        assert_eq!(input.read_while(|_| true), 2);
        assert_eq!(input.read(), None);
        assert_eq!(input.lookahead_past(3), 1);
    }
}

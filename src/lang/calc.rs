use std::sync;

use crate::lang::escape::Escapes;
use crate::logic::lexer::Embedding;
use crate::logic::lexer::Language;
use crate::logic::lexer::LanguageRef;
use crate::logic::lexer::LexerInput;
use crate::logic::lexer::LexerState;
use crate::logic::lexer::Lexeme;
use crate::model::token::TokenKind;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CalcKind {
    Identifier,
    Number,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Whitespace,
    LineComment,
    /// One line's worth of a block comment. Comments spanning lines are split
    /// at each newline so the lexer state carries the "inside a comment" flag.
    BlockComment,
    StringLiteral,
    /// A string cut off by the end of its line or of the input.
    UnterminatedString,
    Error,

    /* string contents */
    StringText,
    Escape,
    InvalidEscape,
}

impl TokenKind for CalcKind {
    fn name(self) -> &'static str {
        match self {
            CalcKind::Identifier => "identifier",
            CalcKind::Number => "number",
            CalcKind::Plus => "plus",
            CalcKind::Minus => "minus",
            CalcKind::Star => "star",
            CalcKind::Slash => "slash",
            CalcKind::LParen => "lparen",
            CalcKind::RParen => "rparen",
            CalcKind::Whitespace => "whitespace",
            CalcKind::LineComment => "line-comment",
            CalcKind::BlockComment => "block-comment",
            CalcKind::StringLiteral => "string",
            CalcKind::UnterminatedString => "unterminated-string",
            CalcKind::Error => "error",
            CalcKind::StringText => "string-text",
            CalcKind::Escape => "escape",
            CalcKind::InvalidEscape => "invalid-escape",
        }
    }
}

pub const IN_BLOCK_COMMENT: LexerState = LexerState(1);

#[derive(Debug)]
pub struct Calc {
    escapes: LanguageRef<CalcKind>,
}

impl Calc {
    pub fn new() -> Calc {
        Calc {
            escapes: sync::Arc::new(Escapes),
        }
    }

    /// Reads the rest of a block comment line. Returns the state to resume in.
    fn comment_body(input: &mut LexerInput<'_>) -> LexerState {
        loop {
            match input.read() {
                None | Some('\n') => return IN_BLOCK_COMMENT,
                Some('*') => match input.read() {
                    Some('/') => return LexerState::INITIAL,
                    Some(_) => input.backup(1),
                    None => {},
                },
                Some(_) => {},
            }
        }
    }

    fn string(input: &mut LexerInput<'_>) -> CalcKind {
        loop {
            match input.read() {
                None => return CalcKind::UnterminatedString,
                Some('\n') => {
                    input.backup(1);
                    return CalcKind::UnterminatedString;
                },
                Some('"') => return CalcKind::StringLiteral,
                Some('\\') => match input.read() {
                    Some('\n') => input.backup(1),
                    _ => {},
                },
                Some(_) => {},
            }
        }
    }

    fn number(input: &mut LexerInput<'_>) {
        input.read_while(|c| c.is_ascii_digit());

        /* a fraction needs a digit after the point; "1." is a number and an error */
        match input.read() {
            Some('.') => match input.read() {
                Some(c) if c.is_ascii_digit() => {
                    input.read_while(|c| c.is_ascii_digit());
                },
                Some(_) => input.backup(2),
                None => input.backup(1),
            },
            Some(_) => input.backup(1),
            None => {},
        }
    }
}

impl Default for Calc {
    fn default() -> Self {
        Self::new()
    }
}

impl Language for Calc {
    type Kind = CalcKind;

    fn name(&self) -> &str {
        "calc"
    }

    fn next_token(&self, input: &mut LexerInput<'_>, state: LexerState) -> Option<Lexeme<CalcKind>> {
        if state == IN_BLOCK_COMMENT {
            input.peek()?;
            let next = Calc::comment_body(input);
            return Some(input.token(CalcKind::BlockComment, next));
        }

        let kind = match input.read()? {
            c if c.is_whitespace() => {
                input.read_while(char::is_whitespace);
                CalcKind::Whitespace
            },
            c if c.is_alphabetic() || c == '_' => {
                input.read_while(|c| c.is_alphanumeric() || c == '_');
                CalcKind::Identifier
            },
            c if c.is_ascii_digit() => {
                Calc::number(input);
                CalcKind::Number
            },
            '+' => CalcKind::Plus,
            '-' => CalcKind::Minus,
            '*' => CalcKind::Star,
            '(' => CalcKind::LParen,
            ')' => CalcKind::RParen,
            '/' => match input.read() {
                Some('/') => {
                    input.read_while(|c| c != '\n');
                    CalcKind::LineComment
                },
                Some('*') => {
                    let next = Calc::comment_body(input);
                    return Some(input.token(CalcKind::BlockComment, next));
                },
                Some(_) => {
                    input.backup(1);
                    CalcKind::Slash
                },
                None => CalcKind::Slash,
            },
            '"' => Calc::string(input),
            _ => CalcKind::Error,
        };

        Some(input.token(kind, LexerState::INITIAL))
    }

    fn embedding(&self, kind: CalcKind) -> Option<Embedding<CalcKind>> {
        match kind {
            CalcKind::StringLiteral => Some(Embedding::new(self.escapes.clone(), 1, 1)),
            CalcKind::UnterminatedString => Some(Embedding::new(self.escapes.clone(), 1, 0)),
            _ => None,
        }
    }
}

pub fn language() -> LanguageRef<CalcKind> {
    sync::Arc::new(Calc::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::logic::lexer::lex_one;

    fn lex(source: &str) -> Vec<(CalcKind, String, LexerState)> {
        let text: Vec<char> = source.chars().collect();
        let calc = Calc::new();
        let mut offset = 0;
        let mut state = LexerState::INITIAL;
        let mut tokens = Vec::new();
        while let Some(lexed) = lex_one(&calc, &text, offset, state).unwrap() {
            tokens.push((lexed.kind, text[offset..offset + lexed.length].iter().collect(), lexed.state));
            offset+= lexed.length;
            state = lexed.state;
        }
        tokens
    }

    fn kinds(source: &str) -> Vec<(CalcKind, String)> {
        lex(source).into_iter().map(|(kind, text, _)| (kind, text)).collect()
    }

    #[test]
    fn expression() {
        assert_eq!(kinds("abc+uv-xy"), vec![
            (CalcKind::Identifier, "abc".to_string()),
            (CalcKind::Plus, "+".to_string()),
            (CalcKind::Identifier, "uv".to_string()),
            (CalcKind::Minus, "-".to_string()),
            (CalcKind::Identifier, "xy".to_string()),
        ]);

        assert_eq!(kinds("(1.5 * x2) / 3."), vec![
            (CalcKind::LParen, "(".to_string()),
            (CalcKind::Number, "1.5".to_string()),
            (CalcKind::Whitespace, " ".to_string()),
            (CalcKind::Star, "*".to_string()),
            (CalcKind::Whitespace, " ".to_string()),
            (CalcKind::Identifier, "x2".to_string()),
            (CalcKind::RParen, ")".to_string()),
            (CalcKind::Whitespace, " ".to_string()),
            (CalcKind::Slash, "/".to_string()),
            (CalcKind::Whitespace, " ".to_string()),
            (CalcKind::Number, "3".to_string()),
            (CalcKind::Error, ".".to_string()),
        ]);
    }

    #[test]
    fn number_lookahead() {
        let text: Vec<char> = "1.x".chars().collect();
        let lexed = lex_one(&Calc::new(), &text, 0, LexerState::INITIAL).unwrap().unwrap();
        assert_eq!((lexed.kind, lexed.length, lexed.lookahead), (CalcKind::Number, 1, 2));
    }

    #[test]
    fn block_comments_split_per_line() {
        assert_eq!(lex("a/* one\ntwo */b"), vec![
            (CalcKind::Identifier, "a".to_string(), LexerState::INITIAL),
            (CalcKind::BlockComment, "/* one\n".to_string(), IN_BLOCK_COMMENT),
            (CalcKind::BlockComment, "two */".to_string(), LexerState::INITIAL),
            (CalcKind::Identifier, "b".to_string(), LexerState::INITIAL),
        ]);

        assert_eq!(lex("/*\n\nx"), vec![
            (CalcKind::BlockComment, "/*\n".to_string(), IN_BLOCK_COMMENT),
            (CalcKind::BlockComment, "\n".to_string(), IN_BLOCK_COMMENT),
            (CalcKind::BlockComment, "x".to_string(), IN_BLOCK_COMMENT),
        ]);
    }

    #[test]
    fn strings() {
        assert_eq!(kinds("\"a\\\"b\" \"open\nx"), vec![
            (CalcKind::StringLiteral, "\"a\\\"b\"".to_string()),
            (CalcKind::Whitespace, " ".to_string()),
            (CalcKind::UnterminatedString, "\"open".to_string()),
            (CalcKind::Whitespace, "\n".to_string()),
            (CalcKind::Identifier, "x".to_string()),
        ]);
    }

    #[test]
    fn embeddings() {
        let calc = Calc::new();
        let literal = calc.embedding(CalcKind::StringLiteral).unwrap();
        assert_eq!((literal.start_skip, literal.end_skip), (1, 1));
        assert_eq!(literal.language.name(), "escape");

        let open = calc.embedding(CalcKind::UnterminatedString).unwrap();
        assert_eq!((open.start_skip, open.end_skip), (1, 0));

        assert!(calc.embedding(CalcKind::Identifier).is_none());
    }
}

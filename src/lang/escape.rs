use crate::lang::calc::CalcKind;
use crate::logic::lexer::Language;
use crate::logic::lexer::LexerInput;
use crate::logic::lexer::LexerState;
use crate::logic::lexer::Lexeme;

/// The inside of a string literal: runs of plain text and backslash escapes.
/// `\u` takes exactly four hex digits; fewer makes an invalid escape.
#[derive(Debug, Default)]
pub struct Escapes;

impl Language for Escapes {
    type Kind = CalcKind;

    fn name(&self) -> &str {
        "escape"
    }

    fn next_token(&self, input: &mut LexerInput<'_>, state: LexerState) -> Option<Lexeme<CalcKind>> {
        if input.read()? != '\\' {
            input.read_while(|c| c != '\\');
            return Some(input.token(CalcKind::StringText, state));
        }

        let kind = match input.read() {
            None => CalcKind::InvalidEscape,
            Some('u') => {
                let mut digits = 0;
                while digits < 4 {
                    match input.read() {
                        Some(c) if c.is_ascii_hexdigit() => digits+= 1,
                        Some(_) => {
                            input.backup(1);
                            break;
                        },
                        None => break,
                    }
                }

                if digits == 4 {
                    CalcKind::Escape
                } else {
                    CalcKind::InvalidEscape
                }
            },
            Some(_) => CalcKind::Escape,
        };

        Some(input.token(kind, state))
    }
}

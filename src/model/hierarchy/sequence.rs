use std::sync;

use crate::logic::updater;
use crate::model::hierarchy::Error;
use crate::model::hierarchy::TokenHierarchy;
use crate::model::text::CharSequence;
use crate::model::token::TokenInfo;
use crate::model::token::TokenKind;
use crate::model::token::TokenList;
use crate::model::versioned::Stamp;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Position {
    /// Before the first token.
    Start,
    /// On a token. `offset` is relative to the start of the list.
    At { index: usize, offset: usize },
    /// After the last token.
    End,
}

/// A cursor over one token list of a hierarchy. Every operation re-checks
/// the hierarchy stamp captured at creation and fails with
/// [Error::StaleCursor] once it has moved on; get a new sequence after an edit.
#[derive(Clone)]
pub struct TokenSequence<K: TokenKind> {
    hierarchy: sync::Arc<TokenHierarchy<K>>,
    path: Vec<usize>,
    /// Offset of the list's start in the document.
    base: usize,
    stamp: Stamp,
    position: Position,
}

impl<K: TokenKind> TokenSequence<K> {
    pub(crate) fn new(hierarchy: sync::Arc<TokenHierarchy<K>>, stamp: Stamp) -> TokenSequence<K> {
        TokenSequence {
            hierarchy,
            path: Vec::new(),
            base: 0,
            stamp,
            position: Position::Start,
        }
    }

    fn with_list<R>(&self, f: impl FnOnce(&TokenList<K>, &dyn CharSequence) -> Result<R, Error>) -> Result<R, Error> {
        self.hierarchy.with_list(self.stamp, &self.path, |list, text| f(list, text))
    }

    pub fn stamp(&self) -> Stamp {
        self.stamp
    }

    /// Whether the hierarchy is unchanged since this sequence was created.
    pub fn is_valid(&self) -> bool {
        !self.hierarchy.is_disposed() && !self.stamp.is_outdated(&self.hierarchy.stamp())
    }

    /// How many embeddings deep this list is. The root list is at depth zero.
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn token_count(&self) -> Result<usize, Error> {
        self.with_list(|list, _| Ok(list.len()))
    }

    pub fn move_next(&mut self) -> Result<bool, Error> {
        let (position, moved) = self.with_list(|list, _| Ok(match self.position {
            Position::Start if list.is_empty() => (Position::End, false),
            Position::Start => (Position::At { index: 0, offset: 0 }, true),
            Position::At { index, offset } if index + 1 < list.len() => (Position::At { index: index + 1, offset: offset + list.tokens()[index].length() }, true),
            Position::At { .. } | Position::End => (Position::End, false),
        }))?;

        self.position = position;
        Ok(moved)
    }

    pub fn move_previous(&mut self) -> Result<bool, Error> {
        let (position, moved) = self.with_list(|list, _| Ok(match self.position {
            Position::End if list.is_empty() => (Position::Start, false),
            Position::End => {
                let index = list.len() - 1;
                (Position::At { index, offset: list.span() - list.tokens()[index].length() }, true)
            },
            Position::At { index, offset } if index > 0 => (Position::At { index: index - 1, offset: offset - list.tokens()[index - 1].length() }, true),
            Position::At { .. } | Position::Start => (Position::Start, false),
        }))?;

        self.position = position;
        Ok(moved)
    }

    /// Moves onto the token at `index`. Past the end, moves after the last
    /// token and returns false.
    pub fn move_index(&mut self, index: usize) -> Result<bool, Error> {
        let position = self.with_list(|list, _| Ok(if index < list.len() {
            Position::At { index, offset: list.offset_of(index) }
        } else {
            Position::End
        }))?;

        self.position = position;
        Ok(matches!(position, Position::At { .. }))
    }

    /// Moves onto the token containing the document offset `offset`. Leaves
    /// the cursor alone and returns false if no token of this list contains it.
    pub fn move_offset(&mut self, offset: usize) -> Result<bool, Error> {
        let base = self.base;
        let found = self.with_list(|list, _| Ok(offset.checked_sub(base).and_then(|relative| list.locate(relative))))?;

        match found {
            Some((index, start)) => {
                self.position = Position::At { index, offset: start };
                Ok(true)
            },
            None => Ok(false),
        }
    }

    pub fn move_start(&mut self) -> Result<(), Error> {
        self.with_list(|_, _| Ok(()))?;
        self.position = Position::Start;
        Ok(())
    }

    pub fn move_end(&mut self) -> Result<(), Error> {
        self.with_list(|_, _| Ok(()))?;
        self.position = Position::End;
        Ok(())
    }

    /// The token under the cursor, or `None` before the first or after the
    /// last token.
    pub fn token(&self) -> Result<Option<TokenInfo<K>>, Error> {
        let base = self.base;
        self.with_list(|list, _| Ok(match self.position {
            Position::At { index, offset } => Some(list.tokens()[index].info(base + offset)),
            _ => None,
        }))
    }

    pub fn token_text(&self) -> Result<Option<String>, Error> {
        let base = self.base;
        self.with_list(|list, text| Ok(match self.position {
            Position::At { index, offset } => {
                let start = base + offset;
                Some(text.to_string_range(start, start + list.tokens()[index].length()))
            },
            _ => None,
        }))
    }

    pub fn index(&self) -> Result<Option<usize>, Error> {
        self.with_list(|_, _| Ok(match self.position {
            Position::At { index, .. } => Some(index),
            _ => None,
        }))
    }

    /// Document offset of the token under the cursor.
    pub fn offset(&self) -> Result<Option<usize>, Error> {
        let base = self.base;
        self.with_list(|_, _| Ok(match self.position {
            Position::At { offset, .. } => Some(base + offset),
            _ => None,
        }))
    }

    /// Snapshots every token of this list.
    pub fn tokens(&self) -> Result<Vec<TokenInfo<K>>, Error> {
        let base = self.base;
        self.with_list(|list, _| Ok(list.infos(base)))
    }

    /// A sequence over the token list embedded in the current token, lexing it
    /// if it hasn't been yet. `None` if the token has no embedding or the
    /// cursor isn't on a token.
    pub fn embedded(&self) -> Result<Option<TokenSequence<K>>, Error> {
        let Position::At { index, offset } = self.position else {
            return self.with_list(|_, _| Ok(None));
        };

        let start = self.base + offset;
        let stamp = self.stamp;
        let skip = self.with_list(|list, text| {
            let built = updater::build_embedded(&list.tokens()[index], list.language(), text, start, stamp.generation())?;
            Ok(built.map(|(_, skip)| skip))
        })?;

        Ok(skip.map(|skip| {
            let mut path = self.path.clone();
            path.push(index);
            TokenSequence {
                hierarchy: self.hierarchy.clone(),
                path,
                base: start + skip,
                stamp,
                position: Position::Start,
            }
        }))
    }
}

impl<K: TokenKind> std::fmt::Debug for TokenSequence<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSequence")
            .field("path", &self.path)
            .field("base", &self.base)
            .field("stamp", &self.stamp)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

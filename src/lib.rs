//! Incrementally maintained token hierarchies over editable text.
//!
//! A [model::text::TextBuffer] holds the text. A [model::hierarchy::TokenHierarchy]
//! attached to it keeps the text lexed by a [logic::lexer::Language], relexing
//! only around each edit, and lexes embedded languages inside tokens on demand.

pub mod util;
pub mod config;

pub mod model;
pub mod logic;
pub mod lang;

pub use model::hierarchy::TokenHierarchy;
pub use model::hierarchy::TokenSequence;
pub use model::text::TextBuffer;

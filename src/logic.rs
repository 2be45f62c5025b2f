pub mod lexer;
pub mod updater;

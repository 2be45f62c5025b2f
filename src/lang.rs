//! Sample languages. `calc` is a small expression language with comments and
//! strings; string literals embed the `escape` language.

pub mod calc;
pub mod escape;

pub mod versioned;
pub mod text;
pub mod token;
pub mod hierarchy;

//! Terminal front end
//!
//! `render` turns domain values into printable text; `session` runs the
//! interactive loop and prints state events as they arrive.

pub mod render;
mod session;

pub use session::ChatRepl;

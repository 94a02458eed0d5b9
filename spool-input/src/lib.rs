//! Shell input handling for spool
//!
//! Turns lines typed at the recorder prompt into validated transport
//! commands. Nothing malformed gets past this crate.

mod commands;
mod parser;

pub use commands::{help_text, Action, HELP};
pub use parser::{InputError, InputHandler};

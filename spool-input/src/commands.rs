//! Shell actions and help

use spool_transport::Command;

/// What a shell line asks for
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Forward to the transport
    Transport(Command),
    /// Print the help screen
    Help,
    /// Clear the terminal
    Clear,
}

/// Verb and description, in the order the help screen shows them
pub const HELP: &[(&str, &str)] = &[
    ("h[elp]", "show this screen again"),
    ("p[lay]", "play every tape"),
    ("s[top]", "stop and rewind to the start"),
    ("[paus]e", "pause, keeping the position"),
    ("r[ec] <tape>", "record the input onto a tape (1-based)"),
    ("f[orward] [speed]", "scrub forward (default 1.5x)"),
    ("b[ackward] [speed]", "scrub backward (default 1.5x)"),
    ("c[lear]", "clear the screen"),
    ("q[uit]", "quit"),
];

pub fn help_text() -> String {
    let width = HELP.iter().map(|(verb, _)| verb.len()).max().unwrap_or(0);
    HELP.iter()
        .map(|(verb, description)| format!("{verb:<width$}  {description}"))
        .collect::<Vec<_>>()
        .join("\n")
}

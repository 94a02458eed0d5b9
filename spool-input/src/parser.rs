//! Line parser for the recorder shell

use crate::commands::Action;
use spool_transport::{Command, DEFAULT_SCRUB_SPEED};
use thiserror::Error;

/// Reasons a shell line is rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("Unknown command '{0}' (h for help)")]
    UnknownCommand(String),
    #[error("Which tape? Usage: r <tape>")]
    MissingTape,
    #[error("'{0}' is not a tape number")]
    InvalidTape(String),
    #[error("No tape {tape}: tapes are numbered 1 to {tapes}")]
    TapeOutOfRange { tape: usize, tapes: usize },
    #[error("'{0}' is not a valid speed (a positive number)")]
    InvalidSpeed(String),
}

/// Parses shell lines for a session with a fixed number of tapes
#[derive(Debug, Clone)]
pub struct InputHandler {
    tapes: usize,
}

impl InputHandler {
    pub fn new(tapes: usize) -> Self {
        Self { tapes }
    }

    /// Parse one line; blank lines yield `None`
    pub fn parse(&self, line: &str) -> Result<Option<Action>, InputError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();

        let action = match verb.to_ascii_lowercase().as_str() {
            "h" | "help" | "?" => Action::Help,
            "p" | "play" => Action::Transport(Command::Play),
            "s" | "stop" => Action::Transport(Command::Stop),
            "e" | "pause" => Action::Transport(Command::Pause),
            "r" | "rec" | "record" => Action::Transport(Command::Record(self.parse_tape(arg)?)),
            "f" | "fwd" | "forward" => Action::Transport(Command::Forward(parse_speed(arg)?)),
            "b" | "bwd" | "backward" | "rewind" => {
                Action::Transport(Command::Rewind(parse_speed(arg)?))
            }
            "c" | "clear" => Action::Clear,
            "q" | "quit" | "exit" => Action::Transport(Command::Quit),
            _ => return Err(InputError::UnknownCommand(verb.to_string())),
        };
        Ok(Some(action))
    }

    /// 1-based tape number typed by the user -> 0-based tape index
    fn parse_tape(&self, arg: Option<&str>) -> Result<usize, InputError> {
        let arg = arg.ok_or(InputError::MissingTape)?;
        let tape: usize = arg
            .parse()
            .map_err(|_| InputError::InvalidTape(arg.to_string()))?;
        if tape == 0 || tape > self.tapes {
            return Err(InputError::TapeOutOfRange {
                tape,
                tapes: self.tapes,
            });
        }
        Ok(tape - 1)
    }
}

fn parse_speed(arg: Option<&str>) -> Result<f64, InputError> {
    let Some(arg) = arg else {
        return Ok(DEFAULT_SCRUB_SPEED);
    };
    match arg.parse::<f64>() {
        Ok(speed) if speed.is_finite() && speed > 0.0 => Ok(speed),
        _ => Err(InputError::InvalidSpeed(arg.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Option<Action>, InputError> {
        InputHandler::new(8).parse(line)
    }

    fn transport(line: &str) -> Command {
        match parse(line) {
            Ok(Some(Action::Transport(command))) => command,
            other => panic!("'{line}' parsed to {other:?}"),
        }
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        assert_eq!(parse(""), Ok(None));
        assert_eq!(parse("   \t"), Ok(None));
    }

    #[test]
    fn test_short_and_long_verbs() {
        assert_eq!(transport("p"), Command::Play);
        assert_eq!(transport("play"), Command::Play);
        assert_eq!(transport("s"), Command::Stop);
        assert_eq!(transport("e"), Command::Pause);
        assert_eq!(transport("pause"), Command::Pause);
        assert_eq!(transport("q"), Command::Quit);
        assert_eq!(transport("  QUIT "), Command::Quit);
        assert_eq!(parse("h"), Ok(Some(Action::Help)));
        assert_eq!(parse("clear"), Ok(Some(Action::Clear)));
    }

    #[test]
    fn test_record_takes_one_based_tape() {
        assert_eq!(transport("r 1"), Command::Record(0));
        assert_eq!(transport("rec 8"), Command::Record(7));
    }

    #[test]
    fn test_record_validates_tape() {
        assert_eq!(parse("r"), Err(InputError::MissingTape));
        assert_eq!(parse("r x"), Err(InputError::InvalidTape("x".into())));
        assert_eq!(parse("r -1"), Err(InputError::InvalidTape("-1".into())));
        assert_eq!(
            parse("r 0"),
            Err(InputError::TapeOutOfRange { tape: 0, tapes: 8 })
        );
        assert_eq!(
            parse("r 9"),
            Err(InputError::TapeOutOfRange { tape: 9, tapes: 8 })
        );
    }

    #[test]
    fn test_scrub_speed_defaults_and_parses() {
        assert_eq!(transport("f"), Command::Forward(DEFAULT_SCRUB_SPEED));
        assert_eq!(transport("b"), Command::Rewind(DEFAULT_SCRUB_SPEED));
        assert_eq!(transport("f 4"), Command::Forward(4.0));
        assert_eq!(transport("backward 0.5"), Command::Rewind(0.5));
    }

    #[test]
    fn test_scrub_speed_rejects_malformed_values() {
        for bad in ["fast", "0", "-2", "inf", "NaN"] {
            assert_eq!(
                parse(&format!("f {bad}")),
                Err(InputError::InvalidSpeed(bad.into())),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_unknown_verb() {
        assert_eq!(parse("x"), Err(InputError::UnknownCommand("x".into())));
    }
}

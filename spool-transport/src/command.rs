//! Transport commands

/// Scrub speed used when forward/backward is requested without a speed
pub const DEFAULT_SCRUB_SPEED: f64 = 1.5;

/// Commands sent from the controller to the coordinator
///
/// Commands are level-triggered: the coordinator keeps applying the last one
/// it received until a new one arrives. Arguments are validated before a
/// command is built (tape index in range, speed finite and positive).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Command {
    /// Silence, rewind to the head of the tape
    #[default]
    Stop,
    /// Silence, keep the position
    Pause,
    /// Play every tape at unit speed
    Play,
    /// Play every tape and record the input onto one (0-based index)
    Record(usize),
    /// Scrub forward at the given rate
    Forward(f64),
    /// Scrub backward at the given rate
    Rewind(f64),
    /// End the session
    Quit,
}

impl Command {
    /// Tape receiving the input, if any
    pub fn selected_tape(&self) -> Option<usize> {
        match self {
            Command::Record(tape) => Some(*tape),
            _ => None,
        }
    }

    /// Signed playback rate: the sign is the direction
    pub fn speed(&self) -> f64 {
        match self {
            Command::Forward(speed) => *speed,
            Command::Rewind(speed) => -*speed,
            _ => 1.0,
        }
    }
}

//! Transport state machine
//!
//! One `Transport` lives inside the coordinator and is advanced once per
//! audio period. It only does position bookkeeping; the coordinator owns
//! the queues around it.

use crate::command::Command;

/// Scrub direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// What the transport is doing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportMode {
    Stopped,
    Paused,
    Playing,
    Recording(usize),
    Scrubbing { direction: Direction, speed: f64 },
}

/// Per-period decision shared by every tape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cue {
    pub speed: f64,
    /// `None` renders silence
    pub read_pos: Option<u64>,
    pub selected_tape: Option<usize>,
}

/// Position bookkeeping for all tapes
#[derive(Debug, Clone)]
pub struct Transport {
    blocksize: u64,
    command: Command,
    read_pos: Option<u64>,
    next_read_pos: u64,
}

impl Transport {
    pub fn new(blocksize: usize) -> Self {
        Self {
            blocksize: blocksize as u64,
            command: Command::Stop,
            read_pos: None,
            next_read_pos: 0,
        }
    }

    /// Latch a new command; it stays in effect until the next one
    pub fn set_command(&mut self, command: Command) {
        self.command = command;
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn next_read_pos(&self) -> u64 {
        self.next_read_pos
    }

    pub fn mode(&self) -> TransportMode {
        match self.command {
            Command::Stop | Command::Quit => TransportMode::Stopped,
            Command::Pause => TransportMode::Paused,
            Command::Play => TransportMode::Playing,
            Command::Record(tape) => TransportMode::Recording(tape),
            Command::Forward(speed) => TransportMode::Scrubbing {
                direction: Direction::Forward,
                speed,
            },
            Command::Rewind(speed) => TransportMode::Scrubbing {
                direction: Direction::Backward,
                speed,
            },
        }
    }

    /// Resolve this period's read position, recording tape and speed
    pub fn cue(&mut self) -> Cue {
        self.read_pos = Some(self.next_read_pos);
        match self.command {
            Command::Stop => {
                self.next_read_pos = 0;
                self.read_pos = None;
            }
            Command::Pause => self.read_pos = None,
            _ => {}
        }
        Cue {
            speed: self.command.speed(),
            read_pos: self.read_pos,
            selected_tape: self.command.selected_tape(),
        }
    }

    /// Move to the position of the next period
    ///
    /// Rewinding into the head of the tape clamps at 0 and latches `Stop`.
    /// Forward scrubbing saturates at `u64::MAX`; reads past the end are silent.
    pub fn advance(&mut self) {
        let Some(pos) = self.read_pos else {
            return;
        };
        match self.command {
            Command::Play | Command::Record(_) => {
                self.next_read_pos = pos.saturating_add(self.blocksize)
            }
            Command::Forward(speed) => {
                self.next_read_pos = pos.saturating_add(self.scrub_step(speed))
            }
            Command::Rewind(speed) => {
                self.next_read_pos = pos.saturating_sub(self.scrub_step(speed));
                if self.next_read_pos == 0 {
                    tracing::debug!("rewound to the head of the tape, stopping");
                    self.command = Command::Stop;
                }
            }
            Command::Stop | Command::Pause | Command::Quit => {}
        }
    }

    /// Frames covered by one period at `speed`
    pub fn scrub_step(&self, speed: f64) -> u64 {
        (speed.abs() * self.blocksize as f64).round() as u64
    }
}

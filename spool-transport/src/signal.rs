//! The shared terminate signal
//!
//! Every fatal condition, wherever it is detected, lands here. The first
//! reason raised wins, and every thread checks the signal cooperatively.
//! Raising and reading are lock-free so the audio callback can use them.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownReason {
    /// The user quit
    Quit = 1,
    /// A playback queue was empty when the audio callback needed a block
    Underrun = 2,
    /// A bounded queue put timed out: the pipeline fell behind real time
    Stall = 3,
    /// The audio backend shut down or lost its device
    BackendShutdown = 4,
    /// The backend delivered a period of the wrong size
    BlocksizeChanged = 5,
    /// A tape could not be read or written
    TapeFault = 6,
}

impl ShutdownReason {
    /// Everything except an explicit quit
    pub fn is_fatal(self) -> bool {
        self != ShutdownReason::Quit
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ShutdownReason::Quit),
            2 => Some(ShutdownReason::Underrun),
            3 => Some(ShutdownReason::Stall),
            4 => Some(ShutdownReason::BackendShutdown),
            5 => Some(ShutdownReason::BlocksizeChanged),
            6 => Some(ShutdownReason::TapeFault),
            _ => None,
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Quit => write!(f, "quit"),
            ShutdownReason::Underrun => write!(f, "buffer underrun (increase the buffer size)"),
            ShutdownReason::Stall => write!(f, "pipeline stalled behind the audio clock"),
            ShutdownReason::BackendShutdown => write!(f, "audio backend shut down"),
            ShutdownReason::BlocksizeChanged => write!(f, "audio period size changed"),
            ShutdownReason::TapeFault => write!(f, "tape read/write failure"),
        }
    }
}

/// Terminate signal shared by the coordinator, the workers, the audio
/// callback and the backend adapter
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    reason: AtomicU8,
    audio_stopped: AtomicBool,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal; returns false if another reason was raised first
    pub fn raise(&self, reason: ShutdownReason) -> bool {
        self.reason
            .compare_exchange(0, reason as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        ShutdownReason::from_u8(self.reason.load(Ordering::Acquire))
    }

    pub fn is_raised(&self) -> bool {
        self.reason.load(Ordering::Acquire) != 0
    }

    /// The audio callback will not run again
    pub fn mark_audio_stopped(&self) {
        self.audio_stopped.store(true, Ordering::Release);
    }

    pub fn audio_stopped(&self) -> bool {
        self.audio_stopped.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reason_wins() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_raised());
        assert_eq!(signal.reason(), None);

        assert!(signal.raise(ShutdownReason::Underrun));
        assert!(!signal.raise(ShutdownReason::Quit));
        assert_eq!(signal.reason(), Some(ShutdownReason::Underrun));
    }

    #[test]
    fn test_only_quit_is_not_fatal() {
        assert!(!ShutdownReason::Quit.is_fatal());
        assert!(ShutdownReason::Underrun.is_fatal());
        assert!(ShutdownReason::BackendShutdown.is_fatal());
    }

    #[test]
    fn test_reasons_survive_encoding() {
        for reason in [
            ShutdownReason::Quit,
            ShutdownReason::Underrun,
            ShutdownReason::Stall,
            ShutdownReason::BackendShutdown,
            ShutdownReason::BlocksizeChanged,
            ShutdownReason::TapeFault,
        ] {
            assert_eq!(ShutdownReason::from_u8(reason as u8), Some(reason));
        }
    }
}

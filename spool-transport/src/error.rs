//! Errors reported by the transport API

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while starting or driving a session
///
/// Failures inside the running pipeline are not errors: they converge on
/// the shared [`ShutdownSignal`](crate::ShutdownSignal) and end the session.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("Expected {expected} tapes, got {found}")]
    TapeCount { expected: usize, found: usize },
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Transport did not accept the command within {0:?}")]
    CommandTimeout(Duration),
    #[error("Transport is not running")]
    NotRunning,
    #[error("{0} thread panicked")]
    ThreadPanicked(String),
}

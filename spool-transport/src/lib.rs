//! Transport engine for spool - a multitrack tape machine
//!
//! This module provides the real-time pipeline behind the recorder:
//! - Transport: the play/stop/pause/record/scrub state machine
//! - Coordinator: issues one instruction per tape per audio period
//! - Worker: reads, resamples and writes one tape on its own thread
//! - Callback: the audio-thread side, monitoring input and draining tapes
//! - Session: wires the bounded queues together and owns the threads

mod block;
mod callback;
mod command;
mod config;
mod coordinator;
mod error;
mod pipeline;
mod session;
mod signal;
mod transport;
mod worker;

pub use block::{CapturedBlock, Envelope, Instruction, RenderedBlock, Samples, WriteRequest};
pub use callback::{AudioCallback, CallbackResult, Ports};
pub use command::{Command, DEFAULT_SCRUB_SPEED};
pub use config::TransportConfig;
pub use error::TransportError;
pub use pipeline::{Fetch, Put};
pub use session::{Session, TransportHandle};
pub use signal::{ShutdownReason, ShutdownSignal};
pub use transport::{Cue, Direction, Transport, TransportMode};
pub use worker::resample_nearest;

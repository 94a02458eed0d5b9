//! Tape storage for spool
//!
//! Every track of the recorder is backed by one tape: a seekable,
//! frame-addressed mono audio store.
//! - Store: the `TapeStore` trait the transport workers drive
//! - Wav: 32-bit float WAV files edited in place
//! - Memory: in-memory tapes for tests and scratch sessions
//! - Reel: naming and opening the tape set of a session

mod memory;
mod reel;
mod store;
mod wav;

pub use memory::MemoryTape;
pub use reel::{open_tape_set, tape_path};
pub use store::{TapeError, TapeStore};
pub use wav::WavTape;

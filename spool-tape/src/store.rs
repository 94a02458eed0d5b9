//! The storage contract shared by every tape implementation

use thiserror::Error;

/// Errors that can occur while reading or writing a tape
#[derive(Error, Debug)]
pub enum TapeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Unsupported format: expected mono 32-bit float, found {channels} channel(s) of {bits}-bit {kind}")]
    UnsupportedFormat {
        channels: u16,
        bits: u16,
        kind: &'static str,
    },
    #[error("Malformed WAV file: {0}")]
    Malformed(&'static str),
    #[error("Tape would exceed the 4 GiB WAV limit")]
    TooLarge,
}

/// A seekable, frame-addressed mono audio store
///
/// Positions and lengths are in frames. A tape is owned by exactly one
/// transport worker, so implementations need `Send` but never `Sync`.
pub trait TapeStore: Send {
    /// Current extent of the tape in frames (grows on writes past the end)
    fn frames(&self) -> u64;

    /// Read up to `buf.len()` frames starting at `pos`
    ///
    /// Returns the number of frames actually read. A short read near the end
    /// of the tape is normal; reading at or after the end returns 0.
    fn read(&mut self, pos: u64, buf: &mut [f32]) -> Result<usize, TapeError>;

    /// Write `samples` starting at `pos`
    ///
    /// Writing past the end extends the tape; any gap between the old end
    /// and `pos` is filled with silence.
    fn write(&mut self, pos: u64, samples: &[f32]) -> Result<(), TapeError>;

    /// Persist pending changes
    fn flush(&mut self) -> Result<(), TapeError>;
}

impl<T: TapeStore + ?Sized> TapeStore for Box<T> {
    fn frames(&self) -> u64 {
        (**self).frames()
    }

    fn read(&mut self, pos: u64, buf: &mut [f32]) -> Result<usize, TapeError> {
        (**self).read(pos, buf)
    }

    fn write(&mut self, pos: u64, samples: &[f32]) -> Result<(), TapeError> {
        (**self).write(pos, samples)
    }

    fn flush(&mut self) -> Result<(), TapeError> {
        (**self).flush()
    }
}

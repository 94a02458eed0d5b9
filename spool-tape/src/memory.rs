//! In-memory tape

use crate::store::{TapeError, TapeStore};
use parking_lot::Mutex;
use std::sync::Arc;

/// A growable tape held in memory
///
/// The sample vector is shared, so a clone of the handle returned by
/// [`MemoryTape::samples`] observes every write the owning worker makes.
#[derive(Debug, Clone, Default)]
pub struct MemoryTape {
    samples: Arc<Mutex<Vec<f32>>>,
}

impl MemoryTape {
    /// Create an empty tape
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tape pre-loaded with content
    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self {
            samples: Arc::new(Mutex::new(samples)),
        }
    }

    /// Shared handle to the tape content
    pub fn samples(&self) -> Arc<Mutex<Vec<f32>>> {
        Arc::clone(&self.samples)
    }

    /// Copy of the current content
    pub fn snapshot(&self) -> Vec<f32> {
        self.samples.lock().clone()
    }
}

impl TapeStore for MemoryTape {
    fn frames(&self) -> u64 {
        self.samples.lock().len() as u64
    }

    fn read(&mut self, pos: u64, buf: &mut [f32]) -> Result<usize, TapeError> {
        let samples = self.samples.lock();
        let len = samples.len() as u64;
        if pos >= len {
            return Ok(0);
        }
        let start = pos as usize;
        let n = buf.len().min(samples.len() - start);
        buf[..n].copy_from_slice(&samples[start..start + n]);
        Ok(n)
    }

    fn write(&mut self, pos: u64, data: &[f32]) -> Result<(), TapeError> {
        let mut samples = self.samples.lock();
        let start = usize::try_from(pos).map_err(|_| TapeError::TooLarge)?;
        let end = start + data.len();
        if end > samples.len() {
            samples.resize(end, 0.0);
        }
        samples[start..end].copy_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TapeError> {
        Ok(())
    }
}

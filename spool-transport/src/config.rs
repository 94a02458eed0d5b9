//! Session geometry

use crate::error::TransportError;
use std::time::Duration;

/// Sizes and rates shared by every stage of the pipeline
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Number of tapes (tracks)
    pub tapes: usize,
    /// Frames per audio period
    pub blocksize: usize,
    /// Capacity of every queue, in periods
    pub buffersize: usize,
    /// Sample rate of the audio backend in Hz
    pub sample_rate: u32,
    /// Keep playing the recording tape while its input is written
    pub punch_in_monitoring: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tapes: 8,
            blocksize: 256,
            buffersize: 20,
            sample_rate: 48000,
            punch_in_monitoring: false,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.tapes == 0 {
            return Err(TransportError::InvalidConfig("at least one tape is required"));
        }
        if self.blocksize == 0 {
            return Err(TransportError::InvalidConfig("blocksize must be positive"));
        }
        if self.buffersize == 0 {
            return Err(TransportError::InvalidConfig("buffersize must be positive"));
        }
        if self.sample_rate == 0 {
            return Err(TransportError::InvalidConfig("sample rate must be positive"));
        }
        Ok(())
    }

    /// Longest a blocking queue put may wait: one full queue of audio
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(
            (self.blocksize * self.buffersize) as f64 / f64::from(self.sample_rate),
        )
    }

    /// Distance between the read position that was monitored and the
    /// position its captured input is written to
    pub fn latency_frames(&self) -> u64 {
        (self.blocksize * self.buffersize) as u64
    }
}

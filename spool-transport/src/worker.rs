//! Tape worker - one thread per tape
//!
//! A worker owns its tape exclusively. It sleeps on its instruction queue,
//! renders one block per instruction (read, resample, reverse) and pushes
//! it to the audio callback, then lands any pending write.

use crate::block::{Envelope, Instruction, RenderedBlock};
use crate::pipeline::{put, Put};
use crate::signal::{ShutdownReason, ShutdownSignal};
use crossbeam_channel::{Receiver, Sender};
use spool_tape::{TapeError, TapeStore};
use std::sync::Arc;
use std::time::Duration;

/// Nearest-index resampling of `input` onto `output`
///
/// `output[k] = input[floor(k * input.len() / output.len())]`. A short input
/// stretches over the whole output; an empty input yields silence.
pub fn resample_nearest(input: &[f32], output: &mut [f32]) {
    let (n, m) = (input.len(), output.len());
    if n == 0 {
        output.fill(0.0);
        return;
    }
    for (k, out) in output.iter_mut().enumerate() {
        *out = input[k * n / m];
    }
}

pub(crate) struct Worker<T: TapeStore> {
    index: usize,
    tape: T,
    blocksize: usize,
    punch_in_monitoring: bool,
    instructions: Receiver<Envelope<Instruction>>,
    playback: Sender<Envelope<RenderedBlock>>,
    signal: Arc<ShutdownSignal>,
    timeout: Duration,
    /// Raw frames read from the tape before resampling
    scratch: Vec<f32>,
}

impl<T: TapeStore> Worker<T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        index: usize,
        tape: T,
        blocksize: usize,
        punch_in_monitoring: bool,
        instructions: Receiver<Envelope<Instruction>>,
        playback: Sender<Envelope<RenderedBlock>>,
        signal: Arc<ShutdownSignal>,
        timeout: Duration,
    ) -> Self {
        Self {
            index,
            tape,
            blocksize,
            punch_in_monitoring,
            instructions,
            playback,
            signal,
            timeout,
            scratch: Vec::with_capacity(blocksize * 2),
        }
    }

    pub(crate) fn run(mut self) {
        tracing::debug!(tape = self.index + 1, "worker started");
        loop {
            match self.instructions.recv() {
                Ok(Envelope::Data(instruction)) => self.handle(instruction),
                Ok(Envelope::Terminate) | Err(_) => break,
            }
        }

        self.forward_terminate();
        if let Err(e) = self.tape.flush() {
            tracing::error!(tape = self.index + 1, error = %e, "failed to flush tape");
        }
        tracing::debug!(tape = self.index + 1, "worker exited");
    }

    fn handle(&mut self, instruction: Instruction) {
        let block = match self.render(&instruction) {
            Ok(block) => block,
            Err(e) => {
                self.fault("read", e);
                RenderedBlock::silence(instruction.read_pos, self.blocksize)
            }
        };

        match put(&self.playback, Envelope::Data(block), self.timeout) {
            Put::Sent => {}
            Put::TimedOut if self.signal.is_raised() => {
                tracing::trace!(tape = self.index + 1, "dropping block during shutdown");
            }
            Put::TimedOut => {
                tracing::error!(tape = self.index + 1, "playback queue stalled");
                self.signal.raise(ShutdownReason::Stall);
            }
            Put::Closed => {
                tracing::debug!(tape = self.index + 1, "audio callback is gone");
            }
        }

        if let Some(write) = instruction.write {
            if let Err(e) = self.tape.write(write.pos, &write.samples) {
                self.fault("write", e);
            }
        }
    }

    /// Render the block the audio callback plays for `instruction`
    ///
    /// Reads `round(|speed| * blocksize)` frames (at most up to the end of
    /// the tape), adapts the rate to what was
    /// actually available and resamples to exactly one period. Out of range,
    /// silent or recording (without punch-in monitoring) periods render
    /// silence tagged with the requested position.
    pub(crate) fn render(&mut self, instruction: &Instruction) -> Result<RenderedBlock, TapeError> {
        let writing = instruction.write.is_some() && !self.punch_in_monitoring;
        let pos = match instruction.read_pos {
            Some(pos) if pos < self.tape.frames() && !writing => pos,
            origin => return Ok(RenderedBlock::silence(origin, self.blocksize)),
        };

        // Never ask for more than the tape holds past `pos`
        let available = self.tape.frames() - pos;
        let requested = ((instruction.speed.abs() * self.blocksize as f64).round() as u64)
            .min(available) as usize;
        self.scratch.resize(requested, 0.0);
        let read = self.tape.read(pos, &mut self.scratch)?;

        let mut samples = vec![0.0; self.blocksize].into_boxed_slice();
        resample_nearest(&self.scratch[..read], &mut samples);
        if instruction.speed < 0.0 {
            samples.reverse();
        }

        Ok(RenderedBlock {
            origin: Some(pos),
            samples,
        })
    }

    fn fault(&self, op: &'static str, error: TapeError) {
        tracing::error!(tape = self.index + 1, op, error = %error, "tape failure");
        self.signal.raise(ShutdownReason::TapeFault);
    }

    /// Pass the termination marker on to the audio callback
    fn forward_terminate(&self) {
        loop {
            match put(&self.playback, Envelope::Terminate, self.timeout) {
                Put::Sent | Put::Closed => return,
                Put::TimedOut if self.signal.audio_stopped() => return,
                Put::TimedOut => {}
            }
        }
    }
}

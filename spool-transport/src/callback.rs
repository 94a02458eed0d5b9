//! Audio callback - the real-time end of the pipeline
//!
//! Invoked by the backend adapter once per period. It never waits on a
//! lock; the only blocking call is the bounded put of the captured input.

use crate::block::{CapturedBlock, Envelope, RenderedBlock, Samples};
use crate::pipeline::{fetch, put, Fetch, Put};
use crate::signal::{ShutdownReason, ShutdownSignal};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

/// What the backend should do after a period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackResult {
    Continue,
    /// Stop invoking the callback; outputs were silenced
    Shutdown(ShutdownReason),
}

/// Port buffers for one period, filled and read by the backend adapter
#[derive(Debug, Clone)]
pub struct Ports {
    pub input: Vec<f32>,
    pub monitor: Vec<f32>,
    pub tracks: Vec<Vec<f32>>,
}

impl Ports {
    pub fn new(tapes: usize, blocksize: usize) -> Self {
        Self {
            input: vec![0.0; blocksize],
            monitor: vec![0.0; blocksize],
            tracks: vec![vec![0.0; blocksize]; tapes],
        }
    }

    /// Frames in this period
    pub fn frames(&self) -> usize {
        self.input.len()
    }

    /// Zero every output port
    pub fn silence(&mut self) {
        self.monitor.fill(0.0);
        for track in &mut self.tracks {
            track.fill(0.0);
        }
    }

    fn is_uniform(&self, frames: usize) -> bool {
        self.input.len() == frames
            && self.monitor.len() == frames
            && self.tracks.iter().all(|t| t.len() == frames)
    }
}

/// The per-period audio callback handed to the backend adapter
pub struct AudioCallback {
    blocksize: usize,
    latency_frames: u64,
    playback: Vec<Receiver<Envelope<RenderedBlock>>>,
    capture: Sender<Envelope<CapturedBlock>>,
    signal: Arc<ShutdownSignal>,
    timeout: Duration,
    /// Read position of the most recently drained block
    last_origin: Option<u64>,
    finished: Option<ShutdownReason>,
}

impl AudioCallback {
    pub(crate) fn new(
        blocksize: usize,
        latency_frames: u64,
        playback: Vec<Receiver<Envelope<RenderedBlock>>>,
        capture: Sender<Envelope<CapturedBlock>>,
        signal: Arc<ShutdownSignal>,
        timeout: Duration,
    ) -> Self {
        Self {
            blocksize,
            latency_frames,
            playback,
            capture,
            signal,
            timeout,
            last_origin: None,
            finished: None,
        }
    }

    pub fn blocksize(&self) -> usize {
        self.blocksize
    }

    pub fn tapes(&self) -> usize {
        self.playback.len()
    }

    /// Blocks ready on the emptiest playback queue
    pub fn ready_blocks(&self) -> usize {
        self.playback.iter().map(|rx| rx.len()).min().unwrap_or(0)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    pub fn signal(&self) -> &Arc<ShutdownSignal> {
        &self.signal
    }

    /// Run one period
    pub fn process(&mut self, ports: &mut Ports) -> CallbackResult {
        if let Some(reason) = self.finished {
            ports.silence();
            return CallbackResult::Shutdown(reason);
        }
        if !ports.is_uniform(self.blocksize) || ports.tracks.len() != self.playback.len() {
            tracing::error!(
                expected = self.blocksize,
                got = ports.frames(),
                "period size changed"
            );
            return self.stop(ports, ShutdownReason::BlocksizeChanged);
        }

        // Zero-latency monitoring, independent of the transport
        ports.monitor.copy_from_slice(&ports.input);

        // Reuse a drained block's storage for the capture so the period does not allocate
        let mut spare: Option<Samples> = None;
        for index in 0..self.playback.len() {
            match fetch(&self.playback[index]) {
                Fetch::Ready(Envelope::Data(block)) => {
                    ports.tracks[index].copy_from_slice(&block.samples);
                    self.last_origin = block.origin;
                    spare = Some(block.samples);
                }
                Fetch::Ready(Envelope::Terminate) => {
                    let reason = self.signal.reason().unwrap_or(ShutdownReason::Quit);
                    return self.stop(ports, reason);
                }
                Fetch::Empty => {
                    tracing::error!(tape = index + 1, "playback queue empty, increase the buffer size");
                    return self.stop(ports, ShutdownReason::Underrun);
                }
                Fetch::Closed => {
                    tracing::error!(tape = index + 1, "tape worker is gone");
                    return self.stop(ports, ShutdownReason::TapeFault);
                }
            }
        }

        let mut samples = spare.unwrap_or_else(|| vec![0.0; self.blocksize].into_boxed_slice());
        samples.copy_from_slice(&ports.input);
        let captured = CapturedBlock {
            write_pos: self.last_origin.map(|pos| pos + self.latency_frames),
            samples,
        };

        match put(&self.capture, Envelope::Data(captured), self.timeout) {
            Put::Sent => CallbackResult::Continue,
            Put::TimedOut if self.signal.is_raised() => CallbackResult::Continue,
            Put::TimedOut => {
                tracing::error!("capture queue stalled");
                self.stop(ports, ShutdownReason::Stall)
            }
            Put::Closed => {
                let reason = self.signal.reason().unwrap_or(ShutdownReason::Quit);
                self.stop(ports, reason)
            }
        }
    }

    /// Silence the outputs, raise the signal and hand the termination
    /// marker back to the coordinator
    fn stop(&mut self, ports: &mut Ports, reason: ShutdownReason) -> CallbackResult {
        ports.silence();
        self.signal.raise(reason);
        let reason = self.signal.reason().unwrap_or(reason);

        if reason.is_fatal() {
            // The coordinator may not be draining yet; never wait here
            let _ = self.capture.try_send(Envelope::Terminate);
        } else {
            let _ = put(&self.capture, Envelope::Terminate, self.timeout);
        }

        self.finished = Some(reason);
        self.signal.mark_audio_stopped();
        tracing::debug!(%reason, "audio callback finished");
        CallbackResult::Shutdown(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::queue;

    const BLOCK: usize = 4;
    const DEPTH: usize = 3;

    struct Harness {
        callback: AudioCallback,
        playback: Vec<Sender<Envelope<RenderedBlock>>>,
        capture: Receiver<Envelope<CapturedBlock>>,
        signal: Arc<ShutdownSignal>,
    }

    fn harness(tapes: usize) -> Harness {
        let signal = Arc::new(ShutdownSignal::new());
        let (capture_tx, capture_rx) = queue(DEPTH);
        let (play_tx, play_rx): (Vec<_>, Vec<_>) = (0..tapes).map(|_| queue(DEPTH)).unzip();
        let callback = AudioCallback::new(
            BLOCK,
            (BLOCK * DEPTH) as u64,
            play_rx,
            capture_tx,
            Arc::clone(&signal),
            Duration::from_millis(20),
        );
        Harness {
            callback,
            playback: play_tx,
            capture: capture_rx,
            signal,
        }
    }

    fn block(origin: Option<u64>, value: f32) -> Envelope<RenderedBlock> {
        Envelope::Data(RenderedBlock {
            origin,
            samples: vec![value; BLOCK].into_boxed_slice(),
        })
    }

    fn ports_with_input(tapes: usize, value: f32) -> Ports {
        let mut ports = Ports::new(tapes, BLOCK);
        ports.input.fill(value);
        ports
    }

    #[test]
    fn test_monitors_input_and_plays_tapes() {
        let mut h = harness(2);
        h.playback[0].send(block(Some(0), 0.25)).unwrap();
        h.playback[1].send(block(Some(0), 0.5)).unwrap();

        let mut ports = ports_with_input(2, 0.75);
        assert_eq!(h.callback.process(&mut ports), CallbackResult::Continue);
        assert_eq!(ports.monitor, vec![0.75; BLOCK]);
        assert_eq!(ports.tracks[0], vec![0.25; BLOCK]);
        assert_eq!(ports.tracks[1], vec![0.5; BLOCK]);
    }

    #[test]
    fn test_capture_is_tagged_one_queue_ahead() {
        let mut h = harness(1);
        h.playback[0].send(block(Some(40), 0.0)).unwrap();

        let mut ports = ports_with_input(1, 0.3);
        h.callback.process(&mut ports);

        match h.capture.try_recv().unwrap() {
            Envelope::Data(captured) => {
                assert_eq!(captured.write_pos, Some(40 + (BLOCK * DEPTH) as u64));
                assert_eq!(captured.samples.to_vec(), vec![0.3; BLOCK]);
            }
            Envelope::Terminate => panic!("unexpected terminate"),
        }
    }

    #[test]
    fn test_capture_of_silent_block_has_no_position() {
        let mut h = harness(1);
        h.playback[0].send(block(None, 0.0)).unwrap();

        let mut ports = ports_with_input(1, 0.3);
        h.callback.process(&mut ports);
        match h.capture.try_recv().unwrap() {
            Envelope::Data(captured) => assert_eq!(captured.write_pos, None),
            Envelope::Terminate => panic!("unexpected terminate"),
        }
    }

    #[test]
    fn test_underrun_silences_every_port_and_raises_signal() {
        let mut h = harness(2);
        h.playback[0].send(block(Some(0), 0.5)).unwrap();
        // tape 2 has nothing ready

        let mut ports = ports_with_input(2, 0.9);
        let result = h.callback.process(&mut ports);

        assert_eq!(result, CallbackResult::Shutdown(ShutdownReason::Underrun));
        assert!(ports.monitor.iter().all(|&s| s == 0.0));
        assert!(ports.tracks.iter().flatten().all(|&s| s == 0.0));
        assert_eq!(h.signal.reason(), Some(ShutdownReason::Underrun));
        assert!(h.signal.audio_stopped());
        assert!(matches!(h.capture.try_recv(), Ok(Envelope::Terminate)));
    }

    #[test]
    fn test_terminate_marker_ends_session_normally() {
        let mut h = harness(1);
        h.signal.raise(ShutdownReason::Quit);
        h.playback[0].send(Envelope::Terminate).unwrap();

        let mut ports = ports_with_input(1, 0.9);
        let result = h.callback.process(&mut ports);
        assert_eq!(result, CallbackResult::Shutdown(ShutdownReason::Quit));
        assert!(ports.monitor.iter().all(|&s| s == 0.0));
        assert!(matches!(h.capture.try_recv(), Ok(Envelope::Terminate)));
    }

    #[test]
    fn test_finished_callback_stays_silent() {
        let mut h = harness(1);
        let mut ports = ports_with_input(1, 0.9);
        h.callback.process(&mut ports);
        assert!(h.callback.is_finished());

        h.playback[0].send(block(Some(0), 0.5)).unwrap();
        let mut ports = ports_with_input(1, 0.9);
        assert_eq!(
            h.callback.process(&mut ports),
            CallbackResult::Shutdown(ShutdownReason::Underrun)
        );
        assert!(ports.tracks[0].iter().all(|&s| s == 0.0));
        assert!(ports.monitor.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_wrong_period_size_is_fatal() {
        let mut h = harness(1);
        h.playback[0].send(block(Some(0), 0.5)).unwrap();
        let mut ports = Ports::new(1, BLOCK * 2);
        assert_eq!(
            h.callback.process(&mut ports),
            CallbackResult::Shutdown(ShutdownReason::BlocksizeChanged)
        );
    }

    #[test]
    fn test_capture_stall_is_fatal_outside_shutdown() {
        let mut h = harness(1);
        let mut ports = ports_with_input(1, 0.1);
        // nobody drains the capture queue
        for _ in 0..DEPTH {
            h.playback[0].send(block(Some(0), 0.0)).unwrap();
            assert_eq!(h.callback.process(&mut ports), CallbackResult::Continue);
        }
        h.playback[0].send(block(Some(0), 0.0)).unwrap();
        assert_eq!(
            h.callback.process(&mut ports),
            CallbackResult::Shutdown(ShutdownReason::Stall)
        );
    }
}

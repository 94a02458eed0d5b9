//! Coordinator - drives every tape in lock-step with the audio clock
//!
//! There is no timer: the loop is paced by backpressure on the instruction
//! queues, which only drain as fast as the audio callback consumes blocks.

use crate::block::{CapturedBlock, Envelope, Instruction};
use crate::command::Command;
use crate::pipeline::{fetch, put, Fetch, Put};
use crate::signal::{ShutdownReason, ShutdownSignal};
use crate::transport::Transport;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct Coordinator {
    transport: Transport,
    commands: Receiver<Command>,
    instructions: Vec<Sender<Envelope<Instruction>>>,
    capture: Receiver<Envelope<CapturedBlock>>,
    signal: Arc<ShutdownSignal>,
    timeout: Duration,
    /// The audio side already returned its termination marker
    audio_done: bool,
}

impl Coordinator {
    pub(crate) fn new(
        blocksize: usize,
        commands: Receiver<Command>,
        instructions: Vec<Sender<Envelope<Instruction>>>,
        capture: Receiver<Envelope<CapturedBlock>>,
        signal: Arc<ShutdownSignal>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport: Transport::new(blocksize),
            commands,
            instructions,
            capture,
            signal,
            timeout,
            audio_done: false,
        }
    }

    pub(crate) fn run(mut self) -> ShutdownReason {
        tracing::debug!(tapes = self.instructions.len(), "coordinator started");
        let reason = loop {
            if let Some(reason) = self.step() {
                break reason;
            }
        };
        self.shutdown();
        reason
    }

    /// One period; returns the reason once the session has to end
    pub(crate) fn step(&mut self) -> Option<ShutdownReason> {
        if let Some(reason) = self.signal.reason() {
            return Some(reason);
        }

        match fetch(&self.commands) {
            Fetch::Ready(Command::Quit) | Fetch::Closed => {
                tracing::info!("quit requested");
                return Some(self.end(ShutdownReason::Quit));
            }
            Fetch::Ready(command) => {
                tracing::debug!(?command, "command");
                self.transport.set_command(command);
            }
            Fetch::Empty => {}
        }

        let cue = self.transport.cue();

        let mut write = match fetch(&self.capture) {
            Fetch::Ready(Envelope::Data(captured)) => captured.into_write(),
            Fetch::Ready(Envelope::Terminate) | Fetch::Closed => {
                self.audio_done = true;
                tracing::warn!("audio callback stopped unexpectedly");
                return Some(self.end(ShutdownReason::BackendShutdown));
            }
            Fetch::Empty => {
                tracing::trace!("no captured block this period");
                None
            }
        };

        for (index, tx) in self.instructions.iter().enumerate() {
            let instruction = Instruction {
                speed: cue.speed,
                read_pos: cue.read_pos,
                write: if cue.selected_tape == Some(index) {
                    write.take()
                } else {
                    None
                },
            };
            match put(tx, Envelope::Data(instruction), self.timeout) {
                Put::Sent => {}
                Put::TimedOut => {
                    tracing::error!(tape = index + 1, "instruction queue stalled");
                    return Some(self.end(ShutdownReason::Stall));
                }
                Put::Closed => {
                    tracing::error!(tape = index + 1, "tape worker is gone");
                    return Some(self.end(ShutdownReason::TapeFault));
                }
            }
        }

        let before = self.transport.command();
        self.transport.advance();
        if self.transport.command() != before {
            tracing::info!(mode = ?self.transport.mode(), "transport stopped at head of tape");
        }
        None
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Raise `reason` unless something else already ended the session
    fn end(&self, reason: ShutdownReason) -> ShutdownReason {
        self.signal.raise(reason);
        self.signal.reason().unwrap_or(reason)
    }

    /// Send the termination marker down every tape and wait for it to come
    /// back from the audio side, so the callback is the last stage to exit
    fn shutdown(&mut self) {
        tracing::debug!("terminating workers");
        for tx in &self.instructions {
            // Workers always drain: their own puts are bounded
            let _ = tx.send(Envelope::Terminate);
        }

        if self.audio_done {
            return;
        }
        tracing::debug!("waiting for the audio callback to finish");
        loop {
            match self.capture.recv_timeout(self.timeout) {
                Ok(Envelope::Terminate) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(Envelope::Data(_)) => {}
                Err(RecvTimeoutError::Timeout) if self.signal.audio_stopped() => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
        self.audio_done = true;
        tracing::debug!("audio callback finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::CapturedBlock;
    use crate::pipeline::queue;

    const BLOCK: usize = 16;

    struct Harness {
        coordinator: Coordinator,
        commands: Sender<Command>,
        instructions: Vec<Receiver<Envelope<Instruction>>>,
        capture: Sender<Envelope<CapturedBlock>>,
        signal: Arc<ShutdownSignal>,
    }

    fn harness(tapes: usize) -> Harness {
        let signal = Arc::new(ShutdownSignal::new());
        let (cmd_tx, cmd_rx) = queue(8);
        let (capture_tx, capture_rx) = queue(8);
        let (sync_tx, sync_rx): (Vec<_>, Vec<_>) = (0..tapes).map(|_| queue(64)).unzip();
        Harness {
            coordinator: Coordinator::new(
                BLOCK,
                cmd_rx,
                sync_tx,
                capture_rx,
                Arc::clone(&signal),
                Duration::from_millis(20),
            ),
            commands: cmd_tx,
            instructions: sync_rx,
            capture: capture_tx,
            signal,
        }
    }

    fn recv(rx: &Receiver<Envelope<Instruction>>) -> Instruction {
        match rx.try_recv().unwrap() {
            Envelope::Data(instruction) => instruction,
            Envelope::Terminate => panic!("unexpected terminate"),
        }
    }

    fn captured(write_pos: u64, value: f32) -> Envelope<CapturedBlock> {
        Envelope::Data(CapturedBlock {
            write_pos: Some(write_pos),
            samples: vec![value; BLOCK].into_boxed_slice(),
        })
    }

    #[test]
    fn test_one_instruction_per_tape_per_period() {
        let mut h = harness(3);
        h.commands.send(Command::Play).unwrap();
        assert_eq!(h.coordinator.step(), None);
        assert_eq!(h.coordinator.step(), None);

        for rx in &h.instructions {
            assert_eq!(rx.len(), 2);
            assert_eq!(recv(rx).read_pos, Some(0));
            assert_eq!(recv(rx).read_pos, Some(BLOCK as u64));
        }
    }

    #[test]
    fn test_commands_are_level_triggered() {
        let mut h = harness(1);
        h.commands.send(Command::Forward(2.0)).unwrap();
        for _ in 0..3 {
            h.coordinator.step();
        }
        let positions: Vec<_> = (0..3).map(|_| recv(&h.instructions[0]).read_pos).collect();
        assert_eq!(positions, vec![Some(0), Some(32), Some(64)]);
        assert_eq!(h.coordinator.transport().next_read_pos(), 96);
    }

    #[test]
    fn test_only_recording_tape_gets_the_write() {
        let mut h = harness(3);
        h.commands.send(Command::Record(1)).unwrap();
        h.capture.send(captured(320, 0.5)).unwrap();
        h.coordinator.step();

        let first = recv(&h.instructions[0]);
        let second = recv(&h.instructions[1]);
        let third = recv(&h.instructions[2]);
        assert!(first.write.is_none());
        assert!(third.write.is_none());
        let write = second.write.expect("recording tape gets the captured block");
        assert_eq!(write.pos, 320);
        assert_eq!(write.samples.to_vec(), vec![0.5; BLOCK]);
    }

    #[test]
    fn test_missing_capture_means_no_write() {
        let mut h = harness(1);
        h.commands.send(Command::Record(0)).unwrap();
        assert_eq!(h.coordinator.step(), None);
        assert!(recv(&h.instructions[0]).write.is_none());
    }

    #[test]
    fn test_captured_block_dropped_when_not_recording() {
        let mut h = harness(2);
        h.commands.send(Command::Play).unwrap();
        h.capture.send(captured(0, 0.5)).unwrap();
        h.coordinator.step();
        assert!(h.instructions.iter().all(|rx| recv(rx).write.is_none()));
    }

    #[test]
    fn test_quit_broadcasts_terminate_and_waits_for_audio() {
        let h = harness(2);
        h.commands.send(Command::Quit).unwrap();
        h.capture.send(captured(0, 0.0)).unwrap();
        h.capture.send(Envelope::Terminate).unwrap();

        let reason = h.coordinator.run();
        assert_eq!(reason, ShutdownReason::Quit);
        assert_eq!(h.signal.reason(), Some(ShutdownReason::Quit));
        for rx in &h.instructions {
            assert!(matches!(rx.try_recv(), Ok(Envelope::Terminate)));
        }
        assert!(h.capture.is_empty());
    }

    #[test]
    fn test_raised_signal_ends_the_loop() {
        let h = harness(1);
        h.signal.raise(ShutdownReason::Underrun);
        h.signal.mark_audio_stopped();
        assert_eq!(h.coordinator.run(), ShutdownReason::Underrun);
        assert!(matches!(h.instructions[0].try_recv(), Ok(Envelope::Terminate)));
    }

    #[test]
    fn test_stalled_worker_is_fatal() {
        let signal = Arc::new(ShutdownSignal::new());
        let (cmd_tx, cmd_rx) = queue(1);
        let (_capture_tx, capture_rx) = queue(1);
        let (sync_tx, _sync_rx) = queue(1);
        let mut coordinator = Coordinator::new(
            BLOCK,
            cmd_rx,
            vec![sync_tx],
            capture_rx,
            Arc::clone(&signal),
            Duration::from_millis(5),
        );
        cmd_tx.send(Command::Play).unwrap();
        assert_eq!(coordinator.step(), None);
        assert_eq!(coordinator.step(), Some(ShutdownReason::Stall));
        assert_eq!(signal.reason(), Some(ShutdownReason::Stall));
    }
}

//! Session - builds the pipeline and owns its threads
//!
//! ```text
//! controller ──ctrl──► coordinator ──sync[i]──► worker[i] ──play[i]──► audio callback
//!                          ▲                                                 │
//!                          └──────────────────── capture ◄───────────────────┘
//! ```
//!
//! Every queue holds `buffersize` periods. The playback and capture queues
//! start full of silence, which sets the pipeline latency.

use crate::block::{CapturedBlock, Envelope, Instruction, RenderedBlock};
use crate::callback::AudioCallback;
use crate::command::Command;
use crate::config::TransportConfig;
use crate::coordinator::Coordinator;
use crate::error::TransportError;
use crate::pipeline::{put, queue, Put};
use crate::signal::{ShutdownReason, ShutdownSignal};
use crate::worker::Worker;
use crossbeam_channel::{Receiver, Sender};
use spool_tape::TapeStore;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Controller-side handle for submitting commands
#[derive(Debug, Clone)]
pub struct TransportHandle {
    commands: Sender<Command>,
    timeout: Duration,
}

impl TransportHandle {
    /// Queue a command, waiting at most one queue of audio for space
    pub fn send(&self, command: Command) -> Result<(), TransportError> {
        match put(&self.commands, command, self.timeout) {
            Put::Sent => Ok(()),
            Put::TimedOut => Err(TransportError::CommandTimeout(self.timeout)),
            Put::Closed => Err(TransportError::NotRunning),
        }
    }

    /// Ask the session to end
    pub fn quit(&self) -> Result<(), TransportError> {
        self.send(Command::Quit)
    }
}

/// A running transport: coordinator and worker threads plus their queues
pub struct Session {
    config: TransportConfig,
    handle: TransportHandle,
    finished: Receiver<ShutdownReason>,
    coordinator: JoinHandle<ShutdownReason>,
    workers: Vec<JoinHandle<()>>,
}

impl Session {
    /// Start the pipeline over `tapes` (one per track, in order)
    ///
    /// Returns the session and the audio callback to hand to the backend.
    /// The callback must then be invoked once per period.
    pub fn start<T>(config: TransportConfig, tapes: Vec<T>) -> Result<(Self, AudioCallback), TransportError>
    where
        T: TapeStore + 'static,
    {
        config.validate()?;
        if tapes.len() != config.tapes {
            return Err(TransportError::TapeCount {
                expected: config.tapes,
                found: tapes.len(),
            });
        }

        let depth = config.buffersize;
        let timeout = config.timeout();
        let signal = Arc::new(ShutdownSignal::new());

        let (ctrl_tx, ctrl_rx) = queue::<Command>(depth);
        let (capture_tx, capture_rx) = queue::<Envelope<CapturedBlock>>(depth);
        let mut sync_txs: Vec<Sender<Envelope<Instruction>>> = Vec::with_capacity(config.tapes);
        let mut play_rxs: Vec<Receiver<Envelope<RenderedBlock>>> = Vec::with_capacity(config.tapes);
        let mut workers = Vec::with_capacity(config.tapes);

        for (index, tape) in tapes.into_iter().enumerate() {
            let (sync_tx, sync_rx) = queue(depth);
            let (play_tx, play_rx) = queue(depth);
            for _ in 0..depth {
                let _ = play_tx.try_send(Envelope::Data(RenderedBlock::silence(None, config.blocksize)));
            }

            let worker = Worker::new(
                index,
                tape,
                config.blocksize,
                config.punch_in_monitoring,
                sync_rx,
                play_tx,
                Arc::clone(&signal),
                timeout,
            );
            workers.push(spawn(format!("spool-tape-{}", index + 1), move || worker.run())?);
            sync_txs.push(sync_tx);
            play_rxs.push(play_rx);
        }

        for _ in 0..depth {
            let _ = capture_tx.try_send(Envelope::Data(CapturedBlock::silence(config.blocksize)));
        }

        let callback = AudioCallback::new(
            config.blocksize,
            config.latency_frames(),
            play_rxs,
            capture_tx,
            Arc::clone(&signal),
            timeout,
        );

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let coordinator = Coordinator::new(
            config.blocksize,
            ctrl_rx,
            sync_txs,
            capture_rx,
            signal,
            timeout,
        );
        let coordinator = spawn("spool-coordinator".to_string(), move || {
            let reason = coordinator.run();
            let _ = done_tx.send(reason);
            reason
        })?;

        tracing::info!(
            tapes = config.tapes,
            blocksize = config.blocksize,
            buffersize = config.buffersize,
            sample_rate = config.sample_rate,
            latency_ms = config.timeout().as_secs_f64() * 1000.0,
            "transport started"
        );

        let session = Self {
            handle: TransportHandle {
                commands: ctrl_tx,
                timeout,
            },
            config,
            finished: done_rx,
            coordinator,
            workers,
        };
        Ok((session, callback))
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn handle(&self) -> TransportHandle {
        self.handle.clone()
    }

    /// Yields the shutdown reason once the coordinator has exited
    pub fn finished(&self) -> &Receiver<ShutdownReason> {
        &self.finished
    }

    /// Wait for every thread to exit and report why the session ended
    pub fn join(self) -> Result<ShutdownReason, TransportError> {
        let reason = self
            .coordinator
            .join()
            .map_err(|_| TransportError::ThreadPanicked("coordinator".into()))?;
        for (index, worker) in self.workers.into_iter().enumerate() {
            worker
                .join()
                .map_err(|_| TransportError::ThreadPanicked(format!("tape {} worker", index + 1)))?;
        }
        tracing::info!(%reason, "transport stopped");
        Ok(reason)
    }
}

fn spawn<F, R>(name: String, f: F) -> Result<JoinHandle<R>, TransportError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(f)
        .map_err(|source| TransportError::Spawn { name, source })
}

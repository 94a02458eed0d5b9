//! spool - multitrack tape recorder
//!
//! Every tape plays back in sync while the input is recorded onto one of
//! them. Commands are typed into a small shell; see `h` for the list.

mod audio;
mod config;
mod shell;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use spool_tape::open_tape_set;
use spool_transport::{Session, ShutdownReason, TransportConfig};

use crate::audio::{AudioDevices, BackendStats, Routing};
use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "spool", version, about = "Multitrack tape recorder")]
struct Cli {
    /// Number of tapes
    #[arg(short = 'n', long)]
    tapes: Option<usize>,

    /// Queue depth in periods; more means more latency and fewer xruns
    #[arg(short = 'b', long)]
    buffersize: Option<usize>,

    /// Frames per period
    #[arg(long)]
    blocksize: Option<usize>,

    /// Directory holding 1.wav, 2.wav, ...
    #[arg(short = 'd', long)]
    dir: Option<PathBuf>,

    /// Capture device name
    #[arg(long)]
    input_device: Option<String>,

    /// Playback device name
    #[arg(long)]
    output_device: Option<String>,

    /// Monitor on output 1 and tape i on output i+1 instead of a mixdown
    #[arg(long)]
    discrete: bool,

    /// Keep playing the recording tape while it is being recorded
    #[arg(long)]
    punch_in: bool,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,

    /// Config file (default: the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings to the config file and continue
    #[arg(long)]
    save_config: bool,

    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

impl Cli {
    /// Flags win over the config file
    fn apply(&self, config: &mut Config) {
        if let Some(tapes) = self.tapes {
            config.tapes = tapes;
        }
        if let Some(buffersize) = self.buffersize {
            config.buffersize = buffersize;
        }
        if let Some(blocksize) = self.blocksize {
            config.blocksize = blocksize;
        }
        if let Some(ref dir) = self.dir {
            config.tape_dir = dir.clone();
        }
        if let Some(ref device) = self.input_device {
            config.input_device = Some(device.clone());
        }
        if let Some(ref device) = self.output_device {
            config.output_device = Some(device.clone());
        }
    }

    fn routing(&self) -> Routing {
        if self.discrete {
            Routing::Discrete
        } else {
            Routing::Mixdown
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);
    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => Config::load(),
    };
    cli.apply(&mut config);

    if cli.save_config {
        config
            .save_to(&config_path)
            .with_context(|| format!("failed to write config {}", config_path.display()))?;
        tracing::info!(path = %config_path.display(), "config saved");
    }

    if cli.list_devices {
        audio::list_devices()?;
        return Ok(ExitCode::SUCCESS);
    }

    let devices = AudioDevices::open(&config)?;
    let transport = TransportConfig {
        tapes: config.tapes,
        blocksize: config.blocksize,
        buffersize: config.buffersize,
        sample_rate: devices.sample_rate(),
        punch_in_monitoring: cli.punch_in,
    };
    transport.validate()?;

    let tapes = open_tape_set(&config.tape_dir, config.tapes, transport.sample_rate)
        .with_context(|| format!("failed to open tapes in {}", config.tape_dir.display()))?;
    let (session, callback) = Session::start(transport, tapes)?;

    let stats = Arc::new(BackendStats::default());
    // Dropping the callback on failure ends the session as a backend shutdown
    let streams = match devices.start(callback, cli.routing(), Arc::clone(&stats)) {
        Ok(streams) => streams,
        Err(e) => {
            let _ = session.join();
            return Err(e);
        }
    };

    if let Err(e) = shell::quit_on_interrupt(session.handle()) {
        tracing::warn!(error = %e, "Ctrl-C will not quit cleanly");
    }
    shell::run(&session, &stats);
    let reason = session.join()?;
    drop(streams);

    Ok(report(reason))
}

/// Logs go to stderr so they don't tangle with the shell prompt
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report(reason: ShutdownReason) -> ExitCode {
    match reason {
        ShutdownReason::Quit => {
            println!("bye");
            ExitCode::SUCCESS
        }
        ShutdownReason::Underrun | ShutdownReason::Stall => {
            eprintln!("stopped: {reason}; try a larger --buffersize");
            ExitCode::FAILURE
        }
        ShutdownReason::BackendShutdown | ShutdownReason::BlocksizeChanged => {
            eprintln!("stopped: {reason}");
            ExitCode::from(2)
        }
        ShutdownReason::TapeFault => {
            eprintln!("stopped: {reason}; tapes were flushed up to the failure");
            ExitCode::from(3)
        }
    }
}

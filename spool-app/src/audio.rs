//! cpal backend
//!
//! The capture stream pushes the first input channel into a lock-free ring;
//! the playback stream pulls one period at a time from it, runs the
//! transport callback and routes the ports onto the device channels.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, StreamError, SupportedStreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};

use spool_transport::{AudioCallback, CallbackResult, Ports, ShutdownReason, ShutdownSignal};

use crate::config::Config;

/// How the ports are laid out on the playback device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Monitor and every tape summed onto every channel
    Mixdown,
    /// Monitor on channel 1, tape i on channel i + 2; ports past the last
    /// device channel are dropped
    Discrete,
}

/// Counters the real-time side bumps and the shell reports
#[derive(Debug, Default)]
pub struct BackendStats {
    /// Periods rendered with fewer captured frames than needed
    input_starved: AtomicU64,
    /// Capture frames dropped because the ring was full
    input_overflow: AtomicU64,
    /// Stream errors reported by the host
    stream_errors: AtomicU64,
}

impl BackendStats {
    /// Total xrun-like events so far
    pub fn xruns(&self) -> u64 {
        self.input_starved.load(Ordering::Relaxed)
            + self.input_overflow.load(Ordering::Relaxed)
            + self.stream_errors.load(Ordering::Relaxed)
    }
}

/// Devices picked and configured, streams not yet built
pub struct AudioDevices {
    input: Device,
    output: Device,
    input_config: StreamConfig,
    output_config: StreamConfig,
    blocksize: usize,
}

impl AudioDevices {
    /// Pick the configured (or default) devices and agree on a sample rate
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let host = cpal::default_host();

        let output = match config.output_device.as_deref() {
            Some(name) => find_device(host.output_devices()?, name)
                .with_context(|| format!("no playback device named '{name}'"))?,
            None => host
                .default_output_device()
                .ok_or_else(|| anyhow!("no audio output device found"))?,
        };
        let input = match config.input_device.as_deref() {
            Some(name) => find_device(host.input_devices()?, name)
                .with_context(|| format!("no capture device named '{name}'"))?,
            None => host
                .default_input_device()
                .ok_or_else(|| anyhow!("no audio input device found"))?,
        };

        let supported_out = output
            .default_output_config()
            .context("failed to get playback config")?;
        let supported_in = input
            .default_input_config()
            .context("failed to get capture config")?;
        require_f32(&supported_out, "playback")?;
        require_f32(&supported_in, "capture")?;

        let sample_rate = supported_out.sample_rate();
        if supported_in.sample_rate() != sample_rate {
            tracing::warn!(
                input = supported_in.sample_rate().0,
                output = sample_rate.0,
                "capture device defaults to another sample rate, requesting the playback rate"
            );
        }

        let buffer_size = buffer_size(&supported_out, config.blocksize);
        let output_config = StreamConfig {
            channels: supported_out.channels(),
            sample_rate,
            buffer_size,
        };
        let input_config = StreamConfig {
            channels: supported_in.channels(),
            sample_rate,
            buffer_size,
        };

        tracing::info!(
            output = %output.name().unwrap_or_else(|_| "Unknown".to_string()),
            input = %input.name().unwrap_or_else(|_| "Unknown".to_string()),
            sample_rate = sample_rate.0,
            channels = output_config.channels,
            ?buffer_size,
            "audio devices"
        );

        Ok(Self {
            input,
            output,
            input_config,
            output_config,
            blocksize: config.blocksize,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.output_config.sample_rate.0
    }

    pub fn output_channels(&self) -> usize {
        self.output_config.channels as usize
    }

    /// Build and start both streams around the transport callback
    pub fn start(
        self,
        callback: AudioCallback,
        routing: Routing,
        stats: Arc<BackendStats>,
    ) -> anyhow::Result<AudioStreams> {
        if callback.blocksize() != self.blocksize {
            bail!(
                "callback expects {} frames per period, devices were opened for {}",
                callback.blocksize(),
                self.blocksize
            );
        }
        let signal = Arc::clone(callback.signal());
        let blocksize = self.blocksize;

        // Room for a few periods of device jitter
        let ring = HeapRb::<f32>::new(blocksize * 8);
        let (mut producer, consumer) = ring.split();
        // One period of headroom: playback may start before capture
        producer.push_iter(std::iter::repeat(0.0).take(blocksize));

        let in_channels = self.input_config.channels.max(1) as usize;
        let in_stats = Arc::clone(&stats);
        let input = self
            .input
            .build_input_stream(
                &self.input_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let frames = data.len() / in_channels;
                    let pushed = producer.push_iter(data.iter().step_by(in_channels).copied());
                    if pushed < frames {
                        in_stats.input_overflow.fetch_add(1, Ordering::Relaxed);
                    }
                },
                stream_error_handler(Arc::clone(&signal), Arc::clone(&stats)),
                None,
            )
            .context("failed to build capture stream")?;

        let mut bridge = OutputBridge::new(
            callback,
            consumer,
            routing,
            self.output_channels(),
            Arc::clone(&stats),
        );
        let output = self
            .output
            .build_output_stream(
                &self.output_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| bridge.fill(data),
                stream_error_handler(Arc::clone(&signal), stats),
                None,
            )
            .context("failed to build playback stream")?;

        input.play().context("failed to start capture")?;
        output.play().context("failed to start playback")?;

        Ok(AudioStreams {
            _input: input,
            _output: output,
        })
    }
}

/// Keeps both streams running until dropped
pub struct AudioStreams {
    _input: Stream,
    _output: Stream,
}

/// Print every device the default host offers
pub fn list_devices() -> anyhow::Result<()> {
    let host = cpal::default_host();
    println!("Host: {}", host.id().name());
    println!("Playback:");
    for device in host.output_devices()? {
        println!("  {}", device.name().unwrap_or_else(|_| "Unknown".to_string()));
    }
    println!("Capture:");
    for device in host.input_devices()? {
        println!("  {}", device.name().unwrap_or_else(|_| "Unknown".to_string()));
    }
    Ok(())
}

fn find_device(mut devices: impl Iterator<Item = Device>, name: &str) -> Option<Device> {
    devices.find(|device| device.name().map(|n| n == name).unwrap_or(false))
}

fn require_f32(config: &SupportedStreamConfig, what: &str) -> anyhow::Result<()> {
    if config.sample_format() != SampleFormat::F32 {
        bail!(
            "{what} device uses {:?} samples, only f32 is supported",
            config.sample_format()
        );
    }
    Ok(())
}

/// Ask for exactly one period per callback when the device allows it
fn buffer_size(config: &SupportedStreamConfig, blocksize: usize) -> cpal::BufferSize {
    let frames = blocksize as u32;
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&frames) => {
            cpal::BufferSize::Fixed(frames)
        }
        cpal::SupportedBufferSize::Range { min, max } => {
            tracing::warn!(blocksize, min, max, "device cannot run at the requested blocksize");
            cpal::BufferSize::Default
        }
        cpal::SupportedBufferSize::Unknown => cpal::BufferSize::Default,
    }
}

fn stream_error_handler(
    signal: Arc<ShutdownSignal>,
    stats: Arc<BackendStats>,
) -> impl FnMut(StreamError) + Send + 'static {
    move |err| match err {
        StreamError::DeviceNotAvailable => {
            tracing::error!("audio device disappeared");
            signal.raise(ShutdownReason::BackendShutdown);
            signal.mark_audio_stopped();
        }
        StreamError::BackendSpecific { err } => {
            stats.stream_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(%err, "audio stream error");
        }
    }
}

/// Adapts fixed-size transport periods to whatever the device asks for
struct OutputBridge {
    callback: AudioCallback,
    ports: Ports,
    input: HeapCons<f32>,
    routing: Routing,
    channels: usize,
    /// Interleaved device samples of the current period
    rendered: Vec<f32>,
    cursor: usize,
    stats: Arc<BackendStats>,
}

impl OutputBridge {
    fn new(
        callback: AudioCallback,
        input: HeapCons<f32>,
        routing: Routing,
        channels: usize,
        stats: Arc<BackendStats>,
    ) -> Self {
        let blocksize = callback.blocksize();
        let channels = channels.max(1);
        let rendered = vec![0.0; blocksize * channels];
        Self {
            ports: Ports::new(callback.tapes(), blocksize),
            callback,
            input,
            routing,
            channels,
            cursor: rendered.len(),
            rendered,
            stats,
        }
    }

    fn fill(&mut self, data: &mut [f32]) {
        let mut written = 0;
        while written < data.len() {
            if self.cursor == self.rendered.len() {
                self.render_period();
            }
            let n = (data.len() - written).min(self.rendered.len() - self.cursor);
            data[written..written + n]
                .copy_from_slice(&self.rendered[self.cursor..self.cursor + n]);
            written += n;
            self.cursor += n;
        }
    }

    fn render_period(&mut self) {
        if self.callback.is_finished() {
            self.rendered.fill(0.0);
            self.cursor = 0;
            return;
        }

        let got = self.input.pop_slice(&mut self.ports.input);
        if got < self.ports.input.len() {
            self.ports.input[got..].fill(0.0);
            self.stats.input_starved.fetch_add(1, Ordering::Relaxed);
        }

        match self.callback.process(&mut self.ports) {
            CallbackResult::Continue => route(&self.ports, self.routing, self.channels, &mut self.rendered),
            CallbackResult::Shutdown(_) => self.rendered.fill(0.0),
        }
        self.cursor = 0;
    }
}

/// Interleave the ports into `out` (`frames * channels` samples)
fn route(ports: &Ports, routing: Routing, channels: usize, out: &mut [f32]) {
    for (frame, chunk) in out.chunks_exact_mut(channels).enumerate() {
        match routing {
            Routing::Mixdown => {
                let sum = ports.monitor[frame]
                    + ports.tracks.iter().map(|track| track[frame]).sum::<f32>();
                chunk.fill(sum);
            }
            Routing::Discrete => {
                chunk.fill(0.0);
                chunk[0] = ports.monitor[frame];
                for (slot, track) in chunk[1..].iter_mut().zip(&ports.tracks) {
                    *slot = track[frame];
                }
            }
        }
    }
}

//! Simple configuration persistence for spool
//!
//! Stores session defaults that command-line flags can override.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Session defaults
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Number of tapes
    pub tapes: usize,
    /// Queue depth in periods
    pub buffersize: usize,
    /// Frames per period requested from the audio device
    pub blocksize: usize,
    /// Directory holding the tape files
    pub tape_dir: PathBuf,
    /// Capture device name (system default when unset)
    pub input_device: Option<String>,
    /// Playback device name (system default when unset)
    pub output_device: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tapes: 8,
            buffersize: 20,
            blocksize: 256,
            tape_dir: PathBuf::from("."),
            input_device: None,
            output_device: None,
        }
    }
}

impl Config {
    /// Load config from the default location
    ///
    /// Returns default config if file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("spool")
            .join("config.txt")
    }

    /// Parse config from simple key=value format
    ///
    /// Unknown keys and unparsable values keep their defaults.
    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();

            match key.trim() {
                "tapes" => set_positive(&mut config.tapes, value),
                "buffersize" => set_positive(&mut config.buffersize, value),
                "blocksize" => set_positive(&mut config.blocksize, value),
                "tape_dir" if !value.is_empty() => config.tape_dir = PathBuf::from(value),
                "input_device" if !value.is_empty() => config.input_device = Some(value.to_string()),
                "output_device" if !value.is_empty() => config.output_device = Some(value.to_string()),
                _ => {}
            }
        }

        config
    }

    /// Serialize config to simple key=value format
    fn serialize(&self) -> String {
        let mut lines = vec![
            "# spool configuration".to_string(),
            format!("tapes={}", self.tapes),
            format!("buffersize={}", self.buffersize),
            format!("blocksize={}", self.blocksize),
            format!("tape_dir={}", self.tape_dir.display()),
        ];
        if let Some(ref device) = self.input_device {
            lines.push(format!("input_device={device}"));
        }
        if let Some(ref device) = self.output_device {
            lines.push(format!("output_device={device}"));
        }
        lines.join("\n")
    }
}

fn set_positive(field: &mut usize, value: &str) {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => *field = n,
        _ => tracing::warn!(value, "ignoring invalid config value"),
    }
}

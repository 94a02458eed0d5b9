//! 32-bit float WAV tapes edited in place
//!
//! `hound` creates new tapes and validates the format of existing ones.
//! Sample data is then addressed directly inside the `data` chunk, which
//! lets a worker seek, overwrite and append without rewriting the file.
//! The RIFF and `data` sizes are patched on flush and on drop.

use crate::store::{TapeError, TapeStore};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const BYTES_PER_FRAME: u64 = 4;

/// A mono, 32-bit IEEE float WAV file used as a tape
#[derive(Debug)]
pub struct WavTape {
    path: PathBuf,
    file: File,
    sample_rate: u32,
    /// Byte offset of the first sample
    data_offset: u64,
    frames: u64,
    /// Header sizes are stale
    dirty: bool,
    scratch: Vec<u8>,
}

impl WavTape {
    /// The on-disk format of every tape
    pub fn spec(sample_rate: u32) -> hound::WavSpec {
        hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        }
    }

    /// Open an existing tape, creating an empty one at `sample_rate` if absent
    pub fn open_or_create(path: &Path, sample_rate: u32) -> Result<Self, TapeError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), sample_rate, "creating tape");
            hound::WavWriter::create(path, Self::spec(sample_rate))?.finalize()?;
        }
        Self::open(path, sample_rate)
    }

    /// Open an existing tape
    ///
    /// A tape recorded at a different sample rate is accepted but plays back
    /// at the session rate, so it is reported.
    pub fn open(path: &Path, sample_rate: u32) -> Result<Self, TapeError> {
        let spec = hound::WavReader::open(path)?.spec();
        if spec.channels != 1
            || spec.bits_per_sample != 32
            || spec.sample_format != hound::SampleFormat::Float
        {
            return Err(TapeError::UnsupportedFormat {
                channels: spec.channels,
                bits: spec.bits_per_sample,
                kind: match spec.sample_format {
                    hound::SampleFormat::Float => "float",
                    hound::SampleFormat::Int => "integer",
                },
            });
        }
        if spec.sample_rate != sample_rate {
            tracing::warn!(
                path = %path.display(),
                tape_rate = spec.sample_rate,
                session_rate = sample_rate,
                "tape sample rate differs from the session"
            );
        }

        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let (data_offset, frames, stale) = locate_data(&mut file)?;
        if stale {
            tracing::warn!(path = %path.display(), frames, "recovered tape with a stale header");
        }
        tracing::debug!(path = %path.display(), frames, "opened tape");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            sample_rate: spec.sample_rate,
            data_offset,
            frames,
            dirty: stale,
            scratch: Vec::new(),
        })
    }

    /// Sample rate stored in the file header
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn seek_frame(&mut self, pos: u64) -> Result<(), TapeError> {
        self.file
            .seek(SeekFrom::Start(self.data_offset + pos * BYTES_PER_FRAME))?;
        Ok(())
    }

    fn write_header_sizes(&mut self) -> Result<(), TapeError> {
        let data_bytes = self.frames * BYTES_PER_FRAME;
        let riff_size = u32::try_from(self.data_offset + data_bytes - 8)
            .map_err(|_| TapeError::TooLarge)?;
        let data_size = u32::try_from(data_bytes).map_err(|_| TapeError::TooLarge)?;

        self.file.seek(SeekFrom::Start(4))?;
        self.file.write_all(&riff_size.to_le_bytes())?;
        self.file.seek(SeekFrom::Start(self.data_offset - 4))?;
        self.file.write_all(&data_size.to_le_bytes())?;
        Ok(())
    }
}

impl TapeStore for WavTape {
    fn frames(&self) -> u64 {
        self.frames
    }

    fn read(&mut self, pos: u64, buf: &mut [f32]) -> Result<usize, TapeError> {
        if pos >= self.frames {
            return Ok(0);
        }
        let n = (buf.len() as u64).min(self.frames - pos) as usize;
        self.scratch.resize(n * BYTES_PER_FRAME as usize, 0);
        self.seek_frame(pos)?;
        self.file.read_exact(&mut self.scratch)?;

        for (out, bytes) in buf.iter_mut().zip(self.scratch.chunks_exact(4)) {
            *out = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        Ok(n)
    }

    fn write(&mut self, pos: u64, samples: &[f32]) -> Result<(), TapeError> {
        let end = pos + samples.len() as u64;
        if self.data_offset + end * BYTES_PER_FRAME - 8 > u64::from(u32::MAX) {
            return Err(TapeError::TooLarge);
        }

        if pos > self.frames {
            // Cut any partial trailing frame, then let the filesystem zero the gap
            self.file
                .set_len(self.data_offset + self.frames * BYTES_PER_FRAME)?;
            self.file.set_len(self.data_offset + pos * BYTES_PER_FRAME)?;
        }
        self.seek_frame(pos)?;

        self.scratch.clear();
        for sample in samples {
            self.scratch.extend_from_slice(&sample.to_le_bytes());
        }
        self.file.write_all(&self.scratch)?;

        if end > self.frames {
            self.frames = end;
            self.dirty = true;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TapeError> {
        if self.dirty {
            self.write_header_sizes()?;
            self.dirty = false;
        }
        self.file.flush()?;
        Ok(())
    }
}

impl Drop for WavTape {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to finalize tape");
        }
    }
}

/// Walk the RIFF chunks and return the sample offset, the frame count and
/// whether the header sizes disagree with the file
///
/// The `data` chunk must be the last chunk so the tape can grow in place,
/// which makes every byte after its header a sample. A session that died
/// before patching its header is recovered that way.
fn locate_data(file: &mut File) -> Result<(u64, u64, bool), TapeError> {
    let file_len = file.metadata()?.len();
    file.seek(SeekFrom::Start(0))?;

    let mut riff = [0u8; 12];
    file.read_exact(&mut riff)?;
    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        return Err(TapeError::Malformed("missing RIFF/WAVE header"));
    }

    let mut offset = 12u64;
    loop {
        if offset + 8 > file_len {
            return Err(TapeError::Malformed("no data chunk"));
        }
        let mut header = [0u8; 8];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut header)?;
        let size = u64::from(u32::from_le_bytes([
            header[4], header[5], header[6], header[7],
        ]));
        let body = offset + 8;

        if &header[0..4] == b"data" {
            let present = file_len - body;
            let frames = present / BYTES_PER_FRAME;
            let stale = size != frames * BYTES_PER_FRAME;
            return Ok((body, frames, stale));
        }
        offset = body + size + (size & 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_reopen_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.wav");

        let tape = WavTape::open_or_create(&path, 48000).unwrap();
        assert_eq!(tape.frames(), 0);
        assert_eq!(tape.sample_rate(), 48000);
        drop(tape);

        let tape = WavTape::open_or_create(&path, 48000).unwrap();
        assert_eq!(tape.frames(), 0);
    }

    #[test]
    fn test_written_samples_survive_reopen_and_hound_reads_them() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.wav");
        let data: Vec<f32> = (0..64).map(|i| i as f32 / 64.0).collect();

        {
            let mut tape = WavTape::open_or_create(&path, 44100).unwrap();
            tape.write(0, &data).unwrap();
            assert_eq!(tape.frames(), 64);
        }

        let mut tape = WavTape::open(&path, 44100).unwrap();
        assert_eq!(tape.frames(), 64);
        let mut buf = vec![0.0; 64];
        assert_eq!(tape.read(0, &mut buf).unwrap(), 64);
        assert_eq!(buf, data);
        drop(tape);

        let mut reader = hound::WavReader::open(&path).unwrap();
        let decoded: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_overwrite_in_place_and_append_with_gap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2.wav");
        let mut tape = WavTape::open_or_create(&path, 48000).unwrap();

        tape.write(0, &[1.0; 8]).unwrap();
        tape.write(2, &[2.0; 2]).unwrap();
        assert_eq!(tape.frames(), 8);

        tape.write(10, &[3.0; 2]).unwrap();
        assert_eq!(tape.frames(), 12);

        let mut buf = vec![9.0; 12];
        assert_eq!(tape.read(0, &mut buf).unwrap(), 12);
        assert_eq!(
            buf,
            vec![1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 3.0, 3.0]
        );
    }

    #[test]
    fn test_unfinalized_tape_reopens_with_every_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("4.wav");

        let mut tape = WavTape::open_or_create(&path, 48000).unwrap();
        tape.write(0, &[0.5; 256]).unwrap();
        // Process killed before the header was patched
        std::mem::forget(tape);

        let mut tape = WavTape::open(&path, 48000).unwrap();
        assert_eq!(tape.frames(), 256);
        let mut buf = vec![0.0; 256];
        assert_eq!(tape.read(0, &mut buf).unwrap(), 256);
        assert!(buf.iter().all(|&s| s == 0.5));
        drop(tape);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.len(), 256);
    }

    #[test]
    fn test_far_append_zero_fills_gap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("5.wav");
        let mut tape = WavTape::open_or_create(&path, 48000).unwrap();
        tape.write(0, &[1.0; 4]).unwrap();
        tape.write(100_000, &[2.0; 4]).unwrap();
        assert_eq!(tape.frames(), 100_004);

        let mut buf = vec![9.0; 100_004];
        assert_eq!(tape.read(0, &mut buf).unwrap(), 100_004);
        assert!(buf[..4].iter().all(|&s| s == 1.0));
        assert!(buf[4..100_000].iter().all(|&s| s == 0.0));
        assert!(buf[100_000..].iter().all(|&s| s == 2.0));
        assert!(tape.scratch.len() < 1024);
    }

    #[test]
    fn test_short_read_at_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("3.wav");
        let mut tape = WavTape::open_or_create(&path, 48000).unwrap();
        tape.write(0, &[0.25; 10]).unwrap();

        let mut buf = vec![0.0; 16];
        assert_eq!(tape.read(6, &mut buf).unwrap(), 4);
        assert_eq!(tape.read(10, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_rejects_integer_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        hound::WavWriter::create(&path, spec).unwrap().finalize().unwrap();

        let err = WavTape::open(&path, 48000).unwrap_err();
        assert!(matches!(err, TapeError::UnsupportedFormat { bits: 16, .. }));
    }
}

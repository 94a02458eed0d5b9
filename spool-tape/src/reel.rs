//! The tape set of a session

use crate::store::TapeError;
use crate::wav::WavTape;
use std::fs;
use std::path::{Path, PathBuf};

/// File backing tape `index` (0-based); tapes are numbered from 1 on disk
pub fn tape_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("{}.wav", index + 1))
}

/// Open `count` tapes in `dir`, creating the directory and any missing file
pub fn open_tape_set(dir: &Path, count: usize, sample_rate: u32) -> Result<Vec<WavTape>, TapeError> {
    fs::create_dir_all(dir)?;
    (0..count)
        .map(|index| WavTape::open_or_create(&tape_path(dir, index), sample_rate))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TapeStore;

    #[test]
    fn test_tape_paths_are_one_based() {
        let dir = Path::new("/tmp/session");
        assert_eq!(tape_path(dir, 0), PathBuf::from("/tmp/session/1.wav"));
        assert_eq!(tape_path(dir, 7), PathBuf::from("/tmp/session/8.wav"));
    }

    #[test]
    fn test_open_tape_set_creates_missing_files() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("tapes");

        let tapes = open_tape_set(&dir, 3, 48000).unwrap();
        assert_eq!(tapes.len(), 3);
        assert!(tapes.iter().all(|t| t.frames() == 0));
        for index in 0..3 {
            assert!(tape_path(&dir, index).exists());
        }
    }
}

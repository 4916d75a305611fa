//! Video decode capability.
//!
//! Decoding itself is an external concern. The rest of the crate only needs
//! a source that can report its length, seek to a frame index and hand back
//! the next frame. Positions follow the usual capture-library convention:
//! the position is the index of the frame that the next [`MediaSource::read`]
//! returns, and every successful read advances it by one.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::{LabelerError, Result};

/// A decoded frame together with the index it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: u64,
    pub data: Vec<u8>,
}

/// A single seekable video stream.
pub trait MediaSource: Send {
    /// Total number of frames the stream reports.
    fn frame_count(&self) -> u64;

    /// Index of the frame the next [`read`](Self::read) returns.
    fn position(&self) -> u64;

    /// Moves the read position to `frame`.
    fn seek(&mut self, frame: u64) -> Result<()>;

    /// Decodes the frame at the current position and advances by one.
    /// Returns `Ok(None)` once the stream is exhausted.
    fn read(&mut self) -> Result<Option<Frame>>;
}

/// Opens media files into [`MediaSource`]s.
pub trait MediaBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>>;
}

/// Backend for headless footage stored as raw frame dumps: each file is a
/// plain concatenation of equally sized frames.
#[derive(Debug, Clone, Copy)]
pub struct RawVideoBackend {
    frame_bytes: usize,
}

impl RawVideoBackend {
    pub fn new(frame_bytes: usize) -> Self {
        Self { frame_bytes }
    }
}

impl MediaBackend for RawVideoBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>> {
        Ok(Box::new(RawVideoSource::open(path, self.frame_bytes)?))
    }
}

/// File-backed source used by [`RawVideoBackend`].
#[derive(Debug)]
pub struct RawVideoSource {
    path: PathBuf,
    file: File,
    frame_bytes: usize,
    frame_count: u64,
    position: u64,
}

impl RawVideoSource {
    pub fn open(path: &Path, frame_bytes: usize) -> Result<Self> {
        if frame_bytes == 0 {
            return Err(LabelerError::msg("raw frames must be at least one byte"));
        }
        if !path.exists() {
            return Err(LabelerError::not_found("video file", path));
        }
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let source = Self {
            path: path.to_path_buf(),
            file,
            frame_bytes,
            frame_count: len / frame_bytes as u64,
            position: 0,
        };
        let trailing = len % frame_bytes as u64;
        if trailing != 0 {
            tracing::warn!(
                path = %source.path().display(),
                trailing,
                "ignoring incomplete trailing frame"
            );
        }
        Ok(source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MediaSource for RawVideoSource {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        self.position = frame.min(self.frame_count);
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if self.position >= self.frame_count {
            return Ok(None);
        }
        let offset = self.position * self.frame_bytes as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0; self.frame_bytes];
        self.file.read_exact(&mut data)?;

        let frame = Frame {
            index: self.position,
            data,
        };
        self.position += 1;
        Ok(Some(frame))
    }
}

/// In-memory stream with a fixed length. Each frame's payload is the
/// little-endian frame index, which makes it easy to check which frame a
/// caller actually received.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    frame_count: u64,
    position: u64,
}

impl SyntheticSource {
    pub fn new(frame_count: u64) -> Self {
        Self {
            frame_count,
            position: 0,
        }
    }
}

impl MediaSource for SyntheticSource {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        self.position = frame.min(self.frame_count);
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if self.position >= self.frame_count {
            return Ok(None);
        }
        let frame = Frame {
            index: self.position,
            data: self.position.to_le_bytes().to_vec(),
        };
        self.position += 1;
        Ok(Some(frame))
    }
}

/// Backend that ignores file contents and hands out [`SyntheticSource`]s of
/// a fixed length. Paths must still exist, so start-up validation behaves
/// exactly as with real footage.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticBackend {
    frame_count: u64,
}

impl SyntheticBackend {
    pub fn new(frame_count: u64) -> Self {
        Self { frame_count }
    }
}

impl MediaBackend for SyntheticBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>> {
        if !path.exists() {
            return Err(LabelerError::not_found("video file", path));
        }
        Ok(Box::new(SyntheticSource::new(self.frame_count)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_advances_on_read() {
        let mut source = SyntheticSource::new(3);
        assert_eq!(source.read().unwrap().unwrap().index, 0);
        assert_eq!(source.position(), 1);

        source.seek(2).unwrap();
        let frame = source.read().unwrap().unwrap();
        assert_eq!(frame.index, 2);
        assert_eq!(frame.data, 2u64.to_le_bytes().to_vec());
        assert!(source.read().unwrap().is_none());
        assert_eq!(source.position(), 3);
    }

    #[test]
    fn raw_source_slices_file_into_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clipF0.raw");
        std::fs::write(&path, [0u8, 0, 1, 1, 2, 2, 9]).unwrap();

        let mut source = RawVideoSource::open(&path, 2).unwrap();
        assert_eq!(source.frame_count(), 3);
        assert_eq!(source.path(), path.as_path());

        source.seek(1).unwrap();
        let frame = source.read().unwrap().unwrap();
        assert_eq!(frame.index, 1);
        assert_eq!(frame.data, vec![1, 1]);
        assert_eq!(source.read().unwrap().unwrap().data, vec![2, 2]);
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn raw_backend_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.raw");
        let Err(err) = RawVideoBackend::new(4).open(&missing) else {
            panic!("opened a file that does not exist");
        };
        assert!(matches!(err, LabelerError::NotFound { .. }));
    }
}

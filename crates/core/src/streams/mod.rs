//! Synchronised access to every camera channel of one recording.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::media::{Frame, MediaBackend, MediaSource};
use crate::{LabelerError, Result};

/// What a stream does when a read runs past its last frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WrapPolicy {
    /// Rewind to frame 0 so the next read starts over (continuous loop).
    Loop,
    /// Keep the channel's last frame on screen and stay at the end.
    Hold,
}

/// Result of reading one channel during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A new frame was decoded for this tick.
    Fresh(u64),
    /// Nothing new; the channel keeps showing its previous frame.
    Stale,
    /// The channel hit its end and was rewound to frame 0. It is stale for
    /// this tick and resumes from the first frame on the next read.
    Wrapped,
}

impl ReadOutcome {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}

/// One camera channel: the decoder plus the frame it currently shows.
pub struct CameraStream {
    name: String,
    source: Box<dyn MediaSource>,
    last_frame: Option<Frame>,
}

impl CameraStream {
    pub fn new(name: impl Into<String>, source: Box<dyn MediaSource>) -> Self {
        Self {
            name: name.into(),
            source,
            last_frame: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_frames(&self) -> u64 {
        self.source.frame_count()
    }

    /// Index of the frame the next read decodes.
    pub fn position(&self) -> u64 {
        self.source.position()
    }

    /// The most recently decoded frame, kept across stale ticks.
    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    fn read(&mut self, policy: WrapPolicy) -> ReadOutcome {
        match self.source.read() {
            Ok(Some(frame)) => {
                let index = frame.index;
                self.last_frame = Some(frame);
                ReadOutcome::Fresh(index)
            }
            Ok(None) => match policy {
                WrapPolicy::Hold => ReadOutcome::Stale,
                WrapPolicy::Loop => match self.source.seek(0) {
                    Ok(()) => ReadOutcome::Wrapped,
                    Err(err) => {
                        tracing::warn!(channel = %self.name, %err, "failed to rewind stream");
                        ReadOutcome::Stale
                    }
                },
            },
            Err(err) => {
                tracing::warn!(channel = %self.name, %err, "frame read failed; keeping last frame");
                ReadOutcome::Stale
            }
        }
    }
}

impl std::fmt::Debug for CameraStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraStream")
            .field("name", &self.name)
            .field("total_frames", &self.total_frames())
            .field("position", &self.position())
            .finish()
    }
}

/// Per-channel results of one [`StreamSet::read_all`] call, in declared
/// camera order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSet {
    entries: Vec<(String, ReadOutcome)>,
}

impl FrameSet {
    pub fn get(&self, channel: &str) -> Option<&ReadOutcome> {
        self.entries
            .iter()
            .find(|(name, _)| name == channel)
            .map(|(_, outcome)| outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ReadOutcome)> {
        self.entries.iter().map(|(name, outcome)| (name.as_str(), outcome))
    }

    pub fn stale_channels(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|(_, outcome)| !outcome.is_fresh())
            .map(|(name, _)| name)
    }
}

/// All camera streams of a recording, positioned by a shared frame index.
///
/// The reference stream alone defines the session's frame count; other
/// channels are trusted to match it.
#[derive(Debug, Default)]
pub struct StreamSet {
    streams: Vec<CameraStream>,
    reference: usize,
    closed: bool,
}

impl StreamSet {
    /// Opens every channel through `backend`.
    ///
    /// Fails with [`LabelerError::NotFound`] if any path is missing and with
    /// [`LabelerError::EmptyMedia`] if the reference stream has no frames.
    /// Nothing stays open when an error is returned.
    pub fn open(
        channel_paths: &[(String, PathBuf)],
        reference: &str,
        backend: &dyn MediaBackend,
    ) -> Result<Self> {
        if let Some((_, missing)) = channel_paths.iter().find(|(_, path)| !path.exists()) {
            return Err(LabelerError::not_found("video file", missing));
        }

        let mut streams = Vec::with_capacity(channel_paths.len());
        for (name, path) in channel_paths {
            let source = backend.open(path)?;
            tracing::debug!(channel = %name, path = %path.display(), frames = source.frame_count(), "opened stream");
            streams.push(CameraStream::new(name.clone(), source));
        }
        Self::from_streams(streams, reference)
    }

    /// Builds a set from already opened streams.
    pub fn from_streams(streams: Vec<CameraStream>, reference: &str) -> Result<Self> {
        for (i, stream) in streams.iter().enumerate() {
            if streams[..i].iter().any(|other| other.name == stream.name) {
                return Err(LabelerError::msg(format!(
                    "channel `{}` is listed twice",
                    stream.name
                )));
            }
        }
        let reference_index = streams
            .iter()
            .position(|stream| stream.name == reference)
            .ok_or_else(|| LabelerError::UnknownChannel(reference.to_string()))?;

        if streams[reference_index].total_frames() == 0 {
            return Err(LabelerError::EmptyMedia {
                channel: reference.to_string(),
            });
        }

        let set = Self {
            streams,
            reference: reference_index,
            closed: false,
        };
        for stream in &set.streams {
            if stream.total_frames() != set.total_frames() {
                tracing::debug!(
                    channel = %stream.name,
                    frames = stream.total_frames(),
                    reference_frames = set.total_frames(),
                    "channel length differs from reference"
                );
            }
        }
        Ok(set)
    }

    /// Frame count of the reference stream.
    pub fn total_frames(&self) -> u64 {
        self.streams
            .get(self.reference)
            .map(CameraStream::total_frames)
            .unwrap_or(0)
    }

    pub fn reference(&self) -> Option<&CameraStream> {
        self.streams.get(self.reference)
    }

    pub fn channel(&self, name: &str) -> Option<&CameraStream> {
        self.streams.iter().find(|stream| stream.name == name)
    }

    pub fn channels(&self) -> impl Iterator<Item = &CameraStream> {
        self.streams.iter()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Moves every stream to `frame`. Callers clamp `frame` to
    /// `[0, total_frames() - 1]` first. Nothing is displayed at the new
    /// position until the next [`read_all`](Self::read_all).
    pub fn seek(&mut self, frame: u64) -> Result<()> {
        for stream in &mut self.streams {
            stream.source.seek(frame)?;
        }
        tracing::trace!(frame, "seeked all streams");
        Ok(())
    }

    /// Reads one frame from every stream, sequentially, as one logical tick.
    pub fn read_all(&mut self, policy: WrapPolicy) -> FrameSet {
        let entries = self
            .streams
            .iter_mut()
            .map(|stream| {
                let outcome = stream.read(policy);
                (stream.name.clone(), outcome)
            })
            .collect();
        FrameSet { entries }
    }

    /// Releases every stream. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        let released = self.streams.len();
        self.streams.clear();
        self.closed = true;
        tracing::info!(released, "closed streams");
    }
}

impl Drop for StreamSet {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::media::SyntheticSource;

    pub(crate) fn synthetic_set(lengths: &[(&str, u64)], reference: &str) -> StreamSet {
        let streams = lengths
            .iter()
            .map(|(name, frames)| CameraStream::new(*name, Box::new(SyntheticSource::new(*frames))))
            .collect();
        StreamSet::from_streams(streams, reference).unwrap()
    }

    #[test]
    fn total_frames_comes_from_reference() {
        let set = synthetic_set(&[("L0", 90), ("F0", 100)], "F0");
        assert_eq!(set.total_frames(), 100);
        assert_eq!(set.reference().unwrap().name(), "F0");
    }

    #[test]
    fn empty_reference_is_rejected() {
        let streams = vec![
            CameraStream::new("L0", Box::new(SyntheticSource::new(10))),
            CameraStream::new("F0", Box::new(SyntheticSource::new(0))),
        ];
        let err = StreamSet::from_streams(streams, "F0").unwrap_err();
        assert!(matches!(err, LabelerError::EmptyMedia { channel } if channel == "F0"));
    }

    #[test]
    fn seek_moves_every_stream() {
        let mut set = synthetic_set(&[("L0", 50), ("F0", 50), ("R0", 50)], "F0");
        set.seek(17).unwrap();
        assert!(set.channels().all(|stream| stream.position() == 17));

        let frames = set.read_all(WrapPolicy::Hold);
        assert!(frames.iter().all(|(_, outcome)| *outcome == ReadOutcome::Fresh(17)));
    }

    #[test]
    fn loop_policy_wraps_to_first_frame() {
        let mut set = synthetic_set(&[("F0", 5)], "F0");
        set.seek(4).unwrap();
        assert_eq!(set.read_all(WrapPolicy::Loop).get("F0"), Some(&ReadOutcome::Fresh(4)));

        assert_eq!(set.read_all(WrapPolicy::Loop).get("F0"), Some(&ReadOutcome::Wrapped));
        assert_eq!(set.reference().unwrap().position(), 0);
        assert_eq!(set.read_all(WrapPolicy::Loop).get("F0"), Some(&ReadOutcome::Fresh(0)));
    }

    #[test]
    fn hold_policy_keeps_last_frame() {
        let mut set = synthetic_set(&[("F0", 5), ("B0", 3)], "F0");
        set.seek(2).unwrap();
        set.read_all(WrapPolicy::Hold);

        let frames = set.read_all(WrapPolicy::Hold);
        assert_eq!(frames.get("F0"), Some(&ReadOutcome::Fresh(3)));
        assert_eq!(frames.get("B0"), Some(&ReadOutcome::Stale));
        assert_eq!(frames.stale_channels().collect::<Vec<_>>(), vec!["B0"]);
        assert_eq!(set.channel("B0").unwrap().last_frame().unwrap().index, 2);
    }

    #[test]
    fn close_is_idempotent() {
        let mut set = synthetic_set(&[("F0", 5)], "F0");
        set.close();
        set.close();
        assert!(set.is_closed());
        assert!(set.is_empty());
    }
}

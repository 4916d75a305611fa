//! Core library for the multi-camera segment labeller.
//!
//! Reviewers step through several time-aligned camera streams and record
//! labelled frame ranges to an append-only log. Each module owns one piece
//! of that workflow (stream access, anchors, random segments, playback,
//! persistence) and [`Session`] ties them together without any global
//! state, so the whole loop can be driven headless from tests.

pub mod config;
pub mod error;
pub mod media;
pub mod playback;
pub mod record;
pub mod segment;
pub mod session;
pub mod streams;

pub use config::AppConfig;
pub use error::{LabelerError, Result};
pub use media::{Frame, MediaBackend, MediaSource, RawVideoBackend, SyntheticBackend, SyntheticSource};
pub use playback::{PlaybackClock, PlaybackController, PlaybackMode, PlaybackOptions, PlaybackState, TickReport};
pub use record::{AnnotationRecord, AnnotationStore, LogSchema};
pub use segment::{clamp_frame, Segment, SegmentGenerator, SegmentModel};
pub use session::{Session, SessionOptions, SessionStatus};
pub use streams::{CameraStream, FrameSet, ReadOutcome, StreamSet, WrapPolicy};

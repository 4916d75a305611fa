use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{AnnotationRecord, LabelerError, Result};

/// Inclusive `[start, end]` frame range shared by every camera channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start: u64,
    pub end: u64,
}

impl Segment {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of frames covered, counting both ends.
    pub fn length(&self) -> u64 {
        self.end.abs_diff(self.start) + 1
    }

    pub fn contains(&self, frame: u64) -> bool {
        let (lo, hi) = (self.start.min(self.end), self.start.max(self.end));
        (lo..=hi).contains(&frame)
    }
}

/// Clamps a possibly negative frame index into `[0, total_frames - 1]`.
pub fn clamp_frame(frame: i64, total_frames: u64) -> u64 {
    let last = total_frames.saturating_sub(1);
    if frame <= 0 {
        0
    } else {
        (frame as u64).min(last)
    }
}

/// Start and end anchors of the range currently being labelled.
///
/// Anchors may be set in either order; they are only ordered when a record
/// is about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentModel {
    total_frames: u64,
    start: u64,
    end: u64,
}

impl SegmentModel {
    /// Creates a model spanning the whole recording.
    pub fn new(total_frames: u64) -> Self {
        Self {
            total_frames,
            start: 0,
            end: total_frames.saturating_sub(1),
        }
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Raw anchors, in the order they were set.
    pub fn anchors(&self) -> Segment {
        Segment::new(self.start, self.end)
    }

    pub fn set_start(&mut self, frame: i64) {
        self.start = clamp_frame(frame, self.total_frames);
    }

    pub fn set_end(&mut self, frame: i64) {
        self.end = clamp_frame(frame, self.total_frames);
    }

    /// Replaces both anchors at once.
    pub fn set(&mut self, segment: Segment) {
        self.set_start(segment.start as i64);
        self.set_end(segment.end as i64);
    }

    /// Anchors ordered so that `start <= end`. Stored anchors stay as-is.
    pub fn normalized(&self) -> Segment {
        Segment::new(self.start.min(self.end), self.start.max(self.end))
    }

    /// Suggested start for the next segment: one past the end of the last
    /// saved record, or the first frame when nothing has been saved yet.
    pub fn next_default_start(&self, last_record: Option<&AnnotationRecord>) -> u64 {
        match last_record {
            None => 0,
            Some(record) => {
                let next = i64::try_from(record.end_frame)
                    .unwrap_or(i64::MAX)
                    .saturating_add(1);
                clamp_frame(next, self.total_frames)
            }
        }
    }
}

/// Draws random segments that respect a minimum length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentGenerator {
    min_segment_length: u64,
}

impl SegmentGenerator {
    pub fn new(min_segment_length: u64) -> Self {
        Self {
            min_segment_length: min_segment_length.max(1),
        }
    }

    pub fn min_segment_length(&self) -> u64 {
        self.min_segment_length
    }

    /// Fails with [`LabelerError::InsufficientLength`] when no segment of
    /// the minimum length fits in `total_frames`.
    pub fn check(&self, total_frames: u64) -> Result<()> {
        if total_frames < self.min_segment_length {
            return Err(LabelerError::InsufficientLength {
                total_frames,
                min_segment_length: self.min_segment_length,
            });
        }
        Ok(())
    }

    /// Draws `start` uniformly from `[0, total - min]`, then `end` uniformly
    /// from `[start + min, total - 1]`. When the start lands on the last
    /// possible position that range is empty and the segment ends on the
    /// final frame instead.
    pub fn generate<R: Rng + ?Sized>(&self, total_frames: u64, rng: &mut R) -> Result<Segment> {
        self.check(total_frames)?;
        let min = self.min_segment_length;
        let last = total_frames - 1;

        let start = rng.gen_range(0..=total_frames - min);
        let end_floor = (start + min).min(last);
        let end = rng.gen_range(end_floor..=last);

        Ok(Segment::new(start, end))
    }
}

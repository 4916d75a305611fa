//! Tick-driven playback over a [`StreamSet`].
//!
//! The controller never owns the streams or the anchors; both are passed in
//! by the caller on every operation, so one context object can hold all the
//! session state and hand out borrows as needed.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::segment::clamp_frame;
use crate::streams::{FrameSet, ReadOutcome, StreamSet, WrapPolicy};
use crate::{Result, Segment, SegmentGenerator, SegmentModel};

/// How the reviewer moves through the footage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackMode {
    /// Scrub anywhere in the recording; anchors only mark what gets saved.
    FreeScrub,
    /// Play inside manually set anchors and stop at the end anchor.
    FixedSegment,
    /// Play inside randomly generated segments.
    RandomSegment,
}

/// Policy knobs for [`PlaybackController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackOptions {
    pub mode: PlaybackMode,
    /// Pausing by hand also moves the end anchor to the current frame.
    pub snap_end_on_pause: bool,
    pub wrap_policy: WrapPolicy,
}

impl PlaybackOptions {
    pub fn for_mode(mode: PlaybackMode) -> Self {
        match mode {
            PlaybackMode::FreeScrub => Self {
                mode,
                snap_end_on_pause: true,
                wrap_policy: WrapPolicy::Loop,
            },
            PlaybackMode::FixedSegment | PlaybackMode::RandomSegment => Self {
                mode,
                snap_end_on_pause: false,
                wrap_policy: WrapPolicy::Hold,
            },
        }
    }

    pub fn with_snap_end_on_pause(mut self, snap: bool) -> Self {
        self.snap_end_on_pause = snap;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Playing,
    Paused,
}

/// Frame shown on the reference channel and whether playback advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackClock {
    current_frame: u64,
    state: PlaybackState,
}

impl PlaybackClock {
    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self {
            current_frame: 0,
            state: PlaybackState::Paused,
        }
    }
}

/// What happened during one [`PlaybackController::tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Per-channel read results, or `None` when paused.
    pub frames: Option<FrameSet>,
    /// Playback reached the end of the active segment and paused.
    pub stopped_at_boundary: bool,
    /// The boundary was overrun and the streams went back to the start.
    pub rewound: bool,
}

#[derive(Debug, Clone)]
pub struct PlaybackController {
    options: PlaybackOptions,
    clock: PlaybackClock,
}

impl PlaybackController {
    /// Every mode starts paused. Random-segment sessions start playing once
    /// their first segment is applied through [`next_segment`](Self::next_segment).
    pub fn new(options: PlaybackOptions) -> Self {
        Self {
            options,
            clock: PlaybackClock::default(),
        }
    }

    pub fn options(&self) -> PlaybackOptions {
        self.options
    }

    pub fn mode(&self) -> PlaybackMode {
        self.options.mode
    }

    pub fn clock(&self) -> PlaybackClock {
        self.clock
    }

    /// Frame currently presented on the reference channel.
    pub fn displayed_frame(&self) -> u64 {
        self.clock.current_frame
    }

    pub fn is_paused(&self) -> bool {
        self.clock.is_paused()
    }

    /// The range playback is confined to, if the mode has one.
    pub fn active_segment(&self, segment: &SegmentModel) -> Option<Segment> {
        match self.options.mode {
            PlaybackMode::FreeScrub => None,
            PlaybackMode::FixedSegment | PlaybackMode::RandomSegment => Some(segment.normalized()),
        }
    }

    /// Inclusive range that jumps and seeks are clamped to.
    pub fn bounds(&self, streams: &StreamSet, segment: &SegmentModel) -> Segment {
        self.active_segment(segment)
            .unwrap_or_else(|| Segment::new(0, streams.total_frames().saturating_sub(1)))
    }

    /// Advances playback by one frame on every stream.
    pub fn tick(&mut self, streams: &mut StreamSet, segment: &SegmentModel) -> Result<TickReport> {
        if self.is_paused() {
            return Ok(TickReport::default());
        }

        let frames = streams.read_all(self.options.wrap_policy);
        self.observe(streams, &frames);
        let mut report = TickReport {
            frames: Some(frames),
            ..Default::default()
        };

        if let Some(active) = self.active_segment(segment) {
            if self.clock.current_frame >= active.end {
                self.clock.state = PlaybackState::Paused;
                report.stopped_at_boundary = true;
                report.rewound = self.rewind_if_overrun(streams, active)?;
                tracing::debug!(
                    frame = self.clock.current_frame,
                    end = active.end,
                    "reached segment end"
                );
            }
        }
        Ok(report)
    }

    /// Flips between playing and paused.
    pub fn toggle_pause(&mut self, streams: &mut StreamSet, segment: &mut SegmentModel) -> Result<()> {
        match self.clock.state {
            PlaybackState::Playing => self.pause(streams, segment),
            PlaybackState::Paused => {
                self.play();
                Ok(())
            }
        }
    }

    pub fn play(&mut self) {
        self.clock.state = PlaybackState::Playing;
    }

    /// Pauses by user request, applying the end-anchor snap when enabled.
    pub fn pause(&mut self, streams: &mut StreamSet, segment: &mut SegmentModel) -> Result<()> {
        self.clock.state = PlaybackState::Paused;
        if self.options.snap_end_on_pause {
            segment.set_end(self.clock.current_frame as i64);
        }
        if let Some(active) = self.active_segment(segment) {
            self.rewind_if_overrun(streams, active)?;
        }
        Ok(())
    }

    /// Moves `offset` frames from the displayed frame, clamped to
    /// [`bounds`](Self::bounds). Returns the frame now displayed.
    pub fn jump(&mut self, streams: &mut StreamSet, segment: &SegmentModel, offset: i64) -> Result<u64> {
        let target = (self.clock.current_frame as i64).saturating_add(offset);
        self.seek_to(streams, segment, target)
    }

    /// Displays `frame`, clamped to [`bounds`](Self::bounds).
    pub fn seek_to(&mut self, streams: &mut StreamSet, segment: &SegmentModel, frame: i64) -> Result<u64> {
        let bounds = self.bounds(streams, segment);
        let target = clamp_frame(frame, streams.total_frames()).clamp(bounds.start, bounds.end);
        self.present(streams, target)?;
        Ok(self.clock.current_frame)
    }

    /// Goes back to the segment start and plays it again.
    pub fn replay(&mut self, streams: &mut StreamSet, segment: &SegmentModel) -> Result<()> {
        let start = self.bounds(streams, segment).start;
        self.present(streams, start)?;
        self.play();
        Ok(())
    }

    /// Installs `new_segment` as the anchors, shows its first frame and plays.
    pub fn apply_segment(
        &mut self,
        streams: &mut StreamSet,
        segment: &mut SegmentModel,
        new_segment: Segment,
    ) -> Result<()> {
        segment.set(new_segment);
        self.present(streams, segment.start())?;
        self.play();
        Ok(())
    }

    /// Draws a fresh random segment and starts playing it.
    pub fn next_segment<R: Rng + ?Sized>(
        &mut self,
        streams: &mut StreamSet,
        segment: &mut SegmentModel,
        generator: &SegmentGenerator,
        rng: &mut R,
    ) -> Result<Segment> {
        let next = generator.generate(streams.total_frames(), rng)?;
        tracing::info!(start = next.start, end = next.end, "generated segment");
        self.apply_segment(streams, segment, next)?;
        Ok(next)
    }

    pub fn set_start_to_current(&self, segment: &mut SegmentModel) {
        segment.set_start(self.clock.current_frame as i64);
    }

    pub fn set_end_to_current(&self, segment: &mut SegmentModel) {
        segment.set_end(self.clock.current_frame as i64);
    }

    /// Seeks every stream to `target` and reads once so that `target`
    /// itself is what the viewer sees. The read leaves the streams
    /// positioned at `target + 1`, ready for the next tick.
    pub fn present(&mut self, streams: &mut StreamSet, target: u64) -> Result<()> {
        streams.seek(target)?;
        let frames = streams.read_all(self.options.wrap_policy);
        let shown = streams
            .reference()
            .and_then(|reference| frames.get(reference.name()))
            .cloned();

        match shown {
            Some(ReadOutcome::Fresh(index)) if index == target => {}
            other => tracing::warn!(
                frame = target,
                outcome = ?other,
                "reference stream did not display the requested frame"
            ),
        }
        self.clock.current_frame = target;
        Ok(())
    }

    fn observe(&mut self, streams: &StreamSet, frames: &FrameSet) {
        let Some(reference) = streams.reference() else {
            return;
        };
        match frames.get(reference.name()) {
            Some(ReadOutcome::Fresh(index)) => self.clock.current_frame = *index,
            Some(outcome) => {
                tracing::trace!(?outcome, frame = self.clock.current_frame, "reference frame stale")
            }
            None => {}
        }
        for channel in frames.stale_channels() {
            tracing::trace!(channel, "channel kept previous frame");
        }
    }

    fn rewind_if_overrun(&mut self, streams: &mut StreamSet, active: Segment) -> Result<bool> {
        if self.clock.current_frame > active.end {
            self.present(streams, active.start)?;
            return Ok(true);
        }
        Ok(false)
    }
}

//! One labelling session: every piece of mutable state lives here and is
//! handed to the components explicitly.

use std::fmt;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::media::MediaBackend;
use crate::playback::{PlaybackController, PlaybackMode, PlaybackOptions, PlaybackState, TickReport};
use crate::streams::StreamSet;
use crate::{
    AnnotationRecord, AnnotationStore, AppConfig, LogSchema, Result, Segment, SegmentGenerator,
    SegmentModel,
};

/// Start-up choices that are not part of the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub playback: PlaybackOptions,
    pub schema: LogSchema,
    pub username: Option<String>,
    /// Fixed seed for segment generation; entropy when absent.
    pub seed: Option<u64>,
}

impl SessionOptions {
    pub fn new(mode: PlaybackMode) -> Self {
        Self {
            playback: PlaybackOptions::for_mode(mode),
            schema: LogSchema::default(),
            username: None,
            seed: None,
        }
    }
}

/// Snapshot for status lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub frame: u64,
    pub total_frames: u64,
    pub anchors: Segment,
    pub state: PlaybackState,
    pub mode: PlaybackMode,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        };
        write!(
            f,
            "Frame: {} / {} (Segment: {}-{}) [{state}]",
            self.frame,
            self.total_frames.saturating_sub(1),
            self.anchors.start,
            self.anchors.end
        )
    }
}

pub struct Session {
    config: AppConfig,
    streams: StreamSet,
    segment: SegmentModel,
    playback: PlaybackController,
    generator: SegmentGenerator,
    store: AnnotationStore,
    rng: StdRng,
    username: Option<String>,
}

impl Session {
    /// Opens the footage, prepares the annotation log and positions the
    /// playhead according to the playback mode.
    ///
    /// Every fatal condition is detected before anything is written.
    pub fn start(config: AppConfig, backend: &dyn MediaBackend, options: SessionOptions) -> Result<Self> {
        config.validate()?;
        let mut streams = StreamSet::open(
            &config.channel_paths(),
            &config.reference_channel,
            backend,
        )?;
        let total_frames = streams.total_frames();
        let generator = SegmentGenerator::new(config.min_segment_length);
        if options.playback.mode == PlaybackMode::RandomSegment {
            generator.check(total_frames)?;
        }

        std::fs::create_dir_all(&config.output_folder)?;
        let store = AnnotationStore::new(config.log_path(), options.schema);
        let mut segment = SegmentModel::new(total_frames);
        let mut playback = PlaybackController::new(options.playback);
        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        match options.playback.mode {
            PlaybackMode::RandomSegment => {
                playback.next_segment(&mut streams, &mut segment, &generator, &mut rng)?;
            }
            PlaybackMode::FreeScrub | PlaybackMode::FixedSegment => {
                let start = segment.next_default_start(store.last_record().as_ref());
                segment.set_start(start as i64);
                segment.set_end(total_frames as i64 - 1);
                playback.present(&mut streams, start)?;
            }
        }

        tracing::info!(
            base_name = %config.base_name,
            channels = streams.len(),
            total_frames,
            mode = ?options.playback.mode,
            log = %store.path().display(),
            "session started"
        );

        Ok(Self {
            config,
            streams,
            segment,
            playback,
            generator,
            store,
            rng,
            username: options.username,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn streams(&self) -> &StreamSet {
        &self.streams
    }

    pub fn segment(&self) -> &SegmentModel {
        &self.segment
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn total_frames(&self) -> u64 {
        self.streams.total_frames()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            frame: self.playback.displayed_frame(),
            total_frames: self.total_frames(),
            anchors: self.segment.anchors(),
            state: self.playback.clock().state(),
            mode: self.playback.mode(),
        }
    }

    pub fn tick(&mut self) -> Result<TickReport> {
        self.playback.tick(&mut self.streams, &self.segment)
    }

    pub fn toggle_pause(&mut self) -> Result<()> {
        self.playback.toggle_pause(&mut self.streams, &mut self.segment)
    }

    pub fn jump(&mut self, offset: i64) -> Result<u64> {
        self.playback.jump(&mut self.streams, &self.segment, offset)
    }

    /// Jumps forward by the configured step.
    pub fn step_forward(&mut self) -> Result<u64> {
        self.jump(self.config.jump_step)
    }

    pub fn step_back(&mut self) -> Result<u64> {
        self.jump(self.config.jump_step.saturating_neg())
    }

    pub fn seek_to(&mut self, frame: i64) -> Result<u64> {
        self.playback.seek_to(&mut self.streams, &self.segment, frame)
    }

    pub fn set_start(&mut self, frame: i64) {
        self.segment.set_start(frame);
    }

    pub fn set_end(&mut self, frame: i64) {
        self.segment.set_end(frame);
    }

    pub fn set_start_to_current(&mut self) {
        self.playback.set_start_to_current(&mut self.segment);
    }

    pub fn set_end_to_current(&mut self) {
        self.playback.set_end_to_current(&mut self.segment);
    }

    pub fn replay(&mut self) -> Result<()> {
        self.playback.replay(&mut self.streams, &self.segment)
    }

    pub fn next_segment(&mut self) -> Result<Segment> {
        self.playback.next_segment(
            &mut self.streams,
            &mut self.segment,
            &self.generator,
            &mut self.rng,
        )
    }

    /// Persists the current anchors under `label`.
    ///
    /// Free-scrub sessions then move both anchors to the suggested start of
    /// the next segment.
    pub fn save(&mut self, label: &str, commentary: &str) -> Result<AnnotationRecord> {
        let range = match self.store.schema() {
            LogSchema::Minimal => {
                let frame = self.playback.displayed_frame();
                Segment::new(frame, frame)
            }
            LogSchema::Range | LogSchema::RangeWithUser => self.segment.normalized(),
        };
        let mut record = AnnotationRecord::new(range.start, range.end, label.trim(), commentary.trim());
        if self.store.schema() == LogSchema::RangeWithUser {
            record.username = Some(self.username.clone().unwrap_or_default());
        }
        self.store.append(&record)?;

        if self.playback.mode() == PlaybackMode::FreeScrub {
            let next = self.segment.next_default_start(Some(&record)) as i64;
            self.segment.set_start(next);
            self.segment.set_end(next);
        }
        Ok(record)
    }

    pub fn last_record(&self) -> Option<AnnotationRecord> {
        self.store.last_record()
    }

    /// Start frame the continuity heuristic proposes right now.
    pub fn suggested_start(&self) -> u64 {
        self.segment.next_default_start(self.store.last_record().as_ref())
    }

    /// Releases the streams. Further calls do nothing.
    pub fn close(&mut self) {
        self.streams.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_name", &self.config.base_name)
            .field("streams", &self.streams)
            .field("segment", &self.segment)
            .field("playback", &self.playback)
            .field("store", &self.store)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_shows_last_index() {
        let status = SessionStatus {
            frame: 12,
            total_frames: 1_000,
            anchors: Segment::new(10, 200),
            state: PlaybackState::Paused,
            mode: PlaybackMode::FreeScrub,
        };
        assert_eq!(status.to_string(), "Frame: 12 / 999 (Segment: 10-200) [paused]");
    }

    #[test]
    fn default_options_follow_mode() {
        let options = SessionOptions::new(PlaybackMode::RandomSegment);
        assert!(!options.playback.snap_end_on_pause);
        assert_eq!(options.schema, LogSchema::Range);
    }
}

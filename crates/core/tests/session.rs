use std::path::Path;

use multicam_labeler_core::{
    AppConfig, LabelerError, LogSchema, PlaybackMode, PlaybackState, RawVideoBackend, Segment,
    SegmentGenerator, Session, SessionOptions,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rstest::*;
use tempfile::TempDir;

const CHANNELS: [&str; 3] = ["L0", "F0", "R0"];

/// Writes one raw file per channel where every frame is a single byte.
fn footage(dir: &Path, frames: usize) -> AppConfig {
    let video_dir = dir.join("videos");
    std::fs::create_dir_all(&video_dir).unwrap();
    for channel in CHANNELS {
        let bytes: Vec<u8> = (0..frames).map(|i| (i % 251) as u8).collect();
        std::fs::write(video_dir.join(format!("run_{channel}.raw")), bytes).unwrap();
    }

    let mut config = AppConfig::new(video_dir, "run_");
    config.channels = CHANNELS.iter().map(|c| c.to_string()).collect();
    config.output_folder = dir.join("outputs");
    config.frame_bytes = 1;
    config
}

fn start(config: AppConfig, mode: PlaybackMode, seed: u64) -> Session {
    let mut options = SessionOptions::new(mode);
    options.seed = Some(seed);
    Session::start(config.clone(), &RawVideoBackend::new(config.frame_bytes), options).unwrap()
}

fn read_log(session: &Session) -> Vec<String> {
    std::fs::read_to_string(session.store().path())
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn missing_channel_aborts_before_writing() {
    let dir = TempDir::new().unwrap();
    let config = footage(dir.path(), 300);
    std::fs::remove_file(config.video_dir.join("run_R0.raw")).unwrap();

    let err = Session::start(
        config.clone(),
        &RawVideoBackend::new(1),
        SessionOptions::new(PlaybackMode::FreeScrub),
    )
    .unwrap_err();

    assert!(matches!(err, LabelerError::NotFound { .. }));
    assert!(err.to_string().contains("run_R0.raw"));
    assert!(!config.output_folder.exists());
}

#[test]
fn empty_reference_stream_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = footage(dir.path(), 300);
    std::fs::write(config.video_dir.join("run_F0.raw"), b"").unwrap();

    let err = Session::start(
        config,
        &RawVideoBackend::new(1),
        SessionOptions::new(PlaybackMode::FreeScrub),
    )
    .unwrap_err();
    assert!(matches!(err, LabelerError::EmptyMedia { .. }));
}

#[test]
fn random_mode_needs_enough_frames() {
    let dir = TempDir::new().unwrap();
    let config = footage(dir.path(), 100);

    let err = Session::start(
        config,
        &RawVideoBackend::new(1),
        SessionOptions::new(PlaybackMode::RandomSegment),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        LabelerError::InsufficientLength {
            total_frames: 100,
            min_segment_length: 150
        }
    ));
}

#[test]
fn random_session_plays_generated_segment_to_its_end() {
    let dir = TempDir::new().unwrap();
    let mut session = start(footage(dir.path(), 1_000), PlaybackMode::RandomSegment, 11);

    let segment = session.segment().anchors();
    assert_eq!(session.status().state, PlaybackState::Playing);
    assert_eq!(session.playback().displayed_frame(), segment.start);
    assert!(segment.length() >= 150);

    let mut ticks = 0;
    while session.status().state == PlaybackState::Playing {
        session.tick().unwrap();
        assert!(segment.contains(session.playback().displayed_frame()));
        ticks += 1;
    }
    assert_eq!(ticks, segment.end - segment.start);
    assert_eq!(session.playback().displayed_frame(), segment.end);
    assert!(session
        .streams()
        .channels()
        .all(|stream| stream.last_frame().unwrap().index == segment.end));
}

#[test]
fn same_seed_gives_same_first_segment() {
    let dir = TempDir::new().unwrap();
    let config = footage(dir.path(), 1_000);
    let first = start(config.clone(), PlaybackMode::RandomSegment, 99)
        .segment()
        .anchors();
    let second = start(config, PlaybackMode::RandomSegment, 99)
        .segment()
        .anchors();
    assert_eq!(first, second);
}

#[test]
fn reversed_anchors_are_saved_in_order() {
    let dir = TempDir::new().unwrap();
    let mut session = start(footage(dir.path(), 1_000), PlaybackMode::FixedSegment, 0);
    session.set_start(500);
    session.set_end(300);

    let record = session.save("brake", "").unwrap();
    assert_eq!((record.start_frame, record.end_frame), (300, 500));
    assert_eq!(
        read_log(&session),
        vec!["start_frame,end_frame,label,commentary", "300,500,brake,"]
    );
    assert_eq!(session.segment().start(), 500);
}

#[test]
fn free_scrub_resumes_after_previous_session() {
    let dir = TempDir::new().unwrap();
    let config = footage(dir.path(), 1_000);

    let mut first = start(config.clone(), PlaybackMode::FreeScrub, 0);
    assert_eq!(first.status().state, PlaybackState::Paused);
    assert_eq!(first.segment().anchors(), Segment::new(0, 999));
    first.set_end(149);
    first.save("lane keep", "straight road").unwrap();
    assert_eq!(first.segment().anchors(), Segment::new(150, 150));
    first.close();
    first.close();
    assert!(first.streams().is_closed());

    let second = start(config, PlaybackMode::FreeScrub, 0);
    assert_eq!(second.suggested_start(), 150);
    assert_eq!(second.segment().anchors(), Segment::new(150, 999));
    assert_eq!(second.playback().displayed_frame(), 150);
}

#[test]
fn pause_in_free_scrub_marks_end_anchor() {
    let dir = TempDir::new().unwrap();
    let mut session = start(footage(dir.path(), 600), PlaybackMode::FreeScrub, 0);
    session.seek_to(200).unwrap();
    session.set_start_to_current();

    session.toggle_pause().unwrap();
    for _ in 0..25 {
        session.tick().unwrap();
    }
    session.toggle_pause().unwrap();

    assert_eq!(session.segment().anchors(), Segment::new(200, 225));
}

#[test]
fn user_schema_records_reviewer() {
    let dir = TempDir::new().unwrap();
    let config = footage(dir.path(), 400);
    let mut options = SessionOptions::new(PlaybackMode::RandomSegment);
    options.schema = LogSchema::RangeWithUser;
    options.username = Some("reviewer-7".to_string());
    options.seed = Some(5);
    let mut session = Session::start(config, &RawVideoBackend::new(1), options).unwrap();

    session.save("turn left", "protected").unwrap();
    session.next_segment().unwrap();
    session.save("turn right", "").unwrap();

    let rows = read_log(&session);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], "start_frame,end_frame,label,commentary,username");
    assert!(rows[1].ends_with(",turn left,protected,reviewer-7"));
    assert_eq!(
        session.last_record().unwrap().username.as_deref(),
        Some("reviewer-7")
    );
}

#[rstest]
#[case(150, 150)]
#[case(151, 150)]
#[case(1_000, 150)]
#[case(10, 1)]
#[case(5_000, 4_999)]
fn generated_segments_respect_bounds(#[case] total: u64, #[case] min: u64) {
    let generator = SegmentGenerator::new(min);
    let mut rng = StdRng::seed_from_u64(total ^ min);

    for _ in 0..500 {
        let segment = generator.generate(total, &mut rng).unwrap();
        assert!(segment.start <= segment.end);
        assert!(segment.end <= total - 1);
        assert!(segment.end - segment.start + 1 >= min);
    }
}

#[rstest]
#[case(PlaybackMode::FreeScrub)]
#[case(PlaybackMode::FixedSegment)]
#[case(PlaybackMode::RandomSegment)]
fn jumps_never_leave_bounds(#[case] mode: PlaybackMode) {
    let dir = TempDir::new().unwrap();
    let mut session = start(footage(dir.path(), 800), mode, 21);
    if mode == PlaybackMode::FixedSegment {
        session.set_start(600);
        session.set_end(250);
    }
    let bounds = session
        .playback()
        .bounds(session.streams(), session.segment());
    let mut rng = StdRng::seed_from_u64(8);

    for _ in 0..200 {
        let offset = rng.gen_range(-400..=400);
        let shown = session.jump(offset).unwrap();
        assert!(bounds.contains(shown), "{shown} outside {bounds:?}");
        let reference = session.streams().reference().unwrap();
        assert_eq!(reference.last_frame().unwrap().index, shown);
    }
}

#[test]
fn extreme_steps_clamp_to_footage() {
    let dir = TempDir::new().unwrap();
    let mut config = footage(dir.path(), 500);
    config.jump_step = i64::MAX;
    let mut session = start(config, PlaybackMode::FreeScrub, 0);
    session.seek_to(250).unwrap();

    assert_eq!(session.step_back().unwrap(), 0);
    assert_eq!(session.step_forward().unwrap(), 499);
    assert_eq!(session.jump(i64::MIN).unwrap(), 0);
}

#[test]
fn non_positive_jump_step_is_rejected_at_start() {
    let dir = TempDir::new().unwrap();
    let mut config = footage(dir.path(), 500);
    config.jump_step = i64::MIN;

    let err = Session::start(
        config.clone(),
        &RawVideoBackend::new(1),
        SessionOptions::new(PlaybackMode::FreeScrub),
    )
    .unwrap_err();
    assert!(matches!(err, LabelerError::InvalidSetting { .. }));
    assert!(!config.output_folder.exists());
}

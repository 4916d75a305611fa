mod commands;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use multicam_labeler_core::{
    AnnotationStore, AppConfig, LogSchema, PlaybackMode, RawVideoBackend, Result, SegmentGenerator,
    SegmentModel, Session, SessionOptions, StreamSet,
};
use rand::{rngs::StdRng, SeedableRng};
use tracing_subscriber::EnvFilter;

use crate::commands::{Command, HELP};

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Label {
            settings,
            mode,
            schema,
            user,
            seed,
            snap_end_on_pause,
        } => {
            let mut options = SessionOptions::new(mode.into());
            options.schema = schema.into();
            options.username = user;
            options.seed = seed;
            if let Some(snap) = snap_end_on_pause {
                options.playback = options.playback.with_snap_end_on_pause(snap);
            }
            run_label(&settings, options)
        }
        Commands::Generate {
            total,
            min,
            seed,
            count,
        } => run_generate(total, min, seed, count),
        Commands::Resume { settings, schema } => run_resume(&settings, schema.into()),
        Commands::Config { settings } => run_config(&settings),
    };

    if let Err(err) = &outcome {
        tracing::error!(fatal = err.is_startup_fatal(), "{err}");
    }
    outcome
}

fn run_label(settings: &Path, options: SessionOptions) -> Result<()> {
    let config = AppConfig::load(settings)?;
    let backend = RawVideoBackend::new(config.frame_bytes);
    let mut session = Session::start(config, &backend, options)?;
    let interval = Duration::from_millis(session.config().tick_interval_ms.max(1));

    println!("{}", session.status());
    println!("type `h` for help");

    let input = spawn_input_reader();
    let mut next_tick = Instant::now();

    'session: loop {
        loop {
            match input.try_recv() {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => match Command::parse(&line) {
                    Ok(Command::Quit) => break 'session,
                    Ok(command) => {
                        if let Err(err) = apply(&mut session, command) {
                            eprintln!("error: {err}");
                        }
                    }
                    Err(message) => eprintln!("{message}"),
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'session,
            }
        }

        match session.tick() {
            Ok(report) if report.stopped_at_boundary => println!("{}", session.status()),
            Ok(_) => {}
            Err(err) => tracing::warn!(%err, "tick failed"),
        }

        next_tick += interval;
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        } else {
            next_tick = now;
        }
    }

    session.close();
    Ok(())
}

fn apply(session: &mut Session, command: Command) -> Result<()> {
    match command {
        Command::TogglePause => session.toggle_pause()?,
        Command::Forward(None) => {
            session.step_forward()?;
        }
        Command::Back(None) => {
            session.step_back()?;
        }
        Command::Forward(Some(_)) | Command::Back(Some(_)) | Command::Jump(_) => {
            if let Some(offset) = command.offset(session.config().jump_step) {
                session.jump(offset)?;
            }
        }
        Command::Seek(frame) => {
            session.seek_to(frame)?;
        }
        Command::Start(Some(frame)) => session.set_start(frame),
        Command::Start(None) => session.set_start_to_current(),
        Command::End(Some(frame)) => session.set_end(frame),
        Command::End(None) => session.set_end_to_current(),
        Command::Replay => session.replay()?,
        Command::Next => {
            session.next_segment()?;
        }
        Command::Save { label, commentary } => {
            let record = session.save(&label, &commentary)?;
            println!(
                "saved {}-{} `{}`",
                record.start_frame, record.end_frame, record.label
            );
        }
        Command::Status => {}
        Command::Help => {
            println!("{HELP}");
            return Ok(());
        }
        Command::Quit => return Ok(()),
    }
    println!("{}", session.status());
    Ok(())
}

/// Forwards terminal lines to the session loop. Only the loop thread ever
/// touches session state.
fn spawn_input_reader() -> Receiver<String> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if sender.send(line).is_err() {
                break;
            }
        }
    });
    receiver
}

fn run_generate(total: u64, min: u64, seed: Option<u64>, count: usize) -> Result<()> {
    let generator = SegmentGenerator::new(min);
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    tracing::info!(total, min, ?seed, count, "generating segments");

    for _ in 0..count {
        let segment = generator.generate(total, &mut rng)?;
        println!("{}\t{}", segment.start, segment.end);
    }
    Ok(())
}

fn run_resume(settings: &Path, schema: LogSchema) -> Result<()> {
    let config = AppConfig::load(settings)?;
    let backend = RawVideoBackend::new(config.frame_bytes);
    let mut streams = StreamSet::open(
        &config.channel_paths(),
        &config.reference_channel,
        &backend,
    )?;
    let store = AnnotationStore::new(config.log_path(), schema);
    let last = store.last_record();
    let next = SegmentModel::new(streams.total_frames()).next_default_start(last.as_ref());
    streams.close();

    match last {
        Some(record) => println!(
            "last record: {}-{} `{}` ({})",
            record.start_frame,
            record.end_frame,
            record.label,
            store.path().display()
        ),
        None => println!("no previous records in {}", store.path().display()),
    }
    println!("next start: {next}");
    Ok(())
}

fn run_config(settings: &Path) -> Result<()> {
    let config = AppConfig::load(settings)?;
    println!("{}", config.to_json_pretty()?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-camera driving footage segment labeller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Review footage and save labelled segments.
    Label {
        /// Settings file with `key=value` lines.
        #[arg(short, long, default_value = "settings.txt")]
        settings: PathBuf,
        #[arg(short, long, value_enum, default_value_t = ModeArg::Random)]
        mode: ModeArg,
        /// Column layout of the annotation log.
        #[arg(long, value_enum, default_value_t = SchemaArg::Range)]
        schema: SchemaArg,
        /// Reviewer name stored with each record (user schema only).
        #[arg(short, long)]
        user: Option<String>,
        /// Seed for reproducible random segments.
        #[arg(long)]
        seed: Option<u64>,
        /// Override whether pausing moves the end anchor.
        #[arg(long)]
        snap_end_on_pause: Option<bool>,
    },
    /// Print random segments without opening any footage.
    Generate {
        #[arg(long)]
        total: u64,
        #[arg(long, default_value_t = 150)]
        min: u64,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Show the last saved record and where the next segment would start.
    Resume {
        #[arg(short, long, default_value = "settings.txt")]
        settings: PathBuf,
        #[arg(long, value_enum, default_value_t = SchemaArg::Range)]
        schema: SchemaArg,
    },
    /// Print the resolved settings as JSON.
    Config {
        #[arg(short, long, default_value = "settings.txt")]
        settings: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Free,
    Fixed,
    Random,
}

impl From<ModeArg> for PlaybackMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Free => PlaybackMode::FreeScrub,
            ModeArg::Fixed => PlaybackMode::FixedSegment,
            ModeArg::Random => PlaybackMode::RandomSegment,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SchemaArg {
    Minimal,
    Range,
    User,
}

impl From<SchemaArg> for LogSchema {
    fn from(value: SchemaArg) -> Self {
        match value {
            SchemaArg::Minimal => LogSchema::Minimal,
            SchemaArg::Range => LogSchema::Range,
            SchemaArg::User => LogSchema::RangeWithUser,
        }
    }
}

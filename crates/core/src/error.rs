use std::path::PathBuf;

/// Result alias that carries the custom [`LabelerError`] type.
pub type Result<T> = std::result::Result<T, LabelerError>;

/// Common error type for the core crate.
///
/// Only conditions that abort a session live here. Mid-session faults such
/// as a stale frame on one channel or an unreadable trailing log row are
/// recovered where they happen and never surface as errors.
#[derive(Debug, thiserror::Error)]
pub enum LabelerError {
    /// A required input (media file, settings file, log directory) is missing.
    #[error("{what} not found: {}", path.display())]
    NotFound { what: &'static str, path: PathBuf },
    /// The reference stream reports no frames at all.
    #[error("reference stream `{channel}` contains no frames")]
    EmptyMedia { channel: String },
    /// The footage is shorter than the shortest segment we may generate.
    #[error(
        "video too short for minimum segment length of {min_segment_length} frames \
         ({total_frames} available)"
    )]
    InsufficientLength {
        total_frames: u64,
        min_segment_length: u64,
    },
    #[error("required setting `{0}` is missing")]
    MissingSetting(&'static str),
    #[error("invalid value `{value}` for setting `{key}`: {reason}")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },
    #[error("unknown channel `{0}`")]
    UnknownChannel(String),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("annotation log: {0}")]
    Csv(#[from] csv::Error),
}

impl LabelerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn not_found(what: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            what,
            path: path.into(),
        }
    }

    pub(crate) fn invalid(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error must abort before the playback loop starts.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::EmptyMedia { .. }
                | Self::InsufficientLength { .. }
                | Self::MissingSetting(_)
                | Self::InvalidSetting { .. }
        )
    }
}

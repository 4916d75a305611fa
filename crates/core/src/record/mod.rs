//! Append-only annotation log.
//!
//! Every saved segment becomes one row of a CSV file. The header is written
//! once, when the file is first created or found empty; rows are never
//! rewritten or removed.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::{LabelerError, Result, Segment};

/// A labelled range as persisted in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub start_frame: u64,
    pub end_frame: u64,
    pub label: String,
    pub commentary: String,
    pub username: Option<String>,
}

impl AnnotationRecord {
    pub fn new(
        start_frame: u64,
        end_frame: u64,
        label: impl Into<String>,
        commentary: impl Into<String>,
    ) -> Self {
        Self {
            start_frame,
            end_frame,
            label: label.into(),
            commentary: commentary.into(),
            username: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn segment(&self) -> Segment {
        Segment::new(self.start_frame, self.end_frame)
    }

    /// Copy of the record with `start_frame <= end_frame`.
    pub fn normalized(&self) -> Self {
        let mut record = self.clone();
        if record.start_frame > record.end_frame {
            std::mem::swap(&mut record.start_frame, &mut record.end_frame);
        }
        record
    }
}

/// Column layout of the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogSchema {
    /// `frame, label`: single-frame tags.
    Minimal,
    /// `start_frame, end_frame, label, commentary`.
    #[default]
    Range,
    /// `start_frame, end_frame, label, commentary, username`.
    RangeWithUser,
}

impl LogSchema {
    pub fn header(&self) -> &'static [&'static str] {
        match self {
            Self::Minimal => &["frame", "label"],
            Self::Range => &["start_frame", "end_frame", "label", "commentary"],
            Self::RangeWithUser => &["start_frame", "end_frame", "label", "commentary", "username"],
        }
    }

    fn is_header(&self, row: &StringRecord) -> bool {
        row.get(0)
            .map(|first| first.trim() == self.header()[0])
            .unwrap_or(false)
    }

    fn to_row(&self, record: &AnnotationRecord) -> Vec<String> {
        match self {
            Self::Minimal => vec![record.start_frame.to_string(), record.label.clone()],
            Self::Range => vec![
                record.start_frame.to_string(),
                record.end_frame.to_string(),
                record.label.clone(),
                record.commentary.clone(),
            ],
            Self::RangeWithUser => vec![
                record.start_frame.to_string(),
                record.end_frame.to_string(),
                record.label.clone(),
                record.commentary.clone(),
                record.username.clone().unwrap_or_default(),
            ],
        }
    }

    fn parse_row(&self, row: &StringRecord) -> Option<AnnotationRecord> {
        let field = |i: usize| row.get(i).unwrap_or_default().to_string();
        let frame = |i: usize| row.get(i)?.trim().parse::<u64>().ok();

        match self {
            Self::Minimal => {
                let at = frame(0)?;
                Some(AnnotationRecord::new(at, at, field(1), ""))
            }
            Self::Range | Self::RangeWithUser => {
                let mut record = AnnotationRecord::new(frame(0)?, frame(1)?, field(2), field(3));
                if *self == Self::RangeWithUser {
                    record.username = row.get(4).map(str::to_string);
                }
                Some(record)
            }
        }
    }
}

/// Append-only CSV log of completed segments.
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    path: PathBuf,
    schema: LogSchema,
}

impl AnnotationStore {
    pub fn new(path: impl Into<PathBuf>, schema: LogSchema) -> Self {
        Self {
            path: path.into(),
            schema,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> LogSchema {
        self.schema
    }

    /// Appends `record`, writing the header first if the log is absent or
    /// empty. Reversed ranges are stored with their ends swapped.
    pub fn append(&self, record: &AnnotationRecord) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            if !dir.is_dir() {
                return Err(LabelerError::not_found("annotation log directory", dir));
            }
        }

        let is_empty = std::fs::metadata(&self.path)
            .map(|meta| meta.len() == 0)
            .unwrap_or(true);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        if !is_empty && !ends_with_newline(&mut file)? {
            tracing::warn!(path = %self.path.display(), "terminating truncated trailing row");
            file.write_all(b"\n")?;
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(file);

        if is_empty {
            writer.write_record(self.schema.header())?;
        }
        let record = record.normalized();
        writer.write_record(self.schema.to_row(&record))?;
        writer.flush()?;

        tracing::info!(
            path = %self.path.display(),
            start = record.start_frame,
            end = record.end_frame,
            label = %record.label,
            "saved segment"
        );
        Ok(())
    }

    /// The most recently written record.
    ///
    /// Returns `None` when the log is absent, empty, holds only the header,
    /// or when its last row cannot be parsed. Read failures are logged and
    /// otherwise swallowed.
    pub fn last_record(&self) -> Option<AnnotationRecord> {
        if !self.path.exists() {
            return None;
        }
        let rows = match self.read_rows() {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "could not read annotation log");
                return None;
            }
        };

        let last = rows.last()?;
        if self.schema.is_header(last) {
            return None;
        }
        let parsed = self.schema.parse_row(last);
        if parsed.is_none() {
            tracing::warn!(
                path = %self.path.display(),
                row = ?last,
                "last annotation row is corrupt; ignoring it"
            );
        }
        parsed
    }

    /// Every parsable record in write order. Unparsable rows are skipped.
    pub fn records(&self) -> Result<Vec<AnnotationRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for (line, row) in self.read_rows()?.iter().enumerate() {
            if line == 0 && self.schema.is_header(row) {
                continue;
            }
            match self.schema.parse_row(row) {
                Some(record) => records.push(record),
                None => tracing::warn!(line = line + 1, "skipping unparsable annotation row"),
            }
        }
        Ok(records)
    }

    fn read_rows(&self) -> Result<Vec<StringRecord>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;
        let mut rows = Vec::new();
        for row in reader.records() {
            let row = row?;
            if row.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    if file.seek(SeekFrom::End(0))? == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

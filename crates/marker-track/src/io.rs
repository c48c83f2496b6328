//! JSON I/O for recorded sessions and replay reports.

use std::{
    fs,
    io::{BufWriter, Write},
    path::Path,
};

use marker_track_core::{BackendError, ConfigError, TrackerConfig};
use serde::{Deserialize, Serialize};

use crate::mirror::TemplateSet;
use crate::replay::{RecordedFrame, ReportLine};

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid tracker config: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("replay step must be a positive finite number of seconds (got {0})")]
    InvalidStep(f64),
    #[error("replay of {span}s at {step}s per update exceeds {limit} updates")]
    TooManyUpdates { span: f64, step: f64, limit: u64 },
}

/// A recorded session: engine timing, captured frames and optional
/// payload templates for mirroring.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub frames: Vec<RecordedFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<TemplateSet>,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tracker.validate()
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let raw = fs::read_to_string(path)?;
        let session: Self = serde_json::from_str(&raw)?;
        session.validate()?;
        Ok(session)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    /// Number of detections across all frames.
    pub fn detection_count(&self) -> usize {
        self.frames.iter().map(|f| f.detections.len()).sum()
    }
}

/// Write one JSON object per line.
pub fn write_report<W: Write>(writer: W, lines: &[ReportLine]) -> Result<(), SessionError> {
    let mut out = BufWriter::new(writer);
    for line in lines {
        serde_json::to_writer(&mut out, line)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_report_file(path: impl AsRef<Path>, lines: &[ReportLine]) -> Result<(), SessionError> {
    write_report(fs::File::create(path)?, lines)
}

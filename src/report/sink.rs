//! Append-only side-tables for vulnerable / not-vulnerable flags.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{FlagEntry, FlagType};

/// Flag-row header, mirroring the review-row schema plus the discriminator.
pub const FLAG_HEADERS: [&str; 10] = [
    "flag_id",
    "source_identifier",
    "experiment_name",
    "flagged_timestamp_utc",
    "flagged_comment",
    "time_to_flag_seconds",
    "expected_code",
    "generated_code",
    "input_code",
    "flag_type",
];

/// Writes flag events to per-class CSV files next to the main report.
///
/// Every event is flushed and fsynced before the controller proceeds.
pub struct FlagSink {
    dir: PathBuf,
    experiment_name: String,
}

impl FlagSink {
    pub fn new(reports_dir: impl AsRef<Path>, experiment_name: impl Into<String>) -> Self {
        Self {
            dir: reports_dir.as_ref().join("flagged_entries"),
            experiment_name: experiment_name.into(),
        }
    }

    /// File a flag class is appended to.
    pub fn path_for(&self, flag_type: FlagType) -> PathBuf {
        let suffix = match flag_type {
            FlagType::Vulnerable => "flagged_entries",
            FlagType::NotVulnerableExpected => "safe_entries",
        };
        self.dir
            .join(format!("{}_{}.csv", self.experiment_name, suffix))
    }

    /// Append one flag event; header on file creation, fsync before return.
    pub fn append(&self, entry: &FlagEntry) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(entry.flag_type);
        let is_new = !path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| Error::from_report_io(err, &path))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(FLAG_HEADERS)?;
        }
        writer.write_record([
            entry.flag_id.to_string(),
            entry.source_identifier.clone(),
            entry.experiment_name.clone(),
            entry.flagged_timestamp_utc.to_rfc3339(),
            entry.flagged_comment.clone(),
            format!("{:.2}", entry.time_to_flag_seconds),
            entry.expected_code.clone(),
            entry.generated_code.clone(),
            entry.input_code.clone(),
            entry.flag_type.to_string(),
        ])?;
        writer.flush().map_err(Error::Io)?;
        let file = writer
            .into_inner()
            .map_err(|err| Error::Internal(format!("flag sink flush: {}", err)))?;
        file.sync_all()
            .map_err(|err| Error::from_report_io(err, &path))?;

        debug!(
            flag = %entry.flag_type,
            identifier = %entry.source_identifier,
            path = %path.display(),
            "flag event written"
        );
        Ok(path)
    }
}

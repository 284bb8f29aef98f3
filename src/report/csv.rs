//! CSV report backend: line-oriented append with fsync per write.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{row_fields, REPORT_HEADERS};
use crate::error::{Error, Result};
use crate::models::ReviewResult;

/// Appends RFC 4180 rows; each append opens, flushes and fsyncs.
pub struct CsvReportWriter {
    path: PathBuf,
}

impl CsvReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row; the header goes out with the first row of a new file.
    pub fn append_row(&mut self, result: &ReviewResult) -> Result<()> {
        let is_new = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| Error::from_report_io(err, &self.path))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(REPORT_HEADERS)?;
        }
        writer.write_record(row_fields(result))?;
        writer.flush().map_err(Error::Io)?;

        let file = writer
            .into_inner()
            .map_err(|err| Error::Internal(format!("csv writer flush: {}", err)))?;
        file.sync_all()
            .map_err(|err| Error::from_report_io(err, &self.path))?;
        debug!(review_id = result.review_id, path = %self.path.display(), "csv row appended");
        Ok(())
    }

    /// Remove the tail data row. False when no data rows remain.
    pub fn retract_last(&mut self) -> Result<bool> {
        let records = self.read_records()?;
        if records.is_empty() {
            return Ok(false);
        }

        let temp_path = self.path.with_extension("csv.tmp");
        {
            let file = File::create(&temp_path)
                .map_err(|err| Error::from_report_io(err, &temp_path))?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            writer.write_record(REPORT_HEADERS)?;
            for record in &records[..records.len() - 1] {
                writer.write_record(record)?;
            }
            writer.flush().map_err(Error::Io)?;
            let file = writer
                .into_inner()
                .map_err(|err| Error::Internal(format!("csv writer flush: {}", err)))?;
            file.sync_all()
                .map_err(|err| Error::from_report_io(err, &temp_path))?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(true)
    }

    /// `(review_id, source_identifier)` for every data row.
    pub fn row_ids(&self) -> Result<Vec<(u32, String)>> {
        let mut ids = Vec::new();
        for record in self.read_records()? {
            let review_id: u32 = record
                .get(0)
                .unwrap_or_default()
                .parse()
                .map_err(|_| Error::Internal("unparsable review_id in report".into()))?;
            let identifier = record.get(1).unwrap_or_default().to_string();
            ids.push((review_id, identifier));
        }
        Ok(ids)
    }

    /// Full rows, for resuming a session against an existing report.
    pub fn read_rows(&self) -> Result<Vec<ReviewResult>> {
        self.read_records()?
            .iter()
            .map(|record| record_to_row(record))
            .collect()
    }

    fn read_records(&self) -> Result<Vec<csv::StringRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;
        let mut records = Vec::new();
        for record in reader.records() {
            records.push(record?);
        }
        Ok(records)
    }
}

fn record_to_row(record: &csv::StringRecord) -> Result<ReviewResult> {
    let field = |idx: usize| record.get(idx).unwrap_or_default().to_string();
    let optional = |idx: usize| {
        let value = field(idx);
        (!value.is_empty()).then_some(value)
    };

    Ok(ReviewResult {
        review_id: field(0)
            .parse()
            .map_err(|_| Error::Internal("unparsable review_id in report".into()))?,
        source_identifier: field(1),
        experiment_name: field(2),
        review_timestamp_utc: field(3)
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
        reviewer_verdict: field(4),
        reviewer_comment: field(5),
        time_to_review_seconds: field(6).parse().unwrap_or(0.0),
        expected_code: field(7),
        generated_code: field(8),
        code_diff: field(9),
        model_name: optional(10),
        prompting_strategy: optional(11),
    })
}

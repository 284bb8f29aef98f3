//! Report persistence for completed reviews.
//!
//! [`ReportWriter`] is the facade the controller talks to. It owns one of
//! two backends chosen at session start — CSV or a single-sheet xlsx
//! workbook — and fails over from xlsx to CSV at the same path stem when the
//! spreadsheet format rejects a payload. Flag events go to their own
//! side-tables via [`FlagSink`].

mod csv;
mod excel;
pub mod sanitize;
mod sink;

pub use self::csv::CsvReportWriter;
pub use self::excel::ExcelReportWriter;
pub use self::sink::{FlagSink, FLAG_HEADERS};

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{OutputFormat, ReviewResult};

/// Report-row header in schema order.
pub const REPORT_HEADERS: [&str; 12] = [
    "review_id",
    "source_identifier",
    "experiment_name",
    "review_timestamp_utc",
    "reviewer_verdict",
    "reviewer_comment",
    "time_to_review_seconds",
    "expected_code",
    "generated_code",
    "code_diff",
    "model_name",
    "prompting_strategy",
];

/// The twelve row fields in schema order, unsanitized.
pub(crate) fn row_fields(result: &ReviewResult) -> Vec<String> {
    vec![
        result.review_id.to_string(),
        result.source_identifier.clone(),
        result.experiment_name.clone(),
        result.review_timestamp_utc.to_rfc3339(),
        result.reviewer_verdict.clone(),
        result.reviewer_comment.clone(),
        format!("{:.2}", result.time_to_review_seconds),
        result.expected_code.clone(),
        result.generated_code.clone(),
        result.code_diff.clone(),
        result.model_name.clone().unwrap_or_default(),
        result.prompting_strategy.clone().unwrap_or_default(),
    ]
}

enum Backend {
    Uninitialized,
    Csv(CsvReportWriter),
    Excel(ExcelReportWriter),
}

/// Append-only report writer with undo, finalize and CSV failover.
pub struct ReportWriter {
    backend: Backend,
    /// Rows appended or recovered this session; replayed on failover.
    rows: Vec<ReviewResult>,
    finalized: Option<PathBuf>,
    failover_notice: Option<PathBuf>,
}

impl ReportWriter {
    pub fn new() -> Self {
        Self {
            backend: Backend::Uninitialized,
            rows: Vec::new(),
            finalized: None,
            failover_notice: None,
        }
    }

    /// Open the report for a new session.
    pub fn init_report(
        &mut self,
        reports_dir: &Path,
        session_id: &str,
        experiment_name: &str,
        format: OutputFormat,
    ) -> Result<PathBuf> {
        fs::create_dir_all(reports_dir)?;
        let path = reports_dir.join(format!(
            "{}_{}.{}",
            session_id,
            experiment_name,
            format.extension()
        ));
        self.backend = match format {
            OutputFormat::Csv => Backend::Csv(CsvReportWriter::new(&path)),
            OutputFormat::Excel => Backend::Excel(ExcelReportWriter::open(&path)?),
        };
        self.rows.clear();
        self.finalized = None;
        Ok(path)
    }

    /// Reattach to the live report of a resumed session.
    ///
    /// The file is discovered by the `<session_id>_*` stem; a `.csv` twin of
    /// an `.xlsx` request means a failover already happened and appends stay
    /// with CSV. Previously written rows are read back in.
    pub fn reopen(&mut self, reports_dir: &Path, session_id: &str) -> Result<PathBuf> {
        let pattern = reports_dir
            .join(format!("{}_*", session_id))
            .display()
            .to_string();
        let mut found: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|err| Error::Internal(format!("bad report glob: {}", err)))?
            .filter_map(|entry| entry.ok())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("csv") | Some("xlsx")
                )
            })
            .collect();
        found.sort();

        let path = found
            .into_iter()
            // Prefer CSV: it is the failover target.
            .min_by_key(|path| path.extension().and_then(|e| e.to_str()) != Some("csv"))
            .ok_or_else(|| {
                Error::Config(format!("no report found for session '{}'", session_id))
            })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => {
                let writer = CsvReportWriter::new(&path);
                self.rows = writer.read_rows()?;
                self.backend = Backend::Csv(writer);
            }
            _ => {
                let writer = ExcelReportWriter::open(&path)?;
                self.rows = writer.read_rows()?;
                self.backend = Backend::Excel(writer);
            }
        }
        self.finalized = None;
        Ok(path)
    }

    /// Live report path.
    pub fn path(&self) -> Result<PathBuf> {
        match &self.backend {
            Backend::Uninitialized => Err(Error::NotInitialized),
            Backend::Csv(writer) => Ok(writer.path().to_path_buf()),
            Backend::Excel(writer) => Ok(writer.path().to_path_buf()),
        }
    }

    /// Append one row, failing over to CSV on format incompatibility.
    pub fn append_row(&mut self, result: &ReviewResult) -> Result<()> {
        result.validate()?;
        match &mut self.backend {
            Backend::Uninitialized => return Err(Error::NotInitialized),
            Backend::Csv(writer) => writer.append_row(result)?,
            Backend::Excel(writer) => {
                if let Err(err) = writer.append_row(result) {
                    match err {
                        Error::FormatIncompatible(reason) => {
                            warn!(%reason, "spreadsheet backend incompatible, failing over to CSV");
                            self.fail_over_to_csv(Some(result))?;
                        }
                        other => return Err(other),
                    }
                }
            }
        }
        self.rows.push(result.clone());
        Ok(())
    }

    /// Switch to a CSV backend at the same path stem, replaying every row
    /// written so far plus `pending`.
    fn fail_over_to_csv(&mut self, pending: Option<&ReviewResult>) -> Result<()> {
        let old_path = self.path()?;
        let csv_path = old_path.with_extension("csv");
        let mut writer = CsvReportWriter::new(&csv_path);
        for row in &self.rows {
            writer.append_row(row)?;
        }
        if let Some(row) = pending {
            writer.append_row(row)?;
        }
        self.backend = Backend::Csv(writer);
        self.failover_notice = Some(csv_path.clone());
        info!(path = %csv_path.display(), "report failover to CSV complete");
        Ok(())
    }

    /// One-shot failover notice for the event surface.
    pub fn take_failover_notice(&mut self) -> Option<PathBuf> {
        self.failover_notice.take()
    }

    /// Remove the highest-id row. False when the tail is already missing.
    pub fn retract_last(&mut self) -> Result<bool> {
        let removed = match &mut self.backend {
            Backend::Uninitialized => return Err(Error::NotInitialized),
            Backend::Csv(writer) => writer.retract_last()?,
            Backend::Excel(writer) => writer.retract_last()?,
        };
        if removed {
            self.rows.pop();
        }
        Ok(removed)
    }

    /// `(review_id, source_identifier)` pairs currently in the report.
    pub fn row_ids(&self) -> Result<Vec<(u32, String)>> {
        match &self.backend {
            Backend::Uninitialized => Err(Error::NotInitialized),
            Backend::Csv(writer) => writer.row_ids(),
            Backend::Excel(writer) => writer.row_ids(),
        }
    }

    /// Highest review id in the report, 0 when empty.
    pub fn high_water_mark(&self) -> u32 {
        self.rows.iter().map(|row| row.review_id).max().unwrap_or(0)
    }

    /// Number of rows written this session.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Produce the final report path; safe to call repeatedly.
    pub fn finalize(&mut self) -> Result<PathBuf> {
        if let Some(path) = &self.finalized {
            return Ok(path.clone());
        }
        let path = self.path()?;
        self.finalized = Some(path.clone());
        info!(path = %path.display(), rows = self.rows.len(), "report finalized");
        Ok(path)
    }
}

impl Default for ReportWriter {
    fn default() -> Self {
        Self::new()
    }
}

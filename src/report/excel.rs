//! Spreadsheet report backend over a single-sheet xlsx workbook.
//!
//! xlsx has no append mode: the workbook lives in memory and each append
//! rewrites the file through a same-directory temp file. Cells pass through
//! sanitization so the format never sees bytes it rejects.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;
use umya_spreadsheet::{Spreadsheet, Worksheet, XlsxError};

use super::sanitize::{sanitize_cell, unguard_cell};
use super::REPORT_HEADERS;
use crate::error::{Error, Result};
use crate::models::ReviewResult;

/// Sheet carrying the report rows.
const SHEET_NAME: &str = "Sheet1";

/// Rows sampled for column auto-sizing.
const WIDTH_SAMPLE_ROWS: u32 = 50;

/// Widest column the auto-sizer will produce.
const MAX_COLUMN_WIDTH: f64 = 80.0;

/// Single-sheet xlsx writer with header-on-first-append semantics.
pub struct ExcelReportWriter {
    path: PathBuf,
    book: Spreadsheet,
    data_rows: u32,
    header_written: bool,
    column_widths: [f64; REPORT_HEADERS.len()],
}

impl ExcelReportWriter {
    /// Create a fresh workbook, or reopen an existing report for resume.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (book, data_rows, header_written) = if path.exists() {
            let book = umya_spreadsheet::reader::xlsx::read(&path)
                .map_err(|err| map_xlsx_error(err, &path))?;
            let sheet = book
                .get_sheet_by_name(SHEET_NAME)
                .ok_or_else(|| Error::FormatIncompatible("report sheet missing".into()))?;
            let highest = sheet.get_highest_row();
            let header_written = highest >= 1;
            (book, highest.saturating_sub(1), header_written)
        } else {
            (umya_spreadsheet::new_file(), 0, false)
        };

        let mut widths = [0.0; REPORT_HEADERS.len()];
        for (idx, header) in REPORT_HEADERS.iter().enumerate() {
            widths[idx] = header.len() as f64;
        }

        Ok(Self {
            path,
            book,
            data_rows,
            header_written,
            column_widths: widths,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data_rows(&self) -> u32 {
        self.data_rows
    }

    fn sheet_mut(&mut self) -> Result<&mut Worksheet> {
        self.book
            .get_sheet_by_name_mut(SHEET_NAME)
            .ok_or_else(|| Error::FormatIncompatible("report sheet missing".into()))
    }

    /// Append one row. The header row is written with the first append.
    pub fn append_row(&mut self, result: &ReviewResult) -> Result<()> {
        let header_written = self.header_written;
        let data_rows = self.data_rows;
        let sheet = self.sheet_mut()?;

        if !header_written {
            for (idx, header) in REPORT_HEADERS.iter().enumerate() {
                sheet
                    .get_cell_mut(((idx + 1) as u32, 1u32))
                    .set_value(header.to_string());
            }
        }

        let row = data_rows + 2;
        let cells = row_cells(result);
        for (idx, value) in cells.iter().enumerate() {
            let column = (idx + 1) as u32;
            match idx {
                // review_id and time_to_review stay numeric.
                0 => {
                    sheet
                        .get_cell_mut((column, row))
                        .set_value_number(result.review_id as f64);
                }
                6 => {
                    sheet
                        .get_cell_mut((column, row))
                        .set_value_number(result.time_to_review_seconds);
                }
                _ => {
                    sheet.get_cell_mut((column, row)).set_value(value.clone());
                }
            }
        }

        if data_rows < WIDTH_SAMPLE_ROWS {
            for (idx, value) in cells.iter().enumerate() {
                let widest_line = value.lines().map(str::len).max().unwrap_or(0) as f64;
                self.column_widths[idx] =
                    self.column_widths[idx].max(widest_line.min(MAX_COLUMN_WIDTH));
            }
            self.apply_column_widths()?;
        }

        self.header_written = true;
        self.data_rows += 1;
        self.save()?;
        debug!(review_id = result.review_id, path = %self.path.display(), "xlsx row appended");
        Ok(())
    }

    /// Delete the last data row. False when none remain.
    pub fn retract_last(&mut self) -> Result<bool> {
        if self.data_rows == 0 {
            return Ok(false);
        }
        let last_row = self.data_rows + 1;
        self.sheet_mut()?.remove_row(&last_row, &1);
        self.data_rows -= 1;
        self.save()?;
        Ok(true)
    }

    /// `(review_id, source_identifier)` for every data row.
    pub fn row_ids(&self) -> Result<Vec<(u32, String)>> {
        let sheet = self
            .book
            .get_sheet_by_name(SHEET_NAME)
            .ok_or_else(|| Error::FormatIncompatible("report sheet missing".into()))?;
        let mut ids = Vec::new();
        for row in 2..=self.data_rows + 1 {
            let review_id: u32 = sheet
                .get_value((1u32, row))
                .parse::<f64>()
                .map_err(|_| Error::Internal("unparsable review_id in report".into()))?
                as u32;
            ids.push((review_id, unguard_cell(&sheet.get_value((2u32, row)))));
        }
        Ok(ids)
    }

    /// Full rows, for resuming a session against an existing report.
    pub fn read_rows(&self) -> Result<Vec<ReviewResult>> {
        let sheet = self
            .book
            .get_sheet_by_name(SHEET_NAME)
            .ok_or_else(|| Error::FormatIncompatible("report sheet missing".into()))?;
        let mut rows = Vec::new();
        for row in 2..=self.data_rows + 1 {
            let cell = |column: u32| unguard_cell(&sheet.get_value((column, row)));
            let optional = |column: u32| {
                let value = cell(column);
                (!value.is_empty()).then_some(value)
            };
            rows.push(ReviewResult {
                review_id: cell(1)
                    .parse::<f64>()
                    .map_err(|_| Error::Internal("unparsable review_id in report".into()))?
                    as u32,
                source_identifier: cell(2),
                experiment_name: cell(3),
                review_timestamp_utc: cell(4)
                    .parse::<DateTime<Utc>>()
                    .unwrap_or_else(|_| Utc::now()),
                reviewer_verdict: cell(5),
                reviewer_comment: cell(6),
                time_to_review_seconds: cell(7).parse().unwrap_or(0.0),
                expected_code: cell(8),
                generated_code: cell(9),
                code_diff: cell(10),
                model_name: optional(11),
                prompting_strategy: optional(12),
            });
        }
        Ok(rows)
    }

    fn apply_column_widths(&mut self) -> Result<()> {
        let widths = self.column_widths;
        let sheet = self.sheet_mut()?;
        for (idx, width) in widths.iter().enumerate() {
            let letter = column_letter(idx);
            sheet
                .get_column_dimension_mut(&letter)
                .set_width(width + 2.0);
        }
        Ok(())
    }

    /// Rewrite the workbook through a same-directory temp file.
    fn save(&self) -> Result<()> {
        let temp_path = self.path.with_extension("xlsx.tmp");
        umya_spreadsheet::writer::xlsx::write(&self.book, &temp_path)
            .map_err(|err| map_xlsx_error(err, &temp_path))?;
        {
            let file = File::open(&temp_path)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

/// The twelve report cells, sanitized, in schema order.
fn row_cells(result: &ReviewResult) -> Vec<String> {
    super::row_fields(result)
        .into_iter()
        .map(|field| sanitize_cell(&field))
        .collect()
}

fn column_letter(idx: usize) -> String {
    char::from(b'A' + idx as u8).to_string()
}

fn map_xlsx_error(err: XlsxError, path: &Path) -> Error {
    match err {
        XlsxError::Io(io) => Error::from_report_io(io, path),
        other => Error::FormatIncompatible(other.to_string()),
    }
}

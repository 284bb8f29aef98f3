//! Spreadsheet adapter: one workbook row per code pair.

use std::collections::HashMap;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::debug;

use super::{DataSource, SourceConfig, SourceFilters, SourceKind};
use crate::error::{Error, Result};
use crate::models::CodePair;

/// One parsed workbook row.
#[derive(Debug, Clone)]
struct RowRecord {
    identifier: String,
    generated: String,
    expected: Option<String>,
    input: Option<String>,
    model: Option<String>,
    strategy: Option<String>,
    row_number: usize,
}

/// Reads pairs out of an Excel/ODS workbook sheet.
///
/// The whole sheet is parsed at configure time; materialization afterwards
/// is an in-memory lookup.
#[derive(Debug)]
pub struct ExcelSource {
    config: SourceConfig,
    rows: Vec<RowRecord>,
    index: HashMap<String, usize>,
}

impl ExcelSource {
    /// Open the workbook, resolve the column mapping against the header row,
    /// and parse every data row.
    pub fn new(config: SourceConfig, filters: SourceFilters) -> Result<Self> {
        let SourceConfig::Excel {
            file_path,
            sheet_name,
            identifier_column,
            generated_code_column,
            expected_code_column,
            input_code_column,
            model_column,
            prompting_strategy_column,
        } = &config
        else {
            return Err(Error::Config(
                "excel adapter requires an excel configuration".into(),
            ));
        };

        if !Path::new(file_path).is_file() {
            return Err(Error::Config(format!(
                "spreadsheet not found: {}",
                file_path.display()
            )));
        }
        let mut workbook = open_workbook_auto(file_path)
            .map_err(|err| Error::Spreadsheet(err.to_string()))?;

        let sheet = match sheet_name {
            Some(name) => name.clone(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| Error::Spreadsheet("workbook has no sheets".into()))?,
        };
        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|err| Error::Spreadsheet(err.to_string()))?;

        let mut rows_iter = range.rows();
        let header = rows_iter
            .next()
            .ok_or_else(|| Error::NoPairsFound(format!("sheet '{}' is empty", sheet)))?;
        let headers: Vec<String> = header.iter().map(cell_text).collect();

        let column = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| {
                    Error::Config(format!("column '{}' not found in sheet '{}'", name, sheet))
                })
        };
        let optional_column = |name: &Option<String>| -> Result<Option<usize>> {
            name.as_deref().map(column).transpose()
        };

        let identifier_idx = column(identifier_column)?;
        let generated_idx = column(generated_code_column)?;
        let expected_idx = optional_column(expected_code_column)?;
        let input_idx = optional_column(input_code_column)?;
        let model_idx = optional_column(model_column)?;
        let strategy_idx = optional_column(prompting_strategy_column)?;

        if filters.model.is_some() && model_idx.is_none() {
            return Err(Error::Config("model filter requires a model column".into()));
        }
        if filters.strategy.is_some() && strategy_idx.is_none() {
            return Err(Error::Config(
                "strategy filter requires a prompting strategy column".into(),
            ));
        }

        let mut rows = Vec::new();
        let mut index = HashMap::new();
        for (offset, row) in rows_iter.enumerate() {
            let cell = |idx: usize| row.get(idx).map(cell_text).unwrap_or_default();
            let optional_cell = |idx: Option<usize>| {
                idx.map(&cell).filter(|value: &String| !value.is_empty())
            };

            let identifier = cell(identifier_idx);
            if identifier.is_empty() {
                continue;
            }

            let model = optional_cell(model_idx);
            let strategy = optional_cell(strategy_idx);
            if let Some(wanted) = &filters.model {
                if model.as_deref() != Some(wanted.as_str()) {
                    continue;
                }
            }
            if let Some(wanted) = &filters.strategy {
                if strategy.as_deref() != Some(wanted.as_str()) {
                    continue;
                }
            }

            let record = RowRecord {
                identifier: identifier.clone(),
                generated: cell(generated_idx),
                expected: optional_cell(expected_idx),
                input: optional_cell(input_idx),
                model,
                strategy,
                row_number: offset + 2,
            };
            if index.insert(identifier.clone(), rows.len()).is_some() {
                return Err(Error::ambiguous(identifier));
            }
            rows.push(record);
        }

        if rows.is_empty() {
            return Err(Error::NoPairsFound(format!(
                "no usable rows in sheet '{}'",
                sheet
            )));
        }
        debug!(rows = rows.len(), sheet = %sheet, "parsed spreadsheet source");

        Ok(Self {
            config,
            rows,
            index,
        })
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }
}

impl DataSource for ExcelSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Excel
    }

    fn inventory(&mut self) -> Result<Vec<String>> {
        Ok(self.rows.iter().map(|r| r.identifier.clone()).collect())
    }

    fn make_handle(&mut self, identifier: &str) -> Result<CodePair> {
        let record = self.record(identifier)?;
        let mut handle =
            CodePair::handle(identifier).with_source_info("row", record.row_number.to_string());
        if let Some(model) = &record.model {
            handle = handle.with_source_info("model_name", model.clone());
        }
        if let Some(strategy) = &record.strategy {
            handle = handle.with_source_info("prompting_strategy", strategy.clone());
        }
        Ok(handle)
    }

    fn get_code_pair(&mut self, identifier: &str) -> Result<CodePair> {
        let record = self.record(identifier)?.clone();
        let mut pair = CodePair::new(identifier, record.generated)
            .with_source_info("row", record.row_number.to_string());
        if let Some(expected) = record.expected {
            pair = pair.with_expected(expected);
        }
        if let Some(input) = record.input {
            pair = pair.with_input(input);
        }
        if let Some(model) = record.model {
            pair = pair.with_source_info("model_name", model);
        }
        if let Some(strategy) = record.strategy {
            pair = pair.with_source_info("prompting_strategy", strategy);
        }
        pair.validate()?;
        Ok(pair)
    }
}

impl ExcelSource {
    fn record(&self, identifier: &str) -> Result<&RowRecord> {
        self.index
            .get(identifier)
            .map(|&idx| &self.rows[idx])
            .ok_or_else(|| {
                Error::read_failed(identifier, "identifier not present in sheet inventory")
            })
    }
}

/// Render a cell as text; integral floats drop the trailing `.0`.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

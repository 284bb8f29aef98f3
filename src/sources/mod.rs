//! Data-source adapters for auditor-core.
//!
//! Each adapter provides uniform iteration over code pairs from one backing
//! store:
//!
//! - **Folders**: directory roots paired by file stem
//! - **Sqlite**: one table row per pair
//! - **Excel**: one spreadsheet row per pair
//!
//! Adapters validate everything at construction: unreadable roots, missing
//! columns and identifier collisions never surface mid-session. `load_data` samples the inventory into handle-level pairs;
//! `get_code_pair` materializes a handle at dequeue time.

mod folders;
mod spreadsheet;
mod sqlite;

pub use folders::FoldersSource;
pub use spreadsheet::ExcelSource;
pub use sqlite::SqliteSource;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::models::{CodePair, ENCODING_FALLBACK_KEY};
use crate::sampler;

/// Per-cell read ceiling in bytes (default 50 MB).
pub const DEFAULT_MAX_CELL_BYTES: u64 = 50 * 1024 * 1024;

/// Adapter families the wizard can configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Folders,
    Sqlite,
    Excel,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Folders => "folders",
            Self::Sqlite => "sqlite",
            Self::Excel => "excel",
        };
        write!(f, "{}", s)
    }
}

/// Serializable adapter configuration; enough to reconstruct the adapter on
/// resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    Folders {
        generated_code_path: PathBuf,
        expected_code_path: Option<PathBuf>,
        input_code_path: Option<PathBuf>,
    },
    Sqlite {
        database_path: PathBuf,
        table_name: String,
        identifier_column: String,
        generated_code_column: String,
        expected_code_column: Option<String>,
        input_code_column: Option<String>,
        model_column: Option<String>,
        prompting_strategy_column: Option<String>,
    },
    Excel {
        file_path: PathBuf,
        sheet_name: Option<String>,
        identifier_column: String,
        generated_code_column: String,
        expected_code_column: Option<String>,
        input_code_column: Option<String>,
        model_column: Option<String>,
        prompting_strategy_column: Option<String>,
    },
}

impl SourceConfig {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Folders { .. } => SourceKind::Folders,
            Self::Sqlite { .. } => SourceKind::Sqlite,
            Self::Excel { .. } => SourceKind::Excel,
        }
    }
}

/// Optional row restrictions applied by tabular adapters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceFilters {
    pub model: Option<String>,
    pub strategy: Option<String>,
}

impl SourceFilters {
    pub fn is_empty(&self) -> bool {
        self.model.is_none() && self.strategy.is_none()
    }
}

/// Uniform iteration over code pairs from one backing store.
pub trait DataSource {
    fn kind(&self) -> SourceKind;

    /// Every identifier the store can produce, in stable order.
    fn inventory(&mut self) -> Result<Vec<String>>;

    /// Materialize one pair by identifier.
    fn get_code_pair(&mut self, identifier: &str) -> Result<CodePair>;

    /// Inventory size before sampling.
    fn total_count(&mut self) -> Result<usize> {
        Ok(self.inventory()?.len())
    }

    /// Build a handle-level pair; adapters may attach cheap provenance.
    fn make_handle(&mut self, identifier: &str) -> Result<CodePair> {
        Ok(CodePair::handle(identifier))
    }

    /// Sample the inventory into handle-level pairs.
    ///
    /// Sampling is seeded from the session id, so repeating the call for the
    /// same session selects the same subset.
    fn load_data(&mut self, sample_percentage: f32, session_id: &str) -> Result<Vec<CodePair>> {
        let inventory = self.inventory()?;
        if inventory.is_empty() {
            return Err(Error::NoPairsFound(self.kind().to_string()));
        }
        sampler::sample_handles(&inventory, sample_percentage, session_id)
            .iter()
            .map(|identifier| self.make_handle(identifier))
            .collect()
    }
}

/// Construct the adapter described by a config.
pub fn build_source(
    config: &SourceConfig,
    filters: &SourceFilters,
) -> Result<Box<dyn DataSource>> {
    match config {
        SourceConfig::Folders { .. } => Ok(Box::new(FoldersSource::new(config.clone())?)),
        SourceConfig::Sqlite { .. } => {
            Ok(Box::new(SqliteSource::new(config.clone(), filters.clone())?))
        }
        SourceConfig::Excel { .. } => {
            Ok(Box::new(ExcelSource::new(config.clone(), filters.clone())?))
        }
    }
}

/// Decode file bytes as UTF-8, falling back to latin-1.
///
/// Returns the text plus whether the fallback fired; callers annotate the
/// pair rather than failing silently.
pub(crate) fn decode_text(bytes: Vec<u8>) -> (String, bool) {
    match String::from_utf8(bytes) {
        Ok(text) => (text, false),
        Err(err) => {
            let bytes = err.into_bytes();
            (encoding_rs::mem::decode_latin1(&bytes).into_owned(), true)
        }
    }
}

/// Record a latin-1 fallback on a pair's provenance.
pub(crate) fn annotate_fallback(pair: &mut CodePair) {
    pair.source_info
        .insert(ENCODING_FALLBACK_KEY.to_string(), "latin-1".to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_utf8() {
        let (text, fallback) = decode_text("héllo".as_bytes().to_vec());
        assert_eq!(text, "héllo");
        assert!(!fallback);
    }

    #[test]
    fn test_decode_text_latin1_fallback() {
        // 0xE9 is 'é' in latin-1 and invalid standalone UTF-8.
        let (text, fallback) = decode_text(vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(text, "café");
        assert!(fallback);
    }

    #[test]
    fn test_source_config_round_trip() {
        let config = SourceConfig::Sqlite {
            database_path: PathBuf::from("/tmp/db.sqlite"),
            table_name: "results".into(),
            identifier_column: "id".into(),
            generated_code_column: "generated".into(),
            expected_code_column: Some("expected".into()),
            input_code_column: None,
            model_column: Some("model".into()),
            prompting_strategy_column: None,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"type\":\"sqlite\""));
        let back: SourceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
        assert_eq!(back.kind(), SourceKind::Sqlite);
    }
}

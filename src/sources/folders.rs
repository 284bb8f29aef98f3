//! Filesystem adapter: directory roots paired by file stem.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{annotate_fallback, decode_text, DataSource, SourceConfig, SourceKind};
use crate::error::{Error, Result};
use crate::models::CodePair;
use crate::perf::LazyLoader;

/// Per-root file paths for one identifier.
#[derive(Debug, Clone)]
struct PairPaths {
    generated: PathBuf,
    expected: Option<PathBuf>,
    input: Option<PathBuf>,
}

/// Pairs files across a generated root and optional expected/input roots by
/// basename, ignoring extension.
#[derive(Debug)]
pub struct FoldersSource {
    config: SourceConfig,
    index: HashMap<String, PairPaths>,
    order: Vec<String>,
    max_cell_bytes: u64,
}

impl FoldersSource {
    /// Scan the roots and build the pairing index.
    ///
    /// All configure-time failures surface here: missing roots, duplicate
    /// stems, empty generated inventory.
    pub fn new(config: SourceConfig) -> Result<Self> {
        let SourceConfig::Folders {
            generated_code_path,
            expected_code_path,
            input_code_path,
        } = &config
        else {
            return Err(Error::Config(
                "folders adapter requires a folders configuration".into(),
            ));
        };

        let generated_files = scan_root(generated_code_path)?;
        if generated_files.is_empty() {
            return Err(Error::NoPairsFound(format!(
                "no files under {}",
                generated_code_path.display()
            )));
        }
        let expected_files = match expected_code_path {
            Some(root) => scan_root(root)?,
            None => Vec::new(),
        };
        let input_files = match input_code_path {
            Some(root) => scan_root(root)?,
            None => Vec::new(),
        };

        let expected_index = index_by_stem(&expected_files)?;
        let input_index = index_by_stem(&input_files)?;

        let mut index = HashMap::new();
        let mut order = Vec::new();
        for (stem, path) in index_pairs_sorted(&generated_files)? {
            index.insert(
                stem.clone(),
                PairPaths {
                    generated: path,
                    expected: expected_index.get(&stem).cloned(),
                    input: input_index.get(&stem).cloned(),
                },
            );
            order.push(stem);
        }

        debug!(
            pairs = order.len(),
            root = %generated_code_path.display(),
            "scanned folders source"
        );

        Ok(Self {
            config,
            index,
            order,
            max_cell_bytes: super::DEFAULT_MAX_CELL_BYTES,
        })
    }

    /// Override the per-file read ceiling.
    pub fn with_max_cell_bytes(mut self, max_cell_bytes: u64) -> Self {
        self.max_cell_bytes = max_cell_bytes;
        self
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// First `n_lines` of the generated body without materializing the pair.
    pub fn preview(&self, identifier: &str, n_lines: usize) -> Result<String> {
        let paths = self.paths_for(identifier)?;
        let path = paths.generated.clone();
        let mut loader = LazyLoader::new(move || read_text(&path, u64::MAX).map(|(text, _)| text));
        loader.preview(n_lines)
    }

    fn paths_for(&self, identifier: &str) -> Result<&PairPaths> {
        self.index.get(identifier).ok_or_else(|| {
            Error::read_failed(identifier, "identifier not present in folder inventory")
        })
    }
}

impl DataSource for FoldersSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Folders
    }

    fn inventory(&mut self) -> Result<Vec<String>> {
        Ok(self.order.clone())
    }

    fn make_handle(&mut self, identifier: &str) -> Result<CodePair> {
        let paths = self.paths_for(identifier)?;
        Ok(CodePair::handle(identifier)
            .with_source_info("generated_path", paths.generated.display().to_string()))
    }

    fn get_code_pair(&mut self, identifier: &str) -> Result<CodePair> {
        let paths = self.paths_for(identifier)?.clone();

        let (generated, generated_fallback) = read_text(&paths.generated, self.max_cell_bytes)
            .map_err(|err| Error::read_failed(identifier, err.to_string()))?;

        let mut pair = CodePair::new(identifier, generated)
            .with_source_info("generated_path", paths.generated.display().to_string());

        let mut fallback = generated_fallback;
        if let Some(expected_path) = &paths.expected {
            let (expected, expected_fallback) = read_text(expected_path, self.max_cell_bytes)
                .map_err(|err| Error::read_failed(identifier, err.to_string()))?;
            fallback |= expected_fallback;
            pair = pair
                .with_expected(expected)
                .with_source_info("expected_path", expected_path.display().to_string());
        }
        if let Some(input_path) = &paths.input {
            let (input, input_fallback) = read_text(input_path, self.max_cell_bytes)
                .map_err(|err| Error::read_failed(identifier, err.to_string()))?;
            fallback |= input_fallback;
            pair = pair.with_input(input);
        }

        if fallback {
            annotate_fallback(&mut pair);
        }
        pair.validate()?;
        Ok(pair)
    }
}

/// List regular files directly under a root, sorted by file name.
fn scan_root(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::Config(format!(
            "not a readable directory: {}",
            root.display()
        )));
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn stem_of(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
}

fn index_by_stem(files: &[PathBuf]) -> Result<HashMap<String, PathBuf>> {
    let mut index = HashMap::new();
    for path in files {
        let Some(stem) = stem_of(path) else { continue };
        if index.insert(stem.clone(), path.clone()).is_some() {
            return Err(Error::ambiguous(stem));
        }
    }
    Ok(index)
}

fn index_pairs_sorted(files: &[PathBuf]) -> Result<Vec<(String, PathBuf)>> {
    let mut pairs = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for path in files {
        let Some(stem) = stem_of(path) else { continue };
        if !seen.insert(stem.clone()) {
            return Err(Error::ambiguous(stem));
        }
        pairs.push((stem, path.clone()));
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(pairs)
}

/// Read a file as text with the size ceiling and latin-1 fallback.
fn read_text(path: &Path, max_bytes: u64) -> Result<(String, bool)> {
    let metadata = fs::metadata(path)?;
    if metadata.len() > max_bytes {
        return Err(Error::Internal(format!(
            "{} exceeds the {} byte read ceiling",
            path.display(),
            max_bytes
        )));
    }
    Ok(decode_text(fs::read(path)?))
}

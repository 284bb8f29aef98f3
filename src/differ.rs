//! Line-level diff computation for code pairs.
//!
//! Two outputs per pair: a structured [`DiffLine`] stream for side-by-side
//! highlighting, and a unified-diff text for the report row. Inputs past the
//! large-input thresholds take a chunked strategy with bounded memory, and
//! the text variant degrades to a summary so report rows stay small.

use std::collections::HashMap;
use std::sync::Arc;

use similar::{capture_diff_slices, Algorithm, DiffOp, TextDiff};
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{DiffArtifacts, DiffLine, DiffTag};
use crate::perf::{ChunkedProcessor, ContentCache, PerformanceMonitor};

/// Byte size past which an input takes the large-input path.
pub const LARGE_INPUT_BYTES: usize = 100_000;

/// Line count past which an input takes the large-input path.
pub const LARGE_INPUT_LINES: usize = 10_000;

/// Block size for the chunked strategy.
pub const CHUNK_LINES: usize = 1_000;

/// Upper bound on locally cached structured diffs.
const LOCAL_CACHE_LIMIT: usize = 100;

/// Text diffs at or above this size skip the shared content cache.
const TEXT_CACHE_MAX_BYTES: usize = 50_000;

/// Lines sampled from each side in the large-input summary.
const SUMMARY_SAMPLE_LINES: usize = 10;

/// Computes structured and text diffs with bounded caching.
pub struct CodeDiffer {
    cache: Arc<ContentCache>,
    monitor: Arc<PerformanceMonitor>,
    diff_cache: HashMap<String, Vec<DiffLine>>,
}

impl CodeDiffer {
    pub fn new(cache: Arc<ContentCache>, monitor: Arc<PerformanceMonitor>) -> Self {
        Self {
            cache,
            monitor,
            diff_cache: HashMap::new(),
        }
    }

    /// Compute the structured line diff between expected and generated code.
    ///
    /// Never fails: internal errors degrade to a single `equal` line reading
    /// `<diff failed>`.
    pub fn compute_diff(&mut self, expected: Option<&str>, generated: &str) -> Vec<DiffLine> {
        let expected = expected.unwrap_or("");
        let key = diff_cache_key(expected, generated);
        if let Some(lines) = self.diff_cache.get(&key) {
            return lines.clone();
        }

        let ctx = self.monitor.start("compute_diff");
        let lines = match self.compute_inner(expected, generated) {
            Ok(lines) => lines,
            Err(err) => {
                warn!(%err, "diff computation failed");
                fallback_lines()
            }
        };
        self.monitor.end(ctx);

        if self.diff_cache.len() < LOCAL_CACHE_LIMIT {
            self.diff_cache.insert(key, lines.clone());
        }
        lines
    }

    /// Generate the unified-diff text for report storage.
    ///
    /// Large inputs produce a summary (line counts plus head/tail samples)
    /// instead of a full hunk sequence.
    pub fn diff_text(&mut self, expected: Option<&str>, generated: &str) -> String {
        let expected = expected.unwrap_or("");
        let key = format!("text_diff_{}", diff_cache_key(expected, generated));
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let ctx = self.monitor.start("get_diff_text");
        let result = if is_large(expected, generated) {
            summary_diff(expected, generated)
        } else {
            unified_diff(expected, generated)
        };
        self.monitor.end(ctx);

        if result.len() < TEXT_CACHE_MAX_BYTES {
            self.cache.put(key, result.clone());
        }
        result
    }

    /// Both diff outputs for one pair.
    pub fn artifacts(&mut self, expected: Option<&str>, generated: &str) -> DiffArtifacts {
        DiffArtifacts {
            lines: self.compute_diff(expected, generated),
            unified_text: self.diff_text(expected, generated),
        }
    }

    fn compute_inner(&self, expected: &str, generated: &str) -> Result<Vec<DiffLine>> {
        let expected_lines: Vec<&str> = expected.lines().collect();
        let generated_lines: Vec<&str> = generated.lines().collect();

        if is_large(expected, generated) {
            self.chunked_diff(&expected_lines, &generated_lines)
        } else {
            let mut emitter = LineEmitter::new();
            let ops = capture_diff_slices(Algorithm::Lcs, &expected_lines, &generated_lines);
            emitter.emit_ops(&ops, &expected_lines, &generated_lines, None)?;
            Ok(emitter.into_lines())
        }
    }

    /// Diff very large inputs block by block.
    ///
    /// Blocks are zero-padded at the tail so lengths align, but padding-only
    /// lines are never emitted: replaying equal and add lines still
    /// reconstructs the generated side exactly.
    fn chunked_diff(&self, expected: &[&str], generated: &[&str]) -> Result<Vec<DiffLine>> {
        let max_lines = expected.len().max(generated.len());
        let starts: Vec<usize> = (0..max_lines).step_by(CHUNK_LINES).collect();

        let cache = Arc::clone(&self.cache);
        let processor = ChunkedProcessor::with_limits(1, crate::perf::DEFAULT_MEMORY_LIMIT_MB)
            .with_reclaim(move || cache.clear());
        let mut emitter = LineEmitter::new();
        let mut processed = 0usize;

        let blocks = processor.process_chunks(&starts, |window| {
            let mut out = Vec::new();
            for &start in window {
                let end = (start + CHUNK_LINES).min(max_lines);
                let expected_block = slice_block(expected, start, end);
                let generated_block = slice_block(generated, start, end);
                let true_expected = expected_block.len();
                let true_generated = generated_block.len();

                let width = true_expected.max(true_generated);
                let mut padded_expected = expected_block;
                let mut padded_generated = generated_block;
                padded_expected.resize(width, "");
                padded_generated.resize(width, "");

                let ops =
                    capture_diff_slices(Algorithm::Lcs, &padded_expected, &padded_generated);
                out.push((
                    ops,
                    padded_expected
                        .iter()
                        .map(|s| s.to_string())
                        .collect::<Vec<_>>(),
                    padded_generated
                        .iter()
                        .map(|s| s.to_string())
                        .collect::<Vec<_>>(),
                    true_expected,
                    true_generated,
                ));
            }
            Ok(out)
        });

        for (ops, padded_expected, padded_generated, true_expected, true_generated) in blocks {
            processed += 1;
            let expected_refs: Vec<&str> = padded_expected.iter().map(String::as_str).collect();
            let generated_refs: Vec<&str> =
                padded_generated.iter().map(String::as_str).collect();
            emitter.emit_ops(
                &ops,
                &expected_refs,
                &generated_refs,
                Some((true_expected, true_generated)),
            )?;
        }

        if processed != starts.len() {
            return Err(Error::Internal(format!(
                "chunked diff lost blocks: {} of {}",
                processed,
                starts.len()
            )));
        }
        Ok(emitter.into_lines())
    }
}

/// MD5 over `expected ||| generated`, hex-encoded.
fn diff_cache_key(expected: &str, generated: &str) -> String {
    let digest = md5::compute(format!("{}|||{}", expected, generated).as_bytes());
    format!("{:x}", digest)
}

fn is_large(expected: &str, generated: &str) -> bool {
    expected.len() > LARGE_INPUT_BYTES
        || generated.len() > LARGE_INPUT_BYTES
        || expected.lines().count() > LARGE_INPUT_LINES
        || generated.lines().count() > LARGE_INPUT_LINES
}

fn slice_block<'a>(lines: &[&'a str], start: usize, end: usize) -> Vec<&'a str> {
    if start >= lines.len() {
        Vec::new()
    } else {
        lines[start..end.min(lines.len())].to_vec()
    }
}

fn fallback_lines() -> Vec<DiffLine> {
    vec![DiffLine::new(DiffTag::Equal, "<diff failed>", 1)]
}

fn unified_diff(expected: &str, generated: &str) -> String {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Lcs)
        .diff_lines(expected, generated);
    diff.unified_diff()
        .context_radius(3)
        .header("expected_code", "generated_code")
        .to_string()
}

fn summary_diff(expected: &str, generated: &str) -> String {
    let expected_lines: Vec<&str> = expected.lines().collect();
    let generated_lines: Vec<&str> = generated.lines().collect();

    let mut summary = vec![
        "=== LARGE FILE DIFF SUMMARY ===".to_string(),
        format!("Expected lines: {}", expected_lines.len()),
        format!("Generated lines: {}", generated_lines.len()),
        format!(
            "Size difference: {} lines",
            generated_lines.len() as i64 - expected_lines.len() as i64
        ),
        String::new(),
    ];

    let sample = SUMMARY_SAMPLE_LINES;
    if !expected_lines.is_empty() {
        summary.push("--- Expected (first 10 lines) ---".to_string());
        summary.extend(expected_lines.iter().take(sample).map(|s| s.to_string()));
        summary.push(String::new());
        summary.push("--- Expected (last 10 lines) ---".to_string());
        let skip = expected_lines.len().saturating_sub(sample);
        summary.extend(expected_lines.iter().skip(skip).map(|s| s.to_string()));
        summary.push(String::new());
    }
    if !generated_lines.is_empty() {
        summary.push("+++ Generated (first 10 lines) +++".to_string());
        summary.extend(generated_lines.iter().take(sample).map(|s| s.to_string()));
        summary.push(String::new());
        summary.push("+++ Generated (last 10 lines) +++".to_string());
        let skip = generated_lines.len().saturating_sub(sample);
        summary.extend(generated_lines.iter().skip(skip).map(|s| s.to_string()));
        summary.push(String::new());
    }

    summary.push("=== END SUMMARY ===".to_string());
    summary.join("\n")
}

/// Flattens diff opcodes into the emitted line stream with monotonic
/// numbering.
struct LineEmitter {
    lines: Vec<DiffLine>,
    next_number: u32,
}

impl LineEmitter {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            next_number: 1,
        }
    }

    fn into_lines(self) -> Vec<DiffLine> {
        self.lines
    }

    /// Emit one opcode run. `truncation` carries the true (unpadded) lengths
    /// of each side in chunked mode; indices at or past them are padding and
    /// are skipped.
    fn emit_ops(
        &mut self,
        ops: &[DiffOp],
        expected: &[&str],
        generated: &[&str],
        truncation: Option<(usize, usize)>,
    ) -> Result<()> {
        let (true_expected, true_generated) =
            truncation.unwrap_or((expected.len(), generated.len()));

        for op in ops {
            match *op {
                DiffOp::Equal {
                    old_index,
                    new_index,
                    len,
                } => {
                    for offset in 0..len {
                        if new_index + offset >= true_generated {
                            continue;
                        }
                        self.push(DiffTag::Equal, expected[old_index + offset])?;
                    }
                }
                DiffOp::Delete {
                    old_index, old_len, ..
                } => {
                    for offset in 0..old_len {
                        if old_index + offset >= true_expected {
                            continue;
                        }
                        self.push(DiffTag::Remove, expected[old_index + offset])?;
                    }
                }
                DiffOp::Insert {
                    new_index, new_len, ..
                } => {
                    for offset in 0..new_len {
                        if new_index + offset >= true_generated {
                            continue;
                        }
                        self.push(DiffTag::Add, generated[new_index + offset])?;
                    }
                }
                DiffOp::Replace {
                    old_index,
                    old_len,
                    new_index,
                    new_len,
                } => {
                    for offset in 0..old_len {
                        if old_index + offset >= true_expected {
                            continue;
                        }
                        self.push(DiffTag::Remove, expected[old_index + offset])?;
                    }
                    for offset in 0..new_len {
                        if new_index + offset >= true_generated {
                            continue;
                        }
                        self.push(DiffTag::Add, generated[new_index + offset])?;
                    }
                }
            }
        }
        Ok(())
    }

    fn push(&mut self, tag: DiffTag, content: &str) -> Result<()> {
        if self.next_number == u32::MAX {
            return Err(Error::Internal("diff line counter exhausted".into()));
        }
        self.lines
            .push(DiffLine::new(tag, content, self.next_number));
        self.next_number += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn differ() -> CodeDiffer {
        CodeDiffer::new(
            Arc::new(ContentCache::new()),
            Arc::new(PerformanceMonitor::new()),
        )
    }

    /// Replay equal and add lines; must reproduce the generated side.
    fn reconstruct(lines: &[DiffLine]) -> String {
        lines
            .iter()
            .filter(|l| matches!(l.tag, DiffTag::Equal | DiffTag::Add))
            .map(|l| l.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn normalized(text: &str) -> String {
        text.lines().collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_identical_inputs_all_equal() {
        let mut differ = differ();
        let code = "fn main() {\n    println!(\"hi\");\n}";
        let lines = differ.compute_diff(Some(code), code);
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.tag == DiffTag::Equal));
        assert_eq!(differ.diff_text(Some(code), code), "");
    }

    #[test]
    fn test_missing_expected_all_added() {
        let mut differ = differ();
        let generated = "a\nb\nc";
        let lines = differ.compute_diff(None, generated);
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.tag == DiffTag::Add));
        assert_eq!(reconstruct(&lines), generated);
    }

    #[test]
    fn test_replace_emits_removes_then_adds() {
        let mut differ = differ();
        let lines = differ.compute_diff(Some("shared\nold_1\nold_2"), "shared\nnew_1\nnew_2");
        let tags: Vec<DiffTag> = lines.iter().map(|l| l.tag).collect();
        assert_eq!(
            tags,
            vec![
                DiffTag::Equal,
                DiffTag::Remove,
                DiffTag::Remove,
                DiffTag::Add,
                DiffTag::Add,
            ]
        );
    }

    #[test]
    fn test_line_numbers_monotonic_from_one() {
        let mut differ = differ();
        let lines = differ.compute_diff(Some("a\nb\nc"), "a\nx\nc\ny");
        for (index, line) in lines.iter().enumerate() {
            assert_eq!(line.line_number, index as u32 + 1);
        }
    }

    #[test]
    fn test_unified_diff_has_headers() {
        let mut differ = differ();
        let text = differ.diff_text(Some("a\n"), "b\n");
        assert!(text.contains("--- expected_code"));
        assert!(text.contains("+++ generated_code"));
        assert!(text.contains("-a"));
        assert!(text.contains("+b"));
    }

    #[test]
    fn test_whitespace_preserved() {
        let mut differ = differ();
        let lines = differ.compute_diff(Some("  indented"), "\tindented");
        assert_eq!(lines[0].content, "  indented");
        assert_eq!(lines[1].content, "\tindented");
    }

    #[test]
    fn test_structured_diff_is_cached() {
        let mut differ = differ();
        let first = differ.compute_diff(Some("a"), "b");
        let second = differ.compute_diff(Some("a"), "b");
        assert_eq!(first, second);
        assert_eq!(differ.diff_cache.len(), 1);
    }

    #[test]
    fn test_text_diff_populates_shared_cache() {
        let cache = Arc::new(ContentCache::new());
        let mut differ = CodeDiffer::new(Arc::clone(&cache), Arc::new(PerformanceMonitor::new()));
        differ.diff_text(Some("a"), "b");
        let key = format!("text_diff_{}", diff_cache_key("a", "b"));
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn test_byte_threshold_boundary() {
        // One long line: exactly 100 000 bytes stays on the standard path,
        // one byte more switches to the summary text.
        let at_limit = "x".repeat(LARGE_INPUT_BYTES);
        let past_limit = "x".repeat(LARGE_INPUT_BYTES + 1);

        let mut differ = differ();
        let text = differ.diff_text(None, &at_limit);
        assert!(text.contains("+++ generated_code"));

        let text = differ.diff_text(None, &past_limit);
        assert!(text.contains("=== LARGE FILE DIFF SUMMARY ==="));
    }

    #[test]
    fn test_line_threshold_boundary() {
        let at_limit = "x\n".repeat(LARGE_INPUT_LINES);
        let past_limit = "x\n".repeat(LARGE_INPUT_LINES + 1);

        assert!(!is_large("", &at_limit[..at_limit.len().min(LARGE_INPUT_BYTES)]));
        assert!(is_large("", &past_limit));
    }

    #[test]
    fn test_large_generated_summary_and_chunked_lines() {
        // End-to-end scenario: a 15 000-line generated file.
        let generated: String = (0..15_000)
            .map(|i| format!("line {}", i))
            .collect::<Vec<_>>()
            .join("\n");

        let mut differ = differ();
        let artifacts = differ.artifacts(None, &generated);

        assert_eq!(artifacts.lines.len(), 15_000);
        assert!(artifacts.lines.iter().all(|l| l.tag == DiffTag::Add));
        for (index, line) in artifacts.lines.iter().enumerate() {
            assert_eq!(line.line_number, index as u32 + 1);
        }
        assert_eq!(reconstruct(&artifacts.lines), generated);

        assert!(artifacts.unified_text.contains("=== LARGE FILE DIFF SUMMARY ==="));
        assert!(artifacts.unified_text.contains("Expected lines: 0"));
        assert!(artifacts.unified_text.contains("Generated lines: 15000"));
        assert!(artifacts.unified_text.contains("line 0"));
        assert!(artifacts.unified_text.contains("line 14999"));
    }

    #[test]
    fn test_chunked_reconstruction_with_edits() {
        let expected: String = (0..12_000)
            .map(|i| format!("line {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        // Edit a line in the middle and drop the tail.
        let mut generated_lines: Vec<String> =
            (0..11_500).map(|i| format!("line {}", i)).collect();
        generated_lines[6_000] = "edited".to_string();
        let generated = generated_lines.join("\n");

        let mut differ = differ();
        let lines = differ.compute_diff(Some(&expected), &generated);
        assert_eq!(reconstruct(&lines), normalized(&generated));
        for window in lines.windows(2) {
            assert!(window[1].line_number > window[0].line_number);
        }
    }

    #[test]
    fn test_fallback_shape() {
        let lines = fallback_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].tag, DiffTag::Equal);
        assert_eq!(lines[0].content, "<diff failed>");
    }

    #[test]
    fn test_cache_key_is_stable_md5() {
        assert_eq!(diff_cache_key("a", "b"), diff_cache_key("a", "b"));
        assert_ne!(diff_cache_key("a", "b"), diff_cache_key("b", "a"));
        assert_eq!(diff_cache_key("", "").len(), 32);
    }

    proptest! {
        // Replaying equal and add lines reconstructs the generated side for
        // arbitrary small inputs, including blank lines.
        #[test]
        fn prop_reconstruction(
            expected in proptest::collection::vec("[ab ]{0,4}", 0..40),
            generated in proptest::collection::vec("[ab ]{0,4}", 0..40),
        ) {
            let expected = expected.join("\n");
            let generated = generated.join("\n");
            let mut differ = differ();
            let lines = differ.compute_diff(Some(&expected), &generated);
            prop_assert_eq!(reconstruct(&lines), normalized(&generated));
        }
    }
}

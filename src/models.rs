//! Core data model for the review-session engine.
//!
//! These types flow between the data-source adapters, the differ, the
//! report writer and the controller. They are all serde-serializable: the
//! session store persists them as JSON and the event surface ships them to
//! the presentation layer.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::sources::{SourceConfig, SourceFilters};

/// Maximum reviewer-comment length in characters.
pub const MAX_COMMENT_LEN: usize = 1000;

/// Maximum experiment-name length in characters.
pub const MAX_EXPERIMENT_NAME_LEN: usize = 50;

/// Maximum number of configurable verdict buttons.
pub const MAX_VERDICT_BUTTONS: usize = 10;

static EXPERIMENT_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid experiment-name pattern"));

static VERDICT_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("valid verdict-id pattern"));

static KEY_BINDING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9]|F[1-9]|F1[0-2]|Escape|Enter|Space|Tab)$")
        .expect("valid key-binding pattern")
});

// =============================================================================
// Code pairs
// =============================================================================

/// `source_info` key marking a handle that has not been materialized yet.
pub const LAZY_FLAG: &str = "lazy";

/// `source_info` key recording a latin-1 decode fallback.
pub const ENCODING_FALLBACK_KEY: &str = "encoding_fallback";

/// A single unit of review work: the generated candidate, the optional
/// expected reference, and the optional original input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodePair {
    /// Stable identifier, unique within a session.
    pub identifier: String,
    /// Ground-truth code; absence is legal.
    pub expected_code: Option<String>,
    /// Candidate code under review. An empty body is a legal pair.
    pub generated_code: String,
    /// Original input the candidate was generated from.
    pub input_code: Option<String>,
    /// Origin metadata: source file, row id, model name, strategy, lazy flag.
    #[serde(default)]
    pub source_info: HashMap<String, String>,
}

impl CodePair {
    /// Create a materialized pair.
    pub fn new(identifier: impl Into<String>, generated_code: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            expected_code: None,
            generated_code: generated_code.into(),
            input_code: None,
            source_info: HashMap::new(),
        }
    }

    /// Create a handle-only pair that an adapter materializes on demand.
    pub fn handle(identifier: impl Into<String>) -> Self {
        let mut pair = Self::new(identifier, String::new());
        pair.source_info
            .insert(LAZY_FLAG.to_string(), "true".to_string());
        pair
    }

    /// Attach the expected code body.
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected_code = Some(expected.into());
        self
    }

    /// Attach the original input body.
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input_code = Some(input.into());
        self
    }

    /// Add a source-info entry.
    pub fn with_source_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.source_info.insert(key.into(), value.into());
        self
    }

    /// Whether this pair still needs adapter materialization.
    pub fn is_lazy(&self) -> bool {
        self.source_info.get(LAZY_FLAG).map(String::as_str) == Some("true")
    }

    /// Strip code bodies back to a handle, keeping provenance metadata.
    ///
    /// Used by the session store so checkpoints persist handles, not bodies.
    pub fn to_handle(&self) -> Self {
        let mut pair = Self {
            identifier: self.identifier.clone(),
            expected_code: None,
            generated_code: String::new(),
            input_code: None,
            source_info: self.source_info.clone(),
        };
        pair.source_info
            .insert(LAZY_FLAG.to_string(), "true".to_string());
        pair
    }

    /// Model name recorded by the adapter, if any.
    pub fn model_name(&self) -> Option<&str> {
        self.source_info.get("model_name").map(String::as_str)
    }

    /// Prompting strategy recorded by the adapter, if any.
    pub fn prompting_strategy(&self) -> Option<&str> {
        self.source_info
            .get("prompting_strategy")
            .map(String::as_str)
    }

    /// Validate pair invariants.
    ///
    /// Handles are exempt from the body check; their bodies arrive at
    /// materialization time.
    pub fn validate(&self) -> Result<()> {
        if self.identifier.is_empty() {
            return Err(Error::Config("code pair identifier is empty".into()));
        }
        if self.is_lazy() {
            return Ok(());
        }
        let expected_empty = self
            .expected_code
            .as_ref()
            .map(|s| s.is_empty())
            .unwrap_or(true);
        if expected_empty && self.generated_code.is_empty() {
            return Err(Error::Config(format!(
                "code pair {} has no expected or generated content",
                self.identifier
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Diff output
// =============================================================================

/// Classification of a single rendered diff line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffTag {
    Equal,
    Add,
    Remove,
    Modify,
}

impl std::fmt::Display for DiffTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Equal => "equal",
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Modify => "modify",
        };
        write!(f, "{}", s)
    }
}

/// One line of a rendered diff stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffLine {
    pub tag: DiffTag,
    /// Line text without a trailing newline.
    pub content: String,
    /// 1-based ordinal in emission order; monotonic across the stream.
    pub line_number: u32,
}

impl DiffLine {
    pub fn new(tag: DiffTag, content: impl Into<String>, line_number: u32) -> Self {
        Self {
            tag,
            content: content.into(),
            line_number,
        }
    }
}

/// Diff artifacts handed to the presentation layer with each pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffArtifacts {
    /// Structured stream for side-by-side highlighting.
    pub lines: Vec<DiffLine>,
    /// Unified-diff text (or the large-input summary) for the report row.
    pub unified_text: String,
}

// =============================================================================
// Review results and flags
// =============================================================================

/// One completed review, written as a single report row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    /// 1-based within the session, contiguous and monotonically increasing.
    pub review_id: u32,
    pub source_identifier: String,
    pub experiment_name: String,
    pub review_timestamp_utc: DateTime<Utc>,
    /// Display text of the chosen verdict button.
    pub reviewer_verdict: String,
    pub reviewer_comment: String,
    /// Effective review time, paused intervals excluded.
    pub time_to_review_seconds: f64,
    /// Snapshot of the codes as displayed at review time.
    pub expected_code: String,
    pub generated_code: String,
    pub code_diff: String,
    pub model_name: Option<String>,
    pub prompting_strategy: Option<String>,
}

impl ReviewResult {
    /// Validate row invariants before it reaches the report writer.
    pub fn validate(&self) -> Result<()> {
        if self.review_id == 0 {
            return Err(Error::Internal("review_id must be 1-based".into()));
        }
        if self.source_identifier.is_empty() {
            return Err(Error::Internal("review has empty source identifier".into()));
        }
        validate_comment(&self.reviewer_comment)?;
        Ok(())
    }
}

/// Validate a reviewer comment at the command boundary.
pub fn validate_comment(comment: &str) -> Result<()> {
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(Error::InvalidComment(format!(
            "comment exceeds {} characters",
            MAX_COMMENT_LEN
        )));
    }
    if comment.contains('\0') {
        return Err(Error::InvalidComment("comment contains NUL".into()));
    }
    Ok(())
}

/// Flag classification for the append-only side-tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagType {
    /// The input itself is vulnerable; the pair is replaced when possible.
    Vulnerable,
    /// The expected code is not vulnerable; review of the pair continues.
    NotVulnerableExpected,
}

impl std::fmt::Display for FlagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Vulnerable => "VULNERABLE",
            Self::NotVulnerableExpected => "NOT_VULNERABLE_EXPECTED",
        };
        write!(f, "{}", s)
    }
}

/// One flag event, mirroring the review-row schema plus a discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagEntry {
    /// 1-based within the session, per flag class.
    pub flag_id: u32,
    pub source_identifier: String,
    pub experiment_name: String,
    pub flagged_timestamp_utc: DateTime<Utc>,
    pub flagged_comment: String,
    pub time_to_flag_seconds: f64,
    pub expected_code: String,
    pub generated_code: String,
    pub input_code: String,
    pub flag_type: FlagType,
}

impl FlagEntry {
    /// Build a flag entry from the pair currently under review.
    pub fn from_pair(
        flag_id: u32,
        pair: &CodePair,
        experiment_name: impl Into<String>,
        comment: impl Into<String>,
        time_to_flag_seconds: f64,
        flag_type: FlagType,
    ) -> Self {
        Self {
            flag_id,
            source_identifier: pair.identifier.clone(),
            experiment_name: experiment_name.into(),
            flagged_timestamp_utc: Utc::now(),
            flagged_comment: comment.into(),
            time_to_flag_seconds,
            expected_code: pair.expected_code.clone().unwrap_or_default(),
            generated_code: pair.generated_code.clone(),
            input_code: pair.input_code.clone().unwrap_or_default(),
            flag_type,
        }
    }
}

// =============================================================================
// Session state and configuration
// =============================================================================

/// Report output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Excel,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Excel => "xlsx",
            Self::Csv => "csv",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excel => write!(f, "excel"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Inputs collected before any session state exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub experiment_name: String,
    pub source: SourceConfig,
    pub sample_percentage: f32,
    pub output_format: OutputFormat,
    /// Restrict adapter rows to this model, when the source has a model column.
    pub selected_model: Option<String>,
    /// Restrict adapter rows to this prompting strategy.
    pub selected_strategy: Option<String>,
}

impl SessionConfig {
    pub fn new(
        experiment_name: impl Into<String>,
        source: SourceConfig,
        sample_percentage: f32,
        output_format: OutputFormat,
    ) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            source,
            sample_percentage,
            output_format,
            selected_model: None,
            selected_strategy: None,
        }
    }

    /// Validate configure-time rules; never deferred to mid-session.
    pub fn validate(&self) -> Result<()> {
        if self.experiment_name.is_empty() {
            return Err(Error::Config("experiment name is empty".into()));
        }
        if self.experiment_name.len() > MAX_EXPERIMENT_NAME_LEN {
            return Err(Error::Config(format!(
                "experiment name exceeds {} characters",
                MAX_EXPERIMENT_NAME_LEN
            )));
        }
        if !EXPERIMENT_NAME_PATTERN.is_match(&self.experiment_name) {
            return Err(Error::Config(
                "experiment name may only contain letters, digits, '_' and '-'".into(),
            ));
        }
        if !(self.sample_percentage > 0.0 && self.sample_percentage <= 100.0) {
            return Err(Error::Config(format!(
                "sample percentage {} outside (0, 100]",
                self.sample_percentage
            )));
        }
        Ok(())
    }

    /// Derive the stable session token: experiment name + UTC timestamp.
    pub fn derive_session_id(&self, now: DateTime<Utc>) -> String {
        format!("{}_{}", self.experiment_name, now.format("%Y%m%d_%H%M%S"))
    }
}

/// Durable snapshot of one review session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub experiment_name: String,
    /// Enough to reconstruct the adapter on resume.
    pub data_source_config: SourceConfig,
    /// Model/strategy restrictions active when the session was created.
    #[serde(default)]
    pub source_filters: SourceFilters,
    /// Identifiers in completion order.
    pub completed_reviews: Vec<String>,
    /// Pairs left to review; handle-only entries are materialized at dequeue.
    pub remaining_queue: Vec<CodePair>,
    pub created_timestamp: DateTime<Utc>,
    pub last_saved_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub flagged_entries: Vec<FlagEntry>,
    #[serde(default)]
    pub not_vulnerable_entries: Vec<FlagEntry>,
}

impl SessionState {
    pub fn new(
        session_id: impl Into<String>,
        experiment_name: impl Into<String>,
        data_source_config: SourceConfig,
        remaining_queue: Vec<CodePair>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            experiment_name: experiment_name.into(),
            data_source_config,
            source_filters: SourceFilters::default(),
            completed_reviews: Vec::new(),
            remaining_queue,
            created_timestamp: now,
            last_saved_timestamp: now,
            flagged_entries: Vec::new(),
            not_vulnerable_entries: Vec::new(),
        }
    }

    /// Total work in this session: done plus still queued.
    pub fn total_count(&self) -> usize {
        self.completed_reviews.len() + self.remaining_queue.len()
    }

    /// Check the completed/remaining disjointness invariant.
    pub fn check_integrity(&self) -> Result<()> {
        for pair in &self.remaining_queue {
            if self.completed_reviews.iter().any(|c| c == &pair.identifier) {
                return Err(Error::corrupted(
                    &self.session_id,
                    format!("{} is both completed and queued", pair.identifier),
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Verdict buttons
// =============================================================================

/// Color themes a verdict button can request from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTheme {
    Default,
    Success,
    Warning,
    Error,
    Info,
    Primary,
}

impl Default for ColorTheme {
    fn default() -> Self {
        Self::Default
    }
}

/// Configuration for one verdict button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictButtonConfig {
    /// UPPER_SNAKE identifier, e.g. `SUCCESS` or `INVALID_CODE`.
    pub verdict_id: String,
    /// Shown on the button and written into report rows.
    pub display_text: String,
    /// Single character, function key, or special key.
    pub key_binding: String,
    #[serde(default)]
    pub color_theme: ColorTheme,
    pub tooltip: Option<String>,
}

impl VerdictButtonConfig {
    pub fn new(
        verdict_id: impl Into<String>,
        display_text: impl Into<String>,
        key_binding: impl Into<String>,
        color_theme: ColorTheme,
    ) -> Self {
        Self {
            verdict_id: verdict_id.into(),
            display_text: display_text.into(),
            key_binding: key_binding.into(),
            color_theme,
            tooltip: None,
        }
    }

    /// Attach a tooltip.
    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    /// Display text plus the keyboard shortcut indicator.
    pub fn display_with_shortcut(&self) -> String {
        format!("{} ({})", self.display_text, self.key_binding)
    }

    /// Validate one button configuration.
    pub fn validate(&self) -> Result<()> {
        if !VERDICT_ID_PATTERN.is_match(&self.verdict_id) {
            return Err(Error::Config(format!(
                "verdict_id '{}' must be uppercase with underscores",
                self.verdict_id
            )));
        }
        if self.display_text.trim().is_empty() || self.display_text.len() > 50 {
            return Err(Error::Config(format!(
                "display_text for {} must be 1..=50 characters",
                self.verdict_id
            )));
        }
        if !KEY_BINDING_PATTERN.is_match(&self.key_binding) {
            return Err(Error::Config(format!(
                "key_binding '{}' must be a single character, function key, or special key",
                self.key_binding
            )));
        }
        if let Some(tooltip) = &self.tooltip {
            if tooltip.len() > 200 {
                return Err(Error::Config(format!(
                    "tooltip for {} exceeds 200 characters",
                    self.verdict_id
                )));
            }
        }
        Ok(())
    }
}

/// The default verdict vocabulary.
pub fn default_verdict_buttons() -> Vec<VerdictButtonConfig> {
    vec![
        VerdictButtonConfig::new("SUCCESS", "Success", "s", ColorTheme::Success)
            .with_tooltip("Code generation was successful and matches expected output"),
        VerdictButtonConfig::new(
            "FAILURE_NO_CHANGE",
            "Failure - No Change",
            "f",
            ColorTheme::Error,
        )
        .with_tooltip("Code generation failed to make any changes"),
        VerdictButtonConfig::new("INVALID_CODE", "Invalid Code", "i", ColorTheme::Error)
            .with_tooltip("Generated code contains syntax errors or is invalid"),
        VerdictButtonConfig::new(
            "WRONG_VULNERABILITY",
            "Wrong Vulnerability",
            "w",
            ColorTheme::Warning,
        )
        .with_tooltip("Code addresses a different vulnerability than intended"),
        VerdictButtonConfig::new(
            "PARTIAL_SUCCESS",
            "Partial Success",
            "p",
            ColorTheme::Info,
        )
        .with_tooltip("Code generation was partially successful but incomplete"),
        VerdictButtonConfig::new("CUSTOM", "Custom", "c", ColorTheme::Default)
            .with_tooltip("Free-form verdict; explain in the comment"),
    ]
}

/// Validate a full button set: count, id uniqueness, key uniqueness.
pub fn validate_verdict_buttons(buttons: &[VerdictButtonConfig]) -> Result<()> {
    if buttons.is_empty() {
        return Err(Error::Config(
            "at least one verdict button must be configured".into(),
        ));
    }
    if buttons.len() > MAX_VERDICT_BUTTONS {
        return Err(Error::Config(format!(
            "maximum of {} verdict buttons allowed",
            MAX_VERDICT_BUTTONS
        )));
    }
    let mut ids = std::collections::HashSet::new();
    let mut keys = std::collections::HashSet::new();
    for button in buttons {
        button.validate()?;
        if !ids.insert(button.verdict_id.clone()) {
            return Err(Error::Config(format!(
                "duplicate verdict_id '{}'",
                button.verdict_id
            )));
        }
        if !keys.insert(button.key_binding.to_lowercase()) {
            return Err(Error::Config(format!(
                "duplicate key_binding '{}'",
                button.key_binding
            )));
        }
    }
    Ok(())
}

// =============================================================================
// Progress
// =============================================================================

/// Progress snapshot for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// Completed reviews so far.
    pub current: usize,
    /// Completed plus remaining.
    pub total: usize,
    /// Identifier of the pair currently on screen, if any.
    pub current_identifier: String,
    pub experiment_name: String,
    pub paused: bool,
}

impl ProgressInfo {
    /// Completion percentage; 100 when there is nothing to do.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.current as f64 / self.total as f64) * 100.0
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.current)
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }

    /// `current/total (pct%)` for status bars.
    pub fn progress_text(&self) -> String {
        format!("{}/{} ({:.1}%)", self.current, self.total, self.percentage())
    }

    /// Status line with the current identifier, truncated to fit.
    pub fn status_text(&self) -> String {
        if self.is_complete() {
            return format!("Review Complete - {}", self.experiment_name);
        }
        let display = if self.current_identifier.len() <= 30 {
            self.current_identifier.clone()
        } else {
            let tail: String = self
                .current_identifier
                .chars()
                .rev()
                .take(27)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("...{}", tail)
        };
        format!("Reviewing: {}", display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceConfig;
    use std::path::PathBuf;

    fn folders_config() -> SourceConfig {
        SourceConfig::Folders {
            generated_code_path: PathBuf::from("/tmp/gen"),
            expected_code_path: None,
            input_code_path: None,
        }
    }

    #[test]
    fn test_code_pair_validation() {
        let pair = CodePair::new("a", "fn main() {}");
        assert!(pair.validate().is_ok());

        let empty_id = CodePair::new("", "code");
        assert!(empty_id.validate().is_err());

        // Empty generated body is legal when an expected body exists.
        let pair = CodePair::new("b", "").with_expected("fn main() {}");
        assert!(pair.validate().is_ok());

        let both_empty = CodePair::new("c", "");
        assert!(both_empty.validate().is_err());
    }

    #[test]
    fn test_code_pair_handle_round_trip() {
        let pair = CodePair::new("x", "body")
            .with_expected("exp")
            .with_source_info("model_name", "gpt");
        let handle = pair.to_handle();
        assert!(handle.is_lazy());
        assert!(handle.generated_code.is_empty());
        assert!(handle.expected_code.is_none());
        assert_eq!(handle.model_name(), Some("gpt"));
        // Handles pass validation despite empty bodies.
        assert!(handle.validate().is_ok());
    }

    #[test]
    fn test_comment_validation_boundaries() {
        assert!(validate_comment(&"x".repeat(MAX_COMMENT_LEN)).is_ok());
        assert!(validate_comment(&"x".repeat(MAX_COMMENT_LEN + 1)).is_err());
        assert!(validate_comment("has\0nul").is_err());
    }

    #[test]
    fn test_session_config_validation() {
        let mut config =
            SessionConfig::new("exp_1", folders_config(), 50.0, OutputFormat::Csv);
        assert!(config.validate().is_ok());

        config.experiment_name = "bad name!".into();
        assert!(config.validate().is_err());

        config.experiment_name = "x".repeat(MAX_EXPERIMENT_NAME_LEN + 1);
        assert!(config.validate().is_err());

        config.experiment_name = "ok".into();
        config.sample_percentage = 0.0;
        assert!(config.validate().is_err());
        config.sample_percentage = 100.5;
        assert!(config.validate().is_err());
        config.sample_percentage = 100.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_id_derivation() {
        let config = SessionConfig::new("exp", folders_config(), 100.0, OutputFormat::Csv);
        let now = DateTime::parse_from_rfc3339("2024-03-01T12:30:45Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(config.derive_session_id(now), "exp_20240301_123045");
    }

    #[test]
    fn test_session_state_integrity() {
        let mut state = SessionState::new(
            "s1",
            "exp",
            folders_config(),
            vec![CodePair::new("a", "x"), CodePair::new("b", "y")],
        );
        assert!(state.check_integrity().is_ok());
        assert_eq!(state.total_count(), 2);

        state.completed_reviews.push("a".into());
        assert!(state.check_integrity().is_err());
    }

    #[test]
    fn test_default_verdict_buttons_valid() {
        let buttons = default_verdict_buttons();
        assert_eq!(buttons.len(), 6);
        assert!(validate_verdict_buttons(&buttons).is_ok());
        assert!(buttons.iter().any(|b| b.verdict_id == "CUSTOM"));
    }

    #[test]
    fn test_verdict_button_rules() {
        let bad_id = VerdictButtonConfig::new("lower_case", "Text", "x", ColorTheme::Default);
        assert!(bad_id.validate().is_err());

        let bad_key = VerdictButtonConfig::new("OK", "Text", "F13", ColorTheme::Default);
        assert!(bad_key.validate().is_err());

        let fkey = VerdictButtonConfig::new("OK", "Text", "F12", ColorTheme::Default);
        assert!(fkey.validate().is_ok());
    }

    #[test]
    fn test_verdict_button_set_rules() {
        let mut buttons = default_verdict_buttons();

        // Case-insensitive key collision.
        buttons.push(VerdictButtonConfig::new(
            "ANOTHER",
            "Another",
            "S",
            ColorTheme::Default,
        ));
        assert!(validate_verdict_buttons(&buttons).is_err());

        buttons.pop();
        for i in 0..5 {
            buttons.push(VerdictButtonConfig::new(
                format!("EXTRA_{}", i),
                format!("Extra {}", i),
                format!("{}", i),
                ColorTheme::Default,
            ));
        }
        // 11 buttons exceeds the cap.
        assert!(validate_verdict_buttons(&buttons).is_err());
    }

    #[test]
    fn test_progress_info() {
        let progress = ProgressInfo {
            current: 3,
            total: 10,
            current_identifier: "pair_4".into(),
            experiment_name: "exp".into(),
            paused: false,
        };
        assert!((progress.percentage() - 30.0).abs() < f64::EPSILON);
        assert_eq!(progress.remaining(), 7);
        assert_eq!(progress.progress_text(), "3/10 (30.0%)");
        assert_eq!(progress.status_text(), "Reviewing: pair_4");

        let done = ProgressInfo {
            current: 2,
            total: 2,
            current_identifier: String::new(),
            experiment_name: "exp".into(),
            paused: false,
        };
        assert_eq!(done.status_text(), "Review Complete - exp");

        let empty = ProgressInfo {
            current: 0,
            total: 0,
            current_identifier: String::new(),
            experiment_name: "exp".into(),
            paused: false,
        };
        assert!((empty.percentage() - 100.0).abs() < f64::EPSILON);
    }
}

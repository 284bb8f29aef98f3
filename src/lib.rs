//! # auditor-core
//!
//! The review-session engine behind the VAITP code-review auditor: ingest
//! code pairs from heterogeneous sources, sample them into a durable work
//! queue, diff each pair with bounded memory, capture verdicts into an
//! append-only crash-safe report with undo, and persist session state so a
//! review resumes exactly where it stopped.
//!
//! ## Core Components
//!
//! - **Sources**: uniform iteration over pairs from folders, SQLite or
//!   spreadsheets
//! - **Sampler**: session-seeded subset selection
//! - **Differ**: structured + unified diffs with a chunked large-input path
//! - **Session**: atomic checkpointing of resumable session state
//! - **Report**: CSV/xlsx row persistence with undo and CSV failover
//! - **Controller**: the state machine driving one review session
//!
//! ## Example
//!
//! ```rust,ignore
//! use auditor_core::{
//!     OutputFormat, ReviewController, SessionConfig, SessionStore, SourceConfig,
//! };
//!
//! let store = SessionStore::new()?;
//! let (mut controller, events) = ReviewController::with_event_queue(store, "reports");
//!
//! let config = SessionConfig::new(
//!     "experiment_1",
//!     SourceConfig::Folders {
//!         generated_code_path: "gen".into(),
//!         expected_code_path: Some("exp".into()),
//!         input_code_path: None,
//!     },
//!     100.0,
//!     OutputFormat::Excel,
//! );
//! controller.start_new_session(config)?;
//!
//! while let Some(pair) = controller.next_pair()? {
//!     // render pair + drained events, collect the verdict...
//!     controller.submit_verdict("SUCCESS", "")?;
//! }
//! ```

pub mod controller;
pub mod differ;
pub mod error;
pub mod models;
pub mod perf;
pub mod report;
pub mod sampler;
pub mod session;
pub mod sources;

// Re-exports for convenience
pub use controller::{
    ControllerState, EventQueue, EventSink, NullSink, ReviewController, SessionEvent,
};
pub use differ::CodeDiffer;
pub use error::{Error, ErrorKind, Result};
pub use models::{
    default_verdict_buttons, validate_verdict_buttons, CodePair, ColorTheme, DiffArtifacts,
    DiffLine, DiffTag, FlagEntry, FlagType, OutputFormat, ProgressInfo, ReviewResult,
    SessionConfig, SessionState, VerdictButtonConfig,
};
pub use perf::{
    CacheStats, ChunkedProcessor, ContentCache, LazyLoader, PerformanceMonitor,
    PerformanceThresholds,
};
pub use report::{CsvReportWriter, ExcelReportWriter, FlagSink, ReportWriter};
pub use sampler::{sample_handles, sample_size};
pub use session::{SessionStore, SCHEMA_VERSION};
pub use sources::{
    build_source, DataSource, ExcelSource, FoldersSource, SourceConfig, SourceFilters, SourceKind,
    SqliteSource,
};

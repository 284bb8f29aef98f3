//! The review-session controller.
//!
//! One state machine coordinates the adapters, sampler, differ, report
//! writer, flag sink and session store. The presentation layer drives it
//! through the command methods and observes it through [`SessionEvent`]s;
//! the controller owns every session-scoped resource and threads the shared
//! cache and monitor through its collaborators explicitly.

mod events;

pub use events::{EventQueue, EventSink, NullSink, SessionEvent};

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::differ::CodeDiffer;
use crate::error::{Error, Result};
use crate::models::{
    default_verdict_buttons, validate_comment, validate_verdict_buttons, CodePair, DiffArtifacts,
    FlagEntry, FlagType, ProgressInfo, ReviewResult, SessionConfig, SessionState,
    VerdictButtonConfig,
};
use crate::perf::{CacheStats, ContentCache, OpSummary, PerformanceMonitor, DISPLAY_CYCLE_OP};
use crate::report::{FlagSink, ReportWriter};
use crate::sampler;
use crate::session::{reconcile_with_report, SessionStore};
use crate::sources::{build_source, DataSource, SourceFilters};

/// Controller lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Configuring,
    Running,
    Paused,
    Completing,
    Terminated,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Configuring => "configuring",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completing => "completing",
            Self::Terminated => "terminated",
        };
        write!(f, "{}", s)
    }
}

/// Effective-time clock: wall time minus paused intervals, floored at zero.
#[derive(Debug, Default)]
struct ReviewClock {
    review_start: Option<Instant>,
    pause_start: Option<Instant>,
    paused_total: Duration,
}

impl ReviewClock {
    fn start_review(&mut self) {
        self.review_start = Some(Instant::now());
        self.pause_start = None;
        self.paused_total = Duration::ZERO;
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn pause(&mut self) {
        if self.pause_start.is_none() {
            self.pause_start = Some(Instant::now());
        }
    }

    fn resume(&mut self) {
        if let Some(started) = self.pause_start.take() {
            self.paused_total += started.elapsed();
        }
    }

    fn effective_seconds(&self) -> f64 {
        let Some(started) = self.review_start else {
            return 0.0;
        };
        let mut paused = self.paused_total;
        if let Some(pause_started) = self.pause_start {
            paused += pause_started.elapsed();
        }
        started
            .elapsed()
            .checked_sub(paused)
            .unwrap_or(Duration::ZERO)
            .as_secs_f64()
    }
}

/// The pair currently on screen plus its diff artifacts.
struct LoadedPair {
    pair: CodePair,
    diff: DiffArtifacts,
}

/// Coordinates one review session end to end.
pub struct ReviewController {
    state: ControllerState,
    store: SessionStore,
    reports_dir: PathBuf,
    sink: Box<dyn EventSink>,
    cache: Arc<ContentCache>,
    monitor: Arc<PerformanceMonitor>,
    differ: CodeDiffer,
    buttons: Vec<VerdictButtonConfig>,
    session: Option<SessionState>,
    source: Option<Box<dyn DataSource>>,
    report: ReportWriter,
    flags: Option<FlagSink>,
    rng: Option<StdRng>,
    clock: ReviewClock,
    current: Option<LoadedPair>,
    last_reviewed: Option<CodePair>,
}

impl ReviewController {
    /// Build a controller around a store, a reports directory and an event
    /// sink.
    pub fn new(store: SessionStore, reports_dir: impl Into<PathBuf>, sink: Box<dyn EventSink>) -> Self {
        let cache = Arc::new(ContentCache::new());
        let monitor = Arc::new(PerformanceMonitor::new());
        let differ = CodeDiffer::new(Arc::clone(&cache), Arc::clone(&monitor));
        Self {
            state: ControllerState::Idle,
            store,
            reports_dir: reports_dir.into(),
            sink,
            cache,
            monitor,
            differ,
            buttons: default_verdict_buttons(),
            session: None,
            source: None,
            report: ReportWriter::new(),
            flags: None,
            rng: None,
            clock: ReviewClock::default(),
            current: None,
            last_reviewed: None,
        }
    }

    /// Convenience constructor returning the queue the presentation drains.
    pub fn with_event_queue(
        store: SessionStore,
        reports_dir: impl Into<PathBuf>,
    ) -> (Self, EventQueue) {
        let queue = EventQueue::new();
        let controller = Self::new(store, reports_dir, Box::new(queue.clone()));
        (controller, queue)
    }

    /// Replace the verdict vocabulary (validated; up to 10 buttons).
    pub fn with_buttons(mut self, buttons: Vec<VerdictButtonConfig>) -> Result<Self> {
        validate_verdict_buttons(&buttons)?;
        self.buttons = buttons;
        Ok(self)
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == ControllerState::Paused
    }

    pub fn buttons(&self) -> &[VerdictButtonConfig] {
        &self.buttons
    }

    pub fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    /// Live report path, once a session is active.
    pub fn report_path(&self) -> Result<PathBuf> {
        self.report.path()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn perf_summary(&self) -> std::collections::HashMap<String, OpSummary> {
        self.monitor.summary()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Build the adapter, sample the inventory, open the report, checkpoint.
    pub fn start_new_session(&mut self, config: SessionConfig) -> Result<String> {
        if self.state != ControllerState::Idle {
            let err = Error::Config(format!(
                "cannot start a session while {}",
                self.state
            ));
            self.surface(&err);
            return Err(err);
        }
        self.state = ControllerState::Configuring;
        match self.bootstrap_new(config) {
            Ok(session_id) => {
                self.state = ControllerState::Running;
                self.emit_progress();
                Ok(session_id)
            }
            Err(err) => {
                self.state = ControllerState::Idle;
                self.surface(&err);
                Err(err)
            }
        }
    }

    /// Reload a persisted session, rebuild its adapter, reopen its report.
    pub fn resume_session(&mut self, session_id: &str) -> Result<()> {
        if self.state != ControllerState::Idle {
            let err = Error::Config(format!(
                "cannot resume a session while {}",
                self.state
            ));
            self.surface(&err);
            return Err(err);
        }
        self.state = ControllerState::Configuring;
        match self.bootstrap_resume(session_id) {
            Ok(()) => {
                self.state = ControllerState::Running;
                self.emit_progress();
                Ok(())
            }
            Err(err) => {
                self.state = ControllerState::Idle;
                self.surface(&err);
                Err(err)
            }
        }
    }

    /// Rebuild a session whose state file is corrupted or lost.
    ///
    /// The adapter is reconstructed from the original configuration and
    /// re-sampled with the session-id seed (a no-op relative to the original
    /// draw), then the already-written report rows are treated as the source
    /// of truth for completed work.
    pub fn rebuild_session(&mut self, session_id: &str, config: SessionConfig) -> Result<()> {
        if self.state != ControllerState::Idle {
            let err = Error::Config(format!("cannot rebuild a session while {}", self.state));
            self.surface(&err);
            return Err(err);
        }
        self.state = ControllerState::Configuring;
        match self.bootstrap_rebuild(session_id, config) {
            Ok(()) => {
                self.state = ControllerState::Running;
                self.emit_progress();
                Ok(())
            }
            Err(err) => {
                self.state = ControllerState::Idle;
                self.surface(&err);
                Err(err)
            }
        }
    }

    /// Materialize the queue head and hand it over with its diff artifacts.
    ///
    /// Returns `None` once the queue is empty. Calling again while a pair is
    /// loaded returns the same pair without re-emitting events.
    pub fn next_pair(&mut self) -> Result<Option<CodePair>> {
        let result = self.next_pair_impl();
        if let Err(err) = &result {
            self.surface(err);
        }
        result
    }

    /// Persist a verdict for the loaded pair: row append, checkpoint,
    /// dequeue.
    pub fn submit_verdict(&mut self, verdict_id: &str, comment: &str) -> Result<()> {
        let result = self.submit_verdict_impl(verdict_id, comment);
        if let Err(err) = &result {
            self.surface(err);
        }
        result
    }

    /// Retract the tail row and push the pair back to the queue head.
    pub fn undo_last(&mut self) -> Result<()> {
        let result = self.undo_last_impl();
        if let Err(err) = &result {
            self.surface(err);
        }
        result
    }

    /// Flag the loaded pair as vulnerable and replace it when possible.
    pub fn flag_vulnerable(&mut self, comment: &str) -> Result<()> {
        let result = self.flag_vulnerable_impl(comment);
        if let Err(err) = &result {
            self.surface(err);
        }
        result
    }

    /// Flag the loaded pair's expected code as not vulnerable; review of the
    /// pair continues.
    pub fn flag_safe(&mut self, comment: &str) -> Result<()> {
        let result = self.flag_safe_impl(comment);
        if let Err(err) = &result {
            self.surface(err);
        }
        result
    }

    /// Stop the effective-time clock and block review inputs.
    pub fn pause(&mut self) -> Result<()> {
        if self.state != ControllerState::Running {
            let err = if self.state == ControllerState::Paused {
                Error::SessionPaused
            } else {
                Error::SessionNotActive
            };
            self.surface(&err);
            return Err(err);
        }
        self.state = ControllerState::Paused;
        self.clock.pause();
        self.emit_progress();
        Ok(())
    }

    /// Restart the clock, excluding the paused interval.
    pub fn resume_work(&mut self) -> Result<()> {
        if self.state != ControllerState::Paused {
            let err = Error::SessionNotActive;
            self.surface(&err);
            return Err(err);
        }
        self.state = ControllerState::Running;
        self.clock.resume();
        self.emit_progress();
        Ok(())
    }

    /// Checkpoint, finalize the report, terminate.
    ///
    /// Permitted in any state with a live session; idempotent afterwards.
    pub fn quit(&mut self) -> Result<PathBuf> {
        let result = self.quit_impl();
        if let Err(err) = &result {
            self.surface(err);
        }
        result
    }

    /// Current progress counters.
    pub fn get_progress(&self) -> ProgressInfo {
        self.progress_snapshot()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn bootstrap_new(&mut self, config: SessionConfig) -> Result<String> {
        config.validate()?;
        let session_id = config.derive_session_id(Utc::now());
        let filters = SourceFilters {
            model: config.selected_model.clone(),
            strategy: config.selected_strategy.clone(),
        };

        let mut source = build_source(&config.source, &filters)?;
        let queue = source.load_data(config.sample_percentage, &session_id)?;
        info!(
            session = %session_id,
            sampled = queue.len(),
            source = %config.source.kind(),
            "session created"
        );

        let mut session = SessionState::new(
            &session_id,
            &config.experiment_name,
            config.source.clone(),
            queue,
        );
        session.source_filters = filters;

        self.report.init_report(
            &self.reports_dir,
            &session_id,
            &config.experiment_name,
            config.output_format,
        )?;
        self.flags = Some(FlagSink::new(&self.reports_dir, &config.experiment_name));
        self.rng = Some(sampler::session_rng(&session_id));
        self.store.save(&mut session)?;

        self.session = Some(session);
        self.source = Some(source);
        self.clock.clear();
        self.current = None;
        self.last_reviewed = None;
        Ok(session_id)
    }

    fn bootstrap_resume(&mut self, session_id: &str) -> Result<()> {
        let mut session = self.store.load(session_id)?;
        let source = build_source(&session.data_source_config, &session.source_filters)?;

        self.report.reopen(&self.reports_dir, session_id)?;
        let rows = self.report.row_ids()?;
        let folded = reconcile_with_report(&mut session, &rows);
        if folded > 0 {
            info!(folded, session = %session_id, "report rows folded into session on resume");
        }

        self.flags = Some(FlagSink::new(&self.reports_dir, &session.experiment_name));
        self.rng = Some(sampler::session_rng(session_id));
        self.store.save(&mut session)?;

        info!(
            session = %session_id,
            completed = session.completed_reviews.len(),
            remaining = session.remaining_queue.len(),
            "session resumed"
        );
        self.session = Some(session);
        self.source = Some(source);
        self.clock.clear();
        self.current = None;
        self.last_reviewed = None;
        Ok(())
    }

    fn bootstrap_rebuild(&mut self, session_id: &str, config: SessionConfig) -> Result<()> {
        config.validate()?;
        let filters = SourceFilters {
            model: config.selected_model.clone(),
            strategy: config.selected_strategy.clone(),
        };
        let mut source = build_source(&config.source, &filters)?;
        let queue = source.load_data(config.sample_percentage, session_id)?;

        let mut session = SessionState::new(
            session_id,
            &config.experiment_name,
            config.source.clone(),
            queue,
        );
        session.source_filters = filters;

        self.report.reopen(&self.reports_dir, session_id)?;
        let rows = self.report.row_ids()?;
        let folded = reconcile_with_report(&mut session, &rows);
        info!(
            session = %session_id,
            folded,
            remaining = session.remaining_queue.len(),
            "session rebuilt from report"
        );

        self.flags = Some(FlagSink::new(&self.reports_dir, &config.experiment_name));
        self.rng = Some(sampler::session_rng(session_id));
        self.store.save(&mut session)?;

        self.session = Some(session);
        self.source = Some(source);
        self.clock.clear();
        self.current = None;
        self.last_reviewed = None;
        Ok(())
    }

    fn next_pair_impl(&mut self) -> Result<Option<CodePair>> {
        self.guard_running()?;
        if let Some(loaded) = &self.current {
            return Ok(Some(loaded.pair.clone()));
        }

        let Some(session) = self.session.as_mut() else {
            return Err(Error::SessionNotActive);
        };
        let Some(head) = session.remaining_queue.first().cloned() else {
            return Ok(None);
        };

        let pair = if head.is_lazy() {
            let source = self
                .source
                .as_mut()
                .ok_or_else(|| Error::NotConfigured("data source unavailable".into()))?;
            source.get_code_pair(&head.identifier)?
        } else {
            head
        };
        session.remaining_queue[0] = pair.clone();

        let ctx = self.monitor.start(DISPLAY_CYCLE_OP);
        let diff = self
            .differ
            .artifacts(pair.expected_code.as_deref(), &pair.generated_code);
        self.monitor.end(ctx);

        self.current = Some(LoadedPair {
            pair: pair.clone(),
            diff: diff.clone(),
        });
        self.clock.start_review();

        let progress = self.progress_snapshot();
        self.sink.emit(SessionEvent::PairLoaded {
            pair: pair.clone(),
            diff,
        });
        self.sink.emit(SessionEvent::ProgressChanged(progress));
        Ok(Some(pair))
    }

    fn submit_verdict_impl(&mut self, verdict_id: &str, comment: &str) -> Result<()> {
        self.guard_running()?;
        let verdict_display = self
            .buttons
            .iter()
            .find(|button| button.verdict_id == verdict_id)
            .map(|button| button.display_text.clone())
            .ok_or_else(|| Error::InvalidVerdict(verdict_id.to_string()))?;
        validate_comment(comment)?;

        let Some(loaded) = self.current.take() else {
            return Err(Error::NoPairLoaded);
        };

        let session = self.session.as_mut().ok_or(Error::SessionNotActive)?;
        if session.remaining_queue.first().map(|p| p.identifier.as_str())
            != Some(loaded.pair.identifier.as_str())
        {
            self.current = Some(loaded);
            return Err(Error::Internal(
                "queue head does not match the loaded pair".into(),
            ));
        }
        let pair = session.remaining_queue.remove(0);
        let review_id = session.completed_reviews.len() as u32 + 1;
        let experiment_name = session.experiment_name.clone();

        let result = ReviewResult {
            review_id,
            source_identifier: pair.identifier.clone(),
            experiment_name,
            review_timestamp_utc: Utc::now(),
            reviewer_verdict: verdict_display,
            reviewer_comment: comment.to_string(),
            time_to_review_seconds: self.clock.effective_seconds(),
            expected_code: pair.expected_code.clone().unwrap_or_default(),
            generated_code: pair.generated_code.clone(),
            code_diff: loaded.diff.unified_text.clone(),
            model_name: pair.model_name().map(str::to_string),
            prompting_strategy: pair.prompting_strategy().map(str::to_string),
        };

        // Row append happens-before the checkpoint. A failed append restores
        // the in-memory state so the reviewer can retry.
        if let Err(err) = self.report.append_row(&result) {
            let session = self.session.as_mut().expect("session checked above");
            session.remaining_queue.insert(0, pair);
            self.current = Some(loaded);
            return Err(err);
        }
        if let Some(new_path) = self.report.take_failover_notice() {
            self.sink.emit(SessionEvent::ReportFailover { new_path });
        }

        let session = self.session.as_mut().expect("session checked above");
        session.completed_reviews.push(pair.identifier.clone());
        self.last_reviewed = Some(pair);

        // A failed checkpoint keeps the in-memory review; the report row is
        // already durable and recovery treats it as authoritative.
        let session = self.session.as_mut().expect("session checked above");
        self.store.save(session)?;

        self.clock.clear();
        self.sink.emit(SessionEvent::VerdictAccepted { review_id });
        self.emit_progress();

        let queue_empty = self
            .session
            .as_ref()
            .map(|s| s.remaining_queue.is_empty())
            .unwrap_or(false);
        if queue_empty {
            self.complete()?;
        }
        Ok(())
    }

    fn undo_last_impl(&mut self) -> Result<()> {
        match self.state {
            ControllerState::Running => {}
            ControllerState::Paused => return Err(Error::SessionPaused),
            _ => return Err(Error::SessionNotActive),
        }
        let session = self.session.as_mut().ok_or(Error::SessionNotActive)?;
        if session.completed_reviews.is_empty() {
            return Err(Error::NothingToUndo);
        }
        let review_id = session.completed_reviews.len() as u32;

        let removed = self.report.retract_last()?;
        if !removed {
            warn!(review_id, "tail report row already missing during undo");
        }

        let session = self.session.as_mut().expect("session checked above");
        let identifier = session
            .completed_reviews
            .pop()
            .expect("non-empty checked above");
        let pair = match self.last_reviewed.take() {
            Some(pair) if pair.identifier == identifier => pair,
            other => {
                self.last_reviewed = other;
                CodePair::handle(&identifier)
            }
        };
        session.remaining_queue.insert(0, pair);

        self.current = None;
        self.clock.clear();
        let session = self.session.as_mut().expect("session checked above");
        self.store.save(session)?;

        self.sink.emit(SessionEvent::UndoAccepted { review_id });
        self.emit_progress();
        Ok(())
    }

    fn flag_vulnerable_impl(&mut self, comment: &str) -> Result<()> {
        self.guard_running()?;
        validate_comment(comment)?;
        let Some(loaded) = self.current.take() else {
            return Err(Error::NoPairLoaded);
        };

        let session = self.session.as_mut().ok_or(Error::SessionNotActive)?;
        if session.remaining_queue.first().map(|p| p.identifier.as_str())
            != Some(loaded.pair.identifier.as_str())
        {
            self.current = Some(loaded);
            return Err(Error::Internal(
                "queue head does not match the loaded pair".into(),
            ));
        }
        let pair = session.remaining_queue.remove(0);
        let flag_id = session.flagged_entries.len() as u32 + 1;
        let experiment_name = session.experiment_name.clone();
        let entry = FlagEntry::from_pair(
            flag_id,
            &pair,
            experiment_name,
            comment,
            self.clock.effective_seconds(),
            FlagType::Vulnerable,
        );

        let flags = self.flags.as_ref().ok_or(Error::NotInitialized)?;
        if let Err(err) = flags.append(&entry) {
            let session = self.session.as_mut().expect("session checked above");
            session.remaining_queue.insert(0, pair);
            self.current = Some(loaded);
            return Err(err);
        }

        let session = self.session.as_mut().expect("session checked above");
        session.flagged_entries.push(entry);
        info!(identifier = %pair.identifier, "pair flagged vulnerable");

        self.draw_replacement();

        self.clock.clear();
        let session = self.session.as_mut().expect("session checked above");
        self.store.save(session)?;
        self.emit_progress();
        Ok(())
    }

    fn flag_safe_impl(&mut self, comment: &str) -> Result<()> {
        self.guard_running()?;
        validate_comment(comment)?;
        let Some(loaded) = self.current.as_ref() else {
            return Err(Error::NoPairLoaded);
        };

        let session = self.session.as_mut().ok_or(Error::SessionNotActive)?;
        let flag_id = session.not_vulnerable_entries.len() as u32 + 1;
        let experiment_name = session.experiment_name.clone();
        let entry = FlagEntry::from_pair(
            flag_id,
            &loaded.pair,
            experiment_name,
            comment,
            self.clock.effective_seconds(),
            FlagType::NotVulnerableExpected,
        );

        let flags = self.flags.as_ref().ok_or(Error::NotInitialized)?;
        flags.append(&entry)?;

        let session = self.session.as_mut().expect("session checked above");
        session.not_vulnerable_entries.push(entry);
        self.store.save(session)?;
        // The pair is not consumed; review continues with the clock running.
        Ok(())
    }

    fn quit_impl(&mut self) -> Result<PathBuf> {
        match self.state {
            ControllerState::Completing | ControllerState::Terminated => self.report.finalize(),
            ControllerState::Idle | ControllerState::Configuring => Err(Error::SessionNotActive),
            ControllerState::Running | ControllerState::Paused => {
                let session = self.session.as_mut().ok_or(Error::SessionNotActive)?;
                self.store.save(session)?;
                self.complete()
            }
        }
    }

    /// Finalize the report and terminate; reaching Completing is one-way.
    fn complete(&mut self) -> Result<PathBuf> {
        self.state = ControllerState::Completing;
        if let Some(session) = self.session.as_mut() {
            if let Err(err) = self.store.save(session) {
                warn!(%err, "final checkpoint failed during completion");
            }
        }
        let path = self.report.finalize()?;
        self.sink.emit(SessionEvent::SessionCompleted {
            final_report_path: path.clone(),
        });
        self.state = ControllerState::Terminated;
        info!(path = %path.display(), "session completed");
        Ok(path)
    }

    /// Best-effort replacement draw after a vulnerable flag: uniform over
    /// `inventory − (completed ∪ flagged ∪ remaining)`.
    fn draw_replacement(&mut self) {
        let Some(source) = self.source.as_mut() else {
            return;
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let inventory = match source.inventory() {
            Ok(inventory) => inventory,
            Err(err) => {
                warn!(%err, "replacement draw skipped: inventory unavailable");
                return;
            }
        };

        let mut excluded: HashSet<&str> = HashSet::new();
        excluded.extend(session.completed_reviews.iter().map(String::as_str));
        excluded.extend(
            session
                .flagged_entries
                .iter()
                .map(|entry| entry.source_identifier.as_str()),
        );
        excluded.extend(
            session
                .remaining_queue
                .iter()
                .map(|pair| pair.identifier.as_str()),
        );

        let candidates: Vec<&String> = inventory
            .iter()
            .filter(|identifier| !excluded.contains(identifier.as_str()))
            .collect();
        let Some(rng) = self.rng.as_mut() else {
            return;
        };
        let Some(choice) = candidates.choose(rng).map(|s| s.to_string()) else {
            info!("no unseen inventory left; proceeding without replacement");
            return;
        };
        drop(candidates);
        drop(excluded);

        match source.make_handle(&choice) {
            Ok(handle) => {
                info!(identifier = %choice, "replacement pair drawn");
                session.remaining_queue.push(handle);
            }
            Err(err) => warn!(%err, "replacement handle could not be built"),
        }
    }

    fn guard_running(&self) -> Result<()> {
        match self.state {
            ControllerState::Running => Ok(()),
            ControllerState::Paused => Err(Error::SessionPaused),
            _ => Err(Error::SessionNotActive),
        }
    }

    fn progress_snapshot(&self) -> ProgressInfo {
        let (current, total, experiment_name) = match &self.session {
            Some(session) => (
                session.completed_reviews.len(),
                session.total_count(),
                session.experiment_name.clone(),
            ),
            None => (0, 0, String::new()),
        };
        let current_identifier = self
            .current
            .as_ref()
            .map(|loaded| loaded.pair.identifier.clone())
            .or_else(|| {
                self.session
                    .as_ref()
                    .and_then(|s| s.remaining_queue.first())
                    .map(|pair| pair.identifier.clone())
            })
            .unwrap_or_default();
        ProgressInfo {
            current,
            total,
            current_identifier,
            experiment_name,
            paused: self.state == ControllerState::Paused,
        }
    }

    fn emit_progress(&mut self) {
        let progress = self.progress_snapshot();
        self.sink.emit(SessionEvent::ProgressChanged(progress));
    }

    fn surface(&mut self, err: &Error) {
        self.sink
            .emit(SessionEvent::error(err.kind(), err.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OutputFormat, MAX_COMMENT_LEN};
    use crate::report::{CsvReportWriter, ExcelReportWriter};
    use crate::sources::SourceConfig;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    struct Fixture {
        _root: TempDir,
        gen_dir: PathBuf,
        exp_dir: PathBuf,
        base_dir: PathBuf,
        reports_dir: PathBuf,
    }

    fn fixture(pairs: usize) -> Fixture {
        let root = TempDir::new().unwrap();
        let gen_dir = root.path().join("gen");
        let exp_dir = root.path().join("exp");
        fs::create_dir_all(&gen_dir).unwrap();
        fs::create_dir_all(&exp_dir).unwrap();
        for i in 0..pairs {
            fs::write(
                gen_dir.join(format!("pair_{:03}.py", i)),
                format!("generated {}\n", i),
            )
            .unwrap();
            fs::write(
                exp_dir.join(format!("pair_{:03}.txt", i)),
                format!("expected {}\n", i),
            )
            .unwrap();
        }
        Fixture {
            base_dir: root.path().join("state"),
            reports_dir: root.path().join("reports"),
            _root: root,
            gen_dir,
            exp_dir,
        }
    }

    fn config(fixture: &Fixture, pct: f32, format: OutputFormat) -> SessionConfig {
        SessionConfig::new(
            "exp",
            SourceConfig::Folders {
                generated_code_path: fixture.gen_dir.clone(),
                expected_code_path: Some(fixture.exp_dir.clone()),
                input_code_path: None,
            },
            pct,
            format,
        )
    }

    fn controller(fixture: &Fixture) -> (ReviewController, EventQueue) {
        ReviewController::with_event_queue(
            SessionStore::with_base_dir(&fixture.base_dir),
            &fixture.reports_dir,
        )
    }

    fn event_names(queue: &EventQueue) -> Vec<&'static str> {
        queue.drain().iter().map(|e| e.type_name()).collect()
    }

    #[test]
    fn test_full_session_over_folder_pairs() {
        let fixture = fixture(2);
        let (mut controller, queue) = controller(&fixture);

        let session_id = controller
            .start_new_session(config(&fixture, 100.0, OutputFormat::Csv))
            .unwrap();
        assert_eq!(controller.state(), ControllerState::Running);

        // Basename pairing: both pairs present, stems as identifiers.
        let pair = controller.next_pair().unwrap().unwrap();
        assert_eq!(pair.identifier, "pair_000");
        assert_eq!(pair.expected_code.as_deref(), Some("expected 0\n"));
        controller.submit_verdict("SUCCESS", "").unwrap();

        let pair = controller.next_pair().unwrap().unwrap();
        assert_eq!(pair.identifier, "pair_001");
        controller.submit_verdict("SUCCESS", "second").unwrap();

        // Queue drained: the session completed itself.
        assert_eq!(controller.state(), ControllerState::Terminated);

        let report_path = fixture.reports_dir.join(format!("{}_exp.csv", session_id));
        let writer = CsvReportWriter::new(&report_path);
        assert_eq!(
            writer.row_ids().unwrap(),
            vec![(1, "pair_000".into()), (2, "pair_001".into())]
        );

        let names = event_names(&queue);
        assert!(names.contains(&"pair_loaded"));
        assert!(names.contains(&"verdict_accepted"));
        assert!(names.contains(&"session_completed"));
    }

    #[test]
    fn test_undo_past_the_edge() {
        let fixture = fixture(2);
        let (mut controller, _queue) = controller(&fixture);
        controller
            .start_new_session(config(&fixture, 100.0, OutputFormat::Csv))
            .unwrap();

        controller.next_pair().unwrap().unwrap();
        controller.submit_verdict("SUCCESS", "").unwrap();
        assert_eq!(controller.get_progress().current, 1);

        controller.undo_last().unwrap();
        let session = controller.session().unwrap();
        assert!(session.completed_reviews.is_empty());
        assert_eq!(session.remaining_queue[0].identifier, "pair_000");
        assert_eq!(controller.report.high_water_mark(), 0);

        // Second undo hits the edge; state unchanged.
        let err = controller.undo_last().unwrap_err();
        assert!(matches!(err, Error::NothingToUndo));
        assert_eq!(controller.session().unwrap().remaining_queue.len(), 2);

        // The restored pair comes back for review.
        let pair = controller.next_pair().unwrap().unwrap();
        assert_eq!(pair.identifier, "pair_000");
    }

    #[test]
    fn test_submit_then_undo_restores_state() {
        let fixture = fixture(3);
        let (mut controller, _queue) = controller(&fixture);
        controller
            .start_new_session(config(&fixture, 100.0, OutputFormat::Csv))
            .unwrap();

        controller.next_pair().unwrap().unwrap();
        let mut before = controller.session().unwrap().clone();
        controller.submit_verdict("SUCCESS", "will undo").unwrap();
        controller.undo_last().unwrap();

        let mut after = controller.session().unwrap().clone();
        // Timestamps advance with every checkpoint; the reviewable state
        // must match exactly.
        before.last_saved_timestamp = after.last_saved_timestamp;
        after.created_timestamp = before.created_timestamp;
        assert_eq!(before, after);
    }

    #[test]
    fn test_crash_between_append_and_checkpoint() {
        let fixture = fixture(3);
        let session_id;
        {
            let (mut controller, _queue) = controller(&fixture);
            session_id = controller
                .start_new_session(config(&fixture, 100.0, OutputFormat::Csv))
                .unwrap();
            controller.next_pair().unwrap().unwrap();
            controller.submit_verdict("SUCCESS", "").unwrap();
            // Crash simulation: row 2 reaches the report but no checkpoint
            // lands after it.
            let report_path = fixture.reports_dir.join(format!("{}_exp.csv", session_id));
            let mut raw = CsvReportWriter::new(&report_path);
            raw.append_row(&ReviewResult {
                review_id: 2,
                source_identifier: "pair_001".into(),
                experiment_name: "exp".into(),
                review_timestamp_utc: Utc::now(),
                reviewer_verdict: "Success".into(),
                reviewer_comment: String::new(),
                time_to_review_seconds: 1.0,
                expected_code: String::new(),
                generated_code: "generated 1\n".into(),
                code_diff: String::new(),
                model_name: None,
                prompting_strategy: None,
            })
            .unwrap();
        }

        let (mut controller, _queue) = controller(&fixture);
        controller.resume_session(&session_id).unwrap();

        let session = controller.session().unwrap();
        assert_eq!(session.completed_reviews, vec!["pair_000", "pair_001"]);
        // The next dequeue skips the recovered identifier.
        let pair = controller.next_pair().unwrap().unwrap();
        assert_eq!(pair.identifier, "pair_002");
    }

    #[test]
    fn test_formula_comment_survives_excel_round_trip() {
        let fixture = fixture(1);
        let (mut controller, _queue) = controller(&fixture);
        let session_id = controller
            .start_new_session(config(&fixture, 100.0, OutputFormat::Excel))
            .unwrap();

        controller.next_pair().unwrap().unwrap();
        controller.submit_verdict("SUCCESS", "=SUM(1,2)").unwrap();

        let report_path = fixture.reports_dir.join(format!("{}_exp.xlsx", session_id));
        let reader = ExcelReportWriter::open(&report_path).unwrap();
        let rows = reader.read_rows().unwrap();
        assert_eq!(rows[0].reviewer_comment, "=SUM(1,2)");
    }

    #[test]
    fn test_flag_vulnerable_draws_replacement() {
        let fixture = fixture(50);
        let (mut controller, _queue) = controller(&fixture);
        controller
            .start_new_session(config(&fixture, 10.0, OutputFormat::Csv))
            .unwrap();
        let sampled: Vec<String> = controller
            .session()
            .unwrap()
            .remaining_queue
            .iter()
            .map(|p| p.identifier.clone())
            .collect();
        assert_eq!(sampled.len(), 5);

        for _ in 0..2 {
            controller.next_pair().unwrap().unwrap();
            controller.submit_verdict("SUCCESS", "").unwrap();
        }
        let flagged = controller.next_pair().unwrap().unwrap();
        controller.flag_vulnerable("binary garbage").unwrap();

        let session = controller.session().unwrap();
        // Completed reviews unchanged; the flagged pair left the queue and a
        // fresh draw from the unseen inventory arrived.
        assert_eq!(session.completed_reviews.len(), 2);
        assert_eq!(session.remaining_queue.len(), 3);
        assert_eq!(session.flagged_entries.len(), 1);
        assert_eq!(session.flagged_entries[0].source_identifier, flagged.identifier);
        let replacement = session.remaining_queue.last().unwrap();
        assert!(!sampled.contains(&replacement.identifier));

        let flag_file = fixture
            .reports_dir
            .join("flagged_entries")
            .join("exp_flagged_entries.csv");
        let contents = fs::read_to_string(flag_file).unwrap();
        assert!(contents.contains("binary garbage"));
    }

    #[test]
    fn test_flag_safe_keeps_current_pair() {
        let fixture = fixture(2);
        let (mut controller, _queue) = controller(&fixture);
        controller
            .start_new_session(config(&fixture, 100.0, OutputFormat::Csv))
            .unwrap();

        let pair = controller.next_pair().unwrap().unwrap();
        controller.flag_safe("known safe expected").unwrap();

        let session = controller.session().unwrap();
        assert_eq!(session.not_vulnerable_entries.len(), 1);
        assert_eq!(session.remaining_queue.len(), 2);
        // The same pair stays under review.
        assert_eq!(controller.next_pair().unwrap().unwrap().identifier, pair.identifier);

        let safe_file = fixture
            .reports_dir
            .join("flagged_entries")
            .join("exp_safe_entries.csv");
        assert!(safe_file.exists());
    }

    #[test]
    fn test_pause_blocks_inputs_and_excludes_time() {
        let fixture = fixture(1);
        let (mut controller, _queue) = controller(&fixture);
        controller
            .start_new_session(config(&fixture, 100.0, OutputFormat::Csv))
            .unwrap();
        controller.next_pair().unwrap().unwrap();

        controller.pause().unwrap();
        assert!(controller.is_paused());
        assert!(matches!(
            controller.submit_verdict("SUCCESS", ""),
            Err(Error::SessionPaused)
        ));
        assert!(matches!(controller.undo_last(), Err(Error::SessionPaused)));
        assert!(matches!(
            controller.flag_vulnerable(""),
            Err(Error::SessionPaused)
        ));

        std::thread::sleep(Duration::from_millis(200));
        controller.resume_work().unwrap();
        controller.submit_verdict("SUCCESS", "").unwrap();

        let report_path = controller.report_path().unwrap();
        let rows = CsvReportWriter::new(report_path).read_rows().unwrap();
        // The paused 200ms never counts toward the effective review time.
        assert!(rows[0].time_to_review_seconds < 0.15);
    }

    #[test]
    fn test_user_input_errors_leave_state_unchanged() {
        let fixture = fixture(1);
        let (mut controller, queue) = controller(&fixture);
        controller
            .start_new_session(config(&fixture, 100.0, OutputFormat::Csv))
            .unwrap();
        controller.next_pair().unwrap().unwrap();
        queue.drain();

        assert!(matches!(
            controller.submit_verdict("NOT_A_VERDICT", ""),
            Err(Error::InvalidVerdict(_))
        ));
        let long_comment = "x".repeat(MAX_COMMENT_LEN + 1);
        assert!(matches!(
            controller.submit_verdict("SUCCESS", &long_comment),
            Err(Error::InvalidComment(_))
        ));

        // Both rejections surfaced as error events and consumed nothing.
        let names = event_names(&queue);
        assert_eq!(names, vec!["error", "error"]);
        assert_eq!(controller.get_progress().current, 0);
        assert_eq!(controller.session().unwrap().remaining_queue.len(), 1);

        // Boundary: exactly MAX_COMMENT_LEN is accepted.
        let max_comment = "x".repeat(MAX_COMMENT_LEN);
        controller.submit_verdict("SUCCESS", &max_comment).unwrap();
    }

    #[test]
    fn test_quit_finalizes_and_is_idempotent() {
        let fixture = fixture(2);
        let (mut controller, _queue) = controller(&fixture);
        controller
            .start_new_session(config(&fixture, 100.0, OutputFormat::Csv))
            .unwrap();
        controller.next_pair().unwrap().unwrap();
        controller.submit_verdict("SUCCESS", "").unwrap();

        let path = controller.quit().unwrap();
        assert_eq!(controller.state(), ControllerState::Terminated);
        assert!(path.exists());
        // Terminated is absorbing; quit stays idempotent.
        assert_eq!(controller.quit().unwrap(), path);
        assert!(matches!(
            controller.submit_verdict("SUCCESS", ""),
            Err(Error::SessionNotActive)
        ));
    }

    #[test]
    fn test_resume_restores_queue_position() {
        let fixture = fixture(4);
        let session_id;
        {
            let (mut controller, _queue) = controller(&fixture);
            session_id = controller
                .start_new_session(config(&fixture, 100.0, OutputFormat::Csv))
                .unwrap();
            controller.next_pair().unwrap().unwrap();
            controller.submit_verdict("SUCCESS", "").unwrap();
            controller.quit().unwrap();
        }

        let (mut controller, _queue) = controller(&fixture);
        controller.resume_session(&session_id).unwrap();
        let progress = controller.get_progress();
        assert_eq!(progress.current, 1);
        assert_eq!(progress.total, 4);
        assert_eq!(
            controller.next_pair().unwrap().unwrap().identifier,
            "pair_001"
        );
    }

    #[test]
    fn test_rebuild_after_corrupted_state_file() {
        let fixture = fixture(3);
        let session_id;
        let session_config = config(&fixture, 100.0, OutputFormat::Csv);
        {
            let (mut controller, _queue) = controller(&fixture);
            session_id = controller
                .start_new_session(session_config.clone())
                .unwrap();
            controller.next_pair().unwrap().unwrap();
            controller.submit_verdict("SUCCESS", "").unwrap();
        }

        // Corrupt the state file; plain resume now fails.
        let state_file = fixture
            .base_dir
            .join("sessions")
            .join(format!("{}.state", session_id));
        fs::write(&state_file, b"{ mangled").unwrap();

        let (mut controller, _queue) = controller(&fixture);
        assert!(matches!(
            controller.resume_session(&session_id),
            Err(Error::CorruptedSession { .. })
        ));

        // Rebuild re-samples deterministically and folds the report back in.
        controller
            .rebuild_session(&session_id, session_config)
            .unwrap();
        let session = controller.session().unwrap();
        assert_eq!(session.completed_reviews, vec!["pair_000"]);
        assert_eq!(session.remaining_queue.len(), 2);
        assert_eq!(
            controller.next_pair().unwrap().unwrap().identifier,
            "pair_001"
        );
    }

    #[test]
    fn test_start_rejects_bad_configuration() {
        let fixture = fixture(1);
        let (mut controller, queue) = controller(&fixture);

        let mut bad = config(&fixture, 100.0, OutputFormat::Csv);
        bad.experiment_name = "bad name!".into();
        assert!(controller.start_new_session(bad).is_err());
        assert_eq!(controller.state(), ControllerState::Idle);
        assert!(event_names(&queue).contains(&"error"));

        // The controller recovers: a valid config starts normally.
        controller
            .start_new_session(config(&fixture, 100.0, OutputFormat::Csv))
            .unwrap();
        assert_eq!(controller.state(), ControllerState::Running);
    }

    #[test]
    fn test_next_pair_is_stable_while_loaded() {
        let fixture = fixture(2);
        let (mut controller, queue) = controller(&fixture);
        controller
            .start_new_session(config(&fixture, 100.0, OutputFormat::Csv))
            .unwrap();

        let first = controller.next_pair().unwrap().unwrap();
        queue.drain();
        let second = controller.next_pair().unwrap().unwrap();
        assert_eq!(first.identifier, second.identifier);
        // No duplicate pair_loaded for an already-loaded pair.
        assert!(queue.is_empty());
    }

    #[test]
    fn test_review_clock_effective_time() {
        let mut clock = ReviewClock::default();
        assert_eq!(clock.effective_seconds(), 0.0);

        clock.start_review();
        clock.pause();
        std::thread::sleep(Duration::from_millis(50));
        clock.resume();
        // Nearly everything since start was paused.
        assert!(clock.effective_seconds() < 0.04);

        // Pausing twice in a row keeps the first pause start.
        clock.pause();
        clock.pause();
        clock.resume();
        assert!(clock.effective_seconds() >= 0.0);
    }

    #[test]
    fn test_session_files_live_under_base_dir() {
        let fixture = fixture(1);
        let (mut controller, _queue) = controller(&fixture);
        let session_id = controller
            .start_new_session(config(&fixture, 100.0, OutputFormat::Csv))
            .unwrap();
        let state_file = fixture
            .base_dir
            .join("sessions")
            .join(format!("{}.state", session_id));
        assert!(state_file.exists());
        assert!(Path::new(&fixture.reports_dir).exists());
    }
}

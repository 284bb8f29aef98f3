//! Checkpointed session-state files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::SessionState;

/// Current session-payload schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Application directory under the user's home.
const APP_DIR: &str = ".vaitp_auditor";

/// Versioned on-disk envelope around the session payload.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    schema_version: u32,
    saved_at: DateTime<Utc>,
    state: SessionState,
}

/// Just enough of the envelope to gate on the version.
#[derive(Debug, Deserialize)]
struct VersionProbe {
    schema_version: u32,
}

/// Persists session state as one file per session.
pub struct SessionStore {
    sessions_dir: PathBuf,
}

impl SessionStore {
    /// Store under `<user_home>/.vaitp_auditor/sessions`.
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine the user home directory".into()))?;
        Ok(Self::with_base_dir(home.join(APP_DIR)))
    }

    /// Store under an explicit base directory (tests, portable installs).
    pub fn with_base_dir(base: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: base.into().join("sessions"),
        }
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Path of the live file for a session id.
    pub fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.state", session_id))
    }

    /// Atomic checkpoint: temp file in the same directory, fsync, rename.
    ///
    /// Materialized code bodies in the queue are stripped back to handles;
    /// adapters re-fetch them on demand. `last_saved_timestamp` is updated
    /// on the in-memory state after the rename lands.
    pub fn save(&self, state: &mut SessionState) -> Result<()> {
        fs::create_dir_all(&self.sessions_dir)?;

        let saved_at = Utc::now();
        let mut payload = state.clone();
        payload.last_saved_timestamp = saved_at;
        payload.remaining_queue = payload
            .remaining_queue
            .iter()
            .map(|pair| pair.to_handle())
            .collect();

        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            saved_at,
            state: payload,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        let live_path = self.session_path(&state.session_id);
        let temp_path = self.sessions_dir.join(format!(
            "{}.state.tmp",
            state.session_id
        ));
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &live_path)?;

        state.last_saved_timestamp = saved_at;
        debug!(session = %state.session_id, path = %live_path.display(), "session checkpoint");
        Ok(())
    }

    /// Load a session, gating on the schema version.
    pub fn load(&self, session_id: &str) -> Result<SessionState> {
        let path = self.session_path(session_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::Config(format!("session '{}' not found", session_id)));
            }
            Err(err) => return Err(Error::Io(err)),
        };

        let probe: VersionProbe = serde_json::from_slice(&bytes)
            .map_err(|err| Error::corrupted(session_id, format!("unreadable payload: {}", err)))?;
        let state = migrate(session_id, probe.schema_version, &bytes)?;

        if state.session_id != session_id {
            return Err(Error::corrupted(
                session_id,
                format!("payload belongs to session '{}'", state.session_id),
            ));
        }
        state.check_integrity()?;
        Ok(state)
    }

    /// Session ids with a live file, newest first.
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        let mut sessions: Vec<(std::time::SystemTime, String)> = Vec::new();
        let entries = match fs::read_dir(&self.sessions_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Error::Io(err)),
        };
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("state") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::UNIX_EPOCH);
            sessions.push((modified, stem.to_string()));
        }
        sessions.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(sessions.into_iter().map(|(_, id)| id).collect())
    }

    /// Delete a session file; false when it was already gone.
    pub fn delete(&self, session_id: &str) -> Result<bool> {
        match fs::remove_file(self.session_path(session_id)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(Error::Io(err)),
        }
    }
}

/// Parse a payload at a known schema version.
///
/// New versions add a branch here; anything else is a corrupted session.
fn migrate(session_id: &str, version: u32, bytes: &[u8]) -> Result<SessionState> {
    match version {
        SCHEMA_VERSION => {
            let envelope: Envelope = serde_json::from_slice(bytes).map_err(|err| {
                Error::corrupted(session_id, format!("schema v{} payload: {}", version, err))
            })?;
            Ok(envelope.state)
        }
        other => Err(Error::corrupted(
            session_id,
            format!("unsupported schema version {}", other),
        )),
    }
}

/// Fold report rows back into a session after a crash.
///
/// The report is the source of truth for completed work: any row identifier
/// missing from `completed_reviews` is appended in review-id order and
/// dropped from the remaining queue. Returns how many rows were folded in.
pub fn reconcile_with_report(state: &mut SessionState, report_rows: &[(u32, String)]) -> usize {
    let mut rows: Vec<&(u32, String)> = report_rows.iter().collect();
    rows.sort_by_key(|(id, _)| *id);

    let mut folded = 0;
    for (review_id, identifier) in rows {
        if state.completed_reviews.iter().any(|c| c == identifier) {
            continue;
        }
        warn!(
            review_id,
            identifier = %identifier,
            "report row missing from session log; treating report as authoritative"
        );
        state.completed_reviews.push(identifier.clone());
        state
            .remaining_queue
            .retain(|pair| &pair.identifier != identifier);
        folded += 1;
    }
    folded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CodePair;
    use crate::sources::SourceConfig;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sample_state(session_id: &str) -> SessionState {
        SessionState::new(
            session_id,
            "exp",
            SourceConfig::Folders {
                generated_code_path: PathBuf::from("/tmp/gen"),
                expected_code_path: None,
                input_code_path: None,
            },
            vec![
                CodePair::handle("a"),
                CodePair::handle("b"),
                CodePair::handle("c"),
            ],
        )
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::with_base_dir(dir.path());
        let mut state = sample_state("s1");

        store.save(&mut state).unwrap();
        let loaded = store.load("s1").unwrap();
        // Identity on the persisted form.
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_save_strips_materialized_bodies() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::with_base_dir(dir.path());
        let mut state = sample_state("s1");
        state.remaining_queue[0] = CodePair::new("a", "full body").with_expected("expected");

        store.save(&mut state).unwrap();
        let loaded = store.load("s1").unwrap();
        assert!(loaded.remaining_queue[0].is_lazy());
        assert!(loaded.remaining_queue[0].generated_code.is_empty());
        // The in-memory copy keeps its bodies.
        assert_eq!(state.remaining_queue[0].generated_code, "full body");
    }

    #[test]
    fn test_checkpoint_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::with_base_dir(dir.path());
        let mut state = sample_state("s1");
        store.save(&mut state).unwrap();

        let leftovers: Vec<_> = fs::read_dir(store.sessions_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_missing_session_is_config_error() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::with_base_dir(dir.path());
        assert!(matches!(store.load("nope"), Err(Error::Config(_))));
    }

    #[test]
    fn test_garbage_payload_is_corrupted_session() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::with_base_dir(dir.path());
        fs::create_dir_all(store.sessions_dir()).unwrap();
        fs::write(store.session_path("bad"), b"not json at all").unwrap();

        assert!(matches!(
            store.load("bad"),
            Err(Error::CorruptedSession { .. })
        ));
    }

    #[test]
    fn test_unknown_schema_version_is_corrupted_session() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::with_base_dir(dir.path());
        let mut state = sample_state("s1");
        store.save(&mut state).unwrap();

        let raw = fs::read_to_string(store.session_path("s1")).unwrap();
        let bumped = raw.replacen("\"schema_version\": 1", "\"schema_version\": 99", 1);
        fs::write(store.session_path("s1"), bumped).unwrap();

        match store.load("s1") {
            Err(Error::CorruptedSession { reason, .. }) => {
                assert!(reason.contains("99"));
            }
            other => panic!("expected corrupted session, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_session_id_mismatch_is_corrupted_session() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::with_base_dir(dir.path());
        let mut state = sample_state("s1");
        store.save(&mut state).unwrap();
        fs::rename(store.session_path("s1"), store.session_path("s2")).unwrap();

        assert!(matches!(
            store.load("s2"),
            Err(Error::CorruptedSession { .. })
        ));
    }

    #[test]
    fn test_list_and_delete_sessions() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::with_base_dir(dir.path());
        assert!(store.list_sessions().unwrap().is_empty());

        let mut a = sample_state("a");
        let mut b = sample_state("b");
        store.save(&mut a).unwrap();
        store.save(&mut b).unwrap();

        let mut listed = store.list_sessions().unwrap();
        listed.sort();
        assert_eq!(listed, vec!["a", "b"]);

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert_eq!(store.list_sessions().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_reconcile_with_report_folds_missing_rows() {
        let mut state = sample_state("s1");
        state.completed_reviews.push("z".into());

        // Row 2 ("a") was appended to the report but the checkpoint after it
        // never landed.
        let rows = vec![(1u32, "z".to_string()), (2u32, "a".to_string())];
        let folded = reconcile_with_report(&mut state, &rows);

        assert_eq!(folded, 1);
        assert_eq!(state.completed_reviews, vec!["z", "a"]);
        assert!(!state
            .remaining_queue
            .iter()
            .any(|pair| pair.identifier == "a"));
        assert_eq!(state.remaining_queue.len(), 2);

        // Idempotent on a second pass.
        assert_eq!(reconcile_with_report(&mut state, &rows), 0);
    }
}

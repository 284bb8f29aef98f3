//! Durable session persistence.
//!
//! One JSON file per session under a user-scoped directory, written through
//! an atomic temp-file-and-rename checkpoint. The payload carries an
//! explicit schema version; unknown versions surface as `CorruptedSession`
//! instead of being guessed at.

mod store;

pub use store::{reconcile_with_report, SessionStore, SCHEMA_VERSION};

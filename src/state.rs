//! Persisted rotation state.
//!
//! The state document records when the last rotation happened, the last
//! sequence number handed out, and every archive still tracked for
//! retention. It is rewritten after each mutation and reloaded at startup so
//! a restarted process neither double-rotates nor forgets its archives.
//!
//! Durability caveat: [`StateStore::save`] is a whole-document overwrite, not
//! a rename-atomic write. A crash mid-write can leave a torn document; the
//! next [`StateStore::load`] then falls back to the empty default, which is
//! the same recovery path as a first run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// One successfully rotated archive. Immutable after creation except for
/// removal from the tracked list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    /// When the rotation that produced this archive ran.
    pub created_at: DateTime<Utc>,
    /// Same-day ordinal; absent for calendar-frequency rotations without a
    /// size threshold.
    #[serde(default)]
    pub sequence_number: Option<u32>,
    /// Archive file name as produced by the name formatter.
    pub name: String,
    /// Full path of the archive file.
    pub path: PathBuf,
}

/// The rotator's durable state.
///
/// `archives` is always ordered ascending by `created_at` (oldest first);
/// age-based eviction relies on that to stop scanning early.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RotationState {
    /// Local instant of the last rotation, stored as UTC.
    pub last_rotation_at: Option<DateTime<Utc>>,
    /// Sequence number of the last rotation, when one was assigned.
    pub last_sequence_number: Option<u32>,
    /// Tracked archives, oldest first.
    pub archives: Vec<ArchiveRecord>,
}

/// Reads and rewrites the on-disk state document.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state document.
    ///
    /// A missing file, a parse failure or a schema mismatch all yield the
    /// empty default state: first run and corruption recovery are
    /// indistinguishable on purpose.
    pub async fn load(&self) -> RotationState {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(
                    path = %self.path.display(),
                    error = %err,
                    "no readable state document, starting from empty state"
                );
                return RotationState::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(err) => {
                debug!(
                    path = %self.path.display(),
                    error = %err,
                    "state document unparsable, starting from empty state"
                );
                RotationState::default()
            }
        }
    }

    /// Serialize and overwrite the full state document.
    pub async fn save(&self, state: &RotationState) -> Result<()> {
        let body = serde_json::to_vec_pretty(state).map_err(|err| Error::State {
            path: self.path.clone(),
            source: std::io::Error::other(err),
        })?;

        tokio::fs::write(&self.path, body)
            .await
            .map_err(|source| Error::State {
                path: self.path.clone(),
                source,
            })
    }
}

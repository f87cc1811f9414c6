//! Archive retention: count- and age-bounded eviction.
//!
//! Both passes operate on the tracked archive list (oldest first) and are
//! best-effort: an archive leaves the list only once its file is confirmed
//! gone, so a failed deletion stays tracked and is retried on the next
//! rotation.

use std::io::ErrorKind;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::state::{ArchiveRecord, RotationState};

/// Evict the oldest archives until at most `files_limit` remain tracked.
///
/// Deletions for all surplus entries are attempted concurrently; a failure on
/// one never aborts the others. Entries whose deletion fails stay in the list.
pub(crate) async fn remove_surplus(state: &mut RotationState, files_limit: usize) {
    if state.archives.len() <= files_limit {
        return;
    }
    let surplus = state.archives.len() - files_limit;
    let doomed: Vec<ArchiveRecord> = state.archives.drain(..surplus).collect();

    let outcomes = join_all(doomed.iter().map(delete_archive)).await;

    let mut kept = Vec::new();
    for (record, deleted) in doomed.into_iter().zip(outcomes) {
        if deleted {
            debug!(name = %record.name, "evicted surplus archive");
        } else {
            kept.push(record);
        }
    }
    // Failed deletions re-enter at the oldest end, preserving the ascending
    // created_at order.
    kept.extend(state.archives.drain(..));
    state.archives = kept;
}

/// Evict archives older than `max_age`.
///
/// Scans from the oldest end and stops at the first entry that is not
/// expired, which is valid only because the list is age-ordered ascending.
pub(crate) async fn remove_outdated(
    state: &mut RotationState,
    max_age: Duration,
    now: DateTime<Utc>,
) {
    let expired = state
        .archives
        .iter()
        .take_while(|record| {
            now.signed_duration_since(record.created_at)
                .to_std()
                .map(|age| age > max_age)
                .unwrap_or(false)
        })
        .count();
    if expired == 0 {
        return;
    }

    let doomed: Vec<ArchiveRecord> = state.archives.drain(..expired).collect();
    let outcomes = join_all(doomed.iter().map(delete_archive)).await;

    let mut kept = Vec::new();
    for (record, deleted) in doomed.into_iter().zip(outcomes) {
        if deleted {
            debug!(name = %record.name, "evicted outdated archive");
        } else {
            kept.push(record);
        }
    }
    kept.extend(state.archives.drain(..));
    state.archives = kept;
}

/// Delete one archive file. Returns whether the file is confirmed gone.
///
/// A missing file counts as gone; keeping its entry would retry forever.
async fn delete_archive(record: &ArchiveRecord) -> bool {
    match tokio::fs::remove_file(&record.path).await {
        Ok(()) => true,
        Err(err) if err.kind() == ErrorKind::NotFound => true,
        Err(err) => {
            warn!(
                path = %record.path.display(),
                error = %err,
                "archive deletion failed, keeping it tracked for retry"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    async fn archive_on_disk(dir: &Path, name: &str, age_secs: i64) -> ArchiveRecord {
        let path = dir.join(name);
        tokio::fs::write(&path, b"archived").await.unwrap();
        ArchiveRecord {
            created_at: Utc::now() - chrono::Duration::seconds(age_secs),
            sequence_number: None,
            name: name.to_string(),
            path,
        }
    }

    fn state_of(archives: Vec<ArchiveRecord>) -> RotationState {
        RotationState {
            last_rotation_at: None,
            last_sequence_number: None,
            archives,
        }
    }

    #[tokio::test]
    async fn surplus_evicts_oldest_first_down_to_limit() {
        let dir = tempdir().unwrap();
        let mut state = state_of(vec![
            archive_on_disk(dir.path(), "a.log", 300).await,
            archive_on_disk(dir.path(), "b.log", 200).await,
            archive_on_disk(dir.path(), "c.log", 100).await,
        ]);

        remove_surplus(&mut state, 1).await;

        assert_eq!(state.archives.len(), 1);
        assert_eq!(state.archives[0].name, "c.log");
        assert!(!dir.path().join("a.log").exists());
        assert!(!dir.path().join("b.log").exists());
        assert!(dir.path().join("c.log").exists());
    }

    #[tokio::test]
    async fn surplus_is_noop_at_or_under_limit() {
        let dir = tempdir().unwrap();
        let mut state = state_of(vec![archive_on_disk(dir.path(), "a.log", 10).await]);

        remove_surplus(&mut state, 3).await;

        assert_eq!(state.archives.len(), 1);
        assert!(dir.path().join("a.log").exists());
    }

    #[tokio::test]
    async fn surplus_keeps_entries_whose_deletion_fails() {
        let dir = tempdir().unwrap();
        // A non-empty directory makes remove_file fail with something other
        // than NotFound on every platform.
        let stubborn = dir.path().join("stubborn.log");
        tokio::fs::create_dir(&stubborn).await.unwrap();
        tokio::fs::write(stubborn.join("inner"), b"x").await.unwrap();

        let mut state = state_of(vec![
            ArchiveRecord {
                created_at: Utc::now() - chrono::Duration::seconds(300),
                sequence_number: None,
                name: "stubborn.log".to_string(),
                path: stubborn.clone(),
            },
            archive_on_disk(dir.path(), "b.log", 200).await,
            archive_on_disk(dir.path(), "c.log", 100).await,
        ]);

        remove_surplus(&mut state, 1).await;

        // b.log went; stubborn.log stayed tracked for the next pass, still
        // ahead of the younger survivor.
        let names: Vec<_> = state.archives.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["stubborn.log", "c.log"]);
        assert!(!dir.path().join("b.log").exists());
    }

    #[tokio::test]
    async fn surplus_treats_already_missing_file_as_evicted() {
        let dir = tempdir().unwrap();
        let mut state = state_of(vec![
            ArchiveRecord {
                created_at: Utc::now() - chrono::Duration::seconds(300),
                sequence_number: None,
                name: "ghost.log".to_string(),
                path: dir.path().join("ghost.log"),
            },
            archive_on_disk(dir.path(), "b.log", 100).await,
        ]);

        remove_surplus(&mut state, 1).await;

        assert_eq!(state.archives.len(), 1);
        assert_eq!(state.archives[0].name, "b.log");
    }

    #[tokio::test]
    async fn outdated_removes_only_expired_entries() {
        let dir = tempdir().unwrap();
        let mut state = state_of(vec![
            archive_on_disk(dir.path(), "old.log", 3600).await,
            archive_on_disk(dir.path(), "fresh.log", 10).await,
        ]);

        remove_outdated(&mut state, Duration::from_secs(600), Utc::now()).await;

        assert_eq!(state.archives.len(), 1);
        assert_eq!(state.archives[0].name, "fresh.log");
        assert!(!dir.path().join("old.log").exists());
        assert!(dir.path().join("fresh.log").exists());
    }

    #[tokio::test]
    async fn outdated_never_removes_young_archives() {
        let dir = tempdir().unwrap();
        let mut state = state_of(vec![
            archive_on_disk(dir.path(), "a.log", 50).await,
            archive_on_disk(dir.path(), "b.log", 20).await,
        ]);

        remove_outdated(&mut state, Duration::from_secs(600), Utc::now()).await;

        assert_eq!(state.archives.len(), 2);
    }

    #[tokio::test]
    async fn outdated_stops_at_first_non_expired_entry() {
        let dir = tempdir().unwrap();
        // The ascending-order invariant means everything after the first
        // non-expired entry is younger still; nothing past it is touched.
        let mut state = state_of(vec![
            archive_on_disk(dir.path(), "ancient.log", 7200).await,
            archive_on_disk(dir.path(), "fresh.log", 5).await,
        ]);

        remove_outdated(&mut state, Duration::from_secs(60), Utc::now()).await;

        let names: Vec<_> = state.archives.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["fresh.log"]);
    }
}

//! Rotation executor: the three archive-producing behaviors.
//!
//! One [`Executor::rotate`] call turns the live file's current content into
//! an archive file and returns the record for it. The caller owns the state
//! lock and is responsible for appending the record, running retention and
//! persisting before announcing the rotation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_compression::tokio::write::GzipEncoder;
use chrono::{DateTime, Local, Utc};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::config::Behavior;
use crate::error::{Error, Result};
use crate::naming::{NameFormatter, NameParts};
use crate::state::{ArchiveRecord, RotationState};

pub(crate) struct Executor {
    live_path: PathBuf,
    archive_dir: PathBuf,
    behavior: Behavior,
    base_name: String,
    extension: Option<String>,
    formatter: NameFormatter,
    /// Whether archive names carry sequence numbers (high-frequency rotation
    /// or a size threshold).
    sequenced: bool,
}

impl Executor {
    pub(crate) fn new(
        live_path: PathBuf,
        archive_dir: PathBuf,
        behavior: Behavior,
        formatter: NameFormatter,
        sequenced: bool,
    ) -> Self {
        let base_name = live_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = live_path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned());
        Self {
            live_path,
            archive_dir,
            behavior,
            base_name,
            extension,
            formatter,
            sequenced,
        }
    }

    /// Perform one rotation at `now` against the given state.
    ///
    /// Fails with [`Error::Rotation`] when the live file is inaccessible;
    /// the cycle is then skipped, not retried.
    pub(crate) async fn rotate(
        &self,
        state: &RotationState,
        now: DateTime<Local>,
    ) -> Result<ArchiveRecord> {
        // The live file must exist before we commit to a target name.
        tokio::fs::metadata(&self.live_path)
            .await
            .map_err(|source| self.live_err(source))?;

        let sequence_number = next_sequence_number(state, now, self.sequenced);

        let mut name = (self.formatter)(&NameParts {
            name: &self.base_name,
            extension: self.extension.as_deref(),
            date: Some(now),
            sequence_number,
        });
        if self.behavior == Behavior::CopyCompressTruncate {
            name.push_str(".gz");
        }
        let target = self.archive_dir.join(&name);

        // Rotation is overwrite-idempotent: a stale file at the target path
        // is removed first, and an absent one is not an error.
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(target_err(&target, source)),
        }

        match self.behavior {
            Behavior::Create => self.rename_and_recreate(&target).await?,
            Behavior::CopyTruncate => self.copy_and_truncate(&target).await?,
            Behavior::CopyCompressTruncate => self.compress_and_truncate(&target).await?,
        }

        debug!(
            archive = %target.display(),
            sequence = ?sequence_number,
            "rotated live file"
        );

        Ok(ArchiveRecord {
            created_at: now.with_timezone(&Utc),
            sequence_number,
            name,
            path: target,
        })
    }

    async fn rename_and_recreate(&self, target: &Path) -> Result<()> {
        tokio::fs::rename(&self.live_path, target)
            .await
            .map_err(|source| self.live_err(source))?;
        tokio::fs::write(&self.live_path, b"")
            .await
            .map_err(|source| self.live_err(source))
    }

    async fn copy_and_truncate(&self, target: &Path) -> Result<()> {
        tokio::fs::copy(&self.live_path, target)
            .await
            .map_err(|source| self.live_err(source))?;
        self.truncate_live().await
    }

    async fn compress_and_truncate(&self, target: &Path) -> Result<()> {
        let mut live = tokio::fs::File::open(&self.live_path)
            .await
            .map_err(|source| self.live_err(source))?;
        let archive = tokio::fs::File::create(target)
            .await
            .map_err(|source| target_err(target, source))?;

        let mut encoder = GzipEncoder::new(BufWriter::new(archive));
        tokio::io::copy(&mut live, &mut encoder)
            .await
            .map_err(|source| target_err(target, source))?;
        encoder
            .shutdown()
            .await
            .map_err(|source| target_err(target, source))?;

        self.truncate_live().await
    }

    /// Truncate the live file in place, keeping the inode a still-open writer
    /// handle points at.
    async fn truncate_live(&self) -> Result<()> {
        let live = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&self.live_path)
            .await
            .map_err(|source| self.live_err(source))?;
        live.set_len(0)
            .await
            .map_err(|source| self.live_err(source))
    }

    fn live_err(&self, source: std::io::Error) -> Error {
        Error::Rotation {
            path: self.live_path.clone(),
            source,
        }
    }
}

fn target_err(target: &Path, source: std::io::Error) -> Error {
    Error::Rotation {
        path: target.to_path_buf(),
        source,
    }
}

/// Sequence numbers exist only under high-frequency or size-triggered
/// configurations. They reset to 0 on any local-calendar-day change relative
/// to the last rotation and otherwise increment by 1.
fn next_sequence_number(
    state: &RotationState,
    now: DateTime<Local>,
    sequenced: bool,
) -> Option<u32> {
    if !sequenced {
        return None;
    }
    match (state.last_sequence_number, state.last_rotation_at) {
        (Some(last), Some(at)) if at.with_timezone(&Local).date_naive() == now.date_naive() => {
            Some(last + 1)
        }
        _ => Some(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::default_formatter;
    use chrono::TimeZone;
    use std::io::Read;
    use tempfile::tempdir;

    fn executor(dir: &Path, behavior: Behavior, sequenced: bool) -> Executor {
        Executor::new(
            dir.join("app.log"),
            dir.join("archives"),
            behavior,
            default_formatter(),
            sequenced,
        )
    }

    async fn setup(dir: &Path, content: &[u8]) {
        tokio::fs::create_dir_all(dir.join("archives")).await.unwrap();
        tokio::fs::write(dir.join("app.log"), content).await.unwrap();
    }

    #[test]
    fn sequence_number_absent_without_high_frequency_or_size() {
        let state = RotationState::default();
        assert_eq!(next_sequence_number(&state, Local::now(), false), None);
    }

    #[test]
    fn sequence_number_starts_at_zero() {
        let state = RotationState::default();
        assert_eq!(next_sequence_number(&state, Local::now(), true), Some(0));
    }

    #[test]
    fn sequence_number_increments_within_a_day() {
        let now = Local::now();
        let state = RotationState {
            last_rotation_at: Some(now.with_timezone(&Utc)),
            last_sequence_number: Some(4),
            archives: vec![],
        };
        assert_eq!(next_sequence_number(&state, now, true), Some(5));
    }

    #[test]
    fn sequence_number_resets_on_day_change() {
        let yesterday = Local::now() - chrono::Duration::days(1);
        let state = RotationState {
            last_rotation_at: Some(yesterday.with_timezone(&Utc)),
            last_sequence_number: Some(9),
            archives: vec![],
        };
        assert_eq!(next_sequence_number(&state, Local::now(), true), Some(0));
    }

    #[tokio::test]
    async fn create_renames_and_recreates_empty_live_file() {
        let dir = tempdir().unwrap();
        setup(dir.path(), b"hello rotation").await;

        let exec = executor(dir.path(), Behavior::Create, false);
        let record = exec
            .rotate(&RotationState::default(), Local::now())
            .await
            .unwrap();

        assert_eq!(
            tokio::fs::read(&record.path).await.unwrap(),
            b"hello rotation"
        );
        assert_eq!(
            tokio::fs::read(dir.path().join("app.log")).await.unwrap(),
            b""
        );
        assert!(record.name.starts_with("app."));
        assert!(record.name.ends_with(".log"));
        assert_eq!(record.sequence_number, None);
    }

    #[tokio::test]
    async fn copy_truncate_preserves_bytes_and_inode_content() {
        let dir = tempdir().unwrap();
        setup(dir.path(), b"0123456789").await;

        let exec = executor(dir.path(), Behavior::CopyTruncate, true);
        let record = exec
            .rotate(&RotationState::default(), Local::now())
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&record.path).await.unwrap(), b"0123456789");
        assert_eq!(
            tokio::fs::metadata(dir.path().join("app.log"))
                .await
                .unwrap()
                .len(),
            0
        );
        assert_eq!(record.sequence_number, Some(0));
    }

    #[tokio::test]
    async fn compress_produces_gunzippable_archive_and_truncates() {
        let dir = tempdir().unwrap();
        let payload = b"compress me please, several times over".repeat(64);
        setup(dir.path(), &payload).await;

        let exec = executor(dir.path(), Behavior::CopyCompressTruncate, false);
        let record = exec
            .rotate(&RotationState::default(), Local::now())
            .await
            .unwrap();

        assert!(record.name.ends_with(".gz"));
        let compressed = std::fs::read(&record.path).unwrap();
        let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
        let mut restored = Vec::new();
        decoder.read_to_end(&mut restored).unwrap();
        assert_eq!(restored, payload);

        assert_eq!(
            tokio::fs::metadata(dir.path().join("app.log"))
                .await
                .unwrap()
                .len(),
            0
        );
    }

    #[tokio::test]
    async fn existing_archive_at_target_path_is_overwritten() {
        let dir = tempdir().unwrap();
        setup(dir.path(), b"fresh content").await;

        let exec = executor(dir.path(), Behavior::CopyTruncate, false);
        let stale = exec
            .rotate(&RotationState::default(), Local::now())
            .await
            .unwrap();

        tokio::fs::write(dir.path().join("app.log"), b"second pass")
            .await
            .unwrap();
        let replaced = exec
            .rotate(&RotationState::default(), Local::now())
            .await
            .unwrap();

        assert_eq!(stale.path, replaced.path);
        assert_eq!(
            tokio::fs::read(&replaced.path).await.unwrap(),
            b"second pass"
        );
    }

    #[tokio::test]
    async fn missing_live_file_aborts_the_cycle() {
        let dir = tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("archives"))
            .await
            .unwrap();

        let exec = executor(dir.path(), Behavior::CopyTruncate, false);
        let err = exec
            .rotate(&RotationState::default(), Local::now())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Rotation { .. }));
    }

    #[tokio::test]
    async fn extensionless_live_file_gets_extensionless_archives() {
        let dir = tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("archives"))
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("syslog"), b"x").await.unwrap();

        let exec = Executor::new(
            dir.path().join("syslog"),
            dir.path().join("archives"),
            Behavior::CopyTruncate,
            default_formatter(),
            false,
        );
        let record = exec
            .rotate(&RotationState::default(), Local::now())
            .await
            .unwrap();

        let date = Local::now().format("%Y-%m-%d").to_string();
        assert_eq!(record.name, format!("syslog.{date}"));
    }

    #[test]
    fn day_boundary_reset_uses_local_dates() {
        // One hour before today's local midnight is always yesterday locally,
        // whatever the UTC date happens to be.
        let late_yesterday = Local::now().date_naive().and_hms_opt(0, 0, 1).unwrap();
        let late_yesterday = Local
            .from_local_datetime(&late_yesterday)
            .single()
            .unwrap()
            - chrono::Duration::hours(1);
        let state = RotationState {
            last_rotation_at: Some(late_yesterday.with_timezone(&Utc)),
            last_sequence_number: Some(3),
            archives: vec![],
        };
        assert_eq!(next_sequence_number(&state, Local::now(), true), Some(0));
    }
}

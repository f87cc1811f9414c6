//! The rotator: scheduling, triggers and the public API.
//!
//! A [`Rotator`] combines the boundary scheduler and the size watcher as its
//! two trigger sources. Both funnel into the same rotation critical section,
//! guarded by the state mutex: a trigger that arrives while a rotation is in
//! flight is dropped, not queued; the next cycle reassesses thresholds
//! anyway. State is always persisted before the corresponding
//! [`RotatorEvent::Rotate`] is broadcast, so any later scheduling decision
//! reads a consistent document.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tokio::sync::{Mutex as AsyncMutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::RotatorConfig;
use crate::error::{Error, Result};
use crate::events::RotatorEvent;
use crate::frequency::Frequency;
use crate::naming::{NameFormatter, default_formatter};
use crate::retention;
use crate::rotation::Executor;
use crate::state::{ArchiveRecord, RotationState, StateStore};
use crate::watcher;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Manages the lifecycle of one actively-written log file.
///
/// Construct with [`Rotator::new`], subscribe to events, then [`start`]
/// (Rotator::start) it. Dropping the rotator (or calling [`Rotator::stop`])
/// cancels the boundary timer and detaches the watcher; an in-flight rotation
/// runs to completion.
pub struct Rotator {
    inner: Arc<Inner>,
    shutdown: watch::Sender<bool>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

/// Shared core: everything the trigger tasks need.
pub(crate) struct Inner {
    config: RotatorConfig,
    executor: Executor,
    store: StateStore,
    /// The rotation state, and with it the in-flight-rotation guard: whoever
    /// holds this lock is the only one allowed to rotate.
    state: AsyncMutex<RotationState>,
    events: broadcast::Sender<RotatorEvent>,
}

impl Inner {
    pub(crate) fn live_path(&self) -> &std::path::Path {
        &self.config.file_path
    }

    pub(crate) fn emit(&self, event: RotatorEvent) {
        // Send only fails when nobody subscribed, which is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn emit_error(&self, err: Error) {
        self.emit(RotatorEvent::Error(Arc::new(err)));
    }

    /// Request a rotation, yielding to one already in flight.
    pub(crate) async fn try_rotate(&self, trigger: &'static str) {
        let Ok(mut state) = self.state.try_lock() else {
            debug!(trigger, "rotation already in flight, trigger dropped");
            return;
        };
        match self.rotate_locked(&mut state, Local::now()).await {
            Ok(record) => self.emit(RotatorEvent::Rotate(record)),
            Err(err) => self.emit_error(err),
        }
    }

    /// The rotation critical section. Caller holds the state lock.
    async fn rotate_locked(
        &self,
        state: &mut RotationState,
        now: DateTime<Local>,
    ) -> Result<ArchiveRecord> {
        let record = self.executor.rotate(state, now).await?;

        state.last_rotation_at = Some(record.created_at);
        state.last_sequence_number = record.sequence_number;
        state.archives.push(record.clone());

        if let Some(limit) = self.config.files_limit {
            retention::remove_surplus(state, limit).await;
        }
        if let Some(max_age) = self.config.max_age {
            retention::remove_outdated(state, max_age, Utc::now()).await;
        }

        self.store.save(state).await?;

        info!(archive = %record.path.display(), "rotation complete");
        Ok(record)
    }

    /// One pass of the boundary decision procedure: bootstrap or catch up,
    /// then report when the next boundary falls.
    async fn boundary_pass(&self, frequency: Frequency) -> DateTime<Local> {
        let now = Local::now();
        let (prev, next) = frequency.boundary(now);
        let prev_utc = prev.with_timezone(&Utc);

        let mut state = self.state.lock().await;
        match state.last_rotation_at {
            None => {
                // Bootstrap: treat the in-progress partial period as already
                // accounted for, so a first run never rotates immediately.
                state.last_rotation_at = Some(prev_utc);
                if let Err(err) = self.store.save(&state).await {
                    self.emit_error(err);
                }
                debug!(boundary = %prev, "initialized rotation state at period start");
            }
            Some(last) if last <= prev_utc => {
                // A full boundary was missed while stopped or idle. One
                // catch-up rotation, no matter how many boundaries went by.
                match self.rotate_locked(&mut state, now).await {
                    Ok(record) => self.emit(RotatorEvent::Rotate(record)),
                    Err(err) => self.emit_error(err),
                }
            }
            Some(_) => {}
        }

        next
    }
}

impl Rotator {
    /// Create a rotator with the default archive name formatter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unrecognized or inconsistent
    /// configuration values.
    pub fn new(config: RotatorConfig) -> Result<Self> {
        Self::with_name_formatter(config, default_formatter())
    }

    /// Create a rotator with an injected [`NameFormatter`].
    pub fn with_name_formatter(config: RotatorConfig, formatter: NameFormatter) -> Result<Self> {
        config.validate()?;

        let sequenced = config
            .frequency
            .map(|frequency| frequency.is_high_frequency())
            .unwrap_or(false)
            || config.max_size.is_some();

        let executor = Executor::new(
            config.file_path.clone(),
            config.dir_path.clone(),
            config.behavior,
            formatter,
            sequenced,
        );
        let store = StateStore::new(config.state_file_path.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                executor,
                store,
                state: AsyncMutex::new(RotationState::default()),
                events,
            }),
            shutdown,
            tasks: parking_lot::Mutex::new(Vec::new()),
        })
    }

    /// Subscribe to the rotator's event stream.
    ///
    /// Subscribe before [`Rotator::start`] to observe the `Ready` event and
    /// any catch-up rotation performed during startup.
    pub fn subscribe(&self) -> broadcast::Receiver<RotatorEvent> {
        self.inner.events.subscribe()
    }

    /// Run startup checks, load persisted state, arm the trigger sources and
    /// broadcast `Ready`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Access`] when the live file is not readable/writable
    /// or the archive directory is inaccessible after attempting to create
    /// it, and [`Error::Watch`] when the filesystem watch cannot be
    /// established.
    pub async fn start(&self) -> Result<()> {
        self.check_live_file().await?;
        self.prepare_directories().await?;

        {
            let mut state = self.inner.state.lock().await;
            *state = self.inner.store.load().await;
        }

        if let Some(max_size) = self.inner.config.max_size {
            let task = watcher::spawn(
                Arc::clone(&self.inner),
                max_size,
                self.shutdown.subscribe(),
            )?;
            self.tasks.lock().push(task);
        }

        if let Some(frequency) = self.inner.config.frequency {
            // The first decision pass runs before start() returns, so a
            // catch-up rotation is already done when Ready fires.
            let next = self.inner.boundary_pass(frequency).await;
            let task = spawn_scheduler(
                Arc::clone(&self.inner),
                frequency,
                self.shutdown.subscribe(),
                next,
            );
            self.tasks.lock().push(task);
        }

        self.inner.emit(RotatorEvent::Ready);
        Ok(())
    }

    /// Rotate immediately, outside any trigger schedule.
    ///
    /// Waits for an in-flight rotation to finish instead of being dropped
    /// like the automatic triggers.
    pub async fn rotate_now(&self) -> Result<ArchiveRecord> {
        let mut state = self.inner.state.lock().await;
        let record = self
            .inner
            .rotate_locked(&mut state, Local::now())
            .await?;
        self.inner.emit(RotatorEvent::Rotate(record.clone()));
        Ok(record)
    }

    /// Cancel the pending boundary timer and detach the filesystem watcher.
    ///
    /// An in-flight rotation runs to completion; no further rotations are
    /// scheduled afterward. Idempotent.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    async fn check_live_file(&self) -> Result<()> {
        let path = &self.inner.config.file_path;
        tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .map(|_| ())
            .map_err(|source| Error::Access {
                path: path.clone(),
                source,
            })
    }

    /// The archive directory (and the state file's parent) are
    /// auto-remediated: created recursively, then re-checked.
    async fn prepare_directories(&self) -> Result<()> {
        let dir = &self.inner.config.dir_path;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| Error::Access {
                path: dir.clone(),
                source,
            })?;
        let meta = tokio::fs::metadata(dir)
            .await
            .map_err(|source| Error::Access {
                path: dir.clone(),
                source,
            })?;
        if !meta.is_dir() {
            return Err(Error::Access {
                path: dir.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotADirectory,
                    "archive path exists but is not a directory",
                ),
            });
        }

        if let Some(parent) = self.inner.config.state_file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| Error::Access {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        Ok(())
    }
}

/// Self-re-arming one-shot boundary timer.
///
/// Sleeps until the boundary handed back by the previous decision pass, then
/// repeats the whole procedure (recompute boundary, decide catch-up, re-arm).
/// Sleeping to an absolute instant each cycle means rotation duration never
/// accumulates drift.
fn spawn_scheduler(
    inner: Arc<Inner>,
    frequency: Frequency,
    mut shutdown: watch::Receiver<bool>,
    first_next: DateTime<Local>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut next = first_next;
        loop {
            let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(wait) => {}
            }
            next = inner.boundary_pass(frequency).await;
        }
        debug!("boundary scheduler stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Behavior;
    use std::path::PathBuf;

    fn config(dir: &std::path::Path) -> RotatorConfig {
        RotatorConfig {
            file_path: dir.join("app.log"),
            dir_path: dir.join("archives"),
            state_file_path: dir.join("logstate.json"),
            frequency: Some(Frequency::Daily),
            max_size: None,
            files_limit: None,
            max_age: None,
            behavior: Behavior::CopyTruncate,
            encoding: "utf-8".to_string(),
        }
    }

    #[test]
    fn construction_rejects_invalid_config() {
        let mut cfg = config(&PathBuf::from("/tmp"));
        cfg.frequency = None;
        assert!(matches!(
            Rotator::new(cfg),
            Err(Error::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn start_fails_on_missing_live_file() {
        let dir = tempfile::tempdir().unwrap();
        let rotator = Rotator::new(config(dir.path())).unwrap();
        assert!(matches!(
            rotator.start().await,
            Err(Error::Access { .. })
        ));
    }

    #[tokio::test]
    async fn start_creates_missing_archive_directory() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("app.log"), b"")
            .await
            .unwrap();

        let rotator = Rotator::new(config(dir.path())).unwrap();
        rotator.start().await.unwrap();
        rotator.stop();

        assert!(dir.path().join("archives").is_dir());
    }

    #[tokio::test]
    async fn manual_rotation_persists_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("app.log"), b"payload")
            .await
            .unwrap();

        let rotator = Rotator::new(config(dir.path())).unwrap();
        rotator.start().await.unwrap();

        let record = rotator.rotate_now().await.unwrap();
        rotator.stop();

        let store = StateStore::new(dir.path().join("logstate.json"));
        let persisted = store.load().await;
        assert_eq!(persisted.archives.len(), 1);
        assert_eq!(persisted.archives[0], record);
        assert_eq!(persisted.last_rotation_at, Some(record.created_at));
    }
}

//! Size-based rotation trigger.
//!
//! Watches the live file path for filesystem notifications. Growth
//! notifications stat the file and request a rotation once the configured
//! threshold is crossed. Rename/remove notifications re-establish the watch
//! on the path: after a `create`-style rotation the old inode is archived
//! and following it would mean watching a file nobody writes to anymore.

use std::path::Path;
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::rotator::Inner;

const REWATCH_ATTEMPTS: usize = 5;
const REWATCH_DELAY: Duration = Duration::from_millis(50);

/// Start watching the live file. The returned task owns the OS watcher and
/// drops it (detaching the watch) when the shutdown signal fires.
pub(crate) fn spawn(
    inner: Arc<Inner>,
    max_size: u64,
    mut shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>> {
    let path = inner.live_path().to_path_buf();

    // notify delivers events on its own thread; an unbounded channel carries
    // them over to the async side without blocking that thread.
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = tx.send(res);
    })
    .map_err(|source| Error::Watch {
        path: path.clone(),
        source,
    })?;
    watcher
        .watch(&path, RecursiveMode::NonRecursive)
        .map_err(|source| Error::Watch {
            path: path.clone(),
            source,
        })?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    handle_event(&mut watcher, &inner, &path, max_size, event).await;
                }
            }
        }
        debug!(path = %path.display(), "size watcher detached");
    }))
}

async fn handle_event(
    watcher: &mut RecommendedWatcher,
    inner: &Arc<Inner>,
    path: &Path,
    max_size: u64,
    event: notify::Result<Event>,
) {
    let event = match event {
        Ok(event) => event,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "watch event error");
            return;
        }
    };

    match event.kind {
        // The file at the path was renamed or removed; the watch follows the
        // inode, so it must be re-established on the (possibly new) file at
        // the same path.
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
            rewatch(watcher, inner, path).await;
        }
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any => {
            check_size(inner, path, max_size).await;
        }
        _ => {}
    }
}

async fn rewatch(watcher: &mut RecommendedWatcher, inner: &Arc<Inner>, path: &Path) {
    // Unwatching a just-unlinked inode may already be a no-op.
    let _ = watcher.unwatch(path);

    // The replacement file may not exist yet (the gap between a rename and
    // the recreate that follows it), so give it a few tries.
    for attempt in 1..=REWATCH_ATTEMPTS {
        match watcher.watch(path, RecursiveMode::NonRecursive) {
            Ok(()) => {
                debug!(path = %path.display(), attempt, "re-established watch");
                return;
            }
            Err(err) if attempt < REWATCH_ATTEMPTS => {
                debug!(path = %path.display(), attempt, error = %err, "rewatch attempt failed");
                tokio::time::sleep(REWATCH_DELAY).await;
            }
            Err(source) => {
                inner.emit_error(Error::Watch {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }
}

async fn check_size(inner: &Arc<Inner>, path: &Path, max_size: u64) {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() >= max_size => {
            debug!(
                path = %path.display(),
                size = meta.len(),
                threshold = max_size,
                "size threshold crossed"
            );
            inner.try_rotate("size").await;
        }
        Ok(_) => {}
        // A stat can land in the middle of a rename; the rename event that
        // caused it re-establishes the watch, so just skip this one.
        Err(err) => {
            debug!(path = %path.display(), error = %err, "stat failed on change event");
        }
    }
}

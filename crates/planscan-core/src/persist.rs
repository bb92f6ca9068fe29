//! Project persistence and debounced saving.
//!
//! A [`ProjectSnapshot`] is the serialisable form of a [`ColumnStore`]. A
//! [`ProjectRepository`] stores snapshots somewhere; [`JsonFileRepository`]
//! keeps them in one JSON file. [`DebouncedSaver`] coalesces bursts of edits
//! into a single save once the store has been idle for a short window.

use crate::error::{PlanscanError, Result};
use crate::store::{lock_store, ColumnStore, PageSnapshot, SharedColumnStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Snapshot format version written by this crate.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Idle window before a pending save is written.
pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_millis(750);

/// Serialisable state of every page of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub version: u32,
    #[serde(default)]
    pub pages: BTreeMap<usize, PageSnapshot>,
}

impl Default for ProjectSnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            pages: BTreeMap::new(),
        }
    }
}

impl ProjectSnapshot {
    #[must_use]
    pub fn capture(store: &ColumnStore) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            pages: store.snapshot(),
        }
    }

    #[must_use]
    pub fn into_store(self) -> ColumnStore {
        ColumnStore::from_snapshot(self.pages)
    }
}

/// Storage backend for project snapshots.
pub trait ProjectRepository: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    ///
    /// # Errors
    ///
    /// I/O or decoding failures.
    fn load(&self) -> Result<Option<ProjectSnapshot>>;

    /// # Errors
    ///
    /// I/O or encoding failures.
    fn save(&self, snapshot: &ProjectSnapshot) -> Result<()>;
}

/// Snapshots in a single pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map_or_else(|| "project".into(), |n| n.to_string_lossy().into_owned());
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}

impl ProjectRepository for JsonFileRepository {
    fn load(&self) -> Result<Option<ProjectSnapshot>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: ProjectSnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(PlanscanError::config(format!(
                "{} was written by a newer version (format {}, supported {})",
                self.path.display(),
                snapshot.version,
                SNAPSHOT_VERSION
            )));
        }
        Ok(Some(snapshot))
    }

    /// Write to a sibling temp file, then rename over the target so a crash
    /// never leaves a half-written project.
    fn save(&self, snapshot: &ProjectSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let temp = self.temp_path();
        let json = serde_json::to_vec_pretty(snapshot)?;
        std::fs::write(&temp, json)?;
        std::fs::rename(&temp, &self.path)?;
        log::info!(
            "Saved {} pages to {}",
            snapshot.pages.len(),
            self.path.display()
        );
        Ok(())
    }
}

enum SaveCommand {
    Dirty,
    Flush(oneshot::Sender<Result<()>>),
    Shutdown(oneshot::Sender<Result<()>>),
}

/// Background task writing the store to a repository after edits settle.
///
/// Must be spawned from within a tokio runtime.
#[derive(Debug)]
pub struct DebouncedSaver {
    commands: mpsc::UnboundedSender<SaveCommand>,
    task: JoinHandle<()>,
}

impl DebouncedSaver {
    /// Spawn with the default idle window.
    pub fn spawn(store: SharedColumnStore, repository: Arc<dyn ProjectRepository>) -> Self {
        Self::with_delay(store, repository, DEFAULT_SAVE_DELAY)
    }

    pub fn with_delay(
        store: SharedColumnStore,
        repository: Arc<dyn ProjectRepository>,
        delay: Duration,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(save_loop(rx, store, repository, delay));
        Self { commands, task }
    }

    /// Schedule a save; restarts the idle window if one is already pending.
    pub fn mark_dirty(&self) {
        if self.commands.send(SaveCommand::Dirty).is_err() {
            log::warn!("Saver task is gone; edit will not be persisted");
        }
    }

    /// Save now, bypassing the idle window, and report the result.
    ///
    /// # Errors
    ///
    /// The repository's save error, or [`PlanscanError::Task`] if the saver
    /// task is gone.
    pub async fn flush(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SaveCommand::Flush(reply))
            .map_err(|_| saver_gone())?;
        response.await.map_err(|_| saver_gone())?
    }

    /// Write any pending save and stop the task.
    ///
    /// # Errors
    ///
    /// The repository's save error, or [`PlanscanError::Task`] if the saver
    /// task is gone.
    pub async fn shutdown(self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SaveCommand::Shutdown(reply))
            .map_err(|_| saver_gone())?;
        let result = response.await.map_err(|_| saver_gone())?;
        self.task.await.map_err(|e| PlanscanError::Task {
            reason: format!("saver task failed: {e}"),
        })?;
        result
    }
}

fn saver_gone() -> PlanscanError {
    PlanscanError::Task {
        reason: "saver task is not running".to_string(),
    }
}

/// Snapshot under the store lock, then write on the blocking pool.
async fn save_now(
    store: &SharedColumnStore,
    repository: &Arc<dyn ProjectRepository>,
) -> Result<()> {
    let snapshot = {
        let guard = lock_store(store)?;
        ProjectSnapshot::capture(&guard)
    };
    let repository = Arc::clone(repository);
    tokio::task::spawn_blocking(move || repository.save(&snapshot))
        .await
        .map_err(|e| PlanscanError::Task {
            reason: format!("save task failed: {e}"),
        })?
}

async fn save_loop(
    mut rx: mpsc::UnboundedReceiver<SaveCommand>,
    store: SharedColumnStore,
    repository: Arc<dyn ProjectRepository>,
    delay: Duration,
) {
    let mut deadline: Option<Instant> = None;
    loop {
        let command = match deadline {
            Some(at) => tokio::select! {
                command = rx.recv() => command,
                () = tokio::time::sleep_until(at) => {
                    deadline = None;
                    if let Err(e) = save_now(&store, &repository).await {
                        log::warn!("Debounced save failed: {}", e);
                    }
                    continue;
                }
            },
            None => rx.recv().await,
        };

        match command {
            Some(SaveCommand::Dirty) => deadline = Some(Instant::now() + delay),
            Some(SaveCommand::Flush(reply)) => {
                deadline = None;
                let result = save_now(&store, &repository).await;
                if let Err(e) = &result {
                    log::warn!("Save failed: {}", e);
                }
                let _ = reply.send(result);
            }
            Some(SaveCommand::Shutdown(reply)) => {
                let result = if deadline.take().is_some() {
                    save_now(&store, &repository).await
                } else {
                    Ok(())
                };
                let _ = reply.send(result);
                break;
            }
            // Every handle dropped: write what is pending and stop
            None => {
                if deadline.is_some() {
                    if let Err(e) = save_now(&store, &repository).await {
                        log::warn!("Final save failed: {}", e);
                    }
                }
                break;
            }
        }
    }
    log::debug!("Saver task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("nested").join("project.json"));
        assert!(repo.load().unwrap().is_none());

        let mut store = ColumnStore::new();
        store.add_manual(4, Point::new(50.0, 50.0));
        repo.save(&ProjectSnapshot::capture(&store)).unwrap();

        let loaded = repo.load().unwrap().unwrap();
        assert_eq!(loaded.version, SNAPSHOT_VERSION);
        let restored = loaded.into_store();
        assert_eq!(restored.list(4)[0].id, "M-1");
        assert!(!repo.temp_path().exists());
    }

    #[test]
    fn test_newer_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.json");
        std::fs::write(&path, r#"{"version": 99, "pages": {}}"#).unwrap();
        let err = JsonFileRepository::new(&path).load().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_corrupt_file_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = JsonFileRepository::new(&path).load().unwrap_err();
        assert!(matches!(err, PlanscanError::Json(_)));
    }
}

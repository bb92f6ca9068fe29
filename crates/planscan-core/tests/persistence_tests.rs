//! Persistence Tests
//!
//! Debounced saving against an in-memory repository (with tokio's paused
//! clock) and a full save/load cycle through `JsonFileRepository`.

use planscan_core::persist::DEFAULT_SAVE_DELAY;
use planscan_core::{
    lock_store, ColumnPatch, ColumnStore, ColumnType, DebouncedSaver, JsonFileRepository,
    PlanscanError, Point, ProjectRepository, ProjectSnapshot, Result, SharedColumnStore,
};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

#[derive(Default)]
struct MemoryRepository {
    saves: Mutex<Vec<ProjectSnapshot>>,
    fail: bool,
}

impl MemoryRepository {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }

    fn last(&self) -> Option<ProjectSnapshot> {
        self.saves.lock().unwrap().last().cloned()
    }
}

impl ProjectRepository for MemoryRepository {
    fn load(&self) -> Result<Option<ProjectSnapshot>> {
        Ok(self.last())
    }

    fn save(&self, snapshot: &ProjectSnapshot) -> Result<()> {
        if self.fail {
            return Err(PlanscanError::config("disk full"));
        }
        self.saves.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

/// Records the thread each save ran on.
#[derive(Default)]
struct ThreadRecordingRepository {
    threads: Mutex<Vec<ThreadId>>,
}

impl ProjectRepository for ThreadRecordingRepository {
    fn load(&self) -> Result<Option<ProjectSnapshot>> {
        Ok(None)
    }

    fn save(&self, _snapshot: &ProjectSnapshot) -> Result<()> {
        self.threads.lock().unwrap().push(thread::current().id());
        Ok(())
    }
}

fn setup() -> (SharedColumnStore, Arc<MemoryRepository>, DebouncedSaver) {
    let store = ColumnStore::new().into_shared();
    let repository = Arc::new(MemoryRepository::default());
    let saver = DebouncedSaver::spawn(store.clone(), repository.clone());
    (store, repository, saver)
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_edits_saves_once() {
    let (store, repository, saver) = setup();
    for i in 0..5 {
        lock_store(&store)
            .unwrap()
            .add_manual(0, Point::new(100.0 + f64::from(i) * 40.0, 100.0));
        saver.mark_dirty();
    }

    tokio::time::sleep(DEFAULT_SAVE_DELAY * 2).await;
    assert_eq!(repository.count(), 1);
    assert_eq!(repository.last().unwrap().pages[&0].columns.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_new_edit_restarts_idle_window() {
    let (_store, repository, saver) = setup();
    let step = Duration::from_millis(500);

    saver.mark_dirty();
    tokio::time::sleep(step).await;
    saver.mark_dirty();
    tokio::time::sleep(step).await;
    assert_eq!(repository.count(), 0);

    tokio::time::sleep(step).await;
    assert_eq!(repository.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_flush_bypasses_idle_window() {
    let (_store, repository, saver) = setup();
    saver.mark_dirty();
    saver.flush().await.unwrap();
    assert_eq!(repository.count(), 1);

    // The pending save was consumed by the flush
    tokio::time::sleep(DEFAULT_SAVE_DELAY * 2).await;
    assert_eq!(repository.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_writes_pending_save() {
    let (store, repository, saver) = setup();
    lock_store(&store)
        .unwrap()
        .add_manual(2, Point::new(10.0, 10.0));
    saver.mark_dirty();
    saver.shutdown().await.unwrap();

    assert_eq!(repository.count(), 1);
    assert!(repository.last().unwrap().pages.contains_key(&2));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_without_edits_does_not_save() {
    let (_store, repository, saver) = setup();
    saver.shutdown().await.unwrap();
    assert_eq!(repository.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_saver_writes_pending_save() {
    let (_store, repository, saver) = setup();
    saver.mark_dirty();
    drop(saver);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(repository.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_flush_reports_repository_error() {
    let store = ColumnStore::new().into_shared();
    let saver = DebouncedSaver::spawn(store, Arc::new(MemoryRepository::failing()));
    let err = saver.flush().await.unwrap_err();
    assert!(err.is_config_error());

    // A failed save does not stop the task
    assert!(saver.flush().await.is_err());
    saver.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_save_runs_on_blocking_pool() {
    let store = ColumnStore::new().into_shared();
    let repository = Arc::new(ThreadRecordingRepository::default());
    let saver = DebouncedSaver::spawn(store, repository.clone());

    saver.mark_dirty();
    saver.flush().await.unwrap();
    saver.shutdown().await.unwrap();

    // The current-thread runtime's only worker is this test thread
    let threads = repository.threads.lock().unwrap();
    assert_eq!(threads.len(), 1);
    assert_ne!(threads[0], thread::current().id());
}

#[tokio::test]
async fn test_json_project_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plan.planscan.json");

    let store = ColumnStore::new().into_shared();
    let repository = Arc::new(JsonFileRepository::new(&path));
    let saver =
        DebouncedSaver::with_delay(store.clone(), repository.clone(), Duration::from_millis(5));
    {
        let mut guard = lock_store(&store).unwrap();
        guard.add_manual(0, Point::new(50.0, 50.0));
        let second = guard.add_manual(0, Point::new(150.0, 50.0));
        guard.add_manual(0, Point::new(250.0, 50.0));
        guard.delete_column(0, &second).unwrap();
        guard
            .update_fields(
                0,
                "M-1",
                &ColumnPatch {
                    column_type: Some(ColumnType::Support),
                    ..ColumnPatch::default()
                },
            )
            .unwrap();
    }
    saver.mark_dirty();
    saver.shutdown().await.unwrap();

    let mut restored = repository.load().unwrap().unwrap().into_store();
    let ids: Vec<&str> = restored.list(0).iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["M-1", "M-3"]);
    assert_eq!(restored.get(0, "M-1").unwrap().column_type, ColumnType::Support);

    // Deleted manual ids are not reused after a reload
    assert_eq!(restored.add_manual(0, Point::new(350.0, 50.0)), "M-4");
}

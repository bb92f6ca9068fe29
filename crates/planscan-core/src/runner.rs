//! Cancellable background detection, at most one run per page.
//!
//! Each [`DetectionRunner::start`] call gets a generation number and a cancel
//! flag. Starting again for the same page flags the previous run, and the
//! commit into the store happens under the store lock only while the run's
//! generation is still the page's current one. A superseded run can finish
//! its computation but can never overwrite a newer result.
//!
//! Lock order is store, then run table.

use crate::config::DetectionConfig;
use crate::error::{PlanscanError, Result};
use crate::geometry::Rect;
use crate::pipeline::{DetectionPipeline, DetectionStage};
use crate::source::PageSource;
use crate::store::{lock_store, SharedColumnStore};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Progress message of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionEvent {
    pub page: usize,
    pub generation: u64,
    pub stage: DetectionStage,
}

/// How a run ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionOutcome {
    /// Results replaced the page's automatic columns
    Committed { count: usize },
    /// A newer run for the same page took over
    Superseded,
    /// Cancelled through [`DetectionRunner::cancel`] or [`DetectionHandle::cancel`]
    Cancelled,
}

const RUNNING: u8 = 0;
const CANCELLED: u8 = 1;
const SUPERSEDED: u8 = 2;

/// Stop signal shared by a run and whoever may stop it. The first reason
/// recorded wins.
#[derive(Debug, Default)]
struct StopFlag(AtomicU8);

impl StopFlag {
    fn stop(&self, reason: u8) {
        let _ = self
            .0
            .compare_exchange(RUNNING, reason, Ordering::AcqRel, Ordering::Acquire);
    }

    fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire) != RUNNING
    }

    fn outcome(&self) -> DetectionOutcome {
        match self.0.load(Ordering::Acquire) {
            CANCELLED => DetectionOutcome::Cancelled,
            _ => DetectionOutcome::Superseded,
        }
    }
}

#[derive(Debug)]
struct RunSlot {
    generation: u64,
    stop: Arc<StopFlag>,
}

type RunTable = Arc<Mutex<HashMap<usize, RunSlot>>>;

fn lock_table(runs: &RunTable) -> MutexGuard<'_, HashMap<usize, RunSlot>> {
    // The table holds no invariant a panicking holder could break
    runs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to one in-flight run.
#[derive(Debug)]
pub struct DetectionHandle {
    page: usize,
    generation: u64,
    stop: Arc<StopFlag>,
    events: mpsc::UnboundedReceiver<DetectionEvent>,
    task: JoinHandle<Result<DetectionOutcome>>,
}

impl DetectionHandle {
    #[must_use]
    pub const fn page(&self) -> usize {
        self.page
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Progress events, one per checkpoint reached.
    pub fn events(&mut self) -> &mut mpsc::UnboundedReceiver<DetectionEvent> {
        &mut self.events
    }

    /// Flag this run; it stops at its next checkpoint.
    pub fn cancel(&self) {
        self.stop.stop(CANCELLED);
    }

    /// Wait for the run to end.
    ///
    /// # Errors
    ///
    /// The page source error if the page could not be read,
    /// [`PlanscanError::Task`] if the worker panicked.
    pub async fn wait(self) -> Result<DetectionOutcome> {
        self.task.await.map_err(|e| PlanscanError::Task {
            reason: format!("detection for page {} failed: {e}", self.page),
        })?
    }
}

/// Runs detection off the caller's thread and commits into a shared store.
pub struct DetectionRunner {
    store: SharedColumnStore,
    source: Arc<dyn PageSource>,
    scale: f64,
    runs: RunTable,
    next_generation: AtomicU64,
}

impl std::fmt::Debug for DetectionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionRunner")
            .field("scale", &self.scale)
            .field("running", &lock_table(&self.runs).len())
            .finish_non_exhaustive()
    }
}

impl DetectionRunner {
    /// Runner extracting at base scale.
    pub fn new(store: SharedColumnStore, source: Arc<dyn PageSource>) -> Self {
        Self {
            store,
            source,
            scale: 1.0,
            runs: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Extract at render `scale`; pixel thresholds then apply at that scale.
    ///
    /// # Errors
    ///
    /// [`PlanscanError::Config`] if `scale` is not finite and positive.
    pub fn with_scale(mut self, scale: f64) -> Result<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(PlanscanError::config(format!(
                "render scale must be finite and positive, got {scale}"
            )));
        }
        self.scale = scale;
        Ok(self)
    }

    /// The store results are committed into. Manual edits lock the same
    /// mutex, so they never interleave with a commit.
    #[must_use]
    pub fn store(&self) -> SharedColumnStore {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub fn source(&self) -> Arc<dyn PageSource> {
        Arc::clone(&self.source)
    }

    #[must_use]
    pub fn is_running(&self, page: usize) -> bool {
        lock_table(&self.runs).contains_key(&page)
    }

    /// Cancel the in-flight run for `page`. Returns whether there was one.
    pub fn cancel(&self, page: usize) -> bool {
        match lock_table(&self.runs).remove(&page) {
            Some(slot) => {
                slot.stop.stop(CANCELLED);
                log::debug!("Page {}: detection {} cancelled", page, slot.generation);
                true
            }
            None => false,
        }
    }

    /// Start detection for `page`, superseding any run already in flight
    /// for it. `roi` is in base coordinates.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        page: usize,
        config: DetectionConfig,
        roi: Option<Rect>,
    ) -> DetectionHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let stop = Arc::new(StopFlag::default());
        let previous = lock_table(&self.runs).insert(
            page,
            RunSlot {
                generation,
                stop: Arc::clone(&stop),
            },
        );
        if let Some(previous) = previous {
            previous.stop.stop(SUPERSEDED);
            log::debug!(
                "Page {}: detection {} superseded by {}",
                page,
                previous.generation,
                generation
            );
        }

        let (tx, events) = mpsc::unbounded_channel();
        let job = Job {
            page,
            generation,
            config,
            roi,
            scale: self.scale,
            stop: Arc::clone(&stop),
            store: Arc::clone(&self.store),
            source: Arc::clone(&self.source),
            runs: Arc::clone(&self.runs),
            events: tx,
        };
        let task = tokio::task::spawn_blocking(move || job.run());

        DetectionHandle {
            page,
            generation,
            stop,
            events,
            task,
        }
    }

    /// Start and wait, discarding progress events.
    ///
    /// # Errors
    ///
    /// See [`DetectionHandle::wait`].
    pub async fn detect(
        &self,
        page: usize,
        config: DetectionConfig,
        roi: Option<Rect>,
    ) -> Result<DetectionOutcome> {
        self.start(page, config, roi).wait().await
    }
}

/// Everything a worker needs, moved onto the blocking pool.
struct Job {
    page: usize,
    generation: u64,
    config: DetectionConfig,
    roi: Option<Rect>,
    scale: f64,
    stop: Arc<StopFlag>,
    store: SharedColumnStore,
    source: Arc<dyn PageSource>,
    runs: RunTable,
    events: mpsc::UnboundedSender<DetectionEvent>,
}

impl Job {
    fn run(self) -> Result<DetectionOutcome> {
        let _slot = SlotGuard {
            page: self.page,
            generation: self.generation,
            runs: Arc::clone(&self.runs),
        };

        let geometry = self.source.page_geometry(self.page, self.scale).map_err(|e| {
            log::warn!("Page {}: detection failed: {}", self.page, e);
            e
        })?;

        let pipeline = DetectionPipeline::with_config(self.config);
        let report = pipeline.run(self.page, &geometry, self.roi, |stage| {
            if self.stop.is_stopped() {
                return ControlFlow::Break(());
            }
            // The receiver may be gone; progress is best effort
            let _ = self.events.send(DetectionEvent {
                page: self.page,
                generation: self.generation,
                stage,
            });
            ControlFlow::Continue(())
        })?;

        let Some(report) = report else {
            return Ok(self.stop.outcome());
        };

        let mut store = lock_store(&self.store)?;
        let runs = lock_table(&self.runs);
        let current = runs
            .get(&self.page)
            .is_some_and(|slot| slot.generation == self.generation);
        if !current || self.stop.is_stopped() {
            return Ok(self.stop.outcome());
        }
        let count = store.replace_detected(self.page, report.columns);
        drop(runs);
        drop(store);

        log::info!(
            "Page {}: committed {} columns (run {})",
            self.page,
            count,
            self.generation
        );
        Ok(DetectionOutcome::Committed { count })
    }
}

/// Releases the page's run slot when the worker ends, unless a newer run
/// already owns it. Also runs when the worker panics.
struct SlotGuard {
    page: usize,
    generation: u64,
    runs: RunTable,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut runs = lock_table(&self.runs);
        if runs
            .get(&self.page)
            .is_some_and(|slot| slot.generation == self.generation)
        {
            runs.remove(&self.page);
        }
    }
}

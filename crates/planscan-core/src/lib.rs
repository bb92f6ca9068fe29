//! # Planscan Core - Column Detection for Construction Blueprints
//!
//! Planscan finds structural columns on vector PDF blueprints by reading the
//! page's drawing instructions, not its pixels. Detected and hand-placed
//! columns live in a per-page [`ColumnStore`] in base (scale = 1) page
//! coordinates, so zooming never changes stored geometry.
//!
//! ## Quick Start
//!
//! ```
//! use planscan_core::{
//!     ColumnStore, DetectionPipeline, Operation, PageGeometry, Point, Viewport,
//! };
//!
//! # fn main() -> planscan_core::Result<()> {
//! let page = PageGeometry {
//!     operations: vec![
//!         Operation::rectangle(100.0, 200.0, 40.0, 40.0),
//!         Operation::end_path(),
//!     ],
//!     viewport: Viewport::identity(1000.0, 800.0),
//! };
//!
//! let report = DetectionPipeline::new().detect(0, &page, None)?;
//!
//! let mut store = ColumnStore::new();
//! store.replace_detected(0, report.columns);
//! store.add_manual(0, Point::new(500.0, 400.0));
//!
//! let ids: Vec<&str> = store.list(0).iter().map(|c| c.id.as_str()).collect();
//! assert_eq!(ids, ["C-1", "M-1"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! | Stage | Type | Does |
//! |-------|------|------|
//! | Extraction | [`GeometryExtractor`] | transform stack, 4-vertex closed paths and rectangles |
//! | Filter | [`ShapeFilter`] | crop band, minimum side, right angles |
//! | Merge | [`OverlapMerger`] | greedy `IoU` deduplication |
//! | Classify | [`SquareClassifier`] | squareness ratio, `C-n` ids, ROI |
//!
//! [`DetectionPipeline`] chains the stages synchronously. [`DetectionRunner`]
//! runs them on tokio's blocking pool, at most one run per page, and commits
//! into a shared store.
//!
//! ## Logging
//!
//! Uses the `log` facade: `trace` for skipped primitives, `debug` for
//! per-stage counts, `info` for commits and saves, `warn` for recoverable
//! failures. Install any logger (the CLI uses `env_logger`).

pub mod column;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod geometry;
pub mod ops;
pub mod persist;
pub mod pipeline;
pub mod projector;
pub mod runner;
pub mod source;
pub mod stages;
pub mod store;

pub use column::{Column, ColumnId, ColumnOrigin, ColumnPatch, ColumnType};
pub use config::{DetectionConfig, DetectionConfigBuilder};
pub use error::{PlanscanError, Result};
pub use export::{export_columns, export_pages, ColumnRecord, ExportFormat, PageColumnRecord};
pub use extract::{Candidate, ExtractStats, GeometryExtractor};
pub use geometry::{Affine, Point, Rect};
pub use ops::{OpCode, Operation, PageGeometry, Viewport};
pub use persist::{DebouncedSaver, JsonFileRepository, ProjectRepository, ProjectSnapshot};
pub use pipeline::{DetectionPipeline, DetectionReport, DetectionStage, DetectionStats};
pub use projector::{ColumnProjector, RenderedColumn};
pub use runner::{DetectionEvent, DetectionHandle, DetectionOutcome, DetectionRunner};
pub use source::{LopdfSource, PageSource, StaticSource};
pub use stages::{FilterStats, OverlapMerger, ShapeFilter, SquareClassifier};
pub use store::{lock_store, ColumnStore, PageSnapshot, SharedColumnStore};

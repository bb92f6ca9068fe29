//! # Detection stages
//!
//! The three post-extraction stages of column detection, each independently
//! testable with its own input and output types. They run in viewport
//! (render pixel) space; [`crate::pipeline::DetectionPipeline`] chains them
//! and projects the result back to base coordinates.
//!
//! ### Stage 1: Shape filter ([`ShapeFilter`])
//! - **Input:** [`crate::extract::Candidate`] quads and the page pixel size
//! - **Process:** crop-exclusion band, minimum side length, right-angle test
//! - **Output:** bounding boxes of surviving quads
//!
//! ### Stage 2: Overlap merger ([`OverlapMerger`])
//! - **Input:** filtered boxes
//! - **Process:** stable `(x, y)` sort, then greedy `IoU` merge keeping the larger box
//! - **Output:** deduplicated boxes
//!
//! ### Stage 3: Square classifier ([`SquareClassifier`])
//! - **Input:** deduplicated boxes, optional region of interest
//! - **Process:** squareness ratio test, `C-n` numbering, ROI containment
//! - **Output:** automatic [`crate::column::Column`]s

mod stage01_shape_filter;
mod stage02_overlap_merger;
mod stage03_square_classifier;

pub use stage01_shape_filter::{FilterStats, ShapeFilter, ShapeFilterConfig};
pub use stage02_overlap_merger::OverlapMerger;
pub use stage03_square_classifier::SquareClassifier;

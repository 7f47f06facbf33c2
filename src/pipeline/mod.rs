//! Pipeline entry points.
//!
//! - `diff`: decide whether a downloaded dataset differs from the stored one
//! - `fetch`: discover links on every active page, then download and persist

pub mod diff;
pub mod fetch;

pub use diff::{Comparison, DatasetDiffer};
pub use fetch::{FetchOrchestrator, FetchReport, run_fetch};

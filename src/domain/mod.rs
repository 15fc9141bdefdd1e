//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the merged annual record and table (`AnnualRecord`, `MergedTable`)
//! - per-source intermediates (`YearSeries`) and fixed source encodings
//! - per-stage configuration (`PreprocessConfig`, `AnalysisConfig`, `RenderConfig`)

pub mod types;

pub use types::*;

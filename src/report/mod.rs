//! Reporting utilities: the statistics summary and stage listings.

pub mod format;

pub use format::*;

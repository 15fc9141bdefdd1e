//! Input/output helpers.
//!
//! - source CSV ingest, decoding, and the year merge (`ingest`)
//! - merged table CSV read/write (`table`)
//! - analyzer artifact exports (CSV/JSON/text) (`export`)

pub mod export;
pub mod ingest;
pub mod table;

pub use export::*;
pub use ingest::*;
pub use table::*;

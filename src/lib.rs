//! `fi-decoupling` library crate.
//!
//! Three stages connected by file artifacts:
//!
//! - preprocess: raw statistics exports -> per-source CSVs + merged yearly table
//! - analyze: merged table -> correlations, rolling/lag correlations, OLS summary
//! - plot: merged table -> PNG figures
//!
//! The binary (`decouple`) is a thin wrapper around [`app::run`].

pub mod analysis;
pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod io;
pub mod logging;
pub mod math;
pub mod plot;
pub mod report;

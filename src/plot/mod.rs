//! Figure rendering.
//!
//! Output is a set of PNG files under the figure directory; see [`charts`].

pub mod charts;

pub use charts::*;

//! Core data types for pull-up analysis
//!
//! Organized by domain:
//! - `pose`: detector landmarks and per-frame joint samples
//! - `samples`: angle / conditioned samples, phases, transitions, rep events
//! - `report`: session summary and per-video report documents

mod pose;
mod report;
mod samples;

pub use pose::*;
pub use report::*;
pub use samples::*;

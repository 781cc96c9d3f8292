//! Shared data structures for the diagnostic reasoning pipeline
//!
//! - `equipment`: read-only equipment profile (signals, thresholds, faults)
//! - `signal`: measurements, semantic states, classified signals, anomalies
//! - `diagnosis`: fault scores, evidence, next action, the final result

mod equipment;
mod signal;
mod diagnosis;

pub use equipment::*;
pub use signal::*;
pub use diagnosis::*;

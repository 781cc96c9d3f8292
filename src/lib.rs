//! Diagnostic Reasoning Engine
//!
//! Turns calibrated equipment measurements into a structured diagnosis:
//! semantic signal states, a ranked fault hypothesis with differential
//! alternatives, and the single next recovery action.
//!
//! ## Architecture
//!
//! - **Types**: equipment profiles (read-only knowledge), measurements, results
//! - **Reasoning**: classifier, state vector, fault matcher, action selector, assembler
//! - **History**: per-instance signal states carried between calls
//! - **Engine**: registry + history + config facade with boundary validation
//!
//! All equipment knowledge lives in `EquipmentProfile` data; the engine has
//! no per-equipment logic.

pub mod config;
pub mod types;
pub mod history;
pub mod reasoning;
pub mod engine;

// Re-export engine configuration
pub use config::EngineConfig;

// Re-export the engine facade
pub use engine::{DiagnosisError, DiagnosisRequest, DiagnosticEngine};

// Re-export commonly used types
pub use types::{
    ActionKind, DiagnosisResult, DiagnosticIssue, EquipmentProfile, FaultDefinition, Measurement, NextAction,
    PrimaryCause, Priority, SemanticState, SessionStatus, ThresholdProfile,
};

// Re-export history
pub use history::{HistoryTable, SignalHistory};

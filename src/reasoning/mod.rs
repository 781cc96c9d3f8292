//! Diagnostic reasoning pipeline
//!
//! Leaf-first stages, each consuming only the output of the previous one:
//!
//! 1. **Classifier**: raw value -> semantic state (bands + hysteresis)
//! 2. **State vector**: measurement batch -> classified signals, anomalies, status
//! 3. **Matcher**: state vector -> ranked faults, primary, differentials
//! 4. **Action**: primary fault + status + confidence -> next step
//! 5. **Assembler**: all of the above -> `DiagnosisResult`

pub mod classifier;
pub mod state_vector;
pub mod matcher;
pub mod action;
pub mod assembler;

pub use classifier::{Classification, ThresholdClassifier};
pub use state_vector::{StateVector, StateVectorBuilder};
pub use matcher::{FaultMatcher, MatchOutcome, PrimaryMatch};
pub use action::ActionSelector;
pub use assembler::{AssemblyContext, ResultAssembler};

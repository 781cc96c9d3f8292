//! Engine-wide constants that are not operator-tunable.
//!
//! Tunable policy lives in `EngineConfig`; these are format and boundary
//! constants shared across modules.

// ============================================================================
// Result Format
// ============================================================================

/// Version string stamped on every `DiagnosisResult`.
pub const RESULT_FORMAT_VERSION: &str = "1.0";

// ============================================================================
// Request Boundary
// ============================================================================

/// Accepted characters for signal, equipment and instance identifiers.
pub const IDENTIFIER_PATTERN: &str = r"^[A-Za-z0-9_-]+$";

/// Separator between equipment and instance id in history keys.
pub const HISTORY_KEY_SEPARATOR: &str = "::";

// ============================================================================
// Severity
// ============================================================================

/// Scale used for severity ratios when the normal band has no finite bound.
pub const FALLBACK_SEVERITY_SCALE: f64 = 1.0;

// ============================================================================
// Confidence
// ============================================================================

/// Ceiling on every reported confidence, whatever `matching.confidence_cap`
/// holds. A diagnosis is never certain.
pub const MAX_CONFIDENCE: f64 = 0.999;

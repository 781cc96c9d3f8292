//! Signal-level types: semantic states, measurements, classified signals, anomalies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Semantic State
// ============================================================================

/// Named classification of a measurement.
///
/// States are data: each threshold profile declares its own names. The only
/// name the engine itself knows is the reserved [`SemanticState::UNKNOWN`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SemanticState(String);

impl SemanticState {
    /// Reserved fallback when no band matches or the signal cannot be classified.
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SemanticState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SemanticState {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SemanticState {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Measurement (input)
// ============================================================================

/// One calibrated reading for one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub signal_id: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

impl Measurement {
    pub fn new(signal_id: impl Into<String>, value: f64, unit: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            signal_id: signal_id.into(),
            value,
            unit: unit.into(),
            timestamp,
        }
    }
}

// ============================================================================
// Classified Signal (derived)
// ============================================================================

/// How a signal moved between states since the previous call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Moved to an adjacent declared band
    Gradual,
    /// Jumped over at least one band, or into/out of `unknown`
    Abrupt,
}

/// A measurement after classification, with transition metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedSignal {
    pub signal_id: String,
    pub raw_value: f64,
    pub unit: String,
    pub semantic_state: SemanticState,

    /// State carried in history from the previous call, if any
    pub previous_state: Option<SemanticState>,

    /// When the signal last changed state
    pub transitioned_at: Option<DateTime<Utc>>,

    /// Set only when the state changed on this call
    pub transition: Option<TransitionKind>,

    /// The previous state was kept because the value sat inside the hysteresis margin
    pub retained_by_hysteresis: bool,

    /// Percent deviation from the profile's nominal value
    pub deviation_percent: Option<f64>,
}

// ============================================================================
// Anomalies & Session Status
// ============================================================================

/// Anomaly severity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    Minor = 0,
    Warning = 1,
    Critical = 2,
}

impl std::fmt::Display for AnomalySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalySeverity::Minor => write!(f, "MINOR"),
            AnomalySeverity::Warning => write!(f, "WARNING"),
            AnomalySeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Why a signal was flagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Classified outside the profile's normal band
    OutOfNormal {
        /// Distance from the nearest normal-band boundary, in the signal's unit
        distance: f64,
    },
    /// Measurement unit does not match the signal definition
    UnitMismatch { expected: String, received: String },
}

/// A flagged signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalAnomaly {
    pub signal_id: String,
    pub semantic_state: SemanticState,
    pub raw_value: f64,
    pub severity: AnomalySeverity,
    #[serde(flatten)]
    pub kind: AnomalyKind,
}

/// Overall status of one diagnostic session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Normal,
    Degraded,
    Failed,
}

impl SessionStatus {
    /// Status implied by a set of anomalies.
    pub fn from_anomalies(anomalies: &[SignalAnomaly]) -> Self {
        match anomalies.iter().map(|a| a.severity).max() {
            Some(AnomalySeverity::Critical) => SessionStatus::Failed,
            Some(_) => SessionStatus::Degraded,
            None => SessionStatus::Normal,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Normal => write!(f, "NORMAL"),
            SessionStatus::Degraded => write!(f, "DEGRADED"),
            SessionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

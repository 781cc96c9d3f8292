//! Equipment profile types: signal definitions, threshold profiles, fault library
//!
//! These are supplied by the configuration loader already validated and are
//! treated as read-only for the lifetime of the engine.

use serde::{Deserialize, Serialize};

use super::SemanticState;

// ============================================================================
// Equipment Profile
// ============================================================================

/// Identification metadata, echoed in logs and in the result context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentMetadata {
    /// Equipment profile key (e.g. "cctv-psu-24w-v1")
    pub equipment_id: String,

    /// Human-readable model name
    #[serde(default)]
    pub name: String,

    /// Equipment category (e.g. "power_supply")
    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub manufacturer: String,

    /// Profile revision
    #[serde(default)]
    pub version: String,
}

/// Complete, parsed configuration for one equipment model.
///
/// All equipment knowledge lives here: the engine carries no per-equipment logic.
/// Order of `thresholds[*].states` and of `faults` is significant: bands are
/// evaluated first-match-wins and fault declaration order breaks ranking ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentProfile {
    pub metadata: EquipmentMetadata,

    #[serde(default)]
    pub signals: Vec<SignalDefinition>,

    #[serde(default)]
    pub components: Vec<ComponentDefinition>,

    #[serde(default)]
    pub thresholds: Vec<ThresholdProfile>,

    #[serde(default)]
    pub faults: Vec<FaultDefinition>,
}

impl EquipmentProfile {
    pub fn equipment_id(&self) -> &str {
        &self.metadata.equipment_id
    }

    /// Look up a signal definition by ID.
    pub fn signal(&self, signal_id: &str) -> Option<&SignalDefinition> {
        self.signals.iter().find(|s| s.signal_id == signal_id)
    }

    /// Look up the threshold profile for a signal.
    pub fn threshold(&self, signal_id: &str) -> Option<&ThresholdProfile> {
        self.thresholds.iter().find(|t| t.signal_id == signal_id)
    }

    pub fn fault(&self, fault_id: &str) -> Option<&FaultDefinition> {
        self.faults.iter().find(|f| f.fault_id == fault_id)
    }

    /// Whether a recovery-step target refers to a safety-sensitive signal,
    /// test point, or component.
    pub fn is_safety_sensitive_target(&self, target: &str) -> bool {
        let signal_hit = self
            .signals
            .iter()
            .filter(|s| s.safety_sensitive)
            .any(|s| s.signal_id == target || s.test_point == target);
        let component_hit = self
            .components
            .iter()
            .filter(|c| c.safety_sensitive)
            .any(|c| c.component_id == target);
        signal_hit || component_hit
    }
}

// ============================================================================
// Signals & Components
// ============================================================================

/// Where a signal can be probed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Measurability {
    /// Requires opening the enclosure
    #[default]
    Internal,
    /// Reachable from outside the enclosure
    External,
}

/// Static description of one measurable signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDefinition {
    pub signal_id: String,

    #[serde(default)]
    pub name: String,

    /// Test point label on the board (e.g. "TP3")
    pub test_point: String,

    /// Measured quantity (e.g. "voltage_dc")
    pub parameter: String,

    /// Declared unit; measurements must match exactly
    pub unit: String,

    #[serde(default)]
    pub measurability: Measurability,

    /// Probing this point exposes the technician to hazardous energy
    /// (mains input, bulk capacitor).
    #[serde(default)]
    pub safety_sensitive: bool,
}

/// A replaceable or inspectable component referenced by recovery steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDefinition {
    pub component_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub safety_sensitive: bool,
}

// ============================================================================
// Threshold Profiles
// ============================================================================

fn default_true() -> bool {
    true
}

fn default_normal_state() -> String {
    "normal".to_string()
}

/// One named numeric band. Either bound may be open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateBand {
    /// State name produced when this band matches
    pub name: String,

    #[serde(default)]
    pub min: Option<f64>,

    #[serde(default)]
    pub max: Option<f64>,

    #[serde(default = "default_true")]
    pub min_inclusive: bool,

    #[serde(default = "default_true")]
    pub max_inclusive: bool,

    #[serde(default)]
    pub description: String,
}

impl StateBand {
    /// Closed band `[min, max]`; either side may be `None`.
    pub fn new(name: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            min_inclusive: true,
            max_inclusive: true,
            description: String::new(),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        let above_min = match self.min {
            Some(min) if self.min_inclusive => value >= min,
            Some(min) => value > min,
            None => true,
        };
        let below_max = match self.max {
            Some(max) if self.max_inclusive => value <= max,
            Some(max) => value < max,
            None => true,
        };
        above_min && below_max
    }

    /// Band width, or `None` when either side is open.
    pub fn width(&self) -> Option<f64> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => Some((max - min).abs()),
            _ => None,
        }
    }

    /// Distance from `value` to the band (0 when inside or on a boundary).
    pub fn distance(&self, value: f64) -> f64 {
        if let Some(min) = self.min {
            if value < min {
                return min - value;
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return value - max;
            }
        }
        0.0
    }

    /// Magnitude of the nearest finite bound, used as a scale for open bands.
    pub fn bound_magnitude(&self, value: f64) -> Option<f64> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => {
                if (value - min).abs() <= (value - max).abs() {
                    Some(min.abs())
                } else {
                    Some(max.abs())
                }
            }
            (Some(min), None) => Some(min.abs()),
            (None, Some(max)) => Some(max.abs()),
            (None, None) => None,
        }
    }
}

/// Ordered state bands for one signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdProfile {
    pub signal_id: String,

    /// Bands in evaluation order; the first matching band wins.
    #[serde(default)]
    pub states: Vec<StateBand>,

    /// Name of the band that counts as healthy.
    #[serde(default = "default_normal_state")]
    pub normal_state: String,

    /// Nominal value for deviation reporting.
    #[serde(default)]
    pub nominal_value: Option<f64>,

    /// Hysteresis margin as a fraction of band width. Falls back to the
    /// engine-wide default when absent.
    #[serde(default)]
    pub hysteresis_fraction: Option<f64>,

    /// Absolute hysteresis margin in the signal's unit. Takes precedence over
    /// the fraction when set.
    #[serde(default)]
    pub hysteresis_absolute: Option<f64>,
}

impl ThresholdProfile {
    pub fn new(signal_id: impl Into<String>, states: Vec<StateBand>) -> Self {
        Self {
            signal_id: signal_id.into(),
            states,
            normal_state: default_normal_state(),
            nominal_value: None,
            hysteresis_fraction: None,
            hysteresis_absolute: None,
        }
    }

    pub fn band(&self, state: &SemanticState) -> Option<(usize, &StateBand)> {
        self.states
            .iter()
            .enumerate()
            .find(|(_, b)| b.name == state.as_str())
    }

    pub fn normal_band(&self) -> Option<&StateBand> {
        self.states.iter().find(|b| b.name == self.normal_state)
    }

    pub fn is_normal(&self, state: &SemanticState) -> bool {
        state.as_str() == self.normal_state
    }
}

// ============================================================================
// Fault Library
// ============================================================================

/// A `(signal_id, state)` pair that counts as evidence for a fault.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signature {
    pub signal_id: String,
    pub state: SemanticState,
    pub confidence_weight: f64,
}

impl Signature {
    pub fn new(signal_id: impl Into<String>, state: impl Into<SemanticState>, weight: f64) -> Self {
        Self {
            signal_id: signal_id.into(),
            state: state.into(),
            confidence_weight: weight,
        }
    }
}

/// Candidate root cause within a fault; lower rank is more likely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    pub rank: u32,
    pub component: String,
    pub failure_mode: String,
    pub cause: String,
    pub base_confidence: f64,
}

/// Kind of physical action a recovery step asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Measure,
    Inspect,
    Replace,
    Verify,
    Escalate,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Measure => write!(f, "measure"),
            ActionKind::Inspect => write!(f, "inspect"),
            ActionKind::Replace => write!(f, "replace"),
            ActionKind::Verify => write!(f, "verify"),
            ActionKind::Escalate => write!(f, "escalate"),
        }
    }
}

/// One step of a fault's recovery procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryStep {
    /// Stable identifier reported back by callers once executed
    pub step_id: String,

    /// Display ordinal
    pub step: u32,

    pub action: ActionKind,

    /// Test point, signal, or component the step acts on
    pub target: String,

    pub instruction: String,

    /// Expected result when the hypothesis is correct
    #[serde(default)]
    pub verification: String,

    /// Explicit safety text; always carried into the action when present
    #[serde(default)]
    pub safety: Option<String>,

    #[serde(default)]
    pub estimated_time: Option<String>,

    #[serde(default)]
    pub difficulty: Option<String>,

    #[serde(default)]
    pub tools: Vec<String>,
}

/// A fault with its evidence signatures, ranked causes and recovery procedure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultDefinition {
    pub fault_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub signatures: Vec<Signature>,

    #[serde(default)]
    pub hypotheses: Vec<Hypothesis>,

    /// Ordered recovery procedure
    #[serde(default)]
    pub recovery: Vec<RecoveryStep>,
}

impl FaultDefinition {
    /// Highest-ranked (lowest `rank`) hypothesis. Ties keep declaration order.
    pub fn best_hypothesis(&self) -> Option<&Hypothesis> {
        self.hypotheses.iter().min_by_key(|h| h.rank)
    }

    /// Hypotheses sorted by rank, declaration order preserved on ties.
    pub fn ranked_hypotheses(&self) -> Vec<&Hypothesis> {
        let mut ranked: Vec<&Hypothesis> = self.hypotheses.iter().collect();
        ranked.sort_by_key(|h| h.rank);
        ranked
    }

    pub fn total_signature_weight(&self) -> f64 {
        self.signatures.iter().map(|s| s.confidence_weight).sum()
    }
}

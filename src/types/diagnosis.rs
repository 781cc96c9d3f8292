//! Diagnosis types: fault scores, evidence, differentials, next action, final result

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ActionKind, AnomalySeverity, ClassifiedSignal, SemanticState, SessionStatus, SignalAnomaly};

// ============================================================================
// Fault Scoring
// ============================================================================

/// Score of one fault definition against a state vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultScore {
    pub fault_id: String,
    /// Position of the fault in the equipment's fault library
    pub declaration_index: usize,
    pub matched_signature_count: usize,
    pub total_signature_weight: f64,
    pub matched_weight: f64,
    /// `matched_weight / total_signature_weight`, capped strictly below 1.0
    pub computed_confidence: f64,
}

// ============================================================================
// Evidence
// ============================================================================

/// Where a piece of reasoning came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Observed measurement
    Signal,
    /// Equipment documentation (fault library, recovery procedures)
    Documentation,
    /// Engine inference
    Logic,
}

/// "signal X is in state Y", with the signature weight behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub signal_id: String,
    /// State the fault signature expects
    pub expected_state: SemanticState,
    /// State actually observed
    pub observed_state: SemanticState,
    pub weight: f64,
    pub source: SourceTag,
}

impl std::fmt::Display for Evidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.expected_state == self.observed_state {
            write!(f, "signal {} is in state {}", self.signal_id, self.observed_state)
        } else {
            write!(
                f,
                "signal {} is in state {} (expected {})",
                self.signal_id, self.observed_state, self.expected_state
            )
        }
    }
}

/// The signature that best separates a differential from the primary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDifferentiator {
    pub signal_id: String,
    /// State the primary fault expects on this signal (`None` if the primary
    /// does not reference it)
    pub primary_expects: Option<SemanticState>,
    /// State the candidate expects (`None` if the candidate does not reference it)
    pub candidate_expects: Option<SemanticState>,
    pub weight: f64,
}

impl KeyDifferentiator {
    pub fn is_empty(&self) -> bool {
        self.signal_id.is_empty() || (self.primary_expects.is_none() && self.candidate_expects.is_none())
    }
}

/// An alternative fault ranked below the primary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferentialDiagnosis {
    pub fault_id: String,
    pub name: String,
    /// Cause of the fault's best hypothesis
    pub cause: Option<String>,
    pub probability: f64,
    pub matched_signature_count: usize,
    pub key_differentiator: KeyDifferentiator,
}

// ============================================================================
// Primary Cause
// ============================================================================

/// One ranked cause within the primary fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHypothesis {
    pub rank: u32,
    pub component: String,
    pub failure_mode: String,
    pub cause: String,
    pub confidence: f64,
}

/// Winning fault, or an explicit unresolved marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PrimaryCause {
    Resolved {
        fault_id: String,
        name: String,
        cause: Option<String>,
        component: Option<String>,
        failure_mode: Option<String>,
        hypotheses: Vec<RankedHypothesis>,
    },
    Unresolved,
}

impl PrimaryCause {
    pub fn fault_id(&self) -> Option<&str> {
        match self {
            PrimaryCause::Resolved { fault_id, .. } => Some(fault_id),
            PrimaryCause::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, PrimaryCause::Resolved { .. })
    }
}

// ============================================================================
// Next Action
// ============================================================================

/// Urgency of the recommended action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Medium = 0,
    High = 1,
    Critical = 2,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Medium => write!(f, "MEDIUM"),
            Priority::High => write!(f, "HIGH"),
            Priority::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Single recommended next step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextAction {
    pub action: ActionKind,
    pub target: String,
    pub instruction: String,
    pub expected_result: String,
    pub priority: Priority,
    pub safety_warning: Option<String>,
    /// Recovery step this action came from; `None` for escalation
    pub step_id: Option<String>,
    pub tools: Vec<String>,
    pub estimated_time: Option<String>,
}

// ============================================================================
// Reasoning Chain
// ============================================================================

/// Structured fact behind one reasoning step. The presentation layer turns
/// these into prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReasoningFact {
    SignalClassified {
        signal_id: String,
        state: SemanticState,
        raw_value: f64,
    },
    SignalAnomalous {
        signal_id: String,
        severity: AnomalySeverity,
    },
    SignatureMatched {
        fault_id: String,
        signal_id: String,
        state: SemanticState,
        weight: f64,
    },
    SignatureContradicted {
        fault_id: String,
        signal_id: String,
        expected: SemanticState,
        observed: SemanticState,
    },
    FaultRanked {
        fault_id: String,
        rank: usize,
        confidence: f64,
    },
    HypothesisSelected {
        fault_id: String,
        cause: Option<String>,
    },
    NoHypothesis,
    ActionSelected {
        action: ActionKind,
        target: String,
        step_id: Option<String>,
    },
}

/// One entry of the reasoning chain, always source-tagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub step: u32,
    pub source: SourceTag,
    pub fact: ReasoningFact,
}

// ============================================================================
// Issues & Limitations
// ============================================================================

/// Conditions the engine degraded around instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticIssue {
    /// Signal not declared, or declared without usable threshold bands
    ConfigurationGap { signal_id: String, detail: String },
    /// Measurement unit differs from the declared unit
    UnitMismatch { signal_id: String, expected: String, received: String },
    /// No fault matched the state vector
    NoHypothesis,
}

/// Something that lowers trust in the diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UncertaintyFactor {
    ConfigurationGap { signal_id: String },
    UnitMismatch { signal_id: String },
    ContradictingEvidence { count: usize },
    /// A ranked candidate declares the same signatures as the primary
    IndistinguishableFault { fault_id: String },
}

/// Known limits of this diagnosis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticLimitations {
    /// Signals the primary fault references that were not measured or could
    /// not be classified
    pub missing_information: Vec<String>,
    pub uncertainty_factors: Vec<UncertaintyFactor>,
    pub recommended_expert_review: bool,
}

// ============================================================================
// Diagnosis Result
// ============================================================================

/// Initial request versus continuation of a recovery procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    Initial,
    FollowUp,
}

/// Which equipment the result is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentContext {
    pub equipment_id: String,
    pub instance_id: Option<String>,
    pub name: String,
}

/// Terminal, immutable output of one diagnostic session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub equipment: EquipmentContext,
    pub workflow: WorkflowType,
    pub status: SessionStatus,
    pub primary_fault: PrimaryCause,
    pub confidence: f64,
    pub supporting_evidence: Vec<Evidence>,
    pub contradicting_evidence: Vec<Evidence>,
    pub differential_diagnoses: Vec<DifferentialDiagnosis>,
    pub next_action: NextAction,
    pub signals: Vec<ClassifiedSignal>,
    pub anomalies: Vec<SignalAnomaly>,
    pub fault_scores: Vec<FaultScore>,
    pub reasoning_chain: Vec<ReasoningStep>,
    pub limitations: DiagnosticLimitations,
    pub issues: Vec<DiagnosticIssue>,
    /// High confidence, nothing contradicting, no alternatives
    pub definitive: bool,
}

impl DiagnosisResult {
    pub fn is_no_hypothesis(&self) -> bool {
        !self.primary_fault.is_resolved()
    }
}

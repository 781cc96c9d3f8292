//! Result Assembler
//!
//! Combines the state vector, match outcome and selected action into the
//! final `DiagnosisResult`: confidence bounded below 1.0, every section
//! present, every reasoning step source-tagged, ordering taken only from
//! the inputs.

use chrono::{DateTime, Utc};

use crate::config::defaults::RESULT_FORMAT_VERSION;
use crate::config::EngineConfig;
use crate::types::{
    DiagnosisResult, DiagnosticIssue, DiagnosticLimitations, EquipmentContext, EquipmentProfile, FaultDefinition,
    NextAction, PrimaryCause, RankedHypothesis, ReasoningFact, ReasoningStep, SourceTag, UncertaintyFactor,
    WorkflowType,
};

use super::matcher::{cap, referenced_signals, MatchOutcome};
use super::state_vector::StateVector;

/// Request-level facts the assembler needs beyond the pipeline outputs.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyContext<'a> {
    pub profile: &'a EquipmentProfile,
    pub instance_id: Option<&'a str>,
    pub workflow: WorkflowType,
    pub generated_at: DateTime<Utc>,
}

pub struct ResultAssembler<'a> {
    config: &'a EngineConfig,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub fn assemble(
        &self,
        ctx: AssemblyContext<'_>,
        vector: StateVector,
        outcome: MatchOutcome,
        next_action: NextAction,
    ) -> DiagnosisResult {
        let confidence_cap = self.config.matching.confidence_cap;
        let primary_fault = outcome
            .primary
            .as_ref()
            .and_then(|p| ctx.profile.faults.get(p.score.declaration_index));

        let confidence = match (&outcome.primary, primary_fault) {
            (Some(p), Some(_)) => cap(p.confidence, confidence_cap),
            _ => 0.0,
        };

        let primary = match primary_fault {
            Some(fault) => primary_cause(fault, confidence, confidence_cap),
            None => PrimaryCause::Unresolved,
        };

        let (supporting_evidence, contradicting_evidence) = match outcome.primary {
            Some(ref p) if primary_fault.is_some() => (p.supporting.clone(), p.contradicting.clone()),
            _ => (Vec::new(), Vec::new()),
        };

        let reasoning_chain = reasoning_chain(&vector, &outcome, primary_fault, &next_action);

        let mut issues = vector.issues.clone();
        if !primary.is_resolved() {
            issues.push(DiagnosticIssue::NoHypothesis);
        }

        let limitations = self.limitations(
            ctx.profile,
            &vector,
            &outcome,
            primary_fault,
            confidence,
            contradicting_evidence.len(),
        );

        let definitive = primary.is_resolved()
            && confidence >= self.config.review.definitive_at
            && contradicting_evidence.is_empty()
            && outcome.differentials.is_empty();

        DiagnosisResult {
            version: RESULT_FORMAT_VERSION.to_string(),
            generated_at: ctx.generated_at,
            equipment: EquipmentContext {
                equipment_id: ctx.profile.equipment_id().to_string(),
                instance_id: ctx.instance_id.map(str::to_string),
                name: ctx.profile.metadata.name.clone(),
            },
            workflow: ctx.workflow,
            status: vector.status,
            primary_fault: primary,
            confidence,
            supporting_evidence,
            contradicting_evidence,
            differential_diagnoses: outcome.differentials,
            next_action,
            signals: vector.signals,
            anomalies: vector.anomalies,
            fault_scores: outcome.ranked,
            reasoning_chain,
            limitations,
            issues,
            definitive,
        }
    }

    fn limitations(
        &self,
        profile: &EquipmentProfile,
        vector: &StateVector,
        outcome: &MatchOutcome,
        primary: Option<&FaultDefinition>,
        confidence: f64,
        contradictions: usize,
    ) -> DiagnosticLimitations {
        // Signals that would have sharpened the diagnosis: the primary's own
        // signatures, or with no primary every declared signal.
        let missing_information: Vec<String> = match primary {
            Some(fault) => referenced_signals(fault)
                .into_iter()
                .filter(|id| !vector.is_known(id))
                .map(str::to_string)
                .collect(),
            None => profile
                .signals
                .iter()
                .map(|s| s.signal_id.as_str())
                .filter(|id| !vector.is_known(id))
                .map(str::to_string)
                .collect(),
        };

        let mut uncertainty_factors: Vec<UncertaintyFactor> = vector
            .issues
            .iter()
            .filter_map(|issue| match issue {
                DiagnosticIssue::ConfigurationGap { signal_id, .. } => Some(UncertaintyFactor::ConfigurationGap {
                    signal_id: signal_id.clone(),
                }),
                DiagnosticIssue::UnitMismatch { signal_id, .. } => Some(UncertaintyFactor::UnitMismatch {
                    signal_id: signal_id.clone(),
                }),
                DiagnosticIssue::NoHypothesis => None,
            })
            .collect();
        if contradictions > 0 {
            uncertainty_factors.push(UncertaintyFactor::ContradictingEvidence { count: contradictions });
        }
        uncertainty_factors.extend(outcome.uncertainty.iter().cloned());

        DiagnosticLimitations {
            missing_information,
            uncertainty_factors,
            recommended_expert_review: primary.is_none()
                || confidence < self.config.review.expert_review_below
                || contradictions > 0,
        }
    }
}

fn primary_cause(fault: &FaultDefinition, confidence: f64, confidence_cap: f64) -> PrimaryCause {
    let hypotheses: Vec<RankedHypothesis> = fault
        .ranked_hypotheses()
        .into_iter()
        .map(|h| RankedHypothesis {
            rank: h.rank,
            component: h.component.clone(),
            failure_mode: h.failure_mode.clone(),
            cause: h.cause.clone(),
            confidence: cap(confidence * h.base_confidence, confidence_cap),
        })
        .collect();
    let best = fault.best_hypothesis();

    PrimaryCause::Resolved {
        fault_id: fault.fault_id.clone(),
        name: fault.name.clone(),
        cause: best.map(|h| h.cause.clone()),
        component: best.map(|h| h.component.clone()),
        failure_mode: best.map(|h| h.failure_mode.clone()),
        hypotheses,
    }
}

fn reasoning_chain(
    vector: &StateVector,
    outcome: &MatchOutcome,
    primary: Option<&FaultDefinition>,
    action: &NextAction,
) -> Vec<ReasoningStep> {
    let mut facts: Vec<(SourceTag, ReasoningFact)> = Vec::new();

    for signal in &vector.signals {
        facts.push((
            SourceTag::Signal,
            ReasoningFact::SignalClassified {
                signal_id: signal.signal_id.clone(),
                state: signal.semantic_state.clone(),
                raw_value: signal.raw_value,
            },
        ));
    }
    for anomaly in &vector.anomalies {
        facts.push((
            SourceTag::Signal,
            ReasoningFact::SignalAnomalous {
                signal_id: anomaly.signal_id.clone(),
                severity: anomaly.severity,
            },
        ));
    }

    match (&outcome.primary, primary) {
        (Some(matched), Some(fault)) => {
            for e in &matched.supporting {
                facts.push((
                    SourceTag::Logic,
                    ReasoningFact::SignatureMatched {
                        fault_id: fault.fault_id.clone(),
                        signal_id: e.signal_id.clone(),
                        state: e.observed_state.clone(),
                        weight: e.weight,
                    },
                ));
            }
            for e in &matched.contradicting {
                facts.push((
                    SourceTag::Logic,
                    ReasoningFact::SignatureContradicted {
                        fault_id: fault.fault_id.clone(),
                        signal_id: e.signal_id.clone(),
                        expected: e.expected_state.clone(),
                        observed: e.observed_state.clone(),
                    },
                ));
            }
            for (rank, score) in outcome.ranked.iter().enumerate() {
                facts.push((
                    SourceTag::Logic,
                    ReasoningFact::FaultRanked {
                        fault_id: score.fault_id.clone(),
                        rank: rank + 1,
                        confidence: score.computed_confidence,
                    },
                ));
            }
            facts.push((
                SourceTag::Documentation,
                ReasoningFact::HypothesisSelected {
                    fault_id: fault.fault_id.clone(),
                    cause: fault.best_hypothesis().map(|h| h.cause.clone()),
                },
            ));
        }
        _ => facts.push((SourceTag::Logic, ReasoningFact::NoHypothesis)),
    }

    facts.push((
        SourceTag::Documentation,
        ReasoningFact::ActionSelected {
            action: action.action,
            target: action.target.clone(),
            step_id: action.step_id.clone(),
        },
    ));

    facts
        .into_iter()
        .zip(1u32..)
        .map(|((source, fact), step)| ReasoningStep { step, source, fact })
        .collect()
}

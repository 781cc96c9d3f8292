//! Fault Matcher
//!
//! Scores each fault definition by the weight of its signatures that the
//! state vector satisfies, ranks the faults, and picks a primary plus a small
//! set of differential diagnoses. Each differential must name the signal that
//! separates it from the primary; candidates with no such signal are dropped
//! and reported as an uncertainty instead.

use std::cmp::Ordering;

use tracing::debug;

use crate::config::defaults::MAX_CONFIDENCE;
use crate::config::MatchingConfig;
use crate::types::{
    DifferentialDiagnosis, Evidence, FaultDefinition, FaultScore, KeyDifferentiator, Signature, SourceTag,
    UncertaintyFactor,
};

use super::state_vector::StateVector;

/// Winning fault with its evidence.
#[derive(Debug, Clone)]
pub struct PrimaryMatch {
    pub score: FaultScore,
    /// Same as `score.computed_confidence`
    pub confidence: f64,
    pub supporting: Vec<Evidence>,
    pub contradicting: Vec<Evidence>,
}

/// Everything the matcher concluded about one state vector.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Faults with at least one matched signature, best first
    pub ranked: Vec<FaultScore>,
    /// `None` is the no-hypothesis outcome
    pub primary: Option<PrimaryMatch>,
    pub differentials: Vec<DifferentialDiagnosis>,
    pub uncertainty: Vec<UncertaintyFactor>,
}

impl MatchOutcome {
    pub fn confidence(&self) -> f64 {
        self.primary.as_ref().map_or(0.0, |p| p.confidence)
    }
}

pub struct FaultMatcher<'a> {
    config: &'a MatchingConfig,
}

impl<'a> FaultMatcher<'a> {
    pub fn new(config: &'a MatchingConfig) -> Self {
        Self { config }
    }

    /// Score and rank `faults` against `vector`. Faults with no matched
    /// signature, or no signature weight at all, are left out. Configuration
    /// gap penalties are applied per fault before ranking.
    pub fn score(&self, vector: &StateVector, faults: &[FaultDefinition]) -> Vec<FaultScore> {
        let mut scores: Vec<FaultScore> = faults
            .iter()
            .enumerate()
            .filter_map(|(index, fault)| self.score_fault(vector, index, fault))
            .collect();
        scores.sort_by(rank_order);
        scores
    }

    fn score_fault(&self, vector: &StateVector, index: usize, fault: &FaultDefinition) -> Option<FaultScore> {
        let total = fault.total_signature_weight();
        if !total.is_finite() || total <= 0.0 {
            return None;
        }

        let matched: Vec<&Signature> = fault
            .signatures
            .iter()
            .filter(|sig| signature_matches(vector, sig))
            .collect();
        if matched.is_empty() {
            return None;
        }

        let matched_weight: f64 = matched.iter().map(|s| s.confidence_weight).sum();

        // Each configuration gap on a signal the fault relies on costs a
        // fixed fraction of the remaining confidence.
        let gaps = referenced_signals(fault)
            .into_iter()
            .filter(|id| vector.has_configuration_gap(id))
            .count();
        let penalty = (1.0 - self.config.configuration_gap_penalty).powi(i32::try_from(gaps).unwrap_or(i32::MAX));
        let computed_confidence = cap(matched_weight / total * penalty, self.config.confidence_cap);

        debug!(
            fault = %fault.fault_id,
            matched = matched.len(),
            matched_weight,
            total,
            gaps,
            confidence = computed_confidence,
            "Fault scored"
        );

        Some(FaultScore {
            fault_id: fault.fault_id.clone(),
            declaration_index: index,
            matched_signature_count: matched.len(),
            total_signature_weight: total,
            matched_weight,
            computed_confidence,
        })
    }

    /// Full matching pass: ranking, primary evidence, differentials.
    pub fn evaluate(&self, vector: &StateVector, faults: &[FaultDefinition]) -> MatchOutcome {
        let ranked = self.score(vector, faults);
        let Some(top) = ranked.first() else {
            debug!("No fault signature matched");
            return MatchOutcome::default();
        };
        let Some(primary_fault) = faults.get(top.declaration_index) else {
            return MatchOutcome::default();
        };

        let mut uncertainty = Vec::new();
        let mut differentials = Vec::new();
        for candidate in ranked.iter().skip(1).take(self.config.max_differentials) {
            let Some(candidate_fault) = faults.get(candidate.declaration_index) else {
                continue;
            };
            match key_differentiator(vector, primary_fault, candidate_fault) {
                Some(key) => differentials.push(DifferentialDiagnosis {
                    fault_id: candidate.fault_id.clone(),
                    name: candidate_fault.name.clone(),
                    cause: candidate_fault.best_hypothesis().map(|h| h.cause.clone()),
                    probability: candidate.computed_confidence,
                    matched_signature_count: candidate.matched_signature_count,
                    key_differentiator: key,
                }),
                None => {
                    debug!(
                        primary = %primary_fault.fault_id,
                        candidate = %candidate.fault_id,
                        "Candidate indistinguishable from primary, dropped from differentials"
                    );
                    uncertainty.push(UncertaintyFactor::IndistinguishableFault {
                        fault_id: candidate.fault_id.clone(),
                    });
                }
            }
        }

        let (supporting, contradicting) = evidence(vector, primary_fault);

        MatchOutcome {
            primary: Some(PrimaryMatch {
                score: top.clone(),
                confidence: top.computed_confidence,
                supporting,
                contradicting,
            }),
            ranked,
            differentials,
            uncertainty,
        }
    }
}

/// Confidence desc, then matched signature count desc, then declaration order.
fn rank_order(a: &FaultScore, b: &FaultScore) -> Ordering {
    b.computed_confidence
        .total_cmp(&a.computed_confidence)
        .then_with(|| b.matched_signature_count.cmp(&a.matched_signature_count))
        .then_with(|| a.declaration_index.cmp(&b.declaration_index))
}

/// Clamp into `[0, cap]`, never above `MAX_CONFIDENCE`; NaN becomes 0.
pub fn cap(value: f64, cap: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    let ceiling = if cap.is_nan() {
        MAX_CONFIDENCE
    } else {
        cap.clamp(0.0, MAX_CONFIDENCE)
    };
    value.clamp(0.0, ceiling)
}

fn signature_matches(vector: &StateVector, sig: &Signature) -> bool {
    vector.state_of(&sig.signal_id) == Some(&sig.state)
}

/// Distinct signal ids a fault's signatures reference, in declaration order.
pub fn referenced_signals(fault: &FaultDefinition) -> Vec<&str> {
    let mut ids: Vec<&str> = Vec::new();
    for sig in &fault.signatures {
        if !ids.contains(&sig.signal_id.as_str()) {
            ids.push(&sig.signal_id);
        }
    }
    ids
}

/// Supporting: matched signatures. Contradicting: signatures whose signal was
/// classified into a different known state, with no other signature of the
/// fault on that signal matching.
fn evidence(vector: &StateVector, fault: &FaultDefinition) -> (Vec<Evidence>, Vec<Evidence>) {
    let mut supporting = Vec::new();
    let mut contradicting = Vec::new();

    for sig in &fault.signatures {
        let Some(observed) = vector.state_of(&sig.signal_id) else {
            continue;
        };
        let item = Evidence {
            signal_id: sig.signal_id.clone(),
            expected_state: sig.state.clone(),
            observed_state: observed.clone(),
            weight: sig.confidence_weight,
            source: SourceTag::Signal,
        };
        if *observed == sig.state {
            supporting.push(item);
        } else if !observed.is_unknown()
            && !fault
                .signatures
                .iter()
                .any(|other| other.signal_id == sig.signal_id && other.state == *observed)
        {
            contradicting.push(item);
        }
    }

    (supporting, contradicting)
}

/// Signal that best separates `candidate` from `primary`.
///
/// First choice: the heaviest matched signature of the primary that the
/// candidate does not declare, or declares in another state. Fallback: the
/// heaviest candidate signature the primary does not share.
fn key_differentiator(
    vector: &StateVector,
    primary: &FaultDefinition,
    candidate: &FaultDefinition,
) -> Option<KeyDifferentiator> {
    let state_on = |fault: &FaultDefinition, signal_id: &str| {
        fault
            .signatures
            .iter()
            .find(|s| s.signal_id == signal_id)
            .map(|s| s.state.clone())
    };

    let mut primary_matched: Vec<&Signature> = primary
        .signatures
        .iter()
        .filter(|sig| signature_matches(vector, sig))
        .collect();
    primary_matched.sort_by(|a, b| b.confidence_weight.total_cmp(&a.confidence_weight));

    for sig in primary_matched {
        let shared = candidate
            .signatures
            .iter()
            .any(|c| c.signal_id == sig.signal_id && c.state == sig.state);
        if !shared {
            return Some(KeyDifferentiator {
                signal_id: sig.signal_id.clone(),
                primary_expects: Some(sig.state.clone()),
                candidate_expects: state_on(candidate, &sig.signal_id),
                weight: sig.confidence_weight,
            });
        }
    }

    let mut candidate_only: Vec<&Signature> = candidate
        .signatures
        .iter()
        .filter(|c| {
            !primary
                .signatures
                .iter()
                .any(|p| p.signal_id == c.signal_id && p.state == c.state)
        })
        .collect();
    candidate_only.sort_by(|a, b| b.confidence_weight.total_cmp(&a.confidence_weight));

    candidate_only.first().map(|sig| KeyDifferentiator {
        signal_id: sig.signal_id.clone(),
        primary_expects: state_on(primary, &sig.signal_id),
        candidate_expects: Some(sig.state.clone()),
        weight: sig.confidence_weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassifiedSignal, DiagnosticIssue, SemanticState};

    fn observed(pairs: &[(&str, &str)]) -> StateVector {
        StateVector {
            signals: pairs
                .iter()
                .map(|(id, state)| ClassifiedSignal {
                    signal_id: id.to_string(),
                    raw_value: 0.0,
                    unit: "V".to_string(),
                    semantic_state: SemanticState::new(*state),
                    previous_state: None,
                    transitioned_at: None,
                    transition: None,
                    retained_by_hysteresis: false,
                    deviation_percent: None,
                })
                .collect(),
            ..StateVector::default()
        }
    }

    fn fault(id: &str, signatures: &[(&str, &str, f64)]) -> FaultDefinition {
        FaultDefinition {
            fault_id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            signatures: signatures
                .iter()
                .map(|(sig, state, w)| Signature::new(*sig, *state, *w))
                .collect(),
            hypotheses: Vec::new(),
            recovery: Vec::new(),
        }
    }

    fn library() -> Vec<FaultDefinition> {
        vec![
            fault(
                "primary_side_failure",
                &[("ac_input", "normal", 0.3), ("bridge_output", "low", 0.4), ("output_12v", "missing", 0.3)],
            ),
            fault("output_rail_collapse", &[("output_12v", "missing", 0.6), ("feedback_ref", "low", 0.4)]),
            fault("overvoltage_output", &[("output_12v", "over_voltage", 0.95)]),
        ]
    }

    #[test]
    fn test_ranking_and_differential() {
        let config = MatchingConfig::default();
        let vector = observed(&[("ac_input", "normal"), ("bridge_output", "low"), ("output_12v", "missing")]);
        let outcome = FaultMatcher::new(&config).evaluate(&vector, &library());

        let primary = outcome.primary.as_ref().expect("primary");
        assert_eq!(primary.score.fault_id, "primary_side_failure");
        assert_eq!(primary.confidence, 0.99);
        assert_eq!(primary.supporting.len(), 3);
        assert!(primary.contradicting.is_empty());

        assert_eq!(outcome.differentials.len(), 1);
        let diff = &outcome.differentials[0];
        assert_eq!(diff.fault_id, "output_rail_collapse");
        assert!((diff.probability - 0.6).abs() < 1e-9);
        assert_eq!(diff.key_differentiator.signal_id, "bridge_output");
        assert_eq!(diff.key_differentiator.candidate_expects, None);
    }

    #[test]
    fn test_unmatched_faults_are_excluded() {
        let config = MatchingConfig::default();
        let vector = observed(&[("output_12v", "over_voltage")]);
        let outcome = FaultMatcher::new(&config).evaluate(&vector, &library());
        assert_eq!(outcome.ranked.len(), 1);
        assert_eq!(outcome.confidence(), 0.99);
        assert!(outcome.differentials.is_empty());
    }

    #[test]
    fn test_no_match_is_no_hypothesis() {
        let config = MatchingConfig::default();
        let outcome = FaultMatcher::new(&config).evaluate(&StateVector::default(), &library());
        assert!(outcome.primary.is_none());
        assert_eq!(outcome.confidence(), 0.0);
    }

    #[test]
    fn test_ties_break_on_count_then_declaration() {
        let config = MatchingConfig::default();
        let faults = vec![
            fault("single", &[("a", "low", 1.0), ("b", "low", 1.0)]),
            fault("double", &[("a", "low", 1.0), ("c", "high", 1.0), ("d", "high", 2.0)]),
            fault("twin", &[("a", "low", 2.0), ("b", "high", 2.0)]),
        ];
        // single: 1/2, double: 2/4 with two matches, twin: 2/4 with one match
        let vector = observed(&[("a", "low"), ("c", "high")]);
        let ranked = FaultMatcher::new(&config).score(&vector, &faults);
        let order: Vec<&str> = ranked.iter().map(|s| s.fault_id.as_str()).collect();
        assert_eq!(order, vec!["double", "single", "twin"]);
    }

    #[test]
    fn test_contradiction_requires_known_different_state() {
        let config = MatchingConfig::default();
        let vector = observed(&[("ac_input", "low"), ("bridge_output", "low"), ("output_12v", "unknown")]);
        let outcome = FaultMatcher::new(&config).evaluate(&vector, &library());
        let primary = outcome.primary.expect("primary");
        assert_eq!(primary.contradicting.len(), 1);
        assert_eq!(primary.contradicting[0].signal_id, "ac_input");
    }

    #[test]
    fn test_indistinguishable_candidate_is_dropped() {
        let config = MatchingConfig::default();
        let faults = vec![
            fault("first", &[("a", "low", 1.0)]),
            fault("clone", &[("a", "low", 1.0)]),
        ];
        let outcome = FaultMatcher::new(&config).evaluate(&observed(&[("a", "low")]), &faults);
        assert!(outcome.differentials.is_empty());
        assert_eq!(
            outcome.uncertainty,
            vec![UncertaintyFactor::IndistinguishableFault {
                fault_id: "clone".to_string()
            }]
        );
    }

    #[test]
    fn test_configuration_gap_penalises_primary() {
        let config = MatchingConfig::default();
        let mut vector = observed(&[("output_12v", "missing")]);
        vector.issues.push(DiagnosticIssue::ConfigurationGap {
            signal_id: "feedback_ref".to_string(),
            detail: String::new(),
        });
        let faults = vec![fault("output_rail_collapse", &[("output_12v", "missing", 0.6), ("feedback_ref", "low", 0.4)])];
        let outcome = FaultMatcher::new(&config).evaluate(&vector, &faults);
        assert!((outcome.confidence() - 0.6 * 0.95).abs() < 1e-9);
        assert_eq!(outcome.ranked[0].computed_confidence, outcome.confidence());
    }

    #[test]
    fn test_configuration_gap_reorders_ranking() {
        let config = MatchingConfig::default();
        let mut vector = observed(&[("x", "normal")]);
        vector.issues.push(DiagnosticIssue::ConfigurationGap {
            signal_id: "y".to_string(),
            detail: String::new(),
        });
        let faults = vec![
            fault("relies_on_gap", &[("x", "normal", 1.0), ("y", "low", 1.0)]),
            fault("clean", &[("x", "normal", 1.0), ("z", "high", 1.0)]),
        ];
        let outcome = FaultMatcher::new(&config).evaluate(&vector, &faults);

        let primary = outcome.primary.as_ref().expect("primary");
        assert_eq!(primary.score.fault_id, "clean");
        assert!((outcome.confidence() - 0.5).abs() < 1e-9);
        assert_eq!(outcome.differentials.len(), 1);
        assert_eq!(outcome.differentials[0].fault_id, "relies_on_gap");
        assert!((outcome.differentials[0].probability - 0.475).abs() < 1e-9);
        assert!(outcome.differentials[0].probability <= outcome.confidence());
    }

    #[test]
    fn test_cap_handles_nan() {
        assert_eq!(cap(f64::NAN, 0.99), 0.0);
        assert_eq!(cap(1.5, 0.99), 0.99);
        assert_eq!(cap(-0.1, 0.99), 0.0);
    }

    #[test]
    fn test_cap_never_reaches_certainty() {
        assert_eq!(cap(1.0, 1.0), MAX_CONFIDENCE);
        assert_eq!(cap(2.0, 5.0), MAX_CONFIDENCE);
        assert_eq!(cap(0.5, f64::NAN), 0.5);
        assert_eq!(cap(0.5, -1.0), 0.0);
    }
}

//! Property tests: classification totality, confidence bounds, hysteresis
//! stability, ranking stability under input reordering.

mod common;

use common::{base_time, psu_engine, psu_profile, PSU_ID};
use diagnostic_engine::reasoning::ThresholdClassifier;
use diagnostic_engine::{DiagnosisRequest, Measurement, SemanticState};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

/// (signal_id, unit, plausible value range) for every PSU signal.
const SIGNALS: &[(&str, &str, f64, f64)] = &[
    ("ac_input", "V", -10.0, 300.0),
    ("bridge_output", "V", -10.0, 450.0),
    ("output_12v", "V", -1.0, 16.0),
    ("feedback_ref", "V", 0.0, 3.5),
    ("feedback_resistor", "kohm", 0.0, 20.0),
];

/// A batch measuring any subset of the PSU signals.
fn arb_batch() -> impl Strategy<Value = Vec<Measurement>> {
    let per_signal: Vec<_> = SIGNALS
        .iter()
        .map(|&(_, _, lo, hi)| prop::option::of(lo..hi))
        .collect();
    per_signal.prop_map(|values| {
        values
            .into_iter()
            .zip(SIGNALS)
            .enumerate()
            .filter_map(|(i, (value, &(id, unit, _, _)))| {
                value.map(|v| Measurement::new(id, v, unit, base_time() + chrono::Duration::seconds(i as i64)))
            })
            .collect()
    })
}

/// Any previous state a caller could carry: none, declared, reserved or stale.
fn arb_previous_state() -> impl Strategy<Value = Option<SemanticState>> {
    prop_oneof![
        Just(None),
        Just(Some(SemanticState::new("missing"))),
        Just(Some(SemanticState::new("low"))),
        Just(Some(SemanticState::new("normal"))),
        Just(Some(SemanticState::new("high"))),
        Just(Some(SemanticState::new("over_voltage"))),
        Just(Some(SemanticState::unknown())),
        Just(Some(SemanticState::new("retired_band"))),
    ]
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn classification_is_total(value in any::<f64>(), previous in arb_previous_state()) {
        let profile = psu_profile();
        let rail = profile.threshold("output_12v").expect("rail thresholds");
        let classifier = ThresholdClassifier::new(0.05);

        let c = classifier.classify(rail, value, previous.as_ref());
        let declared = rail.states.iter().any(|b| b.name == c.state.as_str());
        prop_assert!(c.state.is_unknown() || declared);
        prop_assert_eq!(c.band_index.is_some(), !c.state.is_unknown());
        if !value.is_finite() {
            prop_assert!(c.state.is_unknown());
        }
    }

    #[test]
    fn hysteresis_holds_within_margin(value in (11.4 - 0.059)..(12.6 + 0.059)) {
        let profile = psu_profile();
        let rail = profile.threshold("output_12v").expect("rail thresholds");
        let classifier = ThresholdClassifier::new(0.05);

        let previous = SemanticState::new("normal");
        let c = classifier.classify(rail, value, Some(&previous));
        prop_assert_eq!(c.state.as_str(), "normal");
    }

    #[test]
    fn confidence_is_bounded(batch in arb_batch()) {
        let engine = psu_engine();
        let result = engine.diagnose(&DiagnosisRequest::new(PSU_ID, batch)).expect("valid batch");

        prop_assert!(result.confidence >= 0.0 && result.confidence < 1.0);
        for score in &result.fault_scores {
            prop_assert!(score.computed_confidence > 0.0 && score.computed_confidence < 1.0);
        }
        for diff in &result.differential_diagnoses {
            prop_assert!(!diff.key_differentiator.is_empty());
            prop_assert!(diff.probability <= result.confidence);
        }
        if result.is_no_hypothesis() {
            prop_assert_eq!(result.confidence, 0.0);
            prop_assert_eq!(result.next_action.action, diagnostic_engine::ActionKind::Escalate);
        }
    }

    #[test]
    fn ranking_ignores_measurement_order(
        (batch, shuffled) in arb_batch().prop_flat_map(|b| (Just(b.clone()), Just(b).prop_shuffle()))
    ) {
        let at = base_time();
        let a = psu_engine()
            .diagnose(&DiagnosisRequest::new(PSU_ID, batch).requested_at(at))
            .expect("valid batch");
        let b = psu_engine()
            .diagnose(&DiagnosisRequest::new(PSU_ID, shuffled).requested_at(at))
            .expect("valid batch");

        prop_assert_eq!(&a.fault_scores, &b.fault_scores);
        prop_assert_eq!(a.primary_fault.fault_id(), b.primary_fault.fault_id());
        prop_assert_eq!(a.confidence, b.confidence);
        prop_assert_eq!(&a.next_action, &b.next_action);
    }

    #[test]
    fn repeated_calls_are_deterministic(batch in arb_batch()) {
        let request = DiagnosisRequest::new(PSU_ID, batch);
        let engine = psu_engine();
        let first = engine.diagnose(&request).expect("valid batch");
        let second = engine.diagnose(&request).expect("valid batch");
        prop_assert_eq!(first, second);
    }
}

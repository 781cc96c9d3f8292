//! Config Validation Tests
//!
//! Exercises the engine config layer independently from the reasoning
//! pipeline: typo detection, policy validation, file loading, and the effect
//! of non-default policy on a diagnosis.

mod common;

use common::{no_output_batch, overvoltage_batch, psu_profile, PSU_ID};
use diagnostic_engine::config::validation::{
    known_config_keys, suggest_correction, validate_policy_ranges, validate_unknown_keys,
};
use diagnostic_engine::config::defaults::MAX_CONFIDENCE;
use diagnostic_engine::config::{ConfigError, EngineConfig};
use diagnostic_engine::{DiagnosisRequest, DiagnosticEngine};

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_matching_key_warns_with_suggestion() {
    let toml_str = r#"
[matching]
max_diferentials = 2
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("matching.max_differentials"),
        "Should suggest the correct spelling"
    );
}

#[test]
fn typo_in_section_name_warns() {
    let warnings = validate_unknown_keys("[reveiw]\ndefinitive_at = 0.95\n");
    assert!(warnings.iter().any(|w| w.field == "reveiw"));
    assert!(warnings
        .iter()
        .any(|w| w.suggestion.as_deref() == Some("review")));
}

#[test]
fn every_known_key_round_trips_through_default_toml() {
    let toml_str = EngineConfig::default().to_toml().expect("serializable");
    assert!(validate_unknown_keys(&toml_str).is_empty());

    let known = known_config_keys();
    assert!(known.contains("classification.default_hysteresis_fraction"));
    assert!(known.contains("action_policy.default_safety_warning"));
    assert!(suggest_correction("action_policy.escalation_targt", &known).is_some());
}

#[test]
fn unknown_keys_do_not_break_loading() {
    let toml_str = r#"
[matching]
confidence_cap = 0.95
legacy_mode = true
"#;
    let (config, provenance) = EngineConfig::from_toml_str(toml_str).expect("unknown keys only warn");
    assert_eq!(config.matching.confidence_cap, 0.95);
    assert!(provenance.is_user_set("matching.confidence_cap"));
}

// ============================================================================
// Policy Validation
// ============================================================================

#[test]
fn invalid_policy_is_rejected_with_all_errors() {
    let toml_str = r#"
[matching]
confidence_cap = 1.2

[action_policy]
critical_confidence = 0.3
high_confidence = 0.6
"#;
    match EngineConfig::from_toml_str(toml_str) {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.iter().any(|e| e.contains("confidence_cap")));
            assert!(errors.iter().any(|e| e.contains("action_policy.confidence")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn suspicious_policy_only_warns() {
    let mut config = EngineConfig::default();
    config.matching.max_differentials = 0;
    assert!(config.validate().is_ok());
    let warnings = validate_policy_ranges(&config);
    assert!(warnings.iter().any(|w| w.field == "matching.max_differentials"));
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn load_from_file_reads_overrides() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("engine_config.toml");
    std::fs::write(
        &path,
        "[action_policy]\nescalation_target = \"regional service desk\"\n",
    )
    .expect("write config");

    let config = EngineConfig::load_from_file(&path).expect("valid config");
    assert_eq!(config.action_policy.escalation_target, "regional service desk");
    assert_eq!(config.matching.confidence_cap, 0.99);
}

#[test]
fn malformed_toml_is_parse_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("engine_config.toml");
    std::fs::write(&path, "[matching\nconfidence_cap = ").expect("write config");
    assert!(matches!(
        EngineConfig::load_from_file(&path),
        Err(ConfigError::Parse(_, _))
    ));
}

// ============================================================================
// Policy applied to a diagnosis
// ============================================================================

#[test]
fn configured_cap_and_escalation_target_reach_the_result() {
    let toml_str = r#"
[matching]
confidence_cap = 0.9

[action_policy]
escalation_target = "regional service desk"
"#;
    let (config, _) = EngineConfig::from_toml_str(toml_str).expect("valid config");
    let engine = DiagnosticEngine::new(config).with_profile(psu_profile());

    let resolved = engine
        .diagnose(&DiagnosisRequest::new(PSU_ID, no_output_batch()))
        .expect("diagnosis should succeed");
    assert_eq!(resolved.confidence, 0.9);

    let escalated = engine
        .diagnose(&DiagnosisRequest::new(PSU_ID, Vec::new()))
        .expect("diagnosis should succeed");
    assert_eq!(escalated.next_action.target, "regional service desk");
}

#[test]
fn wider_default_hysteresis_holds_state_longer() {
    let mut config = EngineConfig::default();
    config.classification.default_hysteresis_fraction = 0.2;
    let engine = DiagnosticEngine::new(config).with_profile(psu_profile());

    engine
        .diagnose(&DiagnosisRequest::new(PSU_ID, vec![common::volts("output_12v", 12.0, 0)]).with_instance("cam-01"))
        .expect("first call");
    // 0.2 V above the band: outside 5% of 1.2 V, inside 20%
    let held = engine
        .diagnose(&DiagnosisRequest::new(PSU_ID, vec![common::volts("output_12v", 12.8, 1)]).with_instance("cam-01"))
        .expect("second call");
    assert_eq!(held.signals[0].semantic_state.as_str(), "normal");
}

#[test]
fn unvalidated_cap_of_one_still_reports_uncertainty() {
    let mut config = EngineConfig::default();
    config.matching.confidence_cap = 1.0;
    assert!(config.validate().is_err());

    // Built in code, never validated by a loader
    let engine = DiagnosticEngine::new(config).with_profile(psu_profile());
    let result = engine
        .diagnose(&DiagnosisRequest::new(PSU_ID, overvoltage_batch()))
        .expect("diagnosis should succeed");

    assert!(result.confidence < 1.0, "confidence {} reached certainty", result.confidence);
    assert_eq!(result.confidence, MAX_CONFIDENCE);
    assert!(result.fault_scores.iter().all(|s| s.computed_confidence < 1.0));
    if let diagnostic_engine::PrimaryCause::Resolved { hypotheses, .. } = &result.primary_fault {
        assert!(hypotheses.iter().all(|h| h.confidence < 1.0));
    }
}

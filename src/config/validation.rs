//! Config validation: unknown-key detection with Levenshtein suggestions
//! and policy sanity checks.
//!
//! The raw TOML is first parsed into `toml::Value` and its key tree compared
//! against the known field names; unknown keys become warnings with a
//! "did you mean?" suggestion. Serde deserialization runs afterwards, so a
//! typo never breaks an otherwise valid config.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path of `EngineConfig`.
///
/// Kept by hand in step with engine_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [classification]
        "classification",
        "classification.default_hysteresis_fraction",
        // [severity]
        "severity",
        "severity.degraded_ratio",
        "severity.critical_multiplier",
        // [matching]
        "matching",
        "matching.confidence_cap",
        "matching.max_differentials",
        "matching.configuration_gap_penalty",
        // [action_policy]
        "action_policy",
        "action_policy.critical_confidence",
        "action_policy.high_confidence",
        "action_policy.escalation_target",
        "action_policy.escalation_instruction",
        "action_policy.default_safety_warning",
        // [review]
        "review",
        "review.expert_review_below",
        "review.definitive_at",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walker
// ============================================================================

/// Recursively collect all dotted key paths from a TOML value tree.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let toml::Value::Table(table) = value {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Closest known key within edit distance 3. Equal distances resolve to the
/// lexicographically smaller key so the suggestion is stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Warnings for every unknown key in a raw TOML document. Never fails;
/// syntax errors are left to serde.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Policy Sanity Checks
// ============================================================================

/// Values that validate but are unlikely to be intended.
pub fn validate_policy_ranges(config: &super::EngineConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let hyst = config.classification.default_hysteresis_fraction;
    if hyst > 0.2 {
        warnings.push(ValidationWarning {
            field: "classification.default_hysteresis_fraction".to_string(),
            message: format!(
                "default_hysteresis_fraction = {hyst:.3} is unusually wide; states will stick across bands"
            ),
            suggestion: None,
        });
    }

    if config.matching.max_differentials == 0 {
        warnings.push(ValidationWarning {
            field: "matching.max_differentials".to_string(),
            message: "max_differentials = 0 disables differential diagnoses".to_string(),
            suggestion: None,
        });
    }

    let review = &config.review;
    if review.expert_review_below > review.definitive_at {
        warnings.push(ValidationWarning {
            field: "review.expert_review_below".to_string(),
            message: format!(
                "expert_review_below ({:.2}) exceeds definitive_at ({:.2}); a definitive result can still require review",
                review.expert_review_below, review.definitive_at
            ),
            suggestion: None,
        });
    }

    if review.definitive_at > config.matching.confidence_cap {
        warnings.push(ValidationWarning {
            field: "review.definitive_at".to_string(),
            message: format!(
                "definitive_at ({:.2}) is above confidence_cap ({:.2}); no result can be definitive",
                review.definitive_at, config.matching.confidence_cap
            ),
            suggestion: None,
        });
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("cap", "cap"), 0);
        assert_eq!(levenshtein("confidense_cap", "confidence_cap"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [matching]
            confidence_cap = 0.95
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"matching".to_string()));
        assert!(keys.contains(&"matching.confidence_cap".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[matching]
confidense_cap = 0.95
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].field.contains("confidense_cap"));
        assert_eq!(warnings[0].suggestion.as_deref(), Some("matching.confidence_cap"));
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let toml_str = r#"
[classification]
default_hysteresis_fraction = 0.05

[action_policy]
escalation_target = "field engineer"

[review]
definitive_at = 0.9
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {:?}", warnings);
    }

    #[test]
    fn test_unknown_section_produces_warning() {
        let warnings = validate_unknown_keys("[scoring]\nweight = 1.0\n");
        assert!(warnings.iter().any(|w| w.field == "scoring"));
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_defaults_have_no_policy_warnings() {
        let warnings = validate_policy_ranges(&crate::config::EngineConfig::default());
        assert!(warnings.is_empty(), "Defaults should be clean: {:?}", warnings);
    }

    #[test]
    fn test_unreachable_definitive_threshold_warns() {
        let mut config = crate::config::EngineConfig::default();
        config.review.definitive_at = 0.995;
        let warnings = validate_policy_ranges(&config);
        assert!(warnings.iter().any(|w| w.field == "review.definitive_at"));
    }
}

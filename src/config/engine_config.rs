//! Engine Configuration - diagnostic policy as operator-tunable TOML values
//!
//! Every policy constant of the reasoning pipeline (hysteresis default,
//! severity buckets, confidence cap, priority thresholds) is a field here.
//! These apply uniformly to every equipment profile; per-equipment knowledge
//! lives in `EquipmentProfile`, never in this file.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults::MAX_CONFIDENCE;

/// Environment variable pointing at an engine config TOML file.
pub const CONFIG_ENV_VAR: &str = "DIAG_ENGINE_CONFIG";

/// Config file looked up in the working directory when the env var is unset.
pub const LOCAL_CONFIG_FILE: &str = "engine_config.toml";

// ============================================================================
// Config Provenance: tracks which keys the user explicitly set
// ============================================================================

/// Dotted key paths explicitly present in the user's TOML file.
///
/// After deserialization every `#[serde(default)]` field has a value whether
/// or not the user wrote it; this keeps the distinction.
#[derive(Debug, Clone, Default)]
pub struct ConfigProvenance {
    pub explicit_keys: HashSet<String>,
}

impl ConfigProvenance {
    /// Example: `provenance.is_user_set("matching.confidence_cap")`
    pub fn is_user_set(&self, dotted_key: &str) -> bool {
        self.explicit_keys.contains(dotted_key)
    }
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration of the diagnostic engine.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$DIAG_ENGINE_CONFIG`
/// 2. `./engine_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub classification: ClassificationConfig,

    #[serde(default)]
    pub severity: SeverityConfig,

    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub action_policy: ActionPolicyConfig,

    #[serde(default)]
    pub review: ReviewConfig,
}

impl EngineConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Self {
        Self::load_with_provenance().0
    }

    /// Same search order as `load()`, also returning which keys the user set.
    pub fn load_with_provenance() -> (Self, ConfigProvenance) {
        // 1. Env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file_with_provenance(&p) {
                    Ok(loaded) => {
                        info!(path = %p.display(), "Loaded engine config from {}", CONFIG_ENV_VAR);
                        return loaded;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load engine config, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Working directory
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file_with_provenance(&local) {
                Ok(loaded) => {
                    info!("Loaded engine config from ./{}", LOCAL_CONFIG_FILE);
                    return loaded;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No engine config found, using built-in defaults");
        (Self::default(), ConfigProvenance::default())
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let (config, _provenance) = Self::load_from_file_with_provenance(path)?;
        Ok(config)
    }

    /// Load from a specific TOML file path, returning provenance as well.
    pub fn load_from_file_with_provenance(path: &Path) -> Result<(Self, ConfigProvenance), ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<(Self, ConfigProvenance), ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let provenance = ConfigProvenance {
            explicit_keys: contents
                .parse::<toml::Value>()
                .map(|v| super::validation::walk_toml_keys(&v, "").into_iter().collect())
                .unwrap_or_default(),
        };

        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        for w in super::validation::validate_policy_ranges(&config) {
            warn!(field = %w.field, "{}", w);
        }
        Ok((config, provenance))
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate policy values for internal consistency.
    ///
    /// Rules:
    /// - All values finite
    /// - Confidence cap strictly inside (0, 1)
    /// - Critical thresholds above high thresholds
    /// - Severity ratios positive, critical multiplier > 1
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let c = &self.classification;
        Self::check_fraction(c.default_hysteresis_fraction, "classification.default_hysteresis_fraction", &mut errors);
        if c.default_hysteresis_fraction >= 0.5 {
            errors.push(format!(
                "classification.default_hysteresis_fraction ({:.3}) must be < 0.5",
                c.default_hysteresis_fraction
            ));
        }

        let s = &self.severity;
        if !s.degraded_ratio.is_finite() || s.degraded_ratio <= 0.0 {
            errors.push(format!("severity.degraded_ratio must be > 0 (got {})", s.degraded_ratio));
        }
        if !s.critical_multiplier.is_finite() || s.critical_multiplier <= 1.0 {
            errors.push(format!(
                "severity.critical_multiplier must be > 1 (got {})",
                s.critical_multiplier
            ));
        }

        let m = &self.matching;
        if !m.confidence_cap.is_finite() || m.confidence_cap <= 0.0 || m.confidence_cap > MAX_CONFIDENCE {
            errors.push(format!(
                "matching.confidence_cap must be in (0, {MAX_CONFIDENCE}] (got {})",
                m.confidence_cap
            ));
        }
        Self::check_fraction(m.configuration_gap_penalty, "matching.configuration_gap_penalty", &mut errors);
        if m.configuration_gap_penalty >= 1.0 {
            errors.push("matching.configuration_gap_penalty must be < 1".to_string());
        }

        let a = &self.action_policy;
        Self::check_escalation(
            a.high_confidence,
            a.critical_confidence,
            "action_policy.confidence",
            &mut errors,
        );
        if a.escalation_target.trim().is_empty() {
            errors.push("action_policy.escalation_target must not be empty".to_string());
        }
        if a.default_safety_warning.trim().is_empty() {
            errors.push("action_policy.default_safety_warning must not be empty".to_string());
        }

        let r = &self.review;
        Self::check_fraction(r.expert_review_below, "review.expert_review_below", &mut errors);
        Self::check_fraction(r.definitive_at, "review.definitive_at", &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_fraction(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            errors.push(format!("{name} must be a finite value in [0, 1] (got {value})"));
        }
    }

    fn check_escalation(high: f64, critical: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons silently pass, catch them explicitly
        if !high.is_finite() || !critical.is_finite() {
            errors.push(format!("{name}: values must be finite (got high={high}, critical={critical})"));
            return;
        }
        if critical < high {
            errors.push(format!("{name}: critical ({critical:.3}) must be >= high ({high:.3})"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Classification
// ============================================================================

/// Threshold classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// Hysteresis margin as a fraction of band width, used when a threshold
    /// profile declares neither a fraction nor an absolute margin.
    #[serde(default = "default_hysteresis_fraction")]
    pub default_hysteresis_fraction: f64,
}

fn default_hysteresis_fraction() -> f64 { 0.05 }

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            default_hysteresis_fraction: default_hysteresis_fraction(),
        }
    }
}

// ============================================================================
// Severity
// ============================================================================

/// Anomaly severity buckets.
///
/// Distance from the normal band is divided by the normal band width:
/// at or above `degraded_ratio` is a warning, at or above
/// `degraded_ratio * critical_multiplier` is critical, anything less is minor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityConfig {
    #[serde(default = "default_degraded_ratio")]
    pub degraded_ratio: f64,

    #[serde(default = "default_critical_multiplier")]
    pub critical_multiplier: f64,
}

fn default_degraded_ratio() -> f64 { 0.5 }
fn default_critical_multiplier() -> f64 { 2.0 }

impl SeverityConfig {
    pub fn critical_ratio(&self) -> f64 {
        self.degraded_ratio * self.critical_multiplier
    }
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            degraded_ratio: default_degraded_ratio(),
            critical_multiplier: default_critical_multiplier(),
        }
    }
}

// ============================================================================
// Matching
// ============================================================================

/// Fault matcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Upper bound on any computed confidence, at most `defaults::MAX_CONFIDENCE`.
    #[serde(default = "default_confidence_cap")]
    pub confidence_cap: f64,

    /// Number of ranked faults reported as differential diagnoses.
    #[serde(default = "default_max_differentials")]
    pub max_differentials: usize,

    /// Multiplicative confidence penalty per configuration gap on a signal the
    /// primary fault references.
    #[serde(default = "default_gap_penalty")]
    pub configuration_gap_penalty: f64,
}

fn default_confidence_cap() -> f64 { 0.99 }
fn default_max_differentials() -> usize { 3 }
fn default_gap_penalty() -> f64 { 0.05 }

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            confidence_cap: default_confidence_cap(),
            max_differentials: default_max_differentials(),
            configuration_gap_penalty: default_gap_penalty(),
        }
    }
}

// ============================================================================
// Action Policy
// ============================================================================

/// Next-action priority and safety policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPolicyConfig {
    /// Confidence at or above which the action is CRITICAL.
    #[serde(default = "default_critical_confidence")]
    pub critical_confidence: f64,

    /// Confidence at or above which the action is HIGH.
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f64,

    /// Who an escalation is addressed to.
    #[serde(default = "default_escalation_target")]
    pub escalation_target: String,

    /// Instruction attached to escalations.
    #[serde(default = "default_escalation_instruction")]
    pub escalation_instruction: String,

    /// Warning used when a step targets a safety-sensitive point without its
    /// own safety text.
    #[serde(default = "default_safety_warning")]
    pub default_safety_warning: String,
}

fn default_critical_confidence() -> f64 { 0.8 }
fn default_high_confidence() -> f64 { 0.5 }
fn default_escalation_target() -> String {
    "qualified technician".to_string()
}
fn default_escalation_instruction() -> String {
    "Hand over to a qualified technician with this diagnosis record".to_string()
}
fn default_safety_warning() -> String {
    "Hazardous voltage: disconnect mains and discharge capacitors before probing".to_string()
}

impl Default for ActionPolicyConfig {
    fn default() -> Self {
        Self {
            critical_confidence: default_critical_confidence(),
            high_confidence: default_high_confidence(),
            escalation_target: default_escalation_target(),
            escalation_instruction: default_escalation_instruction(),
            default_safety_warning: default_safety_warning(),
        }
    }
}

// ============================================================================
// Review
// ============================================================================

/// When a diagnosis is flagged for expert review or marked definitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default = "default_expert_review_below")]
    pub expert_review_below: f64,

    #[serde(default = "default_definitive_at")]
    pub definitive_at: f64,
}

fn default_expert_review_below() -> f64 { 0.7 }
fn default_definitive_at() -> f64 { 0.9 }

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            expert_review_below: default_expert_review_below(),
            definitive_at: default_definitive_at(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

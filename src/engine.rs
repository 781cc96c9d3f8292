//! Diagnostic Engine facade
//!
//! Owns the read-only equipment registry, the per-instance history table and
//! the engine configuration. `diagnose()` validates a request at the boundary
//! and runs the reasoning pipeline:
//!
//! ```text
//! measurements -> StateVectorBuilder -> FaultMatcher -> ActionSelector -> ResultAssembler
//! ```
//!
//! The engine is `Send + Sync`; share it behind an `Arc` and call `diagnose`
//! from any number of threads.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::defaults::IDENTIFIER_PATTERN;
use crate::config::EngineConfig;
use crate::history::{lock_history, HistoryTable, SignalHistory};
use crate::reasoning::{
    ActionSelector, AssemblyContext, FaultMatcher, ResultAssembler, StateVectorBuilder, ThresholdClassifier,
};
use crate::types::{DiagnosisResult, EquipmentProfile, Measurement, WorkflowType};

// ============================================================================
// Errors
// ============================================================================

/// Requests the engine refuses outright. Everything else degrades into
/// issues inside a complete result.
#[derive(Debug, Error, PartialEq)]
pub enum DiagnosisError {
    #[error("Unknown equipment: {0}")]
    UnknownEquipment(String),

    #[error("Malformed measurement at index {index}: {reason}")]
    MalformedMeasurement { index: usize, reason: String },

    #[error("Invalid instance id '{0}'")]
    InvalidInstanceId(String),
}

// ============================================================================
// Request
// ============================================================================

/// One diagnostic call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisRequest {
    pub equipment_id: String,

    /// Physical unit being diagnosed. Without one, the call starts from an
    /// empty history and records nothing.
    #[serde(default)]
    pub instance_id: Option<String>,

    #[serde(default)]
    pub measurements: Vec<Measurement>,

    /// Recovery steps already carried out; non-empty marks a follow-up.
    #[serde(default)]
    pub completed_steps: BTreeSet<String>,

    /// Timestamp stamped on the result. Defaults to the latest measurement.
    #[serde(default)]
    pub requested_at: Option<DateTime<Utc>>,
}

impl DiagnosisRequest {
    pub fn new(equipment_id: impl Into<String>, measurements: Vec<Measurement>) -> Self {
        Self {
            equipment_id: equipment_id.into(),
            instance_id: None,
            measurements,
            completed_steps: BTreeSet::new(),
            requested_at: None,
        }
    }

    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn with_completed_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.completed_steps = steps.into_iter().map(Into::into).collect();
        self
    }

    pub fn requested_at(mut self, at: DateTime<Utc>) -> Self {
        self.requested_at = Some(at);
        self
    }

    pub fn workflow(&self) -> WorkflowType {
        if self.completed_steps.is_empty() {
            WorkflowType::Initial
        } else {
            WorkflowType::FollowUp
        }
    }

    /// `requested_at`, else the latest measurement timestamp, else the epoch.
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.requested_at
            .or_else(|| self.measurements.iter().map(|m| m.timestamp).max())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

fn is_valid_identifier(id: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(IDENTIFIER_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(id))
}

/// Reject batches the pipeline cannot interpret.
pub fn validate_measurements(measurements: &[Measurement]) -> Result<(), DiagnosisError> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(measurements.len());
    for (index, m) in measurements.iter().enumerate() {
        let reject = |reason: String| DiagnosisError::MalformedMeasurement { index, reason };

        if m.signal_id.trim().is_empty() {
            return Err(reject("empty signal id".to_string()));
        }
        if !is_valid_identifier(&m.signal_id) {
            return Err(reject(format!("invalid signal id '{}'", m.signal_id)));
        }
        if m.unit.trim().is_empty() {
            return Err(reject(format!("empty unit for signal '{}'", m.signal_id)));
        }
        if !m.value.is_finite() {
            return Err(reject(format!("non-finite value for signal '{}'", m.signal_id)));
        }
        if !seen.insert(m.signal_id.as_str()) {
            return Err(reject(format!("duplicate signal '{}' in batch", m.signal_id)));
        }
    }
    Ok(())
}

// ============================================================================
// Engine
// ============================================================================

pub struct DiagnosticEngine {
    profiles: HashMap<String, Arc<EquipmentProfile>>,
    history: HistoryTable,
    config: EngineConfig,
}

impl DiagnosticEngine {
    /// Build an engine around `config`. A config that fails validation is
    /// still accepted with a warning; reported confidence stays below
    /// `defaults::MAX_CONFIDENCE` regardless.
    pub fn new(config: EngineConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Engine config failed validation");
        }
        Self {
            profiles: HashMap::new(),
            history: HistoryTable::new(),
            config,
        }
    }

    /// Register an equipment profile, returning the one it replaces.
    pub fn register(&mut self, profile: EquipmentProfile) -> Option<Arc<EquipmentProfile>> {
        let id = profile.equipment_id().to_string();
        info!(
            equipment = %id,
            signals = profile.signals.len(),
            faults = profile.faults.len(),
            "Registered equipment profile"
        );
        self.profiles.insert(id, Arc::new(profile))
    }

    pub fn with_profile(mut self, profile: EquipmentProfile) -> Self {
        self.register(profile);
        self
    }

    pub fn profile(&self, equipment_id: &str) -> Option<Arc<EquipmentProfile>> {
        self.profiles.get(equipment_id).cloned()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn history(&self) -> &HistoryTable {
        &self.history
    }

    /// Run one diagnostic session.
    pub fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisResult, DiagnosisError> {
        let profile = self
            .profile(&request.equipment_id)
            .ok_or_else(|| DiagnosisError::UnknownEquipment(request.equipment_id.clone()))?;

        if let Some(instance) = request.instance_id.as_deref() {
            if !is_valid_identifier(instance) {
                return Err(DiagnosisError::InvalidInstanceId(instance.to_string()));
            }
        }
        validate_measurements(&request.measurements)?;

        let classifier = ThresholdClassifier::new(self.config.classification.default_hysteresis_fraction);
        let builder = StateVectorBuilder::new(&profile, classifier, &self.config.severity);

        let vector = match request.instance_id.as_deref() {
            Some(instance) => {
                let handle = self.history.instance(profile.equipment_id(), instance);
                let mut history = lock_history(&handle);
                builder.build(&request.measurements, &mut history)
            }
            None => {
                debug!(equipment = %profile.equipment_id(), "No instance id, using cold-start history");
                builder.build(&request.measurements, &mut SignalHistory::new())
            }
        };

        let outcome = FaultMatcher::new(&self.config.matching).evaluate(&vector, &profile.faults);
        let primary = outcome
            .primary
            .as_ref()
            .and_then(|p| profile.faults.get(p.score.declaration_index));

        let action = ActionSelector::new(&self.config.action_policy).select(
            &profile,
            primary,
            vector.status,
            outcome.confidence(),
            &request.completed_steps,
        );

        let ctx = AssemblyContext {
            profile: &profile,
            instance_id: request.instance_id.as_deref(),
            workflow: request.workflow(),
            generated_at: request.effective_timestamp(),
        };
        let result = ResultAssembler::new(&self.config).assemble(ctx, vector, outcome, action);

        info!(
            equipment = %profile.equipment_id(),
            instance = request.instance_id.as_deref().unwrap_or("-"),
            status = %result.status,
            primary = result.primary_fault.fault_id().unwrap_or("none"),
            confidence = result.confidence,
            action = %result.next_action.action,
            "Diagnosis complete"
        );

        Ok(result)
    }
}

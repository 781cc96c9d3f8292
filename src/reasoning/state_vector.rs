//! Signal State Vector Builder
//!
//! Classifies a batch of measurements against an equipment profile, flags
//! anomalies with a severity bucket, derives the session status and updates
//! the instance history. Problems with individual signals (unit mismatch,
//! missing configuration) degrade that signal to `unknown` and are reported
//! as issues; they never abort the batch.

use tracing::{debug, warn};

use crate::config::defaults::FALLBACK_SEVERITY_SCALE;
use crate::config::SeverityConfig;
use crate::history::{SignalHistory, SignalRecord};
use crate::types::{
    AnomalyKind, AnomalySeverity, ClassifiedSignal, DiagnosticIssue, EquipmentProfile, Measurement,
    SemanticState, SessionStatus, SignalAnomaly, ThresholdProfile, TransitionKind,
};

use super::classifier::{Classification, ThresholdClassifier};

/// Classified view of one measurement batch.
#[derive(Debug, Clone, Default)]
pub struct StateVector {
    /// One entry per measurement, in input order
    pub signals: Vec<ClassifiedSignal>,
    pub anomalies: Vec<SignalAnomaly>,
    pub status: SessionStatus,
    pub issues: Vec<DiagnosticIssue>,
}

impl StateVector {
    /// Observed state of a signal, if it was measured.
    pub fn state_of(&self, signal_id: &str) -> Option<&SemanticState> {
        self.signals
            .iter()
            .find(|s| s.signal_id == signal_id)
            .map(|s| &s.semantic_state)
    }

    /// Signal was measured and classified into a declared band.
    pub fn is_known(&self, signal_id: &str) -> bool {
        self.state_of(signal_id).is_some_and(|s| !s.is_unknown())
    }

    /// Signal carries a configuration gap issue.
    pub fn has_configuration_gap(&self, signal_id: &str) -> bool {
        self.issues.iter().any(|issue| {
            matches!(issue, DiagnosticIssue::ConfigurationGap { signal_id: id, .. } if id == signal_id)
        })
    }
}

/// Builds a [`StateVector`] for one equipment profile.
pub struct StateVectorBuilder<'a> {
    profile: &'a EquipmentProfile,
    classifier: ThresholdClassifier,
    severity: &'a SeverityConfig,
}

impl<'a> StateVectorBuilder<'a> {
    pub fn new(profile: &'a EquipmentProfile, classifier: ThresholdClassifier, severity: &'a SeverityConfig) -> Self {
        Self {
            profile,
            classifier,
            severity,
        }
    }

    /// Classify every measurement and record the new states in `history`.
    pub fn build(&self, measurements: &[Measurement], history: &mut SignalHistory) -> StateVector {
        let mut vector = StateVector::default();

        for m in measurements {
            let Some(definition) = self.profile.signal(&m.signal_id) else {
                warn!(signal = %m.signal_id, "Measurement for undeclared signal");
                vector.issues.push(DiagnosticIssue::ConfigurationGap {
                    signal_id: m.signal_id.clone(),
                    detail: "signal is not declared in the equipment profile".to_string(),
                });
                vector.signals.push(unclassified(m, history.previous_state(&m.signal_id).cloned()));
                continue;
            };

            if definition.unit != m.unit {
                warn!(
                    signal = %m.signal_id,
                    expected = %definition.unit,
                    received = %m.unit,
                    "Unit mismatch, classifying as unknown"
                );
                vector.issues.push(DiagnosticIssue::UnitMismatch {
                    signal_id: m.signal_id.clone(),
                    expected: definition.unit.clone(),
                    received: m.unit.clone(),
                });
                vector.anomalies.push(SignalAnomaly {
                    signal_id: m.signal_id.clone(),
                    semantic_state: SemanticState::unknown(),
                    raw_value: m.value,
                    severity: AnomalySeverity::Warning,
                    kind: AnomalyKind::UnitMismatch {
                        expected: definition.unit.clone(),
                        received: m.unit.clone(),
                    },
                });
                let classification = Classification {
                    state: SemanticState::unknown(),
                    band_index: None,
                    retained_by_hysteresis: false,
                };
                vector.signals.push(self.track(m, None, classification, history));
                continue;
            }

            let Some(thresholds) = self.profile.threshold(&m.signal_id).filter(|t| !t.states.is_empty()) else {
                warn!(signal = %m.signal_id, "No threshold bands declared for signal");
                vector.issues.push(DiagnosticIssue::ConfigurationGap {
                    signal_id: m.signal_id.clone(),
                    detail: "no threshold bands declared for signal".to_string(),
                });
                vector.signals.push(unclassified(m, history.previous_state(&m.signal_id).cloned()));
                continue;
            };

            let classification = self
                .classifier
                .classify(thresholds, m.value, history.previous_state(&m.signal_id));

            debug!(
                signal = %m.signal_id,
                value = m.value,
                state = %classification.state,
                retained = classification.retained_by_hysteresis,
                "Classified"
            );

            if !thresholds.is_normal(&classification.state) {
                vector
                    .anomalies
                    .push(self.anomaly(m, thresholds, &classification.state));
            }

            vector
                .signals
                .push(self.track(m, Some(thresholds), classification, history));
        }

        vector.status = SessionStatus::from_anomalies(&vector.anomalies);
        vector
    }

    /// Build the classified signal, deriving transition metadata from the
    /// previous record, then overwrite that record.
    fn track(
        &self,
        m: &Measurement,
        thresholds: Option<&ThresholdProfile>,
        classification: Classification,
        history: &mut SignalHistory,
    ) -> ClassifiedSignal {
        let previous = history.get(&m.signal_id);

        let (transition, transitioned_at) = match previous {
            Some(prev) if prev.state == classification.state => (None, prev.transitioned_at),
            Some(prev) => {
                let kind = match (prev.band_index, classification.band_index) {
                    (Some(a), Some(b)) if a.abs_diff(b) == 1 => TransitionKind::Gradual,
                    _ => TransitionKind::Abrupt,
                };
                (Some(kind), Some(m.timestamp))
            }
            None => (None, Some(m.timestamp)),
        };

        let signal = ClassifiedSignal {
            signal_id: m.signal_id.clone(),
            raw_value: m.value,
            unit: m.unit.clone(),
            semantic_state: classification.state.clone(),
            previous_state: previous.map(|p| p.state.clone()),
            transitioned_at,
            transition,
            retained_by_hysteresis: classification.retained_by_hysteresis,
            deviation_percent: thresholds
                .and_then(|t| t.nominal_value)
                .and_then(|nominal| deviation_percent(m.value, nominal)),
        };

        history.record(
            m.signal_id.clone(),
            SignalRecord {
                state: classification.state,
                band_index: classification.band_index,
                transitioned_at,
                last_value: m.value,
                observed_at: m.timestamp,
            },
        );

        signal
    }

    fn anomaly(&self, m: &Measurement, thresholds: &ThresholdProfile, state: &SemanticState) -> SignalAnomaly {
        let (severity, distance) = match thresholds.normal_band() {
            Some(normal) => {
                let distance = normal.distance(m.value);
                let scale = normal
                    .width()
                    .filter(|w| w.is_finite() && *w > 0.0)
                    .or_else(|| normal.bound_magnitude(m.value).filter(|b| *b > 0.0))
                    .unwrap_or(FALLBACK_SEVERITY_SCALE);
                let ratio = distance / scale;
                let severity = if ratio >= self.severity.critical_ratio() {
                    AnomalySeverity::Critical
                } else if ratio >= self.severity.degraded_ratio {
                    AnomalySeverity::Warning
                } else {
                    AnomalySeverity::Minor
                };
                (severity, distance)
            }
            None => (AnomalySeverity::Warning, 0.0),
        };

        SignalAnomaly {
            signal_id: m.signal_id.clone(),
            semantic_state: state.clone(),
            raw_value: m.value,
            severity,
            kind: AnomalyKind::OutOfNormal { distance },
        }
    }
}

/// Signal that could not be classified for lack of configuration. History is
/// left untouched.
fn unclassified(m: &Measurement, previous_state: Option<SemanticState>) -> ClassifiedSignal {
    ClassifiedSignal {
        signal_id: m.signal_id.clone(),
        raw_value: m.value,
        unit: m.unit.clone(),
        semantic_state: SemanticState::unknown(),
        previous_state,
        transitioned_at: None,
        transition: None,
        retained_by_hysteresis: false,
        deviation_percent: None,
    }
}

fn deviation_percent(value: f64, nominal: f64) -> Option<f64> {
    if nominal == 0.0 || !nominal.is_finite() {
        return None;
    }
    Some((value - nominal) / nominal.abs() * 100.0)
}

//! Next-Action Selector
//!
//! Picks the single next step: the first recovery step of the primary fault
//! the technician has not completed yet, or an escalation when there is no
//! hypothesis or the procedure is exhausted. Priority comes from engine-wide
//! policy, never from the equipment profile.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::ActionPolicyConfig;
use crate::types::{ActionKind, EquipmentProfile, FaultDefinition, NextAction, Priority, RecoveryStep, SessionStatus};

pub struct ActionSelector<'a> {
    policy: &'a ActionPolicyConfig,
}

impl<'a> ActionSelector<'a> {
    pub fn new(policy: &'a ActionPolicyConfig) -> Self {
        Self { policy }
    }

    /// Urgency from session status and diagnosis confidence.
    pub fn priority(&self, status: SessionStatus, confidence: f64) -> Priority {
        if status == SessionStatus::Failed || confidence >= self.policy.critical_confidence {
            Priority::Critical
        } else if status == SessionStatus::Degraded || confidence >= self.policy.high_confidence {
            Priority::High
        } else {
            Priority::Medium
        }
    }

    pub fn select(
        &self,
        profile: &EquipmentProfile,
        primary: Option<&FaultDefinition>,
        status: SessionStatus,
        confidence: f64,
        completed_steps: &BTreeSet<String>,
    ) -> NextAction {
        let priority = self.priority(status, confidence);

        let Some(fault) = primary else {
            debug!("No hypothesis, escalating");
            return self.escalate(priority, "No fault signature matched the observed signals");
        };

        match fault.recovery.iter().find(|step| !completed_steps.contains(&step.step_id)) {
            Some(step) => {
                debug!(fault = %fault.fault_id, step = %step.step_id, "Selected recovery step");
                self.from_step(profile, step, priority)
            }
            None => {
                debug!(fault = %fault.fault_id, "Recovery procedure exhausted, escalating");
                self.escalate(priority, "All documented recovery steps completed without resolving the fault")
            }
        }
    }

    fn from_step(&self, profile: &EquipmentProfile, step: &RecoveryStep, priority: Priority) -> NextAction {
        // Explicit step text always wins; sensitive targets never go without one.
        let safety_warning = step.safety.clone().or_else(|| {
            profile
                .is_safety_sensitive_target(&step.target)
                .then(|| self.policy.default_safety_warning.clone())
        });

        NextAction {
            action: step.action,
            target: step.target.clone(),
            instruction: step.instruction.clone(),
            expected_result: step.verification.clone(),
            priority,
            safety_warning,
            step_id: Some(step.step_id.clone()),
            tools: step.tools.clone(),
            estimated_time: step.estimated_time.clone(),
        }
    }

    fn escalate(&self, priority: Priority, reason: &str) -> NextAction {
        NextAction {
            action: ActionKind::Escalate,
            target: self.policy.escalation_target.clone(),
            instruction: self.policy.escalation_instruction.clone(),
            expected_result: reason.to_string(),
            priority,
            safety_warning: None,
            step_id: None,
            tools: Vec::new(),
            estimated_time: None,
        }
    }
}

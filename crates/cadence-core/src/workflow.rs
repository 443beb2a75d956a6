// Cadence Core - Workflow template types
//
// A Workflow is an ordered list of approval/notification steps governing one
// business-entity kind, plus optional SLA metadata for regulatory deadlines
// (e.g. the GDPR 72-hour breach notification). Templates are produced by
// seed tooling, loaded from YAML, and read-only at runtime.

use crate::condition::AutoProgressCondition;
use crate::error::{CadenceError, CadenceResult};
use serde::{Deserialize, Serialize};

/// Workflow template definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Template name; unique, used as the stable reference key
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// The business-entity kind this workflow governs, e.g. "DataBreach"
    pub entity_type: String,

    /// Inactive templates are never instantiated
    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Optional SLA enforcement metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SlaConfig>,

    /// Ordered steps; order defines traversal sequence
    pub steps: Vec<WorkflowStep>,
}

fn default_true() -> bool {
    true
}

/// SLA metadata recognized on a workflow template
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaConfig {
    /// Master switch; without it the SLA monitor ignores the workflow
    #[serde(default)]
    pub sla_enforcement: bool,

    /// Hard deadline in hours from instance start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_deadline_hours: Option<f64>,

    /// Hours after start at which to escalate; defaults to deadline - 12
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_threshold_hours: Option<f64>,

    /// Role notified on escalation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_role: Option<String>,
}

/// Step template within a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// 1-based position; contiguous and unique within the workflow.
    /// Doubles as the stable step identifier in instance history.
    pub step_order: u32,

    #[serde(rename = "stepType", default)]
    pub step_type: StepType,

    /// Role whose members may approve (or are notified for) this step
    pub approver_role: String,

    /// Day budget for this step; fractional values are sub-day SLAs
    #[serde(default)]
    pub days_to_complete: f64,

    /// Optional steps may be skipped when their condition does not apply
    #[serde(default = "default_true")]
    pub is_required: bool,

    /// Absent means manual-only: never auto-advanced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_progress_conditions: Option<AutoProgressCondition>,
}

/// Step kinds
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// Requires an approval (manual or condition-driven)
    #[default]
    Approval,
    /// Notification-only; advances once its condition allows
    Notification,
}

impl Workflow {
    /// Validate template invariants. Called once at load time.
    pub fn validate(&self) -> CadenceResult<()> {
        if self.name.trim().is_empty() {
            return Err(CadenceError::config("workflow name must not be empty"));
        }
        if self.entity_type.trim().is_empty() {
            return Err(CadenceError::config(format!(
                "workflow '{}' has no entityType",
                self.name
            )));
        }
        if self.steps.is_empty() {
            return Err(CadenceError::config(format!(
                "workflow '{}' has no steps",
                self.name
            )));
        }

        // Step orders must be contiguous from 1 and strictly increasing
        for (idx, step) in self.steps.iter().enumerate() {
            let expected = (idx + 1) as u32;
            if step.step_order != expected {
                return Err(CadenceError::config(format!(
                    "workflow '{}': step '{}' has order {} but position {} expects {}",
                    self.name, step.name, step.step_order, idx, expected
                )));
            }
            if step.days_to_complete < 0.0 {
                return Err(CadenceError::config(format!(
                    "workflow '{}': step '{}' has negative daysToComplete",
                    self.name, step.name
                )));
            }
        }

        if let Some(ref sla) = self.metadata {
            if sla.sla_enforcement && sla.sla_deadline_hours.is_none() {
                // Fail closed later, but surface the misconfiguration early
                tracing::warn!(
                    workflow = %self.name,
                    "slaEnforcement is set without slaDeadlineHours; SLA monitoring disabled"
                );
            }
        }

        Ok(())
    }

    /// Look up a step by its order
    pub fn step(&self, step_order: u32) -> Option<&WorkflowStep> {
        // Orders are contiguous from 1, so this is an index lookup
        self.steps.get(step_order.checked_sub(1)? as usize)
    }

    /// The step after the given one, or `None` at the end of the workflow
    pub fn next_step(&self, step_order: u32) -> Option<&WorkflowStep> {
        self.steps.get(step_order as usize)
    }

    pub fn first_step(&self) -> Option<&WorkflowStep> {
        self.steps.first()
    }

    /// Hours granted by the SLA deadline, when enforcement is configured
    pub fn sla_deadline_hours(&self) -> Option<f64> {
        let sla = self.metadata.as_ref()?;
        if !sla.sla_enforcement {
            return None;
        }
        sla.sla_deadline_hours
    }
}

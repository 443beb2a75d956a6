// Cadence Core - Workflow instance state
//
// A WorkflowInstance tracks one workflow run against one governed entity:
// lifecycle status, current step pointer, and an append-only approval
// history that doubles as the audit trail for SLA and escalation decisions.

use crate::entity::EntityRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Instance lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Created but not yet started
    Pending,
    /// Traversing steps
    InProgress,
    /// All steps traversed
    Completed,
    /// A required approval was rejected
    Rejected,
    /// Cancelled by an operator
    Cancelled,
}

impl InstanceStatus {
    /// Terminal instances are never touched by timed processing again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Cancelled)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Actions recorded in the approval history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Approved,
    Rejected,
    AutoProgressed,
    Escalated,
    Notified,
}

impl HistoryAction {
    /// Whether this action advanced the step pointer when it was recorded
    pub fn advances(&self) -> bool {
        matches!(self, Self::Approved | Self::AutoProgressed | Self::Notified)
    }
}

/// One append-only audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Order of the step the action applied to
    pub step_order: u32,

    pub step_name: String,

    pub action: HistoryAction,

    /// Acting user, or "system" for engine-driven actions
    pub actor: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    pub timestamp: DateTime<Utc>,

    /// Set on entries produced by SLA enforcement
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_escalation: bool,

    /// What caused an automatic action, e.g. "sla_enforcement",
    /// "conditions_met", "step_skipped"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

impl HistoryEntry {
    pub fn new(
        step_order: u32,
        step_name: impl Into<String>,
        action: HistoryAction,
        actor: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            step_order,
            step_name: step_name.into(),
            action,
            actor: actor.into(),
            comment: None,
            timestamp,
            auto_escalation: false,
            trigger: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// Marks the entry as produced by SLA enforcement
    pub fn escalation(mut self) -> Self {
        self.auto_escalation = true;
        self
    }
}

/// One workflow run against one governed entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstance {
    pub id: Uuid,

    /// Template reference by name
    pub workflow_name: String,

    /// The governed business record
    #[serde(flatten)]
    pub entity: EntityRef,

    pub status: InstanceStatus,

    /// Order of the step awaiting action; `None` once terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,

    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// SLA due date, fixed at start from workflow metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,

    /// Append-only audit log; never rewritten, only extended
    #[serde(default)]
    pub approval_history: Vec<HistoryEntry>,

    /// Optimistic-concurrency counter, bumped on every store update
    #[serde(default)]
    pub version: u64,
}

impl WorkflowInstance {
    pub fn new(
        workflow_name: impl Into<String>,
        entity: EntityRef,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_name: workflow_name.into(),
            entity,
            status: InstanceStatus::InProgress,
            current_step: Some(1),
            started_at,
            completed_at: None,
            due_date: None,
            approval_history: Vec::new(),
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Append an audit record
    pub fn record(&mut self, entry: HistoryEntry) {
        self.approval_history.push(entry);
    }

    /// When the current step became active: the timestamp of the most recent
    /// history entry that advanced the pointer, or the instance start.
    pub fn step_started_at(&self) -> DateTime<Utc> {
        self.approval_history
            .iter()
            .rev()
            .find(|e| e.action.advances())
            .map(|e| e.timestamp)
            .unwrap_or(self.started_at)
    }

    /// Whether an escalation was already recorded for the given step
    pub fn escalated_at_step(&self, step_order: u32) -> bool {
        self.approval_history
            .iter()
            .any(|e| e.action == HistoryAction::Escalated && e.step_order == step_order)
    }

    /// Hours since the instance started
    pub fn hours_since_start(&self, now: DateTime<Utc>) -> f64 {
        (now - self.started_at).num_seconds() as f64 / 3600.0
    }

    /// Advance the pointer to the given step
    pub fn advance_to(&mut self, step_order: u32) {
        self.current_step = Some(step_order);
        self.status = InstanceStatus::InProgress;
    }

    /// Terminate the run
    pub fn finish(&mut self, status: InstanceStatus, now: DateTime<Utc>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.current_step = None;
        self.completed_at = Some(now);
    }
}

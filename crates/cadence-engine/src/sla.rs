// Cadence Engine - SLA monitoring and escalation
//
// Instances of SLA-enforced workflows are measured against a deadline fixed
// at start. Crossing two thirds of the deadline logs a warning; crossing
// the escalation threshold records an escalation entry and notifies the
// escalation role. Escalation fires at most once per step: the recorded
// history entry is the suppression marker, so restarts cannot re-fire it.

use crate::notify::{Notification, NotificationKind, NotificationSink};
use cadence_core::{
    CadenceResult, HistoryAction, HistoryEntry, Workflow, WorkflowInstance,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Trigger string recorded on escalation entries
pub const TRIGGER_SLA_ENFORCEMENT: &str = "sla_enforcement";

/// Role notified when a workflow escalates without a configured role
pub const DEFAULT_ESCALATION_ROLE: &str = "ROLE_ADMIN";

/// Fraction of the deadline after which the instance is in warning
const WARNING_FRACTION: f64 = 2.0 / 3.0;

/// Hours subtracted from the deadline when no explicit escalation
/// threshold is configured
const DEFAULT_ESCALATION_MARGIN_HOURS: f64 = 12.0;

/// Where an instance stands against its SLA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaStatus {
    /// The workflow has no enforceable SLA configured
    Unmonitored,
    OnTrack,
    /// Past two thirds of the deadline
    Warning,
    /// Past the escalation threshold
    Escalate,
}

/// Result of one SLA pass over an instance
#[derive(Debug, Clone, Copy)]
pub struct SlaOutcome {
    pub status: SlaStatus,
    /// Whether an escalation was recorded in this pass
    pub escalated_now: bool,
}

/// Assess an instance against its workflow's SLA metadata
pub fn assess(workflow: &Workflow, instance: &WorkflowInstance, now: DateTime<Utc>) -> SlaStatus {
    let Some(deadline_hours) = workflow.sla_deadline_hours() else {
        return SlaStatus::Unmonitored;
    };

    let elapsed = instance.hours_since_start(now);
    if elapsed >= escalation_threshold(workflow, deadline_hours) {
        SlaStatus::Escalate
    } else if elapsed >= deadline_hours * WARNING_FRACTION {
        SlaStatus::Warning
    } else {
        SlaStatus::OnTrack
    }
}

fn escalation_threshold(workflow: &Workflow, deadline_hours: f64) -> f64 {
    workflow
        .metadata
        .as_ref()
        .and_then(|m| m.escalation_threshold_hours)
        .unwrap_or((deadline_hours - DEFAULT_ESCALATION_MARGIN_HOURS).max(0.0))
}

/// Applies SLA consequences to running instances
pub struct SlaMonitor {
    notifier: Arc<dyn NotificationSink>,
}

impl SlaMonitor {
    pub fn new(notifier: Arc<dyn NotificationSink>) -> Self {
        Self { notifier }
    }

    /// Assess the instance and record an escalation when due.
    ///
    /// Mutates the instance in memory only; the caller persists it. When
    /// `escalated_now` is returned, the caller must not auto-progress the
    /// instance in the same pass.
    pub async fn enforce(
        &self,
        workflow: &Workflow,
        instance: &mut WorkflowInstance,
        now: DateTime<Utc>,
    ) -> CadenceResult<SlaOutcome> {
        let status = assess(workflow, instance, now);

        match status {
            SlaStatus::Escalate => {
                let Some(order) = instance.current_step else {
                    return Ok(SlaOutcome {
                        status,
                        escalated_now: false,
                    });
                };

                // Already escalated at this step: nothing more to do
                if instance.escalated_at_step(order) {
                    return Ok(SlaOutcome {
                        status,
                        escalated_now: false,
                    });
                }

                let step_name = workflow
                    .step(order)
                    .map(|s| s.name.as_str())
                    .unwrap_or("unknown step");
                let role = workflow
                    .metadata
                    .as_ref()
                    .and_then(|m| m.escalation_role.as_deref())
                    .unwrap_or(DEFAULT_ESCALATION_ROLE)
                    .to_string();

                instance.record(
                    HistoryEntry::new(order, step_name, HistoryAction::Escalated, "system", now)
                        .escalation()
                        .with_trigger(TRIGGER_SLA_ENFORCEMENT),
                );

                tracing::warn!(
                    instance = %instance.id,
                    workflow = %workflow.name,
                    step = %step_name,
                    role = %role,
                    "SLA escalation"
                );

                self.notifier
                    .send(Notification {
                        kind: NotificationKind::SlaEscalation,
                        role,
                        subject: format!("SLA escalation: {}", workflow.name),
                        body: format!(
                            "Instance for {} has been waiting at step '{}' past its escalation threshold",
                            instance.entity, step_name
                        ),
                        entity: instance.entity.clone(),
                        instance_id: Some(instance.id),
                        sent_at: now,
                    })
                    .await?;

                Ok(SlaOutcome {
                    status,
                    escalated_now: true,
                })
            }

            SlaStatus::Warning => {
                tracing::warn!(
                    instance = %instance.id,
                    workflow = %workflow.name,
                    elapsed_hours = instance.hours_since_start(now),
                    "Instance past SLA warning threshold"
                );
                Ok(SlaOutcome {
                    status,
                    escalated_now: false,
                })
            }

            _ => Ok(SlaOutcome {
                status,
                escalated_now: false,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryNotificationSink;
    use cadence_core::EntityRef;
    use chrono::{Duration, TimeZone};

    fn workflow(threshold: Option<f64>) -> Workflow {
        let yaml = format!(
            r#"
name: Breach Notification
entityType: DataBreach
metadata:
  slaEnforcement: true
  slaDeadlineHours: 72
{}  escalationRole: ROLE_ADMIN
steps:
  - name: Assessment
    stepOrder: 1
    approverRole: ROLE_DPO
  - name: Authority Notification
    stepOrder: 2
    approverRole: ROLE_DPO
"#,
            threshold
                .map(|t| format!("  escalationThresholdHours: {}\n", t))
                .unwrap_or_default()
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    fn instance_started_at(start: DateTime<Utc>) -> WorkflowInstance {
        WorkflowInstance::new("Breach Notification", EntityRef::new("DataBreach", "1"), start)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_assess_bands() {
        let wf = workflow(Some(60.0));
        let inst = instance_started_at(t0());

        assert_eq!(assess(&wf, &inst, t0() + Duration::hours(10)), SlaStatus::OnTrack);
        // 2/3 of 72h = 48h
        assert_eq!(assess(&wf, &inst, t0() + Duration::hours(48)), SlaStatus::Warning);
        assert_eq!(assess(&wf, &inst, t0() + Duration::hours(59)), SlaStatus::Warning);
        assert_eq!(assess(&wf, &inst, t0() + Duration::hours(60)), SlaStatus::Escalate);
    }

    #[test]
    fn test_default_threshold_is_deadline_minus_margin() {
        let wf = workflow(None);
        let inst = instance_started_at(t0());

        // 72 - 12 = 60
        assert_eq!(assess(&wf, &inst, t0() + Duration::hours(59)), SlaStatus::Warning);
        assert_eq!(assess(&wf, &inst, t0() + Duration::hours(61)), SlaStatus::Escalate);
    }

    #[test]
    fn test_unmonitored_without_sla() {
        let wf: Workflow = serde_yaml::from_str(
            "name: Plain\nentityType: Incident\nsteps:\n  - name: Review\n    stepOrder: 1\n    approverRole: ROLE_CISO\n",
        )
        .unwrap();
        let inst = instance_started_at(t0());
        assert_eq!(assess(&wf, &inst, t0() + Duration::days(30)), SlaStatus::Unmonitored);
    }

    #[tokio::test]
    async fn test_escalation_fires_once_per_step() {
        let wf = workflow(Some(60.0));
        let mut inst = instance_started_at(t0());
        let sink = Arc::new(MemoryNotificationSink::new());
        let monitor = SlaMonitor::new(sink.clone());

        let outcome = monitor
            .enforce(&wf, &mut inst, t0() + Duration::hours(61))
            .await
            .unwrap();
        assert!(outcome.escalated_now);
        assert_eq!(sink.count(), 1);
        assert!(inst.escalated_at_step(1));
        let entry = inst.approval_history.last().unwrap();
        assert!(entry.auto_escalation);
        assert_eq!(entry.trigger.as_deref(), Some(TRIGGER_SLA_ENFORCEMENT));

        // Later passes past the threshold do not re-escalate this step
        let outcome = monitor
            .enforce(&wf, &mut inst, t0() + Duration::hours(65))
            .await
            .unwrap();
        assert_eq!(outcome.status, SlaStatus::Escalate);
        assert!(!outcome.escalated_now);
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn test_escalation_can_fire_again_on_a_later_step() {
        let wf = workflow(Some(10.0));
        let mut inst = instance_started_at(t0());
        let sink = Arc::new(MemoryNotificationSink::new());
        let monitor = SlaMonitor::new(sink.clone());

        monitor
            .enforce(&wf, &mut inst, t0() + Duration::hours(11))
            .await
            .unwrap();
        assert_eq!(sink.count(), 1);

        // The step eventually advances; the next step gets its own escalation
        inst.advance_to(2);
        let outcome = monitor
            .enforce(&wf, &mut inst, t0() + Duration::hours(20))
            .await
            .unwrap();
        assert!(outcome.escalated_now);
        assert_eq!(sink.count(), 2);
    }

    #[tokio::test]
    async fn test_warning_band_sends_nothing() {
        let wf = workflow(Some(60.0));
        let mut inst = instance_started_at(t0());
        let sink = Arc::new(MemoryNotificationSink::new());
        let monitor = SlaMonitor::new(sink.clone());

        let outcome = monitor
            .enforce(&wf, &mut inst, t0() + Duration::hours(50))
            .await
            .unwrap();
        assert_eq!(outcome.status, SlaStatus::Warning);
        assert!(!outcome.escalated_now);
        assert_eq!(sink.count(), 0);
        assert!(inst.approval_history.is_empty());
    }
}

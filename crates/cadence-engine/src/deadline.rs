// Cadence Engine - Regulatory reporting deadlines
//
// Independent of workflow instances: a reporting deadline watches entities
// directly. Each deadline anchors on a timestamp field (e.g. detectedAt),
// grants a fixed number of hours, and fires reminders as descending
// thresholds are crossed, then a single overdue notice. Entities whose
// "reported" field is filled are left alone.
//
// Fired thresholds are tracked in a small state object the caller persists
// between runs, so a reminder never fires twice for the same entity.

use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::resolver::EntityResolverRegistry;
use cadence_core::{CadenceResult, EntityRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A named regulatory reporting obligation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingDeadline {
    /// Unique name, also the key for fired-state tracking
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Entity kind this deadline applies to
    pub entity_type: String,

    /// Timestamp field the clock starts from
    pub anchor_field: String,

    /// Hours granted from the anchor
    pub deadline_hours: f64,

    /// Reminder thresholds in hours-remaining, descending
    pub thresholds: Vec<f64>,

    /// Entities with this field filled have already reported
    pub reported_field: String,

    /// Role to notify
    pub notify_role: String,
}

/// NIS2-style defaults: a 24-hour early warning, a 72-hour incident
/// notification, and a 30-day final report, all anchored on detection
pub fn default_deadlines() -> Vec<ReportingDeadline> {
    vec![
        ReportingDeadline {
            name: "nis2-early-warning".to_string(),
            description: "NIS2 Art. 23 early warning within 24 hours of detection".to_string(),
            entity_type: "Incident".to_string(),
            anchor_field: "detectedAt".to_string(),
            deadline_hours: 24.0,
            thresholds: vec![4.0, 2.0, 1.0],
            reported_field: "earlyWarningSentAt".to_string(),
            notify_role: "ROLE_CISO".to_string(),
        },
        ReportingDeadline {
            name: "nis2-incident-notification".to_string(),
            description: "NIS2 Art. 23 incident notification within 72 hours of detection"
                .to_string(),
            entity_type: "Incident".to_string(),
            anchor_field: "detectedAt".to_string(),
            deadline_hours: 72.0,
            thresholds: vec![4.0, 2.0, 1.0],
            reported_field: "incidentNotificationSentAt".to_string(),
            notify_role: "ROLE_CISO".to_string(),
        },
        ReportingDeadline {
            name: "nis2-final-report".to_string(),
            description: "NIS2 Art. 23 final report within one month of detection".to_string(),
            entity_type: "Incident".to_string(),
            anchor_field: "detectedAt".to_string(),
            deadline_hours: 720.0,
            thresholds: vec![168.0, 72.0, 24.0],
            reported_field: "finalReportSentAt".to_string(),
            notify_role: "ROLE_CISO".to_string(),
        },
    ]
}

/// Which reminders already fired, per (deadline, entity)
///
/// Serialized as part of the runner's state file so reminders stay
/// at-most-once across process restarts.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DeadlineState {
    fired: HashMap<String, FiredRecord>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct FiredRecord {
    /// Threshold values (hours-remaining) already announced
    thresholds: Vec<f64>,
    overdue: bool,
}

impl DeadlineState {
    fn record(&mut self, deadline: &ReportingDeadline, entity: &EntityRef) -> &mut FiredRecord {
        self.fired
            .entry(format!("{}|{}", deadline.name, entity.entity_id))
            .or_default()
    }
}

/// What happened for one (deadline, entity) pair in a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineCheck {
    /// Already reported, or no usable anchor timestamp
    Skipped,
    /// Nothing new crossed
    Quiet,
    /// A reminder or overdue notice went out
    Notified,
}

/// Totals for one deadline pass
#[derive(Debug, Default, Clone)]
pub struct DeadlineRunSummary {
    pub checked: usize,
    pub notified: usize,
    pub skipped: usize,
    pub errored: usize,
}

impl std::fmt::Display for DeadlineRunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} checked, {} notified, {} skipped, {} errored",
            self.checked, self.notified, self.skipped, self.errored
        )
    }
}

/// Evaluates reporting deadlines and sends reminders
pub struct DeadlineMonitor {
    deadlines: Vec<ReportingDeadline>,
    resolvers: Arc<EntityResolverRegistry>,
    notifier: Arc<dyn NotificationSink>,
}

impl DeadlineMonitor {
    pub fn new(
        deadlines: Vec<ReportingDeadline>,
        resolvers: Arc<EntityResolverRegistry>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            deadlines,
            resolvers,
            notifier,
        }
    }

    pub fn deadlines(&self) -> &[ReportingDeadline] {
        &self.deadlines
    }

    /// Check every configured deadline against the given entities
    pub async fn run(
        &self,
        entities: &[EntityRef],
        state: &mut DeadlineState,
        now: DateTime<Utc>,
    ) -> DeadlineRunSummary {
        let mut summary = DeadlineRunSummary::default();

        for deadline in &self.deadlines {
            for entity in entities
                .iter()
                .filter(|e| e.entity_type == deadline.entity_type)
            {
                summary.checked += 1;
                match self.check(deadline, entity, state, now).await {
                    Ok(DeadlineCheck::Notified) => summary.notified += 1,
                    Ok(DeadlineCheck::Skipped) => summary.skipped += 1,
                    Ok(DeadlineCheck::Quiet) => {}
                    Err(e) => {
                        tracing::warn!(
                            deadline = %deadline.name,
                            entity = %entity,
                            error = %e,
                            "Deadline check failed"
                        );
                        summary.errored += 1;
                    }
                }
            }
        }

        summary
    }

    /// Check one deadline against one entity
    pub async fn check(
        &self,
        deadline: &ReportingDeadline,
        entity: &EntityRef,
        state: &mut DeadlineState,
        now: DateTime<Utc>,
    ) -> CadenceResult<DeadlineCheck> {
        let snapshot = self.resolvers.snapshot(entity).await?;

        if snapshot.is_filled(&deadline.reported_field) {
            return Ok(DeadlineCheck::Skipped);
        }

        let Some(anchor) = snapshot.get_datetime(&deadline.anchor_field) else {
            tracing::debug!(
                deadline = %deadline.name,
                entity = %entity,
                field = %deadline.anchor_field,
                "No usable anchor timestamp; skipping"
            );
            return Ok(DeadlineCheck::Skipped);
        };

        let deadline_at = anchor + chrono::Duration::minutes((deadline.deadline_hours * 60.0) as i64);
        let remaining_hours = (deadline_at - now).num_seconds() as f64 / 3600.0;
        let record = state.record(deadline, entity);

        if remaining_hours <= 0.0 {
            if record.overdue {
                return Ok(DeadlineCheck::Quiet);
            }
            record.overdue = true;
            // Overdue supersedes any reminder thresholds still outstanding
            record.thresholds = deadline.thresholds.clone();

            self.notifier
                .send(Notification {
                    kind: NotificationKind::DeadlineOverdue,
                    role: deadline.notify_role.clone(),
                    subject: format!("OVERDUE: {}", deadline.name),
                    body: format!(
                        "{} for {} was due at {}",
                        deadline.description, entity, deadline_at
                    ),
                    entity: entity.clone(),
                    instance_id: None,
                    sent_at: now,
                })
                .await?;
            return Ok(DeadlineCheck::Notified);
        }

        // All thresholds crossed since the last pass collapse into one
        // reminder for the most urgent of them
        let crossed: Vec<f64> = deadline
            .thresholds
            .iter()
            .copied()
            .filter(|t| remaining_hours <= *t && !record.thresholds.contains(t))
            .collect();

        if crossed.is_empty() {
            return Ok(DeadlineCheck::Quiet);
        }

        let most_urgent = crossed.iter().copied().fold(f64::INFINITY, f64::min);
        record.thresholds.extend(crossed);

        self.notifier
            .send(Notification {
                kind: NotificationKind::DeadlineReminder,
                role: deadline.notify_role.clone(),
                subject: format!(
                    "Reminder: {} due in under {} hours",
                    deadline.name, most_urgent
                ),
                body: format!(
                    "{} for {}: {:.1} hours remaining (due {})",
                    deadline.description, entity, remaining_hours, deadline_at
                ),
                entity: entity.clone(),
                instance_id: None,
                sent_at: now,
            })
            .await?;
        Ok(DeadlineCheck::Notified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryNotificationSink;
    use crate::resolver::MemoryEntityResolver;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn setup(entity_json: serde_json::Value) -> (DeadlineMonitor, Arc<MemoryNotificationSink>) {
        let incidents = MemoryEntityResolver::new();
        incidents.insert("1", serde_json::from_value(entity_json).unwrap());

        let mut resolvers = EntityResolverRegistry::new();
        resolvers.register("Incident", Arc::new(incidents));

        let sink = Arc::new(MemoryNotificationSink::new());
        let monitor = DeadlineMonitor::new(
            default_deadlines(),
            Arc::new(resolvers),
            sink.clone(),
        );
        (monitor, sink)
    }

    fn early_warning() -> ReportingDeadline {
        default_deadlines().remove(0)
    }

    #[tokio::test]
    async fn test_thresholds_fire_once_in_order() {
        // Incident detected at t0; the 24h early warning is due at t0+24h
        let (monitor, sink) = setup(json!({"detectedAt": "2025-03-01T00:00:00Z"}));
        let deadline = early_warning();
        let entity = EntityRef::new("Incident", "1");
        let mut state = DeadlineState::default();

        // 5 hours remaining: no threshold crossed yet
        let check = monitor
            .check(&deadline, &entity, &mut state, t0() + Duration::hours(19))
            .await
            .unwrap();
        assert_eq!(check, DeadlineCheck::Quiet);

        // 4 hours remaining: first reminder
        let check = monitor
            .check(&deadline, &entity, &mut state, t0() + Duration::hours(20))
            .await
            .unwrap();
        assert_eq!(check, DeadlineCheck::Notified);

        // Same threshold again: quiet
        let check = monitor
            .check(&deadline, &entity, &mut state, t0() + Duration::minutes(20 * 60 + 30))
            .await
            .unwrap();
        assert_eq!(check, DeadlineCheck::Quiet);

        // 2 hours remaining: second reminder
        let check = monitor
            .check(&deadline, &entity, &mut state, t0() + Duration::hours(22))
            .await
            .unwrap();
        assert_eq!(check, DeadlineCheck::Notified);

        // 1 hour remaining: third reminder
        let check = monitor
            .check(&deadline, &entity, &mut state, t0() + Duration::hours(23))
            .await
            .unwrap();
        assert_eq!(check, DeadlineCheck::Notified);

        // Past due: one overdue notice, then quiet forever
        let check = monitor
            .check(&deadline, &entity, &mut state, t0() + Duration::hours(25))
            .await
            .unwrap();
        assert_eq!(check, DeadlineCheck::Notified);
        let check = monitor
            .check(&deadline, &entity, &mut state, t0() + Duration::hours(48))
            .await
            .unwrap();
        assert_eq!(check, DeadlineCheck::Quiet);

        assert_eq!(sink.count(), 4);
        assert_eq!(
            sink.sent().last().unwrap().kind,
            NotificationKind::DeadlineOverdue
        );
    }

    #[tokio::test]
    async fn test_multiple_crossings_collapse_into_one_reminder() {
        let (monitor, sink) = setup(json!({"detectedAt": "2025-03-01T00:00:00Z"}));
        let deadline = early_warning();
        let entity = EntityRef::new("Incident", "1");
        let mut state = DeadlineState::default();

        // First pass happens with only 90 minutes left: the 4h and 2h
        // thresholds were both crossed in the meantime, one reminder goes
        // out, citing the most urgent
        let check = monitor
            .check(&deadline, &entity, &mut state, t0() + Duration::minutes(22 * 60 + 30))
            .await
            .unwrap();
        assert_eq!(check, DeadlineCheck::Notified);
        assert_eq!(sink.count(), 1);
        assert!(sink.sent()[0].subject.contains("2 hours"));

        // The 1h threshold still gets its own reminder later
        let check = monitor
            .check(&deadline, &entity, &mut state, t0() + Duration::minutes(23 * 60 + 30))
            .await
            .unwrap();
        assert_eq!(check, DeadlineCheck::Notified);
        assert_eq!(sink.count(), 2);
    }

    #[tokio::test]
    async fn test_reported_entities_are_skipped() {
        let (monitor, sink) = setup(json!({
            "detectedAt": "2025-03-01T00:00:00Z",
            "earlyWarningSentAt": "2025-03-01T05:00:00Z"
        }));
        let deadline = early_warning();
        let entity = EntityRef::new("Incident", "1");
        let mut state = DeadlineState::default();

        let check = monitor
            .check(&deadline, &entity, &mut state, t0() + Duration::hours(23))
            .await
            .unwrap();
        assert_eq!(check, DeadlineCheck::Skipped);
        assert_eq!(sink.count(), 0);
    }

    #[tokio::test]
    async fn test_missing_anchor_is_skipped() {
        let (monitor, sink) = setup(json!({"severity": "high"}));
        let deadline = early_warning();
        let entity = EntityRef::new("Incident", "1");
        let mut state = DeadlineState::default();

        let check = monitor
            .check(&deadline, &entity, &mut state, t0())
            .await
            .unwrap();
        assert_eq!(check, DeadlineCheck::Skipped);
        assert_eq!(sink.count(), 0);
    }

    #[tokio::test]
    async fn test_run_filters_by_entity_type_and_isolates_errors() {
        let (monitor, _sink) = setup(json!({"detectedAt": "2025-03-01T00:00:00Z"}));
        let mut state = DeadlineState::default();

        let entities = vec![
            EntityRef::new("Incident", "1"),
            // No resolver entry; errors are counted, not fatal
            EntityRef::new("Incident", "ghost"),
            // Wrong type: not checked at all
            EntityRef::new("Risk", "9"),
        ];

        let summary = monitor
            .run(&entities, &mut state, t0() + Duration::hours(20))
            .await;
        // Three deadlines x two Incident entities
        assert_eq!(summary.checked, 6);
        assert_eq!(summary.errored, 3);
        // Only the early warning has a threshold crossed at 4h remaining
        assert_eq!(summary.notified, 1);
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let mut state = DeadlineState::default();
        let deadline = early_warning();
        let entity = EntityRef::new("Incident", "1");
        let record = state.record(&deadline, &entity);
        record.thresholds.push(4.0);
        record.overdue = false;

        let json = serde_json::to_string(&state).unwrap();
        let back: DeadlineState = serde_json::from_str(&json).unwrap();
        let record = back.fired.get("nis2-early-warning|1").unwrap();
        assert_eq!(record.thresholds, vec![4.0]);
    }
}

// Cadence Engine - Notification dispatch
//
// Everything the engine tells humans about goes through one sink trait:
// step notifications, SLA escalations, and reporting-deadline reminders.
// Delivery failures are reported to the caller, which logs and counts them
// without aborting the batch.

use async_trait::async_trait;
use cadence_core::{CadenceResult, EntityRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A notification step fired
    StepNotification,
    /// SLA escalation, aimed at the escalation role
    SlaEscalation,
    /// Regulatory reporting deadline approaching
    DeadlineReminder,
    /// Regulatory reporting deadline missed
    DeadlineOverdue,
}

/// One outbound notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,

    /// Target role; members are resolved by the delivery layer
    pub role: String,

    pub subject: String,

    pub body: String,

    /// The governed entity the notification is about
    #[serde(flatten)]
    pub entity: EntityRef,

    /// Workflow instance, when one is involved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<Uuid>,

    pub sent_at: DateTime<Utc>,
}

/// Outbound notification channel
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: Notification) -> CadenceResult<()>;
}

/// Sink that logs notifications instead of delivering them.
/// The default for CLI runs without a configured channel.
#[derive(Debug, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn send(&self, notification: Notification) -> CadenceResult<()> {
        tracing::info!(
            kind = ?notification.kind,
            role = %notification.role,
            entity = %notification.entity,
            subject = %notification.subject,
            "Notification"
        );
        Ok(())
    }
}

/// Sink that records notifications in memory; used in tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryNotificationSink {
    sent: std::sync::Mutex<Vec<Notification>>,
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("sink mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().expect("sink mutex poisoned").len()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn send(&self, notification: Notification) -> CadenceResult<()> {
        self.sent
            .lock()
            .expect("sink mutex poisoned")
            .push(notification);
        Ok(())
    }
}

//! Cadence Engine - Time-driven workflow execution
//!
//! Drives workflow instances forward without anyone watching:
//! - Condition evaluation (field completion, risk appetite, time delays)
//! - Auto-progression with chained advancement and optional-step skipping
//! - SLA monitoring with at-most-once escalation per step
//! - Regulatory reporting deadlines with threshold reminders
//! - Batch passes at an explicit instant, for reproducible runs
//!
//! The engine reaches external systems only through traits: entity
//! resolvers for governed records, an instance store for persistence, and
//! a notification sink for everything aimed at humans.

pub mod batch;
pub mod deadline;
pub mod evaluator;
pub mod notify;
pub mod progression;
pub mod resolver;
pub mod sla;
pub mod store;

pub use batch::{BatchRunner, RunSummary};
pub use deadline::{
    default_deadlines, DeadlineCheck, DeadlineMonitor, DeadlineRunSummary, DeadlineState,
    ReportingDeadline,
};
pub use evaluator::{ConditionEvaluator, ConditionOutcome};
pub use notify::{
    LogNotificationSink, MemoryNotificationSink, Notification, NotificationKind, NotificationSink,
};
pub use progression::WorkflowEngine;
pub use resolver::{
    EntityResolver, EntityResolverRegistry, FileEntityResolver, MemoryEntityResolver,
    RiskAppetiteProvider, RoleResolver, StaticRiskAppetite, StaticRoleResolver,
};
pub use sla::{assess, SlaMonitor, SlaOutcome, SlaStatus};
pub use store::{FileInstanceStore, InstanceStore, MemoryInstanceStore};

//! Cadence Core - Workflow definitions, instances, and conditions
//!
//! Core types for the Cadence time-driven workflow engine:
//! - Workflow templates and steps (YAML-defined approval chains)
//! - Workflow instances with append-only approval history
//! - Auto-progression conditions and the condition expression language
//! - Template registry with directory loading
//!
//! This crate holds data types and parsing only; evaluation and progression
//! live in `cadence-engine`.

pub mod condition;
pub mod entity;
pub mod error;
pub mod instance;
pub mod registry;
pub mod workflow;

// Re-export commonly used types
pub use condition::{AutoProgressCondition, ConditionExpr, Delay};
pub use entity::{EntityRef, EntitySnapshot};
pub use error::{CadenceError, CadenceResult};
pub use instance::{HistoryAction, HistoryEntry, InstanceStatus, WorkflowInstance};
pub use registry::WorkflowRegistry;
pub use workflow::{SlaConfig, StepType, Workflow, WorkflowStep};

// Cadence Engine - Timed batch processing
//
// One pass over every active instance at an explicit instant. Time is a
// parameter, never read from the wall clock inside the engine, so runs are
// reproducible and testable at any simulated moment. Each instance is
// processed in isolation: a failure is logged and counted, and the pass
// moves on.
//
// Per instance, SLA enforcement runs first. An escalation recorded in this
// pass suppresses auto-progression for the instance until the next pass.

use crate::notify::NotificationSink;
use crate::progression::WorkflowEngine;
use crate::sla::SlaMonitor;
use cadence_core::{CadenceError, CadenceResult, WorkflowInstance};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// What a pass did to a single instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickAction {
    Progressed,
    Escalated,
    Untouched,
}

/// Totals for one timed pass
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    /// Active instances examined
    pub processed: usize,
    /// Instances that advanced at least one step
    pub auto_progressed: usize,
    /// Instances escalated in this pass
    pub escalated: usize,
    /// Instances examined but left unchanged
    pub skipped: usize,
    /// Instances that could not be processed
    pub errored: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed: {} auto-progressed, {} escalated, {} unchanged, {} errored",
            self.processed, self.auto_progressed, self.escalated, self.skipped, self.errored
        )
    }
}

/// Runs timed passes over the active instance set
pub struct BatchRunner {
    engine: Arc<WorkflowEngine>,
    sla: SlaMonitor,
}

impl BatchRunner {
    pub fn new(engine: Arc<WorkflowEngine>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            engine,
            sla: SlaMonitor::new(notifier),
        }
    }

    /// Process every active instance as of `now`.
    ///
    /// Failing to load the active set is the one run-level error; every
    /// per-instance failure is logged and counted instead.
    pub async fn run(&self, now: DateTime<Utc>) -> CadenceResult<RunSummary> {
        let mut summary = RunSummary::default();

        let instances = self.engine.store().find_active().await?;

        tracing::info!(count = instances.len(), %now, "Processing active workflow instances");

        for mut instance in instances {
            summary.processed += 1;
            match self.process_one(&mut instance, now).await {
                Ok(TickAction::Progressed) => summary.auto_progressed += 1,
                Ok(TickAction::Escalated) => summary.escalated += 1,
                Ok(TickAction::Untouched) => summary.skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        instance = %instance.id,
                        entity = %instance.entity,
                        error = %e,
                        "Instance processing failed"
                    );
                    summary.errored += 1;
                }
            }
        }

        tracing::info!(%summary, "Timed pass finished");
        Ok(summary)
    }

    async fn process_one(
        &self,
        instance: &mut WorkflowInstance,
        now: DateTime<Utc>,
    ) -> CadenceResult<TickAction> {
        let workflow = self
            .engine
            .registry()
            .get(&instance.workflow_name)
            .ok_or_else(|| {
                CadenceError::workflow(format!(
                    "workflow '{}' is no longer registered",
                    instance.workflow_name
                ))
            })?;

        // A non-terminal instance without a step pointer is corrupt state
        // left by an older bug; repair it instead of carrying it forever
        if instance.current_step.is_none() {
            tracing::error!(
                instance = %instance.id,
                status = %instance.status,
                "Active instance has no current step; marking completed"
            );
            instance.finish(cadence_core::InstanceStatus::Completed, now);
            self.engine.store().update(instance).await?;
            return Ok(TickAction::Progressed);
        }

        let sla = self.sla.enforce(workflow, instance, now).await?;
        if sla.escalated_now {
            self.engine.store().update(instance).await?;
            return Ok(TickAction::Escalated);
        }

        let advanced = self.engine.auto_progress(workflow, instance, now).await?;
        if advanced > 0 {
            self.engine.store().update(instance).await?;
            Ok(TickAction::Progressed)
        } else {
            Ok(TickAction::Untouched)
        }
    }
}

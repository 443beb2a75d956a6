// Cadence Engine - Workflow progression
//
// One engine owns both sides of step traversal: manual operations
// (start, approve, reject, cancel) and condition-driven auto-progression.
// Auto-progression is chained within a single evaluation pass, so an
// approval can cascade through consecutive satisfied steps at once, and
// re-running a pass at the same instant is a no-op.

use crate::evaluator::{ConditionEvaluator, ConditionOutcome};
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::resolver::{EntityResolverRegistry, RiskAppetiteProvider, RoleResolver};
use crate::store::InstanceStore;
use cadence_core::{
    CadenceError, CadenceResult, EntityRef, HistoryAction, HistoryEntry, InstanceStatus, StepType,
    Workflow, WorkflowInstance, WorkflowRegistry,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Trigger strings recorded on automatic history entries
pub const TRIGGER_CONDITIONS_MET: &str = "conditions_met";
pub const TRIGGER_STEP_SKIPPED: &str = "step_skipped";
pub const TRIGGER_NOTIFICATION_SENT: &str = "notification_sent";

/// Actor recorded for engine-driven actions
pub const SYSTEM_ACTOR: &str = "system";

/// Drives workflow instances through their steps
pub struct WorkflowEngine {
    registry: Arc<WorkflowRegistry>,
    store: Arc<dyn InstanceStore>,
    resolvers: Arc<EntityResolverRegistry>,
    evaluator: ConditionEvaluator,
    notifier: Arc<dyn NotificationSink>,
    roles: Option<Arc<dyn RoleResolver>>,
}

impl WorkflowEngine {
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        store: Arc<dyn InstanceStore>,
        resolvers: Arc<EntityResolverRegistry>,
        risk_appetite: Arc<dyn RiskAppetiteProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            registry,
            store,
            resolvers,
            evaluator: ConditionEvaluator::new(risk_appetite),
            notifier,
            roles: None,
        }
    }

    /// Enforce role membership on manual approvals.
    ///
    /// Without a role resolver anyone may approve; with one, only members
    /// of a step's approver role can.
    pub fn with_role_resolver(mut self, roles: Arc<dyn RoleResolver>) -> Self {
        self.roles = Some(roles);
        self
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn InstanceStore> {
        &self.store
    }

    /// Start a workflow against an entity.
    ///
    /// Fails when the template is unknown or inactive, governs a different
    /// entity type, the entity cannot be resolved, or an active instance of
    /// the same workflow already exists for the entity.
    pub async fn start_workflow(
        &self,
        workflow_name: &str,
        entity: EntityRef,
        now: DateTime<Utc>,
    ) -> CadenceResult<WorkflowInstance> {
        let workflow = self.registry.get(workflow_name).ok_or_else(|| {
            CadenceError::workflow(format!("unknown workflow '{}'", workflow_name))
        })?;
        if !workflow.is_active {
            return Err(CadenceError::workflow(format!(
                "workflow '{}' is inactive",
                workflow_name
            )));
        }
        if workflow.entity_type != entity.entity_type {
            return Err(CadenceError::workflow(format!(
                "workflow '{}' governs {} entities, not {}",
                workflow_name, workflow.entity_type, entity.entity_type
            )));
        }

        let existing = self.store.find_for_entity(&entity).await?;
        if existing
            .iter()
            .any(|i| i.workflow_name == workflow_name && !i.is_terminal())
        {
            return Err(CadenceError::workflow(format!(
                "entity {} already has an active '{}' instance",
                entity, workflow_name
            )));
        }

        // The entity must exist before we start governing it
        self.resolvers.snapshot(&entity).await?;

        let mut instance = WorkflowInstance::new(workflow_name, entity, now);
        instance.due_date = due_date(workflow, now);

        tracing::info!(
            workflow = %workflow_name,
            entity = %instance.entity,
            instance = %instance.id,
            "Workflow started"
        );
        self.store.insert(instance.clone()).await?;

        // Leading auto/notification steps fire immediately. A failure in
        // the chain must not lose the created instance; the next timed run
        // picks the evaluation up.
        match self.auto_progress(workflow, &mut instance, now).await {
            Ok(advanced) if advanced > 0 => self.store.update(&mut instance).await?,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    instance = %instance.id,
                    error = %e,
                    "Auto-progression after start failed; deferring to next run"
                );
            }
        }

        Ok(instance)
    }

    /// Record a manual approval on the current step and advance.
    ///
    /// Subsequent steps whose conditions are already satisfied advance in
    /// the same call.
    pub async fn approve_step(
        &self,
        instance_id: Uuid,
        actor: &str,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> CadenceResult<WorkflowInstance> {
        let (workflow, mut instance, order) = self.load_actionable(instance_id).await?;
        let step = current_step(workflow, order, &instance)?;

        if step.step_type != StepType::Approval {
            return Err(CadenceError::workflow(format!(
                "step '{}' is a notification step and cannot be approved",
                step.name
            )));
        }
        self.check_approver(actor, &step.approver_role).await?;

        let mut entry = HistoryEntry::new(order, &step.name, HistoryAction::Approved, actor, now);
        if let Some(comment) = comment {
            entry = entry.with_comment(comment);
        }
        instance.record(entry);
        advance_from(workflow, &mut instance, order, now);

        // A failed follow-up evaluation must not lose the approval itself;
        // the next timed run retries the automatic part.
        if let Err(e) = self.auto_progress(workflow, &mut instance, now).await {
            tracing::warn!(
                instance = %instance.id,
                error = %e,
                "Auto-progression after approval failed; deferring to next run"
            );
        }

        self.store.update(&mut instance).await?;
        Ok(instance)
    }

    /// Record a rejection on the current step and terminate the instance
    pub async fn reject_step(
        &self,
        instance_id: Uuid,
        actor: &str,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> CadenceResult<WorkflowInstance> {
        let (workflow, mut instance, order) = self.load_actionable(instance_id).await?;
        let step = current_step(workflow, order, &instance)?;
        self.check_approver(actor, &step.approver_role).await?;

        let mut entry = HistoryEntry::new(order, &step.name, HistoryAction::Rejected, actor, now);
        if let Some(comment) = comment {
            entry = entry.with_comment(comment);
        }
        instance.record(entry);
        instance.finish(InstanceStatus::Rejected, now);

        self.store.update(&mut instance).await?;
        Ok(instance)
    }

    /// Cancel a running instance
    pub async fn cancel(
        &self,
        instance_id: Uuid,
        now: DateTime<Utc>,
    ) -> CadenceResult<WorkflowInstance> {
        let mut instance = self.load_instance(instance_id).await?;
        if instance.is_terminal() {
            return Err(CadenceError::workflow(format!(
                "instance {} is already {}",
                instance_id, instance.status
            )));
        }
        instance.finish(InstanceStatus::Cancelled, now);
        self.store.update(&mut instance).await?;
        Ok(instance)
    }

    /// Evaluate and advance the instance as far as conditions allow.
    ///
    /// Returns the number of steps advanced (including skips). Does not
    /// persist; callers update the store after a successful pass.
    pub async fn auto_progress(
        &self,
        workflow: &Workflow,
        instance: &mut WorkflowInstance,
        now: DateTime<Utc>,
    ) -> CadenceResult<u32> {
        let mut advanced = 0u32;

        while !instance.is_terminal() {
            let Some(order) = instance.current_step else {
                break;
            };
            let step = current_step(workflow, order, instance)?;

            // No condition means manual-only: never advanced, never skipped
            let Some(condition) = &step.auto_progress_conditions else {
                break;
            };

            let snapshot = self.resolvers.snapshot(&instance.entity).await?;
            let outcome = self
                .evaluator
                .evaluate(
                    condition,
                    &instance.entity.entity_type,
                    &snapshot,
                    instance.step_started_at(),
                    now,
                )
                .await?;

            match outcome {
                ConditionOutcome::Satisfied => {
                    match step.step_type {
                        StepType::Notification => {
                            self.notifier
                                .send(Notification {
                                    kind: NotificationKind::StepNotification,
                                    role: step.approver_role.clone(),
                                    subject: format!("Workflow step: {}", step.name),
                                    body: step.description.clone(),
                                    entity: instance.entity.clone(),
                                    instance_id: Some(instance.id),
                                    sent_at: now,
                                })
                                .await?;
                            instance.record(
                                HistoryEntry::new(
                                    order,
                                    &step.name,
                                    HistoryAction::Notified,
                                    SYSTEM_ACTOR,
                                    now,
                                )
                                .with_trigger(TRIGGER_NOTIFICATION_SENT),
                            );
                        }
                        StepType::Approval => {
                            instance.record(
                                HistoryEntry::new(
                                    order,
                                    &step.name,
                                    HistoryAction::AutoProgressed,
                                    SYSTEM_ACTOR,
                                    now,
                                )
                                .with_trigger(TRIGGER_CONDITIONS_MET),
                            );
                        }
                    }
                    tracing::info!(
                        instance = %instance.id,
                        step = %step.name,
                        "Step auto-progressed"
                    );
                    advance_from(workflow, instance, order, now);
                    advanced += 1;
                }

                ConditionOutcome::NotApplicable if !step.is_required => {
                    instance.record(
                        HistoryEntry::new(
                            order,
                            &step.name,
                            HistoryAction::AutoProgressed,
                            SYSTEM_ACTOR,
                            now,
                        )
                        .with_trigger(TRIGGER_STEP_SKIPPED),
                    );
                    tracing::info!(
                        instance = %instance.id,
                        step = %step.name,
                        "Optional step skipped"
                    );
                    advance_from(workflow, instance, order, now);
                    advanced += 1;
                }

                // Pending, or a required step whose condition does not apply
                _ => break,
            }
        }

        Ok(advanced)
    }

    /// Verify the actor may act for the step's approver role
    async fn check_approver(&self, actor: &str, approver_role: &str) -> CadenceResult<()> {
        let Some(roles) = &self.roles else {
            return Ok(());
        };
        let members = roles.members_of(approver_role).await?;
        if members.iter().any(|m| m == actor) {
            Ok(())
        } else {
            Err(CadenceError::workflow(format!(
                "'{}' is not a member of {}",
                actor, approver_role
            )))
        }
    }

    async fn load_instance(&self, instance_id: Uuid) -> CadenceResult<WorkflowInstance> {
        self.store
            .get(instance_id)
            .await?
            .ok_or_else(|| CadenceError::workflow(format!("unknown instance {}", instance_id)))
    }

    /// Load an instance that can be acted on, with its template and the
    /// order of its current step
    async fn load_actionable(
        &self,
        instance_id: Uuid,
    ) -> CadenceResult<(&Workflow, WorkflowInstance, u32)> {
        let instance = self.load_instance(instance_id).await?;
        if instance.is_terminal() {
            return Err(CadenceError::workflow(format!(
                "instance {} is already {}",
                instance_id, instance.status
            )));
        }
        let workflow = self.registry.get(&instance.workflow_name).ok_or_else(|| {
            CadenceError::workflow(format!(
                "workflow '{}' is no longer registered",
                instance.workflow_name
            ))
        })?;
        let order = instance.current_step.ok_or_else(|| {
            CadenceError::workflow(format!("instance {} has no current step", instance_id))
        })?;
        Ok((workflow, instance, order))
    }
}

/// Resolve the template step behind the instance's pointer
fn current_step<'a>(
    workflow: &'a Workflow,
    order: u32,
    instance: &WorkflowInstance,
) -> CadenceResult<&'a cadence_core::WorkflowStep> {
    workflow.step(order).ok_or_else(|| {
        CadenceError::workflow(format!(
            "instance {} points at step {} which '{}' does not have",
            instance.id, order, workflow.name
        ))
    })
}

/// Move past `order`: on to the next step, or complete the instance
fn advance_from(workflow: &Workflow, instance: &mut WorkflowInstance, order: u32, now: DateTime<Utc>) {
    match workflow.next_step(order) {
        Some(next) => instance.advance_to(next.step_order),
        None => {
            instance.finish(InstanceStatus::Completed, now);
            tracing::info!(instance = %instance.id, "Workflow completed");
        }
    }
}

/// SLA due date from template metadata, falling back to the first step's
/// day budget
fn due_date(workflow: &Workflow, started_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let hours = workflow
        .sla_deadline_hours()
        .or_else(|| workflow.first_step().map(|s| s.days_to_complete * 24.0))?;
    Some(started_at + chrono::Duration::minutes((hours * 60.0).round() as i64))
}

// Cadence Engine - Condition evaluation
//
// Evaluates a step's auto-progression condition against an entity snapshot
// at a given instant. The result is three-valued: a condition can be
// satisfied, still pending, or not applicable to this instance at all.
// Only "not applicable" may skip a non-required step; "pending" always
// keeps the step waiting.

use crate::resolver::RiskAppetiteProvider;
use cadence_core::{AutoProgressCondition, CadenceResult, EntitySnapshot};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Three-valued result of evaluating an auto-progression condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOutcome {
    /// The step may auto-progress now
    Satisfied,
    /// The condition applies but does not hold yet; keep waiting
    Pending,
    /// The condition's gate rules this step out for this instance;
    /// a non-required step may be skipped
    NotApplicable,
}

/// Evaluates auto-progression conditions
///
/// Pure in time and data: the same snapshot, step start, and `now` always
/// produce the same outcome. Anything missing or unparseable degrades to
/// `Pending`, never to `Satisfied`.
pub struct ConditionEvaluator {
    risk_appetite: Arc<dyn RiskAppetiteProvider>,
}

impl ConditionEvaluator {
    pub fn new(risk_appetite: Arc<dyn RiskAppetiteProvider>) -> Self {
        Self { risk_appetite }
    }

    pub async fn evaluate(
        &self,
        condition: &AutoProgressCondition,
        entity_type: &str,
        snapshot: &EntitySnapshot,
        step_started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CadenceResult<ConditionOutcome> {
        match condition {
            AutoProgressCondition::FieldCompletion {
                entity,
                fields,
                condition,
            } => {
                if !entity_type_matches(entity.as_deref(), entity_type) {
                    return Ok(ConditionOutcome::NotApplicable);
                }
                if let Some(expr) = condition {
                    if !expr.evaluate(snapshot) {
                        return Ok(ConditionOutcome::NotApplicable);
                    }
                }
                if fields.iter().all(|f| snapshot.is_filled(f)) {
                    Ok(ConditionOutcome::Satisfied)
                } else {
                    Ok(ConditionOutcome::Pending)
                }
            }

            AutoProgressCondition::RiskAppetite {
                entity,
                risk_score_field,
                category_field,
            } => {
                if !entity_type_matches(entity.as_deref(), entity_type) {
                    return Ok(ConditionOutcome::NotApplicable);
                }

                // Missing score or missing appetite keeps the step pending;
                // risk acceptance is never skipped for lack of data
                let Some(score) = snapshot.get_number(risk_score_field) else {
                    tracing::debug!(
                        field = %risk_score_field,
                        "Risk score missing or non-numeric; keeping step pending"
                    );
                    return Ok(ConditionOutcome::Pending);
                };

                let category = category_field
                    .as_deref()
                    .and_then(|f| snapshot.get_str(f));
                let Some(bound) = self.risk_appetite.max_acceptable_risk(category).await? else {
                    tracing::debug!("No risk appetite configured; keeping step pending");
                    return Ok(ConditionOutcome::Pending);
                };

                if score <= bound {
                    Ok(ConditionOutcome::Satisfied)
                } else {
                    Ok(ConditionOutcome::Pending)
                }
            }

            AutoProgressCondition::TimeBased { delay, condition } => {
                if let Some(expr) = condition {
                    if !expr.evaluate(snapshot) {
                        return Ok(ConditionOutcome::NotApplicable);
                    }
                }
                // An unparseable delay never fires
                let Some(duration) = delay.duration() else {
                    tracing::warn!(
                        delay = %delay.as_str(),
                        "Unparseable delay on time-based condition; keeping step pending"
                    );
                    return Ok(ConditionOutcome::Pending);
                };

                if now >= step_started_at + duration {
                    Ok(ConditionOutcome::Satisfied)
                } else {
                    Ok(ConditionOutcome::Pending)
                }
            }

            AutoProgressCondition::Auto { condition } => match condition {
                Some(expr) if !expr.evaluate(snapshot) => Ok(ConditionOutcome::NotApplicable),
                _ => Ok(ConditionOutcome::Satisfied),
            },
        }
    }
}

/// An absent entity constraint matches any type
fn entity_type_matches(expected: Option<&str>, actual: &str) -> bool {
    expected.map_or(true, |e| e == actual)
}

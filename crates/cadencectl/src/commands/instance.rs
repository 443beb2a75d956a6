// Manual instance operations: approve, reject, cancel.

use super::App;
use anyhow::Result;
use cadence_core::WorkflowInstance;
use chrono::Utc;
use uuid::Uuid;

pub async fn approve(app: &App, instance: &str, actor: &str, comment: Option<String>) -> Result<()> {
    let id: Uuid = instance.parse()?;
    let instance = app.engine.approve_step(id, actor, comment, Utc::now()).await?;
    print_outcome("Approved", &instance);
    Ok(())
}

pub async fn reject(app: &App, instance: &str, actor: &str, comment: Option<String>) -> Result<()> {
    let id: Uuid = instance.parse()?;
    let instance = app.engine.reject_step(id, actor, comment, Utc::now()).await?;
    print_outcome("Rejected", &instance);
    Ok(())
}

pub async fn cancel(app: &App, instance: &str) -> Result<()> {
    let id: Uuid = instance.parse()?;
    let instance = app.engine.cancel(id, Utc::now()).await?;
    print_outcome("Cancelled", &instance);
    Ok(())
}

fn print_outcome(verb: &str, instance: &WorkflowInstance) {
    println!("{} instance {}", verb, instance.id);
    println!("  status: {}", instance.status);
    if let Some(step) = instance.current_step {
        println!("  current step: {}", step);
    }
}

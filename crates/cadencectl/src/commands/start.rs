use super::App;
use anyhow::Result;
use cadence_core::EntityRef;
use chrono::Utc;

/// Start a workflow against an entity
pub async fn execute(app: &App, workflow: &str, entity_type: &str, entity_id: &str) -> Result<()> {
    let entity = EntityRef::new(entity_type, entity_id);
    let instance = app
        .engine
        .start_workflow(workflow, entity, Utc::now())
        .await?;

    println!("Started '{}' for {}", instance.workflow_name, instance.entity);
    println!("  instance: {}", instance.id);
    match instance.current_step {
        Some(step) => println!("  current step: {}", step),
        None => println!("  status: {}", instance.status),
    }
    if let Some(due) = instance.due_date {
        println!("  due: {}", due.format("%Y-%m-%d %H:%M UTC"));
    }
    Ok(())
}

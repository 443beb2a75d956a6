use super::App;
use anyhow::Result;
use cadence_engine::{
    BatchRunner, InstanceStore, MemoryInstanceStore, MemoryNotificationSink, WorkflowEngine,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Run one timed pass over all active instances
pub async fn execute(app: &App, now: DateTime<Utc>, dry_run: bool) -> Result<()> {
    if dry_run {
        // Run against an in-memory copy of the state and a recording sink;
        // nothing is persisted or delivered
        let copy = Arc::new(MemoryInstanceStore::preloaded(app.store.find_all().await?));
        let sink = Arc::new(MemoryNotificationSink::new());
        let engine = Arc::new(WorkflowEngine::new(
            app.registry.clone(),
            copy,
            app.resolvers.clone(),
            app.risk_appetite.clone(),
            sink.clone(),
        ));
        let summary = BatchRunner::new(engine, sink.clone()).run(now).await?;

        println!("(dry run) {}", summary);
        for notification in sink.sent() {
            println!(
                "  would notify {:<16} {:?}: {}",
                notification.role, notification.kind, notification.subject
            );
        }
        return Ok(());
    }

    let runner = BatchRunner::new(app.engine.clone(), app.notifier.clone());
    let summary = runner.run(now).await?;
    println!("{}", summary);
    Ok(())
}

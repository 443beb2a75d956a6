use super::App;
use anyhow::{Context, Result};
use cadence_core::EntityRef;
use cadence_engine::{DeadlineMonitor, DeadlineState, MemoryNotificationSink};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Check all configured reporting deadlines against the entities on disk
pub async fn execute(app: &App, now: DateTime<Utc>, dry_run: bool) -> Result<()> {
    let ledger_path = app.data_dir.join("deadline-ledger.json");
    let mut state = load_state(&ledger_path)?;

    // Every entity of every type a deadline watches, deduplicated
    let types: BTreeSet<&str> = app.deadlines.iter().map(|d| d.entity_type.as_str()).collect();
    let mut entities: Vec<EntityRef> = Vec::new();
    for entity_type in types {
        entities.extend(app.entities.list(entity_type)?);
    }

    if dry_run {
        let sink = Arc::new(MemoryNotificationSink::new());
        let monitor =
            DeadlineMonitor::new(app.deadlines.clone(), app.resolvers.clone(), sink.clone());
        let summary = monitor.run(&entities, &mut state, now).await;

        println!("(dry run) {}", summary);
        for notification in sink.sent() {
            println!(
                "  would notify {:<16} {:?}: {}",
                notification.role, notification.kind, notification.subject
            );
        }
        return Ok(());
    }

    let monitor = DeadlineMonitor::new(
        app.deadlines.clone(),
        app.resolvers.clone(),
        app.notifier.clone(),
    );
    let summary = monitor.run(&entities, &mut state, now).await;
    save_state(&ledger_path, &state)?;
    println!("{}", summary);
    Ok(())
}

fn load_state(path: &PathBuf) -> Result<DeadlineState> {
    if !path.exists() {
        return Ok(DeadlineState::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn save_state(path: &PathBuf, state: &DeadlineState) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(state)?;
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

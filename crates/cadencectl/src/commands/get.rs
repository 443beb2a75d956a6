use super::App;
use anyhow::{bail, Result};
use cadence_core::{Workflow, WorkflowInstance};
use cadence_engine::InstanceStore;
use comfy_table::{presets::NOTHING, Table};

/// Get resources (kubectl-style: get <resource-type> [name])
pub async fn execute(app: &App, resource_type: &str, name: Option<&str>, output: &str) -> Result<()> {
    match resource_type {
        "workflow" | "workflows" | "wf" => {
            let mut workflows: Vec<&Workflow> = app.registry.get_all();
            if let Some(name) = name {
                workflows.retain(|w| w.name == name);
                if workflows.is_empty() {
                    bail!("workflow '{}' not found", name);
                }
            }
            workflows.sort_by(|a, b| a.name.cmp(&b.name));
            print_workflows(&workflows, output)
        }

        "instance" | "instances" | "inst" => {
            let mut instances = app.store.find_all().await?;
            if let Some(id) = name {
                let id: uuid::Uuid = id.parse()?;
                instances.retain(|i| i.id == id);
                if instances.is_empty() {
                    bail!("instance '{}' not found", id);
                }
            }
            instances.sort_by_key(|i| i.started_at);
            print_instances(&instances, output)
        }

        other => bail!("unknown resource type '{}' (expected workflows or instances)", other),
    }
}

fn print_workflows(workflows: &[&Workflow], output: &str) -> Result<()> {
    match output {
        "json" => println!("{}", serde_json::to_string_pretty(workflows)?),
        "yaml" => println!("{}", serde_yaml::to_string(workflows)?),
        _ => {
            let mut table = Table::new();
            table.load_preset(NOTHING);
            table.set_header(vec!["NAME", "ENTITY TYPE", "ACTIVE", "STEPS", "SLA"]);
            for workflow in workflows {
                let sla = workflow
                    .sla_deadline_hours()
                    .map(|h| format!("{}h", h))
                    .unwrap_or_else(|| "-".to_string());
                table.add_row(vec![
                    workflow.name.clone(),
                    workflow.entity_type.clone(),
                    workflow.is_active.to_string(),
                    workflow.steps.len().to_string(),
                    sla,
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

fn print_instances(instances: &[WorkflowInstance], output: &str) -> Result<()> {
    match output {
        "json" => println!("{}", serde_json::to_string_pretty(instances)?),
        "yaml" => println!("{}", serde_yaml::to_string(instances)?),
        _ => {
            let mut table = Table::new();
            table.load_preset(NOTHING);
            table.set_header(vec![
                "ID", "WORKFLOW", "ENTITY", "STATUS", "STEP", "STARTED", "DUE",
            ]);
            for instance in instances {
                table.add_row(vec![
                    instance.id.to_string(),
                    instance.workflow_name.clone(),
                    instance.entity.to_string(),
                    instance.status.to_string(),
                    instance
                        .current_step
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    instance.started_at.format("%Y-%m-%d %H:%M").to_string(),
                    instance
                        .due_date
                        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

mod cli;
mod commands;
mod config;

use clap::Parser;
use cli::{Cli, Commands};
use commands::{resolve_now, App};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let app = App::load(&cli).await?;

    match &cli.command {
        Commands::Process { as_of, dry_run } => {
            let now = resolve_now(as_of)?;
            commands::process::execute(&app, now, *dry_run).await
        }
        Commands::Deadlines { as_of, dry_run } => {
            let now = resolve_now(as_of)?;
            commands::deadlines::execute(&app, now, *dry_run).await
        }
        Commands::Get {
            resource_type,
            name,
            output,
        } => commands::get::execute(&app, resource_type, name.as_deref(), output).await,
        Commands::Start {
            workflow,
            entity_type,
            entity_id,
        } => commands::start::execute(&app, workflow, entity_type, entity_id).await,
        Commands::Approve {
            instance,
            actor,
            comment,
        } => commands::instance::approve(&app, instance, actor, comment.clone()).await,
        Commands::Reject {
            instance,
            actor,
            comment,
        } => commands::instance::reject(&app, instance, actor, comment.clone()).await,
        Commands::Cancel { instance } => commands::instance::cancel(&app, instance).await,
    }
}

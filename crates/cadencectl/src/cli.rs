use clap::{Parser, Subcommand};

/// Cadence CLI - timed workflow processing and instance management
#[derive(Parser, Debug)]
#[command(name = "cadencectl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Optional configuration file (YAML)
    #[arg(long, short = 'c', global = true, env = "CADENCE_CONFIG")]
    pub config: Option<String>,

    /// Directory containing workflow template YAML files
    #[arg(long, global = true, env = "CADENCE_WORKFLOWS_DIR")]
    pub workflows_dir: Option<String>,

    /// Directory containing governed entity JSON files,
    /// one subdirectory per entity type
    #[arg(long, global = true, env = "CADENCE_ENTITIES_DIR")]
    pub entities_dir: Option<String>,

    /// Directory for engine state (instances, deadline ledger)
    #[arg(long, global = true, env = "CADENCE_DATA_DIR")]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one timed pass: SLA enforcement and auto-progression over all
    /// active instances
    Process {
        /// Process as of this instant (RFC 3339) instead of now
        #[arg(long)]
        as_of: Option<String>,

        /// Evaluate without persisting changes or sending notifications
        #[arg(long)]
        dry_run: bool,
    },

    /// Check regulatory reporting deadlines and send reminders
    Deadlines {
        /// Check as of this instant (RFC 3339) instead of now
        #[arg(long)]
        as_of: Option<String>,

        /// Evaluate without persisting the reminder ledger or notifying
        #[arg(long)]
        dry_run: bool,
    },

    /// Get resources (get workflows, get instances, get instance <id>)
    Get {
        /// Resource type (workflows, instances)
        resource_type: String,

        /// Resource name or id (optional - lists all if omitted)
        name: Option<String>,

        /// Output format (wide, json, yaml)
        #[arg(short, long, default_value = "wide")]
        output: String,
    },

    /// Start a workflow against an entity
    Start {
        /// Workflow template name
        workflow: String,

        /// Entity type, e.g. DataBreach
        entity_type: String,

        /// Entity id
        entity_id: String,
    },

    /// Approve the current step of an instance
    Approve {
        /// Instance id
        instance: String,

        /// Acting user
        #[arg(long)]
        actor: String,

        /// Optional comment recorded in the history
        #[arg(long)]
        comment: Option<String>,
    },

    /// Reject the current step, terminating the instance
    Reject {
        /// Instance id
        instance: String,

        /// Acting user
        #[arg(long)]
        actor: String,

        /// Optional comment recorded in the history
        #[arg(long)]
        comment: Option<String>,
    },

    /// Cancel a running instance
    Cancel {
        /// Instance id
        instance: String,
    },
}

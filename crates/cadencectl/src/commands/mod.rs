pub mod deadlines;
pub mod get;
pub mod instance;
pub mod process;
pub mod start;

use crate::cli::Cli;
use crate::config::CliConfig;
use anyhow::Context;
use cadence_core::WorkflowRegistry;
use cadence_engine::{
    default_deadlines, EntityResolverRegistry, FileEntityResolver, FileInstanceStore,
    LogNotificationSink, NotificationSink, ReportingDeadline, RiskAppetiteProvider,
    StaticRiskAppetite, StaticRoleResolver, WorkflowEngine,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_WORKFLOWS_DIR: &str = "workflows";
const DEFAULT_ENTITIES_DIR: &str = "entities";
const DEFAULT_DATA_DIR: &str = ".cadence";

/// Everything a command needs, assembled once per invocation
pub struct App {
    pub registry: Arc<WorkflowRegistry>,
    pub store: Arc<FileInstanceStore>,
    pub resolvers: Arc<EntityResolverRegistry>,
    pub risk_appetite: Arc<dyn RiskAppetiteProvider>,
    pub notifier: Arc<dyn NotificationSink>,
    pub engine: Arc<WorkflowEngine>,
    pub entities: Arc<FileEntityResolver>,
    pub deadlines: Vec<ReportingDeadline>,
    pub data_dir: PathBuf,
}

impl App {
    pub async fn load(cli: &Cli) -> anyhow::Result<Self> {
        let config = match &cli.config {
            Some(path) => CliConfig::load(Path::new(path))?,
            None => CliConfig::default(),
        };

        let workflows_dir = pick_dir(&cli.workflows_dir, &config.workflows_dir, DEFAULT_WORKFLOWS_DIR);
        let entities_dir = pick_dir(&cli.entities_dir, &config.entities_dir, DEFAULT_ENTITIES_DIR);
        let data_dir = pick_dir(&cli.data_dir, &config.data_dir, DEFAULT_DATA_DIR);

        let mut registry = WorkflowRegistry::new();
        let loaded = registry
            .load_directory(&workflows_dir)
            .with_context(|| format!("failed to load workflows from {}", workflows_dir.display()))?;
        tracing::info!(count = loaded, dir = %workflows_dir.display(), "Workflows loaded");

        let entities = Arc::new(FileEntityResolver::new(&entities_dir));
        let mut resolvers = EntityResolverRegistry::new();
        for entity_type in entity_types(&entities_dir, &registry) {
            resolvers.register(entity_type, entities.clone());
        }

        let registry = Arc::new(registry);
        let resolvers = Arc::new(resolvers);
        let store = Arc::new(FileInstanceStore::open(data_dir.join("instances.json")).await?);

        let mut appetite = StaticRiskAppetite::new(config.risk_appetite.default);
        for (category, bound) in &config.risk_appetite.per_category {
            appetite = appetite.with_category(category.clone(), *bound);
        }
        let risk_appetite: Arc<dyn RiskAppetiteProvider> = Arc::new(appetite);

        let notifier: Arc<dyn NotificationSink> = Arc::new(LogNotificationSink);
        let mut engine = WorkflowEngine::new(
            registry.clone(),
            store.clone(),
            resolvers.clone(),
            risk_appetite.clone(),
            notifier.clone(),
        );
        if !config.roles.is_empty() {
            engine = engine.with_role_resolver(Arc::new(StaticRoleResolver::new(config.roles)));
        }
        let engine = Arc::new(engine);

        Ok(Self {
            registry,
            store,
            resolvers,
            risk_appetite,
            notifier,
            engine,
            entities,
            deadlines: config.deadlines.unwrap_or_else(default_deadlines),
            data_dir,
        })
    }
}

fn pick_dir(flag: &Option<String>, config: &Option<String>, default: &str) -> PathBuf {
    PathBuf::from(
        flag.as_deref()
            .or(config.as_deref())
            .unwrap_or(default),
    )
}

/// Entity types to wire resolvers for: every subdirectory of the entities
/// directory, plus every type a loaded workflow governs
fn entity_types(entities_dir: &Path, registry: &WorkflowRegistry) -> BTreeSet<String> {
    let mut types: BTreeSet<String> = registry
        .get_all()
        .iter()
        .map(|w| w.entity_type.clone())
        .collect();

    if let Ok(entries) = std::fs::read_dir(entities_dir) {
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    types.insert(name.to_string());
                }
            }
        }
    }

    types
}

/// Parse an explicit `--as-of` instant, defaulting to the wall clock
pub fn resolve_now(as_of: &Option<String>) -> anyhow::Result<DateTime<Utc>> {
    match as_of {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .with_context(|| format!("invalid --as-of instant '{}' (expected RFC 3339)", raw)),
        None => Ok(Utc::now()),
    }
}

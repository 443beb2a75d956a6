// Optional YAML configuration for cadencectl.
//
// Everything has a default; command-line flags and environment variables
// take precedence over the file.

use anyhow::Context;
use cadence_engine::ReportingDeadline;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CliConfig {
    /// Directory of workflow template YAML files
    pub workflows_dir: Option<String>,

    /// Directory of entity JSON files, one subdirectory per type
    pub entities_dir: Option<String>,

    /// Directory for engine state
    pub data_dir: Option<String>,

    pub risk_appetite: RiskAppetiteConfig,

    /// Role membership, role -> members. When present, manual approvals
    /// are checked against it
    pub roles: HashMap<String, Vec<String>>,

    /// Reporting deadlines; when absent the built-in defaults apply
    pub deadlines: Option<Vec<ReportingDeadline>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RiskAppetiteConfig {
    /// Maximum acceptable residual risk
    pub default: Option<f64>,

    /// Per-category overrides
    pub per_category: HashMap<String, f64>,
}

impl CliConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: CliConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}

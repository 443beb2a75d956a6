// Cadence Core - Workflow template registry
//
// Loads workflow templates from YAML files in a directory, indexes them by
// name, and answers "which active workflows govern this entity type".
// A file that fails to parse or validate is logged and skipped; one bad
// template never blocks the rest of the catalog.

use crate::error::CadenceResult;
use crate::workflow::Workflow;

use std::collections::HashMap;
use std::path::Path;

/// Registry of workflow templates, keyed by name
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, Workflow>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load all templates from a directory
    pub fn load_directory(&mut self, path: &Path) -> CadenceResult<usize> {
        if !path.exists() {
            return Ok(0);
        }

        let mut count = 0;
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_path = entry.path();

            if file_path.extension().map_or(false, |e| e == "yaml" || e == "yml") {
                match load_yaml_file::<Workflow>(&file_path) {
                    Ok(workflow) => {
                        if let Err(e) = workflow.validate() {
                            tracing::warn!("Invalid workflow in {:?}: {}", file_path, e);
                            continue;
                        }
                        let name = workflow.name.clone();
                        self.workflows.insert(name.clone(), workflow);
                        tracing::debug!("Loaded workflow: {}", name);
                        count += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load workflow from {:?}: {}", file_path, e);
                    }
                }
            }
        }

        Ok(count)
    }

    /// Get a template by name
    pub fn get(&self, name: &str) -> Option<&Workflow> {
        self.workflows.get(name)
    }

    /// Get all templates
    pub fn get_all(&self) -> Vec<&Workflow> {
        self.workflows.values().collect()
    }

    /// Register a template
    pub fn register(&mut self, workflow: Workflow) -> CadenceResult<()> {
        workflow.validate()?;
        let name = workflow.name.clone();
        self.workflows.insert(name, workflow);
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.workflows.len()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    /// Get template names
    pub fn names(&self) -> Vec<&str> {
        self.workflows.keys().map(|s| s.as_str()).collect()
    }

    /// Active templates governing the given entity type
    pub fn active_for_entity_type(&self, entity_type: &str) -> Vec<&Workflow> {
        self.workflows
            .values()
            .filter(|w| w.is_active && w.entity_type == entity_type)
            .collect()
    }
}

/// Load a YAML file and deserialize to type T
fn load_yaml_file<T: serde::de::DeserializeOwned>(path: &Path) -> CadenceResult<T> {
    let content = std::fs::read_to_string(path)?;
    let resource: T = serde_yaml::from_str(&content)?;
    Ok(resource)
}

//! Experiment catalog
//!
//! Read-only experiment content (level count, per-level branching rules)
//! supplied to the lifecycle controller. Authoring lives elsewhere; this
//! only loads and serves the configuration.

use funnel_common::models::Experiment;
use funnel_common::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// In-memory lookup of experiments by id
#[derive(Debug, Clone, Default)]
pub struct ExperimentCatalog {
    experiments: HashMap<String, Experiment>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "experiment")]
    experiments: Vec<Experiment>,
}

impl ExperimentCatalog {
    pub fn new(experiments: Vec<Experiment>) -> Self {
        Self {
            experiments: experiments.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }

    /// Catalog with no experiments; session creation will report NotFound
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from a TOML file of `[[experiment]]` tables
    pub fn load_toml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: CatalogFile = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        Ok(Self::new(file.experiments))
    }

    pub fn get(&self, experiment_id: &str) -> Option<&Experiment> {
        self.experiments.get(experiment_id)
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[experiment]]
        id = "exp-1"
        name = "Launch funnel"
        total_levels = 2

        [[experiment.levels]]
        level = 1

        [[experiment.levels.rules]]
        condition = "q1:yes"
        target_path = "pathA"

        [[experiment.levels.rules]]
        condition = "default"
        target_path = "pathB"

        [[experiment]]
        id = "exp-2"
        total_levels = 1
    "#;

    #[test]
    fn parses_experiments_and_rules() {
        let file: CatalogFile = toml::from_str(SAMPLE).unwrap();
        let catalog = ExperimentCatalog::new(file.experiments);
        assert_eq!(catalog.len(), 2);

        let exp = catalog.get("exp-1").unwrap();
        assert_eq!(exp.total_levels, 2);
        let rules = exp.rules_for_level(1);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].condition, "q1:yes");
        assert_eq!(rules[1].target_path, "pathB");

        // Level with no configuration yields an empty rule list
        assert!(exp.rules_for_level(2).is_empty());
    }

    #[test]
    fn unknown_experiment_is_none() {
        let catalog = ExperimentCatalog::empty();
        assert!(catalog.get("missing").is_none());
    }
}

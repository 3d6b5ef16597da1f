//! Flat key/value engine configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_yaml::Value as YamlValue;
use tracing::debug;

use crate::error::{SubmitError, SubmitResult};

pub const PARALLELISM: &str = "parallelism.default";
pub const CHECKPOINT_INTERVAL: &str = "execution.checkpointing.interval";
pub const RUNTIME_MODE: &str = "execution.runtime-mode";
pub const PIPELINE_NAME: &str = "pipeline.name";
/// Runtime jar registry shipped with every job (`;`-separated URLs).
pub const PIPELINE_JARS: &str = "pipeline.jars";
/// Auxiliary python files (`,`-separated URLs).
pub const PYTHON_FILES: &str = "python.files";
pub const SAVEPOINT_PATH: &str = "execution.savepoint.path";
pub const SAVEPOINT_IGNORE_UNCLAIMED: &str = "execution.savepoint.ignore-unclaimed-state";

const LIST_SEPARATOR: char = ';';

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfiguration {
    entries: BTreeMap<String, String>,
}

impl EngineConfiguration {
    /// Read the cluster configuration file. A missing file yields an empty
    /// configuration; an unreadable or non-mapping file is a configuration error.
    pub fn load_cluster_file(path: &Path) -> SubmitResult<Self> {
        if !path.exists() {
            debug!("No cluster configuration at {}", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path).map_err(|e| {
            SubmitError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&raw).map_err(|e| {
            SubmitError::Configuration(format!("invalid {}: {}", path.display(), e))
        })
    }

    fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        let parsed: Option<BTreeMap<String, YamlValue>> = serde_yaml::from_str(raw)?;
        let entries = parsed
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    YamlValue::String(s) => s,
                    YamlValue::Bool(b) => b.to_string(),
                    YamlValue::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some((key, value))
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_string(), value.into());
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    /// Entries of the runtime jar registry, in insertion order.
    pub fn pipeline_jars(&self) -> Vec<String> {
        self.get(PIPELINE_JARS)
            .map(|raw| {
                raw.split(LIST_SEPARATOR)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Append jars to the runtime registry, skipping entries already present.
    pub fn add_pipeline_jars<I, S>(&mut self, jars: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut current = self.pipeline_jars();
        for jar in jars {
            let jar = jar.into();
            if !current.contains(&jar) {
                current.push(jar);
            }
        }
        let joined = current.join(&LIST_SEPARATOR.to_string());
        self.set(PIPELINE_JARS, joined);
    }
}

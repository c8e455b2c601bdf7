use crate::service::registration::DEFAULT_RETRIES;
use anyhow::{Context, Result};
use helper::{env_load, env_var};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use std::path::{Path, PathBuf};
use std::time::Duration;

env_var!(TRAINCTL_CONFIG);
env_var!(PROMETHEUS_ADDRESS);
env_var!(TRAINCTL_PROJECT);
env_var!(HOME);

const CONFIG_FILENAME: &str = ".trainctl.ron";

/// Loads from a file objects of the form:
/// `(default_project: Some("team-a"), prometheus_address:
/// Some("http://prometheus:9090"), registration_retries: 5)`
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub default_project:      Option<String>,
    pub namespace_prefix:     String,
    pub system_namespace:     String,
    pub prometheus_address:   Option<String>,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub prometheus_timeout:   Duration,
    pub chart:                String,
    pub scheduler_name:       String,
    pub registration_retries: u32,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            default_project:      None,
            namespace_prefix:     "runai-".to_string(),
            system_namespace:     "runai".to_string(),
            prometheus_address:   None,
            prometheus_timeout:   Duration::from_secs(10),
            chart:                "trainctl/train".to_string(),
            scheduler_name:       "runai-scheduler".to_string(),
            registration_retries: DEFAULT_RETRIES,
        }
    }
}

impl CliConfig {
    pub fn parse(content: &str) -> Result<Self> {
        ron::from_str(content).context("Failed to parse the configuration")
    }

    /// Reads the file at `path`, else `TRAINCTL_CONFIG`, else
    /// `$HOME/.trainctl.ron`, then applies the env overrides. A missing
    /// file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => env_load!(PathBuf, TRAINCTL_CONFIG).or(
                env_load!(PathBuf, HOME).map(|home| home.join(CONFIG_FILENAME)),
            ),
        };

        let config = match path {
            Some(path) if path.exists() => {
                debug!("Loading the configuration from {}", path.display());
                let content = std::fs::read_to_string(&path).with_context(
                    || format!("Failed to read {}", path.display()),
                )?;
                Self::parse(&content)
                    .with_context(|| format!("In {}", path.display()))?
            }
            _ => Self::default(),
        };
        config.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(address) = env_load!(String, PROMETHEUS_ADDRESS) {
            self.prometheus_address = Some(address);
        }
        if let Some(project) = env_load!(String, TRAINCTL_PROJECT) {
            self.default_project = Some(project);
        }
        Ok(self)
    }

    /// Namespace holding the jobs of `project`.
    pub fn namespace_for(&self, project: &str) -> String {
        format!("{}{}", self.namespace_prefix, project)
    }
}

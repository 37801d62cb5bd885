//! Runtime configuration
//!
//! Values are layered: defaults, then an optional configuration file
//! (YAML, TOML or JSON, chosen by extension), then `PUMP_*` environment
//! variables. Command-line flags are applied on top by the CLI.

use crate::error::{PumpError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_PARALLEL_LIMIT: usize = 256;

/// Executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PumpConfig {
    /// Directory nodes run in and exchange files through
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    /// Nodes allowed to run at once; 1 runs the sequential driver
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Seconds a `--description` query may take
    #[serde(default = "default_description_timeout")]
    pub description_timeout: u64,
    /// Seconds a node may run; unlimited when absent
    #[serde(default)]
    pub node_timeout: Option<u64>,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            max_parallel: default_max_parallel(),
            description_timeout: default_description_timeout(),
            node_timeout: None,
        }
    }
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_parallel() -> usize {
    1
}

fn default_description_timeout() -> u64 {
    30
}

impl PumpConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(config::Environment::with_prefix("PUMP").try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel == 0 {
            return Err(PumpError::Validation(
                "max_parallel must be at least 1".to_string(),
            ));
        }
        if self.max_parallel > MAX_PARALLEL_LIMIT {
            return Err(PumpError::Validation(format!(
                "max_parallel must be at most {} to prevent resource exhaustion",
                MAX_PARALLEL_LIMIT
            )));
        }
        if self.description_timeout == 0 {
            return Err(PumpError::Validation(
                "description_timeout must be at least 1 second".to_string(),
            ));
        }
        if self.node_timeout == Some(0) {
            return Err(PumpError::Validation(
                "node_timeout must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn description_timeout(&self) -> Duration {
        Duration::from_secs(self.description_timeout)
    }

    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout.map(Duration::from_secs)
    }
}

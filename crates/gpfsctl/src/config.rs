use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::CommandBuilder;
use crate::exec::{ExecConfig, DEFAULT_TOOL_DIR};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpfsConfig {
    pub tool_dir: PathBuf,
    pub timeout_secs: u64,
    /// Extra environment for every tool invocation.
    pub env: BTreeMap<String, String>,
    pub dry_run: bool,
    pub default_inode_limit: u64,
    pub soft_to_hard_factor: f64,
}

impl Default for GpfsConfig {
    fn default() -> Self {
        Self {
            tool_dir: PathBuf::from(DEFAULT_TOOL_DIR),
            timeout_secs: 300,
            env: BTreeMap::new(),
            dry_run: false,
            default_inode_limit: 1_048_576,
            soft_to_hard_factor: 1.05,
        }
    }
}

impl GpfsConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: GpfsConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than zero");
        }
        if !self.tool_dir.is_absolute() {
            anyhow::bail!("tool_dir must be absolute: {}", self.tool_dir.display());
        }
        if !(self.soft_to_hard_factor >= 1.0) {
            anyhow::bail!(
                "soft_to_hard_factor must be at least 1.0, got {}",
                self.soft_to_hard_factor
            );
        }
        Ok(())
    }

    pub fn exec_config(&self) -> ExecConfig {
        ExecConfig {
            tool_dir: self.tool_dir.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            env: self.env.clone(),
        }
    }

    pub fn command_builder(&self) -> CommandBuilder {
        CommandBuilder::new(self.default_inode_limit, self.soft_to_hard_factor)
    }
}

pub mod error;

pub use error::ConfigError;

use crate::orchestration::agents::ExecutionAgentKind;
use crate::orchestration::clarifications::WaitOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LARGE_OUTPUT_THRESHOLD_BYTES: usize = 40_000;
pub const DEFAULT_END_USER: &str = "default_user";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub execution_agent_type: ExecutionAgentKind,
    /// `Value` outputs whose serialized form is larger than this are offloaded to the store.
    pub large_output_threshold_bytes: usize,
    pub default_end_user: String,
    pub storage: StorageConfig,
    pub wait: WaitConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            execution_agent_type: ExecutionAgentKind::Default,
            large_output_threshold_bytes: DEFAULT_LARGE_OUTPUT_THRESHOLD_BYTES,
            default_end_user: DEFAULT_END_USER.to_string(),
            storage: StorageConfig::default(),
            wait: WaitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageClass {
    #[default]
    Memory,
    Disk,
    Sqlite,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub class: StorageClass,
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaitConfig {
    pub max_retries: u32,
    pub backoff_start_seconds: u64,
    pub backoff_step_seconds: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_retries: 6,
            backoff_start_seconds: 7 * 60,
            backoff_step_seconds: 2,
        }
    }
}

impl WaitConfig {
    pub fn options(&self) -> WaitOptions {
        WaitOptions {
            max_retries: self.max_retries,
            backoff_start: Duration::from_secs(self.backoff_start_seconds),
            backoff_step: Duration::from_secs(self.backoff_step_seconds),
        }
    }
}

impl EngineConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_end_user.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "`default_end_user` must be non-empty".to_string(),
            ));
        }
        if self.wait.backoff_step_seconds == 0 {
            return Err(ConfigError::Invalid(
                "`wait.backoff_step_seconds` must be greater than 0".to_string(),
            ));
        }
        match self.storage.class {
            StorageClass::Memory => {}
            StorageClass::Disk | StorageClass::Sqlite => {
                let missing = self
                    .storage
                    .dir
                    .as_ref()
                    .map(|dir| dir.as_os_str().is_empty())
                    .unwrap_or(true);
                if missing {
                    return Err(ConfigError::Invalid(format!(
                        "`storage.dir` is required for storage class `{}`",
                        self.storage.class.as_str()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn exceeds_output_threshold(&self, serialized_len: usize) -> bool {
        serialized_len > self.large_output_threshold_bytes
    }
}

impl StorageClass {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageClass::Memory => "memory",
            StorageClass::Disk => "disk",
            StorageClass::Sqlite => "sqlite",
        }
    }
}

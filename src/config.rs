use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_CONFIG_FILE: &str = "agent-learning.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub learning: LearningConfig,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                Self::from_file(&default_path)?
            } else {
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        config.learning.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self =
            toml::from_str(&contents).with_context(|| "failed to parse configuration TOML")?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(db_path) = env::var("AGENT_LEARNING_DB_PATH") {
            self.storage.database_path = Some(PathBuf::from(db_path));
        }
        if let Ok(model) = env::var("AGENT_LEARNING_DEFAULT_MODEL") {
            self.learning.default_model = model;
        }
        if let Ok(threshold) = env::var("AGENT_LEARNING_THRESHOLD") {
            self.learning.learning_threshold = threshold
                .trim()
                .parse()
                .with_context(|| format!("invalid AGENT_LEARNING_THRESHOLD: {threshold}"))?;
        }
        if let Ok(weight) = env::var("AGENT_LEARNING_COST_WEIGHT") {
            self.learning.cost_weight = weight
                .trim()
                .parse()
                .with_context(|| format!("invalid AGENT_LEARNING_COST_WEIGHT: {weight}"))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Per-project directory holding the learning database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    /// Explicit database location; bypasses the per-project layout.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            database_path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            max_connections: default_max_connections(),
        }
    }
}

impl StorageConfig {
    /// `<project>/<data_dir>/<database_file>`, unless an explicit path is set.
    pub fn database_path_for(&self, project_dir: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) => path.clone(),
            None => project_dir.join(&self.data_dir).join(&self.database_file),
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Engine settings, fixed for the lifetime of an engine instance.
#[derive(Debug, Clone, Deserialize)]
pub struct LearningConfig {
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
    /// Reserved for the caller's retry loop.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Minimum samples before category or model statistics are trusted.
    #[serde(default = "default_learning_threshold")]
    pub learning_threshold: u64,
    /// Blend between success rate (0.0) and cost per success (1.0).
    #[serde(default = "default_cost_weight")]
    pub cost_weight: f64,
    /// Reserved for automatic application of insights.
    #[serde(default)]
    pub auto_optimize: bool,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            fallback_model: default_fallback_model(),
            max_retries: default_max_retries(),
            learning_threshold: default_learning_threshold(),
            cost_weight: default_cost_weight(),
            auto_optimize: false,
        }
    }
}

impl LearningConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_model.trim().is_empty() {
            bail!("learning.default_model must not be empty");
        }
        if self.fallback_model.trim().is_empty() {
            bail!("learning.fallback_model must not be empty");
        }
        if self.learning_threshold == 0 {
            bail!("learning.learning_threshold must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.cost_weight) {
            bail!(
                "learning.cost_weight must be between 0 and 1, got {}",
                self.cost_weight
            );
        }
        Ok(())
    }
}

fn default_data_dir() -> String {
    ".autocoder".to_string()
}

fn default_database_file() -> String {
    "learning.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_max_connections() -> u32 {
    5
}

fn default_model() -> String {
    "claude-opus-4-5-20251101".to_string()
}

fn default_fallback_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_learning_threshold() -> u64 {
    5
}

fn default_cost_weight() -> f64 {
    0.3
}

use crate::paths;
use anyhow::{Context, Result, bail};
use rabbitkit::{DEFAULT_JOBS, DeployOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `[broker] url`
pub const ENV_BROKER_URL: &str = "RABBITDEF_BROKER_URL";

/// Environment variable overriding `[ignore] file`
pub const ENV_IGNORE_FILE: &str = "RABBITDEF_IGNORE_FILE";

/// Environment variable overriding `[deploy] jobs`
pub const ENV_JOBS: &str = "RABBITDEF_JOBS";

// ============================================================================
// Config Schema
// ============================================================================

/// The rabbitdef configuration, read from `config.toml`
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Broker connection
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Deploy defaults
    #[serde(default)]
    pub deploy: DeployConfig,

    /// Resources never touched by diff, merge or deploy
    #[serde(default)]
    pub ignore: IgnoreConfig,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Management API URL, credentials in the userinfo
    pub url: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub no_deletions: bool,
    pub recreate_changed: bool,
    /// Maximum concurrent requests per batch
    pub jobs: usize,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            no_deletions: false,
            recreate_changed: false,
            jobs: DEFAULT_JOBS,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Ignore list path, `~` and variables expanded
    pub file: Option<String>,
}

impl Config {
    /// Load `config.toml` from the config directory, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = paths::config_dir()?.join("config.toml");
        Self::load_from(&path, |key| std::env::var(key).ok())
    }

    /// Load from `path`, which may not exist, with overrides from `env`.
    pub fn load_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read config file: {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in config file: {}", path.display()))?
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = env(ENV_BROKER_URL) {
            self.broker.url = Some(url);
        }
        if let Some(file) = env(ENV_IGNORE_FILE) {
            self.ignore.file = Some(file);
        }
        if let Some(jobs) = env(ENV_JOBS) {
            self.deploy.jobs = jobs
                .trim()
                .parse()
                .with_context(|| format!("{ENV_JOBS} must be a number, got '{jobs}'"))?;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.deploy.jobs == 0 {
            bail!("Invalid [deploy] jobs: must be at least 1");
        }
        Ok(())
    }

    /// Expanded ignore list path, if one is configured
    pub fn ignore_file(&self) -> Option<PathBuf> {
        self.ignore.file.as_deref().map(paths::expand)
    }

    /// Deploy options from the configured defaults
    pub fn deploy_options(&self) -> DeployOptions {
        DeployOptions {
            dry_run: false,
            no_deletions: self.deploy.no_deletions,
            recreate_changed: self.deploy.recreate_changed,
            jobs: self.deploy.jobs,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

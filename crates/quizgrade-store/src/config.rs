//! File configuration for quizgrade.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use quizgrade_core::engine::EngineConfig;

/// Top-level quizgrade configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizgradeConfig {
    /// Snapshot file holding quizzes, sets and completeness.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
    /// Random seeds tried per new quiz set.
    #[serde(default = "default_seed_attempts")]
    pub seed_attempts: u32,
    /// Shuffle quiz order in new sets.
    #[serde(default)]
    pub shuffle_quiz_order: bool,
}

fn default_data_file() -> PathBuf {
    PathBuf::from("./quizgrade-data.json")
}
fn default_seed_attempts() -> u32 {
    EngineConfig::default().seed_attempts
}

impl Default for QuizgradeConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            seed_attempts: default_seed_attempts(),
            shuffle_quiz_order: false,
        }
    }
}

impl QuizgradeConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            seed_attempts: self.seed_attempts,
            shuffle_quiz_order: self.shuffle_quiz_order,
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `quizgrade.toml` in the current directory
/// 2. `~/.config/quizgrade/config.toml`
///
/// `QUIZGRADE_DATA_FILE` overrides `data_file`.
pub fn load_config() -> Result<QuizgradeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<QuizgradeConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("quizgrade.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            tracing::debug!("loaded config from {}", path.display());
            toml::from_str::<QuizgradeConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => QuizgradeConfig::default(),
    };

    if let Ok(data_file) = std::env::var("QUIZGRADE_DATA_FILE") {
        config.data_file = PathBuf::from(data_file);
    }
    config.data_file = PathBuf::from(resolve_env_vars(&config.data_file.to_string_lossy()));

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("quizgrade"))
}

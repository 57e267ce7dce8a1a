//! Subcommands of the `quizgrade` binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use quizgrade_store::{load_config_from, MemoryStore, QuizgradeConfig};

pub mod assign;
pub mod import;
pub mod init;
pub mod score;
pub mod show;
pub mod submit;
pub mod validate;

/// Global path options.
pub struct Paths {
    pub config: Option<PathBuf>,
    pub data: Option<PathBuf>,
}

/// Loaded configuration plus the store backed by its snapshot file.
pub struct Workspace {
    pub config: QuizgradeConfig,
    pub store: Arc<MemoryStore>,
    data_file: PathBuf,
}

impl Workspace {
    pub fn open(paths: &Paths) -> Result<Self> {
        let config = load_config_from(paths.config.as_deref())?;
        let data_file = paths
            .data
            .clone()
            .unwrap_or_else(|| config.data_file.clone());
        let store = Arc::new(MemoryStore::load_json(&data_file)?);
        Ok(Self {
            config,
            store,
            data_file,
        })
    }

    pub async fn save(&self) -> Result<()> {
        self.store.save_json(&self.data_file).await?;
        tracing::debug!("saved snapshot to {}", self.data_file.display());
        Ok(())
    }
}

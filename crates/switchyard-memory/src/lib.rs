pub mod in_memory;
pub mod sqlite;

use std::sync::Arc;

use tracing::info;

use switchyard_core::config::{AppConfig, CheckpointBackend};
use switchyard_core::error::Result;
use switchyard_core::traits::CheckpointStore;

pub use in_memory::InMemoryCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

/// Open the checkpoint backend selected by `[checkpoint]`.
pub fn open_store(config: &AppConfig) -> Result<Arc<dyn CheckpointStore>> {
    match config.checkpoint.backend {
        CheckpointBackend::Memory => {
            info!("Using in-memory checkpoint store");
            Ok(Arc::new(InMemoryCheckpointStore::new()))
        }
        CheckpointBackend::Sqlite => {
            let path = config.checkpoint_path();
            info!(path = %path.display(), "Using SQLite checkpoint store");
            Ok(Arc::new(SqliteCheckpointStore::open(&path)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::types::SessionId;

    #[tokio::test]
    async fn test_open_store_sqlite_under_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let toml_str = format!(
            "workspace = \"{}\"\n[model]\nmodel_id = \"m\"\n[checkpoint]\nbackend = \"sqlite\"\n",
            dir.path().display()
        );
        let config = AppConfig::parse(&toml_str).unwrap();
        let store = open_store(&config).unwrap();

        let state = store.load(&SessionId::from_string("s")).await.unwrap();
        store.save(&state).await.unwrap();
        assert!(dir.path().join("checkpoints.db").exists());
    }

    #[tokio::test]
    async fn test_open_store_defaults_to_memory() {
        let config = AppConfig::parse("[model]\nmodel_id = \"m\"\n").unwrap();
        let store = open_store(&config).unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }
}

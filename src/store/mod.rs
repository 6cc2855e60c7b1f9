//! Named saved commands
//!
//! `save <name>` stores a command's cleaned label under a name, `load <name>`
//! replays it and `delete <name>` removes it.

mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A stored command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCommand {
    pub name: String,
    pub command: String,
}

/// Key-value storage for saved commands
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// Store `command` under `name`, replacing any previous value
    async fn save(&self, name: &str, command: &str) -> Result<(), StoreError>;

    async fn load(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// Remove `name`; returns whether it existed
    async fn delete(&self, name: &str) -> Result<bool, StoreError>;

    /// All saved commands ordered by name
    async fn list(&self) -> Result<Vec<SavedCommand>, StoreError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    commands: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommandStore for MemoryStore {
    async fn save(&self, name: &str, command: &str) -> Result<(), StoreError> {
        self.commands
            .write()
            .await
            .insert(name.to_string(), command.to_string());
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.commands.read().await.get(name).cloned())
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.commands.write().await.remove(name).is_some())
    }

    async fn list(&self) -> Result<Vec<SavedCommand>, StoreError> {
        Ok(self
            .commands
            .read()
            .await
            .iter()
            .map(|(name, command)| SavedCommand {
                name: name.clone(),
                command: command.clone(),
            })
            .collect())
    }
}

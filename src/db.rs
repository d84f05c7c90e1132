// src/db.rs
mod memory;
mod scylla_store;

pub use memory::MemoryStore;
pub use scylla_store::ScyllaStore;

use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::models::{Note, NoteContent, Stock, StockPatch, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect: {0}")]
    Connect(#[from] ::scylla::transport::errors::NewSessionError),

    #[error("query failed: {0}")]
    Query(#[from] ::scylla::transport::errors::QueryError),

    #[error("malformed row: {0}")]
    CorruptRow(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store is closed")]
    Closed,
}

/// Persistence for users, stocks and notes.
///
/// Every stock and note operation is keyed by the owning username, so an
/// implementation can never hand one user's records to another.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns `false` when the username is already taken.
    async fn insert_user(&self, user: &User) -> Result<bool, StoreError>;
    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn list_stocks(&self, username: &str) -> Result<Vec<Stock>, StoreError>;
    async fn find_stock(&self, username: &str, ticker: &str)
        -> Result<Option<Stock>, StoreError>;
    /// Returns `false` when the owner already tracks this ticker.
    async fn insert_stock(&self, stock: &Stock) -> Result<bool, StoreError>;
    /// Returns `false` when no owned stock matched.
    async fn update_stock(
        &self,
        username: &str,
        ticker: &str,
        patch: &StockPatch,
    ) -> Result<bool, StoreError>;
    async fn delete_stock(&self, username: &str, ticker: &str) -> Result<(), StoreError>;

    /// Returns the number of notes removed.
    async fn delete_notes_for_stock(
        &self,
        username: &str,
        stock_id: &str,
    ) -> Result<usize, StoreError>;
    async fn list_notes(&self, username: &str, stock_id: &str) -> Result<Vec<Note>, StoreError>;
    async fn find_note(&self, username: &str, id: &str) -> Result<Option<Note>, StoreError>;
    /// Returns `false` when the owner already has a note with this id.
    async fn insert_note(&self, note: &Note) -> Result<bool, StoreError>;
    /// Returns `false` when no owned note matched.
    async fn update_note(
        &self,
        username: &str,
        id: &str,
        content: &NoteContent,
    ) -> Result<bool, StoreError>;
    async fn delete_note(&self, username: &str, id: &str) -> Result<(), StoreError>;

    /// Releases the backend. Every later call fails with `StoreError::Closed`.
    async fn close(&self) -> Result<(), StoreError>;
}

/// Opens the backend named by `config.store_uri`.
pub async fn connect(config: &Config) -> Result<Arc<dyn Store>, StoreError> {
    if config.uses_memory_store() {
        info!("Using in-memory store; data is lost on shutdown.");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = ScyllaStore::connect(&config.store_uri, &config.keyspace).await?;
    Ok(Arc::new(store))
}

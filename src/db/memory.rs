// src/db/memory.rs
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Store, StoreError};
use crate::models::{Note, NoteContent, Stock, StockPatch, User};

type OwnedKey = (String, String);

#[derive(Default)]
struct Collections {
    closed: bool,
    users: HashMap<String, User>,
    stocks: BTreeMap<OwnedKey, Stock>,
    notes: BTreeMap<OwnedKey, Note>,
}

/// Process-local store. Backs `memory://` and the test suites.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn read(&self) -> Result<RwLockReadGuard<'_, Collections>, StoreError> {
        let inner = self.inner.read().await;
        if inner.closed {
            return Err(StoreError::Closed);
        }
        Ok(inner)
    }

    async fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>, StoreError> {
        let inner = self.inner.write().await;
        if inner.closed {
            return Err(StoreError::Closed);
        }
        Ok(inner)
    }
}

fn key(username: &str, id: &str) -> OwnedKey {
    (username.to_string(), id.to_string())
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<bool, StoreError> {
        let mut inner = self.write().await?;
        if inner.users.contains_key(&user.username) {
            return Ok(false);
        }
        inner.users.insert(user.username.clone(), user.clone());
        Ok(true)
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.read().await?.users.get(username).cloned())
    }

    async fn list_stocks(&self, username: &str) -> Result<Vec<Stock>, StoreError> {
        let inner = self.read().await?;
        Ok(inner
            .stocks
            .iter()
            .filter(|((owner, _), _)| owner == username)
            .map(|(_, stock)| stock.clone())
            .collect())
    }

    async fn find_stock(
        &self,
        username: &str,
        ticker: &str,
    ) -> Result<Option<Stock>, StoreError> {
        Ok(self.read().await?.stocks.get(&key(username, ticker)).cloned())
    }

    async fn insert_stock(&self, stock: &Stock) -> Result<bool, StoreError> {
        let mut inner = self.write().await?;
        let k = key(&stock.username, &stock.ticker_symbol);
        if inner.stocks.contains_key(&k) {
            return Ok(false);
        }
        inner.stocks.insert(k, stock.clone());
        Ok(true)
    }

    async fn update_stock(
        &self,
        username: &str,
        ticker: &str,
        patch: &StockPatch,
    ) -> Result<bool, StoreError> {
        let mut inner = self.write().await?;
        match inner.stocks.get_mut(&key(username, ticker)) {
            Some(stock) => {
                stock.apply(patch);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_stock(&self, username: &str, ticker: &str) -> Result<(), StoreError> {
        self.write().await?.stocks.remove(&key(username, ticker));
        Ok(())
    }

    async fn delete_notes_for_stock(
        &self,
        username: &str,
        stock_id: &str,
    ) -> Result<usize, StoreError> {
        let mut inner = self.write().await?;
        let before = inner.notes.len();
        inner
            .notes
            .retain(|(owner, _), note| !(owner == username && note.stock_id == stock_id));
        Ok(before - inner.notes.len())
    }

    async fn list_notes(&self, username: &str, stock_id: &str) -> Result<Vec<Note>, StoreError> {
        let inner = self.read().await?;
        Ok(inner
            .notes
            .iter()
            .filter(|((owner, _), note)| owner == username && note.stock_id == stock_id)
            .map(|(_, note)| note.clone())
            .collect())
    }

    async fn find_note(&self, username: &str, id: &str) -> Result<Option<Note>, StoreError> {
        Ok(self.read().await?.notes.get(&key(username, id)).cloned())
    }

    async fn insert_note(&self, note: &Note) -> Result<bool, StoreError> {
        let mut inner = self.write().await?;
        let k = key(&note.username, &note.id);
        if inner.notes.contains_key(&k) {
            return Ok(false);
        }
        inner.notes.insert(k, note.clone());
        Ok(true)
    }

    async fn update_note(
        &self,
        username: &str,
        id: &str,
        content: &NoteContent,
    ) -> Result<bool, StoreError> {
        let mut inner = self.write().await?;
        match inner.notes.get_mut(&key(username, id)) {
            Some(note) => {
                note.content = content.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_note(&self, username: &str, id: &str) -> Result<(), StoreError> {
        self.write().await?.notes.remove(&key(username, id));
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.closed = true;
        inner.users.clear();
        inner.stocks.clear();
        inner.notes.clear();
        Ok(())
    }
}

// src/db/scylla_store.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use scylla::frame::response::result::{CqlValue, Row};
use scylla::query::Query;
use scylla::{QueryResult, Session, SessionBuilder};
use tokio::sync::{RwLock, RwLockReadGuard};

use super::{Store, StoreError};
use crate::models::{Note, NoteContent, Stock, StockPatch, User};

const STOCK_COLUMNS: &str =
    "username, ticker_symbol, display_name, chart_id, created_at, is_interesting, bookmark_color";
const NOTE_COLUMNS: &str = "username, id, stock_id, content, created_at";

/// Holds a connection until `take` empties it. Readers get `Closed` afterwards.
struct SessionSlot<S> {
    inner: RwLock<Option<S>>,
}

impl<S> SessionSlot<S> {
    fn new(session: S) -> Self {
        Self {
            inner: RwLock::new(Some(session)),
        }
    }

    async fn get(&self) -> Result<RwLockReadGuard<'_, S>, StoreError> {
        RwLockReadGuard::try_map(self.inner.read().await, Option::as_ref)
            .map_err(|_| StoreError::Closed)
    }

    /// Waits for in-flight readers, then hands the connection out.
    async fn take(&self) -> Option<S> {
        self.inner.write().await.take()
    }
}

/// ScyllaDB backend. Users, stocks and notes are partitioned by username.
pub struct ScyllaStore {
    session: SessionSlot<Session>,
    keyspace: String,
}

impl ScyllaStore {
    pub async fn connect(node: &str, keyspace: &str) -> Result<Self, StoreError> {
        let session = SessionBuilder::new().known_node(node).build().await?;
        let store = Self {
            session: SessionSlot::new(session),
            keyspace: keyspace.to_string(),
        };
        store.create_schema().await?;
        info!("Connected to ScyllaDB at {} (keyspace {}).", node, keyspace);
        Ok(store)
    }

    async fn create_schema(&self) -> Result<(), StoreError> {
        let ks = &self.keyspace;
        let statements = [
            format!("CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = {{'class': 'SimpleStrategy', 'replication_factor': 1}}", ks),
            format!("CREATE TABLE IF NOT EXISTS {}.users (username TEXT PRIMARY KEY, password TEXT)", ks),
            format!("CREATE TABLE IF NOT EXISTS {}.stocks (username TEXT, ticker_symbol TEXT, display_name TEXT, chart_id TEXT, created_at TEXT, is_interesting BOOLEAN, bookmark_color TEXT, PRIMARY KEY (username, ticker_symbol))", ks),
            format!("CREATE TABLE IF NOT EXISTS {}.notes (username TEXT, id TEXT, stock_id TEXT, content TEXT, created_at TEXT, PRIMARY KEY (username, id))", ks),
        ];
        let session = self.session().await?;
        for statement in statements {
            session.query(statement, &[]).await?;
        }
        Ok(())
    }

    async fn session(&self) -> Result<RwLockReadGuard<'_, Session>, StoreError> {
        self.session.get().await
    }

    fn cql(&self, statement: &str) -> Query {
        Query::new(statement.replace("{ks}", &self.keyspace))
    }
}

fn rows(result: QueryResult) -> Vec<Row> {
    result.rows.unwrap_or_default()
}

/// Reads the `[applied]` column of a lightweight transaction.
fn applied(result: QueryResult) -> Result<bool, StoreError> {
    match rows(result).first().and_then(|row| row.columns.first()) {
        Some(Some(CqlValue::Boolean(applied))) => Ok(*applied),
        _ => Err(StoreError::CorruptRow(
            "missing [applied] column in conditional write".into(),
        )),
    }
}

fn text(row: &Row, idx: usize) -> Result<String, StoreError> {
    match row.columns.get(idx) {
        Some(Some(CqlValue::Text(s))) | Some(Some(CqlValue::Ascii(s))) => Ok(s.clone()),
        Some(None) => Ok(String::new()),
        other => Err(StoreError::CorruptRow(format!(
            "expected text in column {}, found {:?}",
            idx, other
        ))),
    }
}

fn boolean(row: &Row, idx: usize) -> Result<bool, StoreError> {
    match row.columns.get(idx) {
        Some(Some(CqlValue::Boolean(b))) => Ok(*b),
        Some(None) => Ok(false),
        other => Err(StoreError::CorruptRow(format!(
            "expected boolean in column {}, found {:?}",
            idx, other
        ))),
    }
}

fn timestamp(row: &Row, idx: usize) -> Result<DateTime<Utc>, StoreError> {
    let raw = text(row, idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow(format!("bad created_at {:?}: {}", raw, e)))
}

fn stock_from_row(row: &Row) -> Result<Stock, StoreError> {
    let ticker_symbol = text(row, 1)?;
    Ok(Stock {
        id: ticker_symbol.clone(),
        username: text(row, 0)?,
        ticker_symbol,
        display_name: text(row, 2)?,
        chart_id: text(row, 3)?,
        created_at: timestamp(row, 4)?,
        is_interesting: boolean(row, 5)?,
        bookmark_color: text(row, 6)?,
    })
}

fn note_from_row(row: &Row) -> Result<Note, StoreError> {
    let content: NoteContent = serde_json::from_str(&text(row, 3)?)?;
    Ok(Note {
        username: text(row, 0)?,
        id: text(row, 1)?,
        stock_id: text(row, 2)?,
        content,
        created_at: timestamp(row, 4)?,
    })
}

#[async_trait]
impl Store for ScyllaStore {
    async fn insert_user(&self, user: &User) -> Result<bool, StoreError> {
        let query =
            self.cql("INSERT INTO {ks}.users (username, password) VALUES (?, ?) IF NOT EXISTS");
        let result = self
            .session()
            .await?
            .query(query, (user.username.as_str(), user.password.as_str()))
            .await?;
        applied(result)
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let query = self.cql("SELECT username, password FROM {ks}.users WHERE username = ?");
        let result = self.session().await?.query(query, (username,)).await?;
        match rows(result).first() {
            Some(row) => Ok(Some(User {
                username: text(row, 0)?,
                password: text(row, 1)?,
            })),
            None => Ok(None),
        }
    }

    async fn list_stocks(&self, username: &str) -> Result<Vec<Stock>, StoreError> {
        let query = self.cql(&format!(
            "SELECT {} FROM {{ks}}.stocks WHERE username = ?",
            STOCK_COLUMNS
        ));
        let result = self.session().await?.query(query, (username,)).await?;
        let stocks = rows(result)
            .iter()
            .map(stock_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Fetched {} stocks for {}", stocks.len(), username);
        Ok(stocks)
    }

    async fn find_stock(
        &self,
        username: &str,
        ticker: &str,
    ) -> Result<Option<Stock>, StoreError> {
        let query = self.cql(&format!(
            "SELECT {} FROM {{ks}}.stocks WHERE username = ? AND ticker_symbol = ?",
            STOCK_COLUMNS
        ));
        let result = self.session().await?.query(query, (username, ticker)).await?;
        rows(result).first().map(stock_from_row).transpose()
    }

    async fn insert_stock(&self, stock: &Stock) -> Result<bool, StoreError> {
        let query = self.cql(&format!(
            "INSERT INTO {{ks}}.stocks ({}) VALUES (?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS",
            STOCK_COLUMNS
        ));
        let result = self
            .session()
            .await?
            .query(
                query,
                (
                    stock.username.as_str(),
                    stock.ticker_symbol.as_str(),
                    stock.display_name.as_str(),
                    stock.chart_id.as_str(),
                    stock.created_at.to_rfc3339(),
                    stock.is_interesting,
                    stock.bookmark_color.as_str(),
                ),
            )
            .await?;
        applied(result)
    }

    async fn update_stock(
        &self,
        username: &str,
        ticker: &str,
        patch: &StockPatch,
    ) -> Result<bool, StoreError> {
        let mut stock = match self.find_stock(username, ticker).await? {
            Some(stock) => stock,
            None => return Ok(false),
        };
        stock.apply(patch);

        let query = self.cql(
            "UPDATE {ks}.stocks SET display_name = ?, chart_id = ?, is_interesting = ?, bookmark_color = ? \
             WHERE username = ? AND ticker_symbol = ? IF EXISTS",
        );
        let result = self
            .session()
            .await?
            .query(
                query,
                (
                    stock.display_name.as_str(),
                    stock.chart_id.as_str(),
                    stock.is_interesting,
                    stock.bookmark_color.as_str(),
                    username,
                    ticker,
                ),
            )
            .await?;
        applied(result)
    }

    async fn delete_stock(&self, username: &str, ticker: &str) -> Result<(), StoreError> {
        let query = self.cql("DELETE FROM {ks}.stocks WHERE username = ? AND ticker_symbol = ?");
        self.session().await?.query(query, (username, ticker)).await?;
        Ok(())
    }

    async fn delete_notes_for_stock(
        &self,
        username: &str,
        stock_id: &str,
    ) -> Result<usize, StoreError> {
        let ids: Vec<String> = self
            .list_notes(username, stock_id)
            .await?
            .into_iter()
            .map(|note| note.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = ids.len();
        let query = self.cql("DELETE FROM {ks}.notes WHERE username = ? AND id IN ?");
        self.session().await?.query(query, (username, ids)).await?;
        debug!("Removed {} notes for {}/{}", removed, username, stock_id);
        Ok(removed)
    }

    async fn list_notes(&self, username: &str, stock_id: &str) -> Result<Vec<Note>, StoreError> {
        let query = self.cql(&format!(
            "SELECT {} FROM {{ks}}.notes WHERE username = ?",
            NOTE_COLUMNS
        ));
        let result = self.session().await?.query(query, (username,)).await?;
        let mut notes = Vec::new();
        for row in rows(result) {
            let note = note_from_row(&row)?;
            if note.stock_id == stock_id {
                notes.push(note);
            }
        }
        debug!("Fetched {} notes for {}/{}", notes.len(), username, stock_id);
        Ok(notes)
    }

    async fn find_note(&self, username: &str, id: &str) -> Result<Option<Note>, StoreError> {
        let query = self.cql(&format!(
            "SELECT {} FROM {{ks}}.notes WHERE username = ? AND id = ?",
            NOTE_COLUMNS
        ));
        let result = self.session().await?.query(query, (username, id)).await?;
        rows(result).first().map(note_from_row).transpose()
    }

    async fn insert_note(&self, note: &Note) -> Result<bool, StoreError> {
        let content = serde_json::to_string(&note.content)?;
        let query = self.cql(&format!(
            "INSERT INTO {{ks}}.notes ({}) VALUES (?, ?, ?, ?, ?) IF NOT EXISTS",
            NOTE_COLUMNS
        ));
        let result = self
            .session()
            .await?
            .query(
                query,
                (
                    note.username.as_str(),
                    note.id.as_str(),
                    note.stock_id.as_str(),
                    content,
                    note.created_at.to_rfc3339(),
                ),
            )
            .await?;
        applied(result)
    }

    async fn update_note(
        &self,
        username: &str,
        id: &str,
        content: &NoteContent,
    ) -> Result<bool, StoreError> {
        let content = serde_json::to_string(content)?;
        let query =
            self.cql("UPDATE {ks}.notes SET content = ? WHERE username = ? AND id = ? IF EXISTS");
        let result = self.session().await?.query(query, (content, username, id)).await?;
        applied(result)
    }

    async fn delete_note(&self, username: &str, id: &str) -> Result<(), StoreError> {
        let query = self.cql("DELETE FROM {ks}.notes WHERE username = ? AND id = ?");
        self.session().await?.query(query, (username, id)).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        match self.session.take().await {
            Some(session) => {
                drop(session);
                info!("Closed ScyllaDB session for keyspace {}.", self.keyspace);
            }
            None => debug!("ScyllaDB session for {} was already closed.", self.keyspace),
        }
        Ok(())
    }
}

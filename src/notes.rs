// src/notes.rs
use chrono::Utc;
use log::{debug, info};

use crate::db::Store;
use crate::error::ApiError;
use crate::models::{normalize_ticker, NewNote, Note, NotePatch, NoteContent};

/// The caller's notes for one stock, newest first.
pub async fn list(store: &dyn Store, username: &str, stock_id: &str) -> Result<Vec<Note>, ApiError> {
    let mut notes = store
        .list_notes(username, &normalize_ticker(stock_id))
        .await?;
    notes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(notes)
}

pub async fn create(store: &dyn Store, username: &str, body: NewNote) -> Result<Note, ApiError> {
    let note = body.into_note(username, Utc::now())?;
    if !store.insert_note(&note).await? {
        return Err(ApiError::Conflict(format!("Note {} already exists", note.id)));
    }
    info!("Note {} added to {} for {}.", note.id, note.stock_id, username);
    Ok(note)
}

pub async fn update(
    store: &dyn Store,
    username: &str,
    id: &str,
    patch: NotePatch,
) -> Result<bool, ApiError> {
    let content = NoteContent::from(patch.content);
    let matched = store.update_note(username, id, &content).await?;
    if !matched {
        debug!("Update of note {} by {} matched nothing.", id, username);
    }
    Ok(matched)
}

pub async fn delete(store: &dyn Store, username: &str, id: &str) -> Result<(), ApiError> {
    store.delete_note(username, id).await?;
    info!("Note {} deleted for {}.", id, username);
    Ok(())
}

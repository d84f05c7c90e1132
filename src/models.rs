// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// bcrypt hash, never the plain password.
    pub password: String,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
}

/// A watchlist entry. `id` always equals `ticker_symbol`, the identifier
/// within an owner's list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub id: String,
    pub ticker_symbol: String,
    pub display_name: String,
    pub chart_id: String,
    pub created_at: DateTime<Utc>,
    pub is_interesting: bool,
    pub bookmark_color: String,
    pub username: String,
}

impl Stock {
    pub fn apply(&mut self, patch: &StockPatch) {
        if let Some(display_name) = &patch.display_name {
            self.display_name = display_name.clone();
        }
        if let Some(chart_id) = &patch.chart_id {
            self.chart_id = chart_id.clone();
        }
        if let Some(is_interesting) = patch.is_interesting {
            self.is_interesting = is_interesting;
        }
        if let Some(bookmark_color) = &patch.bookmark_color {
            self.bookmark_color = bookmark_color.clone();
        }
    }

    pub fn is_bookmarked(&self) -> bool {
        !self.bookmark_color.is_empty()
    }
}

/// Body of `POST /stocks`. An owner supplied by the client is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStock {
    #[serde(default)]
    pub ticker_symbol: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_interesting: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark_color: Option<String>,
}

impl NewStock {
    pub fn new(ticker_symbol: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            ticker_symbol: ticker_symbol.into(),
            display_name: display_name.into(),
            ..Default::default()
        }
    }

    pub fn into_stock(self, username: &str, now: DateTime<Utc>) -> Result<Stock, ApiError> {
        let ticker_symbol = normalize_ticker(&self.ticker_symbol);
        if ticker_symbol.is_empty() {
            return Err(ApiError::BadRequest("ticker_symbol is required".into()));
        }
        let display_name = self.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(ApiError::BadRequest("display_name is required".into()));
        }

        Ok(Stock {
            id: ticker_symbol.clone(),
            ticker_symbol,
            display_name,
            chart_id: self.chart_id.unwrap_or_default(),
            created_at: normalize_created_at(self.created_at.as_ref(), now),
            is_interesting: self.is_interesting.unwrap_or(false),
            bookmark_color: self.bookmark_color.unwrap_or_default(),
            username: username.to_string(),
        })
    }
}

/// Body of `PUT /stocks/:id`. Identity fields are not patchable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_interesting: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark_color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MovingAverages {
    #[serde(default)]
    pub ma10: bool,
    #[serde(default)]
    pub ma50: bool,
    #[serde(default)]
    pub ma150: bool,
    #[serde(default)]
    pub ma200: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Volume {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    #[serde(rename = "EUR")]
    Eur,
    #[serde(rename = "USD")]
    Usd,
}

/// Technical analysis captured by the note wizard.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StructuredAnalysis {
    #[serde(alias = "movingAverages")]
    pub moving_averages: MovingAverages,
    pub volume: Volume,
    pub support: String,
    pub resistance: String,
    pub currency: Currency,
    #[serde(alias = "additionalNotes")]
    pub additional_notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoteContent {
    Freeform { text: String },
    Structured { analysis: StructuredAnalysis },
}

impl NoteContent {
    pub fn freeform(text: impl Into<String>) -> Self {
        NoteContent::Freeform { text: text.into() }
    }

    /// Reads a legacy string body. Serialized wizard output becomes structured.
    pub fn from_legacy(raw: &str) -> Self {
        if raw.trim_start().starts_with('{') {
            if let Ok(analysis) = serde_json::from_str::<StructuredAnalysis>(raw) {
                return NoteContent::Structured { analysis };
            }
        }
        NoteContent::freeform(raw)
    }
}

/// Note content as accepted on the wire: the tagged form or a bare string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentInput {
    Tagged(NoteContent),
    Legacy(String),
}

impl From<ContentInput> for NoteContent {
    fn from(input: ContentInput) -> Self {
        match input {
            ContentInput::Tagged(content) => content,
            ContentInput::Legacy(raw) => NoteContent::from_legacy(&raw),
        }
    }
}

impl From<NoteContent> for ContentInput {
    fn from(content: NoteContent) -> Self {
        ContentInput::Tagged(content)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub stock_id: String,
    pub content: NoteContent,
    pub created_at: DateTime<Utc>,
    pub username: String,
}

/// Body of `POST /notes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub stock_id: String,
    pub content: ContentInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
}

impl NewNote {
    pub fn new(stock_id: impl Into<String>, content: NoteContent) -> Self {
        Self {
            id: None,
            stock_id: stock_id.into(),
            content: content.into(),
            created_at: None,
        }
    }

    pub fn into_note(self, username: &str, now: DateTime<Utc>) -> Result<Note, ApiError> {
        let stock_id = normalize_ticker(&self.stock_id);
        if stock_id.is_empty() {
            return Err(ApiError::BadRequest("stock_id is required".into()));
        }
        let id = match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };

        Ok(Note {
            id,
            stock_id,
            content: self.content.into(),
            created_at: normalize_created_at(self.created_at.as_ref(), now),
            username: username.to_string(),
        })
    }
}

/// Body of `PUT /notes/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotePatch {
    pub content: ContentInput,
}

pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Keeps a client timestamp only when it is a valid RFC 3339 string.
pub fn normalize_created_at(raw: Option<&Value>, now: DateTime<Utc>) -> DateTime<Utc> {
    raw.and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn new_stock_is_normalized_and_stamped() {
        let body: NewStock = serde_json::from_value(json!({
            "ticker_symbol": " aapl ",
            "display_name": "Apple Inc.",
            "username": "mallory",
            "created_at": "2024-01-02T03:04:05+02:00"
        }))
        .unwrap();
        let stock = body.into_stock("alice", now()).unwrap();
        assert_eq!(stock.ticker_symbol, "AAPL");
        assert_eq!(stock.id, "AAPL");
        assert_eq!(stock.username, "alice");
        assert_eq!(
            stock.created_at,
            Utc.with_ymd_and_hms(2024, 1, 2, 1, 4, 5).unwrap()
        );
        assert!(!stock.is_interesting);
        assert!(!stock.is_bookmarked());
    }

    #[test]
    fn unparsable_created_at_is_regenerated() {
        assert_eq!(normalize_created_at(Some(&json!("yesterday")), now()), now());
        assert_eq!(normalize_created_at(Some(&json!(1714560000)), now()), now());
        assert_eq!(normalize_created_at(None, now()), now());
    }

    #[test]
    fn missing_stock_fields_are_rejected() {
        let err = NewStock::new("", "Apple").into_stock("alice", now()).unwrap_err();
        assert!(err.to_string().contains("ticker_symbol"));
        let err = NewStock::new("AAPL", "  ").into_stock("alice", now()).unwrap_err();
        assert!(err.to_string().contains("display_name"));
    }

    #[test]
    fn patch_only_touches_supplied_fields() {
        let mut stock = NewStock::new("MSFT", "Microsoft")
            .into_stock("alice", now())
            .unwrap();
        let patch: StockPatch = serde_json::from_value(json!({
            "bookmark_color": "text-red-500",
            "ticker_symbol": "EVIL",
            "username": "bob"
        }))
        .unwrap();
        stock.apply(&patch);
        assert_eq!(stock.bookmark_color, "text-red-500");
        assert_eq!(stock.ticker_symbol, "MSFT");
        assert_eq!(stock.username, "alice");
        assert_eq!(stock.display_name, "Microsoft");
    }

    #[test]
    fn wizard_json_string_becomes_structured() {
        let raw = json!({
            "movingAverages": { "ma10": true, "ma50": false, "ma150": false, "ma200": true },
            "volume": "High",
            "support": "180",
            "resistance": "195",
            "additionalNotes": "watch earnings",
            "currency": "USD"
        })
        .to_string();
        match NoteContent::from_legacy(&raw) {
            NoteContent::Structured { analysis } => {
                assert!(analysis.moving_averages.ma10);
                assert!(analysis.moving_averages.ma200);
                assert_eq!(analysis.volume, Volume::High);
                assert_eq!(analysis.currency, Currency::Usd);
                assert_eq!(analysis.additional_notes, "watch earnings");
            }
            other => panic!("expected structured content, got {:?}", other),
        }
    }

    #[test]
    fn other_strings_stay_freeform() {
        assert_eq!(
            NoteContent::from_legacy("# Thesis\nstrong moat"),
            NoteContent::freeform("# Thesis\nstrong moat")
        );
        assert_eq!(
            NoteContent::from_legacy(r#"{"price": 3}"#),
            NoteContent::freeform(r#"{"price": 3}"#)
        );
    }

    #[test]
    fn content_input_accepts_tagged_and_bare_forms() {
        let tagged: ContentInput =
            serde_json::from_value(json!({ "kind": "freeform", "text": "hi" })).unwrap();
        assert_eq!(NoteContent::from(tagged), NoteContent::freeform("hi"));

        let bare: ContentInput = serde_json::from_value(json!("hello")).unwrap();
        assert_eq!(NoteContent::from(bare), NoteContent::freeform("hello"));

        let serialized = serde_json::to_value(NoteContent::Structured {
            analysis: StructuredAnalysis::default(),
        })
        .unwrap();
        assert_eq!(serialized["kind"], "structured");
        assert_eq!(serialized["analysis"]["volume"], "Low");
        assert_eq!(serialized["analysis"]["currency"], "EUR");
    }

    #[test]
    fn new_note_generates_id_and_requires_stock() {
        let note = NewNote::new("aapl", NoteContent::freeform("x"))
            .into_note("alice", now())
            .unwrap();
        assert!(!note.id.is_empty());
        assert_eq!(note.stock_id, "AAPL");
        assert_eq!(note.created_at, now());

        let err = NewNote::new(" ", NoteContent::freeform("x"))
            .into_note("alice", now())
            .unwrap_err();
        assert!(err.to_string().contains("stock_id"));
    }
}

// src/client.rs
use log::{debug, info};
use percent_encoding::{utf8_percent_encode, AsciiSet, PercentEncode, CONTROLS};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::{
    Credentials, LoginResponse, NewNote, NewStock, Note, NoteContent, NotePatch, Stock, StockPatch,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("not logged in")]
    NotAuthenticated,

    #[error("session rejected by server, log in again")]
    Unauthorized,

    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Characters that cannot appear raw inside one URL path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn segment(raw: &str) -> PercentEncode<'_> {
    utf8_percent_encode(raw, SEGMENT)
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
struct Session {
    token: String,
    username: String,
}

/// Typed wrapper over the `/api` endpoints.
///
/// Starts anonymous. A successful [`login`](ApiClient::login) stores the
/// bearer token; any 401 on an authenticated call drops it again, which is
/// how an expired token is noticed.
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: Option<Session>,
}

impl ApiClient {
    /// `base_url` is the server origin, e.g. `http://127.0.0.1:4000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn username(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.username.as_str())
    }

    pub fn logout(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Logged out {}.", session.username);
        }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url("register"))
            .json(&Credentials::new(username, password))
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url("login"))
            .json(&Credentials::new(username, password))
            .send()
            .await?;
        let login: LoginResponse = check(response).await?.json().await?;
        info!("Logged in as {}.", login.username);
        self.session = Some(Session {
            token: login.token,
            username: login.username,
        });
        Ok(())
    }

    pub async fn list_stocks(&mut self) -> Result<Vec<Stock>, ClientError> {
        let request = self.authed(self.http.get(self.url("stocks")))?;
        self.send_json(request).await
    }

    pub async fn stocks_with_color(&mut self, color: &str) -> Result<Vec<Stock>, ClientError> {
        let request = self.authed(
            self.http
                .get(self.url("stocks"))
                .query(&[("bookmark_color", color)]),
        )?;
        self.send_json(request).await
    }

    pub async fn stock_groups(&mut self) -> Result<BTreeMap<String, Vec<Stock>>, ClientError> {
        let request = self.authed(self.http.get(self.url("stocks/groups")))?;
        self.send_json(request).await
    }

    pub async fn add_stock(&mut self, stock: &NewStock) -> Result<Stock, ClientError> {
        let request = self.authed(self.http.post(self.url("stocks")).json(stock))?;
        self.send_json(request).await
    }

    pub async fn update_stock(
        &mut self,
        ticker: &str,
        patch: &StockPatch,
    ) -> Result<(), ClientError> {
        let url = self.url(&format!("stocks/{}", segment(ticker)));
        let request = self.authed(self.http.put(url).json(patch))?;
        self.send(request).await.map(|_| ())
    }

    pub async fn delete_stock(&mut self, ticker: &str) -> Result<(), ClientError> {
        let url = self.url(&format!("stocks/{}", segment(ticker)));
        let request = self.authed(self.http.delete(url))?;
        self.send(request).await.map(|_| ())
    }

    pub async fn list_notes(&mut self, stock_id: &str) -> Result<Vec<Note>, ClientError> {
        let url = self.url(&format!("notes/{}", segment(stock_id)));
        let request = self.authed(self.http.get(url))?;
        self.send_json(request).await
    }

    pub async fn add_note(
        &mut self,
        stock_id: &str,
        content: NoteContent,
    ) -> Result<Note, ClientError> {
        let body = NewNote::new(stock_id, content);
        let request = self.authed(self.http.post(self.url("notes")).json(&body))?;
        self.send_json(request).await
    }

    pub async fn update_note(&mut self, id: &str, content: NoteContent) -> Result<(), ClientError> {
        let body = NotePatch {
            content: content.into(),
        };
        let url = self.url(&format!("notes/{}", segment(id)));
        let request = self.authed(self.http.put(url).json(&body))?;
        self.send(request).await.map(|_| ())
    }

    pub async fn delete_note(&mut self, id: &str) -> Result<(), ClientError> {
        let url = self.url(&format!("notes/{}", segment(id)));
        let request = self.authed(self.http.delete(url))?;
        self.send(request).await.map(|_| ())
    }

    /// `path` must already have its dynamic segments encoded.
    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let session = self.session.as_ref().ok_or(ClientError::NotAuthenticated)?;
        Ok(request.bearer_auth(&session.token))
    }

    async fn send(&mut self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.send().await?;
        match check(response).await {
            Err(ClientError::Unauthorized) => {
                debug!("Server rejected the stored token; dropping session.");
                self.session = None;
                Err(ClientError::Unauthorized)
            }
            other => other,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &mut self,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        Ok(self.send(request).await?.json().await?)
    }
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED && response.url().path() != "/api/login" {
        return Err(ClientError::Unauthorized);
    }
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

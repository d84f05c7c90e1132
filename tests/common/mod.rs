// tests/common/mod.rs
#![allow(dead_code)]

use chrono::Duration;
use serde_json::{json, Value};
use std::sync::Arc;
use warp::http::StatusCode;

use stockfolio::api::{self, AppContext};
use stockfolio::auth::Authenticator;
use stockfolio::db::MemoryStore;

pub const SECRET: &str = "integration-secret";

pub fn context() -> AppContext {
    AppContext::new(
        Arc::new(MemoryStore::new()),
        Authenticator::new(SECRET, Duration::days(7), 4),
    )
}

pub struct TestApp {
    pub ctx: AppContext,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        Self { ctx: context() }
    }

    pub async fn call(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut request = warp::test::request().method(method).path(path);
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {}", token));
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.reply(&api::routes(self.ctx.clone())).await;
        let body = if response.body().is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(response.body()).expect("response body is JSON")
        };
        TestResponse {
            status: response.status(),
            body,
        }
    }

    pub async fn register(&self, username: &str, password: &str) -> TestResponse {
        self.call(
            "POST",
            "/api/register",
            None,
            Some(json!({ "username": username, "password": password })),
        )
        .await
    }

    pub async fn login(&self, username: &str, password: &str) -> TestResponse {
        self.call(
            "POST",
            "/api/login",
            None,
            Some(json!({ "username": username, "password": password })),
        )
        .await
    }

    /// Registers and logs in, returning the bearer token.
    pub async fn signup(&self, username: &str) -> String {
        let password = format!("{}-password", username);
        assert_eq!(self.register(username, &password).await.status, StatusCode::CREATED);
        let login = self.login(username, &password).await;
        assert_eq!(login.status, StatusCode::OK);
        login.body["token"].as_str().unwrap().to_string()
    }

    pub async fn add_stock(&self, token: &str, ticker: &str, name: &str) -> TestResponse {
        self.call(
            "POST",
            "/api/stocks",
            Some(token),
            Some(json!({ "ticker_symbol": ticker, "display_name": name })),
        )
        .await
    }

    pub async fn add_note(&self, token: &str, stock_id: &str, content: Value) -> TestResponse {
        self.call(
            "POST",
            "/api/notes",
            Some(token),
            Some(json!({ "stock_id": stock_id, "content": content })),
        )
        .await
    }
}

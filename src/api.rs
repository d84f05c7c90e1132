// src/api.rs
use log::{error, info, warn};
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::auth::{with_auth, Authenticator};
use crate::bookmarks::StockFilter;
use crate::db::Store;
use crate::error::{handle_rejection, ApiError};
use crate::models::{Credentials, NewNote, NewStock, NotePatch, StockPatch};
use crate::{notes, stocks};

const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Handles shared by every request.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn Store>,
    pub auth: Arc<Authenticator>,
}

impl AppContext {
    pub fn new(store: Arc<dyn Store>, auth: Authenticator) -> Self {
        Self {
            store,
            auth: Arc::new(auth),
        }
    }
}

/// The full `/api` tree, with rejections rendered as `{ "error": ... }`.
pub fn routes(
    ctx: AppContext,
) -> impl Filter<Extract = impl Reply, Error = std::convert::Infallible> + Clone {
    let health = warp::path!("health")
        .and(warp::get())
        .map(|| warp::reply::json(&json!({ "status": "ok" })));

    warp::path("api")
        .and(
            health
                .or(auth_routes(ctx.clone()))
                .or(stock_routes(ctx.clone()))
                .or(note_routes(ctx)),
        )
        .recover(handle_rejection)
        .with(warp::log("stockfolio::api"))
}

fn auth_routes(
    ctx: AppContext,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let register = warp::path!("register")
        .and(warp::post())
        .and(with_context(ctx.clone()))
        .and(json_body::<Credentials>())
        .and_then(register_handler);

    let login = warp::path!("login")
        .and(warp::post())
        .and(with_context(ctx))
        .and(json_body::<Credentials>())
        .and_then(login_handler);

    register.or(login)
}

fn stock_routes(
    ctx: AppContext,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list = warp::path!("stocks")
        .and(warp::get())
        .and(with_auth(ctx.auth.clone()))
        .and(warp::query::<StockFilter>())
        .and(with_context(ctx.clone()))
        .and_then(list_stocks_handler);

    let groups = warp::path!("stocks" / "groups")
        .and(warp::get())
        .and(with_auth(ctx.auth.clone()))
        .and(with_context(ctx.clone()))
        .and_then(stock_groups_handler);

    let create = warp::path!("stocks")
        .and(warp::post())
        .and(with_auth(ctx.auth.clone()))
        .and(with_context(ctx.clone()))
        .and(json_body::<NewStock>())
        .and_then(create_stock_handler);

    let update = warp::path!("stocks" / String)
        .and(warp::put())
        .and(with_auth(ctx.auth.clone()))
        .and(with_context(ctx.clone()))
        .and(json_body::<StockPatch>())
        .and_then(update_stock_handler);

    let delete = warp::path!("stocks" / String)
        .and(warp::delete())
        .and(with_auth(ctx.auth.clone()))
        .and(with_context(ctx))
        .and_then(delete_stock_handler);

    list.or(groups).or(create).or(update).or(delete)
}

fn note_routes(
    ctx: AppContext,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list = warp::path!("notes" / String)
        .and(warp::get())
        .and(with_auth(ctx.auth.clone()))
        .and(with_context(ctx.clone()))
        .and_then(list_notes_handler);

    let create = warp::path!("notes")
        .and(warp::post())
        .and(with_auth(ctx.auth.clone()))
        .and(with_context(ctx.clone()))
        .and(json_body::<NewNote>())
        .and_then(create_note_handler);

    let update = warp::path!("notes" / String)
        .and(warp::put())
        .and(with_auth(ctx.auth.clone()))
        .and(with_context(ctx.clone()))
        .and(json_body::<NotePatch>())
        .and_then(update_note_handler);

    let delete = warp::path!("notes" / String)
        .and(warp::delete())
        .and(with_auth(ctx.auth.clone()))
        .and(with_context(ctx))
        .and_then(delete_note_handler);

    list.or(create).or(update).or(delete)
}

fn with_context(
    ctx: AppContext,
) -> impl Filter<Extract = (AppContext,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// Path parameters reach the handlers still percent-encoded.
fn decode_segment(raw: &str) -> Result<String, ApiError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ApiError::BadRequest(format!("Invalid path segment: {}", raw)))
}

fn failed(action: &str, err: ApiError) -> Rejection {
    if err.status().is_server_error() {
        error!("Failed to {}: {}", action, err);
    } else {
        warn!("Failed to {}: {}", action, err);
    }
    err.into()
}

fn success() -> impl Reply {
    warp::reply::json(&json!({ "success": true }))
}

async fn register_handler(ctx: AppContext, creds: Credentials) -> Result<impl Reply, Rejection> {
    match ctx.auth.register(ctx.store.as_ref(), &creds).await {
        Ok(()) => Ok(warp::reply::with_status(success(), StatusCode::CREATED)),
        Err(e) => Err(failed("register user", e)),
    }
}

async fn login_handler(ctx: AppContext, creds: Credentials) -> Result<impl Reply, Rejection> {
    match ctx.auth.login(ctx.store.as_ref(), &creds).await {
        Ok(response) => {
            info!("User {} logged in.", response.username);
            Ok(warp::reply::json(&response))
        }
        Err(e) => Err(failed("log in", e)),
    }
}

async fn list_stocks_handler(
    username: String,
    filter: StockFilter,
    ctx: AppContext,
) -> Result<impl Reply, Rejection> {
    match stocks::list(ctx.store.as_ref(), &username, &filter).await {
        Ok(stocks) => Ok(warp::reply::json(&stocks)),
        Err(e) => Err(failed("fetch stocks", e)),
    }
}

async fn stock_groups_handler(username: String, ctx: AppContext) -> Result<impl Reply, Rejection> {
    match stocks::groups(ctx.store.as_ref(), &username).await {
        Ok(groups) => Ok(warp::reply::json(&groups)),
        Err(e) => Err(failed("group stocks", e)),
    }
}

async fn create_stock_handler(
    username: String,
    ctx: AppContext,
    body: NewStock,
) -> Result<impl Reply, Rejection> {
    match stocks::create(ctx.store.as_ref(), &username, body).await {
        Ok(stock) => Ok(warp::reply::with_status(
            warp::reply::json(&stock),
            StatusCode::CREATED,
        )),
        Err(e) => Err(failed("add stock", e)),
    }
}

async fn update_stock_handler(
    id: String,
    username: String,
    ctx: AppContext,
    patch: StockPatch,
) -> Result<impl Reply, Rejection> {
    let id = decode_segment(&id).map_err(|e| failed("update stock", e))?;
    match stocks::update(ctx.store.as_ref(), &username, &id, &patch).await {
        Ok(_) => Ok(success()),
        Err(e) => Err(failed("update stock", e)),
    }
}

async fn delete_stock_handler(
    id: String,
    username: String,
    ctx: AppContext,
) -> Result<impl Reply, Rejection> {
    let id = decode_segment(&id).map_err(|e| failed("delete stock", e))?;
    match stocks::delete(ctx.store.as_ref(), &username, &id).await {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err(failed("delete stock", e)),
    }
}

async fn list_notes_handler(
    stock_id: String,
    username: String,
    ctx: AppContext,
) -> Result<impl Reply, Rejection> {
    let stock_id = decode_segment(&stock_id).map_err(|e| failed("fetch notes", e))?;
    match notes::list(ctx.store.as_ref(), &username, &stock_id).await {
        Ok(notes) => Ok(warp::reply::json(&notes)),
        Err(e) => Err(failed("fetch notes", e)),
    }
}

async fn create_note_handler(
    username: String,
    ctx: AppContext,
    body: NewNote,
) -> Result<impl Reply, Rejection> {
    match notes::create(ctx.store.as_ref(), &username, body).await {
        Ok(note) => Ok(warp::reply::with_status(
            warp::reply::json(&note),
            StatusCode::CREATED,
        )),
        Err(e) => Err(failed("add note", e)),
    }
}

async fn update_note_handler(
    id: String,
    username: String,
    ctx: AppContext,
    patch: NotePatch,
) -> Result<impl Reply, Rejection> {
    let id = decode_segment(&id).map_err(|e| failed("update note", e))?;
    match notes::update(ctx.store.as_ref(), &username, &id, patch).await {
        Ok(_) => Ok(success()),
        Err(e) => Err(failed("update note", e)),
    }
}

async fn delete_note_handler(
    id: String,
    username: String,
    ctx: AppContext,
) -> Result<impl Reply, Rejection> {
    let id = decode_segment(&id).map_err(|e| failed("delete note", e))?;
    match notes::delete(ctx.store.as_ref(), &username, &id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err(failed("delete note", e)),
    }
}

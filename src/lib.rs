// src/lib.rs
//! Personal stock watchlist service: accounts, per-user stocks and
//! analysis notes behind a bearer-token JSON API.

pub mod api;
pub mod auth;
pub mod bookmarks;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notes;
pub mod stocks;

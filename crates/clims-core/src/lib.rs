//! Core library for the CLIMS IT asset client.
//!
//! - `auth`: the session manager, token persistence and role checks
//! - `api`: HTTP transport, error taxonomy and the typed inventory client
//! - `models`: request and response types of the REST API
//! - `cache`: offline copies and optimistic list edits
//! - `config`: user configuration with environment overrides

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError, InventoryClient, RequestOptions};
pub use auth::{Identity, SessionManager, SessionState};
pub use config::Config;

//! noraneko-id - a multi-tenant OAuth2 / OpenID Connect authorization server.
//!
//! Every OAuth client doubles as an identity pool: users belong to exactly
//! one client, and every credential the server issues is bound to a
//! (client, user) pair. The library exposes the protocol engine and its
//! supporting pieces; the binary in `main.rs` wires them to a socket.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::repository::Repository;

pub mod api;
pub mod config;
pub mod crypto;
pub mod entity;
pub mod error;
pub mod jwt;
pub mod oauth2;
pub mod repository;

/// Shared per-process resources, cloned into every handler.
///
/// Constructed once in `main` (or in tests with an in-memory database) and
/// threaded through axum state - there is no global database handle.
#[derive(Clone)]
pub struct AppResources {
    pub repo: Repository,
    pub config: Arc<AppConfig>,
}

impl AppResources {
    pub fn new(db: Arc<DatabaseConnection>, config: Arc<AppConfig>) -> Self {
        Self {
            repo: Repository::new(db),
            config,
        }
    }
}

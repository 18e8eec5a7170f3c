// src/lib.rs
//! Anonymous polls: create multi-option polls, vote once per address, and
//! browse public polls with search, sorting and pagination.
use std::sync::Arc;

use axum::Router;

pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod store;
pub mod token;
pub mod validation;

use config::Config;
use store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
}

pub fn build_app(store: Arc<dyn Store>, config: Config) -> Router {
    routes::create_routes(AppState {
        store,
        config: Arc::new(config),
    })
}

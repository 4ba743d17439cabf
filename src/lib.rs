pub mod auth;
pub mod config;
pub mod db;
pub mod logging;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;

use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::db::DatabaseProxy;
use crate::state::AppState;

/// Full HTTP application over an already-connected ledger database.
pub fn create_app(config: Config, db_proxy: Arc<DatabaseProxy>) -> axum::Router {
    let state = AppState::new(config, db_proxy);

    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

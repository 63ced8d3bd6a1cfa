pub mod auth;
pub mod error;
mod handlers;
mod web;

use std::sync::Arc;

use axum::{
    http::{HeaderName, HeaderValue},
    routing::get,
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::codec::Codec;
use crate::config::Config;
use crate::session::SessionRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::stats::StatsTracker;

/// Shared state behind every handler. Cheap to clone; everything inside
/// is an `Arc` or atomic-backed.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    pub stats: StatsTracker,
    pub config: Arc<Config>,
    pub codec: Codec,
    pub shutdown: ShutdownCoordinator,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let codec = Codec::new(config.compression);
        Self {
            sessions: SessionRegistry::new(),
            stats: StatsTracker::new(),
            config: Arc::new(config),
            codec,
            shutdown: ShutdownCoordinator::new(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/runner", get(handlers::runner_ws))
        .route("/ws", get(handlers::viewer_ws))
        .route("/healthz", get(handlers::health))
        .fallback(web::viewer_asset)
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .with_state(state)
}

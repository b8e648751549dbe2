//! HTTP route configuration.
//!
//! # Endpoints
//!
//! - `GET /` - health check
//! - `GET /realtime` - WebSocket upgrade for direct text clients
//! - `GET {media path}` - WebSocket upgrade for ACS media streams
//!   (default `/acs/media`, configurable)
//! - `POST /acs/calls` - initiate an outbound call
//! - `POST /acs/callbacks` - ACS call-state webhook

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the gateway router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let media_path = state.config.media_ws_path.clone();

    Router::new()
        .route("/", get(handlers::api::health_check))
        .route("/realtime", get(handlers::relay::realtime_handler))
        .route(&media_path, get(handlers::relay::media_handler))
        .route("/acs/calls", post(handlers::acs::initiate_call))
        .route("/acs/callbacks", post(handlers::acs::call_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Plain HTTP handlers.

use axum::Json;
use serde_json::{Value, json};

/// Health check.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

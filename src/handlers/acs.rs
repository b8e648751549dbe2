//! ACS call-signaling handlers: outbound call initiation and the
//! call-state webhook.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::state::AppState;

/// Body of an outbound-call request.
#[derive(Debug, Deserialize)]
pub struct OutboundCallRequest {
    /// E.164 number to dial
    pub target_number: String,
}

/// Place an outbound call with media streaming attached.
pub async fn initiate_call(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OutboundCallRequest>,
) -> Response {
    let Some(caller) = &state.caller else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "outbound calling is not configured" })),
        )
            .into_response();
    };

    match caller.initiate_call(&request.target_number).await {
        Ok(call_connection_id) => (
            StatusCode::CREATED,
            Json(json!({ "callConnectionId": call_connection_id })),
        )
            .into_response(),
        Err(e) => {
            error!("outbound call failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "outbound call failed" })),
            )
                .into_response()
        }
    }
}

/// One CloudEvent from the call-state webhook.
#[derive(Debug, Deserialize)]
pub struct CloudEvent {
    /// Event type, e.g. `Microsoft.Communication.CallConnected`
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload
    #[serde(default)]
    pub data: Option<Value>,
}

/// Call-state webhook. ACS posts an array of CloudEvents; each is logged
/// and acknowledged.
pub async fn call_events(Json(events): Json<Vec<CloudEvent>>) -> StatusCode {
    for event in events {
        let Some(data) = event.data else {
            continue;
        };

        let call_connection_id = data
            .get("callConnectionId")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(
            event_type = %event.event_type,
            call_connection_id,
            "call event received"
        );

        if event.event_type == "Microsoft.Communication.CallConnected" {
            info!(call_connection_id, "call connected, media stream expected");
        }
    }

    StatusCode::OK
}

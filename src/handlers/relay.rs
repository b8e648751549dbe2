//! Relay WebSocket handlers.
//!
//! Two upgrade endpoints share the relay core: `/realtime` for direct text
//! clients speaking the realtime event protocol, and the ACS media endpoint
//! for telephony-bridged calls. Both tag the transcript with the
//! `callConnectionId` query parameter and hand the finished transcript to
//! the configured store.

use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use serde::Deserialize;
use tracing::{error, info};

use crate::core::relay::{
    RelayConfig, RelayMode, RelaySession, SessionSettings, sanitize_call_id,
};
use crate::state::AppState;

/// Query parameters accepted by both relay endpoints.
#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    /// ACS call connection id used to tag the transcript
    #[serde(rename = "callConnectionId")]
    pub call_connection_id: Option<String>,
}

/// Direct text client relay endpoint.
///
/// Frames pass through unconverted; `session.update` bodies are still
/// rewritten against the configured session settings.
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<RelayQuery>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    upgrade(ws, query, state, headers, RelayMode::Text)
}

/// Telephony media-stream relay endpoint.
///
/// ACS opens this socket once the call connects; frames are translated
/// through the format adapter in both directions.
pub async fn media_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<RelayQuery>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    upgrade(ws, query, state, headers, RelayMode::Telephony)
}

fn upgrade(
    ws: WebSocketUpgrade,
    query: RelayQuery,
    state: Arc<AppState>,
    headers: HeaderMap,
    mode: RelayMode,
) -> Response {
    let client_request_id = headers
        .get("x-ms-client-request-id")
        .and_then(|value| value.to_str().ok())
        .map(String::from);

    info!(mode = ?mode, call_connection_id = ?query.call_connection_id, "relay upgrade requested");

    ws.on_upgrade(move |socket| run_relay(socket, query, state, client_request_id, mode))
}

async fn run_relay(
    socket: WebSocket,
    query: RelayQuery,
    state: Arc<AppState>,
    client_request_id: Option<String>,
    mode: RelayMode,
) {
    let session = match build_session(&state, mode).await {
        Ok(session) => session,
        Err(e) => {
            error!("refusing relay: {e}");
            return;
        }
    };

    let raw_call_id = query.call_connection_id.as_deref();
    let call_id = sanitize_call_id(raw_call_id);
    let transcript = session.run(socket, raw_call_id, client_request_id).await;

    if let Some(store) = &state.transcript_store
        && let Err(e) = store.save(&call_id, &transcript).await
    {
        error!(call_id = %call_id, "failed to persist transcript: {e}");
    }
}

async fn build_session(
    state: &AppState,
    mode: RelayMode,
) -> crate::core::relay::RelayResult<RelaySession> {
    let config = &state.config;
    RelaySession::new(RelayConfig {
        endpoint: config.azure_openai_endpoint.clone(),
        deployment: config.azure_openai_deployment.clone(),
        credential: state.credential.clone(),
        settings: SessionSettings {
            voice: config.voice.clone(),
            model: config.model.clone(),
            instructions: config.system_message.clone(),
            temperature: config.temperature,
            max_response_tokens: config.max_response_tokens,
            disable_audio: config.disable_audio,
            ..Default::default()
        },
        mode,
    })
    .await
}

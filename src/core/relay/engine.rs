//! The bidirectional relay pump.
//!
//! One relay run pairs the client-facing WebSocket (telephony media stream
//! or direct text client) with a freshly opened realtime API WebSocket and
//! pumps frames both ways until either side goes away. Each direction runs
//! as its own task; each socket sink is owned by a writer task fed through a
//! channel so both pumps can emit on either connection without locking.
//!
//! Every failure inside the pumps is contained here: transport resets and
//! malformed frames end the run gracefully and the transcript is still
//! finalized. Only credential resolution at session construction surfaces an
//! error to the caller.

use std::time::Instant;

use axum::extract::ws::{Message as ClientMessage, WebSocket};
use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::{self, Message as UpstreamMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

use super::adapter;
use super::messages::{UpstreamEventKind, item_call_id, item_kind, response_create};
use super::session::{
    Credential, PendingToolCalls, RelayError, RelayMode, RelayResult, RelaySession,
    SessionSettings,
};
use super::transcript::{Role, TranscriptEntry, TranscriptLog, sanitize_call_id};

/// API version of the realtime endpoint this relay speaks.
pub const REALTIME_API_VERSION: &str = "2024-10-01-preview";

/// Capacity of each socket writer channel.
const CHANNEL_CAPACITY: usize = 256;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

impl RelaySession {
    /// Run the relay to completion and return the transcript.
    ///
    /// `raw_call_id` is the externally supplied call identifier (sanitized
    /// before use); `client_request_id` is propagated to the realtime
    /// endpoint when the client sent one. The run ends when either socket's
    /// stream ends or errors; the other connection is then torn down.
    pub async fn run(
        self,
        client: WebSocket,
        raw_call_id: Option<&str>,
        client_request_id: Option<String>,
    ) -> Vec<TranscriptEntry> {
        let call_id = sanitize_call_id(raw_call_id);
        let started = Instant::now();
        let log = TranscriptLog::new(call_id.clone());

        let upstream = match self.connect_upstream(client_request_id.as_deref()).await {
            Ok(socket) => socket,
            Err(e) => {
                error!(call_id = %call_id, "relay aborted before start: {e}");
                return log.finalize(started.elapsed());
            }
        };
        info!(call_id = %call_id, mode = ?self.mode, "relay started");

        let RelaySession {
            settings,
            mut pending,
            mode,
            ..
        } = self;

        let (client_sink, client_stream) = client.split();
        let (upstream_sink, upstream_stream) = upstream.split();

        let (client_tx, client_rx) = mpsc::channel::<ClientMessage>(CHANNEL_CAPACITY);
        let (upstream_tx, upstream_rx) = mpsc::channel::<UpstreamMessage>(CHANNEL_CAPACITY);
        let client_writer = tokio::spawn(drain_into_sink(client_sink, client_rx));
        let upstream_writer = tokio::spawn(drain_into_sink(upstream_sink, upstream_rx));

        let transcript = Mutex::new(log);

        let inbound = pump_client_to_upstream(
            client_stream,
            upstream_tx.clone(),
            &settings,
            mode,
            &transcript,
        );
        let outbound = pump_upstream_to_client(
            upstream_stream,
            client_tx,
            upstream_tx,
            &mut pending,
            mode,
            &transcript,
        );

        tokio::select! {
            _ = inbound => debug!(call_id = %call_id, "client stream ended"),
            _ = outbound => debug!(call_id = %call_id, "upstream stream ended"),
        }

        // Dropping the losing pump releases the remaining channel senders;
        // the writer tasks then flush, close both sockets and exit.
        let _ = tokio::join!(client_writer, upstream_writer);

        let entries = transcript.into_inner().finalize(started.elapsed());
        info!(call_id = %call_id, entries = entries.len(), "relay finished");
        entries
    }

    /// Open the realtime API WebSocket, resolving the credential into the
    /// appropriate header.
    async fn connect_upstream(&self, client_request_id: Option<&str>) -> RelayResult<UpstreamSocket> {
        let url = build_upstream_url(&self.endpoint, &self.deployment);
        let parsed =
            url::Url::parse(&url).map_err(|e| RelayError::InvalidEndpoint(e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| RelayError::InvalidEndpoint(format!("no host in {url}")))?;
        let host = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let mut request = http::Request::builder()
            .uri(&url)
            .header("Sec-WebSocket-Key", tungstenite::handshake::client::generate_key())
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host);

        request = match &self.credential {
            Credential::ApiKey(key) => request.header("api-key", key),
            Credential::Bearer(provider) => {
                let token = provider
                    .token()
                    .await
                    .map_err(|e| RelayError::AuthenticationFailed(e.to_string()))?;
                request.header("Authorization", format!("Bearer {token}"))
            }
        };
        if let Some(id) = client_request_id {
            request = request.header("x-ms-client-request-id", id);
        }

        let request = request
            .body(())
            .map_err(|e| RelayError::ConnectionFailed(e.to_string()))?;
        let (socket, _response) = connect_async(request)
            .await
            .map_err(|e| RelayError::ConnectionFailed(e.to_string()))?;
        Ok(socket)
    }
}

/// Build the realtime WebSocket URL for an endpoint + deployment pair.
fn build_upstream_url(endpoint: &str, deployment: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/openai/realtime?api-version={REALTIME_API_VERSION}&deployment={deployment}")
}

/// Feed a socket sink from its channel until every sender is gone, then
/// close the socket.
async fn drain_into_sink<S, M>(mut sink: S, mut rx: mpsc::Receiver<M>)
where
    S: Sink<M> + Unpin + Send + 'static,
    S::Error: std::fmt::Display,
    M: Send + 'static,
{
    while let Some(message) = rx.recv().await {
        if let Err(e) = sink.send(message).await {
            debug!("socket writer stopping: {e}");
            break;
        }
    }
    let _ = sink.close().await;
}

/// Client -> upstream pump.
///
/// Telephony frames are converted through the format adapter (frames with no
/// realtime equivalent are dropped); direct-text frames pass through. Every
/// `session.update` is rewritten against the session settings before it goes
/// out. Direct-text `conversation.input` messages are tapped into the
/// transcript.
async fn pump_client_to_upstream(
    mut client: SplitStream<WebSocket>,
    upstream_tx: mpsc::Sender<UpstreamMessage>,
    settings: &SessionSettings,
    mode: RelayMode,
    transcript: &Mutex<TranscriptLog>,
) {
    while let Some(received) = client.next().await {
        let message = match received {
            Ok(message) => message,
            Err(e) => {
                warn!("client socket error: {e}");
                break;
            }
        };
        let text = match message {
            ClientMessage::Text(text) => text,
            ClientMessage::Close(_) => {
                info!("client closed the connection");
                break;
            }
            _ => {
                debug!("ignoring non-text client frame");
                continue;
            }
        };

        let frame: Value = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                error!("malformed client frame, ending relay: {e}");
                break;
            }
        };

        if mode == RelayMode::Text
            && UpstreamEventKind::of(&frame) == UpstreamEventKind::ConversationInput
        {
            let content = frame
                .pointer("/input/text")
                .and_then(Value::as_str)
                .unwrap_or("[empty]");
            transcript.lock().await.append(Role::User, content);
        }

        let event = match mode {
            RelayMode::Telephony => match adapter::telephony_to_upstream(&frame, settings) {
                Some(event) => event,
                None => continue,
            },
            RelayMode::Text => frame,
        };
        let event = settings.apply_to(event);

        if upstream_tx
            .send(UpstreamMessage::Text(event.to_string().into()))
            .await
            .is_err()
        {
            break;
        }
    }
}

/// Upstream -> client pump.
///
/// Classifies every event, updates the pending tool-call set, injects
/// synthetic `response.create` frames where the protocol requires them, and
/// forwards whatever survives (through the format adapter in telephony
/// mode). Direct-text `conversation.output` messages are tapped into the
/// transcript.
async fn pump_upstream_to_client(
    mut upstream: SplitStream<UpstreamSocket>,
    client_tx: mpsc::Sender<ClientMessage>,
    upstream_tx: mpsc::Sender<UpstreamMessage>,
    pending: &mut PendingToolCalls,
    mode: RelayMode,
    transcript: &Mutex<TranscriptLog>,
) {
    while let Some(received) = upstream.next().await {
        let message = match received {
            Ok(message) => message,
            Err(e) => {
                warn!("upstream socket error: {e}");
                break;
            }
        };
        let text = match message {
            UpstreamMessage::Text(text) => text,
            UpstreamMessage::Close(_) => {
                info!("upstream closed the connection");
                break;
            }
            _ => {
                debug!("ignoring non-text upstream frame");
                continue;
            }
        };

        let frame: Value = match serde_json::from_str(text.as_str()) {
            Ok(frame) => frame,
            Err(e) => {
                error!("malformed upstream frame, ending relay: {e}");
                break;
            }
        };

        if mode == RelayMode::Text
            && UpstreamEventKind::of(&frame) == UpstreamEventKind::ConversationOutput
        {
            let content = frame.get("text").and_then(Value::as_str).unwrap_or("[empty]");
            transcript.lock().await.append(Role::Assistant, content);
        }

        let disposition = process_upstream_event(frame, pending);
        if disposition.force_response
            && upstream_tx
                .send(UpstreamMessage::Text(response_create().to_string().into()))
                .await
                .is_err()
        {
            break;
        }

        let Some(event) = disposition.forward else {
            continue;
        };
        let outbound = match mode {
            RelayMode::Telephony => match adapter::upstream_to_telephony(&event) {
                Some(frame) => frame,
                None => continue,
            },
            RelayMode::Text => event,
        };

        if client_tx
            .send(ClientMessage::Text(outbound.to_string().into()))
            .await
            .is_err()
        {
            break;
        }
    }
}

/// What to do with one upstream event.
struct UpstreamDisposition {
    /// The event to forward to the client, if any
    forward: Option<Value>,
    /// Whether to inject a synthetic `response.create` upstream
    force_response: bool,
}

/// The per-event state machine of the upstream -> client direction.
///
/// The session always drives itself forward after a configuration change,
/// and a finished response with tool calls still pending gets the set
/// cleared plus a forced response so the model always produces a
/// user-facing reply.
fn process_upstream_event(frame: Value, pending: &mut PendingToolCalls) -> UpstreamDisposition {
    let mut forward = true;
    let mut force_response = false;

    match UpstreamEventKind::of(&frame) {
        UpstreamEventKind::SessionUpdated => {
            debug!("session acknowledged, requesting a response");
            force_response = true;
        }
        UpstreamEventKind::AudioDelta => {}
        UpstreamEventKind::OutputItemAdded => {
            if item_kind(&frame) == Some("function_call") {
                let call_id = item_call_id(&frame).unwrap_or_default();
                let name = frame
                    .pointer("/item/name")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                debug!(call_id, name, "model started a tool call");
                pending.track(call_id, name);
                forward = false;
            }
        }
        UpstreamEventKind::ConversationItemCreated => {
            if matches!(
                item_kind(&frame),
                Some("function_call" | "function_call_output")
            ) {
                forward = false;
            }
        }
        UpstreamEventKind::FunctionCallArgumentsDelta => {
            if let (Some(call_id), Some(delta)) = (
                frame.get("call_id").and_then(Value::as_str),
                frame.get("delta").and_then(Value::as_str),
            ) {
                pending.append_arguments(call_id, delta);
            }
        }
        UpstreamEventKind::FunctionCallArgumentsDone => {
            if let Some(call_id) = frame.get("call_id").and_then(Value::as_str) {
                pending.remove(call_id);
            }
        }
        UpstreamEventKind::OutputItemDone => {
            if !pending.is_empty() {
                debug!(stalled = pending.len(), "draining stalled tool calls");
                pending.clear();
                force_response = true;
            }
        }
        UpstreamEventKind::SpeechStarted => {
            debug!("caller speech detected");
        }
        _ => {}
    }

    UpstreamDisposition {
        forward: forward.then_some(frame),
        force_response,
    }
}

// =============================================================================
// Tests
// =============================================================================

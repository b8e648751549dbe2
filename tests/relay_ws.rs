//! End-to-end relay tests against a mock realtime endpoint.
//!
//! Each test starts the gateway on an ephemeral port, points it at an
//! in-process mock of the realtime WebSocket API, and drives the client
//! side with a real WebSocket connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, accept_async, connect_async};

use voicebridge_gateway::core::relay::{Credential, Role, TranscriptEntry};
use voicebridge_gateway::storage::{MemoryTranscriptStore, TranscriptStore};
use voicebridge_gateway::{AppState, ServerConfig, routes};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

/// Start a one-connection mock realtime endpoint. Every received frame is
/// forwarded to the returned channel; `session.update` is acknowledged with
/// `session.updated` and `conversation.input` answered with a canned
/// `conversation.output`.
async fn spawn_mock_upstream() -> (SocketAddr, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = accept_async(stream).await else {
            return;
        };

        while let Some(Ok(message)) = ws.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                continue;
            };
            let frame_type = frame["type"].as_str().unwrap_or_default().to_string();
            let _ = tx.send(frame);

            let reply = match frame_type.as_str() {
                "session.update" => {
                    Some(json!({ "type": "session.updated", "session": { "id": "sess_1" } }))
                }
                "conversation.input" => {
                    Some(json!({ "type": "conversation.output", "text": "hi there" }))
                }
                _ => None,
            };
            if let Some(reply) = reply
                && ws.send(Message::Text(reply.to_string().into())).await.is_err()
            {
                break;
            }
        }
    });

    (addr, rx)
}

/// Telephony-scenario mock: acknowledges `session.update`, and answers the
/// first audio append with a scripted burst of audio deltas and tool-call
/// bookkeeping events.
async fn spawn_mock_upstream_telephony() -> (SocketAddr, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = accept_async(stream).await else {
            return;
        };

        while let Some(Ok(message)) = ws.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                continue;
            };
            let frame_type = frame["type"].as_str().unwrap_or_default().to_string();
            let _ = tx.send(frame);

            let replies = match frame_type.as_str() {
                "session.update" => {
                    vec![json!({ "type": "session.updated", "session": { "id": "sess_1" } })]
                }
                "input_audio_buffer.append" => vec![
                    json!({ "type": "response.audio.delta", "response_id": "r1", "delta": "AAAA" }),
                    json!({
                        "type": "response.output_item.added",
                        "item": { "type": "function_call", "call_id": "call_1", "name": "lookup" }
                    }),
                    json!({ "type": "response.output_item.done", "item": { "type": "function_call" } }),
                    json!({ "type": "response.audio.delta", "response_id": "r1", "delta": "BBBB" }),
                ],
                _ => vec![],
            };
            for reply in replies {
                if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                    return;
                }
            }
        }
    });

    (addr, rx)
}

/// Start the gateway against the given upstream endpoint, returning its
/// address and the shared in-memory transcript store.
async fn spawn_gateway(upstream_addr: SocketAddr) -> (SocketAddr, Arc<MemoryTranscriptStore>) {
    let config = ServerConfig {
        azure_openai_endpoint: format!("http://{upstream_addr}"),
        azure_openai_deployment: "gpt-4o-realtime".to_string(),
        azure_openai_api_key: Some("test-key".to_string()),
        ..Default::default()
    };

    let store = Arc::new(MemoryTranscriptStore::default());
    let state = AppState::new(
        config,
        Credential::ApiKey("test-key".to_string()),
        Some(store.clone() as Arc<dyn TranscriptStore>),
        None,
    );
    let app = routes::create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (addr, store)
}

async fn connect_client(addr: SocketAddr, path_and_query: &str) -> WsClient {
    let (ws, _) = timeout(WAIT, connect_async(format!("ws://{addr}{path_and_query}")))
        .await
        .expect("connect timed out")
        .expect("connect failed");
    ws
}

async fn send_json(ws: &mut WsClient, frame: Value) {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("send failed");
}

/// Next text frame from the client socket, parsed. Panics on timeout.
async fn next_json(source: &mut WsClient) -> Value {
    loop {
        let message = timeout(WAIT, source.next())
            .await
            .expect("receive timed out")
            .expect("stream ended")
            .expect("stream errored");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("non-JSON frame");
        }
    }
}

/// Next frame from the mock's received-channel. Panics on timeout.
async fn next_received(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    timeout(WAIT, rx.recv())
        .await
        .expect("mock receive timed out")
        .expect("mock channel closed")
}

/// Wait for the gateway to persist `count` transcripts.
async fn wait_for_saved(
    store: &MemoryTranscriptStore,
    count: usize,
) -> Vec<(String, Vec<TranscriptEntry>)> {
    for _ in 0..200 {
        let saved = store.saved().await;
        if saved.len() >= count {
            return saved;
        }
        sleep(Duration::from_millis(25)).await;
    }
    panic!("transcript was never persisted");
}

#[tokio::test]
async fn text_relay_round_trip_with_transcript() {
    let (upstream_addr, mut received) = spawn_mock_upstream().await;
    let (gateway_addr, store) = spawn_gateway(upstream_addr).await;

    let mut client =
        connect_client(gateway_addr, "/realtime?callConnectionId=abc%2F123%20def%21").await;

    // The session.update must be rewritten before it reaches the endpoint:
    // no tools registered means tool_choice "none" and an empty tool list.
    send_json(&mut client, json!({ "type": "session.update", "session": {} })).await;
    let session_update = next_received(&mut received).await;
    assert_eq!(session_update["type"], "session.update");
    assert_eq!(session_update["session"]["voice"], "alloy");
    assert_eq!(session_update["session"]["tool_choice"], "none");
    assert_eq!(session_update["session"]["tools"], json!([]));

    // The acknowledgment must trigger exactly one synthetic response.create.
    let forced = next_received(&mut received).await;
    assert_eq!(forced["type"], "response.create");

    // The acknowledgment itself is forwarded to the text client.
    let acked = next_json(&mut client).await;
    assert_eq!(acked["type"], "session.updated");

    // Text input passes through unchanged and lands in the transcript.
    send_json(
        &mut client,
        json!({ "type": "conversation.input", "input": { "text": "hello" } }),
    )
    .await;
    let forwarded = next_received(&mut received).await;
    assert_eq!(forwarded["type"], "conversation.input");
    assert_eq!(forwarded["input"]["text"], "hello");

    let output = next_json(&mut client).await;
    assert_eq!(output["type"], "conversation.output");
    assert_eq!(output["text"], "hi there");

    client.close(None).await.unwrap();

    let saved = wait_for_saved(&store, 1).await;
    let (call_id, entries) = &saved[0];
    assert_eq!(call_id, "abc123def");
    assert!(entries.iter().all(|entry| entry.call_id == "abc123def"));

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].role, Role::User);
    assert_eq!(entries[0].content, "hello");
    assert_eq!(entries[1].role, Role::Assistant);
    assert_eq!(entries[1].content, "hi there");

    let last = entries.last().unwrap();
    assert_eq!(last.role, Role::System);
    assert!(last.content.starts_with("Session duration: "));
}

#[tokio::test]
async fn telephony_relay_translates_and_drains_tool_calls() {
    let (upstream_addr, mut received) = spawn_mock_upstream_telephony().await;
    let (gateway_addr, store) = spawn_gateway(upstream_addr).await;

    let mut client = connect_client(gateway_addr, "/acs/media?callConnectionId=call-77").await;

    // The metadata frame becomes the configuration push.
    send_json(
        &mut client,
        json!({
            "kind": "AudioMetadata",
            "audioMetadata": { "encoding": "PCM", "sampleRate": 24000, "channels": 1 }
        }),
    )
    .await;
    let session_update = next_received(&mut received).await;
    assert_eq!(session_update["type"], "session.update");
    assert_eq!(session_update["session"]["voice"], "alloy");
    assert_eq!(session_update["session"]["turn_detection"]["type"], "server_vad");
    assert_eq!(session_update["session"]["tool_choice"], "none");

    // Acknowledgment forces a response; nothing is forwarded into the call.
    let forced = next_received(&mut received).await;
    assert_eq!(forced["type"], "response.create");

    // Caller audio becomes a buffer append.
    send_json(
        &mut client,
        json!({
            "kind": "AudioData",
            "audioData": { "data": "UklGRg==", "silent": false }
        }),
    )
    .await;
    let append = next_received(&mut received).await;
    assert_eq!(append["type"], "input_audio_buffer.append");
    assert_eq!(append["audio"], "UklGRg==");

    // The finished response with a pending tool call drains into another
    // synthetic response.create.
    let drained = next_received(&mut received).await;
    assert_eq!(drained["type"], "response.create");

    // The call hears both audio chunks and none of the tool bookkeeping.
    let first_audio = next_json(&mut client).await;
    assert_eq!(first_audio["kind"], "AudioData");
    assert_eq!(first_audio["audioData"]["data"], "AAAA");

    let second_audio = next_json(&mut client).await;
    assert_eq!(second_audio["kind"], "AudioData");
    assert_eq!(second_audio["audioData"]["data"], "BBBB");

    client.close(None).await.unwrap();

    let saved = wait_for_saved(&store, 1).await;
    let (call_id, entries) = &saved[0];
    assert_eq!(call_id, "call-77");

    // Telephony mode carries no text taps; only the duration entry remains.
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].role, Role::System);
    assert!(entries[0].content.starts_with("Session duration: "));
}

#[tokio::test]
async fn abrupt_client_reset_still_finalizes_transcript() {
    let (upstream_addr, mut received) = spawn_mock_upstream().await;
    let (gateway_addr, store) = spawn_gateway(upstream_addr).await;

    let mut client = connect_client(gateway_addr, "/realtime").await;

    send_json(&mut client, json!({ "type": "session.update", "session": {} })).await;
    let _ = next_received(&mut received).await;

    // Tear the TCP connection down without a close handshake.
    drop(client);

    let saved = wait_for_saved(&store, 1).await;
    let (call_id, entries) = &saved[0];
    assert_eq!(call_id, "unknown-call");

    let last = entries.last().unwrap();
    assert_eq!(last.role, Role::System);
    assert!(last.content.starts_with("Session duration: "));
}

//! Per-call relay session state.
//!
//! A [`RelaySession`] is constructed once when a call (or direct text
//! session) starts and is consumed by exactly one relay run. Nothing here is
//! shared across concurrent calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Value, json};
use thiserror::Error;

use crate::auth::TokenProvider;

use super::messages::frame_type;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while setting up or running a relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Connection to the realtime endpoint failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Credential resolution failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The endpoint URL could not be turned into a WebSocket request
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

// =============================================================================
// Credentials
// =============================================================================

/// Authentication material for the realtime endpoint.
///
/// Exactly one mechanism is present by construction; a session can never be
/// half-configured with both or neither.
#[derive(Clone)]
pub enum Credential {
    /// Static API key, sent as the `api-key` header
    ApiKey(String),
    /// Bearer-token provider, invoked for a fresh token per connection attempt
    Bearer(Arc<dyn TokenProvider>),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ApiKey(_) => f.write_str("Credential::ApiKey(<redacted>)"),
            Credential::Bearer(_) => f.write_str("Credential::Bearer(<provider>)"),
        }
    }
}

// =============================================================================
// Tools
// =============================================================================

/// Where a tool's result is delivered once the call completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolResultDirection {
    /// Result is surfaced to the caller as well as the model
    ToCaller,
    /// Result is only fed back to the model
    ToModel,
}

/// A tool registered with the session. Immutable once registered.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    /// Unique tool name
    pub name: String,
    /// Full tool schema as advertised to the realtime endpoint
    pub schema: Value,
    /// Result-delivery direction
    pub direction: ToolResultDirection,
}

/// In-flight tool calls requested by the model but not yet resolved.
#[derive(Debug, Default)]
pub struct PendingToolCalls {
    calls: HashMap<String, PendingToolCall>,
}

/// One tool invocation the model has started streaming.
#[derive(Debug, Clone)]
pub struct PendingToolCall {
    /// Call identifier assigned by the endpoint
    pub call_id: String,
    /// Name of the invoked tool
    pub name: String,
    /// Argument fragments accumulated so far
    pub arguments: String,
}

impl PendingToolCalls {
    /// Start tracking a call announced by the endpoint.
    pub fn track(&mut self, call_id: &str, name: &str) {
        self.calls.insert(
            call_id.to_string(),
            PendingToolCall {
                call_id: call_id.to_string(),
                name: name.to_string(),
                arguments: String::new(),
            },
        );
    }

    /// Append an argument fragment to a tracked call. Fragments for unknown
    /// calls are dropped.
    pub fn append_arguments(&mut self, call_id: &str, fragment: &str) {
        if let Some(call) = self.calls.get_mut(call_id) {
            call.arguments.push_str(fragment);
        }
    }

    /// Stop tracking a call, returning its accumulated state.
    pub fn remove(&mut self, call_id: &str) -> Option<PendingToolCall> {
        self.calls.remove(call_id)
    }

    /// Drop every tracked call.
    pub fn clear(&mut self) {
        self.calls.clear();
    }

    /// Whether no calls are in flight.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Number of calls in flight.
    pub fn len(&self) -> usize {
        self.calls.len()
    }
}

// =============================================================================
// Session Settings
// =============================================================================

/// Relay mode: what kind of client is on the near socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayMode {
    /// Direct text/JSON client speaking the realtime event protocol
    #[default]
    Text,
    /// Telephony media stream; frames go through the format adapter
    Telephony,
}

/// Session configuration merged into every `session.update` frame.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Voice for synthesized audio
    pub voice: String,
    /// Model identifier, when the deployment does not pin one
    pub model: Option<String>,
    /// System instructions for the assistant
    pub instructions: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Cap on response tokens
    pub max_response_tokens: Option<i64>,
    /// Suppress audio output entirely
    pub disable_audio: Option<bool>,
    /// Registered tools, keyed by name
    pub tools: HashMap<String, ToolDefinition>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            voice: "alloy".to_string(),
            model: None,
            instructions: None,
            temperature: None,
            max_response_tokens: None,
            disable_audio: None,
            tools: HashMap::new(),
        }
    }
}

impl SessionSettings {
    /// Tool-choice policy: derived, not stored.
    pub fn tool_choice(&self) -> &'static str {
        if self.tools.is_empty() { "none" } else { "auto" }
    }

    /// Schemas of every registered tool, as sent to the endpoint.
    pub fn tool_schemas(&self) -> Vec<Value> {
        self.tools.values().map(|tool| tool.schema.clone()).collect()
    }

    /// Rewrite a `session.update` frame so the session body reflects these
    /// settings. Applied to every `session.update`, client-sent or
    /// adapter-synthesized, so late reconfiguration stays consistent.
    /// Frames of any other type are returned untouched.
    pub fn apply_to(&self, mut frame: Value) -> Value {
        if frame_type(&frame) != Some("session.update") {
            return frame;
        }

        let session = &mut frame["session"];
        session["voice"] = json!(self.voice);
        if let Some(instructions) = &self.instructions {
            session["instructions"] = json!(instructions);
        }
        if let Some(temperature) = self.temperature {
            session["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = self.max_response_tokens {
            session["max_response_output_tokens"] = json!(max_tokens);
        }
        if let Some(disable_audio) = self.disable_audio {
            session["disable_audio"] = json!(disable_audio);
        }
        session["tool_choice"] = json!(self.tool_choice());
        session["tools"] = Value::Array(self.tool_schemas());
        frame
    }
}

// =============================================================================
// Relay Session
// =============================================================================

/// Everything needed to open one relay run.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Realtime endpoint base URL (`https://…`)
    pub endpoint: String,
    /// Deployment identifier
    pub deployment: String,
    /// Authentication material
    pub credential: Credential,
    /// Session configuration
    pub settings: SessionSettings,
    /// Client kind on the near socket
    pub mode: RelayMode,
}

/// One relay session: owns the configuration and the per-run mutable state.
#[derive(Debug)]
pub struct RelaySession {
    pub(super) endpoint: String,
    pub(super) deployment: String,
    pub(super) credential: Credential,
    pub(super) settings: SessionSettings,
    pub(super) pending: PendingToolCalls,
    pub(super) mode: RelayMode,
}

impl RelaySession {
    /// Build a session, resolving the credential eagerly: when a token
    /// provider is configured a token is acquired now, so bad credentials
    /// surface before any socket is opened.
    pub async fn new(config: RelayConfig) -> RelayResult<Self> {
        if let Credential::Bearer(provider) = &config.credential {
            provider
                .token()
                .await
                .map_err(|e| RelayError::AuthenticationFailed(e.to_string()))?;
        }

        Ok(Self {
            endpoint: config.endpoint,
            deployment: config.deployment,
            credential: config.credential,
            settings: config.settings,
            pending: PendingToolCalls::default(),
            mode: config.mode,
        })
    }

    /// The session's relay mode.
    pub fn mode(&self) -> RelayMode {
        self.mode
    }

    /// The session's configured settings.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            schema: json!({
                "type": "function",
                "name": name,
                "parameters": { "type": "object", "properties": {} }
            }),
            direction: ToolResultDirection::ToModel,
        }
    }

    #[test]
    fn test_tool_choice_derived() {
        let mut settings = SessionSettings::default();
        assert_eq!(settings.tool_choice(), "none");

        settings.tools.insert("lookup".into(), tool("lookup"));
        assert_eq!(settings.tool_choice(), "auto");
    }

    #[test]
    fn test_apply_to_rewrites_session_update() {
        let settings = SessionSettings {
            voice: "sage".to_string(),
            instructions: Some("Be brief.".to_string()),
            temperature: Some(0.7),
            max_response_tokens: Some(800),
            disable_audio: Some(false),
            ..Default::default()
        };

        let frame = settings.apply_to(json!({ "type": "session.update", "session": {} }));
        let session = &frame["session"];
        assert_eq!(session["voice"], "sage");
        assert_eq!(session["instructions"], "Be brief.");
        assert_eq!(session["max_response_output_tokens"], 800);
        assert_eq!(session["disable_audio"], false);
        assert_eq!(session["tool_choice"], "none");
        assert_eq!(session["tools"], json!([]));
    }

    #[test]
    fn test_apply_to_without_tools_forces_none() {
        let settings = SessionSettings::default();
        let frame = settings.apply_to(json!({
            "type": "session.update",
            "session": { "tool_choice": "auto", "tools": [{ "name": "ghost" }] }
        }));
        assert_eq!(frame["session"]["tool_choice"], "none");
        assert_eq!(frame["session"]["tools"], json!([]));
    }

    #[test]
    fn test_apply_to_with_tools_serializes_schemas() {
        let mut settings = SessionSettings::default();
        settings.tools.insert("lookup".into(), tool("lookup"));

        let frame = settings.apply_to(json!({ "type": "session.update" }));
        assert_eq!(frame["session"]["tool_choice"], "auto");
        let tools = frame["session"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "lookup");
    }

    #[test]
    fn test_apply_to_ignores_other_frames() {
        let settings = SessionSettings::default();
        let original = json!({ "type": "input_audio_buffer.append", "audio": "AAAA" });
        assert_eq!(settings.apply_to(original.clone()), original);
    }

    #[test]
    fn test_pending_calls_lifecycle() {
        let mut pending = PendingToolCalls::default();
        assert!(pending.is_empty());

        pending.track("call_1", "lookup");
        pending.append_arguments("call_1", "{\"q\":");
        pending.append_arguments("call_1", "\"rust\"}");
        pending.append_arguments("call_2", "ignored");
        assert_eq!(pending.len(), 1);

        let call = pending.remove("call_1").unwrap();
        assert_eq!(call.name, "lookup");
        assert_eq!(call.arguments, "{\"q\":\"rust\"}");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_pending_calls_clear() {
        let mut pending = PendingToolCalls::default();
        pending.track("a", "one");
        pending.track("b", "two");
        pending.clear();
        assert!(pending.is_empty());
    }

    #[test]
    fn test_credential_debug_redacts_key() {
        let credential = Credential::ApiKey("super-secret".to_string());
        assert!(!format!("{credential:?}").contains("super-secret"));
    }

    #[tokio::test]
    async fn test_session_construction_with_api_key() {
        let session = RelaySession::new(RelayConfig {
            endpoint: "https://example.openai.azure.com".to_string(),
            deployment: "gpt-4o-realtime".to_string(),
            credential: Credential::ApiKey("key".to_string()),
            settings: SessionSettings::default(),
            mode: RelayMode::Telephony,
        })
        .await
        .unwrap();
        assert_eq!(session.mode(), RelayMode::Telephony);
    }
}

//! Realtime API WebSocket event classification.
//!
//! The relay never deserializes upstream events into full structs: frames it
//! does not recognize must be forwarded byte-for-byte (modulo JSON
//! re-serialization), so every frame is carried as a [`serde_json::Value`]
//! and only its `type` tag is classified here.
//!
//! # Protocol Overview
//!
//! Client events (sent to the realtime endpoint):
//! - session.update - Update session configuration
//! - input_audio_buffer.append - Append audio to buffer
//! - conversation.input - Text input from a direct client
//! - response.create - Generate a response
//!
//! Server events (received from the realtime endpoint):
//! - session.updated - Session configuration acknowledged
//! - response.audio.delta - Audio data chunk
//! - response.output_item.added - Output item added
//! - response.output_item.done - Output item complete
//! - conversation.item.created - Item added to conversation
//! - response.function_call_arguments.delta - Tool arguments chunk
//! - response.function_call_arguments.done - Tool arguments complete
//! - input_audio_buffer.speech_started - Speech detection started
//! - conversation.output - Text output for a direct client
//! - anything else - Passed through untouched

use serde_json::{Value, json};

// =============================================================================
// Event Kinds
// =============================================================================

/// Classification of a realtime event by its `type` tag.
///
/// A closed set of the kinds the relay reacts to, with [`UpstreamEventKind::Other`]
/// as the explicit pass-through arm for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamEventKind {
    /// `session.update` - configuration sent towards the endpoint
    SessionUpdate,
    /// `session.updated` - configuration acknowledged by the endpoint
    SessionUpdated,
    /// `response.audio.delta` - synthesized audio chunk
    AudioDelta,
    /// `response.output_item.added`
    OutputItemAdded,
    /// `response.output_item.done`
    OutputItemDone,
    /// `conversation.item.created`
    ConversationItemCreated,
    /// `response.function_call_arguments.delta`
    FunctionCallArgumentsDelta,
    /// `response.function_call_arguments.done`
    FunctionCallArgumentsDone,
    /// `input_audio_buffer.speech_started` - VAD detected caller speech
    SpeechStarted,
    /// `conversation.input` - text message from a direct client
    ConversationInput,
    /// `conversation.output` - text message for a direct client
    ConversationOutput,
    /// Any other event type; forwarded unchanged
    Other,
}

impl UpstreamEventKind {
    /// Classify a `type` tag value.
    pub fn classify(event_type: &str) -> Self {
        match event_type {
            "session.update" => Self::SessionUpdate,
            "session.updated" => Self::SessionUpdated,
            "response.audio.delta" => Self::AudioDelta,
            "response.output_item.added" => Self::OutputItemAdded,
            "response.output_item.done" => Self::OutputItemDone,
            "conversation.item.created" => Self::ConversationItemCreated,
            "response.function_call_arguments.delta" => Self::FunctionCallArgumentsDelta,
            "response.function_call_arguments.done" => Self::FunctionCallArgumentsDone,
            "input_audio_buffer.speech_started" => Self::SpeechStarted,
            "conversation.input" => Self::ConversationInput,
            "conversation.output" => Self::ConversationOutput,
            _ => Self::Other,
        }
    }

    /// Classify a frame by reading its `type` tag. Untyped frames map to `Other`.
    pub fn of(frame: &Value) -> Self {
        frame_type(frame).map_or(Self::Other, Self::classify)
    }
}

// =============================================================================
// Frame Accessors
// =============================================================================

/// Read the `type` tag of a frame, if present.
pub fn frame_type(frame: &Value) -> Option<&str> {
    frame.get("type").and_then(Value::as_str)
}

/// Read the `item.type` of an event carrying a conversation/output item.
pub fn item_kind(frame: &Value) -> Option<&str> {
    frame
        .get("item")
        .and_then(|item| item.get("type"))
        .and_then(Value::as_str)
}

/// Read the `item.call_id` of an event carrying a function-call item.
pub fn item_call_id(frame: &Value) -> Option<&str> {
    frame
        .get("item")
        .and_then(|item| item.get("call_id"))
        .and_then(Value::as_str)
}

// =============================================================================
// Synthesized Events
// =============================================================================

/// Build the synthetic `response.create` frame the relay injects after a
/// session acknowledgment or a stalled tool-call turn.
pub fn response_create() -> Value {
    json!({ "type": "response.create" })
}

// =============================================================================
// Tests
// =============================================================================

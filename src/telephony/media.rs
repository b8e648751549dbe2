//! ACS media-streaming WebSocket frame types.
//!
//! Azure Communication Services bidirectional media streaming carries JSON
//! text frames tagged with a `kind` field. Inbound frames are 24 kHz mono
//! PCM, mixed channel; audio payloads are base64 encoded.
//!
//! Inbound (ACS -> relay):
//! - `AudioMetadata` - stream format announcement, sent before any audio
//! - `AudioData` - one audio chunk with timestamp and silence flag
//!
//! Outbound (relay -> ACS):
//! - `AudioData` - audio to play into the call

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// `kind` tag of metadata frames.
pub const KIND_AUDIO_METADATA: &str = "AudioMetadata";

/// `kind` tag of audio frames.
pub const KIND_AUDIO_DATA: &str = "AudioData";

/// Read the `kind` tag of a media-stream frame, if present.
pub fn frame_kind(frame: &Value) -> Option<&str> {
    frame.get("kind").and_then(Value::as_str)
}

/// Stream format announcement, first frame on a media stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMetadata {
    /// Media subscription identifier
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// Audio encoding (`PCM`)
    #[serde(default)]
    pub encoding: Option<String>,
    /// Sample rate in Hz
    #[serde(default)]
    pub sample_rate: Option<u32>,
    /// Channel count
    #[serde(default)]
    pub channels: Option<u32>,
    /// Chunk length in bytes
    #[serde(default)]
    pub length: Option<u32>,
}

/// One inbound audio chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioData {
    /// Base64-encoded PCM payload
    pub data: String,
    /// Capture timestamp
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Raw identifier of the speaking participant
    #[serde(default)]
    pub participant_raw_id: Option<String>,
    /// Whether ACS classified the chunk as silence
    #[serde(default)]
    pub silent: Option<bool>,
}

impl AudioData {
    /// Whether the chunk carries no speech.
    pub fn is_silent(&self) -> bool {
        self.silent.unwrap_or(false)
    }
}

/// Build an outbound audio frame playing `data` (base64 PCM) into the call.
pub fn outbound_audio(data: &str) -> Value {
    json!({
        "kind": KIND_AUDIO_DATA,
        "audioData": { "data": data }
    })
}

// =============================================================================
// Tests
// =============================================================================

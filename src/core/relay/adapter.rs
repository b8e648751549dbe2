//! Format adapters between the telephony media stream and the realtime API.
//!
//! Both directions are pure functions over JSON frames: every known frame
//! kind maps to an equivalent on the other protocol or to an explicit drop
//! (`None`). Adapters never touch session state; rewriting `session.update`
//! bodies is the relay's job after conversion.

use serde_json::{Value, json};

use crate::telephony::media::{self, AudioData};

use super::messages::frame_type;
use super::session::SessionSettings;

/// Convert one telephony media-stream frame into a realtime API event.
///
/// - `AudioMetadata` becomes a `session.update` carrying the session
///   configuration; ACS sends it before any audio, which is the first
///   opportunity to configure the model.
/// - `AudioData` becomes `input_audio_buffer.append`; silent chunks are
///   dropped.
/// - Every other kind has no realtime equivalent and is dropped.
pub fn telephony_to_upstream(frame: &Value, settings: &SessionSettings) -> Option<Value> {
    match media::frame_kind(frame)? {
        media::KIND_AUDIO_METADATA => Some(session_update(settings)),
        media::KIND_AUDIO_DATA => {
            let audio: AudioData = serde_json::from_value(frame.get("audioData")?.clone()).ok()?;
            if audio.is_silent() {
                return None;
            }
            Some(json!({
                "type": "input_audio_buffer.append",
                "audio": audio.data
            }))
        }
        _ => None,
    }
}

/// Convert one realtime API event into a telephony media-stream frame.
///
/// Only `response.audio.delta` has a telephony equivalent; every other event
/// type is consumed and never forwarded into the call.
pub fn upstream_to_telephony(event: &Value) -> Option<Value> {
    match frame_type(event)? {
        "response.audio.delta" => {
            let delta = event.get("delta")?.as_str()?;
            Some(media::outbound_audio(delta))
        }
        _ => None,
    }
}

/// Session configuration for a telephony-bridged call: PCM16 both ways with
/// server-side turn detection, plus whatever the session settings pin down.
fn session_update(settings: &SessionSettings) -> Value {
    let mut session = json!({
        "voice": settings.voice,
        "turn_detection": { "type": "server_vad" },
        "input_audio_format": "pcm16",
        "output_audio_format": "pcm16",
    });
    if let Some(model) = &settings.model {
        session["model"] = json!(model);
    }
    if let Some(instructions) = &settings.instructions {
        session["instructions"] = json!(instructions);
    }
    if let Some(temperature) = settings.temperature {
        session["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = settings.max_response_tokens {
        session["max_response_output_tokens"] = json!(max_tokens);
    }
    if let Some(disable_audio) = settings.disable_audio {
        session["disable_audio"] = json!(disable_audio);
    }
    json!({ "type": "session.update", "session": session })
}

// =============================================================================
// Tests
// =============================================================================

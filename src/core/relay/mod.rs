//! Realtime message relay.
//!
//! The relay pairs one client WebSocket (a telephony media stream or a
//! direct text client) with one realtime API WebSocket and pumps frames
//! both ways:
//!
//! - [`session::RelaySession`] holds the per-call configuration and state
//! - [`adapter`] translates between the telephony and realtime wire formats
//! - [`engine`] runs the two concurrent pumps and the per-event state machine
//! - [`transcript`] accumulates the conversation log handed to persistence
//!
//! A session is built once per call, consumed by exactly one run, and never
//! shared across calls.

pub mod adapter;
pub mod engine;
pub mod messages;
pub mod session;
pub mod transcript;

pub use engine::REALTIME_API_VERSION;
pub use messages::{UpstreamEventKind, frame_type, item_kind, response_create};
pub use session::{
    Credential, PendingToolCall, PendingToolCalls, RelayConfig, RelayError, RelayMode,
    RelayResult, RelaySession, SessionSettings, ToolDefinition, ToolResultDirection,
};
pub use transcript::{
    DEFAULT_CALL_ID, Role, TranscriptEntry, TranscriptLog, sanitize_call_id,
};

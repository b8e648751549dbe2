//! Telephony integration: ACS media-stream frames and call signaling.

pub mod caller;
pub mod media;

pub use caller::{ACS_API_VERSION, AcsCaller, CallerError, MediaStreamingOptions};
pub use media::{AudioData, AudioMetadata, frame_kind, outbound_audio};

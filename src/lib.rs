pub mod auth;
pub mod config;
pub mod core;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod storage;
pub mod telephony;

// Re-export commonly used items for convenience
pub use crate::core::relay::{
    Credential, RelayConfig, RelayError, RelayMode, RelayResult, RelaySession, SessionSettings,
    ToolDefinition, ToolResultDirection, TranscriptEntry,
};
pub use config::{ConfigError, ServerConfig};
pub use state::AppState;
pub use storage::{BlobTranscriptStore, MemoryTranscriptStore, TranscriptStore};
pub use telephony::AcsCaller;

pub mod relay;

// Re-export commonly used types for convenience
pub use relay::{
    Credential, PendingToolCall, PendingToolCalls, RelayConfig, RelayError, RelayMode,
    RelayResult, RelaySession, Role, SessionSettings, ToolDefinition, ToolResultDirection,
    TranscriptEntry, TranscriptLog, sanitize_call_id,
};

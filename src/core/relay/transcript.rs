//! Conversation transcript accumulation.
//!
//! One [`TranscriptLog`] per relay run. Entries are appended as messages flow
//! through the pumps and the log is finalized with a session-duration entry
//! when the run ends.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Call identifier used when the client supplied none.
pub const DEFAULT_CALL_ID: &str = "unknown-call";

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human caller
    User,
    /// The model
    Assistant,
    /// Relay bookkeeping (currently only the duration entry)
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// One line of the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Sanitized call identifier
    pub call_id: String,
    /// Author
    pub role: Role,
    /// Wall-clock time the entry was recorded
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Text content
    pub content: String,
}

/// Append-only transcript for a single relay run.
#[derive(Debug)]
pub struct TranscriptLog {
    call_id: String,
    entries: Vec<TranscriptEntry>,
}

impl TranscriptLog {
    /// Create an empty log tagged with an already-sanitized call id.
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            entries: Vec::new(),
        }
    }

    /// The call identifier every entry is tagged with.
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Append an entry timestamped now.
    pub fn append(&mut self, role: Role, content: &str) {
        self.entries.push(TranscriptEntry {
            call_id: self.call_id.clone(),
            role,
            timestamp: OffsetDateTime::now_utc(),
            content: content.to_string(),
        });
    }

    /// Close the log with the trailing session-duration entry and hand the
    /// sequence over.
    pub fn finalize(mut self, elapsed: Duration) -> Vec<TranscriptEntry> {
        let seconds = elapsed.as_secs_f64();
        self.append(
            Role::System,
            &format!("Session duration: {seconds:.2} seconds"),
        );
        self.entries
    }
}

/// Reduce an externally supplied call identifier to `[A-Za-z0-9_-]`,
/// falling back to [`DEFAULT_CALL_ID`] when nothing usable remains.
pub fn sanitize_call_id(raw: Option<&str>) -> String {
    let cleaned: String = raw
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        DEFAULT_CALL_ID.to_string()
    } else {
        cleaned
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Upload session types and lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an upload session.
///
/// Rendered as 32 lowercase hex characters. Parsing rejects anything else,
/// so a session ID can never name a path outside its session directory.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.len() != 32 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(crate::Error::InvalidSessionId(format!(
                "expected 32 hex characters, got {:?}",
                s
            )));
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidSessionId(e.to_string()))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0.simple())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Upload session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Session exists but has not received any chunk yet.
    Created,
    /// At least one chunk has been stored.
    Receiving,
    /// Every expected chunk is present on disk.
    Complete,
    /// Chunks were concatenated into the final file.
    Assembled,
}

impl SessionState {
    /// Check if the session can still receive chunks.
    pub fn is_accepting_chunks(&self) -> bool {
        matches!(self, Self::Created | Self::Receiving | Self::Complete)
    }

    /// Check if the session reached its terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Assembled)
    }

    /// Stable string form, used in errors and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Receiving => "receiving",
            Self::Complete => "complete",
            Self::Assembled => "assembled",
        }
    }
}

/// Per-session metadata document, persisted as `metadata.json` inside the
/// session directory.
///
/// `filename` and `total_chunks` are fixed by the first chunk-0 arrival;
/// `chunks_received` and `complete` are derived from the chunk files that
/// actually exist on disk, never counted incrementally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// The session this document belongs to.
    pub session_id: SessionId,
    /// Sanitized original filename; empty until chunk 0 provides one.
    #[serde(default)]
    pub filename: String,
    /// Expected number of chunks; zero until chunk 0 fixes it.
    #[serde(default)]
    pub total_chunks: u32,
    /// Number of expected chunk files present on disk.
    #[serde(default)]
    pub chunks_received: u32,
    /// True once every chunk index in `[0, total_chunks)` has a file.
    #[serde(default)]
    pub complete: bool,
    /// Current lifecycle state.
    pub state: SessionState,
}

impl SessionMetadata {
    /// Create metadata for a brand-new session.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            filename: String::new(),
            total_chunks: 0,
            chunks_received: 0,
            complete: false,
            state: SessionState::Created,
        }
    }

    /// Record the filename and chunk total carried by chunk 0.
    ///
    /// First writer wins: once `total_chunks` is set it is immutable, and a
    /// recorded filename is never replaced.
    pub fn record_upload_info(&mut self, filename: Option<&str>, total_chunks: u32) {
        if self.total_chunks == 0 {
            self.total_chunks = total_chunks;
        }
        if self.filename.is_empty() {
            if let Some(name) = filename {
                self.filename = name.to_string();
            }
        }
    }

    /// Update progress from a scan of the chunk files on disk.
    pub fn set_progress(&mut self, chunks_received: u32) {
        self.chunks_received = chunks_received;
        self.complete = self.total_chunks > 0 && chunks_received >= self.total_chunks;
        if self.state != SessionState::Assembled {
            self.state = if self.complete {
                SessionState::Complete
            } else if chunks_received > 0 {
                SessionState::Receiving
            } else {
                SessionState::Created
            };
        }
    }

    /// Transition to the assembled state. Refused unless complete.
    pub fn mark_assembled(&mut self) -> crate::Result<()> {
        if !self.complete {
            return Err(crate::Error::InvalidStateTransition {
                from: self.state.as_str(),
                to: SessionState::Assembled.as_str(),
            });
        }
        self.state = SessionState::Assembled;
        Ok(())
    }

    /// Filename the assembled file is written under.
    pub fn effective_filename(&self) -> String {
        if self.filename.is_empty() {
            format!("upload_{}", self.session_id)
        } else {
            self.filename.clone()
        }
    }
}

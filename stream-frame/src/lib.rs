//! Wire frames for the streaming query endpoint.
//!
//! The server emits one SSE event per answer token (`event: token`) and a
//! single terminal event (`event: done`) when the stream closes. Both payloads
//! are plain serde structs so clients in any language can consume them.

use serde::{Deserialize, Serialize};

/// SSE event name for token frames.
pub const TOKEN_EVENT: &str = "token";

/// SSE event name for the terminal frame.
pub const DONE_EVENT: &str = "done";

/// One streamed answer token.
///
/// `role` is present on the first frame of a stream so clients can attribute
/// the message; `request_id` ties frames to the request that produced them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenFrame {
    /// Token text as produced by the model (may be multiple characters).
    pub token: String,
    /// Message role, normally "assistant".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Server-assigned id of the query request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl TokenFrame {
    /// Creates a bare token frame with no role or request id.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            role: None,
            request_id: None,
        }
    }

    /// Attaches the assistant role (builder).
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Attaches the request id (builder).
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Terminal frame sent once after the last token.
///
/// `turns` is the size of the session history after the answered turn was
/// appended, so clients can refresh lazily.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoneFrame {
    /// Server-assigned id of the query request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Number of turns now stored for the session.
    pub turns: usize,
}

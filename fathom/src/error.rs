//! Agent error types.
//!
//! One enum for the orchestrator and its phases. Recoverable failures (a tool
//! call, a relevance selection, a summary) are handled where they occur and
//! never surface here; what does surface is fatal for the current turn.

use thiserror::Error;

/// Error returned by agent phases and the components they drive.
///
/// `Llm` and `Malformed` on a phase path abort the turn; a partially
/// constructed turn is never written to history.
#[derive(Debug, Error)]
pub enum AgentError {
    /// An LLM call failed (transport, API, or request build).
    #[error("llm call failed: {0}")]
    Llm(String),

    /// A structured-output phase returned something that does not parse
    /// against its declared shape.
    #[error("{phase} output malformed: {detail}")]
    Malformed {
        /// Phase that produced the output (e.g. "understand", "plan").
        phase: &'static str,
        detail: String,
    },

    /// Disk failure while persisting or reading a context record.
    #[error("context store io: {0}")]
    ContextIo(#[from] std::io::Error),

    /// A turn with an empty query or answer was offered to the history.
    #[error("invalid turn: {0}")]
    InvalidTurn(String),
}

impl AgentError {
    /// Shorthand for a malformed structured output.
    pub fn malformed(phase: &'static str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            phase,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Display of Llm includes the message.
    #[test]
    fn llm_error_display() {
        let err = AgentError::Llm("boom".into());
        assert!(err.to_string().contains("llm call failed"));
        assert!(err.to_string().contains("boom"));
    }

    /// **Scenario**: Display of Malformed names the phase.
    #[test]
    fn malformed_error_display_names_phase() {
        let err = AgentError::malformed("plan", "missing tasks");
        let s = err.to_string();
        assert!(s.contains("plan"), "should contain phase: {}", s);
        assert!(s.contains("missing tasks"));
    }

    /// **Scenario**: io::Error converts via From into ContextIo.
    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: AgentError = io.into();
        assert!(matches!(err, AgentError::ContextIo(_)));
    }
}

//! Chat message types for LLM calls.
//!
//! Three roles: System (prompt), User, Assistant. Phase code builds short
//! message lists from these; the multi-turn conversation record lives in
//! [`crate::history`], not here.

/// One message in an LLM request.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Message {
    /// System prompt, first in the list.
    System(String),
    /// User content.
    User(String),
    /// Model reply.
    Assistant(String),
}

impl Message {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System(content.into())
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User(content.into())
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant(content.into())
    }

    /// The message text regardless of role.
    pub fn content(&self) -> &str {
        match self {
            Self::System(s) | Self::User(s) | Self::Assistant(s) => s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Constructors produce the matching variant; content() reads it back.
    #[test]
    fn constructors_and_content() {
        assert!(matches!(Message::system("s"), Message::System(c) if c == "s"));
        assert!(matches!(Message::user("u"), Message::User(c) if c == "u"));
        assert_eq!(Message::assistant("a").content(), "a");
    }

    /// **Scenario**: Messages round-trip through serde.
    #[test]
    fn serde_roundtrip() {
        let msg = Message::user("what is EUR/USD?");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content(), msg.content());
    }
}

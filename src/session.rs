//! Conversation identity and the CLI session derived from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque chat thread identifier; one conversation maps to at most one running CLI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable CLI session id for this thread: UUID v5 in the DNS namespace.
    pub fn session_id(&self) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_DNS, self.0.as_bytes())
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the CLI should attach to the conversation's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFlag {
    /// First invocation in this bridge's lifetime: create the session under a known id.
    Create(Uuid),
    /// The session already exists: continue it.
    Resume(Uuid),
}

impl SessionFlag {
    pub fn args(&self) -> [String; 2] {
        match self {
            SessionFlag::Create(id) => ["--session-id".to_string(), id.to_string()],
            SessionFlag::Resume(id) => ["--resume".to_string(), id.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_deterministic_per_thread() {
        let a = ConversationId::new("1700000000.000100");
        let b = ConversationId::new("1700000000.000100");
        let c = ConversationId::new("1700000000.000200");
        assert_eq!(a.session_id(), b.session_id());
        assert_ne!(a.session_id(), c.session_id());
        assert_eq!(a.session_id().get_version_num(), 5);
    }

    #[test]
    fn session_id_matches_uuid5_dns_namespace() {
        let id = ConversationId::new("python.org");
        assert_eq!(
            id.session_id().to_string(),
            "886313e1-3b8a-5372-9b90-0c9aee199e5d"
        );
    }

    #[test]
    fn session_flag_renders_cli_args() {
        let id = ConversationId::new("t").session_id();
        assert_eq!(
            SessionFlag::Create(id).args(),
            ["--session-id".to_string(), id.to_string()]
        );
        assert_eq!(
            SessionFlag::Resume(id).args(),
            ["--resume".to_string(), id.to_string()]
        );
    }
}

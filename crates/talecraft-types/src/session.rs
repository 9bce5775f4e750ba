use serde::{Deserialize, Serialize};

/// Logical generation context. Each slot holds at most one live session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    InitialDraft,
    Continuation,
    Rewrite,
    Custom(String),
}

impl Slot {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "draft" | "initial_draft" | "initial-draft" => Slot::InitialDraft,
            "continuation" | "continue" => Slot::Continuation,
            "rewrite" => Slot::Rewrite,
            _ => Slot::Custom(s.to_string()),
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::InitialDraft => write!(f, "initial_draft"),
            Slot::Continuation => write!(f, "continuation"),
            Slot::Rewrite => write!(f, "rewrite"),
            Slot::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Lifecycle of a generation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl SessionStatus {
    /// `Connecting` or `Streaming`
    pub fn is_live(&self) -> bool {
        matches!(self, SessionStatus::Connecting | SessionStatus::Streaming)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Streaming => write!(f, "streaming"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

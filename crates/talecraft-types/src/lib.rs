//! Core types and structures for talecraft
//!
//! This crate provides the wire types shared by the client, the session
//! coordinator and the command line front end.

use serde::{Deserialize, Serialize};

pub mod session;

pub use session::{SessionStatus, Slot};

// ============================================================================
// Constants
// ============================================================================

/// Default token budget for a generation request
pub const DEFAULT_MAX_LENGTH: u32 = 150;

/// Default number of options requested from the non-streaming endpoint
pub const DEFAULT_OPTION_COUNT: u32 = 1;

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

/// Default nucleus sampling threshold
pub const DEFAULT_TOP_P: f32 = 0.9;

// ============================================================================
// Generation Parameters
// ============================================================================

/// Narrative tone requested from the generator.
///
/// The named variants cover the palette the editor offers; anything else is
/// carried through verbatim as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum Tone {
    #[default]
    Adaptive,
    Dark,
    Emotional,
    Humorous,
    Inspirational,
    Mysterious,
    Custom(String),
}

impl Tone {
    pub fn as_str(&self) -> &str {
        match self {
            Tone::Adaptive => "Adaptive",
            Tone::Dark => "Dark",
            Tone::Emotional => "Emotional",
            Tone::Humorous => "Humorous",
            Tone::Inspirational => "Inspirational",
            Tone::Mysterious => "Mysterious",
            Tone::Custom(name) => name,
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "adaptive" => Tone::Adaptive,
            "dark" => Tone::Dark,
            "emotional" => Tone::Emotional,
            "humorous" => Tone::Humorous,
            "inspirational" => Tone::Inspirational,
            "mysterious" => Tone::Mysterious,
            _ => Tone::Custom(s.to_string()),
        }
    }
}

impl From<String> for Tone {
    fn from(s: String) -> Self {
        Tone::from_str(&s)
    }
}

impl From<Tone> for String {
    fn from(tone: Tone) -> Self {
        tone.as_str().to_string()
    }
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested length class of the generated passage.
///
/// Unknown classes (the editor also sends e.g. `Intro`) are kept as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum Length {
    Short,
    #[default]
    Medium,
    Long,
    Custom(String),
}

impl Length {
    pub fn as_str(&self) -> &str {
        match self {
            Length::Short => "Short",
            Length::Medium => "Medium",
            Length::Long => "Long",
            Length::Custom(name) => name,
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "short" => Length::Short,
            "medium" => Length::Medium,
            "long" => Length::Long,
            _ => Length::Custom(s.to_string()),
        }
    }
}

impl From<String> for Length {
    fn from(s: String) -> Self {
        Length::from_str(&s)
    }
}

impl From<Length> for String {
    fn from(length: Length) -> Self {
        length.as_str().to_string()
    }
}

impl std::fmt::Display for Length {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `/generate` and `/generate/stream`.
///
/// `count` is only meaningful to the non-streaming endpoint; the streaming
/// client clears it before sending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub tone: Tone,
    pub length: Length,
    pub max_length: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub top_p: Option<f32>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, tone: Tone, length: Length) -> Self {
        Self {
            prompt: prompt.into(),
            tone,
            length,
            max_length: DEFAULT_MAX_LENGTH,
            count: None,
            temperature: None,
            top_p: None,
        }
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_sampling(mut self, temperature: f32, top_p: f32) -> Self {
        self.temperature = Some(temperature);
        self.top_p = Some(top_p);
        self
    }
}

/// One option returned by the non-streaming `/generate` endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedOption {
    pub id: String,
    pub text: String,
    pub tone: Tone,
    pub length: Length,
}

/// Response of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub device: Option<String>,
}

// ============================================================================
// Streaming Protocol
// ============================================================================

/// A decoded record of the generation stream.
///
/// A well-formed stream is one `Start`, any number of `Chunk`s, and exactly
/// one terminal `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamMessage {
    Start,
    Chunk {
        text: String,
    },
    Done {
        #[serde(rename = "fullText")]
        full_text: String,
    },
    Error {
        message: String,
    },
}

impl StreamMessage {
    /// True for `Done` and `Error`
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamMessage::Done { .. } | StreamMessage::Error { .. })
    }
}

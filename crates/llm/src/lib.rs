//! Normalized streaming events for LLM providers
//!
//! This crate defines:
//! - The closed `ChunkEvent` taxonomy every downstream consumer matches on
//! - The `ChunkSource` abstraction over asynchronous chunk sequences,
//!   with a scripted implementation for tests and playback
//! - Thin adapters translating provider-native stream payloads
//!   (Anthropic typed deltas, OpenAI-compatible deltas) into the taxonomy
//!
//! Provider payloads that do not map onto a known variant are logged and
//! dropped at the adapter boundary; they never reach consumers.

pub mod anthropic;
pub mod openai;
mod source;

pub use source::{ChunkSource, ScriptedSource};

use serde::{Deserialize, Serialize};

/// Metadata carried by tool-call stream events.
///
/// Fields are optional because providers reveal them incrementally: the
/// first fragment usually carries id and name, later fragments only input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolChunkInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Partial JSON input accumulated so far, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_input: Option<String>,
}

/// Normalized streaming events from LLM providers.
///
/// This is a closed set: the reconciliation engine matches exhaustively and
/// adapters are the only place provider shape differences are handled.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkEvent {
    /// Incremental (or, for some backends, cumulative) answer text
    TextDelta(String),
    /// Final answer payload delivered in one piece
    TextComplete(String),
    /// Incremental reasoning content ("thinking")
    ThinkingDelta {
        text: String,
        /// Provider-reported reasoning duration, when available
        elapsed_ms: Option<u64>,
    },
    /// Final reasoning payload delivered in one piece
    ThinkingComplete {
        text: String,
        elapsed_ms: Option<u64>,
    },
    /// A tool call is being assembled by the provider
    ToolInProgress(ToolChunkInfo),
    /// A tool call finished assembling
    ToolComplete(ToolChunkInfo),
}

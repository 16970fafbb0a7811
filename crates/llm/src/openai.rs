//! Adapter for OpenAI-compatible streaming deltas
//!
//! Chat-completions style backends stream `choices[].delta` objects where
//! answer text arrives under `content`, reasoning under `reasoning` or
//! `reasoning_content` (naming varies by backend), and tool calls as
//! incremental `tool_calls` entries. A single payload may carry several of
//! these at once, so normalization yields a list of events.
//!
//! Some backends in this family emit cumulative rather than incremental
//! text; the reconciliation engine resolves that downstream, the adapter
//! passes text through untouched.

use crate::{ChunkEvent, ToolChunkInfo};
use anyhow::Result;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Normalize one SSE data payload into zero or more chunk events.
///
/// The `[DONE]` sentinel and payloads without recognizable content yield an
/// empty list; malformed JSON is logged and dropped, never an error.
pub fn normalize_delta(data: &str) -> Result<Vec<ChunkEvent>> {
    if data.trim() == "[DONE]" {
        return Ok(Vec::new());
    }

    let response: StreamResponse = match serde_json::from_str(data) {
        Ok(response) => response,
        Err(e) => {
            debug!("Dropping unparseable stream payload: {}", e);
            return Ok(Vec::new());
        }
    };

    let mut events = Vec::new();
    let Some(choice) = response.choices.first() else {
        return Ok(events);
    };

    let reasoning = choice
        .delta
        .reasoning
        .as_deref()
        .or(choice.delta.reasoning_content.as_deref());
    if let Some(reasoning) = reasoning {
        if !reasoning.is_empty() {
            events.push(ChunkEvent::ThinkingDelta {
                text: reasoning.to_string(),
                elapsed_ms: None,
            });
        }
    }

    if let Some(content) = &choice.delta.content {
        if !content.is_empty() {
            events.push(ChunkEvent::TextDelta(content.clone()));
        }
    }

    if let Some(tool_calls) = &choice.delta.tool_calls {
        for tool_call in tool_calls {
            let info = ToolChunkInfo {
                id: tool_call.id.clone(),
                name: tool_call
                    .function
                    .as_ref()
                    .and_then(|f| f.name.clone()),
                partial_input: tool_call
                    .function
                    .as_ref()
                    .and_then(|f| f.arguments.clone()),
            };
            if choice.finish_reason.as_deref() == Some("tool_calls") {
                events.push(ChunkEvent::ToolComplete(info));
            } else {
                events.push(ChunkEvent::ToolInProgress(info));
            }
        }
    }

    Ok(events)
}

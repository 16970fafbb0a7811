//! Adapter for Anthropic-style streaming events
//!
//! Anthropic streams typed SSE events per content block: `thinking_delta`
//! and `text_delta` payloads arrive under `content_block_delta`, tool input
//! under `input_json_delta`. The adapter keeps just enough state to know
//! whether a `content_block_stop` closes a tool block.

use crate::{ChunkEvent, ToolChunkInfo};
use anyhow::Result;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "content_block_start")]
    ContentBlockStart { content_block: StreamContentBlock },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: ContentDelta },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop {},
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(rename = "ping")]
    Ping,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct StreamContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentDelta {
    #[serde(rename = "thinking_delta")]
    Thinking { thinking: String },
    #[serde(rename = "signature_delta")]
    Signature {
        #[allow(dead_code)]
        signature: String,
    },
    #[serde(rename = "text_delta")]
    Text { text: String },
    #[serde(rename = "input_json_delta")]
    InputJson { partial_json: String },
}

/// Translates Anthropic stream payloads into the normalized taxonomy.
#[derive(Debug, Default)]
pub struct AnthropicAdapter {
    current_tool: Option<ToolChunkInfo>,
}

impl AnthropicAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize one SSE data payload. Returns `Ok(None)` for payloads that
    /// carry no content (pings, signatures, unknown shapes); those are
    /// logged and dropped, never errors.
    pub fn normalize(&mut self, data: &str) -> Result<Option<ChunkEvent>> {
        let event: StreamEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                debug!("Dropping unparseable stream payload: {}", e);
                return Ok(None);
            }
        };

        let chunk = match event {
            StreamEvent::ContentBlockStart { content_block } => {
                if content_block.block_type == "tool_use" {
                    let info = ToolChunkInfo {
                        id: content_block.id,
                        name: content_block.name,
                        partial_input: None,
                    };
                    self.current_tool = Some(info.clone());
                    Some(ChunkEvent::ToolInProgress(info))
                } else {
                    None
                }
            }
            StreamEvent::ContentBlockDelta { delta } => match delta {
                ContentDelta::Thinking { thinking } => Some(ChunkEvent::ThinkingDelta {
                    text: thinking,
                    elapsed_ms: None,
                }),
                ContentDelta::Text { text } => Some(ChunkEvent::TextDelta(text)),
                ContentDelta::InputJson { partial_json } => {
                    self.current_tool.as_mut().map(|tool| {
                        let input = tool.partial_input.get_or_insert_with(String::new);
                        input.push_str(&partial_json);
                        ChunkEvent::ToolInProgress(tool.clone())
                    })
                }
                ContentDelta::Signature { .. } => None,
            },
            StreamEvent::ContentBlockStop {} => self
                .current_tool
                .take()
                .map(ChunkEvent::ToolComplete),
            StreamEvent::MessageStop | StreamEvent::Ping => None,
            StreamEvent::Unknown => {
                debug!("Dropping unrecognized stream event");
                None
            }
        };

        Ok(chunk)
    }
}

//! Typed content blocks attached to a chat message

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque block identifier, unique within a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub String);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the message owning a set of blocks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of block types this engine creates.
///
/// A block starts as `Placeholder` and is converted exactly once; it never
/// returns to `Placeholder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Placeholder,
    MainText,
    Thinking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Streaming,
    Success,
    Interrupted,
    Error,
}

/// A typed, ordered content unit attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub message_id: MessageId,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub content: String,
    pub status: BlockStatus,
    /// Wall-clock duration between first and last reasoning fragment.
    /// Present only on `Thinking` blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_elapsed_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Block {
    /// The initial, type-less block created before any content arrives.
    pub fn placeholder(id: BlockId, message_id: MessageId) -> Self {
        let now = Utc::now();
        Self {
            id,
            message_id,
            block_type: BlockType::Placeholder,
            content: String::new(),
            status: BlockStatus::Streaming,
            thinking_elapsed_ms: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn new_streaming(
        id: BlockId,
        message_id: MessageId,
        block_type: BlockType,
        content: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            message_id,
            block_type,
            content,
            status: BlockStatus::Streaming,
            thinking_elapsed_ms: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, changes: &BlockChanges) {
        if let Some(block_type) = changes.block_type {
            self.block_type = block_type;
        }
        if let Some(content) = &changes.content {
            self.content = content.clone();
        }
        if let Some(status) = changes.status {
            self.status = status;
        }
        if let Some(elapsed) = changes.thinking_elapsed_ms {
            self.thinking_elapsed_ms = Some(elapsed);
        }
        self.updated_at = Utc::now();
    }
}

/// Partial field update for a block, as issued to persistence collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_type: Option<BlockType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BlockStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_elapsed_ms: Option<u64>,
}

impl BlockChanges {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: BlockStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_elapsed(mut self, elapsed_ms: Option<u64>) -> Self {
        self.thinking_elapsed_ms = elapsed_ms;
        self
    }

    /// Overlay `newer` on top of `self`, field by field. Used when
    /// coalescing throttled writes so the latest value of each field wins.
    pub fn merge_from(&mut self, newer: BlockChanges) {
        if newer.block_type.is_some() {
            self.block_type = newer.block_type;
        }
        if newer.content.is_some() {
            self.content = newer.content;
        }
        if newer.status.is_some() {
            self.status = newer.status;
        }
        if newer.thinking_elapsed_ms.is_some() {
            self.thinking_elapsed_ms = newer.thinking_elapsed_ms;
        }
    }
}

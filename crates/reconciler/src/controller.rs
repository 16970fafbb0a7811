//! Per-message stream orchestration
//!
//! A `StreamController` owns everything that happens to one assistant
//! message: it pulls normalized events from a `ChunkSource`, routes text
//! through the duplicate filter and think-tag parser, folds segments into
//! the session's block state machine, and persists through the throttler.
//! `run()` consumes the controller, so the terminal flush and event run
//! exactly once no matter which way the stream ends.

use crate::blocks::{Block, BlockChanges, BlockId, BlockStatus, BlockType, MessageId};
use crate::dedup::DuplicateFilter;
use crate::error::EngineError;
use crate::events::{EventSink, SessionEvent};
use crate::persistence::BlockStore;
use crate::session::{SegmentApplied, StreamSession, StructuralChange};
use crate::streaming::Segment;
use crate::throttle::{PersistenceThrottler, ThrottleConfig};
use crate::tools::{self, ToolRegistry};
use chrono::Utc;
use llm::{ChunkEvent, ChunkSource, ToolChunkInfo};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Workarounds for specific backends, off by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderQuirks {
    /// Engage the truncated re-send filter for backends that occasionally
    /// replay a prefix of content they already streamed.
    pub truncated_resend_filter: bool,
}

#[derive(Default)]
pub struct SessionOptions {
    /// When true, the finished answer is scanned for tool markup and the
    /// outcome carries `has_tool_calls`.
    pub tools_enabled: bool,
    pub quirks: ProviderQuirks,
    pub throttle: ThrottleConfig,
}

/// What the caller gets back when the stream ends without an upstream error.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub content: String,
    pub reasoning: Option<String>,
    pub reasoning_elapsed_ms: Option<u64>,
    /// Present only when tools were enabled for the session.
    pub has_tool_calls: Option<bool>,
    pub interrupted: bool,
}

enum EndReason {
    Finished,
    Cancelled,
}

pub struct StreamController {
    source: Box<dyn ChunkSource>,
    session: StreamSession,
    throttler: PersistenceThrottler,
    sink: Arc<dyn EventSink>,
    registry: Option<Arc<dyn ToolRegistry>>,
    cancel: CancellationToken,
    options: SessionOptions,
    placeholder: Block,
    tool_event_seen: bool,
}

impl StreamController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        message_id: MessageId,
        source: Box<dyn ChunkSource>,
        shared_store: Arc<dyn BlockStore>,
        durable_store: Arc<dyn BlockStore>,
        sink: Arc<dyn EventSink>,
        registry: Option<Arc<dyn ToolRegistry>>,
        cancel: CancellationToken,
        options: SessionOptions,
    ) -> Self {
        let placeholder_id = BlockId(format!("block-{}-0", message_id));
        let placeholder = Block::placeholder(placeholder_id.clone(), message_id.clone());
        let session = StreamSession::new(
            message_id,
            placeholder_id,
            DuplicateFilter::new(options.quirks.truncated_resend_filter),
        );
        let throttler =
            PersistenceThrottler::new(shared_store, durable_store, options.throttle.clone());
        Self {
            source,
            session,
            throttler,
            sink,
            registry,
            cancel,
            options,
            placeholder,
            tool_event_seen: false,
        }
    }

    /// Drive the stream to its end and report the outcome.
    ///
    /// Cancellation is not a failure: the partial content is flushed with
    /// status `Interrupted` and the outcome carries `interrupted: true`.
    /// Only an upstream provider error surfaces as `Err`, after the partial
    /// content has been flushed with status `Error`.
    pub async fn run(mut self) -> Result<StreamOutcome, EngineError> {
        self.create_placeholder().await;
        match self.consume().await {
            Ok(EndReason::Finished) => Ok(self.finalize(BlockStatus::Success, false).await),
            Ok(EndReason::Cancelled) => {
                debug!(
                    "Stream for message {} cancelled by caller",
                    self.session.message_id()
                );
                Ok(self.finalize(BlockStatus::Interrupted, true).await)
            }
            Err(e) => {
                error!(
                    "Upstream failure for message {}: {}",
                    self.session.message_id(),
                    e
                );
                self.emit(SessionEvent::Failed {
                    message_id: self.session.message_id().clone(),
                    error: e.to_string(),
                    at: Utc::now(),
                })
                .await;
                self.finalize(BlockStatus::Error, false).await;
                Err(e)
            }
        }
    }

    async fn create_placeholder(&mut self) {
        if let Err(e) = self
            .throttler
            .create_block(self.placeholder.clone())
            .await
        {
            warn!("Failed to create placeholder block: {}", e);
        }
    }

    async fn consume(&mut self) -> Result<EndReason, EngineError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(EndReason::Cancelled);
            }
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(EndReason::Cancelled),
                next = self.source.next_event() => next,
            };
            match next {
                Ok(Some(event)) => self.handle_event(event).await,
                Ok(None) => return Ok(EndReason::Finished),
                Err(e) => return Err(EngineError::Upstream(e.to_string())),
            }
        }
    }

    async fn handle_event(&mut self, event: ChunkEvent) {
        match event {
            ChunkEvent::TextDelta(text) => self.handle_text(&text, false).await,
            ChunkEvent::TextComplete(text) => self.handle_text(&text, true).await,
            ChunkEvent::ThinkingDelta { text, elapsed_ms } => {
                let applied = self.session.apply_thinking(&text, elapsed_ms, false);
                self.persist_applied(applied).await;
            }
            ChunkEvent::ThinkingComplete { text, elapsed_ms } => {
                let applied = self.session.apply_thinking(&text, elapsed_ms, true);
                self.persist_applied(applied).await;
            }
            ChunkEvent::ToolInProgress(info) => self.handle_tool(info, false).await,
            ChunkEvent::ToolComplete(info) => self.handle_tool(info, true).await,
        }
    }

    /// Raw answer text may carry inline reasoning markup, so it passes the
    /// quirk filter and the tag parser before reconciliation.
    async fn handle_text(&mut self, text: &str, is_completion: bool) {
        if !self.session.admit_fragment(text) {
            return;
        }
        let segments = self.session.parser.process(text);
        self.apply_segments(segments, is_completion).await;
    }

    async fn apply_segments(&mut self, segments: Vec<Segment>, is_completion: bool) {
        for segment in segments {
            let applied = match segment {
                Segment::Text(text) => self.session.apply_text(&text, is_completion),
                Segment::Thinking(text) => self.session.apply_thinking(&text, None, is_completion),
            };
            self.persist_applied(applied).await;
        }
    }

    async fn persist_applied(&mut self, applied: Option<SegmentApplied>) {
        let Some(applied) = applied else {
            return;
        };

        let content = match applied.block_type {
            BlockType::Thinking => self.session.thinking().to_string(),
            _ => self.session.text().to_string(),
        };

        match &applied.structural {
            Some(StructuralChange::ConvertedPlaceholder { id, to }) => {
                let changes = BlockChanges {
                    block_type: Some(*to),
                    content: Some(content),
                    ..Default::default()
                };
                if let Err(e) = self.throttler.update_structural(id, changes).await {
                    warn!("Failed to convert block {}: {}", id, e);
                }
            }
            Some(StructuralChange::CreatedBlock { id, block_type }) => {
                let block = Block::new_streaming(
                    id.clone(),
                    self.session.message_id().clone(),
                    *block_type,
                    content,
                );
                if let Err(e) = self.throttler.create_block(block).await {
                    warn!("Failed to create block {}: {}", id, e);
                }
            }
            None => {
                self.throttler
                    .queue_content(&applied.block_id, BlockChanges::content(content));
            }
        }

        let message_id = self.session.message_id().clone();
        match applied.block_type {
            BlockType::Thinking if applied.first_of_kind => {
                self.emit(SessionEvent::ReasoningStarted {
                    message_id,
                    block_id: applied.block_id.clone(),
                    at: Utc::now(),
                })
                .await;
            }
            BlockType::MainText => {
                let event = if applied.first_of_kind {
                    SessionEvent::TextStarted {
                        message_id,
                        block_id: applied.block_id.clone(),
                        at: Utc::now(),
                    }
                } else {
                    SessionEvent::TextDeltaApplied {
                        message_id,
                        block_id: applied.block_id.clone(),
                        at: Utc::now(),
                    }
                };
                self.emit(event).await;
            }
            _ => {}
        }
    }

    async fn handle_tool(&mut self, info: ToolChunkInfo, complete: bool) {
        self.tool_event_seen = true;
        self.emit(SessionEvent::ToolActivity {
            message_id: self.session.message_id().clone(),
            tool_id: info.id.unwrap_or_default(),
            tool_name: info.name.unwrap_or_default(),
            complete,
            at: Utc::now(),
        })
        .await;
    }

    /// The single terminal path: drains the parser, flushes the last known
    /// content with the terminal status, sniffs for tool calls, and emits
    /// the completion event.
    async fn finalize(&mut self, status: BlockStatus, interrupted: bool) -> StreamOutcome {
        let leftover = self.session.parser.finish();
        self.apply_segments(leftover, false).await;

        if let Err(e) = self
            .throttler
            .final_flush(self.session.final_updates(status))
            .await
        {
            warn!(
                "Final flush for message {} failed: {}",
                self.session.message_id(),
                e
            );
        }

        let has_tool_calls = self.options.tools_enabled.then(|| {
            self.tool_event_seen
                || self
                    .registry
                    .as_deref()
                    .is_some_and(|registry| tools::has_tool_calls(self.session.text(), registry))
        });

        // The error path already emitted `Failed`
        if status != BlockStatus::Error {
            self.emit(SessionEvent::Completed {
                message_id: self.session.message_id().clone(),
                interrupted,
                at: Utc::now(),
            })
            .await;
        }

        let reasoning = (!self.session.thinking().is_empty())
            .then(|| self.session.thinking().to_string());
        StreamOutcome {
            content: self.session.text().to_string(),
            reasoning_elapsed_ms: reasoning
                .as_ref()
                .and_then(|_| self.session.thinking_elapsed_ms()),
            reasoning,
            has_tool_calls,
            interrupted,
        }
    }

    async fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.sink.emit(event).await {
            warn!("Event sink rejected event: {}", e);
        }
    }
}

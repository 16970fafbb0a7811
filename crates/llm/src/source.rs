//! Chunk sources for the reconciliation engine
//!
//! A `ChunkSource` yields normalized events one at a time, supporting both
//! live adapters wrapping an HTTP stream and scripted playback with
//! identical consumer-side behavior.

use crate::ChunkEvent;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;

/// Trait for asynchronous sequences of normalized chunk events.
///
/// `Ok(None)` signals normal exhaustion of the stream. An `Err` is an
/// upstream provider failure surfaced mid-stream.
#[async_trait]
pub trait ChunkSource: Send {
    async fn next_event(&mut self) -> Result<Option<ChunkEvent>>;
}

/// Scripted event source for tests and recorded playback.
pub struct ScriptedSource {
    events: VecDeque<Result<ChunkEvent>>,
    delay: Option<Duration>,
}

impl ScriptedSource {
    pub fn new(events: Vec<ChunkEvent>) -> Self {
        Self {
            events: events.into_iter().map(Ok).collect(),
            delay: None,
        }
    }

    /// Sleep between events to simulate streaming pace.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// End the script with an upstream failure instead of normal exhaustion.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.events.push_back(Err(anyhow::anyhow!(message.into())));
        self
    }
}

#[async_trait]
impl ChunkSource for ScriptedSource {
    async fn next_event(&mut self) -> Result<Option<ChunkEvent>> {
        let Some(next) = self.events.pop_front() else {
            return Ok(None);
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        next.map(Some)
    }
}

//! Outbound notifications for display layers
//!
//! The engine reports lifecycle transitions to a UI (or any observer)
//! through a sink trait injected per session, keeping rendering concerns
//! out of the reconciliation path. Content itself travels through the
//! persisted blocks; events only tell the observer when to look.

use crate::blocks::{BlockId, MessageId};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// First reasoning fragment arrived; the named block now renders as
    /// thinking content.
    ReasoningStarted {
        message_id: MessageId,
        block_id: BlockId,
        at: DateTime<Utc>,
    },
    /// First answer fragment arrived.
    TextStarted {
        message_id: MessageId,
        block_id: BlockId,
        at: DateTime<Utc>,
    },
    /// Answer content grew or was replaced; drives re-render and scrolling.
    TextDeltaApplied {
        message_id: MessageId,
        block_id: BlockId,
        at: DateTime<Utc>,
    },
    /// A tool invocation surfaced in the stream.
    ToolActivity {
        message_id: MessageId,
        tool_id: String,
        tool_name: String,
        complete: bool,
        at: DateTime<Utc>,
    },
    /// Terminal event for the session. `interrupted` distinguishes a user
    /// cancellation from a normal completion.
    Completed {
        message_id: MessageId,
        interrupted: bool,
        at: DateTime<Utc>,
    },
    /// The provider stream failed mid-response.
    Failed {
        message_id: MessageId,
        error: String,
        at: DateTime<Utc>,
    },
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: SessionEvent) -> Result<()>;
}

/// Sink for callers that do not observe events.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _event: SessionEvent) -> Result<()> {
        Ok(())
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    pub struct CollectingSink {
        events: Arc<Mutex<Vec<SessionEvent>>>,
    }

    impl CollectingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<SessionEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventSink for CollectingSink {
        async fn emit(&self, event: SessionEvent) -> Result<()> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }
}

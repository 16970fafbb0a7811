//! Streaming response reconciliation engine
//!
//! Turns the messy reality of provider streaming (delta vs. cumulative
//! fragments, inline `<think>` markup, truncated re-sends, interleaved
//! reasoning and answer phases) into a clean sequence of typed content
//! blocks, persisted through a write throttler and reported to an
//! injected event sink.
//!
//! The entry point is [`controller::StreamController`]: one instance per
//! in-flight assistant message, driven by a [`llm::ChunkSource`].

pub mod blocks;
pub mod controller;
pub mod dedup;
pub mod error;
pub mod events;
pub mod persistence;
pub mod reconcile;
pub mod session;
pub mod streaming;
pub mod throttle;
pub mod tools;

pub use blocks::{Block, BlockChanges, BlockId, BlockStatus, BlockType, MessageId};
pub use controller::{ProviderQuirks, SessionOptions, StreamController, StreamOutcome};
pub use error::EngineError;
pub use events::{EventSink, NullSink, SessionEvent};
pub use persistence::BlockStore;
pub use throttle::ThrottleConfig;
pub use tools::{StaticToolRegistry, ToolRegistry};

//! Per-response session state and the block lifecycle state machine
//!
//! A `StreamSession` is the transient, in-memory state of one in-flight
//! assistant message. The transition functions are synchronous and return
//! structural changes as values, so the machine can be tested without a
//! live stream or persistence behind it.

use crate::blocks::{BlockChanges, BlockId, BlockStatus, BlockType, MessageId};
use crate::dedup::DuplicateFilter;
use crate::reconcile::{self, MergeOutcome};
use crate::streaming::ThinkTagParser;
use std::time::Instant;
use tracing::warn;

/// Mirrors which block kind most recently received content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastBlockType {
    /// Placeholder not yet converted
    Unknown,
    MainText,
    Thinking,
}

/// A structural change that must be persisted synchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuralChange {
    /// The placeholder was converted in place; one-way, happens at most once.
    ConvertedPlaceholder { id: BlockId, to: BlockType },
    /// A sibling block was created because content kinds interleaved.
    CreatedBlock { id: BlockId, block_type: BlockType },
}

/// Result of folding one segment into the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentApplied {
    /// The block now holding this segment's content.
    pub block_id: BlockId,
    pub block_type: BlockType,
    pub structural: Option<StructuralChange>,
    pub merge: MergeOutcome,
    /// Whether this was the first fragment of its kind in the session.
    pub first_of_kind: bool,
}

/// Transient state of one in-flight message. Never outlives one response.
pub struct StreamSession {
    message_id: MessageId,
    /// Placeholder id, consumed by the first conversion.
    placeholder_id: Option<BlockId>,
    text: String,
    thinking: String,
    last_block_type: LastBlockType,
    main_text_block_id: Option<BlockId>,
    thinking_block_id: Option<BlockId>,
    thinking_started: Option<Instant>,
    thinking_elapsed_ms: Option<u64>,
    pub parser: ThinkTagParser,
    dedup: DuplicateFilter,
    next_block_seq: u64,
}

impl StreamSession {
    pub fn new(message_id: MessageId, placeholder_id: BlockId, dedup: DuplicateFilter) -> Self {
        Self {
            message_id,
            placeholder_id: Some(placeholder_id),
            text: String::new(),
            thinking: String::new(),
            last_block_type: LastBlockType::Unknown,
            main_text_block_id: None,
            thinking_block_id: None,
            thinking_started: None,
            thinking_elapsed_ms: None,
            parser: ThinkTagParser::new(),
            dedup,
            next_block_seq: 1,
        }
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn thinking(&self) -> &str {
        &self.thinking
    }

    pub fn last_block_type(&self) -> LastBlockType {
        self.last_block_type
    }

    pub fn main_text_block_id(&self) -> Option<&BlockId> {
        self.main_text_block_id.as_ref()
    }

    pub fn thinking_block_id(&self) -> Option<&BlockId> {
        self.thinking_block_id.as_ref()
    }

    pub fn thinking_elapsed_ms(&self) -> Option<u64> {
        self.thinking_elapsed_ms
    }

    /// Gate a raw text fragment through the provider quirk filter before
    /// any parsing happens. False means drop the fragment entirely.
    pub fn admit_fragment(&mut self, fragment: &str) -> bool {
        self.dedup.admit(&self.text, fragment)
    }

    /// Fold a plain-text fragment into the session.
    ///
    /// Returns `None` when the fragment was discarded as a repeat; otherwise
    /// the applied result, including any structural change that resolved
    /// where the content lives.
    pub fn apply_text(&mut self, fragment: &str, is_completion: bool) -> Option<SegmentApplied> {
        let merge = if is_completion {
            reconcile::merge_completion(&mut self.text, fragment)
        } else {
            reconcile::merge_text(&mut self.text, fragment)
        };
        if !merge.changed() {
            return None;
        }

        let first = self.main_text_block_id.is_none();
        let structural = if first {
            Some(self.resolve_main_text_block())
        } else {
            None
        };
        self.last_block_type = LastBlockType::MainText;
        let block_id = self.main_text_block_id.clone()?;

        Some(SegmentApplied {
            block_id,
            block_type: BlockType::MainText,
            structural,
            merge,
            first_of_kind: first,
        })
    }

    /// Fold a reasoning fragment into the session.
    pub fn apply_thinking(
        &mut self,
        fragment: &str,
        elapsed_ms: Option<u64>,
        is_completion: bool,
    ) -> Option<SegmentApplied> {
        let merge = if is_completion {
            reconcile::merge_completion(&mut self.thinking, fragment)
        } else {
            reconcile::merge_thinking(&mut self.thinking, fragment)
        };
        if !merge.changed() {
            return None;
        }

        // Elapsed reasoning time spans first to last reasoning fragment.
        // Provider-reported durations take precedence over our own clock.
        let started = *self.thinking_started.get_or_insert_with(Instant::now);
        self.thinking_elapsed_ms =
            elapsed_ms.or_else(|| Some(started.elapsed().as_millis() as u64));

        let first = self.thinking_block_id.is_none();
        let structural = if first {
            Some(self.resolve_thinking_block())
        } else {
            None
        };
        self.last_block_type = LastBlockType::Thinking;
        let block_id = self.thinking_block_id.clone()?;

        Some(SegmentApplied {
            block_id,
            block_type: BlockType::Thinking,
            structural,
            merge,
            first_of_kind: first,
        })
    }

    fn resolve_main_text_block(&mut self) -> StructuralChange {
        match self.placeholder_id.take() {
            Some(id) => {
                self.main_text_block_id = Some(id.clone());
                StructuralChange::ConvertedPlaceholder {
                    id,
                    to: BlockType::MainText,
                }
            }
            None => {
                // Reasoning came first; the answer gets its own sibling block
                let id = self.new_block_id();
                self.main_text_block_id = Some(id.clone());
                StructuralChange::CreatedBlock {
                    id,
                    block_type: BlockType::MainText,
                }
            }
        }
    }

    fn resolve_thinking_block(&mut self) -> StructuralChange {
        match self.placeholder_id.take() {
            Some(id) => {
                self.thinking_block_id = Some(id.clone());
                StructuralChange::ConvertedPlaceholder {
                    id,
                    to: BlockType::Thinking,
                }
            }
            None => {
                // Well-behaved providers emit reasoning before the answer;
                // this ordering still gets a correct sibling block.
                warn!(
                    "Reasoning fragment arrived after main text for message {}",
                    self.message_id
                );
                let id = self.new_block_id();
                self.thinking_block_id = Some(id.clone());
                StructuralChange::CreatedBlock {
                    id,
                    block_type: BlockType::Thinking,
                }
            }
        }
    }

    fn new_block_id(&mut self) -> BlockId {
        let seq = self.next_block_seq;
        self.next_block_seq += 1;
        BlockId(format!("block-{}-{}", self.message_id, seq))
    }

    /// The final write for every block this session touched, carrying the
    /// last known content and the terminal status. The unconverted
    /// placeholder is included so no block is ever left `Streaming`.
    pub fn final_updates(&self, status: BlockStatus) -> Vec<(BlockId, BlockChanges)> {
        let mut updates = Vec::new();
        if let Some(id) = &self.thinking_block_id {
            updates.push((
                id.clone(),
                BlockChanges::content(self.thinking.clone())
                    .with_status(status)
                    .with_elapsed(self.thinking_elapsed_ms),
            ));
        }
        if let Some(id) = &self.main_text_block_id {
            updates.push((
                id.clone(),
                BlockChanges::content(self.text.clone()).with_status(status),
            ));
        }
        if let Some(id) = &self.placeholder_id {
            updates.push((id.clone(), BlockChanges::default().with_status(status)));
        }
        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> StreamSession {
        StreamSession::new(
            MessageId("msg-7".to_string()),
            BlockId("block-msg-7-0".to_string()),
            DuplicateFilter::new(false),
        )
    }

    #[test]
    fn first_text_converts_placeholder() {
        let mut s = session();
        let applied = s.apply_text("Hel", false).unwrap();
        assert_eq!(
            applied.structural,
            Some(StructuralChange::ConvertedPlaceholder {
                id: BlockId("block-msg-7-0".to_string()),
                to: BlockType::MainText,
            })
        );
        assert!(applied.first_of_kind);
        assert_eq!(s.last_block_type(), LastBlockType::MainText);

        // Further deltas update in place, no structural change
        let applied = s.apply_text("lo", false).unwrap();
        assert_eq!(applied.structural, None);
        assert_eq!(s.text(), "Hello");
    }

    #[test]
    fn first_thinking_converts_placeholder_and_tracks_elapsed() {
        let mut s = session();
        let applied = s.apply_thinking("reasoning", None, false).unwrap();
        assert_eq!(
            applied.structural,
            Some(StructuralChange::ConvertedPlaceholder {
                id: BlockId("block-msg-7-0".to_string()),
                to: BlockType::Thinking,
            })
        );
        assert!(s.thinking_elapsed_ms().is_some());
    }

    #[test]
    fn text_after_thinking_creates_sibling_block() {
        let mut s = session();
        s.apply_thinking("reasoning", None, false).unwrap();
        let applied = s.apply_text("answer", false).unwrap();
        match applied.structural {
            Some(StructuralChange::CreatedBlock { ref id, block_type }) => {
                assert_eq!(block_type, BlockType::MainText);
                assert_ne!(id, &BlockId("block-msg-7-0".to_string()));
            }
            other => panic!("expected created block, got {:?}", other),
        }
        // Both blocks resolved, attached to the same message
        assert!(s.thinking_block_id().is_some());
        assert!(s.main_text_block_id().is_some());
        assert_ne!(s.thinking_block_id(), s.main_text_block_id());
    }

    #[test]
    fn thinking_after_text_creates_sibling_block() {
        let mut s = session();
        s.apply_text("answer first", false).unwrap();
        let applied = s.apply_thinking("late reasoning", None, false).unwrap();
        assert!(matches!(
            applied.structural,
            Some(StructuralChange::CreatedBlock {
                block_type: BlockType::Thinking,
                ..
            })
        ));
    }

    #[test]
    fn at_most_one_placeholder_conversion() {
        let mut s = session();
        let conversions = [
            s.apply_thinking("a", None, false),
            s.apply_text("b", false),
            s.apply_thinking("c", None, false),
            s.apply_text("d", false),
        ]
        .into_iter()
        .flatten()
        .filter(|applied| {
            matches!(
                applied.structural,
                Some(StructuralChange::ConvertedPlaceholder { .. })
            )
        })
        .count();
        assert_eq!(conversions, 1);
    }

    #[test]
    fn provider_elapsed_takes_precedence() {
        let mut s = session();
        s.apply_thinking("a", Some(1234), false).unwrap();
        assert_eq!(s.thinking_elapsed_ms(), Some(1234));
    }

    #[test]
    fn repeated_thinking_fragment_is_discarded() {
        let mut s = session();
        s.apply_thinking("same", None, false).unwrap();
        assert!(s.apply_thinking("same", None, false).is_none());
        assert_eq!(s.thinking(), "same");
    }

    #[test]
    fn final_updates_cover_unconverted_placeholder() {
        let s = session();
        let updates = s.final_updates(BlockStatus::Interrupted);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, BlockId("block-msg-7-0".to_string()));
        assert_eq!(updates[0].1.status, Some(BlockStatus::Interrupted));
    }

    #[test]
    fn final_updates_carry_last_content_and_elapsed() {
        let mut s = session();
        s.apply_thinking("why", Some(50), false).unwrap();
        s.apply_text("Hello", false).unwrap();
        let updates = s.final_updates(BlockStatus::Success);
        assert_eq!(updates.len(), 2);
        let thinking = &updates[0].1;
        assert_eq!(thinking.content.as_deref(), Some("why"));
        assert_eq!(thinking.thinking_elapsed_ms, Some(50));
        let text = &updates[1].1;
        assert_eq!(text.content.as_deref(), Some("Hello"));
        assert_eq!(text.status, Some(BlockStatus::Success));
    }
}

//! Persistence seam for blocks
//!
//! The engine never talks to a database directly; it issues block creates
//! and partial updates through this trait. Production implementations wrap
//! the client's storage layer, tests use `MockBlockStore`.

use crate::blocks::{Block, BlockChanges, BlockId};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Insert a new block row.
    async fn create_block(&self, block: Block) -> Result<()>;

    /// Apply a partial update to an existing block.
    async fn update_block(&self, id: &BlockId, changes: BlockChanges) -> Result<()>;
}

#[cfg(any(test, feature = "testing"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Every call recorded, in order, for assertions.
    #[derive(Debug, Clone)]
    pub enum StoreCall {
        Create(Block),
        Update(BlockId, BlockChanges),
    }

    /// In-memory store that also maintains materialized block state, so
    /// tests can assert on the final picture rather than replaying calls.
    #[derive(Default, Clone)]
    pub struct MockBlockStore {
        inner: Arc<Mutex<MockState>>,
    }

    #[derive(Default)]
    struct MockState {
        calls: Vec<StoreCall>,
        blocks: HashMap<BlockId, Block>,
        fail_updates: bool,
    }

    impl MockBlockStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent update return an error.
        pub fn fail_updates(&self) {
            self.inner.lock().unwrap().fail_updates = true;
        }

        pub fn calls(&self) -> Vec<StoreCall> {
            self.inner.lock().unwrap().calls.clone()
        }

        pub fn block(&self, id: &BlockId) -> Option<Block> {
            self.inner.lock().unwrap().blocks.get(id).cloned()
        }

        pub fn blocks(&self) -> Vec<Block> {
            let state = self.inner.lock().unwrap();
            let mut blocks: Vec<Block> = state.blocks.values().cloned().collect();
            blocks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));
            blocks
        }

        pub fn update_count(&self, id: &BlockId) -> usize {
            self.inner
                .lock()
                .unwrap()
                .calls
                .iter()
                .filter(|call| matches!(call, StoreCall::Update(updated, _) if updated == id))
                .count()
        }
    }

    #[async_trait]
    impl BlockStore for MockBlockStore {
        async fn create_block(&self, block: Block) -> Result<()> {
            let mut state = self.inner.lock().unwrap();
            state.calls.push(StoreCall::Create(block.clone()));
            state.blocks.insert(block.id.clone(), block);
            Ok(())
        }

        async fn update_block(&self, id: &BlockId, changes: BlockChanges) -> Result<()> {
            let mut state = self.inner.lock().unwrap();
            if state.fail_updates {
                anyhow::bail!("mock store: update failure injected");
            }
            state
                .calls
                .push(StoreCall::Update(id.clone(), changes.clone()));
            if let Some(block) = state.blocks.get_mut(id) {
                block.apply(&changes);
            }
            Ok(())
        }
    }
}

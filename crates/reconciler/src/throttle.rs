//! Write throttling between the engine and its stores
//!
//! Content grows many times per second while a response streams; writing
//! every delta would hammer both the shared UI-facing store and durable
//! storage. Structural writes (block creation, type conversion) bypass the
//! throttle entirely. Content writes go through two lanes with different
//! coalescing windows, each implemented as a worker task fed by an
//! unbounded channel so chunk processing never blocks on a store.
//!
//! Each lane uses leading plus trailing coalescing per block: the first
//! write in a quiet period goes out immediately, later writes inside the
//! window collapse into one trailing write carrying the newest value. The
//! most recent value therefore always reaches both stores, even when
//! intermediate values are skipped.

use crate::blocks::{Block, BlockChanges, BlockId};
use crate::error::EngineError;
use crate::persistence::BlockStore;
use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Coalescing window for the shared UI-facing store.
    #[serde(with = "duration_ms")]
    pub shared_window: Duration,
    /// Coalescing window for durable storage.
    #[serde(with = "duration_ms")]
    pub durable_window: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            shared_window: Duration::from_millis(150),
            durable_window: Duration::from_millis(800),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

enum LaneCommand {
    Update(BlockId, BlockChanges),
    /// Authoritative final state, written unthrottled. The sender is
    /// signalled once everything, including leftover pending writes, is out.
    Flush(Vec<(BlockId, BlockChanges)>, oneshot::Sender<()>),
}

struct Lane {
    tx: mpsc::UnboundedSender<LaneCommand>,
    _worker: JoinHandle<()>,
}

impl Lane {
    fn spawn(name: &'static str, store: Arc<dyn BlockStore>, window: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(lane_worker(name, store, window, rx));
        Self {
            tx,
            _worker: worker,
        }
    }
}

async fn lane_worker(
    name: &'static str,
    store: Arc<dyn BlockStore>,
    window: Duration,
    mut rx: mpsc::UnboundedReceiver<LaneCommand>,
) {
    let mut pending: HashMap<BlockId, BlockChanges> = HashMap::new();
    let mut window_end: HashMap<BlockId, Instant> = HashMap::new();

    loop {
        let next_deadline = window_end.values().min().copied();
        let deadline = next_deadline.unwrap_or_else(Instant::now);

        tokio::select! {
            command = rx.recv() => match command {
                Some(LaneCommand::Update(id, changes)) => {
                    let now = Instant::now();
                    let open = window_end.get(&id).is_some_and(|end| *end > now);
                    if open {
                        pending
                            .entry(id)
                            .and_modify(|held| held.merge_from(changes.clone()))
                            .or_insert(changes);
                    } else {
                        write(name, &store, &id, changes).await;
                        window_end.insert(id, now + window);
                    }
                }
                Some(LaneCommand::Flush(updates, done)) => {
                    for (id, _) in &updates {
                        pending.remove(id);
                    }
                    for (id, changes) in pending.drain() {
                        write(name, &store, &id, changes).await;
                    }
                    for (id, changes) in updates {
                        write(name, &store, &id, changes).await;
                    }
                    window_end.clear();
                    let _ = done.send(());
                }
                None => break,
            },
            _ = sleep_until(deadline), if next_deadline.is_some() => {
                let now = Instant::now();
                let due: Vec<BlockId> = window_end
                    .iter()
                    .filter(|(_, end)| **end <= now)
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in due {
                    match pending.remove(&id) {
                        Some(changes) => {
                            write(name, &store, &id, changes).await;
                            // Trailing write opens a fresh window so a
                            // still-hot block keeps coalescing
                            window_end.insert(id, now + window);
                        }
                        None => {
                            window_end.remove(&id);
                        }
                    }
                }
            }
        }
    }

    // Channel closed without a flush; do not drop what is still held
    for (id, changes) in pending.drain() {
        write(name, &store, &id, changes).await;
    }
}

async fn write(name: &str, store: &Arc<dyn BlockStore>, id: &BlockId, changes: BlockChanges) {
    if let Err(e) = store.update_block(id, changes).await {
        // The next throttled write carries the full latest value, so a
        // failed write heals on its own
        warn!("{} store write for block {} failed: {}", name, id, e);
    } else {
        debug!("{} store write for block {}", name, id);
    }
}

/// Routes block writes to the shared and durable stores per the policy
/// above. One instance per stream session.
pub struct PersistenceThrottler {
    shared_store: Arc<dyn BlockStore>,
    durable_store: Arc<dyn BlockStore>,
    shared_lane: Lane,
    durable_lane: Lane,
}

impl PersistenceThrottler {
    pub fn new(
        shared_store: Arc<dyn BlockStore>,
        durable_store: Arc<dyn BlockStore>,
        config: ThrottleConfig,
    ) -> Self {
        let shared_lane = Lane::spawn("shared", shared_store.clone(), config.shared_window);
        let durable_lane = Lane::spawn("durable", durable_store.clone(), config.durable_window);
        Self {
            shared_store,
            durable_store,
            shared_lane,
            durable_lane,
        }
    }

    /// Unthrottled block creation in both stores.
    pub async fn create_block(&self, block: Block) -> Result<()> {
        self.shared_store.create_block(block.clone()).await?;
        self.durable_store.create_block(block).await?;
        Ok(())
    }

    /// Unthrottled structural update (type conversion) in both stores.
    pub async fn update_structural(&self, id: &BlockId, changes: BlockChanges) -> Result<()> {
        self.shared_store
            .update_block(id, changes.clone())
            .await?;
        self.durable_store.update_block(id, changes).await?;
        Ok(())
    }

    /// Throttled content update. Returns immediately; the lanes decide when
    /// the write actually happens.
    pub fn queue_content(&self, id: &BlockId, changes: BlockChanges) {
        let _ = self
            .shared_lane
            .tx
            .send(LaneCommand::Update(id.clone(), changes.clone()));
        let _ = self
            .durable_lane
            .tx
            .send(LaneCommand::Update(id.clone(), changes));
    }

    /// Final, unthrottled flush of the last known state to both stores.
    /// Resolves only after both lanes have written everything out.
    pub async fn final_flush(
        &self,
        updates: Vec<(BlockId, BlockChanges)>,
    ) -> Result<(), EngineError> {
        let (shared_done_tx, shared_done) = oneshot::channel();
        let (durable_done_tx, durable_done) = oneshot::channel();
        self.shared_lane
            .tx
            .send(LaneCommand::Flush(updates.clone(), shared_done_tx))
            .map_err(|_| EngineError::PersistenceWrite("shared lane is gone".to_string()))?;
        self.durable_lane
            .tx
            .send(LaneCommand::Flush(updates, durable_done_tx))
            .map_err(|_| EngineError::PersistenceWrite("durable lane is gone".to_string()))?;
        let _ = shared_done.await;
        let _ = durable_done.await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Block, BlockStatus, BlockType, MessageId};
    use crate::persistence::mock::MockBlockStore;

    fn block_id() -> BlockId {
        BlockId("block-msg-1-1".to_string())
    }

    fn throttler(
        shared: &MockBlockStore,
        durable: &MockBlockStore,
    ) -> PersistenceThrottler {
        PersistenceThrottler::new(
            Arc::new(shared.clone()),
            Arc::new(durable.clone()),
            ThrottleConfig::default(),
        )
    }

    async fn seed_block(shared: &MockBlockStore, durable: &MockBlockStore) {
        let block = Block::new_streaming(
            block_id(),
            MessageId("msg-1".to_string()),
            BlockType::MainText,
            String::new(),
        );
        for store in [shared, durable] {
            store.create_block(block.clone()).await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn leading_write_goes_out_immediately() {
        let (shared, durable) = (MockBlockStore::new(), MockBlockStore::new());
        let throttler = throttler(&shared, &durable);
        throttler.create_block(Block::new_streaming(
            block_id(),
            MessageId("msg-1".to_string()),
            BlockType::MainText,
            String::new(),
        ))
        .await
        .unwrap();

        throttler.queue_content(&block_id(), BlockChanges::content("Hel"));
        tokio::task::yield_now().await;

        assert_eq!(shared.update_count(&block_id()), 1);
        assert_eq!(shared.block(&block_id()).unwrap().content, "Hel");
        assert_eq!(durable.update_count(&block_id()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_to_leading_plus_trailing() {
        let (shared, durable) = (MockBlockStore::new(), MockBlockStore::new());
        let throttler = throttler(&shared, &durable);
        seed_block(&shared, &durable).await;
        tokio::task::yield_now().await;

        for content in ["H", "He", "Hel", "Hell", "Hello"] {
            throttler.queue_content(&block_id(), BlockChanges::content(content));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Leading "H" plus one trailing write with the newest value
        assert_eq!(shared.update_count(&block_id()), 2);
        assert_eq!(shared.block(&block_id()).unwrap().content, "Hello");
    }

    #[tokio::test(start_paused = true)]
    async fn durable_lane_coalesces_harder_than_shared() {
        let (shared, durable) = (MockBlockStore::new(), MockBlockStore::new());
        let throttler = throttler(&shared, &durable);
        seed_block(&shared, &durable).await;
        tokio::task::yield_now().await;

        // 600ms of updates every 50ms spans several shared windows but
        // stays inside one durable window
        for i in 0..12 {
            throttler.queue_content(&block_id(), BlockChanges::content(format!("v{}", i)));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(shared.update_count(&block_id()) > durable.update_count(&block_id()));
        assert_eq!(shared.block(&block_id()).unwrap().content, "v11");
        assert_eq!(durable.block(&block_id()).unwrap().content, "v11");
    }

    #[tokio::test(start_paused = true)]
    async fn final_flush_writes_latest_value_everywhere() {
        let (shared, durable) = (MockBlockStore::new(), MockBlockStore::new());
        let throttler = throttler(&shared, &durable);
        seed_block(&shared, &durable).await;
        tokio::task::yield_now().await;

        throttler.queue_content(&block_id(), BlockChanges::content("partial"));
        throttler
            .final_flush(vec![(
                block_id(),
                BlockChanges::content("final").with_status(BlockStatus::Success),
            )])
            .await
            .unwrap();

        for store in [&shared, &durable] {
            let block = store.block(&block_id()).unwrap();
            assert_eq!(block.content, "final");
            assert_eq!(block.status, BlockStatus::Success);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_does_not_stop_the_lane() {
        let (shared, durable) = (MockBlockStore::new(), MockBlockStore::new());
        let throttler = throttler(&shared, &durable);
        seed_block(&shared, &durable).await;
        tokio::task::yield_now().await;

        durable.fail_updates();
        throttler.queue_content(&block_id(), BlockChanges::content("doomed"));
        tokio::time::advance(Duration::from_secs(1)).await;

        // The shared lane is unaffected and the worker keeps running
        throttler.queue_content(&block_id(), BlockChanges::content("later"));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(shared.block(&block_id()).unwrap().content, "later");
    }
}

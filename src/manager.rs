/// The graph manager: single writer of the live token graph.
///
/// Reserve updates are buffered per block and applied as one batch when the
/// first update of a later block arrives, or when the idle timer decides no
/// more updates are coming. Each applied batch becomes an immutable
/// snapshot pushed at the detector over a bounded channel; when the
/// detector lags, the newest snapshot is dropped rather than stalling
/// intake. Applied state is never lost, only its publication.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::U256;
use eyre::Result;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::arb::graph::{TokenGraph, ValidationReport};
use crate::arb::pool::{Pool, PoolId};
use crate::arb::snapshot::Snapshot;
use crate::arb::token::Token;
use crate::config::Config;
use crate::telemetry::Telemetry;

/// A decoded reserve change for one pool, as delivered by the ingest layer.
#[derive(Debug, Clone)]
pub struct ReserveUpdate {
    pub pool: PoolId,
    pub reserve0: U256,
    pub reserve1: U256,
    pub block: u64,
    /// Position within the block, for order-preserving application
    pub log_index: u64,
    pub received_at: Instant,
}

impl ReserveUpdate {
    #[must_use]
    pub fn new(pool: PoolId, reserve0: U256, reserve1: U256, block: u64, log_index: u64) -> Self {
        Self {
            pool,
            reserve0,
            reserve1,
            block,
            log_index,
            received_at: Instant::now(),
        }
    }
}

/// A newly tracked pool plus the metadata of its two tokens.
#[derive(Debug, Clone)]
pub struct PoolAdded {
    pub pool: Pool,
    pub token0: Token,
    pub token1: Token,
}

/// The batch currently accumulating.
#[derive(Debug, Default)]
struct Pending {
    block: u64,
    updates: Vec<ReserveUpdate>,
}

pub struct GraphManager {
    graph: RwLock<TokenGraph>,
    pending: Mutex<Pending>,
    snapshot_tx: mpsc::Sender<Snapshot>,
    telemetry: Arc<dyn Telemetry>,
    idle_flush_delay: Duration,
    /// Generation counter for the idle timer; bumping it orphans any
    /// armed timer task
    flush_seq: AtomicU64,
    shutdown: AtomicBool,
}

impl GraphManager {
    /// Build a manager around an empty graph. The receiver is the
    /// snapshot feed the detector consumes.
    #[must_use]
    pub fn new(
        config: &Config,
        telemetry: Arc<dyn Telemetry>,
    ) -> (Arc<Self>, mpsc::Receiver<Snapshot>) {
        let (snapshot_tx, snapshot_rx) = mpsc::channel(config.snapshot_channel_capacity);

        let manager = Arc::new(Self {
            graph: RwLock::new(TokenGraph::new()),
            pending: Mutex::new(Pending::default()),
            snapshot_tx,
            telemetry,
            idle_flush_delay: config.idle_flush_delay,
            flush_seq: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        });

        (manager, snapshot_rx)
    }

    /// Start tracking a pool. Token metadata wins over any placeholder
    /// the pool may have created earlier.
    pub async fn process_pool_added(&self, added: PoolAdded) -> Result<()> {
        let mut graph = self.graph.write().await;
        graph.add_token(added.token0)?;
        graph.add_token(added.token1)?;
        log::info!("Tracking new pool {:?}", added.pool);
        graph.add_pool(added.pool)
    }

    /// Buffer one reserve update. The first update of a later block
    /// applies and publishes the batch accumulated so far.
    pub async fn process_update(self: &Arc<Self>, update: ReserveUpdate) {
        self.telemetry.update_received();

        let mut pending = self.pending.lock().await;
        if update.block > pending.block && !pending.updates.is_empty() {
            self.apply_locked(&mut pending, true).await;
        }
        pending.block = update.block;
        pending.updates.push(update);
        drop(pending);

        self.arm_flush_timer();
    }

    /// Apply whatever is buffered and publish the resulting snapshot.
    pub async fn flush(&self) {
        let mut pending = self.pending.lock().await;
        self.apply_locked(&mut pending, true).await;
    }

    /// Drain pending updates, then hand back a fresh snapshot without
    /// publishing it. For callers that need "latest state now"; `block` is
    /// the caller's view of the chain head and only ever moves the stamp
    /// forward.
    pub async fn current_snapshot(&self, block: u64) -> Snapshot {
        let mut pending = self.pending.lock().await;
        pending.block = pending.block.max(block);
        let stamped = pending.block;
        if let Some(snapshot) = self.apply_locked(&mut pending, false).await {
            return snapshot;
        }
        self.graph.read().await.snapshot(stamped)
    }

    /// Apply the buffered batch under the pending lock. Returns the built
    /// snapshot when not publishing; publishing consumes it.
    async fn apply_locked(&self, pending: &mut Pending, publish: bool) -> Option<Snapshot> {
        if pending.updates.is_empty() {
            return None;
        }

        let updates = std::mem::take(&mut pending.updates);
        let block = pending.block;
        let started = Instant::now();

        let mut graph = self.graph.write().await;
        let mut applied = 0_usize;
        let mut missed = 0_usize;
        for update in updates {
            if graph.update_reserves(update.pool, update.reserve0, update.reserve1) {
                applied += 1;
            } else {
                missed += 1;
                self.telemetry.update_missed();
            }
        }
        let snapshot = graph.snapshot(block);
        drop(graph);

        self.telemetry.snapshot_built(started.elapsed());
        log::debug!("Applied {applied} updates ({missed} misses) at block {block}");

        if publish {
            if let Err(mpsc::error::TrySendError::Full(_)) = self.snapshot_tx.try_send(snapshot) {
                self.telemetry.channel_dropped("snapshots");
            }
            None
        } else {
            Some(snapshot)
        }
    }

    /// (Re)arm the idle flush. Any previously armed timer sees a newer
    /// generation when it wakes and does nothing.
    fn arm_flush_timer(self: &Arc<Self>) {
        let seq = self.flush_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(manager.idle_flush_delay).await;
            if manager.flush_seq.load(Ordering::SeqCst) == seq
                && !manager.shutdown.load(Ordering::SeqCst)
            {
                manager.flush().await;
            }
        });
    }

    /// Stop the idle timer and stop accepting timer flushes. Buffered but
    /// unapplied updates are discarded.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.flush_seq.fetch_add(1, Ordering::SeqCst);
    }

    /// (nodes, edges, pools) of the live graph.
    pub async fn stats(&self) -> (usize, usize, usize) {
        self.graph.read().await.stats()
    }

    pub async fn has_pool(&self, id: PoolId) -> bool {
        self.graph.read().await.has_pool(id)
    }

    pub async fn tracked_pool_addresses(&self) -> Vec<PoolId> {
        self.graph.read().await.tracked_pool_addresses()
    }

    pub async fn validate(&self) -> ValidationReport {
        self.graph.read().await.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arb::test_helpers::*;
    use crate::telemetry::{AtomicTelemetry, NullTelemetry};

    fn update(pool_label: &str, reserve0: u64, reserve1: u64, block: u64) -> ReserveUpdate {
        ReserveUpdate::new(
            PoolId::from(address_from_str(pool_label)),
            U256::from(reserve0),
            U256::from(reserve1),
            block,
            0,
        )
    }

    async fn seeded_manager(
        config: &Config,
        telemetry: Arc<dyn Telemetry>,
    ) -> (Arc<GraphManager>, mpsc::Receiver<Snapshot>) {
        let (manager, rx) = GraphManager::new(config, telemetry);
        manager
            .process_pool_added(PoolAdded {
                pool: pool("F1", "A", "B", 100, 200),
                token0: token("A"),
                token1: token("B"),
            })
            .await
            .unwrap();
        (manager, rx)
    }

    #[tokio::test]
    async fn test_batching_across_block_boundary() {
        let config = Config::test_config();
        let (manager, mut rx) = seeded_manager(&config, Arc::new(NullTelemetry)).await;

        manager.process_update(update("F1", 110, 190, 100)).await;
        manager.process_update(update("F1", 120, 180, 100)).await;
        // First update of block 101 applies the block-100 batch
        manager.process_update(update("F1", 130, 170, 101)).await;

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.block(), 100);
        // Both block-100 updates applied, in order: the later one wins
        let id = PoolId::from(address_from_str("F1"));
        assert_eq!(snapshot.get_pool(id).unwrap().reserve0, U256::from(120));

        manager.flush().await;
        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.block(), 101);
        assert_eq!(snapshot.get_pool(id).unwrap().reserve0, U256::from(130));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_flush() {
        let config = Config::test_config();
        let (manager, mut rx) = seeded_manager(&config, Arc::new(NullTelemetry)).await;

        manager.process_update(update("F1", 150, 150, 200)).await;

        // No further updates: the idle timer publishes block 200 by itself
        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.block(), 200);

        // And exactly once
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_pool_is_a_miss_not_a_failure() {
        let config = Config::test_config();
        let telemetry = Arc::new(AtomicTelemetry::new());
        let (manager, mut rx) = seeded_manager(&config, telemetry.clone()).await;

        manager.process_update(update("F1", 111, 189, 300)).await;
        manager.process_update(update("99", 1, 1, 300)).await;
        manager.flush().await;

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.block(), 300);
        let id = PoolId::from(address_from_str("F1"));
        assert_eq!(snapshot.get_pool(id).unwrap().reserve0, U256::from(111));
        assert_eq!(telemetry.updates_missed.load(Ordering::Relaxed), 1);
        assert_eq!(telemetry.updates_received.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_current_snapshot_drains_pending() {
        let config = Config::test_config();
        let (manager, mut rx) = seeded_manager(&config, Arc::new(NullTelemetry)).await;

        manager.process_update(update("F1", 140, 160, 400)).await;
        let snapshot = manager.current_snapshot(400).await;

        assert_eq!(snapshot.block(), 400);
        let id = PoolId::from(address_from_str("F1"));
        assert_eq!(snapshot.get_pool(id).unwrap().reserve0, U256::from(140));
        // Drained without publishing
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_backpressure_drops_snapshot_not_state() {
        let mut config = Config::test_config();
        config.snapshot_channel_capacity = 1;
        let telemetry = Arc::new(AtomicTelemetry::new());
        let (manager, mut rx) = seeded_manager(&config, telemetry.clone()).await;

        manager.process_update(update("F1", 101, 199, 500)).await;
        manager.flush().await;
        manager.process_update(update("F1", 102, 198, 501)).await;
        manager.flush().await; // channel is full: dropped

        assert_eq!(telemetry.channel_drops.load(Ordering::Relaxed), 1);
        assert_eq!(rx.recv().await.unwrap().block(), 500);

        // The dropped snapshot's state is still in the graph
        let snapshot = manager.current_snapshot(501).await;
        let id = PoolId::from(address_from_str("F1"));
        assert_eq!(snapshot.block(), 501);
        assert_eq!(snapshot.get_pool(id).unwrap().reserve0, U256::from(102));
    }

    #[tokio::test]
    async fn test_introspection() {
        let config = Config::test_config();
        let (manager, _rx) = seeded_manager(&config, Arc::new(NullTelemetry)).await;

        assert_eq!(manager.stats().await, (2, 2, 1));
        assert!(manager.has_pool(PoolId::from(address_from_str("F1"))).await);
        assert!(!manager.has_pool(PoolId::from(address_from_str("F2"))).await);
        assert_eq!(manager.tracked_pool_addresses().await.len(), 1);
        assert!(manager.validate().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_idle_timer() {
        let config = Config::test_config();
        let (manager, mut rx) = seeded_manager(&config, Arc::new(NullTelemetry)).await;

        manager.process_update(update("F1", 103, 197, 600)).await;
        manager.stop();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }
}

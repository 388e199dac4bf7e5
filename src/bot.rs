/// Wires the pipeline together: update intake -> graph manager ->
/// snapshot feed -> detector -> opportunity feed.
///
/// The ingest layer (RPC client, pool curator) stays outside; it gets the
/// update sender and the `add_pool` entry point, and reads opportunities
/// off the receiver this hands out.
use std::sync::Arc;

use eyre::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::arb::snapshot::Snapshot;
use crate::config::Config;
use crate::detect::Detector;
use crate::manager::{GraphManager, PoolAdded, ReserveUpdate};
use crate::sim::Opportunity;
use crate::telemetry::Telemetry;

const UPDATE_CHANNEL_SIZE: usize = 1000;

pub struct Bot {
    manager: Arc<GraphManager>,
    detector: Arc<Detector>,
    update_tx: mpsc::Sender<ReserveUpdate>,
    update_rx: Option<mpsc::Receiver<ReserveUpdate>>,
    snapshot_rx: Option<mpsc::Receiver<Snapshot>>,
    opportunity_rx: Option<mpsc::Receiver<Opportunity>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Bot {
    /// Build the pipeline without starting it.
    ///
    /// # Errors
    /// * If the configuration fails validation
    pub fn new(config: &Config, telemetry: Arc<dyn Telemetry>) -> Result<Self> {
        config.validate()?;

        let (manager, snapshot_rx) = GraphManager::new(config, telemetry.clone());
        let (detector, opportunity_rx) = Detector::new(config, telemetry);
        let (update_tx, update_rx) = mpsc::channel(UPDATE_CHANNEL_SIZE);

        Ok(Self {
            manager,
            detector,
            update_tx,
            update_rx: Some(update_rx),
            snapshot_rx: Some(snapshot_rx),
            opportunity_rx: Some(opportunity_rx),
            tasks: Vec::new(),
        })
    }

    /// Spawn the intake and detection loops. Idempotent only in the sense
    /// that the feeds can be taken once; call this once.
    pub fn start(&mut self) {
        if let Some(mut update_rx) = self.update_rx.take() {
            let manager = Arc::clone(&self.manager);
            self.tasks.push(tokio::spawn(async move {
                while let Some(update) = update_rx.recv().await {
                    manager.process_update(update).await;
                }
                log::info!("Update intake finished");
            }));
        }

        if let Some(snapshot_rx) = self.snapshot_rx.take() {
            let detector = Arc::clone(&self.detector);
            self.tasks.push(tokio::spawn(detector.run(snapshot_rx)));
        }
    }

    /// Where the ingest layer pushes decoded reserve updates.
    #[must_use]
    pub fn update_sender(&self) -> mpsc::Sender<ReserveUpdate> {
        self.update_tx.clone()
    }

    /// The opportunity feed. Yields once; the caller owns consumption.
    pub fn take_opportunities(&mut self) -> Option<mpsc::Receiver<Opportunity>> {
        self.opportunity_rx.take()
    }

    /// Start tracking a pool delivered by the curator.
    pub async fn add_pool(&self, added: PoolAdded) -> Result<()> {
        self.manager.process_pool_added(added).await
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<GraphManager> {
        &self.manager
    }

    #[must_use]
    pub fn detector(&self) -> &Arc<Detector> {
        &self.detector
    }

    /// Stop everything: no more timer flushes, workers cancel, loops end
    /// once their channels drain.
    pub async fn shutdown(mut self) {
        self.manager.stop();
        self.detector.stop();
        drop(self.update_tx);

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                log::error!("Pipeline task panicked: {e}");
            }
        }
        log::info!("Bot shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arb::pool::PoolId;
    use crate::arb::test_helpers::*;
    use crate::telemetry::NullTelemetry;
    use alloy::primitives::U256;

    fn test_config() -> Config {
        let mut config = Config::test_config();
        config.min_profit_factor = 1.0001;
        config.start_tokens = vec![token("A").id];
        config
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let mut config = test_config();
        config.start_tokens.clear();
        assert!(Bot::new(&config, Arc::new(NullTelemetry)).is_err());
    }

    #[tokio::test]
    async fn test_end_to_end_pipeline() {
        let config = test_config();
        let mut bot = Bot::new(&config, Arc::new(NullTelemetry)).unwrap();

        for label in ["F1", "F2"] {
            bot.add_pool(PoolAdded {
                pool: pool(label, "A", "B", 1_000_000_000, 1_000_000_000),
                token0: token("A"),
                token1: token("B"),
            })
            .await
            .unwrap();
        }
        assert_eq!(bot.manager().stats().await, (2, 4, 2));

        let mut opportunities = bot.take_opportunities().unwrap();
        bot.start();

        // Block 100 skews the two pools against each other; the first
        // block-101 update pushes the batch through the whole pipeline
        let updates = bot.update_sender();
        for (label, reserve1, block, log_index) in [
            ("F1", 3_000_000_000_u64, 100, 0),
            ("F2", 2_000_000_000, 100, 1),
            ("F1", 3_000_000_000, 101, 0),
        ] {
            updates
                .send(ReserveUpdate::new(
                    PoolId::from(address_from_str(label)),
                    U256::from(1_000_000_000_u64),
                    U256::from(reserve1),
                    block,
                    log_index,
                ))
                .await
                .unwrap();
        }

        let opportunity = opportunities.recv().await.unwrap();
        assert_eq!(opportunity.block, 100);
        assert_eq!(opportunity.pools.len(), 2);
        assert!(opportunity.profit_factor > 1.0001);
        assert!(opportunity.amount_out > opportunity.amount_in);

        drop(updates);
        bot.shutdown().await;
    }
}

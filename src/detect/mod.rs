/// The detector: one parallel negative-cycle scan per published snapshot.
///
/// Start tokens are resolved against the snapshot, workers pull start
/// indices from a shared cursor and search independently, candidate cycles
/// land in one deduplicating set, and the profitable ones go through the
/// simulator before an `Opportunity` leaves on the output channel.
pub mod bellman_ford;
pub mod spfa;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex, Notify};

use crate::arb::cycle::{Cycle, CycleSet};
use crate::arb::edge::Edge;
use crate::arb::snapshot::Snapshot;
use crate::arb::token::{TokenId, TokenIndex};
use crate::config::Config;
use crate::sim::{Opportunity, Simulator};
use crate::telemetry::Telemetry;

/// Which negative-cycle search runs. The rooted Bellman-Ford is the
/// production path; SPFA is an equivalent alternative, not a second pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, derive_more::Display)]
pub enum SearchKind {
    #[default]
    #[display("bellman-ford")]
    BellmanFord,
    #[display("spfa")]
    Spfa,
}

pub struct Detector {
    min_profit_factor: f64,
    max_path_length: usize,
    num_workers: usize,
    start_tokens: Vec<TokenId>,
    search_kind: SearchKind,
    simulator: Simulator,
    opportunity_tx: mpsc::Sender<Opportunity>,
    telemetry: Arc<dyn Telemetry>,
    cancelled: AtomicBool,
    shutdown: Notify,
}

impl Detector {
    /// Build a detector. The receiver is the opportunity feed downstream
    /// consumers read.
    #[must_use]
    pub fn new(
        config: &Config,
        telemetry: Arc<dyn Telemetry>,
    ) -> (Arc<Self>, mpsc::Receiver<Opportunity>) {
        Self::with_search(config, SearchKind::default(), telemetry)
    }

    #[must_use]
    pub fn with_search(
        config: &Config,
        search_kind: SearchKind,
        telemetry: Arc<dyn Telemetry>,
    ) -> (Arc<Self>, mpsc::Receiver<Opportunity>) {
        let (opportunity_tx, opportunity_rx) = mpsc::channel(config.opportunity_channel_capacity);
        log::debug!("Detector using {search_kind} search");

        let detector = Arc::new(Self {
            min_profit_factor: config.min_profit_factor,
            max_path_length: config.max_path_length,
            num_workers: config.num_workers,
            start_tokens: config.start_tokens.clone(),
            search_kind,
            simulator: Simulator::new(config.min_profit_factor),
            opportunity_tx,
            telemetry,
            cancelled: AtomicBool::new(false),
            shutdown: Notify::new(),
        });

        (detector, opportunity_rx)
    }

    /// Consume snapshots until the channel closes or `stop` is called.
    pub async fn run(self: Arc<Self>, mut snapshot_rx: mpsc::Receiver<Snapshot>) {
        loop {
            tokio::select! {
                maybe = snapshot_rx.recv() => {
                    let Some(snapshot) = maybe else { break };
                    if self.cancelled.load(Ordering::Relaxed) {
                        break;
                    }
                    self.process_snapshot(snapshot).await;
                }
                () = self.shutdown.notified() => break,
            }
        }
        log::info!("Detector loop finished");
    }

    /// Cooperative cancellation: the run loop wakes out of its select,
    /// workers notice between relaxation rounds and between simulated
    /// cycles.
    pub fn stop(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        self.shutdown.notify_one();
    }

    /// One full scan: resolve, search in parallel, simulate, emit.
    pub async fn process_snapshot(self: &Arc<Self>, snapshot: Snapshot) {
        let started = Instant::now();
        let snapshot = Arc::new(snapshot);

        let starts = self.resolve_start_tokens(&snapshot);
        if starts.is_empty() {
            return;
        }

        let starts = Arc::new(starts);
        let cursor = Arc::new(AtomicUsize::new(0));
        let cycle_set = Arc::new(Mutex::new(CycleSet::new()));

        let workers: Vec<_> = (0..self.num_workers.min(starts.len()))
            .map(|_| {
                let detector = Arc::clone(self);
                let snapshot = Arc::clone(&snapshot);
                let starts = Arc::clone(&starts);
                let cursor = Arc::clone(&cursor);
                let cycle_set = Arc::clone(&cycle_set);

                tokio::spawn(async move {
                    loop {
                        let next = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(&start) = starts.get(next) else {
                            break;
                        };
                        if detector.cancelled.load(Ordering::Relaxed) {
                            break;
                        }
                        detector.search_one(&snapshot, start, &cycle_set).await;
                    }
                })
            })
            .collect();
        join_all(workers).await;

        let (found, profitable) = {
            let set = cycle_set.lock().await;
            (set.count() as u64, set.profitable(self.min_profit_factor))
        };
        self.telemetry.cycles_found(found);

        for cycle in &profitable {
            if self.cancelled.load(Ordering::Relaxed) {
                break;
            }
            if let Some(opportunity) = self.simulate_cycle(cycle, &snapshot) {
                match self.opportunity_tx.try_send(opportunity) {
                    Ok(()) => self.telemetry.opportunity_emitted(),
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        self.telemetry.channel_dropped("opportunities");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        }

        self.telemetry.detection_completed(started.elapsed());
        log::debug!(
            "Scanned block {} in {:?}: {} cycles, {} profitable",
            snapshot.block(),
            started.elapsed(),
            found,
            profitable.len()
        );
    }

    /// Synchronous single-shot variant of `process_snapshot`: same logic,
    /// no worker pool, opportunities returned instead of emitted.
    #[must_use]
    pub fn detect_once(&self, snapshot: &Snapshot) -> Vec<Opportunity> {
        let starts = self.resolve_start_tokens(snapshot);

        let mut cycle_set = CycleSet::new();
        for start in starts {
            if let Some(cycle) = self.run_search(snapshot, start) {
                if cycle.is_profitable(self.min_profit_factor) {
                    cycle_set.add(cycle);
                }
            }
        }
        self.telemetry.cycles_found(cycle_set.count() as u64);

        cycle_set
            .profitable(self.min_profit_factor)
            .iter()
            .filter_map(|cycle| self.simulate_cycle(cycle, snapshot))
            .collect()
    }

    fn resolve_start_tokens(&self, snapshot: &Snapshot) -> Vec<TokenIndex> {
        let starts: Vec<TokenIndex> = self
            .start_tokens
            .iter()
            .filter_map(|&id| snapshot.token_index(id))
            .collect();

        if starts.is_empty() {
            log::warn!(
                "No start token resolves against snapshot at block {}",
                snapshot.block()
            );
        }
        starts
    }

    async fn search_one(
        &self,
        snapshot: &Snapshot,
        start: TokenIndex,
        cycle_set: &Mutex<CycleSet>,
    ) {
        let Some(cycle) = self.run_search(snapshot, start) else {
            return;
        };
        if cycle.is_profitable(self.min_profit_factor) {
            cycle_set.lock().await.add(cycle);
        }
    }

    /// Run the configured search from one start index and validate what
    /// comes back. A malformed reconstruction is dropped and counted.
    fn run_search(&self, snapshot: &Snapshot, start: TokenIndex) -> Option<Cycle> {
        let edges: Vec<Edge> = match self.search_kind {
            SearchKind::BellmanFord => {
                bellman_ford::find_cycle(snapshot, start, self.max_path_length, &self.cancelled)?
            }
            SearchKind::Spfa => {
                spfa::find_cycle(snapshot, start, self.max_path_length, &self.cancelled)?
            }
        };

        match Cycle::new(edges) {
            Ok(cycle) => Some(cycle),
            Err(e) => {
                log::debug!("Search returned an invalid cycle: {e}");
                self.telemetry.invariant_violation();
                None
            }
        }
    }

    /// Size and simulate one cycle. Fixed 1% sizing first; when slippage
    /// eats the edge at that size, the binary-search post-pass gets a
    /// chance to find a smaller input that still clears the threshold.
    fn simulate_cycle(&self, cycle: &Cycle, snapshot: &Snapshot) -> Option<Opportunity> {
        let simulation = self
            .simulator
            .simulate(cycle)
            .or_else(|| self.simulator.refine(cycle))?;

        let path = cycle
            .token_indices()
            .into_iter()
            .map(|index| snapshot.token(index).cloned())
            .collect::<Option<Vec<_>>>()?;

        #[allow(clippy::cast_possible_truncation)]
        let latency_ms = snapshot.created_at().elapsed().as_millis() as u64;

        Some(Opportunity {
            path,
            pools: cycle.edges.iter().map(|e| e.pool).collect(),
            amount_in: simulation.amount_in,
            amount_out: simulation.amount_out,
            profit: simulation.profit,
            profit_factor: simulation.profit_factor,
            block: snapshot.block(),
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arb::graph::TokenGraph;
    use crate::arb::pool::PoolId;
    use crate::arb::test_helpers::*;
    use crate::telemetry::{AtomicTelemetry, NullTelemetry};

    fn config_with_starts(labels: &[&str]) -> Config {
        let mut config = Config::test_config();
        config.min_profit_factor = 1.0001;
        config.start_tokens = labels
            .iter()
            .map(|label| token(label).id)
            .collect();
        config
    }

    /// The three-token scenario with realistic magnitudes: a ~1.1% edge
    /// around T0 -> T1 -> T2 -> T0.
    fn three_token_snapshot() -> Snapshot {
        let mut g = TokenGraph::new();
        g.add_token(token("A")).unwrap();
        g.add_token(token("B")).unwrap();
        g.add_token(token("C")).unwrap();
        g.add_pool(pool_u128("F1", "A", "B", 1_000_000_000_000_000_000, 3_000_000_000))
            .unwrap();
        g.add_pool(pool_u128(
            "F2",
            "B",
            "C",
            1_000_000_000,
            1_010_000_000_000_000_000_000,
        ))
        .unwrap();
        g.add_pool(pool_u128(
            "F3",
            "C",
            "A",
            3_000_000_000_000_000_000_000,
            1_010_000_000_000_000_000,
        ))
        .unwrap();
        g.snapshot(77)
    }

    #[test]
    fn test_detect_once_three_token_cycle() {
        let config = config_with_starts(&["A"]);
        let (detector, _rx) = Detector::new(&config, Arc::new(NullTelemetry));

        let opportunities = detector.detect_once(&three_token_snapshot());
        assert_eq!(opportunities.len(), 1);

        let opp = &opportunities[0];
        assert_eq!(opp.pools.len(), 3);
        assert_eq!(
            opp.pools,
            vec![
                PoolId::from(address_from_str("F1")),
                PoolId::from(address_from_str("F2")),
                PoolId::from(address_from_str("F3")),
            ]
        );
        assert_eq!(
            opp.path.iter().map(|t| t.symbol.clone()).collect::<Vec<_>>(),
            vec!["A", "B", "C"]
        );
        assert_eq!(opp.block, 77);
        assert!(opp.amount_out > opp.amount_in);
        assert!(opp.profit_factor >= 1.0001);
        assert_eq!(opp.profit, opp.amount_out - opp.amount_in);
    }

    #[test]
    fn test_detect_once_dedups_rotations_across_starts() {
        // Both start tokens sit on the same triangle; the set keeps one
        let config = config_with_starts(&["A", "B"]);
        let (detector, _rx) = Detector::new(&config, Arc::new(NullTelemetry));

        let opportunities = detector.detect_once(&three_token_snapshot());
        assert_eq!(opportunities.len(), 1);
    }

    #[test]
    fn test_detect_once_counts_only_profitable_cycles() {
        // A/B carries a fat edge. C/D closes at ~1.000043, above breakeven
        // so the search surfaces it, but below the 1.0001 threshold; it
        // must neither count nor emit, and nothing ever contests its slot
        // in the set.
        let config = config_with_starts(&["A", "C"]);
        let telemetry = Arc::new(AtomicTelemetry::new());
        let (detector, _rx) = Detector::new(&config, telemetry.clone());

        let snapshot = graph(&[
            ("F1", "A", "B", 1_000_000_000, 3_000_000_000),
            ("F2", "A", "B", 1_000_000_000, 2_000_000_000),
            ("F3", "C", "D", 1_000_000_000, 1_006_070_000),
            ("F4", "C", "D", 1_000_000_000, 1_000_000_000),
        ])
        .snapshot(5);

        let opportunities = detector.detect_once(&snapshot);
        assert_eq!(opportunities.len(), 1);
        assert_eq!(opportunities[0].pools.len(), 2);
        assert_eq!(telemetry.cycles_found.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_detect_once_quiet_market() {
        let config = config_with_starts(&["A"]);
        let (detector, _rx) = Detector::new(&config, Arc::new(NullTelemetry));

        let snapshot = graph(&[
            ("F1", "A", "B", 1_000_000_000, 2_000_000_000),
            ("F2", "B", "C", 2_000_000_000, 2_000_000_000),
        ])
        .snapshot(1);

        assert!(detector.detect_once(&snapshot).is_empty());
    }

    #[test]
    fn test_detect_once_unresolvable_start_tokens() {
        let config = config_with_starts(&["EE"]);
        let (detector, _rx) = Detector::new(&config, Arc::new(NullTelemetry));

        let snapshot = graph(&[("F1", "A", "B", 1_000, 2_000)]).snapshot(1);
        assert!(detector.detect_once(&snapshot).is_empty());
    }

    #[test]
    fn test_detect_once_spfa_agrees_on_profitability() {
        let config = config_with_starts(&["A"]);
        let (bf, _rx1) = Detector::new(&config, Arc::new(NullTelemetry));
        let (spfa, _rx2) =
            Detector::with_search(&config, SearchKind::Spfa, Arc::new(NullTelemetry));

        let snapshot = three_token_snapshot();
        let from_bf = bf.detect_once(&snapshot);
        let from_spfa = spfa.detect_once(&snapshot);

        assert_eq!(from_bf.len(), 1);
        assert_eq!(from_spfa.len(), 1);
        assert_eq!(from_bf[0].pools.len(), from_spfa[0].pools.len());
    }

    #[tokio::test]
    async fn test_process_snapshot_emits_on_channel() {
        let config = config_with_starts(&["A"]);
        let telemetry = Arc::new(AtomicTelemetry::new());
        let (detector, mut rx) = Detector::new(&config, telemetry.clone());

        // Two-pool skew deep enough to clear fixed 1% sizing
        let snapshot = graph(&[
            ("F1", "A", "B", 1_000_000_000, 3_000_000_000),
            ("F2", "A", "B", 1_000_000_000, 2_000_000_000),
        ])
        .snapshot(9);

        detector.process_snapshot(snapshot).await;

        let opp = rx.recv().await.unwrap();
        assert_eq!(opp.block, 9);
        assert_eq!(opp.pools.len(), 2);
        assert!(opp.profit_factor > 1.0001);
        assert_eq!(telemetry.opportunities_emitted.load(Ordering::Relaxed), 1);
        assert_eq!(telemetry.cycles_found.load(Ordering::Relaxed), 1);
        assert_eq!(telemetry.detections_completed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_stopped_detector_emits_nothing() {
        let config = config_with_starts(&["A"]);
        let (detector, mut rx) = Detector::new(&config, Arc::new(NullTelemetry));
        detector.stop();

        let snapshot = graph(&[
            ("F1", "A", "B", 1_000_000_000, 3_000_000_000),
            ("F2", "A", "B", 1_000_000_000, 2_000_000_000),
        ])
        .snapshot(9);

        detector.process_snapshot(snapshot).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_consumes_snapshot_feed() {
        let config = config_with_starts(&["A"]);
        let (detector, mut opp_rx) = Detector::new(&config, Arc::new(NullTelemetry));
        let (snap_tx, snap_rx) = mpsc::channel(4);

        let handle = tokio::spawn(Arc::clone(&detector).run(snap_rx));

        let snapshot = graph(&[
            ("F1", "A", "B", 1_000_000_000, 3_000_000_000),
            ("F2", "A", "B", 1_000_000_000, 2_000_000_000),
        ])
        .snapshot(11);
        snap_tx.send(snapshot).await.unwrap();

        let opp = opp_rx.recv().await.unwrap();
        assert_eq!(opp.block, 11);

        drop(snap_tx);
        handle.await.unwrap();
    }
}

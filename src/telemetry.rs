/// Counters the pipeline reports into.
///
/// The core takes this as an injected collaborator instead of reaching for
/// a process-wide metrics handle; tests and embedders pick what the numbers
/// feed. Every hook has a no-op default, so implementors only override what
/// they watch.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub trait Telemetry: Send + Sync {
    /// A reserve update entered the manager.
    fn update_received(&self) {}

    /// An update referenced a pool we do not track.
    fn update_missed(&self) {}

    /// A snapshot was built; how long the build took.
    fn snapshot_built(&self, _latency: Duration) {}

    /// A full snapshot scan finished; how long it took.
    fn detection_completed(&self, _latency: Duration) {}

    /// Validated cycles found in one snapshot scan.
    fn cycles_found(&self, _count: u64) {}

    /// A profitable opportunity went out the door.
    fn opportunity_emitted(&self) {}

    /// A bounded channel was full and one item was dropped.
    fn channel_dropped(&self, _channel: &'static str) {}

    /// A should-be-impossible state was observed and skipped.
    fn invariant_violation(&self) {}
}

/// The default collaborator: counts nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {}

/// Plain atomic counters, cheap enough to leave on in production.
#[derive(Debug, Default)]
pub struct AtomicTelemetry {
    pub updates_received: AtomicU64,
    pub updates_missed: AtomicU64,
    pub snapshots_built: AtomicU64,
    pub snapshot_build_micros: AtomicU64,
    pub detections_completed: AtomicU64,
    pub detection_micros: AtomicU64,
    pub cycles_found: AtomicU64,
    pub opportunities_emitted: AtomicU64,
    pub channel_drops: AtomicU64,
    pub invariant_violations: AtomicU64,
}

impl AtomicTelemetry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Telemetry for AtomicTelemetry {
    fn update_received(&self) {
        self.updates_received.fetch_add(1, Ordering::Relaxed);
    }

    fn update_missed(&self) {
        self.updates_missed.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot_built(&self, latency: Duration) {
        self.snapshots_built.fetch_add(1, Ordering::Relaxed);
        #[allow(clippy::cast_possible_truncation)]
        self.snapshot_build_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    fn detection_completed(&self, latency: Duration) {
        self.detections_completed.fetch_add(1, Ordering::Relaxed);
        #[allow(clippy::cast_possible_truncation)]
        self.detection_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    fn cycles_found(&self, count: u64) {
        self.cycles_found.fetch_add(count, Ordering::Relaxed);
    }

    fn opportunity_emitted(&self) {
        self.opportunities_emitted.fetch_add(1, Ordering::Relaxed);
    }

    fn channel_dropped(&self, channel: &'static str) {
        log::warn!("channel {channel} full, dropping one item");
        self.channel_drops.fetch_add(1, Ordering::Relaxed);
    }

    fn invariant_violation(&self) {
        self.invariant_violations.fetch_add(1, Ordering::Relaxed);
    }
}

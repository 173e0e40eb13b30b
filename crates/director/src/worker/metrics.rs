use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::recover_poisoned;
use crate::classifier::Tier;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub active: usize,
    pub near: usize,
    pub far: usize,
    pub frozen: usize,
}

impl TierCounts {
    pub fn record(&mut self, tier: Tier) {
        match tier {
            Tier::Active => self.active += 1,
            Tier::NearMovable => self.near += 1,
            Tier::FarMovable => self.far += 1,
            Tier::Frozen => self.frozen += 1,
        }
    }

    pub fn background(&self) -> usize {
        self.near + self.far + self.frozen
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WorkerMetricsSnapshot {
    pub ticks: u64,
    pub ticks_per_second: f32,
    pub tiers: TierCounts,
    pub promoted_total: u64,
    pub waypoint_requests_total: u64,
    pub last_tick_ms: f32,
}

#[derive(Clone, Debug)]
pub struct WorkerMetricsHandle {
    snapshot: Arc<RwLock<WorkerMetricsSnapshot>>,
}

impl Default for WorkerMetricsHandle {
    fn default() -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(WorkerMetricsSnapshot::default())),
        }
    }
}

impl WorkerMetricsHandle {
    pub fn snapshot(&self) -> WorkerMetricsSnapshot {
        *recover_poisoned(self.snapshot.read(), "worker_metrics")
    }

    pub(crate) fn publish(&self, snapshot: WorkerMetricsSnapshot) {
        *recover_poisoned(self.snapshot.write(), "worker_metrics") = snapshot;
    }
}

/// Running totals on the worker thread; emits a snapshot once per interval.
#[derive(Debug)]
pub(crate) struct WorkerMetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    interval_ticks: u32,
    current: WorkerMetricsSnapshot,
}

impl WorkerMetricsAccumulator {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval_start: Instant::now(),
            interval,
            interval_ticks: 0,
            current: WorkerMetricsSnapshot::default(),
        }
    }

    pub(crate) fn record_tick(
        &mut self,
        tiers: TierCounts,
        promoted: usize,
        waypoint_requests: usize,
        tick_time: Duration,
    ) {
        self.interval_ticks = self.interval_ticks.saturating_add(1);
        self.current.ticks = self.current.ticks.saturating_add(1);
        self.current.tiers = tiers;
        self.current.promoted_total = self.current.promoted_total.saturating_add(promoted as u64);
        self.current.waypoint_requests_total = self
            .current
            .waypoint_requests_total
            .saturating_add(waypoint_requests as u64);
        self.current.last_tick_ms = tick_time.as_secs_f32() * 1000.0;
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<WorkerMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        self.current.ticks_per_second = self.interval_ticks as f32 / elapsed_seconds;
        self.interval_start = now;
        self.interval_ticks = 0;
        Some(self.current)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::RwLock;
    use std::thread;

    use super::*;

    fn poison_lock(lock: &RwLock<WorkerMetricsSnapshot>) {
        thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _guard = lock.write().expect("write guard");
                    panic!("poison metrics lock");
                })
                .join();
        });
    }

    fn counts(near: usize, far: usize) -> TierCounts {
        TierCounts {
            near,
            far,
            ..TierCounts::default()
        }
    }

    #[test]
    fn snapshot_reports_rate_and_totals() {
        let mut accumulator = WorkerMetricsAccumulator::new(Duration::from_secs(1));
        let base = Instant::now();

        for _ in 0..4 {
            accumulator.record_tick(counts(3, 2), 1, 2, Duration::from_millis(2));
        }

        let snapshot = accumulator
            .maybe_snapshot(base + Duration::from_secs(1))
            .expect("snapshot should be emitted");

        assert_eq!(snapshot.ticks, 4);
        assert!((snapshot.ticks_per_second - 4.0).abs() < 0.05);
        assert_eq!(snapshot.tiers.background(), 5);
        assert_eq!(snapshot.promoted_total, 4);
        assert_eq!(snapshot.waypoint_requests_total, 8);
        assert!((snapshot.last_tick_ms - 2.0).abs() < 0.001);
    }

    #[test]
    fn snapshot_not_emitted_before_interval() {
        let mut accumulator = WorkerMetricsAccumulator::new(Duration::from_secs(1));
        let base = Instant::now();
        accumulator.record_tick(counts(1, 0), 0, 0, Duration::from_millis(1));

        assert!(accumulator
            .maybe_snapshot(base + Duration::from_millis(500))
            .is_none());
    }

    #[test]
    fn snapshot_recovers_after_poison_without_panic() {
        let handle = WorkerMetricsHandle::default();
        poison_lock(handle.snapshot.as_ref());

        assert_eq!(handle.snapshot(), WorkerMetricsSnapshot::default());
    }

    #[test]
    fn publish_recovers_after_poison_without_panic() {
        let handle = WorkerMetricsHandle::default();
        poison_lock(handle.snapshot.as_ref());

        let expected = WorkerMetricsSnapshot {
            ticks: 9,
            ticks_per_second: 90.0,
            tiers: counts(4, 4),
            ..WorkerMetricsSnapshot::default()
        };
        handle.publish(expected);

        assert_eq!(handle.snapshot(), expected);
    }
}

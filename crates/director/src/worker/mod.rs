mod exchange;
mod gate;
mod metrics;
mod working_set;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LockResult};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{LayerRadii, WorkerConfig};

pub use exchange::{ExchangeProtocol, MainExchange, PoolSnapshot, WorkerIntake};
pub use gate::PauseGate;
pub use metrics::{TierCounts, WorkerMetricsHandle, WorkerMetricsSnapshot};
pub use working_set::{TickOutput, WorkingSet};

use gate::ExitGuard;
use metrics::WorkerMetricsAccumulator;

pub const WORKER_THREAD_NAME: &str = "director-worker";

/// Largest wall-clock step fed to movement; longer gaps (pauses, stalls) are clamped.
const MAX_TICK_DT: Duration = Duration::from_millis(250);
const METRICS_INTERVAL: Duration = Duration::from_secs(1);

static LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

pub(crate) fn recover_poisoned<G>(result: LockResult<G>, lock: &'static str) -> G {
    match result {
        Ok(guard) => guard,
        Err(poisoned) => {
            if LOCK_POISON_WARNED
                .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                warn!(lock, "lock poisoned; recovered inner value");
            }
            poisoned.into_inner()
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn director-worker thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Default)]
struct WorkerShared {
    exchange: ExchangeProtocol,
    gate: PauseGate,
    metrics: WorkerMetricsHandle,
}

/// The background simulation thread and the handles the owning thread uses to
/// talk to it.
#[derive(Debug)]
pub struct BackgroundWorker {
    shared: Arc<WorkerShared>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
    pub fn start(layers: LayerRadii, config: &WorkerConfig) -> Result<Self, WorkerError> {
        let shared = Arc::new(WorkerShared::default());
        let working_set = WorkingSet::new(layers, config);
        let worker_shared = Arc::clone(&shared);
        let config = config.clone();
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run(&worker_shared, working_set, &config))
            .map_err(|source| WorkerError::Spawn { source })?;

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    pub fn exchange(&self) -> &ExchangeProtocol {
        &self.shared.exchange
    }

    pub fn gate(&self) -> &PauseGate {
        &self.shared.gate
    }

    pub fn metrics(&self) -> WorkerMetricsHandle {
        self.shared.metrics.clone()
    }

    /// Blocks until the worker parks. `false` when it is no longer running.
    pub fn pause(&self) -> bool {
        self.shared.gate.pause()
    }

    pub fn request_pause(&self) {
        self.shared.gate.request_pause();
    }

    pub fn resume(&self) {
        self.shared.gate.resume();
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some() && !self.shared.gate.is_killed()
    }

    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.shared.gate.kill();
        if handle.join().is_err() {
            warn!("worker_panicked");
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: &WorkerShared, mut working_set: WorkingSet, config: &WorkerConfig) {
    let _exit = ExitGuard(&shared.gate);
    info!(
        near_batch = config.near_batch,
        far_batch = config.far_batch,
        skip_ticks = config.skip_ticks,
        "worker_started"
    );
    if !shared.gate.sleep(config.startup_delay()) {
        info!("worker_stopped");
        return;
    }

    let mut accumulator = WorkerMetricsAccumulator::new(METRICS_INTERVAL);
    let mut last_tick = Instant::now();
    loop {
        if !shared.gate.checkpoint() {
            break;
        }

        let now = Instant::now();
        let dt = now.saturating_duration_since(last_tick).min(MAX_TICK_DT);
        last_tick = now;

        let intake = shared.exchange.worker_intake();
        let output = working_set.tick(dt, intake);
        let promoted = output.promotions.len();
        let requested = output.waypoint_requests.len();
        let tiers = output.tiers;
        shared.exchange.worker_publish(
            output.background,
            output.promotions,
            output.waypoint_requests,
        );

        accumulator.record_tick(tiers, promoted, requested, now.elapsed());
        if let Some(snapshot) = accumulator.maybe_snapshot(Instant::now()) {
            debug!(
                ticks_per_second = snapshot.ticks_per_second,
                near = tiers.near,
                far = tiers.far,
                frozen = tiers.frozen,
                "worker_metrics"
            );
            shared.metrics.publish(snapshot);
        }

        if !shared.gate.sleep(config.sleep_interval()) {
            break;
        }
    }
    info!("worker_stopped");
}

use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use director::TickReport;
use tracing::{error, info, warn};

use super::bootstrap::{AppWiring, SandboxDirector};
use super::scenario::RunSpec;
use super::SandboxError;

const MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TickPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_ticks(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> TickPlan {
    let mut ticks_to_run = 0u32;
    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        TickPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        TickPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

/// Sums of every director tick over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunTotals {
    pub(crate) ticks: u32,
    pub(crate) demoted: usize,
    pub(crate) promoted: usize,
    pub(crate) waypoints_resolved: usize,
    pub(crate) waypoints_deferred: usize,
    pub(crate) peak_background: usize,
}

impl RunTotals {
    fn absorb(&mut self, report: TickReport, background: usize) {
        self.ticks = self.ticks.saturating_add(1);
        self.demoted += report.demoted;
        self.promoted += report.promoted;
        self.waypoints_resolved += report.waypoints_resolved;
        self.waypoints_deferred += report.waypoints_deferred;
        self.peak_background = self.peak_background.max(background);
    }
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring { mut director, run } = app;
    let result = run_ticks(&mut director, &run);
    director.shutdown();

    match result {
        Ok(totals) => {
            let metrics = director.worker_metrics();
            let stats = director.actors().stats();
            info!(
                ticks = totals.ticks,
                demoted = totals.demoted,
                promoted = totals.promoted,
                waypoints_resolved = totals.waypoints_resolved,
                waypoints_deferred = totals.waypoints_deferred,
                peak_background = totals.peak_background,
                worker_ticks = metrics.ticks,
                spawned = stats.spawned,
                destroyed = stats.destroyed,
                demoted_notices = stats.demoted,
                restored_notices = stats.restored,
                visible_instances = stats.visible_instances,
                live = director.actors().live_count(),
                "sandbox_finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "sandbox_failed");
            ExitCode::FAILURE
        }
    }
}

pub(crate) fn run_ticks(
    director: &mut SandboxDirector,
    run: &RunSpec,
) -> Result<RunTotals, SandboxError> {
    let fixed_dt = director.config().update_interval();
    let max_ticks_per_frame = run.max_ticks_per_frame.max(1);
    let mut totals = RunTotals::default();
    let mut accumulator = Duration::ZERO;
    let mut last_frame = Instant::now();
    info!(
        ticks = run.ticks,
        fixed_dt_ms = fixed_dt.as_millis() as u64,
        real_time = run.real_time,
        "sandbox_loop_started"
    );

    while totals.ticks < run.ticks {
        let frame_dt = if run.real_time {
            let now = Instant::now();
            let raw = now.saturating_duration_since(last_frame);
            last_frame = now;
            clamp_frame_delta(raw, MAX_FRAME_DELTA)
        } else {
            fixed_dt
        };
        accumulator = accumulator.saturating_add(frame_dt);

        let plan = plan_ticks(accumulator, fixed_dt, max_ticks_per_frame);
        accumulator = plan.remaining_accumulator;
        if !plan.dropped_backlog.is_zero() {
            warn!(
                dropped_ms = plan.dropped_backlog.as_millis() as u64,
                "tick_backlog_dropped"
            );
        }

        for _ in 0..plan.ticks_to_run {
            if totals.ticks >= run.ticks {
                break;
            }
            director
                .actors_mut()
                .advance_observers(fixed_dt.as_secs_f32());
            let report = director.tick();
            totals.absorb(report, director.background().len());

            if run.save_at_tick == Some(totals.ticks) {
                checkpoint(director, run)?;
            }
        }

        if run.real_time {
            let spent = last_frame.elapsed();
            thread::sleep(fixed_dt.saturating_sub(spent));
        }
    }
    Ok(totals)
}

/// Saves the pool and, when asked, loads it straight back.
fn checkpoint(director: &mut SandboxDirector, run: &RunSpec) -> Result<(), SandboxError> {
    let path = director.try_save(&run.save_slot, run.save_index)?;
    info!(
        path = %path.display(),
        background = director.background_entity_count(),
        "sandbox_checkpoint_saved"
    );
    if run.reload_after_save {
        let restored = director.try_load(&run.save_slot, run.save_index)?;
        info!(restored, "sandbox_checkpoint_loaded");
    }
    Ok(())
}

use std::time::Duration;

use crate::telemetry;
use crate::telemetry::tags;

/// Telemetry contract for pool and worker runtimes.
///
/// The pool calls these hooks at every lifecycle transition so metrics can be
/// collected without the pool depending on a specific backend. Hooks run on the
/// thread that caused the transition and must not block.
pub trait PoolTelemetry: Send + Sync {
    fn on_worker_spawned(&self, worker_id: usize);
    fn on_worker_exited(&self, worker_id: usize);
    fn on_task_started(&self, worker_id: usize);
    fn on_task_finished(&self, worker_id: usize, elapsed: Duration);
    fn on_task_panicked(&self, worker_id: usize, elapsed: Duration);
    fn on_submit_blocked(&self, running: usize);
    fn on_workers_reaped(&self, count: usize);
}

/// Default telemetry implementation that feeds the in-process registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPoolTelemetry;

impl PoolTelemetry for DefaultPoolTelemetry {
    fn on_worker_spawned(&self, worker_id: usize) {
        telemetry::count(tags::METRIC_WORKER_SPAWN_COUNT, 1);
        telemetry::step_level(tags::METRIC_WORKER_LIVE_COUNT, true);
        tracing::trace!(target: tags::TARGET_WORKER, worker_id, op = "spawn", "worker spawned");
    }

    fn on_worker_exited(&self, worker_id: usize) {
        telemetry::count(tags::METRIC_WORKER_EXIT_COUNT, 1);
        telemetry::step_level(tags::METRIC_WORKER_LIVE_COUNT, false);
        tracing::trace!(target: tags::TARGET_WORKER, worker_id, op = "exit", "worker exited");
    }

    fn on_task_started(&self, worker_id: usize) {
        telemetry::count(tags::METRIC_TASK_START_COUNT, 1);
        tracing::trace!(target: tags::TARGET_WORKER, worker_id, op = "task_start", "task started");
    }

    fn on_task_finished(&self, worker_id: usize, elapsed: Duration) {
        let elapsed_us = telemetry::duration_us(elapsed);
        telemetry::count(tags::METRIC_TASK_FINISH_COUNT, 1);
        telemetry::observe_task_latency(elapsed_us);
        tracing::trace!(
            target: tags::TARGET_WORKER,
            worker_id,
            op = "task_finish",
            result = "ok",
            elapsed_us,
            "task finished"
        );
    }

    fn on_task_panicked(&self, worker_id: usize, elapsed: Duration) {
        let elapsed_us = telemetry::duration_us(elapsed);
        telemetry::count(tags::METRIC_TASK_PANIC_COUNT, 1);
        telemetry::observe_task_latency(elapsed_us);
        tracing::trace!(
            target: tags::TARGET_WORKER,
            worker_id,
            op = "task_finish",
            result = "panic",
            elapsed_us,
            "task panicked"
        );
    }

    fn on_submit_blocked(&self, running: usize) {
        telemetry::count(tags::METRIC_POOL_SUBMIT_BLOCKED_COUNT, 1);
        telemetry::set_level(tags::METRIC_POOL_RUNNING, running as u64);
    }

    fn on_workers_reaped(&self, count: usize) {
        telemetry::count(tags::METRIC_WORKER_REAPED_COUNT, count as u64);
    }
}

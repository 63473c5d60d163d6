/// Log target for pool-level events (acquisition, release, restart).
pub const TARGET_POOL: &str = "corral.pool";
/// Log target for worker thread lifecycle and task faults.
pub const TARGET_WORKER: &str = "corral.worker";
/// Log target for the idle-worker reaper.
pub const TARGET_REAPER: &str = "corral.reaper";
/// Log target for the worker slot cache.
pub const TARGET_CACHE: &str = "corral.cache";

pub const METRIC_POOL_SUBMIT_BLOCKED_COUNT: &str = "corral.pool.submit.blocked.count";
pub const METRIC_POOL_RUNNING: &str = "corral.pool.running";

pub const METRIC_WORKER_SPAWN_COUNT: &str = "corral.worker.spawn.count";
pub const METRIC_WORKER_EXIT_COUNT: &str = "corral.worker.exit.count";
pub const METRIC_WORKER_REAPED_COUNT: &str = "corral.worker.reaped.count";
pub const METRIC_WORKER_LIVE_COUNT: &str = "corral.worker.live.count";

pub const METRIC_TASK_START_COUNT: &str = "corral.task.start.count";
pub const METRIC_TASK_FINISH_COUNT: &str = "corral.task.finish.count";
pub const METRIC_TASK_PANIC_COUNT: &str = "corral.task.panic.count";
pub const METRIC_TASK_LATENCY_US: &str = "corral.task.latency_us";

pub const METRIC_CACHE_ACQUIRE_CREATED_COUNT: &str = "corral.cache.acquire.created.count";
pub const METRIC_CACHE_ACQUIRE_RECYCLED_COUNT: &str = "corral.cache.acquire.recycled.count";
pub const METRIC_CACHE_RECYCLE_OK_COUNT: &str = "corral.cache.recycle.ok.count";
pub const METRIC_CACHE_RECYCLE_DROPPED_COUNT: &str = "corral.cache.recycle.dropped.count";

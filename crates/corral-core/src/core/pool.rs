use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::cache::{CacheMetricsSnapshot, ObjectCache};
use crate::config::PoolConfig;
use crate::core::reaper::Reaper;
use crate::core::worker::{self, HandOff, IdleWorker, Worker};
use crate::error::CorralError;
use crate::telemetry::tags;
use crate::telemetry::{DefaultPoolTelemetry, PoolTelemetry};
use crate::types::{Message, PanicHandler, PoolStats, Result, TaskPanic};

/// Bounded pool of worker threads.
///
/// At most `capacity` workers hold a task at any time. Finished workers park in
/// an idle registry and are reused last-in first-out; a background reaper
/// stops workers that stay idle longer than the configured expiration. When
/// every worker is busy, [`Pool::submit`] blocks until one frees up.
///
/// Dropping the pool releases it.
pub struct Pool {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    capacity: usize,
    expiration: Duration,
    thread_name: String,
    running: AtomicUsize,
    next_worker_id: AtomicUsize,
    state: Mutex<State>,
    worker_available: Condvar,
    panic_handler: RwLock<Option<PanicHandler>>,
    pub(crate) cache: ObjectCache<HandOff>,
    pub(crate) telemetry: Arc<dyn PoolTelemetry>,
}

struct State {
    // Ordered by the time each worker went idle, oldest first.
    idle: VecDeque<IdleWorker>,
    closed: bool,
    reaper: Option<Reaper>,
}

impl Pool {
    /// Creates a pool with the default worker expiration.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::from_config(&PoolConfig::new(capacity))
    }

    /// Creates a pool whose idle workers are reclaimed after `expiration`.
    pub fn with_expiration(capacity: usize, expiration: Duration) -> Result<Self> {
        Self::from_config(&PoolConfig::new(capacity).with_expiration(expiration))
    }

    /// Creates a pool using the default telemetry implementation.
    pub fn from_config(config: &PoolConfig) -> Result<Self> {
        Self::with_telemetry(config, Arc::new(DefaultPoolTelemetry))
    }

    /// Creates a pool with a custom telemetry backend.
    pub fn with_telemetry(config: &PoolConfig, telemetry: Arc<dyn PoolTelemetry>) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            capacity: config.capacity,
            expiration: config.expiration,
            thread_name: config.thread_name.clone(),
            running: AtomicUsize::new(0),
            next_worker_id: AtomicUsize::new(0),
            state: Mutex::new(State {
                idle: VecDeque::new(),
                closed: false,
                reaper: None,
            }),
            worker_available: Condvar::new(),
            panic_handler: RwLock::new(None),
            cache: ObjectCache::new(config.effective_cache_size()),
            telemetry,
        });

        let reaper = Reaper::spawn(
            Arc::downgrade(&shared),
            config.expiration,
            &config.thread_name,
        )
        .map_err(|error| CorralError::from(error).with_context("starting reaper"))?;
        shared.lock_state().reaper = Some(reaper);

        tracing::debug!(
            target: tags::TARGET_POOL,
            capacity = config.capacity,
            expiration = ?config.expiration,
            "pool created"
        );

        Ok(Self { shared })
    }

    /// Hands `task` to a worker and returns without waiting for it to run.
    ///
    /// Blocks while the pool is saturated. Fails with
    /// [`CorralError::PoolClosed`] once the pool has been released.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let worker = self.shared.acquire_worker()?;
        let worker_id = worker.id();
        worker.dispatch(Box::new(task)).map_err(|error| {
            tracing::warn!(target: tags::TARGET_POOL, worker_id, "worker vanished before dispatch");
            self.shared.give_back_slot();
            error
        })
    }

    /// Registers the callback run on the worker thread when a task panics.
    ///
    /// Without a handler, panics are logged at error level.
    pub fn set_panic_handler<F>(&self, handler: F)
    where
        F: Fn(&TaskPanic) + Send + Sync + 'static,
    {
        let mut slot = match self.shared.panic_handler.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(Arc::new(handler));
    }

    /// Closes the pool.
    ///
    /// Idle workers are told to exit, blocked submitters wake up with
    /// [`CorralError::PoolClosed`] and the reaper stops. Workers in the middle
    /// of a task finish it and then exit. Returns `true` only for the call that
    /// actually closed the pool.
    pub fn release(&self) -> bool {
        let (terminated, reaper) = {
            let mut state = self.shared.lock_state();
            if state.closed {
                return false;
            }
            state.closed = true;
            let terminated = state
                .idle
                .drain(..)
                .map(IdleWorker::terminate)
                .filter(|sent| *sent)
                .count();
            self.shared.worker_available.notify_all();
            (terminated, state.reaper.take())
        };

        let discarded = self.shared.cache.clear();
        if let Some(reaper) = reaper {
            reaper.stop();
        }

        tracing::debug!(
            target: tags::TARGET_POOL,
            terminated,
            discarded,
            running = self.running(),
            "pool released"
        );
        true
    }

    /// Reopens a released pool. A pool that is still open is left untouched.
    ///
    /// Returns `false` if the reaper could not be restarted, in which case the
    /// pool stays closed.
    pub fn restart(&self) -> bool {
        let mut state = self.shared.lock_state();
        if !state.closed {
            return true;
        }

        match Reaper::spawn(
            Arc::downgrade(&self.shared),
            self.shared.expiration,
            self.shared.thread_name(),
        ) {
            Ok(reaper) => {
                state.reaper = Some(reaper);
                state.closed = false;
                tracing::debug!(target: tags::TARGET_POOL, "pool restarted");
                true
            }
            Err(error) => {
                tracing::warn!(target: tags::TARGET_REAPER, %error, "failed to restart reaper");
                false
            }
        }
    }

    /// Runs one eviction pass immediately and returns the number of workers stopped.
    pub fn purge_expired(&self) -> usize {
        self.shared.expire_workers()
    }

    /// Workers currently holding a task.
    pub fn running(&self) -> usize {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Remaining capacity.
    pub fn free(&self) -> usize {
        self.shared.capacity.saturating_sub(self.running())
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn expiration(&self) -> Duration {
        self.shared.expiration
    }

    /// Workers parked in the idle registry.
    pub fn idle(&self) -> usize {
        self.shared.lock_state().idle.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// How often new workers were built with a fresh hand-off slot versus a
    /// recycled one.
    pub fn cache_metrics(&self) -> CacheMetricsSnapshot {
        self.shared.cache.metrics()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock_state();
        let running = self.running();
        PoolStats {
            capacity: self.shared.capacity,
            running,
            idle: state.idle.len(),
            free: self.shared.capacity.saturating_sub(running),
            closed: state.closed,
            cached_slots: self.shared.cache.len(),
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("Pool")
            .field("capacity", &stats.capacity)
            .field("running", &stats.running)
            .field("idle", &stats.idle)
            .field("closed", &stats.closed)
            .field("expiration", &self.shared.expiration)
            .finish()
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn thread_name(&self) -> &str {
        &self.thread_name
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    pub(crate) fn panic_handler(&self) -> Option<PanicHandler> {
        match self.panic_handler.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns a worker ready for one task, reusing the most recently idled
    /// worker first and spawning a new one while below capacity. Waits while
    /// the pool is saturated.
    ///
    /// `running` is incremented under the lock on every successful path.
    fn acquire_worker(self: &Arc<Self>) -> Result<Worker> {
        let mut state = self.lock_state();
        let mut blocked = false;

        loop {
            if state.closed {
                return Err(CorralError::PoolClosed);
            }

            if let Some(idle) = state.idle.pop_back() {
                self.running.fetch_add(1, Ordering::AcqRel);
                return Ok(idle.into_worker());
            }

            let running = self.running.load(Ordering::Acquire);
            if running < self.capacity {
                self.running.fetch_add(1, Ordering::AcqRel);
                drop(state);
                return self.spawn_worker();
            }

            if !blocked {
                blocked = true;
                self.telemetry.on_submit_blocked(running);
                tracing::debug!(
                    target: tags::TARGET_POOL,
                    running,
                    capacity = self.capacity,
                    "pool saturated, waiting for an idle worker"
                );
            }

            state = match self.worker_available.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    fn spawn_worker(self: &Arc<Self>) -> Result<Worker> {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        worker::spawn(Arc::clone(self), id).map_err(|error| {
            tracing::warn!(target: tags::TARGET_POOL, worker_id = id, %error, "failed to spawn worker");
            self.give_back_slot();
            error
        })
    }

    /// Undoes an acquisition whose worker never received its task.
    fn give_back_slot(&self) {
        let _state = self.lock_state();
        self.running.fetch_sub(1, Ordering::AcqRel);
        self.worker_available.notify_one();
    }

    /// Called by a worker after finishing a task. Parks the worker in the idle
    /// registry and wakes one waiting submitter. Returns `false` when the pool
    /// is closed and the worker should exit instead.
    pub(crate) fn return_worker(&self, id: usize, sender: &Sender<Message>) -> bool {
        let mut state = self.lock_state();
        self.running.fetch_sub(1, Ordering::AcqRel);
        self.worker_available.notify_one();
        if state.closed {
            return false;
        }

        state
            .idle
            .push_back(IdleWorker::new(id, sender.clone(), Instant::now()));
        true
    }

    /// Stops every idle worker whose idle time exceeds the expiration.
    ///
    /// The registry is sorted by idle time, so the scan stops at the first
    /// worker that is still fresh.
    pub(crate) fn expire_workers(&self) -> usize {
        let now = Instant::now();
        let mut reaped = 0;
        {
            let mut state = self.lock_state();
            while state
                .idle
                .front()
                .is_some_and(|worker| worker.idle_for(now) > self.expiration)
            {
                if let Some(worker) = state.idle.pop_front() {
                    worker.terminate();
                    reaped += 1;
                }
            }
        }

        if reaped > 0 {
            self.telemetry.on_workers_reaped(reaped);
            tracing::debug!(target: tags::TARGET_REAPER, reaped, "expired idle workers");
        }
        reaped
    }
}

//! Pool metrics.
//!
//! With the `telemetry` feature enabled, the hooks in [`DefaultPoolTelemetry`]
//! and the worker slot cache feed a process-wide registry keyed by the names
//! in [`tags`]. Without the feature every recording call compiles to nothing
//! and [`snapshot`] returns an empty [`PoolMetrics`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod pool;
pub mod tags;

pub use pool::{DefaultPoolTelemetry, PoolTelemetry};

/// Task run times observed by workers, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLatency {
    pub samples: u64,
    pub total_us: u64,
    pub min_us: u64,
    pub max_us: u64,
}

impl TaskLatency {
    pub fn mean_us(&self) -> u64 {
        self.total_us.checked_div(self.samples).unwrap_or(0)
    }

    #[cfg_attr(not(feature = "telemetry"), allow(dead_code))]
    fn observe(&mut self, elapsed_us: u64) {
        self.min_us = if self.samples == 0 {
            elapsed_us
        } else {
            self.min_us.min(elapsed_us)
        };
        self.max_us = self.max_us.max(elapsed_us);
        self.samples = self.samples.saturating_add(1);
        self.total_us = self.total_us.saturating_add(elapsed_us);
    }
}

/// Point-in-time copy of the pool metrics registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMetrics {
    /// Monotonic event counts (spawns, exits, reaps, cache hits...).
    pub counters: BTreeMap<String, u64>,
    /// Last observed levels (live workers, running workers at saturation).
    pub levels: BTreeMap<String, u64>,
    pub task_latency: TaskLatency,
}

impl PoolMetrics {
    pub fn count(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn level(&self, name: &str) -> u64 {
        self.levels.get(name).copied().unwrap_or(0)
    }
}

/// Converts a duration to whole microseconds, clamped to `u64::MAX`.
#[inline]
pub fn duration_us(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

#[inline]
pub(crate) fn count(name: &'static str, by: u64) {
    #[cfg(feature = "telemetry")]
    registry::update(|store| {
        let counter = store.counters.entry(name).or_insert(0);
        *counter = counter.saturating_add(by);
    });
    #[cfg(not(feature = "telemetry"))]
    let _ = (name, by);
}

/// Sets a level to `value`.
#[inline]
pub(crate) fn set_level(name: &'static str, value: u64) {
    #[cfg(feature = "telemetry")]
    registry::update(|store| {
        store.levels.insert(name, value);
    });
    #[cfg(not(feature = "telemetry"))]
    let _ = (name, value);
}

/// Moves a level up or down by one, never below zero.
#[inline]
pub(crate) fn step_level(name: &'static str, up: bool) {
    #[cfg(feature = "telemetry")]
    registry::update(|store| {
        let level = store.levels.entry(name).or_insert(0);
        *level = if up {
            level.saturating_add(1)
        } else {
            level.saturating_sub(1)
        };
    });
    #[cfg(not(feature = "telemetry"))]
    let _ = (name, up);
}

#[inline]
pub(crate) fn observe_task_latency(elapsed_us: u64) {
    #[cfg(feature = "telemetry")]
    registry::update(|store| store.task_latency.observe(elapsed_us));
    #[cfg(not(feature = "telemetry"))]
    let _ = elapsed_us;
}

pub fn snapshot() -> PoolMetrics {
    #[cfg(feature = "telemetry")]
    let metrics = registry::snapshot();
    #[cfg(not(feature = "telemetry"))]
    let metrics = PoolMetrics::default();
    metrics
}

/// Clears every recorded metric.
pub fn reset() {
    #[cfg(feature = "telemetry")]
    registry::update(|store| *store = registry::Store::EMPTY);
}

#[cfg(feature = "telemetry")]
mod registry {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::{PoolMetrics, TaskLatency};

    pub(super) struct Store {
        pub(super) counters: BTreeMap<&'static str, u64>,
        pub(super) levels: BTreeMap<&'static str, u64>,
        pub(super) task_latency: TaskLatency,
    }

    impl Store {
        pub(super) const EMPTY: Store = Store {
            counters: BTreeMap::new(),
            levels: BTreeMap::new(),
            task_latency: TaskLatency {
                samples: 0,
                total_us: 0,
                min_us: 0,
                max_us: 0,
            },
        };
    }

    static STORE: Mutex<Store> = Mutex::new(Store::EMPTY);

    pub(super) fn update(apply: impl FnOnce(&mut Store)) {
        let mut store = match STORE.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut store);
    }

    pub(super) fn snapshot() -> PoolMetrics {
        let mut metrics = PoolMetrics::default();
        update(|store| {
            let owned = |map: &BTreeMap<&'static str, u64>| -> BTreeMap<String, u64> {
                map.iter()
                    .map(|(name, value)| ((*name).to_owned(), *value))
                    .collect()
            };
            metrics = PoolMetrics {
                counters: owned(&store.counters),
                levels: owned(&store.levels),
                task_latency: store.task_latency,
            };
        });
        metrics
    }
}

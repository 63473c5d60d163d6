//! Bounded thread pool with idle worker reuse and expiry.
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use corral_core::Pool;
//!
//! let pool = Pool::new(4)?;
//! let hits = Arc::new(AtomicUsize::new(0));
//! for _ in 0..8 {
//!     let hits = Arc::clone(&hits);
//!     pool.submit(move || {
//!         hits.fetch_add(1, Ordering::SeqCst);
//!     })?;
//! }
//! # while hits.load(Ordering::SeqCst) < 8 { std::thread::yield_now(); }
//! assert!(pool.running() <= pool.capacity());
//! # Ok::<(), corral_core::CorralError>(())
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod error;
pub mod telemetry;
pub mod types;

pub use cache::{CacheMetricsSnapshot, ObjectCache};
pub use config::{DEFAULT_EXPIRATION, DEFAULT_THREAD_NAME, PoolConfig, load_config};
pub use crate::core::Pool;
pub use error::CorralError;
pub use telemetry::{DefaultPoolTelemetry, PoolTelemetry};
pub use types::{PanicHandler, PoolStats, Result, Task, TaskPanic};

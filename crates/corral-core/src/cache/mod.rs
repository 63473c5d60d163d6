pub mod recycler;

pub use recycler::{CacheMetricsSnapshot, ObjectCache};

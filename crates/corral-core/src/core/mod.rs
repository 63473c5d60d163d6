pub mod pool;
mod reaper;
mod worker;

pub use pool::Pool;

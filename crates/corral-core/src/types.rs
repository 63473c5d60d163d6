use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CorralError;

pub type Result<T> = std::result::Result<T, CorralError>;

/// A unit of work accepted by the pool.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Callback invoked on the worker thread when a task panics.
pub type PanicHandler = Arc<dyn Fn(&TaskPanic) + Send + Sync>;

/// Message delivered through a worker's hand-off slot.
pub(crate) enum Message {
    Run(Task),
    Terminate,
}

/// Details of a task that panicked on a worker thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPanic {
    pub worker_id: usize,
    pub message: String,
}

impl TaskPanic {
    pub(crate) fn from_payload(worker_id: usize, payload: &(dyn Any + Send)) -> Self {
        Self {
            worker_id,
            message: panic_message(payload),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Point-in-time view of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Maximum number of workers that may hold a task at once.
    pub capacity: usize,
    /// Workers currently holding a task.
    pub running: usize,
    /// Workers parked in the idle registry.
    pub idle: usize,
    /// `capacity - running`.
    pub free: usize,
    /// Whether the pool has been released.
    pub closed: bool,
    /// Hand-off slots of exited workers waiting to be reused.
    pub cached_slots: usize,
}

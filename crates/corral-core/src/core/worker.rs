use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::core::pool::Shared;
use crate::error::CorralError;
use crate::telemetry::tags;
use crate::types::{Message, Result, Task, TaskPanic, panic_message};

/// Single-slot rendezvous a worker receives its tasks through.
pub(crate) struct HandOff {
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

impl HandOff {
    pub(crate) fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }
}

/// Submitter-side handle to a worker that is ready to take exactly one task.
pub(crate) struct Worker {
    id: usize,
    sender: Sender<Message>,
}

impl Worker {
    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Delivers `task` into the worker's slot.
    ///
    /// The slot is always empty here: a worker is only handed out after it has
    /// consumed its previous message, so this never blocks.
    pub(crate) fn dispatch(self, task: Task) -> Result<()> {
        self.sender
            .send(Message::Run(task))
            .map_err(|_| CorralError::WorkerUnavailable(self.id))
    }
}

/// A worker parked in the idle registry.
pub(crate) struct IdleWorker {
    id: usize,
    sender: Sender<Message>,
    last_active: Instant,
}

impl IdleWorker {
    pub(crate) fn new(id: usize, sender: Sender<Message>, last_active: Instant) -> Self {
        Self {
            id,
            sender,
            last_active,
        }
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_active)
    }

    pub(crate) fn into_worker(self) -> Worker {
        Worker {
            id: self.id,
            sender: self.sender,
        }
    }

    /// Asks the worker thread to exit. Returns false if the thread is already gone.
    pub(crate) fn terminate(self) -> bool {
        self.sender.try_send(Message::Terminate).is_ok()
    }
}

/// Starts a worker thread and returns the handle used to feed it.
pub(crate) fn spawn(shared: Arc<Shared>, id: usize) -> Result<Worker> {
    let handoff = shared.cache.acquire_or(HandOff::new);
    let sender = handoff.tx.clone();
    let name = format!("{}-{}", shared.thread_name(), id);

    thread::Builder::new()
        .name(name)
        .spawn(move || run_worker_loop(id, shared, handoff))?;

    Ok(Worker { id, sender })
}

fn run_worker_loop(id: usize, shared: Arc<Shared>, handoff: HandOff) {
    shared.telemetry.on_worker_spawned(id);
    tracing::debug!(target: tags::TARGET_WORKER, worker_id = id, "worker started");

    while let Ok(Message::Run(task)) = handoff.rx.recv() {
        execute(&shared, id, task);
        if !shared.return_worker(id, &handoff.tx) {
            break;
        }
    }

    shared.telemetry.on_worker_exited(id);
    tracing::debug!(target: tags::TARGET_WORKER, worker_id = id, "worker stopped");

    if !shared.is_closed() {
        shared.cache.recycle(handoff);
    }
}

fn execute(shared: &Shared, worker_id: usize, task: Task) {
    shared.telemetry.on_task_started(worker_id);
    let started_at = Instant::now();

    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(()) => shared
            .telemetry
            .on_task_finished(worker_id, started_at.elapsed()),
        Err(payload) => {
            shared
                .telemetry
                .on_task_panicked(worker_id, started_at.elapsed());
            report_panic(shared, &TaskPanic::from_payload(worker_id, payload.as_ref()));
        }
    }
}

fn report_panic(shared: &Shared, fault: &TaskPanic) {
    let Some(handler) = shared.panic_handler() else {
        tracing::error!(
            target: tags::TARGET_WORKER,
            worker_id = fault.worker_id,
            panic = %fault.message,
            "task panicked"
        );
        return;
    };

    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(fault))) {
        tracing::error!(
            target: tags::TARGET_WORKER,
            worker_id = fault.worker_id,
            panic = %fault.message,
            handler_panic = %panic_message(payload.as_ref()),
            "panic handler panicked"
        );
    }
}

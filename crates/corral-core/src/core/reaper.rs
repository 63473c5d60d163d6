use std::io;
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::core::pool::Shared;
use crate::telemetry::tags;

/// Background thread that evicts workers idle longer than the pool expiration.
///
/// Holds only a weak reference to the pool, so it never keeps a dropped pool alive.
pub(crate) struct Reaper {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Reaper {
    /// Starts the reaper on a thread named `{thread_name}-reaper`.
    pub(crate) fn spawn(
        shared: Weak<Shared>,
        period: Duration,
        thread_name: &str,
    ) -> io::Result<Self> {
        let (stop, stopped) = bounded(0);
        let handle = thread::Builder::new()
            .name(format!("{thread_name}-reaper"))
            .spawn(move || run_reaper_loop(shared, stopped, period))?;

        Ok(Self { stop, handle })
    }

    /// Disconnects the stop channel and waits for the thread to finish its current pass.
    pub(crate) fn stop(self) {
        drop(self.stop);
        if self.handle.join().is_err() {
            tracing::error!(target: tags::TARGET_REAPER, "reaper thread panicked");
        }
    }
}

fn run_reaper_loop(shared: Weak<Shared>, stopped: Receiver<()>, period: Duration) {
    loop {
        match stopped.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let Some(shared) = shared.upgrade() else {
            break;
        };
        if shared.is_closed() {
            break;
        }
        shared.expire_workers();
    }

    tracing::debug!(target: tags::TARGET_REAPER, "reaper stopped");
}

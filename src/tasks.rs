//! Supervised fire-and-forget task spawning.
//!
//! Background work (poll loops, marker timers, fan-out lookups) runs
//! detached. Failures and panics are logged instead of vanishing with the
//! dropped `JoinHandle`.

use std::future::Future;

use tokio::task::AbortHandle;
use tracing::{error, info_span, Instrument};

/// Spawn `future` under a watcher that logs a panic.
///
/// Returns a handle that can cancel the task.
pub fn spawn_supervised<F>(name: &'static str, future: F) -> AbortHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(future.instrument(info_span!("task", name)));
    let abort = handle.abort_handle();

    tokio::spawn(async move {
        if let Err(err) = handle.await {
            if err.is_panic() {
                error!(task = name, ?err, "background task panicked");
            }
        }
    });

    abort
}

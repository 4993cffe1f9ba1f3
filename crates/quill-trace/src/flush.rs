//! Deferred flush scheduling.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

/// Hands pending telemetry exports to the runtime so they outlive the
/// handler that produced them.
///
/// `schedule` never delays the caller's response; it only guarantees the
/// operation keeps running after the response object has been handed off.
/// On shutdown, [`drain`] keeps the process alive until every scheduled
/// export settles or the ceiling is hit — the non-serverless equivalent of
/// a platform deferred-execution hook. The scheduler holds no reference to
/// any trace, only to the pending operations.
///
/// [`drain`]: FlushScheduler::drain
#[derive(Clone)]
pub struct FlushScheduler {
    in_flight: Arc<watch::Sender<usize>>,
}

impl Default for FlushScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FlushScheduler {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { in_flight: Arc::new(tx) }
    }

    /// Spawns a pending export operation without blocking the caller.
    pub fn schedule<F>(&self, operation: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let counter = self.in_flight.clone();
        counter.send_modify(|n| *n += 1);
        tokio::spawn(async move {
            operation.await;
            counter.send_modify(|n| *n -= 1);
        });
    }

    /// Number of scheduled operations that have not yet settled.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Waits for all in-flight operations, up to `ceiling`.
    ///
    /// Returns `true` if everything settled, `false` if the ceiling was hit
    /// with exports still pending.
    pub async fn drain(&self, ceiling: Duration) -> bool {
        let mut rx = self.in_flight.subscribe();
        let settled = match tokio::time::timeout(ceiling, rx.wait_for(|n| *n == 0)).await {
            Ok(_) => true,
            Err(_) => {
                warn!(pending = self.in_flight(), "flush drain ceiling hit");
                false
            }
        };
        settled
    }
}

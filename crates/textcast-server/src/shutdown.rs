//! Shutdown of the listener and every open stream.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long [`ShutdownCoordinator::drain`] waits for the serve task by default.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the root cancellation token.
///
/// The listener waits on [`Self::token`]; each stream session gets a child
/// from [`Self::stream_token`]. One [`Self::shutdown`] ends both, and hyper
/// only finishes draining once every stream body has completed.
#[derive(Default)]
pub struct ShutdownCoordinator {
    root: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not fired yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token the listener waits on.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Token for one stream session. Cancelling it leaves the others alone.
    pub fn stream_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Stop accepting connections and end every stream. Idempotent.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    /// Whether [`Self::shutdown`] has run.
    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Fire shutdown, then wait for the serve task to exit.
    ///
    /// Returns `false` when `timeout` elapsed first; the task is aborted then.
    pub async fn drain(&self, serve: JoinHandle<()>, timeout: Duration) -> bool {
        self.shutdown();
        info!(timeout_ms = timeout.as_millis(), "draining http server");

        let abort = serve.abort_handle();
        match tokio::time::timeout(timeout, serve).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "serve task ended abnormally");
                true
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis(), "http server did not drain in time, aborting");
                abort.abort();
                false
            }
        }
    }
}

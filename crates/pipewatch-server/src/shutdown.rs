//! Shutdown signalling via `CancellationToken`.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared cancellation for the HTTP listener and anything tied to it.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Not yet cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Begin shutdown. Idempotent.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("shutdown requested");
        }
        self.token.cancel();
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }
}

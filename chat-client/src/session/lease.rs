// chat-client/src/session/lease.rs
use std::sync::atomic::{AtomicBool, Ordering};

use crate::connector::RealtimeConnector;

/// Owns a live connection and releases it at most once
pub(crate) struct Lease<T> {
    connection: T,
    released: AtomicBool,
}

impl<T: Send + Sync + 'static> Lease<T> {
    pub(crate) fn new(connection: T) -> Self {
        Self {
            connection,
            released: AtomicBool::new(false),
        }
    }

    pub(crate) fn connection(&self) -> &T {
        &self.connection
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Disconnect through `connector` unless already done.
    ///
    /// Returns true for the one call that performed the release. Disconnect
    /// errors are logged, the lease counts as released either way.
    pub(crate) async fn release<C>(&self, connector: &C) -> bool
    where
        C: RealtimeConnector<Connection = T>,
    {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }

        if let Err(e) = connector.disconnect(&self.connection).await {
            tracing::warn!("Error disconnecting from platform: {}", e);
        }
        true
    }
}

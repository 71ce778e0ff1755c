use tmon_client::api::ApiError;

/// Errors surfaced by [`SyncStore`](crate::SyncStore) actions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The push channel gave up reconnecting; only fetched data is current.
    #[error("Live updates unavailable: push channel could not reconnect")]
    ConnectivityDegraded,
}

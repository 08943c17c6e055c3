// chat-client/src/error.rs
use thiserror::Error;

/// Failure of the platform connect/disconnect calls
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("credential rejected: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure to obtain a credential from the token service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenClientError {
    #[error("not signed in")]
    Unauthenticated,
    #[error("token service unavailable: {0}")]
    UpstreamUnavailable(String),
}

/// Errors surfaced by the session manager.
///
/// Values are cloneable so they can sit in the observable session state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The attempt was overtaken by a newer identity/credential or by shutdown
    #[error("connect attempt superseded")]
    StaleAttempt,
    #[error("failed to connect: {0}")]
    ConnectFailure(#[from] ConnectError),
    #[error("credential issuance failed: {0}")]
    Issuance(#[from] TokenClientError),
    #[error("session manager is shut down")]
    Closed,
}

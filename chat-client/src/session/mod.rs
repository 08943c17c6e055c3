// chat-client/src/session/mod.rs
pub mod manager;
mod lease;

use chrono::{DateTime, Utc};
use common::{Identity, IdentityId};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::SessionError;
use lease::Lease;

pub use manager::{Attempt, SessionManager};

/// A live platform connection bound to one identity.
///
/// Clones share the same connection. Only the manager can release it.
pub struct Session<T> {
    id: Uuid,
    identity: Identity,
    established_at: DateTime<Utc>,
    lease: Arc<Lease<T>>,
}

impl<T: Send + Sync + 'static> Session<T> {
    pub(crate) fn new(identity: Identity, lease: Arc<Lease<T>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            established_at: Utc::now(),
            lease,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    pub fn connection(&self) -> &T {
        self.lease.connection()
    }

    /// False once the manager has released the connection
    pub fn is_live(&self) -> bool {
        !self.lease.is_released()
    }

    pub(crate) fn lease(&self) -> &Lease<T> {
        &self.lease
    }
}

impl<T> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            identity: self.identity.clone(),
            established_at: self.established_at,
            lease: self.lease.clone(),
        }
    }
}

impl<T> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("identity", &self.identity.id)
            .field("established_at", &self.established_at)
            .finish_non_exhaustive()
    }
}

/// Observable connection state of a session manager
pub enum SessionState<T> {
    Idle { error: Option<SessionError> },
    Connecting { identity: IdentityId },
    Connected(Session<T>),
    Disconnecting,
}

impl<T> SessionState<T> {
    pub fn session(&self) -> Option<&Session<T>> {
        match self {
            SessionState::Connected(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected(_))
    }

    pub fn error(&self) -> Option<&SessionError> {
        match self {
            SessionState::Idle { error } => error.as_ref(),
            _ => None,
        }
    }
}

impl<T> Default for SessionState<T> {
    fn default() -> Self {
        SessionState::Idle { error: None }
    }
}

impl<T> Clone for SessionState<T> {
    fn clone(&self) -> Self {
        match self {
            SessionState::Idle { error } => SessionState::Idle { error: error.clone() },
            SessionState::Connecting { identity } => SessionState::Connecting { identity: identity.clone() },
            SessionState::Connected(session) => SessionState::Connected(session.clone()),
            SessionState::Disconnecting => SessionState::Disconnecting,
        }
    }
}

impl<T> fmt::Debug for SessionState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle { error } => f.debug_struct("Idle").field("error", error).finish(),
            SessionState::Connecting { identity } => f.debug_struct("Connecting").field("identity", identity).finish(),
            SessionState::Connected(session) => f.debug_tuple("Connected").field(session).finish(),
            SessionState::Disconnecting => f.write_str("Disconnecting"),
        }
    }
}

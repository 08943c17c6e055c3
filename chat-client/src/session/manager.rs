// chat-client/src/session/manager.rs
use common::{report_error, Credential, Identity};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use super::lease::Lease;
use super::{Session, SessionState};
use crate::connector::RealtimeConnector;
use crate::error::SessionError;

/// A connect attempt, tagged when it was triggered.
///
/// Only the attempt with the latest tag may publish a session.
#[derive(Debug)]
pub struct Attempt {
    generation: u64,
    identity: Identity,
}

impl Attempt {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct Inner<T> {
    generation: u64,
    closed: bool,
    current: Option<Session<T>>,
}

impl<T> Inner<T> {
    fn is_current(&self, attempt: &Attempt) -> bool {
        !self.closed && self.generation == attempt.generation
    }
}

/// Owns the single live platform session of a client.
///
/// Every trigger (identity change, sign-out, shutdown) bumps the generation,
/// which invalidates all attempts started before it. A stale attempt that
/// still manages to connect is disconnected and never published.
pub struct SessionManager<C: RealtimeConnector> {
    connector: Arc<C>,
    inner: Mutex<Inner<C::Connection>>,
    state: watch::Sender<SessionState<C::Connection>>,
}

impl<C: RealtimeConnector> SessionManager<C> {
    pub fn new(connector: C) -> Self {
        Self::with_connector(Arc::new(connector))
    }

    pub fn with_connector(connector: Arc<C>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            connector,
            inner: Mutex::new(Inner {
                generation: 0,
                closed: false,
                current: None,
            }),
            state,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<C::Connection>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: SessionState<C::Connection>) {
        tracing::debug!("Session state -> {:?}", state);
        self.state.send_replace(state);
    }

    async fn retire(&self, session: Session<C::Connection>) {
        tracing::info!("Releasing session {} for {}", session.id(), session.identity().id);
        session.lease().release(&*self.connector).await;
    }

    /// Start a new attempt for `identity`, retiring the current session
    pub async fn begin(&self, identity: Identity) -> Result<Attempt, SessionError> {
        let (attempt, retired) = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(SessionError::Closed);
            }
            inner.generation += 1;
            let attempt = Attempt {
                generation: inner.generation,
                identity,
            };
            let retired = inner.current.take();
            if retired.is_some() {
                self.publish(SessionState::Disconnecting);
            } else {
                self.publish(SessionState::Connecting { identity: attempt.identity.id.clone() });
            }
            (attempt, retired)
        };

        if let Some(session) = retired {
            self.retire(session).await;

            let inner = self.lock();
            if inner.is_current(&attempt) {
                self.publish(SessionState::Connecting { identity: attempt.identity.id.clone() });
            }
        }

        tracing::debug!("Began attempt {} for {}", attempt.generation, attempt.identity.id);
        Ok(attempt)
    }

    /// Connect `attempt` with its credential and publish the session if the
    /// attempt is still the latest one when the connect completes
    pub async fn activate(&self, attempt: Attempt, credential: Credential) -> Result<Session<C::Connection>, SessionError> {
        {
            let inner = self.lock();
            if inner.closed {
                return Err(SessionError::Closed);
            }
            if !inner.is_current(&attempt) {
                return Err(SessionError::StaleAttempt);
            }
        }

        let connection = match self.connector.connect(&attempt.identity, credential).await {
            Ok(connection) => connection,
            Err(e) => {
                let inner = self.lock();
                if !inner.is_current(&attempt) {
                    tracing::debug!("Stale attempt {} failed to connect: {}", attempt.generation, e);
                    return Err(SessionError::StaleAttempt);
                }
                tracing::warn!("Failed to connect {}: {}", attempt.identity.id, e);
                report_error(
                    &e,
                    "session_manager",
                    &[("operation", "platform_connection"), ("user_id", attempt.identity.id.as_str())],
                );
                let error = SessionError::ConnectFailure(e);
                self.publish(SessionState::Idle { error: Some(error.clone()) });
                return Err(error);
            }
        };

        let session = Session::new(attempt.identity.clone(), Arc::new(Lease::new(connection)));

        let accepted = {
            let mut inner = self.lock();
            if inner.is_current(&attempt) {
                inner.current = Some(session.clone());
                self.publish(SessionState::Connected(session.clone()));
                true
            } else {
                false
            }
        };

        if accepted {
            tracing::info!("Session {} connected for {}", session.id(), attempt.identity.id);
            Ok(session)
        } else {
            tracing::debug!("Attempt {} for {} went stale while connecting", attempt.generation, attempt.identity.id);
            session.lease().release(&*self.connector).await;
            Err(SessionError::StaleAttempt)
        }
    }

    /// `begin` followed by `activate`
    pub async fn connect(&self, identity: Identity, credential: Credential) -> Result<Session<C::Connection>, SessionError> {
        let attempt = self.begin(identity).await?;
        self.activate(attempt, credential).await
    }

    /// Record a failure that ended `attempt` before it could connect
    pub fn fail(&self, attempt: Attempt, error: SessionError) {
        let inner = self.lock();
        if inner.is_current(&attempt) {
            tracing::warn!("Attempt for {} failed: {}", attempt.identity.id, error);
            report_error(
                &error,
                "session_manager",
                &[("operation", "credential_issuance"), ("user_id", attempt.identity.id.as_str())],
            );
            self.publish(SessionState::Idle { error: Some(error) });
        }
    }

    /// Identity signed out: drop the session and go back to idle
    pub async fn deactivate(&self) {
        let (generation, retired) = {
            let mut inner = self.lock();
            if inner.closed {
                return;
            }
            inner.generation += 1;
            let retired = inner.current.take();
            if retired.is_some() {
                self.publish(SessionState::Disconnecting);
            } else {
                self.publish(SessionState::Idle { error: None });
            }
            (inner.generation, retired)
        };

        if let Some(session) = retired {
            self.retire(session).await;

            let inner = self.lock();
            if !inner.closed && inner.generation == generation {
                self.publish(SessionState::Idle { error: None });
            }
        }
    }

    pub fn current_session(&self) -> Option<Session<C::Connection>> {
        self.lock().current.clone()
    }

    pub fn state(&self) -> SessionState<C::Connection> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState<C::Connection>> {
        self.state.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Close the manager for good. Safe to call any number of times.
    pub async fn shutdown(&self) {
        let retired = {
            let mut inner = self.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.generation += 1;
            let retired = inner.current.take();
            if retired.is_some() {
                self.publish(SessionState::Disconnecting);
            }
            retired
        };

        if let Some(session) = retired {
            self.retire(session).await;
        }
        self.publish(SessionState::Idle { error: None });
        tracing::info!("Session manager shut down");
    }
}

impl<C: RealtimeConnector> Drop for SessionManager<C> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        inner.closed = true;
        inner.generation += 1;

        let Some(session) = inner.current.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let connector = self.connector.clone();
                handle.spawn(async move {
                    tracing::info!("Releasing session {} on drop", session.id());
                    session.lease().release(&*connector).await;
                });
            },
            Err(_) => {
                tracing::warn!("No runtime to release session {} on drop", session.id());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestConnection {
        user: String,
    }

    #[derive(Default)]
    struct TestConnector {
        connects: AtomicUsize,
        disconnects: Mutex<Vec<String>>,
        refuse: bool,
    }

    impl TestConnector {
        fn disconnected(&self) -> Vec<String> {
            self.disconnects.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RealtimeConnector for TestConnector {
        type Connection = TestConnection;

        async fn connect(&self, identity: &Identity, credential: Credential) -> Result<TestConnection, ConnectError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.refuse || credential.is_empty() {
                return Err(ConnectError::Rejected("bad credential".to_string()));
            }
            Ok(TestConnection { user: identity.id.to_string() })
        }

        async fn disconnect(&self, connection: &TestConnection) -> Result<(), ConnectError> {
            self.disconnects.lock().unwrap().push(connection.user.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_single_activation_connects() {
        let manager = SessionManager::new(TestConnector::default());
        let rx = manager.subscribe();

        let session = manager
            .connect(Identity::new("user_1"), Credential::new("tok_abc"))
            .await
            .unwrap();

        assert_eq!(session.identity().id.as_str(), "user_1");
        assert_eq!(session.connection().user, "user_1");
        assert!(session.is_live());

        let state = rx.borrow().clone();
        assert_eq!(state.session().map(|s| s.id()), Some(session.id()));
        assert_eq!(manager.current_session().map(|s| s.id()), Some(session.id()));
    }

    #[tokio::test]
    async fn test_new_identity_replaces_session() {
        let manager = SessionManager::new(TestConnector::default());

        let first = manager.connect(Identity::new("user_1"), Credential::new("tok_1")).await.unwrap();
        let second = manager.connect(Identity::new("user_2"), Credential::new("tok_xyz")).await.unwrap();

        assert!(!first.is_live());
        assert!(second.is_live());
        assert_eq!(manager.connector.disconnected(), vec!["user_1".to_string()]);
        assert_eq!(manager.current_session().unwrap().identity().id.as_str(), "user_2");
    }

    #[tokio::test]
    async fn test_superseded_attempt_is_stale() {
        let manager = SessionManager::new(TestConnector::default());

        let old = manager.begin(Identity::new("user_1")).await.unwrap();
        let new = manager.begin(Identity::new("user_2")).await.unwrap();
        assert!(new.generation() > old.generation());

        let result = manager.activate(old, Credential::new("tok_1")).await;
        assert_eq!(result.unwrap_err(), SessionError::StaleAttempt);
        // Rejected before connecting
        assert_eq!(manager.connector.connects.load(Ordering::SeqCst), 0);

        manager.activate(new, Credential::new("tok_2")).await.unwrap();
        assert_eq!(manager.current_session().unwrap().identity().id.as_str(), "user_2");
    }

    #[tokio::test]
    async fn test_connect_failure_is_observable() {
        let manager = SessionManager::new(TestConnector { refuse: true, ..TestConnector::default() });

        let result = manager.connect(Identity::new("user_1"), Credential::new("tok_1")).await;
        assert!(matches!(result, Err(SessionError::ConnectFailure(ConnectError::Rejected(_)))));

        let state = manager.state();
        assert!(matches!(state.error(), Some(SessionError::ConnectFailure(_))));
        assert!(manager.current_session().is_none());
    }

    #[test]
    fn test_only_current_failures_are_reported() {
        let events = sentry::test::with_captured_events(|| {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            runtime.block_on(async {
                let manager = SessionManager::new(TestConnector { refuse: true, ..TestConnector::default() });

                manager
                    .connect(Identity::new("user_1"), Credential::new("tok_1"))
                    .await
                    .unwrap_err();

                // A superseded attempt fails quietly
                let old = manager.begin(Identity::new("user_2")).await.unwrap();
                let _new = manager.begin(Identity::new("user_3")).await.unwrap();
                manager.fail(old, SessionError::Issuance(crate::error::TokenClientError::Unauthenticated));
            });
        });

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.tags.get("component").map(String::as_str), Some("session_manager"));
        assert_eq!(
            event.extra.get("operation").and_then(|v| v.as_str()),
            Some("platform_connection")
        );
        assert_eq!(event.extra.get("user_id").and_then(|v| v.as_str()), Some("user_1"));
    }

    #[tokio::test]
    async fn test_fail_only_applies_to_current_attempt() {
        let manager = SessionManager::new(TestConnector::default());

        let old = manager.begin(Identity::new("user_1")).await.unwrap();
        let new = manager.begin(Identity::new("user_2")).await.unwrap();

        manager.fail(old, SessionError::StaleAttempt);
        assert!(matches!(manager.state(), SessionState::Connecting { .. }));

        manager.fail(new, SessionError::Issuance(crate::error::TokenClientError::Unauthenticated));
        assert!(matches!(manager.state().error(), Some(SessionError::Issuance(_))));
    }

    #[tokio::test]
    async fn test_deactivate_keeps_manager_usable() {
        let manager = SessionManager::new(TestConnector::default());

        manager.connect(Identity::new("user_1"), Credential::new("tok_1")).await.unwrap();
        manager.deactivate().await;

        assert!(manager.current_session().is_none());
        assert!(matches!(manager.state(), SessionState::Idle { error: None }));
        assert!(!manager.is_closed());

        manager.connect(Identity::new("user_1"), Credential::new("tok_1b")).await.unwrap();
        assert!(manager.current_session().is_some());
    }

    #[tokio::test]
    async fn test_closed_manager_rejects_work() {
        let manager = SessionManager::new(TestConnector::default());
        manager.shutdown().await;

        assert_eq!(manager.begin(Identity::new("user_1")).await.unwrap_err(), SessionError::Closed);
        assert!(manager.is_closed());
    }

    #[tokio::test]
    async fn test_drop_releases_session() {
        let connector = Arc::new(TestConnector::default());
        let manager = SessionManager::with_connector(connector.clone());
        let session = manager.connect(Identity::new("user_1"), Credential::new("tok_1")).await.unwrap();

        drop(manager);

        // The release runs on a spawned task
        for _ in 0..50 {
            if !connector.disconnected().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(connector.disconnected(), vec!["user_1".to_string()]);
        assert!(!session.is_live());
    }

    #[tokio::test]
    async fn test_drop_after_shutdown_releases_nothing_more() {
        let connector = Arc::new(TestConnector::default());
        let manager = SessionManager::with_connector(connector.clone());
        manager.connect(Identity::new("user_1"), Credential::new("tok_1")).await.unwrap();

        manager.shutdown().await;
        drop(manager);
        tokio::task::yield_now().await;

        assert_eq!(connector.disconnected().len(), 1);
    }
}

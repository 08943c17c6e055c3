// chat-client/src/driver.rs
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::connector::RealtimeConnector;
use crate::error::SessionError;
use crate::session::SessionManager;
use crate::token_client::{AuthSession, CredentialSource};

/// Follows the signed-in identity and keeps the session manager in step.
///
/// Each identity change begins a new attempt right away; the credential
/// fetch and connect run on their own task so a slow earlier trigger cannot
/// hold up or overtake a later one.
pub struct SessionDriver<C: RealtimeConnector, S: CredentialSource> {
    manager: Arc<SessionManager<C>>,
    credentials: Arc<S>,
}

impl<C: RealtimeConnector, S: CredentialSource> SessionDriver<C, S> {
    pub fn new(manager: Arc<SessionManager<C>>, credentials: Arc<S>) -> Self {
        Self { manager, credentials }
    }

    pub fn manager(&self) -> &Arc<SessionManager<C>> {
        &self.manager
    }

    /// Run until the identity stream closes, then shut the manager down
    pub async fn run(self, mut identities: watch::Receiver<Option<AuthSession>>) {
        let mut attempts = JoinSet::new();

        let initial = identities.borrow_and_update().clone();
        self.trigger(initial, &mut attempts).await;

        loop {
            tokio::select! {
                changed = identities.changed() => {
                    if changed.is_err() {
                        tracing::info!("Identity stream closed");
                        break;
                    }
                    let auth = identities.borrow_and_update().clone();
                    self.trigger(auth, &mut attempts).await;
                }
                Some(joined) = attempts.join_next(), if !attempts.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Session attempt task failed: {}", e);
                    }
                }
            }
        }

        self.manager.shutdown().await;
        while let Some(joined) = attempts.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Session attempt task failed: {}", e);
            }
        }
    }

    async fn trigger(&self, auth: Option<AuthSession>, attempts: &mut JoinSet<()>) {
        let Some(auth) = auth else {
            tracing::info!("Signed out, deactivating session");
            self.manager.deactivate().await;
            return;
        };

        let attempt = match self.manager.begin(auth.identity.clone()).await {
            Ok(attempt) => attempt,
            Err(e) => {
                tracing::debug!("Ignoring identity change for {}: {}", auth.identity.id, e);
                return;
            }
        };

        let manager = self.manager.clone();
        let credentials = self.credentials.clone();
        attempts.spawn(async move {
            let credential = match credentials.issue(&auth).await {
                Ok(credential) => credential,
                Err(e) => {
                    manager.fail(attempt, SessionError::Issuance(e));
                    return;
                }
            };

            match manager.activate(attempt, credential).await {
                Ok(session) => tracing::debug!("Driver activated session {}", session.id()),
                Err(SessionError::StaleAttempt) | Err(SessionError::Closed) => {
                    tracing::debug!("Attempt for {} superseded", auth.identity.id);
                },
                Err(e) => tracing::warn!("Attempt for {} failed: {}", auth.identity.id, e),
            }
        });
    }
}

// chat-client/src/main.rs
use chat_client::{AuthSession, SessionDriver, SessionManager, SessionState, TokenClient, WsConnector};
use common::{init_observability, Config, Identity};
use std::error::Error;
use std::sync::Arc;
use tokio::sync::watch;

/// Signed-in identity handed over by the surrounding application
fn identity_from_env() -> Option<AuthSession> {
    let user_id = std::env::var("CHAT_USER_ID").ok().filter(|v| !v.trim().is_empty())?;
    let bearer = std::env::var("CHAT_IDENTITY_TOKEN").ok().filter(|v| !v.trim().is_empty())?;

    let mut identity = Identity::new(user_id);
    if let Ok(name) = std::env::var("CHAT_USER_NAME") {
        identity = identity.with_display_name(name);
    }
    Some(AuthSession::new(identity, bearer))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::from_env();
    let _reporting = init_observability(&config, concat!(env!("CARGO_PKG_NAME"), "@", env!("CARGO_PKG_VERSION")));

    let credentials = Arc::new(TokenClient::new(&config.client)?);
    let manager = Arc::new(SessionManager::new(WsConnector::new(&config.platform)));

    let auth = identity_from_env();
    if auth.is_none() {
        tracing::warn!("CHAT_USER_ID or CHAT_IDENTITY_TOKEN not set, staying signed out");
    }
    let (identity_tx, identity_rx) = watch::channel(auth);

    let mut states = manager.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            match &*states.borrow_and_update() {
                SessionState::Idle { error: Some(e) } => tracing::warn!("Session idle: {}", e),
                SessionState::Idle { error: None } => tracing::info!("Session idle"),
                SessionState::Connecting { identity } => tracing::info!("Connecting as {}", identity),
                SessionState::Connected(session) => {
                    tracing::info!("Connected as {} (session {})", session.identity().id, session.id())
                },
                SessionState::Disconnecting => tracing::info!("Disconnecting"),
            }
        }
    });

    let driver = tokio::spawn(SessionDriver::new(manager.clone(), credentials).run(identity_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down chat client");

    drop(identity_tx);
    driver.await?;
    Ok(())
}

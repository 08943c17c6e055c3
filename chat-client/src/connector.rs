// chat-client/src/connector.rs
use async_trait::async_trait;
use common::{Credential, Identity, IdentityId, PlatformConfig};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::Error as WsError;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use url::Url;
use uuid::Uuid;

use crate::error::ConnectError;

const OUTBOUND_BUFFER: usize = 100;
const INBOUND_BUFFER: usize = 256;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Client-side connect/disconnect calls of the realtime platform
#[async_trait]
pub trait RealtimeConnector: Send + Sync + 'static {
    type Connection: Send + Sync + 'static;

    /// Open a connection for `identity`. The credential is consumed.
    async fn connect(&self, identity: &Identity, credential: Credential) -> Result<Self::Connection, ConnectError>;

    /// Close a connection opened by this connector
    async fn disconnect(&self, connection: &Self::Connection) -> Result<(), ConnectError>;
}

/// Live WebSocket connection to the platform
pub struct WsConnection {
    id: Uuid,
    user_id: IdentityId,
    outbound: mpsc::Sender<WsMessage>,
    inbound: broadcast::Sender<String>,
    tasks: Mutex<Option<(JoinHandle<Result<(), String>>, JoinHandle<()>)>>,
}

impl WsConnection {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &IdentityId {
        &self.user_id
    }

    /// Text frames pushed by the platform
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.inbound.subscribe()
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ConnectError> {
        self.outbound
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|_| ConnectError::Transport("connection closed".to_string()))
    }

    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }
}

/// Connects to the platform's WebSocket endpoint
#[derive(Debug, Clone)]
pub struct WsConnector {
    ws_url: String,
    api_key: String,
    close_timeout: Duration,
}

impl WsConnector {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            ws_url: config.ws_url.clone(),
            api_key: config.api_key.clone(),
            close_timeout: CLOSE_TIMEOUT,
        }
    }

    /// Bound on each step of a disconnect: queueing and flushing the close
    /// frame, then waiting for the platform to acknowledge it
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    fn connect_url(&self, identity: &Identity) -> Result<Url, ConnectError> {
        let user_details = json!({
            "id": identity.id,
            "name": identity.display_name,
            "image": identity.avatar_url,
        })
        .to_string();

        Url::parse_with_params(
            &self.ws_url,
            &[
                ("api_key", self.api_key.as_str()),
                ("user_id", identity.id.as_str()),
                ("user_details", user_details.as_str()),
            ],
        )
        .map_err(|e| ConnectError::Transport(format!("invalid platform url: {}", e)))
    }
}

fn classify(err: WsError) -> ConnectError {
    match err {
        WsError::Http(response)
            if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN =>
        {
            ConnectError::Rejected(format!("platform answered {}", response.status()))
        },
        other => ConnectError::Transport(other.to_string()),
    }
}

#[async_trait]
impl RealtimeConnector for WsConnector {
    type Connection = WsConnection;

    async fn connect(&self, identity: &Identity, credential: Credential) -> Result<WsConnection, ConnectError> {
        let url = self.connect_url(identity)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(classify)?;
        let auth = HeaderValue::from_str(credential.expose())
            .map_err(|_| ConnectError::Rejected("credential is not a valid header value".to_string()))?;
        request.headers_mut().insert(header::AUTHORIZATION, auth);
        // The credential is not needed past the handshake
        drop(credential);

        let (ws_stream, _) = connect_async(request).await.map_err(classify)?;
        let (mut ws_sink, mut ws_stream) = ws_stream.split();

        let (tx, mut rx) = mpsc::channel::<WsMessage>(OUTBOUND_BUFFER);
        let (inbound, _) = broadcast::channel::<String>(INBOUND_BUFFER);
        let id = Uuid::new_v4();

        // Forward outbound messages to the platform
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, WsMessage::Close(_));
                if let Err(e) = ws_sink.send(msg).await {
                    tracing::error!("Error sending to platform: {}", e);
                    return Err(e.to_string());
                }
                if closing {
                    break;
                }
            }
            Ok(())
        });

        // Forward platform messages to subscribers
        let publisher = inbound.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_stream.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        // No subscribers is fine
                        let _ = publisher.send(text);
                    },
                    Ok(WsMessage::Close(frame)) => {
                        tracing::debug!("Platform closed connection {}: {:?}", id, frame);
                        break;
                    },
                    Ok(_) => {
                        // Pings are answered by tungstenite; binary frames are not used
                    },
                    Err(e) => {
                        tracing::warn!("Platform connection {} error: {}", id, e);
                        break;
                    }
                }
            }
        });

        tracing::info!("Connected to platform as {} (connection {})", identity.id, id);

        Ok(WsConnection {
            id,
            user_id: identity.id.clone(),
            outbound: tx,
            inbound,
            tasks: Mutex::new(Some((writer, reader))),
        })
    }

    async fn disconnect(&self, connection: &WsConnection) -> Result<(), ConnectError> {
        let tasks = connection
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        let Some((mut writer, mut reader)) = tasks else {
            return Ok(());
        };

        // Queueing the close frame waits on a full outbound buffer, so it
        // shares the writer's deadline
        let closing = async {
            // A closed channel means the writer already stopped
            let _ = connection.outbound.send(WsMessage::Close(None)).await;
            (&mut writer).await
        };
        let outcome = tokio::time::timeout(self.close_timeout, closing).await;

        let result = match outcome {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(ConnectError::Transport(e)),
            Ok(Err(join_err)) => Err(ConnectError::Transport(join_err.to_string())),
            Err(_) => {
                tracing::warn!("Timed out closing platform connection {}, dropping it", connection.id);
                writer.abort();
                reader.abort();
                return Err(ConnectError::Transport("timed out sending close frame".to_string()));
            }
        };

        if tokio::time::timeout(self.close_timeout, &mut reader).await.is_err() {
            tracing::debug!("Platform did not acknowledge close for {}", connection.id);
            reader.abort();
        }

        tracing::info!("Disconnected platform connection {}", connection.id);
        result
    }
}

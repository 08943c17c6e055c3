// chat-client/src/lib.rs
pub mod connector;
pub mod driver;
pub mod error;
pub mod session;
pub mod token_client;

pub use connector::{RealtimeConnector, WsConnection, WsConnector};
pub use driver::SessionDriver;
pub use error::{ConnectError, SessionError, TokenClientError};
pub use session::{Attempt, Session, SessionManager, SessionState};
pub use token_client::{AuthSession, CredentialSource, TokenClient};

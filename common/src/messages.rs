// common/src/messages.rs
use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::identity::{Identity, IdentityId};

/// Body of a successful `GET /api/chat/token`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: Credential,
}

/// Error body returned by every API route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// User lifecycle event pushed by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum IdentityEvent {
    #[serde(rename = "user.created")]
    UserCreated(IdentityUser),
    #[serde(rename = "user.updated")]
    UserUpdated(IdentityUser),
    #[serde(rename = "user.deleted")]
    UserDeleted { id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAddress {
    pub email_address: String,
}

/// Profile as delivered by the identity provider's user webhooks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityUser {
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl IdentityUser {
    /// Profile to identity, using the same display-name fallback as session tokens
    pub fn to_identity(&self) -> Identity {
        let full_name = [&self.first_name, &self.last_name]
            .into_iter()
            .flatten()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let display_name = Some(full_name)
            .filter(|n| !n.is_empty())
            .or_else(|| self.username.clone().filter(|n| !n.trim().is_empty()))
            .or_else(|| self.email_addresses.first().map(|e| e.email_address.clone()))
            .unwrap_or_else(|| self.id.clone());

        Identity {
            id: IdentityId::new(self.id.clone()),
            display_name,
            avatar_url: self.image_url.clone(),
        }
    }
}

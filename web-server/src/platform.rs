// web-server/src/platform.rs
use actix::Addr;
use async_trait::async_trait;
use common::credential::mint_credential as sign_credential;
use common::{Credential, Identity, IdentityId, PlatformConfig};
use std::time::Duration;

use crate::error::PlatformError;
use crate::user_directory::{AddToPublicChannels, DeleteUser, PlatformUser, UpsertUser, UserDirectoryActor};

/// Server-side operations against the realtime chat/video platform
#[async_trait]
pub trait RealtimePlatform: Send + Sync {
    /// Sign a credential that lets `identity` open a realtime connection
    async fn mint_credential(&self, identity: &Identity) -> Result<Credential, PlatformError>;

    /// Create or update the platform user record for `identity`
    async fn upsert_user(&self, identity: &Identity) -> Result<PlatformUser, PlatformError>;

    /// Remove the platform user; `false` if it did not exist
    async fn delete_user(&self, id: &IdentityId) -> Result<bool, PlatformError>;

    /// Add the user to every discoverable channel, returning the channels joined
    async fn add_user_to_public_channels(&self, id: &IdentityId) -> Result<Vec<String>, PlatformError>;
}

/// Platform adapter that signs credentials with the API secret and keeps
/// user records in the directory actor
pub struct LocalPlatform {
    api_secret: Vec<u8>,
    credential_ttl: Option<u64>,
    directory: Addr<UserDirectoryActor>,
    request_timeout: Duration,
}

impl LocalPlatform {
    pub fn new(config: &PlatformConfig, directory: Addr<UserDirectoryActor>) -> Self {
        Self {
            api_secret: config.api_secret.as_bytes().to_vec(),
            credential_ttl: config.credential_ttl_secs,
            directory,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }
}

#[async_trait]
impl RealtimePlatform for LocalPlatform {
    async fn mint_credential(&self, identity: &Identity) -> Result<Credential, PlatformError> {
        if identity.id.as_str().is_empty() {
            return Err(PlatformError::Rejected("empty user id".to_string()));
        }
        sign_credential(&identity.id, &self.api_secret, self.credential_ttl)
            .map_err(|e| PlatformError::Rejected(e.to_string()))
    }

    async fn upsert_user(&self, identity: &Identity) -> Result<PlatformUser, PlatformError> {
        let user = self
            .directory
            .send(UpsertUser { identity: identity.clone() })
            .timeout(self.request_timeout)
            .await?;
        Ok(user)
    }

    async fn delete_user(&self, id: &IdentityId) -> Result<bool, PlatformError> {
        let removed = self
            .directory
            .send(DeleteUser { id: id.clone() })
            .timeout(self.request_timeout)
            .await?;
        Ok(removed)
    }

    async fn add_user_to_public_channels(&self, id: &IdentityId) -> Result<Vec<String>, PlatformError> {
        self.directory
            .send(AddToPublicChannels { user_id: id.clone() })
            .timeout(self.request_timeout)
            .await?
            .ok_or_else(|| PlatformError::UnknownUser(id.to_string()))
    }
}

// common/src/identity.rs
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::IdentityConfig;

/// Opaque caller identifier issued by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// An authenticated caller. Read-only, never persisted by the services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl Identity {
    /// Identity with the display name defaulting to the id
    pub fn new(id: impl Into<String>) -> Self {
        let id = IdentityId::new(id);
        Self {
            display_name: id.to_string(),
            id,
            avatar_url: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }
}

/// Claims carried by identity-provider session tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl IdentityClaims {
    /// Claims for `sub` valid for `ttl_secs` from now
    pub fn new(sub: impl Into<String>, ttl_secs: usize) -> Self {
        let now = Utc::now().timestamp().max(0) as usize;
        Self {
            sub: sub.into(),
            iat: now,
            exp: now + ttl_secs,
            iss: None,
            name: None,
            username: None,
            email: None,
            image_url: None,
        }
    }

    /// Display name falls back name -> username -> email -> id
    pub fn display_name(&self) -> String {
        [&self.name, &self.username, &self.email]
            .into_iter()
            .flatten()
            .find(|v| !v.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| self.sub.clone())
    }

    pub fn into_identity(self) -> Identity {
        Identity {
            display_name: self.display_name(),
            id: IdentityId::new(self.sub),
            avatar_url: self.image_url,
        }
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("identity token has an empty subject")]
    EmptySubject,
    #[error("invalid verification key: {0}")]
    InvalidKey(jsonwebtoken::errors::Error),
    #[error("identity token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),
}

/// Verifies identity-provider bearer tokens
#[derive(Clone)]
pub struct IdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl IdentityVerifier {
    pub fn from_config(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let (key, algorithm) = match &config.public_key_pem {
            Some(pem) => (
                DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(IdentityError::InvalidKey)?,
                Algorithm::RS256,
            ),
            None => (DecodingKey::from_secret(config.jwt_secret.as_bytes()), Algorithm::HS256),
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = config.leeway_secs;
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }

        Ok(Self { key, validation })
    }

    pub fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(IdentityError::MissingToken);
        }

        let data = decode::<IdentityClaims>(token, &self.key, &self.validation)?;
        if data.claims.sub.trim().is_empty() {
            return Err(IdentityError::EmptySubject);
        }
        Ok(data.claims.into_identity())
    }
}

impl fmt::Debug for IdentityVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityVerifier")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

/// Sign identity claims with a shared HS256 secret.
///
/// Stands in for the identity provider in development and tests.
pub fn issue_identity_token(claims: &IdentityClaims, secret: &[u8]) -> Result<String, jsonwebtoken::errors::Error> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret))
}

// common/src/credential.rs
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::identity::IdentityId;

/// Signed realtime-platform token scoped to one identity.
///
/// Deliberately has no `Display` and a redacted `Debug`, so it cannot end up
/// in log lines by accident. Connect attempts take it by value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for placing on the wire
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Claims inside a platform credential
#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialClaims {
    pub user_id: String,
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<usize>,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential was minted for a different identity")]
    IdentityMismatch,
    #[error("invalid credential: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

/// Mint a credential for `user_id`, signed with the platform API secret.
///
/// A TTL of `None` or 0 mints a credential without expiry. Lifetimes past
/// the end of time saturate instead of wrapping.
pub fn mint_credential(
    user_id: &IdentityId,
    secret: &[u8],
    ttl_secs: Option<u64>,
) -> Result<Credential, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp().max(0) as usize;

    let claims = CredentialClaims {
        user_id: user_id.to_string(),
        iat: now,
        exp: ttl_secs
            .filter(|ttl| *ttl > 0)
            .map(|ttl| now.saturating_add(usize::try_from(ttl).unwrap_or(usize::MAX))),
    };

    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret)).map(Credential)
}

/// Check that `credential` is a valid platform token for `expected`.
///
/// This is the check the platform performs when a connection is opened.
pub fn verify_credential(
    credential: &Credential,
    expected: &IdentityId,
    secret: &[u8],
) -> Result<CredentialClaims, CredentialError> {
    let mut validation = Validation::new(Algorithm::HS256);
    // exp is optional; it is still enforced when present
    validation.required_spec_claims = HashSet::new();

    let data = decode::<CredentialClaims>(credential.expose(), &DecodingKey::from_secret(secret), &validation)?;
    if data.claims.user_id != expected.as_str() {
        return Err(CredentialError::IdentityMismatch);
    }
    Ok(data.claims)
}

// web-server/src/issuer.rs
use common::{report_error, Credential, Identity};
use std::sync::Arc;

use crate::error::IssueError;
use crate::platform::RealtimePlatform;

/// Turns a verified caller identity into a platform credential.
///
/// Stateless. Authentication happens upstream, so the issuer only checks
/// that an identity was attached.
#[derive(Clone)]
pub struct TokenIssuer {
    platform: Arc<dyn RealtimePlatform>,
}

impl TokenIssuer {
    pub fn new(platform: Arc<dyn RealtimePlatform>) -> Self {
        Self { platform }
    }

    pub async fn issue_token(&self, caller: Option<&Identity>) -> Result<Credential, IssueError> {
        let identity = caller.ok_or(IssueError::Unauthenticated)?;

        match self.platform.mint_credential(identity).await {
            Ok(credential) => {
                tracing::info!("Issued platform credential for {}", identity.id);
                Ok(credential)
            },
            Err(e) => {
                tracing::error!("Error minting credential for {}: {}", identity.id, e);
                report_error(&e, "token_issuer", &[("user_id", identity.id.as_str())]);
                Err(IssueError::UpstreamUnavailable(e))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use chrono::Utc;
    use common::{Credential, Identity, IdentityId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::error::PlatformError;
    use crate::platform::RealtimePlatform;
    use crate::user_directory::PlatformUser;

    /// Platform double that records calls
    #[derive(Default)]
    pub struct StubPlatform {
        pub token: Option<String>,
        pub mints: AtomicUsize,
        pub upserted: Mutex<Vec<Identity>>,
        pub deleted: Mutex<Vec<IdentityId>>,
        pub joined: Mutex<Vec<IdentityId>>,
    }

    impl StubPlatform {
        pub fn returning(token: &str) -> Self {
            Self { token: Some(token.to_string()), ..Self::default() }
        }

        pub fn unreachable() -> Self {
            Self::default()
        }

        pub fn mint_calls(&self) -> usize {
            self.mints.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RealtimePlatform for StubPlatform {
        async fn mint_credential(&self, _identity: &Identity) -> Result<Credential, PlatformError> {
            self.mints.fetch_add(1, Ordering::SeqCst);
            match &self.token {
                Some(token) => Ok(Credential::new(token.clone())),
                None => Err(PlatformError::Unavailable("connection refused".to_string())),
            }
        }

        async fn upsert_user(&self, identity: &Identity) -> Result<PlatformUser, PlatformError> {
            self.upserted.lock().unwrap().push(identity.clone());
            let now = Utc::now();
            Ok(PlatformUser {
                id: identity.id.clone(),
                name: identity.display_name.clone(),
                image: identity.avatar_url.clone(),
                created_at: now,
                updated_at: now,
            })
        }

        async fn delete_user(&self, id: &IdentityId) -> Result<bool, PlatformError> {
            self.deleted.lock().unwrap().push(id.clone());
            Ok(true)
        }

        async fn add_user_to_public_channels(&self, id: &IdentityId) -> Result<Vec<String>, PlatformError> {
            self.joined.lock().unwrap().push(id.clone());
            Ok(vec!["general".to_string()])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubPlatform;
    use super::*;

    #[actix_web::test]
    async fn test_missing_identity_never_reaches_platform() {
        let platform = Arc::new(StubPlatform::returning("tok_abc"));
        let issuer = TokenIssuer::new(platform.clone());

        let result = issuer.issue_token(None).await;
        assert!(matches!(result, Err(IssueError::Unauthenticated)));
        assert_eq!(platform.mint_calls(), 0);
    }

    #[actix_web::test]
    async fn test_issue_for_identity() {
        let platform = Arc::new(StubPlatform::returning("tok_abc"));
        let issuer = TokenIssuer::new(platform.clone());

        let credential = issuer.issue_token(Some(&Identity::new("user_1"))).await.unwrap();
        assert_eq!(credential.expose(), "tok_abc");
        assert_eq!(platform.mint_calls(), 1);
    }

    #[actix_web::test]
    async fn test_unreachable_platform_is_not_retried() {
        let platform = Arc::new(StubPlatform::unreachable());
        let issuer = TokenIssuer::new(platform.clone());

        let result = issuer.issue_token(Some(&Identity::new("user_1"))).await;
        assert!(matches!(result, Err(IssueError::UpstreamUnavailable(_))));
        assert_eq!(platform.mint_calls(), 1);
    }

    #[test]
    fn test_upstream_failure_is_reported() {
        let events = sentry::test::with_captured_events(|| {
            actix_web::rt::System::new().block_on(async {
                let ok = TokenIssuer::new(Arc::new(StubPlatform::returning("tok_abc")));
                let down = TokenIssuer::new(Arc::new(StubPlatform::unreachable()));

                ok.issue_token(Some(&Identity::new("user_1"))).await.unwrap();
                down.issue_token(Some(&Identity::new("user_2"))).await.unwrap_err();
                down.issue_token(None).await.unwrap_err();
            })
        });

        // Only the platform failure is reported
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tags.get("component").map(String::as_str), Some("token_issuer"));
        assert_eq!(events[0].extra.get("user_id").and_then(|v| v.as_str()), Some("user_2"));
    }
}

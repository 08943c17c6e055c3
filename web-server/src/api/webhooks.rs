// web-server/src/api/webhooks.rs
use actix_web::{post, web, HttpRequest, HttpResponse};
use common::{IdentityEvent, IdentityId};
use serde_json::json;

use crate::error::WebhookError;
use crate::platform::RealtimePlatform;
use crate::utils::token::secrets_match;

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Shared secret expected on identity-provider webhook calls
#[derive(Clone)]
pub struct WebhookSettings {
    pub secret: String,
}

/// Keep platform user records in step with the identity provider
#[post("/webhooks/identity")]
pub async fn identity_event(
    req: HttpRequest,
    body: web::Bytes,
    settings: web::Data<WebhookSettings>,
    platform: web::Data<dyn RealtimePlatform>,
) -> Result<HttpResponse, WebhookError> {
    let presented = req
        .headers()
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !secrets_match(presented, &settings.secret) {
        tracing::warn!("Identity webhook called with an invalid secret");
        return Err(WebhookError::Unauthorized);
    }

    let event: IdentityEvent = serde_json::from_slice(&body)?;

    match event {
        IdentityEvent::UserCreated(user) => {
            let identity = user.to_identity();
            let record = platform.upsert_user(&identity).await?;
            let channels = platform.add_user_to_public_channels(&identity.id).await?;
            tracing::info!("Synced new user {} into {} public channels", record.id, channels.len());

            Ok(HttpResponse::Ok().json(json!({
                "status": "ok",
                "user": record.id,
                "channels": channels,
            })))
        },
        IdentityEvent::UserUpdated(user) => {
            let record = platform.upsert_user(&user.to_identity()).await?;
            tracing::info!("Updated platform user {}", record.id);

            Ok(HttpResponse::Ok().json(json!({
                "status": "ok",
                "user": record.id,
            })))
        },
        IdentityEvent::UserDeleted { id } => {
            let id = IdentityId::new(id);
            let deleted = platform.delete_user(&id).await?;
            tracing::info!("Deleted platform user {} (existed: {})", id, deleted);

            Ok(HttpResponse::Ok().json(json!({
                "status": "ok",
                "deleted": deleted,
            })))
        }
    }
}

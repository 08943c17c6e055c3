// web-server/src/api/chat.rs
use actix_web::{get, web, HttpRequest, HttpResponse};
use common::TokenResponse;

use crate::error::IssueError;
use crate::issuer::TokenIssuer;
use crate::middleware::verified_identity;

/// Issue a realtime-platform credential for the verified caller
#[get("/chat/token")]
pub async fn get_token(
    req: HttpRequest,
    issuer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, IssueError> {
    let caller = verified_identity(&req);
    if caller.is_none() {
        tracing::info!("Token requested without a verified identity");
    }

    let token = issuer.issue_token(caller.as_ref()).await?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};
    use common::identity::{issue_identity_token, IdentityClaims};
    use common::{ErrorResponse, IdentityConfig, IdentityVerifier};
    use serde_json::json;
    use std::sync::Arc;

    use crate::issuer::testing::StubPlatform;
    use crate::middleware::IdentityLayer;

    const IDENTITY_SECRET: &str = "chat_route_identity_secret";

    fn identity_layer() -> IdentityLayer {
        let verifier = IdentityVerifier::from_config(&IdentityConfig {
            jwt_secret: IDENTITY_SECRET.to_string(),
            ..IdentityConfig::default()
        })
        .unwrap();
        IdentityLayer::new(verifier)
    }

    fn bearer_for(user_id: &str) -> String {
        let claims = IdentityClaims::new(user_id, 300);
        let token = issue_identity_token(&claims, IDENTITY_SECRET.as_bytes()).unwrap();
        format!("Bearer {}", token)
    }

    #[actix_web::test]
    async fn test_token_for_verified_identity() {
        let platform = Arc::new(StubPlatform::returning("tok_abc"));
        let app = test::init_service(
            App::new()
                .wrap(identity_layer())
                .app_data(web::Data::new(TokenIssuer::new(platform.clone())))
                .service(web::scope("/api").service(get_token)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/chat/token")
            .insert_header(("Authorization", bearer_for("user_1")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "token": "tok_abc" }));
        assert_eq!(platform.mint_calls(), 1);
    }

    #[actix_web::test]
    async fn test_missing_identity_is_unauthorized() {
        let platform = Arc::new(StubPlatform::returning("tok_abc"));
        let app = test::init_service(
            App::new()
                .wrap(identity_layer())
                .app_data(web::Data::new(TokenIssuer::new(platform.clone())))
                .service(web::scope("/api").service(get_token)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/chat/token").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        // A token signed by someone else is no identity at all
        let claims = IdentityClaims::new("user_1", 300);
        let forged = issue_identity_token(&claims, b"not_the_provider").unwrap();
        let req = test::TestRequest::get()
            .uri("/api/chat/token")
            .insert_header(("Authorization", format!("Bearer {}", forged)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(platform.mint_calls(), 0);
    }

    #[actix_web::test]
    async fn test_unreachable_platform_returns_json_500() {
        let platform = Arc::new(StubPlatform::unreachable());
        let app = test::init_service(
            App::new()
                .wrap(identity_layer())
                .app_data(web::Data::new(TokenIssuer::new(platform.clone())))
                .service(web::scope("/api").service(get_token)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/chat/token")
            .insert_header(("Authorization", bearer_for("user_1")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.message, "Failed to generate token");
    }
}

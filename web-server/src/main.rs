// Web Server - main.rs
// web-server/src/main.rs
use actix::Actor;
use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpServer};
use common::{init_observability, redact, Config, IdentityVerifier};
use std::io;
use std::sync::Arc;
use web_server::api::{self, webhooks::WebhookSettings};
use web_server::issuer::TokenIssuer;
use web_server::middleware::{IdentityLayer, RateLimiter};
use web_server::platform::{LocalPlatform, RealtimePlatform};
use web_server::user_directory::UserDirectoryActor;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let config = Config::from_env();
    let _reporting = init_observability(&config, concat!(env!("CARGO_PKG_NAME"), "@", env!("CARGO_PKG_VERSION")));

    config
        .validate()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let verifier = IdentityVerifier::from_config(&config.identity)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let server_addr = config.web_server_addr.clone();
    let client_url = config.client_url.clone();

    tracing::info!(
        "Starting token service on {} (platform key {}, run mode {})",
        server_addr,
        redact(&config.platform.api_key),
        config.run_mode
    );

    let directory = UserDirectoryActor::new()
        .with_public_channels(config.platform.public_channels.clone())
        .start();
    let platform: Arc<dyn RealtimePlatform> = Arc::new(LocalPlatform::new(&config.platform, directory));

    let issuer_data = web::Data::new(TokenIssuer::new(platform.clone()));
    let platform_data: web::Data<dyn RealtimePlatform> = web::Data::from(platform);
    let webhook_data = web::Data::new(WebhookSettings { secret: config.webhook_secret.clone() });
    let identity_layer = IdentityLayer::new(verifier);
    let rate_limiter = RateLimiter::new(&config.rate_limit);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&client_url)
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(issuer_data.clone())
            .app_data(platform_data.clone())
            .app_data(webhook_data.clone())
            .wrap(rate_limiter.clone())
            .wrap(identity_layer.clone())
            .wrap(cors)
            .configure(api::configure)
    })
    .bind(&server_addr)?
    .run()
    .await
}

// web-server/src/api/mod.rs
pub mod chat;
pub mod webhooks;

use actix_web::{get, HttpResponse, Responder};

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok().body("Hello")
}

pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(index).service(
        actix_web::web::scope("/api")
            .service(chat::get_token)
            .service(webhooks::identity_event)
    );
}

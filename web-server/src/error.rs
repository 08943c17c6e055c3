// web-server/src/error.rs
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use common::ErrorResponse;
use thiserror::Error;

/// Failures talking to the realtime platform
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform unreachable: {0}")]
    Unavailable(String),
    #[error("platform rejected the request: {0}")]
    Rejected(String),
    #[error("no such platform user: {0}")]
    UnknownUser(String),
}

impl From<actix::MailboxError> for PlatformError {
    fn from(err: actix::MailboxError) -> Self {
        // Closed mailbox or timeout: the directory did not answer
        PlatformError::Unavailable(err.to_string())
    }
}

/// Token issuance failures, reported to the HTTP caller
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("no verified identity attached to the request")]
    Unauthenticated,
    #[error("realtime platform unavailable: {0}")]
    UpstreamUnavailable(#[from] PlatformError),
}

impl ResponseError for IssueError {
    fn status_code(&self) -> StatusCode {
        match self {
            IssueError::Unauthenticated => StatusCode::UNAUTHORIZED,
            IssueError::UpstreamUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            IssueError::Unauthenticated => "Unauthenticated",
            // Upstream detail stays in the logs
            IssueError::UpstreamUnavailable(_) => "Failed to generate token",
        };
        HttpResponse::build(self.status_code()).json(ErrorResponse::new(message))
    }
}

/// Failures of the identity webhook
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook secret missing or invalid")]
    Unauthorized,
    #[error("malformed webhook payload: {0}")]
    BadPayload(#[from] serde_json::Error),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl ResponseError for WebhookError {
    fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::Unauthorized => StatusCode::UNAUTHORIZED,
            WebhookError::BadPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::Platform(PlatformError::UnknownUser(_)) => StatusCode::NOT_FOUND,
            WebhookError::Platform(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            WebhookError::Unauthorized => "Invalid webhook secret".to_string(),
            WebhookError::BadPayload(e) => format!("Malformed payload: {}", e),
            WebhookError::Platform(PlatformError::UnknownUser(id)) => format!("Unknown user: {}", id),
            WebhookError::Platform(_) => "Failed to sync platform user".to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorResponse::new(message))
    }
}

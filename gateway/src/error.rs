// gateway/src/error.rs
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("control channel unavailable: {0}")]
    Control(#[from] actix::MailboxError),
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidUrl(_) | GatewayError::InvalidHeader(_) => StatusCode::BAD_REQUEST,
            GatewayError::Upstream(_) | GatewayError::Body(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Control(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.to_string()
        }))
    }
}

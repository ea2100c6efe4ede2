use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Seconds a rate-limited client is asked to wait
pub const RETRY_AFTER_SECS: u64 = 60;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Too many requests. Please wait a minute and try again.")]
    RateLimited,

    #[error("Upstream rate limit: {0}")]
    UpstreamRateLimited(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Maps a failed upstream response onto the matching variant
    pub fn from_status(service: &str, status: reqwest::StatusCode, body: &str) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            AppError::UpstreamRateLimited(format!("{} returned status {}", service, status))
        } else {
            AppError::Upstream(format!("{} returned status {}: {}", service, status, body))
        }
    }

    /// Copies the error, keeping its variant
    ///
    /// `reqwest::Error` cannot be cloned, so an `HttpClient` error is carried
    /// over by message as `Upstream`.
    pub fn duplicate(&self) -> Self {
        match self {
            AppError::InvalidInput(msg) => AppError::InvalidInput(msg.clone()),
            AppError::Config(msg) => AppError::Config(msg.clone()),
            AppError::RateLimited => AppError::RateLimited,
            AppError::UpstreamRateLimited(msg) => AppError::UpstreamRateLimited(msg.clone()),
            AppError::Upstream(msg) => AppError::Upstream(msg.clone()),
            AppError::HttpClient(e) => AppError::Upstream(e.to_string()),
            AppError::Internal(msg) => AppError::Internal(msg.clone()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited | AppError::UpstreamRateLimited(_) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::Config(_)
            | AppError::Upstream(_)
            | AppError::HttpClient(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::InvalidInput(msg) | AppError::Config(msg) => msg.clone(),
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": message
        }));

        let mut response = (status, body).into_response();
        if matches!(self, AppError::RateLimited) {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(RETRY_AFTER_SECS),
            );
        }
        response
    }
}

pub type AppResult<T> = Result<T, AppError>;

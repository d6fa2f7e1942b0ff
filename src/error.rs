use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Domain-specific error types for the ad-insertion core.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("failed to fetch content from origin: {0}")]
    OriginFetchError(#[from] reqwest::Error),

    #[error("failed to parse HLS playlist: {0}")]
    PlaylistParseError(String),

    #[error("failed to modify playlist: {0}")]
    RewriteError(String),

    #[error("SCTE-35 validation failed: {0}")]
    ValidationError(String),

    #[error("splice point not found in manifest window: {0}")]
    WindowError(String),

    #[error("ad decision timed out")]
    DecisionTimeout,

    #[error("ad decision produced no eligible pod")]
    DecisionEmpty,

    #[error("beacon dispatch failed: {0}")]
    BeaconFailure(String),

    #[error("channel coordinator lock held too long for {0}")]
    StateConflict(String),

    #[error("unknown channel: {0}")]
    InvalidChannel(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("invalid origin URL: {0}")]
    InvalidOrigin(String),

    #[error("internal server error: {0}")]
    InternalError(String),
}

// Implement IntoResponse so handlers can just bubble `?` up to axum.
//
// Per the error-handling policy, most of these never reach a viewer as an
// error response in practice — the coordinator catches them upstream and
// falls back to pass-through — but the conversion still needs to exist for
// the few paths (origin fetch, invalid channel) that really do surface.
impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            CoreError::OriginFetchError(ref e) => {
                tracing::error!(error = ?e, "origin fetch error");
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            CoreError::PlaylistParseError(ref e) => {
                tracing::error!(error = %e, "playlist parse error");
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            CoreError::RewriteError(ref e) => {
                tracing::error!(error = %e, "rewrite error");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            CoreError::ValidationError(ref e) => {
                tracing::warn!(error = %e, "validation error");
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            CoreError::WindowError(ref e) => {
                tracing::warn!(error = %e, "window error");
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            CoreError::DecisionTimeout => {
                tracing::warn!("decision engine timed out");
                (StatusCode::GATEWAY_TIMEOUT, self.to_string())
            }
            CoreError::DecisionEmpty => {
                tracing::warn!("decision engine returned no pod");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            CoreError::BeaconFailure(ref e) => {
                tracing::error!(error = %e, "beacon dispatch failed");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            CoreError::StateConflict(ref e) => {
                tracing::warn!(channel = %e, "single-writer lock contended past timeout");
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            CoreError::InvalidChannel(ref e) => {
                tracing::error!(channel = %e, "invalid channel");
                (StatusCode::NOT_FOUND, self.to_string())
            }
            CoreError::ConfigError(ref e) => {
                tracing::error!(error = %e, "configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            CoreError::InvalidOrigin(ref e) => {
                tracing::error!(error = %e, "invalid origin url");
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            CoreError::InternalError(ref e) => {
                tracing::error!(error = %e, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        (status, error_message).into_response()
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

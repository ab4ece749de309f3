use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::redact::redact_text;

/// How the caller should react to a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rate limit, 5xx, network: worth another attempt.
    Recoverable,
    /// Invalid credential or malformed response: abandon the current scope.
    Fatal,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault configuration error: {0}")]
    Config(String),

    #[error("malformed ciphertext: {0}")]
    Format(String),

    #[error("ciphertext failed authentication")]
    Auth,

    #[error("encryption failed")]
    Encryption,

    #[error("credential not found: {user_id}/{account_name}")]
    NotFound {
        user_id: String,
        account_name: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A classified failure from the activity-source API.
///
/// The client raises one of these exactly once per call; retrying is the
/// caller's decision (see [`crate::provider::retry::with_retry`]).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("credential rejected by provider (status {status})")]
    Unauthorized { status: u16 },

    #[error("provider upstream failure: status={status}, body={body}")]
    Upstream { status: u16, body: String },

    #[error("provider rejected request: status={status}, body={body}")]
    Rejected { status: u16, body: String },

    #[error("network error calling {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    #[error("failed to decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

impl ApiError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::RateLimited { .. } | ApiError::Upstream { .. } | ApiError::Network { .. } => {
                ErrorClass::Recoverable
            }
            ApiError::Unauthorized { .. } | ApiError::Rejected { .. } | ApiError::Decode { .. } => {
                ErrorClass::Fatal
            }
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.class() == ErrorClass::Recoverable
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("notification sink rejected message: status={status}, body={body}")]
    Rejected { status: u16, body: String },

    #[error("notification delivery failed after {attempts} attempts: status={}, body={body}", display_status(.status))]
    Exhausted {
        attempts: u32,
        status: Option<u16>,
        body: String,
    },
}

fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing mandatory configuration: {0}")]
    Missing(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure of one account's digest pass.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors surfaced through the HTTP trigger surface.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = match &self {
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                "missing_configuration",
            ),
            AppError::Vault(VaultError::Config(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                "invalid_encryption_key",
            ),
            AppError::Vault(e) => {
                tracing::error!(error = %e, "vault error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "vault_error")
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": redact_text(&self.to_string()),
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_classification() {
        assert!(ApiError::RateLimited { retry_after_secs: 60 }.is_recoverable());
        assert!(ApiError::Upstream { status: 502, body: String::new() }.is_recoverable());
        assert!(ApiError::Network {
            endpoint: "/me".into(),
            message: "connection reset".into()
        }
        .is_recoverable());

        assert_eq!(ApiError::Unauthorized { status: 401 }.class(), ErrorClass::Fatal);
        assert_eq!(
            ApiError::Rejected { status: 404, body: "not found".into() }.class(),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_sink_exhausted_message_embeds_status_and_body() {
        let err = SinkError::Exhausted {
            attempts: 3,
            status: Some(503),
            body: "busy".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("busy"));

        let err = SinkError::Exhausted {
            attempts: 3,
            status: None,
            body: "connection refused".into(),
        };
        assert!(err.to_string().contains("status=none"));
    }

    #[test]
    fn test_config_error_maps_to_500() {
        let resp = AppError::Config(ConfigError::Missing("DIGEST_SINK_URL")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

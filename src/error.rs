//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::services::explorer::ExplorerError;
use crate::services::snapshot::SnapshotError;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Authentication Errors**: Invalid or missing API keys, missing admin rights
/// - **Resource Errors**: Requested firm or webhook not found
/// - **Upstream Errors**: Block explorer failures after retries are exhausted
/// - **Validation Errors**: Invalid request data
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing, invalid, or inactive.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// API key is valid but lacks admin rights.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("Admin API key required")]
    Forbidden,

    /// Requested firm does not exist or is inactive.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Firm not found")]
    FirmNotFound,

    /// Webhook endpoint does not exist or belongs to another API key.
    #[error("Webhook not found")]
    WebhookNotFound,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),

    #[error("Invalid webhook URL")]
    InvalidWebhookUrl(String),

    /// Another sync run holds the sync lock.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("A sync run is already in progress")]
    SyncInProgress,

    /// Block explorer request failed after all retries.
    ///
    /// Returns HTTP 502 Bad Gateway.
    #[error("Block explorer error: {0}")]
    Explorer(#[from] ExplorerError),

    /// Reading or writing a payout snapshot file failed.
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `InvalidApiKey` → 401 Unauthorized
/// - `Forbidden` → 403 Forbidden
/// - `FirmNotFound`, `WebhookNotFound` → 404 Not Found
/// - `SyncInProgress` → 409 Conflict
/// - `InvalidRequest`, `InvalidWebhookUrl` → 400 Bad Request
/// - `Explorer` → 502 Bad Gateway
/// - `Database`, `Snapshot` → 500 Internal Server Error (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string()),
            AppError::FirmNotFound => (StatusCode::NOT_FOUND, "firm_not_found", self.to_string()),
            AppError::WebhookNotFound => {
                (StatusCode::NOT_FOUND, "webhook_not_found", self.to_string())
            }
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::InvalidWebhookUrl(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_webhook_url", msg.clone())
            }
            AppError::SyncInProgress => {
                (StatusCode::CONFLICT, "sync_in_progress", self.to_string())
            }
            AppError::Explorer(ref err) => {
                tracing::error!("Explorer failure: {}", err);
                (
                    StatusCode::BAD_GATEWAY,
                    "explorer_unavailable",
                    "The block explorer is unavailable".to_string(),
                )
            }
            AppError::Database(ref err) => {
                tracing::error!("Database failure: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Snapshot(ref err) => {
                tracing::error!("Snapshot failure: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

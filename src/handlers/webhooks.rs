//! HTTP handlers for alert webhook endpoint management.
//!
//! Any valid API key may register endpoints; each key only sees and deletes
//! its own endpoints.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::webhook::{WebhookEndpointRequest, WebhookEndpointResponse};
use crate::services::webhook_service;
use crate::state::AppState;

/// Register a new webhook endpoint.
///
/// # Request Body
///
/// ```json
/// {
///   "url": "https://example.com/webhook",
///   "firm_slug": "alpha-funding"
/// }
/// ```
///
/// Omitting `firm_slug` subscribes to incidents of every firm.
///
/// # Response
///
/// Returns 201 Created. The `secret` is only returned once.
pub async fn create_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<WebhookEndpointRequest>,
) -> Result<impl IntoResponse, AppError> {
    let endpoint =
        webhook_service::create_webhook_endpoint(&state.pool, auth.api_key_id, request).await?;

    Ok((StatusCode::CREATED, Json(endpoint)))
}

/// List all active webhook endpoints (secrets NOT included).
pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<WebhookEndpointResponse>>, AppError> {
    let webhooks = webhook_service::list_webhook_endpoints(&state.pool, auth.api_key_id).await?;

    Ok(Json(webhooks))
}

/// Delete a webhook endpoint (soft delete).
///
/// Returns 204 No Content on success, 404 if the endpoint does not exist or
/// belongs to another key.
pub async fn delete_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(webhook_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    webhook_service::delete_webhook_endpoint(&state.pool, auth.api_key_id, webhook_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

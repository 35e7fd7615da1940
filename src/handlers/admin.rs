//! Admin HTTP handlers.
//!
//! All routes here require an admin API key:
//! - POST /api/v1/admin/firms - Register a firm and its wallets
//! - POST /api/v1/admin/sync - Sync every active firm
//! - POST /api/v1/admin/firms/{slug}/sync - Sync one firm
//! - POST /api/v1/admin/firms/{slug}/reviews - Ingest and classify reviews
//! - POST /api/v1/admin/firms/{slug}/incidents/detect - Run incident detection

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        firm::{CreateFirmRequest, FirmResponse},
        incident::DetectionReport,
        review::{IngestReviewsRequest, IngestReviewsResponse},
    },
    services::{
        firm_service, incident_service, review_service,
        sync_service::{self, SyncReport, SyncRunSummary},
    },
    state::AppState,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

/// Register a firm.
///
/// # Request Body
///
/// ```json
/// {
///   "slug": "alpha-funding",
///   "name": "Alpha Funding",
///   "wallets": [{ "chain_id": 1, "address": "0x..." }]
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: the firm with its wallets
/// - **400**: invalid slug/address, or slug/wallet already registered
/// - **403**: API key is not an admin key
pub async fn create_firm(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateFirmRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_admin()?;

    let firm: FirmResponse = firm_service::create_firm(&state.pool, request).await?;

    Ok((StatusCode::CREATED, Json(firm)))
}

/// Sync one firm now.
///
/// Returns 409 if a scheduled or manual sync is already running.
pub async fn sync_firm(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(slug): Path<String>,
) -> Result<Json<SyncReport>, AppError> {
    auth.require_admin()?;

    let firm = firm_service::get_active_firm(&state.pool, &slug).await?;
    tracing::info!("Manual sync of {} requested by {}", firm.slug, auth.owner_name);

    let report = sync_service::try_sync_firm(&state, &firm).await?;
    Ok(Json(report))
}

/// Sync every active firm now.
pub async fn sync_all(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<SyncRunSummary>, AppError> {
    auth.require_admin()?;

    tracing::info!("Manual full sync requested by {}", auth.owner_name);
    let summary = sync_service::try_sync_all(&state).await?;

    Ok(Json(summary))
}

/// Ingest a batch of reviews for a firm.
///
/// Every review is classified before it is stored; the batch is rejected
/// as a whole if any review is invalid.
pub async fn ingest_reviews(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(slug): Path<String>,
    Json(request): Json<IngestReviewsRequest>,
) -> Result<Json<IngestReviewsResponse>, AppError> {
    auth.require_admin()?;

    if request.reviews.is_empty() {
        return Err(AppError::InvalidRequest("No reviews provided".to_string()));
    }

    let firm = firm_service::get_active_firm(&state.pool, &slug).await?;
    let response = review_service::ingest_reviews(
        &state.pool,
        state.classifier.as_ref(),
        firm.id,
        request.reviews,
    )
    .await?;

    Ok(Json(response))
}

/// Run incident detection for a firm and return what was found.
pub async fn detect_incidents(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(slug): Path<String>,
) -> Result<Json<DetectionReport>, AppError> {
    auth.require_admin()?;

    let firm = firm_service::get_active_firm(&state.pool, &slug).await?;
    let report = incident_service::detect_for_firm(&state, &firm).await?;

    Ok(Json(report))
}

//! Public firm HTTP handlers.
//!
//! This module implements the read-only endpoints consumed by the frontend:
//! - GET /api/v1/firms - List tracked firms
//! - GET /api/v1/firms/{slug} - Firm details and wallets
//! - GET /api/v1/firms/{slug}/payouts - Paginated payouts, newest first
//! - GET /api/v1/firms/{slug}/stats - Aggregated payout statistics
//! - GET /api/v1/firms/{slug}/reviews - Latest classified reviews
//! - GET /api/v1/firms/{slug}/incidents - Latest incidents

use crate::{
    error::AppError,
    models::{
        firm::FirmResponse,
        incident::Incident,
        payout::{PayoutPage, PayoutQuery, PayoutStats},
        review::Review,
    },
    services::{firm_service, incident_service, review_service, sync_service},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};

const REVIEW_LIMIT: i64 = 100;
const INCIDENT_LIMIT: i64 = 50;

/// List all active firms with their wallets.
pub async fn list_firms(State(state): State<AppState>) -> Result<Json<Vec<FirmResponse>>, AppError> {
    let firms = firm_service::list_active_firms(&state.pool).await?;

    let mut responses = Vec::with_capacity(firms.len());
    for firm in firms {
        let wallets = firm_service::wallets_for_firm(&state.pool, firm.id).await?;
        responses.push(FirmResponse::new(firm, wallets));
    }

    Ok(Json(responses))
}

/// Get one firm by slug.
///
/// Returns 404 for unknown or inactive firms.
pub async fn get_firm(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<FirmResponse>, AppError> {
    let firm = firm_service::get_active_firm(&state.pool, &slug).await?;
    let wallets = firm_service::wallets_for_firm(&state.pool, firm.id).await?;

    Ok(Json(FirmResponse::new(firm, wallets)))
}

/// List payouts, newest first.
///
/// # Query Parameters
///
/// - `limit` - page size, 1-500, default 50
/// - `offset` - rows to skip, default 0
pub async fn list_payouts(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PayoutQuery>,
) -> Result<Json<PayoutPage>, AppError> {
    let firm = firm_service::get_active_firm(&state.pool, &slug).await?;
    let (limit, offset) = query.bounds();

    let payouts = sync_service::list_payouts(&state.pool, firm.id, limit, offset).await?;

    Ok(Json(PayoutPage {
        firm_slug: firm.slug,
        limit,
        offset,
        payouts,
    }))
}

/// Payout statistics: totals, rolling windows, daily and monthly buckets,
/// streaks.
///
/// # Response (200)
///
/// ```json
/// {
///   "total_cents": 125000000,
///   "payout_count": 412,
///   "current_streak_days": 6,
///   "longest_streak_days": 41,
///   "daily": [{ "date": "2025-01-14", "total_cents": 950000, "count": 4 }],
///   "monthly": [{ "month": "2025-01", "total_cents": 8100000, "count": 37 }],
///   ...
/// }
/// ```
pub async fn get_stats(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PayoutStats>, AppError> {
    let firm = firm_service::get_active_firm(&state.pool, &slug).await?;
    let stats = sync_service::get_stats(&state.pool, firm.id).await?;

    Ok(Json(stats))
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Review>>, AppError> {
    let firm = firm_service::get_active_firm(&state.pool, &slug).await?;
    let reviews = review_service::list_reviews(&state.pool, firm.id, REVIEW_LIMIT).await?;

    Ok(Json(reviews))
}

pub async fn list_incidents(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Incident>>, AppError> {
    let firm = firm_service::get_active_firm(&state.pool, &slug).await?;
    let incidents = incident_service::list_incidents(&state.pool, firm.id, INCIDENT_LIMIT).await?;

    Ok(Json(incidents))
}

//! Review ingestion and queries.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::review::{IngestReviewsResponse, Review, ReviewInput},
    services::classifier::ReviewClassifier,
};

/// Classify and upsert a batch of reviews for one firm.
///
/// The whole batch is validated before anything is written. A review that
/// already exists (same source and external id) is updated and
/// re-classified.
pub async fn ingest_reviews(
    pool: &DbPool,
    classifier: &dyn ReviewClassifier,
    firm_id: Uuid,
    reviews: Vec<ReviewInput>,
) -> Result<IngestReviewsResponse, AppError> {
    for review in &reviews {
        review.validate().map_err(AppError::InvalidRequest)?;
    }

    let received = reviews.len();
    let mut stored = 0;
    let mut negative = 0;

    let mut tx = pool.begin().await?;

    for review in reviews {
        let classification =
            classifier.classify(review.title.as_deref(), &review.body, review.rating);
        if classification.negative {
            negative += 1;
        }

        stored += sqlx::query(
            r#"
            INSERT INTO reviews (
                firm_id,
                source,
                external_id,
                rating,
                title,
                body,
                category,
                is_negative,
                confidence,
                published_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (firm_id, source, external_id) DO UPDATE SET
                rating = EXCLUDED.rating,
                title = EXCLUDED.title,
                body = EXCLUDED.body,
                category = EXCLUDED.category,
                is_negative = EXCLUDED.is_negative,
                confidence = EXCLUDED.confidence,
                published_at = EXCLUDED.published_at
            "#,
        )
        .bind(firm_id)
        .bind(&review.source)
        .bind(&review.external_id)
        .bind(review.rating)
        .bind(&review.title)
        .bind(&review.body)
        .bind(classification.category.as_str())
        .bind(classification.negative)
        .bind(classification.confidence)
        .bind(review.published_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }

    tx.commit().await?;

    Ok(IngestReviewsResponse {
        received,
        stored,
        negative,
    })
}

/// Latest reviews of a firm, newest first.
pub async fn list_reviews(pool: &DbPool, firm_id: Uuid, limit: i64) -> Result<Vec<Review>, sqlx::Error> {
    sqlx::query_as::<_, Review>(
        "SELECT * FROM reviews WHERE firm_id = $1 ORDER BY published_at DESC LIMIT $2",
    )
    .bind(firm_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Reviews published at or after `since`, oldest first.
pub async fn reviews_since(
    pool: &DbPool,
    firm_id: Uuid,
    since: DateTime<Utc>,
) -> Result<Vec<Review>, sqlx::Error> {
    sqlx::query_as::<_, Review>(
        "SELECT * FROM reviews WHERE firm_id = $1 AND published_at >= $2 ORDER BY published_at",
    )
    .bind(firm_id)
    .bind(since)
    .fetch_all(pool)
    .await
}

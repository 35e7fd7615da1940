//! Review data models.
//!
//! Reviews are collected from external sources (Trustpilot, Reddit, ...) by
//! a scraper and pushed to the admin API, where they are classified before
//! being stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a review record from the database.
///
/// # Database Table
///
/// Maps to the `reviews` table, unique on `(firm_id, source, external_id)`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Review {
    pub id: Uuid,
    pub firm_id: Uuid,
    pub source: String,
    pub external_id: String,
    /// 1-5 stars when the source has ratings
    pub rating: Option<i16>,
    pub title: Option<String>,
    pub body: String,
    /// `ReviewCategory` in snake_case
    pub category: String,
    pub is_negative: bool,
    pub confidence: f32,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// One review in an ingest request.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewInput {
    pub source: String,
    pub external_id: String,
    pub rating: Option<i16>,
    pub title: Option<String>,
    pub body: String,
    pub published_at: DateTime<Utc>,
}

impl ReviewInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.source.trim().is_empty() || self.external_id.trim().is_empty() {
            return Err("Review source and external_id are required".to_string());
        }
        if let Some(rating) = self.rating {
            if !(1..=5).contains(&rating) {
                return Err(format!("Rating {} is outside 1-5", rating));
            }
        }
        if self.body.trim().is_empty() {
            return Err(format!("Review {} has an empty body", self.external_id));
        }
        Ok(())
    }
}

/// Request body for `POST /api/v1/admin/firms/{slug}/reviews`.
#[derive(Debug, Deserialize)]
pub struct IngestReviewsRequest {
    pub reviews: Vec<ReviewInput>,
}

/// Result of a review ingest batch.
#[derive(Debug, Serialize)]
pub struct IngestReviewsResponse {
    pub received: usize,
    pub stored: u64,
    pub negative: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(rating: Option<i16>, body: &str) -> ReviewInput {
        ReviewInput {
            source: "trustpilot".to_string(),
            external_id: "r-1".to_string(),
            rating,
            title: None,
            body: body.to_string(),
            published_at: Utc::now(),
        }
    }

    #[test]
    fn validates_rating_range_and_body() {
        assert!(input(Some(5), "great").validate().is_ok());
        assert!(input(None, "great").validate().is_ok());
        assert!(input(Some(0), "great").validate().is_err());
        assert!(input(Some(6), "great").validate().is_err());
        assert!(input(Some(3), "   ").validate().is_err());
    }
}

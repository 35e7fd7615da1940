//! Incident detection.
//!
//! Three detectors run over a firm's recent data:
//! - review spikes: many negative reviews of one category inside the window
//! - payout pause: no payout for much longer than the firm's usual cadence
//! - volume drop: this week's payout volume far below the previous weeks
//!
//! Detectors are pure functions; `detect_for_firm` loads their inputs,
//! stores new incidents and notifies alert webhooks.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        firm::Firm,
        incident::{DetectedIncident, DetectionReport, Incident, IncidentKind, Severity},
        payout::PayoutStats,
        review::Review,
    },
    services::{
        classifier::ReviewCategory, firm_service, review_service, sync_service, webhook_service,
    },
    state::AppState,
};

/// Minimum payout days in the last 30 before a pause can be judged.
const PAUSE_MIN_ACTIVE_DAYS: usize = 5;
/// A pause is flagged after this many times the mean gap between payout days.
const PAUSE_GAP_FACTOR: f64 = 3.0;
const PAUSE_MIN_DAYS: f64 = 3.0;
/// This week's volume below this share of the prior weekly average is a drop.
const VOLUME_DROP_RATIO: f64 = 0.4;

/// Negative reviews grouped by category inside the trailing window.
///
/// `window_start` is the Monday of the ISO week of `now`, so an ongoing spike
/// yields one incident per category per week however the window slides.
pub fn detect_review_spikes(
    reviews: &[Review],
    now: DateTime<Utc>,
    window_days: i64,
    threshold: usize,
) -> Vec<DetectedIncident> {
    let since = now - Duration::days(window_days);
    let mut clusters: BTreeMap<&str, Vec<&Review>> = BTreeMap::new();

    for review in reviews {
        if review.is_negative && review.published_at >= since && review.published_at <= now {
            clusters.entry(review.category.as_str()).or_default().push(review);
        }
    }

    clusters
        .into_iter()
        .filter(|(_, cluster)| cluster.len() >= threshold.max(1))
        .filter_map(|(category, cluster)| {
            let first = cluster.iter().map(|r| r.published_at).min()?;
            let last = cluster.iter().map(|r| r.published_at).max()?;
            let label = ReviewCategory::parse(category)
                .map(|c| c.as_str().replace('_', " "))
                .unwrap_or_else(|| category.to_string());

            Some(DetectedIncident {
                kind: IncidentKind::ReviewSpike,
                qualifier: Some(category.to_string()),
                severity: if cluster.len() >= threshold * 2 {
                    Severity::High
                } else {
                    Severity::Medium
                },
                window_start: week_start(now.date_naive()),
                summary: format!(
                    "{} negative reviews about {} in the last {} days",
                    cluster.len(),
                    label,
                    window_days
                ),
                evidence: json!({
                    "category": category,
                    "count": cluster.len(),
                    "first_review_at": first,
                    "last_review_at": last,
                    "review_ids": cluster.iter().map(|r| r.id).collect::<Vec<_>>(),
                }),
            })
        })
        .collect()
}

/// Flag a firm that has stopped paying compared to its recent cadence.
pub fn detect_payout_pause(stats: &PayoutStats, now: DateTime<Utc>) -> Option<DetectedIncident> {
    let today = now.date_naive();
    let recent: Vec<NaiveDate> = stats
        .daily
        .iter()
        .map(|bucket| bucket.date)
        .filter(|date| *date > today - Duration::days(30) && *date <= today)
        .collect();

    if recent.len() < PAUSE_MIN_ACTIVE_DAYS {
        return None;
    }

    let span = (recent[recent.len() - 1] - recent[0]).num_days() as f64;
    let mean_gap = span / (recent.len() - 1) as f64;
    let limit = PAUSE_MIN_DAYS.max(PAUSE_GAP_FACTOR * mean_gap);

    let last_payout = stats.last_payout_at?;
    let days_since = (now - last_payout).num_hours() as f64 / 24.0;
    if days_since <= limit {
        return None;
    }

    Some(DetectedIncident {
        kind: IncidentKind::PayoutPause,
        qualifier: None,
        severity: if days_since > limit * 2.0 {
            Severity::High
        } else {
            Severity::Medium
        },
        window_start: last_payout.date_naive(),
        summary: format!(
            "No payouts for {:.1} days; usual gap is {:.1} days",
            days_since, mean_gap
        ),
        evidence: json!({
            "last_payout_at": last_payout,
            "days_since_last_payout": days_since,
            "mean_gap_days": mean_gap,
            "active_days_last_30": recent.len(),
        }),
    })
}

/// Compare the last 7 days of volume with the weekly average of the 21 days
/// before them. Incidents are keyed by the ISO week of `now`.
pub fn detect_volume_drop(stats: &PayoutStats, now: DateTime<Utc>) -> Option<DetectedIncident> {
    let today = now.date_naive();
    let week_start = today - Duration::days(7);
    let baseline_start = today - Duration::days(28);

    let mut this_week = 0i64;
    let mut baseline = 0i64;
    for bucket in &stats.daily {
        if bucket.date > week_start && bucket.date <= today {
            this_week += bucket.total_cents;
        } else if bucket.date > baseline_start && bucket.date <= week_start {
            baseline += bucket.total_cents;
        }
    }

    let weekly_baseline = baseline as f64 / 3.0;
    if weekly_baseline <= 0.0 || (this_week as f64) >= weekly_baseline * VOLUME_DROP_RATIO {
        return None;
    }

    let ratio = this_week as f64 / weekly_baseline;
    Some(DetectedIncident {
        kind: IncidentKind::VolumeDrop,
        qualifier: None,
        severity: if this_week == 0 {
            Severity::High
        } else {
            Severity::Medium
        },
        window_start: self::week_start(today),
        summary: format!(
            "Payout volume over the last 7 days is {:.0}% of the prior weekly average",
            ratio * 100.0
        ),
        evidence: json!({
            "last_7d_cents": this_week,
            "weekly_baseline_cents": weekly_baseline.round() as i64,
        }),
    })
}

/// Monday of the ISO week containing `date`.
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Run every detector for one firm, store new incidents and notify
/// subscribers about them.
pub async fn detect_for_firm(state: &AppState, firm: &Firm) -> Result<DetectionReport, AppError> {
    let now = Utc::now();
    let window_days = state.config.incident_window_days;

    let reviews =
        review_service::reviews_since(&state.pool, firm.id, now - Duration::days(window_days))
            .await?;
    let stats = sync_service::get_stats(&state.pool, firm.id).await?;

    let mut detected = detect_review_spikes(
        &reviews,
        now,
        window_days,
        state.config.incident_review_threshold,
    );
    detected.extend(detect_payout_pause(&stats, now));
    detected.extend(detect_volume_drop(&stats, now));

    let mut new_incidents = Vec::new();
    for incident in &detected {
        if let Some(stored) = insert_incident(&state.pool, firm.id, incident).await? {
            tracing::warn!("New incident for {}: {}", firm.slug, stored.summary);
            new_incidents.push(stored);
        }
    }

    for incident in &new_incidents {
        if let Err(e) = webhook_service::notify_incident_webhooks(&state.pool, firm, incident).await {
            tracing::error!("Failed to notify webhooks for incident {}: {}", incident.id, e);
        }
    }

    Ok(DetectionReport {
        firm_slug: firm.slug.clone(),
        detected: detected.len(),
        new_incidents,
    })
}

/// Run detection for every active firm, logging per-firm failures.
pub async fn detect_all(state: &AppState) -> Result<Vec<DetectionReport>, AppError> {
    let firms = firm_service::list_active_firms(&state.pool).await?;
    let mut reports = Vec::with_capacity(firms.len());

    for firm in &firms {
        match detect_for_firm(state, firm).await {
            Ok(report) => reports.push(report),
            Err(err) => tracing::error!("Incident detection failed for {}: {}", firm.slug, err),
        }
    }

    Ok(reports)
}

/// Insert an incident unless one with the same kind and window exists.
///
/// Returns the stored row only when it is new.
async fn insert_incident(
    pool: &DbPool,
    firm_id: Uuid,
    incident: &DetectedIncident,
) -> Result<Option<Incident>, sqlx::Error> {
    sqlx::query_as::<_, Incident>(
        r#"
        INSERT INTO incidents (firm_id, kind, severity, window_start, summary, evidence)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (firm_id, kind, window_start) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(firm_id)
    .bind(incident.stored_kind())
    .bind(incident.severity.as_str())
    .bind(incident.window_start)
    .bind(&incident.summary)
    .bind(&incident.evidence)
    .fetch_optional(pool)
    .await
}

/// Latest incidents of a firm, newest first.
pub async fn list_incidents(pool: &DbPool, firm_id: Uuid, limit: i64) -> Result<Vec<Incident>, sqlx::Error> {
    sqlx::query_as::<_, Incident>(
        "SELECT * FROM incidents WHERE firm_id = $1 ORDER BY detected_at DESC LIMIT $2",
    )
    .bind(firm_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payout::DailyBucket;
    use crate::services::pipeline::compute_stats;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        // a Wednesday
        Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap()
    }

    fn review(category: &str, negative: bool, days_ago: i64) -> Review {
        Review {
            id: Uuid::new_v4(),
            firm_id: Uuid::nil(),
            source: "trustpilot".to_string(),
            external_id: Uuid::new_v4().to_string(),
            rating: Some(1),
            title: None,
            body: "text".to_string(),
            category: category.to_string(),
            is_negative: negative,
            confidence: 0.8,
            published_at: now() - Duration::days(days_ago),
            created_at: now(),
        }
    }

    fn stats_with_days(days: &[(i64, i64)]) -> PayoutStats {
        let mut stats = compute_stats(&[], now());
        stats.daily = days
            .iter()
            .map(|(days_ago, cents)| DailyBucket {
                date: now().date_naive() - Duration::days(*days_ago),
                total_cents: *cents,
                count: 1,
            })
            .collect();
        stats.daily.sort_by_key(|b| b.date);
        stats.last_payout_at = days
            .iter()
            .map(|(days_ago, _)| now() - Duration::days(*days_ago))
            .max();
        stats
    }

    #[test]
    fn review_spike_needs_threshold_inside_window() {
        let reviews = vec![
            review("payout_denied", true, 1),
            review("payout_denied", true, 2),
            review("payout_denied", true, 6),
            // outside the window
            review("payout_denied", true, 20),
            // not negative
            review("positive", false, 1),
            review("support_issue", true, 1),
        ];

        let incidents = detect_review_spikes(&reviews, now(), 7, 3);

        assert_eq!(incidents.len(), 1);
        let incident = &incidents[0];
        assert_eq!(incident.stored_kind(), "review_spike:payout_denied");
        assert_eq!(incident.severity, Severity::Medium);
        assert_eq!(
            incident.window_start,
            NaiveDate::from_ymd_opt(2024, 5, 13).unwrap()
        );
        assert_eq!(incident.evidence["count"], 3);
    }

    #[test]
    fn ongoing_review_spike_keeps_its_key_within_the_week() {
        // reviews every day; the oldest one leaves the window each day
        let reviews: Vec<Review> = (0..10).map(|d| review("payout_denied", true, d)).collect();

        let keys: Vec<(String, NaiveDate)> = (0..3)
            .map(|days_later| {
                let at = now() + Duration::days(days_later);
                let incidents = detect_review_spikes(&reviews, at, 7, 3);
                assert_eq!(incidents.len(), 1);
                (incidents[0].stored_kind(), incidents[0].window_start)
            })
            .collect();

        assert!(keys.iter().all(|k| *k == keys[0]));

        // the following Monday starts a new key
        let next_week = Utc.with_ymd_and_hms(2024, 5, 20, 9, 0, 0).unwrap();
        let incidents = detect_review_spikes(&reviews, next_week, 7, 3);
        assert_eq!(
            incidents[0].window_start,
            NaiveDate::from_ymd_opt(2024, 5, 20).unwrap()
        );
    }

    #[test]
    fn large_review_spike_is_high_severity() {
        let reviews: Vec<Review> = (0..6).map(|d| review("payout_delayed", true, d)).collect();
        let incidents = detect_review_spikes(&reviews, now(), 7, 3);
        assert_eq!(incidents[0].severity, Severity::High);
    }

    #[test]
    fn pause_flagged_when_gap_exceeds_cadence() {
        // paid daily from 20 to 10 days ago, nothing since
        let days: Vec<(i64, i64)> = (10..=20).map(|d| (d, 100_000)).collect();
        let incident = detect_payout_pause(&stats_with_days(&days), now()).unwrap();

        assert_eq!(incident.kind, IncidentKind::PayoutPause);
        assert_eq!(incident.severity, Severity::High);
        assert_eq!(incident.window_start, (now() - Duration::days(10)).date_naive());
    }

    #[test]
    fn no_pause_for_regular_payer_or_sparse_history() {
        let days: Vec<(i64, i64)> = (0..=20).map(|d| (d, 100_000)).collect();
        assert!(detect_payout_pause(&stats_with_days(&days), now()).is_none());

        let sparse = [(15, 100_000), (25, 100_000)];
        assert!(detect_payout_pause(&stats_with_days(&sparse), now()).is_none());
    }

    #[test]
    fn volume_drop_against_prior_weeks() {
        // 3 prior weeks at 700k per week, 100k this week
        let mut days: Vec<(i64, i64)> = (7..28).map(|d| (d, 100_000)).collect();
        days.push((1, 100_000));

        let incident = detect_volume_drop(&stats_with_days(&days), now()).unwrap();
        assert_eq!(incident.kind, IncidentKind::VolumeDrop);
        assert_eq!(incident.severity, Severity::Medium);
        assert_eq!(
            incident.window_start,
            NaiveDate::from_ymd_opt(2024, 5, 13).unwrap()
        );
        assert_eq!(incident.evidence["weekly_baseline_cents"], 700_000);
    }

    #[test]
    fn no_volume_drop_without_baseline_or_when_steady() {
        let fresh = [(1, 100_000), (2, 100_000)];
        assert!(detect_volume_drop(&stats_with_days(&fresh), now()).is_none());

        let steady: Vec<(i64, i64)> = (0..28).map(|d| (d, 100_000)).collect();
        assert!(detect_volume_drop(&stats_with_days(&steady), now()).is_none());
    }
}

//! Incident models.
//!
//! An incident is a detected anomaly in a firm's behaviour: a spike of
//! negative reviews, a pause in payouts, or a drop in payout volume.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    ReviewSpike,
    PayoutPause,
    VolumeDrop,
}

impl IncidentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentKind::ReviewSpike => "review_spike",
            IncidentKind::PayoutPause => "payout_pause",
            IncidentKind::VolumeDrop => "volume_drop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// Incident produced by a detector, before it is persisted.
///
/// `window_start` together with the kind identifies the incident, so running
/// detection twice over the same data does not create duplicates. For review
/// spikes the category is folded into the kind string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedIncident {
    pub kind: IncidentKind,
    /// Extra discriminator appended to the stored kind (e.g. review category)
    pub qualifier: Option<String>,
    pub severity: Severity,
    pub window_start: NaiveDate,
    pub summary: String,
    pub evidence: serde_json::Value,
}

impl DetectedIncident {
    /// Value stored in `incidents.kind`.
    pub fn stored_kind(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}:{}", self.kind.as_str(), q),
            None => self.kind.as_str().to_string(),
        }
    }
}

/// Represents an incident record from the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Incident {
    pub id: Uuid,
    pub firm_id: Uuid,
    pub kind: String,
    pub severity: String,
    pub window_start: NaiveDate,
    pub summary: String,
    pub evidence: serde_json::Value,
    pub detected_at: DateTime<Utc>,
}

/// Result of one detection run for a firm.
#[derive(Debug, Serialize)]
pub struct DetectionReport {
    pub firm_slug: String,
    pub detected: usize,
    pub new_incidents: Vec<Incident>,
}

//! Webhook models for alert endpoint registration and event delivery.
//!
//! # Webhook Flow
//!
//! 1. A subscriber registers an endpoint via `POST /api/v1/webhooks`,
//!    optionally scoped to one firm
//! 2. System generates a secret for HMAC signature verification
//! 3. When incident detection finds a new incident, the system sends a
//!    signed `incident.detected` event
//! 4. The subscriber verifies the signature using the secret

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::incident::Incident;

/// Webhook endpoint registered by an API key holder.
///
/// # Secret Storage
///
/// The `secret` is stored in plaintext (required for HMAC generation)
/// but never returned in list operations.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub api_key_id: Uuid,
    /// `None` subscribes to incidents of every firm
    pub firm_id: Option<Uuid>,
    pub url: String,
    pub secret: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Request to register a new webhook endpoint.
///
/// ```json
/// {
///   "url": "https://example.com/webhook",
///   "firm_slug": "alpha-funding"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct WebhookEndpointRequest {
    pub url: String,
    pub firm_slug: Option<String>,
}

/// Response when registering or listing webhook endpoints.
///
/// The `secret` field is ONLY included when creating a new endpoint.
#[derive(Debug, Serialize)]
pub struct WebhookEndpointResponse {
    pub id: Uuid,
    pub url: String,
    pub firm_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<WebhookEndpoint> for WebhookEndpointResponse {
    fn from(endpoint: WebhookEndpoint) -> Self {
        Self {
            id: endpoint.id,
            url: endpoint.url,
            firm_id: endpoint.firm_id,
            secret: None,
            is_active: endpoint.is_active,
            created_at: endpoint.created_at,
        }
    }
}

impl WebhookEndpointResponse {
    /// Create response with secret included (only for registration).
    pub fn with_secret(mut self, secret: String) -> Self {
        self.secret = Some(secret);
        self
    }
}

/// Delivery attempt to be recorded in `webhook_events`.
#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub id: Uuid,
    pub webhook_endpoint_id: Uuid,
    pub incident_id: Uuid,
    pub payload: serde_json::Value,
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
}

/// Webhook payload sent to the registered endpoint.
///
/// ```json
/// {
///   "event_type": "incident.detected",
///   "event_id": "550e8400-e29b-41d4-a716-446655440000",
///   "created_at": "2025-01-15T10:30:00Z",
///   "data": {
///     "firm_slug": "alpha-funding",
///     "incident": { "kind": "payout_pause", "severity": "high", ... }
///   }
/// }
/// ```
///
/// # Signature Verification
///
/// The request carries `X-Webhook-Signature: sha256=<hex_encoded_hmac>`,
/// computed as HMAC-SHA256(secret, json_body).
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event_type: String,
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub data: WebhookData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookData {
    pub firm_slug: String,
    pub incident: IncidentWebhookData,
}

/// Subset of the incident sent to subscribers.
#[derive(Debug, Serialize, Deserialize)]
pub struct IncidentWebhookData {
    pub id: Uuid,
    pub kind: String,
    pub severity: String,
    pub window_start: chrono::NaiveDate,
    pub summary: String,
    pub detected_at: DateTime<Utc>,
}

impl From<&Incident> for IncidentWebhookData {
    fn from(incident: &Incident) -> Self {
        Self {
            id: incident.id,
            kind: incident.kind.clone(),
            severity: incident.severity.clone(),
            window_start: incident.window_start,
            summary: incident.summary.clone(),
            detected_at: incident.detected_at,
        }
    }
}

impl WebhookPayload {
    pub fn new(event_id: Uuid, firm_slug: &str, incident: &Incident) -> Self {
        Self {
            event_type: "incident.detected".to_string(),
            event_id,
            created_at: Utc::now(),
            data: WebhookData {
                firm_slug: firm_slug.to_string(),
                incident: incident.into(),
            },
        }
    }
}

//! Webhook service for alert endpoints and incident delivery.
//!
//! This module handles webhook endpoint registration, event delivery,
//! and HMAC signature generation for secure webhook verification.

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::firm::Firm;
use crate::models::incident::Incident;
use crate::models::webhook::{
    NewWebhookEvent, WebhookEndpoint, WebhookEndpointRequest, WebhookEndpointResponse,
    WebhookPayload,
};
use crate::services::firm_service;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Create a new webhook endpoint.
///
/// # Process
///
/// 1. Validate URL format
/// 2. Resolve the optional firm scope
/// 3. Generate cryptographically secure secret (32 bytes)
/// 4. Store endpoint and return it with the secret (only shown once)
pub async fn create_webhook_endpoint(
    pool: &DbPool,
    api_key_id: Uuid,
    request: WebhookEndpointRequest,
) -> Result<WebhookEndpointResponse, AppError> {
    validate_webhook_url(&request.url)?;

    let firm_id = match request.firm_slug.as_deref() {
        Some(slug) => Some(firm_service::get_active_firm(pool, slug).await?.id),
        None => None,
    };

    let secret = generate_secret();

    let endpoint = sqlx::query_as::<_, WebhookEndpoint>(
        r#"
        INSERT INTO webhook_endpoints (api_key_id, firm_id, url, secret)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(api_key_id)
    .bind(firm_id)
    .bind(&request.url)
    .bind(&secret)
    .fetch_one(pool)
    .await?;

    Ok(WebhookEndpointResponse::from(endpoint).with_secret(secret))
}

/// List active webhook endpoints of an API key. Secrets are not returned.
pub async fn list_webhook_endpoints(
    pool: &DbPool,
    api_key_id: Uuid,
) -> Result<Vec<WebhookEndpointResponse>, AppError> {
    let endpoints = sqlx::query_as::<_, WebhookEndpoint>(
        "SELECT * FROM webhook_endpoints WHERE api_key_id = $1 AND is_active = true ORDER BY created_at DESC",
    )
    .bind(api_key_id)
    .fetch_all(pool)
    .await?;

    Ok(endpoints.into_iter().map(|e| e.into()).collect())
}

/// Delete a webhook endpoint (soft delete, event history is kept).
pub async fn delete_webhook_endpoint(
    pool: &DbPool,
    api_key_id: Uuid,
    endpoint_id: Uuid,
) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE webhook_endpoints SET is_active = false WHERE id = $1 AND api_key_id = $2 AND is_active = true",
    )
    .bind(endpoint_id)
    .bind(api_key_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::WebhookNotFound);
    }

    Ok(())
}

/// Send an incident to every active endpoint subscribed to the firm,
/// including endpoints without a firm scope.
///
/// Individual delivery failures are logged and do not stop the others.
pub async fn notify_incident_webhooks(
    pool: &DbPool,
    firm: &Firm,
    incident: &Incident,
) -> Result<(), AppError> {
    let endpoints = sqlx::query_as::<_, WebhookEndpoint>(
        "SELECT * FROM webhook_endpoints WHERE is_active = true AND (firm_id IS NULL OR firm_id = $1)",
    )
    .bind(firm.id)
    .fetch_all(pool)
    .await?;

    if endpoints.is_empty() {
        return Ok(());
    }

    // 5 seconds per webhook so a slow subscriber cannot stall detection
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .map_err(|e| AppError::InvalidRequest(format!("HTTP client error: {}", e)))?;

    for endpoint in endpoints {
        if let Err(e) = send_webhook(pool, &client, &endpoint, &firm.slug, incident).await {
            tracing::error!("Failed to send webhook to {}: {:?}", endpoint.url, e);
        }
    }

    Ok(())
}

/// Send a single webhook with HMAC signature and record the attempt.
///
/// # Headers Sent
///
/// - `Content-Type: application/json`
/// - `X-Webhook-Signature: sha256=<hex>`
/// - `X-Webhook-Event-Id: <uuid>`
async fn send_webhook(
    pool: &DbPool,
    client: &reqwest::Client,
    endpoint: &WebhookEndpoint,
    firm_slug: &str,
    incident: &Incident,
) -> Result<(), AppError> {
    let event_id = Uuid::new_v4();

    let payload = WebhookPayload::new(event_id, firm_slug, incident);
    let payload_value = serde_json::to_value(&payload)
        .map_err(|e| AppError::InvalidRequest(format!("Failed to serialize payload: {}", e)))?;
    let payload_json = payload_value.to_string();

    let signature = generate_signature(&endpoint.secret, &payload_json);

    let response = client
        .post(&endpoint.url)
        .header("Content-Type", "application/json")
        .header("X-Webhook-Signature", &signature)
        .header("X-Webhook-Event-Id", event_id.to_string())
        .body(payload_json)
        .send()
        .await;

    let (status, body) = match response {
        Ok(resp) => {
            let status = resp.status().as_u16() as i32;
            let body = resp.text().await.ok();
            (Some(status), body)
        }
        Err(e) => {
            let error_msg = format!("Request failed: {}", e);
            tracing::error!("{}", error_msg);
            (None, Some(error_msg))
        }
    };

    let event = NewWebhookEvent {
        id: event_id,
        webhook_endpoint_id: endpoint.id,
        incident_id: incident.id,
        payload: payload_value,
        response_status: status,
        response_body: body,
    };

    sqlx::query(
        r#"
        INSERT INTO webhook_events (
            id,
            webhook_endpoint_id,
            incident_id,
            payload,
            response_status,
            response_body
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(event.id)
    .bind(event.webhook_endpoint_id)
    .bind(event.incident_id)
    .bind(event.payload)
    .bind(event.response_status)
    .bind(event.response_body)
    .execute(pool)
    .await?;

    Ok(())
}

/// Generate HMAC-SHA256 signature for webhook payload.
///
/// # Format
///
/// `sha256=<hex_encoded_hmac>`
fn generate_signature(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(payload.as_bytes());
    let result = mac.finalize();
    format!("sha256={}", hex::encode(result.into_bytes()))
}

/// 64 hex characters (32 random bytes)
fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Validate webhook URL format.
///
/// # Rules
///
/// - Must be valid URL
/// - Must be HTTPS (HTTP localhost allowed for development)
/// - Maximum 2048 characters
fn validate_webhook_url(url: &str) -> Result<(), AppError> {
    if url.len() > 2048 {
        return Err(AppError::InvalidWebhookUrl(
            "URL exceeds 2048 characters".to_string(),
        ));
    }

    let parsed = url::Url::parse(url)
        .map_err(|_| AppError::InvalidWebhookUrl("Invalid URL format".to_string()))?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" => {
            if matches!(
                parsed.host_str(),
                Some("localhost") | Some("127.0.0.1") | Some("0.0.0.0")
            ) {
                Ok(())
            } else {
                Err(AppError::InvalidWebhookUrl(
                    "HTTP is only allowed for localhost. Use HTTPS for production.".to_string(),
                ))
            }
        }
        _ => Err(AppError::InvalidWebhookUrl(
            "URL must use HTTP or HTTPS".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_and_prefixed() {
        let a = generate_signature("secret", r#"{"event_type":"incident.detected"}"#);
        let b = generate_signature("secret", r#"{"event_type":"incident.detected"}"#);
        let c = generate_signature("other", r#"{"event_type":"incident.detected"}"#);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("sha256="));
        assert_eq!(a.len(), "sha256=".len() + 64);
    }

    #[test]
    fn secrets_are_random_hex() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn url_rules() {
        assert!(validate_webhook_url("https://alerts.example.com/hook").is_ok());
        assert!(validate_webhook_url("http://localhost:8080/hook").is_ok());
        assert!(validate_webhook_url("http://alerts.example.com/hook").is_err());
        assert!(validate_webhook_url("ftp://alerts.example.com").is_err());
        assert!(validate_webhook_url("not a url").is_err());

        let long = format!("https://example.com/{}", "a".repeat(2048));
        assert!(validate_webhook_url(&long).is_err());
    }
}

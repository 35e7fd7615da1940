//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Calls into the services layer
//! 3. Returns HTTP response (JSON, status code)

/// Admin-only firm registration, sync triggers, review ingest, detection
pub mod admin;
/// Public read-only firm endpoints
pub mod firms;
/// Service health
pub mod health;
/// Alert webhook endpoint management
pub mod webhooks;

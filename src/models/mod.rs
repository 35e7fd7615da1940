//! Data models representing database entities and API payloads.

/// API key authentication model
pub mod api_key;
/// Firms and their payout wallets
pub mod firm;
/// Detected incidents
pub mod incident;
/// Explorer transfers, payouts and aggregated statistics
pub mod payout;
/// Classified reviews
pub mod review;
/// Alert webhook endpoints and payloads
pub mod webhook;

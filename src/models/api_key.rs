//! API Key model for authentication.
//!
//! API keys protect the admin and webhook routes. They are stored in the
//! database as SHA-256 hashes.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table with columns:
/// - `id`: Unique identifier (UUID)
/// - `key_hash`: SHA-256 hash of the actual API key
/// - `owner_name`: Who the key was issued to
/// - `is_admin`: Whether the key may mutate firm data and trigger syncs
/// - `is_active`: Whether the key is currently valid
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,

    /// SHA-256 hash of the actual API key (64 hex characters)
    pub key_hash: String,

    pub owner_name: String,

    /// Non-admin keys may only manage their own alert webhooks.
    pub is_admin: bool,

    pub created_at: DateTime<Utc>,

    /// Inactive keys are rejected during authentication.
    pub is_active: bool,
}

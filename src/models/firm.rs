//! Firm data models and API request/response types.
//!
//! A firm is a prop-trading company whose payouts are tracked through one or
//! more on-chain wallets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a firm record from the database.
///
/// # Database Table
///
/// Maps to the `firms` table. `slug` is the public identifier used in URLs
/// and snapshot file names.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Firm {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub website: Option<String>,
    /// Inactive firms are hidden from the public API and skipped by sync
    pub is_active: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A payout wallet owned by a firm.
///
/// Addresses are stored lower-cased so explorer results compare directly.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct FirmWallet {
    pub id: Uuid,
    pub firm_id: Uuid,
    /// EVM chain id (1 = Ethereum, 42161 = Arbitrum, ...)
    pub chain_id: i64,
    pub address: String,
    /// Highest block already read from the explorer. The next sync starts
    /// here again so a block split across pages is never skipped.
    pub last_scanned_block: i64,
    pub created_at: DateTime<Utc>,
}

/// Wallet entry in a create-firm request.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletInput {
    pub chain_id: i64,
    pub address: String,
}

/// Request body for registering a firm.
///
/// # JSON Example
///
/// ```json
/// {
///   "slug": "alpha-funding",
///   "name": "Alpha Funding",
///   "website": "https://alpha.example",
///   "wallets": [{ "chain_id": 1, "address": "0x1111111111111111111111111111111111111111" }]
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateFirmRequest {
    pub slug: String,
    pub name: String,
    pub website: Option<String>,
    #[serde(default)]
    pub wallets: Vec<WalletInput>,
}

impl CreateFirmRequest {
    /// Check field formats and normalise wallet addresses to lower case.
    pub fn validate(mut self) -> Result<Self, String> {
        if self.slug.is_empty()
            || self.slug.len() > 64
            || !self
                .slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err("Slug must be 1-64 characters of a-z, 0-9 or '-'".to_string());
        }

        if self.name.trim().is_empty() {
            return Err("Name must not be empty".to_string());
        }

        for wallet in &mut self.wallets {
            if wallet.chain_id <= 0 {
                return Err(format!("Invalid chain id {}", wallet.chain_id));
            }
            if !is_evm_address(&wallet.address) {
                return Err(format!("Invalid wallet address {}", wallet.address));
            }
            wallet.address = wallet.address.to_lowercase();
        }

        Ok(self)
    }
}

/// `0x` followed by 40 hex digits.
pub fn is_evm_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Wallet as returned to clients.
#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub chain_id: i64,
    pub address: String,
}

impl From<FirmWallet> for WalletResponse {
    fn from(wallet: FirmWallet) -> Self {
        Self {
            chain_id: wallet.chain_id,
            address: wallet.address,
        }
    }
}

/// Response body for firm endpoints.
#[derive(Debug, Serialize)]
pub struct FirmResponse {
    pub slug: String,
    pub name: String,
    pub website: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub wallets: Vec<WalletResponse>,
    pub created_at: DateTime<Utc>,
}

impl FirmResponse {
    pub fn new(firm: Firm, wallets: Vec<FirmWallet>) -> Self {
        Self {
            slug: firm.slug,
            name: firm.name,
            website: firm.website,
            last_synced_at: firm.last_synced_at,
            wallets: wallets.into_iter().map(Into::into).collect(),
            created_at: firm.created_at,
        }
    }
}

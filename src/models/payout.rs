//! Payout data models.
//!
//! This module defines:
//! - `TokenTransfer`: raw ERC-20 transfer row returned by the block explorer
//! - `Payout`: an outgoing transfer from a firm wallet that counts as a payout
//! - `PayoutStats`: aggregated statistics persisted per firm
//!
//! # Amount Storage
//!
//! Amounts are stored as `i64` cents, never floats. Stablecoin payouts are
//! treated as 1:1 with USD.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One token transfer as returned by the explorer's `tokentx` action.
///
/// The explorer encodes every numeric field as a decimal string.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    pub block_number: String,
    pub time_stamp: String,
    pub hash: String,
    pub from: String,
    pub to: String,
    /// Raw token amount in the token's smallest unit
    pub value: String,
    pub token_symbol: String,
    pub token_decimal: String,
    #[serde(default)]
    pub contract_address: String,
    /// Present on explorers that expose log positions; used to tell apart
    /// identical transfers inside one batch transaction.
    #[serde(default)]
    pub log_index: Option<String>,
    #[serde(default)]
    pub transaction_index: Option<String>,
}

/// An outgoing stablecoin transfer from a firm wallet.
///
/// # Database Table
///
/// Maps to the `payouts` table. `transfer_key` is unique per firm so
/// re-syncing the same block range never double counts.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Payout {
    /// `hash:recipient:value:position`, stable across syncs
    pub transfer_key: String,
    pub tx_hash: String,
    pub block_number: i64,
    pub recipient: String,
    pub token_symbol: String,
    pub amount_cents: i64,
    pub paid_at: DateTime<Utc>,
}

/// Query parameters for payout listing.
#[derive(Debug, Deserialize)]
pub struct PayoutQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PayoutQuery {
    pub const MAX_LIMIT: i64 = 500;

    /// Clamp to `1..=MAX_LIMIT` (default 50) and a non-negative offset.
    pub fn bounds(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(50).clamp(1, Self::MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

/// Page of payouts, newest first.
#[derive(Debug, Serialize)]
pub struct PayoutPage {
    pub firm_slug: String,
    pub limit: i64,
    pub offset: i64,
    pub payouts: Vec<Payout>,
}

/// Payout totals for a single UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub total_cents: i64,
    pub count: i64,
}

/// Payout totals for a calendar month, keyed `YYYY-MM`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    pub month: String,
    pub total_cents: i64,
    pub count: i64,
}

/// Aggregated payout statistics for one firm.
///
/// # Database Table
///
/// Maps to `firm_payout_stats`; the bucket lists are stored as JSONB.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct PayoutStats {
    pub total_cents: i64,
    pub payout_count: i64,
    pub largest_cents: i64,
    pub average_cents: i64,
    pub unique_recipients: i64,
    pub last_24h_cents: i64,
    pub last_7d_cents: i64,
    pub last_30d_cents: i64,
    /// Consecutive payout days ending today or yesterday
    pub current_streak_days: i32,
    pub longest_streak_days: i32,
    pub first_payout_at: Option<DateTime<Utc>>,
    pub last_payout_at: Option<DateTime<Utc>>,
    #[sqlx(json)]
    pub daily: Vec<DailyBucket>,
    #[sqlx(json)]
    pub monthly: Vec<MonthlyBucket>,
    pub computed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_deserializes_from_explorer_json() {
        let json = r#"{
            "blockNumber": "19000000",
            "timeStamp": "1704067200",
            "hash": "0xabc",
            "from": "0xFirm",
            "to": "0xTrader",
            "value": "2500000000",
            "tokenName": "USD Coin",
            "tokenSymbol": "USDC",
            "tokenDecimal": "6",
            "contractAddress": "0xa0b8",
            "transactionIndex": "12",
            "confirmations": "100"
        }"#;

        let transfer: TokenTransfer = serde_json::from_str(json).unwrap();
        assert_eq!(transfer.block_number, "19000000");
        assert_eq!(transfer.token_symbol, "USDC");
        assert_eq!(transfer.log_index, None);
        assert_eq!(transfer.transaction_index.as_deref(), Some("12"));
    }

    #[test]
    fn payout_query_bounds_are_clamped() {
        let query = PayoutQuery {
            limit: Some(10_000),
            offset: Some(-5),
        };
        assert_eq!(query.bounds(), (PayoutQuery::MAX_LIMIT, 0));

        let query = PayoutQuery {
            limit: None,
            offset: None,
        };
        assert_eq!(query.bounds(), (50, 0));
    }
}

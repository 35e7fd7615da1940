//! Payout sync - fetch, extract, upsert, aggregate, snapshot.
//!
//! # Process (per firm)
//!
//! 1. For each wallet, read transfers from the explorer starting at the
//!    wallet's last scanned block
//! 2. Extract outgoing payouts and insert them, skipping known transfer keys
//! 3. Advance the wallet's scan cursor
//! 4. Recompute statistics from all stored payouts and upsert them
//! 5. Merge the payouts into the firm's JSON snapshot
//!
//! Database calls in the sync path go through the retry policy so a pool
//! timeout does not abort the run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        firm::{Firm, FirmWallet},
        payout::{Payout, PayoutStats},
    },
    services::{
        explorer::{ExplorerError, ExplorerSource, PageSettings, fetch_all_transfers},
        firm_service,
        pipeline::{PayoutRules, compute_stats, extract_payouts, max_block},
        retry::{RetryPolicy, is_transient_db_error, retry},
        snapshot,
    },
    state::AppState,
};

/// Outcome of syncing one firm.
#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub firm_slug: String,
    pub wallets: usize,
    /// Raw transfers read from the explorer
    pub fetched: usize,
    /// Payouts not seen before
    pub inserted: u64,
    pub total_payouts: i64,
    /// At least one wallet hit the page limit
    pub truncated: bool,
}

#[derive(Debug, Serialize)]
pub struct SyncFailure {
    pub firm_slug: String,
    pub error: String,
}

/// Outcome of syncing every active firm.
#[derive(Debug, Serialize)]
pub struct SyncRunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub synced: Vec<SyncReport>,
    pub failed: Vec<SyncFailure>,
}

/// Sync one firm while holding the sync lock.
///
/// # Errors
///
/// `SyncInProgress` when another run holds the lock.
pub async fn try_sync_firm(state: &AppState, firm: &Firm) -> Result<SyncReport, AppError> {
    let _guard = state
        .sync_lock
        .try_lock()
        .map_err(|_| AppError::SyncInProgress)?;

    sync_firm(state, firm).await
}

/// Sync all active firms while holding the sync lock.
pub async fn try_sync_all(state: &AppState) -> Result<SyncRunSummary, AppError> {
    let _guard = state
        .sync_lock
        .try_lock()
        .map_err(|_| AppError::SyncInProgress)?;

    sync_all(state).await
}

/// Sequentially sync every active firm. A failing firm is logged and
/// reported; the remaining firms still run.
async fn sync_all(state: &AppState) -> Result<SyncRunSummary, AppError> {
    let started_at = Utc::now();
    let policy = state.config.retry_policy();

    let firms = retry(&policy, "list firms", is_transient_db_error, || {
        firm_service::list_active_firms(&state.pool)
    })
    .await?;

    tracing::info!("Starting payout sync for {} firms", firms.len());

    let mut synced = Vec::new();
    let mut failed = Vec::new();

    for firm in &firms {
        match sync_firm(state, firm).await {
            Ok(report) => synced.push(report),
            Err(err) => {
                tracing::error!("Payout sync failed for {}: {}", firm.slug, err);
                failed.push(SyncFailure {
                    firm_slug: firm.slug.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    let finished_at = Utc::now();
    tracing::info!(
        "Payout sync finished: {} ok, {} failed in {}s",
        synced.len(),
        failed.len(),
        (finished_at - started_at).num_seconds()
    );

    Ok(SyncRunSummary {
        started_at,
        finished_at,
        synced,
        failed,
    })
}

async fn sync_firm(state: &AppState, firm: &Firm) -> Result<SyncReport, AppError> {
    let config = &state.config;
    let pool = &state.pool;
    let policy = config.retry_policy();
    let rules = PayoutRules {
        tokens: config.payout_token_symbols(),
        min_payout_cents: config.min_payout_cents,
    };
    let settings = PageSettings {
        page_size: config.explorer_page_size,
        max_pages: config.explorer_max_pages,
    };

    let wallets = retry(&policy, "load wallets", is_transient_db_error, || {
        firm_service::wallets_for_firm(pool, firm.id)
    })
    .await?;

    let mut report = SyncReport {
        firm_slug: firm.slug.clone(),
        wallets: wallets.len(),
        fetched: 0,
        inserted: 0,
        total_payouts: 0,
        truncated: false,
    };
    let mut scanned_blocks: BTreeMap<i64, i64> = BTreeMap::new();

    for wallet in &wallets {
        let fetch =
            fetch_wallet_payouts(state.explorer.as_ref(), wallet, &settings, &policy, &rules)
                .await?;

        let inserted = retry(&policy, "insert payouts", is_transient_db_error, || {
            insert_payouts(pool, firm.id, wallet.id, &fetch.payouts)
        })
        .await?;

        if let Some(block) = fetch.scanned_block {
            retry(&policy, "advance scan cursor", is_transient_db_error, || {
                advance_scan_cursor(pool, wallet.id, block)
            })
            .await?;
        }

        let cursor = fetch.scanned_block.unwrap_or(0).max(wallet.last_scanned_block);
        let chain_block = scanned_blocks.entry(wallet.chain_id).or_insert(cursor);
        *chain_block = (*chain_block).max(cursor);

        tracing::info!(
            "Synced {} wallet {} (chain {}): {} transfers over {} pages, {} new payouts",
            firm.slug,
            wallet.address,
            wallet.chain_id,
            fetch.fetched,
            fetch.pages,
            inserted
        );

        report.fetched += fetch.fetched;
        report.inserted += inserted;
        report.truncated |= fetch.truncated;
    }

    let payouts = retry(&policy, "load payouts", is_transient_db_error, || {
        load_firm_payouts(pool, firm.id)
    })
    .await?;

    let now = Utc::now();
    let stats = compute_stats(&payouts, now);
    report.total_payouts = stats.payout_count;

    retry(&policy, "store stats", is_transient_db_error, || {
        store_stats(pool, firm.id, &stats)
    })
    .await?;

    let dir = Path::new(&config.snapshot_dir);
    let existing = snapshot::load(dir, &firm.slug).await?;
    let merged = snapshot::reconcile(existing, &firm.slug, payouts, &scanned_blocks, now);
    snapshot::save(dir, &merged).await?;

    Ok(report)
}

/// What one wallet contributed to a sync run.
#[derive(Debug)]
struct WalletFetch {
    payouts: Vec<Payout>,
    fetched: usize,
    pages: u32,
    /// Highest block among the fetched transfers, payout or not
    scanned_block: Option<i64>,
    truncated: bool,
}

/// Read a wallet's transfers from its scan cursor onwards and extract the
/// payouts. The cursor block itself is read again; dedupe on insert absorbs
/// the overlap.
async fn fetch_wallet_payouts(
    explorer: &dyn ExplorerSource,
    wallet: &FirmWallet,
    settings: &PageSettings,
    policy: &RetryPolicy,
    rules: &PayoutRules,
) -> Result<WalletFetch, ExplorerError> {
    let outcome = fetch_all_transfers(
        explorer,
        wallet.chain_id,
        &wallet.address,
        wallet.last_scanned_block,
        settings,
        policy,
    )
    .await?;

    Ok(WalletFetch {
        payouts: extract_payouts(&outcome.transfers, &wallet.address, rules),
        fetched: outcome.transfers.len(),
        pages: outcome.pages,
        scanned_block: max_block(&outcome.transfers),
        truncated: outcome.truncated,
    })
}

/// Insert payouts, ignoring transfer keys the firm already has.
///
/// Returns the number of new rows.
async fn insert_payouts(
    pool: &DbPool,
    firm_id: Uuid,
    wallet_id: Uuid,
    payouts: &[Payout],
) -> Result<u64, sqlx::Error> {
    if payouts.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for payout in payouts {
        inserted += sqlx::query(
            r#"
            INSERT INTO payouts (
                firm_id,
                wallet_id,
                transfer_key,
                tx_hash,
                block_number,
                recipient,
                token_symbol,
                amount_cents,
                paid_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (firm_id, transfer_key) DO NOTHING
            "#,
        )
        .bind(firm_id)
        .bind(wallet_id)
        .bind(&payout.transfer_key)
        .bind(&payout.tx_hash)
        .bind(payout.block_number)
        .bind(&payout.recipient)
        .bind(&payout.token_symbol)
        .bind(payout.amount_cents)
        .bind(payout.paid_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

async fn advance_scan_cursor(pool: &DbPool, wallet_id: Uuid, block: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE firm_wallets SET last_scanned_block = GREATEST(last_scanned_block, $1) WHERE id = $2",
    )
    .bind(block)
    .bind(wallet_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Every stored payout of a firm, oldest first.
pub async fn load_firm_payouts(pool: &DbPool, firm_id: Uuid) -> Result<Vec<Payout>, sqlx::Error> {
    sqlx::query_as::<_, Payout>(
        r#"
        SELECT transfer_key, tx_hash, block_number, recipient, token_symbol, amount_cents, paid_at
        FROM payouts
        WHERE firm_id = $1
        ORDER BY paid_at, transfer_key
        "#,
    )
    .bind(firm_id)
    .fetch_all(pool)
    .await
}

/// One page of a firm's payouts, newest first.
pub async fn list_payouts(
    pool: &DbPool,
    firm_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Payout>, sqlx::Error> {
    sqlx::query_as::<_, Payout>(
        r#"
        SELECT transfer_key, tx_hash, block_number, recipient, token_symbol, amount_cents, paid_at
        FROM payouts
        WHERE firm_id = $1
        ORDER BY paid_at DESC, transfer_key DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(firm_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

async fn store_stats(pool: &DbPool, firm_id: Uuid, stats: &PayoutStats) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO firm_payout_stats (
            firm_id,
            total_cents,
            payout_count,
            largest_cents,
            average_cents,
            unique_recipients,
            last_24h_cents,
            last_7d_cents,
            last_30d_cents,
            current_streak_days,
            longest_streak_days,
            first_payout_at,
            last_payout_at,
            daily,
            monthly,
            computed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ON CONFLICT (firm_id) DO UPDATE SET
            total_cents = EXCLUDED.total_cents,
            payout_count = EXCLUDED.payout_count,
            largest_cents = EXCLUDED.largest_cents,
            average_cents = EXCLUDED.average_cents,
            unique_recipients = EXCLUDED.unique_recipients,
            last_24h_cents = EXCLUDED.last_24h_cents,
            last_7d_cents = EXCLUDED.last_7d_cents,
            last_30d_cents = EXCLUDED.last_30d_cents,
            current_streak_days = EXCLUDED.current_streak_days,
            longest_streak_days = EXCLUDED.longest_streak_days,
            first_payout_at = EXCLUDED.first_payout_at,
            last_payout_at = EXCLUDED.last_payout_at,
            daily = EXCLUDED.daily,
            monthly = EXCLUDED.monthly,
            computed_at = EXCLUDED.computed_at
        "#,
    )
    .bind(firm_id)
    .bind(stats.total_cents)
    .bind(stats.payout_count)
    .bind(stats.largest_cents)
    .bind(stats.average_cents)
    .bind(stats.unique_recipients)
    .bind(stats.last_24h_cents)
    .bind(stats.last_7d_cents)
    .bind(stats.last_30d_cents)
    .bind(stats.current_streak_days)
    .bind(stats.longest_streak_days)
    .bind(stats.first_payout_at)
    .bind(stats.last_payout_at)
    .bind(Json(&stats.daily))
    .bind(Json(&stats.monthly))
    .bind(stats.computed_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE firms SET last_synced_at = $1 WHERE id = $2")
        .bind(stats.computed_at)
        .bind(firm_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await
}

/// Stored statistics, or statistics computed from stored payouts when the
/// firm has not been synced yet.
pub async fn get_stats(pool: &DbPool, firm_id: Uuid) -> Result<PayoutStats, sqlx::Error> {
    let stored = sqlx::query_as::<_, PayoutStats>("SELECT * FROM firm_payout_stats WHERE firm_id = $1")
        .bind(firm_id)
        .fetch_optional(pool)
        .await?;

    match stored {
        Some(stats) => Ok(stats),
        None => {
            let payouts = load_firm_payouts(pool, firm_id).await?;
            Ok(compute_stats(&payouts, Utc::now()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payout::TokenTransfer;
    use crate::services::explorer::TransferQuery;
    use crate::state::offline_state;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const WALLET: &str = "0x00000000000000000000000000000000000000f1";

    fn transfer(block: i64, to: &str, value: &str) -> TokenTransfer {
        TokenTransfer {
            block_number: block.to_string(),
            time_stamp: (1_704_067_200 + block).to_string(),
            hash: format!("0x{:x}", block),
            from: WALLET.to_string(),
            to: to.to_string(),
            value: value.to_string(),
            token_symbol: "USDC".to_string(),
            token_decimal: "6".to_string(),
            contract_address: String::new(),
            log_index: None,
            transaction_index: None,
        }
    }

    /// Serves fixed pages and records every query it receives.
    struct PagedExplorer {
        pages: Vec<Vec<TokenTransfer>>,
        queries: Mutex<Vec<TransferQuery>>,
    }

    impl PagedExplorer {
        fn new(pages: Vec<Vec<TokenTransfer>>) -> Self {
            Self {
                pages,
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExplorerSource for PagedExplorer {
        async fn fetch_token_transfers(
            &self,
            query: &TransferQuery,
        ) -> Result<Vec<TokenTransfer>, ExplorerError> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(self
                .pages
                .get(query.page as usize - 1)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn wallet(chain_id: i64, last_scanned_block: i64) -> FirmWallet {
        FirmWallet {
            id: Uuid::new_v4(),
            firm_id: Uuid::new_v4(),
            chain_id,
            address: WALLET.to_string(),
            last_scanned_block,
            created_at: Utc::now(),
        }
    }

    fn firm() -> Firm {
        Firm {
            id: Uuid::new_v4(),
            slug: "alpha-funding".to_string(),
            name: "Alpha Funding".to_string(),
            website: None,
            is_active: true,
            last_synced_at: None,
            created_at: Utc::now(),
        }
    }

    fn rules() -> PayoutRules {
        PayoutRules {
            tokens: vec!["USDC".to_string()],
            min_payout_cents: 1000,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn wallet_fetch_resumes_at_scan_cursor() {
        let explorer = PagedExplorer::new(vec![vec![
            transfer(250_000_000, "0xaaa", "2500000000"),
            // below the dust threshold, but still advances the cursor
            transfer(250_000_009, "0xbbb", "1"),
        ]]);
        let settings = PageSettings {
            page_size: 10,
            max_pages: 5,
        };

        let fetch = fetch_wallet_payouts(
            &explorer,
            &wallet(42161, 250_000_000),
            &settings,
            &policy(),
            &rules(),
        )
        .await
        .unwrap();

        let queries = explorer.queries.lock().unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].chain_id, 42161);
        assert_eq!(queries[0].start_block, 250_000_000);

        assert_eq!(fetch.fetched, 2);
        assert_eq!(fetch.payouts.len(), 1);
        assert_eq!(fetch.scanned_block, Some(250_000_009));
        assert!(!fetch.truncated);
    }

    #[tokio::test]
    async fn wallet_fetch_reports_truncation_at_page_limit() {
        let explorer = PagedExplorer::new(vec![
            vec![transfer(10, "0xaaa", "2500000000")],
            vec![transfer(11, "0xaaa", "2500000000")],
            vec![transfer(12, "0xaaa", "2500000000")],
        ]);
        let settings = PageSettings {
            page_size: 1,
            max_pages: 2,
        };

        let fetch = fetch_wallet_payouts(&explorer, &wallet(1, 0), &settings, &policy(), &rules())
            .await
            .unwrap();

        assert!(fetch.truncated);
        assert_eq!(fetch.pages, 2);
        assert_eq!(fetch.scanned_block, Some(11));
    }

    #[tokio::test]
    async fn empty_history_leaves_cursor_alone() {
        let explorer = PagedExplorer::new(vec![]);
        let settings = PageSettings {
            page_size: 10,
            max_pages: 5,
        };

        let fetch = fetch_wallet_payouts(&explorer, &wallet(1, 77), &settings, &policy(), &rules())
            .await
            .unwrap();

        assert_eq!(fetch.scanned_block, None);
        assert!(fetch.payouts.is_empty());
    }

    #[tokio::test]
    async fn manual_sync_is_rejected_while_a_run_holds_the_lock() {
        let explorer = Arc::new(PagedExplorer::new(vec![]));
        let state = offline_state(explorer.clone());
        let _running = state.sync_lock.lock().await;

        assert!(matches!(
            try_sync_all(&state).await,
            Err(AppError::SyncInProgress)
        ));
        assert!(matches!(
            try_sync_firm(&state, &firm()).await,
            Err(AppError::SyncInProgress)
        ));
        assert!(explorer.queries.lock().unwrap().is_empty());
    }
}

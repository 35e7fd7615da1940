//! JSON snapshot files of each firm's payout history.
//!
//! Snapshots live at `{SNAPSHOT_DIR}/{slug}.json` and are what static
//! exports and offline reports read. The database stays the source of
//! truth; a snapshot is rebuilt from it on every sync and merged with any
//! entries already on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::payout::Payout;
use crate::services::pipeline::merge_payouts;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persisted payout history for one firm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutSnapshot {
    pub firm_slug: String,
    pub updated_at: DateTime<Utc>,
    /// Highest block read per chain id. Block heights of different chains
    /// are not comparable, so each chain keeps its own entry.
    pub last_blocks: BTreeMap<i64, i64>,
    pub payouts: Vec<Payout>,
}

pub fn snapshot_path(dir: &Path, slug: &str) -> PathBuf {
    dir.join(format!("{}.json", slug))
}

/// Read a firm's snapshot. Returns `None` when no snapshot exists yet.
pub async fn load(dir: &Path, slug: &str) -> Result<Option<PayoutSnapshot>, SnapshotError> {
    match tokio::fs::read(snapshot_path(dir, slug)).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Write a snapshot, replacing the previous file atomically.
pub async fn save(dir: &Path, snapshot: &PayoutSnapshot) -> Result<(), SnapshotError> {
    tokio::fs::create_dir_all(dir).await?;

    let path = snapshot_path(dir, &snapshot.firm_slug);
    let tmp = path.with_extension("json.tmp");

    let bytes = serde_json::to_vec_pretty(snapshot)?;
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &path).await?;

    Ok(())
}

/// Merge freshly loaded payouts into the previous snapshot.
///
/// `scanned` maps chain id to the highest block read this run. Per-chain
/// blocks never move backwards.
pub fn reconcile(
    existing: Option<PayoutSnapshot>,
    firm_slug: &str,
    incoming: Vec<Payout>,
    scanned: &BTreeMap<i64, i64>,
    now: DateTime<Utc>,
) -> PayoutSnapshot {
    let (mut last_blocks, previous) = match existing {
        Some(snapshot) => (snapshot.last_blocks, snapshot.payouts),
        None => (BTreeMap::new(), Vec::new()),
    };

    for (&chain_id, &block) in scanned {
        let entry = last_blocks.entry(chain_id).or_insert(block);
        *entry = (*entry).max(block);
    }

    PayoutSnapshot {
        firm_slug: firm_slug.to_string(),
        updated_at: now,
        last_blocks,
        payouts: merge_payouts(previous, incoming),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn payout(key: &str, block: i64) -> Payout {
        Payout {
            transfer_key: key.to_string(),
            tx_hash: key.to_string(),
            block_number: block,
            recipient: "0xabc".to_string(),
            token_symbol: "USDC".to_string(),
            amount_cents: 12_345,
            paid_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(block),
        }
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("payout-snapshots-{}", Uuid::new_v4()))
    }

    fn blocks(entries: &[(i64, i64)]) -> BTreeMap<i64, i64> {
        entries.iter().copied().collect()
    }

    #[test]
    fn reconcile_merges_and_keeps_highest_block_per_chain() {
        let existing = PayoutSnapshot {
            firm_slug: "alpha".to_string(),
            updated_at: Utc::now(),
            last_blocks: blocks(&[(1, 500), (42161, 250_000_000)]),
            payouts: vec![payout("a", 10)],
        };

        let merged = reconcile(
            Some(existing),
            "alpha",
            vec![payout("a", 10), payout("b", 20)],
            &blocks(&[(1, 300), (8453, 12_000_000)]),
            Utc::now(),
        );

        assert_eq!(merged.payouts.len(), 2);
        assert_eq!(
            merged.last_blocks,
            blocks(&[(1, 500), (8453, 12_000_000), (42161, 250_000_000)])
        );

        let fresh = reconcile(None, "alpha", vec![payout("c", 42)], &blocks(&[(1, 40)]), Utc::now());
        assert_eq!(fresh.last_blocks, blocks(&[(1, 40)]));
    }

    #[tokio::test]
    async fn missing_snapshot_loads_as_none() {
        let dir = temp_dir();
        assert_eq!(load(&dir, "nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_then_load_replaces_file() {
        let dir = temp_dir();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let first = reconcile(None, "alpha", vec![payout("a", 1)], &blocks(&[(1, 1)]), now);
        save(&dir, &first).await.unwrap();

        let second = reconcile(
            Some(first),
            "alpha",
            vec![payout("b", 2)],
            &blocks(&[(1, 2), (10, 7)]),
            now,
        );
        save(&dir, &second).await.unwrap();

        let loaded = load(&dir, "alpha").await.unwrap().unwrap();
        assert_eq!(loaded, second);
        assert!(!snapshot_path(&dir, "alpha").with_extension("json.tmp").exists());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_an_error() {
        let dir = temp_dir();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(snapshot_path(&dir, "alpha"), b"{not json")
            .await
            .unwrap();

        assert!(matches!(load(&dir, "alpha").await, Err(SnapshotError::Json(_))));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}

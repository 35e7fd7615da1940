//! Payout extraction and aggregation.
//!
//! Turns raw explorer transfers into payouts and payouts into statistics.
//! Everything here is pure so the same code serves the sync run, the JSON
//! snapshot and the API.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::payout::{DailyBucket, MonthlyBucket, Payout, PayoutStats, TokenTransfer};

/// Which transfers count as payouts.
#[derive(Debug, Clone)]
pub struct PayoutRules {
    /// Upper-cased token symbols
    pub tokens: Vec<String>,
    pub min_payout_cents: i64,
}

/// Convert a raw token amount to cents, truncating sub-cent precision.
///
/// `raw` is the integer amount in the token's smallest unit, as returned by
/// the explorer. Values that do not fit in `i64` cents are rejected.
pub fn token_amount_to_cents(raw: &str, decimals: u32) -> Result<i64, String> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("invalid token amount {:?}", raw));
    }

    let value: u128 = raw
        .parse()
        .map_err(|_| format!("token amount {} out of range", raw))?;

    let cents = if decimals >= 2 {
        match 10u128.checked_pow(decimals - 2) {
            Some(divisor) => value / divisor,
            None => 0,
        }
    } else {
        value
            .checked_mul(10u128.pow(2 - decimals))
            .ok_or_else(|| format!("token amount {} out of range", raw))?
    };

    i64::try_from(cents).map_err(|_| format!("token amount {} out of range", raw))
}

/// Stable identity of a transfer across syncs.
///
/// A batch payout transaction carries several transfers under one hash, so
/// the recipient, raw value and log position are part of the key.
pub fn transfer_key(transfer: &TokenTransfer) -> String {
    let position = transfer
        .log_index
        .as_deref()
        .or(transfer.transaction_index.as_deref())
        .unwrap_or("0");

    format!(
        "{}:{}:{}:{}",
        transfer.hash.to_lowercase(),
        transfer.to.to_lowercase(),
        transfer.value,
        position
    )
}

/// Highest block number among `transfers`, ignoring unparsable rows.
pub fn max_block(transfers: &[TokenTransfer]) -> Option<i64> {
    transfers
        .iter()
        .filter_map(|t| t.block_number.parse::<i64>().ok())
        .max()
}

/// Filter transfers down to outgoing payouts from `wallet`.
///
/// A transfer is kept when it is sent by the wallet to a different address,
/// in one of the allowed tokens, for at least the minimum amount and at
/// least one cent. Duplicate
/// transfer keys are dropped. Malformed rows are logged and skipped so one
/// bad record does not abort a sync. The result is sorted by time.
pub fn extract_payouts(
    transfers: &[TokenTransfer],
    wallet: &str,
    rules: &PayoutRules,
) -> Vec<Payout> {
    let wallet = wallet.to_lowercase();
    // sub-cent transfers round to zero and are never payouts
    let min_cents = rules.min_payout_cents.max(1);
    let mut seen = HashSet::new();
    let mut payouts = Vec::new();

    for transfer in transfers {
        let from = transfer.from.to_lowercase();
        let to = transfer.to.to_lowercase();

        if from != wallet || to == wallet {
            continue;
        }

        let symbol = transfer.token_symbol.to_uppercase();
        if !rules.tokens.iter().any(|t| *t == symbol) {
            continue;
        }

        let key = transfer_key(transfer);
        if !seen.insert(key.clone()) {
            continue;
        }

        match to_payout(transfer, key, to, symbol) {
            Ok(payout) if payout.amount_cents >= min_cents => payouts.push(payout),
            Ok(_) => {}
            Err(reason) => {
                tracing::warn!("Skipping transfer {}: {}", transfer.hash, reason);
            }
        }
    }

    sort_payouts(&mut payouts);
    payouts
}

fn to_payout(
    transfer: &TokenTransfer,
    transfer_key: String,
    recipient: String,
    token_symbol: String,
) -> Result<Payout, String> {
    let decimals: u32 = transfer
        .token_decimal
        .parse()
        .map_err(|_| format!("invalid token decimals {:?}", transfer.token_decimal))?;

    let block_number: i64 = transfer
        .block_number
        .parse()
        .map_err(|_| format!("invalid block number {:?}", transfer.block_number))?;

    let seconds: i64 = transfer
        .time_stamp
        .parse()
        .map_err(|_| format!("invalid timestamp {:?}", transfer.time_stamp))?;
    let paid_at = DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| format!("timestamp {} out of range", seconds))?;

    Ok(Payout {
        transfer_key,
        tx_hash: transfer.hash.to_lowercase(),
        block_number,
        recipient,
        token_symbol,
        amount_cents: token_amount_to_cents(&transfer.value, decimals)?,
        paid_at,
    })
}

/// Oldest first, ties broken by transfer key.
pub fn sort_payouts(payouts: &mut [Payout]) {
    payouts.sort_by(|a, b| {
        a.paid_at
            .cmp(&b.paid_at)
            .then_with(|| a.transfer_key.cmp(&b.transfer_key))
    });
}

/// Union of two payout sets by transfer key. Existing entries win.
pub fn merge_payouts(existing: Vec<Payout>, incoming: Vec<Payout>) -> Vec<Payout> {
    let mut by_key: HashMap<String, Payout> = HashMap::with_capacity(existing.len());

    for payout in existing.into_iter().chain(incoming) {
        by_key.entry(payout.transfer_key.clone()).or_insert(payout);
    }

    let mut merged: Vec<Payout> = by_key.into_values().collect();
    sort_payouts(&mut merged);
    merged
}

/// Aggregate payouts into totals, rolling windows, buckets and streaks.
///
/// Days and months are UTC calendar periods.
pub fn compute_stats(payouts: &[Payout], now: DateTime<Utc>) -> PayoutStats {
    let mut total_cents = 0i64;
    let mut largest_cents = 0i64;
    let mut last_24h_cents = 0i64;
    let mut last_7d_cents = 0i64;
    let mut last_30d_cents = 0i64;
    let mut recipients = HashSet::new();
    let mut daily: BTreeMap<NaiveDate, (i64, i64)> = BTreeMap::new();
    let mut monthly: BTreeMap<String, (i64, i64)> = BTreeMap::new();

    for payout in payouts {
        let amount = payout.amount_cents;
        total_cents = total_cents.saturating_add(amount);
        largest_cents = largest_cents.max(amount);
        recipients.insert(payout.recipient.as_str());

        if payout.paid_at <= now {
            let age = now - payout.paid_at;
            if age < Duration::hours(24) {
                last_24h_cents += amount;
            }
            if age < Duration::days(7) {
                last_7d_cents += amount;
            }
            if age < Duration::days(30) {
                last_30d_cents += amount;
            }
        }

        let day = daily.entry(payout.paid_at.date_naive()).or_default();
        day.0 += amount;
        day.1 += 1;

        let month = monthly
            .entry(payout.paid_at.format("%Y-%m").to_string())
            .or_default();
        month.0 += amount;
        month.1 += 1;
    }

    let payout_count = payouts.len() as i64;
    let days: Vec<NaiveDate> = daily.keys().copied().collect();
    let (current_streak_days, longest_streak_days) = streaks(&days, now.date_naive());

    PayoutStats {
        total_cents,
        payout_count,
        largest_cents,
        average_cents: if payout_count > 0 {
            total_cents / payout_count
        } else {
            0
        },
        unique_recipients: recipients.len() as i64,
        last_24h_cents,
        last_7d_cents,
        last_30d_cents,
        current_streak_days,
        longest_streak_days,
        first_payout_at: payouts.iter().map(|p| p.paid_at).min(),
        last_payout_at: payouts.iter().map(|p| p.paid_at).max(),
        daily: daily
            .into_iter()
            .map(|(date, (total_cents, count))| DailyBucket {
                date,
                total_cents,
                count,
            })
            .collect(),
        monthly: monthly
            .into_iter()
            .map(|(month, (total_cents, count))| MonthlyBucket {
                month,
                total_cents,
                count,
            })
            .collect(),
        computed_at: now,
    }
}

/// `(current, longest)` runs of consecutive days in ascending `days`.
///
/// The current streak counts only if the latest payout day is today or
/// yesterday, so a firm that has not paid yet today keeps its streak.
fn streaks(days: &[NaiveDate], today: NaiveDate) -> (i32, i32) {
    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;

    for &day in days {
        run = match previous {
            Some(prev) if prev.succ_opt() == Some(day) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(day);
    }

    let current = match previous {
        Some(last) if last == today || last.succ_opt() == Some(today) => run,
        _ => 0,
    };

    (current, longest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const WALLET: &str = "0xF1F1000000000000000000000000000000000001";

    fn rules() -> PayoutRules {
        PayoutRules {
            tokens: vec!["USDC".to_string(), "USDT".to_string()],
            min_payout_cents: 1000,
        }
    }

    fn transfer(hash: &str, from: &str, to: &str, value: &str, symbol: &str) -> TokenTransfer {
        TokenTransfer {
            block_number: "100".to_string(),
            time_stamp: "1704067200".to_string(),
            hash: hash.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            value: value.to_string(),
            token_symbol: symbol.to_string(),
            token_decimal: "6".to_string(),
            contract_address: String::new(),
            log_index: None,
            transaction_index: Some("1".to_string()),
        }
    }

    fn payout_at(key: &str, recipient: &str, cents: i64, at: DateTime<Utc>) -> Payout {
        Payout {
            transfer_key: key.to_string(),
            tx_hash: key.to_string(),
            block_number: 1,
            recipient: recipient.to_string(),
            token_symbol: "USDC".to_string(),
            amount_cents: cents,
            paid_at: at,
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn converts_token_amounts() {
        assert_eq!(token_amount_to_cents("2500000000", 6), Ok(250_000));
        assert_eq!(token_amount_to_cents("1999999", 6), Ok(199));
        assert_eq!(token_amount_to_cents("1500000000000000000000", 18), Ok(150_000));
        assert_eq!(token_amount_to_cents("7", 0), Ok(700));
        assert_eq!(token_amount_to_cents("5", 60), Ok(0));
        assert!(token_amount_to_cents("-5", 6).is_err());
        assert!(token_amount_to_cents("", 6).is_err());
        assert!(token_amount_to_cents("99999999999999999999999999999999", 2).is_err());
    }

    #[test]
    fn keeps_only_outgoing_allowed_tokens_above_dust() {
        let wallet_lower = WALLET.to_lowercase();
        let transfers = vec![
            transfer("0x1", WALLET, "0xaaa", "2500000000", "USDC"),
            // incoming
            transfer("0x2", "0xaaa", &wallet_lower, "2500000000", "USDC"),
            // self transfer
            transfer("0x3", &wallet_lower, WALLET, "2500000000", "USDC"),
            // unlisted token
            transfer("0x4", WALLET, "0xbbb", "2500000000", "SHIB"),
            // dust
            transfer("0x5", WALLET, "0xccc", "1000", "usdt"),
            transfer("0x6", &wallet_lower, "0xDDD", "10000000", "usdt"),
        ];

        let payouts = extract_payouts(&transfers, WALLET, &rules());

        assert_eq!(payouts.len(), 2);
        assert_eq!(payouts[0].tx_hash, "0x1");
        assert_eq!(payouts[0].amount_cents, 250_000);
        assert_eq!(payouts[1].recipient, "0xddd");
        assert_eq!(payouts[1].token_symbol, "USDT");
    }

    #[test]
    fn zero_minimum_still_drops_sub_cent_transfers() {
        let rules = PayoutRules {
            min_payout_cents: 0,
            ..rules()
        };
        let transfers = vec![
            transfer("0xdust", WALLET, "0xaaa", "1", "USDC"),
            transfer("0xcent", WALLET, "0xbbb", "10000", "USDC"),
        ];

        let payouts = extract_payouts(&transfers, WALLET, &rules);

        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].tx_hash, "0xcent");
        assert_eq!(payouts[0].amount_cents, 1);
    }

    #[test]
    fn batch_transfers_are_distinct_but_duplicates_are_dropped() {
        let a = transfer("0xbatch", WALLET, "0xaaa", "2000000000", "USDC");
        let b = transfer("0xbatch", WALLET, "0xbbb", "2000000000", "USDC");

        let payouts = extract_payouts(&[a.clone(), b, a], WALLET, &rules());
        assert_eq!(payouts.len(), 2);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let mut bad = transfer("0xbad", WALLET, "0xaaa", "2000000000", "USDC");
        bad.token_decimal = "six".to_string();
        let good = transfer("0xgood", WALLET, "0xaaa", "2000000000", "USDC");

        let payouts = extract_payouts(&[bad, good], WALLET, &rules());
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].tx_hash, "0xgood");
    }

    #[test]
    fn max_block_ignores_garbage() {
        let mut a = transfer("0x1", WALLET, "0xaaa", "1", "USDC");
        a.block_number = "250".to_string();
        let mut b = transfer("0x2", WALLET, "0xaaa", "1", "USDC");
        b.block_number = "n/a".to_string();

        assert_eq!(max_block(&[a, b]), Some(250));
        assert_eq!(max_block(&[]), None);
    }

    #[test]
    fn merge_prefers_existing_and_sorts() {
        let existing = vec![payout_at("k2", "0xa", 100, day(2))];
        let incoming = vec![
            payout_at("k2", "0xa", 999, day(2)),
            payout_at("k1", "0xb", 200, day(1)),
        ];

        let merged = merge_payouts(existing, incoming);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].transfer_key, "k1");
        assert_eq!(merged[1].amount_cents, 100);
    }

    #[test]
    fn stats_for_empty_history() {
        let stats = compute_stats(&[], day(10));
        assert_eq!(stats.total_cents, 0);
        assert_eq!(stats.average_cents, 0);
        assert_eq!(stats.current_streak_days, 0);
        assert_eq!(stats.first_payout_at, None);
        assert!(stats.daily.is_empty());
    }

    #[test]
    fn stats_totals_buckets_and_windows() {
        let payouts = vec![
            payout_at("a", "0x1", 10_000, Utc.with_ymd_and_hms(2024, 2, 28, 9, 0, 0).unwrap()),
            payout_at("b", "0x2", 20_000, day(1)),
            payout_at("c", "0x1", 30_001, day(1)),
            payout_at("d", "0x3", 5_000, Utc.with_ymd_and_hms(2024, 3, 10, 1, 0, 0).unwrap()),
        ];

        let stats = compute_stats(&payouts, day(10));

        assert_eq!(stats.total_cents, 65_001);
        assert_eq!(stats.payout_count, 4);
        assert_eq!(stats.largest_cents, 30_001);
        assert_eq!(stats.average_cents, 16_250);
        assert_eq!(stats.unique_recipients, 3);
        assert_eq!(stats.last_24h_cents, 5_000);
        assert_eq!(stats.last_7d_cents, 5_000);
        assert_eq!(stats.last_30d_cents, 65_001);

        assert_eq!(stats.daily.len(), 3);
        assert_eq!(stats.daily[1].total_cents, 50_001);
        assert_eq!(stats.daily[1].count, 2);

        assert_eq!(stats.monthly.len(), 2);
        assert_eq!(stats.monthly[0].month, "2024-02");
        assert_eq!(stats.monthly[1].month, "2024-03");
        assert_eq!(stats.monthly[1].total_cents, 55_001);
    }

    #[test]
    fn streaks_track_consecutive_days() {
        // Feb 28 (2024 is a leap year, so Feb 29 breaks the run), Mar 1-3, Mar 5-6
        let payouts = vec![
            payout_at("a", "0x1", 5_000, Utc.with_ymd_and_hms(2024, 2, 28, 9, 0, 0).unwrap()),
            payout_at("b", "0x1", 5_000, day(1)),
            payout_at("c", "0x1", 5_000, day(2)),
            payout_at("d", "0x1", 5_000, day(3)),
            payout_at("e", "0x1", 5_000, day(5)),
            payout_at("f", "0x1", 5_000, day(6)),
        ];

        let stats = compute_stats(&payouts, day(7));
        assert_eq!(stats.longest_streak_days, 3);
        assert_eq!(stats.current_streak_days, 2);

        let stats = compute_stats(&payouts, day(8));
        assert_eq!(stats.current_streak_days, 0);
    }
}

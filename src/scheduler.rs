//! Periodic payout sync and incident detection.

use std::time::Duration;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{
    error::AppError,
    services::{incident_service, sync_service},
    state::AppState,
};

/// What a scheduled cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A manual run held the sync lock
    Skipped,
    SyncFailed,
    DetectionFailed,
    Completed { new_incidents: usize },
}

/// Spawn the background loop. The first tick fires immediately, so a fresh
/// deployment syncs on startup.
pub fn spawn(state: AppState, period: Duration) -> JoinHandle<()> {
    tracing::info!("Scheduling payout sync every {}s", period.as_secs());

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // a run longer than the period must not trigger a burst of catch-up runs
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            run_once(&state).await;
        }
    })
}

/// One scheduled cycle: sync every firm, then run incident detection.
pub async fn run_once(state: &AppState) -> CycleOutcome {
    match sync_service::try_sync_all(state).await {
        Ok(summary) => {
            for failure in &summary.failed {
                tracing::warn!("Scheduled sync skipped {}: {}", failure.firm_slug, failure.error);
            }
        }
        Err(AppError::SyncInProgress) => {
            tracing::info!("Skipping scheduled sync, another run is in progress");
            return CycleOutcome::Skipped;
        }
        Err(err) => {
            tracing::error!("Scheduled sync failed: {}", err);
            return CycleOutcome::SyncFailed;
        }
    }

    match incident_service::detect_all(state).await {
        Ok(reports) => {
            let new_incidents: usize = reports.iter().map(|r| r.new_incidents.len()).sum();
            tracing::info!("Incident detection finished: {} new incidents", new_incidents);
            CycleOutcome::Completed { new_incidents }
        }
        Err(err) => {
            tracing::error!("Scheduled incident detection failed: {}", err);
            CycleOutcome::DetectionFailed
        }
    }
}

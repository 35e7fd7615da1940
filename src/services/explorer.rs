//! Block explorer client.
//!
//! Fetches ERC-20 transfer history for a wallet from an Etherscan-compatible
//! API, one page at a time, with backoff on rate limits and transient HTTP
//! failures.
//!
//! # Response Envelope
//!
//! ```json
//! { "status": "1", "message": "OK", "result": [ ... ] }
//! { "status": "0", "message": "No transactions found", "result": [] }
//! { "status": "0", "message": "NOTOK", "result": "Max rate limit reached" }
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::models::payout::TokenTransfer;
use crate::services::retry::{RetryPolicy, retry};

/// Errors returned by the explorer client.
#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Explorer returned HTTP {0}")]
    Status(u16),

    #[error("Explorer rate limit reached")]
    RateLimited,

    #[error("Explorer API error: {0}")]
    Api(String),

    #[error("Failed to decode explorer response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid {field} in explorer record: {value}")]
    InvalidField { field: &'static str, value: String },
}

impl ExplorerError {
    /// Rate limits, server errors and network failures are retried;
    /// malformed responses and API errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExplorerError::RateLimited => true,
            ExplorerError::Status(code) => *code >= 500,
            ExplorerError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            ExplorerError::Api(_) | ExplorerError::Decode(_) | ExplorerError::InvalidField { .. } => {
                false
            }
        }
    }
}

/// One page request for a wallet's token transfers.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferQuery {
    pub chain_id: i64,
    pub address: String,
    pub start_block: i64,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
}

/// Source of token transfer pages.
///
/// Implemented by `EtherscanClient` for production and by in-memory fakes
/// in tests.
#[async_trait]
pub trait ExplorerSource: Send + Sync {
    async fn fetch_token_transfers(
        &self,
        query: &TransferQuery,
    ) -> Result<Vec<TokenTransfer>, ExplorerError>;
}

/// Etherscan v2 (multichain) API client.
pub struct EtherscanClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl EtherscanClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ExplorerError> {
        let client = Client::builder().timeout(timeout).build()?;
        tracing::info!("Initialized explorer client for {}", base_url);

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl ExplorerSource for EtherscanClient {
    async fn fetch_token_transfers(
        &self,
        query: &TransferQuery,
    ) -> Result<Vec<TokenTransfer>, ExplorerError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("chainid", query.chain_id.to_string()),
                ("module", "account".to_string()),
                ("action", "tokentx".to_string()),
                ("address", query.address.clone()),
                // no endblock: the explorer reads up to the chain head
                ("startblock", query.start_block.to_string()),
                ("page", query.page.to_string()),
                ("offset", query.page_size.to_string()),
                ("sort", "asc".to_string()),
                ("apikey", self.api_key.clone()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ExplorerError::RateLimited);
        }
        if !status.is_success() {
            return Err(ExplorerError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_response(&body)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

/// Decode an explorer response body into transfers.
pub fn parse_response(body: &str) -> Result<Vec<TokenTransfer>, ExplorerError> {
    let envelope: Envelope = serde_json::from_str(body)?;

    if envelope.status == "1" {
        return Ok(serde_json::from_value(envelope.result)?);
    }

    if envelope.message.starts_with("No transactions found")
        || envelope.result.as_array().is_some_and(|rows| rows.is_empty())
    {
        return Ok(Vec::new());
    }

    let detail = envelope.result.as_str().unwrap_or_default();
    if detail.to_lowercase().contains("rate limit")
        || envelope.message.to_lowercase().contains("rate limit")
    {
        return Err(ExplorerError::RateLimited);
    }

    Err(ExplorerError::Api(format!("{} {}", envelope.message, detail).trim().to_string()))
}

/// Pagination limits for a full fetch.
#[derive(Debug, Clone)]
pub struct PageSettings {
    pub page_size: u32,
    pub max_pages: u32,
}

/// Everything read for one wallet in one sync run.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub transfers: Vec<TokenTransfer>,
    pub pages: u32,
    /// Page limit reached while pages were still full; the next run resumes
    /// from the highest block read.
    pub truncated: bool,
}

/// Read every page of transfers for `address` from `start_block` onwards.
///
/// Each page goes through the retry policy. Fetching stops at the first page
/// shorter than `page_size` or after `max_pages` pages.
pub async fn fetch_all_transfers<S>(
    source: &S,
    chain_id: i64,
    address: &str,
    start_block: i64,
    settings: &PageSettings,
    policy: &RetryPolicy,
) -> Result<FetchOutcome, ExplorerError>
where
    S: ExplorerSource + ?Sized,
{
    let mut outcome = FetchOutcome::default();

    for page in 1..=settings.max_pages {
        let query = TransferQuery {
            chain_id,
            address: address.to_string(),
            start_block,
            page,
            page_size: settings.page_size,
        };

        let label = format!("tokentx {} page {}", address, page);
        let rows = retry(policy, &label, ExplorerError::is_retryable, || {
            source.fetch_token_transfers(&query)
        })
        .await?;

        let row_count = rows.len();
        tracing::debug!("Fetched {} transfers for {} (page {})", row_count, address, page);

        outcome.pages = page;
        outcome.transfers.extend(rows);

        if row_count < settings.page_size as usize {
            return Ok(outcome);
        }
    }

    outcome.truncated = true;
    tracing::warn!(
        "Reached page limit ({}) for {}; remaining transfers are picked up next run",
        settings.max_pages,
        address
    );

    Ok(outcome)
}

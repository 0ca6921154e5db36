//! History service client — paginated trade records for reconciliation.
//!
//! The history service is the lowest-priority source: anything it returns
//! that the stream or poll feeds already delivered gets outranked in the
//! reconciler. Per-record decode failures are skipped; a malformed page
//! never aborts the walk.

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use super::decoder;
use super::types::{TradeRecord, TradeSource};

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub base_url: String,
    pub page_size: usize,
    /// Hard cap on pages walked per fetch, so a misbehaving service can't
    /// spin the poll loop.
    pub max_pages: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://history.darkpool.example".into(),
            page_size: 100,
            max_pages: 10,
        }
    }
}

impl HistoryConfig {
    pub fn from_env() -> Self {
        let mut c = Self::default();
        if let Ok(v) = std::env::var("DP_HISTORY_URL") {
            c.base_url = v;
        }
        if let Ok(v) = std::env::var("DP_HISTORY_PAGE_SIZE") {
            if let Ok(n) = v.parse() {
                c.page_size = n;
            }
        }
        if let Ok(v) = std::env::var("DP_HISTORY_MAX_PAGES") {
            if let Ok(n) = v.parse() {
                c.max_pages = n;
            }
        }
        c
    }
}

pub struct HistoryClient {
    cfg: HistoryConfig,
    client: reqwest::Client,
}

impl HistoryClient {
    pub fn new(cfg: HistoryConfig) -> Self {
        Self {
            cfg,
            client: reqwest::Client::new(),
        }
    }

    /// Fetch one page of trades for a pair, tagged `TradeSource::History`.
    pub async fn fetch_trades(&self, pair: &str, page: usize) -> Result<Vec<TradeRecord>> {
        let url = format!(
            "{}/trades?pair={}&page={}&page_size={}",
            self.cfg.base_url, pair, page, self.cfg.page_size,
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to request history service")?;

        if !resp.status().is_success() {
            anyhow::bail!("History service returned status: {}", resp.status());
        }

        let rows: Vec<Value> = resp
            .json()
            .await
            .context("Failed to parse history response")?;

        let (trades, skipped) =
            decoder::decode_batch(&rows, |v| decoder::decode_trade(v, TradeSource::History));
        if skipped > 0 {
            warn!("📜 History page {page}: skipped {skipped} malformed record(s)");
        }
        Ok(trades)
    }

    /// Walk pages until a short page or the page cap.
    pub async fn fetch_all_trades(&self, pair: &str) -> Result<Vec<TradeRecord>> {
        let mut all = Vec::new();
        for page in 0..self.cfg.max_pages {
            let trades = self.fetch_trades(pair, page).await?;
            let short = trades.len() < self.cfg.page_size;
            debug!("📜 History page {page}: {} trade(s)", trades.len());
            all.extend(trades);
            if short {
                break;
            }
        }
        Ok(all)
    }
}

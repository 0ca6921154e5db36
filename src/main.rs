//! Dark pool client — commit-reveal batch-auction orchestrator.
//!
//! Actor wiring:
//!   StreamListener ──event──→ Orchestrator ──cmd──→ ActionExecutor
//!                                  │    ↑_____________result│
//!                                  └──(watch)──→ status reporter
//!
//! Ledger reads go through an HTTP gateway; transaction submission is
//! dry-run by default (DP_DRY_RUN=false arms real submission).

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::EnvFilter;

use darkpool_orchestrator::auction::decoder;
use darkpool_orchestrator::auction::executor::ActionExecutor;
use darkpool_orchestrator::auction::history::{HistoryClient, HistoryConfig};
use darkpool_orchestrator::auction::scheduler::{AutoActionScheduler, SchedulerConfig};
use darkpool_orchestrator::auction::stream::{StreamConfig, StreamListener};
use darkpool_orchestrator::{
    ContractCall, LedgerReader, Orchestrator, OrchestratorConfig, OrchestratorSnapshot,
    TxSubmitter,
};

// ─────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Settings {
    ledger_url: String,
    ws_url: String,
    dry_run: bool,
}

impl Settings {
    fn from_env() -> Self {
        Self {
            ledger_url: env::var("DP_LEDGER_URL")
                .unwrap_or_else(|_| "https://gateway.darkpool.example".into()),
            ws_url: env::var("DP_WS_URL")
                .unwrap_or_else(|_| "wss://gateway.darkpool.example/events".into()),
            dry_run: env::var("DP_DRY_RUN")
                .map(|v| v == "1" || v == "true")
                .unwrap_or(true),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Ledger gateway (HTTP reads)
// ─────────────────────────────────────────────────────────

struct HttpLedgerReader {
    base_url: String,
    client: reqwest::Client,
}

impl HttpLedgerReader {
    fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    async fn get_json(&self, path: &str) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?;
        if !resp.status().is_success() {
            anyhow::bail!("Ledger gateway returned status {} for {path}", resp.status());
        }
        resp.json()
            .await
            .with_context(|| format!("GET {path}: invalid JSON"))
    }

    async fn get_array(&self, path: &str) -> anyhow::Result<Vec<Value>> {
        match self.get_json(path).await? {
            Value::Array(rows) => Ok(rows),
            other => anyhow::bail!("Expected array from {path}, got {other}"),
        }
    }
}

#[async_trait]
impl LedgerReader for HttpLedgerReader {
    async fn read_epoch(&self) -> anyhow::Result<Value> {
        self.get_json("/epoch").await
    }
    async fn read_orders(&self, wallet: &str) -> anyhow::Result<Vec<Value>> {
        self.get_array(&format!("/orders?wallet={wallet}")).await
    }
    async fn read_depth(&self, pair: &str) -> anyhow::Result<Value> {
        self.get_json(&format!("/depth?pair={pair}")).await
    }
    async fn read_trades(&self, pair: &str) -> anyhow::Result<Vec<Value>> {
        self.get_array(&format!("/trades?pair={pair}")).await
    }
}

// ─────────────────────────────────────────────────────────
// Submission surfaces
// ─────────────────────────────────────────────────────────

/// Logs the batch and fabricates a hash. Default mode: reveal/settle
/// scheduling can be observed end to end without touching the chain.
struct DryRunSubmitter;

#[async_trait]
impl TxSubmitter for DryRunSubmitter {
    async fn submit(&self, calls: Vec<ContractCall>) -> anyhow::Result<String> {
        for call in &calls {
            info!("🏜️ [DRY RUN] {}({:?})", call.method, call.args);
        }
        Ok(format!("0xdryrun{:08x}", calls.len()))
    }
}

/// POSTs the batch to the gateway's submission endpoint and returns the
/// tx hash from the response body.
struct HttpSubmitter {
    base_url: String,
    client: reqwest::Client,
}

#[async_trait]
impl TxSubmitter for HttpSubmitter {
    async fn submit(&self, calls: Vec<ContractCall>) -> anyhow::Result<String> {
        let body: Vec<Value> = calls
            .iter()
            .map(|c| serde_json::json!({"method": c.method, "args": c.args}))
            .collect();
        let resp: Value = self
            .client
            .post(format!("{}/submit", self.base_url))
            .json(&body)
            .send()
            .await
            .context("Submission request failed")?
            .json()
            .await
            .context("Submission response: invalid JSON")?;

        resp.get("tx_hash")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Submission response missing tx_hash: {resp}"))
    }
}

// ─────────────────────────────────────────────────────────
// Status reporter
// ─────────────────────────────────────────────────────────

async fn report_status(mut snapshot_rx: watch::Receiver<OrchestratorSnapshot>, decimals: u8) {
    let mut interval = tokio::time::interval(Duration::from_secs(10));
    loop {
        interval.tick().await;
        if snapshot_rx.changed().await.is_err() {
            break;
        }
        let snap = snapshot_rx.borrow_and_update().clone();
        let phase = snap
            .epoch
            .as_ref()
            .map(|e| format!("epoch {} {} ({}s)", e.epoch_id, e.phase.as_str(), e.seconds_remaining))
            .unwrap_or_else(|| "epoch ?".into());
        info!(
            "📊 {} | orders={} trades={} spread={} pnl={} win_rate={:.1}%",
            phase,
            snap.orders.len(),
            snap.trades.len(),
            decoder::format_units(snap.depth.spread, decimals),
            snap.pnl.total_pnl,
            snap.pnl.win_rate_pct,
        );
    }
}

// ─────────────────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    let orch_cfg = OrchestratorConfig::from_env();
    if orch_cfg.wallet.is_empty() {
        anyhow::bail!("DP_WALLET must be set");
    }

    info!(
        "🚀 Dark pool client starting | wallet={} pair={} dry_run={}",
        orch_cfg.wallet, orch_cfg.pair, settings.dry_run,
    );

    // Channel wiring: stream → orchestrator, scheduler → executor → orchestrator.
    let (stream_tx, stream_rx) = mpsc::channel(256);
    let (action_tx, action_rx) = mpsc::channel(32);
    let (result_tx, result_rx) = mpsc::channel(32);
    let (snapshot_tx, snapshot_rx) = watch::channel(OrchestratorSnapshot::default());

    let stream = StreamListener::new(
        StreamConfig {
            ws_url: settings.ws_url.clone(),
            trader: orch_cfg.wallet.clone(),
            pair: orch_cfg.pair.clone(),
        },
        stream_tx,
    );
    tokio::spawn(stream.run());

    let submitter: Arc<dyn TxSubmitter> = if settings.dry_run {
        Arc::new(DryRunSubmitter)
    } else {
        Arc::new(HttpSubmitter {
            base_url: settings.ledger_url.clone(),
            client: reqwest::Client::new(),
        })
    };
    tokio::spawn(ActionExecutor::new(submitter, action_rx, result_tx).run());

    tokio::spawn(report_status(snapshot_rx, orch_cfg.decimals));

    let scheduler = AutoActionScheduler::new(
        SchedulerConfig::from_env(),
        orch_cfg.wallet.clone(),
        action_tx,
    );
    let ledger = Arc::new(HttpLedgerReader::new(settings.ledger_url));
    let history = Some(HistoryClient::new(HistoryConfig::from_env()));

    Orchestrator::new(
        orch_cfg, ledger, history, scheduler, stream_rx, result_rx, snapshot_tx,
    )
    .run()
    .await;

    Ok(())
}

//! Orchestrator — the single mutator of all shared protocol caches.
//!
//! One `tokio::select!` loop drives every mutation: a fixed-interval poll
//! timer reads ledger state, a one-second tick advances the local
//! countdown, the push-event stream delivers records outside the poll
//! cycle, and executor results feed back the outcome of auto-actions. No
//! locks anywhere — exactly one task touches the epoch/order/trade state.
//!
//! On start, state is rehydrated entirely from authoritative reads; the
//! outcome of a transaction submitted in a previous session is never
//! assumed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::decoder;
use super::depth;
use super::epoch::EpochPhaseTracker;
use super::history::HistoryClient;
use super::lifecycle::OrderLifecycleMachine;
use super::messages::{
    ActionResult, LedgerReader, OrchestratorSnapshot, StreamEvent, StreamEventKind,
};
use super::pnl;
use super::reconciler::{MultiSourceReconciler, ReconcilerConfig};
use super::scheduler::AutoActionScheduler;
use super::types::{DepthView, TradeRecord, TradeSource};

// ─────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub wallet: String,
    pub pair: String,
    /// Decimal scale of the pair's ledger-native magnitudes.
    pub decimals: u8,
    /// Ledger poll cadence.
    pub poll_interval_ms: u64,
    /// How often to pull the paginated history service.
    pub history_refresh_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            wallet: String::new(),
            pair: "ETH-USDC".into(),
            decimals: 18,
            poll_interval_ms: 2_000,
            history_refresh_secs: 60,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        let mut c = Self::default();
        if let Ok(v) = std::env::var("DP_WALLET") {
            c.wallet = v;
        }
        if let Ok(v) = std::env::var("DP_PAIR") {
            c.pair = v;
        }
        if let Ok(v) = std::env::var("DP_PAIR_DECIMALS") {
            if let Ok(n) = v.parse() {
                c.decimals = n;
            }
        }
        if let Ok(v) = std::env::var("DP_POLL_INTERVAL_MS") {
            if let Ok(n) = v.parse() {
                c.poll_interval_ms = n;
            }
        }
        if let Ok(v) = std::env::var("DP_HISTORY_REFRESH_SECS") {
            if let Ok(n) = v.parse() {
                c.history_refresh_secs = n;
            }
        }
        c
    }
}

// ─────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Stats {
    polls: u64,
    poll_failures: u64,
    stream_events: u64,
    ticks: u64,
}

pub struct Orchestrator {
    cfg: OrchestratorConfig,
    ledger: Arc<dyn LedgerReader>,
    history: Option<HistoryClient>,

    tracker: EpochPhaseTracker,
    lifecycle: OrderLifecycleMachine,
    reconciler: MultiSourceReconciler,
    scheduler: AutoActionScheduler,
    depth: DepthView,

    stream_rx: mpsc::Receiver<StreamEvent>,
    result_rx: mpsc::Receiver<ActionResult>,
    snapshot_tx: watch::Sender<OrchestratorSnapshot>,

    stats: Stats,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: OrchestratorConfig,
        ledger: Arc<dyn LedgerReader>,
        history: Option<HistoryClient>,
        scheduler: AutoActionScheduler,
        stream_rx: mpsc::Receiver<StreamEvent>,
        result_rx: mpsc::Receiver<ActionResult>,
        snapshot_tx: watch::Sender<OrchestratorSnapshot>,
    ) -> Self {
        Self {
            cfg,
            ledger,
            history,
            tracker: EpochPhaseTracker::new(),
            lifecycle: OrderLifecycleMachine::new(),
            reconciler: MultiSourceReconciler::new(ReconcilerConfig::from_env()),
            scheduler,
            depth: DepthView::default(),
            stream_rx,
            result_rx,
            snapshot_tx,
            stats: Stats::default(),
        }
    }

    pub async fn run(mut self) {
        info!(
            "🎛️ Orchestrator started | wallet={} pair={} poll={}ms",
            self.cfg.wallet, self.cfg.pair, self.cfg.poll_interval_ms,
        );

        let mut poll = tokio::time::interval(Duration::from_millis(self.cfg.poll_interval_ms));
        let mut countdown = tokio::time::interval(Duration::from_secs(1));
        let mut history_timer =
            tokio::time::interval(Duration::from_secs(self.cfg.history_refresh_secs.max(1)));

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.poll_ledger().await;
                }
                _ = countdown.tick() => {
                    self.stats.ticks += 1;
                    self.tracker.tick();
                    self.publish();
                }
                _ = history_timer.tick() => {
                    self.refresh_history().await;
                }
                event = self.stream_rx.recv() => {
                    match event {
                        Some(event) => {
                            self.stats.stream_events += 1;
                            self.apply_stream_event(event).await;
                            self.publish();
                        }
                        None => break, // Stream channel closed
                    }
                }
                result = self.result_rx.recv() => {
                    if let Some(result) = result {
                        self.scheduler.on_action_result(&result);
                    }
                }
            }
        }

        info!(
            "🎛️ Shutdown | polls={} (failed={}) stream_events={} ticks={}",
            self.stats.polls, self.stats.poll_failures, self.stats.stream_events, self.stats.ticks,
        );
    }

    // ═════════════════════════════════════════════════
    // Poll cycle
    // ═════════════════════════════════════════════════

    /// One full authoritative read pass. Transient failures are logged and
    /// retried on the next scheduled tick — never surfaced.
    pub async fn poll_ledger(&mut self) {
        self.stats.polls += 1;

        match self.ledger.read_epoch().await {
            Ok(raw) => match decoder::decode_epoch(&raw) {
                Ok(e) => {
                    self.tracker
                        .apply_authoritative(e.epoch_id, e.phase, e.seconds_remaining);
                }
                Err(err) => warn!("🎛️ Malformed epoch payload: {err}"),
            },
            Err(e) => {
                self.stats.poll_failures += 1;
                warn!("🎛️ Epoch read failed (retrying next poll): {e:#}");
            }
        }

        match self.ledger.read_orders(&self.cfg.wallet).await {
            Ok(raws) => {
                let (orders, _) = decoder::decode_batch(&raws, decoder::decode_order);
                for order in orders {
                    self.lifecycle.observe(order);
                }
            }
            Err(e) => {
                self.stats.poll_failures += 1;
                warn!("🎛️ Orders read failed (retrying next poll): {e:#}");
            }
        }

        match self.ledger.read_trades(&self.cfg.pair).await {
            Ok(raws) => {
                let (trades, _) =
                    decoder::decode_batch(&raws, |v| decoder::decode_trade(v, TradeSource::Poll));
                self.reconciler.merge(trades);
            }
            Err(e) => {
                self.stats.poll_failures += 1;
                warn!("🎛️ Trades read failed (retrying next poll): {e:#}");
            }
        }

        match self.ledger.read_depth(&self.cfg.pair).await {
            Ok(raw) => match decoder::decode_depth(&raw) {
                Ok((bids, asks)) => self.depth = depth::project(bids, asks),
                Err(err) => warn!("🎛️ Malformed depth payload: {err}"),
            },
            Err(e) => {
                self.stats.poll_failures += 1;
                warn!("🎛️ Depth read failed (retrying next poll): {e:#}");
            }
        }

        // Auto-actions react to every authoritative phase observation; the
        // scheduler's watermarks make them exactly-once per epoch.
        if let Some(state) = self.tracker.state() {
            if state.is_authoritative {
                self.scheduler
                    .on_phase_observed(state.epoch_id, state.phase, &self.lifecycle)
                    .await;
            }
        }

        self.publish();
    }

    async fn refresh_history(&mut self) {
        let Some(history) = &self.history else {
            return;
        };
        match history.fetch_all_trades(&self.cfg.pair).await {
            Ok(trades) => {
                debug!("🎛️ History refresh: {} trade(s)", trades.len());
                self.reconciler.merge(trades);
                self.publish();
            }
            Err(e) => warn!("🎛️ History refresh failed (retrying next cycle): {e:#}"),
        }
    }

    // ═════════════════════════════════════════════════
    // Stream events
    // ═════════════════════════════════════════════════

    pub async fn apply_stream_event(&mut self, event: StreamEvent) {
        match event.kind {
            StreamEventKind::OrderCommitted => {
                if let (Some(order_id), Some(tx)) = (event.order_id, event.tx_hash.as_deref()) {
                    self.lifecycle.note_commit_tx(order_id, tx);
                }
            }
            StreamEventKind::OrderRevealed => {
                if let Some(order_id) = event.order_id {
                    self.lifecycle
                        .confirm_reveal(order_id, event.tx_hash.as_deref());
                }
            }
            StreamEventKind::OrderFilled => {
                if let Some(order_id) = event.order_id {
                    if let (Some(price), Some(amount)) = (event.price, event.amount) {
                        self.lifecycle.mark_filled(order_id, price, amount);
                    }
                }
                // Fills are also trades for the reconciled feed.
                if let (Some(price), Some(amount)) = (event.price, event.amount) {
                    self.reconciler.merge(vec![TradeRecord {
                        trade_id: event.tx_hash.clone(),
                        price,
                        amount,
                        timestamp_ms: event.timestamp_ms,
                        source: TradeSource::Stream,
                    }]);
                }
            }
            StreamEventKind::OrderCancelled => {
                if let Some(order_id) = event.order_id {
                    self.lifecycle.mark_cancelled(order_id);
                }
            }
            StreamEventKind::EpochSettled => {
                if let Some(epoch_id) = event.epoch_id {
                    info!("🎛️ Settlement observed for epoch {epoch_id}");
                    self.scheduler.on_settlement_observed(epoch_id);
                }
            }
            StreamEventKind::Deposited | StreamEventKind::Withdrawn => {
                // Balance accounting lives with the wallet surface.
                debug!("🎛️ Balance event {:?} trader={}", event.kind, event.trader);
            }
        }
    }

    // ═════════════════════════════════════════════════
    // Snapshot publishing
    // ═════════════════════════════════════════════════

    fn publish(&self) {
        let orders = self.lifecycle.orders();
        let snapshot = OrchestratorSnapshot {
            epoch: self.tracker.state(),
            pnl: pnl::aggregate(&orders),
            orders,
            trades: self.reconciler.snapshot(),
            depth: self.depth.clone(),
        };
        let _ = self.snapshot_tx.send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::messages::ActionCmd;
    use crate::auction::scheduler::SchedulerConfig;
    use crate::auction::types::{EpochPhase, OrderStatus};
    use alloy_primitives::U256;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Scripted ledger double: each read pops the next programmed payload.
    #[derive(Default)]
    struct FakeLedger {
        epoch: Mutex<Vec<anyhow::Result<Value>>>,
        orders: Mutex<Vec<anyhow::Result<Vec<Value>>>>,
        trades: Mutex<Vec<anyhow::Result<Vec<Value>>>>,
        depth: Mutex<Vec<anyhow::Result<Value>>>,
    }

    fn pop<T: Default>(slot: &Mutex<Vec<anyhow::Result<T>>>) -> anyhow::Result<T> {
        let mut v = slot.lock().unwrap();
        if v.is_empty() {
            Ok(T::default())
        } else {
            v.remove(0)
        }
    }

    #[async_trait]
    impl LedgerReader for FakeLedger {
        async fn read_epoch(&self) -> anyhow::Result<Value> {
            pop(&self.epoch)
        }
        async fn read_orders(&self, _wallet: &str) -> anyhow::Result<Vec<Value>> {
            pop(&self.orders)
        }
        async fn read_depth(&self, _pair: &str) -> anyhow::Result<Value> {
            pop(&self.depth)
        }
        async fn read_trades(&self, _pair: &str) -> anyhow::Result<Vec<Value>> {
            pop(&self.trades)
        }
    }

    fn build(
        ledger: Arc<FakeLedger>,
    ) -> (
        Orchestrator,
        mpsc::Sender<StreamEvent>,
        mpsc::Receiver<ActionCmd>,
        watch::Receiver<OrchestratorSnapshot>,
    ) {
        let (stream_tx, stream_rx) = mpsc::channel(16);
        let (action_tx, action_rx) = mpsc::channel(16);
        let (_result_tx, result_rx) = mpsc::channel::<ActionResult>(16);
        let (snapshot_tx, snapshot_rx) = watch::channel(OrchestratorSnapshot::default());
        let scheduler =
            AutoActionScheduler::new(SchedulerConfig::default(), "0xwallet".into(), action_tx);
        let orch = Orchestrator::new(
            OrchestratorConfig {
                wallet: "0xwallet".into(),
                ..OrchestratorConfig::default()
            },
            ledger,
            None,
            scheduler,
            stream_rx,
            result_rx,
            snapshot_tx,
        );
        (orch, stream_tx, action_rx, snapshot_rx)
    }

    fn epoch_payload(epoch: u64, phase: &str, secs: u64) -> Value {
        json!({"epoch_id": epoch, "phase": phase, "seconds_remaining": secs})
    }

    fn order_payload(id: u64, status: &str, epoch: u64) -> Value {
        json!({
            "order_id": id.to_string(), "side": "buy", "pair": "ETH-USDC",
            "price": "2000", "amount": "10", "fill_amount": "0",
            "clearing_price": "0", "status": status, "epoch_id": epoch
        })
    }

    #[tokio::test]
    async fn test_poll_populates_snapshot() {
        let ledger = Arc::new(FakeLedger::default());
        ledger
            .epoch
            .lock()
            .unwrap()
            .push(Ok(epoch_payload(7, "commit", 120)));
        ledger
            .orders
            .lock()
            .unwrap()
            .push(Ok(vec![order_payload(1, "committed", 7)]));
        ledger.trades.lock().unwrap().push(Ok(vec![
            json!({"trade_id": "t1", "price": "5", "amount": "2", "timestamp": 1000}),
        ]));
        ledger.depth.lock().unwrap().push(Ok(json!({
            "bids": [["9", "5", 1]],
            "asks": [["10", "3", 1]]
        })));

        let (mut orch, _stream, _actions, snapshot_rx) = build(ledger);
        orch.poll_ledger().await;

        let snap = snapshot_rx.borrow().clone();
        let epoch = snap.epoch.unwrap();
        assert_eq!(epoch.epoch_id, 7);
        assert_eq!(epoch.phase, EpochPhase::Commit);
        assert!(epoch.is_authoritative);
        assert_eq!(snap.orders.len(), 1);
        assert_eq!(snap.trades.len(), 1);
        assert_eq!(snap.depth.spread, U256::from(1u64));
    }

    #[tokio::test]
    async fn test_network_failure_recovered_on_next_poll() {
        let ledger = Arc::new(FakeLedger::default());
        ledger
            .epoch
            .lock()
            .unwrap()
            .push(Err(anyhow::anyhow!("connection refused")));
        ledger
            .epoch
            .lock()
            .unwrap()
            .push(Ok(epoch_payload(7, "commit", 120)));

        let (mut orch, _stream, _actions, snapshot_rx) = build(ledger);
        orch.poll_ledger().await;
        assert!(snapshot_rx.borrow().epoch.is_none());

        orch.poll_ledger().await;
        assert_eq!(snapshot_rx.borrow().epoch.unwrap().epoch_id, 7);
    }

    #[tokio::test]
    async fn test_settle_phase_triggers_single_auto_settle() {
        let ledger = Arc::new(FakeLedger::default());
        {
            let mut e = ledger.epoch.lock().unwrap();
            let mut o = ledger.orders.lock().unwrap();
            // Settle phase observed three times for the same epoch.
            for secs in [60, 58, 56] {
                e.push(Ok(epoch_payload(7, "settle", secs)));
                o.push(Ok(vec![order_payload(1, "revealed", 7)]));
            }
        }

        let (mut orch, _stream, mut actions, _snap) = build(ledger);
        for _ in 0..3 {
            orch.poll_ledger().await;
        }

        assert!(matches!(
            actions.try_recv(),
            Ok(ActionCmd::SettleEpoch { epoch_id: 7 }),
        ));
        assert!(actions.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stream_fill_outranks_stale_poll_trade() {
        let ledger = Arc::new(FakeLedger::default());
        ledger.trades.lock().unwrap().push(Ok(vec![
            json!({"trade_id": "0xfill", "price": "1980", "amount": "10", "timestamp": 1000}),
        ]));

        let (mut orch, _stream, _actions, snapshot_rx) = build(ledger);

        // Stream fill lands first with the authoritative price.
        orch.apply_stream_event(StreamEvent {
            kind: StreamEventKind::OrderFilled,
            trader: "0xwallet".into(),
            tx_hash: Some("0xfill".into()),
            order_id: None,
            price: Some(U256::from(1990u64)),
            amount: Some(U256::from(10u64)),
            epoch_id: Some(7),
            timestamp_ms: 1000,
        })
        .await;

        // Late poll pass delivers a stale copy of the same trade.
        orch.poll_ledger().await;

        let snap = snapshot_rx.borrow().clone();
        assert_eq!(snap.trades.len(), 1);
        assert_eq!(snap.trades[0].source, TradeSource::Stream);
        assert_eq!(snap.trades[0].price, U256::from(1990u64));
    }

    #[tokio::test]
    async fn test_stream_reveal_advances_lifecycle() {
        let ledger = Arc::new(FakeLedger::default());
        ledger
            .orders
            .lock()
            .unwrap()
            .push(Ok(vec![order_payload(1, "committed", 7)]));

        let (mut orch, _stream, _actions, snapshot_rx) = build(ledger);
        orch.poll_ledger().await;

        orch.apply_stream_event(StreamEvent {
            kind: StreamEventKind::OrderRevealed,
            trader: "0xwallet".into(),
            tx_hash: Some("0xreveal".into()),
            order_id: Some(U256::from(1u64)),
            price: None,
            amount: None,
            epoch_id: Some(7),
            timestamp_ms: 2000,
        })
        .await;
        orch.publish();

        let snap = snapshot_rx.borrow().clone();
        assert_eq!(snap.orders[0].status, OrderStatus::Revealed);
        assert_eq!(snap.orders[0].reveal_tx.as_deref(), Some("0xreveal"));
    }

    #[tokio::test]
    async fn test_commit_event_before_poll_keeps_tx_hash() {
        let ledger = Arc::new(FakeLedger::default());
        ledger
            .orders
            .lock()
            .unwrap()
            .push(Ok(vec![order_payload(1, "committed", 7)]));

        let (mut orch, _stream, _actions, snapshot_rx) = build(ledger);

        // The stream commit event lands before any poll knows the order.
        orch.apply_stream_event(StreamEvent {
            kind: StreamEventKind::OrderCommitted,
            trader: "0xwallet".into(),
            tx_hash: Some("0xcommit".into()),
            order_id: Some(U256::from(1u64)),
            price: None,
            amount: None,
            epoch_id: Some(7),
            timestamp_ms: 500,
        })
        .await;

        orch.poll_ledger().await;

        let snap = snapshot_rx.borrow().clone();
        assert_eq!(snap.orders[0].commit_tx.as_deref(), Some("0xcommit"));
    }

    #[tokio::test]
    async fn test_epoch_settled_event_blocks_auto_settle() {
        let ledger = Arc::new(FakeLedger::default());
        ledger
            .epoch
            .lock()
            .unwrap()
            .push(Ok(epoch_payload(7, "settle", 60)));
        ledger
            .orders
            .lock()
            .unwrap()
            .push(Ok(vec![order_payload(1, "revealed", 7)]));

        let (mut orch, _stream, mut actions, _snap) = build(ledger);

        orch.apply_stream_event(StreamEvent {
            kind: StreamEventKind::EpochSettled,
            trader: String::new(),
            tx_hash: Some("0xsettled".into()),
            order_id: None,
            price: None,
            amount: None,
            epoch_id: Some(7),
            timestamp_ms: 3000,
        })
        .await;

        orch.poll_ledger().await;
        assert!(actions.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_epoch_payload_is_isolated() {
        let ledger = Arc::new(FakeLedger::default());
        ledger.epoch.lock().unwrap().push(Ok(json!("garbage")));
        ledger
            .orders
            .lock()
            .unwrap()
            .push(Ok(vec![order_payload(1, "committed", 7)]));

        let (mut orch, _stream, _actions, snapshot_rx) = build(ledger);
        orch.poll_ledger().await;

        // Epoch skipped; the orders batch still landed.
        let snap = snapshot_rx.borrow().clone();
        assert!(snap.epoch.is_none());
        assert_eq!(snap.orders.len(), 1);
    }
}

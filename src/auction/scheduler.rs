//! AutoActionScheduler — fires reveal/settle actions exactly once per
//! (wallet, epoch).
//!
//! Watermarks record every epoch for which each auto-action was already
//! triggered, so a stale phase read for an older epoch can never re-fire
//! it. They live in this struct, owned by the orchestrator for the whole
//! session and reset only on explicit wallet disconnect — never re-derived
//! from transient display state. Watermarks are set BEFORE the submission
//! resolves, so a failing action cannot retry unboundedly within its
//! epoch; `retry_failed_actions` makes that policy explicit.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::lifecycle::OrderLifecycleMachine;
use super::messages::{ActionCmd, ActionKind, ActionResult};
use super::types::{EpochPhase, OrderStatus};

// ─────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Re-arm the epoch watermark when a submitted action fails, allowing
    /// one retry on the next phase observation. Off by default: a failing
    /// transaction is abandoned for the remainder of its epoch.
    pub retry_failed_actions: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retry_failed_actions: false,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let mut c = Self::default();
        if let Ok(v) = std::env::var("DP_RETRY_FAILED_ACTIONS") {
            c.retry_failed_actions = v == "1" || v.to_lowercase() == "true";
        }
        c
    }
}

// ─────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Stats {
    reveals_issued: u64,
    settles_issued: u64,
    suppressed: u64,
}

pub struct AutoActionScheduler {
    cfg: SchedulerConfig,
    wallet: String,
    /// Epochs for which auto-reveal was already triggered.
    reveals_done: HashSet<u64>,
    /// Epochs for which auto-settle was already triggered.
    settles_done: HashSet<u64>,
    /// Epochs with an observed settlement result — settle is pointless.
    settled_epochs: HashSet<u64>,
    action_tx: mpsc::Sender<ActionCmd>,
    stats: Stats,
}

impl AutoActionScheduler {
    pub fn new(cfg: SchedulerConfig, wallet: String, action_tx: mpsc::Sender<ActionCmd>) -> Self {
        info!(
            "🤖 AutoActionScheduler started | wallet={} retry_failed={}",
            wallet, cfg.retry_failed_actions,
        );
        Self {
            cfg,
            wallet,
            reveals_done: HashSet::new(),
            settles_done: HashSet::new(),
            settled_epochs: HashSet::new(),
            action_tx,
            stats: Stats::default(),
        }
    }

    /// Called on every authoritative phase observation (not only on
    /// transitions) — the watermarks, not the observation count, guarantee
    /// at most one action per (wallet, epoch).
    pub async fn on_phase_observed(
        &mut self,
        epoch_id: u64,
        phase: EpochPhase,
        lifecycle: &OrderLifecycleMachine,
    ) {
        match phase {
            EpochPhase::Reveal => self.maybe_reveal(epoch_id, lifecycle).await,
            EpochPhase::Settle => self.maybe_settle(epoch_id, lifecycle).await,
            EpochPhase::Commit | EpochPhase::Closed => {}
        }
    }

    async fn maybe_reveal(&mut self, epoch_id: u64, lifecycle: &OrderLifecycleMachine) {
        if self.reveals_done.contains(&epoch_id) {
            self.stats.suppressed += 1;
            return;
        }
        let order_ids = lifecycle.order_ids_in(epoch_id, OrderStatus::Committed);
        if order_ids.is_empty() {
            debug!("🤖 Reveal phase epoch {epoch_id}: no committed orders yet");
            return;
        }

        // Optimistic watermark: set before the submission resolves.
        self.reveals_done.insert(epoch_id);
        self.stats.reveals_issued += 1;
        info!(
            "🤖 Auto-reveal epoch {} | wallet={} orders={}",
            epoch_id,
            self.wallet,
            order_ids.len(),
        );
        let _ = self
            .action_tx
            .send(ActionCmd::RevealOrders {
                epoch_id,
                order_ids,
            })
            .await;
    }

    async fn maybe_settle(&mut self, epoch_id: u64, lifecycle: &OrderLifecycleMachine) {
        if self.settles_done.contains(&epoch_id) {
            self.stats.suppressed += 1;
            return;
        }
        if self.settled_epochs.contains(&epoch_id) {
            debug!("🤖 Epoch {epoch_id} already settled on-chain — skipping");
            return;
        }
        if lifecycle.order_ids_in(epoch_id, OrderStatus::Revealed).is_empty() {
            debug!("🤖 Settle phase epoch {epoch_id}: no revealed orders for wallet");
            return;
        }

        self.settles_done.insert(epoch_id);
        self.stats.settles_issued += 1;
        info!("🤖 Auto-settle epoch {} | wallet={}", epoch_id, self.wallet);
        let _ = self.action_tx.send(ActionCmd::SettleEpoch { epoch_id }).await;
    }

    /// A settlement result was observed for the epoch (stream or poll).
    pub fn on_settlement_observed(&mut self, epoch_id: u64) {
        self.settled_epochs.insert(epoch_id);
    }

    /// Submission outcome feedback. On failure the watermark stays set
    /// unless `retry_failed_actions` re-arms it for one more attempt.
    pub fn on_action_result(&mut self, result: &ActionResult) {
        match result {
            ActionResult::Submitted {
                kind,
                epoch_id,
                tx_hash,
            } => {
                info!(
                    "🤖 {} submitted for epoch {} tx={}",
                    kind.as_str(),
                    epoch_id,
                    &tx_hash[..10.min(tx_hash.len())],
                );
            }
            ActionResult::Failed {
                kind,
                epoch_id,
                error,
            } => {
                warn!(
                    "🤖 {} failed for epoch {}: {}",
                    kind.as_str(),
                    epoch_id,
                    error,
                );
                if self.cfg.retry_failed_actions {
                    match kind {
                        ActionKind::Reveal if self.reveals_done.remove(epoch_id) => {
                            info!("🤖 Re-arming reveal watermark for epoch {epoch_id}");
                        }
                        ActionKind::Settle if self.settles_done.remove(epoch_id) => {
                            info!("🤖 Re-arming settle watermark for epoch {epoch_id}");
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Explicit wallet disconnect — the only thing that clears watermarks.
    pub fn reset(&mut self, wallet: String) {
        info!(
            "🤖 Scheduler reset | wallet {} → {} (reveals={} settles={} suppressed={})",
            self.wallet,
            wallet,
            self.stats.reveals_issued,
            self.stats.settles_issued,
            self.stats.suppressed,
        );
        self.wallet = wallet;
        self.reveals_done.clear();
        self.settles_done.clear();
        self.settled_epochs.clear();
        self.stats = Stats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::error::ProtocolError;
    use crate::auction::types::{Order, OrderSide};
    use alloy_primitives::U256;

    fn lifecycle_with(status: OrderStatus, epoch: u64) -> OrderLifecycleMachine {
        let mut m = OrderLifecycleMachine::new();
        m.observe(Order {
            order_id: U256::from(1u64),
            side: OrderSide::Buy,
            pair: "ETH-USDC".into(),
            price: U256::from(2000u64),
            amount: U256::from(10u64),
            fill_amount: U256::ZERO,
            clearing_price: U256::ZERO,
            status,
            epoch_id: epoch,
            commit_tx: None,
            reveal_tx: None,
        });
        m
    }

    fn scheduler(cfg: SchedulerConfig) -> (AutoActionScheduler, mpsc::Receiver<ActionCmd>) {
        let (tx, rx) = mpsc::channel(16);
        (AutoActionScheduler::new(cfg, "0xwallet".into(), tx), rx)
    }

    #[tokio::test]
    async fn test_settle_at_most_once_per_epoch() {
        let (mut s, mut rx) = scheduler(SchedulerConfig::default());
        let m = lifecycle_with(OrderStatus::Revealed, 7);

        // Settle phase observed N times for the same epoch.
        for _ in 0..5 {
            s.on_phase_observed(7, EpochPhase::Settle, &m).await;
        }

        let first = rx.try_recv();
        assert!(matches!(first, Ok(ActionCmd::SettleEpoch { epoch_id: 7 })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reveal_fires_once_with_committed_orders() {
        let (mut s, mut rx) = scheduler(SchedulerConfig::default());
        let m = lifecycle_with(OrderStatus::Committed, 7);

        s.on_phase_observed(7, EpochPhase::Reveal, &m).await;
        s.on_phase_observed(7, EpochPhase::Reveal, &m).await;

        match rx.try_recv() {
            Ok(ActionCmd::RevealOrders { epoch_id, order_ids }) => {
                assert_eq!(epoch_id, 7);
                assert_eq!(order_ids, vec![U256::from(1u64)]);
            }
            other => panic!("expected RevealOrders, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_settle_without_revealed_orders() {
        let (mut s, mut rx) = scheduler(SchedulerConfig::default());
        let m = lifecycle_with(OrderStatus::Committed, 7);
        s.on_phase_observed(7, EpochPhase::Settle, &m).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_settle_when_result_already_observed() {
        let (mut s, mut rx) = scheduler(SchedulerConfig::default());
        let m = lifecycle_with(OrderStatus::Revealed, 7);
        s.on_settlement_observed(7);
        s.on_phase_observed(7, EpochPhase::Settle, &m).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_action_not_retried_by_default() {
        let (mut s, mut rx) = scheduler(SchedulerConfig::default());
        let m = lifecycle_with(OrderStatus::Revealed, 7);

        s.on_phase_observed(7, EpochPhase::Settle, &m).await;
        assert!(rx.try_recv().is_ok());

        s.on_action_result(&ActionResult::Failed {
            kind: ActionKind::Settle,
            epoch_id: 7,
            error: ProtocolError::SimulationFailed("revert".into()),
        });

        // Same epoch observed again: abandoned for the remainder of it.
        s.on_phase_observed(7, EpochPhase::Settle, &m).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_action_rearms_when_retry_enabled() {
        let (mut s, mut rx) = scheduler(SchedulerConfig {
            retry_failed_actions: true,
        });
        let m = lifecycle_with(OrderStatus::Revealed, 7);

        s.on_phase_observed(7, EpochPhase::Settle, &m).await;
        assert!(rx.try_recv().is_ok());

        s.on_action_result(&ActionResult::Failed {
            kind: ActionKind::Settle,
            epoch_id: 7,
            error: ProtocolError::Network("timeout".into()),
        });

        s.on_phase_observed(7, EpochPhase::Settle, &m).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_stale_read_of_older_epoch_does_not_refire() {
        let (mut s, mut rx) = scheduler(SchedulerConfig::default());
        let m7 = lifecycle_with(OrderStatus::Revealed, 7);
        let m8 = lifecycle_with(OrderStatus::Revealed, 8);

        s.on_phase_observed(7, EpochPhase::Settle, &m7).await;
        s.on_phase_observed(8, EpochPhase::Settle, &m8).await;
        // Lagging replica serves epoch 7's settle phase again.
        s.on_phase_observed(7, EpochPhase::Settle, &m7).await;

        assert!(matches!(
            rx.try_recv(),
            Ok(ActionCmd::SettleEpoch { epoch_id: 7 }),
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(ActionCmd::SettleEpoch { epoch_id: 8 }),
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_new_epoch_rearms_watermarks() {
        let (mut s, mut rx) = scheduler(SchedulerConfig::default());
        let m7 = lifecycle_with(OrderStatus::Revealed, 7);
        s.on_phase_observed(7, EpochPhase::Settle, &m7).await;
        assert!(rx.try_recv().is_ok());

        let m8 = lifecycle_with(OrderStatus::Revealed, 8);
        s.on_phase_observed(8, EpochPhase::Settle, &m8).await;
        assert!(matches!(
            rx.try_recv(),
            Ok(ActionCmd::SettleEpoch { epoch_id: 8 }),
        ));
    }

    #[tokio::test]
    async fn test_reveal_waits_for_locally_known_orders() {
        let (mut s, mut rx) = scheduler(SchedulerConfig::default());
        let empty = OrderLifecycleMachine::new();

        // Reveal observed before orders were loaded: watermark stays unset.
        s.on_phase_observed(7, EpochPhase::Reveal, &empty).await;
        assert!(rx.try_recv().is_err());

        let m = lifecycle_with(OrderStatus::Committed, 7);
        s.on_phase_observed(7, EpochPhase::Reveal, &m).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_watermark_survives_view_rebuild() {
        let (mut s, mut rx) = scheduler(SchedulerConfig::default());
        let m = lifecycle_with(OrderStatus::Revealed, 7);
        s.on_phase_observed(7, EpochPhase::Settle, &m).await;
        assert!(rx.try_recv().is_ok());

        // The display layer rebuilt its state from scratch; the scheduler
        // (session-lived) still suppresses a second settle for the epoch.
        let rebuilt = lifecycle_with(OrderStatus::Revealed, 7);
        s.on_phase_observed(7, EpochPhase::Settle, &rebuilt).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reset_clears_watermarks() {
        let (mut s, mut rx) = scheduler(SchedulerConfig::default());
        let m = lifecycle_with(OrderStatus::Revealed, 7);
        s.on_phase_observed(7, EpochPhase::Settle, &m).await;
        assert!(rx.try_recv().is_ok());

        s.reset("0xother".into());
        s.on_phase_observed(7, EpochPhase::Settle, &m).await;
        assert!(rx.try_recv().is_ok());
    }
}

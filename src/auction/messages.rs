//! Channel message types between the orchestrator's actors, plus the
//! collaborator traits for the two external surfaces this client consumes
//! (ledger reads, transaction submission).
//!
//! CRITICAL: only the orchestrator loop mutates shared caches. The stream
//! listener and executor communicate with it exclusively through these
//! messages.

use alloy_primitives::U256;
use async_trait::async_trait;
use serde_json::Value;

use super::error::ProtocolError;
use super::types::{DepthView, EpochState, Order, PnlReport, TradeRecord};

// ─────────────────────────────────────────────────────────
// Push-event stream → Orchestrator
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventKind {
    OrderCommitted,
    OrderRevealed,
    OrderFilled,
    OrderCancelled,
    EpochSettled,
    Deposited,
    Withdrawn,
}

/// A decoded push-stream event. Fields are optional because event types
/// carry different payloads; the orchestrator ignores what it doesn't need.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub kind: StreamEventKind,
    pub trader: String,
    pub tx_hash: Option<String>,
    pub order_id: Option<U256>,
    pub price: Option<U256>,
    pub amount: Option<U256>,
    pub epoch_id: Option<u64>,
    pub timestamp_ms: u64,
}

// ─────────────────────────────────────────────────────────
// Scheduler → Executor (auto-action commands)
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Reveal,
    Settle,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Reveal => "reveal",
            ActionKind::Settle => "settle",
        }
    }
}

/// Automatic protocol actions. Fire-and-forget from the orchestrator's
/// control flow: once sent, only the resulting `ActionResult` comes back.
#[derive(Debug, Clone)]
pub enum ActionCmd {
    /// Reveal every committed order of the epoch.
    RevealOrders {
        epoch_id: u64,
        order_ids: Vec<U256>,
    },
    /// Trigger settlement for the epoch.
    SettleEpoch { epoch_id: u64 },
}

impl ActionCmd {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionCmd::RevealOrders { .. } => ActionKind::Reveal,
            ActionCmd::SettleEpoch { .. } => ActionKind::Settle,
        }
    }

    pub fn epoch_id(&self) -> u64 {
        match self {
            ActionCmd::RevealOrders { epoch_id, .. } => *epoch_id,
            ActionCmd::SettleEpoch { epoch_id } => *epoch_id,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Executor → Orchestrator (submission outcomes)
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum ActionResult {
    Submitted {
        kind: ActionKind,
        epoch_id: u64,
        tx_hash: String,
    },
    Failed {
        kind: ActionKind,
        epoch_id: u64,
        error: ProtocolError,
    },
}

// ─────────────────────────────────────────────────────────
// Orchestrator → presentation layer
// ─────────────────────────────────────────────────────────

/// Full display state, broadcast over a `watch` channel after every
/// mutation pass. The presentation layer only ever reads this.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorSnapshot {
    pub epoch: Option<EpochState>,
    pub orders: Vec<Order>,
    pub trades: Vec<TradeRecord>,
    pub depth: DepthView,
    pub pnl: PnlReport,
}

// ─────────────────────────────────────────────────────────
// External collaborators (interfaces only)
// ─────────────────────────────────────────────────────────

/// One contract call in a submission batch.
#[derive(Debug, Clone)]
pub struct ContractCall {
    pub method: String,
    pub args: Vec<Value>,
}

/// Ledger read surface. Returns raw payloads in any of the wire encodings
/// the decoder understands; payloads may be partial or malformed and the
/// decoder isolates those per record.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn read_epoch(&self) -> anyhow::Result<Value>;
    async fn read_orders(&self, wallet: &str) -> anyhow::Result<Vec<Value>>;
    async fn read_depth(&self, pair: &str) -> anyhow::Result<Value>;
    async fn read_trades(&self, pair: &str) -> anyhow::Result<Vec<Value>>;
}

/// Transaction submission surface. Returns a tx hash, or an error whose
/// message text gets classified through `ProtocolError::classify`.
/// Timeouts are this collaborator's responsibility, not the orchestrator's.
#[async_trait]
pub trait TxSubmitter: Send + Sync {
    async fn submit(&self, calls: Vec<ContractCall>) -> anyhow::Result<String>;
}

//! Domain types for the batch-auction client.
//!
//! All ledger-native magnitudes (prices, amounts, order ids) are kept as
//! unscaled `U256` with the pair's decimal scale carried separately in
//! config. Display formatting happens once, in the decoder, via integer
//! div/rem — never through f64.

use alloy_primitives::{I256, U256};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────
// Epoch
// ─────────────────────────────────────────────────────────

/// Protocol phase within an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EpochPhase {
    Commit,
    Reveal,
    Settle,
    Closed,
}

impl EpochPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpochPhase::Commit => "commit",
            EpochPhase::Reveal => "reveal",
            EpochPhase::Settle => "settle",
            EpochPhase::Closed => "closed",
        }
    }
}

/// Last known epoch state, authoritative or locally interpolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochState {
    pub epoch_id: u64,
    pub phase: EpochPhase,
    pub seconds_remaining: u64,
    /// True when this snapshot came from a live ledger read,
    /// false when the local one-second tick interpolated it.
    pub is_authoritative: bool,
}

// ─────────────────────────────────────────────────────────
// Orders
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// Order lifecycle status. Forward-only along
/// committed → revealed → filled → claimed, with cancelled/expired
/// reachable from committed or revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Committed,
    Revealed,
    Filled,
    Claimed,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Claimed | OrderStatus::Cancelled | OrderStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Committed => "committed",
            OrderStatus::Revealed => "revealed",
            OrderStatus::Filled => "filled",
            OrderStatus::Claimed => "claimed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
        }
    }
}

/// A tracked auction order. Created on first observation from any source,
/// updated in place afterwards so locally known fields (commit_tx,
/// reveal_tx) survive authoritative reads that lack them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: U256,
    pub side: OrderSide,
    pub pair: String,
    pub price: U256,
    pub amount: U256,
    pub fill_amount: U256,
    pub clearing_price: U256,
    pub status: OrderStatus,
    pub epoch_id: u64,
    pub commit_tx: Option<String>,
    pub reveal_tx: Option<String>,
}

// ─────────────────────────────────────────────────────────
// Trades
// ─────────────────────────────────────────────────────────

/// Which feed a trade record came from. Priority decides merge winners:
/// stream beats poll beats history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSource {
    Stream,
    Poll,
    History,
}

impl TradeSource {
    pub fn priority(&self) -> u8 {
        match self {
            TradeSource::Stream => 2,
            TradeSource::Poll => 1,
            TradeSource::History => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSource::Stream => "stream",
            TradeSource::Poll => "poll",
            TradeSource::History => "history",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Source-specific identifier. Absent on some poll payloads.
    pub trade_id: Option<String>,
    pub price: U256,
    pub amount: U256,
    pub timestamp_ms: u64,
    pub source: TradeSource,
}

impl TradeRecord {
    /// Cross-source dedup key: the identifier when present,
    /// timestamp fallback otherwise.
    pub fn dedup_key(&self) -> String {
        match &self.trade_id {
            Some(id) => format!("id:{id}"),
            None => format!("ts:{}", self.timestamp_ms),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Depth
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: U256,
    pub amount: U256,
    pub order_count: u32,
    pub side: OrderSide,
}

/// A depth level scaled for display against its own side's maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthRow {
    pub level: DepthLevel,
    /// amount × 100 / max_amount_on_side, 0 when the side max is 0.
    pub display_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthView {
    /// Sorted by price descending.
    pub bids: Vec<DepthRow>,
    /// Sorted by price ascending.
    pub asks: Vec<DepthRow>,
    /// best ask − best bid; zero when either side is empty.
    pub spread: U256,
}

// ─────────────────────────────────────────────────────────
// P&L
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnlEntry {
    pub order_id: U256,
    pub side: OrderSide,
    pub entry_price: U256,
    pub clearing_price: U256,
    pub fill_amount: U256,
    /// Realized P&L in scaled ledger units. Signed.
    pub pnl: I256,
    pub pnl_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PnlReport {
    pub entries: Vec<PnlEntry>,
    pub total_pnl: I256,
    /// Share of entries with pnl > 0, as a percentage of total entries.
    pub win_rate_pct: f64,
    pub avg_fill: U256,
    pub best: Option<PnlEntry>,
    pub worst: Option<PnlEntry>,
    /// Entries dropped for zero/unparsable components (logged, not zeroed).
    pub skipped: usize,
}

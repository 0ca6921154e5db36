//! Client-side orchestrator for a commit-reveal batch-auction trading
//! protocol. Tracks epoch phases, order lifecycles, and trade history
//! across three sources of unequal trust (push stream, contract polls,
//! history service), and fires reveal/settle transactions exactly once
//! per epoch per wallet.

pub mod auction;

pub use auction::error::{DecodeError, ProtocolError};
pub use auction::messages::{
    ActionCmd, ActionResult, ContractCall, LedgerReader, OrchestratorSnapshot, StreamEvent,
    TxSubmitter,
};
pub use auction::orchestrator::{Orchestrator, OrchestratorConfig};
pub use auction::types::{
    DepthView, EpochPhase, EpochState, Order, OrderSide, OrderStatus, PnlReport, TradeRecord,
    TradeSource,
};

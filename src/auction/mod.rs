// ─── Protocol state machine + reconciliation core ───
pub mod epoch;
pub mod lifecycle;
pub mod orchestrator;
pub mod reconciler;
pub mod scheduler;

// ─── Decoding and derived views ───
pub mod decoder;
pub mod depth;
pub mod pnl;

// ─── External surfaces ───
pub mod executor;
pub mod history;
pub mod stream;

// ─── Shared types ───
pub mod error;
pub mod messages;
pub mod types;

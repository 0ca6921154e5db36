//! Error taxonomy for submission failures and wire decoding.
//!
//! Transaction submission errors arrive as raw message text from the wallet
//! or RPC layer; `ProtocolError::classify` maps known substrings onto typed
//! kinds so callers can branch on the kind instead of re-parsing strings.

use thiserror::Error;

/// A single field or record failed to decode. Callers skip the offending
/// record and keep the rest of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unsupported integer shape: {0}")]
    UnsupportedIntShape(String),
    #[error("unsupported tuple shape: {0}")]
    UnsupportedTupleShape(String),
    #[error("missing field `{0}`")]
    MissingField(String),
    #[error("unparsable value for `{field}`: {raw}")]
    Unparsable { field: String, raw: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractStateKind {
    NotOwner,
    NotFound,
    InactivePair,
}

impl std::fmt::Display for ContractStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContractStateKind::NotOwner => "not-owner",
            ContractStateKind::NotFound => "not-found",
            ContractStateKind::InactivePair => "inactive-pair",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("user rejected the transaction")]
    UserRejected,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("simulation failed: {0}")]
    SimulationFailed(String),
    #[error("contract state error: {0}")]
    ContractState(ContractStateKind),
    #[error(transparent)]
    Decoding(#[from] DecodeError),
    #[error("network error: {0}")]
    Network(String),
    #[error("unknown error: {0}")]
    Unknown(String),
}

const MAX_RAW_LEN: usize = 160;

impl ProtocolError {
    /// Classify a raw submission error message by known substrings,
    /// case-insensitive. Falls back to `Unknown` with the message truncated.
    pub fn classify(raw: &str) -> Self {
        let lower = raw.to_lowercase();

        if lower.contains("user rejected")
            || lower.contains("user denied")
            || lower.contains("rejected by user")
        {
            return ProtocolError::UserRejected;
        }
        if lower.contains("insufficient funds") || lower.contains("insufficient balance") {
            return ProtocolError::InsufficientFunds;
        }
        if lower.contains("not owner") || lower.contains("caller is not the owner") {
            return ProtocolError::ContractState(ContractStateKind::NotOwner);
        }
        if lower.contains("not found") || lower.contains("no such order") {
            return ProtocolError::ContractState(ContractStateKind::NotFound);
        }
        if lower.contains("inactive pair") || lower.contains("pair not active") {
            return ProtocolError::ContractState(ContractStateKind::InactivePair);
        }
        if lower.contains("simulation failed")
            || lower.contains("execution reverted")
            || lower.contains("revert")
        {
            return ProtocolError::SimulationFailed(truncate(raw));
        }
        if lower.contains("timeout")
            || lower.contains("connection")
            || lower.contains("network")
            || lower.contains("503")
            || lower.contains("502")
        {
            return ProtocolError::Network(truncate(raw));
        }

        ProtocolError::Unknown(truncate(raw))
    }

    /// Network and decoding failures are retried/skipped locally and never
    /// surfaced to the caller; everything else is.
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(self, ProtocolError::Network(_) | ProtocolError::Decoding(_))
    }
}

fn truncate(raw: &str) -> String {
    if raw.len() <= MAX_RAW_LEN {
        raw.to_string()
    } else {
        let mut end = MAX_RAW_LEN;
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &raw[..end])
    }
}

//! Action Executor — turns scheduler commands into contract-call batches
//! and submits them.
//!
//! Submissions are real transactions against the settlement contract and
//! cannot be cancelled once sent. The executor never mutates shared state;
//! it only reports outcomes back over the result channel, with raw error
//! text classified through the taxonomy.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::error::ProtocolError;
use super::messages::{ActionCmd, ActionResult, ContractCall, TxSubmitter};

pub struct ActionExecutor {
    submitter: Arc<dyn TxSubmitter>,
    cmd_rx: mpsc::Receiver<ActionCmd>,
    result_tx: mpsc::Sender<ActionResult>,
}

impl ActionExecutor {
    pub fn new(
        submitter: Arc<dyn TxSubmitter>,
        cmd_rx: mpsc::Receiver<ActionCmd>,
        result_tx: mpsc::Sender<ActionResult>,
    ) -> Self {
        Self {
            submitter,
            cmd_rx,
            result_tx,
        }
    }

    pub async fn run(mut self) {
        info!("⚡ ActionExecutor started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            let kind = cmd.kind();
            let epoch_id = cmd.epoch_id();
            let calls = build_calls(&cmd);

            info!(
                "⚡ Submitting {} for epoch {} ({} call(s))",
                kind.as_str(),
                epoch_id,
                calls.len(),
            );

            let result = match self.submitter.submit(calls).await {
                Ok(tx_hash) => {
                    info!(
                        "✅ {} epoch {} tx={}",
                        kind.as_str(),
                        epoch_id,
                        &tx_hash[..10.min(tx_hash.len())],
                    );
                    ActionResult::Submitted {
                        kind,
                        epoch_id,
                        tx_hash,
                    }
                }
                Err(e) => {
                    let error = ProtocolError::classify(&e.to_string());
                    warn!("❌ {} epoch {} failed: {}", kind.as_str(), epoch_id, error);
                    ActionResult::Failed {
                        kind,
                        epoch_id,
                        error,
                    }
                }
            };

            let _ = self.result_tx.send(result).await;
        }

        info!("⚡ ActionExecutor shutting down (channel closed)");
    }
}

fn build_calls(cmd: &ActionCmd) -> Vec<ContractCall> {
    match cmd {
        ActionCmd::RevealOrders {
            epoch_id,
            order_ids,
        } => order_ids
            .iter()
            .map(|id| ContractCall {
                method: "reveal_order".into(),
                args: vec![json!(epoch_id), json!(id.to_string())],
            })
            .collect(),
        ActionCmd::SettleEpoch { epoch_id } => vec![ContractCall {
            method: "settle_epoch".into(),
            args: vec![json!(epoch_id)],
        }],
    }
}

//! OrderLifecycleMachine — per-order commit → reveal → settle → claim
//! tracking.
//!
//! Status moves forward only: committed → revealed → filled → claimed, with
//! cancelled/expired reachable from committed or revealed. Observations
//! that would regress or jump the graph are rejected and logged as data
//! inconsistencies, never applied. Orders are updated in place so locally
//! known fields (commit_tx, reveal_tx) survive authoritative reads that
//! don't carry them.

use std::collections::HashMap;

use alloy_primitives::U256;
use tracing::{debug, info, warn};

use super::types::{Order, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    Created,
    Updated,
    Unchanged,
    /// The reported status violated the transition graph; kept local state.
    Rejected,
}

/// Whether moving `from` → `to` follows the lifecycle graph.
fn transition_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Committed, Revealed)
            | (Revealed, Filled)
            | (Filled, Claimed)
            | (Committed, Cancelled)
            | (Committed, Expired)
            | (Revealed, Cancelled)
            | (Revealed, Expired)
    )
}

#[derive(Debug, Default)]
pub struct OrderLifecycleMachine {
    orders: HashMap<U256, Order>,
    /// Commit tx hashes seen on the stream before the order itself; drained
    /// when the order is first observed.
    pending_commit_tx: HashMap<U256, String>,
}

impl OrderLifecycleMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an observation from any source. Creates the order on first
    /// sight with whatever status the source reports; afterwards merges
    /// field-by-field and applies the status only if the graph allows it.
    pub fn observe(&mut self, mut incoming: Order) -> ObserveOutcome {
        let Some(existing) = self.orders.get_mut(&incoming.order_id) else {
            if incoming.commit_tx.is_none() {
                incoming.commit_tx = self.pending_commit_tx.remove(&incoming.order_id);
            }
            debug!(
                "📒 New order {} {} {} status={}",
                incoming.order_id,
                incoming.side.as_str(),
                incoming.pair,
                incoming.status.as_str(),
            );
            self.orders.insert(incoming.order_id, incoming);
            return ObserveOutcome::Created;
        };

        // Tx hashes are locally known data that authoritative reads lack;
        // keep them even when the rest of the observation is inconsistent.
        let mut changed = false;
        if incoming.commit_tx.is_some() && existing.commit_tx != incoming.commit_tx {
            existing.commit_tx = incoming.commit_tx.clone();
            changed = true;
        }
        if incoming.reveal_tx.is_some() && existing.reveal_tx != incoming.reveal_tx {
            existing.reveal_tx = incoming.reveal_tx.clone();
            changed = true;
        }

        if incoming.status != existing.status
            && !transition_allowed(existing.status, incoming.status)
        {
            warn!(
                "📒 Inconsistent status for order {}: {} → {} rejected",
                existing.order_id,
                existing.status.as_str(),
                incoming.status.as_str(),
            );
            return ObserveOutcome::Rejected;
        }

        if !incoming.fill_amount.is_zero() && existing.fill_amount != incoming.fill_amount {
            existing.fill_amount = incoming.fill_amount;
            changed = true;
        }
        if !incoming.clearing_price.is_zero() && existing.clearing_price != incoming.clearing_price
        {
            existing.clearing_price = incoming.clearing_price;
            changed = true;
        }

        if incoming.status == existing.status {
            return if changed {
                ObserveOutcome::Updated
            } else {
                ObserveOutcome::Unchanged
            };
        }

        info!(
            "📒 Order {} {} → {}",
            existing.order_id,
            existing.status.as_str(),
            incoming.status.as_str(),
        );
        existing.status = incoming.status;
        ObserveOutcome::Updated
    }

    /// Attach a commit transaction hash observed on the stream. Only the
    /// stream carries it; later authoritative reads won't, so it must be
    /// recorded on the local copy. Hashes arriving before the order itself
    /// are buffered until the first observation creates it.
    pub fn note_commit_tx(&mut self, order_id: U256, tx_hash: &str) {
        match self.orders.get_mut(&order_id) {
            Some(order) if order.commit_tx.is_none() => {
                order.commit_tx = Some(tx_hash.to_string());
            }
            Some(_) => {}
            None => {
                debug!("📒 Buffering commit tx for not-yet-known order {order_id}");
                self.pending_commit_tx
                    .entry(order_id)
                    .or_insert_with(|| tx_hash.to_string());
            }
        }
    }

    /// A reveal transaction confirmed for this order. The hash is optional
    /// because some stream frames omit it; absence leaves `reveal_tx` alone.
    pub fn confirm_reveal(&mut self, order_id: U256, tx_hash: Option<&str>) -> bool {
        self.apply_status(order_id, OrderStatus::Revealed, |o| {
            if let Some(tx) = tx_hash.filter(|t| !t.is_empty()) {
                o.reveal_tx = Some(tx.to_string());
            }
        })
    }

    /// Authoritative read reported a clearing price and fill amount for the
    /// order's epoch. Only reachable from revealed.
    pub fn mark_filled(&mut self, order_id: U256, clearing_price: U256, fill_amount: U256) -> bool {
        self.apply_status(order_id, OrderStatus::Filled, |o| {
            o.clearing_price = clearing_price;
            o.fill_amount = fill_amount;
        })
    }

    /// A claim transaction confirmed.
    pub fn confirm_claim(&mut self, order_id: U256) -> bool {
        self.apply_status(order_id, OrderStatus::Claimed, |_| {})
    }

    pub fn mark_cancelled(&mut self, order_id: U256) -> bool {
        self.apply_status(order_id, OrderStatus::Cancelled, |_| {})
    }

    fn apply_status(
        &mut self,
        order_id: U256,
        to: OrderStatus,
        update: impl FnOnce(&mut Order),
    ) -> bool {
        let Some(order) = self.orders.get_mut(&order_id) else {
            warn!("📒 Status report for unknown order {order_id} ({})", to.as_str());
            return false;
        };
        if order.status == to {
            update(order);
            return false;
        }
        if !transition_allowed(order.status, to) {
            warn!(
                "📒 Inconsistent status for order {}: {} → {} rejected",
                order_id,
                order.status.as_str(),
                to.as_str(),
            );
            return false;
        }
        info!("📒 Order {} {} → {}", order_id, order.status.as_str(), to.as_str());
        order.status = to;
        update(order);
        true
    }

    pub fn get(&self, order_id: &U256) -> Option<&Order> {
        self.orders.get(order_id)
    }

    pub fn orders(&self) -> Vec<Order> {
        let mut out: Vec<Order> = self.orders.values().cloned().collect();
        out.sort_by(|a, b| b.epoch_id.cmp(&a.epoch_id).then(a.order_id.cmp(&b.order_id)));
        out
    }

    /// Order ids in an epoch currently at the given status.
    pub fn order_ids_in(&self, epoch_id: u64, status: OrderStatus) -> Vec<U256> {
        let mut ids: Vec<U256> = self
            .orders
            .values()
            .filter(|o| o.epoch_id == epoch_id && o.status == status)
            .map(|o| o.order_id)
            .collect();
        ids.sort();
        ids
    }
}

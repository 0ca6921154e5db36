//! PnLAggregator — realized profit/loss per settled order plus aggregate
//! statistics.
//!
//! All P&L math runs on signed 256-bit integers over the unscaled ledger
//! values; f64 appears only in the display-grade percentage fields.
//! Entries with a zero or unparsable component are excluded from the list
//! and the aggregates, and the exclusion is logged — never treated as a
//! zero P&L.

use alloy_primitives::{I256, U256};
use tracing::warn;

use super::types::{Order, OrderSide, OrderStatus, PnlEntry, PnlReport};

/// Compute realized P&L over every filled or claimed order.
pub fn aggregate(orders: &[Order]) -> PnlReport {
    let mut entries = Vec::new();
    let mut skipped = 0usize;

    for order in orders {
        if !matches!(order.status, OrderStatus::Filled | OrderStatus::Claimed) {
            continue;
        }
        match entry_for(order) {
            Some(entry) => entries.push(entry),
            None => {
                skipped += 1;
                warn!(
                    "📊 Excluding order {} from P&L: zero or unrepresentable component \
                     (entry={} clearing={} fill={})",
                    order.order_id, order.price, order.clearing_price, order.fill_amount,
                );
            }
        }
    }

    let total_pnl = entries
        .iter()
        .fold(I256::ZERO, |acc, e| acc.saturating_add(e.pnl));
    let wins = entries.iter().filter(|e| e.pnl > I256::ZERO).count();
    let win_rate_pct = if entries.is_empty() {
        0.0
    } else {
        wins as f64 * 100.0 / entries.len() as f64
    };
    let avg_fill = if entries.is_empty() {
        U256::ZERO
    } else {
        let sum = entries
            .iter()
            .fold(U256::ZERO, |acc, e| acc.saturating_add(e.fill_amount));
        sum / U256::from(entries.len() as u64)
    };
    let best = entries.iter().max_by_key(|e| e.pnl).cloned();
    let worst = entries.iter().min_by_key(|e| e.pnl).cloned();

    PnlReport {
        entries,
        total_pnl,
        win_rate_pct,
        avg_fill,
        best,
        worst,
        skipped,
    }
}

/// P&L for one settled order, or None when any component is zero or does
/// not fit signed 256-bit math.
fn entry_for(order: &Order) -> Option<PnlEntry> {
    if order.price.is_zero() || order.clearing_price.is_zero() || order.fill_amount.is_zero() {
        return None;
    }

    let entry = to_signed(order.price)?;
    let clearing = to_signed(order.clearing_price)?;
    let fill = to_signed(order.fill_amount)?;

    let diff = match order.side {
        OrderSide::Buy => entry.checked_sub(clearing)?,
        OrderSide::Sell => clearing.checked_sub(entry)?,
    };
    let pnl = diff.checked_mul(fill)?;

    let basis = entry.checked_mul(fill)?;
    let pnl_percent = if basis.is_zero() {
        0.0
    } else {
        to_f64(pnl) / to_f64(basis) * 100.0
    };

    Some(PnlEntry {
        order_id: order.order_id,
        side: order.side,
        entry_price: order.price,
        clearing_price: order.clearing_price,
        fill_amount: order.fill_amount,
        pnl,
        pnl_percent,
    })
}

fn to_signed(value: U256) -> Option<I256> {
    I256::try_from(value).ok()
}

/// Display-grade conversion. Precision loss above 2^53 is acceptable here
/// because the value only feeds the percentage field.
fn to_f64(value: I256) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(0.0)
}

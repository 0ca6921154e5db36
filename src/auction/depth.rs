//! OrderBookDepthProjector — raw depth levels into a display-ready,
//! percentage-scaled ladder with spread.

use alloy_primitives::U256;

use super::types::{DepthLevel, DepthRow, DepthView};

/// Project raw bid/ask levels. Bids come out sorted by price descending,
/// asks ascending; each level's display percentage is scaled against its
/// own side's maximum amount; spread is best ask − best bid, zero when
/// either side is empty.
pub fn project(mut bids: Vec<DepthLevel>, mut asks: Vec<DepthLevel>) -> DepthView {
    bids.sort_by(|a, b| b.price.cmp(&a.price));
    asks.sort_by(|a, b| a.price.cmp(&b.price));

    let spread = match (bids.first(), asks.first()) {
        (Some(bid), Some(ask)) => ask.price.saturating_sub(bid.price),
        _ => U256::ZERO,
    };

    DepthView {
        bids: scale_side(bids),
        asks: scale_side(asks),
        spread,
    }
}

fn scale_side(levels: Vec<DepthLevel>) -> Vec<DepthRow> {
    let max = levels
        .iter()
        .map(|l| l.amount)
        .max()
        .unwrap_or(U256::ZERO);

    levels
        .into_iter()
        .map(|level| DepthRow {
            display_pct: pct_of(level.amount, max),
            level,
        })
        .collect()
}

/// amount × 100 / max in integer basis points, then to f64 — full 256-bit
/// precision in the division, two decimals in the result.
fn pct_of(amount: U256, max: U256) -> f64 {
    if max.is_zero() {
        return 0.0;
    }
    let bps = amount.saturating_mul(U256::from(10_000u64)) / max;
    u64::try_from(bps).map(|b| b as f64 / 100.0).unwrap_or(0.0)
}

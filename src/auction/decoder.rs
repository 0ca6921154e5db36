//! OnChainDecoder — normalizes heterogeneous wire encodings into canonical
//! domain values.
//!
//! The ledger read surface returns the same logical data in several shapes
//! depending on the RPC path: integers as native big ints, plain numbers,
//! numeric strings, or split `{low, high}` structs; tuples as positional
//! arrays, `{"0": .., "1": ..}` index-keyed maps, or named-field maps.
//! Every shape is decoded explicitly; anything else fails loudly as a
//! `DecodeError` for that field only, so callers skip the offending record
//! and keep the batch.

use alloy_primitives::U256;
use chrono::DateTime;
use serde_json::Value;
use tracing::warn;

use super::error::DecodeError;
use super::types::{
    DepthLevel, EpochPhase, EpochState, Order, OrderSide, OrderStatus, TradeRecord, TradeSource,
};

// ─────────────────────────────────────────────────────────
// Integers
// ─────────────────────────────────────────────────────────

/// Decode a raw integer field into a canonical unsigned 256-bit value.
///
/// Accepted shapes: JSON number, decimal or 0x-hex string, and a split
/// `{low, high}` struct combined as `low + (high << 128)`.
pub fn decode_u256(value: &Value) -> Result<U256, DecodeError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| DecodeError::Unparsable {
                field: "<number>".into(),
                raw: n.to_string(),
            }),
        Value::String(s) => parse_u256_str(s),
        Value::Object(map) => {
            let low = map
                .get("low")
                .ok_or_else(|| DecodeError::MissingField("low".into()))?;
            let high = map
                .get("high")
                .ok_or_else(|| DecodeError::MissingField("high".into()))?;
            let low = decode_u256(low)?;
            let high = decode_u256(high)?;
            if low.bit_len() > 128 || high.bit_len() > 128 {
                return Err(DecodeError::Unparsable {
                    field: "low/high".into(),
                    raw: format!("low={low} high={high}"),
                });
            }
            Ok(low + (high << 128))
        }
        other => Err(DecodeError::UnsupportedIntShape(shape_name(other).into())),
    }
}

fn parse_u256_str(s: &str) -> Result<U256, DecodeError> {
    let t = s.trim();
    let parsed = if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        U256::from_str_radix(hex, 16)
    } else {
        U256::from_str_radix(t, 10)
    };
    parsed.map_err(|_| DecodeError::Unparsable {
        field: "<string>".into(),
        raw: t.to_string(),
    })
}

/// Decode a field that must fit in u64 (epoch ids, counts, timestamps).
pub fn decode_u64(value: &Value) -> Result<u64, DecodeError> {
    let wide = decode_u256(value)?;
    u64::try_from(wide).map_err(|_| DecodeError::Unparsable {
        field: "<u64>".into(),
        raw: wide.to_string(),
    })
}

// ─────────────────────────────────────────────────────────
// Tuples
// ─────────────────────────────────────────────────────────

/// Fetch one tuple field by position and name, covering the three tuple
/// shapes: positional array, index-keyed map, named-field map.
fn tuple_field<'a>(value: &'a Value, idx: usize, name: &str) -> Option<&'a Value> {
    match value {
        Value::Array(arr) => arr.get(idx),
        Value::Object(map) => map.get(&idx.to_string()).or_else(|| map.get(name)),
        _ => None,
    }
}

/// Decode a tuple/struct field into its named parts, in declared order.
pub fn decode_tuple<'a>(
    value: &'a Value,
    names: &[&str],
) -> Result<Vec<&'a Value>, DecodeError> {
    if !value.is_array() && !value.is_object() {
        return Err(DecodeError::UnsupportedTupleShape(
            shape_name(value).into(),
        ));
    }
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            tuple_field(value, i, name).ok_or_else(|| DecodeError::MissingField((*name).into()))
        })
        .collect()
}

// ─────────────────────────────────────────────────────────
// Display formatting
// ─────────────────────────────────────────────────────────

/// Format an unscaled ledger value against its decimal scale using integer
/// div/rem. Never touches f64, so values above 2^53 keep full precision.
pub fn format_units(value: U256, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let divisor = U256::from(10u64).pow(U256::from(decimals as u64));
    let int = value / divisor;
    let rem = value % divisor;
    if rem.is_zero() {
        return int.to_string();
    }
    let frac = format!("{:0>width$}", rem.to_string(), width = decimals as usize);
    let frac = frac.trim_end_matches('0');
    format!("{int}.{frac}")
}

// ─────────────────────────────────────────────────────────
// Enum fields
// ─────────────────────────────────────────────────────────

pub fn decode_phase(value: &Value) -> Result<EpochPhase, DecodeError> {
    if let Some(s) = value.as_str() {
        return match s.to_lowercase().as_str() {
            "commit" => Ok(EpochPhase::Commit),
            "reveal" => Ok(EpochPhase::Reveal),
            "settle" => Ok(EpochPhase::Settle),
            "closed" => Ok(EpochPhase::Closed),
            other => Err(DecodeError::Unparsable {
                field: "phase".into(),
                raw: other.to_string(),
            }),
        };
    }
    match decode_u64(value)? {
        0 => Ok(EpochPhase::Commit),
        1 => Ok(EpochPhase::Reveal),
        2 => Ok(EpochPhase::Settle),
        3 => Ok(EpochPhase::Closed),
        n => Err(DecodeError::Unparsable {
            field: "phase".into(),
            raw: n.to_string(),
        }),
    }
}

pub fn decode_side(value: &Value) -> Result<OrderSide, DecodeError> {
    if let Some(s) = value.as_str() {
        return match s.to_lowercase().as_str() {
            "buy" | "bid" => Ok(OrderSide::Buy),
            "sell" | "ask" => Ok(OrderSide::Sell),
            other => Err(DecodeError::Unparsable {
                field: "side".into(),
                raw: other.to_string(),
            }),
        };
    }
    match decode_u64(value)? {
        0 => Ok(OrderSide::Buy),
        1 => Ok(OrderSide::Sell),
        n => Err(DecodeError::Unparsable {
            field: "side".into(),
            raw: n.to_string(),
        }),
    }
}

pub fn decode_status(value: &Value) -> Result<OrderStatus, DecodeError> {
    if let Some(s) = value.as_str() {
        return match s.to_lowercase().as_str() {
            "committed" => Ok(OrderStatus::Committed),
            "revealed" => Ok(OrderStatus::Revealed),
            "filled" => Ok(OrderStatus::Filled),
            "claimed" => Ok(OrderStatus::Claimed),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            "expired" => Ok(OrderStatus::Expired),
            other => Err(DecodeError::Unparsable {
                field: "status".into(),
                raw: other.to_string(),
            }),
        };
    }
    match decode_u64(value)? {
        0 => Ok(OrderStatus::Committed),
        1 => Ok(OrderStatus::Revealed),
        2 => Ok(OrderStatus::Filled),
        3 => Ok(OrderStatus::Claimed),
        4 => Ok(OrderStatus::Cancelled),
        5 => Ok(OrderStatus::Expired),
        n => Err(DecodeError::Unparsable {
            field: "status".into(),
            raw: n.to_string(),
        }),
    }
}

/// Timestamps arrive as epoch milliseconds (number or numeric string) or
/// RFC3339 strings from the history service.
pub fn decode_timestamp_ms(value: &Value) -> Result<u64, DecodeError> {
    if let Some(s) = value.as_str() {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
            return Ok(dt.timestamp_millis().max(0) as u64);
        }
    }
    decode_u64(value).map_err(|_| DecodeError::Unparsable {
        field: "timestamp".into(),
        raw: value.to_string(),
    })
}

// ─────────────────────────────────────────────────────────
// Record decoders
// ─────────────────────────────────────────────────────────

const EPOCH_FIELDS: [&str; 3] = ["epoch_id", "phase", "seconds_remaining"];

pub fn decode_epoch(value: &Value) -> Result<EpochState, DecodeError> {
    let fields = decode_tuple(value, &EPOCH_FIELDS)?;
    Ok(EpochState {
        epoch_id: decode_u64(fields[0])?,
        phase: decode_phase(fields[1])?,
        seconds_remaining: decode_u64(fields[2])?,
        is_authoritative: true,
    })
}

const ORDER_FIELDS: [&str; 9] = [
    "order_id",
    "side",
    "pair",
    "price",
    "amount",
    "fill_amount",
    "clearing_price",
    "status",
    "epoch_id",
];

pub fn decode_order(value: &Value) -> Result<Order, DecodeError> {
    let fields = decode_tuple(value, &ORDER_FIELDS)?;
    let pair = fields[2]
        .as_str()
        .ok_or_else(|| DecodeError::Unparsable {
            field: "pair".into(),
            raw: fields[2].to_string(),
        })?
        .to_string();

    // Tx hashes only exist in the named-field shape; positional reads
    // from the settlement contract don't carry them.
    let opt_tx = |name: &str| {
        value
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    Ok(Order {
        order_id: decode_u256(fields[0])?,
        side: decode_side(fields[1])?,
        pair,
        price: decode_u256(fields[3])?,
        amount: decode_u256(fields[4])?,
        fill_amount: decode_u256(fields[5])?,
        clearing_price: decode_u256(fields[6])?,
        status: decode_status(fields[7])?,
        epoch_id: decode_u64(fields[8])?,
        commit_tx: opt_tx("commit_tx"),
        reveal_tx: opt_tx("reveal_tx"),
    })
}

const TRADE_FIELDS: [&str; 3] = ["price", "amount", "timestamp"];

pub fn decode_trade(value: &Value, source: TradeSource) -> Result<TradeRecord, DecodeError> {
    let fields = decode_tuple(value, &TRADE_FIELDS)?;
    // trade_id is optional on poll payloads; dedup falls back to timestamp.
    let trade_id = tuple_field(value, 3, "trade_id").and_then(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    Ok(TradeRecord {
        trade_id,
        price: decode_u256(fields[0])?,
        amount: decode_u256(fields[1])?,
        timestamp_ms: decode_timestamp_ms(fields[2])?,
        source,
    })
}

const DEPTH_FIELDS: [&str; 3] = ["price", "amount", "order_count"];

pub fn decode_depth_level(value: &Value, side: OrderSide) -> Result<DepthLevel, DecodeError> {
    let fields = decode_tuple(value, &DEPTH_FIELDS)?;
    Ok(DepthLevel {
        price: decode_u256(fields[0])?,
        amount: decode_u256(fields[1])?,
        order_count: decode_u64(fields[2])? as u32,
        side,
    })
}

/// Decode a raw depth payload `{bids: [..], asks: [..]}` into level lists.
/// Malformed levels are skipped per record.
pub fn decode_depth(value: &Value) -> Result<(Vec<DepthLevel>, Vec<DepthLevel>), DecodeError> {
    let side_levels = |key: &str, side: OrderSide| -> Result<Vec<DepthLevel>, DecodeError> {
        let raw = value
            .get(key)
            .and_then(|v| v.as_array())
            .ok_or_else(|| DecodeError::MissingField(key.into()))?;
        Ok(decode_batch(raw, |lvl| decode_depth_level(lvl, side)).0)
    };
    Ok((
        side_levels("bids", OrderSide::Buy)?,
        side_levels("asks", OrderSide::Sell)?,
    ))
}

/// Decode a batch, skipping (and logging) records that fail so one
/// malformed record never aborts the rest.
pub fn decode_batch<T>(
    items: &[Value],
    f: impl Fn(&Value) -> Result<T, DecodeError>,
) -> (Vec<T>, usize) {
    let mut ok = Vec::with_capacity(items.len());
    let mut skipped = 0usize;
    for item in items {
        match f(item) {
            Ok(v) => ok.push(v),
            Err(e) => {
                skipped += 1;
                warn!("🧩 Skipping malformed record: {e}");
            }
        }
    }
    (ok, skipped)
}

fn shape_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_four_integer_shapes_agree() {
        // 2^130 + 7: low = 7, high = 4
        let canonical = (U256::from(1u64) << 130u32) + U256::from(7u64);

        let from_dec = decode_u256(&json!(canonical.to_string())).unwrap();
        let from_hex = decode_u256(&json!(format!("0x{canonical:x}"))).unwrap();
        let from_split = decode_u256(&json!({"low": "7", "high": "4"})).unwrap();
        assert_eq!(from_dec, canonical);
        assert_eq!(from_hex, canonical);
        assert_eq!(from_split, canonical);

        // Small values also agree with the plain-number shape.
        let small = U256::from(123_456u64);
        assert_eq!(decode_u256(&json!(123456)).unwrap(), small);
        assert_eq!(decode_u256(&json!("123456")).unwrap(), small);
        assert_eq!(
            decode_u256(&json!({"low": 123456, "high": 0})).unwrap(),
            small,
        );
    }

    #[test]
    fn test_unrecognized_shape_fails_loudly() {
        assert!(matches!(
            decode_u256(&json!(true)),
            Err(DecodeError::UnsupportedIntShape(_)),
        ));
        assert!(matches!(
            decode_u256(&json!(null)),
            Err(DecodeError::UnsupportedIntShape(_)),
        ));
        assert!(matches!(
            decode_u256(&json!("not-a-number")),
            Err(DecodeError::Unparsable { .. }),
        ));
        // {low, high} with a missing half
        assert!(matches!(
            decode_u256(&json!({"low": 1})),
            Err(DecodeError::MissingField(_)),
        ));
    }

    #[test]
    fn test_split_halves_must_fit_128_bits() {
        let too_wide = (U256::from(1u64) << 129u32).to_string();
        assert!(decode_u256(&json!({"low": too_wide, "high": "0"})).is_err());
    }

    #[test]
    fn test_three_tuple_shapes_agree() {
        let positional = json!(["42", "buy", "ETH-USDC", "2000", "10", "0", "0", "committed", 7]);
        let indexed = json!({
            "0": "42", "1": "buy", "2": "ETH-USDC", "3": "2000", "4": "10",
            "5": "0", "6": "0", "7": "committed", "8": 7
        });
        let named = json!({
            "order_id": "42", "side": "buy", "pair": "ETH-USDC",
            "price": "2000", "amount": "10", "fill_amount": "0",
            "clearing_price": "0", "status": "committed", "epoch_id": 7
        });

        let a = decode_order(&positional).unwrap();
        let b = decode_order(&indexed).unwrap();
        let c = decode_order(&named).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.order_id, U256::from(42u64));
        assert_eq!(a.epoch_id, 7);
    }

    #[test]
    fn test_named_shape_keeps_tx_hashes() {
        let named = json!({
            "order_id": "42", "side": "sell", "pair": "ETH-USDC",
            "price": "2000", "amount": "10", "fill_amount": "0",
            "clearing_price": "0", "status": "revealed", "epoch_id": 7,
            "commit_tx": "0xabc", "reveal_tx": "0xdef"
        });
        let o = decode_order(&named).unwrap();
        assert_eq!(o.commit_tx.as_deref(), Some("0xabc"));
        assert_eq!(o.reveal_tx.as_deref(), Some("0xdef"));
    }

    #[test]
    fn test_format_units_above_2_pow_53() {
        // 10^24 + 1 wei at 18 decimals — unrepresentable in f64.
        let v = U256::from(10u64).pow(U256::from(24u64)) + U256::from(1u64);
        assert_eq!(format_units(v, 18), "1000000.000000000000000001");
        assert_eq!(format_units(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_units(U256::from(42u64), 0), "42");
        assert_eq!(format_units(U256::ZERO, 18), "0");
    }

    #[test]
    fn test_decode_epoch() {
        let e = decode_epoch(&json!({"epoch_id": 12, "phase": "reveal", "seconds_remaining": 90}))
            .unwrap();
        assert_eq!(e.epoch_id, 12);
        assert_eq!(e.phase, EpochPhase::Reveal);
        assert_eq!(e.seconds_remaining, 90);
        assert!(e.is_authoritative);

        // Numeric phase encoding from positional reads.
        let e2 = decode_epoch(&json!([12, 1, 90])).unwrap();
        assert_eq!(e2.phase, EpochPhase::Reveal);
    }

    #[test]
    fn test_decode_trade_id_fallback() {
        let with_id =
            decode_trade(&json!({"price": "5", "amount": "2", "timestamp": 1000, "trade_id": "t-9"}),
                TradeSource::Poll)
            .unwrap();
        assert_eq!(with_id.dedup_key(), "id:t-9");

        let without_id =
            decode_trade(&json!({"price": "5", "amount": "2", "timestamp": 1000}), TradeSource::Poll)
                .unwrap();
        assert_eq!(without_id.dedup_key(), "ts:1000");
    }

    #[test]
    fn test_decode_timestamp_rfc3339() {
        let ms = decode_timestamp_ms(&json!("2026-01-01T00:00:00Z")).unwrap();
        assert_eq!(ms, 1_767_225_600_000);
        assert_eq!(decode_timestamp_ms(&json!(1000)).unwrap(), 1000);
        assert_eq!(decode_timestamp_ms(&json!("1000")).unwrap(), 1000);
    }

    #[test]
    fn test_batch_isolates_malformed_records() {
        let items = vec![
            json!({"price": "5", "amount": "2", "timestamp": 1000, "trade_id": "a"}),
            json!({"price": true, "amount": "2", "timestamp": 1000, "trade_id": "bad"}),
            json!({"price": "6", "amount": "3", "timestamp": 2000, "trade_id": "b"}),
        ];
        let (ok, skipped) = decode_batch(&items, |v| decode_trade(v, TradeSource::History));
        assert_eq!(ok.len(), 2);
        assert_eq!(skipped, 1);
        assert_eq!(ok[0].trade_id.as_deref(), Some("a"));
        assert_eq!(ok[1].trade_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_decode_depth_levels() {
        let payload = json!({
            "bids": [["9", "5", 1], ["8", "10", 2]],
            "asks": [{"price": "10", "amount": "3", "order_count": 1}]
        });
        let (bids, asks) = decode_depth(&payload).unwrap();
        assert_eq!(bids.len(), 2);
        assert_eq!(asks.len(), 1);
        assert_eq!(bids[0].side, OrderSide::Buy);
        assert_eq!(asks[0].price, U256::from(10u64));
    }
}

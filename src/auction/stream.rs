//! Push-event stream listener — WebSocket channel for protocol events.
//!
//! Connects to the settlement layer's event stream and forwards decoded
//! records to the orchestrator. Events arrive outside the poll cycle but
//! are merged only by the orchestrator loop, so this actor holds no shared
//! state.
//!
//! Architecture:
//!   event WS ──frame──→ parse ──→ StreamEvent ──→ orchestrator
//!
//! Reconnects on disconnect. A cross-reconnect dedup cache suppresses
//! replayed events so they are never counted twice.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::decoder;
use super::messages::{StreamEvent, StreamEventKind};

// ─────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// WebSocket base URL of the event stream.
    pub ws_url: String,
    /// Wallet address used as the subscription filter.
    pub trader: String,
    /// Trading pair to subscribe for market-wide events.
    pub pair: String,
}

// ─────────────────────────────────────────────────────────
// Cross-reconnect dedup cache
// ─────────────────────────────────────────────────────────

/// Bounded TTL cache keyed by event identity. Kept across reconnects so a
/// replay window after reconnect doesn't double-count events.
#[derive(Debug)]
struct DedupCache {
    seen_at: HashMap<String, Instant>,
    ttl: Duration,
    max_entries: usize,
}

impl DedupCache {
    fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            seen_at: HashMap::with_capacity(max_entries.min(4096)),
            ttl,
            max_entries,
        }
    }

    fn remember(&mut self, key: String) -> bool {
        let now = Instant::now();
        self.evict_expired(now);

        if self.seen_at.contains_key(&key) {
            return false;
        }
        self.seen_at.insert(key, now);
        self.evict_oldest_if_needed();
        true
    }

    fn evict_expired(&mut self, now: Instant) {
        let cutoff = now.checked_sub(self.ttl).unwrap_or(now);
        self.seen_at.retain(|_, ts| *ts >= cutoff);
    }

    fn evict_oldest_if_needed(&mut self) {
        while self.seen_at.len() > self.max_entries {
            let oldest = self
                .seen_at
                .iter()
                .min_by_key(|(_, ts)| *ts)
                .map(|(k, _)| k.clone());
            if let Some(key) = oldest {
                self.seen_at.remove(&key);
            } else {
                break;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────

pub struct StreamListener {
    cfg: StreamConfig,
    event_tx: mpsc::Sender<StreamEvent>,
}

impl StreamListener {
    pub fn new(cfg: StreamConfig, event_tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { cfg, event_tx }
    }

    /// Actor main loop. Connects, subscribes, listens; reconnects on
    /// disconnect with the dedup cache carried over.
    pub async fn run(self) {
        info!(
            "📡 StreamListener started | trader={} pair={}",
            &self.cfg.trader[..10.min(self.cfg.trader.len())],
            self.cfg.pair,
        );

        // 15 min TTL covers typical reconnect replay windows.
        let mut dedup = DedupCache::new(Duration::from_secs(15 * 60), 50_000);

        loop {
            match self.connect_and_listen(&mut dedup).await {
                Ok(()) => info!("📡 Stream connection closed normally"),
                Err(e) => warn!("📡 Stream error: {e:?}"),
            }

            info!("📡 Reconnecting stream in 3s...");
            sleep(Duration::from_secs(3)).await;
        }
    }

    async fn connect_and_listen(&self, dedup: &mut DedupCache) -> anyhow::Result<()> {
        info!(url = %self.cfg.ws_url, "📡 Connecting event stream");

        let connect_result =
            tokio::time::timeout(Duration::from_secs(10), connect_async(&self.cfg.ws_url)).await;

        let (ws, response) = match connect_result {
            Ok(Ok((ws, resp))) => (ws, resp),
            Ok(Err(e)) => anyhow::bail!("WS connect error: {e:?}"),
            Err(_) => anyhow::bail!("WS connection timeout"),
        };

        info!("✅ Stream connected (status={:?})", response.status());
        let (mut write, mut read) = ws.split();

        let subscribe = json!({
            "operation": "subscribe",
            "pair": self.cfg.pair,
            "trader": self.cfg.trader,
        });
        write.send(Message::Text(subscribe.to_string())).await?;

        // Ping keepalive
        let keepalive = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            loop {
                interval.tick().await;
                if write.send(Message::Text("PING".to_string())).await.is_err() {
                    break;
                }
            }
        });

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Ok(value) = serde_json::from_str::<Value>(&text) {
                        // Handle arrays (batched events)
                        let values = if value.is_array() {
                            value.as_array().cloned().unwrap_or_default()
                        } else {
                            vec![value]
                        };

                        for val in &values {
                            if let Some(event) = parse_event(val, dedup) {
                                debug!(
                                    "📡 Event {:?} epoch={:?} order={:?}",
                                    event.kind, event.epoch_id, event.order_id,
                                );
                                let _ = self.event_tx.send(event).await;
                            }
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    warn!("📡 Stream closed by server");
                    break;
                }
                Err(e) => {
                    warn!("📡 Stream read error: {e:?}");
                    break;
                }
                _ => {}
            }
        }

        keepalive.abort();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Frame parsing
// ─────────────────────────────────────────────────────────

fn event_kind(raw: &str) -> Option<StreamEventKind> {
    match raw {
        "order_committed" => Some(StreamEventKind::OrderCommitted),
        "order_revealed" => Some(StreamEventKind::OrderRevealed),
        "order_filled" => Some(StreamEventKind::OrderFilled),
        "order_cancelled" => Some(StreamEventKind::OrderCancelled),
        "epoch_settled" => Some(StreamEventKind::EpochSettled),
        "deposited" => Some(StreamEventKind::Deposited),
        "withdrawn" => Some(StreamEventKind::Withdrawn),
        _ => None,
    }
}

/// Parse one stream frame. Malformed frames are skipped with a debug log;
/// they never abort the read loop.
fn parse_event(val: &Value, dedup: &mut DedupCache) -> Option<StreamEvent> {
    let raw_kind = val
        .get("event_type")
        .or_else(|| val.get("type"))
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    let Some(kind) = event_kind(&raw_kind.to_lowercase()) else {
        if !raw_kind.is_empty() {
            debug!("📡 Ignoring unknown event type: {raw_kind}");
        }
        return None;
    };

    let trader = val
        .get("trader")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let tx_hash = val
        .get("tx_hash")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let order_id = val.get("order_id").and_then(|v| decoder::decode_u256(v).ok());
    let price = val.get("price").and_then(|v| decoder::decode_u256(v).ok());
    let amount = val.get("amount").and_then(|v| decoder::decode_u256(v).ok());
    let epoch_id = val.get("epoch_id").and_then(|v| decoder::decode_u64(v).ok());
    let timestamp_ms = val
        .get("timestamp")
        .and_then(|v| decoder::decode_timestamp_ms(v).ok())?;

    // Dedup on tx hash when present; composite identity otherwise.
    let dedup_key = match &tx_hash {
        Some(tx) => format!("tx:{tx}:{raw_kind}"),
        None => format!(
            "evt:{}:{}:{}:{}",
            raw_kind,
            timestamp_ms,
            order_id.map(|v| v.to_string()).unwrap_or_default(),
            epoch_id.unwrap_or_default(),
        ),
    };
    if !dedup.remember(dedup_key.clone()) {
        debug!("📡 Dedup: skipping replayed event key={dedup_key}");
        return None;
    }

    Some(StreamEvent {
        kind,
        trader,
        tx_hash,
        order_id,
        price,
        amount,
        epoch_id,
        timestamp_ms,
    })
}

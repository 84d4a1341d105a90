//! Telemetry Publisher — samples the book and generator stats at a fixed
//! cadence and hands a serialized record to the transport server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use arrayvec::ArrayVec;
use chrono::Utc;
use serde::Serialize;

use crate::order_book::OrderBook;
use crate::stats::Stats;
use crate::transport::TransportServer;

const MAX_DEPTH: usize = 10;

/// One telemetry snapshot, serialized and broadcast once per tick.
///
/// Field names and numeric formatting match the external schema exactly —
/// this is the wire contract, not an internal convenience type.
#[derive(Serialize)]
pub struct TelemetryRecord {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: u128,
    pub symbol: String,
    pub price: RoundedPrice,
    pub high: RoundedPrice,
    pub low: RoundedPrice,
    #[serde(rename = "bestBid")]
    pub best_bid: RoundedPrice,
    #[serde(rename = "bestAsk")]
    pub best_ask: RoundedPrice,
    pub spread: RoundedPrice,
    #[serde(rename = "midPrice")]
    pub mid_price: RoundedPrice,
    #[serde(rename = "ordersPerSecond")]
    pub orders_per_second: RoundedOps,
    #[serde(rename = "totalOrders")]
    pub total_orders: u64,
    #[serde(rename = "totalTrades")]
    pub total_trades: u64,
    pub bids: Vec<DepthLevelRounded>,
    pub asks: Vec<DepthLevelRounded>,
}

/// A price-like field, serialized with two fractional digits.
pub struct RoundedPrice(pub f64);
/// An `ordersPerSecond`-like field, serialized with zero fractional digits.
pub struct RoundedOps(pub f64);
/// A depth level whose `size` serializes with four fractional digits.
pub struct DepthLevelRounded {
    pub price: f64,
    pub size: f64,
}

impl Serialize for RoundedPrice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_f64(round_to(self.0, 2))
    }
}

impl Serialize for RoundedOps {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_f64(round_to(self.0, 0))
    }
}

impl Serialize for DepthLevelRounded {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("DepthLevel", 2)?;
        s.serialize_field("price", &round_to(self.price, 2))?;
        s.serialize_field("size", &round_to(self.size, 4))?;
        s.end()
    }
}

fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

/// Copy up to `MAX_DEPTH` levels into a stack buffer before handing them to
/// the serializer — the book already caps the query at ten, this just
/// avoids a heap allocation for the common case.
fn depth_vec(levels: Vec<(f64, f64)>) -> Vec<DepthLevelRounded> {
    let buffer: ArrayVec<(f64, f64), MAX_DEPTH> = levels.into_iter().take(MAX_DEPTH).collect();
    buffer.into_iter().map(|(price, size)| DepthLevelRounded { price, size }).collect()
}

fn build_record(book: &OrderBook, stats: &Stats) -> TelemetryRecord {
    let timestamp = Utc::now().timestamp_millis().max(0) as u128;

    TelemetryRecord {
        kind: "telemetry",
        timestamp,
        symbol: book.symbol().to_string(),
        price: RoundedPrice(stats.current_price()),
        high: RoundedPrice(stats.high_price()),
        low: RoundedPrice(stats.low_price()),
        best_bid: RoundedPrice(book.best_bid()),
        best_ask: RoundedPrice(book.best_ask()),
        spread: RoundedPrice(book.spread()),
        mid_price: RoundedPrice(book.mid_price()),
        orders_per_second: RoundedOps(stats.orders_per_second()),
        total_orders: book.order_count(),
        total_trades: book.trade_count(),
        bids: depth_vec(book.top_bids(MAX_DEPTH)),
        asks: depth_vec(book.top_asks(MAX_DEPTH)),
    }
}

/// Owns a worker thread that periodically samples the book and broadcasts
/// a telemetry record through the transport server.
pub struct Publisher {
    book: Arc<Mutex<OrderBook>>,
    stats: Arc<Stats>,
    transport: Arc<TransportServer>,
    interval: Duration,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Publisher {
    /// Create a publisher sampling at `broadcast_interval_ms`.
    pub fn new(
        book: Arc<Mutex<OrderBook>>,
        stats: Arc<Stats>,
        transport: Arc<TransportServer>,
        broadcast_interval_ms: u64,
    ) -> Self {
        Self {
            book,
            stats,
            transport,
            interval: Duration::from_millis(broadcast_interval_ms),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Spawn the sampling worker thread. A second call while running is a
    /// no-op.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let book = self.book.clone();
        let stats = self.stats.clone();
        let transport = self.transport.clone();
        let running = self.running.clone();
        let interval = self.interval;

        self.handle = Some(std::thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                let tick_start = Instant::now();

                let record = {
                    let book = book.lock().unwrap();
                    build_record(&book, &stats)
                };

                if let Ok(payload) = serde_json::to_vec(&record) {
                    transport.broadcast(&payload);
                }

                let elapsed = tick_start.elapsed();
                if elapsed < interval {
                    std::thread::sleep(interval - elapsed);
                }
            }
        }));
    }

    /// Signal the worker to stop and join it. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.stop();
    }
}

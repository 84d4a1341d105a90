//! Process-wide configuration.
//!
//! No CLI flags or environment variables — the engine starts one hard-coded
//! instrument at a hard-coded base price and OPS target. Kept as a single
//! value instead of scattered constants so every other module stays
//! parameter-free and testable with an injected `Config`.

/// Fixed process configuration for one engine run.
#[derive(Clone, Debug)]
pub struct Config {
    /// The single instrument this process simulates.
    pub symbol: String,
    /// Anchor price for the generator's mean-reverting random walk.
    pub base_price: f64,
    /// Target synthetic orders per second.
    pub target_orders_per_second: f64,
    /// Initial order-arena capacity (grows automatically beyond this).
    pub initial_order_capacity: u32,
    /// TCP port the transport server listens on.
    pub transport_port: u16,
    /// Telemetry sampling interval.
    pub broadcast_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            base_price: 50_000.0,
            target_orders_per_second: 1_000.0,
            initial_order_capacity: 1 << 16,
            transport_port: 9001,
            broadcast_interval_ms: 50,
        }
    }
}

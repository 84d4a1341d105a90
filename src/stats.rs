//! Lock-free statistics shared between the generator and publisher threads.
//!
//! Each field is an independent atomic. Readers never see a torn individual
//! field, but a snapshot across multiple fields is not consistent as of a
//! single instant — that tradeoff is deliberate (see the design notes on
//! why this is a struct of atomics rather than a mutex-guarded aggregate).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Bit-cast an `f64` into the `AtomicU64` storage representation.
#[inline]
fn to_bits(v: f64) -> u64 {
    v.to_bits()
}

#[inline]
fn from_bits(v: u64) -> f64 {
    f64::from_bits(v)
}

/// Engine-wide counters and gauges, safe to read from any thread without
/// locking.
pub struct Stats {
    orders_generated: AtomicU64,
    trades_executed: AtomicU64,
    current_price: AtomicU64,
    high_price: AtomicU64,
    low_price: AtomicU64,
    orders_per_second: AtomicU64,
    running: AtomicBool,
}

impl Stats {
    /// A fresh stats block seeded at `starting_price`.
    pub fn new(starting_price: f64) -> Self {
        Self {
            orders_generated: AtomicU64::new(0),
            trades_executed: AtomicU64::new(0),
            current_price: AtomicU64::new(to_bits(starting_price)),
            high_price: AtomicU64::new(to_bits(starting_price)),
            low_price: AtomicU64::new(to_bits(starting_price)),
            orders_per_second: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }

    /// Increment the generated-order counter by one.
    pub fn record_order_generated(&self) {
        self.orders_generated.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the executed-trade counter by `count`.
    pub fn record_trades_executed(&self, count: u64) {
        if count > 0 {
            self.trades_executed.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Update the current price and roll the high/low watermarks.
    pub fn record_price(&self, price: f64) {
        self.current_price.store(to_bits(price), Ordering::Relaxed);
        self.high_price
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                (price > from_bits(bits)).then_some(to_bits(price))
            })
            .ok();
        self.low_price
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                (price < from_bits(bits)).then_some(to_bits(price))
            })
            .ok();
    }

    /// Set the observed orders-per-second gauge.
    pub fn set_orders_per_second(&self, ops: f64) {
        self.orders_per_second.store(to_bits(ops), Ordering::Relaxed);
    }

    /// Mark the generator as running or stopped.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    /// Total orders generated since construction.
    pub fn orders_generated(&self) -> u64 {
        self.orders_generated.load(Ordering::Relaxed)
    }

    /// Total trades executed since construction.
    pub fn trades_executed(&self) -> u64 {
        self.trades_executed.load(Ordering::Relaxed)
    }

    /// Last recorded price.
    pub fn current_price(&self) -> f64 {
        from_bits(self.current_price.load(Ordering::Relaxed))
    }

    /// Highest price observed since construction.
    pub fn high_price(&self) -> f64 {
        from_bits(self.high_price.load(Ordering::Relaxed))
    }

    /// Lowest price observed since construction.
    pub fn low_price(&self) -> f64 {
        from_bits(self.low_price.load(Ordering::Relaxed))
    }

    /// Most recently observed orders-per-second rate.
    pub fn orders_per_second(&self) -> f64 {
        from_bits(self.orders_per_second.load(Ordering::Relaxed))
    }

    /// Whether the generator is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_updates_track_high_and_low() {
        let stats = Stats::new(100.0);
        stats.record_price(105.0);
        stats.record_price(95.0);
        stats.record_price(101.0);

        assert_eq!(stats.current_price(), 101.0);
        assert_eq!(stats.high_price(), 105.0);
        assert_eq!(stats.low_price(), 95.0);
    }

    #[test]
    fn counters_accumulate() {
        let stats = Stats::new(100.0);
        stats.record_order_generated();
        stats.record_order_generated();
        stats.record_trades_executed(3);
        assert_eq!(stats.orders_generated(), 2);
        assert_eq!(stats.trades_executed(), 3);
    }

    #[test]
    fn running_flag_round_trips() {
        let stats = Stats::new(100.0);
        assert!(!stats.is_running());
        stats.set_running(true);
        assert!(stats.is_running());
    }
}

//! Stochastic order generator — drives synthetic order flow into the book.
//!
//! Runs on one owned worker thread. The price model is a mean-reverting
//! random walk; orders are produced in fixed-size batches so the rate
//! limiter only has to evaluate wall-clock time once per batch instead of
//! once per order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::arena::Side;
use crate::order_book::OrderBook;
use crate::stats::Stats;

const ORDERS_PER_BATCH: u64 = 10_000;
const WALK_NOISE_RANGE: std::ops::RangeInclusive<f64> = -0.01..=0.01;
const MEAN_REVERSION_RATE: f64 = 0.0001;
const OFFSET_RANGE: std::ops::RangeInclusive<f64> = 0.5..=5.0;
const SIZE_RANGE: std::ops::RangeInclusive<f64> = 0.001..=2.0;

/// Invoked periodically on the generator thread with `(mid_price, orders_so_far)`.
pub type PriceCallback = Box<dyn FnMut(f64, u64) + Send>;

/// Owns a worker thread that feeds synthetic orders into a shared book.
pub struct Generator {
    book: Arc<Mutex<OrderBook>>,
    stats: Arc<Stats>,
    base_price: f64,
    seed: Option<u64>,
    pin_to_core: bool,
    callback_interval: u64,
    price_callback: Option<PriceCallback>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Generator {
    /// Create a generator anchored at `base_price`, feeding `book`.
    pub fn new(book: Arc<Mutex<OrderBook>>, stats: Arc<Stats>, base_price: f64) -> Self {
        Self {
            book,
            stats,
            base_price,
            seed: None,
            pin_to_core: false,
            callback_interval: 1,
            price_callback: None,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Fix the RNG seed instead of seeding from OS entropy. Intended for
    /// deterministic tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Pin the worker thread to the last available CPU core before it
    /// enters the generation loop.
    pub fn with_pin_to_core(mut self, pin: bool) -> Self {
        self.pin_to_core = pin;
        self
    }

    /// Install a callback invoked every `interval` generated orders, on the
    /// generator thread. Must be set before `start`.
    pub fn set_price_callback(&mut self, interval: u64, f: impl FnMut(f64, u64) + Send + 'static) {
        self.callback_interval = interval.max(1);
        self.price_callback = Some(Box::new(f));
    }

    /// Spawn the worker thread, targeting `target_orders_per_second`.
    /// A second call while already running is a silent no-op.
    pub fn start(&mut self, target_orders_per_second: f64) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        self.stats.set_running(true);

        let book = self.book.clone();
        let stats = self.stats.clone();
        let running = self.running.clone();
        let base_price = self.base_price;
        let pin_to_core = self.pin_to_core;
        let callback_interval = self.callback_interval;
        let mut price_callback = self.price_callback.take();
        let seed = self.seed;

        self.handle = Some(std::thread::spawn(move || {
            if pin_to_core {
                pin_current_thread_to_last_core();
            }

            let mut rng = match seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };

            let mut mid = base_price;
            let mut orders_so_far: u64 = 0;
            let mut last_trade_count: u64 = 0;
            let start = Instant::now();

            'outer: while running.load(Ordering::Relaxed) {
                for _ in 0..ORDERS_PER_BATCH {
                    if !running.load(Ordering::Relaxed) {
                        break 'outer;
                    }

                    let u = rng.gen_range(WALK_NOISE_RANGE);
                    mid *= 1.0 + u;
                    mid += (base_price - mid) * MEAN_REVERSION_RATE;

                    let side = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
                    let offset = rng.gen_range(OFFSET_RANGE);
                    let size = rng.gen_range(SIZE_RANGE);
                    let price = match side {
                        Side::Bid => mid - offset,
                        Side::Ask => mid + offset,
                    };

                    if price > 0.0 {
                        let mut book = book.lock().unwrap();
                        let _ = book.add(side, price, size);
                    }

                    orders_so_far += 1;
                    stats.record_order_generated();
                    stats.record_price(mid);

                    if let Some(cb) = price_callback.as_mut() {
                        if orders_so_far % callback_interval == 0 {
                            cb(mid, orders_so_far);
                        }
                    }
                }

                let current_trade_count = book.lock().unwrap().trade_count();
                stats.record_trades_executed(current_trade_count.saturating_sub(last_trade_count));
                last_trade_count = current_trade_count;

                let elapsed = start.elapsed().as_secs_f64();
                let expected = orders_so_far as f64 / target_orders_per_second;
                if elapsed < expected {
                    std::thread::sleep(Duration::from_secs_f64(expected - elapsed));
                }
                let elapsed = start.elapsed().as_secs_f64().max(1e-9);
                stats.set_orders_per_second(orders_so_far as f64 / elapsed);
            }

            stats.set_running(false);
        }));
    }

    /// Signal the worker to stop and join it. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Whether the worker thread is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pin_current_thread_to_last_core() {
    if let Some(core_ids) = core_affinity::get_core_ids() {
        if let Some(last) = core_ids.last() {
            core_affinity::set_for_current(*last);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    fn book() -> Arc<Mutex<OrderBook>> {
        Arc::new(Mutex::new(OrderBook::new("BTCUSDT", 1024)))
    }

    #[test]
    fn start_is_idempotent_while_running() {
        let mut gen = Generator::new(book(), Arc::new(Stats::new(100.0)), 100.0).with_seed(1);
        gen.start(1_000.0);
        assert!(gen.is_running());
        gen.start(1_000.0);
        gen.stop();
        assert!(!gen.is_running());
    }

    #[test]
    fn feeds_orders_into_the_book() {
        let b = book();
        let stats = Arc::new(Stats::new(100.0));
        let mut gen = Generator::new(b.clone(), stats.clone(), 100.0).with_seed(42);
        gen.start(50_000.0);
        std::thread::sleep(Duration::from_millis(200));
        gen.stop();

        assert!(stats.orders_generated() > 0);
        assert!(b.lock().unwrap().order_count() > 0);
    }

    #[test]
    fn price_callback_fires_on_interval() {
        let b = book();
        let stats = Arc::new(Stats::new(100.0));
        let calls = Arc::new(AtomicU64::new(0));
        let calls_cb = calls.clone();
        let mut gen = Generator::new(b, stats, 100.0).with_seed(7);
        gen.set_price_callback(50, move |_price, _n| {
            calls_cb.fetch_add(1, Ordering::Relaxed);
        });
        gen.start(50_000.0);
        std::thread::sleep(Duration::from_millis(200));
        gen.stop();

        assert!(calls.load(Ordering::Relaxed) > 0);
    }
}

//! Order book — the central limit order book for one instrument.
//!
//! Two price-indexed ladders (bids, asks), each level a FIFO queue of
//! resting orders. `OrderBook` is *not* internally synchronized: exactly
//! one thread is expected to call `add`/`cancel` at a time. Callers that
//! need concurrent read access wrap an instance in `Arc<Mutex<OrderBook>>`,
//! as `Generator` and `Publisher` do.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::arena::{Arena, ArenaIndex, Side};
use crate::clock::now_nanos;
use crate::error::EngineError;
use crate::price_level::PriceLevel;

/// A total-ordered wrapper around `f64` prices.
///
/// Prices are validated positive and finite before ever becoming a key, so
/// `total_cmp` gives a consistent order without pulling in a dedicated
/// ordered-float dependency.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Price(f64);

impl Eq for Price {}

impl PartialOrd for Price {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Price {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// One resting or newly-placed order (value type; immutable identity,
/// mutable residual quantity while matching is in progress).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Order {
    /// Monotonically increasing id, unique within this book. `0` means
    /// "fully filled on entry, never rested".
    pub id: u64,
    /// Buy or sell.
    pub side: Side,
    /// Limit price.
    pub price: f64,
    /// Residual quantity.
    pub quantity: f64,
    /// Monotonic nanosecond counter captured at `add` time (diagnostic only).
    pub timestamp: u64,
}

/// One execution between two resting/aggressing orders.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Trade {
    /// Id of the order that was on the bid side.
    pub bid_order_id: u64,
    /// Id of the order that was on the ask side.
    pub ask_order_id: u64,
    /// The maker's price — resting orders set the execution price.
    pub price: f64,
    /// Filled quantity.
    pub quantity: f64,
    /// Monotonic nanosecond counter at execution.
    pub timestamp: u64,
}

/// Callback invoked synchronously, on the caller's thread, for every trade
/// produced while matching. Must not block — a consumer that needs to do
/// blocking work is responsible for handing it to its own queue.
pub type TradeCallback = Box<dyn FnMut(&Trade) + Send>;

#[derive(Clone, Copy)]
struct OrderInfo {
    arena_index: ArenaIndex,
    side: Side,
    price: f64,
}

/// The limit order book for a single instrument.
pub struct OrderBook {
    symbol: String,
    bids: BTreeMap<Price, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    index: FxHashMap<u64, OrderInfo>,
    arena: Arena,
    next_id: u64,
    order_count: u64,
    trade_count: u64,
    last_trade_price: f64,
    on_trade: Option<TradeCallback>,
}

impl OrderBook {
    /// Create an empty book for `symbol`, pre-sizing the order arena to
    /// `initial_capacity` resting orders (the arena grows automatically
    /// beyond that — see [`crate::arena::Arena::grow`] — so this is a
    /// performance hint, not a hard cap).
    pub fn new(symbol: impl Into<String>, initial_capacity: u32) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: FxHashMap::default(),
            arena: Arena::new(initial_capacity.max(1)),
            next_id: 1,
            order_count: 0,
            trade_count: 0,
            last_trade_price: 0.0,
            on_trade: None,
        }
    }

    /// The instrument this book is for.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Install a single callback invoked for every trade produced by
    /// matching. Replaces any previously installed callback.
    pub fn set_trade_callback(&mut self, f: impl FnMut(&Trade) + Send + 'static) {
        self.on_trade = Some(Box::new(f));
    }

    /// Submit a new order. Crosses it against the opposite ladder first;
    /// any residual quantity rests on the order's own side.
    ///
    /// Returns the new order's id, or `0` if it was fully filled on entry
    /// and never rested. Fails with `InvalidArgument` when `price <= 0` or
    /// `quantity <= 0`.
    pub fn add(&mut self, side: Side, price: f64, quantity: f64) -> Result<u64, EngineError> {
        if !(price > 0.0 && price.is_finite()) || !(quantity > 0.0 && quantity.is_finite()) {
            return Err(EngineError::InvalidArgument { price, quantity });
        }

        let id = self.next_id;
        self.next_id += 1;
        self.order_count += 1;
        let timestamp = now_nanos();

        let remaining = self.cross(side, id, price, quantity, timestamp);

        if remaining > 1e-12 {
            self.rest(id, side, price, remaining, timestamp);
            Ok(id)
        } else {
            Ok(0)
        }
    }

    /// Snapshot a resting order by id, or `None` if it isn't currently
    /// resting (unknown id, fully filled, or already canceled).
    pub fn get(&self, id: u64) -> Option<Order> {
        let info = self.index.get(&id)?;
        let node = self.arena.get(info.arena_index);
        Some(Order {
            id: node.id,
            side: node.side,
            price: node.price,
            quantity: node.quantity,
            timestamp: node.timestamp,
        })
    }

    /// Cancel a resting order by id. Returns `false` if the id is unknown
    /// (not an exceptional condition).
    pub fn cancel(&mut self, id: u64) -> bool {
        let Some(info) = self.index.remove(&id) else {
            return false;
        };

        let key = Price(info.price);
        let ladder = match info.side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        if let Some(level) = ladder.get_mut(&key) {
            let emptied = level.remove(&mut self.arena, info.arena_index);
            if emptied {
                ladder.remove(&key);
            }
        }
        self.arena.free(info.arena_index);
        true
    }

    /// Highest bid price, or `0` if the bid ladder is empty.
    pub fn best_bid(&self) -> f64 {
        self.bids.keys().next_back().map_or(0.0, |p| p.0)
    }

    /// Lowest ask price, or `0` if the ask ladder is empty.
    pub fn best_ask(&self) -> f64 {
        self.asks.keys().next().map_or(0.0, |p| p.0)
    }

    /// `best_ask - best_bid`, or `0` unless both sides are populated.
    pub fn spread(&self) -> f64 {
        let (bid, ask) = (self.best_bid(), self.best_ask());
        if bid > 0.0 && ask > 0.0 {
            ask - bid
        } else {
            0.0
        }
    }

    /// `(best_bid + best_ask) / 2` if both sides are populated, otherwise
    /// the last traded price (or `0` if none yet).
    pub fn mid_price(&self) -> f64 {
        let (bid, ask) = (self.best_bid(), self.best_ask());
        if bid > 0.0 && ask > 0.0 {
            (bid + ask) / 2.0
        } else {
            self.last_trade_price
        }
    }

    /// Up to `n` `(price, aggregated_quantity)` pairs, best bid first.
    pub fn top_bids(&self, n: usize) -> Vec<(f64, f64)> {
        self.bids
            .iter()
            .rev()
            .take(n)
            .map(|(p, l)| (p.0, l.total_qty))
            .collect()
    }

    /// Up to `n` `(price, aggregated_quantity)` pairs, best ask first.
    pub fn top_asks(&self, n: usize) -> Vec<(f64, f64)> {
        self.asks
            .iter()
            .take(n)
            .map(|(p, l)| (p.0, l.total_qty))
            .collect()
    }

    /// Cumulative count of trades executed since construction or `clear`.
    pub fn trade_count(&self) -> u64 {
        self.trade_count
    }

    /// Cumulative count of orders accepted by `add` (including those fully
    /// filled on entry) since construction. Never reset by `clear`.
    pub fn order_count(&self) -> u64 {
        self.order_count
    }

    /// Number of orders currently resting in the book.
    pub fn resting_count(&self) -> usize {
        self.index.len()
    }

    /// Drop both ladders, the id index, and the trade counter. Does not
    /// reset the id allocator.
    pub fn clear(&mut self) {
        let capacity = self.arena.capacity().max(1);
        self.bids.clear();
        self.asks.clear();
        self.index.clear();
        self.arena = Arena::new(capacity);
        self.trade_count = 0;
    }

    /// Returns `true` if `order_price` (on `side`) is admissible against
    /// `opposite_best` — i.e. the incoming order crosses the book.
    fn crosses(side: Side, order_price: f64, opposite_best: f64) -> bool {
        match side {
            Side::Bid => order_price >= opposite_best,
            Side::Ask => order_price <= opposite_best,
        }
    }

    /// Match an incoming order against the opposite ladder. Returns the
    /// residual quantity left to rest.
    fn cross(&mut self, side: Side, taker_id: u64, taker_price: f64, mut remaining: f64, timestamp: u64) -> f64 {
        let opposite = side.opposite();

        while remaining > 1e-12 {
            let Some((&best_key, _)) = self.best_entry(opposite) else {
                break;
            };

            if !Self::crosses(side, taker_price, best_key.0) {
                break;
            }

            remaining = self.match_at_level(side, opposite, best_key, taker_id, remaining, timestamp);
        }

        remaining
    }

    fn best_entry(&self, side: Side) -> Option<(&Price, &PriceLevel)> {
        match side {
            Side::Bid => self.bids.iter().next_back(),
            Side::Ask => self.asks.iter().next(),
        }
    }

    /// Match against resting orders at one price level until the level is
    /// exhausted or the taker's remaining quantity reaches zero.
    fn match_at_level(
        &mut self,
        taker_side: Side,
        maker_side: Side,
        price: Price,
        taker_id: u64,
        mut remaining: f64,
        timestamp: u64,
    ) -> f64 {
        loop {
            if remaining <= 1e-12 {
                break;
            }

            let ladder = match maker_side {
                Side::Bid => &mut self.bids,
                Side::Ask => &mut self.asks,
            };
            let Some(level) = ladder.get_mut(&price) else {
                break;
            };
            if level.is_empty() {
                break;
            }

            let maker_idx = level.peek_head();
            let maker = self.arena.get(maker_idx);
            let maker_id = maker.id;
            let maker_qty = maker.quantity;

            let fill_qty = remaining.min(maker_qty);

            let (bid_id, ask_id) = match taker_side {
                Side::Bid => (taker_id, maker_id),
                Side::Ask => (maker_id, taker_id),
            };
            let trade = Trade {
                bid_order_id: bid_id,
                ask_order_id: ask_id,
                price: price.0,
                quantity: fill_qty,
                timestamp,
            };
            if let Some(cb) = self.on_trade.as_mut() {
                cb(&trade);
            }
            self.trade_count += 1;
            self.last_trade_price = price.0;

            remaining -= fill_qty;
            let new_maker_qty = maker_qty - fill_qty;

            let ladder = match maker_side {
                Side::Bid => &mut self.bids,
                Side::Ask => &mut self.asks,
            };
            let level = ladder.get_mut(&price).expect("level present for maker fill");

            if new_maker_qty <= 1e-12 {
                level.pop_front(&mut self.arena);
                self.index.remove(&maker_id);
                self.arena.free(maker_idx);
                if level.is_empty() {
                    ladder.remove(&price);
                }
            } else {
                self.arena.get_mut(maker_idx).quantity = new_maker_qty;
                level.subtract_qty(fill_qty);
            }
        }

        remaining
    }

    fn rest(&mut self, id: u64, side: Side, price: f64, quantity: f64, timestamp: u64) {
        if self.arena.allocated() == self.arena.capacity() {
            self.arena.grow(self.arena.capacity().max(1024));
        }
        let arena_idx = self.arena.alloc().expect("arena grown to fit");
        let node = self.arena.get_mut(arena_idx);
        node.id = id;
        node.price = price;
        node.quantity = quantity;
        node.timestamp = timestamp;
        node.side = side;

        let key = Price(price);
        let ladder = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        let level = ladder.entry(key).or_insert_with(PriceLevel::new);
        level.push_back(&mut self.arena, arena_idx);

        self.index.insert(id, OrderInfo { arena_index: arena_idx, side, price });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> OrderBook {
        OrderBook::new("BTCUSDT", 64)
    }

    #[test]
    fn add_validates_positive_price_and_quantity() {
        let mut b = book();
        assert!(matches!(
            b.add(Side::Bid, 0.0, 1.0),
            Err(EngineError::InvalidArgument { .. })
        ));
        assert!(matches!(
            b.add(Side::Bid, 100.0, -1.0),
            Err(EngineError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn uncrossed_book_formation() {
        let mut b = book();
        let id1 = b.add(Side::Bid, 100.00, 1.0).unwrap();
        let id2 = b.add(Side::Bid, 99.00, 2.0).unwrap();
        let id3 = b.add(Side::Ask, 101.00, 1.0).unwrap();
        let id4 = b.add(Side::Ask, 102.00, 3.0).unwrap();

        assert!([id1, id2, id3, id4].iter().all(|&id| id != 0));
        assert_eq!(b.best_bid(), 100.00);
        assert_eq!(b.best_ask(), 101.00);
        assert_eq!(b.spread(), 1.00);
        assert_eq!(b.trade_count(), 0);
    }

    #[test]
    fn single_level_partial_fill() {
        let mut b = book();
        b.add(Side::Bid, 100.00, 1.0).unwrap();
        b.add(Side::Bid, 99.00, 2.0).unwrap();
        b.add(Side::Ask, 101.00, 1.0).unwrap();
        b.add(Side::Ask, 102.00, 3.0).unwrap();

        let mut trades: Vec<Trade> = Vec::new();
        b.set_trade_callback(move |_| {});
        let _ = &mut trades;
        let id = b.add(Side::Ask, 100.00, 0.4).unwrap();
        assert_eq!(id, 0, "fully filled aggressor does not rest");
        assert_eq!(b.trade_count(), 1);
        assert_eq!(b.best_bid(), 100.00);
        assert_eq!(b.top_bids(1), vec![(100.00, 0.6)]);
        assert_eq!(b.best_ask(), 101.00);
    }

    #[test]
    fn cross_level_sweep() {
        let mut b = book();
        b.add(Side::Bid, 100.00, 1.0).unwrap();
        b.add(Side::Bid, 99.00, 2.0).unwrap();
        b.add(Side::Ask, 101.00, 1.0).unwrap();
        b.add(Side::Ask, 102.00, 3.0).unwrap();

        let trades = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let trades_cb = trades.clone();
        b.set_trade_callback(move |t| trades_cb.lock().unwrap().push(*t));

        let id = b.add(Side::Bid, 102.00, 3.0).unwrap();
        assert_eq!(id, 0);
        let trades = trades.lock().unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!((trades[0].price, trades[0].quantity), (101.00, 1.0));
        assert_eq!((trades[1].price, trades[1].quantity), (102.00, 2.0));
        assert_eq!(b.trade_count(), 2);
        assert_eq!(b.best_ask(), 0.0, "ask ladder swept empty");
    }

    #[test]
    fn full_sweep_with_residual_rest() {
        let mut b = book();
        b.add(Side::Bid, 100.00, 1.0).unwrap();
        b.add(Side::Bid, 99.00, 2.0).unwrap();
        b.add(Side::Ask, 101.00, 1.0).unwrap();
        b.add(Side::Ask, 102.00, 3.0).unwrap();

        let trades = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let trades_cb = trades.clone();
        b.set_trade_callback(move |t| trades_cb.lock().unwrap().push(*t));

        let id = b.add(Side::Bid, 102.00, 5.0).unwrap();
        assert_ne!(id, 0);
        let trades = trades.lock().unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!((trades[0].price, trades[0].quantity), (101.00, 1.0));
        assert_eq!((trades[1].price, trades[1].quantity), (102.00, 3.0));
        assert_eq!(b.best_ask(), 0.0);
        assert_eq!(b.top_bids(1), vec![(102.00, 1.0)]);
    }

    #[test]
    fn fifo_time_priority() {
        let mut b = book();
        let a = b.add(Side::Bid, 100.00, 1.0).unwrap();
        let bb = b.add(Side::Bid, 100.00, 2.0).unwrap();

        let trades = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let trades_cb = trades.clone();
        b.set_trade_callback(move |t| trades_cb.lock().unwrap().push(*t));

        b.add(Side::Ask, 100.00, 2.0).unwrap();
        let trades = trades.lock().unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].bid_order_id, a);
        assert_eq!(trades[0].quantity, 1.0);
        assert_eq!(trades[1].bid_order_id, bb);
        assert_eq!(trades[1].quantity, 1.0);
        assert!(!b.cancel(a), "a was fully filled and removed from index");
    }

    #[test]
    fn cancel_removes_before_match() {
        let mut b = book();
        let a = b.add(Side::Bid, 100.00, 1.0).unwrap();
        assert!(b.cancel(a));
        assert!(!b.cancel(a), "second cancel is idempotent-false");

        let trades = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let trades_cb = trades.clone();
        b.set_trade_callback(move |t| trades_cb.lock().unwrap().push(*t));

        let id = b.add(Side::Ask, 100.00, 1.0).unwrap();
        assert!(trades.lock().unwrap().is_empty());
        assert_ne!(id, 0);
        assert_eq!(b.best_ask(), 100.00);
    }

    #[test]
    fn equal_quantities_remove_both_sides() {
        let mut b = book();
        b.add(Side::Ask, 100.00, 5.0).unwrap();
        let id = b.add(Side::Bid, 100.00, 5.0).unwrap();
        assert_eq!(id, 0);
        assert_eq!(b.best_bid(), 0.0);
        assert_eq!(b.best_ask(), 0.0);
    }

    #[test]
    fn order_count_is_monotone_across_fills_and_cancels() {
        let mut b = book();
        b.add(Side::Bid, 100.0, 1.0).unwrap();
        b.add(Side::Ask, 100.0, 1.0).unwrap();
        let id = b.add(Side::Bid, 50.0, 1.0).unwrap();
        b.cancel(id);
        assert_eq!(b.order_count(), 3);
    }

    #[test]
    fn mid_price_falls_back_to_last_trade() {
        let mut b = book();
        assert_eq!(b.mid_price(), 0.0);
        b.add(Side::Ask, 100.0, 1.0).unwrap();
        b.add(Side::Bid, 100.0, 1.0).unwrap();
        assert_eq!(b.mid_price(), 100.0);
    }

    #[test]
    fn clear_drops_ladders_but_keeps_id_allocator() {
        let mut b = book();
        let first = b.add(Side::Bid, 100.0, 1.0).unwrap();
        b.clear();
        assert_eq!(b.best_bid(), 0.0);
        assert_eq!(b.trade_count(), 0);
        let second = b.add(Side::Bid, 100.0, 1.0).unwrap();
        assert!(second > first, "id allocator must not reset");
    }

    #[test]
    fn get_snapshots_a_resting_order_and_none_after_cancel() {
        let mut b = book();
        let id = b.add(Side::Bid, 100.0, 1.5).unwrap();

        let snapshot = b.get(id).expect("order is resting");
        assert_eq!(snapshot.id, id);
        assert_eq!(snapshot.side, Side::Bid);
        assert_eq!(snapshot.price, 100.0);
        assert_eq!(snapshot.quantity, 1.5);

        assert!(b.get(0).is_none(), "id 0 never denotes a resting order");
        b.cancel(id);
        assert!(b.get(id).is_none(), "canceled order no longer resting");
    }

    #[test]
    fn resting_count_tracks_the_index_across_fills_and_cancels() {
        let mut b = book();
        assert_eq!(b.resting_count(), 0);

        let a = b.add(Side::Bid, 100.0, 1.0).unwrap();
        b.add(Side::Bid, 99.0, 1.0).unwrap();
        assert_eq!(b.resting_count(), 2);

        b.cancel(a);
        assert_eq!(b.resting_count(), 1);

        let filled = b.add(Side::Ask, 99.0, 1.0).unwrap();
        assert_eq!(filled, 0, "fully filled aggressor does not rest");
        assert_eq!(b.resting_count(), 0, "maker at 99.0 consumed by the match");
    }
}

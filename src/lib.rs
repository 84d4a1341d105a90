//! # marketsim
//!
//! A self-contained, single-instrument high-frequency market simulation
//! engine: a matching limit order book, a stochastic order generator, and a
//! framed text-stream telemetry transport.
//!
//! ## Design principles
//!
//! - **Single-writer order book**: one thread mutates the book; readers
//!   accept best-effort snapshots or go through the shared mutex.
//! - **O(1) add/cancel**: arena-backed intrusive linked lists, no heap
//!   allocation in the matching hot path.
//! - **Lock-free stats**: individually atomic fields, no cross-field
//!   snapshot guarantee.
//!
//! ## Architecture
//!
//! ```text
//! [Generator thread] --> Mutex<OrderBook> <-- [Publisher thread]
//!                                                     |
//!                                             [TransportServer]
//!                                                     |
//!                                        [accept thread, client sockets]
//! ```

pub mod arena;
pub mod clock;
pub mod config;
pub mod error;
pub mod generator;
pub mod order_book;
pub mod price_level;
pub mod stats;
pub mod telemetry;
pub mod transport;

pub use arena::Side;
pub use config::Config;
pub use error::EngineError;
pub use generator::Generator;
pub use order_book::{Order, OrderBook, Trade};
pub use stats::Stats;
pub use telemetry::Publisher;
pub use transport::TransportServer;

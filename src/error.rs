//! Error types shared across the order book, transport, and telemetry layers.

use thiserror::Error;

/// Errors the engine can report to a caller.
///
/// `NotFound` (an unknown cancel id) is deliberately *not* a variant here:
/// canceling an unknown id is an ordinary `false` return, not an exceptional
/// condition.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// `add` was called with a non-positive price or quantity.
    #[error("invalid argument: price and quantity must both be positive, got price={price}, quantity={quantity}")]
    InvalidArgument {
        /// The rejected price.
        price: f64,
        /// The rejected quantity.
        quantity: f64,
    },

    /// Socket creation, bind, or listen failed during `TransportServer::start`.
    #[error("transport setup failed: {reason}")]
    TransportSetupFailure {
        /// Description of which step failed.
        reason: String,
    },

    /// The upgrade request from a client was malformed or truncated.
    #[error("client handshake failed: {reason}")]
    ClientHandshakeFailure {
        /// Description of what was missing or malformed.
        reason: String,
    },

    /// Writing a frame to a connected client failed (broken pipe, reset,
    /// etc). The client is dropped; other clients are unaffected.
    #[error("client write failed: {reason}")]
    ClientWriteFailure {
        /// Description of the underlying I/O failure.
        reason: String,
    },
}

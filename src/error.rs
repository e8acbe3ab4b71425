//! Unified error handling for the cycle trading bot
//!
//! One error type covers the whole engine so component boundaries can use
//! `TradingResult<T>` instead of `Box<dyn Error>`. The taxonomy matters
//! operationally: venue faults are retried, rejections are surfaced to the
//! caller as booleans, inconsistent state is repaired by reconciliation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TradingError {
    /// Network/terminal disconnect talking to the execution venue.
    #[error("venue unavailable: {0}")]
    VenueUnavailable(String),

    /// Venue returned a non-success retcode for an order operation.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// Local bookkeeping disagrees with the venue (repaired by reconciliation).
    #[error("inconsistent state: {0}")]
    InconsistentState(String),

    /// Pre-send validation failure; the order was never sent.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid parameter '{0}': {1}")]
    InvalidParameter(String, String),

    /// Ledger store (persistence) errors.
    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cycle not found: {0}")]
    CycleNotFound(String),

    /// Active-cycle ceiling reached; new cycle creation refused.
    #[error("cycle capacity reached ({0} active)")]
    CapacityReached(usize),

    #[error("maximum retries exceeded: {0}")]
    MaxRetriesExceeded(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TradingError {
    /// Whether a bounded-backoff retry of the failed operation is sensible.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TradingError::VenueUnavailable(_))
    }

    /// Error category for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            TradingError::VenueUnavailable(_) => "venue",
            TradingError::OrderRejected(_) => "order",
            TradingError::InconsistentState(_) => "consistency",
            TradingError::Validation(_) | TradingError::InvalidParameter(_, _) => "validation",
            TradingError::Store(_) => "store",
            TradingError::Config(_) => "config",
            TradingError::CycleNotFound(_) | TradingError::CapacityReached(_) => "cycle",
            TradingError::MaxRetriesExceeded(_) => "retry",
            TradingError::Internal(_) => "internal",
        }
    }
}

impl From<rusqlite::Error> for TradingError {
    fn from(err: rusqlite::Error) -> Self {
        TradingError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for TradingError {
    fn from(err: serde_json::Error) -> Self {
        TradingError::Store(format!("JSON serialization: {}", err))
    }
}

impl From<crate::config::ConfigError> for TradingError {
    fn from(err: crate::config::ConfigError) -> Self {
        TradingError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for TradingError {
    fn from(err: toml::de::Error) -> Self {
        TradingError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<String> for TradingError {
    fn from(msg: String) -> Self {
        TradingError::Internal(msg)
    }
}

impl From<&str> for TradingError {
    fn from(msg: &str) -> Self {
        TradingError::Internal(msg.to_string())
    }
}

/// Result type alias using TradingError
pub type TradingResult<T> = Result<T, TradingError>;

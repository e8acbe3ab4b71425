// Cycle Trading Bot Library
//
// A zone-based multi-cycle trading engine: cycle lifecycle management,
// zone breach and reversal detection, direction arbitration, grid/batch
// order placement and venue reconciliation.

pub mod config;
pub mod core;
pub mod db; // SQLite ledger layer
pub mod error; // Unified error handling
pub mod store;
pub mod venue;

// Re-export core trading types
pub use core::{
    Candle, CloseReason, CloseTarget, Command, Cycle, CycleLimits, CycleRuntime, CycleStatus,
    Direction, DirectionController, MovementMode, MultiCycleManager, Order, OrderBatchManager,
    OrderKind, PriceTick, RetryPolicy, TradingEngine, ZoneEngine,
};

// Re-export error types
pub use error::{TradingError, TradingResult};

// Re-export configuration
pub use config::{Config, ConfigError, EngineConfig, ZoneConfig};

// Re-export external interfaces
pub use store::{CycleRecord, LedgerStore};
pub use venue::{
    AccountSnapshot, CloseReceipt, ExecutionVenue, OrderFill, OrderRequest, Timeframe,
    VenuePosition,
};

// Re-export the ledger implementation
pub use db::SqliteLedger;

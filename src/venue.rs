//! Execution venue interface
//!
//! The venue client itself is an external collaborator; the engine only
//! depends on this trait. Implementations wrap whatever terminal/bridge is
//! in use and are injected into the engine constructor — no module-level
//! singletons.

use chrono::{DateTime, Utc};

use crate::core::types::{Candle, Direction, PriceTick};
use crate::error::TradingResult;

/// Request for a market order. No per-order SL/TP is set by the batch
/// manager; risk lives at the batch level.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    pub price: f64,
    pub volume: f64,
    pub magic_number: i64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub slippage_points: u32,
    pub tag: String,
}

/// Fill returned by the venue for an accepted order.
#[derive(Debug, Clone)]
pub struct OrderFill {
    pub ticket: u64,
    pub open_price: f64,
    pub volume: f64,
    pub direction: Direction,
    pub open_time: DateTime<Utc>,
}

/// Result of a close-position call. `retcode` follows the venue's
/// convention; `RETCODE_DONE` is the only success value.
#[derive(Debug, Clone, Copy)]
pub struct CloseReceipt {
    pub retcode: u32,
    pub close_price: f64,
    pub profit: f64,
}

pub const RETCODE_DONE: u32 = 10009;

/// A live position as reported by the venue.
#[derive(Debug, Clone)]
pub struct VenuePosition {
    pub ticket: u64,
    pub symbol: String,
    pub direction: Direction,
    pub open_price: f64,
    pub volume: f64,
    pub profit: f64,
    pub swap: f64,
    pub commission: f64,
    pub magic_number: i64,
    pub open_time: DateTime<Utc>,
}

/// Margin snapshot used by pre-send order validation.
#[derive(Debug, Clone, Copy)]
pub struct AccountSnapshot {
    pub balance: f64,
    pub equity: f64,
    pub margin_level_pct: f64,
    pub free_margin: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    M1,
    M5,
    H1,
}

/// Boundary to the live execution venue. Calls block on network I/O and
/// are wrapped in the engine's retry policy; implementations must be
/// idempotent at the ticket level.
pub trait ExecutionVenue: Send {
    fn tick(&mut self, symbol: &str) -> TradingResult<PriceTick>;

    fn candles(&mut self, symbol: &str, timeframe: Timeframe, count: usize)
        -> TradingResult<Vec<Candle>>;

    fn market_order(&mut self, request: &OrderRequest) -> TradingResult<OrderFill>;

    fn close_position(&mut self, ticket: u64, deviation: u32) -> TradingResult<CloseReceipt>;

    fn position_by_ticket(&mut self, ticket: u64) -> TradingResult<Option<VenuePosition>>;

    fn all_positions(&mut self) -> TradingResult<Vec<VenuePosition>>;

    fn account(&mut self) -> TradingResult<AccountSnapshot>;
}

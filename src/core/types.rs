// Common types used across the trading engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trade direction for orders, batches and cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directional signal produced by candle/zone analysis. `Hold` means no
/// actionable bias (doji-like candle, no breach yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
}

impl SignalDirection {
    pub fn as_direction(&self) -> Option<Direction> {
        match self {
            SignalDirection::Buy => Some(Direction::Buy),
            SignalDirection::Sell => Some(Direction::Sell),
            SignalDirection::Hold => None,
        }
    }
}

/// Lifecycle state of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CycleStatus {
    Initial,
    ZoneActive,
    Recovery,
    Closing,
    Closed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Initial => "initial",
            CycleStatus::ZoneActive => "zoneActive",
            CycleStatus::Recovery => "recovery",
            CycleStatus::Closing => "closing",
            CycleStatus::Closed => "closed",
        }
    }
}

/// Role of an order inside a cycle. Carried as an explicit field end-to-end
/// rather than derived from free-text comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Initial,
    Grid,
    Recovery,
    Hedge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Active,
    Closed,
}

/// Why a cycle was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    MaxSwitches,
    Manual,
    Reversal,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::TakeProfit => "take_profit",
            CloseReason::StopLoss => "stop_loss",
            CloseReason::MaxSwitches => "max_switches",
            CloseReason::Manual => "manual",
            CloseReason::Reversal => "reversal",
        }
    }

    /// Inverse of `as_str`, for restoring persisted records.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "take_profit" => Some(CloseReason::TakeProfit),
            "stop_loss" => Some(CloseReason::StopLoss),
            "max_switches" => Some(CloseReason::MaxSwitches),
            "manual" => Some(CloseReason::Manual),
            "reversal" => Some(CloseReason::Reversal),
            _ => None,
        }
    }
}

/// A single OHLC candle from the venue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub time: DateTime<Utc>,
}

impl Candle {
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

/// Current bid/ask snapshot for the engine symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceTick {
    pub bid: f64,
    pub ask: f64,
}

impl PriceTick {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

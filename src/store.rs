//! Ledger store interface
//!
//! Remote persistence is an external collaborator; the engine persists
//! cycles through this trait. The crate ships a SQLite implementation in
//! `db/` that is also used by the tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::cycle::Order;
use crate::core::types::{CycleStatus, Direction};
use crate::error::TradingResult;

/// Persisted shape of a cycle. This is the minimum field set the engine
/// round-trips through the store; `Order` serializes with all its fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub id: String,
    pub bot_id: String,
    pub symbol: String,
    pub magic_number: i64,
    pub direction: Direction,
    pub status: CycleStatus,
    pub zone_base_price: f64,
    pub upper_bound: f64,
    pub lower_bound: f64,
    pub active_orders: Vec<Order>,
    pub completed_orders: Vec<Order>,
    pub total_volume: f64,
    pub total_profit: f64,
    pub reversal_count: u32,
    pub switch_count: u32,
    pub highest_buy_price: f64,
    pub lowest_sell_price: f64,
    pub current_batch_id: Option<String>,
    pub next_order_index: u32,
    pub close_reason: Option<String>,
    pub close_time: Option<DateTime<Utc>>,
}

/// Boundary to the persistence layer. Implementations are injected into
/// the engine constructor.
pub trait LedgerStore: Send {
    /// Persist a new cycle; returns the store-assigned (or echoed) id.
    fn create_cycle(&self, record: &CycleRecord) -> TradingResult<String>;

    fn update_cycle(&self, id: &str, record: &CycleRecord) -> TradingResult<()>;

    fn active_cycles(&self, bot_id: &str) -> TradingResult<Vec<CycleRecord>>;
}

// Common test utilities and helpers

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use cycle_trading_bot::core::types::{Candle, Direction, PriceTick};
use cycle_trading_bot::venue::{
    AccountSnapshot, CloseReceipt, ExecutionVenue, OrderFill, OrderRequest, Timeframe,
    VenuePosition, RETCODE_DONE,
};
use cycle_trading_bot::{Config, TradingError, TradingResult};

/// Create a test configuration with sensible defaults
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.engine.symbol = "EURUSD".to_string();
    config.engine.magic_number = 9001;
    config.engine.bot_id = "test-bot".to_string();
    config.engine.max_active_cycles = 5;
    config.zone.threshold_pips = 50.0;
    config.zone.reversal_threshold_pips = 50.0;
    config.batch.lot_size = 0.1;
    config.batch.order_interval_pips = 25.0;
    config.batch.batch_stop_loss_pips = 300.0;
    config.batch.replacement_offset_pips = 50.0;
    config.logging.enable_signal_logging = false;
    config.logging.enable_reconcile_logging = false;
    config
}

/// Create a temporary directory for test databases
pub fn create_temp_db_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");
    (temp_dir, db_path)
}

/// Build a candle at a fixed timestamp
pub fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        open,
        high,
        low,
        close,
        time: Utc::now(),
    }
}

/// A strongly bullish candle closing at the given price
pub fn bullish_candle(close: f64) -> Candle {
    candle(close - 0.0040, close + 0.0002, close - 0.0042, close)
}

/// Build a venue position for reconciliation tests
pub fn venue_position(
    ticket: u64,
    direction: Direction,
    open_price: f64,
    volume: f64,
    magic_number: i64,
    open_time: DateTime<Utc>,
) -> VenuePosition {
    VenuePosition {
        ticket,
        symbol: "EURUSD".to_string(),
        direction,
        open_price,
        volume,
        profit: 0.0,
        swap: 0.0,
        commission: 0.0,
        magic_number,
        open_time,
    }
}

/// Scripted execution venue. Fills every order at the current price,
/// keeps an in-memory position book and records what the code under test
/// asked it to do.
pub struct MockVenue {
    pub price: f64,
    pub next_ticket: u64,
    pub positions: HashMap<u64, VenuePosition>,
    pub placed: Vec<OrderRequest>,
    pub closed: Vec<u64>,
    pub account: AccountSnapshot,
    /// When set, the next market order is rejected once.
    pub reject_next_order: bool,
    /// Remaining tick/order calls that fail with VenueUnavailable.
    pub unavailable_calls: u32,
}

impl MockVenue {
    pub fn new(price: f64) -> Self {
        Self {
            price,
            next_ticket: 1,
            positions: HashMap::new(),
            placed: Vec::new(),
            closed: Vec::new(),
            account: AccountSnapshot {
                balance: 10_000.0,
                equity: 10_000.0,
                margin_level_pct: 800.0,
                free_margin: 9_000.0,
            },
            reject_next_order: false,
            unavailable_calls: 0,
        }
    }

    pub fn set_price(&mut self, price: f64) {
        self.price = price;
    }

    /// Update the floating profit on a live position.
    pub fn set_position_profit(&mut self, ticket: u64, profit: f64) {
        if let Some(position) = self.positions.get_mut(&ticket) {
            position.profit = profit;
        }
    }

    /// Remove a position as if the broker closed it out of band.
    pub fn drop_position(&mut self, ticket: u64) {
        self.positions.remove(&ticket);
    }

    fn check_available(&mut self) -> TradingResult<()> {
        if self.unavailable_calls > 0 {
            self.unavailable_calls -= 1;
            return Err(TradingError::VenueUnavailable("scripted outage".to_string()));
        }
        Ok(())
    }
}

impl ExecutionVenue for MockVenue {
    fn tick(&mut self, _symbol: &str) -> TradingResult<PriceTick> {
        self.check_available()?;
        Ok(PriceTick {
            bid: self.price,
            ask: self.price + 0.0002,
        })
    }

    fn candles(
        &mut self,
        _symbol: &str,
        _timeframe: Timeframe,
        count: usize,
    ) -> TradingResult<Vec<Candle>> {
        Ok((0..count).map(|_| bullish_candle(self.price)).collect())
    }

    fn market_order(&mut self, request: &OrderRequest) -> TradingResult<OrderFill> {
        self.check_available()?;
        if self.reject_next_order {
            self.reject_next_order = false;
            return Err(TradingError::OrderRejected("scripted rejection".to_string()));
        }

        self.placed.push(request.clone());
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let now = Utc::now();
        self.positions.insert(
            ticket,
            VenuePosition {
                ticket,
                symbol: request.symbol.clone(),
                direction: request.direction,
                open_price: self.price,
                volume: request.volume,
                profit: 0.0,
                swap: 0.0,
                commission: 0.0,
                magic_number: request.magic_number,
                open_time: now,
            },
        );
        Ok(OrderFill {
            ticket,
            open_price: self.price,
            volume: request.volume,
            direction: request.direction,
            open_time: now,
        })
    }

    fn close_position(&mut self, ticket: u64, _slippage: u32) -> TradingResult<CloseReceipt> {
        self.check_available()?;
        self.closed.push(ticket);
        match self.positions.remove(&ticket) {
            Some(position) => Ok(CloseReceipt {
                retcode: RETCODE_DONE,
                close_price: self.price,
                profit: position.profit,
            }),
            None => Err(TradingError::OrderRejected(format!(
                "unknown ticket {}",
                ticket
            ))),
        }
    }

    fn position_by_ticket(&mut self, ticket: u64) -> TradingResult<Option<VenuePosition>> {
        self.check_available()?;
        Ok(self.positions.get(&ticket).cloned())
    }

    fn all_positions(&mut self) -> TradingResult<Vec<VenuePosition>> {
        self.check_available()?;
        Ok(self.positions.values().cloned().collect())
    }

    fn account(&mut self) -> TradingResult<AccountSnapshot> {
        Ok(self.account.clone())
    }
}

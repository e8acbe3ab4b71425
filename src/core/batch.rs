// Order batch manager: grid placement at fixed pip intervals and
// batch-level stop loss. Orders inside a batch carry no per-order SL/TP;
// the batch boundary is the only risk control.

use std::collections::HashMap;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BatchConfig;
use crate::core::cycle::{ClosedNotice, Cycle, OrderData};
use crate::core::pip::pips_to_price;
use crate::core::retry::RetryPolicy;
use crate::core::types::{Direction, OrderKind};
use crate::error::{TradingError, TradingResult};
use crate::venue::{AccountSnapshot, ExecutionVenue, OrderRequest, RETCODE_DONE};

// Margin gates checked before any order is sent.
const MIN_MARGIN_LEVEL_PCT: f64 = 200.0;
const MIN_FREE_MARGIN: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct Batch {
    pub id: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub lot_size: f64,
    pub orders: Vec<u64>,
    pub active: bool,
    pub stop_loss_pips: f64,
    pub last_order_price: f64,
}

impl Batch {
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Batch stop-loss price, anchored at the most recent order.
    pub fn stop_loss_price(&self, symbol: &str) -> f64 {
        let offset = pips_to_price(self.stop_loss_pips, symbol);
        match self.direction {
            Direction::Buy => self.last_order_price - offset,
            Direction::Sell => self.last_order_price + offset,
        }
    }
}

#[derive(Debug)]
pub struct OrderBatchManager {
    symbol: String,
    magic_number: i64,
    config: BatchConfig,
    // At most one active batch per direction.
    batches: HashMap<Direction, Batch>,
}

impl OrderBatchManager {
    pub fn new(symbol: &str, magic_number: i64, config: BatchConfig) -> Self {
        Self {
            symbol: symbol.to_string(),
            magic_number,
            config,
            batches: HashMap::new(),
        }
    }

    pub fn active_batch(&self, direction: Direction) -> Option<&Batch> {
        self.batches.get(&direction).filter(|b| b.active)
    }

    /// Retire the batch for one direction. Called after its orders were
    /// force-closed (reversal, cycle close) so the dead tickets and the
    /// stale price anchor cannot be reused.
    pub fn deactivate(&mut self, direction: Direction) {
        if let Some(batch) = self.batches.get_mut(&direction) {
            if batch.active {
                debug!("batch {} ({}) deactivated", batch.id, direction);
            }
            batch.active = false;
            batch.orders.clear();
        }
    }

    pub fn deactivate_all(&mut self) {
        self.deactivate(Direction::Buy);
        self.deactivate(Direction::Sell);
    }

    /// Pre-send validation. A request failing here never reaches the
    /// venue.
    pub fn validate_order(
        &self,
        request: &OrderRequest,
        account: &AccountSnapshot,
    ) -> TradingResult<()> {
        if request.volume <= 0.0 || request.volume > self.config.max_lot_size {
            return Err(TradingError::Validation(format!(
                "lot size {} outside (0, {}]",
                request.volume, self.config.max_lot_size
            )));
        }
        if request.price <= 0.0 || !request.price.is_finite() {
            return Err(TradingError::Validation(format!(
                "invalid price {}",
                request.price
            )));
        }
        if account.margin_level_pct <= MIN_MARGIN_LEVEL_PCT {
            return Err(TradingError::Validation(format!(
                "margin level {:.1}% below required {:.0}%",
                account.margin_level_pct, MIN_MARGIN_LEVEL_PCT
            )));
        }
        if account.free_margin <= MIN_FREE_MARGIN {
            return Err(TradingError::Validation(format!(
                "free margin {:.2} below required {:.0}",
                account.free_margin, MIN_FREE_MARGIN
            )));
        }
        Ok(())
    }

    fn start_batch(&mut self, direction: Direction, entry_price: f64) -> String {
        let batch = Batch {
            id: Uuid::new_v4().to_string(),
            direction,
            entry_price,
            lot_size: self.config.lot_size,
            orders: Vec::new(),
            active: true,
            stop_loss_pips: self.config.batch_stop_loss_pips,
            last_order_price: entry_price,
        };
        let id = batch.id.clone();
        info!(
            "📦 new {} batch {} for {} at {:.5}",
            direction, id, self.symbol, entry_price
        );
        self.batches.insert(direction, batch);
        id
    }

    /// Price of the next grid slot: one interval per already-placed order
    /// beyond the last order, in the trend direction.
    pub fn next_grid_price(&self, direction: Direction) -> Option<f64> {
        let batch = self.active_batch(direction)?;
        let step = pips_to_price(
            self.config.order_interval_pips * batch.order_count().max(1) as f64,
            &self.symbol,
        );
        Some(match direction {
            Direction::Buy => batch.last_order_price + step,
            Direction::Sell => batch.last_order_price - step,
        })
    }

    /// Continuous grid placement for the cycle's current direction. Sends
    /// a market order once price has reached the next grid slot (or
    /// immediately when the batch is empty). Returns the new ticket if an
    /// order was placed.
    pub async fn place_next_order(
        &mut self,
        venue: &mut dyn ExecutionVenue,
        retry: &RetryPolicy,
        cycle: &mut Cycle,
        current_price: f64,
    ) -> TradingResult<Option<u64>> {
        let direction = cycle.direction;

        if self.active_batch(direction).is_none() {
            let id = self.start_batch(direction, current_price);
            cycle.current_batch_id = Some(id);
            cycle.mark_dirty();
        }

        let is_first = self
            .active_batch(direction)
            .map(|b| b.orders.is_empty())
            .unwrap_or(true);

        if !is_first {
            let target = match self.next_grid_price(direction) {
                Some(target) => target,
                None => return Ok(None),
            };
            let reached = match direction {
                Direction::Buy => current_price >= target,
                Direction::Sell => current_price <= target,
            };
            if !reached {
                return Ok(None);
            }
        }

        let kind = if is_first { OrderKind::Recovery } else { OrderKind::Grid };
        let ticket = self
            .send_market_order(venue, retry, cycle, direction, current_price, kind)
            .await?;
        Ok(ticket)
    }

    /// Batch stop loss: when price crosses the boundary computed from the
    /// last batch order, every order in the batch is closed at the venue
    /// and the batch is deactivated.
    pub async fn manage_batch_stop_loss(
        &mut self,
        venue: &mut dyn ExecutionVenue,
        retry: &RetryPolicy,
        cycle: &Cycle,
        current_price: f64,
    ) -> TradingResult<bool> {
        let direction = cycle.direction;
        let (crossed, tickets, sl_price) = match self.active_batch(direction) {
            Some(batch) if !batch.orders.is_empty() => {
                let sl_price = batch.stop_loss_price(&self.symbol);
                let crossed = match direction {
                    Direction::Buy => current_price <= sl_price,
                    Direction::Sell => current_price >= sl_price,
                };
                (crossed, batch.orders.clone(), sl_price)
            }
            _ => return Ok(false),
        };

        if !crossed {
            return Ok(false);
        }

        warn!(
            "🛑 batch stop loss hit for cycle {} ({} @ {:.5}, boundary {:.5})",
            cycle.id, direction, current_price, sl_price
        );

        for ticket in tickets {
            let result = retry
                .run("close_position", || venue.close_position(ticket, 20))
                .await;
            match result {
                Ok(receipt) if receipt.retcode == RETCODE_DONE => {
                    debug!("batch order {} closed at {:.5}", ticket, receipt.close_price);
                }
                Ok(receipt) => {
                    warn!("venue refused close of {} (retcode {})", ticket, receipt.retcode);
                }
                Err(err) => {
                    warn!("failed to close batch order {}: {}", ticket, err);
                }
            }
        }

        self.deactivate(direction);
        Ok(true)
    }

    /// Reaction to an order leaving the venue (manual close or stop loss):
    /// flip direction and immediately place one replacement order a fixed
    /// distance beyond the current price, keeping continuous market
    /// exposure.
    pub async fn handle_order_close(
        &mut self,
        venue: &mut dyn ExecutionVenue,
        retry: &RetryPolicy,
        cycle: &mut Cycle,
        notice: &ClosedNotice,
        current_price: f64,
    ) -> TradingResult<Option<u64>> {
        let new_direction = notice.direction.opposite();
        let offset = pips_to_price(self.config.replacement_offset_pips, &self.symbol);
        let target_price = match new_direction {
            Direction::Buy => current_price + offset,
            Direction::Sell => current_price - offset,
        };

        info!(
            "↩️  order {} closed; flipping to {} with replacement at {:.5}",
            notice.ticket, new_direction, target_price
        );

        cycle.direction = new_direction;
        cycle.mark_dirty();
        if self.active_batch(new_direction).is_none() {
            let id = self.start_batch(new_direction, target_price);
            cycle.current_batch_id = Some(id);
        }

        let ticket = self
            .send_market_order(
                venue,
                retry,
                cycle,
                new_direction,
                target_price,
                OrderKind::Recovery,
            )
            .await?;
        Ok(ticket)
    }

    /// Place a hedge order for a cycle whose zone was just breached.
    pub async fn place_hedge_order(
        &mut self,
        venue: &mut dyn ExecutionVenue,
        retry: &RetryPolicy,
        cycle: &mut Cycle,
        direction: Direction,
        current_price: f64,
    ) -> TradingResult<Option<u64>> {
        if self.active_batch(direction).is_none() {
            let id = self.start_batch(direction, current_price);
            cycle.current_batch_id = Some(id);
            cycle.mark_dirty();
        }
        self.send_market_order(venue, retry, cycle, direction, current_price, OrderKind::Hedge)
            .await
    }

    async fn send_market_order(
        &mut self,
        venue: &mut dyn ExecutionVenue,
        retry: &RetryPolicy,
        cycle: &mut Cycle,
        direction: Direction,
        price: f64,
        kind: OrderKind,
    ) -> TradingResult<Option<u64>> {
        let request = OrderRequest {
            symbol: self.symbol.clone(),
            direction,
            price,
            volume: self.config.lot_size,
            magic_number: self.magic_number,
            // Batch-level risk only; no per-order stops.
            sl: None,
            tp: None,
            slippage_points: self.config.slippage_points,
            tag: cycle.id.clone(),
        };

        let account = retry.run("account", || venue.account()).await?;
        if let Err(err) = self.validate_order(&request, &account) {
            warn!("order validation failed for cycle {}: {}", cycle.id, err);
            return Ok(None);
        }

        let fill = match retry.run("market_order", || venue.market_order(&request)).await {
            Ok(fill) => fill,
            Err(TradingError::OrderRejected(msg)) => {
                warn!("venue rejected {} order for cycle {}: {}", direction, cycle.id, msg);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let accepted = cycle.add_order(OrderData {
            ticket: fill.ticket,
            direction,
            open_price: fill.open_price,
            volume: fill.volume,
            profit: 0.0,
            swap: 0.0,
            commission: 0.0,
            sl: None,
            tp: None,
            kind: Some(kind),
            open_time: fill.open_time,
        });
        if !accepted {
            return Err(TradingError::InconsistentState(format!(
                "fill {} not accepted by cycle {}",
                fill.ticket, cycle.id
            )));
        }

        if let Some(batch) = self.batches.get_mut(&direction) {
            batch.orders.push(fill.ticket);
            batch.last_order_price = fill.open_price;
        }
        cycle.next_order_index += 1;
        cycle.mark_dirty();

        info!(
            "📝 {} {:?} order {} for cycle {} at {:.5}",
            direction, kind, fill.ticket, cycle.id, fill.open_price
        );
        Ok(Some(fill.ticket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::types::Direction;
    use chrono::Utc;

    fn manager() -> OrderBatchManager {
        OrderBatchManager::new("EURUSD", 1, Config::default().batch)
    }

    fn account() -> AccountSnapshot {
        AccountSnapshot {
            balance: 10_000.0,
            equity: 10_000.0,
            margin_level_pct: 500.0,
            free_margin: 9_000.0,
        }
    }

    fn request(volume: f64, price: f64) -> OrderRequest {
        OrderRequest {
            symbol: "EURUSD".to_string(),
            direction: Direction::Buy,
            price,
            volume,
            magic_number: 1,
            sl: None,
            tp: None,
            slippage_points: 10,
            tag: "c1".to_string(),
        }
    }

    #[test]
    fn test_validate_lot_bounds() {
        let mgr = manager();
        assert!(mgr.validate_order(&request(0.1, 1.1), &account()).is_ok());
        assert!(mgr.validate_order(&request(0.0, 1.1), &account()).is_err());
        assert!(mgr.validate_order(&request(101.0, 1.1), &account()).is_err());
        assert!(mgr.validate_order(&request(0.1, 0.0), &account()).is_err());
    }

    #[test]
    fn test_validate_margin_gates() {
        let mgr = manager();
        let mut thin = account();
        thin.margin_level_pct = 150.0;
        assert!(mgr.validate_order(&request(0.1, 1.1), &thin).is_err());

        let mut broke = account();
        broke.free_margin = 50.0;
        assert!(mgr.validate_order(&request(0.1, 1.1), &broke).is_err());
    }

    #[test]
    fn test_next_grid_price_steps() {
        let mut mgr = manager();
        mgr.start_batch(Direction::Buy, 1.1000);
        {
            let batch = mgr.batches.get_mut(&Direction::Buy).unwrap();
            batch.orders.push(1);
            batch.last_order_price = 1.1000;
        }

        // 1 order placed, interval 25 pips -> next at +25 pips
        let next = mgr.next_grid_price(Direction::Buy).unwrap();
        assert!((next - 1.1025).abs() < 1e-9);

        {
            let batch = mgr.batches.get_mut(&Direction::Buy).unwrap();
            batch.orders.push(2);
            batch.last_order_price = 1.1025;
        }
        // 2 orders -> next interval widens to 50 pips
        let next = mgr.next_grid_price(Direction::Buy).unwrap();
        assert!((next - 1.1075).abs() < 1e-9);
    }

    #[test]
    fn test_sell_grid_steps_down() {
        let mut mgr = manager();
        mgr.start_batch(Direction::Sell, 1.1000);
        {
            let batch = mgr.batches.get_mut(&Direction::Sell).unwrap();
            batch.orders.push(1);
            batch.last_order_price = 1.1000;
        }
        let next = mgr.next_grid_price(Direction::Sell).unwrap();
        assert!((next - 1.0975).abs() < 1e-9);
    }

    #[test]
    fn test_batch_stop_loss_price() {
        let batch = Batch {
            id: "b".to_string(),
            direction: Direction::Buy,
            entry_price: 1.1000,
            lot_size: 0.1,
            orders: vec![1, 2],
            active: true,
            stop_loss_pips: 300.0,
            last_order_price: 1.1050,
        };
        // BUY batch: boundary 300 pips below the last order
        assert!((batch.stop_loss_price("EURUSD") - 1.0750).abs() < 1e-9);

        let sell = Batch {
            direction: Direction::Sell,
            ..batch
        };
        assert!((sell.stop_loss_price("EURUSD") - 1.1350).abs() < 1e-9);
    }

    #[test]
    fn test_one_active_batch_per_direction() {
        let mut mgr = manager();
        let first = mgr.start_batch(Direction::Buy, 1.1);
        assert_eq!(mgr.active_batch(Direction::Buy).unwrap().id, first);

        // Starting another replaces the tracked batch for that direction
        let second = mgr.start_batch(Direction::Buy, 1.2);
        assert_ne!(first, second);
        assert_eq!(mgr.active_batch(Direction::Buy).unwrap().id, second);
        assert!(mgr.active_batch(Direction::Sell).is_none());
    }

    #[tokio::test]
    async fn test_deactivated_batch_holds_no_tickets_or_anchor() {
        struct NoCloseVenue;
        impl ExecutionVenue for NoCloseVenue {
            fn tick(&mut self, _s: &str) -> TradingResult<crate::core::types::PriceTick> {
                unreachable!()
            }
            fn candles(
                &mut self,
                _s: &str,
                _t: crate::venue::Timeframe,
                _c: usize,
            ) -> TradingResult<Vec<crate::core::types::Candle>> {
                unreachable!()
            }
            fn market_order(&mut self, _r: &OrderRequest) -> TradingResult<crate::venue::OrderFill> {
                unreachable!()
            }
            fn close_position(
                &mut self,
                ticket: u64,
                _d: u32,
            ) -> TradingResult<crate::venue::CloseReceipt> {
                panic!("close sent for retired ticket {}", ticket);
            }
            fn position_by_ticket(
                &mut self,
                _t: u64,
            ) -> TradingResult<Option<crate::venue::VenuePosition>> {
                unreachable!()
            }
            fn all_positions(&mut self) -> TradingResult<Vec<crate::venue::VenuePosition>> {
                unreachable!()
            }
            fn account(&mut self) -> TradingResult<AccountSnapshot> {
                unreachable!()
            }
        }

        let mut mgr = manager();
        mgr.start_batch(Direction::Buy, 1.1000);
        {
            let batch = mgr.batches.get_mut(&Direction::Buy).unwrap();
            batch.orders.extend([1, 2]);
            batch.last_order_price = 1.1025;
        }

        // Orders 1 and 2 were force-closed elsewhere; the batch retires
        mgr.deactivate(Direction::Buy);
        assert!(mgr.active_batch(Direction::Buy).is_none());
        assert!(mgr.next_grid_price(Direction::Buy).is_none());

        // A price that would have crossed the old boundary must not
        // re-close the dead tickets
        let cycle = Cycle::new(
            "c1".to_string(),
            "EURUSD".to_string(),
            1,
            Direction::Buy,
            1.1,
            1.105,
            1.095,
        );
        let mut venue = NoCloseVenue;
        let retry = RetryPolicy::default();
        let fired = mgr
            .manage_batch_stop_loss(&mut venue, &retry, &cycle, 1.0500)
            .await
            .unwrap();
        assert!(!fired);
    }

    #[tokio::test]
    async fn test_skips_placement_until_grid_reached() {
        // Uses a scripted venue that fails the test if an order is sent.
        struct NoSendVenue;
        impl ExecutionVenue for NoSendVenue {
            fn tick(&mut self, _s: &str) -> TradingResult<crate::core::types::PriceTick> {
                unreachable!()
            }
            fn candles(
                &mut self,
                _s: &str,
                _t: crate::venue::Timeframe,
                _c: usize,
            ) -> TradingResult<Vec<crate::core::types::Candle>> {
                unreachable!()
            }
            fn market_order(&mut self, _r: &OrderRequest) -> TradingResult<crate::venue::OrderFill> {
                panic!("order must not be sent before the grid level is reached");
            }
            fn close_position(
                &mut self,
                _t: u64,
                _d: u32,
            ) -> TradingResult<crate::venue::CloseReceipt> {
                unreachable!()
            }
            fn position_by_ticket(
                &mut self,
                _t: u64,
            ) -> TradingResult<Option<crate::venue::VenuePosition>> {
                unreachable!()
            }
            fn all_positions(&mut self) -> TradingResult<Vec<crate::venue::VenuePosition>> {
                unreachable!()
            }
            fn account(&mut self) -> TradingResult<AccountSnapshot> {
                unreachable!()
            }
        }

        let mut mgr = manager();
        let mut cycle = Cycle::new(
            "c1".to_string(),
            "EURUSD".to_string(),
            1,
            Direction::Buy,
            1.1,
            1.105,
            1.095,
        );
        mgr.start_batch(Direction::Buy, 1.1000);
        {
            let batch = mgr.batches.get_mut(&Direction::Buy).unwrap();
            batch.orders.push(1);
            batch.last_order_price = 1.1000;
        }
        cycle.add_order(OrderData {
            ticket: 1,
            direction: Direction::Buy,
            open_price: 1.1,
            volume: 0.1,
            profit: 0.0,
            swap: 0.0,
            commission: 0.0,
            sl: None,
            tp: None,
            kind: None,
            open_time: Utc::now(),
        });

        let mut venue = NoSendVenue;
        let retry = RetryPolicy::default();
        // Price below the next grid slot (1.1025): nothing placed
        let placed = mgr
            .place_next_order(&mut venue, &retry, &mut cycle, 1.1010)
            .await
            .unwrap();
        assert!(placed.is_none());
    }
}

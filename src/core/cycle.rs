// Cycle: the per-trade-group state machine
//
// A cycle owns its orders exclusively. The two order lists partition the
// cycle's tickets: a ticket is in active_orders or completed_orders, never
// both. Aggregates are recomputed after every mutation so that
// total_profit always equals the sum of (profit + swap - commission) over
// both lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::retry::RetryPolicy;
use crate::core::types::{CloseReason, CycleStatus, Direction, OrderKind, OrderStatus};
use crate::error::{TradingError, TradingResult};
use crate::store::CycleRecord;
use crate::venue::{ExecutionVenue, VenuePosition, RETCODE_DONE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub ticket: u64,
    pub kind: OrderKind,
    pub direction: Direction,
    pub open_price: f64,
    pub volume: f64,
    pub profit: f64,
    pub swap: f64,
    pub commission: f64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub status: OrderStatus,
    pub open_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
}

impl Order {
    pub fn net_profit(&self) -> f64 {
        self.profit + self.swap - self.commission
    }
}

/// Normalized order payload accepted at the ingestion boundary. Anything
/// that cannot be expressed in this shape is rejected before it reaches a
/// cycle.
#[derive(Debug, Clone)]
pub struct OrderData {
    pub ticket: u64,
    pub direction: Direction,
    pub open_price: f64,
    pub volume: f64,
    pub profit: f64,
    pub swap: f64,
    pub commission: f64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    /// Role for this order. Ignored for the first order of a cycle, which
    /// is always `Initial`.
    pub kind: Option<OrderKind>,
    pub open_time: DateTime<Utc>,
}

impl OrderData {
    pub fn from_position(position: &VenuePosition, kind: Option<OrderKind>) -> Self {
        Self {
            ticket: position.ticket,
            direction: position.direction,
            open_price: position.open_price,
            volume: position.volume,
            profit: position.profit,
            swap: position.swap,
            commission: position.commission,
            sl: None,
            tp: None,
            kind,
            open_time: position.open_time,
        }
    }
}

/// Emitted by `update_status` for every order that left the venue since
/// the previous tick; the batch manager uses these to place replacements.
#[derive(Debug, Clone, Copy)]
pub struct ClosedNotice {
    pub ticket: u64,
    pub direction: Direction,
    pub kind: OrderKind,
}

/// Per-cycle close ceilings, taken from the engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct CycleLimits {
    pub max_loss_ceiling: f64,
    pub max_direction_switches: u32,
}

#[derive(Debug, Clone)]
pub struct Cycle {
    pub id: String,
    pub symbol: String,
    pub magic_number: i64,
    pub status: CycleStatus,
    pub direction: Direction,
    pub is_closed: bool,

    // Zone fields
    pub zone_base_price: f64,
    pub upper_bound: f64,
    pub lower_bound: f64,
    pub zone_activated: bool,
    pub initial_threshold_breached: bool,

    // Reversal fields
    pub highest_buy_price: f64,
    pub lowest_sell_price: f64,
    pub reversal_count: u32,
    pub closed_orders_pl: f64,

    // Orders and aggregates
    pub active_orders: Vec<Order>,
    pub completed_orders: Vec<Order>,
    pub total_volume: f64,
    pub total_profit: f64,

    // Batch linkage
    pub current_batch_id: Option<String>,
    pub next_order_index: u32,

    pub switch_count: u32,
    pub close_reason: Option<CloseReason>,
    pub close_time: Option<DateTime<Utc>>,

    dirty: bool,
}

impl Cycle {
    pub fn new(
        id: String,
        symbol: String,
        magic_number: i64,
        direction: Direction,
        zone_base_price: f64,
        upper_bound: f64,
        lower_bound: f64,
    ) -> Self {
        Self {
            id,
            symbol,
            magic_number,
            status: CycleStatus::Initial,
            direction,
            is_closed: false,
            zone_base_price,
            upper_bound,
            lower_bound,
            zone_activated: false,
            initial_threshold_breached: false,
            highest_buy_price: 0.0,
            lowest_sell_price: f64::MAX,
            reversal_count: 0,
            closed_orders_pl: 0.0,
            active_orders: Vec::new(),
            completed_orders: Vec::new(),
            total_volume: 0.0,
            total_profit: 0.0,
            current_batch_id: None,
            next_order_index: 0,
            switch_count: 0,
            close_reason: None,
            close_time: None,
            dirty: true,
        }
    }

    /// Entry price of the cycle: the open price of its first order, falling
    /// back to the zone base when no order has been placed yet. Used by
    /// reconciliation's assignment distance check.
    pub fn entry_price(&self) -> f64 {
        self.completed_orders
            .first()
            .or_else(|| self.active_orders.first())
            .map(|o| o.open_price)
            .unwrap_or(self.zone_base_price)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn tracks_ticket(&self, ticket: u64) -> bool {
        self.active_orders.iter().any(|o| o.ticket == ticket)
            || self.completed_orders.iter().any(|o| o.ticket == ticket)
    }

    /// Validate and append an order. Returns false (and logs) on malformed
    /// input instead of propagating an error out of the tick loop.
    pub fn add_order(&mut self, data: OrderData) -> bool {
        if data.ticket == 0 {
            warn!("cycle {}: rejected order with zero ticket", self.id);
            return false;
        }
        if data.volume <= 0.0 || !data.volume.is_finite() {
            warn!(
                "cycle {}: rejected order {} with invalid volume {}",
                self.id, data.ticket, data.volume
            );
            return false;
        }
        if data.open_price <= 0.0 || !data.open_price.is_finite() {
            warn!(
                "cycle {}: rejected order {} with invalid price {}",
                self.id, data.ticket, data.open_price
            );
            return false;
        }
        if self.tracks_ticket(data.ticket) {
            warn!("cycle {}: ticket {} already tracked", self.id, data.ticket);
            return false;
        }

        // First order of the cycle is always the initial one; later orders
        // carry the role their placement context assigned.
        let kind = if self.active_orders.is_empty() && self.completed_orders.is_empty() {
            OrderKind::Initial
        } else {
            data.kind.unwrap_or(OrderKind::Grid)
        };

        self.active_orders.push(Order {
            ticket: data.ticket,
            kind,
            direction: data.direction,
            open_price: data.open_price,
            volume: data.volume,
            profit: data.profit,
            swap: data.swap,
            commission: data.commission,
            sl: data.sl,
            tp: data.tp,
            status: OrderStatus::Active,
            open_time: data.open_time,
            close_time: None,
        });

        self.recompute_aggregates();
        self.dirty = true;
        debug!(
            "cycle {}: added {:?} order {} ({} {} @ {:.5})",
            self.id, kind, data.ticket, data.direction, data.volume, data.open_price
        );
        true
    }

    /// Refresh every active order against the venue. Tickets no longer
    /// present are moved to completed_orders with their final profit
    /// snapshot. Returns the orders that closed this tick.
    pub async fn update_status(
        &mut self,
        venue: &mut dyn ExecutionVenue,
        retry: &RetryPolicy,
    ) -> TradingResult<Vec<ClosedNotice>> {
        if self.is_closed {
            return Ok(Vec::new());
        }

        let tickets: Vec<u64> = self.active_orders.iter().map(|o| o.ticket).collect();
        let mut closed = Vec::new();

        for ticket in tickets {
            let position = retry
                .run("position_by_ticket", || venue.position_by_ticket(ticket))
                .await?;

            match position {
                Some(live) => {
                    if let Some(order) = self.active_orders.iter_mut().find(|o| o.ticket == ticket) {
                        if (order.profit - live.profit).abs() > f64::EPSILON
                            || (order.swap - live.swap).abs() > f64::EPSILON
                        {
                            order.profit = live.profit;
                            order.swap = live.swap;
                            order.commission = live.commission;
                            self.dirty = true;
                        }
                    }
                }
                None => {
                    // Ticket left the venue since the last poll: closed by
                    // batch stop-loss, TP, or a manual action. The last
                    // polled profit is the final snapshot.
                    if let Some(idx) = self.active_orders.iter().position(|o| o.ticket == ticket) {
                        let mut order = self.active_orders.remove(idx);
                        order.status = OrderStatus::Closed;
                        order.close_time = Some(Utc::now());
                        info!(
                            "cycle {}: order {} closed at venue (profit {:.2})",
                            self.id, ticket, order.net_profit()
                        );
                        closed.push(ClosedNotice {
                            ticket: order.ticket,
                            direction: order.direction,
                            kind: order.kind,
                        });
                        self.completed_orders.push(order);
                        self.dirty = true;
                    }
                }
            }
        }

        self.recompute_aggregates();
        Ok(closed)
    }

    /// Evaluate the cycle-level close conditions. Called after
    /// `update_status` each tick.
    pub fn close_condition(&self, limits: &CycleLimits) -> Option<CloseReason> {
        if self.is_closed {
            return None;
        }

        if self.active_orders.is_empty() && !self.completed_orders.is_empty() && self.total_profit > 0.0
        {
            return Some(CloseReason::TakeProfit);
        }

        if self.total_profit < 0.0 && self.total_profit.abs() >= limits.max_loss_ceiling {
            return Some(CloseReason::StopLoss);
        }

        if self.switch_count >= limits.max_direction_switches {
            return Some(CloseReason::MaxSwitches);
        }

        None
    }

    /// Force-close every remaining active order at the venue, one call per
    /// order with independent retries, then mark the cycle closed. An order
    /// that cannot be closed is logged and left for reconciliation; the
    /// cycle still terminates.
    pub async fn close(
        &mut self,
        venue: &mut dyn ExecutionVenue,
        retry: &RetryPolicy,
        reason: CloseReason,
    ) -> TradingResult<()> {
        if self.is_closed {
            return Ok(());
        }

        self.status = CycleStatus::Closing;
        let tickets: Vec<u64> = self.active_orders.iter().map(|o| o.ticket).collect();

        for ticket in tickets {
            let receipt = retry
                .run("close_position", || venue.close_position(ticket, 20))
                .await;

            match receipt {
                Ok(receipt) if receipt.retcode == RETCODE_DONE => {
                    if let Some(idx) = self.active_orders.iter().position(|o| o.ticket == ticket) {
                        let mut order = self.active_orders.remove(idx);
                        order.status = OrderStatus::Closed;
                        order.profit = receipt.profit;
                        order.close_time = Some(Utc::now());
                        self.completed_orders.push(order);
                    }
                }
                Ok(receipt) => {
                    warn!(
                        "cycle {}: venue refused close of {} (retcode {})",
                        self.id, ticket, receipt.retcode
                    );
                }
                Err(err) => {
                    warn!("cycle {}: failed to close order {}: {}", self.id, ticket, err);
                }
            }
        }

        if !self.active_orders.is_empty() {
            warn!(
                "cycle {}: {} orders still open after close, reconciliation will repair",
                self.id,
                self.active_orders.len()
            );
        }

        self.recompute_aggregates();
        self.is_closed = true;
        self.status = CycleStatus::Closed;
        self.close_reason = Some(reason);
        self.close_time = Some(Utc::now());
        self.dirty = true;

        info!(
            "🏁 cycle {} closed ({}): profit {:.2}, {} orders, {} reversals",
            self.id,
            reason.as_str(),
            self.total_profit,
            self.completed_orders.len(),
            self.reversal_count
        );
        Ok(())
    }

    /// Reopen a cycle that was closed locally but still has live positions
    /// at the venue. Used by reconciliation to repair InconsistentState.
    pub fn reopen(&mut self) {
        if !self.is_closed {
            return;
        }
        self.is_closed = false;
        self.status = CycleStatus::Recovery;
        self.close_reason = None;
        self.close_time = None;
        self.dirty = true;
        warn!("cycle {}: reopened by reconciliation", self.id);
    }

    /// Move one active order to completed with its final profit. Returns
    /// the order's net profit, or None when the ticket is not active.
    pub fn complete_order(&mut self, ticket: u64, profit: f64) -> Option<f64> {
        let idx = self.active_orders.iter().position(|o| o.ticket == ticket)?;
        let mut order = self.active_orders.remove(idx);
        order.status = OrderStatus::Closed;
        order.profit = profit;
        order.close_time = Some(Utc::now());
        let net = order.net_profit();
        self.completed_orders.push(order);
        self.recompute_aggregates();
        self.dirty = true;
        Some(net)
    }

    /// Record a direction switch. The tick loop uses this after the
    /// direction controller approves a switch.
    pub fn record_switch(&mut self, new_direction: Direction) {
        self.direction = new_direction;
        self.switch_count += 1;
        self.dirty = true;
    }

    pub fn recompute_aggregates(&mut self) {
        self.total_profit = self
            .active_orders
            .iter()
            .chain(self.completed_orders.iter())
            .map(Order::net_profit)
            .sum();
        self.total_volume = self.active_orders.iter().map(|o| o.volume).sum();
    }

    /// Ticket partition invariant: no ticket appears in both lists.
    pub fn check_partition(&self) -> bool {
        self.active_orders
            .iter()
            .all(|a| !self.completed_orders.iter().any(|c| c.ticket == a.ticket))
    }

    pub fn to_record(&self, bot_id: &str) -> CycleRecord {
        CycleRecord {
            id: self.id.clone(),
            bot_id: bot_id.to_string(),
            symbol: self.symbol.clone(),
            magic_number: self.magic_number,
            direction: self.direction,
            status: self.status,
            zone_base_price: self.zone_base_price,
            upper_bound: self.upper_bound,
            lower_bound: self.lower_bound,
            active_orders: self.active_orders.clone(),
            completed_orders: self.completed_orders.clone(),
            total_volume: self.total_volume,
            total_profit: self.total_profit,
            reversal_count: self.reversal_count,
            switch_count: self.switch_count,
            highest_buy_price: self.highest_buy_price,
            lowest_sell_price: self.lowest_sell_price,
            current_batch_id: self.current_batch_id.clone(),
            next_order_index: self.next_order_index,
            close_reason: self.close_reason.map(|r| r.as_str().to_string()),
            close_time: self.close_time,
        }
    }

    pub fn from_record(record: CycleRecord) -> TradingResult<Self> {
        if record.id.is_empty() {
            return Err(TradingError::Store("cycle record without id".to_string()));
        }

        let mut cycle = Cycle::new(
            record.id,
            record.symbol,
            record.magic_number,
            record.direction,
            record.zone_base_price,
            record.upper_bound,
            record.lower_bound,
        );
        cycle.status = record.status;
        cycle.is_closed = record.status == CycleStatus::Closed;
        cycle.active_orders = record.active_orders;
        cycle.completed_orders = record.completed_orders;
        cycle.reversal_count = record.reversal_count;
        cycle.switch_count = record.switch_count;
        cycle.highest_buy_price = record.highest_buy_price;
        cycle.lowest_sell_price = if record.lowest_sell_price <= 0.0 {
            f64::MAX
        } else {
            record.lowest_sell_price
        };
        cycle.current_batch_id = record.current_batch_id;
        cycle.next_order_index = record.next_order_index;
        cycle.close_reason = record.close_reason.as_deref().and_then(CloseReason::parse);
        cycle.close_time = record.close_time;
        cycle.recompute_aggregates();
        cycle.mark_clean();
        Ok(cycle)
    }
}

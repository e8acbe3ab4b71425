// Multi-cycle manager: owns every live cycle for one (symbol, magic)
// pair and reconciles the in-memory view against the venue's position
// list each tick.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{BatchConfig, ReconcileConfig};
use crate::core::batch::OrderBatchManager;
use crate::core::cycle::{Cycle, CycleLimits, OrderData};
use crate::core::direction::DirectionState;
use crate::core::pip::{pips_to_price, price_to_pips};
use crate::core::types::{CycleStatus, Direction, OrderKind};
use crate::error::{TradingError, TradingResult};
use crate::venue::VenuePosition;

/// One live cycle plus the per-cycle machinery that travels with it.
pub struct CycleRuntime {
    pub cycle: Cycle,
    pub batches: OrderBatchManager,
    pub direction_state: DirectionState,
}

impl CycleRuntime {
    pub fn new(cycle: Cycle, magic_number: i64, batch_config: BatchConfig) -> Self {
        let batches = OrderBatchManager::new(&cycle.symbol, magic_number, batch_config);
        let direction_state = DirectionState::new(cycle.direction);
        Self {
            cycle,
            batches,
            direction_state,
        }
    }
}

pub struct MultiCycleManager {
    symbol: String,
    magic_number: i64,
    max_active_cycles: usize,
    reconcile: ReconcileConfig,
    batch_config: BatchConfig,
    cycles: HashMap<String, CycleRuntime>,
}

impl MultiCycleManager {
    pub fn new(
        symbol: &str,
        magic_number: i64,
        max_active_cycles: usize,
        reconcile: ReconcileConfig,
        batch_config: BatchConfig,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            magic_number,
            max_active_cycles,
            reconcile,
            batch_config,
            cycles: HashMap::new(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.cycles
            .values()
            .filter(|rt| rt.cycle.status != CycleStatus::Closed)
            .count()
    }

    pub fn cycle_ids(&self) -> Vec<String> {
        self.cycles.keys().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&CycleRuntime> {
        self.cycles.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut CycleRuntime> {
        self.cycles.get_mut(id)
    }

    pub fn runtimes_mut(&mut self) -> impl Iterator<Item = &mut CycleRuntime> {
        self.cycles.values_mut()
    }

    pub fn remove(&mut self, id: &str) -> Option<CycleRuntime> {
        self.cycles.remove(id)
    }

    /// Registers a new cycle, enforcing the active-cycle ceiling.
    pub fn open_cycle(
        &mut self,
        direction: Direction,
        zone_base_price: f64,
        upper_bound: f64,
        lower_bound: f64,
    ) -> TradingResult<String> {
        if self.active_count() >= self.max_active_cycles {
            return Err(TradingError::CapacityReached(self.max_active_cycles));
        }
        let cycle = Cycle::new(
            Uuid::new_v4().to_string(),
            self.symbol.clone(),
            self.magic_number,
            direction,
            zone_base_price,
            upper_bound,
            lower_bound,
        );
        let id = cycle.id.clone();
        info!(
            "🔄 opened {} cycle {} on {} (zone base {:.5})",
            direction, id, self.symbol, zone_base_price
        );
        self.cycles.insert(
            id.clone(),
            CycleRuntime::new(cycle, self.magic_number, self.batch_config.clone()),
        );
        Ok(id)
    }

    /// Re-registers a cycle restored from the ledger at startup.
    pub fn adopt_cycle(&mut self, cycle: Cycle) {
        let id = cycle.id.clone();
        debug!("adopted cycle {} from ledger", id);
        self.cycles.insert(
            id,
            CycleRuntime::new(cycle, self.magic_number, self.batch_config.clone()),
        );
    }

    /// Ticket set across every tracked cycle, active and completed.
    fn tracked_tickets(&self) -> HashSet<u64> {
        let mut tickets = HashSet::new();
        for rt in self.cycles.values() {
            for order in rt.cycle.active_orders.iter().chain(&rt.cycle.completed_orders) {
                tickets.insert(order.ticket);
            }
        }
        tickets
    }

    /// Reconciles tracked cycles against the venue's live positions.
    /// Idempotent: running twice on the same venue state changes nothing
    /// the second time.
    pub fn reconcile(&mut self, positions: &[VenuePosition]) -> TradingResult<usize> {
        let ours: Vec<&VenuePosition> = positions
            .iter()
            .filter(|p| p.magic_number == self.magic_number && p.symbol == self.symbol)
            .collect();

        // Repair pass: a cycle marked closed while its positions are still
        // live at the venue is reopened rather than left inconsistent.
        let live_tickets: HashSet<u64> = ours.iter().map(|p| p.ticket).collect();
        for rt in self.cycles.values_mut() {
            if rt.cycle.status == CycleStatus::Closed
                && rt.cycle.active_orders.iter().any(|o| live_tickets.contains(&o.ticket))
            {
                warn!(
                    "⚠️  cycle {} closed but still has live positions; reopening",
                    rt.cycle.id
                );
                rt.cycle.reopen();
            }
        }

        let tracked = self.tracked_tickets();
        let untracked: Vec<&VenuePosition> =
            ours.into_iter().filter(|p| !tracked.contains(&p.ticket)).collect();
        if untracked.is_empty() {
            return Ok(0);
        }

        let mut adopted = 0usize;
        let mut orphans: Vec<&VenuePosition> = Vec::new();
        let now = Utc::now();
        let max_age = Duration::hours(self.reconcile.max_order_age_hours);

        for position in untracked {
            if let Some(cycle_id) = self.closest_assignable_cycle(position) {
                info!(
                    "🔗 assigned stray position {} to cycle {}",
                    position.ticket, cycle_id
                );
                if let Some(rt) = self.cycles.get_mut(&cycle_id) {
                    rt.cycle.add_order(OrderData::from_position(position, Some(OrderKind::Recovery)));
                }
                adopted += 1;
            } else if position.volume >= self.reconcile.min_volume_for_cycle
                && now.signed_duration_since(position.open_time) <= max_age
                && self.active_count() < self.max_active_cycles
            {
                let zone_half = pips_to_price(50.0, &self.symbol);
                let id = self.open_cycle(
                    position.direction,
                    position.open_price,
                    position.open_price + zone_half,
                    position.open_price - zone_half,
                )?;
                if let Some(rt) = self.cycles.get_mut(&id) {
                    rt.cycle.add_order(OrderData::from_position(position, None));
                }
                info!("🆕 adopted stray position {} as new cycle {}", position.ticket, id);
                adopted += 1;
            } else {
                orphans.push(position);
            }
        }

        if !orphans.is_empty() {
            let id = self.recovery_cycle_id(orphans[0]);
            if let Some(rt) = self.cycles.get_mut(&id) {
                for position in &orphans {
                    rt.cycle
                        .add_order(OrderData::from_position(position, Some(OrderKind::Recovery)));
                    adopted += 1;
                }
                rt.cycle.status = CycleStatus::Recovery;
            }
            warn!(
                "🩹 swept {} orphaned positions into recovery cycle {}",
                orphans.len(),
                id
            );
        }

        Ok(adopted)
    }

    /// Closest open cycle with a matching direction whose entry price is
    /// within the assignment tolerance.
    fn closest_assignable_cycle(&self, position: &VenuePosition) -> Option<String> {
        let mut best: Option<(String, f64)> = None;
        for rt in self.cycles.values() {
            if rt.cycle.status == CycleStatus::Closed || rt.cycle.direction != position.direction {
                continue;
            }
            let distance =
                price_to_pips((position.open_price - rt.cycle.entry_price()).abs(), &self.symbol);
            if distance > self.reconcile.assignment_tolerance_pips {
                continue;
            }
            match &best {
                Some((_, d)) if *d <= distance => {}
                _ => best = Some((rt.cycle.id.clone(), distance)),
            }
        }
        best.map(|(id, _)| id)
    }

    /// Single shared cycle for positions nothing else claims. Reuses an
    /// existing recovery cycle when one is already open. Exempt from the
    /// active-cycle ceiling: every live position must end up tracked, even
    /// when the book is full.
    fn recovery_cycle_id(&mut self, seed: &VenuePosition) -> String {
        if let Some(rt) = self
            .cycles
            .values()
            .find(|rt| rt.cycle.status == CycleStatus::Recovery)
        {
            return rt.cycle.id.clone();
        }
        let zone_half = pips_to_price(50.0, &self.symbol);
        let mut cycle = Cycle::new(
            Uuid::new_v4().to_string(),
            self.symbol.clone(),
            self.magic_number,
            seed.direction,
            seed.open_price,
            seed.open_price + zone_half,
            seed.open_price - zone_half,
        );
        cycle.status = CycleStatus::Recovery;
        let id = cycle.id.clone();
        self.cycles.insert(
            id.clone(),
            CycleRuntime::new(cycle, self.magic_number, self.batch_config.clone()),
        );
        id
    }

    /// Cycles whose close condition currently holds.
    pub fn cycles_to_close(&self, limits: &CycleLimits) -> Vec<(String, crate::core::types::CloseReason)> {
        self.cycles
            .values()
            .filter(|rt| rt.cycle.status != CycleStatus::Closed)
            .filter_map(|rt| {
                rt.cycle
                    .close_condition(limits)
                    .map(|reason| (rt.cycle.id.clone(), reason))
            })
            .collect()
    }

    /// Drops fully closed cycles from memory, returning them for final
    /// persistence.
    pub fn sweep_closed(&mut self) -> Vec<Cycle> {
        let closed_ids: Vec<String> = self
            .cycles
            .values()
            .filter(|rt| rt.cycle.status == CycleStatus::Closed)
            .map(|rt| rt.cycle.id.clone())
            .collect();
        let mut closed = Vec::with_capacity(closed_ids.len());
        for id in closed_ids {
            if let Some(rt) = self.cycles.remove(&id) {
                closed.push(rt.cycle);
            }
        }
        closed
    }

    /// Refreshes profit figures for active orders from the venue's
    /// position list.
    pub fn refresh_order_profits(&mut self, positions: &[VenuePosition]) {
        let by_ticket: HashMap<u64, &VenuePosition> =
            positions.iter().map(|p| (p.ticket, p)).collect();
        for rt in self.cycles.values_mut() {
            let mut touched = false;
            for order in &mut rt.cycle.active_orders {
                if let Some(position) = by_ticket.get(&order.ticket) {
                    if (order.profit - position.profit).abs() > f64::EPSILON {
                        order.profit = position.profit;
                        order.swap = position.swap;
                        order.commission = position.commission;
                        touched = true;
                    }
                }
            }
            if touched {
                rt.cycle.recompute_aggregates();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::Utc;

    fn manager(max: usize) -> MultiCycleManager {
        let config = Config::default();
        MultiCycleManager::new("EURUSD", 777, max, config.reconcile, config.batch)
    }

    fn position(ticket: u64, direction: Direction, open_price: f64, volume: f64) -> VenuePosition {
        VenuePosition {
            ticket,
            symbol: "EURUSD".to_string(),
            direction,
            open_price,
            volume,
            profit: 0.0,
            swap: 0.0,
            commission: 0.0,
            magic_number: 777,
            open_time: Utc::now(),
        }
    }

    #[test]
    fn test_capacity_ceiling() {
        let mut mgr = manager(2);
        mgr.open_cycle(Direction::Buy, 1.1, 1.105, 1.095).unwrap();
        mgr.open_cycle(Direction::Sell, 1.2, 1.205, 1.195).unwrap();
        let err = mgr.open_cycle(Direction::Buy, 1.3, 1.305, 1.295).unwrap_err();
        assert!(matches!(err, TradingError::CapacityReached(2)));
    }

    #[test]
    fn test_foreign_positions_ignored() {
        let mut mgr = manager(5);
        let mut foreign = position(9, Direction::Buy, 1.1, 0.1);
        foreign.magic_number = 42;
        let mut other_symbol = position(10, Direction::Buy, 1.1, 0.1);
        other_symbol.symbol = "GBPUSD".to_string();

        let adopted = mgr.reconcile(&[foreign, other_symbol]).unwrap();
        assert_eq!(adopted, 0);
        assert_eq!(mgr.active_count(), 0);
    }

    #[test]
    fn test_assigns_close_position_to_matching_cycle() {
        let mut mgr = manager(5);
        let id = mgr.open_cycle(Direction::Buy, 1.1000, 1.1050, 1.0950).unwrap();

        // 20 pips from the cycle entry, same direction: assignable
        let stray = position(11, Direction::Buy, 1.1020, 0.1);
        let adopted = mgr.reconcile(&[stray]).unwrap();
        assert_eq!(adopted, 1);
        let rt = mgr.get(&id).unwrap();
        assert_eq!(rt.cycle.active_orders.len(), 1);
        assert_eq!(rt.cycle.active_orders[0].ticket, 11);
    }

    #[test]
    fn test_direction_mismatch_spawns_new_cycle() {
        let mut mgr = manager(5);
        mgr.open_cycle(Direction::Buy, 1.1000, 1.1050, 1.0950).unwrap();

        let stray = position(12, Direction::Sell, 1.1010, 0.1);
        let adopted = mgr.reconcile(&[stray]).unwrap();
        assert_eq!(adopted, 1);
        assert_eq!(mgr.active_count(), 2);
    }

    #[test]
    fn test_dust_position_goes_to_recovery_cycle() {
        let mut mgr = manager(5);
        // volume below min_volume_for_cycle (0.01 default); no open cycle
        // to assign to, so it ends up in a recovery cycle
        let stray = position(13, Direction::Buy, 1.1000, 0.001);
        let adopted = mgr.reconcile(&[stray]).unwrap();
        assert_eq!(adopted, 1);
        assert_eq!(mgr.active_count(), 1);
        let id = &mgr.cycle_ids()[0];
        assert_eq!(mgr.get(id).unwrap().cycle.status, CycleStatus::Recovery);
    }

    #[test]
    fn test_orphans_share_one_recovery_cycle() {
        let mut mgr = manager(5);
        let a = position(14, Direction::Buy, 1.1000, 0.001);
        let b = position(15, Direction::Buy, 1.2000, 0.001);
        let adopted = mgr.reconcile(&[a, b]).unwrap();
        assert_eq!(adopted, 2);
        assert_eq!(mgr.active_count(), 1);
    }

    #[test]
    fn test_orphan_tracked_even_at_full_capacity() {
        let mut mgr = manager(1);
        mgr.open_cycle(Direction::Sell, 1.2000, 1.2050, 1.1950).unwrap();

        // Book is full and the position matches nothing: it must still be
        // swept into a recovery cycle rather than failing the pass.
        let stray = position(19, Direction::Buy, 1.1000, 0.1);
        let adopted = mgr.reconcile(&[stray]).unwrap();
        assert_eq!(adopted, 1);
        assert_eq!(mgr.active_count(), 2);
        assert!(mgr
            .cycle_ids()
            .iter()
            .any(|id| mgr.get(id).unwrap().cycle.status == CycleStatus::Recovery));
        assert!(mgr
            .cycle_ids()
            .iter()
            .any(|id| mgr.get(id).unwrap().cycle.active_orders.iter().any(|o| o.ticket == 19)));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut mgr = manager(5);
        let id = mgr.open_cycle(Direction::Buy, 1.1000, 1.1050, 1.0950).unwrap();
        let stray = position(16, Direction::Buy, 1.1010, 0.1);

        let first = mgr.reconcile(std::slice::from_ref(&stray)).unwrap();
        let second = mgr.reconcile(std::slice::from_ref(&stray)).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(mgr.get(&id).unwrap().cycle.active_orders.len(), 1);
    }

    #[test]
    fn test_reopens_closed_cycle_with_live_positions() {
        let mut mgr = manager(5);
        let id = mgr.open_cycle(Direction::Buy, 1.1000, 1.1050, 1.0950).unwrap();
        let stray = position(17, Direction::Buy, 1.1005, 0.1);
        mgr.reconcile(std::slice::from_ref(&stray)).unwrap();

        // Force the inconsistent state: closed, but order still "active"
        {
            let cycle = &mut mgr.get_mut(&id).unwrap().cycle;
            cycle.status = CycleStatus::Closed;
            cycle.is_closed = true;
        }
        mgr.reconcile(std::slice::from_ref(&stray)).unwrap();
        assert_ne!(mgr.get(&id).unwrap().cycle.status, CycleStatus::Closed);
    }

    #[test]
    fn test_old_positions_not_promoted_to_cycles() {
        let mut mgr = manager(5);
        let mut stale = position(18, Direction::Buy, 1.1000, 0.1);
        stale.open_time = Utc::now() - Duration::hours(48);
        let adopted = mgr.reconcile(&[stale]).unwrap();
        // swept into recovery instead of a fresh cycle
        assert_eq!(adopted, 1);
        assert_eq!(mgr.active_count(), 1);
        let id = &mgr.cycle_ids()[0];
        assert_eq!(mgr.get(id).unwrap().cycle.status, CycleStatus::Recovery);
    }
}

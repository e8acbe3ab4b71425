// Zone engine: price-zone breach detection, single-use zone activation,
// boundary movement, and reversal tracking against a cycle's extremes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::cycle::Cycle;
use crate::core::pip::{pip_divisor, pips_to_price, price_to_pips};
use crate::core::types::{Candle, Direction};

// Tolerance for pip comparisons; float noise on price arithmetic is far
// below a thousandth of a pip.
const PIP_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementMode {
    NoMove,
    MoveUpOnly,
    MoveDownOnly,
    MoveBothSides,
}

impl MovementMode {
    pub fn parse(value: &str) -> Option<MovementMode> {
        match value {
            "no_move" => Some(MovementMode::NoMove),
            "move_up_only" => Some(MovementMode::MoveUpOnly),
            "move_down_only" => Some(MovementMode::MoveDownOnly),
            "move_both_sides" => Some(MovementMode::MoveBothSides),
            _ => None,
        }
    }

    fn allows_up(&self) -> bool {
        matches!(self, MovementMode::MoveUpOnly | MovementMode::MoveBothSides)
    }

    fn allows_down(&self) -> bool {
        matches!(self, MovementMode::MoveDownOnly | MovementMode::MoveBothSides)
    }
}

#[derive(Debug, Clone)]
pub struct Zone {
    pub key: i64,
    pub base_price: f64,
    pub upper_boundary: f64,
    pub lower_boundary: f64,
    pub movement_mode: MovementMode,
    pub activated: bool,
}

/// Zone keys quantize the base price to a 10-pip bucket so that nearby
/// activation attempts collapse onto the same key.
pub fn zone_key(symbol: &str, price: f64) -> i64 {
    ((price * pip_divisor(symbol) / 10.0).round() as i64) * 10
}

#[derive(Debug, Clone, Copy)]
pub struct BreachSignal {
    pub direction: Direction,
    pub distance_pips: f64,
}

#[derive(Debug)]
pub struct ZoneEngine {
    symbol: String,
    threshold_pips: f64,
    reversal_threshold_pips: f64,
    movement_mode: MovementMode,
    // Consumed zone keys; a key stays here until explicitly deactivated.
    zones: HashMap<i64, Zone>,
}

impl ZoneEngine {
    pub fn new(
        symbol: &str,
        threshold_pips: f64,
        reversal_threshold_pips: f64,
        movement_mode: MovementMode,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            threshold_pips,
            reversal_threshold_pips,
            movement_mode,
            zones: HashMap::new(),
        }
    }

    pub fn threshold_pips(&self) -> f64 {
        self.threshold_pips
    }

    /// Breach check: fires when the pip distance from the base reaches the
    /// threshold. Direction comes from where the triggering candle closed
    /// relative to the base.
    pub fn detect_breach(
        &self,
        current_price: f64,
        base_price: f64,
        last_candle: &Candle,
    ) -> Option<BreachSignal> {
        let distance_pips = price_to_pips((current_price - base_price).abs(), &self.symbol);
        if distance_pips + PIP_EPSILON < self.threshold_pips {
            return None;
        }

        let direction = if last_candle.close > base_price {
            Direction::Buy
        } else {
            Direction::Sell
        };

        Some(BreachSignal {
            direction,
            distance_pips,
        })
    }

    /// Activate a zone at the given price. Single-use: while the key is
    /// live, any further activation on the same key is rejected.
    pub fn activate_zone(&mut self, price: f64) -> Option<Zone> {
        let key = zone_key(&self.symbol, price);
        if self.zones.contains_key(&key) {
            debug!("zone key {} for {} already consumed", key, self.symbol);
            return None;
        }

        let offset = pips_to_price(self.threshold_pips, &self.symbol);
        let zone = Zone {
            key,
            base_price: price,
            upper_boundary: price + offset,
            lower_boundary: price - offset,
            movement_mode: self.movement_mode,
            activated: true,
        };
        self.zones.insert(key, zone.clone());
        info!(
            "🎯 zone activated for {} at {:.5} (key {}, bounds {:.5}/{:.5})",
            self.symbol, price, key, zone.lower_boundary, zone.upper_boundary
        );
        Some(zone)
    }

    /// Release a consumed key so the price bucket can activate again.
    pub fn deactivate_zone(&mut self, key: i64) -> bool {
        self.zones.remove(&key).is_some()
    }

    pub fn is_zone_active(&self, key: i64) -> bool {
        self.zones.contains_key(&key)
    }

    /// Shift the zone when price escapes a boundary the movement mode
    /// allows. A move recenters the base a threshold away from the current
    /// price and rebuilds both boundaries.
    pub fn apply_movement(&self, zone: &mut Zone, current_price: f64) -> bool {
        let offset = pips_to_price(self.threshold_pips, &self.symbol);

        if current_price > zone.upper_boundary && zone.movement_mode.allows_up() {
            zone.base_price = current_price - offset;
            zone.upper_boundary = zone.base_price + offset;
            zone.lower_boundary = zone.base_price - offset;
            debug!(
                "zone {} moved up, new base {:.5}",
                zone.key, zone.base_price
            );
            return true;
        }

        if current_price < zone.lower_boundary && zone.movement_mode.allows_down() {
            zone.base_price = current_price + offset;
            zone.upper_boundary = zone.base_price + offset;
            zone.lower_boundary = zone.base_price - offset;
            debug!(
                "zone {} moved down, new base {:.5}",
                zone.key, zone.base_price
            );
            return true;
        }

        false
    }

    /// Track per-direction price extremes on the cycle and detect a
    /// reversal: a retracement of `reversal_threshold_pips` from the
    /// extreme flips direction. Returns the new direction when fired; the
    /// caller closes the cycle's orders and resets state via
    /// `apply_reversal`.
    pub fn detect_reversal(&self, cycle: &mut Cycle, current_price: f64) -> Option<Direction> {
        match cycle.direction {
            Direction::Buy => {
                if current_price > cycle.highest_buy_price {
                    cycle.highest_buy_price = current_price;
                    cycle.mark_dirty();
                }
                if cycle.highest_buy_price > 0.0 {
                    let retrace_pips =
                        price_to_pips(cycle.highest_buy_price - current_price, &self.symbol);
                    if retrace_pips + PIP_EPSILON >= self.reversal_threshold_pips {
                        return Some(Direction::Sell);
                    }
                }
            }
            Direction::Sell => {
                if current_price < cycle.lowest_sell_price {
                    cycle.lowest_sell_price = current_price;
                    cycle.mark_dirty();
                }
                if cycle.lowest_sell_price < f64::MAX {
                    let retrace_pips =
                        price_to_pips(current_price - cycle.lowest_sell_price, &self.symbol);
                    if retrace_pips + PIP_EPSILON >= self.reversal_threshold_pips {
                        return Some(Direction::Buy);
                    }
                }
            }
        }
        None
    }

    /// Commit a detected reversal on the cycle: accrue the realized P&L of
    /// the orders that were closed, flip direction and reset the extreme
    /// tracked for the new direction.
    pub fn apply_reversal(&self, cycle: &mut Cycle, new_direction: Direction, closed_pl: f64) {
        cycle.closed_orders_pl += closed_pl;
        cycle.reversal_count += 1;
        cycle.direction = new_direction;
        match new_direction {
            Direction::Buy => cycle.highest_buy_price = 0.0,
            Direction::Sell => cycle.lowest_sell_price = f64::MAX,
        }
        cycle.mark_dirty();
        warn!(
            "🔄 cycle {} reversal #{} -> {} (closed P&L {:.2})",
            cycle.id, cycle.reversal_count, new_direction, closed_pl
        );
    }
}

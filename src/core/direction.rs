// Direction controller: fuses zone and candle signals into a directional
// decision and arbitrates switches under a cooldown.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DirectionConfig;
use crate::core::types::{Candle, Direction, SignalDirection};

// Candle classification thresholds (body / range ratio).
const STRONG_BODY_RATIO: f64 = 0.7;
const MODERATE_BODY_RATIO: f64 = 0.4;
const DOJI_BODY_RATIO: f64 = 0.1;

const STRONG_CONFIDENCE: f64 = 0.9;
const MODERATE_CONFIDENCE: f64 = 0.6;
const WEAK_CONFIDENCE: f64 = 0.3;

/// Confidence assigned to the prevailing direction right after a switch.
const POST_SWITCH_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionSwitch {
    pub from: Direction,
    pub to: Direction,
    pub reason: String,
    pub at: DateTime<Utc>,
    pub confidence: f64,
}

/// Per-cycle directional state. Mutated only by the engine's single
/// writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionState {
    pub current: Direction,
    pub confidence: f64,
    pub last_switch: Option<DateTime<Utc>>,
    pub history: Vec<DirectionSwitch>,
    pub locked: bool,
}

impl DirectionState {
    pub fn new(initial: Direction) -> Self {
        Self {
            current: initial,
            confidence: POST_SWITCH_CONFIDENCE,
            last_switch: None,
            history: Vec::new(),
            locked: false,
        }
    }
}

/// Candle-derived signal with its confidence grade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandleSignal {
    pub direction: SignalDirection,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct DirectionController {
    config: DirectionConfig,
}

impl DirectionController {
    pub fn new(config: DirectionConfig) -> Self {
        Self { config }
    }

    /// Classify a candle by its body/range ratio. Doji-like bodies (or a
    /// zero range) cannot carry a direction and force HOLD.
    pub fn candle_signal(&self, candle: &Candle) -> CandleSignal {
        let range = candle.range();
        if range <= 0.0 {
            return CandleSignal {
                direction: SignalDirection::Hold,
                confidence: 0.0,
            };
        }

        let body_ratio = candle.body() / range;
        if body_ratio < DOJI_BODY_RATIO {
            return CandleSignal {
                direction: SignalDirection::Hold,
                confidence: 0.0,
            };
        }

        let direction = if candle.is_bullish() {
            SignalDirection::Buy
        } else {
            SignalDirection::Sell
        };

        let confidence = if body_ratio > STRONG_BODY_RATIO {
            STRONG_CONFIDENCE
        } else if body_ratio > MODERATE_BODY_RATIO {
            MODERATE_CONFIDENCE
        } else {
            WEAK_CONFIDENCE
        };

        CandleSignal {
            direction,
            confidence,
        }
    }

    /// Gate for a proposed switch. All of the following must hold: state
    /// not locked, candidate differs from current, cooldown elapsed (or no
    /// prior switch), confidence above the floor, and — when the zone and
    /// candle signals disagree — confidence above the conflict floor.
    pub fn should_switch(
        &self,
        state: &DirectionState,
        candidate: Direction,
        confidence: f64,
        signals_agree: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if state.locked {
            debug!("switch rejected: direction state locked");
            return false;
        }
        if candidate == state.current {
            return false;
        }
        if let Some(last) = state.last_switch {
            let elapsed = now - last;
            if elapsed < Duration::seconds(self.config.switch_cooldown_secs) {
                debug!(
                    "switch rejected: cooldown ({}s of {}s)",
                    elapsed.num_seconds(),
                    self.config.switch_cooldown_secs
                );
                return false;
            }
        }
        if confidence < self.config.min_confidence {
            debug!("switch rejected: confidence {:.2} below floor", confidence);
            return false;
        }
        if !signals_agree && confidence < self.config.conflict_confidence {
            debug!(
                "switch rejected: conflicting signals need confidence >= {:.2}",
                self.config.conflict_confidence
            );
            return false;
        }
        true
    }

    /// Execute a switch when `should_switch` approves it; otherwise a
    /// no-op returning false.
    pub fn execute_switch(
        &self,
        state: &mut DirectionState,
        candidate: Direction,
        reason: &str,
        confidence: f64,
        signals_agree: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.should_switch(state, candidate, confidence, signals_agree, now) {
            return false;
        }

        info!(
            "🔀 direction switch {} -> {} ({}, confidence {:.2})",
            state.current, candidate, reason, confidence
        );
        state.history.push(DirectionSwitch {
            from: state.current,
            to: candidate,
            reason: reason.to_string(),
            at: now,
            confidence,
        });
        state.current = candidate;
        state.confidence = POST_SWITCH_CONFIDENCE;
        state.last_switch = Some(now);
        true
    }
}

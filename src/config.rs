// Configuration management for the cycle trading bot

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub symbol: String,
    pub magic_number: i64,
    pub bot_id: String,
    pub poll_interval_secs: u64,
    pub error_backoff_secs: u64,
    pub max_active_cycles: usize,
    /// Accumulated loss (negative P&L magnitude) at which a cycle is closed.
    pub max_loss_ceiling: f64,
    /// Direction-switch count at which a cycle is closed.
    pub max_direction_switches: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Breach threshold in pips around the zone base price.
    pub threshold_pips: f64,
    /// Retracement from the tracked extreme that triggers a reversal.
    pub reversal_threshold_pips: f64,
    pub movement_mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionConfig {
    pub switch_cooldown_secs: i64,
    pub min_confidence: f64,
    /// Confidence floor when zone and candle signals disagree.
    pub conflict_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub lot_size: f64,
    pub max_lot_size: f64,
    /// Grid spacing between consecutive batch orders, in pips.
    pub order_interval_pips: f64,
    pub batch_stop_loss_pips: f64,
    /// Distance of the replacement order placed after an order close.
    pub replacement_offset_pips: f64,
    pub slippage_points: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Max pip distance for attaching an untracked position to a cycle.
    pub assignment_tolerance_pips: f64,
    pub min_volume_for_cycle: f64,
    pub max_order_age_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub enable_tick_logging: bool,
    pub enable_signal_logging: bool,
    pub enable_reconcile_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub zone: ZoneConfig,
    pub direction: DirectionConfig,
    pub batch: BatchConfig,
    pub reconcile: ReconcileConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                symbol: "EURUSD".to_string(),
                magic_number: 777001,
                bot_id: "cycle-bot-1".to_string(),
                poll_interval_secs: 1,
                error_backoff_secs: 5,
                max_active_cycles: 5,
                max_loss_ceiling: 500.0,
                max_direction_switches: 10,
            },
            zone: ZoneConfig {
                threshold_pips: 50.0,
                reversal_threshold_pips: 50.0,
                movement_mode: "no_move".to_string(),
            },
            direction: DirectionConfig {
                switch_cooldown_secs: 300,
                min_confidence: 0.1,
                conflict_confidence: 0.8,
            },
            batch: BatchConfig {
                lot_size: 0.01,
                max_lot_size: 100.0,
                order_interval_pips: 25.0,
                batch_stop_loss_pips: 300.0,
                replacement_offset_pips: 50.0,
                slippage_points: 10,
            },
            reconcile: ReconcileConfig {
                assignment_tolerance_pips: 50.0,
                min_volume_for_cycle: 0.01,
                max_order_age_hours: 24,
            },
            logging: LoggingConfig {
                enable_tick_logging: false,
                enable_signal_logging: true,
                enable_reconcile_logging: true,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            tracing::info!("📁 Created default config file: {}", path.as_ref().display());
            Ok(config)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.symbol.is_empty() {
            return Err(ConfigError::Validation("symbol must not be empty".to_string()));
        }

        if self.engine.max_active_cycles == 0 {
            return Err(ConfigError::Validation(
                "max_active_cycles must be greater than 0".to_string(),
            ));
        }

        if self.engine.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "poll_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.zone.threshold_pips <= 0.0 {
            return Err(ConfigError::Validation("threshold_pips must be positive".to_string()));
        }

        if self.zone.reversal_threshold_pips <= 0.0 {
            return Err(ConfigError::Validation(
                "reversal_threshold_pips must be positive".to_string(),
            ));
        }

        if !matches!(
            self.zone.movement_mode.as_str(),
            "no_move" | "move_up_only" | "move_down_only" | "move_both_sides"
        ) {
            return Err(ConfigError::Validation(format!(
                "unknown movement_mode '{}'",
                self.zone.movement_mode
            )));
        }

        if self.batch.lot_size <= 0.0 || self.batch.lot_size > self.batch.max_lot_size {
            return Err(ConfigError::Validation(format!(
                "lot_size must be in (0, {}]",
                self.batch.max_lot_size
            )));
        }

        if self.batch.order_interval_pips <= 0.0 {
            return Err(ConfigError::Validation(
                "order_interval_pips must be positive".to_string(),
            ));
        }

        if self.batch.batch_stop_loss_pips <= 0.0 {
            return Err(ConfigError::Validation(
                "batch_stop_loss_pips must be positive".to_string(),
            ));
        }

        if self.direction.min_confidence < 0.0 || self.direction.min_confidence > 1.0 {
            return Err(ConfigError::Validation(
                "min_confidence must be within [0, 1]".to_string(),
            ));
        }

        if self.reconcile.assignment_tolerance_pips <= 0.0 {
            return Err(ConfigError::Validation(
                "assignment_tolerance_pips must be positive".to_string(),
            ));
        }

        if self.reconcile.max_order_age_hours <= 0 {
            return Err(ConfigError::Validation(
                "max_order_age_hours must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

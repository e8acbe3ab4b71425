// Cycle Trading Bot CLI

use clap::{Parser, Subcommand};
use rand::Rng;
use std::collections::HashMap;
use tracing::{error, info, warn};

use chrono::Utc;
use cycle_trading_bot::core::types::{Candle, PriceTick};
use cycle_trading_bot::store::LedgerStore;
use cycle_trading_bot::venue::{
    AccountSnapshot, CloseReceipt, ExecutionVenue, OrderFill, OrderRequest, Timeframe,
    VenuePosition, RETCODE_DONE,
};
use cycle_trading_bot::{
    Config, SqliteLedger, TradingEngine, TradingError, TradingResult,
};

#[derive(Parser)]
#[command(name = "cycle-bot")]
#[command(about = "Zone-based multi-cycle trading engine", version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "cycle-bot.toml")]
    config: String,

    /// Ledger database path
    #[arg(short, long, default_value = "cycles.db")]
    db: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config file and the ledger database
    Init,
    /// Run the engine against the built-in paper venue
    Run {
        /// Stop after this many seconds (runs until Ctrl-C if omitted)
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Show active cycles from the ledger
    Status {
        /// Include per-order detail
        #[arg(short = 'd', long)]
        detailed: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging first (before config load so we can see config errors)
    let log_level = if cli.verbose { "debug" } else { "info" };
    std::env::set_var("RUST_LOG", log_level);
    tracing_subscriber::fmt::init();

    info!("🚀 Cycle Trading Bot v0.2.0");
    info!("📁 Config: {}", cli.config);

    match cli.command {
        Commands::Init => init_workspace(&cli.config, &cli.db)?,
        Commands::Run { duration_secs } => run_engine(&cli.config, &cli.db, duration_secs).await?,
        Commands::Status { detailed } => show_status(&cli.config, &cli.db, detailed)?,
    }

    Ok(())
}

fn init_workspace(config_path: &str, db_path: &str) -> TradingResult<()> {
    let config = Config::load_or_create(config_path)?;
    config.validate()?;
    info!("✅ config ready at {} (symbol {})", config_path, config.engine.symbol);

    let ledger = SqliteLedger::new(db_path).map_err(TradingError::from)?;
    ledger.run_migrations().map_err(TradingError::from)?;
    info!("✅ ledger ready at {}", db_path);
    Ok(())
}

async fn run_engine(
    config_path: &str,
    db_path: &str,
    duration_secs: Option<u64>,
) -> TradingResult<()> {
    let config = Config::from_file(config_path)?;
    config.validate()?;

    let ledger = SqliteLedger::new(db_path).map_err(TradingError::from)?;
    ledger.run_migrations().map_err(TradingError::from)?;

    let venue = PaperVenue::new(&config.engine.symbol, 1.1000);
    warn!("📄 paper venue: orders are simulated, nothing reaches a broker");

    let (engine, _commands) = TradingEngine::new(config, venue, ledger);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        match duration_secs {
            Some(secs) => {
                tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
                info!("⏲️  run duration elapsed");
            }
            None => {
                if tokio::signal::ctrl_c().await.is_err() {
                    error!("failed to listen for shutdown signal");
                }
            }
        }
        let _ = shutdown_tx.send(true);
    });

    engine.run(shutdown_rx).await
}

fn show_status(config_path: &str, db_path: &str, detailed: bool) -> TradingResult<()> {
    let config = Config::from_file(config_path)?;
    let ledger = SqliteLedger::new(db_path).map_err(TradingError::from)?;
    ledger.run_migrations().map_err(TradingError::from)?;

    let cycles = ledger.active_cycles(&config.engine.bot_id)?;
    if cycles.is_empty() {
        println!("No active cycles for bot {}", config.engine.bot_id);
        return Ok(());
    }

    println!("Active cycles for bot {}:", config.engine.bot_id);
    for record in &cycles {
        println!(
            "  {} {} {} status={} orders={}/{} profit={:.2} reversals={}",
            record.id,
            record.symbol,
            record.direction,
            record.status.as_str(),
            record.active_orders.len(),
            record.completed_orders.len(),
            record.total_profit,
            record.reversal_count,
        );
        if detailed {
            for order in record.active_orders.iter().chain(&record.completed_orders) {
                println!(
                    "    #{} {:?} {} {:.2} lots @ {:.5} profit {:.2}",
                    order.ticket,
                    order.kind,
                    order.direction,
                    order.volume,
                    order.open_price,
                    order.net_profit(),
                );
            }
        }
    }
    Ok(())
}

// Paper venue: a random-walk price feed with an in-memory position book.
// Good enough to exercise the whole engine without a broker connection.
struct PaperVenue {
    symbol: String,
    price: f64,
    spread: f64,
    next_ticket: u64,
    positions: HashMap<u64, VenuePosition>,
    balance: f64,
    recent: Vec<f64>,
}

impl PaperVenue {
    fn new(symbol: &str, start_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            price: start_price,
            spread: 0.0002,
            next_ticket: 1,
            positions: HashMap::new(),
            balance: 10_000.0,
            recent: vec![start_price],
        }
    }

    fn step(&mut self) {
        let mut rng = rand::thread_rng();
        let drift: f64 = rng.gen_range(-0.0004..0.0004);
        self.price = (self.price + drift).max(0.0001);
        self.recent.push(self.price);
        if self.recent.len() > 600 {
            self.recent.remove(0);
        }
        for position in self.positions.values_mut() {
            let delta = match position.direction {
                cycle_trading_bot::Direction::Buy => self.price - position.open_price,
                cycle_trading_bot::Direction::Sell => position.open_price - self.price,
            };
            position.profit = delta * position.volume * 100_000.0;
        }
    }

    fn floating_pl(&self) -> f64 {
        self.positions.values().map(|p| p.profit).sum()
    }
}

impl ExecutionVenue for PaperVenue {
    fn tick(&mut self, symbol: &str) -> TradingResult<PriceTick> {
        if symbol != self.symbol {
            return Err(TradingError::InvalidParameter(
                "symbol".to_string(),
                symbol.to_string(),
            ));
        }
        self.step();
        Ok(PriceTick {
            bid: self.price,
            ask: self.price + self.spread,
        })
    }

    fn candles(
        &mut self,
        _symbol: &str,
        _timeframe: Timeframe,
        count: usize,
    ) -> TradingResult<Vec<Candle>> {
        // Synthesizes candles from the recent walk, 60 samples each.
        let mut candles = Vec::new();
        for chunk in self.recent.chunks(60).rev().take(count) {
            let open = chunk[0];
            let close = chunk[chunk.len() - 1];
            let high = chunk.iter().cloned().fold(f64::MIN, f64::max);
            let low = chunk.iter().cloned().fold(f64::MAX, f64::min);
            candles.push(Candle {
                open,
                high,
                low,
                close,
                time: Utc::now(),
            });
        }
        candles.reverse();
        Ok(candles)
    }

    fn market_order(&mut self, request: &OrderRequest) -> TradingResult<OrderFill> {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let open_price = match request.direction {
            cycle_trading_bot::Direction::Buy => self.price + self.spread,
            cycle_trading_bot::Direction::Sell => self.price,
        };
        let now = Utc::now();
        self.positions.insert(
            ticket,
            VenuePosition {
                ticket,
                symbol: request.symbol.clone(),
                direction: request.direction,
                open_price,
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
            open_price,
            volume: request.volume,
            direction: request.direction,
            open_time: now,
        })
    }

    fn close_position(&mut self, ticket: u64, _slippage: u32) -> TradingResult<CloseReceipt> {
        match self.positions.remove(&ticket) {
            Some(position) => {
                self.balance += position.profit;
                Ok(CloseReceipt {
                    retcode: RETCODE_DONE,
                    close_price: self.price,
                    profit: position.profit,
                })
            }
            None => Err(TradingError::OrderRejected(format!(
                "unknown ticket {}",
                ticket
            ))),
        }
    }

    fn position_by_ticket(&mut self, ticket: u64) -> TradingResult<Option<VenuePosition>> {
        Ok(self.positions.get(&ticket).cloned())
    }

    fn all_positions(&mut self) -> TradingResult<Vec<VenuePosition>> {
        Ok(self.positions.values().cloned().collect())
    }

    fn account(&mut self) -> TradingResult<AccountSnapshot> {
        let equity = self.balance + self.floating_pl();
        Ok(AccountSnapshot {
            balance: self.balance,
            equity,
            margin_level_pct: 1_000.0,
            free_margin: equity * 0.9,
        })
    }
}

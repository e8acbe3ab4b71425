// Trading engine: the single-writer polling loop. One tokio task owns
// the venue, the store and every cycle; external commands arrive over a
// channel and are applied between ticks, so a command and a tick never
// interleave on the same cycle.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::core::cycle::{ClosedNotice, Cycle, CycleLimits};
use crate::core::direction::DirectionController;
use crate::core::manager::MultiCycleManager;
use crate::core::pip::pips_to_price;
use crate::core::retry::RetryPolicy;
use crate::core::types::{Candle, CloseReason, CycleStatus, Direction};
use crate::core::zone::{MovementMode, ZoneEngine};
use crate::error::{TradingError, TradingResult};
use crate::store::LedgerStore;
use crate::venue::{ExecutionVenue, Timeframe, RETCODE_DONE};

const COMMAND_QUEUE_CAPACITY: usize = 64;
const CANDLE_LOOKBACK: usize = 3;

/// Dedup window for command ids. Far larger than the queue capacity, so
/// an id can only be evicted long after any retry of it could still be
/// in flight.
const SEEN_COMMANDS_CAP: usize = 1024;

/// Confidence attached to a zone-reversal switch proposal. A completed
/// retracement is the strongest signal the engine produces.
const REVERSAL_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone)]
pub enum CloseTarget {
    Cycle(String),
    All,
}

/// External commands. Every command carries its own id; a command seen
/// twice (client retry, duplicated delivery) is applied once.
#[derive(Debug, Clone)]
pub enum Command {
    OpenOrder {
        id: Uuid,
        direction: Direction,
        price: f64,
        user_id: String,
    },
    CloseCycle {
        id: Uuid,
        target: CloseTarget,
    },
    CloseOrder {
        id: Uuid,
        ticket: u64,
    },
    StopBot {
        id: Uuid,
    },
    StartBot {
        id: Uuid,
    },
}

impl Command {
    pub fn id(&self) -> Uuid {
        match self {
            Command::OpenOrder { id, .. }
            | Command::CloseCycle { id, .. }
            | Command::CloseOrder { id, .. }
            | Command::StopBot { id }
            | Command::StartBot { id } => *id,
        }
    }
}

/// Bounded first-seen window over command ids. Insertion order is kept
/// so the oldest id is evicted once the window is full.
struct CommandDedup {
    seen: HashSet<Uuid>,
    order: VecDeque<Uuid>,
    cap: usize,
}

impl CommandDedup {
    fn new(cap: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    /// True when the id has not been seen inside the window.
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.cap {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }
}

pub struct TradingEngine<V: ExecutionVenue, S: LedgerStore> {
    config: Config,
    venue: V,
    store: S,
    zones: ZoneEngine,
    controller: DirectionController,
    manager: MultiCycleManager,
    retry: RetryPolicy,
    limits: CycleLimits,
    commands: mpsc::Receiver<Command>,
    seen_commands: CommandDedup,
    trading_enabled: bool,
}

impl<V: ExecutionVenue, S: LedgerStore> TradingEngine<V, S> {
    pub fn new(config: Config, venue: V, store: S) -> (Self, mpsc::Sender<Command>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let movement_mode =
            MovementMode::parse(&config.zone.movement_mode).unwrap_or(MovementMode::NoMove);
        let zones = ZoneEngine::new(
            &config.engine.symbol,
            config.zone.threshold_pips,
            config.zone.reversal_threshold_pips,
            movement_mode,
        );
        let controller = DirectionController::new(config.direction.clone());
        let manager = MultiCycleManager::new(
            &config.engine.symbol,
            config.engine.magic_number,
            config.engine.max_active_cycles,
            config.reconcile.clone(),
            config.batch.clone(),
        );
        let limits = CycleLimits {
            max_loss_ceiling: config.engine.max_loss_ceiling,
            max_direction_switches: config.engine.max_direction_switches,
        };
        let engine = Self {
            config,
            venue,
            store,
            zones,
            controller,
            manager,
            retry: RetryPolicy::default(),
            limits,
            commands: rx,
            seen_commands: CommandDedup::new(SEEN_COMMANDS_CAP),
            trading_enabled: true,
        };
        (engine, tx)
    }

    /// Restore active cycles from the ledger. Run once before the first
    /// tick so a restart resumes where the previous process stopped.
    pub fn recover(&mut self) -> TradingResult<usize> {
        let records = self.store.active_cycles(&self.config.engine.bot_id)?;
        let mut restored = 0usize;
        for record in records {
            match Cycle::from_record(record) {
                Ok(cycle) => {
                    self.manager.adopt_cycle(cycle);
                    restored += 1;
                }
                Err(err) => warn!("skipping unrecoverable cycle record: {}", err),
            }
        }
        if restored > 0 {
            info!("♻️  restored {} active cycles from the ledger", restored);
        }
        Ok(restored)
    }

    /// Main loop. Ticks at the configured poll interval until the
    /// shutdown flag flips; a failed iteration backs off before the next
    /// attempt instead of aborting the loop.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> TradingResult<()> {
        self.recover()?;

        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.engine.poll_interval_secs.max(1)));
        info!(
            "🚀 engine started for {} (magic {}, poll {}s)",
            self.config.engine.symbol,
            self.config.engine.magic_number,
            self.config.engine.poll_interval_secs
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.iterate().await {
                        error!("engine iteration failed: {}", err);
                        tokio::time::sleep(Duration::from_secs(
                            self.config.engine.error_backoff_secs,
                        ))
                        .await;
                    }
                }
            }
        }

        self.persist_dirty();
        info!("🛑 engine stopped");
        Ok(())
    }

    /// One full tick: commands, market data, per-cycle processing,
    /// reconciliation, close conditions, persistence.
    async fn iterate(&mut self) -> TradingResult<()> {
        self.drain_commands().await;

        if !self.trading_enabled {
            self.persist_dirty();
            return Ok(());
        }

        let symbol = self.config.engine.symbol.clone();
        let tick = self
            .retry
            .run("tick", || self.venue.tick(&symbol))
            .await?;
        let price = tick.bid;
        if self.config.logging.enable_tick_logging {
            debug!("tick {} bid {:.5} ask {:.5}", symbol, tick.bid, tick.ask);
        }

        let candles = self
            .retry
            .run("candles", || {
                self.venue.candles(&symbol, Timeframe::M5, CANDLE_LOOKBACK)
            })
            .await?;
        let last_candle = candles.last().cloned();

        // Per-cycle pipeline; one cycle's fault never takes down the rest.
        for id in self.manager.cycle_ids() {
            if let Err(err) = self.process_cycle(&id, price, last_candle.as_ref()).await {
                warn!("cycle {} skipped this tick: {}", id, err);
            }
        }

        // One reconciliation pass per tick, not per cycle.
        let positions = self
            .retry
            .run("all_positions", || self.venue.all_positions())
            .await?;
        let adopted = self.manager.reconcile(&positions)?;
        if adopted > 0 && self.config.logging.enable_reconcile_logging {
            info!("reconciliation adopted {} positions", adopted);
        }
        self.manager.refresh_order_profits(&positions);

        // Cycle-level close conditions after all state is current.
        for (id, reason) in self.manager.cycles_to_close(&self.limits) {
            if let Some(rt) = self.manager.get_mut(&id) {
                rt.cycle.close(&mut self.venue, &self.retry, reason).await?;
                rt.batches.deactivate_all();
            }
        }

        self.persist_dirty();

        for cycle in self.manager.sweep_closed() {
            let record = cycle.to_record(&self.config.engine.bot_id);
            if let Err(err) = self.store.update_cycle(&cycle.id, &record) {
                error!("failed to persist closed cycle {}: {}", cycle.id, err);
            }
        }

        Ok(())
    }

    /// Zone, direction and batch logic for one cycle.
    async fn process_cycle(
        &mut self,
        id: &str,
        price: f64,
        candle: Option<&Candle>,
    ) -> TradingResult<()> {
        let rt = match self.manager.get_mut(id) {
            Some(rt) => rt,
            None => return Ok(()),
        };
        if rt.cycle.is_closed {
            return Ok(());
        }

        // 1. Refresh order state; react to closes with flip + replacement.
        let notices = rt.cycle.update_status(&mut self.venue, &self.retry).await?;
        for notice in &notices {
            if rt.cycle.status == CycleStatus::Closing {
                break;
            }
            rt.batches
                .handle_order_close(&mut self.venue, &self.retry, &mut rt.cycle, notice, price)
                .await?;
        }

        // 2. Zone breach on fresh cycles: activate the zone (single-use
        // key), go to recovery and hedge in the breach direction.
        if rt.cycle.status == CycleStatus::Initial {
            if let Some(candle) = candle {
                if let Some(signal) =
                    self.zones.detect_breach(price, rt.cycle.zone_base_price, candle)
                {
                    if self.zones.activate_zone(rt.cycle.zone_base_price).is_some() {
                        info!(
                            "💥 zone breach for cycle {} ({}, {:.1} pips)",
                            rt.cycle.id, signal.direction, signal.distance_pips
                        );
                        rt.cycle.zone_activated = true;
                        rt.cycle.initial_threshold_breached = true;
                        rt.cycle.status = CycleStatus::Recovery;
                        rt.cycle.mark_dirty();
                        rt.batches
                            .place_hedge_order(
                                &mut self.venue,
                                &self.retry,
                                &mut rt.cycle,
                                signal.direction,
                                price,
                            )
                            .await?;
                    }
                }
            }
        }

        // 3. Reversal: retracement from the tracked extreme proposes a
        // switch; the direction controller arbitrates it against the
        // candle signal before anything is closed.
        if !rt.cycle.active_orders.is_empty() {
            if let Some(new_direction) = self.zones.detect_reversal(&mut rt.cycle, price) {
                let candle_direction =
                    candle.and_then(|c| self.controller.candle_signal(c).direction.as_direction());
                let signals_agree = candle_direction.map(|d| d == new_direction).unwrap_or(true);
                if self.controller.execute_switch(
                    &mut rt.direction_state,
                    new_direction,
                    "zone reversal",
                    REVERSAL_CONFIDENCE,
                    signals_agree,
                    Utc::now(),
                ) {
                    let closed_pl =
                        close_active_orders(&mut self.venue, &self.retry, &mut rt.cycle).await;
                    // The old direction's batch just lost every ticket;
                    // retire it so its anchors are not reused.
                    rt.batches.deactivate(rt.cycle.direction);
                    self.zones.apply_reversal(&mut rt.cycle, new_direction, closed_pl);
                    rt.cycle.record_switch(new_direction);
                    rt.cycle.status = CycleStatus::Recovery;
                }
            }
        }

        // 4. Candle-only arbitration: a strong candle against the cycle's
        // direction may flip it without a reversal. The zone signal is the
        // current direction, so the signals disagree by construction and
        // the conflict confidence floor applies.
        if let Some(candle) = candle {
            let signal = self.controller.candle_signal(candle);
            if let Some(direction) = signal.direction.as_direction() {
                if direction != rt.cycle.direction
                    && self.controller.execute_switch(
                        &mut rt.direction_state,
                        direction,
                        "candle signal",
                        signal.confidence,
                        false,
                        Utc::now(),
                    )
                {
                    if self.config.logging.enable_signal_logging {
                        info!(
                            "cycle {} direction flipped to {} on candle signal",
                            rt.cycle.id, direction
                        );
                    }
                    rt.cycle.record_switch(direction);
                }
            }
        }

        // 5. Batch management: stop loss first, then continuous grid
        // placement. Fresh cycles wait for a breach or an explicit order.
        if rt.cycle.status != CycleStatus::Initial && !rt.cycle.is_closed {
            rt.batches
                .manage_batch_stop_loss(&mut self.venue, &self.retry, &rt.cycle, price)
                .await?;
            rt.batches
                .place_next_order(&mut self.venue, &self.retry, &mut rt.cycle, price)
                .await?;
        }

        Ok(())
    }

    /// Dequeue and apply pending commands. Duplicates (same command id)
    /// are dropped; a failing command is logged and does not abort the
    /// tick.
    async fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            if !self.seen_commands.insert(command.id()) {
                debug!("dropping duplicate command {}", command.id());
                continue;
            }
            if let Err(err) = self.apply_command(command).await {
                warn!("command failed: {}", err);
            }
        }
    }

    async fn apply_command(&mut self, command: Command) -> TradingResult<()> {
        match command {
            Command::OpenOrder {
                direction,
                price,
                user_id,
                ..
            } => {
                info!("📥 open command from {}: {} at {:.5}", user_id, direction, price);
                let half = pips_to_price(self.zones.threshold_pips(), &self.config.engine.symbol);
                let id =
                    self.manager
                        .open_cycle(direction, price, price + half, price - half)?;
                if let Some(rt) = self.manager.get_mut(&id) {
                    rt.batches
                        .place_next_order(&mut self.venue, &self.retry, &mut rt.cycle, price)
                        .await?;
                    rt.cycle.status = CycleStatus::ZoneActive;
                    rt.cycle.mark_dirty();
                    let record = rt.cycle.to_record(&self.config.engine.bot_id);
                    self.store.create_cycle(&record)?;
                    rt.cycle.mark_clean();
                }
                Ok(())
            }
            Command::CloseCycle { target, .. } => {
                let ids: Vec<String> = match target {
                    CloseTarget::Cycle(id) => vec![id],
                    CloseTarget::All => self.manager.cycle_ids(),
                };
                for id in ids {
                    let rt = self
                        .manager
                        .get_mut(&id)
                        .ok_or_else(|| TradingError::CycleNotFound(id.clone()))?;
                    rt.cycle
                        .close(&mut self.venue, &self.retry, CloseReason::Manual)
                        .await?;
                    rt.batches.deactivate_all();
                }
                Ok(())
            }
            Command::CloseOrder { ticket, .. } => {
                let receipt = self
                    .retry
                    .run("close_position", || self.venue.close_position(ticket, 20))
                    .await?;
                if receipt.retcode != RETCODE_DONE {
                    return Err(TradingError::OrderRejected(format!(
                        "close of {} refused (retcode {})",
                        ticket, receipt.retcode
                    )));
                }
                // A manual close takes the same flip-and-replace path as
                // one the venue reported on its own.
                let symbol = self.config.engine.symbol.clone();
                let tick = self.retry.run("tick", || self.venue.tick(&symbol)).await?;
                for rt in self.manager.runtimes_mut() {
                    let notice = rt
                        .cycle
                        .active_orders
                        .iter()
                        .find(|o| o.ticket == ticket)
                        .map(|o| ClosedNotice {
                            ticket,
                            direction: o.direction,
                            kind: o.kind,
                        });
                    if let Some(notice) = notice {
                        let _ = rt.cycle.complete_order(ticket, receipt.profit);
                        rt.batches
                            .handle_order_close(
                                &mut self.venue,
                                &self.retry,
                                &mut rt.cycle,
                                &notice,
                                tick.bid,
                            )
                            .await?;
                        break;
                    }
                }
                Ok(())
            }
            Command::StopBot { .. } => {
                warn!("⏸️  trading stopped by command");
                self.trading_enabled = false;
                Ok(())
            }
            Command::StartBot { .. } => {
                info!("▶️  trading started by command");
                self.trading_enabled = true;
                Ok(())
            }
        }
    }

    /// Write every cycle whose in-memory state changed this tick.
    fn persist_dirty(&mut self) {
        let bot_id = self.config.engine.bot_id.clone();
        for rt in self.manager.runtimes_mut() {
            if !rt.cycle.is_dirty() {
                continue;
            }
            let record = rt.cycle.to_record(&bot_id);
            match self.store.update_cycle(&rt.cycle.id, &record) {
                Ok(()) => rt.cycle.mark_clean(),
                Err(err) => error!("failed to persist cycle {}: {}", rt.cycle.id, err),
            }
        }
    }
}

/// Close every active order of a cycle at the venue, moving the closed
/// ones to completed. Returns the realized net P&L of what was closed.
async fn close_active_orders(
    venue: &mut dyn ExecutionVenue,
    retry: &RetryPolicy,
    cycle: &mut Cycle,
) -> f64 {
    let tickets: Vec<u64> = cycle.active_orders.iter().map(|o| o.ticket).collect();
    let mut realized = 0.0;
    for ticket in tickets {
        match retry
            .run("close_position", || venue.close_position(ticket, 20))
            .await
        {
            Ok(receipt) if receipt.retcode == RETCODE_DONE => {
                if let Some(net) = cycle.complete_order(ticket, receipt.profit) {
                    realized += net;
                }
            }
            Ok(receipt) => warn!(
                "cycle {}: venue refused close of {} (retcode {})",
                cycle.id, ticket, receipt.retcode
            ),
            Err(err) => warn!("cycle {}: failed to close order {}: {}", cycle.id, ticket, err),
        }
    }
    realized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OrderKind, PriceTick};
    use crate::db::SqliteLedger;
    use crate::venue::{AccountSnapshot, CloseReceipt, OrderFill, OrderRequest, VenuePosition};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct VenueState {
        price: f64,
        next_ticket: u64,
        positions: HashMap<u64, VenuePosition>,
        placed: Vec<OrderRequest>,
        closed: Vec<u64>,
    }

    /// Scripted venue sharing its state with the test through a handle,
    /// since the engine owns the venue value.
    struct InlineVenue {
        state: Arc<Mutex<VenueState>>,
    }

    impl ExecutionVenue for InlineVenue {
        fn tick(&mut self, _symbol: &str) -> TradingResult<PriceTick> {
            let state = self.state.lock().unwrap();
            Ok(PriceTick {
                bid: state.price,
                ask: state.price + 0.0002,
            })
        }

        fn candles(
            &mut self,
            _symbol: &str,
            _timeframe: Timeframe,
            count: usize,
        ) -> TradingResult<Vec<Candle>> {
            let price = self.state.lock().unwrap().price;
            Ok((0..count).map(|_| flat_candle(price)).collect())
        }

        fn market_order(&mut self, request: &OrderRequest) -> TradingResult<OrderFill> {
            let mut state = self.state.lock().unwrap();
            state.placed.push(request.clone());
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            let price = state.price;
            let now = Utc::now();
            state.positions.insert(
                ticket,
                VenuePosition {
                    ticket,
                    symbol: request.symbol.clone(),
                    direction: request.direction,
                    open_price: price,
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
                open_price: price,
                volume: request.volume,
                direction: request.direction,
                open_time: now,
            })
        }

        fn close_position(&mut self, ticket: u64, _slippage: u32) -> TradingResult<CloseReceipt> {
            let mut state = self.state.lock().unwrap();
            state.closed.push(ticket);
            let profit = state.positions.remove(&ticket).map(|p| p.profit).unwrap_or(0.0);
            Ok(CloseReceipt {
                retcode: RETCODE_DONE,
                close_price: state.price,
                profit,
            })
        }

        fn position_by_ticket(&mut self, ticket: u64) -> TradingResult<Option<VenuePosition>> {
            Ok(self.state.lock().unwrap().positions.get(&ticket).cloned())
        }

        fn all_positions(&mut self) -> TradingResult<Vec<VenuePosition>> {
            Ok(self.state.lock().unwrap().positions.values().cloned().collect())
        }

        fn account(&mut self) -> TradingResult<AccountSnapshot> {
            Ok(AccountSnapshot {
                balance: 10_000.0,
                equity: 10_000.0,
                margin_level_pct: 800.0,
                free_margin: 9_000.0,
            })
        }
    }

    fn flat_candle(price: f64) -> Candle {
        Candle {
            open: price,
            high: price,
            low: price,
            close: price,
            time: Utc::now(),
        }
    }

    fn engine_with_venue(
        price: f64,
    ) -> (TradingEngine<InlineVenue, SqliteLedger>, Arc<Mutex<VenueState>>) {
        let state = Arc::new(Mutex::new(VenueState {
            price,
            next_ticket: 1,
            positions: HashMap::new(),
            placed: Vec::new(),
            closed: Vec::new(),
        }));
        let venue = InlineVenue {
            state: Arc::clone(&state),
        };
        let store = SqliteLedger::new_in_memory().unwrap();
        store.run_migrations().unwrap();
        let (engine, _tx) = TradingEngine::new(Config::default(), venue, store);
        (engine, state)
    }

    async fn open_buy_cycle(
        engine: &mut TradingEngine<InlineVenue, SqliteLedger>,
        price: f64,
    ) -> String {
        engine
            .apply_command(Command::OpenOrder {
                id: Uuid::new_v4(),
                direction: Direction::Buy,
                price,
                user_id: "tester".to_string(),
            })
            .await
            .unwrap();
        engine.manager.cycle_ids().remove(0)
    }

    #[tokio::test]
    async fn test_reversal_retires_old_direction_batch() {
        let (mut engine, state) = engine_with_venue(1.2000);
        let id = open_buy_cycle(&mut engine, 1.2000).await;

        // Price runs up 50 pips; the grid adds a second BUY order and the
        // extreme is tracked
        state.lock().unwrap().price = 1.2050;
        let candle = flat_candle(1.2050);
        engine.process_cycle(&id, 1.2050, Some(&candle)).await.unwrap();
        assert_eq!(state.lock().unwrap().placed.len(), 2);

        // Full retracement: the BUY orders are closed, the cycle flips
        state.lock().unwrap().price = 1.2000;
        let candle = flat_candle(1.2000);
        engine.process_cycle(&id, 1.2000, Some(&candle)).await.unwrap();

        let rt = engine.manager.get(&id).unwrap();
        assert_eq!(rt.cycle.direction, Direction::Sell);
        assert_eq!(rt.cycle.switch_count, 1);
        assert_eq!(state.lock().unwrap().closed.len(), 2);
        // The BUY batch retired with its tickets; only the SELL side is live
        assert!(rt.batches.active_batch(Direction::Buy).is_none());
        assert!(rt.batches.active_batch(Direction::Sell).is_some());
        assert!(rt.cycle.active_orders.iter().all(|o| o.direction == Direction::Sell));
    }

    #[tokio::test]
    async fn test_manual_order_close_flips_and_replaces() {
        let (mut engine, state) = engine_with_venue(1.1000);
        let id = open_buy_cycle(&mut engine, 1.1000).await;
        let ticket = engine.manager.get(&id).unwrap().cycle.active_orders[0].ticket;

        engine
            .apply_command(Command::CloseOrder {
                id: Uuid::new_v4(),
                ticket,
            })
            .await
            .unwrap();

        let rt = engine.manager.get(&id).unwrap();
        assert!(rt.cycle.completed_orders.iter().any(|o| o.ticket == ticket));
        assert_eq!(rt.cycle.direction, Direction::Sell);
        let replacement = rt
            .cycle
            .active_orders
            .iter()
            .find(|o| o.direction == Direction::Sell)
            .expect("replacement order placed in the same pass");
        assert_eq!(replacement.kind, OrderKind::Recovery);
        let last = state.lock().unwrap().placed.last().cloned().unwrap();
        assert_eq!(last.direction, Direction::Sell);
        assert!((last.price - 1.0950).abs() < 1e-9);
    }

    #[test]
    fn test_command_dedup_window_is_bounded() {
        let mut dedup = CommandDedup::new(4);
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            assert!(dedup.insert(*id));
        }
        assert!(!dedup.insert(ids[4]));
        assert_eq!(dedup.seen.len(), 4);
        // the oldest id fell out of the window and counts as new again
        assert!(dedup.insert(ids[0]));
    }

    #[test]
    fn test_command_ids_are_stable() {
        let id = Uuid::new_v4();
        let cmd = Command::StopBot { id };
        assert_eq!(cmd.id(), id);
        let open = Command::OpenOrder {
            id,
            direction: Direction::Buy,
            price: 1.1,
            user_id: "tester".to_string(),
        };
        assert_eq!(open.id(), id);
    }

    #[test]
    fn test_close_target_variants() {
        let all = CloseTarget::All;
        assert!(matches!(all, CloseTarget::All));
        let one = CloseTarget::Cycle("c1".to_string());
        assert!(matches!(one, CloseTarget::Cycle(ref id) if id == "c1"));
    }
}

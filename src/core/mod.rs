// Core trading logic modules

pub mod batch;
pub mod cycle;
pub mod direction;
pub mod engine;
pub mod manager;
pub mod pip;
pub mod retry;
pub mod types;
pub mod zone;

// Re-export commonly used types
pub use batch::{Batch, OrderBatchManager};
pub use cycle::{Cycle, CycleLimits, Order, OrderData};
pub use direction::{DirectionController, DirectionState};
pub use engine::{CloseTarget, Command, TradingEngine};
pub use manager::{CycleRuntime, MultiCycleManager};
pub use retry::RetryPolicy;
pub use types::{Candle, CloseReason, CycleStatus, Direction, OrderKind, OrderStatus, PriceTick};
pub use zone::{BreachSignal, MovementMode, Zone, ZoneEngine};

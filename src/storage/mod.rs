pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::trade::TradeRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("trade not found: {0}")]
    NotFound(String),
    #[error("storage backend: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Partial update applied to an open trade record.
#[derive(Debug, Clone, Default)]
pub struct TradeUpdates {
    pub stop_loss: Option<f64>,
    pub metadata: Option<String>,
}

/// Persistence contract consumed by the entry pipeline and monitor.
///
/// All I/O happens outside the engine's critical section: the engine
/// only ever sees records that were already fetched.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Open trades, optionally filtered to one pair.
    async fn get_open_trades(&self, pair: Option<&str>) -> StoreResult<Vec<TradeRecord>>;

    async fn insert_trade(&self, record: TradeRecord) -> StoreResult<()>;

    async fn update_trade(&self, trade_id: &str, updates: TradeUpdates) -> StoreResult<()>;

    async fn close_trade(
        &self,
        trade_id: &str,
        exit_price: f64,
        pnl: f64,
        pnl_pct: f64,
        fees: f64,
    ) -> StoreResult<()>;

    /// Number of trades opened at or after `cutoff`; backs the entry
    /// rate throttle.
    async fn count_trades_since(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    /// Advisory text log of gate decisions and engine events.
    async fn log_thought(&self, category: &str, message: &str) -> StoreResult<()>;
}

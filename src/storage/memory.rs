use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::models::trade::{TradeRecord, TradeStatus};

use super::{StoreError, StoreResult, TradeStore, TradeUpdates};

/// A trade after closure, kept for inspection and rate counting.
#[derive(Debug, Clone)]
pub struct ClosedTrade {
    pub record: TradeRecord,
    pub exit_price: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub fees: f64,
    pub closed_at: DateTime<Utc>,
}

/// In-memory `TradeStore` backing the paper-trading binary and the test
/// suite. Concurrent access goes through dashmap; thoughts take a mutex
/// since they are append-only and low-traffic.
#[derive(Default)]
pub struct MemoryStore {
    open: DashMap<String, TradeRecord>,
    closed: DashMap<String, ClosedTrade>,
    thoughts: Mutex<Vec<(String, String)>>,
    count_queries: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn closed_count(&self) -> usize {
        self.closed.len()
    }

    pub fn closed_trade(&self, trade_id: &str) -> Option<ClosedTrade> {
        self.closed.get(trade_id).map(|c| c.clone())
    }

    /// How many times the rate throttle actually hit the store.
    pub fn count_queries(&self) -> u64 {
        self.count_queries.load(Ordering::Relaxed)
    }

    pub async fn thoughts(&self) -> Vec<(String, String)> {
        self.thoughts.lock().await.clone()
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn get_open_trades(&self, pair: Option<&str>) -> StoreResult<Vec<TradeRecord>> {
        let records = self
            .open
            .iter()
            .filter(|e| pair.map_or(true, |p| e.value().pair == p))
            .map(|e| e.value().clone())
            .collect();
        Ok(records)
    }

    async fn insert_trade(&self, record: TradeRecord) -> StoreResult<()> {
        self.open.insert(record.trade_id.clone(), record);
        Ok(())
    }

    async fn update_trade(&self, trade_id: &str, updates: TradeUpdates) -> StoreResult<()> {
        let mut record = self
            .open
            .get_mut(trade_id)
            .ok_or_else(|| StoreError::NotFound(trade_id.to_string()))?;
        if let Some(stop_loss) = updates.stop_loss {
            record.stop_loss = stop_loss;
        }
        if let Some(metadata) = updates.metadata {
            record.metadata = Some(metadata);
        }
        Ok(())
    }

    async fn close_trade(
        &self,
        trade_id: &str,
        exit_price: f64,
        pnl: f64,
        pnl_pct: f64,
        fees: f64,
    ) -> StoreResult<()> {
        let (_, mut record) = self
            .open
            .remove(trade_id)
            .ok_or_else(|| StoreError::NotFound(trade_id.to_string()))?;
        record.status = TradeStatus::Closed;
        self.closed.insert(
            trade_id.to_string(),
            ClosedTrade {
                record,
                exit_price,
                pnl,
                pnl_pct,
                fees,
                closed_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn count_trades_since(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        self.count_queries.fetch_add(1, Ordering::Relaxed);
        let open = self
            .open
            .iter()
            .filter(|e| e.value().opened_at >= cutoff)
            .count();
        let closed = self
            .closed
            .iter()
            .filter(|e| e.value().record.opened_at >= cutoff)
            .count();
        Ok((open + closed) as u64)
    }

    async fn log_thought(&self, category: &str, message: &str) -> StoreResult<()> {
        self.thoughts
            .lock()
            .await
            .push((category.to_string(), message.to_string()));
        Ok(())
    }
}

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::market::MarketData;
use crate::models::trade::{Side, TradeRecord};
use crate::risk::RiskManager;
use crate::storage::{TradeStore, TradeUpdates};

#[derive(Debug, Default, Clone, Copy)]
pub struct MonitorSummary {
    pub ticked: usize,
    pub stopped_out: usize,
}

/// Drives stop management for every open trade on each price tick:
/// update the stop state, persist it, and close out positions whose
/// stop has been crossed. Store failures on a single trade are logged
/// and never abort the sweep.
pub struct PositionMonitor {
    store: Arc<dyn TradeStore>,
    market: Arc<dyn MarketData>,
    risk: Arc<RwLock<RiskManager>>,
    fee_pct: f64,
}

impl PositionMonitor {
    pub fn new(
        store: Arc<dyn TradeStore>,
        market: Arc<dyn MarketData>,
        risk: Arc<RwLock<RiskManager>>,
        fee_pct: f64,
    ) -> Self {
        Self {
            store,
            market,
            risk,
            fee_pct,
        }
    }

    /// One sweep over all open trades.
    pub async fn tick(&self) -> anyhow::Result<MonitorSummary> {
        let open = self.store.get_open_trades(None).await?;
        let mut summary = MonitorSummary::default();

        for record in open {
            let Some(price) = self.market.latest_price(&record.pair) else {
                warn!("no price for {}, skipping stop update", record.pair);
                continue;
            };

            let (state, stop_hit) = {
                let mut rm = self.risk.write().await;
                if rm.stop_state(&record.trade_id).is_none() {
                    // Trade runs without stop management
                    continue;
                }
                let state =
                    rm.update_stop_loss(&record.trade_id, price, record.entry_price, record.side);
                let hit = rm.should_stop_out(&record.trade_id, price, record.side);
                (state, hit)
            };
            summary.ticked += 1;

            if stop_hit {
                self.close_out(&record, price).await;
                summary.stopped_out += 1;
            } else {
                let mut metadata = record.parsed_metadata().unwrap_or_default();
                metadata.stop_loss_state = Some(state.clone());
                let updates = TradeUpdates {
                    stop_loss: Some(state.current_sl),
                    metadata: serde_json::to_string(&metadata).ok(),
                };
                if let Err(e) = self.store.update_trade(&record.trade_id, updates).await {
                    warn!("failed to persist stop state for {}: {e}", record.trade_id);
                }
            }
        }

        Ok(summary)
    }

    async fn close_out(&self, record: &TradeRecord, exit_price: f64) {
        let size_usd = record.size_usd();
        let gross = match record.side {
            Side::Buy => (exit_price - record.entry_price) / record.entry_price,
            Side::Sell => (record.entry_price - exit_price) / record.entry_price,
        } * size_usd;
        let fees = size_usd * self.fee_pct;
        let pnl = gross - fees;
        let pnl_pct = if size_usd > 0.0 {
            pnl / size_usd * 100.0
        } else {
            0.0
        };

        if let Err(e) = self
            .store
            .close_trade(&record.trade_id, exit_price, pnl, pnl_pct, fees)
            .await
        {
            warn!("failed to close {} in store: {e}", record.trade_id);
            return;
        }

        self.risk.write().await.close_position(&record.trade_id, pnl);

        info!(
            "stopped out {} {} @ {:.4}, pnl {:.2}",
            record.side.as_str(),
            record.pair,
            exit_price,
            pnl
        );
        if let Err(e) = self
            .store
            .log_thought(
                "exit",
                &format!(
                    "{} stopped out at {:.4} for {:.2} ({:.2}%)",
                    record.pair, exit_price, pnl, pnl_pct
                ),
            )
            .await
        {
            warn!("failed to log exit thought: {e}");
        }
    }
}

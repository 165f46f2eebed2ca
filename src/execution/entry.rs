use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Timelike, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EntryConfig;
use crate::market::MarketData;
use crate::models::trade::{Side, TradeMetadata, TradeProposal, TradeRecord, TradeStatus};
use crate::risk::sizing::SizeRequest;
use crate::risk::RiskManager;
use crate::storage::TradeStore;

/// A paper fill produced by an accepted proposal.
#[derive(Debug, Clone)]
pub struct EnteredTrade {
    pub trade_id: String,
    pub pair: String,
    pub fill_price: f64,
    pub size_usd: f64,
    pub size_units: f64,
    pub fees: f64,
}

#[derive(Debug, Clone)]
pub enum EntryOutcome {
    Entered(EnteredTrade),
    Rejected(String),
}

impl EntryOutcome {
    pub fn is_entered(&self) -> bool {
        matches!(self, EntryOutcome::Entered(_))
    }

    pub fn rejection(&self) -> Option<&str> {
        match self {
            EntryOutcome::Rejected(reason) => Some(reason),
            EntryOutcome::Entered(_) => None,
        }
    }
}

/// Caller-side entry gates that run ahead of the engine's own checks,
/// then sizing, paper fill, persistence, and registration.
///
/// Sizing and registration happen under one engine lock so the counts
/// the gate observed cannot drift before the position lands; all store
/// I/O stays outside that lock.
pub struct EntryPipeline {
    config: EntryConfig,
    store: Arc<dyn TradeStore>,
    market: Arc<dyn MarketData>,
    risk: Arc<RwLock<RiskManager>>,
    /// Manual halt switch; blocks all new entries when set.
    halted: AtomicBool,
    /// pair -> correlation group, inverted from config at construction.
    group_of: HashMap<String, String>,
    /// Short-TTL cache over count_trades_since so the throttle does not
    /// hammer the store on every proposal.
    rate_cache: Mutex<Option<(Instant, u64)>>,
}

impl EntryPipeline {
    pub fn new(
        config: EntryConfig,
        store: Arc<dyn TradeStore>,
        market: Arc<dyn MarketData>,
        risk: Arc<RwLock<RiskManager>>,
    ) -> Self {
        let mut group_of = HashMap::new();
        for (group, pairs) in &config.correlation.groups {
            for pair in pairs {
                group_of.insert(pair.clone(), group.clone());
            }
        }
        Self {
            config,
            store,
            market,
            risk,
            halted: AtomicBool::new(false),
            group_of,
            rate_cache: Mutex::new(None),
        }
    }

    /// Block all new entries until `resume` is called. Open positions
    /// keep being managed.
    pub fn halt(&self) {
        warn!("entry pipeline halted, no new positions");
        self.halted.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        info!("entry pipeline resumed");
        self.halted.store(false, Ordering::Relaxed);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }

    /// Run every gate against a proposal and, on approval, fill it on
    /// paper and register the position. Gate rejections are outcomes,
    /// not errors; `Err` means the store itself failed.
    pub async fn execute(&self, proposal: &TradeProposal) -> anyhow::Result<EntryOutcome> {
        let pair = proposal.pair.as_str();

        let Some(side) = proposal.direction.as_side() else {
            return self.reject(pair, "non-directional signal".to_string()).await;
        };

        if self.is_halted() {
            return self.reject(pair, "trading halted".to_string()).await;
        }

        let now = Utc::now();
        let age = proposal.age_secs(now);
        if age > self.config.signal_max_age_secs {
            return self
                .reject(pair, format!("signal is {age:.0}s old, discarding"))
                .await;
        }

        // Older signals decay: a proposal loses confidence for every
        // second past the grace window.
        let decay =
            (age - self.config.confidence_decay_grace_secs).max(0.0) * self.config.confidence_decay_per_sec;
        let confidence = proposal.confidence - decay;
        if confidence < self.config.min_confidence {
            return self
                .reject(
                    pair,
                    format!(
                        "confidence {confidence:.2} below minimum {:.2}",
                        self.config.min_confidence
                    ),
                )
                .await;
        }

        if self
            .market
            .is_stale(pair, self.config.market_max_staleness_secs)
        {
            return self.reject(pair, "market data stale".to_string()).await;
        }

        if !self.store.get_open_trades(Some(pair)).await?.is_empty() {
            return self
                .reject(pair, "already holding a position on this pair".to_string())
                .await;
        }

        let hour = now.hour();
        if self.config.quiet_hours_utc.contains(&hour) {
            return self
                .reject(pair, format!("quiet hour {hour:02}:00 UTC"))
                .await;
        }

        if self.config.max_trades_per_hour > 0 {
            let recent = self.recent_trade_count().await?;
            if recent >= self.config.max_trades_per_hour as u64 {
                return self
                    .reject(
                        pair,
                        format!("trade-rate limit reached ({recent} in the last hour)"),
                    )
                    .await;
            }
        }

        if let Some(group) = self.group_of.get(pair) {
            let open = self.store.get_open_trades(None).await?;
            let in_group = open
                .iter()
                .filter(|t| self.group_of.get(&t.pair) == Some(group))
                .count();
            if in_group >= self.config.correlation.max_concurrent_per_group {
                return self
                    .reject(
                        pair,
                        format!("correlation group {group} is full ({in_group} open)"),
                    )
                    .await;
            }
        }

        let mut req = SizeRequest::from_proposal(proposal, self.market.spread_pct(pair));
        req.confidence = confidence;

        let mut rm = self.risk.write().await;

        if rm.is_strategy_on_cooldown(pair, proposal.strategy.as_deref(), Some(side)) {
            drop(rm);
            return self
                .reject(pair, "strategy cooling down after last close".to_string())
                .await;
        }

        let result = rm.calculate_position_size(&req);
        if !result.allowed {
            let reason = result.reason.clone();
            drop(rm);
            return self.reject(pair, reason).await;
        }

        // Paper fill: slippage moves the entry against us.
        let fill_price = match side {
            Side::Buy => proposal.entry_price * (1.0 + self.config.slippage_pct),
            Side::Sell => proposal.entry_price * (1.0 - self.config.slippage_pct),
        };
        let fees = result.size_usd * self.config.fee_pct;
        let trade_id = format!("T-{}", Uuid::new_v4());

        rm.register_position(
            &trade_id,
            pair,
            side,
            fill_price,
            result.size_usd,
            proposal.strategy.as_deref(),
        );
        let stop_state = rm.initialize_stop_loss(
            &trade_id,
            fill_price,
            proposal.stop_loss,
            side,
            None,
            None,
        );
        drop(rm);

        let metadata = TradeMetadata {
            size_usd: Some(result.size_usd),
            stop_loss_state: Some(stop_state),
            mode: Some("paper".into()),
            slippage: Some(self.config.slippage_pct),
            fees: Some(fees),
        };
        let record = TradeRecord {
            trade_id: trade_id.clone(),
            pair: pair.to_string(),
            side,
            entry_price: fill_price,
            quantity: result.size_units,
            stop_loss: proposal.stop_loss,
            take_profit: proposal.take_profit,
            strategy: proposal.strategy.clone(),
            status: TradeStatus::Open,
            opened_at: now,
            metadata: serde_json::to_string(&metadata).ok(),
        };
        self.store.insert_trade(record).await?;

        info!(
            "entered {} {} ${:.2} @ {:.4} ({trade_id})",
            side.as_str(),
            pair,
            result.size_usd,
            fill_price
        );

        Ok(EntryOutcome::Entered(EnteredTrade {
            trade_id,
            pair: pair.to_string(),
            fill_price,
            size_usd: result.size_usd,
            size_units: result.size_units,
            fees,
        }))
    }

    async fn reject(&self, pair: &str, reason: String) -> anyhow::Result<EntryOutcome> {
        debug!("entry rejected for {pair}: {reason}");
        if let Err(e) = self
            .store
            .log_thought("entry_gate", &format!("{pair}: {reason}"))
            .await
        {
            warn!("failed to log entry-gate thought: {e}");
        }
        Ok(EntryOutcome::Rejected(reason))
    }

    async fn recent_trade_count(&self) -> anyhow::Result<u64> {
        let mut cache = self.rate_cache.lock().await;
        if let Some((fetched_at, count)) = *cache {
            if fetched_at.elapsed().as_secs_f64() < self.config.trade_count_cache_ttl_secs {
                return Ok(count);
            }
        }
        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let count = self.store.count_trades_since(cutoff).await?;
        *cache = Some((Instant::now(), count));
        Ok(count)
    }
}

use chrono::Utc;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::models::position::{OpenPosition, SizeReduction};
use crate::models::report::RiskReport;
use crate::models::trade::{Side, TradeRecord};

use super::ledger::PortfolioLedger;
use super::registry::PositionBook;
use super::ruin;
use super::sizing::{self, PositionSizeResult, SizeRequest};
use super::stops::{StopLossState, StopTracker};
use super::Clock;

/// The decision authority between signal producer and order executor.
///
/// Owns all ledger, registry, and stop state for one tenant and mutates
/// it from a single logical owner; every operation is synchronous and
/// bounded. Sizing uses fixed-fractional risk as the primary method with
/// Kelly as a cap, so an account with no history still trades and
/// collects data.
pub struct RiskManager {
    config: EngineConfig,
    clock: Clock,
    ledger: PortfolioLedger,
    book: PositionBook,
    stops: StopTracker,
}

impl RiskManager {
    pub fn new(config: EngineConfig) -> Self {
        let config = config.sanitized();
        let stops = StopTracker::new(
            config.breakeven_activation_pct,
            config.trailing_activation_pct,
            config.trailing_step_pct,
        );
        let mut ledger = PortfolioLedger::new(config.initial_bankroll);
        ledger.daily_reset_if_needed(&today_utc());
        Self {
            config,
            clock: Clock::new(),
            ledger,
            book: PositionBook::new(),
            stops,
        }
    }

    // ------------------------------------------------------------------
    // Sizing
    // ------------------------------------------------------------------

    /// Gate a proposed entry and size it against every capital
    /// constraint. The multiplicative factors apply in a fixed order so
    /// their composition is exact: Kelly cap, drawdown, streak, spread,
    /// volatility, hard cap, exposure.
    pub fn calculate_position_size(&mut self, req: &SizeRequest) -> PositionSizeResult {
        if let Err(reason) = self.pre_trade_checks(&req.pair) {
            return PositionSizeResult::denied(reason);
        }

        if req.entry_price <= 0.0 || req.stop_loss <= 0.0 {
            return PositionSizeResult::denied("Invalid prices");
        }

        if self.ledger.current_bankroll <= 0.0 {
            return PositionSizeResult::denied("Bankroll depleted");
        }

        let mut result = PositionSizeResult::default();

        let sl_distance = (req.entry_price - req.stop_loss).abs();
        let sl_pct = sl_distance / req.entry_price;
        result.stop_distance_pct = sl_pct;

        if sl_pct <= 0.0 || sl_pct > 0.10 {
            result.reason = format!("Invalid stop distance: {:.2}%", sl_pct * 100.0);
            return result;
        }

        let tp_distance = (req.take_profit - req.entry_price).abs();
        result.risk_reward_ratio = tp_distance / sl_distance;

        if result.risk_reward_ratio < self.config.min_risk_reward_ratio {
            result.reason = format!(
                "R:R ratio too low: {:.2} (min {:.2})",
                result.risk_reward_ratio, self.config.min_risk_reward_ratio
            );
            return result;
        }

        // Fixed fractional risk is the primary size: risk a fixed slice
        // of bankroll against the stop distance.
        let risk_amount = self.ledger.current_bankroll * self.config.max_risk_per_trade;
        let mut size_usd = risk_amount / sl_pct;

        let (kelly_full, kelly_adjusted) = sizing::kelly_fractions(
            req.win_rate,
            req.avg_win_loss_ratio,
            req.confidence,
            self.config.kelly_fraction,
            self.config.max_kelly_size,
        );
        result.kelly_fraction = kelly_adjusted;

        // Kelly only caps once the sample is meaningful and the edge is
        // positive; below the floor it is recorded but not applied.
        if self.ledger.history().len() >= ruin::MIN_SAMPLE && kelly_full > 0.0 {
            size_usd = size_usd.min(self.ledger.current_bankroll * kelly_adjusted);
        }

        let drawdown_factor = self.ledger.drawdown_factor();
        size_usd *= drawdown_factor;
        size_usd *= sizing::streak_factor(
            self.ledger.consecutive_wins,
            self.ledger.consecutive_losses,
        );
        size_usd *= sizing::spread_penalty(req.spread_pct);
        size_usd *= sizing::volatility_factor(req.vol_regime, req.vol_level, req.vol_expanding);

        size_usd = size_usd.min(self.config.max_position_usd);

        let remaining = self.remaining_capacity_usd();
        size_usd = size_usd.min(remaining);

        if size_usd < 10.0 {
            result.reason = format!(
                "Position size too small: ${size_usd:.2} (kelly_adj={kelly_adjusted:.4}, \
                 sl_pct={sl_pct:.4}, dd_factor={drawdown_factor:.2}, cap={remaining:.2})"
            );
            return result;
        }

        result.size_usd = round2(size_usd);
        result.size_units = round8(size_usd / req.entry_price);
        result.risk_amount = round2(size_usd * sl_pct);
        result.allowed = true;

        info!(
            "sized {}: ${:.2} (risk ${:.2}, kelly_adj {:.4}, dd_factor {:.2})",
            req.pair, result.size_usd, result.risk_amount, kelly_adjusted, drawdown_factor
        );

        result
    }

    /// Ordered pre-trade checks; the first failure wins and its reason
    /// is surfaced on the denial.
    fn pre_trade_checks(&mut self, pair: &str) -> Result<(), String> {
        let now = self.clock.now();

        if now < self.ledger.global_cooldown_until {
            let remaining = self.ledger.global_cooldown_until - now;
            return Err(format!("Global cooldown: {remaining:.0}s remaining"));
        }

        self.ledger.daily_reset_if_needed(&today_utc());

        // Anchored to the initial bankroll: intraday gains must not
        // raise the ceiling, intraday losses must not lower it.
        let daily_floor = -(self.ledger.initial_bankroll * self.config.max_daily_loss);
        if self.ledger.daily_pnl <= daily_floor {
            warn!("daily loss limit reached: {:.2}", self.ledger.daily_pnl);
            return Err(format!(
                "Daily loss limit reached: ${:.2}",
                self.ledger.daily_pnl
            ));
        }

        if let Some(elapsed) = self.book.seconds_since_entry(pair, now) {
            let cooldown = self.config.cooldown_seconds as f64;
            if elapsed < cooldown {
                return Err(format!(
                    "Cooldown active: {:.0}s remaining",
                    cooldown - elapsed
                ));
            }
        }

        if self.book.len() >= self.config.max_concurrent_positions {
            return Err(format!("Max positions reached: {}", self.book.len()));
        }

        if self.config.max_daily_trades > 0
            && self.ledger.daily_trades >= self.config.max_daily_trades
        {
            return Err(format!(
                "Daily trade cap reached: {}",
                self.ledger.daily_trades
            ));
        }

        let ror = self.risk_of_ruin();
        if ror > self.config.risk_of_ruin_threshold {
            warn!("risk of ruin {ror:.4} above threshold");
            return Err(format!("Risk of ruin too high: {:.2}%", ror * 100.0));
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Stop management
    // ------------------------------------------------------------------

    pub fn initialize_stop_loss(
        &mut self,
        trade_id: &str,
        entry_price: f64,
        stop_loss: f64,
        side: Side,
        trailing_high: Option<f64>,
        trailing_low: Option<f64>,
    ) -> StopLossState {
        self.stops.initialize(
            trade_id,
            entry_price,
            stop_loss,
            side,
            trailing_high,
            trailing_low,
        )
    }

    pub fn update_stop_loss(
        &mut self,
        trade_id: &str,
        current_price: f64,
        entry_price: f64,
        side: Side,
    ) -> StopLossState {
        self.stops.update(trade_id, current_price, entry_price, side)
    }

    pub fn should_stop_out(&self, trade_id: &str, current_price: f64, side: Side) -> bool {
        self.stops.should_stop_out(trade_id, current_price, side)
    }

    pub fn stop_state(&self, trade_id: &str) -> Option<&StopLossState> {
        self.stops.get(trade_id)
    }

    // ------------------------------------------------------------------
    // Positions
    // ------------------------------------------------------------------

    /// Track a confirmed fill. Must follow a successful sizing decision
    /// for the same pair within one mutation sequence; callers that
    /// await external work in between re-verify the caps.
    pub fn register_position(
        &mut self,
        trade_id: &str,
        pair: &str,
        side: Side,
        entry_price: f64,
        size_usd: f64,
        strategy: Option<&str>,
    ) {
        let now = self.clock.now();
        self.book.insert(
            trade_id,
            OpenPosition {
                pair: pair.to_string(),
                side,
                entry_price,
                size_usd,
                strategy: strategy.map(String::from),
                opened_at: Utc::now(),
            },
            now,
        );
        self.ledger.daily_trades += 1;
    }

    /// Shrink a tracked position after a partial exit.
    pub fn reduce_position_size(&mut self, trade_id: &str, reduction: SizeReduction) {
        self.book.reduce(trade_id, reduction);
    }

    /// Close a position and account for its realized PnL. Unknown trade
    /// ids still record the PnL so external fills reconcile.
    pub fn close_position(&mut self, trade_id: &str, pnl: f64) -> Option<OpenPosition> {
        let now = self.clock.now();
        let position = self.book.remove(trade_id, now);
        self.stops.remove(trade_id);
        self.ledger
            .record_close(pnl, now, self.config.global_cooldown_seconds_on_loss);
        position
    }

    pub fn position(&self, trade_id: &str) -> Option<&OpenPosition> {
        self.book.get(trade_id)
    }

    pub fn open_position_count(&self) -> usize {
        self.book.len()
    }

    pub fn total_exposure_usd(&self) -> f64 {
        self.book.total_exposure_usd()
    }

    /// Whether this (pair, strategy, side) is still cooling down after
    /// its last close. Strategies without a configured cooldown never
    /// block.
    pub fn is_strategy_on_cooldown(
        &self,
        pair: &str,
        strategy: Option<&str>,
        side: Option<Side>,
    ) -> bool {
        let (Some(strategy), Some(side)) = (strategy, side) else {
            return false;
        };
        let cooldown = self
            .config
            .strategy_cooldowns
            .get(strategy)
            .copied()
            .unwrap_or(0);
        if cooldown == 0 {
            return false;
        }
        match self
            .book
            .seconds_since_strategy_close(pair, strategy, side, self.clock.now())
        {
            Some(elapsed) => elapsed < cooldown as f64,
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Recovery & reset
    // ------------------------------------------------------------------

    /// Rebuild positions and stop state from persisted trade records
    /// after a restart. Malformed metadata falls back to computed
    /// values; a bad record never fails the batch.
    pub fn reinitialize_from_records(&mut self, records: &[TradeRecord]) {
        for rec in records {
            let meta = rec.parsed_metadata();
            if rec.metadata.is_some() && meta.is_none() {
                warn!(
                    "unparseable metadata on trade {}, using computed size",
                    rec.trade_id
                );
            }
            let size_usd = meta
                .as_ref()
                .and_then(|m| m.size_usd)
                .unwrap_or(rec.entry_price * rec.quantity);

            self.register_position(
                &rec.trade_id,
                &rec.pair,
                rec.side,
                rec.entry_price,
                size_usd,
                rec.strategy.as_deref(),
            );

            if rec.stop_loss > 0.0 {
                let seed = meta.as_ref().and_then(|m| m.stop_loss_state.as_ref());
                self.initialize_stop_loss(
                    &rec.trade_id,
                    rec.entry_price,
                    rec.stop_loss,
                    rec.side,
                    seed.map(|s| s.trailing_high),
                    seed.map(|s| s.trailing_low),
                );
            }
        }
        info!("restored {} open positions from records", records.len());
    }

    /// Wipe runtime state for a fresh simulation cycle, optionally with
    /// a new bankroll.
    pub fn reset_runtime(&mut self, initial_bankroll: Option<f64>) {
        let initial = initial_bankroll.unwrap_or(self.ledger.initial_bankroll);
        self.ledger.reset(initial, &today_utc());
        self.book.clear();
        self.stops.clear();
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    pub fn risk_of_ruin(&self) -> f64 {
        ruin::risk_of_ruin(self.ledger.history(), self.ledger.current_bankroll)
    }

    /// Quote-currency capacity left under the total-exposure cap.
    pub fn remaining_capacity_usd(&self) -> f64 {
        let max_total = self.ledger.current_bankroll * self.config.max_total_exposure_pct;
        (max_total - self.book.total_exposure_usd()).max(0.0)
    }

    pub fn bankroll(&self) -> f64 {
        self.ledger.current_bankroll
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read-only metric snapshot. Deliberately does not run the daily
    /// reset, so daily fields can read stale across midnight.
    pub fn get_risk_report(&self) -> RiskReport {
        RiskReport {
            bankroll: round2(self.ledger.current_bankroll),
            initial_bankroll: self.ledger.initial_bankroll,
            total_return_pct: round2(self.ledger.total_return_pct()),
            peak_bankroll: round2(self.ledger.peak_bankroll),
            current_drawdown_pct: round2(self.ledger.drawdown() * 100.0),
            max_drawdown_pct: round2(self.ledger.max_drawdown * 100.0),
            daily_pnl: round2(self.ledger.daily_pnl),
            daily_trades: self.ledger.daily_trades,
            open_positions: self.book.len(),
            total_exposure_usd: round2(self.book.total_exposure_usd()),
            risk_of_ruin: round4(self.risk_of_ruin()),
            drawdown_factor: round2(self.ledger.drawdown_factor()),
            remaining_capacity_usd: round2(self.remaining_capacity_usd()),
            max_daily_trades: self.config.max_daily_trades,
            max_total_exposure_pct: round4(self.config.max_total_exposure_pct),
            trade_count: self.ledger.history().len(),
            consecutive_wins: self.ledger.consecutive_wins,
            consecutive_losses: self.ledger.consecutive_losses,
        }
    }
}

fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn round8(v: f64) -> f64 {
    (v * 100_000_000.0).round() / 100_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trade::{TradeStatus, VolRegime};

    fn quiet_config() -> EngineConfig {
        EngineConfig {
            cooldown_seconds: 0,
            global_cooldown_seconds_on_loss: 0,
            ..EngineConfig::default()
        }
    }

    fn request() -> SizeRequest {
        SizeRequest {
            pair: "BTC/USD".into(),
            entry_price: 100.0,
            stop_loss: 98.5,
            take_profit: 103.0,
            win_rate: 0.6,
            avg_win_loss_ratio: 1.5,
            confidence: 0.8,
            spread_pct: 0.0,
            vol_regime: VolRegime::Normal,
            vol_level: 0.5,
            vol_expanding: false,
        }
    }

    fn record(trade_id: &str, metadata: Option<&str>) -> TradeRecord {
        TradeRecord {
            trade_id: trade_id.into(),
            pair: "BTC/USD".into(),
            side: Side::Buy,
            entry_price: 50_000.0,
            quantity: 0.1,
            stop_loss: 48_000.0,
            take_profit: 54_000.0,
            strategy: Some("trend".into()),
            status: TradeStatus::Open,
            opened_at: Utc::now(),
            metadata: metadata.map(String::from),
        }
    }

    // ------------------------------------------------------------------
    // Sizing pipeline
    // ------------------------------------------------------------------

    #[test]
    fn fixed_fractional_primary_capped_by_max_position() {
        let mut rm = RiskManager::new(quiet_config());
        let result = rm.calculate_position_size(&request());

        // Base 10000*0.02/0.015 ~= 13333 is capped to the $500 hard cap
        assert!(result.allowed, "reason: {}", result.reason);
        assert_eq!(result.size_usd, 500.0);
        assert!((result.risk_amount - 7.5).abs() < 0.01);
        assert!((result.stop_distance_pct - 0.015).abs() < 1e-12);
        // Kelly is recorded even though it did not bind
        assert!(result.kelly_fraction > 0.0);
    }

    #[test]
    fn kelly_caps_only_with_history() {
        let mut rm = RiskManager::new(quiet_config());

        // 60 closes: repeat (L W W) so the run ends on a 2-win streak
        // (neutral streak factor) and drawdown stays negligible
        for _ in 0..20 {
            rm.close_position("seed-l", -1.0);
            rm.close_position("seed-w1", 1.0);
            rm.close_position("seed-w2", 1.0);
        }

        let mut req = request();
        req.win_rate = 2.0 / 3.0;
        req.avg_win_loss_ratio = 1.0;

        let result = rm.calculate_position_size(&req);
        assert!(result.allowed, "reason: {}", result.reason);
        // kelly_full = (0.667 - 0.333) = 1/3; adjusted = 1/3 * 0.25 * 0.8
        assert!((result.kelly_fraction - (1.0 / 3.0) * 0.25 * 0.8).abs() < 1e-9);
        // Kelly cap ~= 10020 * 0.0667 ~= 668, still above the $500 cap
        assert_eq!(result.size_usd, 500.0);
    }

    #[test]
    fn drawdown_derating_composes() {
        let mut rm = RiskManager::new(quiet_config());
        rm.close_position("seed", -1_000.0); // 10% drawdown -> factor 0.60
        rm.ledger.daily_reset_date = "2000-01-01".into(); // clear the daily loss for the gate

        let result = rm.calculate_position_size(&request());
        assert!(result.allowed, "reason: {}", result.reason);
        // Base 9000*0.02/0.015 = 12000, *0.60 = 7200, capped to 500
        assert_eq!(result.size_usd, 500.0);
        assert_eq!(rm.ledger.drawdown_factor(), 0.60);
    }

    #[test]
    fn invalid_prices_and_stop_distance_reject() {
        let mut rm = RiskManager::new(quiet_config());

        let mut req = request();
        req.entry_price = 0.0;
        assert_eq!(rm.calculate_position_size(&req).reason, "Invalid prices");

        let mut req = request();
        req.stop_loss = 85.0; // 15% stop
        let result = rm.calculate_position_size(&req);
        assert!(!result.allowed);
        assert!(result.reason.contains("Invalid stop distance"));

        let mut req = request();
        req.stop_loss = 100.0; // zero distance
        let result = rm.calculate_position_size(&req);
        assert!(result.reason.contains("Invalid stop distance"));
    }

    #[test]
    fn poor_risk_reward_rejects() {
        let mut rm = RiskManager::new(quiet_config());
        let mut req = request();
        req.take_profit = 101.0; // rr = 1.0/1.5 < 1.2
        let result = rm.calculate_position_size(&req);
        assert!(!result.allowed);
        assert!(result.reason.contains("R:R ratio too low"));
    }

    #[test]
    fn exposure_clamp_and_minimum_size() {
        let mut rm = RiskManager::new(EngineConfig {
            max_concurrent_positions: 10,
            ..quiet_config()
        });

        // Fill capacity to $4995 of the $5000 (50% of bankroll) budget
        for i in 0..5 {
            rm.register_position(&format!("t{i}"), &format!("P{i}/USD"), Side::Buy, 100.0, 999.0, None);
        }
        let result = rm.calculate_position_size(&request());
        assert!(!result.allowed);
        assert!(result.reason.contains("Position size too small"));
        assert!(result.reason.contains("cap="));
    }

    #[test]
    fn bankroll_depletion_guard() {
        let mut rm = RiskManager::new(quiet_config());
        rm.close_position("blowup", -10_000.0);
        rm.ledger.daily_reset_date = "2000-01-01".into();
        let result = rm.calculate_position_size(&request());
        assert_eq!(result.reason, "Bankroll depleted");
    }

    // ------------------------------------------------------------------
    // Entry gate
    // ------------------------------------------------------------------

    #[test]
    fn daily_loss_lockout_until_midnight() {
        let mut rm = RiskManager::new(quiet_config());
        rm.close_position("loser", -500.01);

        let result = rm.calculate_position_size(&request());
        assert!(!result.allowed);
        assert!(result.reason.contains("Daily loss limit reached"));

        // Midnight rollover clears the lockout
        rm.ledger.daily_reset_date = "2000-01-01".into();
        let result = rm.calculate_position_size(&request());
        assert!(result.allowed, "reason: {}", result.reason);
    }

    #[test]
    fn intraday_gains_do_not_raise_the_ceiling() {
        let mut rm = RiskManager::new(quiet_config());
        rm.close_position("winner", 1_000.0);
        rm.close_position("loser", -1_400.0); // net daily -400, above the -500 floor
        assert!(rm.calculate_position_size(&request()).allowed);

        rm.close_position("loser2", -150.0); // net daily -550
        let result = rm.calculate_position_size(&request());
        assert!(result.reason.contains("Daily loss limit reached"));
    }

    #[test]
    fn global_cooldown_blocks_after_loss() {
        let mut rm = RiskManager::new(EngineConfig {
            cooldown_seconds: 0,
            global_cooldown_seconds_on_loss: 1800,
            ..EngineConfig::default()
        });
        rm.close_position("loser", -10.0);

        let result = rm.calculate_position_size(&request());
        assert!(!result.allowed);
        assert!(result.reason.contains("Global cooldown"));

        rm.clock.advance(1801.0);
        let result = rm.calculate_position_size(&request());
        assert!(result.allowed, "reason: {}", result.reason);
    }

    #[test]
    fn per_pair_cooldown_blocks_reentry() {
        let mut rm = RiskManager::new(EngineConfig {
            cooldown_seconds: 300,
            global_cooldown_seconds_on_loss: 0,
            ..EngineConfig::default()
        });
        rm.register_position("t1", "BTC/USD", Side::Buy, 100.0, 100.0, None);

        let result = rm.calculate_position_size(&request());
        assert!(result.reason.contains("Cooldown active"));

        // A different pair is unaffected
        let mut req = request();
        req.pair = "ETH/USD".into();
        assert!(rm.calculate_position_size(&req).allowed);

        rm.clock.advance(301.0);
        assert!(rm.calculate_position_size(&request()).allowed);
    }

    #[test]
    fn max_concurrent_positions_blocks() {
        let mut rm = RiskManager::new(quiet_config());
        for i in 0..5 {
            rm.register_position(&format!("t{i}"), &format!("P{i}/USD"), Side::Buy, 100.0, 10.0, None);
        }
        let result = rm.calculate_position_size(&request());
        assert!(result.reason.contains("Max positions reached"));
    }

    #[test]
    fn daily_trade_cap_blocks_when_configured() {
        let mut rm = RiskManager::new(EngineConfig {
            max_daily_trades: 2,
            ..quiet_config()
        });
        rm.register_position("t1", "ETH/USD", Side::Buy, 100.0, 10.0, None);
        rm.register_position("t2", "SOL/USD", Side::Buy, 100.0, 10.0, None);

        let result = rm.calculate_position_size(&request());
        assert!(result.reason.contains("Daily trade cap reached"));
    }

    #[test]
    fn ruin_gate_blocks_negative_edge_history() {
        let mut rm = RiskManager::new(quiet_config());
        // 60 trades, decisively negative edge, small enough to stay
        // above the daily loss floor
        for i in 0..60 {
            rm.close_position("seed", if i % 6 == 0 { 1.0 } else { -2.0 });
        }
        let result = rm.calculate_position_size(&request());
        assert!(!result.allowed);
        assert!(result.reason.contains("Risk of ruin too high"));
    }

    // ------------------------------------------------------------------
    // Strategy cooldowns
    // ------------------------------------------------------------------

    #[test]
    fn strategy_cooldown_applies_after_close() {
        let mut cooldowns = std::collections::HashMap::new();
        cooldowns.insert("keltner".to_string(), 600_u64);
        let mut rm = RiskManager::new(EngineConfig {
            strategy_cooldowns: cooldowns,
            ..quiet_config()
        });

        rm.register_position("t1", "BTC/USD", Side::Buy, 100.0, 50.0, Some("keltner"));
        assert!(!rm.is_strategy_on_cooldown("BTC/USD", Some("keltner"), Some(Side::Buy)));

        rm.close_position("t1", 5.0);
        assert!(rm.is_strategy_on_cooldown("BTC/USD", Some("keltner"), Some(Side::Buy)));
        // Other direction and unconfigured strategies pass
        assert!(!rm.is_strategy_on_cooldown("BTC/USD", Some("keltner"), Some(Side::Sell)));
        assert!(!rm.is_strategy_on_cooldown("BTC/USD", Some("trend"), Some(Side::Buy)));
        assert!(!rm.is_strategy_on_cooldown("BTC/USD", None, Some(Side::Buy)));

        rm.clock.advance(601.0);
        assert!(!rm.is_strategy_on_cooldown("BTC/USD", Some("keltner"), Some(Side::Buy)));
    }

    // ------------------------------------------------------------------
    // Recovery
    // ------------------------------------------------------------------

    #[test]
    fn recovery_registers_positions_and_stops() {
        let mut rm = RiskManager::new(quiet_config());
        let records = vec![record("t-1", None), record("t-2", None)];
        rm.reinitialize_from_records(&records);

        assert_eq!(rm.open_position_count(), 2);
        assert_eq!(rm.position("t-1").unwrap().pair, "BTC/USD");
        let state = rm.stop_state("t-1").unwrap();
        assert_eq!(state.initial_sl, 48_000.0);
        assert_eq!(state.current_sl, 48_000.0);
    }

    #[test]
    fn recovery_skips_stop_state_without_stop() {
        let mut rm = RiskManager::new(quiet_config());
        let mut rec = record("t-1", None);
        rec.stop_loss = 0.0;
        rm.reinitialize_from_records(&[rec]);

        assert!(rm.position("t-1").is_some());
        assert!(rm.stop_state("t-1").is_none());
    }

    #[test]
    fn recovery_prefers_metadata_size() {
        let mut rm = RiskManager::new(quiet_config());
        rm.reinitialize_from_records(&[record("t-1", Some(r#"{"size_usd": 7777.0}"#))]);
        assert_eq!(rm.position("t-1").unwrap().size_usd, 7777.0);
    }

    #[test]
    fn recovery_falls_back_to_computed_size() {
        let mut rm = RiskManager::new(quiet_config());
        rm.reinitialize_from_records(&[record("t-1", None)]);
        assert_eq!(rm.position("t-1").unwrap().size_usd, 5_000.0);
    }

    #[test]
    fn recovery_restores_trailing_seeds() {
        let mut rm = RiskManager::new(quiet_config());
        let meta = r#"{"size_usd": 5000.0, "stop_loss_state": {"trailing_high": 52000.0, "trailing_low": 48000.0}}"#;
        rm.reinitialize_from_records(&[record("t-1", Some(meta))]);

        let state = rm.stop_state("t-1").unwrap();
        assert_eq!(state.trailing_high, 52_000.0);
        assert_eq!(state.trailing_low, 48_000.0);
    }

    #[test]
    fn recovery_tolerates_corrupted_metadata() {
        let mut rm = RiskManager::new(quiet_config());
        rm.reinitialize_from_records(&[record("t-1", Some("not-json"))]);

        let pos = rm.position("t-1").unwrap();
        assert_eq!(pos.size_usd, 5_000.0);
        // Stop state still initialised with direction defaults
        let state = rm.stop_state("t-1").unwrap();
        assert_eq!(state.trailing_high, 50_000.0);
        assert_eq!(state.trailing_low, f64::INFINITY);
    }

    #[test]
    fn recovery_of_empty_batch_is_noop() {
        let mut rm = RiskManager::new(quiet_config());
        rm.reinitialize_from_records(&[]);
        assert_eq!(rm.open_position_count(), 0);
    }

    // ------------------------------------------------------------------
    // Report & reset
    // ------------------------------------------------------------------

    #[test]
    fn report_reflects_state_without_mutating_it() {
        let mut rm = RiskManager::new(quiet_config());
        rm.register_position("t1", "BTC/USD", Side::Buy, 100.0, 400.0, None);
        rm.close_position("t2", -250.0);

        // Make the daily fields stale; the report must not reset them
        rm.ledger.daily_reset_date = "2000-01-01".into();

        let report = rm.get_risk_report();
        assert_eq!(report.bankroll, 9_750.0);
        assert_eq!(report.daily_pnl, -250.0);
        assert_eq!(report.daily_trades, 1);
        assert_eq!(report.open_positions, 1);
        assert_eq!(report.total_exposure_usd, 400.0);
        assert_eq!(report.trade_count, 1);
        assert_eq!(report.consecutive_losses, 1);
        assert!((report.current_drawdown_pct - 2.5).abs() < 1e-9);
        assert_eq!(report.remaining_capacity_usd, 9_750.0 * 0.5 - 400.0);

        // Still stale afterwards: reporting is read-only
        assert_eq!(rm.ledger.daily_reset_date, "2000-01-01");
        assert_eq!(rm.ledger.daily_pnl, -250.0);
    }

    #[test]
    fn reset_runtime_wipes_everything() {
        let mut rm = RiskManager::new(quiet_config());
        rm.register_position("t1", "BTC/USD", Side::Buy, 100.0, 400.0, None);
        rm.initialize_stop_loss("t1", 100.0, 98.0, Side::Buy, None, None);
        rm.close_position("t2", -250.0);

        rm.reset_runtime(Some(20_000.0));
        assert_eq!(rm.bankroll(), 20_000.0);
        assert_eq!(rm.open_position_count(), 0);
        assert!(rm.stop_state("t1").is_none());
        let report = rm.get_risk_report();
        assert_eq!(report.trade_count, 0);
        assert_eq!(report.max_drawdown_pct, 0.0);
        assert_eq!(report.daily_trades, 0);
    }
}

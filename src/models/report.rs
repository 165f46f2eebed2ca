use serde::{Deserialize, Serialize};

/// Flat snapshot of every scalar risk metric, for dashboards and logs.
/// Values are rounded; the report is advisory and read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    pub bankroll: f64,
    pub initial_bankroll: f64,
    pub total_return_pct: f64,
    pub peak_bankroll: f64,
    pub current_drawdown_pct: f64,
    pub max_drawdown_pct: f64,
    pub daily_pnl: f64,
    pub daily_trades: u32,
    pub open_positions: usize,
    pub total_exposure_usd: f64,
    pub risk_of_ruin: f64,
    pub drawdown_factor: f64,
    pub remaining_capacity_usd: f64,
    pub max_daily_trades: u32,
    pub max_total_exposure_pct: f64,
    pub trade_count: usize,
    pub consecutive_wins: u32,
    pub consecutive_losses: u32,
}

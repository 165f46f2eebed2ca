use std::collections::VecDeque;

use statrs::statistics::Statistics;

use super::ledger::TradeOutcome;

/// Closed trades required before the estimate is trusted. Below this the
/// variance is high enough that a few bad trades would falsely read as
/// certain ruin.
pub const MIN_SAMPLE: usize = 50;

/// Probability of losing the entire bankroll given the observed edge
/// distribution, via the classic gambler's-ruin formula
///
///   RoR = ((1 - edge_ratio) / (1 + edge_ratio)) ^ units
///
/// where edge = win_rate * avg_win - (1 - win_rate) * avg_loss and
/// units = bankroll / avg_bet. Degenerate inputs resolve conservatively:
/// a non-positive edge is certain ruin, numeric failure is 0 so the
/// estimator never blocks on its own breakage.
pub fn risk_of_ruin(history: &VecDeque<TradeOutcome>, bankroll: f64) -> f64 {
    if history.len() < MIN_SAMPLE {
        return 0.0;
    }

    let wins: Vec<f64> = history.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).collect();
    let losses: Vec<f64> = history
        .iter()
        .filter(|t| t.pnl <= 0.0)
        .map(|t| t.pnl.abs())
        .collect();

    if wins.is_empty() || losses.is_empty() {
        return 0.0;
    }

    let win_rate = wins.len() as f64 / history.len() as f64;
    let avg_win = (&wins).mean();
    let avg_loss = (&losses).mean();

    if avg_loss == 0.0 {
        return 0.0;
    }

    let edge = win_rate * avg_win - (1.0 - win_rate) * avg_loss;
    if edge <= 0.0 {
        return 1.0;
    }

    let avg_bet = history.iter().map(|t| t.pnl.abs()).mean();
    if avg_bet == 0.0 {
        return 0.0;
    }

    let units = bankroll / avg_bet;
    if units <= 0.0 {
        return 1.0;
    }

    let edge_ratio = edge / avg_bet;
    if edge_ratio >= 1.0 {
        return 0.0;
    }

    let ror = ((1.0 - edge_ratio) / (1.0 + edge_ratio)).powf(units);
    if !ror.is_finite() {
        return 0.0;
    }
    ror.clamp(0.0, 1.0)
}

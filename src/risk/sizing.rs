use serde::{Deserialize, Serialize};

use crate::models::trade::{TradeProposal, VolRegime};

/// Inputs to the sizing pipeline for one proposed entry.
#[derive(Debug, Clone)]
pub struct SizeRequest {
    pub pair: String,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub win_rate: f64,
    pub avg_win_loss_ratio: f64,
    pub confidence: f64,
    pub spread_pct: f64,
    pub vol_regime: VolRegime,
    pub vol_level: f64,
    pub vol_expanding: bool,
}

impl SizeRequest {
    pub fn from_proposal(proposal: &TradeProposal, spread_pct: f64) -> Self {
        Self {
            pair: proposal.pair.clone(),
            entry_price: proposal.entry_price,
            stop_loss: proposal.stop_loss,
            take_profit: proposal.take_profit,
            win_rate: proposal.win_rate,
            avg_win_loss_ratio: proposal.avg_win_loss_ratio,
            confidence: proposal.confidence,
            spread_pct,
            vol_regime: proposal.vol_regime,
            vol_level: proposal.vol_level,
            vol_expanding: proposal.vol_expanding,
        }
    }
}

/// Outcome of the sizing pipeline. A denial is not an error: it carries
/// `allowed = false` and a human-readable reason.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionSizeResult {
    pub size_usd: f64,
    pub size_units: f64,
    pub risk_amount: f64,
    pub kelly_fraction: f64,
    pub stop_distance_pct: f64,
    pub risk_reward_ratio: f64,
    pub allowed: bool,
    pub reason: String,
}

impl PositionSizeResult {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Self::default()
        }
    }
}

/// Full and adjusted Kelly fractions for the proposed edge.
///
/// f* = (p*b - q) / b with the win/loss ratio as odds; the adjusted
/// value applies the safety fraction and AI confidence and is capped.
/// A non-positive ratio substitutes even odds rather than aborting.
pub fn kelly_fractions(
    win_rate: f64,
    avg_win_loss_ratio: f64,
    confidence: f64,
    safety_fraction: f64,
    max_kelly_size: f64,
) -> (f64, f64) {
    let p = win_rate;
    let q = 1.0 - p;
    let b = if avg_win_loss_ratio > 0.0 {
        avg_win_loss_ratio
    } else {
        1.0
    };

    let kelly_full = ((p * b - q) / b).max(0.0);
    let kelly_adjusted = (kelly_full * safety_fraction * confidence).min(max_kelly_size);
    (kelly_full, kelly_adjusted)
}

/// Streak-based scaling: harder cuts on loss streaks, a small bonus on
/// win streaks. Neutral inside +/-2.
pub fn streak_factor(consecutive_wins: u32, consecutive_losses: u32) -> f64 {
    if consecutive_losses >= 3 {
        (1.0 - (consecutive_losses - 2) as f64 * 0.15).max(0.4)
    } else if consecutive_wins >= 3 {
        (1.0 + (consecutive_wins - 2) as f64 * 0.05).min(1.2)
    } else {
        1.0
    }
}

/// Wide spreads eat the edge; shave size once the spread passes 10 bps,
/// to at worst half size.
pub fn spread_penalty(spread_pct: f64) -> f64 {
    if spread_pct > 0.001 {
        (1.0 - (spread_pct - 0.001) * 50.0).max(0.5)
    } else {
        1.0
    }
}

/// Volatility-regime scaling.
///
/// Calm regimes earn slightly larger positions, high-vol regimes shrink
/// with the vol level, and an expanding transition cuts hard regardless
/// of regime. Floored at 0.30.
pub fn volatility_factor(regime: VolRegime, vol_level: f64, vol_expanding: bool) -> f64 {
    let mut factor: f64 = match regime {
        VolRegime::Low if vol_level < 0.3 => 1.15,
        VolRegime::High => {
            if vol_level > 0.8 {
                0.60
            } else if vol_level > 0.7 {
                0.70
            } else {
                0.80
            }
        }
        _ => 1.0,
    };

    if vol_expanding {
        factor *= 0.60;
    }

    factor.max(0.30)
}

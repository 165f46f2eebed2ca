use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::trade::Side;

/// An open position as tracked by the registry, one per trade id.
/// `size_usd` is the only mutable field; partial exits shrink it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    pub pair: String,
    pub side: Side,
    pub entry_price: f64,
    pub size_usd: f64,
    pub strategy: Option<String>,
    pub opened_at: DateTime<Utc>,
}

/// How to shrink a position on a partial exit. Fractions keep realized
/// PnL at the exit price from distorting remaining exposure, so callers
/// should prefer them over absolute amounts.
#[derive(Debug, Clone, Copy)]
pub enum SizeReduction {
    /// Fraction of the current size to remove, clamped to [0, 1].
    Fraction(f64),
    /// Absolute quote-currency amount to remove.
    Usd(f64),
}

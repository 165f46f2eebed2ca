use std::collections::HashMap;

use crate::models::position::{OpenPosition, SizeReduction};
use crate::models::trade::Side;

/// Open positions keyed by trade id, plus the per-pair and per-strategy
/// timestamps the entry gates read. Timestamps are monotonic engine
/// seconds supplied by the caller.
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: HashMap<String, OpenPosition>,
    last_trade_time: HashMap<String, f64>,
    strategy_last_close: HashMap<(String, String, Side), f64>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a confirmed fill and stamp the pair's entry time.
    pub fn insert(&mut self, trade_id: &str, position: OpenPosition, now: f64) {
        self.last_trade_time.insert(position.pair.clone(), now);
        self.positions.insert(trade_id.to_string(), position);
    }

    /// Remove and return a position. A known strategy stamps the
    /// (pair, strategy, side) cooldown key with the close time.
    pub fn remove(&mut self, trade_id: &str, now: f64) -> Option<OpenPosition> {
        let position = self.positions.remove(trade_id)?;
        if let Some(strategy) = &position.strategy {
            self.strategy_last_close.insert(
                (position.pair.clone(), strategy.clone(), position.side),
                now,
            );
        }
        Some(position)
    }

    /// Shrink a tracked position after a partial exit; size never goes
    /// negative. Unknown ids are ignored.
    pub fn reduce(&mut self, trade_id: &str, reduction: SizeReduction) {
        let Some(position) = self.positions.get_mut(trade_id) else {
            return;
        };
        position.size_usd = match reduction {
            SizeReduction::Fraction(f) => {
                let f = f.clamp(0.0, 1.0);
                position.size_usd * (1.0 - f)
            }
            SizeReduction::Usd(amount) => position.size_usd - amount,
        }
        .max(0.0);
    }

    pub fn get(&self, trade_id: &str) -> Option<&OpenPosition> {
        self.positions.get(trade_id)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Sum of open sizes in quote currency.
    pub fn total_exposure_usd(&self) -> f64 {
        self.positions.values().map(|p| p.size_usd).sum()
    }

    /// Seconds since the last registered entry on the pair, if any.
    pub fn seconds_since_entry(&self, pair: &str, now: f64) -> Option<f64> {
        self.last_trade_time.get(pair).map(|t| now - t)
    }

    /// Seconds since the last close for this (pair, strategy, side), if any.
    pub fn seconds_since_strategy_close(
        &self,
        pair: &str,
        strategy: &str,
        side: Side,
        now: f64,
    ) -> Option<f64> {
        self.strategy_last_close
            .get(&(pair.to_string(), strategy.to_string(), side))
            .map(|t| now - t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OpenPosition)> {
        self.positions.iter()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
        self.last_trade_time.clear();
        self.strategy_last_close.clear();
    }
}

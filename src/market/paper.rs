use dashmap::DashMap;
use rand::Rng;

use super::MarketData;

/// Synthetic random-walk feed for paper simulation. Prices drift a few
/// basis points per step; the feed is never stale.
pub struct RandomWalkFeed {
    prices: DashMap<String, f64>,
    spread_pct: f64,
    step_pct: f64,
}

impl RandomWalkFeed {
    pub fn new(seeds: &[(&str, f64)]) -> Self {
        let prices = DashMap::new();
        for (pair, price) in seeds {
            prices.insert(pair.to_string(), *price);
        }
        Self {
            prices,
            spread_pct: 0.0005,
            step_pct: 0.002,
        }
    }

    /// Advance every pair by one random step.
    pub fn step(&self) {
        let mut rng = rand::thread_rng();
        for mut entry in self.prices.iter_mut() {
            let drift = rng.gen_range(-self.step_pct..self.step_pct);
            *entry.value_mut() *= 1.0 + drift;
        }
    }

    pub fn pairs(&self) -> Vec<String> {
        self.prices.iter().map(|e| e.key().clone()).collect()
    }
}

impl MarketData for RandomWalkFeed {
    fn latest_price(&self, pair: &str) -> Option<f64> {
        self.prices.get(pair).map(|p| *p)
    }

    fn spread_pct(&self, _pair: &str) -> f64 {
        self.spread_pct
    }

    fn is_stale(&self, _pair: &str, _max_age_secs: u64) -> bool {
        false
    }
}

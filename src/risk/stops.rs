use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, warn};

use crate::models::trade::Side;

/// Per-trade stop management state.
///
/// `current_sl` only ever tightens: up for longs, down for shorts.
/// `trailing_low` uses +inf as the "no low seen yet" sentinel so shorts
/// trail correctly from their first tick; the sentinel round-trips
/// through serialization as null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLossState {
    #[serde(default)]
    pub initial_sl: f64,
    #[serde(default)]
    pub current_sl: f64,
    #[serde(default)]
    pub breakeven_activated: bool,
    #[serde(default)]
    pub trailing_activated: bool,
    #[serde(
        default,
        serialize_with = "ser_finite_or_null",
        deserialize_with = "de_null_as_zero"
    )]
    pub trailing_high: f64,
    #[serde(
        default = "infinity",
        serialize_with = "ser_finite_or_null",
        deserialize_with = "de_null_as_inf"
    )]
    pub trailing_low: f64,
}

impl Default for StopLossState {
    fn default() -> Self {
        Self {
            initial_sl: 0.0,
            current_sl: 0.0,
            breakeven_activated: false,
            trailing_activated: false,
            trailing_high: 0.0,
            trailing_low: f64::INFINITY,
        }
    }
}

fn infinity() -> f64 {
    f64::INFINITY
}

fn ser_finite_or_null<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    if v.is_finite() {
        s.serialize_f64(*v)
    } else {
        s.serialize_none()
    }
}

fn de_null_as_inf<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::INFINITY))
}

fn de_null_as_zero<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(d)?.unwrap_or(0.0))
}

/// Breakeven + trailing stop machine, one state per open trade id.
///
/// Updates are idempotent in the tightening direction: replaying a tick
/// at the same price leaves the state unchanged, and two ticks at
/// different prices land on the stop of the more favorable one.
#[derive(Debug)]
pub struct StopTracker {
    states: HashMap<String, StopLossState>,
    breakeven_activation_pct: f64,
    trailing_activation_pct: f64,
    trailing_step_pct: f64,
}

impl StopTracker {
    pub fn new(
        breakeven_activation_pct: f64,
        trailing_activation_pct: f64,
        trailing_step_pct: f64,
    ) -> Self {
        Self {
            states: HashMap::new(),
            breakeven_activation_pct,
            trailing_activation_pct,
            trailing_step_pct,
        }
    }

    /// Start tracking a new position's stop.
    ///
    /// Trailing seeds restore persisted extremes across restarts: a
    /// positive `trailing_high` or a finite `trailing_low` is taken as
    /// is, anything else falls back to the entry-price seed for the
    /// trade's direction.
    pub fn initialize(
        &mut self,
        trade_id: &str,
        entry_price: f64,
        stop_loss: f64,
        side: Side,
        trailing_high: Option<f64>,
        trailing_low: Option<f64>,
    ) -> StopLossState {
        let trailing_high = match trailing_high {
            Some(v) if v > 0.0 => v,
            _ => {
                if side.is_buy() {
                    entry_price
                } else {
                    0.0
                }
            }
        };
        let trailing_low = match trailing_low {
            Some(v) if v.is_finite() => v,
            _ => {
                if side.is_buy() {
                    f64::INFINITY
                } else {
                    entry_price
                }
            }
        };
        let state = StopLossState {
            initial_sl: stop_loss,
            current_sl: stop_loss,
            breakeven_activated: false,
            trailing_activated: false,
            trailing_high,
            trailing_low,
        };
        self.states.insert(trade_id.to_string(), state.clone());
        state
    }

    /// Apply one price tick: advance the favorable extreme, latch
    /// breakeven, then trail. Returns the refreshed state; an unknown
    /// trade id returns an untracked default.
    pub fn update(
        &mut self,
        trade_id: &str,
        current_price: f64,
        entry_price: f64,
        side: Side,
    ) -> StopLossState {
        let Some(state) = self.states.get_mut(trade_id) else {
            warn!("stop update for unknown trade {trade_id}");
            return StopLossState::default();
        };

        if entry_price <= 0.0 {
            warn!("stop update with entry_price<=0 for trade {trade_id}");
            return state.clone();
        }

        match side {
            Side::Buy => {
                let pnl_pct = (current_price - entry_price) / entry_price;

                if current_price > state.trailing_high {
                    state.trailing_high = current_price;
                }

                if !state.breakeven_activated && pnl_pct >= self.breakeven_activation_pct {
                    state.breakeven_activated = true;
                    state.current_sl = state.current_sl.max(entry_price);
                    debug!("breakeven armed for {trade_id} sl={}", state.current_sl);
                }

                if pnl_pct >= self.trailing_activation_pct {
                    state.trailing_activated = true;
                    let candidate =
                        state.trailing_high * (1.0 - self.trailing_step_pct * step_scale(pnl_pct));
                    // Only move the stop up, never down
                    if candidate > state.current_sl {
                        state.current_sl = candidate;
                    }
                }
            }
            Side::Sell => {
                let pnl_pct = (entry_price - current_price) / entry_price;

                if current_price < state.trailing_low {
                    state.trailing_low = current_price;
                }

                if !state.breakeven_activated && pnl_pct >= self.breakeven_activation_pct {
                    state.breakeven_activated = true;
                    state.current_sl = state.current_sl.min(entry_price);
                }

                if pnl_pct >= self.trailing_activation_pct {
                    state.trailing_activated = true;
                    let candidate =
                        state.trailing_low * (1.0 + self.trailing_step_pct * step_scale(pnl_pct));
                    if candidate < state.current_sl {
                        state.current_sl = candidate;
                    }
                }
            }
        }

        state.clone()
    }

    /// Whether the current price has crossed the stop.
    pub fn should_stop_out(&self, trade_id: &str, current_price: f64, side: Side) -> bool {
        let Some(state) = self.states.get(trade_id) else {
            return false;
        };
        match side {
            Side::Buy => current_price <= state.current_sl,
            Side::Sell => current_price >= state.current_sl,
        }
    }

    pub fn get(&self, trade_id: &str) -> Option<&StopLossState> {
        self.states.get(trade_id)
    }

    pub fn remove(&mut self, trade_id: &str) -> Option<StopLossState> {
        self.states.remove(trade_id)
    }

    pub fn contains(&self, trade_id: &str) -> bool {
        self.states.contains_key(trade_id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

/// Trail tighter as profits grow: full step up to 3%, half step to 5%,
/// then a 0.3x step. The stop never widens, so acceleration only locks
/// in more.
fn step_scale(pnl_pct: f64) -> f64 {
    if pnl_pct > 0.05 {
        0.3
    } else if pnl_pct > 0.03 {
        0.5
    } else {
        1.0
    }
}

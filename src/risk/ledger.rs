use std::collections::VecDeque;

use tracing::warn;

/// Bounded history keeps the ruin estimator over recent behavior rather
/// than the whole account lifetime.
pub const TRADE_HISTORY_CAP: usize = 5000;

/// One realized trade outcome. `time` is monotonic engine seconds.
#[derive(Debug, Clone, Copy)]
pub struct TradeOutcome {
    pub pnl: f64,
    pub time: f64,
}

/// Running account state: bankroll, peak, drawdown, daily counters,
/// streaks, and the realized-trade ring.
///
/// Mutated only through `record_close` and the daily reset, by the
/// single engine owner.
#[derive(Debug)]
pub struct PortfolioLedger {
    pub(crate) initial_bankroll: f64,
    pub(crate) current_bankroll: f64,
    pub(crate) peak_bankroll: f64,
    pub(crate) max_drawdown: f64,
    pub(crate) daily_pnl: f64,
    pub(crate) daily_trades: u32,
    pub(crate) daily_reset_date: String,
    pub(crate) consecutive_wins: u32,
    pub(crate) consecutive_losses: u32,
    pub(crate) history: VecDeque<TradeOutcome>,
    /// Monotonic deadline before which all entries are blocked; 0 disables.
    pub(crate) global_cooldown_until: f64,
}

impl PortfolioLedger {
    pub fn new(initial_bankroll: f64) -> Self {
        Self {
            initial_bankroll,
            current_bankroll: initial_bankroll,
            peak_bankroll: initial_bankroll,
            max_drawdown: 0.0,
            daily_pnl: 0.0,
            daily_trades: 0,
            daily_reset_date: String::new(),
            consecutive_wins: 0,
            consecutive_losses: 0,
            history: VecDeque::with_capacity(256),
            global_cooldown_until: 0.0,
        }
    }

    /// Account for a realized close: history, bankroll, daily PnL,
    /// streaks, peak/drawdown, and the post-loss global cooldown.
    pub fn record_close(&mut self, pnl: f64, now: f64, cooldown_on_loss_secs: u64) {
        if self.history.len() >= TRADE_HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(TradeOutcome { pnl, time: now });

        self.daily_pnl += pnl;
        self.current_bankroll += pnl;

        if pnl > 0.0 {
            self.consecutive_wins += 1;
            self.consecutive_losses = 0;
        } else if pnl < 0.0 {
            self.consecutive_losses += 1;
            self.consecutive_wins = 0;
        }

        if pnl < 0.0 && cooldown_on_loss_secs > 0 {
            self.global_cooldown_until = now + cooldown_on_loss_secs as f64;
            warn!(
                "loss of {pnl:.2} recorded, global cooldown armed for {cooldown_on_loss_secs}s"
            );
        }

        if self.current_bankroll > self.peak_bankroll {
            self.peak_bankroll = self.current_bankroll;
        }
        self.max_drawdown = self.max_drawdown.max(self.drawdown());
    }

    /// Current drawdown fraction from the peak, clamped to [0, 1].
    pub fn drawdown(&self) -> f64 {
        if self.peak_bankroll <= 0.0 {
            return 0.0;
        }
        ((self.peak_bankroll - self.current_bankroll) / self.peak_bankroll).clamp(0.0, 1.0)
    }

    /// Position-size derating ladder driven by current drawdown. The
    /// floor of 0.15 keeps sizing nonzero so an account can recover.
    pub fn drawdown_factor(&self) -> f64 {
        let dd = self.drawdown();
        if dd < 0.03 {
            1.0
        } else if dd < 0.07 {
            0.80
        } else if dd < 0.12 {
            0.60
        } else if dd < 0.18 {
            0.35
        } else {
            0.15
        }
    }

    /// Zero the daily counters when the UTC date has rolled over.
    /// Returns true when a reset happened.
    pub fn daily_reset_if_needed(&mut self, today: &str) -> bool {
        if today == self.daily_reset_date {
            return false;
        }
        self.daily_pnl = 0.0;
        self.daily_trades = 0;
        self.consecutive_wins = 0;
        self.consecutive_losses = 0;
        self.daily_reset_date = today.to_string();
        true
    }

    pub fn history(&self) -> &VecDeque<TradeOutcome> {
        &self.history
    }

    pub fn total_return_pct(&self) -> f64 {
        if self.initial_bankroll <= 0.0 {
            return 0.0;
        }
        (self.current_bankroll - self.initial_bankroll) / self.initial_bankroll * 100.0
    }

    /// Wipe runtime state back to a fresh bankroll.
    pub fn reset(&mut self, initial_bankroll: f64, today: &str) {
        self.initial_bankroll = initial_bankroll;
        self.current_bankroll = initial_bankroll;
        self.peak_bankroll = initial_bankroll;
        self.max_drawdown = 0.0;
        self.daily_pnl = 0.0;
        self.daily_trades = 0;
        self.consecutive_wins = 0;
        self.consecutive_losses = 0;
        self.history.clear();
        self.global_cooldown_until = 0.0;
        self.daily_reset_date = today.to_string();
    }
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub entry: EntryConfig,
    pub telemetry: TelemetryConfig,
}

/// Risk-engine limits. Immutable after construction; the engine applies
/// `sanitized()` once so out-of-range inputs cannot widen any cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub initial_bankroll: f64,
    pub max_risk_per_trade: f64,      // Fraction of bankroll risked per trade (e.g. 0.02)
    pub max_daily_loss: f64,          // Fraction of INITIAL bankroll (e.g. 0.05)
    pub max_position_usd: f64,        // Hard cap per position in quote currency
    pub kelly_fraction: f64,          // Safety multiplier on full Kelly (e.g. 0.25)
    pub max_kelly_size: f64,          // Ceiling on the adjusted Kelly fraction
    pub risk_of_ruin_threshold: f64,  // Block entries above this ruin probability
    pub max_daily_trades: u32,        // 0 = unlimited
    pub max_total_exposure_pct: f64,  // Clamped to [0.05, 1.0]
    pub atr_multiplier_sl: f64,       // Stop distance in ATRs (signal layer)
    pub atr_multiplier_tp: f64,       // Target distance in ATRs (signal layer)
    pub trailing_activation_pct: f64, // Unrealized gain that arms the trailing stop
    pub trailing_step_pct: f64,       // Trail distance from the best price seen
    pub breakeven_activation_pct: f64,
    pub cooldown_seconds: u64,        // Per-pair cooldown between entries
    pub max_concurrent_positions: usize,
    pub strategy_cooldowns: HashMap<String, u64>, // strategy name -> seconds after close
    pub global_cooldown_seconds_on_loss: u64,
    pub min_risk_reward_ratio: f64,   // Clamped to >= 0.1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_bankroll: 10_000.0,
            max_risk_per_trade: 0.02,
            max_daily_loss: 0.05,
            max_position_usd: 500.0,
            kelly_fraction: 0.25,
            max_kelly_size: 0.10,
            risk_of_ruin_threshold: 0.01,
            max_daily_trades: 0,
            max_total_exposure_pct: 0.50,
            atr_multiplier_sl: 2.0,
            atr_multiplier_tp: 3.0,
            trailing_activation_pct: 0.015,
            trailing_step_pct: 0.005,
            breakeven_activation_pct: 0.01,
            cooldown_seconds: 300,
            max_concurrent_positions: 5,
            strategy_cooldowns: HashMap::new(),
            global_cooldown_seconds_on_loss: 1800,
            min_risk_reward_ratio: 1.2,
        }
    }
}

impl EngineConfig {
    /// Clamp the fields whose raw values could widen a cap.
    pub fn sanitized(mut self) -> Self {
        self.max_total_exposure_pct = self.max_total_exposure_pct.clamp(0.05, 1.0);
        self.min_risk_reward_ratio = self.min_risk_reward_ratio.max(0.1);
        self
    }
}

/// Caller-side entry gates that run before the engine's own checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConfig {
    pub min_confidence: f64,
    pub signal_max_age_secs: f64,       // Discard proposals older than this
    pub confidence_decay_grace_secs: f64,
    pub confidence_decay_per_sec: f64,  // Applied beyond the grace window
    pub market_max_staleness_secs: u64,
    pub max_trades_per_hour: u32,       // 0 = throttle disabled
    pub trade_count_cache_ttl_secs: f64,
    pub quiet_hours_utc: Vec<u32>,      // UTC hours during which entries are blocked
    pub slippage_pct: f64,              // Paper-fill slippage applied to entry
    pub fee_pct: f64,                   // Taker fee per fill
    pub correlation: CorrelationConfig,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.50,
            signal_max_age_secs: 60.0,
            confidence_decay_grace_secs: 5.0,
            confidence_decay_per_sec: 0.02,
            market_max_staleness_secs: 120,
            max_trades_per_hour: 0,
            trade_count_cache_ttl_secs: 5.0,
            quiet_hours_utc: Vec::new(),
            slippage_pct: 0.0005,
            fee_pct: 0.0026,
            correlation: CorrelationConfig::default(),
        }
    }
}

/// Pairs that share a concurrency budget so related exposures cannot
/// pyramid. Pairs in no group are unconstrained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    pub groups: HashMap<String, Vec<String>>, // group name -> member pairs
    pub max_concurrent_per_group: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        let mut groups = HashMap::new();
        groups.insert("btc".to_string(), vec!["BTC/USD".to_string()]);
        groups.insert("eth".to_string(), vec!["ETH/USD".to_string()]);
        groups.insert(
            "alt_l1".to_string(),
            vec![
                "SOL/USD".to_string(),
                "AVAX/USD".to_string(),
                "DOT/USD".to_string(),
                "ADA/USD".to_string(),
            ],
        );
        Self {
            groups,
            max_concurrent_per_group: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub alert_on_trade: bool,
    pub alert_on_drawdown: bool,
    pub alert_on_loss_limit: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            discord_webhook_url: None,
            alert_on_trade: true,
            alert_on_drawdown: true,
            alert_on_loss_limit: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            entry: EntryConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (.env file) with defaults.
    ///
    /// Optional env vars:
    ///   INITIAL_BANKROLL — starting quote-currency balance (default: 10000)
    ///   MAX_RISK_PER_TRADE, MAX_DAILY_LOSS, MAX_POSITION_USD
    ///   MAX_TOTAL_EXPOSURE_PCT, MAX_CONCURRENT_POSITIONS, MAX_DAILY_TRADES
    ///   COOLDOWN_SECONDS, GLOBAL_COOLDOWN_SECONDS_ON_LOSS
    ///   MAX_TRADES_PER_HOUR — entry throttle (0 disables)
    ///   QUIET_HOURS_UTC — comma-separated UTC hours, e.g. "2,3,4"
    ///   TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID, DISCORD_WEBHOOK_URL — alerts
    ///   RUST_LOG — log level (default: info)
    pub fn load_or_default() -> Self {
        // Load .env file if present
        let _ = dotenv::dotenv();

        let mut config = Self::default();

        if let Some(v) = env_f64("INITIAL_BANKROLL") {
            config.engine.initial_bankroll = v;
        }
        if let Some(v) = env_f64("MAX_RISK_PER_TRADE") {
            config.engine.max_risk_per_trade = v;
        }
        if let Some(v) = env_f64("MAX_DAILY_LOSS") {
            config.engine.max_daily_loss = v;
        }
        if let Some(v) = env_f64("MAX_POSITION_USD") {
            config.engine.max_position_usd = v;
        }
        if let Some(v) = env_f64("MAX_TOTAL_EXPOSURE_PCT") {
            config.engine.max_total_exposure_pct = v;
        }
        if let Some(v) = env_parse::<usize>("MAX_CONCURRENT_POSITIONS") {
            config.engine.max_concurrent_positions = v;
        }
        if let Some(v) = env_parse::<u32>("MAX_DAILY_TRADES") {
            config.engine.max_daily_trades = v;
        }
        if let Some(v) = env_parse::<u64>("COOLDOWN_SECONDS") {
            config.engine.cooldown_seconds = v;
        }
        if let Some(v) = env_parse::<u64>("GLOBAL_COOLDOWN_SECONDS_ON_LOSS") {
            config.engine.global_cooldown_seconds_on_loss = v;
        }
        if let Some(v) = env_parse::<u32>("MAX_TRADES_PER_HOUR") {
            config.entry.max_trades_per_hour = v;
        }
        if let Ok(raw) = std::env::var("QUIET_HOURS_UTC") {
            config.entry.quiet_hours_utc = raw
                .split(',')
                .filter_map(|s| s.trim().parse::<u32>().ok())
                .filter(|h| *h < 24)
                .collect();
        }

        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            if !token.is_empty() {
                config.telemetry.telegram_bot_token = Some(token);
            }
        }
        if let Ok(chat) = std::env::var("TELEGRAM_CHAT_ID") {
            if !chat.is_empty() {
                config.telemetry.telegram_chat_id = Some(chat);
            }
        }
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            if !url.is_empty() {
                config.telemetry.discord_webhook_url = Some(url);
            }
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.telemetry.log_level = level;
        }

        config
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.engine.initial_bankroll > 0.0,
            "initial_bankroll must be positive"
        );
        anyhow::ensure!(
            self.engine.max_risk_per_trade > 0.0 && self.engine.max_risk_per_trade <= 0.10,
            "max_risk_per_trade must be in (0, 0.10]"
        );
        anyhow::ensure!(
            self.engine.max_daily_loss > 0.0 && self.engine.max_daily_loss <= 1.0,
            "max_daily_loss must be in (0, 1]"
        );
        anyhow::ensure!(
            self.engine.max_position_usd > 0.0,
            "max_position_usd must be positive"
        );
        anyhow::ensure!(
            self.engine.trailing_activation_pct >= self.engine.breakeven_activation_pct,
            "trailing activation must not precede breakeven activation"
        );
        anyhow::ensure!(
            self.entry.min_confidence >= 0.0 && self.entry.min_confidence <= 1.0,
            "min_confidence must be in [0, 1]"
        );
        anyhow::ensure!(
            self.entry.quiet_hours_utc.iter().all(|h| *h < 24),
            "quiet_hours_utc entries must be hours 0-23"
        );
        Ok(())
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

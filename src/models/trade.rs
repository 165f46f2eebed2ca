use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::risk::stops::StopLossState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }
}

/// Direction of a signal as produced by the signal layer. `Neutral`
/// signals never reach the sizing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

impl Direction {
    pub fn as_side(&self) -> Option<Side> {
        match self {
            Direction::Long => Some(Side::Buy),
            Direction::Short => Some(Side::Sell),
            Direction::Neutral => None,
        }
    }
}

/// Volatility regime labels consumed by the sizing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VolRegime {
    #[serde(rename = "low_vol")]
    Low,
    #[default]
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "high_vol")]
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
}

/// A scored trade candidate handed to the entry pipeline by the signal
/// producer. The engine consumes the edge estimate and confidence; it
/// does not compute them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeProposal {
    pub pair: String,
    pub direction: Direction,
    pub confidence: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub strategy: Option<String>,
    pub win_rate: f64,
    pub avg_win_loss_ratio: f64,
    pub vol_regime: VolRegime,
    pub vol_level: f64,
    pub vol_expanding: bool,
    pub issued_at: DateTime<Utc>,
}

impl TradeProposal {
    /// Age of the proposal in seconds, relative to `now`.
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.issued_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Persisted form of a trade, as stored and returned by a `TradeStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub pair: String,
    pub side: Side,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub strategy: Option<String>,
    pub status: TradeStatus,
    pub opened_at: DateTime<Utc>,
    /// JSON payload; tolerated to be absent or malformed on recovery.
    pub metadata: Option<String>,
}

impl TradeRecord {
    /// Position size in quote currency: the metadata value when present
    /// and parseable, otherwise `entry_price * quantity`.
    pub fn size_usd(&self) -> f64 {
        self.parsed_metadata()
            .and_then(|m| m.size_usd)
            .unwrap_or(self.entry_price * self.quantity)
    }

    pub fn parsed_metadata(&self) -> Option<TradeMetadata> {
        let raw = self.metadata.as_deref()?;
        serde_json::from_str(raw).ok()
    }
}

/// Metadata payload carried on a trade record. Unknown keys are ignored
/// so older records deserialize cleanly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeMetadata {
    #[serde(default)]
    pub size_usd: Option<f64>,
    #[serde(default)]
    pub stop_loss_state: Option<StopLossState>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub slippage: Option<f64>,
    #[serde(default)]
    pub fees: Option<f64>,
}

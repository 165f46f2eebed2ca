use anyhow::Result;
use tracing::{error, info};

use crate::config::TelemetryConfig;

/// Pushes risk events to Telegram or Discord webhooks. Unconfigured
/// channels are silently skipped; delivery failures are logged and
/// never propagate into the trading path.
pub struct AlertManager {
    config: TelemetryConfig,
    http: reqwest::Client,
}

impl AlertManager {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Send a message on every configured channel.
    pub async fn send(&self, message: &str) {
        info!("ALERT: {message}");

        if let Err(e) = self.send_telegram(message).await {
            error!("Telegram alert failed: {e}");
        }

        if let Err(e) = self.send_discord(message).await {
            error!("Discord alert failed: {e}");
        }
    }

    async fn send_telegram(&self, message: &str) -> Result<()> {
        let (Some(token), Some(chat_id)) =
            (&self.config.telegram_bot_token, &self.config.telegram_chat_id)
        else {
            return Ok(()); // Not configured
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": format!("CHOWKIDAR: {message}"),
        });

        self.http.post(&url).json(&body).send().await?;
        Ok(())
    }

    async fn send_discord(&self, message: &str) -> Result<()> {
        let Some(webhook_url) = &self.config.discord_webhook_url else {
            return Ok(());
        };

        let body = serde_json::json!({
            "content": format!("**CHOWKIDAR**: {message}")
        });

        self.http.post(webhook_url).json(&body).send().await?;
        Ok(())
    }

    /// Alert on a new position.
    pub async fn on_trade(&self, summary: &str) {
        if self.config.alert_on_trade {
            self.send(&format!("Trade: {summary}")).await;
        }
    }

    /// Alert when drawdown passes a reporting threshold.
    pub async fn on_drawdown(&self, pct: f64) {
        if self.config.alert_on_drawdown {
            self.send(&format!("Drawdown at {pct:.1}%")).await;
        }
    }

    /// Alert when the daily loss limit locks out new entries.
    pub async fn on_loss_limit(&self, daily_pnl: f64) {
        if self.config.alert_on_loss_limit {
            self.send(&format!(
                "Daily loss limit hit ({daily_pnl:.2}), entries locked until UTC midnight"
            ))
            .await;
        }
    }

    /// Alert when a loss arms the global cooldown.
    pub async fn on_global_cooldown(&self, seconds: u64) {
        if self.config.alert_on_loss_limit {
            self.send(&format!("Global cooldown armed for {seconds}s after loss"))
                .await;
        }
    }
}

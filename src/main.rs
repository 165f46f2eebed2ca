use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{info, warn};

use chowkidar::config::Config;
use chowkidar::execution::{EntryPipeline, PositionMonitor};
use chowkidar::market::paper::RandomWalkFeed;
use chowkidar::market::MarketData;
use chowkidar::models::trade::{Direction, TradeProposal, VolRegime};
use chowkidar::risk::RiskManager;
use chowkidar::storage::{MemoryStore, TradeStore};
use chowkidar::telemetry::AlertManager;

const SIM_STEPS: usize = 2_000;
const PROPOSAL_EVERY: usize = 25;
const REPORT_EVERY: usize = 500;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("================================================");
    info!("  CHOWKIDAR — Risk Engine v0.1.0");
    info!("  Paper simulation harness");
    info!("================================================");

    let config = Config::load_or_default();
    config.validate()?;

    info!("Starting bankroll: ${}", config.engine.initial_bankroll);

    // === Initialize components ===

    let store = Arc::new(MemoryStore::new());
    let feed = Arc::new(RandomWalkFeed::new(&[
        ("BTC/USD", 50_000.0),
        ("ETH/USD", 3_000.0),
        ("SOL/USD", 150.0),
    ]));
    let risk = Arc::new(RwLock::new(RiskManager::new(config.engine.clone())));

    // Restore open positions from the store (empty on a fresh run, but
    // the same path a live restart takes)
    let open = store.get_open_trades(None).await?;
    risk.write().await.reinitialize_from_records(&open);

    let pipeline = EntryPipeline::new(
        config.entry.clone(),
        store.clone() as Arc<dyn TradeStore>,
        feed.clone() as Arc<dyn MarketData>,
        risk.clone(),
    );
    let monitor = PositionMonitor::new(
        store.clone() as Arc<dyn TradeStore>,
        feed.clone() as Arc<dyn MarketData>,
        risk.clone(),
        config.entry.fee_pct,
    );
    let alerts = AlertManager::new(config.telemetry.clone());

    // === Simulation loop ===

    let pairs = feed.pairs();
    let atr_sl = config.engine.atr_multiplier_sl;
    let atr_tp = config.engine.atr_multiplier_tp;
    let daily_loss_floor = -(config.engine.initial_bankroll * config.engine.max_daily_loss);
    let mut loss_limit_alerted = false;

    for step in 0..SIM_STEPS {
        feed.step();

        if step % PROPOSAL_EVERY == 0 {
            if let Some(proposal) = synth_proposal(&pairs, feed.as_ref(), atr_sl, atr_tp) {
                match pipeline.execute(&proposal).await {
                    Ok(outcome) => {
                        if outcome.is_entered() {
                            alerts
                                .on_trade(&format!("{} entered", proposal.pair))
                                .await;
                        }
                    }
                    Err(e) => warn!("entry pipeline error: {e}"),
                }
            }
        }

        let summary = monitor.tick().await?;
        if summary.stopped_out > 0 {
            info!("{} position(s) stopped out at step {step}", summary.stopped_out);
        }

        if step > 0 && step % REPORT_EVERY == 0 {
            let report = risk.read().await.get_risk_report();
            info!(
                "step {step}: bankroll ${:.2}, {} open, daily pnl {:.2}, dd {:.2}%",
                report.bankroll,
                report.open_positions,
                report.daily_pnl,
                report.current_drawdown_pct
            );
            if report.current_drawdown_pct > 5.0 {
                alerts.on_drawdown(report.current_drawdown_pct).await;
            }
            if report.daily_pnl <= daily_loss_floor && !loss_limit_alerted {
                alerts.on_loss_limit(report.daily_pnl).await;
                loss_limit_alerted = true;
            }
        }
    }

    // === Final report ===

    let report = risk.read().await.get_risk_report();
    info!("simulation complete after {SIM_STEPS} steps");
    info!("closed trades: {}", store.closed_count());
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

/// Build a synthetic scored proposal off the current feed price, with
/// stops and targets placed in ATR multiples the way the signal layer
/// would.
fn synth_proposal(
    pairs: &[String],
    feed: &RandomWalkFeed,
    atr_sl: f64,
    atr_tp: f64,
) -> Option<TradeProposal> {
    let mut rng = rand::thread_rng();
    let pair = pairs[rng.gen_range(0..pairs.len())].clone();
    let price = feed.latest_price(&pair)?;

    // Synthetic 1m ATR at 40 bps of price
    let atr = price * 0.004;
    let (direction, stop_loss, take_profit) = if rng.gen_bool(0.5) {
        (Direction::Long, price - atr * atr_sl, price + atr * atr_tp)
    } else {
        (Direction::Short, price + atr * atr_sl, price - atr * atr_tp)
    };

    Some(TradeProposal {
        pair,
        direction,
        confidence: rng.gen_range(0.55..0.90),
        entry_price: price,
        stop_loss,
        take_profit,
        strategy: Some("paper-demo".into()),
        win_rate: 0.55,
        avg_win_loss_ratio: 1.5,
        vol_regime: VolRegime::Normal,
        vol_level: 0.5,
        vol_expanding: false,
        issued_at: Utc::now(),
    })
}

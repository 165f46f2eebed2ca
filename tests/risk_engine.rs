//! End-to-end scenarios for the risk engine: sizing composition, loss
//! lockouts, cooldowns, stop monotonicity, and restart recovery, all
//! through the public API.

use chrono::Utc;

use chowkidar::config::EngineConfig;
use chowkidar::models::position::SizeReduction;
use chowkidar::models::trade::{Side, TradeRecord, TradeStatus, VolRegime};
use chowkidar::risk::sizing::SizeRequest;
use chowkidar::risk::stops::StopLossState;
use chowkidar::risk::RiskManager;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Engine config with both cooldowns disabled so scenarios control
/// exactly which gate they exercise.
fn quiet_config() -> EngineConfig {
    EngineConfig {
        cooldown_seconds: 0,
        global_cooldown_seconds_on_loss: 0,
        ..EngineConfig::default()
    }
}

/// The standard sizing request: entry 100, stop 98.5 (1.5%), target 103.
fn request() -> SizeRequest {
    SizeRequest {
        pair: "BTC/USD".into(),
        entry_price: 100.0,
        stop_loss: 98.5,
        take_profit: 103.0,
        win_rate: 0.6,
        avg_win_loss_ratio: 1.5,
        confidence: 0.8,
        spread_pct: 0.0,
        vol_regime: VolRegime::Normal,
        vol_level: 0.5,
        vol_expanding: false,
    }
}

fn open_record(trade_id: &str, metadata: Option<&str>) -> TradeRecord {
    TradeRecord {
        trade_id: trade_id.into(),
        pair: "BTC/USD".into(),
        side: Side::Buy,
        entry_price: 50_000.0,
        quantity: 0.1,
        stop_loss: 48_000.0,
        take_profit: 54_000.0,
        strategy: Some("trend".into()),
        status: TradeStatus::Open,
        opened_at: Utc::now(),
        metadata: metadata.map(String::from),
    }
}

// ---------------------------------------------------------------------------
// Sizing scenarios
// ---------------------------------------------------------------------------

/// Fixed-fractional sizing is the primary method; with an empty history
/// Kelly is recorded but never shrinks the size, and the hard cap binds.
#[test]
fn kelly_is_a_cap_not_the_primary() {
    let mut rm = RiskManager::new(quiet_config());
    let result = rm.calculate_position_size(&request());

    assert!(result.allowed, "reason: {}", result.reason);
    // base = 10000 * 0.02 / 0.015 ~= 13333, capped at $500
    assert_eq!(result.size_usd, 500.0);
    assert!((result.risk_amount - 7.5).abs() < 0.01);
    assert!(result.kelly_fraction > 0.0);
    assert!((result.size_units - 5.0).abs() < 1e-6);
}

/// Once the 50-trade sample floor is passed, the Kelly cap starts to
/// bind (though here the $500 hard cap is still the tighter limit).
#[test]
fn kelly_cap_binds_after_history_threshold() {
    let mut rm = RiskManager::new(quiet_config());
    // 60 synthetic closes, 40 wins of +1 and 20 losses of -1, ordered
    // so the run ends on wins and no streak factor engages
    for _ in 0..20 {
        rm.close_position("seed-l", -1.0);
        rm.close_position("seed-w1", 1.0);
        rm.close_position("seed-w2", 1.0);
    }

    let mut req = request();
    req.win_rate = 2.0 / 3.0;
    req.avg_win_loss_ratio = 1.0;

    let result = rm.calculate_position_size(&req);
    assert!(result.allowed, "reason: {}", result.reason);
    // kelly_full = 1/3, adjusted = 1/3 * 0.25 * 0.8 ~= 0.0667
    assert!((result.kelly_fraction - 0.066_67).abs() < 1e-4);
    assert_eq!(result.size_usd, 500.0);
}

/// A 10% drawdown derates sizing by 0.60 before the hard cap.
#[test]
fn drawdown_derating_composes() {
    let mut rm = RiskManager::new(EngineConfig {
        // Keep the daily loss gate out of the way of this scenario
        max_daily_loss: 0.15,
        ..quiet_config()
    });
    rm.close_position("seed", -1_000.0);

    let result = rm.calculate_position_size(&request());
    assert!(result.allowed, "reason: {}", result.reason);
    // base at 9000 = 12000, * 0.60 = 7200, capped at 500
    assert_eq!(result.size_usd, 500.0);
    assert_eq!(rm.get_risk_report().drawdown_factor, 0.60);
}

// ---------------------------------------------------------------------------
// Lockouts and cooldowns
// ---------------------------------------------------------------------------

/// Losing 5% of the *initial* bankroll in one UTC day locks out every
/// subsequent entry with a daily-loss reason.
#[test]
fn daily_loss_lockout_is_sticky() {
    let mut rm = RiskManager::new(quiet_config());
    rm.close_position("big-loser", -500.01);

    for _ in 0..3 {
        let result = rm.calculate_position_size(&request());
        assert!(!result.allowed);
        assert!(result.reason.contains("Daily loss limit reached"));
    }
}

/// Any loss arms the global cooldown when configured; sizing inside the
/// window is denied with a cooldown reason.
#[test]
fn post_loss_global_cooldown() {
    let mut rm = RiskManager::new(EngineConfig {
        cooldown_seconds: 0,
        global_cooldown_seconds_on_loss: 1800,
        ..EngineConfig::default()
    });
    rm.close_position("loser", -10.0);

    let result = rm.calculate_position_size(&request());
    assert!(!result.allowed);
    assert!(result.reason.contains("Global cooldown"));

    // A win does not clear an armed cooldown
    rm.close_position("winner", 10.0);
    assert!(rm
        .calculate_position_size(&request())
        .reason
        .contains("Global cooldown"));
}

// ---------------------------------------------------------------------------
// Stop-loss properties
// ---------------------------------------------------------------------------

/// Across any tick sequence the stop only ever tightens: non-decreasing
/// for longs, non-increasing for shorts.
#[test]
fn stops_are_monotone_for_both_sides() {
    let mut rm = RiskManager::new(quiet_config());
    rm.initialize_stop_loss("long", 100.0, 98.0, Side::Buy, None, None);
    rm.initialize_stop_loss("short", 100.0, 102.0, Side::Sell, None, None);

    let prices = [
        100.5, 101.8, 99.2, 103.0, 102.1, 105.5, 104.0, 107.3, 96.0, 108.0,
    ];

    let mut long_sl = 98.0;
    let mut short_sl = 102.0;
    for p in prices {
        let ls = rm.update_stop_loss("long", p, 100.0, Side::Buy);
        assert!(ls.current_sl >= long_sl);
        long_sl = ls.current_sl;

        let mirrored = 200.0 - p; // same magnitude move in the short's favor
        let ss = rm.update_stop_loss("short", mirrored, 100.0, Side::Sell);
        assert!(ss.current_sl <= short_sl);
        short_sl = ss.current_sl;
    }

    assert!(long_sl > 98.0, "trailing never engaged for the long");
    assert!(short_sl < 102.0, "trailing never engaged for the short");
}

/// Replaying the same tick is a no-op.
#[test]
fn stop_updates_are_idempotent() {
    let mut rm = RiskManager::new(quiet_config());
    rm.initialize_stop_loss("t", 100.0, 98.0, Side::Buy, None, None);
    let first = rm.update_stop_loss("t", 104.2, 100.0, Side::Buy);
    let second = rm.update_stop_loss("t", 104.2, 100.0, Side::Buy);
    assert_eq!(first, second);
}

/// The +inf trailing-low sentinel survives a serialize/deserialize
/// round trip as a null in the wire form.
#[test]
fn stop_state_round_trips_infinity() {
    let mut rm = RiskManager::new(quiet_config());
    let state = rm.initialize_stop_loss("t", 100.0, 98.0, Side::Buy, None, None);
    assert_eq!(state.trailing_low, f64::INFINITY);

    let json = serde_json::to_string(&state).unwrap();
    assert!(json.contains("\"trailing_low\":null"));
    let back: StopLossState = serde_json::from_str(&json).unwrap();
    assert_eq!(back, state);
}

// ---------------------------------------------------------------------------
// Position lifecycle
// ---------------------------------------------------------------------------

#[test]
fn partial_exits_reduce_and_clamp() {
    let mut rm = RiskManager::new(quiet_config());
    rm.register_position("t", "BTC/USD", Side::Buy, 100.0, 400.0, None);

    rm.reduce_position_size("t", SizeReduction::Fraction(0.5));
    assert_eq!(rm.position("t").unwrap().size_usd, 200.0);

    rm.reduce_position_size("t", SizeReduction::Fraction(2.0)); // clamped to 1.0
    assert_eq!(rm.position("t").unwrap().size_usd, 0.0);

    rm.register_position("u", "ETH/USD", Side::Buy, 100.0, 100.0, None);
    rm.reduce_position_size("u", SizeReduction::Usd(150.0));
    assert_eq!(rm.position("u").unwrap().size_usd, 0.0);
}

#[test]
fn exposure_tracks_opens_and_closes() {
    let mut rm = RiskManager::new(quiet_config());
    rm.register_position("a", "BTC/USD", Side::Buy, 100.0, 300.0, None);
    rm.register_position("b", "ETH/USD", Side::Sell, 50.0, 200.0, None);
    assert_eq!(rm.total_exposure_usd(), 500.0);

    rm.close_position("a", 12.0);
    assert_eq!(rm.total_exposure_usd(), 200.0);
    assert_eq!(rm.open_position_count(), 1);

    let report = rm.get_risk_report();
    assert_eq!(report.bankroll, 10_012.0);
    assert_eq!(report.consecutive_wins, 1);
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

/// A restored trailing high is live immediately: the next tick trails
/// off the persisted extreme, not the current price.
#[test]
fn recovery_resumes_trailing_from_persisted_extremes() {
    let mut rm = RiskManager::new(quiet_config());
    let meta = r#"{"size_usd": 5000.0, "stop_loss_state": {"trailing_high": 52000.0, "trailing_low": null}}"#;
    rm.reinitialize_from_records(&[open_record("t-1", Some(meta))]);

    assert_eq!(rm.open_position_count(), 1);
    assert_eq!(rm.position("t-1").unwrap().size_usd, 5_000.0);

    // +2% from entry arms trailing; the candidate comes off the
    // restored 52000 high, not the 51000 tick
    let state = rm.update_stop_loss("t-1", 51_000.0, 50_000.0, Side::Buy);
    let expected = 52_000.0 * (1.0 - 0.005);
    assert!((state.current_sl - expected).abs() < 1e-6);
    assert!(rm.should_stop_out("t-1", 51_000.0, Side::Buy));
}

#[test]
fn recovery_tolerates_bad_metadata_in_batch() {
    let mut rm = RiskManager::new(quiet_config());
    let records = vec![
        open_record("good", Some(r#"{"size_usd": 1234.0}"#)),
        open_record("bad", Some("{{{not json")),
        open_record("bare", None),
    ];
    rm.reinitialize_from_records(&records);

    assert_eq!(rm.open_position_count(), 3);
    assert_eq!(rm.position("good").unwrap().size_usd, 1234.0);
    // Corrupt and missing metadata both fall back to entry * quantity
    assert_eq!(rm.position("bad").unwrap().size_usd, 5_000.0);
    assert_eq!(rm.position("bare").unwrap().size_usd, 5_000.0);
    assert!(rm.should_stop_out("bad", 47_900.0, Side::Buy));
}

//! End-to-end exercise of the forecasting and learning loop: price a
//! fixture, validate outcomes, retrain, and check that calibration and
//! mined rules feed back into later forecasts.

use refstats::calibration::CalibrationManager;
use refstats::context::{LeagueBaseline, MatchContext, RefereeProfile, RefereeStats, TeamStats};
use refstats::forecast::{self, Trend};
use refstats::market::Market;
use refstats::rules::{self, MinerConfig, RuleTier};
use refstats::store::{LearningStore, ValidationRecord};

fn fixture(referee_avg5: f64, referee_avg10: f64) -> MatchContext {
    MatchContext {
        league: LeagueBaseline {
            competition: "Brasileirão Série A".to_string(),
            avg_yellow: 5.2,
            knockout: false,
        },
        referee: RefereeStats {
            name: "Anderson Daronco".to_string(),
            avg_yellow_5: referee_avg5,
            avg_yellow_10: referee_avg10,
            avg_fouls_10: 27.5,
            games_available: 12,
            profile: RefereeProfile::Strict,
        },
        home: TeamStats {
            name: "Flamengo".to_string(),
            yellow_for: 2.9,
            fouls_for: 14.2,
            games_available: 10,
        },
        away: TeamStats {
            name: "Palmeiras".to_string(),
            yellow_for: 3.1,
            fouls_for: 15.0,
            games_available: 10,
        },
    }
}

#[test]
fn worked_example_matches_hand_computation() {
    // base 5.2, avg5 6.5, avg10 5.8, teams sum 6.0:
    //   weighted referee = 0.6*6.5 + 0.4*5.8 = 6.22
    //   delta_referee    = 0.8 * (6.22 - 5.2)  = 0.816
    //   delta_teams      = 0.6 * (6.0 - 5.2)   = 0.48
    //   recency F        = 1 + (6.5-5.8)/5.8 = 1.1207 capped at 1.05
    //   delta_recency    = 5.2 * 0.05 = 0.26
    //   lambda_raw       = 5.2 + 0.816 + 0.48 + 0.26 = 6.756
    let ctx = fixture(6.5, 5.8);
    let mut cal = CalibrationManager::new();
    let fc = forecast::forecast_match(&ctx, &mut cal);

    let est = &fc.estimate;
    assert!((est.lambda_base - 5.2).abs() < 1e-9);
    assert!((est.delta_referee - 0.816).abs() < 1e-9);
    assert!((est.delta_teams - 0.48).abs() < 1e-9);
    assert!((est.delta_recency - 0.26).abs() < 1e-9);
    assert!((est.lambda_raw - 6.756).abs() < 1e-9);

    // Strong sample and complete data keep the shrinkage weight high, so
    // the shrunk lambda stays well above the league base.
    assert!(est.shrink_weight >= 0.5);
    assert!(est.lambda_shrunk > 5.2);
    assert!(est.lambda_shrunk <= est.lambda_raw);
    assert_eq!(fc.trend, Trend::Elevated);

    // Hot referee in a high-card league: Over 3.5 should price above the
    // complementary Under 3.5.
    let over = fc.market(Market::Over3_5).unwrap();
    let under = fc.market(Market::Under3_5).unwrap();
    assert!(over.raw_prob > under.raw_prob);
    assert!((over.raw_prob + under.raw_prob - 100.0).abs() < 1e-9);
}

#[test]
fn validation_feedback_changes_later_forecasts() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("learning.json");
    let cal_path = dir.path().join("calibration.json");

    let mut store = LearningStore::open(&store_path);
    let mut cal = CalibrationManager::load(&cal_path);

    let ctx = fixture(6.5, 5.8);
    let before = forecast::forecast_match(&ctx, &mut cal);
    let raw_before = before.market(Market::Over3_5).unwrap().raw_prob;
    assert_eq!(
        before.market(Market::Over3_5).unwrap().calibrated_prob,
        raw_before
    );

    // Feed twelve settled fixtures where the market overshot: only half
    // of the confident Over 3.5 forecasts actually landed.
    for i in 0..12 {
        let fc = forecast::forecast_match(&ctx, &mut cal);
        let cards = if i % 2 == 0 { 6 } else { 2 };
        let rec = ValidationRecord::from_outcome(&ctx, &fc, Market::Over3_5, cards).unwrap();
        store.add(rec, &mut cal);
    }
    store.retrain(&mut cal, &MinerConfig::default()).unwrap();
    cal.save(&cal_path).unwrap();

    let after = forecast::forecast_match(&ctx, &mut cal);
    let priced = after.market(Market::Over3_5).unwrap();
    assert_eq!(priced.raw_prob, raw_before);
    assert!(
        priced.calibrated_prob < priced.raw_prob,
        "overshooting market should be pulled down, raw {} calibrated {}",
        priced.raw_prob,
        priced.calibrated_prob
    );

    // Both stores survive a reload.
    let reloaded_store = LearningStore::open(&store_path);
    assert_eq!(reloaded_store.records().len(), 12);
    let mut reloaded_cal = CalibrationManager::load(&cal_path);
    assert_eq!(
        reloaded_cal.calibrate(Market::Over3_5, raw_before),
        priced.calibrated_prob
    );
}

#[test]
fn mined_rules_activate_on_matching_live_forecasts() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = LearningStore::open(dir.path().join("learning.json"));
    let mut cal = CalibrationManager::new();

    let ctx = fixture(6.5, 5.8);
    // Ten identical-context outcomes at 90% hit rate.
    for i in 0..10 {
        let fc = forecast::forecast_match(&ctx, &mut cal);
        let cards = if i < 9 { 5 } else { 2 };
        let rec = ValidationRecord::from_outcome(&ctx, &fc, Market::Over3_5, cards).unwrap();
        store.add(rec, &mut cal);
    }
    store.retrain(&mut cal, &MinerConfig::default()).unwrap();

    let rules = store.rules();
    assert!(!rules.is_empty());
    // 90% hit rate earns the top tier.
    assert_eq!(rules[0].tier, RuleTier::Diamond);
    assert!(rules.iter().all(|r| r.support >= 8));
    assert!(rules.iter().all(|r| r.hit_rate >= 75.0));
    // Identifiers are assigned in rank order.
    for (i, r) in rules.iter().enumerate() {
        assert_eq!(r.id, i as u32 + 1);
    }

    // The same context forecast again matches the mined conditions.
    let live = forecast::forecast_match(&ctx, &mut cal);
    let priced = live.market(Market::Over3_5).unwrap();
    let factors = refstats::factors::DerivedFactors::derive(&ctx, &live.estimate, &live.interval);
    let active = rules::active_rules(rules, Market::Over3_5, &factors, priced.calibrated_prob);
    assert!(!active.is_empty());

    // A different market has no mined rules to activate.
    let active_other =
        rules::active_rules(rules, Market::Under4_5, &factors, priced.calibrated_prob);
    assert!(active_other.is_empty());
}

#[test]
fn under_5_5_is_excluded_from_mining_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = LearningStore::open(dir.path().join("learning.json"));
    let mut cal = CalibrationManager::new();

    let ctx = fixture(6.5, 5.8);
    for _ in 0..10 {
        let fc = forecast::forecast_match(&ctx, &mut cal);
        let rec = ValidationRecord::from_outcome(&ctx, &fc, Market::Under5_5, 3).unwrap();
        store.add(rec, &mut cal);
    }
    store.retrain(&mut cal, &MinerConfig::default()).unwrap();
    assert!(store.rules().is_empty());
}

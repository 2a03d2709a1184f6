use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationManager;
use crate::context::MatchContext;
use crate::distributions::{self, ConfidenceInterval};
use crate::lambda::{self, LambdaResult};
use crate::market::{Market, MarketKind};

/// Overall card tendency, derived from the shrunk lambda.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Elevated,
    Moderate,
    Low,
}

impl Trend {
    pub fn label(self) -> &'static str {
        match self {
            Trend::Elevated => "Elevated",
            Trend::Moderate => "Moderate",
            Trend::Low => "Low",
        }
    }
}

/// Priced probability for one market, with the reasons it may be kept off
/// the highlight list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketProbability {
    pub market: Market,
    /// Model probability, percent.
    pub raw_prob: f64,
    /// Empirically corrected probability, percent.
    pub calibrated_prob: f64,
    pub threshold: f64,
    pub highlight: bool,
    pub variance_block: bool,
    pub quality_block: bool,
}

/// Complete forecast for one fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchForecast {
    pub estimate: LambdaResult,
    pub interval: ConfidenceInterval,
    pub markets: Vec<MarketProbability>,
    pub highlights: Vec<Market>,
    pub trend: Trend,
}

impl MatchForecast {
    pub fn market(&self, market: Market) -> Option<&MarketProbability> {
        self.markets.iter().find(|m| m.market == market)
    }
}

/// Extreme lines get stricter treatment: blocked entirely when the
/// interval is too wide or the input data too weak to trust the tails.
const EXTREME_LINE: f64 = 5.5;
const QUALITY_BLOCK_BELOW: f64 = 60.0;

/// Price every market for one fixture.
///
/// Needs `&mut` on the calibration manager only for lazy retraining of
/// stale calibrators; no observation is added here.
pub fn forecast_match(ctx: &MatchContext, calibration: &mut CalibrationManager) -> MatchForecast {
    let estimate = lambda::estimate(ctx);
    let interval = distributions::percentiles(estimate.lambda_shrunk, estimate.dispersion_r, true);

    let mut markets = Vec::with_capacity(Market::ALL.len());
    let mut highlights = Vec::new();

    for market in Market::ALL {
        let k_max = market.line() as i64;
        let cdf = distributions::cdf(k_max, estimate.lambda_shrunk, estimate.dispersion_r, true);
        let raw_prob = match market.kind() {
            MarketKind::Over => (1.0 - cdf) * 100.0,
            MarketKind::Under => cdf * 100.0,
        };

        let calibrated_prob = calibration.calibrate(market, raw_prob);

        let extreme = market.line() >= EXTREME_LINE;
        let variance_block = extreme && interval.high_variance;
        let quality_block = extreme && estimate.quality.total < QUALITY_BLOCK_BELOW;

        let threshold = market.highlight_threshold();
        let highlight = calibrated_prob >= threshold && !variance_block && !quality_block;
        if highlight {
            highlights.push(market);
        }

        markets.push(MarketProbability {
            market,
            raw_prob,
            calibrated_prob,
            threshold,
            highlight,
            variance_block,
            quality_block,
        });
    }

    let trend = if estimate.lambda_shrunk >= 5.5 {
        Trend::Elevated
    } else if estimate.lambda_shrunk <= 3.5 {
        Trend::Low
    } else {
        Trend::Moderate
    };

    MatchForecast {
        estimate,
        interval,
        markets,
        highlights,
        trend,
    }
}

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::context::{MatchContext, RefereeProfile};

/// Fallback league baseline when the scraped value is missing.
const LAMBDA_BASE_FALLBACK: f64 = 5.0;

/// Hard bounds on the expected card count. Matches outside this band are
/// not credible for the markets the engine prices.
const LAMBDA_MIN: f64 = 2.0;
const LAMBDA_MAX: f64 = 10.0;

/// Shrinkage weight bounds: never trust the raw estimate fully, never
/// discard it entirely.
const SHRINK_W_MIN: f64 = 0.3;
const SHRINK_W_MAX: f64 = 0.95;

/// Quality sub-score weights (sum 100).
const W_REFEREE_COMPLETENESS: f64 = 25.0;
const W_TEAM_COMPLETENESS: f64 = 20.0;
const W_REFEREE_SAMPLE: f64 = 20.0;
const W_TEAM_SAMPLE: f64 = 15.0;
const W_RECENCY: f64 = 10.0;
const W_COMPETITION: f64 = 10.0;

/// Negative Binomial dispersion (r) per competition. Smaller r means more
/// overdispersion. Estimated empirically; unmapped competitions fall back
/// to [`DISPERSION_DEFAULT`].
static LEAGUE_DISPERSION: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        // Brazil
        ("Brasileirão Série A", 3.0),
        ("Brasileirão Série B", 2.8),
        ("Copa do Brasil", 2.5),
        ("Série C Brasil", 2.6),
        ("Série D Brasil", 2.4),
        // Europe top 5
        ("Premier League", 4.0),
        ("La Liga", 3.5),
        ("LaLiga", 3.5),
        ("Bundesliga", 4.5),
        ("Serie A", 3.2),
        ("Ligue 1", 3.8),
        // European cups
        ("Champions League", 3.0),
        ("Europa League", 3.0),
        ("Conference League", 2.8),
        // South America
        ("Copa Libertadores", 2.3),
        ("Copa Sudamericana", 2.5),
        ("Primera División Argentina", 2.8),
        ("Primeira Liga Argentina", 2.8),
        // Others
        ("Championship", 3.5),
        ("Liga Portugal", 3.2),
    ])
});

const DISPERSION_DEFAULT: f64 = 3.0;

/// How well a competition is known to the dispersion table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeagueRecognition {
    Exact,
    Partial,
    Unmapped,
}

pub fn recognize_league(competition: &str) -> LeagueRecognition {
    if LEAGUE_DISPERSION.contains_key(competition) {
        return LeagueRecognition::Exact;
    }
    let lower = competition.to_lowercase();
    if LEAGUE_DISPERSION
        .keys()
        .any(|name| lower.contains(&name.to_lowercase()))
    {
        LeagueRecognition::Partial
    } else {
        LeagueRecognition::Unmapped
    }
}

/// Dispersion r for a competition: exact hit, then substring match in
/// either direction, then the global default.
pub fn league_dispersion(competition: &str) -> f64 {
    if let Some(r) = LEAGUE_DISPERSION.get(competition) {
        return *r;
    }
    let lower = competition.to_lowercase();
    for (name, r) in LEAGUE_DISPERSION.iter() {
        let n = name.to_lowercase();
        if lower.contains(&n) || n.contains(&lower) {
            return *r;
        }
    }
    DISPERSION_DEFAULT
}

/// 0-100 assessment of how much the input data can be trusted. Drives the
/// shrinkage weight and the quality block on extreme markets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQuality {
    pub total: f64,
    pub referee_completeness: f64,
    pub team_completeness: f64,
    pub referee_sample: f64,
    pub team_sample: f64,
    pub recency: f64,
    pub competition_recognition: f64,
    pub missing_fields: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn assess_quality(ctx: &MatchContext) -> DataQuality {
    let mut missing = Vec::new();
    let mut warnings = Vec::new();

    let referee = &ctx.referee;
    let mut referee_points: f64 = 0.0;
    let referee_fields = [
        (referee.avg_yellow_10, "referee: 10-game average"),
        (referee.avg_yellow_5, "referee: 5-game average"),
        (referee.avg_fouls_10, "referee: 10-game fouls"),
    ];
    for (value, field) in referee_fields {
        if value > 0.0 {
            referee_points += 100.0 / 3.0;
        } else {
            missing.push(field.to_string());
        }
    }
    let referee_completeness = referee_points.min(100.0);

    let mut team_points = 0.0;
    for (team, what, value) in [
        (&ctx.home, "yellows", ctx.home.yellow_for),
        (&ctx.home, "fouls", ctx.home.fouls_for),
        (&ctx.away, "yellows", ctx.away.yellow_for),
        (&ctx.away, "fouls", ctx.away.fouls_for),
    ] {
        if value > 0.0 {
            team_points += 25.0;
        } else {
            missing.push(format!("{}: {what}", team.name));
        }
    }
    let team_completeness = team_points;

    let referee_sample = match referee.games_available {
        n if n >= 10 => 100.0,
        n if n >= 5 => 70.0,
        n if n >= 3 => {
            warnings.push("small referee sample (<5 games)".to_string());
            40.0
        }
        _ => {
            warnings.push("very small referee sample (<3 games)".to_string());
            20.0
        }
    };

    let team_games = ctx.home.games_available.min(ctx.away.games_available);
    let team_sample = match team_games {
        n if n >= 5 => 100.0,
        n if n >= 3 => {
            warnings.push("small team sample (<5 games)".to_string());
            60.0
        }
        _ => {
            warnings.push("very small team sample (<3 games)".to_string());
            30.0
        }
    };

    // Differing 5- and 10-game windows means genuinely recent data.
    let recency = if referee.avg_yellow_5 > 0.0 && referee.avg_yellow_5 != referee.avg_yellow_10 {
        100.0
    } else if referee.avg_yellow_5 > 0.0 {
        70.0
    } else {
        warnings.push("limited recency data".to_string());
        30.0
    };

    let competition_recognition = match recognize_league(&ctx.league.competition) {
        LeagueRecognition::Exact => 100.0,
        LeagueRecognition::Partial => 70.0,
        LeagueRecognition::Unmapped => {
            warnings.push(format!("unmapped competition: {}", ctx.league.competition));
            40.0
        }
    };

    let total = referee_completeness * W_REFEREE_COMPLETENESS / 100.0
        + team_completeness * W_TEAM_COMPLETENESS / 100.0
        + referee_sample * W_REFEREE_SAMPLE / 100.0
        + team_sample * W_TEAM_SAMPLE / 100.0
        + recency * W_RECENCY / 100.0
        + competition_recognition * W_COMPETITION / 100.0;

    DataQuality {
        total,
        referee_completeness,
        team_completeness,
        referee_sample,
        team_sample,
        recency,
        competition_recognition,
        missing_fields: missing,
        warnings,
    }
}

/// Shrinkage weight w plus a human-readable rationale. w is the share of
/// the raw estimate kept in the blend λ_shrunk = w·λ_raw + (1-w)·λ_base.
pub fn shrinkage_weight(quality: &DataQuality, referee_games: u32) -> (f64, String) {
    let w_base = quality.total / 100.0;

    let sample_factor = match referee_games {
        n if n >= 10 => 1.0,
        n if n >= 7 => 0.9,
        n if n >= 5 => 0.75,
        n if n >= 3 => 0.5,
        _ => 0.3,
    };

    let completeness = (quality.referee_completeness + quality.team_completeness) / 200.0;
    let w = (w_base * sample_factor * (0.5 + 0.5 * completeness)).clamp(SHRINK_W_MIN, SHRINK_W_MAX);

    let mut reasons = Vec::new();
    if quality.total < 60.0 {
        reasons.push(format!("low data quality ({:.0}/100)", quality.total));
    }
    if referee_games < 5 {
        reasons.push(format!("few referee games ({referee_games})"));
    }
    if quality.referee_completeness < 70.0 {
        reasons.push("incomplete referee data".to_string());
    }
    if quality.team_completeness < 70.0 {
        reasons.push("incomplete team data".to_string());
    }

    let rationale = if reasons.is_empty() {
        if w >= 0.8 {
            "high confidence in the data".to_string()
        } else {
            "moderate confidence in the data".to_string()
        }
    } else {
        reasons.join(" | ")
    };

    (w, rationale)
}

/// Full trace of one lambda estimate. Immutable once built; every forecast
/// and validation snapshot carries one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaResult {
    pub lambda_base: f64,
    pub delta_referee: f64,
    pub delta_teams: f64,
    pub delta_recency: f64,
    pub lambda_raw: f64,
    pub shrink_weight: f64,
    pub shrink_rationale: String,
    pub lambda_shrunk: f64,

    // Intermediates, kept for reporting and factor derivation.
    pub referee_avg5: f64,
    pub referee_avg10: f64,
    pub weighted_referee_avg: f64,
    pub home_yellow: f64,
    pub away_yellow: f64,
    pub teams_sum: f64,
    pub recency_factor_raw: f64,
    pub recency_factor_capped: f64,

    pub model: String,
    pub dispersion_r: f64,
    pub model_rationale: String,
    pub quality: DataQuality,
}

/// Additive factor model with Bayesian-style shrinkage.
///
/// λ_raw = λ_base + Δ_referee + Δ_teams + Δ_recency, then blended toward
/// the league baseline with a weight driven by observed evidence volume
/// and completeness. Every division is pre-guarded by a documented
/// fallback; this path cannot fail.
pub fn estimate(ctx: &MatchContext) -> LambdaResult {
    let quality = assess_quality(ctx);

    // 1) League baseline.
    let lambda_base = if ctx.league.avg_yellow > 0.0 {
        ctx.league.avg_yellow
    } else {
        LAMBDA_BASE_FALLBACK
    };

    // 2) Referee delta, with symmetric fallback when one window is missing.
    let mut avg5 = ctx.referee.avg_yellow_5;
    let mut avg10 = ctx.referee.avg_yellow_10;
    if avg5 <= 0.0 {
        avg5 = avg10;
    }
    if avg10 <= 0.0 {
        avg10 = avg5;
    }
    if avg5 <= 0.0 {
        avg5 = lambda_base;
        avg10 = lambda_base;
    }
    let weighted_referee_avg = 0.6 * avg5 + 0.4 * avg10;
    let delta_referee = 0.8 * (weighted_referee_avg - lambda_base);

    // 3) Teams delta; a missing team rate defaults to half the baseline.
    let home_yellow = if ctx.home.yellow_for > 0.0 {
        ctx.home.yellow_for
    } else {
        lambda_base / 2.0
    };
    let away_yellow = if ctx.away.yellow_for > 0.0 {
        ctx.away.yellow_for
    } else {
        lambda_base / 2.0
    };
    let teams_sum = home_yellow + away_yellow;
    let delta_teams = 0.6 * (teams_sum - lambda_base);

    // 4) Recency, capped at ±5% of the baseline.
    let recency_factor_raw = if avg10 > 0.0 {
        1.0 + (avg5 - avg10) / avg10
    } else {
        1.0
    };
    let recency_factor_capped = recency_factor_raw.clamp(0.95, 1.05);
    let delta_recency = lambda_base * (recency_factor_capped - 1.0);

    // 5) Raw additive lambda.
    let lambda_raw =
        (lambda_base + delta_referee + delta_teams + delta_recency).clamp(LAMBDA_MIN, LAMBDA_MAX);

    // 6) Shrinkage toward the baseline.
    let (shrink_weight, shrink_rationale) =
        shrinkage_weight(&quality, ctx.referee.games_available);
    let lambda_shrunk = (shrink_weight * lambda_raw + (1.0 - shrink_weight) * lambda_base)
        .clamp(LAMBDA_MIN, LAMBDA_MAX);

    // 7) Dispersion, adjusted by referee profile and competition format.
    let mut dispersion_r = league_dispersion(&ctx.league.competition);
    match ctx.referee.profile {
        RefereeProfile::Strict => dispersion_r *= 0.85,
        RefereeProfile::Lenient => dispersion_r *= 1.1,
        RefereeProfile::Average => {}
    }

    let mut reasons = vec!["Negative Binomial captures card-count overdispersion".to_string()];
    if ctx.is_cup_competition() {
        dispersion_r *= 0.9;
        reasons.push("knockout tie: extra variance".to_string());
    }
    if quality.total < 50.0 {
        reasons.push("limited data: widened uncertainty".to_string());
    }

    LambdaResult {
        lambda_base,
        delta_referee,
        delta_teams,
        delta_recency,
        lambda_raw,
        shrink_weight,
        shrink_rationale,
        lambda_shrunk,
        referee_avg5: avg5,
        referee_avg10: avg10,
        weighted_referee_avg,
        home_yellow,
        away_yellow,
        teams_sum,
        recency_factor_raw,
        recency_factor_capped,
        model: "Negative Binomial".to_string(),
        dispersion_r,
        model_rationale: reasons.join(" | "),
        quality,
    }
}

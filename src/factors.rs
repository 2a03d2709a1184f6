//! Categorical context factors the rule miner searches over.
//!
//! Each factor is an enum key over a fixed typed record; generic
//! iteration goes through [`Factor::ALL`].

use serde::{Deserialize, Serialize};

use crate::context::{MatchContext, RefereeProfile};
use crate::distributions::ConfidenceInterval;
use crate::lambda::LambdaResult;

/// The 15 categorical factors a rule condition may select on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Factor {
    LambdaBand,
    RefereeProfile,
    CompetitionType,
    QualityBand,
    VarianceBand,
    ProbBand,
    RecentTrend,
    Region,
    RefereeDeltaBand,
    TeamsDeltaBand,
    ShrinkageWeightBand,
    RefereeAvg5Band,
    IntervalWidthBand,
    CompletenessBand,
    TeamsSumBand,
}

impl Factor {
    pub const ALL: [Factor; 15] = [
        Factor::LambdaBand,
        Factor::RefereeProfile,
        Factor::CompetitionType,
        Factor::QualityBand,
        Factor::VarianceBand,
        Factor::ProbBand,
        Factor::RecentTrend,
        Factor::Region,
        Factor::RefereeDeltaBand,
        Factor::TeamsDeltaBand,
        Factor::ShrinkageWeightBand,
        Factor::RefereeAvg5Band,
        Factor::IntervalWidthBand,
        Factor::CompletenessBand,
        Factor::TeamsSumBand,
    ];

    /// Short name used in rule descriptions.
    pub fn short_name(self) -> &'static str {
        match self {
            Factor::LambdaBand => "λ",
            Factor::RefereeProfile => "Referee",
            Factor::CompetitionType => "Type",
            Factor::QualityBand => "Quality",
            Factor::VarianceBand => "Variance",
            Factor::ProbBand => "Prob",
            Factor::RecentTrend => "Trend",
            Factor::Region => "Region",
            Factor::RefereeDeltaBand => "RefΔ",
            Factor::TeamsDeltaBand => "TeamsΔ",
            Factor::ShrinkageWeightBand => "Weight",
            Factor::RefereeAvg5Band => "Ref5",
            Factor::IntervalWidthBand => "Width",
            Factor::CompletenessBand => "Data",
            Factor::TeamsSumBand => "TeamsSum",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Band3 {
    Low,
    Medium,
    High,
}

impl Band3 {
    fn label(self) -> &'static str {
        match self {
            Band3::Low => "Low",
            Band3::Medium => "Medium",
            Band3::High => "High",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompetitionType {
    League,
    Cup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarianceBand {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecentTrend {
    Rising,
    Stable,
    Falling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    Brazil,
    Europe,
    Americas,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaBand {
    Negative,
    Neutral,
    Positive,
    VeryPositive,
}

impl DeltaBand {
    fn from_delta(delta: f64) -> Self {
        if delta < -0.5 {
            DeltaBand::Negative
        } else if delta <= 0.5 {
            DeltaBand::Neutral
        } else if delta <= 1.0 {
            DeltaBand::Positive
        } else {
            DeltaBand::VeryPositive
        }
    }

    fn label(self) -> &'static str {
        match self {
            DeltaBand::Negative => "Negative",
            DeltaBand::Neutral => "Neutral",
            DeltaBand::Positive => "Positive",
            DeltaBand::VeryPositive => "Very Positive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefereeAvgBand {
    Low,
    Medium,
    High,
    VeryHigh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WidthBand {
    Narrow,
    Medium,
    Wide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletenessBand {
    Incomplete,
    Partial,
    Complete,
}

/// Calibrated-probability bucket (percent). Derived from the live
/// probability at activation time, never from stored context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbBand {
    Below55,
    P55to60,
    P60to65,
    P65to70,
    P70to75,
    P75to80,
    P80Plus,
}

impl ProbBand {
    pub fn from_prob(p: f64) -> Self {
        if p < 55.0 {
            ProbBand::Below55
        } else if p < 60.0 {
            ProbBand::P55to60
        } else if p < 65.0 {
            ProbBand::P60to65
        } else if p < 70.0 {
            ProbBand::P65to70
        } else if p < 75.0 {
            ProbBand::P70to75
        } else if p < 80.0 {
            ProbBand::P75to80
        } else {
            ProbBand::P80Plus
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProbBand::Below55 => "<55",
            ProbBand::P55to60 => "55-60",
            ProbBand::P60to65 => "60-65",
            ProbBand::P65to70 => "65-70",
            ProbBand::P70to75 => "70-75",
            ProbBand::P75to80 => "75-80",
            ProbBand::P80Plus => "80+",
        }
    }
}

/// Typed values for every factor of one forecast. `None` means unknown;
/// the miner skips a record from any candidate group whose selected factor
/// is unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedFactors {
    pub lambda_band: Band3,
    pub referee_profile: RefereeProfile,
    pub competition_type: CompetitionType,
    pub quality_band: Band3,
    pub variance_band: VarianceBand,
    pub prob_band: Option<ProbBand>,
    pub recent_trend: Option<RecentTrend>,
    pub region: Region,
    pub referee_delta_band: DeltaBand,
    pub teams_delta_band: DeltaBand,
    pub shrinkage_weight_band: Band3,
    pub referee_avg5_band: RefereeAvgBand,
    pub interval_width_band: WidthBand,
    pub completeness_band: CompletenessBand,
    pub teams_sum_band: Band3,
}

const BRAZIL_TERMS: &[&str] = &[
    "brasileirão",
    "série",
    "copa do brasil",
    "paulista",
    "carioca",
    "mineiro",
    "gaúcho",
    "paranaense",
    "betano",
];

const EUROPE_TERMS: &[&str] = &[
    "premier",
    "la liga",
    "laliga",
    "bundesliga",
    "serie a",
    "ligue 1",
    "champions",
    "europa league",
    "eredivisie",
    "primeira liga",
];

const AMERICAS_TERMS: &[&str] = &[
    "libertadores",
    "sudamericana",
    "mls",
    "liga mx",
    "argentina",
    "copa america",
];

fn region_of(competition: &str) -> Region {
    let lower = competition.to_lowercase();
    if BRAZIL_TERMS.iter().any(|t| lower.contains(t)) {
        Region::Brazil
    } else if EUROPE_TERMS.iter().any(|t| lower.contains(t)) {
        Region::Europe
    } else if AMERICAS_TERMS.iter().any(|t| lower.contains(t)) {
        Region::Americas
    } else {
        Region::Other
    }
}

impl DerivedFactors {
    /// Derive every factor from a finished estimate. The probability band
    /// is left unknown here; it is per market, and set on the snapshot (or
    /// supplied live at rule activation).
    pub fn derive(
        ctx: &MatchContext,
        estimate: &LambdaResult,
        interval: &ConfidenceInterval,
    ) -> Self {
        let lambda_band = if estimate.lambda_shrunk < 4.0 {
            Band3::Low
        } else if estimate.lambda_shrunk <= 5.5 {
            Band3::Medium
        } else {
            Band3::High
        };

        let competition_type = if ctx.is_cup_competition() {
            CompetitionType::Cup
        } else {
            CompetitionType::League
        };

        let quality_band = if estimate.quality.total < 50.0 {
            Band3::Low
        } else if estimate.quality.total <= 70.0 {
            Band3::Medium
        } else {
            Band3::High
        };

        let width = interval.width();
        let variance_band = if width > 5 {
            VarianceBand::High
        } else {
            VarianceBand::Low
        };

        // Trend needs both raw referee windows, not the fallbacks.
        let recent_trend = if ctx.referee.avg_yellow_5 > 0.0 && ctx.referee.avg_yellow_10 > 0.0 {
            let diff = ctx.referee.avg_yellow_5 - ctx.referee.avg_yellow_10;
            Some(if diff > 0.5 {
                RecentTrend::Rising
            } else if diff < -0.5 {
                RecentTrend::Falling
            } else {
                RecentTrend::Stable
            })
        } else {
            None
        };

        let shrinkage_weight_band = if estimate.shrink_weight < 0.5 {
            Band3::Low
        } else if estimate.shrink_weight <= 0.7 {
            Band3::Medium
        } else {
            Band3::High
        };

        let referee_avg5_band = if estimate.referee_avg5 < 4.0 {
            RefereeAvgBand::Low
        } else if estimate.referee_avg5 <= 5.0 {
            RefereeAvgBand::Medium
        } else if estimate.referee_avg5 <= 6.0 {
            RefereeAvgBand::High
        } else {
            RefereeAvgBand::VeryHigh
        };

        let interval_width_band = if width <= 4 {
            WidthBand::Narrow
        } else if width <= 6 {
            WidthBand::Medium
        } else {
            WidthBand::Wide
        };

        let completeness_band = if estimate.quality.referee_completeness < 50.0 {
            CompletenessBand::Incomplete
        } else if estimate.quality.referee_completeness < 80.0 {
            CompletenessBand::Partial
        } else {
            CompletenessBand::Complete
        };

        let teams_sum_band = if estimate.teams_sum < 4.0 {
            Band3::Low
        } else if estimate.teams_sum <= 5.5 {
            Band3::Medium
        } else {
            Band3::High
        };

        DerivedFactors {
            lambda_band,
            referee_profile: ctx.referee.profile,
            competition_type,
            quality_band,
            variance_band,
            prob_band: None,
            recent_trend,
            region: region_of(&ctx.league.competition),
            referee_delta_band: DeltaBand::from_delta(estimate.delta_referee),
            teams_delta_band: DeltaBand::from_delta(estimate.delta_teams),
            shrinkage_weight_band,
            referee_avg5_band,
            interval_width_band,
            completeness_band,
            teams_sum_band,
        }
    }

    pub fn with_prob(mut self, calibrated_prob: f64) -> Self {
        self.prob_band = Some(ProbBand::from_prob(calibrated_prob));
        self
    }

    /// Stable label for one factor, `None` when unknown.
    pub fn get(&self, factor: Factor) -> Option<&'static str> {
        match factor {
            Factor::LambdaBand => Some(self.lambda_band.label()),
            Factor::RefereeProfile => Some(self.referee_profile.label()),
            Factor::CompetitionType => Some(match self.competition_type {
                CompetitionType::League => "League",
                CompetitionType::Cup => "Cup",
            }),
            Factor::QualityBand => Some(self.quality_band.label()),
            Factor::VarianceBand => Some(match self.variance_band {
                VarianceBand::Low => "Low",
                VarianceBand::High => "High",
            }),
            Factor::ProbBand => self.prob_band.map(ProbBand::label),
            Factor::RecentTrend => self.recent_trend.map(|t| match t {
                RecentTrend::Rising => "Rising",
                RecentTrend::Stable => "Stable",
                RecentTrend::Falling => "Falling",
            }),
            Factor::Region => Some(match self.region {
                Region::Brazil => "Brazil",
                Region::Europe => "Europe",
                Region::Americas => "Americas",
                Region::Other => "Other",
            }),
            Factor::RefereeDeltaBand => Some(self.referee_delta_band.label()),
            Factor::TeamsDeltaBand => Some(self.teams_delta_band.label()),
            Factor::ShrinkageWeightBand => Some(self.shrinkage_weight_band.label()),
            Factor::RefereeAvg5Band => Some(match self.referee_avg5_band {
                RefereeAvgBand::Low => "Low",
                RefereeAvgBand::Medium => "Medium",
                RefereeAvgBand::High => "High",
                RefereeAvgBand::VeryHigh => "Very High",
            }),
            Factor::IntervalWidthBand => Some(match self.interval_width_band {
                WidthBand::Narrow => "Narrow",
                WidthBand::Medium => "Medium",
                WidthBand::Wide => "Wide",
            }),
            Factor::CompletenessBand => Some(match self.completeness_band {
                CompletenessBand::Incomplete => "Incomplete",
                CompletenessBand::Partial => "Partial",
                CompletenessBand::Complete => "Complete",
            }),
            Factor::TeamsSumBand => Some(self.teams_sum_band.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{LeagueBaseline, RefereeStats, TeamStats};
    use crate::lambda;

    fn ctx() -> MatchContext {
        MatchContext {
            league: LeagueBaseline {
                competition: "Brasileirão Série A".to_string(),
                avg_yellow: 5.0,
                knockout: false,
            },
            referee: RefereeStats {
                name: "R".to_string(),
                avg_yellow_5: 6.4,
                avg_yellow_10: 5.5,
                avg_fouls_10: 26.0,
                games_available: 10,
                profile: RefereeProfile::Strict,
            },
            home: TeamStats {
                name: "H".to_string(),
                yellow_for: 2.8,
                fouls_for: 13.0,
                games_available: 5,
            },
            away: TeamStats {
                name: "A".to_string(),
                yellow_for: 3.0,
                fouls_for: 14.0,
                games_available: 5,
            },
        }
    }

    fn derived() -> DerivedFactors {
        let c = ctx();
        let est = lambda::estimate(&c);
        let ci = crate::distributions::percentiles(est.lambda_shrunk, est.dispersion_r, true);
        DerivedFactors::derive(&c, &est, &ci)
    }

    #[test]
    fn bands_match_the_boundaries() {
        let f = derived();
        assert_eq!(f.region, Region::Brazil);
        assert_eq!(f.competition_type, CompetitionType::League);
        assert_eq!(f.recent_trend, Some(RecentTrend::Rising));
        assert_eq!(f.referee_avg5_band, RefereeAvgBand::VeryHigh);
        assert_eq!(f.get(Factor::RefereeProfile), Some("Strict"));
    }

    #[test]
    fn delta_band_boundaries() {
        assert_eq!(DeltaBand::from_delta(-0.6), DeltaBand::Negative);
        assert_eq!(DeltaBand::from_delta(-0.5), DeltaBand::Neutral);
        assert_eq!(DeltaBand::from_delta(0.5), DeltaBand::Neutral);
        assert_eq!(DeltaBand::from_delta(0.51), DeltaBand::Positive);
        assert_eq!(DeltaBand::from_delta(1.0), DeltaBand::Positive);
        assert_eq!(DeltaBand::from_delta(1.01), DeltaBand::VeryPositive);
    }

    #[test]
    fn prob_band_buckets() {
        assert_eq!(ProbBand::from_prob(40.0).label(), "<55");
        assert_eq!(ProbBand::from_prob(55.0).label(), "55-60");
        assert_eq!(ProbBand::from_prob(64.9).label(), "60-65");
        assert_eq!(ProbBand::from_prob(79.9).label(), "75-80");
        assert_eq!(ProbBand::from_prob(80.0).label(), "80+");
    }

    #[test]
    fn unknown_factors_report_none() {
        let mut f = derived();
        assert_eq!(f.get(Factor::ProbBand), None);
        let with_prob = f.clone().with_prob(62.0);
        assert_eq!(with_prob.get(Factor::ProbBand), Some("60-65"));

        f.recent_trend = None;
        assert_eq!(f.get(Factor::RecentTrend), None);
    }

    #[test]
    fn every_factor_in_all_resolves_or_is_unknown() {
        let f = derived().with_prob(58.0);
        for factor in Factor::ALL {
            // Labels must be stable non-empty strings when present.
            if let Some(label) = f.get(factor) {
                assert!(!label.is_empty());
            }
        }
    }

    #[test]
    fn region_lists() {
        assert_eq!(region_of("Premier League"), Region::Europe);
        assert_eq!(region_of("Copa Libertadores"), Region::Americas);
        assert_eq!(region_of("Paulista A1"), Region::Brazil);
        assert_eq!(region_of("J-League"), Region::Other);
    }
}

use serde::{Deserialize, Serialize};

/// Card tendency profile for a referee, as classified upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefereeProfile {
    Strict,
    Average,
    Lenient,
}

impl RefereeProfile {
    pub fn label(self) -> &'static str {
        match self {
            RefereeProfile::Strict => "Strict",
            RefereeProfile::Average => "Average",
            RefereeProfile::Lenient => "Lenient",
        }
    }
}

/// Referee history as scraped upstream. A 0.0 average means the field was
/// missing on the source page; the estimator substitutes its fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefereeStats {
    pub name: String,
    /// Yellow cards per game over the last 5 games (0.0 = missing).
    pub avg_yellow_5: f64,
    /// Yellow cards per game over the last 10 games (0.0 = missing).
    pub avg_yellow_10: f64,
    /// Fouls per game over the last 10 games (0.0 = missing).
    pub avg_fouls_10: f64,
    /// Games actually present in the referee's history window.
    pub games_available: u32,
    pub profile: RefereeProfile,
}

/// Per-team card rates. 0.0 again means missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamStats {
    pub name: String,
    /// Yellow cards committed per game.
    pub yellow_for: f64,
    /// Fouls committed per game.
    pub fouls_for: f64,
    pub games_available: u32,
}

/// Competition baseline rates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueBaseline {
    pub competition: String,
    /// Historical yellow cards per game for the competition (0.0 = missing).
    pub avg_yellow: f64,
    /// Knockout-style competition (cups carry more variance).
    pub knockout: bool,
}

/// Everything the engine knows about one fixture. Built once by the
/// collaborator and treated as read-only from here on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchContext {
    pub league: LeagueBaseline,
    pub referee: RefereeStats,
    pub home: TeamStats,
    pub away: TeamStats,
}

impl MatchContext {
    /// True when the competition name contains a knockout/cup term. Used as
    /// a fallback when the upstream flag is absent.
    pub fn is_cup_competition(&self) -> bool {
        const CUP_TERMS: &[&str] = &[
            "copa",
            "cup",
            "taça",
            "taca",
            "libertadores",
            "sudamericana",
            "champions",
            "europa league",
            "conference",
        ];
        let name = self.league.competition.to_lowercase();
        self.league.knockout || CUP_TERMS.iter().any(|t| name.contains(t))
    }
}

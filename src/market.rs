use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketKind {
    Over,
    Under,
}

/// The seven card-count markets the engine prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    Over2_5,
    Over3_5,
    Over4_5,
    Over5_5,
    Under3_5,
    Under4_5,
    Under5_5,
}

impl Market {
    pub const ALL: [Market; 7] = [
        Market::Over2_5,
        Market::Over3_5,
        Market::Over4_5,
        Market::Over5_5,
        Market::Under3_5,
        Market::Under4_5,
        Market::Under5_5,
    ];

    pub fn kind(self) -> MarketKind {
        match self {
            Market::Over2_5 | Market::Over3_5 | Market::Over4_5 | Market::Over5_5 => {
                MarketKind::Over
            }
            Market::Under3_5 | Market::Under4_5 | Market::Under5_5 => MarketKind::Under,
        }
    }

    pub fn line(self) -> f64 {
        match self {
            Market::Over2_5 => 2.5,
            Market::Over3_5 | Market::Under3_5 => 3.5,
            Market::Over4_5 | Market::Under4_5 => 4.5,
            Market::Over5_5 | Market::Under5_5 => 5.5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Market::Over2_5 => "Over 2.5 Cards",
            Market::Over3_5 => "Over 3.5 Cards",
            Market::Over4_5 => "Over 4.5 Cards",
            Market::Over5_5 => "Over 5.5 Cards",
            Market::Under3_5 => "Under 3.5 Cards",
            Market::Under4_5 => "Under 4.5 Cards",
            Market::Under5_5 => "Under 5.5 Cards",
        }
    }

    /// Calibrated-probability threshold above which the market is
    /// highlighted. High Over lines demand more.
    pub fn highlight_threshold(self) -> f64 {
        match self {
            Market::Over4_5 => 58.0,
            Market::Over5_5 => 60.0,
            _ => 55.0,
        }
    }

    /// Whether the realized card count makes this market a hit.
    pub fn is_hit(self, cards: u32) -> bool {
        match self.kind() {
            MarketKind::Over => cards as f64 > self.line(),
            MarketKind::Under => (cards as f64) < self.line(),
        }
    }
}

//! Golden-rule mining: searching conjunctions of categorical context
//! factors for combinations with historically high hit rates.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::factors::{DerivedFactors, Factor, ProbBand};
use crate::market::Market;
use crate::store::ValidationRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleTier {
    Gold,
    Platinum,
    Diamond,
}

impl RuleTier {
    pub fn label(self) -> &'static str {
        match self {
            RuleTier::Gold => "Gold",
            RuleTier::Platinum => "Platinum",
            RuleTier::Diamond => "Diamond",
        }
    }
}

/// A discovered conjunction of factor values with enough support and a
/// high enough hit rate to surface. The rule set is replaced wholesale on
/// every retrain; rules are never mutated incrementally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: u32,
    pub market: Market,
    /// Conditions in factor-list order.
    pub conditions: Vec<(Factor, String)>,
    pub support: usize,
    pub hits: usize,
    /// Percent.
    pub hit_rate: f64,
    pub tier: RuleTier,
    pub description: String,
}

impl Rule {
    fn describe(&self) -> String {
        self.conditions
            .iter()
            .map(|(factor, value)| format!("{}={value}", factor.short_name()))
            .collect::<Vec<_>>()
            .join(" + ")
    }
}

/// Mining thresholds. `excluded_markets` is a business policy (markets
/// whose odds are too short to be worth surfacing), injected by the
/// caller rather than baked in.
#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub min_support: usize,
    pub gold_threshold: f64,
    pub platinum_threshold: f64,
    pub diamond_threshold: f64,
    pub excluded_markets: Vec<Market>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            min_support: 8,
            gold_threshold: 75.0,
            platinum_threshold: 85.0,
            diamond_threshold: 90.0,
            excluded_markets: vec![Market::Under5_5],
        }
    }
}

impl MinerConfig {
    fn tier(&self, hit_rate: f64) -> RuleTier {
        if hit_rate >= self.diamond_threshold {
            RuleTier::Diamond
        } else if hit_rate >= self.platinum_threshold {
            RuleTier::Platinum
        } else {
            RuleTier::Gold
        }
    }
}

/// All n-combinations of the factor list for n in 1..=3 (575 candidate
/// factor sets).
fn factor_combinations() -> Vec<Vec<Factor>> {
    let all = Factor::ALL;
    let mut out = Vec::new();
    for i in 0..all.len() {
        out.push(vec![all[i]]);
    }
    for i in 0..all.len() {
        for j in (i + 1)..all.len() {
            out.push(vec![all[i], all[j]]);
        }
    }
    for i in 0..all.len() {
        for j in (i + 1)..all.len() {
            for k in (j + 1)..all.len() {
                out.push(vec![all[i], all[j], all[k]]);
            }
        }
    }
    out
}

fn is_subset(smaller: &[(Factor, String)], larger: &[(Factor, String)]) -> bool {
    smaller
        .iter()
        .all(|(factor, value)| larger.iter().any(|(f, v)| f == factor && v == value))
}

/// Keep the most specific version of overlapping rules: candidates are
/// walked in descending condition count, and a candidate is dropped when
/// its condition set is a subset of an already-accepted rule's. Acceptance
/// is order-dependent within a specificity tier; that ordering is part of
/// the observable behavior and is pinned by tests.
fn filter_subsumed(mut rules: Vec<Rule>) -> Vec<Rule> {
    rules.sort_by_key(|r| std::cmp::Reverse(r.conditions.len()));

    let mut accepted: Vec<Rule> = Vec::new();
    for rule in rules {
        let redundant = accepted
            .iter()
            .any(|a| is_subset(&rule.conditions, &a.conditions));
        if !redundant {
            accepted.push(rule);
        }
    }
    accepted
}

fn mine_market(market: Market, records: &[&ValidationRecord], config: &MinerConfig) -> Vec<Rule> {
    let mut rules = Vec::new();

    for combo in factor_combinations() {
        let mut groups: HashMap<Vec<&'static str>, Vec<&ValidationRecord>> = HashMap::new();

        'records: for record in records {
            let mut key = Vec::with_capacity(combo.len());
            for &factor in &combo {
                match record.factors.get(factor) {
                    Some(value) => key.push(value),
                    // Unknown factor value: the record cannot vote on
                    // this candidate.
                    None => continue 'records,
                }
            }
            groups.entry(key).or_default().push(record);
        }

        for (key, group) in groups {
            if group.len() < config.min_support {
                continue;
            }
            let hits = group.iter().filter(|r| r.hit).count();
            let hit_rate = hits as f64 / group.len() as f64 * 100.0;
            if hit_rate < config.gold_threshold {
                continue;
            }

            let conditions: Vec<(Factor, String)> = combo
                .iter()
                .zip(&key)
                .map(|(&factor, &value)| (factor, value.to_string()))
                .collect();

            rules.push(Rule {
                id: 0,
                market,
                conditions,
                support: group.len(),
                hits,
                hit_rate,
                tier: config.tier(hit_rate),
                description: String::new(),
            });
        }
    }

    filter_subsumed(rules)
}

/// Mine the full corpus. Markets are mined independently (in parallel);
/// the merge, ranking, and id assignment stay single-threaded.
pub fn mine(records: &[ValidationRecord], config: &MinerConfig) -> Vec<Rule> {
    let mut by_market: HashMap<Market, Vec<&ValidationRecord>> = HashMap::new();
    for record in records {
        by_market.entry(record.market).or_default().push(record);
    }

    let jobs: Vec<(Market, Vec<&ValidationRecord>)> = Market::ALL
        .into_iter()
        .filter(|m| !config.excluded_markets.contains(m))
        .filter_map(|m| by_market.remove(&m).map(|recs| (m, recs)))
        .filter(|(_, recs)| recs.len() >= config.min_support)
        .collect();

    let mut all: Vec<Rule> = jobs
        .par_iter()
        .map(|(market, recs)| mine_market(*market, recs, config))
        .flatten()
        .collect();

    all.sort_by(|a, b| {
        b.hit_rate
            .total_cmp(&a.hit_rate)
            .then_with(|| b.support.cmp(&a.support))
    });

    for (i, rule) in all.iter_mut().enumerate() {
        rule.id = i as u32 + 1;
        rule.description = rule.describe();
    }

    debug!(rules = all.len(), records = records.len(), "mining pass done");
    all
}

/// Rules of `market` whose every condition matches the live context. The
/// probability band is derived from the live calibrated probability, not
/// from stored context data. Returned ordered by hit rate descending.
pub fn active_rules<'a>(
    rules: &'a [Rule],
    market: Market,
    factors: &DerivedFactors,
    calibrated_prob: f64,
) -> Vec<&'a Rule> {
    let live_band = ProbBand::from_prob(calibrated_prob).label();

    let mut active: Vec<&Rule> = rules
        .iter()
        .filter(|rule| rule.market == market)
        .filter(|rule| {
            rule.conditions.iter().all(|(factor, expected)| {
                let actual = if *factor == Factor::ProbBand {
                    Some(live_band)
                } else {
                    factors.get(*factor)
                };
                actual == Some(expected.as_str())
            })
        })
        .collect();

    active.sort_by(|a, b| b.hit_rate.total_cmp(&a.hit_rate));
    active
}

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::calibration::CalibrationManager;
use crate::context::MatchContext;
use crate::factors::DerivedFactors;
use crate::forecast::MatchForecast;
use crate::market::Market;
use crate::rules::{self, MinerConfig, Rule};

const STORE_VERSION: u32 = 1;

/// One validated market outcome: the context snapshot reduced to its
/// categorical factors, the forecast that was made, and what actually
/// happened. Append-only and immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub recorded_at: DateTime<Utc>,
    pub competition: String,
    pub home: String,
    pub away: String,
    pub market: Market,
    pub raw_prob: f64,
    pub calibrated_prob: f64,
    pub highlight: bool,
    pub actual_cards: u32,
    pub hit: bool,
    pub lambda_shrunk: f64,
    pub quality_score: f64,
    pub factors: DerivedFactors,
}

impl ValidationRecord {
    /// Snapshot one market of a finished forecast against the realized
    /// card count. Returns `None` when the forecast never priced the
    /// market (cannot happen for the seven standard markets).
    pub fn from_outcome(
        ctx: &MatchContext,
        forecast: &MatchForecast,
        market: Market,
        actual_cards: u32,
    ) -> Option<Self> {
        let priced = forecast.market(market)?;
        let interval = &forecast.interval;
        let factors = DerivedFactors::derive(ctx, &forecast.estimate, interval)
            .with_prob(priced.calibrated_prob);

        Some(ValidationRecord {
            recorded_at: Utc::now(),
            competition: ctx.league.competition.clone(),
            home: ctx.home.name.clone(),
            away: ctx.away.name.clone(),
            market,
            raw_prob: priced.raw_prob,
            calibrated_prob: priced.calibrated_prob,
            highlight: priced.highlight,
            actual_cards,
            hit: market.is_hit(actual_cards),
            lambda_shrunk: forecast.estimate.lambda_shrunk,
            quality_score: forecast.estimate.quality.total,
            factors,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    records: Vec<ValidationRecord>,
    rules: Vec<Rule>,
}

/// Durable repository of validation outcomes and the current rule set.
///
/// Loads on open, saves explicitly, retrains as a full recomputation:
/// subsumption filtering must see the whole candidate set, so incremental
/// rule addition is never attempted. Mutating calls assume a single
/// writer.
#[derive(Debug)]
pub struct LearningStore {
    path: PathBuf,
    records: Vec<ValidationRecord>,
    rules: Vec<Rule>,
}

impl LearningStore {
    /// Open the store at `path`, loading any persisted state. A missing
    /// file is an empty store; an unreadable or version-mismatched file is
    /// reset to empty with a warning, never an error to the caller.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (records, rules) = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<StoreFile>(&raw) {
                Ok(file) if file.version == STORE_VERSION => (file.records, file.rules),
                Ok(file) => {
                    warn!(
                        found = file.version,
                        expected = STORE_VERSION,
                        "learning store version mismatch, resetting"
                    );
                    (Vec::new(), Vec::new())
                }
                Err(err) => {
                    warn!(%err, path = %path.display(), "corrupt learning store, resetting");
                    (Vec::new(), Vec::new())
                }
            },
            Err(_) => (Vec::new(), Vec::new()),
        };

        LearningStore {
            path,
            records,
            rules,
        }
    }

    pub fn records(&self) -> &[ValidationRecord] {
        &self.records
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn records_per_market(&self) -> HashMap<Market, usize> {
        let mut counts = HashMap::new();
        for r in &self.records {
            *counts.entry(r.market).or_insert(0) += 1;
        }
        counts
    }

    /// Append a validated outcome and feed the matching calibrator. Does
    /// not retrain or persist; both are explicit.
    pub fn add(&mut self, record: ValidationRecord, calibration: &mut CalibrationManager) {
        calibration.record(record.market, record.raw_prob, record.hit);
        self.records.push(record);
    }

    /// Full retrain: rebuild every calibrator's bins from its accumulated
    /// observations, re-mine the whole corpus, atomically replace the rule
    /// set, and persist the store. The calibration manager is persisted
    /// separately via [`CalibrationManager::save`].
    pub fn retrain(
        &mut self,
        calibration: &mut CalibrationManager,
        config: &MinerConfig,
    ) -> Result<()> {
        calibration.train_all();
        self.rules = rules::mine(&self.records, config);
        debug!(
            records = self.records.len(),
            rules = self.rules.len(),
            "retrain complete"
        );
        self.save()
    }

    /// Persist atomically (tmp file + rename).
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let file = StoreFile {
            version: STORE_VERSION,
            records: self.records.clone(),
            rules: self.rules.clone(),
        };
        let json = serde_json::to_string(&file).context("serialize learning store")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).context("write learning store")?;
        fs::rename(&tmp, &self.path).context("swap learning store")?;
        Ok(())
    }
}

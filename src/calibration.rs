//! Empirical probability calibration.
//!
//! Each market owns an independent calibrator that maps the model's raw
//! probability to the hit-rate actually observed at that confidence level.
//! Training groups observations into 5-point bins and applies one
//! monotonicity smoothing pass over ascending bins. That single pass is a
//! deliberate approximation of isotonic regression: violations spanning
//! more than one adjacent pair can survive it, and the behavior is pinned
//! by tests rather than upgraded to a full pool-adjacent-violators fit.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::market::Market;

/// Pooled observations required before a trained bin overrides the raw
/// probability.
pub const MIN_OBSERVATIONS: usize = 10;

/// Bin width in probability points.
const BIN_WIDTH: f64 = 5.0;

const CALIBRATION_VERSION: u32 = 1;

fn bin_of(raw: f64) -> u32 {
    ((raw.clamp(0.0, 100.0) / BIN_WIDTH) as u32) * BIN_WIDTH as u32
}

/// One market's calibration state: the raw (probability, outcome)
/// observations plus the step function derived from them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Calibrator {
    observations: Vec<(f64, bool)>,
    bins: Option<BTreeMap<u32, f64>>,
    trained: bool,
}

impl Calibrator {
    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    /// Append one validated outcome. Does not retrain; call [`train`]
    /// explicitly so rebuilds stay reproducible.
    pub fn record(&mut self, raw_prob: f64, hit: bool) {
        self.observations.push((raw_prob, hit));
        self.trained = false;
    }

    /// Rebuild the bin map from scratch. Below [`MIN_OBSERVATIONS`] the
    /// calibrator stays an identity mapping.
    pub fn train(&mut self) {
        if self.observations.len() < MIN_OBSERVATIONS {
            self.bins = None;
            self.trained = true;
            return;
        }

        let mut grouped: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
        for &(raw, hit) in &self.observations {
            grouped
                .entry(bin_of(raw))
                .or_default()
                .push(if hit { 1.0 } else { 0.0 });
        }

        let mut bins: BTreeMap<u32, f64> = grouped
            .into_iter()
            .map(|(k, hits)| {
                let rate = hits.iter().sum::<f64>() / hits.len() as f64 * 100.0;
                (k, rate)
            })
            .collect();

        // One ascending smoothing pass: average any adjacent pair where the
        // calibrated value decreases as raw probability increases.
        let keys: Vec<u32> = bins.keys().copied().collect();
        for pair in keys.windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            if bins[&cur] < bins[&prev] {
                let mid = (bins[&cur] + bins[&prev]) / 2.0;
                bins.insert(prev, mid);
                bins.insert(cur, mid);
            }
        }

        self.bins = Some(bins);
        self.trained = true;
    }

    /// Map a raw probability through the trained step function. Trains
    /// lazily when stale; identity when the sample is too small; linear
    /// interpolation between neighbouring bins when the exact bin holds no
    /// observations, clamped at the trained range ends.
    pub fn calibrate(&mut self, raw_prob: f64) -> f64 {
        if !self.trained {
            self.train();
        }
        let Some(bins) = &self.bins else {
            return raw_prob;
        };

        let bin = bin_of(raw_prob);
        if let Some(v) = bins.get(&bin) {
            return *v;
        }

        let first = bins.iter().next();
        let last = bins.iter().next_back();
        match (first, last) {
            (Some((&lo, &lo_v)), Some((&hi, &hi_v))) => {
                if bin < lo {
                    lo_v
                } else if bin > hi {
                    hi_v
                } else {
                    let below = bins.range(..=bin).next_back();
                    let above = bins.range(bin..).next();
                    match (below, above) {
                        (Some((&k0, &v0)), Some((&k1, &v1))) if k1 > k0 => {
                            let t = (bin - k0) as f64 / (k1 - k0) as f64;
                            (1.0 - t) * v0 + t * v1
                        }
                        _ => raw_prob,
                    }
                }
            }
            _ => raw_prob,
        }
    }

    pub fn bins(&self) -> Option<&BTreeMap<u32, f64>> {
        self.bins.as_ref()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CalibrationEntry {
    market: Market,
    state: Calibrator,
}

#[derive(Debug, Serialize, Deserialize)]
struct CalibrationFile {
    version: u32,
    markets: Vec<CalibrationEntry>,
}

/// Owns one [`Calibrator`] per supported market. Constructor-injected into
/// the forecast path; no process-wide instance exists. Mutating calls
/// assume a single writer (wrap in a mutex when pipelines run
/// concurrently).
#[derive(Debug, Clone)]
pub struct CalibrationManager {
    calibrators: HashMap<Market, Calibrator>,
}

impl Default for CalibrationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationManager {
    pub fn new() -> Self {
        let calibrators = Market::ALL
            .into_iter()
            .map(|m| (m, Calibrator::default()))
            .collect();
        Self { calibrators }
    }

    /// Load persisted state, falling back to a fresh manager when the file
    /// is missing, unreadable, or from another schema version.
    pub fn load(path: &Path) -> Self {
        let mut manager = Self::new();
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return manager,
        };
        let file = match serde_json::from_str::<CalibrationFile>(&raw) {
            Ok(file) if file.version == CALIBRATION_VERSION => file,
            Ok(file) => {
                warn!(
                    found = file.version,
                    expected = CALIBRATION_VERSION,
                    "calibration file version mismatch, starting fresh"
                );
                return manager;
            }
            Err(err) => {
                warn!(%err, path = %path.display(), "unreadable calibration file, starting fresh");
                return manager;
            }
        };
        for entry in file.markets {
            manager.calibrators.insert(entry.market, entry.state);
        }
        manager
    }

    /// Persist all markets atomically (tmp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let mut markets: Vec<CalibrationEntry> = self
            .calibrators
            .iter()
            .map(|(market, state)| CalibrationEntry {
                market: *market,
                state: state.clone(),
            })
            .collect();
        markets.sort_by_key(|e| e.market.label());

        let file = CalibrationFile {
            version: CALIBRATION_VERSION,
            markets,
        };
        let json = serde_json::to_string(&file).context("serialize calibration state")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).context("write calibration state")?;
        fs::rename(&tmp, path).context("swap calibration state")?;
        Ok(())
    }

    pub fn record(&mut self, market: Market, raw_prob: f64, hit: bool) {
        if let Some(c) = self.calibrators.get_mut(&market) {
            c.record(raw_prob, hit);
        }
    }

    pub fn calibrate(&mut self, market: Market, raw_prob: f64) -> f64 {
        match self.calibrators.get_mut(&market) {
            Some(c) => c.calibrate(raw_prob),
            None => raw_prob,
        }
    }

    pub fn train_all(&mut self) {
        for c in self.calibrators.values_mut() {
            c.train();
        }
    }

    pub fn observation_count(&self, market: Market) -> usize {
        self.calibrators
            .get(&market)
            .map_or(0, Calibrator::observation_count)
    }

    pub fn calibrator(&self, market: Market) -> Option<&Calibrator> {
        self.calibrators.get(&market)
    }
}

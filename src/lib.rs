//! Card-count forecasting engine for football matches.
//!
//! The pipeline: a collaborator supplies a [`context::MatchContext`],
//! [`lambda::estimate`] turns it into an expected card count with a
//! data-quality score, [`forecast::forecast_match`] produces per-market
//! probabilities (calibrated through [`calibration::CalibrationManager`])
//! plus a confidence interval. Once the real card count is known the
//! collaborator submits a [`store::ValidationRecord`]; on retrain the
//! [`store::LearningStore`] rebuilds the calibration bins and re-mines the
//! golden-rule set with [`rules`].
//!
//! Everything is synchronous and fail-soft: degenerate numeric inputs fall
//! back to documented defaults, so a (degraded-confidence) forecast is
//! always producible.

pub mod calibration;
pub mod context;
pub mod distributions;
pub mod factors;
pub mod forecast;
pub mod lambda;
pub mod market;
pub mod rules;
pub mod store;

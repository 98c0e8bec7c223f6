//! Feature Series
//!
//! Pre-cleaned per-day market features consumed by the trading environment.

pub mod feature;

pub use feature::{FeatureRow, FeatureSeries, FEATURE_COLUMNS};

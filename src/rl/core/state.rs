//! State Representation
//!
//! Turns feature rows plus the portfolio into the fixed-length observation
//! vector the agent sees. Market columns go through a min-max scaler fitted
//! once per environment; the portfolio adds a cash ratio and a normalized
//! share count.

use serde::{Deserialize, Serialize};

use crate::data::{FeatureRow, FeatureSeries};
use crate::error::{DqnError, Result};
use crate::rl::config::StateConfig;

/// Which rows of the supplied series the scaler is fitted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerFit {
    /// Every row supplied at construction
    FullSeries,
    /// Only the first `n` rows (clamped to the series length)
    Prefix(usize),
}

impl Default for ScalerFit {
    fn default() -> Self {
        Self::FullSeries
    }
}

/// Per-column min-max transform onto `[range_min, range_max]`.
///
/// Constant columns map to `range_min`. Values outside the fitted range are
/// not clipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub data_min: Vec<f64>,
    pub data_max: Vec<f64>,
    pub range_min: f64,
    pub range_max: f64,
}

impl MinMaxScaler {
    /// Fit onto `[-1, 1]`
    pub fn fit<'a, I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        Self::fit_range(rows, -1.0, 1.0)
    }

    pub fn fit_range<'a, I>(rows: I, range_min: f64, range_max: f64) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [f64]>,
    {
        if range_min >= range_max {
            return Err(DqnError::Validation(format!(
                "scaler range [{range_min}, {range_max}] is empty"
            )));
        }

        let mut iter = rows.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| DqnError::Validation("cannot fit scaler on zero rows".to_string()))?;
        let mut data_min = first.to_vec();
        let mut data_max = first.to_vec();

        for row in iter {
            if row.len() != data_min.len() {
                return Err(DqnError::Validation(format!(
                    "scaler row width {} != {}",
                    row.len(),
                    data_min.len()
                )));
            }
            for (i, &v) in row.iter().enumerate() {
                data_min[i] = data_min[i].min(v);
                data_max[i] = data_max[i].max(v);
            }
        }

        Ok(Self {
            data_min,
            data_max,
            range_min,
            range_max,
        })
    }

    pub fn n_features(&self) -> usize {
        self.data_min.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_min.len() != self.data_max.len() {
            return Err(DqnError::Validation(
                "scaler min/max widths differ".to_string(),
            ));
        }
        if self
            .data_min
            .iter()
            .zip(&self.data_max)
            .any(|(lo, hi)| !lo.is_finite() || !hi.is_finite() || lo > hi)
        {
            return Err(DqnError::Validation("scaler bounds are invalid".to_string()));
        }
        Ok(())
    }

    /// Scale one row
    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.n_features() {
            return Err(DqnError::Validation(format!(
                "scaler expects {} features, got {}",
                self.n_features(),
                row.len()
            )));
        }

        let span = self.range_max - self.range_min;
        Ok(row
            .iter()
            .zip(self.data_min.iter().zip(&self.data_max))
            .map(|(&v, (&lo, &hi))| {
                let range = hi - lo;
                let range = if range == 0.0 { 1.0 } else { range };
                (v - lo) / range * span + self.range_min
            })
            .collect())
    }
}

/// Builds observation vectors for one environment.
///
/// Layout: `window` scaled market rows (oldest first), then
/// `(cash / starting_balance) * 2 - 1`, then `shares / share_normalization`.
#[derive(Debug, Clone)]
pub struct ObservationEncoder {
    config: StateConfig,
    scaler: MinMaxScaler,
}

impl ObservationEncoder {
    /// Fit a fresh scaler over the rows selected by `config.scaler_fit`
    pub fn fit(series: &FeatureSeries, config: &StateConfig) -> Result<Self> {
        let fit_rows = match config.scaler_fit {
            ScalerFit::FullSeries => series.len(),
            ScalerFit::Prefix(n) => n.min(series.len()),
        };
        let columns: Vec<Vec<f64>> = series.rows()[..fit_rows]
            .iter()
            .map(|row| Self::market_columns(row, config.include_index_return))
            .collect();
        let scaler = MinMaxScaler::fit(columns.iter().map(Vec::as_slice))?;

        Ok(Self {
            config: config.clone(),
            scaler,
        })
    }

    /// Reuse a scaler fitted elsewhere (e.g. stored in a checkpoint)
    pub fn with_scaler(config: &StateConfig, scaler: MinMaxScaler) -> Result<Self> {
        scaler.validate()?;
        if scaler.n_features() != config.market_columns() {
            return Err(DqnError::Validation(format!(
                "scaler has {} columns but the observation uses {}",
                scaler.n_features(),
                config.market_columns()
            )));
        }
        Ok(Self {
            config: config.clone(),
            scaler,
        })
    }

    /// Raw market columns used by the observation
    pub fn market_columns(row: &FeatureRow, include_index_return: bool) -> Vec<f64> {
        let mut columns = vec![
            row.close_price,
            row.moving_avg,
            row.momentum_index,
            row.sentiment_score,
        ];
        if include_index_return {
            columns.push(row.index_return);
        }
        columns
    }

    pub fn scaler(&self) -> &MinMaxScaler {
        &self.scaler
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    pub fn output_dim(&self) -> usize {
        self.config.observation_dim()
    }

    /// Encode the observation for the cursor at `step`
    pub fn encode(
        &self,
        series: &FeatureSeries,
        step: usize,
        cash: f64,
        shares: u64,
        starting_balance: f64,
    ) -> Result<Vec<f64>> {
        let window = self.config.window();
        if step + 1 < window || step >= series.len() {
            return Err(DqnError::Validation(format!(
                "step {step} has no full window of {window} rows in a series of {}",
                series.len()
            )));
        }

        let mut obs = Vec::with_capacity(self.output_dim());
        for row in &series.rows()[step + 1 - window..=step] {
            let raw = Self::market_columns(row, self.config.include_index_return);
            obs.extend(self.scaler.transform(&raw)?);
        }
        obs.push((cash / starting_balance) * 2.0 - 1.0);
        obs.push(shares as f64 / self.config.share_normalization);

        Ok(obs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(closes: &[f64]) -> FeatureSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        FeatureSeries::from_prices(start, closes).unwrap()
    }

    #[test]
    fn test_scaler_maps_to_unit_range() {
        let rows = [vec![0.0, 10.0], vec![5.0, 10.0], vec![10.0, 10.0]];
        let scaler = MinMaxScaler::fit(rows.iter().map(Vec::as_slice)).unwrap();

        assert_eq!(scaler.transform(&[0.0, 10.0]).unwrap(), vec![-1.0, -1.0]);
        assert_eq!(scaler.transform(&[5.0, 10.0]).unwrap(), vec![0.0, -1.0]);
        assert_eq!(scaler.transform(&[10.0, 10.0]).unwrap(), vec![1.0, -1.0]);
        // Out of range values are not clipped
        assert_eq!(scaler.transform(&[20.0, 10.0]).unwrap()[0], 3.0);
    }

    #[test]
    fn test_scaler_rejects_wrong_width() {
        let rows = [vec![0.0, 1.0]];
        let scaler = MinMaxScaler::fit(rows.iter().map(Vec::as_slice)).unwrap();
        assert!(scaler.transform(&[1.0]).is_err());
    }

    #[test]
    fn test_encode_layout() {
        let s = series(&[100.0, 110.0, 105.0]);
        let encoder = ObservationEncoder::fit(&s, &StateConfig::default()).unwrap();

        let obs = encoder.encode(&s, 1, 100_000.0, 0, 100_000.0).unwrap();
        assert_eq!(obs.len(), encoder.output_dim());
        // close=110 is the max of the series
        assert_eq!(obs[0], 1.0);
        // cash ratio at full balance and zero shares
        assert_eq!(obs[4], 1.0);
        assert_eq!(obs[5], 0.0);

        let obs = encoder.encode(&s, 0, 50_000.0, 500, 100_000.0).unwrap();
        assert_eq!(obs[0], -1.0);
        assert_eq!(obs[4], 0.0);
        assert_eq!(obs[5], 0.5);
    }

    #[test]
    fn test_prefix_fit_ignores_later_rows() {
        let s = series(&[100.0, 110.0, 200.0]);
        let config = StateConfig {
            scaler_fit: ScalerFit::Prefix(2),
            ..Default::default()
        };
        let encoder = ObservationEncoder::fit(&s, &config).unwrap();
        assert_eq!(encoder.scaler().data_max[0], 110.0);

        let obs = encoder.encode(&s, 2, 1.0, 0, 1.0).unwrap();
        assert!(obs[0] > 1.0);
    }

    #[test]
    fn test_windowed_encode() {
        let s = series(&[1.0, 2.0, 3.0, 4.0]);
        let config = StateConfig {
            feature_window_length: Some(3),
            include_index_return: true,
            ..Default::default()
        };
        let encoder = ObservationEncoder::fit(&s, &config).unwrap();
        assert_eq!(encoder.output_dim(), 17);

        assert!(encoder.encode(&s, 1, 1.0, 0, 1.0).is_err());
        let obs = encoder.encode(&s, 3, 1.0, 0, 1.0).unwrap();
        assert_eq!(obs.len(), 17);
        // Oldest row of the window first: close 2.0 on a 1..4 range
        assert!((obs[0] - (-1.0 / 3.0)).abs() < 1e-12);
        assert_eq!(obs[10], 1.0);
    }

    #[test]
    fn test_with_scaler_checks_width() {
        let s = series(&[1.0, 2.0]);
        let encoder = ObservationEncoder::fit(&s, &StateConfig::default()).unwrap();
        let wide = StateConfig {
            include_index_return: true,
            ..Default::default()
        };
        assert!(ObservationEncoder::with_scaler(&wide, encoder.scaler().clone()).is_err());
        assert!(
            ObservationEncoder::with_scaler(&StateConfig::default(), encoder.scaler().clone())
                .is_ok()
        );
    }
}

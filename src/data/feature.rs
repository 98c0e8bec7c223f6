//! Feature rows and the validated, date-ordered series that feeds the environment.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

use crate::error::{DqnError, Result};

/// CSV column names, in canonical order
pub const FEATURE_COLUMNS: [&str; 6] = [
    "date",
    "close_price",
    "moving_avg",
    "momentum_index",
    "sentiment_score",
    "index_return",
];

/// One trading day of market features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Trading day
    pub date: NaiveDate,
    /// Closing price
    pub close_price: f64,
    /// Moving average of the close (e.g. SMA-14)
    pub moving_avg: f64,
    /// Momentum oscillator (e.g. RSI-14)
    pub momentum_index: f64,
    /// Daily news sentiment score
    pub sentiment_score: f64,
    /// Daily return of the reference market index
    pub index_return: f64,
}

impl FeatureRow {
    fn values(&self) -> [f64; 5] {
        [
            self.close_price,
            self.moving_avg,
            self.momentum_index,
            self.sentiment_score,
            self.index_return,
        ]
    }
}

/// Non-empty feature rows with strictly increasing dates.
///
/// Construction is the only place validation happens, so every
/// `FeatureSeries` in the program is safe to simulate over.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSeries {
    rows: Vec<FeatureRow>,
}

impl FeatureSeries {
    /// Validate and wrap rows
    pub fn new(rows: Vec<FeatureRow>) -> Result<Self> {
        if rows.is_empty() {
            return Err(DqnError::InvalidData("feature series is empty".to_string()));
        }

        for (i, row) in rows.iter().enumerate() {
            if row.values().iter().any(|v| !v.is_finite()) {
                return Err(DqnError::InvalidData(format!(
                    "row {} ({}) contains non-finite values",
                    i, row.date
                )));
            }
            if row.close_price <= 0.0 {
                return Err(DqnError::InvalidData(format!(
                    "row {} ({}) has non-positive close_price {}",
                    i, row.date, row.close_price
                )));
            }
        }

        if let Some(pair) = rows.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(DqnError::InvalidData(format!(
                "dates must be strictly increasing: {} followed by {}",
                pair[0].date, pair[1].date
            )));
        }

        Ok(Self { rows })
    }

    /// Build a series from bare closing prices on consecutive calendar days.
    ///
    /// Indicator columns mirror the close (moving average = close, neutral
    /// momentum of 50, zero sentiment and index return).
    pub fn from_prices(start: NaiveDate, closes: &[f64]) -> Result<Self> {
        let mut rows = Vec::with_capacity(closes.len());
        for (i, &close) in closes.iter().enumerate() {
            let date = start
                .checked_add_days(Days::new(i as u64))
                .ok_or_else(|| DqnError::InvalidData("date overflow".to_string()))?;
            rows.push(FeatureRow {
                date,
                close_price: close,
                moving_avg: close,
                momentum_index: 50.0,
                sentiment_score: 0.0,
                index_return: 0.0,
            });
        }
        Self::new(rows)
    }

    /// Load from a CSV file with a header row naming the columns
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let series = Self::from_reader(BufReader::new(file))?;
        info!(
            "Loaded {} feature rows from {} ({} .. {})",
            series.len(),
            path.display(),
            series.first().date,
            series.last().date
        );
        Ok(series)
    }

    /// Parse CSV content.
    ///
    /// Column order is taken from the header. Empty sentiment or index
    /// return cells are read as 0; any other missing or unparsable cell is
    /// an error.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = reader.lines();

        let header = match lines.next() {
            Some(line) => line?,
            None => return Err(DqnError::InvalidData("CSV input is empty".to_string())),
        };
        let columns = ColumnIndex::from_header(&header)?;

        let mut rows = Vec::new();
        for (i, line) in lines.enumerate() {
            let line = line?;
            let line_no = i + 2;
            if line.trim().is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            rows.push(columns.parse_row(&parts, line_no)?);
        }

        Self::new(rows)
    }

    /// Split into rows dated before `date` and rows dated on/after it
    pub fn split_at(&self, date: NaiveDate) -> Result<(Self, Self)> {
        let idx = self.rows.partition_point(|r| r.date < date);
        let train = Self::new(self.rows[..idx].to_vec()).map_err(|_| {
            DqnError::InvalidData(format!("no feature rows before split date {}", date))
        })?;
        let test = Self::new(self.rows[idx..].to_vec()).map_err(|_| {
            DqnError::InvalidData(format!("no feature rows on or after split date {}", date))
        })?;
        Ok((train, test))
    }

    /// Rows dated on/after `date`
    pub fn since(&self, date: NaiveDate) -> Result<Self> {
        let idx = self.rows.partition_point(|r| r.date < date);
        Self::new(self.rows[idx..].to_vec())
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&FeatureRow> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> &FeatureRow {
        &self.rows[0]
    }

    pub fn last(&self) -> &FeatureRow {
        &self.rows[self.rows.len() - 1]
    }

    /// Closing price at `index`
    pub fn close(&self, index: usize) -> f64 {
        self.rows[index].close_price
    }
}

/// Position of each known column within a CSV line
struct ColumnIndex {
    date: usize,
    close_price: usize,
    moving_avg: usize,
    momentum_index: usize,
    sentiment_score: Option<usize>,
    index_return: Option<usize>,
}

impl ColumnIndex {
    fn from_header(header: &str) -> Result<Self> {
        let names: Vec<String> = header
            .split(',')
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
            .collect();

        let find = |aliases: &[&str]| {
            names
                .iter()
                .position(|n| aliases.iter().any(|a| *a == n.as_str()))
        };
        let require = |aliases: &[&str]| {
            find(aliases).ok_or_else(|| {
                DqnError::InvalidData(format!(
                    "CSV header is missing column '{}' (expected {})",
                    aliases[0],
                    FEATURE_COLUMNS.join(",")
                ))
            })
        };

        Ok(Self {
            date: require(&["date"])?,
            close_price: require(&["close_price", "close"])?,
            moving_avg: require(&["moving_avg", "sma_14", "sma"])?,
            momentum_index: require(&["momentum_index", "rsi_14", "rsi"])?,
            sentiment_score: find(&["sentiment_score", "sentiment"]),
            index_return: find(&["index_return", "market_return"]),
        })
    }

    fn parse_row(&self, parts: &[&str], line_no: usize) -> Result<FeatureRow> {
        let cell = |idx: usize| parts.get(idx).copied().unwrap_or("");

        let date = NaiveDate::parse_from_str(cell(self.date), "%Y-%m-%d").map_err(|e| {
            DqnError::InvalidData(format!(
                "line {}: invalid date '{}': {}",
                line_no,
                cell(self.date),
                e
            ))
        })?;

        let required = |idx: usize, name: &str| -> Result<f64> {
            cell(idx).parse::<f64>().map_err(|_| {
                DqnError::InvalidData(format!(
                    "line {}: invalid {} '{}'",
                    line_no,
                    name,
                    cell(idx)
                ))
            })
        };
        let optional = |idx: Option<usize>, name: &str| -> Result<f64> {
            match idx.map(|i| cell(i)) {
                None | Some("") => Ok(0.0),
                Some(raw) => raw.parse::<f64>().map_err(|_| {
                    DqnError::InvalidData(format!("line {}: invalid {} '{}'", line_no, name, raw))
                }),
            }
        };

        Ok(FeatureRow {
            date,
            close_price: required(self.close_price, "close_price")?,
            moving_avg: required(self.moving_avg, "moving_avg")?,
            momentum_index: required(self.momentum_index, "momentum_index")?,
            sentiment_score: optional(self.sentiment_score, "sentiment_score")?,
            index_return: optional(self.index_return, "index_return")?,
        })
    }
}

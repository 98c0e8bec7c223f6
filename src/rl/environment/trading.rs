//! Trading Environment for RL Training
//!
//! Provides a gym-like interface with step/reset over a historical feature
//! series. One share is traded per Buy/Sell; the reward is the raw change
//! in portfolio value.

use serde::{Deserialize, Serialize};

use crate::data::FeatureSeries;
use crate::error::{DqnError, Result};
use crate::rl::config::StateConfig;
use crate::rl::core::action::{DiscreteAction, NUM_DISCRETE_ACTIONS};
use crate::rl::core::state::{MinMaxScaler, ObservationEncoder};

/// Trading environment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingEnvConfig {
    /// Initial cash
    pub starting_balance: f64,
    /// Proportional cost charged on every fill
    pub transaction_cost_rate: f64,
    /// Observation encoder options
    pub state: StateConfig,
}

impl Default for TradingEnvConfig {
    fn default() -> Self {
        Self {
            starting_balance: 100_000.0,
            transaction_cost_rate: 0.001,
            state: StateConfig::default(),
        }
    }
}

impl TradingEnvConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(self.starting_balance > 0.0 && self.starting_balance.is_finite()) {
            errors.push(format!(
                "environment.starting_balance must be positive, got {}",
                self.starting_balance
            ));
        }
        if !(0.0..1.0).contains(&self.transaction_cost_rate) {
            errors.push(format!(
                "environment.transaction_cost_rate must be in [0, 1), got {}",
                self.transaction_cost_rate
            ));
        }
        errors.extend(self.state.validate());
        errors
    }
}

/// Result of taking a step in the environment
#[derive(Debug, Clone)]
pub struct StepResult {
    /// New observation after action
    pub observation: Vec<f64>,
    /// Change in portfolio value caused by this step
    pub reward: f64,
    /// Whether the cursor reached the last row
    pub terminated: bool,
    /// Always false; episodes end only at the end of the series
    pub truncated: bool,
    /// Additional info
    pub info: StepInfo,
}

impl StepResult {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Additional step information
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInfo {
    /// Latest portfolio value
    pub portfolio_value: f64,
    /// Cash balance
    pub cash: f64,
    /// Shares held
    pub shares: u64,
    /// Cursor after the step
    pub step: usize,
}

/// Trading environment for RL training
#[derive(Debug, Clone)]
pub struct TradingEnvironment {
    config: TradingEnvConfig,
    series: FeatureSeries,
    encoder: ObservationEncoder,
    cash: f64,
    shares: u64,
    current_step: usize,
    portfolio_value: f64,
}

impl TradingEnvironment {
    /// Create an environment, fitting the observation scaler on `series`
    pub fn new(series: FeatureSeries, config: TradingEnvConfig) -> Result<Self> {
        Self::check(&series, &config)?;
        let encoder = ObservationEncoder::fit(&series, &config.state)?;
        Ok(Self::build(series, config, encoder))
    }

    /// Create an environment that reuses an already-fitted scaler
    pub fn with_scaler(
        series: FeatureSeries,
        config: TradingEnvConfig,
        scaler: MinMaxScaler,
    ) -> Result<Self> {
        Self::check(&series, &config)?;
        let encoder = ObservationEncoder::with_scaler(&config.state, scaler)?;
        Ok(Self::build(series, config, encoder))
    }

    fn check(series: &FeatureSeries, config: &TradingEnvConfig) -> Result<()> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(DqnError::Validation(errors.join("; ")));
        }
        if let Some(window) = config.state.feature_window_length {
            if series.len() <= window {
                return Err(DqnError::InvalidData(format!(
                    "series of {} rows is too short for a {}-day window",
                    series.len(),
                    window
                )));
            }
        }
        Ok(())
    }

    fn build(series: FeatureSeries, config: TradingEnvConfig, encoder: ObservationEncoder) -> Self {
        let start = config.state.window() - 1;
        let starting_balance = config.starting_balance;
        Self {
            config,
            series,
            encoder,
            cash: starting_balance,
            shares: 0,
            current_step: start,
            portfolio_value: starting_balance,
        }
    }

    /// Reset the environment for a new episode
    pub fn reset(&mut self) -> Result<(Vec<f64>, StepInfo)> {
        self.cash = self.config.starting_balance;
        self.shares = 0;
        self.current_step = self.start_step();
        self.portfolio_value = self.config.starting_balance;

        Ok((self.observation()?, self.info()))
    }

    /// Take a step in the environment
    pub fn step(&mut self, action: DiscreteAction) -> Result<StepResult> {
        if self.is_terminal() {
            return Ok(StepResult {
                observation: self.observation()?,
                reward: 0.0,
                terminated: true,
                truncated: false,
                info: self.info(),
            });
        }

        let before = self.portfolio_value;
        let price = self.series.close(self.current_step);
        let cost = self.config.transaction_cost_rate;

        match action {
            DiscreteAction::Buy => {
                let fill = price * (1.0 + cost);
                if self.cash >= fill {
                    self.cash -= fill;
                    self.shares += 1;
                }
            }
            DiscreteAction::Sell => {
                if self.shares > 0 {
                    self.cash += price * (1.0 - cost);
                    self.shares -= 1;
                }
            }
            DiscreteAction::Hold => {}
        }

        self.portfolio_value = self.cash + self.shares as f64 * price;
        self.current_step += 1;

        Ok(StepResult {
            observation: self.observation()?,
            reward: self.portfolio_value - before,
            terminated: self.is_terminal(),
            truncated: false,
            info: self.info(),
        })
    }

    /// Step with a raw action index, rejecting anything outside 0..3
    pub fn step_index(&mut self, action: usize) -> Result<StepResult> {
        self.step(DiscreteAction::try_from(action)?)
    }

    fn observation(&self) -> Result<Vec<f64>> {
        self.encoder.encode(
            &self.series,
            self.current_step,
            self.cash,
            self.shares,
            self.config.starting_balance,
        )
    }

    fn info(&self) -> StepInfo {
        StepInfo {
            portfolio_value: self.portfolio_value,
            cash: self.cash,
            shares: self.shares,
            step: self.current_step,
        }
    }

    fn is_terminal(&self) -> bool {
        self.current_step >= self.series.len() - 1
    }

    /// Cursor position right after `reset`
    pub fn start_step(&self) -> usize {
        self.config.state.window() - 1
    }

    /// Get observation dimension
    pub fn observation_dim(&self) -> usize {
        self.encoder.output_dim()
    }

    /// Get action dimension
    pub fn action_dim(&self) -> usize {
        NUM_DISCRETE_ACTIONS
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn shares(&self) -> u64 {
        self.shares
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Portfolio value as of the last step (starting balance after reset)
    pub fn portfolio_value(&self) -> f64 {
        self.portfolio_value
    }

    pub fn config(&self) -> &TradingEnvConfig {
        &self.config
    }

    pub fn series(&self) -> &FeatureSeries {
        &self.series
    }

    /// Scaler fitted (or supplied) at construction
    pub fn scaler(&self) -> &MinMaxScaler {
        self.encoder.scaler()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn env(closes: &[f64], cost: f64) -> TradingEnvironment {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series = FeatureSeries::from_prices(start, closes).unwrap();
        let config = TradingEnvConfig {
            starting_balance: 1000.0,
            transaction_cost_rate: cost,
            ..Default::default()
        };
        TradingEnvironment::new(series, config).unwrap()
    }

    #[test]
    fn test_env_creation() {
        let env = env(&[10.0, 11.0, 12.0], 0.0);
        assert_eq!(env.observation_dim(), 6);
        assert_eq!(env.action_dim(), 3);
    }

    #[test]
    fn test_env_reset() {
        let mut env = env(&[10.0, 11.0, 12.0], 0.0);
        let (obs, info) = env.reset().unwrap();
        assert_eq!(obs.len(), 6);
        assert_eq!(env.current_step(), 0);
        assert_eq!(info.portfolio_value, 1000.0);
    }

    #[test]
    fn test_env_buy_charges_cost() {
        let mut env = env(&[10.0, 11.0, 12.0], 0.01);
        env.reset().unwrap();

        let result = env.step(DiscreteAction::Buy).unwrap();
        assert_eq!(env.shares(), 1);
        assert!((env.cash() - (1000.0 - 10.1)).abs() < 1e-9);
        // Cost is the only change at the fill price
        assert!((result.reward - (-0.1)).abs() < 1e-9);
        assert!(!result.terminated);
    }

    #[test]
    fn test_env_unaffordable_buy_is_noop() {
        let mut env = env(&[2000.0, 2100.0], 0.0);
        env.reset().unwrap();
        let result = env.step(DiscreteAction::Buy).unwrap();
        assert_eq!(env.shares(), 0);
        assert_eq!(env.cash(), 1000.0);
        assert_eq!(result.reward, 0.0);
    }

    #[test]
    fn test_env_episode_completion() {
        let mut env = env(&[10.0, 11.0, 12.0], 0.0);
        env.reset().unwrap();

        assert!(!env.step(DiscreteAction::Hold).unwrap().terminated);
        let last = env.step(DiscreteAction::Hold).unwrap();
        assert!(last.terminated);
        assert!(!last.truncated);
        assert_eq!(env.current_step(), 2);
    }

    #[test]
    fn test_step_after_terminal_is_inert() {
        let mut env = env(&[10.0, 11.0], 0.0);
        env.reset().unwrap();
        env.step(DiscreteAction::Buy).unwrap();

        let (cash, shares, step) = (env.cash(), env.shares(), env.current_step());
        let result = env.step(DiscreteAction::Sell).unwrap();
        assert!(result.terminated);
        assert_eq!(result.reward, 0.0);
        assert_eq!((env.cash(), env.shares(), env.current_step()), (cash, shares, step));
    }

    #[test]
    fn test_single_row_series_is_terminal_on_reset() {
        let mut env = env(&[10.0], 0.0);
        env.reset().unwrap();
        let result = env.step(DiscreteAction::Buy).unwrap();
        assert!(result.terminated);
        assert_eq!(env.shares(), 0);
    }

    #[test]
    fn test_action_index_conversion() {
        let mut env = env(&[10.0, 11.0, 12.0], 0.0);
        env.reset().unwrap();
        assert!(env.step_index(0).is_ok());
        assert!(matches!(
            env.step_index(99),
            Err(DqnError::InvalidAction(99))
        ));
        // Rejected action does not advance time
        assert_eq!(env.current_step(), 1);
    }

    #[test]
    fn test_window_needs_enough_rows() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series = FeatureSeries::from_prices(start, &[1.0, 2.0, 3.0]).unwrap();
        let mut config = TradingEnvConfig::default();
        config.state.feature_window_length = Some(3);
        assert!(TradingEnvironment::new(series.clone(), config.clone()).is_err());

        config.state.feature_window_length = Some(2);
        let mut env = TradingEnvironment::new(series, config).unwrap();
        env.reset().unwrap();
        assert_eq!(env.current_step(), 1);
        assert_eq!(env.observation_dim(), 10);
    }
}

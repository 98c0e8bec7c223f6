//! RL Configuration
//!
//! Configuration structs for the DQN agent, the training loop and the
//! observation encoder.

use serde::{Deserialize, Serialize};

use super::core::state::ScalerFit;

/// DQN agent hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DqnConfig {
    /// Discount factor (gamma)
    pub gamma: f64,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Exploration rate for an untrained agent
    pub epsilon_start: f64,
    /// Exploration rate after resuming from a checkpoint
    pub epsilon_warm: f64,
    /// Minimum exploration rate
    pub epsilon_min: f64,
    /// Multiplicative decay applied after each replay
    pub epsilon_decay: f64,
    /// Hidden layer widths of the Q-network
    pub hidden_layers: Vec<usize>,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            gamma: 0.95,
            learning_rate: 0.001,
            epsilon_start: 1.0,
            epsilon_warm: 0.2,
            epsilon_min: 0.01,
            epsilon_decay: 0.97,
            hidden_layers: vec![64, 32],
        }
    }
}

impl DqnConfig {
    /// Collect every hyperparameter violation
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(0.0..=1.0).contains(&self.gamma) {
            errors.push(format!("agent.gamma must be in [0, 1], got {}", self.gamma));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            errors.push(format!(
                "agent.learning_rate must be positive, got {}",
                self.learning_rate
            ));
        }
        for (name, value) in [
            ("epsilon_start", self.epsilon_start),
            ("epsilon_warm", self.epsilon_warm),
            ("epsilon_min", self.epsilon_min),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("agent.{name} must be in [0, 1], got {value}"));
            }
        }
        if self.epsilon_min > self.epsilon_start {
            errors.push("agent.epsilon_min must not exceed agent.epsilon_start".to_string());
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            errors.push(format!(
                "agent.epsilon_decay must be in (0, 1], got {}",
                self.epsilon_decay
            ));
        }
        if self.hidden_layers.iter().any(|&w| w == 0) {
            errors.push("agent.hidden_layers widths must be > 0".to_string());
        }
        errors
    }
}

/// Training loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of episodes to run
    pub episodes: usize,
    /// Transitions sampled per replay
    pub batch_size: usize,
    /// Replay buffer capacity
    pub buffer_size: usize,
    /// Checkpoint save frequency (episodes)
    pub checkpoint_frequency: usize,
    /// Checkpoint file path
    pub checkpoint_path: String,
    /// Seed for weight init, exploration and sampling
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 50,
            batch_size: 32,
            buffer_size: 2000,
            checkpoint_frequency: 10,
            checkpoint_path: "dqn_model.json".to_string(),
            seed: 42,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.batch_size == 0 {
            errors.push("training.batch_size must be > 0".to_string());
        }
        if self.buffer_size == 0 {
            errors.push("training.buffer_size must be > 0".to_string());
        }
        if self.checkpoint_frequency == 0 {
            errors.push("training.checkpoint_frequency must be > 0".to_string());
        }
        if self.checkpoint_path.trim().is_empty() {
            errors.push("training.checkpoint_path must not be empty".to_string());
        }
        errors
    }
}

/// Observation encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Number of trailing days flattened into one observation
    pub feature_window_length: Option<usize>,
    /// Add the market index return as a fifth scaled column
    pub include_index_return: bool,
    /// Divisor for the share count feature
    pub share_normalization: f64,
    /// Which rows the min-max scaler is fitted on
    pub scaler_fit: ScalerFit,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            feature_window_length: None,
            include_index_return: false,
            share_normalization: 1000.0,
            scaler_fit: ScalerFit::FullSeries,
        }
    }
}

impl StateConfig {
    /// Number of scaled market columns per day
    pub fn market_columns(&self) -> usize {
        if self.include_index_return {
            5
        } else {
            4
        }
    }

    /// Days per observation
    pub fn window(&self) -> usize {
        self.feature_window_length.unwrap_or(1)
    }

    /// Length of the flattened observation vector
    pub fn observation_dim(&self) -> usize {
        self.window() * self.market_columns() + 2
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.feature_window_length == Some(0) {
            errors.push("state.feature_window_length must be >= 1".to_string());
        }
        if !(self.share_normalization > 0.0 && self.share_normalization.is_finite()) {
            errors.push(format!(
                "state.share_normalization must be positive, got {}",
                self.share_normalization
            ));
        }
        if self.scaler_fit == ScalerFit::Prefix(0) {
            errors.push("state.scaler_fit prefix must cover at least one row".to_string());
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(DqnConfig::default().validate().is_empty());
        assert!(TrainingConfig::default().validate().is_empty());
        let state = StateConfig::default();
        assert!(state.validate().is_empty());
        assert_eq!(state.observation_dim(), 6);
    }

    #[test]
    fn test_agent_validation_collects_all_errors() {
        let agent = DqnConfig {
            gamma: 1.5,
            epsilon_decay: 0.0,
            epsilon_min: 0.5,
            epsilon_start: 0.1,
            ..Default::default()
        };
        let errors = agent.validate();
        assert_eq!(errors.len(), 3, "{errors:?}");
    }

    #[test]
    fn test_windowed_observation_dim() {
        let state = StateConfig {
            feature_window_length: Some(10),
            include_index_return: true,
            ..Default::default()
        };
        assert_eq!(state.observation_dim(), 52);
    }
}

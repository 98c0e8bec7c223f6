//! Reinforcement Learning Module
//!
//! Single-asset trading environment and a DQN agent trained on it.
//!
//! # Layout
//!
//! - **Environment**: gym-style `reset`/`step` over a feature series
//! - **Action Space**: Buy / Sell / Hold, one share at a time
//! - **Algorithm**: DQN with epsilon-greedy exploration and experience replay
//! - **Training**: episode loop with periodic and final checkpoints

pub mod algorithms;
pub mod config;
pub mod core;
pub mod environment;
pub mod memory;
pub mod networks;
pub mod training;

// Config exports
pub use config::{DqnConfig, StateConfig, TrainingConfig};

// Core exports
pub use core::{DiscreteAction, MinMaxScaler, ObservationEncoder, ScalerFit, NUM_DISCRETE_ACTIONS};

// Memory exports
pub use memory::{ReplayBuffer, Transition};

// Agent exports
pub use algorithms::{AgentLifecycle, DqnAgent, ReplayStats};
pub use networks::QNetwork;

// Environment exports
pub use environment::{StepInfo, StepResult, TradingEnvConfig, TradingEnvironment};

// Training exports
pub use training::{
    evaluate, AgentCheckpoint, CheckpointStore, Checkpointer, EpisodeMetrics, EvaluationReport,
    TrainingLoop, TrainingSummary,
};

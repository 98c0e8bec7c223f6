//! Simulated Trading Environment for RL Training
//!
//! This module provides a gym-like environment for training RL agents
//! on historical market data without risking real capital.

mod trading;

pub use trading::{StepInfo, StepResult, TradingEnvConfig, TradingEnvironment};

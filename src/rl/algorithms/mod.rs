//! RL Algorithms
//!
//! Implementations of reinforcement learning algorithms.

pub mod dqn;

pub use dqn::{AgentLifecycle, DqnAgent, ReplayStats};

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod ml;
pub mod rl;

pub use config::AppConfig;
pub use data::{FeatureRow, FeatureSeries};
pub use error::{DqnError, Result};
pub use rl::{DiscreteAction, DqnAgent, TradingEnvConfig, TradingEnvironment, TrainingLoop};

//! Training Infrastructure
//!
//! Training loop, checkpointing, and evaluation utilities.

pub mod checkpointing;
pub mod evaluation;
pub mod trainer;

pub use checkpointing::{AgentCheckpoint, CheckpointStore, Checkpointer, CHECKPOINT_VERSION};
pub use evaluation::{buy_and_hold_value, evaluate, EvaluationReport};
pub use trainer::{summarize_results, EpisodeMetrics, TrainingLoop, TrainingSummary};

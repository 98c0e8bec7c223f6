//! ploy-dqn CLI
//!
//! Commands:
//! - `ploy-dqn train` - Train the DQN agent on a feature CSV
//! - `ploy-dqn eval` - Greedy evaluation against buy-and-hold
//! - `ploy-dqn info` - Inspect a checkpoint

pub mod output;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;

/// Single-asset trading simulator and DQN trainer
#[derive(Parser, Debug)]
#[command(name = "ploy-dqn")]
#[command(author, version, about = "Single-asset trading simulator and DQN trainer", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml, then $PLOY_DQN_ENV)
    #[arg(long, global = true, default_value = "config")]
    pub config: String,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the agent, resuming from the checkpoint if one exists
    Train {
        /// Feature CSV (date,close_price,moving_avg,momentum_index,...)
        #[arg(short, long)]
        data: Option<String>,
        /// Number of training episodes
        #[arg(short, long)]
        episodes: Option<usize>,
        /// Checkpoint file
        #[arg(short, long)]
        checkpoint: Option<String>,
        /// Transitions sampled per replay
        #[arg(long)]
        batch_size: Option<usize>,
        /// Save a checkpoint every N episodes
        #[arg(long)]
        checkpoint_every: Option<usize>,
        /// Train only on rows dated before this day (YYYY-MM-DD)
        #[arg(long)]
        split_date: Option<NaiveDate>,
        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run the trained agent greedily and compare with buy-and-hold
    Eval {
        /// Feature CSV
        #[arg(short, long)]
        data: Option<String>,
        /// Checkpoint file
        #[arg(short, long)]
        checkpoint: Option<String>,
        /// Evaluate rows dated on/after this day (defaults to data.split_date)
        #[arg(long)]
        from: Option<NaiveDate>,
    },

    /// Show what a checkpoint contains
    Info {
        /// Checkpoint file
        #[arg(short, long)]
        checkpoint: Option<String>,
    },
}

impl Commands {
    /// Apply command-line overrides on top of file/env configuration
    pub fn apply_to(&self, config: &mut AppConfig) {
        match self {
            Commands::Train {
                data,
                episodes,
                checkpoint,
                batch_size,
                checkpoint_every,
                split_date,
                seed,
            } => {
                if let Some(data) = data {
                    config.data.path = Some(data.clone());
                }
                if let Some(episodes) = episodes {
                    config.training.episodes = *episodes;
                }
                if let Some(checkpoint) = checkpoint {
                    config.training.checkpoint_path = checkpoint.clone();
                }
                if let Some(batch_size) = batch_size {
                    config.training.batch_size = *batch_size;
                }
                if let Some(every) = checkpoint_every {
                    config.training.checkpoint_frequency = *every;
                }
                if split_date.is_some() {
                    config.data.split_date = *split_date;
                }
                if let Some(seed) = seed {
                    config.training.seed = *seed;
                }
            }
            Commands::Eval {
                data,
                checkpoint,
                from,
            } => {
                if let Some(data) = data {
                    config.data.path = Some(data.clone());
                }
                if let Some(checkpoint) = checkpoint {
                    config.training.checkpoint_path = checkpoint.clone();
                }
                if from.is_some() {
                    config.data.split_date = *from;
                }
            }
            Commands::Info { checkpoint } => {
                if let Some(checkpoint) = checkpoint {
                    config.training.checkpoint_path = checkpoint.clone();
                }
            }
        }
    }
}

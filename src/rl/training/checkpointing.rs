//! Model Checkpointing
//!
//! Save and load agent parameters for persistence. Writes are atomic
//! (temp file + rename) so an interrupted save never leaves a partial file
//! under the checkpoint path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{DqnError, Result};
use crate::ml::DenseNetwork;
use crate::rl::core::action::NUM_DISCRETE_ACTIONS;
use crate::rl::core::state::MinMaxScaler;

/// Current on-disk format version
pub const CHECKPOINT_VERSION: u32 = 1;

/// Persisted agent parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCheckpoint {
    pub version: u32,
    /// Q-network weights
    pub network: DenseNetwork,
    /// Observation scaler fitted on the training series
    #[serde(default)]
    pub scaler: Option<MinMaxScaler>,
    /// Episodes completed across all runs
    pub episodes_trained: usize,
    /// Exploration rate when saved (informational; resume uses the warm value)
    pub epsilon_at_save: f64,
    pub saved_at: DateTime<Utc>,
}

impl AgentCheckpoint {
    pub fn new(
        network: DenseNetwork,
        scaler: Option<MinMaxScaler>,
        episodes_trained: usize,
        epsilon_at_save: f64,
    ) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            network,
            scaler,
            episodes_trained,
            epsilon_at_save,
            saved_at: Utc::now(),
        }
    }

    /// Reject anything that cannot be resumed from
    pub fn validate(&self) -> Result<()> {
        if self.version != CHECKPOINT_VERSION {
            return Err(DqnError::Checkpoint(format!(
                "unsupported checkpoint version {} (expected {})",
                self.version, CHECKPOINT_VERSION
            )));
        }
        self.network
            .validate()
            .map_err(|e| DqnError::Checkpoint(format!("invalid network: {e}")))?;
        if self.network.output_dim() != NUM_DISCRETE_ACTIONS {
            return Err(DqnError::Checkpoint(format!(
                "network has {} outputs, expected {}",
                self.network.output_dim(),
                NUM_DISCRETE_ACTIONS
            )));
        }
        if let Some(scaler) = &self.scaler {
            scaler
                .validate()
                .map_err(|e| DqnError::Checkpoint(format!("invalid scaler: {e}")))?;
        }
        if !(0.0..=1.0).contains(&self.epsilon_at_save) {
            return Err(DqnError::Checkpoint(format!(
                "epsilon_at_save {} out of range",
                self.epsilon_at_save
            )));
        }
        Ok(())
    }
}

/// Where checkpoints are persisted
#[cfg_attr(test, mockall::automock)]
pub trait CheckpointStore: Send + Sync {
    /// Whether a checkpoint is present (cold vs warm start)
    fn exists(&self) -> bool;

    /// Persist a checkpoint, replacing any previous one
    fn save(&self, checkpoint: &AgentCheckpoint) -> Result<()>;

    /// Load and validate the stored checkpoint
    fn load(&self) -> Result<AgentCheckpoint>;

    /// Human-readable location for logs
    fn location(&self) -> String;
}

/// JSON file checkpoint store
#[derive(Debug, Clone)]
pub struct Checkpointer {
    path: PathBuf,
}

impl Checkpointer {
    /// Create a new checkpointer
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Get checkpoint path
    pub fn checkpoint_path(&self) -> &Path {
        &self.path
    }

    /// Staging file written before the rename
    pub fn temp_path(&self) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl Default for Checkpointer {
    fn default() -> Self {
        Self::new("dqn_model.json")
    }
}

impl CheckpointStore for Checkpointer {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn save(&self, checkpoint: &AgentCheckpoint) -> Result<()> {
        // The file on disk must stay loadable; diverged weights are refused here
        checkpoint.validate()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.temp_path();
        let body = serde_json::to_string_pretty(checkpoint)?;
        {
            let mut file = File::create(&tmp)?;
            file.write_all(body.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        info!(
            "Saved checkpoint to {:?} (episodes_trained={})",
            self.path, checkpoint.episodes_trained
        );
        Ok(())
    }

    fn load(&self) -> Result<AgentCheckpoint> {
        let body = fs::read_to_string(&self.path)?;
        let checkpoint: AgentCheckpoint = serde_json::from_str(&body).map_err(|e| {
            DqnError::Checkpoint(format!("{:?} is not a valid checkpoint: {}", self.path, e))
        })?;
        checkpoint.validate()?;

        info!(
            "Loaded checkpoint from {:?} (episodes_trained={}, saved_at={})",
            self.path, checkpoint.episodes_trained, checkpoint.saved_at
        );
        Ok(checkpoint)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::Activation;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::env::temp_dir;

    fn temp_checkpoint(tag: &str) -> Checkpointer {
        let mut p = temp_dir();
        p.push(format!(
            "ploy_dqn_ckpt_{}_{}.json",
            tag,
            Utc::now().timestamp_nanos_opt().unwrap_or(0)
        ));
        Checkpointer::new(p)
    }

    fn sample_checkpoint() -> AgentCheckpoint {
        let mut rng = StdRng::seed_from_u64(5);
        let network = DenseNetwork::random(&[6, 4, 3], Activation::Relu, &mut rng).unwrap();
        AgentCheckpoint::new(network, None, 10, 0.5)
    }

    #[test]
    fn test_temp_path() {
        let checkpointer = Checkpointer::new("models/dqn_model.json");
        assert_eq!(
            checkpointer.temp_path(),
            PathBuf::from("models/dqn_model.json.tmp")
        );
    }

    #[test]
    fn test_save_load_roundtrip() {
        let store = temp_checkpoint("roundtrip");
        assert!(!store.exists());

        let checkpoint = sample_checkpoint();
        store.save(&checkpoint).unwrap();
        assert!(store.exists());
        assert!(!store.temp_path().exists());

        let loaded = store.load().unwrap();
        assert_eq!(loaded, checkpoint);

        let _ = fs::remove_file(store.checkpoint_path());
    }

    #[test]
    fn test_corrupt_file_is_checkpoint_error() {
        let store = temp_checkpoint("corrupt");
        fs::write(store.checkpoint_path(), "{\"version\": 1, \"network\": ").unwrap();

        assert!(matches!(store.load(), Err(DqnError::Checkpoint(_))));

        let _ = fs::remove_file(store.checkpoint_path());
    }

    #[test]
    fn test_non_finite_weights_never_replace_good_checkpoint() {
        let store = temp_checkpoint("diverged");
        let good = sample_checkpoint();
        store.save(&good).unwrap();

        let mut diverged = good.clone();
        diverged.network.layers[0].weights[0][0] = f64::NAN;
        diverged.episodes_trained = 11;

        assert!(matches!(store.save(&diverged), Err(DqnError::Checkpoint(_))));
        assert!(!store.temp_path().exists());
        assert_eq!(store.load().unwrap(), good);

        let _ = fs::remove_file(store.checkpoint_path());
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut checkpoint = sample_checkpoint();
        checkpoint.version = 99;
        assert!(matches!(checkpoint.validate(), Err(DqnError::Checkpoint(_))));
    }
}

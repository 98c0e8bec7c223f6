//! Deep Q-Network (DQN)
//!
//! Epsilon-greedy agent with an experience replay buffer. Each replay
//! samples a batch and, transition by transition, moves `Q(s, a)` toward
//! `r` (terminal) or `r + gamma * max_a' Q(s', a')`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::error::{DqnError, Result};
use crate::rl::config::DqnConfig;
use crate::rl::core::action::{DiscreteAction, NUM_DISCRETE_ACTIONS};
use crate::rl::core::state::MinMaxScaler;
use crate::rl::memory::{ReplayBuffer, Transition};
use crate::rl::networks::QNetwork;
use crate::rl::training::checkpointing::{AgentCheckpoint, CheckpointStore};

/// How the agent came to exist; decided once at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentLifecycle {
    /// Untrained weights, exploration at its ceiling
    ColdStart,
    /// Weights restored from a checkpoint, exploration at the warm value
    WarmResume {
        /// Episodes recorded in the checkpoint
        episodes_trained: usize,
    },
}

/// Statistics from one replay update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayStats {
    pub batch_size: usize,
    pub mean_loss: f64,
    /// Exploration rate after decay
    pub epsilon: f64,
}

/// DQN agent
#[derive(Debug)]
pub struct DqnAgent {
    config: DqnConfig,
    q_network: QNetwork,
    memory: ReplayBuffer,
    epsilon: f64,
    lifecycle: AgentLifecycle,
    episodes_trained: usize,
    rng: StdRng,
}

impl DqnAgent {
    /// Untrained agent for observations of `observation_dim` values
    pub fn new(
        observation_dim: usize,
        config: DqnConfig,
        buffer_size: usize,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let q_network = QNetwork::new(
            observation_dim,
            &config.hidden_layers,
            config.learning_rate,
            &mut rng,
        )?;

        Ok(Self {
            epsilon: config.epsilon_start,
            config,
            q_network,
            memory: ReplayBuffer::new(buffer_size),
            lifecycle: AgentLifecycle::ColdStart,
            episodes_trained: 0,
            rng,
        })
    }

    /// Agent resumed from `checkpoint` with epsilon at the warm value
    pub fn from_checkpoint(
        checkpoint: AgentCheckpoint,
        observation_dim: usize,
        config: DqnConfig,
        buffer_size: usize,
        seed: u64,
    ) -> Result<Self> {
        checkpoint.validate()?;
        if checkpoint.network.input_dim != observation_dim {
            return Err(DqnError::Checkpoint(format!(
                "checkpoint expects {} observation values, environment produces {}",
                checkpoint.network.input_dim, observation_dim
            )));
        }

        let q_network = QNetwork::from_network(checkpoint.network, config.learning_rate)?;
        Ok(Self {
            epsilon: config.epsilon_warm,
            config,
            q_network,
            memory: ReplayBuffer::new(buffer_size),
            lifecycle: AgentLifecycle::WarmResume {
                episodes_trained: checkpoint.episodes_trained,
            },
            episodes_trained: checkpoint.episodes_trained,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Warm-resume if `store` holds a checkpoint, otherwise cold-start.
    ///
    /// A checkpoint that fails to load is an error; it is never used and
    /// never silently replaced by fresh weights.
    pub fn load_or_new(
        store: &dyn CheckpointStore,
        observation_dim: usize,
        config: DqnConfig,
        buffer_size: usize,
        seed: u64,
    ) -> Result<Self> {
        let agent = if store.exists() {
            let checkpoint = store.load()?;
            Self::from_checkpoint(checkpoint, observation_dim, config, buffer_size, seed)?
        } else {
            Self::new(observation_dim, config, buffer_size, seed)?
        };

        match agent.lifecycle {
            AgentLifecycle::ColdStart => info!(
                "No checkpoint at {}; starting untrained (epsilon={:.2})",
                store.location(),
                agent.epsilon
            ),
            AgentLifecycle::WarmResume { episodes_trained } => info!(
                "Resuming from {} after {} episodes (epsilon={:.2})",
                store.location(),
                episodes_trained,
                agent.epsilon
            ),
        }
        Ok(agent)
    }

    /// Epsilon-greedy action selection
    pub fn act(&mut self, observation: &[f64]) -> Result<DiscreteAction> {
        if self.rng.gen::<f64>() < self.epsilon {
            let idx = self.rng.gen_range(0..NUM_DISCRETE_ACTIONS);
            return DiscreteAction::try_from(idx);
        }
        self.greedy_action(observation)
    }

    /// Highest-valued action, ignoring exploration
    pub fn greedy_action(&self, observation: &[f64]) -> Result<DiscreteAction> {
        self.q_network.best_action(observation)
    }

    pub fn q_values(&self, observation: &[f64]) -> Result<Vec<f64>> {
        self.q_network.q_values(observation)
    }

    /// Store a transition for later replay
    pub fn remember(&mut self, transition: Transition) {
        self.memory.push(transition);
    }

    /// Learn from a random batch of stored transitions.
    ///
    /// Returns `None` without touching the network or epsilon when fewer
    /// than `batch_size` transitions are stored.
    pub fn replay(&mut self, batch_size: usize) -> Result<Option<ReplayStats>> {
        if batch_size == 0 || !self.memory.has_enough_samples(batch_size) {
            debug!(
                "Skipping replay: {} transitions stored, batch of {} requested",
                self.memory.len(),
                batch_size
            );
            return Ok(None);
        }

        let batch = self.memory.sample(batch_size, &mut self.rng)?;
        let mut total_loss = 0.0;
        for transition in batch {
            let target = if transition.done {
                transition.reward
            } else {
                transition.reward + self.config.gamma * self.q_network.max_q(&transition.next_state)?
            };
            total_loss +=
                self.q_network
                    .fit_target(&transition.state, transition.action, target)?;
        }

        self.decay_epsilon();

        let stats = ReplayStats {
            batch_size,
            mean_loss: total_loss / batch_size as f64,
            epsilon: self.epsilon,
        };
        debug!(
            "Replay: batch={}, mean_loss={:.6}, epsilon={:.4}",
            stats.batch_size, stats.mean_loss, stats.epsilon
        );
        Ok(Some(stats))
    }

    /// `epsilon <- max(epsilon_min, epsilon * epsilon_decay)`
    fn decay_epsilon(&mut self) {
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
    }

    /// Override exploration, e.g. 0 for evaluation
    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn lifecycle(&self) -> AgentLifecycle {
        self.lifecycle
    }

    pub fn memory(&self) -> &ReplayBuffer {
        &self.memory
    }

    pub fn q_network(&self) -> &QNetwork {
        &self.q_network
    }

    pub fn config(&self) -> &DqnConfig {
        &self.config
    }

    /// Episodes completed, including those from a resumed checkpoint
    pub fn episodes_trained(&self) -> usize {
        self.episodes_trained
    }

    pub fn record_episode(&mut self) {
        self.episodes_trained += 1;
    }

    /// Snapshot the current parameters
    pub fn checkpoint(&self, scaler: Option<MinMaxScaler>) -> AgentCheckpoint {
        AgentCheckpoint::new(
            self.q_network.network().clone(),
            scaler,
            self.episodes_trained,
            self.epsilon,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::training::checkpointing::MockCheckpointStore;

    fn agent() -> DqnAgent {
        let config = DqnConfig {
            hidden_layers: vec![8],
            ..Default::default()
        };
        DqnAgent::new(4, config, 100, 7).unwrap()
    }

    fn fill(agent: &mut DqnAgent, n: usize) {
        for i in 0..n {
            agent.remember(Transition::new(
                vec![0.1 * i as f64, 0.0, -0.2, 0.5],
                DiscreteAction::Buy,
                1.0,
                vec![0.0, 0.1, 0.2, 0.3],
                i % 5 == 4,
            ));
        }
    }

    #[test]
    fn test_cold_start() {
        let agent = agent();
        assert_eq!(agent.lifecycle(), AgentLifecycle::ColdStart);
        assert_eq!(agent.epsilon(), 1.0);
        assert_eq!(agent.episodes_trained(), 0);
    }

    #[test]
    fn test_replay_underflow_is_noop() {
        let mut agent = agent();
        fill(&mut agent, 3);
        let before = agent.q_network().network().clone();

        assert!(agent.replay(4).unwrap().is_none());
        assert_eq!(agent.q_network().network(), &before);
        assert_eq!(agent.epsilon(), 1.0);
    }

    #[test]
    fn test_replay_updates_and_decays() {
        let mut agent = agent();
        fill(&mut agent, 10);
        let before = agent.q_network().network().clone();

        let stats = agent.replay(4).unwrap().unwrap();
        assert_eq!(stats.batch_size, 4);
        assert!(stats.mean_loss.is_finite());
        assert_ne!(agent.q_network().network(), &before);
        assert!((agent.epsilon() - 0.97).abs() < 1e-12);
    }

    #[test]
    fn test_epsilon_never_below_floor() {
        let mut agent = agent();
        fill(&mut agent, 10);
        let mut last = agent.epsilon();
        for _ in 0..300 {
            agent.replay(2).unwrap();
            assert!(agent.epsilon() <= last);
            assert!(agent.epsilon() >= agent.config().epsilon_min);
            last = agent.epsilon();
        }
        assert_eq!(agent.epsilon(), agent.config().epsilon_min);
    }

    #[test]
    fn test_zero_epsilon_is_greedy() {
        let mut agent = agent();
        agent.set_epsilon(0.0);
        let obs = [0.3, -0.1, 0.8, 0.0];
        let greedy = agent.greedy_action(&obs).unwrap();
        for _ in 0..20 {
            assert_eq!(agent.act(&obs).unwrap(), greedy);
        }
    }

    #[test]
    fn test_load_or_new_cold_when_store_empty() {
        let mut store = MockCheckpointStore::new();
        store.expect_exists().return_const(false);
        store.expect_load().never();
        store
            .expect_location()
            .return_const("memory".to_string());

        let agent = DqnAgent::load_or_new(&store, 4, DqnConfig::default(), 10, 1).unwrap();
        assert_eq!(agent.lifecycle(), AgentLifecycle::ColdStart);
    }

    #[test]
    fn test_load_or_new_warm_resume() {
        let saved = agent().checkpoint(None);
        let mut store = MockCheckpointStore::new();
        store.expect_exists().return_const(true);
        store
            .expect_load()
            .times(1)
            .returning(move || Ok(saved.clone()));
        store
            .expect_location()
            .return_const("memory".to_string());

        let config = DqnConfig {
            hidden_layers: vec![8],
            ..Default::default()
        };
        let agent = DqnAgent::load_or_new(&store, 4, config, 10, 1).unwrap();
        assert_eq!(
            agent.lifecycle(),
            AgentLifecycle::WarmResume { episodes_trained: 0 }
        );
        assert_eq!(agent.epsilon(), 0.2);
    }

    #[test]
    fn test_load_or_new_refuses_corrupt_checkpoint() {
        let mut store = MockCheckpointStore::new();
        store.expect_exists().return_const(true);
        store
            .expect_load()
            .returning(|| Err(DqnError::Checkpoint("truncated".to_string())));
        store
            .expect_location()
            .return_const("memory".to_string());

        let result = DqnAgent::load_or_new(&store, 4, DqnConfig::default(), 10, 1);
        assert!(matches!(result, Err(DqnError::Checkpoint(_))));
    }

    #[test]
    fn test_checkpoint_dim_mismatch_rejected() {
        let saved = agent().checkpoint(None);
        let result = DqnAgent::from_checkpoint(saved, 6, DqnConfig::default(), 10, 1);
        assert!(matches!(result, Err(DqnError::Checkpoint(_))));
    }
}

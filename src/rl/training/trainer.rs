//! Training Loop
//!
//! Orchestrates DQN training: run episodes, replay after each one, save
//! checkpoints on a fixed cadence and always once more when the run ends,
//! whether it completed, was interrupted or failed.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{DqnError, Result};
use crate::rl::algorithms::dqn::{DqnAgent, ReplayStats};
use crate::rl::config::TrainingConfig;
use crate::rl::environment::TradingEnvironment;
use crate::rl::memory::Transition;
use crate::rl::training::checkpointing::CheckpointStore;

/// Metrics for one completed episode
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeMetrics {
    /// 1-based episode index within this run
    pub episode: usize,
    /// Portfolio value when the episode terminated
    pub final_portfolio_value: f64,
    /// Exploration rate in effect during the episode
    pub epsilon: f64,
    /// Sum of step rewards
    pub total_reward: f64,
    /// Steps taken
    pub steps: usize,
    /// Replay that followed the episode, if the buffer was large enough
    pub replay: Option<ReplayStats>,
}

/// Training loop for the DQN agent
pub struct TrainingLoop {
    config: TrainingConfig,
    store: Box<dyn CheckpointStore>,
    stop: Arc<AtomicBool>,
}

impl TrainingLoop {
    /// Create a new training loop
    pub fn new(config: TrainingConfig, store: Box<dyn CheckpointStore>) -> Self {
        Self {
            config,
            store,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned stop flag (e.g. set from a Ctrl+C handler)
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Handle for requesting a stop from another thread
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Run the configured number of episodes.
    ///
    /// An invalid configuration is rejected before anything runs. Once
    /// episodes start, the final checkpoint is written before any error from
    /// the episode loop is returned, and before a panic is resumed.
    pub fn run(&self, agent: &mut DqnAgent, env: &mut TradingEnvironment) -> Result<TrainingSummary> {
        let errors = self.config.validate();
        if !errors.is_empty() {
            return Err(DqnError::Validation(errors.join("; ")));
        }

        info!(
            "Training for {} episodes (batch_size={}, checkpoint every {} episodes, store={})",
            self.config.episodes,
            self.config.batch_size,
            self.config.checkpoint_frequency,
            self.store.location()
        );

        let mut results = Vec::with_capacity(self.config.episodes);
        let mut checkpoint_failures = 0;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_episodes(agent, env, &mut results, &mut checkpoint_failures)
        }));

        info!("Training finished or stopped; saving final checkpoint");
        let final_saved = self.persist(agent, env);
        if !final_saved {
            checkpoint_failures += 1;
        }

        let interrupted = match outcome {
            Ok(result) => result?,
            Err(payload) => panic::resume_unwind(payload),
        };

        let mut summary = summarize_results(&results);
        summary.interrupted = interrupted;
        summary.final_epsilon = agent.epsilon();
        summary.final_checkpoint_saved = final_saved;
        summary.checkpoint_failures = checkpoint_failures;
        Ok(summary)
    }

    /// Returns whether the run was interrupted
    fn run_episodes(
        &self,
        agent: &mut DqnAgent,
        env: &mut TradingEnvironment,
        results: &mut Vec<EpisodeMetrics>,
        checkpoint_failures: &mut usize,
    ) -> Result<bool> {
        let total = self.config.episodes;

        for episode in 1..=total {
            let Some(metrics) = self.run_episode(episode, agent, env)? else {
                warn!("Stop requested during episode {}/{}", episode, total);
                return Ok(true);
            };

            info!(
                "Episode {}/{}: portfolio_value={:.2}, epsilon={:.2}",
                metrics.episode, total, metrics.final_portfolio_value, metrics.epsilon
            );
            results.push(metrics);

            if episode % self.config.checkpoint_frequency == 0 {
                info!("Checkpoint: episode {} complete, saving weights", episode);
                if !self.persist(agent, env) {
                    *checkpoint_failures += 1;
                }
            }

            if self.stop.load(Ordering::SeqCst) {
                warn!("Stop requested after episode {}/{}", episode, total);
                return Ok(episode < total);
            }
        }

        Ok(false)
    }

    /// One episode followed by one replay; `None` if a stop was requested
    fn run_episode(
        &self,
        episode: usize,
        agent: &mut DqnAgent,
        env: &mut TradingEnvironment,
    ) -> Result<Option<EpisodeMetrics>> {
        let (mut state, _) = env.reset()?;
        let epsilon = agent.epsilon();
        let mut total_reward = 0.0;
        let mut steps = 0;

        let info = loop {
            let action = agent.act(&state)?;
            let result = env.step(action)?;
            let done = result.done();

            total_reward += result.reward;
            steps += 1;
            agent.remember(Transition::new(
                state,
                action,
                result.reward,
                result.observation.clone(),
                done,
            ));
            state = result.observation;

            if done {
                break result.info;
            }
            if self.stop.load(Ordering::SeqCst) {
                return Ok(None);
            }
        };

        let replay = agent.replay(self.config.batch_size)?;
        agent.record_episode();

        Ok(Some(EpisodeMetrics {
            episode,
            final_portfolio_value: info.portfolio_value,
            epsilon,
            total_reward,
            steps,
            replay,
        }))
    }

    /// Save the agent; failures are logged and reported, never fatal
    fn persist(&self, agent: &DqnAgent, env: &TradingEnvironment) -> bool {
        let checkpoint = agent.checkpoint(Some(env.scaler().clone()));
        match self.store.save(&checkpoint) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Failed to save checkpoint to {}: {}",
                    self.store.location(),
                    e
                );
                false
            }
        }
    }
}

/// Calculate training summary statistics
pub fn summarize_results(results: &[EpisodeMetrics]) -> TrainingSummary {
    if results.is_empty() {
        return TrainingSummary::default();
    }

    let n = results.len() as f64;
    let values = results.iter().map(|r| r.final_portfolio_value);

    TrainingSummary {
        num_episodes: results.len(),
        avg_final_value: values.clone().sum::<f64>() / n,
        best_final_value: values.clone().fold(f64::NEG_INFINITY, f64::max),
        last_final_value: results[results.len() - 1].final_portfolio_value,
        avg_reward: results.iter().map(|r| r.total_reward).sum::<f64>() / n,
        episodes: results.to_vec(),
        ..Default::default()
    }
}

/// Training summary statistics
#[derive(Debug, Clone, Default)]
pub struct TrainingSummary {
    /// Number of completed episodes
    pub num_episodes: usize,
    /// Average final portfolio value
    pub avg_final_value: f64,
    /// Best final portfolio value
    pub best_final_value: f64,
    /// Final portfolio value of the last completed episode
    pub last_final_value: f64,
    /// Average total reward per episode
    pub avg_reward: f64,
    /// Exploration rate at the end of the run
    pub final_epsilon: f64,
    /// Whether a stop request cut the run short
    pub interrupted: bool,
    /// Whether the end-of-run checkpoint was written
    pub final_checkpoint_saved: bool,
    /// Saves that failed (periodic and final)
    pub checkpoint_failures: usize,
    /// Per-episode metrics, in order
    pub episodes: Vec<EpisodeMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureSeries;
    use crate::rl::config::DqnConfig;
    use crate::rl::environment::TradingEnvConfig;
    use crate::rl::training::checkpointing::{AgentCheckpoint, MockCheckpointStore};
    use chrono::NaiveDate;
    use std::sync::Mutex;

    fn setup() -> (DqnAgent, TradingEnvironment) {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series =
            FeatureSeries::from_prices(start, &[100.0, 102.0, 101.0, 105.0, 103.0, 108.0]).unwrap();
        let env = TradingEnvironment::new(series, TradingEnvConfig::default()).unwrap();
        let agent_config = DqnConfig {
            hidden_layers: vec![8],
            ..Default::default()
        };
        let agent = DqnAgent::new(env.observation_dim(), agent_config, 100, 3).unwrap();
        (agent, env)
    }

    fn training(episodes: usize, every: usize) -> TrainingConfig {
        TrainingConfig {
            episodes,
            batch_size: 4,
            checkpoint_frequency: every,
            ..Default::default()
        }
    }

    #[test]
    fn test_periodic_and_final_saves() {
        let (mut agent, mut env) = setup();
        let mut store = MockCheckpointStore::new();
        // Episodes 2 and 4, plus the final save
        store.expect_save().times(3).returning(|_| Ok(()));
        store.expect_location().return_const("mock".to_string());

        let summary = TrainingLoop::new(training(5, 2), Box::new(store))
            .run(&mut agent, &mut env)
            .unwrap();

        assert_eq!(summary.num_episodes, 5);
        assert!(!summary.interrupted);
        assert!(summary.final_checkpoint_saved);
        assert_eq!(summary.checkpoint_failures, 0);
        assert_eq!(agent.episodes_trained(), 5);
        let indices: Vec<usize> = summary.episodes.iter().map(|m| m.episode).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5]);
        // Five steps per episode over six rows
        assert!(summary.episodes.iter().all(|m| m.steps == 5));
    }

    #[test]
    fn test_save_failures_do_not_stop_training() {
        let (mut agent, mut env) = setup();
        let mut store = MockCheckpointStore::new();
        store
            .expect_save()
            .times(4)
            .returning(|_| Err(DqnError::Checkpoint("disk full".to_string())));
        store.expect_location().return_const("mock".to_string());

        let summary = TrainingLoop::new(training(3, 1), Box::new(store))
            .run(&mut agent, &mut env)
            .unwrap();

        assert_eq!(summary.num_episodes, 3);
        assert!(!summary.final_checkpoint_saved);
        assert_eq!(summary.checkpoint_failures, 4);
    }

    #[test]
    fn test_preset_stop_flag_still_saves() {
        let (mut agent, mut env) = setup();
        let mut store = MockCheckpointStore::new();
        store.expect_save().times(1).returning(|_| Ok(()));
        store.expect_location().return_const("mock".to_string());

        let trainer = TrainingLoop::new(training(10, 100), Box::new(store));
        trainer.stop_flag().store(true, Ordering::SeqCst);
        let summary = trainer.run(&mut agent, &mut env).unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.num_episodes, 0);
        assert!(summary.final_checkpoint_saved);
    }

    #[test]
    fn test_final_save_carries_scaler() {
        let (mut agent, mut env) = setup();
        let expected = env.scaler().clone();
        let mut store = MockCheckpointStore::new();
        store
            .expect_save()
            .withf(move |ckpt| ckpt.scaler.as_ref() == Some(&expected) && ckpt.episodes_trained == 1)
            .times(1)
            .returning(|_| Ok(()));
        store.expect_location().return_const("mock".to_string());

        TrainingLoop::new(training(1, 100), Box::new(store))
            .run(&mut agent, &mut env)
            .unwrap();
    }

    #[test]
    fn test_invalid_config_rejected_before_training() {
        let (mut agent, mut env) = setup();
        let mut store = MockCheckpointStore::new();
        store.expect_save().never();
        store.expect_location().return_const("mock".to_string());

        let result = TrainingLoop::new(training(2, 0), Box::new(store)).run(&mut agent, &mut env);

        assert!(matches!(result, Err(DqnError::Validation(_))));
        assert_eq!(agent.episodes_trained(), 0);
    }

    #[test]
    fn test_error_mid_run_still_saves_final_checkpoint() {
        let (_, mut env) = setup();
        // Agent sized for a different observation, so the first greedy step fails
        let agent_config = DqnConfig {
            hidden_layers: vec![8],
            ..Default::default()
        };
        let mut agent = DqnAgent::new(env.observation_dim() + 1, agent_config, 100, 3).unwrap();
        agent.set_epsilon(0.0);

        let mut store = MockCheckpointStore::new();
        store
            .expect_save()
            .withf(|ckpt| ckpt.episodes_trained == 0)
            .times(1)
            .returning(|_| Ok(()));
        store.expect_location().return_const("mock".to_string());

        let result = TrainingLoop::new(training(3, 1), Box::new(store)).run(&mut agent, &mut env);
        assert!(result.is_err());
    }

    /// Panics on its first save, records every save attempt
    struct PanickyStore {
        saves: Arc<Mutex<Vec<usize>>>,
    }

    impl CheckpointStore for PanickyStore {
        fn exists(&self) -> bool {
            false
        }

        fn save(&self, checkpoint: &AgentCheckpoint) -> Result<()> {
            let first = {
                let mut saves = self.saves.lock().unwrap();
                saves.push(checkpoint.episodes_trained);
                saves.len() == 1
            };
            if first {
                panic!("storage backend crashed");
            }
            Ok(())
        }

        fn load(&self) -> Result<AgentCheckpoint> {
            Err(DqnError::Checkpoint("empty".to_string()))
        }

        fn location(&self) -> String {
            "panicky".to_string()
        }
    }

    #[test]
    fn test_panic_mid_run_still_saves_final_checkpoint() {
        let (mut agent, mut env) = setup();
        let saves = Arc::new(Mutex::new(Vec::new()));
        let store = PanickyStore {
            saves: Arc::clone(&saves),
        };
        let trainer = TrainingLoop::new(training(5, 1), Box::new(store));

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| trainer.run(&mut agent, &mut env)));

        assert!(outcome.is_err(), "panic must reach the caller");
        // Periodic save after episode 1 panicked; the final save followed once
        assert_eq!(*saves.lock().unwrap(), vec![1, 1]);
        assert_eq!(agent.episodes_trained(), 1);
    }

    #[test]
    fn test_summarize_results() {
        let metric = |episode, value| EpisodeMetrics {
            episode,
            final_portfolio_value: value,
            epsilon: 1.0,
            total_reward: value - 100.0,
            steps: 1,
            replay: None,
        };
        let summary = summarize_results(&[metric(1, 110.0), metric(2, 90.0)]);
        assert_eq!(summary.num_episodes, 2);
        assert_eq!(summary.avg_final_value, 100.0);
        assert_eq!(summary.best_final_value, 110.0);
        assert_eq!(summary.last_final_value, 90.0);
        assert_eq!(summary.avg_reward, 0.0);
    }
}

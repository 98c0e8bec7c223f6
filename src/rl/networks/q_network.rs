//! Q-Network (action-value function)
//!
//! Maps an observation to one Q-value per discrete action. Backed by the
//! dense MLP in [`crate::ml`] and trained with Adam on a squared error.

use rand::Rng;

use crate::error::{DqnError, Result};
use crate::ml::{Activation, Adam, DenseNetwork};
use crate::rl::core::action::{DiscreteAction, NUM_DISCRETE_ACTIONS};

/// Q-value approximator with its optimizer state
#[derive(Debug, Clone)]
pub struct QNetwork {
    network: DenseNetwork,
    optimizer: Adam,
}

impl QNetwork {
    /// Randomly initialised network: `input_dim -> hidden... -> 3`, ReLU hidden layers
    pub fn new<R: Rng + ?Sized>(
        input_dim: usize,
        hidden_layers: &[usize],
        learning_rate: f64,
        rng: &mut R,
    ) -> Result<Self> {
        let mut sizes = Vec::with_capacity(hidden_layers.len() + 2);
        sizes.push(input_dim);
        sizes.extend_from_slice(hidden_layers);
        sizes.push(NUM_DISCRETE_ACTIONS);

        let network = DenseNetwork::random(&sizes, Activation::Relu, rng)?;
        Ok(Self {
            network,
            optimizer: Adam::with_lr(learning_rate),
        })
    }

    /// Wrap existing weights, e.g. from a checkpoint
    pub fn from_network(network: DenseNetwork, learning_rate: f64) -> Result<Self> {
        network.validate().map_err(DqnError::Validation)?;
        if network.output_dim() != NUM_DISCRETE_ACTIONS {
            return Err(DqnError::Validation(format!(
                "Q-network must have {} outputs, found {}",
                NUM_DISCRETE_ACTIONS,
                network.output_dim()
            )));
        }
        Ok(Self {
            network,
            optimizer: Adam::with_lr(learning_rate),
        })
    }

    pub fn network(&self) -> &DenseNetwork {
        &self.network
    }

    pub fn input_dim(&self) -> usize {
        self.network.input_dim
    }

    /// Q-values indexed by action
    pub fn q_values(&self, observation: &[f64]) -> Result<Vec<f64>> {
        self.network.forward(observation)
    }

    /// Argmax action; ties go to the lowest index
    pub fn best_action(&self, observation: &[f64]) -> Result<DiscreteAction> {
        let q = self.q_values(observation)?;
        let idx = argmax(&q);
        DiscreteAction::try_from(idx)
    }

    /// `max_a Q(s, a)`
    pub fn max_q(&self, observation: &[f64]) -> Result<f64> {
        let q = self.q_values(observation)?;
        Ok(q.iter().copied().fold(f64::NEG_INFINITY, f64::max))
    }

    /// One Adam step moving `Q(s, action)` toward `target`.
    ///
    /// The other action slots are their own targets, so they contribute no
    /// gradient. Returns the mean squared error before the update.
    pub fn fit_target(
        &mut self,
        observation: &[f64],
        action: DiscreteAction,
        target: f64,
    ) -> Result<f64> {
        let cache = self.network.forward_cached(observation)?;
        let slot = action.to_index();
        let error = cache.output[slot] - target;

        let n = cache.output.len() as f64;
        let mut grad = vec![0.0; cache.output.len()];
        grad[slot] = 2.0 * error / n;

        let grads = self.network.backward(&cache, &grad)?;
        self.optimizer.step(&mut self.network, &grads);

        Ok(error * error / n)
    }
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

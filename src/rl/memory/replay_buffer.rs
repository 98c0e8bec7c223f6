//! Replay Buffer
//!
//! Bounded FIFO experience store for off-policy learning.

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{DqnError, Result};
use crate::rl::core::DiscreteAction;

/// A single transition in the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Observation before the action
    pub state: Vec<f64>,
    /// Action taken
    pub action: DiscreteAction,
    /// Reward received
    pub reward: f64,
    /// Observation after the action
    pub next_state: Vec<f64>,
    /// Whether the episode ended with this transition
    pub done: bool,
}

impl Transition {
    /// Create a new transition
    pub fn new(
        state: Vec<f64>,
        action: DiscreteAction,
        reward: f64,
        next_state: Vec<f64>,
        done: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
        }
    }
}

/// Replay buffer for experience storage
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    /// Storage for transitions, oldest first
    buffer: VecDeque<Transition>,
    /// Maximum capacity
    capacity: usize,
}

impl ReplayBuffer {
    /// Create a new replay buffer with given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a transition, evicting the oldest one when full
    pub fn push(&mut self, transition: Transition) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    /// Sample `batch_size` distinct transitions uniformly at random.
    ///
    /// Asking for more than `len()` is a caller error.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Vec<&Transition>> {
        if batch_size > self.buffer.len() {
            return Err(DqnError::Validation(format!(
                "cannot sample {} transitions from a buffer of {}",
                batch_size,
                self.buffer.len()
            )));
        }

        Ok(index::sample(rng, self.buffer.len(), batch_size)
            .into_iter()
            .map(|i| &self.buffer[i])
            .collect())
    }

    /// Iterate transitions, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }

    /// Get current number of transitions
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Check if buffer has enough samples for training
    pub fn has_enough_samples(&self, min_samples: usize) -> bool {
        self.buffer.len() >= min_samples
    }

    /// Get buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

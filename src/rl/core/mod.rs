//! Core RL abstractions
//!
//! Fundamental types for actions and state representation.

pub mod action;
pub mod state;

pub use action::{DiscreteAction, NUM_DISCRETE_ACTIONS};
pub use state::{MinMaxScaler, ObservationEncoder, ScalerFit};

//! Lightweight ML utilities.
//!
//! This module is intentionally dependency-light: a dense MLP with manual
//! backpropagation and an Adam optimizer, enough for the Q-value
//! approximator without a tensor framework.

pub mod dense;
pub mod optimizer;

pub use dense::{Activation, DenseLayer, DenseNetwork, ForwardCache, Gradients};
pub use optimizer::Adam;

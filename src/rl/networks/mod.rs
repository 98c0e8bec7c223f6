//! Neural Network Architectures
//!
//! Value-function approximators for value-based methods.

pub mod q_network;

pub use q_network::QNetwork;

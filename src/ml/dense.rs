//! Dense neural network (CPU-only).
//!
//! Small MLPs with JSON serialization, used as the Q-value approximator:
//! - forward inference with explicit shape validation
//! - cached forward pass + backpropagation for gradient updates
//!
//! Design goals:
//! - Stable, deterministic, dependency-light.
//! - Explicit shape validation (fail fast on corrupt checkpoints).

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{DqnError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    Tanh,
    Sigmoid,
}

impl Default for Activation {
    fn default() -> Self {
        Self::Linear
    }
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
        }
    }

    /// Derivative expressed through the pre-activation `z` and output `a`
    fn derivative(self, z: f64, a: f64) -> f64 {
        match self {
            Activation::Linear => 1.0,
            Activation::Relu => {
                if z > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => 1.0 - a * a,
            Activation::Sigmoid => a * (1.0 - a),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Weights shape: [out_dim][in_dim]
    pub weights: Vec<Vec<f64>>,
    /// Bias shape: [out_dim]
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

impl DenseLayer {
    /// He-uniform initialised layer with zero bias
    pub fn random<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let limit = (6.0 / in_dim.max(1) as f64).sqrt();
        let weights = (0..out_dim)
            .map(|_| (0..in_dim).map(|_| rng.gen_range(-limit..limit)).collect())
            .collect();

        Self {
            weights,
            bias: vec![0.0; out_dim],
            activation,
        }
    }

    pub fn in_dim(&self) -> usize {
        self.weights.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn out_dim(&self) -> usize {
        self.weights.len()
    }

    /// Pre-activation values `W·x + b`
    fn pre_activation(&self, x: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(x).fold(*b, |acc, (w, xi)| acc + w * xi))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseNetwork {
    /// Expected input dimension.
    pub input_dim: usize,

    pub layers: Vec<DenseLayer>,

    /// Optional free-form metadata (versioning, training info, etc).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Intermediate values from a forward pass, needed for backpropagation
#[derive(Debug, Clone)]
pub struct ForwardCache {
    /// Layer inputs; `inputs[0]` is the network input
    inputs: Vec<Vec<f64>>,
    /// Pre-activation values per layer
    pre_activations: Vec<Vec<f64>>,
    /// Network output
    pub output: Vec<f64>,
}

/// Per-layer parameter gradients, same shapes as the network
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub weights: Vec<Vec<Vec<f64>>>,
    pub bias: Vec<Vec<f64>>,
}

impl Gradients {
    /// All-zero gradients shaped like `network`
    pub fn zeros_like(network: &DenseNetwork) -> Self {
        Self {
            weights: network
                .layers
                .iter()
                .map(|l| vec![vec![0.0; l.in_dim()]; l.out_dim()])
                .collect(),
            bias: network.layers.iter().map(|l| vec![0.0; l.out_dim()]).collect(),
        }
    }

    /// Accumulate `other` into `self`
    pub fn add_assign(&mut self, other: &Gradients) {
        for (lw, ow) in self.weights.iter_mut().zip(&other.weights) {
            for (row, orow) in lw.iter_mut().zip(ow) {
                for (g, o) in row.iter_mut().zip(orow) {
                    *g += o;
                }
            }
        }
        for (lb, ob) in self.bias.iter_mut().zip(&other.bias) {
            for (g, o) in lb.iter_mut().zip(ob) {
                *g += o;
            }
        }
    }

    pub fn scale(&mut self, factor: f64) {
        self.weights
            .iter_mut()
            .flatten()
            .flatten()
            .chain(self.bias.iter_mut().flatten())
            .for_each(|g| *g *= factor);
    }
}

impl DenseNetwork {
    /// Randomly initialised MLP.
    ///
    /// `layer_sizes` = [input, hidden..., output]; hidden layers use
    /// `hidden_activation`, the output layer is linear.
    pub fn random<R: Rng + ?Sized>(
        layer_sizes: &[usize],
        hidden_activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        if layer_sizes.len() < 2 {
            return Err(DqnError::Validation(
                "layer_sizes needs at least input and output".to_string(),
            ));
        }

        let last = layer_sizes.len() - 2;
        let layers = layer_sizes
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let act = if i == last {
                    Activation::Linear
                } else {
                    hidden_activation
                };
                DenseLayer::random(w[0], w[1], act, &mut *rng)
            })
            .collect();

        let network = Self {
            input_dim: layer_sizes[0],
            layers,
            metadata: serde_json::json!({}),
        };
        network.validate().map_err(DqnError::Validation)?;
        Ok(network)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.input_dim == 0 {
            return Err("input_dim must be > 0".to_string());
        }
        if self.layers.is_empty() {
            return Err("layers must not be empty".to_string());
        }

        let mut expected_in = self.input_dim;
        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.out_dim() == 0 {
                return Err(format!("layer[{idx}] out_dim must be > 0"));
            }
            if layer.bias.len() != layer.out_dim() {
                return Err(format!(
                    "layer[{idx}] bias len {} != out_dim {}",
                    layer.bias.len(),
                    layer.out_dim()
                ));
            }
            for (r, row) in layer.weights.iter().enumerate() {
                if row.len() != expected_in {
                    return Err(format!(
                        "layer[{idx}] weights row {r} len {} != expected in_dim {expected_in}",
                        row.len()
                    ));
                }
                if row.iter().any(|v| !v.is_finite()) {
                    return Err(format!("layer[{idx}] weights contain non-finite values"));
                }
            }
            if layer.bias.iter().any(|v| !v.is_finite()) {
                return Err(format!("layer[{idx}] bias contain non-finite values"));
            }
            expected_in = layer.out_dim();
        }
        Ok(())
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map(|l| l.out_dim()).unwrap_or(0)
    }

    fn check_input(&self, input: &[f64]) -> Result<()> {
        if input.len() != self.input_dim {
            return Err(DqnError::Validation(format!(
                "DenseNetwork input dim mismatch: got {}, expected {}",
                input.len(),
                self.input_dim
            )));
        }
        Ok(())
    }

    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        self.check_input(input)?;

        let mut x: Vec<f64> = input.to_vec();
        for layer in &self.layers {
            x = layer
                .pre_activation(&x)
                .into_iter()
                .map(|z| layer.activation.apply(z))
                .collect();
        }

        Ok(x)
    }

    /// Forward pass that keeps every layer's input and pre-activation
    pub fn forward_cached(&self, input: &[f64]) -> Result<ForwardCache> {
        self.check_input(input)?;

        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut pre_activations = Vec::with_capacity(self.layers.len());
        let mut x: Vec<f64> = input.to_vec();

        for layer in &self.layers {
            let z = layer.pre_activation(&x);
            let a: Vec<f64> = z.iter().map(|&v| layer.activation.apply(v)).collect();
            inputs.push(x);
            pre_activations.push(z);
            x = a;
        }

        Ok(ForwardCache {
            inputs,
            pre_activations,
            output: x,
        })
    }

    /// Backpropagate `output_grad` (dLoss/dOutput) through a cached pass
    pub fn backward(&self, cache: &ForwardCache, output_grad: &[f64]) -> Result<Gradients> {
        if output_grad.len() != self.output_dim() {
            return Err(DqnError::Validation(format!(
                "output gradient dim mismatch: got {}, expected {}",
                output_grad.len(),
                self.output_dim()
            )));
        }

        let mut grads = Gradients::zeros_like(self);
        let mut delta_out: Vec<f64> = output_grad.to_vec();

        for (idx, layer) in self.layers.iter().enumerate().rev() {
            let z = &cache.pre_activations[idx];
            let x = &cache.inputs[idx];
            let a_next = if idx + 1 < self.layers.len() {
                &cache.inputs[idx + 1]
            } else {
                &cache.output
            };

            // dL/dz for this layer
            let delta: Vec<f64> = delta_out
                .iter()
                .zip(z.iter().zip(a_next))
                .map(|(d, (&zi, &ai))| d * layer.activation.derivative(zi, ai))
                .collect();

            for (o, &d) in delta.iter().enumerate() {
                grads.bias[idx][o] = d;
                for (i, &xi) in x.iter().enumerate() {
                    grads.weights[idx][o][i] = d * xi;
                }
            }

            if idx > 0 {
                let mut prev = vec![0.0; layer.in_dim()];
                for (o, &d) in delta.iter().enumerate() {
                    for (i, w) in layer.weights[o].iter().enumerate() {
                        prev[i] += w * d;
                    }
                }
                delta_out = prev;
            }
        }

        Ok(grads)
    }
}

fn sigmoid(x: f64) -> f64 {
    // Numerically-stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

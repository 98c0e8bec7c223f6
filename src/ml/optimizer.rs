//! Adam optimizer over a [`DenseNetwork`].

use super::dense::{DenseNetwork, Gradients};

/// Adam (Kingma & Ba) with bias correction.
///
/// Moment buffers are created lazily on the first step so the optimizer
/// can be constructed before the network shape is known.
#[derive(Debug, Clone)]
pub struct Adam {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    t: u64,
    m: Option<Gradients>,
    v: Option<Gradients>,
}

impl Adam {
    pub fn new(lr: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: None,
            v: None,
        }
    }

    /// Default betas/epsilon with the given learning rate
    pub fn with_lr(lr: f64) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8)
    }

    /// Number of steps applied so far
    pub fn steps(&self) -> u64 {
        self.t
    }

    /// Apply one descent step of `grads` to `network`
    pub fn step(&mut self, network: &mut DenseNetwork, grads: &Gradients) {
        let m = self.m.get_or_insert_with(|| Gradients::zeros_like(network));
        let v = self.v.get_or_insert_with(|| Gradients::zeros_like(network));
        self.t += 1;

        let (b1, b2) = (self.beta1, self.beta2);
        let bias1 = 1.0 - b1.powi(self.t as i32);
        let bias2 = 1.0 - b2.powi(self.t as i32);
        let lr = self.lr;
        let eps = self.epsilon;

        let update = |param: &mut f64, g: f64, m: &mut f64, v: &mut f64| {
            *m = b1 * *m + (1.0 - b1) * g;
            *v = b2 * *v + (1.0 - b2) * g * g;
            let m_hat = *m / bias1;
            let v_hat = *v / bias2;
            *param -= lr * m_hat / (v_hat.sqrt() + eps);
        };

        for (l, layer) in network.layers.iter_mut().enumerate() {
            for (o, row) in layer.weights.iter_mut().enumerate() {
                for (i, w) in row.iter_mut().enumerate() {
                    update(
                        w,
                        grads.weights[l][o][i],
                        &mut m.weights[l][o][i],
                        &mut v.weights[l][o][i],
                    );
                }
            }
            for (o, b) in layer.bias.iter_mut().enumerate() {
                update(b, grads.bias[l][o], &mut m.bias[l][o], &mut v.bias[l][o]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::dense::{Activation, DenseLayer};

    fn scalar_net(w: f64) -> DenseNetwork {
        DenseNetwork {
            input_dim: 1,
            layers: vec![DenseLayer {
                weights: vec![vec![w]],
                bias: vec![0.0],
                activation: Activation::Linear,
            }],
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn first_step_moves_by_learning_rate() {
        let mut net = scalar_net(1.0);
        let mut adam = Adam::with_lr(0.01);
        let mut grads = Gradients::zeros_like(&net);
        grads.weights[0][0][0] = 5.0;

        adam.step(&mut net, &grads);

        // Bias-corrected first step has magnitude ~lr regardless of gradient scale
        assert!((net.layers[0].weights[0][0] - 0.99).abs() < 1e-6);
        assert_eq!(net.layers[0].bias[0], 0.0);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn minimises_quadratic() {
        // Fit y = 3x on a single point
        let mut net = scalar_net(0.0);
        let mut adam = Adam::with_lr(0.05);
        for _ in 0..2000 {
            let cache = net.forward_cached(&[1.0]).unwrap();
            let err = cache.output[0] - 3.0;
            let grads = net.backward(&cache, &[err]).unwrap();
            adam.step(&mut net, &grads);
        }
        let y = net.forward(&[1.0]).unwrap()[0];
        assert!((y - 3.0).abs() < 1e-2, "y = {y}");
    }
}

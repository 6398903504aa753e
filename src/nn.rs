use rand::Rng;

use crate::engine::Value;
use crate::error::{Error, Result};

/// Squashing applied to a neuron's weighted sum.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum Activation {
    #[default]
    Tanh,
    ReLU,
    Linear,
}

impl Activation {
    fn apply(&self, act: Value) -> Value {
        match self {
            Activation::Tanh => act.tanh(),
            Activation::ReLU => act.relu(),
            Activation::Linear => act,
        }
    }
}

fn to_values<X: Clone + Into<Value>>(x: &[X]) -> Vec<Value> {
    x.iter().cloned().map(Into::into).collect()
}

pub struct Neuron {
    weights: Vec<Value>,
    bias: Value,
    activation: Activation,
}

impl Neuron {
    /// A tanh neuron with `nin` weights and a bias, each drawn uniformly from [-1, 1].
    /// Parameters built this way carry no labels.
    pub fn new(nin: usize) -> Neuron {
        Neuron::sample(nin, None, &mut rand::thread_rng())
    }

    /// Like `new`, drawing from `rng` and labelling parameters
    /// `{neuron_name}.w{i}` and `{neuron_name}.b`.
    pub fn with_rng<R: Rng + ?Sized>(nin: usize, neuron_name: &str, rng: &mut R) -> Neuron {
        Neuron::sample(nin, Some(neuron_name), rng)
    }

    fn sample<R: Rng + ?Sized>(nin: usize, neuron_name: Option<&str>, rng: &mut R) -> Neuron {
        let mut parameter = |suffix: String| {
            let p = Value::from(rng.gen_range(-1.0f64..=1.0));
            match neuron_name {
                Some(name) => p.with_label(&format!("{}.{}", name, suffix)),
                None => p,
            }
        };

        let weights = (0..nin).map(|i| parameter(format!("w{}", i))).collect();
        let bias = parameter("b".to_string());

        Neuron {
            weights,
            bias,
            activation: Activation::default(),
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Neuron {
        self.activation = activation;
        self
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn nin(&self) -> usize {
        self.weights.len()
    }

    /// `activation(sum(x_i * w_i) + b)`. Inputs may be nodes or raw numbers.
    pub fn forward<X: Clone + Into<Value>>(&self, x: &[X]) -> Result<Value> {
        if x.len() != self.nin() {
            return Err(Error::InputLength {
                expected: self.nin(),
                actual: x.len(),
            });
        }

        let act = self
            .weights
            .iter()
            .zip(to_values(x).iter())
            .map(|(wi, xi)| xi * wi)
            .sum::<Value>()
            + &self.bias;

        Ok(self.activation.apply(act))
    }

    /// `[w_0, ..., w_{n-1}, b]`.
    pub fn parameters(&self) -> Vec<Value> {
        self.weights
            .iter()
            .chain(std::iter::once(&self.bias))
            .cloned()
            .collect()
    }

    pub fn zero_grad(&self) {
        for p in self.parameters() {
            p.zero_grad();
        }
    }
}

pub struct Layer {
    nin: usize,
    neurons: Vec<Neuron>,
}

impl Layer {
    /// `nout` unlabelled tanh neurons reading `nin` inputs.
    pub fn new(nin: usize, nout: usize) -> Layer {
        Layer::sample(nin, nout, None, &mut rand::thread_rng())
    }

    /// Labels parameters `layer{layer_index}.neuron{j}.w{i}` / `.b`.
    pub fn with_rng<R: Rng + ?Sized>(
        nin: usize,
        nout: usize,
        layer_index: usize,
        rng: &mut R,
    ) -> Layer {
        Layer::sample(nin, nout, Some(layer_index), rng)
    }

    fn sample<R: Rng + ?Sized>(
        nin: usize,
        nout: usize,
        layer_index: Option<usize>,
        rng: &mut R,
    ) -> Layer {
        let neurons = (0..nout)
            .map(|neuron_index| {
                let name = layer_index
                    .map(|layer_index| format!("layer{}.neuron{}", layer_index, neuron_index));
                Neuron::sample(nin, name.as_deref(), &mut *rng)
            })
            .collect();

        Layer { nin, neurons }
    }

    pub fn with_activation(self, activation: Activation) -> Layer {
        Layer {
            nin: self.nin,
            neurons: self
                .neurons
                .into_iter()
                .map(|n| n.with_activation(activation))
                .collect(),
        }
    }

    pub fn nin(&self) -> usize {
        self.nin
    }

    pub fn nout(&self) -> usize {
        self.neurons.len()
    }

    pub fn neurons(&self) -> &[Neuron] {
        &self.neurons
    }

    /// One output per neuron, in neuron order. All neurons read the same input
    /// nodes, so raw numbers are wrapped once and shared.
    pub fn forward<X: Clone + Into<Value>>(&self, x: &[X]) -> Result<Vec<Value>> {
        if x.len() != self.nin {
            return Err(Error::InputLength {
                expected: self.nin,
                actual: x.len(),
            });
        }

        let x = to_values(x);
        self.neurons.iter().map(|n| n.forward(&x)).collect()
    }

    pub fn parameters(&self) -> Vec<Value> {
        self.neurons.iter().flat_map(|n| n.parameters()).collect()
    }

    pub fn zero_grad(&self) {
        for n in &self.neurons {
            n.zero_grad();
        }
    }
}

pub struct MLP {
    layers: Vec<Layer>,
}

impl MLP {
    /// Builds one tanh layer per entry of `nouts`, the first reading `nin` inputs.
    pub fn new(nin: usize, nouts: &[usize]) -> MLP {
        MLP::with_rng(nin, nouts, &mut rand::thread_rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(nin: usize, nouts: &[usize], rng: &mut R) -> MLP {
        let sizes = [nin]
            .iter()
            .chain(nouts.iter())
            .copied()
            .collect::<Vec<_>>();

        let layers = sizes
            .windows(2)
            .enumerate()
            .map(|(layer_index, w)| Layer::with_rng(w[0], w[1], layer_index, &mut *rng))
            .collect();

        MLP { layers }
    }

    /// Replaces the activation of the final layer, e.g. `Linear` for regression.
    pub fn with_output_activation(mut self, activation: Activation) -> MLP {
        if let Some(last) = self.layers.pop() {
            self.layers.push(last.with_activation(activation));
        }
        self
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn nin(&self) -> usize {
        self.layers.first().map_or(0, Layer::nin)
    }

    pub fn nout(&self) -> usize {
        self.layers.last().map_or(0, Layer::nout)
    }

    pub fn forward<X: Clone + Into<Value>>(&self, x: &[X]) -> Result<Vec<Value>> {
        let mut output = to_values(x);
        for layer in &self.layers {
            output = layer.forward(&output)?;
        }

        Ok(output)
    }

    /// Like `forward` for networks whose final layer has width 1.
    pub fn forward_scalar<X: Clone + Into<Value>>(&self, x: &[X]) -> Result<Value> {
        let mut output = self.forward(x)?;
        if output.len() != 1 {
            return Err(Error::OutputWidth(output.len()));
        }

        Ok(output.remove(0))
    }

    pub fn parameters(&self) -> Vec<Value> {
        self.layers.iter().flat_map(|l| l.parameters()).collect()
    }

    /// Resets every parameter's gradient. Call before each `backward`, since
    /// the reverse pass accumulates.
    pub fn zero_grad(&self) {
        for p in self.parameters() {
            p.zero_grad();
        }
    }
}

//! Reverse-mode automatic differentiation over scalar values, and a small
//! multi-layer perceptron built on it.

mod engine;
pub use crate::engine::{Operation, Value};

mod nn;
pub use crate::nn::{Activation, Layer, Neuron, MLP};

mod graph;
pub use crate::graph::create_graph;

pub mod cli;

pub mod error;
pub use crate::error::{Error, Result};

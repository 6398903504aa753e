//! Command-line arguments for the curve-fitting demo.

use clap::Parser;
use std::path::PathBuf;

/// Fit a small tanh MLP to a noisy line with scalar autograd and plain SGD
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "scalargrad")]
#[command(version)]
pub struct Cli {
    /// Number of training epochs
    #[arg(long, default_value_t = 300)]
    pub epochs: usize,

    /// SGD step size
    #[arg(long, default_value_t = 0.05)]
    pub learning_rate: f64,

    /// Number of training samples on [-1, 1]
    #[arg(long, default_value_t = 20)]
    pub samples: usize,

    /// Hidden layer widths, comma separated
    #[arg(long, value_delimiter = ',', default_values_t = vec![4, 4])]
    pub hidden: Vec<usize>,

    /// Seed for weight initialisation and noise; random when omitted
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print the loss every this many epochs
    #[arg(long, default_value_t = 10)]
    pub log_every: usize,

    /// Write the final loss graph in Graphviz DOT format to this path
    #[arg(long)]
    pub dot: Option<PathBuf>,
}

impl Cli {
    /// Layer widths for the network: the hidden layers followed by one output.
    pub fn layer_widths(&self) -> Vec<usize> {
        self.hidden.iter().copied().chain(std::iter::once(1)).collect()
    }
}

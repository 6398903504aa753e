//! Error types for scalargrad

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Domain error: {0}")]
    Domain(&'static str),

    #[error("Input length mismatch: expected {expected}, got {actual}")]
    InputLength { expected: usize, actual: usize },

    #[error("Expected a single output, the final layer has width {0}")]
    OutputWidth(usize),

    #[error("Graph rendering error: {0}")]
    Graph(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

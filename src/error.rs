//! Error types for tensorgrad.

use thiserror::Error;


/// Result type alias using tensorgrad's [Error].

pub type Result<T> = std::result::Result<T, Error>;


/// Errors that can occur in tensor operations and gradient computation.

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Shape(#[from] ShapeError),

  #[error(transparent)]
  Gradient(#[from] GradientError),

  /// The recorded operator kind has no derivative rule.
  #[error("operator '{op}' has no derivative rule")]
  UnsupportedOperator { op: &'static str },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] postcard::Error),
}


/// Dimension mismatches, reported before any output is created.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
  #[error("shape {dims:?} holds {expected} elements, got {actual} values")]
  DataLength { dims: Vec<usize>, expected: usize, actual: usize },

  #[error("cannot {op} tensors of shape {lhs:?} and {rhs:?}")]
  Mismatch { op: &'static str, lhs: Vec<usize>, rhs: Vec<usize> },

  #[error("cannot broadcast shape {from:?} to {to:?}")]
  Broadcast { from: Vec<usize>, to: Vec<usize> },

  #[error("inner dimensions of {lhs:?} and {rhs:?} don't agree for matrix multiplication")]
  InnerDims { lhs: Vec<usize>, rhs: Vec<usize> },

  #[error("{op} expects a tensor of rank {expected}, got rank {actual}")]
  Rank { op: &'static str, expected: usize, actual: usize },

  #[error("invalid dimension {dim} for tensor of rank {rank}")]
  InvalidDimension { dim: isize, rank: usize },

  #[error("index {index} out of bounds for dimension of size {size}")]
  IndexOutOfBounds { index: usize, size: usize },

  #[error("shape {dims:?} is not a row-major layout starting at zero")]
  Layout { dims: Vec<usize> },

  #[error("cannot view shape {from:?} as {to:?}")]
  View { from: Vec<usize>, to: Vec<usize> },

  #[error("expected a single-element tensor, got shape {dims:?}")]
  NotScalar { dims: Vec<usize> },

  #[error("expected {expected} inputs, got {actual}")]
  InputCount { expected: usize, actual: usize },

  #[error("upstream gradient of shape {got:?} doesn't match tensor of shape {expected:?}")]
  Upstream { expected: Vec<usize>, got: Vec<usize> },
}


/// Backward pass requested on something that cannot be differentiated.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GradientError {
  #[error("tensor {id} does not track gradients")]
  NotTracked { id: usize },

  #[error("computation graph of node {id} has been released")]
  GraphReleased { id: usize },
}

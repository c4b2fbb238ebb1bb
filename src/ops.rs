use std::fmt::Debug;

use crate::{
  error::Result,
  scalar::Real,
  tensor::Tensor,
  variable::mops::{ UnaryMops, BinaryMops },
};


/// Strided, read-only matrix operand handed to a [Cops] kernel.

#[derive(Debug, Clone, Copy)]
pub struct MatrixRef<'a, T> {
  pub data: &'a [T],
  pub offset: usize,
  pub row_stride: isize,
  pub col_stride: isize,
}


/// Low-level compute kernels.

pub trait Cops: Copy + Sized {
  /// Multiply a `rows x inner` matrix with an `inner x cols` matrix,
  /// producing a contiguous row-major result.
  fn gemm(rows: usize, inner: usize, cols: usize, lhs: MatrixRef<Self>, rhs: MatrixRef<Self>) -> Vec<Self>;
}


/// Unary computational operation that can also compute its derivative.

pub trait UnaryOp<T: Real>: Debug {
  fn name(&self) -> &'static str;
  fn run(&self, lhs: &Tensor<T>) -> Result<Tensor<T>>;
  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>>;
  fn as_enum(self) -> UnaryMops<T> where Self: Sized;
}


/// Binary computational operation that can also compute its derivative.

pub trait BinaryOp<T: Real>: Debug {
  fn name(&self) -> &'static str;
  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Result<Tensor<T>>;
  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> Result<(Tensor<T>, Tensor<T>)>;
  fn as_enum(self) -> BinaryMops where Self: Sized;
}

use serde::{ Serialize, Deserialize };

use crate::{
  internal::*,
  shape::{ Shape, broadcast_dims },
  tensor::Tensor,
  variable::Variable,
  scalar::Real,
  ops::{ UnaryOp, BinaryOp },
  error::{ Result, Error },
};


impl<T: Real> Variable<T> {
  // Bring both operands to a common shape through recorded broadcasts,
  // so that binary operators only ever see equal shapes.
  fn elementwise(&self, op: impl BinaryOp<T>, rhs: &Self) -> Result<Self> {
    if self.dims() == rhs.dims() { return self.binary_op(op, rhs) }
    let dims = broadcast_dims(op.name(), self.dims(), rhs.dims())?;
    let lhs = self.broadcast(&dims)?;
    let rhs = rhs.broadcast(&dims)?;
    lhs.binary_op(op, &rhs)
  }

  pub fn add(&self, rhs: &Self) -> Result<Self> {
    self.elementwise(Add, rhs)
  }

  pub fn sub(&self, rhs: &Self) -> Result<Self> {
    self.elementwise(Sub, rhs)
  }

  pub fn mul(&self, rhs: &Self) -> Result<Self> {
    self.elementwise(Mul, rhs)
  }

  pub fn div(&self, rhs: &Self) -> Result<Self> {
    self.elementwise(Div, rhs)
  }

  pub fn pow(&self, rhs: &Self) -> Result<Self> {
    self.elementwise(Pow, rhs)
  }

  /// Matrix product of two rank-2 variables.

  pub fn mm(&self, rhs: &Self) -> Result<Self> {
    self.binary_op(MatMul, rhs)
  }

  pub fn add_scalar(&self, value: T) -> Self {
    self.unary_with(AddScalar { value }, self.tensor() + value)
  }

  pub fn mul_scalar(&self, value: T) -> Self {
    self.unary_with(MulScalar { value }, self.tensor() * value)
  }

  pub fn powf(&self, exponent: T) -> Self {
    self.unary_with(PowScalar { exponent }, self.tensor().powf(exponent))
  }

  pub fn sqr(&self) -> Self {
    self.powf(cast(2))
  }

  pub fn sqrt(&self) -> Self {
    self.powf(T::one() / cast::<T>(2))
  }

  pub fn exp(&self) -> Self {
    self.unary_with(Exp, self.tensor().exp())
  }

  pub fn log(&self) -> Self {
    self.unary_with(Log, self.tensor().log())
  }

  pub fn relu(&self) -> Self {
    self.unary_with(ReLU, self.tensor().relu())
  }

  pub fn sigmoid(&self) -> Self {
    self.unary_with(Sigmoid, self.tensor().sigmoid())
  }

  /// Rounds to the nearest integer. Has no derivative, so backward
  /// passes through the result fail.

  pub fn round(&self) -> Self {
    self.unary_with(Round, self.tensor().round())
  }

  pub fn sum(&self) -> Self {
    self.unary_with(Sum { dim: None }, self.tensor().sum())
  }

  pub fn sum_dim(&self, dim: isize) -> Result<Self> {
    self.unary_op(Sum { dim: Some(dim) })
  }

  pub fn mean(&self) -> Self {
    self.unary_with(Mean { dim: None }, self.tensor().mean())
  }

  pub fn mean_dim(&self, dim: isize) -> Result<Self> {
    self.unary_op(Mean { dim: Some(dim) })
  }

  /// Euclidean norm over all elements.

  pub fn norm(&self) -> Self {
    self.sqr().sum().sqrt()
  }

  pub fn reshape(&self, dims: &[usize]) -> Result<Self> {
    self.unary_op(Reshape { dims: dims.to_vec() })
  }

  /// Like [reshape](Variable::reshape), with a single `0` in `dims`
  /// standing for the size that makes the element count match.

  pub fn view(&self, dims: &[usize]) -> Result<Self> {
    let shape = Shape::new(self.dims()).view(dims)?;
    self.reshape(&shape.dims)
  }

  pub fn transpose(&self, dim1: isize, dim2: isize) -> Result<Self> {
    self.unary_op(Transpose { dim1, dim2 })
  }

  pub fn select(&self, dim: isize, index: usize) -> Result<Self> {
    self.unary_op(Select { dim, index })
  }

  /// Fix the leading dimensions to `indices`.

  pub fn at(&self, indices: &[usize]) -> Result<Self> {
    indices.iter().try_fold(self.clone(), |variable, &index| variable.select(0, index) )
  }

  pub fn broadcast(&self, dims: &[usize]) -> Result<Self> {
    if self.dims() == dims { return Ok(self.clone()) }
    self.unary_op(Broadcast { dims: dims.to_vec() })
  }

  pub fn unsqueeze(&self, dim: isize) -> Result<Self> {
    let shape = self.shape().unsqueeze(dim)?;
    self.reshape(&shape.dims)
  }

  pub fn squeeze(&self) -> Result<Self> {
    let shape = self.shape().squeeze();
    if shape.dims == self.dims() { return Ok(self.clone()) }
    self.reshape(&shape.dims)
  }
}

impl<T: Real> std::ops::Neg for &Variable<T> {
  type Output = Variable<T>;

  fn neg(self) -> Self::Output {
    self.unary_with(Neg, -self.tensor())
  }
}

impl<T: Real> std::ops::Neg for Variable<T> {
  type Output = Variable<T>;

  fn neg(self) -> Self::Output {
    -&self
  }
}

impl<T: Real> std::ops::Add<T> for &Variable<T> { // &variable + T
  type Output = Variable<T>;

  fn add(self, rhs: T) -> Variable<T> {
    self.add_scalar(rhs)
  }
}

impl<T: Real> std::ops::Sub<T> for &Variable<T> { // &variable - T
  type Output = Variable<T>;

  fn sub(self, rhs: T) -> Variable<T> {
    self.add_scalar(-rhs)
  }
}

impl<T: Real> std::ops::Mul<T> for &Variable<T> { // &variable * T
  type Output = Variable<T>;

  fn mul(self, rhs: T) -> Variable<T> {
    self.mul_scalar(rhs)
  }
}

impl<T: Real> std::ops::Div<T> for &Variable<T> { // &variable / T
  type Output = Variable<T>;

  fn div(self, rhs: T) -> Variable<T> {
    self.mul_scalar(T::one() / rhs)
  }
}

macro_rules! scalar_operators {
  ($type:ty) => {
    impl std::ops::Add<&Variable<$type>> for $type { // T + &variable
      type Output = Variable<$type>;

      fn add(self, rhs: &Variable<$type>) -> Variable<$type> {
        rhs.add_scalar(self)
      }
    }

    impl std::ops::Sub<&Variable<$type>> for $type { // T - &variable
      type Output = Variable<$type>;

      fn sub(self, rhs: &Variable<$type>) -> Variable<$type> {
        (-rhs).add_scalar(self)
      }
    }

    impl std::ops::Mul<&Variable<$type>> for $type { // T * &variable
      type Output = Variable<$type>;

      fn mul(self, rhs: &Variable<$type>) -> Variable<$type> {
        rhs.mul_scalar(self)
      }
    }

    impl std::ops::Div<&Variable<$type>> for $type { // T / &variable
      type Output = Variable<$type>;

      fn div(self, rhs: &Variable<$type>) -> Variable<$type> {
        rhs.powf(-1.0).mul_scalar(self)
      }
    }
  };
}

scalar_operators!(f32);
scalar_operators!(f64);


/// Closed set of unary operators a graph node can record.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UnaryMops<T> {
  Neg(Neg),
  AddScalar(AddScalar<T>),
  MulScalar(MulScalar<T>),
  PowScalar(PowScalar<T>),
  Exp(Exp),
  Log(Log),
  ReLU(ReLU),
  Sigmoid(Sigmoid),
  Round(Round),
  Sum(Sum),
  Mean(Mean),
  Reshape(Reshape),
  Transpose(Transpose),
  Select(Select),
  Broadcast(Broadcast),
}

impl<T: Real> UnaryMops<T> {
  pub fn as_unary_op(&self) -> &dyn UnaryOp<T> {
    match self {
      Self::Neg(op) => op,
      Self::AddScalar(op) => op,
      Self::MulScalar(op) => op,
      Self::PowScalar(op) => op,
      Self::Exp(op) => op,
      Self::Log(op) => op,
      Self::ReLU(op) => op,
      Self::Sigmoid(op) => op,
      Self::Round(op) => op,
      Self::Sum(op) => op,
      Self::Mean(op) => op,
      Self::Reshape(op) => op,
      Self::Transpose(op) => op,
      Self::Select(op) => op,
      Self::Broadcast(op) => op,
    }
  }
}


/// Closed set of binary operators a graph node can record.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BinaryMops {
  Add(Add),
  Sub(Sub),
  Mul(Mul),
  Div(Div),
  Pow(Pow),
  MatMul(MatMul),
}

impl BinaryMops {
  pub fn as_binary_op<T: Real>(&self) -> &dyn BinaryOp<T> {
    match self {
      Self::Add(op) => op,
      Self::Sub(op) => op,
      Self::Mul(op) => op,
      Self::Div(op) => op,
      Self::Pow(op) => op,
      Self::MatMul(op) => op,
    }
  }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Add;

impl<T: Real> BinaryOp<T> for Add {
  fn name(&self) -> &'static str { "add" }

  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Result<Tensor<T>> {
    lhs.add(rhs)
  }

  fn derive(&self, _lhs: &Tensor<T>, _rhs: &Tensor<T>, grad: &Tensor<T>) -> Result<(Tensor<T>, Tensor<T>)> {
    Ok((grad.clone(), grad.clone()))
  }

  fn as_enum(self) -> BinaryMops { BinaryMops::Add(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sub;

impl<T: Real> BinaryOp<T> for Sub {
  fn name(&self) -> &'static str { "sub" }

  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Result<Tensor<T>> {
    lhs.sub(rhs)
  }

  fn derive(&self, _lhs: &Tensor<T>, _rhs: &Tensor<T>, grad: &Tensor<T>) -> Result<(Tensor<T>, Tensor<T>)> {
    Ok((grad.clone(), -grad))
  }

  fn as_enum(self) -> BinaryMops { BinaryMops::Sub(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mul;

impl<T: Real> BinaryOp<T> for Mul {
  fn name(&self) -> &'static str { "mul" }

  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Result<Tensor<T>> {
    lhs.mul(rhs)
  }

  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> Result<(Tensor<T>, Tensor<T>)> {
    Ok((grad.mul(rhs)?, grad.mul(lhs)?))
  }

  fn as_enum(self) -> BinaryMops { BinaryMops::Mul(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Div;

impl<T: Real> BinaryOp<T> for Div {
  fn name(&self) -> &'static str { "div" }

  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Result<Tensor<T>> {
    lhs.div(rhs)
  }

  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> Result<(Tensor<T>, Tensor<T>)> {
    let grad_l = grad.div(rhs)?;
    let grad_r = (-grad).mul(lhs)?.div(&rhs.powf(cast(2)))?;
    Ok((grad_l, grad_r))
  }

  fn as_enum(self) -> BinaryMops { BinaryMops::Div(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pow;

impl<T: Real> BinaryOp<T> for Pow {
  fn name(&self) -> &'static str { "pow" }

  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Result<Tensor<T>> {
    lhs.pow(rhs)
  }

  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> Result<(Tensor<T>, Tensor<T>)> {
    let grad_l = grad.mul(rhs)?.mul(&lhs.pow(&(rhs - T::one()))?)?;
    let grad_r = grad.mul(&lhs.pow(rhs)?)?.mul(&lhs.log())?;
    Ok((grad_l, grad_r))
  }

  fn as_enum(self) -> BinaryMops { BinaryMops::Pow(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatMul;

impl<T: Real> BinaryOp<T> for MatMul {
  fn name(&self) -> &'static str { "mm" }

  fn run(&self, lhs: &Tensor<T>, rhs: &Tensor<T>) -> Result<Tensor<T>> {
    lhs.mm(rhs)
  }

  fn derive(&self, lhs: &Tensor<T>, rhs: &Tensor<T>, grad: &Tensor<T>) -> Result<(Tensor<T>, Tensor<T>)> {
    let grad_l = grad.mm(&rhs.transpose(0, 1)?)?;
    let grad_r = lhs.transpose(0, 1)?.mm(grad)?;
    Ok((grad_l, grad_r))
  }

  fn as_enum(self) -> BinaryMops { BinaryMops::MatMul(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neg;

impl<T: Real> UnaryOp<T> for Neg {
  fn name(&self) -> &'static str { "neg" }

  fn run(&self, lhs: &Tensor<T>) -> Result<Tensor<T>> {
    Ok(-lhs)
  }

  fn derive(&self, _lhs: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>> {
    Ok(-grad)
  }

  fn as_enum(self) -> UnaryMops<T> { UnaryMops::Neg(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddScalar<T> {
  value: T,
}

impl<T: Real> UnaryOp<T> for AddScalar<T> {
  fn name(&self) -> &'static str { "add_scalar" }

  fn run(&self, lhs: &Tensor<T>) -> Result<Tensor<T>> {
    Ok(lhs + self.value)
  }

  fn derive(&self, _lhs: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>> {
    Ok(grad.clone())
  }

  fn as_enum(self) -> UnaryMops<T> { UnaryMops::AddScalar(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulScalar<T> {
  value: T,
}

impl<T: Real> UnaryOp<T> for MulScalar<T> {
  fn name(&self) -> &'static str { "mul_scalar" }

  fn run(&self, lhs: &Tensor<T>) -> Result<Tensor<T>> {
    Ok(lhs * self.value)
  }

  fn derive(&self, _lhs: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>> {
    Ok(grad * self.value)
  }

  fn as_enum(self) -> UnaryMops<T> { UnaryMops::MulScalar(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowScalar<T> {
  exponent: T,
}

impl<T: Real> UnaryOp<T> for PowScalar<T> {
  fn name(&self) -> &'static str { "pow_scalar" }

  fn run(&self, lhs: &Tensor<T>) -> Result<Tensor<T>> {
    Ok(lhs.powf(self.exponent))
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>> {
    grad.mul(&(&lhs.powf(self.exponent - T::one()) * self.exponent))
  }

  fn as_enum(self) -> UnaryMops<T> { UnaryMops::PowScalar(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exp;

impl<T: Real> UnaryOp<T> for Exp {
  fn name(&self) -> &'static str { "exp" }

  fn run(&self, lhs: &Tensor<T>) -> Result<Tensor<T>> {
    Ok(lhs.exp())
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>> {
    grad.mul(&lhs.exp())
  }

  fn as_enum(self) -> UnaryMops<T> { UnaryMops::Exp(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log;

impl<T: Real> UnaryOp<T> for Log {
  fn name(&self) -> &'static str { "log" }

  fn run(&self, lhs: &Tensor<T>) -> Result<Tensor<T>> {
    Ok(lhs.log())
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>> {
    grad.div(lhs)
  }

  fn as_enum(self) -> UnaryMops<T> { UnaryMops::Log(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReLU;

impl<T: Real> UnaryOp<T> for ReLU {
  fn name(&self) -> &'static str { "relu" }

  fn run(&self, lhs: &Tensor<T>) -> Result<Tensor<T>> {
    Ok(lhs.relu())
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>> {
    grad.mul(&lhs.vectorize(|a| if a > T::zero() { T::one() } else { T::zero() }))
  }

  fn as_enum(self) -> UnaryMops<T> { UnaryMops::ReLU(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sigmoid;

impl<T: Real> UnaryOp<T> for Sigmoid {
  fn name(&self) -> &'static str { "sigmoid" }

  fn run(&self, lhs: &Tensor<T>) -> Result<Tensor<T>> {
    Ok(lhs.sigmoid())
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>> {
    let result = lhs.sigmoid();
    grad.mul(&result.vectorize(|s| s * (T::one() - s) ))
  }

  fn as_enum(self) -> UnaryMops<T> { UnaryMops::Sigmoid(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round;

impl<T: Real> UnaryOp<T> for Round {
  fn name(&self) -> &'static str { "round" }

  fn run(&self, lhs: &Tensor<T>) -> Result<Tensor<T>> {
    Ok(lhs.round())
  }

  fn derive(&self, _lhs: &Tensor<T>, _grad: &Tensor<T>) -> Result<Tensor<T>> {
    Err(Error::UnsupportedOperator { op: "round" })
  }

  fn as_enum(self) -> UnaryMops<T> { UnaryMops::Round(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sum {
  dim: Option<isize>,
}

impl<T: Real> UnaryOp<T> for Sum {
  fn name(&self) -> &'static str { "sum" }

  fn run(&self, lhs: &Tensor<T>) -> Result<Tensor<T>> {
    match self.dim {
      Some(dim) => lhs.sum_dim(dim),
      None => Ok(lhs.sum()),
    }
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>> {
    uncollapse(self.dim, lhs, grad)
  }

  fn as_enum(self) -> UnaryMops<T> { UnaryMops::Sum(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mean {
  dim: Option<isize>,
}

impl<T: Real> UnaryOp<T> for Mean {
  fn name(&self) -> &'static str { "mean" }

  fn run(&self, lhs: &Tensor<T>) -> Result<Tensor<T>> {
    match self.dim {
      Some(dim) => lhs.mean_dim(dim),
      None => Ok(lhs.mean()),
    }
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>> {
    let n: T = cast(lhs.size() / grad.size().max(1));
    Ok(&uncollapse(self.dim, lhs, grad)? / n)
  }

  fn as_enum(self) -> UnaryMops<T> { UnaryMops::Mean(self) }
}

// Spread the gradient of a reduction back over the reduced elements.
fn uncollapse<T: Real>(dim: Option<isize>, lhs: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>> {
  let grad = match dim {
    Some(dim) => grad.unsqueeze(dim)?,
    None => grad.clone(),
  };
  Ok(grad.broadcast(lhs.dims())?.copied())
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reshape {
  dims: Vec<usize>,
}

impl<T: Real> UnaryOp<T> for Reshape {
  fn name(&self) -> &'static str { "reshape" }

  fn run(&self, lhs: &Tensor<T>) -> Result<Tensor<T>> {
    lhs.reshape(&self.dims)
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>> {
    grad.reshape(lhs.dims())
  }

  fn as_enum(self) -> UnaryMops<T> { UnaryMops::Reshape(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transpose {
  dim1: isize,
  dim2: isize,
}

impl<T: Real> UnaryOp<T> for Transpose {
  fn name(&self) -> &'static str { "transpose" }

  fn run(&self, lhs: &Tensor<T>) -> Result<Tensor<T>> {
    lhs.transpose(self.dim1, self.dim2)
  }

  fn derive(&self, _lhs: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>> {
    grad.transpose(self.dim1, self.dim2)
  }

  fn as_enum(self) -> UnaryMops<T> { UnaryMops::Transpose(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Select {
  dim: isize,
  index: usize,
}

impl<T: Real> UnaryOp<T> for Select {
  fn name(&self) -> &'static str { "select" }

  fn run(&self, lhs: &Tensor<T>) -> Result<Tensor<T>> {
    lhs.select(self.dim, self.index)
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>> {
    let out = lhs.zeros_like();
    out.select(self.dim, self.index)?.assign(grad)?;
    Ok(out)
  }

  fn as_enum(self) -> UnaryMops<T> { UnaryMops::Select(self) }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broadcast {
  dims: Vec<usize>,
}

impl<T: Real> UnaryOp<T> for Broadcast {
  fn name(&self) -> &'static str { "broadcast" }

  fn run(&self, lhs: &Tensor<T>) -> Result<Tensor<T>> {
    lhs.broadcast(&self.dims)
  }

  fn derive(&self, lhs: &Tensor<T>, grad: &Tensor<T>) -> Result<Tensor<T>> {
    grad.sum_to(lhs.dims())
  }

  fn as_enum(self) -> UnaryMops<T> { UnaryMops::Broadcast(self) }
}

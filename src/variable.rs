use std::rc::Rc;
use std::cell::{ Cell, RefCell };
use std::sync::atomic::{ AtomicUsize, Ordering };

use log::debug;
use serde::{ Serialize, Deserialize };

pub(crate) mod mops;
mod graph;
mod backward;

pub use graph::Graph;

use crate::{
  internal::*,
  tensor::Tensor,
  scalar::Real,
  ops::{ UnaryOp, BinaryOp },
  error::{ Result, ShapeError, GradientError },
};


pub(crate) fn make_id() -> usize {
  static LAST_ID: AtomicUsize = AtomicUsize::new(0);
  LAST_ID.fetch_add(1, Ordering::Relaxed)
}


/// Operator kind recorded on a graph node.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Op<T> {
  Unary(mops::UnaryMops<T>),
  Binary(mops::BinaryMops),
}

impl<T: Real> Op<T> {
  /// Number of input nodes this operator consumes.

  pub(crate) fn arity(&self) -> usize {
    match self {
      Op::Unary(_) => 1,
      Op::Binary(_) => 2,
    }
  }

  pub(crate) fn name(&self) -> &'static str {
    match self {
      Op::Unary(op) => op.as_unary_op().name(),
      Op::Binary(op) => op.as_binary_op::<T>().name(),
    }
  }

  fn run(&self, inputs: &[&Tensor<T>]) -> Result<Tensor<T>> {
    match self {
      Op::Unary(op) => op.as_unary_op().run(inputs[0]),
      Op::Binary(op) => op.as_binary_op::<T>().run(inputs[0], inputs[1]),
    }
  }

  fn derive(&self, inputs: &[&Tensor<T>], grad: &Tensor<T>) -> Result<Vec<Tensor<T>>> {
    match self {
      Op::Unary(op) => Ok(vec![op.as_unary_op().derive(inputs[0], grad)?]),
      Op::Binary(op) => {
        let (lhs, rhs) = op.as_binary_op::<T>().derive(inputs[0], inputs[1], grad)?;
        Ok(vec![lhs, rhs])
      },
    }
  }
}

/// Node in a computation graph, containing a [Variable]'s data and gradient,
/// as well as the operation used to create it.

#[derive(Debug)]
pub(crate) struct Node<T: Real> {
  pub(crate) id: usize,
  pub(crate) data: Tensor<T>,
  grad: RefCell<Option<Tensor<T>>>,
  pub(crate) op: Option<Op<T>>,
  pub(crate) previous: Vec<Rc<Self>>,
  pub(crate) tracks_gradient: bool,
  released: Cell<bool>,
}

// Unlink inputs one at a time, so long chains don't recurse on drop
impl<T: Real> Drop for Node<T> {
  fn drop(&mut self) {
    let mut stack = std::mem::take(&mut self.previous);
    while let Some(node) = stack.pop() {
      if let Ok(mut node) = Rc::try_unwrap(node) {
        stack.append(&mut node.previous);
      }
    }
  }
}

impl<T: Real> Node<T> {
  pub(crate) fn new(data: Tensor<T>, op: Option<Op<T>>, previous: Vec<Rc<Self>>, tracks_gradient: bool) -> Self {
    Self {
      id: make_id(),
      data,
      grad: RefCell::new(None),
      op,
      previous,
      tracks_gradient,
      released: Cell::new(false),
    }
  }

  pub(crate) fn is_released(&self) -> bool {
    self.released.get()
  }

  /// Add `change` into this node's gradient buffer, creating it on first use.

  pub(crate) fn accumulate(&self, change: &Tensor<T>) -> Result<()> {
    let mut grad = self.grad.borrow_mut();
    match grad.as_ref() {
      Some(existing) => existing.add_(change)?,
      None => *grad = Some(change.copied()),
    }
    Ok(())
  }

  /// Recompute this node's data from its inputs.

  pub(crate) fn forward(&self) -> Result<()> {
    if let Some(op) = &self.op {
      let inputs: Vec<&Tensor<T>> = self.previous.iter().map(|prev| &prev.data ).collect();
      let value = op.run(&inputs)?;
      // Views already reflect their input's storage
      if !self.data.shared_with(&value) {
        self.data.assign(&value)?;
      }
    }
    Ok(())
  }

  pub(crate) fn derive(&self, grad: &Tensor<T>) -> Result<Vec<Tensor<T>>> {
    match &self.op {
      Some(op) => {
        let inputs: Vec<&Tensor<T>> = self.previous.iter().map(|prev| &prev.data ).collect();
        op.derive(&inputs, grad)
      },
      None => Ok(vec![]),
    }
  }
}


/// Variables track the computational operations used to create them and allow
/// for computing their gradient with respect to all input variables involved.
///
/// They get created by calling [tracked](Tensor::tracked) or
/// [constant](Tensor::constant) on any differentiable [Tensor] type,
/// or through [Variable::new].
///
/// Operations record a graph node only if at least one of their inputs tracks
/// gradients. Everything else produces plain untracked leaves.
///
/// Variables dereference to their underlying [Tensor] automatically for
/// non-differentiable operations. Differentiable operations, on the other hand,
/// will always return another Variable.

#[derive(Debug, Clone)]
pub struct Variable<T: Real> {
  pub(crate) node: Rc<Node<T>>,
}

impl<T: Real> std::ops::Deref for Variable<T> {
  type Target = Tensor<T>;

  fn deref(&self) -> &Self::Target {
    &self.node.data
  }
}

impl<T: Real> PartialEq for Variable<T> {
  fn eq(&self, rhs: &Self) -> bool {
    self.node.data == rhs.node.data
  }
}

impl<T: Real> From<T> for Variable<T> {
  fn from(value: T) -> Self {
    Tensor::scalar(value).constant()
  }
}

impl<T: Real> Variable<T> {
  pub(crate) fn from_tensor(tensor: Tensor<T>, tracks_gradient: bool) -> Self {
    Self { node: Rc::new(Node::new(tensor, None, vec![], tracks_gradient)) }
  }

  pub(crate) fn from_node(node: Rc<Node<T>>) -> Self {
    Self { node }
  }

  /// Create a leaf variable, zero-filled when no values are given.

  pub fn new(dims: &[usize], values: Option<Vec<T>>, tracks_gradient: bool) -> Result<Self> {
    let tensor = match values {
      Some(values) => Tensor::new(dims, values)?,
      None => Tensor::zeros(dims),
    };
    Ok(Self::from_tensor(tensor, tracks_gradient))
  }

  fn from_op(op: Op<T>, data: Tensor<T>, previous: Vec<Rc<Node<T>>>) -> Self {
    if previous.iter().any(|prev| prev.tracks_gradient ) {
      Self { node: Rc::new(Node::new(data, Some(op), previous, true)) }
    } else {
      Self::from_tensor(data, false)
    }
  }

  pub fn id(&self) -> usize {
    self.node.id
  }

  pub fn tensor(&self) -> &Tensor<T> {
    &self.node.data
  }

  pub fn tracks_gradient(&self) -> bool {
    self.node.tracks_gradient
  }

  pub fn is_leaf(&self) -> bool {
    self.node.op.is_none()
  }

  /// Name of the operation that produced this variable.

  pub fn operation(&self) -> Option<&'static str> {
    self.node.op.as_ref().map(|op| op.name() )
  }

  /// Accumulated gradient. Only leaves reached by a backward pass have one.

  pub fn grad(&self) -> Option<Tensor<T>> {
    self.node.grad.borrow().clone()
  }

  pub fn clear_grad(&self) {
    self.node.grad.borrow_mut().take();
  }

  /// Clear the gradients of every leaf in this Variable's graph.

  pub fn reset(&self) {
    for node in self.history() {
      node.grad.borrow_mut().take();
    }
  }

  /// Untracked leaf sharing this Variable's storage.

  pub fn detach(&self) -> Self {
    Self::from_tensor(self.node.data.clone(), false)
  }

  pub(crate) fn unary_op(&self, op: impl UnaryOp<T>) -> Result<Self> {
    let data = op.run(&self.node.data)?;
    Ok(self.unary_with(op, data))
  }

  pub(crate) fn unary_with(&self, op: impl UnaryOp<T>, data: Tensor<T>) -> Self {
    Self::from_op(Op::Unary(op.as_enum()), data, vec![self.node.clone()])
  }

  pub(crate) fn binary_op(&self, op: impl BinaryOp<T>, rhs: &Self) -> Result<Self> {
    let data = op.run(&self.node.data, &rhs.node.data)?;
    Ok(Self::from_op(
      Op::Binary(op.as_enum()),
      data,
      vec![self.node.clone(), rhs.node.clone()],
    ))
  }

  /// Compute gradients of this single-element Variable with respect to
  /// every tracking leaf in its graph.
  ///
  /// Gradients accumulate into the leaves. Call [reset](Variable::reset)
  /// between passes to start from zero.

  pub fn backward(&self) -> Result<()> {
    if !self.node.tracks_gradient {
      return Err(GradientError::NotTracked { id: self.node.id }.into())
    }
    if self.size() != 1 {
      return Err(ShapeError::NotScalar { dims: self.dims().to_vec() }.into())
    }
    backward::run(&self.node, Tensor::ones(self.dims()))
  }

  /// Back-propagate `grad`, the gradient of some downstream quantity with
  /// respect to this Variable. It must match this Variable's shape exactly.

  pub fn backward_with(&self, grad: &Tensor<T>) -> Result<()> {
    backward::run(&self.node, grad.clone())
  }

  /// Discard the recorded operations behind this Variable.
  /// Values stay readable, but backward passes through them fail.

  pub fn release_graph(&self) {
    let mut count = 0;
    for node in self.history() {
      if node.op.is_some() {
        node.released.set(true);
        count += 1;
      }
    }
    debug!("released {count} operation nodes behind node {}", self.node.id);
  }

  /// All gradient-tracking leaves in this Variable's graph.

  pub fn leaves(&self) -> Vec<Self> {
    self.history()
      .into_iter()
      .filter(|node| node.op.is_none() && node.tracks_gradient )
      .map(Self::from_node)
      .collect()
  }

  pub(crate) fn history(&self) -> Vec<Rc<Node<T>>> {
    backward::topological_order(&self.node)
  }

  /// Compute a function's gradient with respect to a generated
  /// input numerically and compare it to the automatically derived
  /// solution.
  ///
  /// Returns the mean absolute difference between both gradients.

  pub fn check_gradients<F>(dims: &[usize], generator: F) -> Result<T>
  where
    F: Fn(&Self) -> Result<Self>
  {
    let eps = T::one() / cast::<T>(1000);
    let two = cast::<T>(2);
    // Generate random input
    let input = Tensor::randn(dims);
    let var = input.tracked();
    // Compute gradient using auto diff
    generator(&var)?.sum().backward()?;
    let grad = var.grad().unwrap_or_else(|| input.zeros_like() ).to_vec();
    // Compute gradient numerically for every element of input
    let evaluate = |i: usize, delta: T| -> Result<T> {
      let mut values = input.to_vec();
      values[i] += delta;
      generator(&Tensor::new(dims, values)?.constant())?.sum().item()
    };
    let mut error = T::zero();
    for (i, &auto) in grad.iter().enumerate() {
      let numeric = (evaluate(i, eps)? - evaluate(i, -eps)?) / (two * eps);
      error += num_traits::real::Real::abs(auto - numeric);
    }
    Ok(error / cast(grad.len().max(1)))
  }
}

impl<T: Real> std::fmt::Display for Variable<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    let title = match (&self.node.op, self.node.tracks_gradient) {
      (Some(op), _) => format!("Computed({})", op.name()),
      (None, true) => "Tracked".to_string(),
      (None, false) => "Constant".to_string(),
    };
    write!(f, "{title} {}", self.tensor())
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Error;

  #[test]
  fn x_squared() {
    let x = Tensor::vec(&[3.0, 5.0]).tracked();
    let z = &x.mul(&x).unwrap() + 2.0;
    z.backward_with(&Tensor::ones(&[2])).unwrap();
    assert_eq!(z.tensor(), &Tensor::vec(&[11.0, 27.0]));
    assert_eq!(x.grad(), Some(Tensor::vec(&[6.0, 10.0])));
  }

  #[test]
  fn leaf_gradient_is_copied() {
    let x = Tensor::vec(&[1.0, 2.0]).tracked();
    let upstream = Tensor::vec(&[0.5, -1.0]);
    x.backward_with(&upstream).unwrap();
    upstream.add_(&Tensor::vec(&[1.0, 1.0])).unwrap();
    assert_eq!(x.grad(), Some(Tensor::vec(&[0.5, -1.0])));
  }

  #[test]
  fn drop_deep_chain() {
    let x = Tensor::vec(&[1.0f32]).tracked();
    let mut y = x.clone();
    for _ in 0..100_000 {
      y = &y + 1.0;
    }
    assert_eq!(y.to_vec(), vec![100_001.0]);
    drop(y);
    assert_eq!(x.to_vec(), vec![1.0]);
  }

  #[test]
  fn make_tensor() {
    let x = Variable::new(&[2,2], Some(vec![1.0, 2.0, 3.0, 4.0]), true).unwrap();
    assert!(x.tracks_gradient() && x.is_leaf());
    assert_eq!(x.grad(), None);
    let y = Variable::<f32>::new(&[3], None, false).unwrap();
    assert_eq!(y.tensor(), &Tensor::zeros(&[3]));
    assert!(matches!(Variable::new(&[2], Some(vec![1.0]), true), Err(Error::Shape(_))));
  }

  #[test]
  fn untracked_records_nothing() {
    let a = Tensor::vec(&[1.0, 2.0]).constant();
    let b = (&a * 2.0).exp().sum();
    assert!(!b.tracks_gradient());
    assert!(b.is_leaf());
    assert_eq!(b.operation(), None);
    assert!(matches!(b.backward(), Err(Error::Gradient(GradientError::NotTracked { .. }))));
  }

  #[test]
  fn tracking_propagates() {
    let a = Tensor::vec(&[1.0, 2.0]).constant();
    let x = Tensor::vec(&[3.0, 4.0]).tracked();
    let y = a.mul(&x).unwrap();
    assert!(y.tracks_gradient());
    assert_eq!(y.operation(), Some("mul"));
    y.sum().backward().unwrap();
    assert_eq!(x.grad(), Some(Tensor::vec(&[1.0, 2.0])));
    assert_eq!(a.grad(), None);
  }

  #[test]
  fn non_scalar_needs_upstream() {
    let x = Tensor::<f64>::ones(&[2]).tracked();
    let y = &x * 2.0;
    assert!(matches!(y.backward(), Err(Error::Shape(ShapeError::NotScalar { .. }))));
    let err = y.backward_with(&Tensor::ones(&[3])).unwrap_err();
    assert!(matches!(err, Error::Shape(ShapeError::Upstream { .. })));
    assert_eq!(x.grad(), None);
  }

  #[test]
  fn leaves_and_reset() {
    let x = Tensor::scalar(2.0).tracked();
    let w = Tensor::scalar(3.0).tracked();
    let c = Tensor::scalar(1.0).constant();
    let y = x.mul(&w).unwrap().add(&c).unwrap();
    let leaves: Vec<usize> = y.leaves().iter().map(|v| v.id() ).collect();
    assert_eq!(leaves, vec![x.id(), w.id()]);
    y.backward().unwrap();
    assert_eq!(w.grad().unwrap().item().unwrap(), 2.0);
    y.reset();
    assert_eq!(x.grad(), None);
    assert_eq!(w.grad(), None);
  }

  #[test]
  fn detach_shares_storage() {
    let x = Tensor::vec(&[1.0, 2.0]).tracked();
    let d = x.detach();
    assert!(!d.tracks_gradient());
    assert!(d.shared_with(&x));
    d.refill(5.0);
    assert_eq!(x.to_vec(), vec![5.0, 5.0]);
  }

  #[test]
  fn display() {
    let x = Tensor::scalar(1.0).tracked();
    assert!(format!("{}", &x + 1.0).starts_with("Computed(add_scalar)"));
    assert!(format!("{x}").starts_with("Tracked"));
  }

  #[test]
  fn numeric_check() {
    let error = Variable::<f64>::check_gradients(&[3, 2], |x| {
      Ok(x.mul(x)?.sigmoid().mean_dim(-1)?)
    }).unwrap();
    assert!(error < 1e-5);
  }
}

use std::rc::Rc;
use std::cell::{ Ref, RefCell };
use std::fmt::Debug;

use rand::Rng;
use itertools::Itertools;
use serde::{ Serialize, Deserialize };

mod cops;
mod lops;
mod array;

pub use array::ArrayView;

use crate::{
  internal::*,
  shape::{ Shape, broadcast_dims },
  variable::Variable,
  scalar::{ Inner, Numeric, Real },
  error::{ Result, ShapeError },
};


/// Multidimensional array.
///
/// Tensors may contain any type that satisfies [Inner], but
/// additional methods are available for [Numeric] and [Real]
/// inner types.
///
/// Cloning a tensor is cheap and yields another handle to the same
/// storage. Views created by [view](Tensor::view), [transpose](Tensor::transpose),
/// [select](Tensor::select) or [broadcast](Tensor::broadcast) share storage as
/// well, so in-place operations are visible through every handle.
///
/// [Real] tensors can be wrapped in a [Variable] by
/// calling [tracked](Tensor::tracked) or [constant](Tensor::constant).

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tensor<T: Inner> {
  shape: Shape,
  data: Rc<RefCell<Vec<T>>>,
}

impl<T: Inner> PartialEq for Tensor<T> {
  fn eq(&self, rhs: &Self) -> bool {
    if self.shape.dims != rhs.shape.dims { return false }
    let data_l = self.data.borrow();
    let data_r = rhs.data.borrow();
    self.shape.iter().zip(rhs.shape.iter()).all(|(i, j)| data_l[i] == data_r[j] )
  }
}

impl<T: Inner> Tensor<T> {
  pub fn from_shape(shape: Shape, data: Vec<T>) -> Result<Self> {
    if !shape.contiguous() || shape.offset != 0 {
      return Err(ShapeError::Layout { dims: shape.dims.clone() }.into())
    }
    if shape.size() != data.len() {
      return Err(ShapeError::DataLength {
        dims: shape.dims.clone(),
        expected: shape.size(),
        actual: data.len(),
      }.into())
    }
    Ok(Self { shape, data: Rc::new(RefCell::new(data)) })
  }

  pub fn new(dims: &[usize], data: Vec<T>) -> Result<Self> {
    Self::from_shape(Shape::new(dims), data)
  }

  fn from_raw(dims: &[usize], data: Vec<T>) -> Self {
    debug_assert_eq!(dims.iter().product::<usize>(), data.len());
    Self { shape: Shape::new(dims), data: Rc::new(RefCell::new(data)) }
  }

  pub fn scalar(item: T) -> Self {
    Self::from_raw(&[], vec![item])
  }

  pub fn vec(vec: &[T]) -> Self {
    Self::from_raw(&[vec.len()], vec.to_vec())
  }

  pub fn fill(dims: &[usize], filler: T) -> Self {
    Self::from_raw(dims, vec![filler; dims.iter().product()])
  }

  pub fn shape(&self) -> &Shape {
    &self.shape
  }

  pub fn dims(&self) -> &[usize] {
    &self.shape.dims
  }

  pub fn size(&self) -> usize {
    self.shape.size()
  }

  pub fn rank(&self) -> usize {
    self.shape.rank()
  }

  /// The entire underlying buffer, including elements outside this view.

  pub fn raw(&self) -> Ref<Vec<T>> {
    self.data.borrow()
  }

  pub fn values(&self) -> TensorIterator<T> {
    TensorIterator::new(self)
  }

  pub fn to_vec(&self) -> Vec<T> {
    self.values().collect()
  }

  pub fn item(&self) -> Result<T> {
    if self.size() != 1 {
      return Err(ShapeError::NotScalar { dims: self.shape.dims.clone() }.into())
    }
    Ok(self.raw()[self.shape.offset])
  }

  /// Whether both tensors are backed by the same buffer.

  pub fn shared_with(&self, other: &Self) -> bool {
    Rc::ptr_eq(&self.data, &other.data)
  }

  pub(crate) fn fits_storage(&self) -> bool {
    self.shape.fits(self.data.borrow().len())
  }

  fn with_shape(&self, shape: Shape) -> Self {
    Self { shape, data: self.data.clone() }
  }

  pub fn at(&self, indices: &[usize]) -> Result<Self> {
    Ok(self.with_shape(self.shape.take(indices)?))
  }

  pub fn select(&self, dim: isize, index: usize) -> Result<Self> {
    Ok(self.with_shape(self.shape.select(dim, index)?))
  }

  pub fn view(&self, dims: &[usize]) -> Result<Self> {
    Ok(self.with_shape(self.shape.view(dims)?))
  }

  /// Like [view](Tensor::view), but copies non-contiguous tensors first.

  pub fn reshape(&self, dims: &[usize]) -> Result<Self> {
    self.contiguous().view(dims)
  }

  pub fn transpose(&self, dim1: isize, dim2: isize) -> Result<Self> {
    Ok(self.with_shape(self.shape.transpose(dim1, dim2)?))
  }

  pub fn broadcast(&self, dims: &[usize]) -> Result<Self> {
    if self.shape.dims == dims { return Ok(self.clone()) }
    Ok(self.with_shape(self.shape.broadcast(dims)?))
  }

  pub fn unsqueeze(&self, dim: isize) -> Result<Self> {
    Ok(self.with_shape(self.shape.unsqueeze(dim)?))
  }

  pub fn squeeze(&self) -> Self {
    self.with_shape(self.shape.squeeze())
  }

  pub fn contiguous(&self) -> Self {
    if self.shape.contiguous() {
      self.clone()
    } else {
      self.copied()
    }
  }

  /// Copy this tensor's elements into fresh storage.

  pub fn copied(&self) -> Self {
    Self::from_raw(&self.shape.dims, self.to_vec())
  }

  pub fn vectorize<O,F>(&self, cb: F) -> Tensor<O>
  where
    O: Inner,
    F: FnMut(T) -> O,
  {
    let data = self.values().map(cb).collect();
    Tensor::from_raw(&self.shape.dims, data)
  }

  pub fn zip<O,F>(&self, rhs: &Self, cb: F) -> Result<Tensor<O>>
  where
    O: Inner,
    F: Fn(T, T) -> O,
  {
    self.zip_op("zip", rhs, cb)
  }

  fn zip_op<O,F>(&self, op: &'static str, rhs: &Self, cb: F) -> Result<Tensor<O>>
  where
    O: Inner,
    F: Fn(T, T) -> O,
  {
    let dims = broadcast_dims(op, &self.shape.dims, &rhs.shape.dims)?;
    let lhs = self.broadcast(&dims)?;
    let rhs = rhs.broadcast(&dims)?;
    let data = lhs.values()
      .zip(rhs.values())
      .map(|(a, b)| cb(a, b) )
      .collect();
    Ok(Tensor::from_raw(&dims, data))
  }

  /// Overwrite this tensor's elements in place with `cb(self, rhs)`.
  /// `rhs` must broadcast to this tensor's shape.

  fn zip_inplace<F>(&self, rhs: &Self, cb: F) -> Result<()>
  where
    F: Fn(T, T) -> T,
  {
    let rhs = rhs.broadcast(&self.shape.dims)?;
    let values: Vec<T> = self.values()
      .zip(rhs.values())
      .map(|(a, b)| cb(a, b) )
      .collect();
    let mut data = self.data.borrow_mut();
    for (i, value) in self.shape.iter().zip(values) {
      data[i] = value;
    }
    Ok(())
  }

  /// Copy `other`'s elements into this tensor's storage.

  pub fn assign(&self, other: &Self) -> Result<()> {
    self.zip_inplace(other, |_, b| b )
  }

  pub fn map_inplace(&self, cb: impl Fn(T) -> T) {
    let mut data = self.data.borrow_mut();
    // Broadcast views address some positions repeatedly
    for i in self.shape.iter().unique() {
      let value = cb(data[i]);
      data[i] = value;
    }
  }

  pub fn refill(&self, filler: T) {
    self.map_inplace(|_| filler )
  }
}

impl<T: Numeric> Tensor<T> {
  pub fn zeros(dims: &[usize]) -> Self {
    Self::fill(dims, T::zero())
  }

  pub fn ones(dims: &[usize]) -> Self {
    Self::fill(dims, T::one())
  }

  pub fn zeros_like(&self) -> Self {
    Self::zeros(&self.shape.dims)
  }

  pub fn ones_like(&self) -> Self {
    Self::ones(&self.shape.dims)
  }

  pub fn arange(dims: &[usize], start: T, step: T) -> Self {
    let mut value = start;
    let data = (0..dims.iter().product::<usize>())
      .map(|_| {
        let out = value;
        value += step;
        out
      })
      .collect();
    Self::from_raw(dims, data)
  }

  pub fn add(&self, rhs: &Self) -> Result<Self> {
    self.zip_op("add", rhs, |a, b| a + b )
  }

  pub fn sub(&self, rhs: &Self) -> Result<Self> {
    self.zip_op("subtract", rhs, |a, b| a - b )
  }

  pub fn mul(&self, rhs: &Self) -> Result<Self> {
    self.zip_op("multiply", rhs, |a, b| a * b )
  }

  pub fn div(&self, rhs: &Self) -> Result<Self> {
    self.zip_op("divide", rhs, |a, b| a / b )
  }

  pub fn add_(&self, rhs: &Self) -> Result<()> {
    self.zip_inplace(rhs, |a, b| a + b )
  }

  pub fn sub_(&self, rhs: &Self) -> Result<()> {
    self.zip_inplace(rhs, |a, b| a - b )
  }

  pub fn mul_(&self, rhs: &Self) -> Result<()> {
    self.zip_inplace(rhs, |a, b| a * b )
  }

  pub fn div_(&self, rhs: &Self) -> Result<()> {
    self.zip_inplace(rhs, |a, b| a / b )
  }

  /// Sum of all elements as a scalar tensor.

  pub fn sum(&self) -> Self {
    Self::scalar(self.values().sum())
  }

  /// Sum over `dim`, keeping it with size one.

  pub fn sum_over(&self, dim: isize) -> Result<Self> {
    let d = negative_index(dim, self.rank(), false)?;
    let dims = &self.shape.dims;
    let outer: usize = dims[..d].iter().product();
    let n = dims[d];
    let inner: usize = dims[d + 1..].iter().product();
    let values = self.to_vec();
    let mut data = vec![T::zero(); outer * inner];
    for o in 0..outer {
      for k in 0..n {
        let row = (o * n + k) * inner;
        for i in 0..inner {
          data[o * inner + i] += values[row + i];
        }
      }
    }
    let mut reduced = dims.clone();
    reduced[d] = 1;
    Ok(Self::from_raw(&reduced, data))
  }

  /// Sum over `dim`, removing it.

  pub fn sum_dim(&self, dim: isize) -> Result<Self> {
    let d = negative_index(dim, self.rank(), false)?;
    let mut dims = self.shape.dims.clone();
    dims.remove(d);
    self.sum_over(dim)?.view(&dims)
  }

  /// Reduce a broadcasted tensor back to `dims` by summing
  /// over every dimension that was stretched or prepended.

  pub fn sum_to(&self, dims: &[usize]) -> Result<Self> {
    if self.shape.dims == dims { return Ok(self.clone()) }
    let fail = || ShapeError::Broadcast { from: dims.to_vec(), to: self.shape.dims.clone() };
    if dims.len() > self.rank() { return Err(fail().into()) }
    let lead = self.rank() - dims.len();
    let mut out = self.clone();
    for d in (0..self.rank()).rev() {
      let n = self.shape.dims[d];
      if d < lead || (dims[d - lead] == 1 && n != 1) {
        out = out.sum_over(d as isize)?;
      } else if dims[d - lead] != n {
        return Err(fail().into())
      }
    }
    out.reshape(dims)
  }

  pub fn cast<O: Numeric>(&self) -> Tensor<O> {
    self.vectorize(|a| O::from(a).unwrap_or_else(O::zero) )
  }
}

impl<T: Real> Tensor<T> {
  pub fn rand(dims: &[usize]) -> Self {
    let mut rng = rand::thread_rng();
    let data = (0..dims.iter().product::<usize>())
      .map(|_| rng.gen_range(T::zero(), T::one()) )
      .collect();
    Self::from_raw(dims, data)
  }

  pub fn randn(dims: &[usize]) -> Self {
    let len = dims.iter().product();
    let mut data = vec![T::zero(); len];
    for i in 0..(len + 1) / 2 {
      let j = i * 2;
      let (r1, r2): (T, T) = randn();
      data[j] = r1;
      if j + 1 < len { data[j + 1] = r2 }
    }
    Self::from_raw(dims, data)
  }

  pub fn rand_like(&self) -> Self {
    Self::rand(&self.shape.dims)
  }

  pub fn randn_like(&self) -> Self {
    Self::randn(&self.shape.dims)
  }

  pub fn linspace(dims: &[usize], start: T, end: T) -> Self {
    let size = dims.iter().product::<usize>();
    let step = if size > 1 { (end - start) / cast::<T>(size - 1) } else { T::zero() };
    Self::arange(dims, start, step)
  }

  pub fn mean(&self) -> Self {
    let n: T = cast(self.size());
    self.sum().vectorize(|a| a / n )
  }

  pub fn mean_dim(&self, dim: isize) -> Result<Self> {
    let d = negative_index(dim, self.rank(), false)?;
    let n: T = cast(self.shape.dims[d]);
    Ok(self.sum_dim(dim)?.vectorize(|a| a / n ))
  }

  pub fn pow(&self, rhs: &Self) -> Result<Self> {
    self.zip_op("raise", rhs, |a, b| a.powf(b) )
  }

  pub fn powf(&self, exponent: T) -> Self {
    self.vectorize(|a| a.powf(exponent) )
  }

  pub fn sqrt(&self) -> Self {
    self.vectorize(|a| a.sqrt() )
  }

  pub fn exp(&self) -> Self {
    self.vectorize(|a| a.exp() )
  }

  pub fn log(&self) -> Self {
    self.vectorize(|a| a.ln() )
  }

  pub fn relu(&self) -> Self {
    self.vectorize(|a| if a > T::zero() { a } else { T::zero() })
  }

  pub fn sigmoid(&self) -> Self {
    self.vectorize(|a| T::one() / (T::one() + (-a).exp()) )
  }

  pub fn round(&self) -> Self {
    self.vectorize(|a| a.round() )
  }

  /// Euclidean norm over all elements.

  pub fn norm(&self) -> T {
    self.values().map(|a| a * a ).sum::<T>().sqrt()
  }

  /// Leaf [Variable] that records operations for differentiation.

  pub fn tracked(&self) -> Variable<T> {
    Variable::from_tensor(self.clone(), true)
  }

  /// Leaf [Variable] that does not track gradients.

  pub fn constant(&self) -> Variable<T> {
    Variable::from_tensor(self.clone(), false)
  }
}

impl<T: Inner> std::fmt::Display for Tensor<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "Tensor{:?} ", self.shape.dims)?;
    print_chunks(0, &self.shape, &self.to_vec(), f)
  }
}

fn print_chunks<T: Debug>(idx: usize, shape: &Shape, vec: &[T], f: &mut std::fmt::Formatter) -> std::fmt::Result {
  let indent = "  ".repeat(idx);
  if shape.rank() == 0 {
    write!(f, "{indent}{:?}", vec[0])?;
  } else if idx == shape.rank() - 1 {
    writeln!(f, "{indent}{:?}", vec)?;
  } else {
    writeln!(f, "{indent}[")?;
    let len = vec.len() / shape.dims[idx].max(1);
    for chunk in vec.chunks(len.max(1)) {
      print_chunks(idx + 1, shape, chunk, f)?;
    }
    writeln!(f, "{indent}]")?;
  }
  Ok(())
}


/// Iterate over a [Tensor]'s elements in logical order.

pub struct TensorIterator<'a, T: Inner> {
  data: Ref<'a, Vec<T>>,
  shape_iter: Box<dyn Iterator<Item=usize> + 'a>,
}

impl<'a, T: Inner> TensorIterator<'a, T> {
  fn new(tensor: &'a Tensor<T>) -> Self {
    Self {
      data: tensor.data.borrow(),
      shape_iter: tensor.shape.iter(),
    }
  }
}

impl<T: Inner> Iterator for TensorIterator<'_, T> {
  type Item = T;

  fn next(&mut self) -> Option<Self::Item> {
    self.shape_iter.next().map(|i| self.data[i] )
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Error;

  #[test]
  fn data_length() {
    assert!(Tensor::new(&[2,2], vec![1, 2, 3]).is_err());
    assert_eq!(Tensor::new(&[2,2], vec![1, 2, 3, 4]).unwrap().size(), 4);
  }

  #[test]
  fn from_strided_shape() {
    let shape = Shape::new(&[2,3]).transpose(0,1).unwrap();
    assert!(matches!(
      Tensor::from_shape(shape, vec![0; 6]),
      Err(Error::Shape(ShapeError::Layout { .. }))
    ));
    let shape = Shape::new(&[3]).broadcast(&[1,3]).unwrap();
    assert_eq!(Tensor::from_shape(shape, vec![1, 2, 3]).unwrap(), Tensor::new(&[1,3], vec![1, 2, 3]).unwrap());
  }

  #[test]
  fn index() {
    let x = Tensor::new(&[2,2,2], vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    assert_eq!(x.at(&[0,0]).unwrap(), Tensor::vec(&[1, 2]));
    assert_eq!(x.at(&[1,1]).unwrap(), Tensor::vec(&[7, 8]));
    assert_eq!(x.at(&[0]).unwrap(), Tensor::new(&[2,2], vec![1, 2, 3, 4]).unwrap());
    assert_eq!(x.at(&[0,1,1]).unwrap().item().unwrap(), 4);
  }

  #[test]
  fn select_column() {
    let x = Tensor::arange(&[3,2], 0, 1);
    assert_eq!(x.select(1, 1).unwrap(), Tensor::vec(&[1, 3, 5]));
    assert!(x.select(1, 2).is_err());
  }

  #[test]
  fn views_share_storage() {
    let x = Tensor::<f32>::zeros(&[4,4]);
    let y = x.view(&[16]).unwrap();
    let z = x.view(&[0, 8]).unwrap();
    assert_eq!(z.dims(), &[2, 8]);
    y.at(&[3]).unwrap().refill(7.0);
    assert_eq!(x.at(&[0,3]).unwrap().item().unwrap(), 7.0);
    assert_eq!(z.at(&[0,3]).unwrap().item().unwrap(), 7.0);
  }

  #[test]
  fn broadcast() {
    let x = Tensor::new(&[1,2,3], vec![1, 2, 3, 4, 5, 6]).unwrap();

    let y = Tensor::new(&[1], vec![1]).unwrap();
    assert_eq!(x.add(&y).unwrap(), Tensor::new(&[1,2,3], vec![2, 3, 4, 5, 6, 7]).unwrap());

    let y = Tensor::vec(&[1, 2, 3]);
    assert_eq!(x.add(&y).unwrap(), Tensor::new(&[1,2,3], vec![2, 4, 6, 5, 7, 9]).unwrap());

    let y = Tensor::new(&[2,1], vec![10, 20]).unwrap();
    assert_eq!(x.add(&y).unwrap(), Tensor::new(&[1,2,3], vec![11, 12, 13, 24, 25, 26]).unwrap());
  }

  #[test]
  fn shape_mismatch() {
    let a = Tensor::<f64>::ones(&[5,3]);
    let b = Tensor::<f64>::ones(&[5,2]);
    assert!(matches!(a.add(&b), Err(Error::Shape(ShapeError::Mismatch { op: "add", .. }))));
  }

  #[test]
  fn in_place() {
    let x = Tensor::new(&[2,2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let y = x.clone();
    x.add_(&Tensor::vec(&[10.0, 20.0])).unwrap();
    assert_eq!(y, Tensor::new(&[2,2], vec![11.0, 22.0, 13.0, 24.0]).unwrap());
    assert!(x.add_(&Tensor::ones(&[3])).is_err());
    assert!(x.add_(&Tensor::ones(&[2,2,2])).is_err());
  }

  #[test]
  fn in_place_transposed() {
    let x = Tensor::arange(&[2,3], 0.0, 1.0);
    let t = x.transpose(0, 1).unwrap();
    t.mul_(&Tensor::vec(&[1.0, 10.0])).unwrap();
    assert_eq!(x, Tensor::new(&[2,3], vec![0.0, 1.0, 2.0, 30.0, 40.0, 50.0]).unwrap());
  }

  #[test]
  fn sum_over() {
    let a = Tensor::arange(&[3,2,2], 0, 1).sum_over(1).unwrap();
    assert_eq!(a, Tensor::new(&[3,1,2], vec![2, 4, 10, 12, 18, 20]).unwrap());
  }

  #[test]
  fn sum_to() {
    let a = Tensor::<i32>::ones(&[4,2,3]);
    assert_eq!(a.sum_to(&[2,1]).unwrap(), Tensor::new(&[2,1], vec![12, 12]).unwrap());
    assert_eq!(a.sum_to(&[]).unwrap().item().unwrap(), 24);
    assert!(a.sum_to(&[5]).is_err());
  }

  #[test]
  fn mean() {
    let a = Tensor::new(&[3,2], vec![1., 2., 3., 4., 5., 6.]).unwrap();
    assert_eq!(a.mean().item().unwrap(), 3.5);
    assert_eq!(a.mean_dim(-1).unwrap(), Tensor::vec(&[1.5, 3.5, 5.5]));
  }

  #[test]
  fn linspace() {
    let a = Tensor::linspace(&[5], 0.0, 1.0);
    assert_eq!(a, Tensor::vec(&[0.0, 0.25, 0.5, 0.75, 1.0]));
  }

  #[test]
  fn random() {
    let a = Tensor::<f32>::randn(&[5,3]);
    assert_eq!(a.dims(), &[5, 3]);
    assert!(Tensor::<f64>::rand(&[100]).values().all(|a| (0.0..1.0).contains(&a) ));
  }

  #[test]
  fn item() {
    assert_eq!(Tensor::scalar(3.5).item().unwrap(), 3.5);
    assert!(Tensor::vec(&[1.0, 2.0]).item().is_err());
  }
}

use std::rc::Rc;
use std::cell::RefCell;

use crate::{
  shape::Shape,
  tensor::Tensor,
  scalar::{ Inner, Numeric },
  error::{ Result, ShapeError },
};


/// Flat, row-major array over a [Tensor]'s elements.
///
/// An array view either aliases the tensor's buffer or owns an
/// independent copy, as reported by [shares_storage](ArrayView::shares_storage).
/// Aliasing views and tensors are two handles to one buffer: writes through
/// either are immediately visible through the other.
///
/// Both handles are `!Send`, so the shared buffer can only ever be
/// mutated from the thread that created it.

#[derive(Debug, Clone)]
pub struct ArrayView<T: Inner> {
  dims: Vec<usize>,
  data: Rc<RefCell<Vec<T>>>,
  offset: usize,
  shares_storage: bool,
}

impl<T: Inner> ArrayView<T> {
  pub fn dims(&self) -> &[usize] {
    &self.dims
  }

  pub fn len(&self) -> usize {
    self.dims.iter().product()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn shares_storage(&self) -> bool {
    self.shares_storage
  }

  pub fn get(&self, index: usize) -> Option<T> {
    if index >= self.len() { return None }
    Some(self.data.borrow()[self.offset + index])
  }

  pub fn set(&self, index: usize, value: T) -> Result<()> {
    let size = self.len();
    if index >= size { return Err(ShapeError::IndexOutOfBounds { index, size }.into()) }
    self.data.borrow_mut()[self.offset + index] = value;
    Ok(())
  }

  pub fn to_vec(&self) -> Vec<T> {
    self.with_slice(|values| values.to_vec() )
  }

  pub fn with_slice<R>(&self, cb: impl FnOnce(&[T]) -> R) -> R {
    let data = self.data.borrow();
    cb(&data[self.offset..self.offset + self.len()])
  }

  pub fn with_slice_mut<R>(&self, cb: impl FnOnce(&mut [T]) -> R) -> R {
    let len = self.len();
    let mut data = self.data.borrow_mut();
    cb(&mut data[self.offset..self.offset + len])
  }

  pub fn map_inplace(&self, cb: impl Fn(T) -> T) {
    self.with_slice_mut(|values| {
      for value in values.iter_mut() {
        *value = cb(*value);
      }
    })
  }

  /// Tensor over this array's elements, sharing its storage.

  pub fn to_tensor(&self) -> Tensor<T> {
    let mut shape = Shape::new(&self.dims);
    shape.offset = self.offset;
    Tensor { shape, data: self.data.clone() }
  }
}

impl<T: Inner> Tensor<T> {
  /// Expose this tensor as a flat array.
  ///
  /// Contiguous tensors are aliased. Transposed or broadcast views
  /// have no flat layout and get copied.

  pub fn to_array_view(&self) -> ArrayView<T> {
    let (tensor, shares_storage) = if self.shape.contiguous() {
      (self.clone(), true)
    } else {
      (self.copied(), false)
    };
    ArrayView {
      dims: tensor.shape.dims.clone(),
      offset: tensor.shape.offset,
      data: tensor.data,
      shares_storage,
    }
  }

  pub fn from_array_view(array: &ArrayView<T>) -> Self {
    array.to_tensor()
  }
}

impl<T: Numeric> Tensor<T> {
  /// Flat array of a different element type. Always a copy.

  pub fn to_array_view_as<O: Numeric>(&self) -> ArrayView<O> {
    let mut array = self.cast::<O>().to_array_view();
    array.shares_storage = false;
    array
  }
}

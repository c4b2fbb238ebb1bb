use std::fmt::Debug;

use serde::{ Serialize, Deserialize };

use crate::{
  internal::*,
  error::{ Result, ShapeError },
};


/// The shape of a [Tensor](crate::Tensor).
///
/// Besides the dimensions a shape carries strides and an offset
/// into the underlying buffer, so that views like transposes,
/// broadcasts and row selections can share storage with the
/// tensor they were taken from.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
  pub dims: Vec<usize>,
  pub(crate) strides: Vec<isize>,
  pub(crate) offset: usize,
}

impl Shape {
  pub fn new(dims: &[usize]) -> Self {
    Self {
      dims: dims.to_vec(),
      strides: Self::make_strides(dims),
      offset: 0,
    }
  }

  fn make_strides(dims: &[usize]) -> Vec<isize> {
    if dims.is_empty() { return vec![] }
    let mut strides = vec![0; dims.len()];
    strides[dims.len() - 1] = 1;
    for i in (1..dims.len()).rev() {
      strides[i - 1] = dims[i] as isize * strides[i];
    }
    strides
  }

  pub fn size(&self) -> usize {
    self.dims.iter().product()
  }

  pub fn rank(&self) -> usize {
    self.dims.len()
  }

  pub fn strides(&self) -> &[isize] {
    &self.strides
  }

  pub(crate) fn index(&self, indices: &[usize]) -> Result<usize> {
    if indices.len() > self.rank() {
      return Err(ShapeError::Rank { op: "index", expected: self.rank(), actual: indices.len() }.into())
    }
    let mut idx = self.offset as isize;
    for ((&i, &n), &s) in indices.iter().zip(&self.dims).zip(&self.strides) {
      if i >= n { return Err(ShapeError::IndexOutOfBounds { index: i, size: n }.into()) }
      idx += i as isize * s;
    }
    Ok(idx as usize)
  }

  /// Row-major layout without gaps or repetitions.
  /// Strides of size-1 dimensions never move and are ignored.

  pub fn contiguous(&self) -> bool {
    self.strides.len() == self.dims.len() &&
    self.dims.iter()
      .zip(&self.strides)
      .zip(Self::make_strides(&self.dims))
      .all(|((&n, &s), expected)| n == 1 || s == expected )
  }

  /// Whether every element position lies inside a buffer of `len` values.

  pub(crate) fn fits(&self, len: usize) -> bool {
    if self.strides.len() != self.dims.len() { return false }
    let size = self.dims.iter().try_fold(1usize, |size, &n| size.checked_mul(n) );
    match size {
      None => return false,
      Some(0) => return true,
      Some(_) => {},
    }
    let (mut low, mut high) = match isize::try_from(self.offset) {
      Ok(offset) => (offset, offset),
      Err(_) => return false,
    };
    for (&n, &s) in self.dims.iter().zip(&self.strides) {
      let Some(span) = isize::try_from(n - 1).ok().and_then(|n| n.checked_mul(s) ) else { return false };
      let bound = if span < 0 { low.checked_add(span) } else { high.checked_add(span) };
      match bound {
        Some(bound) if span < 0 => low = bound,
        Some(bound) => high = bound,
        None => return false,
      }
    }
    low >= 0 && usize::try_from(high).map_or(false, |high| high < len )
  }

  /// Buffer positions of all elements in logical order.

  pub fn iter(&self) -> Box<dyn Iterator<Item=usize> + '_> {
    if self.contiguous() {
      Box::new(self.offset..self.offset + self.size())
    } else {
      Box::new(ShapeIterator::new(self))
    }
  }

  /// Reinterpret a contiguous shape with new dimensions.
  /// A single `0` acts as a placeholder inferred from the element count.

  pub fn view(&self, dims: &[usize]) -> Result<Self> {
    let invalid = || ShapeError::View { from: self.dims.clone(), to: dims.to_vec() };
    if !self.contiguous() { return Err(invalid().into()) }
    let placeholders = dims.iter().filter(|&&n| n == 0 ).count();
    if placeholders > 1 { return Err(invalid().into()) }
    let dims: Vec<usize> = if placeholders == 1 {
      let known: usize = dims.iter().filter(|&&n| n != 0 ).product();
      if known == 0 || self.size() % known != 0 { return Err(invalid().into()) }
      dims.iter().map(|&n| if n == 0 { self.size() / known } else { n }).collect()
    } else {
      dims.to_vec()
    };
    if dims.iter().product::<usize>() != self.size() { return Err(invalid().into()) }
    let strides = Self::make_strides(&dims);
    Ok(Self { dims, strides, offset: self.offset })
  }

  /// Fix the leading dimensions to `indices`.

  pub fn take(&self, indices: &[usize]) -> Result<Self> {
    let offset = self.index(indices)?;
    Ok(Self {
      dims: self.dims[indices.len()..].to_vec(),
      strides: self.strides[indices.len()..].to_vec(),
      offset,
    })
  }

  /// Fix dimension `dim` to `index`, removing it.

  pub fn select(&self, dim: isize, index: usize) -> Result<Self> {
    let d = negative_index(dim, self.rank(), false)?;
    let size = self.dims[d];
    if index >= size { return Err(ShapeError::IndexOutOfBounds { index, size }.into()) }
    let mut shape = self.clone();
    shape.offset = (shape.offset as isize + index as isize * shape.strides[d]) as usize;
    shape.dims.remove(d);
    shape.strides.remove(d);
    Ok(shape)
  }

  pub fn squeeze(&self) -> Self {
    let mut dims = vec![];
    let mut strides = vec![];
    for (d, &n) in self.dims.iter().enumerate() {
      if n != 1 {
        dims.push(n);
        strides.push(self.strides[d]);
      }
    }
    Self { dims, strides, offset: self.offset }
  }

  pub fn unsqueeze(&self, dim: isize) -> Result<Self> {
    let d = negative_index(dim, self.rank(), true)?;
    let mut shape = self.clone();
    shape.strides.insert(d, if d < shape.dims.len() {
      shape.strides[d].abs() * shape.dims[d] as isize
    } else { 1 });
    shape.dims.insert(d, 1);
    Ok(shape)
  }

  /// Stretch this shape to `dims` using zero strides.

  pub fn broadcast(&self, dims: &[usize]) -> Result<Self> {
    let fail = || ShapeError::Broadcast { from: self.dims.clone(), to: dims.to_vec() };
    if self.rank() > dims.len() { return Err(fail().into()) }
    let lead = dims.len() - self.rank();
    let mut strides = vec![0; lead];
    for (d, (&n, &stride)) in self.dims.iter().zip(&self.strides).enumerate() {
      let target = dims[lead + d];
      if n == target {
        strides.push(stride);
      } else if n == 1 {
        strides.push(0);
      } else {
        return Err(fail().into())
      }
    }
    Ok(Self { dims: dims.to_vec(), strides, offset: self.offset })
  }

  pub fn transpose(&self, dim1: isize, dim2: isize) -> Result<Self> {
    let dim1 = negative_index(dim1, self.rank(), false)?;
    let dim2 = negative_index(dim2, self.rank(), false)?;
    let mut shape = self.clone();
    shape.dims.swap(dim1, dim2);
    shape.strides.swap(dim1, dim2);
    Ok(shape)
  }
}


/// Dimensions two shapes broadcast to, aligned at their trailing end.

pub fn broadcast_dims(op: &'static str, lhs: &[usize], rhs: &[usize]) -> Result<Vec<usize>> {
  let rank = lhs.len().max(rhs.len());
  let mut dims = Vec::with_capacity(rank);
  for i in 0..rank {
    let l = if i < lhs.len() { lhs[lhs.len() - 1 - i] } else { 1 };
    let r = if i < rhs.len() { rhs[rhs.len() - 1 - i] } else { 1 };
    if l != r && l != 1 && r != 1 {
      return Err(ShapeError::Mismatch { op, lhs: lhs.to_vec(), rhs: rhs.to_vec() }.into())
    }
    dims.push(l.max(r));
  }
  dims.reverse();
  Ok(dims)
}

impl std::ops::Index<usize> for Shape {
  type Output = usize;

  fn index(&self, i: usize) -> &usize {
    &self.dims[i]
  }
}

impl std::fmt::Display for Shape {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "Shape{:?}", self.dims)
  }
}


/// Iterate through a strided [Shape]'s buffer positions.

pub struct ShapeIterator<'a> {
  shape: &'a Shape,
  counter: Vec<usize>,
  idx: isize,
  finished: bool,
}

impl<'a> ShapeIterator<'a> {
  fn new(shape: &'a Shape) -> Self {
    Self {
      counter: vec![0; shape.rank()],
      idx: shape.offset as isize,
      finished: shape.size() == 0,
      shape,
    }
  }
}

impl<'a> Iterator for ShapeIterator<'a> {
  type Item = usize;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished { return None }
    let out = self.idx as usize;
    let len = self.counter.len();
    if len == 0 {
      self.finished = true;
      return Some(out)
    }
    // Odometer over dimensions, rightmost first
    for cd in (0..len).rev() {
      let count = &mut self.counter[cd];
      if *count + 1 < self.shape.dims[cd] {
        *count += 1;
        self.idx += self.shape.strides[cd];
        break
      }
      if cd == 0 { self.finished = true; break }
      *count = 0;
      self.idx -= (self.shape.dims[cd] as isize - 1) * self.shape.strides[cd];
    }
    Some(out)
  }
}

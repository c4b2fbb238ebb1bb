use crate::{
  tensor::Tensor,
  scalar::{ Numeric, Real },
  ops::{ Cops, MatrixRef },
  error::{ Result, ShapeError },
};


impl<T: Real> Tensor<T> {
  /// Matrix product of two rank-2 tensors.

  pub fn mm(&self, rhs: &Self) -> Result<Self> {
    for matrix in [self, rhs] {
      if matrix.rank() != 2 {
        return Err(ShapeError::Rank { op: "mm", expected: 2, actual: matrix.rank() }.into())
      }
    }
    let (rows, inner) = (self.shape.dims[0], self.shape.dims[1]);
    let cols = rhs.shape.dims[1];
    if rhs.shape.dims[0] != inner {
      return Err(ShapeError::InnerDims {
        lhs: self.shape.dims.clone(),
        rhs: rhs.shape.dims.clone(),
      }.into())
    }

    let data_l = self.data.borrow();
    let data_r = rhs.data.borrow();
    let data = T::gemm(rows, inner, cols, operand(self, &data_l), operand(rhs, &data_r));

    Ok(Self::from_raw(&[rows, cols], data))
  }
}

fn operand<'a, T: Real>(tensor: &Tensor<T>, data: &'a [T]) -> MatrixRef<'a, T> {
  MatrixRef {
    data,
    offset: tensor.shape.offset,
    row_stride: tensor.shape.strides[0],
    col_stride: tensor.shape.strides[1],
  }
}

#[inline]
fn element<T: Copy>(m: &MatrixRef<T>, i: usize, j: usize) -> T {
  m.data[(m.offset as isize + i as isize * m.row_stride + j as isize * m.col_stride) as usize]
}

#[allow(dead_code)]
fn naive<T: Numeric>(rows: usize, inner: usize, cols: usize, lhs: MatrixRef<T>, rhs: MatrixRef<T>) -> Vec<T> {
  let mut data = vec![T::zero(); rows * cols];
  for i in 0..rows {
    for j in 0..cols {
      for k in 0..inner {
        data[i * cols + j] += element(&lhs, i, k) * element(&rhs, k, j);
      }
    }
  }
  data
}

macro_rules! gemm_kernel {
  ($type:ty, $kernel:ident) => {
    impl Cops for $type {
      #[cfg(feature = "unsafe")]
      fn gemm(rows: usize, inner: usize, cols: usize, lhs: MatrixRef<$type>, rhs: MatrixRef<$type>) -> Vec<$type> {
        let mut data = vec![0.0; rows * cols];
        if data.is_empty() || inner == 0 { return data }
        // Both operands borrow their full buffers, which cover every
        // position reachable through offset and strides.
        unsafe {
          matrixmultiply::$kernel(
            rows,
            inner,
            cols,
            1.0,
            lhs.data.as_ptr().add(lhs.offset),
            lhs.row_stride,
            lhs.col_stride,
            rhs.data.as_ptr().add(rhs.offset),
            rhs.row_stride,
            rhs.col_stride,
            0.0,
            data.as_mut_ptr(),
            cols as isize,
            1,
          );
        }
        data
      }

      #[cfg(not(feature = "unsafe"))]
      fn gemm(rows: usize, inner: usize, cols: usize, lhs: MatrixRef<$type>, rhs: MatrixRef<$type>) -> Vec<$type> {
        naive(rows, inner, cols, lhs, rhs)
      }
    }
  };
}

gemm_kernel!(f32, sgemm);
gemm_kernel!(f64, dgemm);


#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Error;

  #[test]
  fn matmul() {
    let x = Tensor::new(&[2,3], vec![1., 2., 3., 4., 5., 6.]).unwrap();
    let y = Tensor::new(&[3,2], vec![1., 2., 3., 4., 5., 6.]).unwrap();
    assert_eq!(x.mm(&y).unwrap(), Tensor::new(&[2,2], vec![22., 28., 49., 64.]).unwrap());
  }

  #[test]
  fn matmul_vector() {
    let x = Tensor::new(&[2,3], vec![1.0f32, 2., 3., 4., 5., 6.]).unwrap();
    let y = Tensor::new(&[3,1], vec![1., 2., 3.]).unwrap();
    assert_eq!(x.mm(&y).unwrap(), Tensor::new(&[2,1], vec![14., 32.]).unwrap());
  }

  #[test]
  fn matmul_transposed() {
    let x = Tensor::new(&[2,3], vec![1., 2., 3., 4., 5., 6.]).unwrap();
    let xt = x.transpose(0, 1).unwrap();
    assert_eq!(x.mm(&xt).unwrap(), Tensor::new(&[2,2], vec![14., 32., 32., 77.]).unwrap());
  }

  #[test]
  fn naive_kernel() {
    let a = [1, 2, 3, 4];
    let m = MatrixRef { data: &a[..], offset: 0, row_stride: 2, col_stride: 1 };
    assert_eq!(naive(2, 2, 2, m, m), vec![7, 10, 15, 22]);
  }

  #[test]
  fn inner_dims() {
    let x = Tensor::<f64>::ones(&[5,3]);
    assert!(matches!(x.mm(&x), Err(Error::Shape(ShapeError::InnerDims { .. }))));
    assert!(matches!(x.mm(&Tensor::ones(&[3])), Err(Error::Shape(ShapeError::Rank { .. }))));
  }
}

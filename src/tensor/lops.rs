use crate::{
  tensor::Tensor,
  scalar::{ Numeric, Signed },
};


impl<T: Signed> std::ops::Neg for &Tensor<T> {
  type Output = Tensor<T>;

  fn neg(self) -> Self::Output {
    self.vectorize(|a| -a )
  }
}

impl<T: Signed> std::ops::Neg for Tensor<T> {
  type Output = Tensor<T>;

  fn neg(self) -> Self::Output {
    -&self
  }
}

// Tensor-tensor arithmetic may fail on incompatible shapes and is only
// available through the fallible methods. Scalars always broadcast.
macro_rules! add_operator {
  ($trait:ident, $meth:ident, $assign_trait:ident, $assign_meth:ident, $symbol:tt) => {
    impl<T: Numeric> std::ops::$trait<T> for &Tensor<T> { // &tensor * T
      type Output = Tensor<T>;

      fn $meth(self, rhs: T) -> Tensor<T> {
        self.vectorize(|a| a $symbol rhs )
      }
    }

    impl<T: Numeric> std::ops::$assign_trait<T> for Tensor<T> { // tensor *= T
      fn $assign_meth(&mut self, rhs: T) {
        self.map_inplace(|a| a $symbol rhs );
      }
    }

    impl std::ops::$trait<&Tensor<f32>> for f32 { // f32 * &tensor
      type Output = Tensor<f32>;

      fn $meth(self, tensor: &Tensor<f32>) -> Tensor<f32> {
        tensor.vectorize(|a| self $symbol a )
      }
    }

    impl std::ops::$trait<&Tensor<f64>> for f64 { // f64 * &tensor
      type Output = Tensor<f64>;

      fn $meth(self, tensor: &Tensor<f64>) -> Tensor<f64> {
        tensor.vectorize(|a| self $symbol a )
      }
    }
  };
}

add_operator!(Add, add, AddAssign, add_assign, +);
add_operator!(Sub, sub, SubAssign, sub_assign, -);
add_operator!(Mul, mul, MulAssign, mul_assign, *);
add_operator!(Div, div, DivAssign, div_assign, /);


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scalar_operands() {
    let a = Tensor::vec(&[1.0, 2.0, 4.0]);
    assert_eq!(&a * 2.0, Tensor::vec(&[2.0, 4.0, 8.0]));
    assert_eq!(1.0 - &a, Tensor::vec(&[0.0, -1.0, -3.0]));
    assert_eq!(4.0 / &a, Tensor::vec(&[4.0, 2.0, 1.0]));
    assert_eq!(-&a, Tensor::vec(&[-1.0, -2.0, -4.0]));
  }

  #[test]
  fn assign_through_alias() {
    let mut a = Tensor::vec(&[1.0f32, 2.0]);
    let b = a.clone();
    a += 1.0;
    a *= 3.0;
    assert_eq!(b, Tensor::vec(&[6.0, 9.0]));
  }

  #[test]
  fn assign_broadcast_view_once() {
    let a = Tensor::scalar(1);
    let mut b = a.broadcast(&[2,2]).unwrap();
    b += 1;
    assert_eq!(a.item().unwrap(), 2);
  }
}

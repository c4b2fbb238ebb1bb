use rand::Rng;
use num_traits::NumCast;

use crate::{
  scalar::Real,
  error::{ Result, ShapeError },
};


/// Resolve a possibly negative dimension index against `rank`.
///
/// With `start_behind`, `-1` addresses the slot after the last
/// dimension, which is what insertions like `unsqueeze` need.

#[inline]
pub fn negative_index(dim: isize, rank: usize, start_behind: bool) -> Result<usize> {
  let bound = if start_behind { rank + 1 } else { rank };
  let resolved = if dim < 0 { bound as isize + dim } else { dim };
  if resolved < 0 || resolved as usize >= bound {
    return Err(ShapeError::InvalidDimension { dim, rank }.into())
  }
  Ok(resolved as usize)
}


/// Lossless for the float types [Real] is implemented for.

#[inline]
pub fn cast<T: Real>(n: usize) -> T {
  <T as NumCast>::from(n).unwrap_or_else(T::zero)
}


// Polar Box-Muller transformation

pub fn randn<T: Real>() -> (T, T) {
  let mut rng = rand::thread_rng();
  loop {
    let u = rng.gen_range(-T::one(), T::one());
    let v = rng.gen_range(-T::one(), T::one());
    let r = u * u + v * v;
    // Try again if outside interval
    if r == T::zero() || r >= T::one() { continue }
    let c = (cast::<T>(2) * -r.ln() / r).sqrt();
    return (u * c, v * c)
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn negative() {
    assert_eq!(negative_index(-1, 3, false).unwrap(), 2);
    assert_eq!(negative_index(-1, 3, true).unwrap(), 3);
    assert_eq!(negative_index(0, 3, false).unwrap(), 0);
    assert!(negative_index(3, 3, false).is_err());
    assert!(negative_index(-4, 3, false).is_err());
  }
}

use rand::distributions::uniform::SampleUniform;
use num_traits::{ NumAssignOps, Num, NumCast };

use crate::ops::Cops;


/// All types that may be stored in a [Tensor](crate::Tensor).
///
/// This trait gets implemented automatically for all types
/// that satisfy its dependent traits.

pub trait Inner: PartialEq + Clone + Copy + std::fmt::Debug {}
impl<T: PartialEq + Clone + Copy + std::fmt::Debug> Inner for T {}


/// All numeric types.
///
/// This trait gets implemented automatically for all types
/// that satisfy its dependent traits.

pub trait Numeric: Inner + PartialOrd + Num + NumCast + NumAssignOps + std::iter::Sum {}
impl<T: Inner + PartialOrd + Num + NumCast + NumAssignOps + std::iter::Sum> Numeric for T {}


/// All signed numeric types.

pub trait Signed: Numeric + num_traits::Signed {}
impl<T: Numeric + num_traits::Signed> Signed for T {}


/// Continuous numeric types that gradients can be computed for.
///
/// Implemented for `f32` and `f64`, the types with a
/// matrix multiplication kernel.

pub trait Real: Signed + num_traits::real::Real + SampleUniform + Cops {}
impl<T: Signed + num_traits::real::Real + SampleUniform + Cops> Real for T {}

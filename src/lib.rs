//! Define-by-run automatic differentiation for tensors.
//! Tiny. Few dependencies. CPU only.
//!
//! # Features
//!
//! - **Implicit graphs** — Operations on gradient-tracking [Variable]s record
//! themselves as they execute. Operations on untracked inputs record nothing.
//!
//! - **Broadcasting** — Tensors with differing but compatible shapes get
//! broadcasted to matching dimensions automatically. Incompatible shapes
//! are reported as a [ShapeError] before any output exists.
//!
//! - **Zero-copy views** — Tensors may be indexed, reshaped, transposed and
//! broadcasted without copying any data. Views share storage with the
//! tensor they were taken from, and in-place writes are visible through all of them.
//!
//! - **Array bridge** — Contiguous tensors can be exposed as flat
//! [ArrayView]s aliasing their buffer.
//!
//! - **Graph recycling** — Computation graphs can be re-evaluated with
//! new input data, or serialized and loaded elsewhere.
//!
//! # Examples
//!
//! ```
//! use tensorgrad::Tensor;
//!
//! let x = Tensor::<f64>::ones(&[2, 2]).tracked();
//! let y = &x + 2.0;
//! let z = (&y * 3.0).mul(&y)?;
//! let out = z.mean();
//!
//! out.backward()?;
//! assert_eq!(x.grad(), Some(Tensor::fill(&[2, 2], 4.5)));
//! # Ok::<(), tensorgrad::Error>(())
//! ```
//!
//! Vector-Jacobian products for non-scalar results:
//! ```
//! use tensorgrad::Tensor;
//!
//! let x = Tensor::vec(&[1.0, 2.0, 3.0]).tracked();
//! let y = &x * 2.0;
//! y.backward_with(&Tensor::vec(&[0.1, 1.0, 0.0001]))?;
//! assert_eq!(x.grad(), Some(Tensor::vec(&[0.2, 2.0, 0.0002])));
//! # Ok::<(), tensorgrad::Error>(())
//! ```
//!
//! Gradients accumulate across backward passes until cleared with
//! [Variable::reset] or [Variable::clear_grad].
//!
//! # Optional features
//!
//! - `unsafe` *(default)* — Accelerated matrix math using [matrixmultiply] crate.

mod internal;
mod shape;
mod tensor;
mod variable;

pub mod ops;
pub mod scalar;
pub mod error;

pub use shape::{ Shape, broadcast_dims };
pub use tensor::{ Tensor, ArrayView };
pub use variable::{ Variable, Graph };
pub use variable::mops::{ UnaryMops, BinaryMops };
pub use error::{ Error, Result, ShapeError, GradientError };

//! gridmp Tensor - Dense Arrays for Parallel Training
//!
//! This crate provides the `Tensor` type exchanged by the gridmp collectives.
//! Tensors are small, contiguous, row-major arrays; the operations here are
//! exactly the layout primitives that model-parallel communication needs
//! (narrow, equal chunking and concatenation along an axis, 2-D transpose)
//! plus the element-wise arithmetic and matmul used to drive a
//! fully-connected layer in tests and simulations.
//!
//! # Example
//! ```rust
//! use gridmp_tensor::{cat, Tensor};
//!
//! let t = Tensor::<f32>::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
//! let cols = t.chunk(2, 1).unwrap();
//! assert_eq!(cols[0].to_vec(), vec![1.0, 3.0]);
//! assert_eq!(cat(&cols, 1).unwrap(), t);
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// ML/tensor-specific allowances
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::similar_names)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::needless_range_loop)]

pub mod dtype;
pub mod error;
pub mod shape;
pub mod tensor;
pub mod view;

// =============================================================================
// Re-exports
// =============================================================================

pub use dtype::{Numeric, Scalar};
pub use error::{Result, TensorError};
pub use tensor::Tensor;
pub use view::cat;

//! Data Types - Element Traits
//!
//! Traits describing which element types a [`Tensor`](crate::Tensor) may
//! hold. Activations and gradients are `f32`; labels are integer tensors.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use core::fmt::Debug;
use num_traits::Num;

// =============================================================================
// Scalar
// =============================================================================

/// Any plain-old-data element that can be stored in a tensor.
pub trait Scalar: Copy + Debug + Default + PartialEq + Send + Sync + 'static {}

impl Scalar for f32 {}
impl Scalar for f64 {}
impl Scalar for i32 {}
impl Scalar for i64 {}
impl Scalar for u8 {}
impl Scalar for u32 {}
impl Scalar for usize {}

// =============================================================================
// Numeric
// =============================================================================

/// Elements that support arithmetic.
pub trait Numeric: Scalar + Num {}

impl<T: Scalar + Num> Numeric for T {}

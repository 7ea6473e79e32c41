//! The `affine` dialect models loop nests and memory accesses whose bounds and subscripts are affine functions of
//! loop induction variables and of values that are invariant within an affine scope. This module contains the affine
//! expression model (i.e., [`AffineExpression`]s, [`AffineMap`]s, and [`IntegerSet`]s), the rules that determine
//! which values may be bound to the dimensions and symbols of affine maps, the composition and canonicalization of
//! maps together with their operands, and the `affine` operations themselves.
//!
//! Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/Dialects/Affine/) for more information.

pub mod affine_expressions;
pub mod affine_maps;
pub mod canonicalization;
pub mod integer_sets;
pub mod legality;
pub mod operations;
pub mod value_maps;

pub use affine_expressions::*;
pub use affine_maps::*;
pub use canonicalization::*;
pub use integer_sets::*;
pub use legality::*;
pub use operations::*;
pub use value_maps::*;

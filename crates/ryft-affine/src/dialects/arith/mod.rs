//! The `arith` dialect is intended to hold basic integer and floating point [`Operation`](crate::Operation)s. This
//! crate only models its constants since those are the only `arith` operations that the affine analyses care about.
//!
//! Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/Dialects/ArithOps/) for more information.

pub mod operations;

pub use operations::*;

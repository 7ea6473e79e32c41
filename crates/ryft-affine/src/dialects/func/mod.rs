//! The `func` dialect contains operations surrounding high order function abstractions, such as functions. Functions
//! are the usual affine scopes: values defined at the top level of their bodies are valid affine symbols everywhere
//! inside them.
//!
//! Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/Dialects/Func/) for more information.

pub mod operations;

pub use operations::*;

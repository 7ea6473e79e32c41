//! The `memref` dialect is designed for operations on memory references. It provides abstractions for working with
//! buffers and memory at a relatively low level.
//!
//! Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/Dialects/MemRef/) for more information.

pub mod operations;

pub use operations::*;

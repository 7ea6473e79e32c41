//! Analyses that answer questions about affine loop nests without modifying them. They are meant to be used by loop
//! transformations (e.g., vectorization, unrolling, and software pipelining) to decide whether those transformations
//! are legal and profitable.

pub mod loops;

pub use loops::*;

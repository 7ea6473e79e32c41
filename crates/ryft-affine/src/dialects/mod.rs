//! Dialects group the [`Operation`](crate::Operation)s that this crate knows how to build and analyze. The `affine`
//! dialect is the subject of the analyses in this crate, while the `func`, `arith`, and `memref` dialects provide
//! the surrounding constructs that the affine legality rules refer to (i.e., affine scopes, constants, and the
//! operations that define memory references and their sizes).

pub mod affine;
pub mod arith;
pub mod func;
pub mod memref;

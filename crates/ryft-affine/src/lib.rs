//! Affine analysis core for polyhedral loop and array-access transformations.
//!
//! This crate provides a small, self-contained IR (owned by a [`Context`]) with just enough structure to express
//! functions, affine loop nests, and memory accesses, along with the analyses that loop transformations rely on:
//!
//!   - the affine expression model ([`AffineExpression`]s, [`AffineMap`]s, and [`IntegerSet`]s),
//!   - the scope and legality rules that determine which values are valid dimensions and symbols of affine maps,
//!   - the composition and canonicalization of affine maps and integer sets together with their operands,
//!   - the `affine` operations with their verifiers and folders, and
//!   - loop analyses (e.g., trip counts, access invariance and contiguity, and vectorizability of loop bodies).

#[macro_use]
mod macros;

pub mod analysis;
pub mod blocks;
pub mod context;
pub mod diagnostics;
pub mod dialects;
pub mod errors;
pub mod operations;
pub mod regions;
pub mod types;
pub mod values;

pub(crate) mod support;

pub use self::analysis::*;
pub use self::blocks::*;
pub use self::context::*;
pub use self::diagnostics::*;
pub use self::dialects::affine::{
    AddAffineExpressionRef, AffineExpression, AffineExpressionKind, AffineExpressionRef, AffineMap, AffineMapOrSet,
    AffineValueMap, BinaryOperationAffineExpressionRef, CeilDivAffineExpressionRef, ConstantAffineExpressionRef,
    DimensionAffineExpressionRef, FloorDivAffineExpressionRef, IntegerSet, IntegerSetConstraint,
    ModAffineExpressionRef, MulAffineExpressionRef, SymbolAffineExpressionRef,
};
pub use self::errors::*;
pub use self::operations::*;
pub use self::regions::*;
pub use self::support::LogicalResult;
pub use self::types::*;
pub use self::values::*;

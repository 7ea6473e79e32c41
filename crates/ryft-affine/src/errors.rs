use thiserror::Error;

/// Errors returned when the inputs of a construction or analysis entry point violate one of its preconditions
/// (e.g., an operand list whose length does not match the arity of the [`AffineMap`](crate::AffineMap) it is
/// bound to). Facts that simply cannot be determined (e.g., a trip count that is not a known constant) are never
/// reported as errors and are instead represented using [`Option`]s.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum Error {
    #[error("expected {expected_count} operands but got {actual_count}")]
    OperandCountMismatch { expected_count: usize, actual_count: usize },

    #[error("expected {expected_count} results but got {actual_count}")]
    ResultCountMismatch { expected_count: usize, actual_count: usize },

    #[error("{kind} position {position} is out of bounds for {kind} count {count}")]
    PositionOutOfBounds { kind: &'static str, position: usize, count: usize },

    #[error("'{lhs}' {operator} '{rhs}' is not an affine expression")]
    NonAffineExpression { lhs: String, operator: &'static str, rhs: String },

    #[error("invalid divisor '{divisor}'; divisors in affine expressions must be positive constants")]
    InvalidDivisor { divisor: String },

    #[error("invalid loop step {step}; loop steps must be positive")]
    InvalidStep { step: i64 },

    #[error("expected {expected_count} shifts (one per loop body operation) but got {actual_count}")]
    ShiftCountMismatch { expected_count: usize, actual_count: usize },

    #[error("affine map composition did not reach a fixpoint within {limit} steps; the apply graph may be cyclic")]
    CompositionLimitExceeded { limit: usize },

    #[error("cannot combine objects that belong to different contexts")]
    ContextMismatch,

    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
}

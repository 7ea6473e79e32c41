use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Logical result value (essentially a boolean with named states). Canonicalization entry points return
/// [`LogicalResult::failure`] when they did not change anything, which lets callers distinguish "already canonical"
/// from "changed" without inspecting their outputs. Instances of [`LogicalResult`] must only be inspected using the
/// associated [`LogicalResult::is_success`] and [`LogicalResult::is_failure`] functions.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct LogicalResult {
    succeeded: bool,
}

impl LogicalResult {
    /// Creates a new [`LogicalResult`] that represents a "success" result.
    pub fn success() -> Self {
        Self { succeeded: true }
    }

    /// Creates a new [`LogicalResult`] that represents a "failure" result.
    pub fn failure() -> Self {
        Self { succeeded: false }
    }

    /// Returns `true` if this [`LogicalResult`] represents a "success" result.
    pub fn is_success(&self) -> bool {
        self.succeeded
    }

    /// Returns `true` if this [`LogicalResult`] represents a "failure" result.
    pub fn is_failure(&self) -> bool {
        !self.succeeded
    }
}

impl From<bool> for LogicalResult {
    fn from(value: bool) -> Self {
        Self { succeeded: value }
    }
}

impl From<LogicalResult> for bool {
    fn from(value: LogicalResult) -> Self {
        value.succeeded
    }
}

impl Display for LogicalResult {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", if self.is_success() { "success" } else { "failure" })
    }
}

impl Debug for LogicalResult {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "LogicalResult[{self}]")
    }
}

/// Storage that "uniques" values of type `T`: inserting a value that is equal to one that was already inserted
/// returns the identifier of the existing value. Identifiers are dense indices into the storage and are never
/// invalidated because values are never removed.
pub(crate) struct Uniquer<T: Clone + Eq + Hash> {
    values: Vec<T>,
    identifiers: HashMap<T, usize>,
}

impl<T: Clone + Eq + Hash> Uniquer<T> {
    pub(crate) fn new() -> Self {
        Self { values: Vec::new(), identifiers: HashMap::new() }
    }

    /// Returns the identifier of `value`, inserting it first if it has not been seen before.
    pub(crate) fn intern(&mut self, value: T) -> usize {
        if let Some(&id) = self.identifiers.get(&value) {
            return id;
        }
        let id = self.values.len();
        self.values.push(value.clone());
        self.identifiers.insert(value, id);
        id
    }

    /// Returns the value with the provided identifier. Identifiers are only ever produced by [`Uniquer::intern`]
    /// and so this function panics for identifiers that did not come from this [`Uniquer`].
    pub(crate) fn get(&self, id: usize) -> &T {
        &self.values[id]
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }
}

/// Returns the greatest common divisor of `lhs` and `rhs` (with `gcd(0, x) == x`).
pub(crate) fn greatest_common_divisor(lhs: u64, rhs: u64) -> u64 {
    let (mut a, mut b) = (lhs, rhs);
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Returns `lhs / rhs` rounded towards negative infinity. `rhs` must be positive.
pub(crate) fn floor_div(lhs: i64, rhs: i64) -> i64 {
    let quotient = lhs / rhs;
    if (lhs % rhs != 0) && ((lhs < 0) != (rhs < 0)) { quotient - 1 } else { quotient }
}

/// Returns `lhs / rhs` rounded towards positive infinity. `rhs` must be positive.
pub(crate) fn ceil_div(lhs: i64, rhs: i64) -> i64 {
    let quotient = lhs / rhs;
    if (lhs % rhs != 0) && ((lhs < 0) == (rhs < 0)) { quotient + 1 } else { quotient }
}

/// Returns the non-negative remainder of `lhs` divided by `rhs`. `rhs` must be positive.
pub(crate) fn modulo(lhs: i64, rhs: i64) -> i64 {
    lhs.rem_euclid(rhs)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_logical_result() {
        let success = LogicalResult::success();
        let failure = LogicalResult::failure();
        assert!(success.is_success());
        assert!(!success.is_failure());
        assert!(failure.is_failure());
        assert_eq!(LogicalResult::from(true), success);
        assert_eq!(bool::from(failure), false);
        assert_eq!(success.to_string(), "success");
        assert_eq!(format!("{:?}", failure), "LogicalResult[failure]");
    }

    #[test]
    fn test_uniquer() {
        let mut uniquer = Uniquer::new();
        let id_0 = uniquer.intern("a".to_string());
        let id_1 = uniquer.intern("b".to_string());
        let id_2 = uniquer.intern("a".to_string());
        assert_eq!(id_0, id_2);
        assert_ne!(id_0, id_1);
        assert_eq!(uniquer.get(id_1), "b");
        assert_eq!(uniquer.len(), 2);
    }

    #[test]
    fn test_integer_division_helpers() {
        assert_eq!(greatest_common_divisor(12, 18), 6);
        assert_eq!(greatest_common_divisor(0, 7), 7);
        assert_eq!(greatest_common_divisor(7, 0), 7);
        assert_eq!(floor_div(7, 2), 3);
        assert_eq!(floor_div(-7, 2), -4);
        assert_eq!(floor_div(-8, 2), -4);
        assert_eq!(ceil_div(7, 2), 4);
        assert_eq!(ceil_div(-7, 2), -3);
        assert_eq!(ceil_div(10, 3), 4);
        assert_eq!(modulo(7, 3), 1);
        assert_eq!(modulo(-7, 3), 2);
    }
}

use crate::dialects::affine::canonicalization::{
    canonicalize_and_simplify, compose_affine_map_and_operands, fully_compose_affine_map_and_operands,
};
use crate::{AffineExpression, AffineMap, Context, Error, Value, ValueRef};

/// [`AffineMap`] along with the [`Value`]s that are bound to its dimensions and symbols (i.e., its operands) and,
/// optionally, the [`Value`]s that hold its results. This is the form in which the affine maps of operations like
/// `affine.apply` and the bounds of `affine.for` and `affine.parallel` operations are analyzed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AffineValueMap<'c> {
    map: AffineMap<'c>,
    operands: Vec<ValueRef<'c>>,
    results: Vec<ValueRef<'c>>,
}

impl<'c> AffineValueMap<'c> {
    /// Creates a new [`AffineValueMap`] without result values. Returns an [`Error::OperandCountMismatch`] if the
    /// number of operands does not match the number of inputs of `map`, and an [`Error::ContextMismatch`] if any of
    /// the operands belongs to a different [`Context`] than `map`.
    pub fn new<V: Value<'c>>(map: AffineMap<'c>, operands: &[V]) -> Result<Self, Error> {
        if operands.len() != map.input_count() {
            return Err(Error::OperandCountMismatch { expected_count: map.input_count(), actual_count: operands.len() });
        }
        let operands = operands.iter().map(|operand| operand.as_ref()).collect::<Vec<_>>();
        if !operands.iter().all(|operand| std::ptr::eq(operand.context, map.context())) {
            return Err(Error::ContextMismatch);
        }
        Ok(Self { map, operands, results: Vec::new() })
    }

    /// Creates a new [`AffineValueMap`] from parts that are already known to be consistent.
    pub(crate) fn from_parts(map: AffineMap<'c>, operands: Vec<ValueRef<'c>>, results: Vec<ValueRef<'c>>) -> Self {
        debug_assert_eq!(operands.len(), map.input_count());
        Self { map, operands, results }
    }

    /// Returns a reference to the [`Context`] that owns this [`AffineValueMap`].
    pub fn context(&self) -> &'c Context {
        self.map.context()
    }

    /// Returns the underlying [`AffineMap`].
    pub fn map(&self) -> AffineMap<'c> {
        self.map
    }

    /// Returns the operands of this [`AffineValueMap`] (dimension operands first, followed by symbol operands).
    pub fn operands(&self) -> &[ValueRef<'c>] {
        &self.operands
    }

    /// Returns the `index`-th operand of this [`AffineValueMap`], or [`None`] if the index is out of bounds.
    pub fn operand(&self, index: usize) -> Option<ValueRef<'c>> {
        self.operands.get(index).copied()
    }

    /// Returns the values that hold the results of this [`AffineValueMap`]. This is empty for value maps that are
    /// not backed by an operation.
    pub fn results(&self) -> &[ValueRef<'c>] {
        &self.results
    }

    pub fn dimension_count(&self) -> usize {
        self.map.dimension_count()
    }

    pub fn symbol_count(&self) -> usize {
        self.map.symbol_count()
    }

    pub fn result_count(&self) -> usize {
        self.map.result_count()
    }

    /// Returns `true` if the `index`-th result of this [`AffineValueMap`] is a function of `value`. This only looks
    /// at the structure of the result expression and it is therefore conservative (e.g., `d0 - d0` is treated as a
    /// function of `d0`). Values that are not operands of this map, and out of bounds indices, yield `false`.
    pub fn is_function_of<V: Value<'c>>(&self, index: usize, value: V) -> bool {
        let value = value.as_ref();
        let Some(position) = self.operands.iter().position(|operand| *operand == value) else {
            return false;
        };
        if index >= self.map.result_count() {
            return false;
        }
        let result = self.map.result(index);
        let dimension_count = self.map.dimension_count();
        if position < dimension_count {
            result.is_function_of_dimension(position)
        } else {
            result.is_function_of_symbol(position - dimension_count)
        }
    }

    /// Returns the [`AffineValueMap`] whose results are the differences between the results of this map and the
    /// corresponding results of `other` (i.e., `self[i] - other[i]`). Both maps are fully composed first and their
    /// operand lists are then merged, so that operands that appear in both maps cancel out in the resulting
    /// expressions. Returns an [`Error::ResultCountMismatch`] if the two maps have different numbers of results.
    pub fn difference(&self, other: &Self) -> Result<Self, Error> {
        if self.result_count() != other.result_count() {
            return Err(Error::ResultCountMismatch {
                expected_count: self.result_count(),
                actual_count: other.result_count(),
            });
        }
        if !std::ptr::eq(self.context(), other.context()) {
            return Err(Error::ContextMismatch);
        }

        let (lhs_map, lhs_operands) = fully_compose_affine_map_and_operands(self.map, &self.operands)?;
        let (rhs_map, rhs_operands) = fully_compose_affine_map_and_operands(other.map, &other.operands)?;
        let context = lhs_map.context();
        let (lhs_dimension_count, lhs_symbol_count) = (lhs_map.dimension_count(), lhs_map.symbol_count());
        let (rhs_dimension_count, rhs_symbol_count) = (rhs_map.dimension_count(), rhs_map.symbol_count());

        // The inputs of `other` are placed after those of `self`, separately for dimensions and for symbols.
        let rhs_dimensions = (0..rhs_dimension_count)
            .map(|position| context.dimension_affine_expression(lhs_dimension_count + position).as_ref())
            .collect::<Vec<_>>();
        let rhs_symbols = (0..rhs_symbol_count)
            .map(|position| context.symbol_affine_expression(lhs_symbol_count + position).as_ref())
            .collect::<Vec<_>>();
        let results = lhs_map
            .results()
            .zip(rhs_map.results())
            .map(|(lhs, rhs)| lhs - rhs.replace_dimensions_and_symbols(&rhs_dimensions, &rhs_symbols))
            .collect::<Vec<_>>();
        let map = context.affine_map(
            lhs_dimension_count + rhs_dimension_count,
            lhs_symbol_count + rhs_symbol_count,
            &results,
        )?;
        let operands = [
            &lhs_operands[..lhs_dimension_count],
            &rhs_operands[..rhs_dimension_count],
            &lhs_operands[lhs_dimension_count..],
            &rhs_operands[rhs_dimension_count..],
        ]
        .concat();

        // Merging duplicate operands is what makes shared terms cancel after simplification.
        let (map, operands) = canonicalize_and_simplify(map, operands)?;
        tracing::trace!(lhs = %self.map, rhs = %other.map, difference = %map, "computed affine value map difference");
        Ok(Self::from_parts(map, operands, Vec::new()))
    }

    /// Composes and canonicalizes this [`AffineValueMap`], returning the resulting map or [`None`] if nothing
    /// changed. The result values of this map (if any) are carried over unchanged.
    pub fn canonicalize(&self) -> Result<Option<Self>, Error> {
        let (map, operands) = compose_affine_map_and_operands(self.map, &self.operands)?;
        if map == self.map && operands == self.operands {
            return Ok(None);
        }
        Ok(Some(Self::from_parts(map, operands, self.results.clone())))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::Operation;
    use crate::dialects::{affine, arith, func};

    use super::*;

    #[test]
    fn test_affine_value_map() {
        let context = Context::new();
        let function = func::func(&context, "f", &[context.index_type(), context.index_type()]);
        let n = function.entry_block().argument(0).unwrap();
        let m = function.entry_block().argument(1).unwrap();
        let d0 = context.dimension_affine_expression(0);
        let s0 = context.symbol_affine_expression(0);
        let map = context.affine_map(1, 1, &[d0 + s0, d0 * 2]).unwrap();
        let value_map = AffineValueMap::new(map, &[n, m]).unwrap();
        assert_eq!(value_map.map(), map);
        assert_eq!(value_map.operands(), &[n.as_ref(), m.as_ref()]);
        assert_eq!(value_map.operand(2), None);
        assert_eq!(value_map.results(), &[] as &[ValueRef]);
        assert_eq!(value_map.dimension_count(), 1);
        assert_eq!(value_map.symbol_count(), 1);
        assert_eq!(value_map.result_count(), 2);
        assert_eq!(
            AffineValueMap::new(map, &[n]),
            Err(Error::OperandCountMismatch { expected_count: 2, actual_count: 1 }),
        );
    }

    #[test]
    fn test_affine_value_map_is_function_of() {
        let context = Context::new();
        let function = func::func(&context, "f", &[context.index_type(), context.index_type(), context.index_type()]);
        let n = function.entry_block().argument(0).unwrap();
        let m = function.entry_block().argument(1).unwrap();
        let unused = function.entry_block().argument(2).unwrap();
        let d0 = context.dimension_affine_expression(0);
        let s0 = context.symbol_affine_expression(0);
        let map = context.affine_map(1, 1, &[d0 + 1, s0 * 3]).unwrap();
        let value_map = AffineValueMap::new(map, &[n, m]).unwrap();
        assert!(value_map.is_function_of(0, n));
        assert!(!value_map.is_function_of(0, m));
        assert!(value_map.is_function_of(1, m));
        assert!(!value_map.is_function_of(1, n));
        assert!(!value_map.is_function_of(0, unused));
        assert!(!value_map.is_function_of(2, n));
    }

    #[test]
    fn test_affine_value_map_difference() {
        let context = Context::new();
        let function = func::func(&context, "f", &[context.index_type(), context.index_type()]);
        let n = function.entry_block().argument(0).unwrap();
        let m = function.entry_block().argument(1).unwrap();
        let s0 = context.symbol_affine_expression(0);
        let s1 = context.symbol_affine_expression(1);

        // (n + m + 10) - (n + 2) == m + 8
        let lhs = AffineValueMap::new(context.affine_map(0, 2, &[s0 + s1 + 10]).unwrap(), &[n, m]).unwrap();
        let rhs = AffineValueMap::new(context.affine_map(0, 1, &[s0 + 2]).unwrap(), &[n]).unwrap();
        let difference = lhs.difference(&rhs).unwrap();
        assert_eq!(difference.operands(), &[m.as_ref()]);
        assert_eq!(difference.dimension_count(), 0);
        assert_eq!(difference.symbol_count(), 1);
        assert_eq!(difference.map().result(0).evaluate(&[], &[5]), Some(13));

        // Constant maps produce constant differences.
        let lhs = AffineValueMap::new(context.constant_affine_map(10), &[] as &[ValueRef]).unwrap();
        let rhs = AffineValueMap::new(context.constant_affine_map(4), &[] as &[ValueRef]).unwrap();
        assert_eq!(lhs.difference(&rhs).unwrap().map().constant(), Some(6));

        let two_results = AffineValueMap::new(context.affine_map(0, 1, &[s0, s0]).unwrap(), &[n]).unwrap();
        assert_eq!(
            lhs.difference(&two_results),
            Err(Error::ResultCountMismatch { expected_count: 1, actual_count: 2 }),
        );
    }

    #[test]
    fn test_affine_value_map_difference_through_apply() {
        let context = Context::new();
        let function = func::func(&context, "f", &[context.index_type()]);
        let block = function.entry_block();
        let n = block.argument(0).unwrap();
        let s0 = context.symbol_affine_expression(0);
        let apply = affine::apply(&context, context.affine_map(0, 1, &[s0 * 4]).unwrap(), &[n]).unwrap();
        let apply = block.append_operation(apply).unwrap();

        // (4 * n + 3) - (4 * n) == 3
        let lhs_map = context.affine_map(0, 1, &[s0 + 3]).unwrap();
        let lhs = AffineValueMap::new(lhs_map, &[apply.result(0).unwrap()]).unwrap();
        let rhs = AffineValueMap::new(context.affine_map(0, 1, &[s0 * 4]).unwrap(), &[n]).unwrap();
        let difference = lhs.difference(&rhs).unwrap();
        assert_eq!(difference.map().constant(), Some(3));
        assert!(difference.operands().is_empty());
    }

    #[test]
    fn test_affine_value_map_canonicalize() {
        let context = Context::new();
        let function = func::func(&context, "f", &[context.index_type()]);
        let n = function.entry_block().argument(0).unwrap();
        let constant = function.entry_block().append_operation(arith::constant_index(&context, 5)).unwrap();
        let d0 = context.dimension_affine_expression(0);
        let d1 = context.dimension_affine_expression(1);
        let map = context.affine_map(2, 0, &[d0 + d1]).unwrap();
        let value_map = AffineValueMap::new(map, &[n.as_ref(), constant.result(0).unwrap().as_ref()]).unwrap();
        let canonical = value_map.canonicalize().unwrap().unwrap();
        assert_eq!(canonical.dimension_count(), 0);
        assert_eq!(canonical.symbol_count(), 1);
        assert_eq!(canonical.map().result(0).evaluate(&[], &[2]), Some(7));
        assert_eq!(canonical.operands(), &[n.as_ref()]);
        assert_eq!(canonical.canonicalize(), Ok(None));
    }
}

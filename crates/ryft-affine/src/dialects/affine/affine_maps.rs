use std::collections::HashSet;
use std::fmt::{Debug, Display};

use crate::{Context, Error};

use super::affine_expressions::{AffineExpression, AffineExpressionRef, AffineExpressionStorage};

/// Uniqued representation of an [`AffineMap`] inside a [`Context`]. Results refer to [`AffineExpression`]s using
/// their identifiers in the same [`Context`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct AffineMapStorage {
    pub(crate) dimension_count: usize,
    pub(crate) symbol_count: usize,
    pub(crate) results: Vec<usize>,
}

/// Multidimensional affine map. Affine maps are mathematical functions which map lists of dimensions, identifiers,
/// and symbols, to multidimensional affine expressions (e.g., `(d0, d1) -> (d0/128, d0 mod 128, d1)` where the names
/// being used here do not matter; it is the mathematical function that is unique to this affine map and that defines
/// it). They are immutable, uniqued, and always owned by a [`Context`].
///
/// Every [`DimensionAffineExpressionRef`](crate::DimensionAffineExpressionRef) that appears in the results of an
/// [`AffineMap`] refers to a position that is smaller than [`AffineMap::dimension_count`], and similarly for
/// [`SymbolAffineExpressionRef`](crate::SymbolAffineExpressionRef)s and [`AffineMap::symbol_count`].
#[derive(Copy, Clone)]
pub struct AffineMap<'c> {
    /// Identifier of this [`AffineMap`] in its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`AffineMap`].
    pub(crate) context: &'c Context,
}

impl<'c> AffineMap<'c> {
    fn with_storage<R>(&self, callback: impl FnOnce(&AffineMapStorage) -> R) -> R {
        callback(self.context.affine_maps.borrow().get(self.id))
    }

    /// Returns a reference to the [`Context`] that owns this [`AffineMap`].
    pub fn context(&self) -> &'c Context {
        self.context
    }

    /// Returns the number of dimensions of this [`AffineMap`].
    pub fn dimension_count(&self) -> usize {
        self.with_storage(|storage| storage.dimension_count)
    }

    /// Returns the number of symbols of this [`AffineMap`].
    pub fn symbol_count(&self) -> usize {
        self.with_storage(|storage| storage.symbol_count)
    }

    /// Returns the number of inputs (i.e., number of dimensions and symbols combined) of this [`AffineMap`].
    pub fn input_count(&self) -> usize {
        self.with_storage(|storage| storage.dimension_count + storage.symbol_count)
    }

    /// Returns the number of results of this [`AffineMap`].
    pub fn result_count(&self) -> usize {
        self.with_storage(|storage| storage.results.len())
    }

    /// Returns the result [`AffineExpression`]s of this [`AffineMap`].
    pub fn results(&self) -> impl Iterator<Item = AffineExpressionRef<'c>> + use<'c> {
        let context = self.context;
        self.with_storage(|storage| storage.results.clone())
            .into_iter()
            .map(move |id| AffineExpressionRef { id, context })
    }

    /// Returns the `index`-th result [`AffineExpression`] of this [`AffineMap`].
    ///
    /// Note that this function will panic if the provided index is out of bounds.
    pub fn result(&self, index: usize) -> AffineExpressionRef<'c> {
        let id = self.with_storage(|storage| storage.results.get(index).copied());
        match id {
            Some(id) => AffineExpressionRef { id, context: self.context },
            None => panic!("result index is out of bounds"),
        }
    }

    /// Returns `true` if this map is an empty map. Refer to [`Context::empty_affine_map`] for more information.
    pub fn is_empty(&self) -> bool {
        self.with_storage(|storage| {
            storage.dimension_count == 0 && storage.symbol_count == 0 && storage.results.is_empty()
        })
    }

    /// Returns `true` if this map is a single result constant map. Refer to [`Context::constant_affine_map`]
    /// for more information.
    pub fn is_constant(&self) -> bool {
        self.constant().is_some()
    }

    /// Returns `true` if this map is an identity map (i.e., it has as many results as dimensions and its `i`-th
    /// result is the `i`-th dimension).
    pub fn is_identity(&self) -> bool {
        self.dimension_count() == self.result_count() && self.results().enumerate().all(|(index, result)| {
            result.storage() == AffineExpressionStorage::Dimension(index)
        })
    }

    /// Returns `true` if this map is a minor identity map. Refer to [`Context::minor_identity_affine_map`]
    /// for more information.
    pub fn is_minor_identity(&self) -> bool {
        let (dimension_count, result_count) = (self.dimension_count(), self.result_count());
        self.symbol_count() == 0
            && dimension_count >= result_count
            && self.results().enumerate().all(|(index, result)| {
                result.storage() == AffineExpressionStorage::Dimension(dimension_count - result_count + index)
            })
    }

    /// Returns `true` if this map represents a "symbol-less" permutation map.
    /// Refer to [`Context::permutation_affine_map`] for more information.
    pub fn is_permutation(&self) -> bool {
        self.dimension_count() == self.result_count() && self.is_projected_permutation()
    }

    /// Returns `true` if this map represents a subset of a "symbol-less" permutation map.
    /// Refer to [`Context::permutation_affine_map`] for more information.
    pub fn is_projected_permutation(&self) -> bool {
        if self.symbol_count() > 0 || self.result_count() > self.dimension_count() {
            return false;
        }
        let mut seen = HashSet::new();
        self.results().all(|result| match result.storage() {
            AffineExpressionStorage::Dimension(position) => seen.insert(position),
            _ => false,
        })
    }

    /// Returns the constant result of this map, if it is a single result constant map, and [`None`] otherwise.
    /// Refer to [`Context::constant_affine_map`] for more information.
    pub fn constant(&self) -> Option<i64> {
        if self.result_count() != 1 {
            return None;
        }
        self.result(0).constant_value()
    }

    /// Returns the values of all results of this map if all of them are constants, and [`None`] otherwise.
    pub fn constant_results(&self) -> Option<Vec<i64>> {
        self.results().map(|result| result.constant_value()).collect()
    }

    /// Returns the [`AffineMap`] that consists only of the results at the specified indices of this [`AffineMap`].
    ///
    /// Note that this function will panic if any of the provided indices is out of bounds.
    pub fn sub_map(&self, results: &[usize]) -> Self {
        let results = results.iter().map(|index| self.result(*index)).collect::<Vec<_>>();
        self.context.intern_affine_map(self.dimension_count(), self.symbol_count(), &results)
    }

    /// Returns the [`AffineMap`] that consists only of the most major `result_count` results of this [`AffineMap`].
    /// Returns [`None`] if `result_count` is set to zero and returns `self` if it is set to a number that is greater
    /// than or equal to the number of results of this [`AffineMap`].
    pub fn major_sub_map(&self, result_count: usize) -> Option<Self> {
        match result_count {
            0 => None,
            _ if result_count >= self.result_count() => Some(*self),
            _ => Some(self.sub_map(&(0..result_count).collect::<Vec<_>>())),
        }
    }

    /// Returns the [`AffineMap`] that consists only of the most minor `result_count` results of this [`AffineMap`].
    /// Returns [`None`] if `result_count` is set to zero and returns `self` if it is set to a number that is greater
    /// than or equal to the number of results of this [`AffineMap`].
    pub fn minor_sub_map(&self, result_count: usize) -> Option<Self> {
        let current_result_count = self.result_count();
        match result_count {
            0 => None,
            _ if result_count >= current_result_count => Some(*self),
            _ => Some(self.sub_map(&((current_result_count - result_count)..current_result_count).collect::<Vec<_>>())),
        }
    }

    /// Replaces `expression` with `replacement` in each of the results of this [`AffineMap`], returning the resulting
    /// [`AffineMap`], with the provided number of dimensions and symbols. The provided counts must cover every
    /// position that is referenced by the resulting expressions.
    pub fn replace<E: AffineExpression<'c>, R: AffineExpression<'c>>(
        &self,
        expression: E,
        replacement: R,
        result_dimension_count: usize,
        result_symbol_count: usize,
    ) -> Self {
        let results = self.results().map(|result| result.replace(expression, replacement)).collect::<Vec<_>>();
        self.context.intern_affine_map(result_dimension_count, result_symbol_count, &results)
    }

    /// Replaces every dimension `d{i}` in the results of this [`AffineMap`] with `dimensions[i]` and every symbol
    /// `s{i}` with `symbols[i]`, returning the resulting [`AffineMap`] with the provided number of dimensions and
    /// symbols. The provided counts must cover every position that is referenced by the resulting expressions.
    pub fn replace_dimensions_and_symbols(
        &self,
        dimensions: &[AffineExpressionRef<'c>],
        symbols: &[AffineExpressionRef<'c>],
        result_dimension_count: usize,
        result_symbol_count: usize,
    ) -> Self {
        let results = self
            .results()
            .map(|result| result.replace_dimensions_and_symbols(dimensions, symbols))
            .collect::<Vec<_>>();
        self.context.intern_affine_map(result_dimension_count, result_symbol_count, &results)
    }

    /// Returns a new [`AffineMap`] with `shift` additional dimensions, where all dimensions at positions greater than
    /// or equal to `offset` are moved `shift` positions to the right.
    pub fn shift_dimensions(&self, shift: usize, offset: usize) -> Self {
        let dimension_count = self.dimension_count();
        let results = self
            .results()
            .map(|result| result.with_shifted_dimensions(offset, dimension_count, shift))
            .collect::<Vec<_>>();
        self.context.intern_affine_map(dimension_count + shift, self.symbol_count(), &results)
    }

    /// Returns a new [`AffineMap`] with `shift` additional symbols, where all symbols at positions greater than
    /// or equal to `offset` are moved `shift` positions to the right.
    pub fn shift_symbols(&self, shift: usize, offset: usize) -> Self {
        let symbol_count = self.symbol_count();
        let results =
            self.results().map(|result| result.with_shifted_symbols(offset, symbol_count, shift)).collect::<Vec<_>>();
        self.context.intern_affine_map(self.dimension_count(), symbol_count + shift, &results)
    }

    /// Folds the results of this map using the provided constant operand values (one per input, with [`None`] for
    /// operands that are not known constants). Returns the folded values when every result folds to a constant and
    /// [`None`] otherwise.
    pub fn constant_fold(&self, operand_constants: &[Option<i64>]) -> Result<Option<Vec<i64>>, Error> {
        self.partial_constant_fold(operand_constants).map(|(_, results)| results)
    }

    /// Folds as many results of this map as possible using the provided constant operand values (one per input,
    /// with [`None`] for operands that are not known constants). Returns a map with the same inputs in which every
    /// result that folds is replaced by the corresponding constant and every other result is left untouched, along
    /// with the folded values when all of the results fold.
    pub fn partial_constant_fold(
        &self,
        operand_constants: &[Option<i64>],
    ) -> Result<(Self, Option<Vec<i64>>), Error> {
        let (dimension_count, symbol_count) = (self.dimension_count(), self.symbol_count());
        if operand_constants.len() != dimension_count + symbol_count {
            return Err(Error::OperandCountMismatch {
                expected_count: dimension_count + symbol_count,
                actual_count: operand_constants.len(),
            });
        }

        let context = self.context;
        let replacements = operand_constants
            .iter()
            .enumerate()
            .map(|(index, constant)| match constant {
                Some(value) => context.constant_affine_expression(*value).as_ref(),
                None if index < dimension_count => context.dimension_affine_expression(index).as_ref(),
                None => context.symbol_affine_expression(index - dimension_count).as_ref(),
            })
            .collect::<Vec<_>>();
        let (dimensions, symbols) = replacements.split_at(dimension_count);

        let mut values = Some(Vec::with_capacity(self.result_count()));
        let results = self
            .results()
            .map(|result| match result.replace_dimensions_and_symbols(dimensions, symbols).constant_value() {
                Some(value) => {
                    values.iter_mut().for_each(|values| values.push(value));
                    context.constant_affine_expression(value).as_ref()
                }
                None => {
                    values = None;
                    result
                }
            })
            .collect::<Vec<_>>();
        Ok((context.intern_affine_map(dimension_count, symbol_count, &results), values))
    }

    /// Simplifies each result of this map. Refer to [`AffineExpression::simplify`] for more information.
    pub fn simplify(&self) -> Self {
        let (dimension_count, symbol_count) = (self.dimension_count(), self.symbol_count());
        let results =
            self.results().map(|result| result.simplify(dimension_count, symbol_count)).collect::<Vec<_>>();
        self.context.intern_affine_map(dimension_count, symbol_count, &results)
    }

    /// Returns a new [`AffineMap`] that only keeps the first occurrence of each result of this map. This is only
    /// meaningful for maps whose results form a set (e.g., the bounds of loops or of `affine.min` operations).
    pub fn remove_duplicate_results(&self) -> Self {
        let mut seen = HashSet::new();
        let results = self.results().filter(|result| seen.insert(*result)).collect::<Vec<_>>();
        self.context.intern_affine_map(self.dimension_count(), self.symbol_count(), &results)
    }

    /// Returns `true` if any of the results of this map is a function of the dimension at the provided position.
    pub fn is_function_of_dimension(&self, position: usize) -> bool {
        self.results().any(|result| result.is_function_of_dimension(position))
    }

    /// Returns `true` if any of the results of this map is a function of the symbol at the provided position.
    pub fn is_function_of_symbol(&self, position: usize) -> bool {
        self.results().any(|result| result.is_function_of_symbol(position))
    }

    /// Walks all sub-expressions of all results of this map. Refer to [`AffineExpression::walk`] for more information.
    pub fn walk_expressions<F: FnMut(AffineExpressionRef<'c>)>(&self, mut callback: F) {
        self.results().for_each(|result| result.walk(&mut callback));
    }

    /// Compresses (i.e., simplifies) the provided [`AffineMap`]s by dropping symbols that do not appear in any of
    /// them. Symbols that are used by at least one of the maps are renumbered densely (preserving their relative
    /// order) in all of the maps, which keep their own dimensions.
    pub fn compress_unused_symbols(maps: &[Self]) -> Vec<Self> {
        let symbol_count = maps.iter().map(|map| map.symbol_count()).max().unwrap_or(0);
        let mut used = vec![false; symbol_count];
        for map in maps {
            map.walk_expressions(|expression| {
                if let AffineExpressionStorage::Symbol(position) = expression.storage() {
                    used[position] = true;
                }
            });
        }
        maps.iter()
            .map(|map| {
                let context = map.context;
                let mut next_position = 0;
                let symbols = used
                    .iter()
                    .map(|used| {
                        let symbol = context.symbol_affine_expression(next_position).as_ref();
                        if *used {
                            next_position += 1;
                        }
                        symbol
                    })
                    .collect::<Vec<_>>();
                map.replace_dimensions_and_symbols(&[], &symbols, map.dimension_count(), next_position)
            })
            .collect()
    }
}

impl PartialEq for AffineMap<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.context, other.context) && self.id == other.id
    }
}

impl Eq for AffineMap<'_> {}

impl std::hash::Hash for AffineMap<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Display for AffineMap<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_inputs(formatter, self.dimension_count(), self.symbol_count())?;
        write!(formatter, " -> (")?;
        for (index, result) in self.results().enumerate() {
            if index > 0 {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{result}")?;
        }
        write!(formatter, ")")
    }
}

impl Debug for AffineMap<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "AffineMap[{self}]")
    }
}

/// Writes the dimension and symbol lists of an [`AffineMap`] or [`IntegerSet`](crate::IntegerSet)
/// (e.g., `(d0, d1)[s0]`). The symbol list is omitted when there are no symbols.
pub(crate) fn write_inputs(
    formatter: &mut std::fmt::Formatter<'_>,
    dimension_count: usize,
    symbol_count: usize,
) -> std::fmt::Result {
    let dimensions = (0..dimension_count).map(|position| format!("d{position}")).collect::<Vec<_>>();
    write!(formatter, "({})", dimensions.join(", "))?;
    if symbol_count > 0 {
        let symbols = (0..symbol_count).map(|position| format!("s{position}")).collect::<Vec<_>>();
        write!(formatter, "[{}]", symbols.join(", "))?;
    }
    Ok(())
}

/// Checks that all of the provided expressions belong to `context` and only refer to dimensions and symbols at
/// positions that are smaller than `dimension_count` and `symbol_count`, respectively.
pub(crate) fn validate_expressions<'c>(
    context: &'c Context,
    dimension_count: usize,
    symbol_count: usize,
    expressions: &[AffineExpressionRef<'c>],
) -> Result<(), Error> {
    let mut result = Ok(());
    for expression in expressions {
        if !std::ptr::eq(expression.context, context) {
            return Err(Error::ContextMismatch);
        }
        expression.walk(|expression| {
            if result.is_err() {
                return;
            }
            match expression.storage() {
                AffineExpressionStorage::Dimension(position) if position >= dimension_count => {
                    result = Err(Error::PositionOutOfBounds { kind: "dimension", position, count: dimension_count });
                }
                AffineExpressionStorage::Symbol(position) if position >= symbol_count => {
                    result = Err(Error::PositionOutOfBounds { kind: "symbol", position, count: symbol_count });
                }
                _ => {}
            }
        });
        result.clone()?;
    }
    result
}

impl Context {
    /// Interns an [`AffineMap`] whose results are already known to satisfy [`validate_expressions`].
    pub(crate) fn intern_affine_map<'c>(
        &'c self,
        dimension_count: usize,
        symbol_count: usize,
        results: &[AffineExpressionRef<'c>],
    ) -> AffineMap<'c> {
        debug_assert!(validate_expressions(self, dimension_count, symbol_count, results).is_ok());
        let storage = AffineMapStorage {
            dimension_count,
            symbol_count,
            results: results.iter().map(|result| result.id).collect(),
        };
        let id = self.affine_maps.borrow_mut().intern(storage);
        AffineMap { id, context: self }
    }

    /// Creates an [`AffineMap`] with the results defined by the provided [`AffineExpression`]s. The resulting map also
    /// has the specified number of dimensions and symbols, regardless of them being used in the provided expressions.
    /// The resulting map is owned by this [`Context`]. Returns an [`Error::PositionOutOfBounds`] if any of the
    /// expressions refers to a dimension or symbol that is not part of the map.
    pub fn affine_map<'c, A: AffineExpression<'c>>(
        &'c self,
        dimension_count: usize,
        symbol_count: usize,
        affine_expressions: &[A],
    ) -> Result<AffineMap<'c>, Error> {
        let results = affine_expressions.iter().map(|expression| expression.as_ref()).collect::<Vec<_>>();
        validate_expressions(self, dimension_count, symbol_count, &results)?;
        Ok(self.intern_affine_map(dimension_count, symbol_count, &results))
    }

    /// Creates an empty [`AffineMap`] (i.e., a zero result affine map with no dimensions or symbols; `() -> ()`)
    /// owned by this [`Context`].
    pub fn empty_affine_map(&self) -> AffineMap<'_> {
        self.intern_affine_map(0, 0, &[])
    }

    /// Creates a zero result [`AffineMap`] with the provided number of dimensions and symbols (i.e., `(...) -> ()`),
    /// owned by this [`Context`].
    pub fn zero_result_affine_map(&self, dimension_count: usize, symbol_count: usize) -> AffineMap<'_> {
        self.intern_affine_map(dimension_count, symbol_count, &[])
    }

    /// Creates an [`AffineMap`] with a single constant result. The resulting map is owned by this [`Context`].
    pub fn constant_affine_map(&self, value: i64) -> AffineMap<'_> {
        self.intern_affine_map(0, 0, &[self.constant_affine_expression(value).as_ref()])
    }

    /// Creates a multidimensional identity [`AffineMap`] with the specified number of dimensions.
    /// The resulting map is owned by this [`Context`].
    pub fn identity_affine_map(&self, dimension_count: usize) -> AffineMap<'_> {
        self.minor_identity_affine_map(dimension_count, dimension_count)
    }

    /// Creates a multidimensional identity [`AffineMap`] on the most minor dimensions for the specified number of
    /// dimensions and results (where the number of dimensions must be greater than or equal to the number of results).
    /// The resulting map is owned by this [`Context`].
    pub fn minor_identity_affine_map(&self, dimension_count: usize, result_count: usize) -> AffineMap<'_> {
        assert!(result_count <= dimension_count, "minor identity maps cannot have more results than dimensions");
        let results = ((dimension_count - result_count)..dimension_count)
            .map(|position| self.dimension_affine_expression(position).as_ref())
            .collect::<Vec<_>>();
        self.intern_affine_map(dimension_count, 0, &results)
    }

    /// Creates an [`AffineMap`] based on the provided permutation which contains a permutation of indexes starting
    /// from 0 and ending at `permutation.len() - 1` (e.g., `[1, 2, 0]` is a valid permutation but `[2, 0]` and
    /// `[1, 1, 2]` are not valid permutations). The resulting map is owned by this [`Context`].
    ///
    /// Note that this function will panic if the provided permutation is not valid.
    pub fn permutation_affine_map(&self, permutation: &[usize]) -> AffineMap<'_> {
        let mut seen = vec![false; permutation.len()];
        for position in permutation {
            assert!(
                *position < permutation.len() && !std::mem::replace(&mut seen[*position], true),
                "invalid permutation: {permutation:?}",
            );
        }
        let results = permutation
            .iter()
            .map(|position| self.dimension_affine_expression(*position).as_ref())
            .collect::<Vec<_>>();
        self.intern_affine_map(permutation.len(), 0, &results)
    }
}

/// Common interface of [`AffineMap`]s and [`IntegerSet`](crate::IntegerSet)s, which share the same input space
/// (i.e., a list of dimensions followed by a list of symbols) and differ only in how their expressions are
/// interpreted. This is what allows the same operand canonicalization logic to be used for both of them.
pub trait AffineMapOrSet<'c>: Copy + PartialEq + Eq + Display + Debug {
    /// Returns a reference to the [`Context`] that owns this map or set.
    fn context(&self) -> &'c Context;

    /// Returns the number of dimensions of this map or set.
    fn dimension_count(&self) -> usize;

    /// Returns the number of symbols of this map or set.
    fn symbol_count(&self) -> usize;

    /// Returns the number of inputs (i.e., number of dimensions and symbols combined) of this map or set.
    fn input_count(&self) -> usize {
        self.dimension_count() + self.symbol_count()
    }

    /// Returns the expressions of this map or set (i.e., the results of a map or the constraint expressions of a set).
    fn expressions(&self) -> Vec<AffineExpressionRef<'c>>;

    /// Replaces every dimension `d{i}` in the expressions of this map or set with `dimensions[i]` and every symbol
    /// `s{i}` with `symbols[i]`, returning a new map or set with the provided number of dimensions and symbols.
    fn replace_dimensions_and_symbols(
        &self,
        dimensions: &[AffineExpressionRef<'c>],
        symbols: &[AffineExpressionRef<'c>],
        dimension_count: usize,
        symbol_count: usize,
    ) -> Self;
}

impl<'c> AffineMapOrSet<'c> for AffineMap<'c> {
    fn context(&self) -> &'c Context {
        self.context
    }

    fn dimension_count(&self) -> usize {
        AffineMap::dimension_count(self)
    }

    fn symbol_count(&self) -> usize {
        AffineMap::symbol_count(self)
    }

    fn expressions(&self) -> Vec<AffineExpressionRef<'c>> {
        self.results().collect()
    }

    fn replace_dimensions_and_symbols(
        &self,
        dimensions: &[AffineExpressionRef<'c>],
        symbols: &[AffineExpressionRef<'c>],
        dimension_count: usize,
        symbol_count: usize,
    ) -> Self {
        AffineMap::replace_dimensions_and_symbols(self, dimensions, symbols, dimension_count, symbol_count)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::Context;

    use super::*;

    #[test]
    fn test_affine_map() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let constant_0 = context.constant_affine_expression(2);
        let expression_0 = dimension_0 + dimension_1;
        let expression_1 = dimension_0 * constant_0;

        let map = context.affine_map(0, 0, &[constant_0]).unwrap();
        assert_eq!(&context, map.context());
        assert_eq!(map.dimension_count(), 0);
        assert_eq!(map.symbol_count(), 0);
        assert_eq!(map.input_count(), 0);
        assert_eq!(map.result_count(), 1);
        assert!(map.is_constant());
        assert_eq!(map.constant(), Some(2));
        assert_eq!(map.to_string(), "() -> (2)");

        let map = context.affine_map(2, 1, &[expression_0, expression_1]).unwrap();
        assert_eq!(&context, map.context());
        assert_eq!(map.dimension_count(), 2);
        assert_eq!(map.symbol_count(), 1);
        assert_eq!(map.input_count(), 3);
        assert_eq!(map.result_count(), 2);
        assert!(!map.is_constant());
        assert_eq!(map.constant(), None);
        assert_eq!(map.to_string(), "(d0, d1)[s0] -> (d0 + d1, d0 * 2)");
    }

    #[test]
    fn test_affine_map_validation() {
        let context = Context::new();
        let dimension_2 = context.dimension_affine_expression(2);
        let symbol_1 = context.symbol_affine_expression(1);
        assert_eq!(
            context.affine_map(2, 0, &[dimension_2]),
            Err(Error::PositionOutOfBounds { kind: "dimension", position: 2, count: 2 }),
        );
        assert_eq!(
            context.affine_map(3, 1, &[dimension_2 + symbol_1]),
            Err(Error::PositionOutOfBounds { kind: "symbol", position: 1, count: 1 }),
        );
        assert!(context.affine_map(3, 2, &[dimension_2 + symbol_1]).is_ok());

        let other_context = Context::new();
        let dimension_0 = other_context.dimension_affine_expression(0);
        assert_eq!(context.affine_map(1, 0, &[dimension_0]), Err(Error::ContextMismatch));
    }

    #[test]
    fn test_affine_map_results() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let result_0 = dimension_0 + dimension_1;
        let result_1 = dimension_0.as_ref();
        let map = context.affine_map(2, 0, &[result_0, result_1]).unwrap();
        assert_eq!(map.result(0), result_0);
        assert_eq!(map.result(1), result_1);
        assert_eq!(map.results().collect::<Vec<_>>(), vec![result_0, result_1]);
    }

    #[test]
    #[should_panic(expected = "result index is out of bounds")]
    fn test_affine_map_result_out_of_bounds() {
        let context = Context::new();
        context.empty_affine_map().result(0);
    }

    #[test]
    fn test_empty_affine_map() {
        let context = Context::new();
        let map = context.empty_affine_map();
        assert_eq!(&context, map.context());
        assert_eq!(map.dimension_count(), 0);
        assert_eq!(map.symbol_count(), 0);
        assert_eq!(map.input_count(), 0);
        assert_eq!(map.result_count(), 0);
        assert!(map.is_empty());
        assert_eq!(map.to_string(), "() -> ()");
    }

    #[test]
    fn test_zero_result_affine_map() {
        let context = Context::new();
        let map = context.zero_result_affine_map(3, 2);
        assert_eq!(map.dimension_count(), 3);
        assert_eq!(map.symbol_count(), 2);
        assert_eq!(map.result_count(), 0);
        assert!(!map.is_empty());
        assert_eq!(map.to_string(), "(d0, d1, d2)[s0, s1] -> ()");
    }

    #[test]
    fn test_constant_affine_map() {
        let context = Context::new();
        let map_0 = context.constant_affine_map(42);
        let map_1 = context.constant_affine_map(-5);
        assert_eq!(map_0.dimension_count(), 0);
        assert_eq!(map_0.symbol_count(), 0);
        assert_eq!(map_0.result_count(), 1);
        assert_eq!(map_0.to_string(), "() -> (42)");
        assert_eq!(map_1.to_string(), "() -> (-5)");
        assert_eq!(map_1.constant_results(), Some(vec![-5]));
    }

    #[test]
    fn test_identity_affine_map() {
        let context = Context::new();
        let map = context.identity_affine_map(3);
        assert_eq!(map.dimension_count(), 3);
        assert_eq!(map.result_count(), 3);
        assert!(map.is_identity());
        assert!(map.is_minor_identity());
        assert!(map.is_permutation());
        assert_eq!(map.to_string(), "(d0, d1, d2) -> (d0, d1, d2)");
    }

    #[test]
    fn test_minor_identity_affine_map() {
        let context = Context::new();
        let map = context.minor_identity_affine_map(5, 3);
        assert_eq!(map.dimension_count(), 5);
        assert_eq!(map.result_count(), 3);
        assert!(map.is_minor_identity());
        assert!(!map.is_identity());
        assert_eq!(map.to_string(), "(d0, d1, d2, d3, d4) -> (d2, d3, d4)");
    }

    #[test]
    fn test_permutation_affine_map() {
        let context = Context::new();
        let permutation = vec![2, 0, 1];
        let map = context.permutation_affine_map(&permutation);
        assert_eq!(map.dimension_count(), 3);
        assert_eq!(map.result_count(), 3);
        assert!(map.is_permutation());
        assert!(!map.is_identity());
        assert_eq!(map.to_string(), "(d0, d1, d2) -> (d2, d0, d1)");
    }

    #[test]
    #[should_panic(expected = "invalid permutation")]
    fn test_invalid_permutation_affine_map() {
        let context = Context::new();
        context.permutation_affine_map(&[1, 1, 2]);
    }

    #[test]
    fn test_affine_map_is_projected_permutation() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_2 = context.dimension_affine_expression(2);
        let permutation_map = context.permutation_affine_map(&[2, 0, 1]);
        let projected_map = context.affine_map(3, 0, &[dimension_0, dimension_2]).unwrap();
        let repeated_map = context.affine_map(3, 0, &[dimension_0, dimension_0]).unwrap();
        assert!(permutation_map.is_projected_permutation());
        assert!(projected_map.is_projected_permutation());
        assert!(!projected_map.is_permutation());
        assert!(!repeated_map.is_projected_permutation());
    }

    #[test]
    fn test_affine_map_equality() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let expression = dimension_0 + dimension_1;

        // Same maps from the same context must be equal because they are "uniqued".
        let map_0 = context.affine_map(2, 0, &[expression]).unwrap();
        let map_1 = context.affine_map(2, 0, &[expression]).unwrap();
        assert_eq!(map_0, map_1);

        // Different results must not be equal.
        let map_2 = context.affine_map(2, 0, &[dimension_0]).unwrap();
        assert_ne!(map_0, map_2);

        // Same maps from different contexts must not be equal.
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let map_3 = context.affine_map(2, 0, &[dimension_0 + dimension_1]).unwrap();
        assert_ne!(map_0, map_3);
    }

    #[test]
    fn test_affine_map_sub_map() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0).as_ref();
        let dimension_1 = context.dimension_affine_expression(1).as_ref();
        let constant_0 = context.constant_affine_expression(2);
        let expression = dimension_0 * constant_0;
        let map = context.affine_map(2, 0, &[dimension_0, dimension_1, expression]).unwrap();
        let sub_map = map.sub_map(&[0, 2]);
        assert_eq!(sub_map.result_count(), 2);
        assert_eq!(sub_map.to_string(), "(d0, d1) -> (d0, d0 * 2)");
    }

    #[test]
    fn test_affine_map_major_sub_map() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let dimension_2 = context.dimension_affine_expression(2);
        let map = context.affine_map(3, 0, &[dimension_0, dimension_1, dimension_2]).unwrap();
        let major_sub_map = map.major_sub_map(2).unwrap();
        assert_eq!(major_sub_map.result_count(), 2);
        assert_eq!(major_sub_map.to_string(), "(d0, d1, d2) -> (d0, d1)");
        assert!(map.major_sub_map(0).is_none());
        assert_eq!(map.major_sub_map(5).unwrap(), map);
    }

    #[test]
    fn test_affine_map_minor_sub_map() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let dimension_2 = context.dimension_affine_expression(2);
        let map = context.affine_map(3, 0, &[dimension_0, dimension_1, dimension_2]).unwrap();
        let minor_sub_map = map.minor_sub_map(2).unwrap();
        assert_eq!(minor_sub_map.result_count(), 2);
        assert_eq!(minor_sub_map.to_string(), "(d0, d1, d2) -> (d1, d2)");
        assert!(map.minor_sub_map(0).is_none());
        assert_eq!(map.minor_sub_map(5).unwrap(), map);
    }

    #[test]
    fn test_affine_map_replace() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let constant_0 = context.constant_affine_expression(2);
        let map = context.affine_map(2, 0, &[dimension_0 + dimension_1]).unwrap();
        let replaced = map.replace(dimension_0, dimension_1 * constant_0, 2, 0);
        assert_eq!(replaced.to_string(), "(d0, d1) -> (d1 * 3)");
    }

    #[test]
    fn test_affine_map_replace_dimensions_and_symbols() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let symbol_0 = context.symbol_affine_expression(0);
        let map = context.affine_map(2, 1, &[dimension_0 + symbol_0, dimension_1 * 4]).unwrap();
        let replaced = map.replace_dimensions_and_symbols(
            &[symbol_0.as_ref(), dimension_0.as_ref()],
            &[context.constant_affine_expression(3).as_ref()],
            1,
            1,
        );
        assert_eq!(replaced.to_string(), "(d0)[s0] -> (s0 + 3, d0 * 4)");
    }

    #[test]
    fn test_affine_map_shift_dimensions_and_symbols() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let symbol_0 = context.symbol_affine_expression(0);
        let map = context.affine_map(2, 1, &[dimension_0 + dimension_1 + symbol_0]).unwrap();
        assert_eq!(map.shift_dimensions(2, 1).to_string(), "(d0, d1, d2, d3)[s0] -> (d0 + d3 + s0)");
        assert_eq!(map.shift_symbols(1, 0).to_string(), "(d0, d1)[s0, s1] -> (d0 + d1 + s1)");
    }

    #[test]
    fn test_affine_map_constant_fold() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let symbol_0 = context.symbol_affine_expression(0);
        let map = context.affine_map(2, 1, &[dimension_0 + symbol_0, dimension_1 * 2]).unwrap();
        assert_eq!(map.constant_fold(&[Some(1), Some(2), Some(3)]), Ok(Some(vec![4, 4])));
        assert_eq!(map.constant_fold(&[Some(1), None, Some(3)]), Ok(None));
        assert_eq!(
            map.constant_fold(&[Some(1)]),
            Err(Error::OperandCountMismatch { expected_count: 3, actual_count: 1 }),
        );

        // Results that cannot be folded are left untouched.
        let (folded_map, results) = map.partial_constant_fold(&[Some(1), None, Some(3)]).unwrap();
        assert_eq!(folded_map.to_string(), "(d0, d1)[s0] -> (4, d1 * 2)");
        assert_eq!(results, None);
        let (folded_map, results) = map.partial_constant_fold(&[Some(-1), Some(5), Some(1)]).unwrap();
        assert_eq!(folded_map.to_string(), "(d0, d1)[s0] -> (0, 10)");
        assert_eq!(results, Some(vec![0, 10]));
    }

    #[test]
    fn test_affine_map_simplify_and_remove_duplicate_results() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let expression = (dimension_0 * 3 + dimension_1) - dimension_0 * 3;
        let map = context.affine_map(2, 0, &[expression, dimension_1.as_ref(), dimension_0.as_ref()]).unwrap();
        let simplified = map.simplify();
        assert_eq!(simplified.to_string(), "(d0, d1) -> (d1, d1, d0)");
        assert_eq!(simplified.remove_duplicate_results().to_string(), "(d0, d1) -> (d1, d0)");
        assert!(simplified.is_function_of_dimension(0));
        assert!(!simplified.is_function_of_symbol(0));
    }

    #[test]
    fn test_affine_map_walk_expressions() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let symbol_0 = context.symbol_affine_expression(0);
        let map = context.affine_map(1, 1, &[dimension_0 + symbol_0, symbol_0.as_ref()]).unwrap();
        let mut visited = Vec::new();
        map.walk_expressions(|expression| visited.push(expression.to_string()));
        assert_eq!(visited, vec!["d0", "s0", "d0 + s0", "s0"]);
    }

    #[test]
    fn test_affine_map_display_and_debug() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let map = context.affine_map(2, 0, &[dimension_0 + dimension_1]).unwrap();
        assert_eq!(format!("{}", map), "(d0, d1) -> (d0 + d1)");
        assert_eq!(format!("{:?}", map), "AffineMap[(d0, d1) -> (d0 + d1)]");
    }

    #[test]
    fn test_affine_map_compress_unused_symbols() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let constant_0 = context.constant_affine_expression(2);
        let symbol_1 = context.symbol_affine_expression(1);
        let symbol_3 = context.symbol_affine_expression(3);
        let map_0 = context.affine_map(2, 4, &[dimension_0 + symbol_3, dimension_1 * constant_0]).unwrap();
        let map_1 = context.affine_map(1, 4, &[symbol_1 * constant_0]).unwrap();
        let maps = [map_0, map_1];
        assert_eq!(maps[0].to_string(), "(d0, d1)[s0, s1, s2, s3] -> (d0 + s3, d1 * 2)");
        assert_eq!(maps[1].to_string(), "(d0)[s0, s1, s2, s3] -> (s1 * 2)");
        let compressed_maps = AffineMap::compress_unused_symbols(&maps);
        assert_eq!(compressed_maps.len(), 2);
        assert_eq!(compressed_maps[0].to_string(), "(d0, d1)[s0, s1] -> (d0 + s1, d1 * 2)");
        assert_eq!(compressed_maps[1].to_string(), "(d0)[s0, s1] -> (s0 * 2)");
    }
}

use std::fmt::{Debug, Display};

use crate::{AffineExpression, AffineExpressionRef, AffineMapOrSet, Context, Error};

use super::affine_maps::{validate_expressions, write_inputs};

/// Uniqued representation of an [`IntegerSet`] inside a [`Context`]. Each constraint is stored as the identifier of
/// its expression along with a flag indicating whether it is an equality constraint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct IntegerSetStorage {
    pub(crate) dimension_count: usize,
    pub(crate) symbol_count: usize,
    pub(crate) constraints: Vec<(usize, bool)>,
}

/// Constraint for an [`IntegerSet`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IntegerSetConstraint<'c> {
    /// Affine expression over the set of dimensions and symbols that are involved in the integer set.
    pub expression: AffineExpressionRef<'c>,

    /// Boolean flag indicating whether the constraint is an equality (i.e., `expression == 0`) or an inequality
    /// (i.e., `expression >= 0`) constraint.
    pub is_equality: bool,
}

/// Set of points from the integer lattice constrained by affine equality/inequality constraints (i.e.,
/// [`IntegerSetConstraint`]s). Such sets are used to represent the conditions of `affine.if` operations. They are
/// typically expected to contain only a handful of affine constraints, and are immutable and uniqued like
/// [`AffineMap`](crate::AffineMap)s, with which they share their input space (i.e., a list of dimensions followed
/// by a list of symbols).
#[derive(Copy, Clone)]
pub struct IntegerSet<'c> {
    /// Identifier of this [`IntegerSet`] in its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`IntegerSet`].
    pub(crate) context: &'c Context,
}

impl<'c> IntegerSet<'c> {
    fn with_storage<R>(&self, callback: impl FnOnce(&IntegerSetStorage) -> R) -> R {
        callback(self.context.integer_sets.borrow().get(self.id))
    }

    /// Returns a reference to the [`Context`] that owns this [`IntegerSet`].
    pub fn context(&self) -> &'c Context {
        self.context
    }

    /// Returns the number of dimensions of this [`IntegerSet`].
    pub fn dimension_count(&self) -> usize {
        self.with_storage(|storage| storage.dimension_count)
    }

    /// Returns the number of symbols of this [`IntegerSet`].
    pub fn symbol_count(&self) -> usize {
        self.with_storage(|storage| storage.symbol_count)
    }

    /// Returns the number of inputs (i.e., number of dimensions and symbols combined) of this [`IntegerSet`].
    pub fn input_count(&self) -> usize {
        self.with_storage(|storage| storage.dimension_count + storage.symbol_count)
    }

    /// Returns the number of equality constraints in this [`IntegerSet`].
    pub fn equality_constraint_count(&self) -> usize {
        self.with_storage(|storage| storage.constraints.iter().filter(|(_, is_equality)| *is_equality).count())
    }

    /// Returns the number of inequality constraints in this [`IntegerSet`].
    pub fn inequality_constraint_count(&self) -> usize {
        self.with_storage(|storage| storage.constraints.iter().filter(|(_, is_equality)| !*is_equality).count())
    }

    /// Returns the total number of constraints in this [`IntegerSet`].
    pub fn constraint_count(&self) -> usize {
        self.with_storage(|storage| storage.constraints.len())
    }

    /// Returns an [`Iterator`] over the [`IntegerSetConstraint`]s of this [`IntegerSet`].
    pub fn constraints(&self) -> impl Iterator<Item = IntegerSetConstraint<'c>> + use<'c> {
        let context = self.context;
        self.with_storage(|storage| storage.constraints.clone()).into_iter().map(move |(id, is_equality)| {
            IntegerSetConstraint { expression: AffineExpressionRef { id, context }, is_equality }
        })
    }

    /// Returns the `index`-th [`IntegerSetConstraint`] of this [`IntegerSet`],
    /// and [`None`] if `index` is out of bounds.
    pub fn constraint(&self, index: usize) -> Option<IntegerSetConstraint<'c>> {
        let context = self.context;
        self.with_storage(|storage| storage.constraints.get(index).copied()).map(|(id, is_equality)| {
            IntegerSetConstraint { expression: AffineExpressionRef { id, context }, is_equality }
        })
    }

    /// Returns `true` if this set is the canonical empty set (i.e., its only constraint is `1 == 0`).
    /// Refer to [`Context::empty_integer_set`] for more information.
    pub fn is_empty(&self) -> bool {
        let constraints = self.constraints().collect::<Vec<_>>();
        matches!(
            constraints.as_slice(),
            [IntegerSetConstraint { expression, is_equality: true }] if expression.constant_value() == Some(1),
        )
    }

    /// Replaces the dimensions and symbols in this set with the provided expressions (where `dimensions[i]` replaces
    /// `d{i}` and `symbols[i]` replaces `s{i}`), returning a new [`IntegerSet`] with the provided number of dimensions
    /// and symbols. The provided counts must cover every position that is referenced by the resulting constraints.
    pub fn replace<D: AffineExpression<'c>, S: AffineExpression<'c>>(
        &self,
        dimensions: &[D],
        symbols: &[S],
        result_dimension_count: usize,
        result_symbol_count: usize,
    ) -> Self {
        let dimensions = dimensions.iter().map(|expression| expression.as_ref()).collect::<Vec<_>>();
        let symbols = symbols.iter().map(|expression| expression.as_ref()).collect::<Vec<_>>();
        self.replace_dimensions_and_symbols(&dimensions, &symbols, result_dimension_count, result_symbol_count)
    }

    /// Type-erased version of [`IntegerSet::replace`].
    pub fn replace_dimensions_and_symbols(
        &self,
        dimensions: &[AffineExpressionRef<'c>],
        symbols: &[AffineExpressionRef<'c>],
        result_dimension_count: usize,
        result_symbol_count: usize,
    ) -> Self {
        let constraints = self
            .constraints()
            .map(|constraint| IntegerSetConstraint {
                expression: constraint.expression.replace_dimensions_and_symbols(dimensions, symbols),
                is_equality: constraint.is_equality,
            })
            .collect::<Vec<_>>();
        self.context.intern_integer_set(result_dimension_count, result_symbol_count, &constraints)
    }
}

impl PartialEq for IntegerSet<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.context, other.context) && self.id == other.id
    }
}

impl Eq for IntegerSet<'_> {}

impl std::hash::Hash for IntegerSet<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Display for IntegerSet<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_inputs(formatter, self.dimension_count(), self.symbol_count())?;
        write!(formatter, " : (")?;
        for (index, constraint) in self.constraints().enumerate() {
            if index > 0 {
                write!(formatter, ", ")?;
            }
            let relation = if constraint.is_equality { "==" } else { ">=" };
            write!(formatter, "{} {relation} 0", constraint.expression)?;
        }
        write!(formatter, ")")
    }
}

impl Debug for IntegerSet<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "IntegerSet[{self}]")
    }
}

impl<'c> AffineMapOrSet<'c> for IntegerSet<'c> {
    fn context(&self) -> &'c Context {
        self.context
    }

    fn dimension_count(&self) -> usize {
        IntegerSet::dimension_count(self)
    }

    fn symbol_count(&self) -> usize {
        IntegerSet::symbol_count(self)
    }

    fn expressions(&self) -> Vec<AffineExpressionRef<'c>> {
        self.constraints().map(|constraint| constraint.expression).collect()
    }

    fn replace_dimensions_and_symbols(
        &self,
        dimensions: &[AffineExpressionRef<'c>],
        symbols: &[AffineExpressionRef<'c>],
        dimension_count: usize,
        symbol_count: usize,
    ) -> Self {
        IntegerSet::replace_dimensions_and_symbols(self, dimensions, symbols, dimension_count, symbol_count)
    }
}

impl Context {
    pub(crate) fn intern_integer_set<'c>(
        &'c self,
        dimension_count: usize,
        symbol_count: usize,
        constraints: &[IntegerSetConstraint<'c>],
    ) -> IntegerSet<'c> {
        let storage = IntegerSetStorage {
            dimension_count,
            symbol_count,
            constraints: constraints
                .iter()
                .map(|constraint| (constraint.expression.id, constraint.is_equality))
                .collect(),
        };
        let id = self.integer_sets.borrow_mut().intern(storage);
        IntegerSet { id, context: self }
    }

    /// Creates a new [`IntegerSet`] with the provided number of dimensions and symbols, and the provided constraints.
    /// Returns an [`Error::PositionOutOfBounds`] if any of the constraints refers to a dimension or symbol that is not
    /// part of the set. The resulting set is owned by this [`Context`].
    pub fn integer_set<'c>(
        &'c self,
        dimension_count: usize,
        symbol_count: usize,
        constraints: &[IntegerSetConstraint<'c>],
    ) -> Result<IntegerSet<'c>, Error> {
        let expressions = constraints.iter().map(|constraint| constraint.expression).collect::<Vec<_>>();
        validate_expressions(self, dimension_count, symbol_count, &expressions)?;
        Ok(self.intern_integer_set(dimension_count, symbol_count, constraints))
    }

    /// Creates a new canonical empty [`IntegerSet`] (i.e., a set with the single unsatisfiable constraint `1 == 0`)
    /// with the provided number of dimensions and symbols. The resulting set is owned by this [`Context`].
    pub fn empty_integer_set(&self, dimension_count: usize, symbol_count: usize) -> IntegerSet<'_> {
        let constraint =
            IntegerSetConstraint { expression: self.constant_affine_expression(1).as_ref(), is_equality: true };
        self.intern_integer_set(dimension_count, symbol_count, &[constraint])
    }
}

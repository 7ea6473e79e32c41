use std::fmt::Display;
use std::ops::{Add, Mul, Neg, Sub};

use crate::support::{ceil_div, floor_div, greatest_common_divisor, modulo};
use crate::{AffineMap, Context, Error};

/// Kind of an [`AffineExpression`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AffineExpressionKind {
    Add,
    Mul,
    Mod,
    FloorDiv,
    CeilDiv,
    Constant,
    Dimension,
    Symbol,
}

impl AffineExpressionKind {
    /// Returns `true` if this kind corresponds to a [`BinaryOperationAffineExpressionRef`].
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Add | Self::Mul | Self::Mod | Self::FloorDiv | Self::CeilDiv)
    }

    /// Returns the name of the operator that corresponds to this kind, as it appears in error messages.
    fn operator_name(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Mul => "*",
            Self::Mod => "mod",
            Self::FloorDiv => "floordiv",
            Self::CeilDiv => "ceildiv",
            Self::Constant | Self::Dimension | Self::Symbol => "",
        }
    }
}

/// Uniqued representation of an [`AffineExpression`] inside a [`Context`]. Binary operations refer to their operands
/// using the identifiers of those operands in the same [`Context`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum AffineExpressionStorage {
    Dimension(usize),
    Symbol(usize),
    Constant(i64),
    Binary { kind: AffineExpressionKind, lhs: usize, rhs: usize },
}

impl AffineExpressionStorage {
    fn kind(&self) -> AffineExpressionKind {
        match self {
            Self::Dimension(_) => AffineExpressionKind::Dimension,
            Self::Symbol(_) => AffineExpressionKind::Symbol,
            Self::Constant(_) => AffineExpressionKind::Constant,
            Self::Binary { kind, .. } => *kind,
        }
    }
}

/// [`AffineExpression`]s are used to represent the mathematical functions that define [`AffineMap`]s. They are
/// immutable trees over dimensions, symbols, and constants that are combined using additions and multiplications,
/// floor-divisions, ceil-divisions, and modulus operations by constants. Affine expressions are uniqued in their
/// owning [`Context`] and so two structurally identical expressions from the same [`Context`] are always equal.
///
/// Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/Dialects/Affine/#affine-expressions)
/// for more information.
pub trait AffineExpression<'c>: Sized + Copy + PartialEq + Eq + Display {
    /// Tries to construct a new instance of this type from the provided type-erased [`AffineExpressionRef`],
    /// returning [`None`] if that expression is not an instance of this type.
    fn from_ref(expression: AffineExpressionRef<'c>) -> Option<Self>;

    /// Up-casts this affine expression to an instance of [`AffineExpressionRef`].
    fn as_ref(&self) -> AffineExpressionRef<'c>;

    /// Returns a reference to the [`Context`] that owns this affine expression.
    fn context(&self) -> &'c Context {
        self.as_ref().context
    }

    /// Returns the [`AffineExpressionKind`] of this affine expression.
    fn kind(&self) -> AffineExpressionKind {
        self.as_ref().storage().kind()
    }

    /// Returns `true` if this type is an instance of `A`.
    fn is<A: AffineExpression<'c>>(&self) -> bool {
        Self::cast::<A>(self).is_some()
    }

    /// Tries to cast this type to an instance of `A` (e.g., an instance of [`ConstantAffineExpressionRef`]).
    /// If this is not an instance of the specified type, this function will return [`None`].
    fn cast<A: AffineExpression<'c>>(&self) -> Option<A> {
        A::from_ref(self.as_ref())
    }

    /// Returns `true` if this expression is made out of only symbols and constants (i.e., it does not involve any
    /// dimensional identifiers).
    fn is_symbolic_or_constant(&self) -> bool {
        let mut result = true;
        self.walk(|expression| result &= expression.kind() != AffineExpressionKind::Dimension);
        result
    }

    /// Returns `true` if this expression is a pure affine expression (i.e., binary operations other than additions
    /// are only allowed to have constant right-hand side operands, or constant left-hand side operands in the case of
    /// multiplications).
    fn is_pure_affine(&self) -> bool {
        is_pure_affine(self.as_ref())
    }

    /// Returns `true` if this expression is a semi-affine expression (i.e., not a pure affine expression). Refer to
    /// [`AffineExpression::is_pure_affine`] for information on what constitutes a pure affine expression.
    fn is_semi_affine(&self) -> bool {
        !self.is_pure_affine()
    }

    /// Returns the largest known integral divisor of this affine expression. Dimensions and symbols have a divisor of
    /// `1`, constants have their absolute value as their divisor (and so `0` for the constant `0`), products multiply
    /// the divisors of their operands, sums take the greatest common divisor of the divisors of their operands,
    /// divisions divide the divisor of their dividend when it is a multiple of the divisor, and modulus operations
    /// take the greatest common divisor of the divisor of their left-hand side and their modulus.
    fn largest_known_divisor(&self) -> u64 {
        largest_known_divisor(self.as_ref())
    }

    /// Returns `true` if the value this expression evaluates to is always a multiple of the provided factor.
    fn is_multiple_of(&self, factor: u64) -> bool {
        let divisor = self.largest_known_divisor();
        if factor == 0 { divisor == 0 } else { divisor % factor == 0 }
    }

    /// Returns `true` if the expression is a function of the [`DimensionAffineExpressionRef`]
    /// with the provided position.
    fn is_function_of_dimension(&self, position: usize) -> bool {
        let mut result = false;
        self.walk(|expression| result |= expression.storage() == AffineExpressionStorage::Dimension(position));
        result
    }

    /// Returns `true` if the expression is a function of the [`SymbolAffineExpressionRef`]
    /// with the provided position.
    fn is_function_of_symbol(&self, position: usize) -> bool {
        let mut result = false;
        self.walk(|expression| result |= expression.storage() == AffineExpressionStorage::Symbol(position));
        result
    }

    /// Walks all sub-expressions of this expression in post-order (i.e., operands before the operations that use
    /// them), invoking `callback` on each one of them, including this expression itself.
    fn walk<F: FnMut(AffineExpressionRef<'c>)>(&self, mut callback: F) {
        walk(self.as_ref(), &mut callback);
    }

    /// Evaluates this expression using the provided values for its dimensions and symbols. Returns [`None`] if the
    /// expression refers to a dimension or a symbol for which no value was provided, or if the evaluation overflows.
    fn evaluate(&self, dimensions: &[i64], symbols: &[i64]) -> Option<i64> {
        evaluate(self.as_ref(), dimensions, symbols)
    }

    /// Returns a new [`AffineExpression`] that is the same as this one but with some of its
    /// [`DimensionAffineExpressionRef`]s shifted by `shift`. Specifically, all [`DimensionAffineExpressionRef`]s
    /// for dimensions in the range `[offset, dimension_count)` are shifted by `shift`.
    fn with_shifted_dimensions(&self, offset: usize, dimension_count: usize, shift: usize) -> AffineExpressionRef<'c> {
        let context = self.context();
        transform(self.as_ref(), &mut |expression: AffineExpressionRef<'c>| match expression.storage() {
            AffineExpressionStorage::Dimension(position) if position >= offset && position < dimension_count => {
                Some(context.dimension_affine_expression(position + shift).as_ref())
            }
            _ => None,
        })
    }

    /// Returns a new [`AffineExpression`] that is the same as this one but with some of its
    /// [`SymbolAffineExpressionRef`]s shifted by `shift`. Specifically, all [`SymbolAffineExpressionRef`]s for symbols
    /// in the range `[offset, symbol_count)` are shifted by `shift`.
    fn with_shifted_symbols(&self, offset: usize, symbol_count: usize, shift: usize) -> AffineExpressionRef<'c> {
        let context = self.context();
        transform(self.as_ref(), &mut |expression: AffineExpressionRef<'c>| match expression.storage() {
            AffineExpressionStorage::Symbol(position) if position >= offset && position < symbol_count => {
                Some(context.symbol_affine_expression(position + shift).as_ref())
            }
            _ => None,
        })
    }

    /// Returns a new [`AffineExpression`] in which every dimension `d{i}` is replaced by `dimensions[i]` and every
    /// symbol `s{i}` is replaced by `symbols[i]`. Dimensions and symbols whose positions fall outside the provided
    /// replacement lists are left untouched. The resulting expression is folded eagerly.
    fn replace_dimensions_and_symbols(
        &self,
        dimensions: &[AffineExpressionRef<'c>],
        symbols: &[AffineExpressionRef<'c>],
    ) -> AffineExpressionRef<'c> {
        transform(self.as_ref(), &mut |expression: AffineExpressionRef<'c>| match expression.storage() {
            AffineExpressionStorage::Dimension(position) => dimensions.get(position).copied(),
            AffineExpressionStorage::Symbol(position) => symbols.get(position).copied(),
            _ => None,
        })
    }

    /// Returns a new [`AffineExpression`] in which every occurrence of `expression` is replaced by `replacement`.
    fn replace<E: AffineExpression<'c>, R: AffineExpression<'c>>(
        &self,
        expression: E,
        replacement: R,
    ) -> AffineExpressionRef<'c> {
        let (expression, replacement) = (expression.as_ref(), replacement.as_ref());
        transform(self.as_ref(), &mut |current: AffineExpressionRef<'c>| (current == expression).then_some(replacement))
    }

    /// Composes this affine expression with the provided [`AffineMap`], returning the resulting [`AffineExpression`].
    /// Every dimension `d{i}` of this expression is replaced by the `i`-th result of the provided map.
    ///
    /// # Example
    ///
    /// The following example uses the [`Display`] renderings of [`AffineExpression`] and [`AffineMap`] for convenience:
    ///
    /// ```text
    ///   Affine Expression: `d0 + d2`
    ///          Affine Map: `(d0, d1, d2)[s0, s1] -> (d0 + s1, d1 + s0, d0 + d1 + d2)`
    /// Composed Expression: `d0 + s1 + d0 + d1 + d2`
    /// ```
    fn compose(&self, map: AffineMap<'c>) -> AffineExpressionRef<'c> {
        let results = map.results().collect::<Vec<_>>();
        self.replace_dimensions_and_symbols(results.as_slice(), &[])
    }

    /// Returns a new [`AffineExpression`] that represents the product of this expression and `rhs`. At least one of
    /// the two operands must be a constant for the result to be affine and so this function returns an
    /// [`Error::NonAffineExpression`] when neither is.
    fn multiply<R: AffineExpression<'c>>(&self, rhs: R) -> Result<AffineExpressionRef<'c>, Error> {
        checked_binary_operands(AffineExpressionKind::Mul, self.as_ref(), rhs.as_ref())
            .map(|(lhs, rhs)| fold_binary(AffineExpressionKind::Mul, lhs, rhs))
    }

    /// Returns a new [`AffineExpression`] that represents the application of the "floor-division" operator on this
    /// expression and `rhs`. The "floor-division" operator rounds down the result of the division to the nearest
    /// integer. `rhs` must be a positive constant.
    fn floor_div<R: AffineExpression<'c>>(&self, rhs: R) -> Result<AffineExpressionRef<'c>, Error> {
        checked_binary_operands(AffineExpressionKind::FloorDiv, self.as_ref(), rhs.as_ref())
            .map(|(lhs, rhs)| fold_binary(AffineExpressionKind::FloorDiv, lhs, rhs))
    }

    /// Returns a new [`AffineExpression`] that represents the application of the "ceil-division" operator on this
    /// expression and `rhs`. The "ceil-division" operator rounds up the result of the division to the nearest integer.
    /// `rhs` must be a positive constant.
    fn ceil_div<R: AffineExpression<'c>>(&self, rhs: R) -> Result<AffineExpressionRef<'c>, Error> {
        checked_binary_operands(AffineExpressionKind::CeilDiv, self.as_ref(), rhs.as_ref())
            .map(|(lhs, rhs)| fold_binary(AffineExpressionKind::CeilDiv, lhs, rhs))
    }

    /// Returns a new [`AffineExpression`] that represents the application of the modulus operator on this expression
    /// and `rhs`. The result is always non-negative. `rhs` must be a positive constant.
    fn modulo<R: AffineExpression<'c>>(&self, rhs: R) -> Result<AffineExpressionRef<'c>, Error> {
        checked_binary_operands(AffineExpressionKind::Mod, self.as_ref(), rhs.as_ref())
            .map(|(lhs, rhs)| fold_binary(AffineExpressionKind::Mod, lhs, rhs))
    }

    /// Simplifies this affine expression by flattening it into a linear combination of its dimensions, symbols, and
    /// any floor-division, ceil-division, or modulus sub-expressions that cannot be eliminated, and then rebuilding it
    /// in a canonical order (dimensions first, then symbols, then the remaining sub-expressions, and the constant
    /// term last). Expressions that cannot be flattened (e.g., because they refer to positions outside of the provided
    /// dimension and symbol counts) are returned unchanged.
    fn simplify(&self, dimension_count: usize, symbol_count: usize) -> AffineExpressionRef<'c> {
        let expression = self.as_ref();
        let mut flattener = Flattener::new(expression.context, dimension_count, symbol_count);
        match flattener.flatten(expression) {
            Some(form) => flattener.rebuild(&form),
            None => expression,
        }
    }

    /// Flattens this affine expression into a vector of coefficients with one entry per dimension, followed by one
    /// entry per symbol, followed by the constant term. Returns [`None`] if the expression cannot be represented as
    /// a linear combination of its dimensions and symbols (e.g., `d0 floordiv 2`).
    fn flatten(&self, dimension_count: usize, symbol_count: usize) -> Option<Vec<i64>> {
        let flattened = flatten_affine_expression(self.as_ref(), dimension_count, symbol_count)?;
        let input_count = dimension_count + symbol_count;
        if flattened.coefficients[input_count..].iter().any(|coefficient| *coefficient != 0) {
            return None;
        }
        let mut coefficients = flattened.coefficients[..input_count].to_vec();
        coefficients.push(flattened.constant);
        Some(coefficients)
    }
}

/// Internal helper macro for generating arithmetic operator implementations for [`AffineExpression`] subtypes. All
/// operators fold their results eagerly and return type-erased [`AffineExpressionRef`]s. Multiplications are only
/// supported by constants so that the results of these operators are always affine.
macro_rules! affine_expression_operator_impls {
    ($ty:ident) => {
        impl<'c, A: AffineExpression<'c>> Add<A> for $ty<'c> {
            type Output = AffineExpressionRef<'c>;

            fn add(self, rhs: A) -> Self::Output {
                let (lhs, rhs) = (self.as_ref(), rhs.as_ref());
                assert_same_context(lhs, rhs);
                fold_binary(AffineExpressionKind::Add, lhs, rhs)
            }
        }

        impl<'c> Add<i64> for $ty<'c> {
            type Output = AffineExpressionRef<'c>;

            fn add(self, rhs: i64) -> Self::Output {
                self + self.context().constant_affine_expression(rhs)
            }
        }

        impl<'c, A: AffineExpression<'c>> Sub<A> for $ty<'c> {
            type Output = AffineExpressionRef<'c>;

            fn sub(self, rhs: A) -> Self::Output {
                self + -rhs.as_ref()
            }
        }

        impl<'c> Sub<i64> for $ty<'c> {
            type Output = AffineExpressionRef<'c>;

            fn sub(self, rhs: i64) -> Self::Output {
                self - self.context().constant_affine_expression(rhs)
            }
        }

        impl<'c> Mul<i64> for $ty<'c> {
            type Output = AffineExpressionRef<'c>;

            fn mul(self, rhs: i64) -> Self::Output {
                self * self.context().constant_affine_expression(rhs)
            }
        }

        impl<'c> Mul<ConstantAffineExpressionRef<'c>> for $ty<'c> {
            type Output = AffineExpressionRef<'c>;

            fn mul(self, rhs: ConstantAffineExpressionRef<'c>) -> Self::Output {
                let (lhs, rhs) = (self.as_ref(), rhs.as_ref());
                assert_same_context(lhs, rhs);
                fold_binary(AffineExpressionKind::Mul, lhs, rhs)
            }
        }

        impl<'c> Neg for $ty<'c> {
            type Output = AffineExpressionRef<'c>;

            fn neg(self) -> Self::Output {
                self * -1
            }
        }
    };
}

/// Reference to an [`AffineExpression`] that is owned by a [`Context`].
#[derive(Copy, Clone)]
pub struct AffineExpressionRef<'c> {
    /// Identifier of this [`AffineExpression`] in its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`AffineExpression`].
    pub(crate) context: &'c Context,
}

impl<'c> AffineExpressionRef<'c> {
    pub(crate) fn storage(&self) -> AffineExpressionStorage {
        *self.context.affine_expressions.borrow().get(self.id)
    }

    /// Returns the value of this expression if it is a [`ConstantAffineExpressionRef`].
    pub(crate) fn constant_value(&self) -> Option<i64> {
        match self.storage() {
            AffineExpressionStorage::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the kind and operands of this expression if it is a [`BinaryOperationAffineExpressionRef`].
    pub(crate) fn binary(&self) -> Option<(AffineExpressionKind, AffineExpressionRef<'c>, AffineExpressionRef<'c>)> {
        match self.storage() {
            AffineExpressionStorage::Binary { kind, lhs, rhs } => Some((
                kind,
                AffineExpressionRef { id: lhs, context: self.context },
                AffineExpressionRef { id: rhs, context: self.context },
            )),
            _ => None,
        }
    }

    /// Returns the operands of this expression if it is a binary operation of the provided kind.
    fn binary_operands(
        &self,
        kind: AffineExpressionKind,
    ) -> Option<(AffineExpressionRef<'c>, AffineExpressionRef<'c>)> {
        self.binary().filter(|(expression_kind, _, _)| *expression_kind == kind).map(|(_, lhs, rhs)| (lhs, rhs))
    }
}

impl<'c> AffineExpression<'c> for AffineExpressionRef<'c> {
    fn from_ref(expression: AffineExpressionRef<'c>) -> Option<Self> {
        Some(expression)
    }

    fn as_ref(&self) -> AffineExpressionRef<'c> {
        *self
    }
}

subtype_trait_impls!(AffineExpressionRef<'c> as AffineExpression);

impl Display for AffineExpressionRef<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        print(*self, formatter, BindingStrength::Weak)
    }
}

affine_expression_operator_impls!(AffineExpressionRef);

/// [`AffineExpression`] that represents a specific dimension (identified by its position).
///
/// Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/Dialects/Affine/#affine-expressions)
/// for more information.
#[derive(Copy, Clone)]
pub struct DimensionAffineExpressionRef<'c> {
    /// Identifier of this [`AffineExpression`] in its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`AffineExpression`].
    pub(crate) context: &'c Context,
}

impl DimensionAffineExpressionRef<'_> {
    /// Returns the position of this [`DimensionAffineExpressionRef`].
    pub fn position(&self) -> usize {
        match self.as_ref().storage() {
            AffineExpressionStorage::Dimension(position) => position,
            _ => unreachable!("dimension affine expressions are always backed by dimension storage"),
        }
    }
}

subtype_trait_impls!(
    DimensionAffineExpressionRef<'c> as AffineExpression,
    base = AffineExpressionRef,
    is = |expression| expression.kind() == AffineExpressionKind::Dimension,
);

affine_expression_operator_impls!(DimensionAffineExpressionRef);

impl Context {
    pub(crate) fn intern_affine_expression(&self, storage: AffineExpressionStorage) -> AffineExpressionRef<'_> {
        let id = self.affine_expressions.borrow_mut().intern(storage);
        AffineExpressionRef { id, context: self }
    }

    /// Creates a new [`DimensionAffineExpressionRef`] with the specified position.
    pub fn dimension_affine_expression(&self, position: usize) -> DimensionAffineExpressionRef<'_> {
        let expression = self.intern_affine_expression(AffineExpressionStorage::Dimension(position));
        DimensionAffineExpressionRef { id: expression.id, context: self }
    }

    /// Creates a new [`SymbolAffineExpressionRef`] with the specified position.
    pub fn symbol_affine_expression(&self, position: usize) -> SymbolAffineExpressionRef<'_> {
        let expression = self.intern_affine_expression(AffineExpressionStorage::Symbol(position));
        SymbolAffineExpressionRef { id: expression.id, context: self }
    }

    /// Creates a new [`ConstantAffineExpressionRef`] with the specified value.
    pub fn constant_affine_expression(&self, value: i64) -> ConstantAffineExpressionRef<'_> {
        let expression = self.intern_affine_expression(AffineExpressionStorage::Constant(value));
        ConstantAffineExpressionRef { id: expression.id, context: self }
    }
}

/// [`AffineExpression`] that represents a specific symbol (identified by its position).
///
/// Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/Dialects/Affine/#affine-expressions)
/// for more information.
#[derive(Copy, Clone)]
pub struct SymbolAffineExpressionRef<'c> {
    /// Identifier of this [`AffineExpression`] in its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`AffineExpression`].
    pub(crate) context: &'c Context,
}

impl SymbolAffineExpressionRef<'_> {
    /// Returns the position of this [`SymbolAffineExpressionRef`].
    pub fn position(&self) -> usize {
        match self.as_ref().storage() {
            AffineExpressionStorage::Symbol(position) => position,
            _ => unreachable!("symbol affine expressions are always backed by symbol storage"),
        }
    }
}

subtype_trait_impls!(
    SymbolAffineExpressionRef<'c> as AffineExpression,
    base = AffineExpressionRef,
    is = |expression| expression.kind() == AffineExpressionKind::Symbol,
);

affine_expression_operator_impls!(SymbolAffineExpressionRef);

/// [`AffineExpression`] that represents a constant `i64` value.
///
/// Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/Dialects/Affine/#affine-expressions)
/// for more information.
#[derive(Copy, Clone)]
pub struct ConstantAffineExpressionRef<'c> {
    /// Identifier of this [`AffineExpression`] in its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`AffineExpression`].
    pub(crate) context: &'c Context,
}

impl ConstantAffineExpressionRef<'_> {
    /// Returns the value of this [`ConstantAffineExpressionRef`].
    pub fn value(&self) -> i64 {
        match self.as_ref().storage() {
            AffineExpressionStorage::Constant(value) => value,
            _ => unreachable!("constant affine expressions are always backed by constant storage"),
        }
    }
}

subtype_trait_impls!(
    ConstantAffineExpressionRef<'c> as AffineExpression,
    base = AffineExpressionRef,
    is = |expression| expression.kind() == AffineExpressionKind::Constant,
);

affine_expression_operator_impls!(ConstantAffineExpressionRef);

/// [`AffineExpression`] that represents a binary operation between two [`AffineExpression`]s. This is a "super-type" of
/// [`AddAffineExpressionRef`], [`MulAffineExpressionRef`], [`ModAffineExpressionRef`], [`FloorDivAffineExpressionRef`],
/// and [`CeilDivAffineExpressionRef`].
///
/// Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/Dialects/Affine/#affine-expressions)
/// for more information.
#[derive(Copy, Clone)]
pub struct BinaryOperationAffineExpressionRef<'c> {
    /// Identifier of this [`AffineExpression`] in its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`AffineExpression`].
    pub(crate) context: &'c Context,
}

impl<'c> BinaryOperationAffineExpressionRef<'c> {
    /// Returns the left-hand side (LHS) operand of this [`BinaryOperationAffineExpressionRef`].
    pub fn lhs_operand(&self) -> AffineExpressionRef<'c> {
        match self.as_ref().binary() {
            Some((_, lhs, _)) => lhs,
            None => unreachable!("binary affine expressions are always backed by binary storage"),
        }
    }

    /// Returns the right-hand side (RHS) operand of this [`BinaryOperationAffineExpressionRef`].
    pub fn rhs_operand(&self) -> AffineExpressionRef<'c> {
        match self.as_ref().binary() {
            Some((_, _, rhs)) => rhs,
            None => unreachable!("binary affine expressions are always backed by binary storage"),
        }
    }
}

subtype_trait_impls!(
    BinaryOperationAffineExpressionRef<'c> as AffineExpression,
    base = AffineExpressionRef,
    is = |expression| expression.kind().is_binary(),
);

affine_expression_operator_impls!(BinaryOperationAffineExpressionRef);

/// Internal helper macro for generating the [`AffineExpression`] subtypes that correspond to specific binary
/// operations, along with their unsimplified constructors.
macro_rules! binary_affine_expression {
    ($(#[$attribute:meta])* $ty:ident, kind = $kind:ident $(,)?) => {
        $(#[$attribute])*
        #[derive(Copy, Clone)]
        pub struct $ty<'c> {
            /// Identifier of this [`AffineExpression`] in its owning [`Context`].
            pub(crate) id: usize,

            /// [`Context`] that owns this [`AffineExpression`].
            pub(crate) context: &'c Context,
        }

        impl<'c> $ty<'c> {
            #[doc = concat!("Creates a new [`", stringify!($ty), "`] using the provided [`AffineExpression`]s as its")]
            /// operands. Unlike the arithmetic operators of [`AffineExpression`]s, this constructor does not perform
            /// any folding, but it still rejects operands that would make the resulting expression non-affine.
            pub fn new<L: AffineExpression<'c>, R: AffineExpression<'c>>(lhs: L, rhs: R) -> Result<Self, Error> {
                let (lhs, rhs) = checked_binary_operands(AffineExpressionKind::$kind, lhs.as_ref(), rhs.as_ref())?;
                let expression = lhs.context.intern_affine_expression(AffineExpressionStorage::Binary {
                    kind: AffineExpressionKind::$kind,
                    lhs: lhs.id,
                    rhs: rhs.id,
                });
                Ok(Self { id: expression.id, context: expression.context })
            }
        }

        subtype_trait_impls!(
            $ty<'c> as AffineExpression,
            base = AffineExpressionRef,
            is = |expression| expression.kind() == AffineExpressionKind::$kind,
        );

        affine_expression_operator_impls!($ty);
    };
}

binary_affine_expression!(
    /// [`AffineExpression`] that represents the addition of two [`AffineExpression`]s.
    ///
    /// Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/Dialects/Affine/#affine-expressions)
    /// for more information.
    AddAffineExpressionRef,
    kind = Add,
);

binary_affine_expression!(
    /// [`AffineExpression`] that represents the multiplication of two [`AffineExpression`]s, at least one of which
    /// must be a constant.
    ///
    /// Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/Dialects/Affine/#affine-expressions)
    /// for more information.
    MulAffineExpressionRef,
    kind = Mul,
);

binary_affine_expression!(
    /// [`AffineExpression`] that represents the application of the modulus operator on an [`AffineExpression`] and
    /// a positive constant.
    ///
    /// Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/Dialects/Affine/#affine-expressions)
    /// for more information.
    ModAffineExpressionRef,
    kind = Mod,
);

binary_affine_expression!(
    /// [`AffineExpression`] that represents the application of the "floor-division" operator on an
    /// [`AffineExpression`] and a positive constant. The "floor-division" operator rounds down the result of the
    /// division to the nearest integer.
    ///
    /// Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/Dialects/Affine/#affine-expressions)
    /// for more information.
    FloorDivAffineExpressionRef,
    kind = FloorDiv,
);

binary_affine_expression!(
    /// [`AffineExpression`] that represents the application of the "ceil-division" operator on an
    /// [`AffineExpression`] and a positive constant. The "ceil-division" operator rounds up the result of the
    /// division to the nearest integer.
    ///
    /// Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/Dialects/Affine/#affine-expressions)
    /// for more information.
    CeilDivAffineExpressionRef,
    kind = CeilDiv,
);

fn assert_same_context(lhs: AffineExpressionRef<'_>, rhs: AffineExpressionRef<'_>) {
    assert!(
        std::ptr::eq(lhs.context, rhs.context),
        "cannot combine affine expressions that belong to different contexts",
    );
}

/// Checks that `lhs` and `rhs` can be combined using a binary operation of the provided kind without breaking the
/// affine-ness of the result.
fn checked_binary_operands<'c>(
    kind: AffineExpressionKind,
    lhs: AffineExpressionRef<'c>,
    rhs: AffineExpressionRef<'c>,
) -> Result<(AffineExpressionRef<'c>, AffineExpressionRef<'c>), Error> {
    if !std::ptr::eq(lhs.context, rhs.context) {
        return Err(Error::ContextMismatch);
    }
    let non_affine = || Error::NonAffineExpression {
        lhs: lhs.to_string(),
        operator: kind.operator_name(),
        rhs: rhs.to_string(),
    };
    match kind {
        AffineExpressionKind::Add => Ok((lhs, rhs)),
        AffineExpressionKind::Mul if lhs.constant_value().is_none() && rhs.constant_value().is_none() => {
            Err(non_affine())
        }
        AffineExpressionKind::Mul => Ok((lhs, rhs)),
        AffineExpressionKind::Mod | AffineExpressionKind::FloorDiv | AffineExpressionKind::CeilDiv => {
            match rhs.constant_value() {
                None => Err(non_affine()),
                Some(divisor) if divisor <= 0 => Err(Error::InvalidDivisor { divisor: divisor.to_string() }),
                Some(_) => Ok((lhs, rhs)),
            }
        }
        AffineExpressionKind::Constant | AffineExpressionKind::Dimension | AffineExpressionKind::Symbol => {
            Err(non_affine())
        }
    }
}

fn raw_binary<'c>(
    kind: AffineExpressionKind,
    lhs: AffineExpressionRef<'c>,
    rhs: AffineExpressionRef<'c>,
) -> AffineExpressionRef<'c> {
    lhs.context.intern_affine_expression(AffineExpressionStorage::Binary { kind, lhs: lhs.id, rhs: rhs.id })
}

/// Creates a binary expression, folding it eagerly when possible. The operands must already satisfy
/// [`checked_binary_operands`]. Folds that would overflow are skipped.
pub(crate) fn fold_binary<'c>(
    kind: AffineExpressionKind,
    lhs: AffineExpressionRef<'c>,
    rhs: AffineExpressionRef<'c>,
) -> AffineExpressionRef<'c> {
    let folded = match kind {
        AffineExpressionKind::Add => fold_add(lhs, rhs),
        AffineExpressionKind::Mul => fold_mul(lhs, rhs),
        AffineExpressionKind::Mod | AffineExpressionKind::FloorDiv | AffineExpressionKind::CeilDiv => {
            fold_division(kind, lhs, rhs)
        }
        AffineExpressionKind::Constant | AffineExpressionKind::Dimension | AffineExpressionKind::Symbol => None,
    };
    folded.unwrap_or_else(|| raw_binary(kind, lhs, rhs))
}

fn fold_add<'c>(lhs: AffineExpressionRef<'c>, rhs: AffineExpressionRef<'c>) -> Option<AffineExpressionRef<'c>> {
    let context = lhs.context;
    match (lhs.constant_value(), rhs.constant_value()) {
        (Some(lhs), Some(rhs)) => {
            return lhs.checked_add(rhs).map(|sum| context.constant_affine_expression(sum).as_ref());
        }
        (Some(_), None) => return Some(fold_binary(AffineExpressionKind::Add, rhs, lhs)),
        (None, Some(0)) => return Some(lhs),
        (None, Some(rhs_value)) => {
            // `(x + c1) + c2` becomes `x + (c1 + c2)`.
            let (x, c1) = lhs.binary_operands(AffineExpressionKind::Add)?;
            let sum = c1.constant_value()?.checked_add(rhs_value)?;
            return Some(fold_binary(AffineExpressionKind::Add, x, context.constant_affine_expression(sum).as_ref()));
        }
        (None, None) => {}
    }

    // `(x + c) + y` becomes `(x + y) + c`.
    if let Some((x, c)) = lhs.binary_operands(AffineExpressionKind::Add) {
        if c.constant_value().is_some() {
            let sum = fold_binary(AffineExpressionKind::Add, x, rhs);
            return Some(fold_binary(AffineExpressionKind::Add, sum, c));
        }
    }

    // `x * c1 + x * c2` becomes `x * (c1 + c2)`, where a missing factor counts as `1`.
    let (lhs_term, lhs_factor) = scaled_term(lhs);
    let (rhs_term, rhs_factor) = scaled_term(rhs);
    if lhs_term == rhs_term {
        let factor = lhs_factor.checked_add(rhs_factor)?;
        return Some(fold_binary(
            AffineExpressionKind::Mul,
            lhs_term,
            context.constant_affine_expression(factor).as_ref(),
        ));
    }

    None
}

/// Splits `expression` into a term and a constant factor (i.e., `x * c` into `(x, c)` and anything else into `(x, 1)`).
fn scaled_term(expression: AffineExpressionRef<'_>) -> (AffineExpressionRef<'_>, i64) {
    expression
        .binary_operands(AffineExpressionKind::Mul)
        .and_then(|(term, factor)| factor.constant_value().map(|factor| (term, factor)))
        .unwrap_or((expression, 1))
}

fn fold_mul<'c>(lhs: AffineExpressionRef<'c>, rhs: AffineExpressionRef<'c>) -> Option<AffineExpressionRef<'c>> {
    let context = lhs.context;
    let rhs_value = match (lhs.constant_value(), rhs.constant_value()) {
        (Some(lhs), Some(rhs)) => {
            return lhs.checked_mul(rhs).map(|product| context.constant_affine_expression(product).as_ref());
        }
        (Some(_), None) => return Some(fold_binary(AffineExpressionKind::Mul, rhs, lhs)),
        (None, Some(rhs)) => rhs,
        (None, None) => return None,
    };
    match rhs_value {
        0 => Some(context.constant_affine_expression(0).as_ref()),
        1 => Some(lhs),
        _ => {
            // `(x * c1) * c2` becomes `x * (c1 * c2)`.
            let (x, c1) = lhs.binary_operands(AffineExpressionKind::Mul)?;
            let product = c1.constant_value()?.checked_mul(rhs_value)?;
            Some(fold_binary(AffineExpressionKind::Mul, x, context.constant_affine_expression(product).as_ref()))
        }
    }
}

fn fold_division<'c>(
    kind: AffineExpressionKind,
    lhs: AffineExpressionRef<'c>,
    rhs: AffineExpressionRef<'c>,
) -> Option<AffineExpressionRef<'c>> {
    let context = lhs.context;
    let divisor = rhs.constant_value().filter(|divisor| *divisor > 0)?;
    if let Some(value) = lhs.constant_value() {
        let value = match kind {
            AffineExpressionKind::FloorDiv => floor_div(value, divisor),
            AffineExpressionKind::CeilDiv => ceil_div(value, divisor),
            _ => modulo(value, divisor),
        };
        return Some(context.constant_affine_expression(value).as_ref());
    }
    if divisor == 1 {
        return Some(match kind {
            AffineExpressionKind::Mod => context.constant_affine_expression(0).as_ref(),
            _ => lhs,
        });
    }

    // `(x * c) floordiv d` becomes `x * (c / d)` and `(x * c) mod d` becomes `0` when `c` is a multiple of `d`.
    let (x, factor) = lhs.binary_operands(AffineExpressionKind::Mul)?;
    let factor = factor.constant_value().filter(|factor| factor % divisor == 0)?;
    Some(match kind {
        AffineExpressionKind::Mod => context.constant_affine_expression(0).as_ref(),
        _ => fold_binary(AffineExpressionKind::Mul, x, context.constant_affine_expression(factor / divisor).as_ref()),
    })
}

/// Rebuilds `expression` bottom-up, replacing every sub-expression for which `replace` returns a replacement.
/// Sub-expressions that are replaced are not visited any further.
fn transform<'c>(
    expression: AffineExpressionRef<'c>,
    replace: &mut dyn FnMut(AffineExpressionRef<'c>) -> Option<AffineExpressionRef<'c>>,
) -> AffineExpressionRef<'c> {
    if let Some(replacement) = replace(expression) {
        return replacement;
    }
    match expression.binary() {
        Some((kind, lhs, rhs)) => {
            let new_lhs = transform(lhs, replace);
            let new_rhs = transform(rhs, replace);
            if new_lhs == lhs && new_rhs == rhs { expression } else { fold_binary(kind, new_lhs, new_rhs) }
        }
        None => expression,
    }
}

fn walk<'c>(expression: AffineExpressionRef<'c>, callback: &mut dyn FnMut(AffineExpressionRef<'c>)) {
    if let Some((_, lhs, rhs)) = expression.binary() {
        walk(lhs, callback);
        walk(rhs, callback);
    }
    callback(expression);
}

fn is_pure_affine(expression: AffineExpressionRef<'_>) -> bool {
    match expression.binary() {
        None => true,
        Some((AffineExpressionKind::Add, lhs, rhs)) => is_pure_affine(lhs) && is_pure_affine(rhs),
        Some((AffineExpressionKind::Mul, lhs, rhs)) => {
            is_pure_affine(lhs)
                && is_pure_affine(rhs)
                && (lhs.constant_value().is_some() || rhs.constant_value().is_some())
        }
        Some((_, lhs, rhs)) => is_pure_affine(lhs) && rhs.constant_value().is_some(),
    }
}

fn largest_known_divisor(expression: AffineExpressionRef<'_>) -> u64 {
    match expression.storage() {
        AffineExpressionStorage::Dimension(_) | AffineExpressionStorage::Symbol(_) => 1,
        AffineExpressionStorage::Constant(value) => value.unsigned_abs(),
        AffineExpressionStorage::Binary { .. } => {
            let Some((kind, lhs, rhs)) = expression.binary() else { return 1 };
            let lhs_divisor = largest_known_divisor(lhs);
            match kind {
                AffineExpressionKind::Add => greatest_common_divisor(lhs_divisor, largest_known_divisor(rhs)),
                AffineExpressionKind::Mul => lhs_divisor.saturating_mul(largest_known_divisor(rhs)),
                AffineExpressionKind::FloorDiv | AffineExpressionKind::CeilDiv => {
                    match rhs.constant_value().map(i64::unsigned_abs) {
                        Some(divisor) if divisor != 0 && lhs_divisor % divisor == 0 => lhs_divisor / divisor,
                        _ => 1,
                    }
                }
                AffineExpressionKind::Mod => match rhs.constant_value() {
                    Some(divisor) => greatest_common_divisor(lhs_divisor, divisor.unsigned_abs()),
                    None => 1,
                },
                AffineExpressionKind::Constant | AffineExpressionKind::Dimension | AffineExpressionKind::Symbol => 1,
            }
        }
    }
}

fn evaluate(expression: AffineExpressionRef<'_>, dimensions: &[i64], symbols: &[i64]) -> Option<i64> {
    match expression.storage() {
        AffineExpressionStorage::Dimension(position) => dimensions.get(position).copied(),
        AffineExpressionStorage::Symbol(position) => symbols.get(position).copied(),
        AffineExpressionStorage::Constant(value) => Some(value),
        AffineExpressionStorage::Binary { .. } => {
            let (kind, lhs, rhs) = expression.binary()?;
            let lhs = evaluate(lhs, dimensions, symbols)?;
            let rhs = evaluate(rhs, dimensions, symbols)?;
            match kind {
                AffineExpressionKind::Add => lhs.checked_add(rhs),
                AffineExpressionKind::Mul => lhs.checked_mul(rhs),
                AffineExpressionKind::FloorDiv => (rhs > 0).then(|| floor_div(lhs, rhs)),
                AffineExpressionKind::CeilDiv => (rhs > 0).then(|| ceil_div(lhs, rhs)),
                AffineExpressionKind::Mod => (rhs > 0).then(|| modulo(lhs, rhs)),
                AffineExpressionKind::Constant | AffineExpressionKind::Dimension | AffineExpressionKind::Symbol => None,
            }
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum BindingStrength {
    Weak,
    Strong,
}

fn print(
    expression: AffineExpressionRef<'_>,
    formatter: &mut std::fmt::Formatter<'_>,
    strength: BindingStrength,
) -> std::fmt::Result {
    let (kind, lhs, rhs) = match expression.storage() {
        AffineExpressionStorage::Dimension(position) => return write!(formatter, "d{position}"),
        AffineExpressionStorage::Symbol(position) => return write!(formatter, "s{position}"),
        AffineExpressionStorage::Constant(value) => return write!(formatter, "{value}"),
        AffineExpressionStorage::Binary { .. } => match expression.binary() {
            Some(binary) => binary,
            None => return Ok(()),
        },
    };

    if kind != AffineExpressionKind::Add {
        if kind == AffineExpressionKind::Mul && rhs.constant_value() == Some(-1) {
            write!(formatter, "-")?;
            return print(lhs, formatter, BindingStrength::Strong);
        }
        let spelling = match kind {
            AffineExpressionKind::Mul => " * ",
            AffineExpressionKind::FloorDiv => " floordiv ",
            AffineExpressionKind::CeilDiv => " ceildiv ",
            _ => " mod ",
        };
        if strength == BindingStrength::Strong {
            write!(formatter, "(")?;
        }
        print(lhs, formatter, BindingStrength::Strong)?;
        write!(formatter, "{spelling}")?;
        print(rhs, formatter, BindingStrength::Strong)?;
        if strength == BindingStrength::Strong {
            write!(formatter, ")")?;
        }
        return Ok(());
    }

    if strength == BindingStrength::Strong {
        write!(formatter, "(")?;
    }
    print_addition(lhs, rhs, formatter)?;
    if strength == BindingStrength::Strong {
        write!(formatter, ")")?;
    }
    Ok(())
}

/// Prints `lhs + rhs`, rendering additions of negated terms and negative constants as subtractions.
fn print_addition(
    lhs: AffineExpressionRef<'_>,
    rhs: AffineExpressionRef<'_>,
    formatter: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    if let Some((term, factor)) = rhs.binary_operands(AffineExpressionKind::Mul) {
        match factor.constant_value() {
            Some(-1) => {
                print(lhs, formatter, BindingStrength::Weak)?;
                write!(formatter, " - ")?;
                let strength = if term.kind() == AffineExpressionKind::Add {
                    BindingStrength::Strong
                } else {
                    BindingStrength::Weak
                };
                return print(term, formatter, strength);
            }
            Some(factor) if factor < -1 => {
                print(lhs, formatter, BindingStrength::Weak)?;
                write!(formatter, " - ")?;
                print(term, formatter, BindingStrength::Strong)?;
                return write!(formatter, " * {}", factor.unsigned_abs());
            }
            _ => {}
        }
    }
    if let Some(value) = rhs.constant_value().filter(|value| *value < 0) {
        print(lhs, formatter, BindingStrength::Weak)?;
        return write!(formatter, " - {}", value.unsigned_abs());
    }
    print(lhs, formatter, BindingStrength::Weak)?;
    write!(formatter, " + ")?;
    print(rhs, formatter, BindingStrength::Weak)
}

/// Result of flattening an [`AffineExpression`]: a linear combination of the dimensions, the symbols, and a list of
/// "local" sub-expressions (i.e., floor-divisions, ceil-divisions, and modulus operations that could not be
/// eliminated), plus a constant term.
#[derive(Clone, Debug)]
pub(crate) struct FlattenedAffineExpression<'c> {
    /// Coefficients of the dimensions, followed by those of the symbols, followed by those of the `locals`.
    pub(crate) coefficients: Vec<i64>,

    pub(crate) locals: Vec<AffineExpressionRef<'c>>,

    pub(crate) constant: i64,
}

/// Flattens `expression` into a [`FlattenedAffineExpression`]. Returns [`None`] for expressions that refer to positions
/// outside of the provided counts, that are semi-affine, or whose flattening overflows.
pub(crate) fn flatten_affine_expression<'c>(
    expression: AffineExpressionRef<'c>,
    dimension_count: usize,
    symbol_count: usize,
) -> Option<FlattenedAffineExpression<'c>> {
    let mut flattener = Flattener::new(expression.context, dimension_count, symbol_count);
    let form = flattener.flatten(expression)?;
    let mut coefficients = form.coefficients;
    coefficients.resize(dimension_count + symbol_count + flattener.locals.len(), 0);
    Some(FlattenedAffineExpression { coefficients, locals: flattener.locals, constant: form.constant })
}

/// Linear form over the dimensions, the symbols, and the locals of a [`Flattener`] (in that order), plus a constant.
/// Trailing zero coefficients may be omitted.
#[derive(Clone, Debug, Default)]
struct LinearForm {
    coefficients: Vec<i64>,
    constant: i64,
}

impl LinearForm {
    fn constant(value: i64) -> Self {
        Self { coefficients: Vec::new(), constant: value }
    }

    fn term(index: usize) -> Self {
        let mut coefficients = vec![0; index + 1];
        coefficients[index] = 1;
        Self { coefficients, constant: 0 }
    }

    fn is_constant(&self) -> bool {
        self.coefficients.iter().all(|coefficient| *coefficient == 0)
    }

    fn checked_add(&self, other: &Self) -> Option<Self> {
        let length = self.coefficients.len().max(other.coefficients.len());
        let mut coefficients = Vec::with_capacity(length);
        for index in 0..length {
            let lhs = self.coefficients.get(index).copied().unwrap_or(0);
            let rhs = other.coefficients.get(index).copied().unwrap_or(0);
            coefficients.push(lhs.checked_add(rhs)?);
        }
        Some(Self { coefficients, constant: self.constant.checked_add(other.constant)? })
    }

    fn checked_scale(&self, factor: i64) -> Option<Self> {
        let coefficients = self
            .coefficients
            .iter()
            .map(|coefficient| coefficient.checked_mul(factor))
            .collect::<Option<Vec<_>>>()?;
        Some(Self { coefficients, constant: self.constant.checked_mul(factor)? })
    }
}

struct Flattener<'c> {
    context: &'c Context,
    dimension_count: usize,
    symbol_count: usize,
    locals: Vec<AffineExpressionRef<'c>>,
}

impl<'c> Flattener<'c> {
    fn new(context: &'c Context, dimension_count: usize, symbol_count: usize) -> Self {
        Self { context, dimension_count, symbol_count, locals: Vec::new() }
    }

    fn flatten(&mut self, expression: AffineExpressionRef<'c>) -> Option<LinearForm> {
        match expression.storage() {
            AffineExpressionStorage::Dimension(position) => {
                (position < self.dimension_count).then(|| LinearForm::term(position))
            }
            AffineExpressionStorage::Symbol(position) => {
                (position < self.symbol_count).then(|| LinearForm::term(self.dimension_count + position))
            }
            AffineExpressionStorage::Constant(value) => Some(LinearForm::constant(value)),
            AffineExpressionStorage::Binary { .. } => {
                let (kind, lhs, rhs) = expression.binary()?;
                let lhs = self.flatten(lhs)?;
                let rhs = self.flatten(rhs)?;
                match kind {
                    AffineExpressionKind::Add => lhs.checked_add(&rhs),
                    AffineExpressionKind::Mul if rhs.is_constant() => lhs.checked_scale(rhs.constant),
                    AffineExpressionKind::Mul if lhs.is_constant() => rhs.checked_scale(lhs.constant),
                    AffineExpressionKind::Mul => None,
                    AffineExpressionKind::FloorDiv | AffineExpressionKind::CeilDiv | AffineExpressionKind::Mod => {
                        if !rhs.is_constant() || rhs.constant <= 0 {
                            return None;
                        }
                        self.flatten_division(kind, lhs, rhs.constant)
                    }
                    AffineExpressionKind::Constant | AffineExpressionKind::Dimension | AffineExpressionKind::Symbol => {
                        None
                    }
                }
            }
        }
    }

    fn flatten_division(
        &mut self,
        kind: AffineExpressionKind,
        mut lhs: LinearForm,
        divisor: i64,
    ) -> Option<LinearForm> {
        if kind == AffineExpressionKind::Mod {
            // `(c * x + b) mod c` is equal to `b mod c` and so every coefficient can be reduced modulo `c`.
            lhs.coefficients.iter_mut().for_each(|coefficient| *coefficient = modulo(*coefficient, divisor));
            lhs.constant = modulo(lhs.constant, divisor);
            if lhs.is_constant() {
                return Some(LinearForm::constant(lhs.constant));
            }
            let divisor = self.context.constant_affine_expression(divisor).as_ref();
            let local = fold_binary(kind, self.rebuild(&lhs), divisor);
            return Some(self.local_term(local));
        }

        // Cancel out the greatest common divisor of the numerator and the denominator.
        let common_divisor = lhs
            .coefficients
            .iter()
            .chain(std::iter::once(&lhs.constant))
            .fold(divisor.unsigned_abs(), |result, coefficient| {
                greatest_common_divisor(result, coefficient.unsigned_abs())
            });
        let common_divisor = i64::try_from(common_divisor).ok()?;
        let mut divisor = divisor;
        if common_divisor > 1 {
            lhs.coefficients.iter_mut().for_each(|coefficient| *coefficient /= common_divisor);
            lhs.constant /= common_divisor;
            divisor /= common_divisor;
        }

        // `(c * x + b) floordiv c` is equal to `x + b floordiv c` (and similarly for ceil-divisions).
        if lhs.coefficients.iter().all(|coefficient| coefficient % divisor == 0) {
            let coefficients = lhs.coefficients.iter().map(|coefficient| coefficient / divisor).collect();
            let constant = match kind {
                AffineExpressionKind::CeilDiv => ceil_div(lhs.constant, divisor),
                _ => floor_div(lhs.constant, divisor),
            };
            return Some(LinearForm { coefficients, constant });
        }

        let local = fold_binary(kind, self.rebuild(&lhs), self.context.constant_affine_expression(divisor).as_ref());
        Some(self.local_term(local))
    }

    fn local_term(&mut self, local: AffineExpressionRef<'c>) -> LinearForm {
        let index = match self.locals.iter().position(|existing| *existing == local) {
            Some(index) => index,
            None => {
                self.locals.push(local);
                self.locals.len() - 1
            }
        };
        LinearForm::term(self.dimension_count + self.symbol_count + index)
    }

    fn rebuild(&self, form: &LinearForm) -> AffineExpressionRef<'c> {
        let mut result: Option<AffineExpressionRef<'c>> = None;
        for (index, coefficient) in form.coefficients.iter().copied().enumerate() {
            if coefficient == 0 {
                continue;
            }
            let term = if index < self.dimension_count {
                self.context.dimension_affine_expression(index).as_ref()
            } else if index < self.dimension_count + self.symbol_count {
                self.context.symbol_affine_expression(index - self.dimension_count).as_ref()
            } else {
                self.locals[index - self.dimension_count - self.symbol_count]
            };
            let term = if coefficient == 1 { term } else { term * coefficient };
            result = Some(match result {
                Some(result) => fold_binary(AffineExpressionKind::Add, result, term),
                None => term,
            });
        }
        match result {
            Some(result) if form.constant == 0 => result,
            Some(result) => result + form.constant,
            None => self.context.constant_affine_expression(form.constant).as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use crate::Context;

    use super::*;

    #[test]
    fn test_dimension_affine_expression() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let dimension_10 = context.dimension_affine_expression(10);
        assert_eq!(&context, dimension_0.context());
        assert_eq!(dimension_0.position(), 0);
        assert_eq!(dimension_1.position(), 1);
        assert_eq!(dimension_10.position(), 10);
        assert_eq!(dimension_0.kind(), AffineExpressionKind::Dimension);
        assert_eq!(dimension_0.to_string(), "d0");
        assert_eq!(dimension_1.to_string(), "d1");
        assert_eq!(dimension_10.to_string(), "d10");
        assert_eq!(format!("{dimension_1:?}"), "DimensionAffineExpressionRef[d1]");
    }

    #[test]
    fn test_dimension_affine_expression_equality() {
        let context = Context::new();
        let dimension_0_0 = context.dimension_affine_expression(0);
        let dimension_0_1 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);

        // Same dimensions from the same context must be equal because they are "uniqued".
        assert_eq!(dimension_0_0, dimension_0_1);
        assert_ne!(dimension_0_0, dimension_1);

        // Same dimensions from different contexts must not be equal.
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        assert_ne!(dimension_0_0, dimension_0);
    }

    #[test]
    fn test_symbol_affine_expression() {
        let context = Context::new();
        let symbol_0 = context.symbol_affine_expression(0);
        let symbol_1 = context.symbol_affine_expression(1);
        let symbol_2 = context.symbol_affine_expression(10);
        assert_eq!(&context, symbol_0.context());
        assert_eq!(symbol_0.position(), 0);
        assert_eq!(symbol_1.position(), 1);
        assert_eq!(symbol_2.position(), 10);
        assert_eq!(symbol_0.to_string(), "s0");
        assert_eq!(symbol_1.to_string(), "s1");
        assert_eq!(symbol_2.to_string(), "s10");
    }

    #[test]
    fn test_symbol_affine_expression_equality() {
        let context = Context::new();
        let symbol_0_0 = context.symbol_affine_expression(0);
        let symbol_0_1 = context.symbol_affine_expression(0);
        let symbol_1 = context.symbol_affine_expression(1);

        // Same symbols from the same context must be equal because they are "uniqued".
        assert_eq!(symbol_0_0, symbol_0_1);
        assert_ne!(symbol_0_0, symbol_1);

        // Dimensions and symbols with the same position must not be equal.
        assert_ne!(symbol_0_0.as_ref(), context.dimension_affine_expression(0).as_ref());
    }

    #[test]
    fn test_constant_affine_expression() {
        let context = Context::new();
        let constant_0 = context.constant_affine_expression(0);
        let constant_1 = context.constant_affine_expression(42);
        let constant_2 = context.constant_affine_expression(-5);
        assert_eq!(&context, constant_0.context());
        assert_eq!(constant_0.value(), 0);
        assert_eq!(constant_1.value(), 42);
        assert_eq!(constant_2.value(), -5);
        assert_eq!(constant_0.to_string(), "0");
        assert_eq!(constant_1.to_string(), "42");
        assert_eq!(constant_2.to_string(), "-5");
    }

    #[test]
    fn test_constant_affine_expression_equality() {
        let context = Context::new();
        let constant_0 = context.constant_affine_expression(42);
        let constant_1 = context.constant_affine_expression(42);
        let constant_2 = context.constant_affine_expression(43);

        // Same constants from the same context must be equal because they are "uniqued".
        assert_eq!(constant_0, constant_1);
        assert_ne!(constant_0, constant_2);

        // Same constants from different contexts must not be equal.
        let context = Context::new();
        let constant_3 = context.constant_affine_expression(42);
        assert_ne!(constant_0, constant_3);
    }

    #[test]
    fn test_add_affine_expression() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0).as_ref();
        let dimension_1 = context.dimension_affine_expression(1).as_ref();
        let constant_0 = context.constant_affine_expression(5).as_ref();

        let add_expression_0 = dimension_0 + dimension_1;
        assert_eq!(&context, add_expression_0.context());
        assert_eq!(add_expression_0.kind(), AffineExpressionKind::Add);
        assert_eq!(add_expression_0.to_string(), "d0 + d1");

        let add_expression_1 = dimension_0 + constant_0;
        assert_eq!(add_expression_1.to_string(), "d0 + 5");

        let binary_expression = add_expression_0.cast::<BinaryOperationAffineExpressionRef>().unwrap();
        assert_eq!(binary_expression.lhs_operand(), dimension_0);
        assert_eq!(binary_expression.rhs_operand(), dimension_1);
        assert!(add_expression_0.is::<AddAffineExpressionRef>());
        assert!(!add_expression_0.is::<MulAffineExpressionRef>());
    }

    #[test]
    fn test_mul_affine_expression() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0).as_ref();
        let dimension_1 = context.dimension_affine_expression(1).as_ref();
        let constant_0 = context.constant_affine_expression(3);

        let mul_expression = dimension_0 * constant_0;
        assert_eq!(&context, mul_expression.context());
        assert_eq!(mul_expression.to_string(), "d0 * 3");
        assert_eq!(dimension_0.multiply(constant_0), Ok(mul_expression));
        assert_eq!(constant_0.multiply(dimension_0), Ok(mul_expression));

        let binary_expression = mul_expression.cast::<BinaryOperationAffineExpressionRef>().unwrap();
        assert_eq!(binary_expression.lhs_operand(), dimension_0);
        assert_eq!(binary_expression.rhs_operand(), constant_0);

        // Products of two non-constant expressions are not affine.
        assert_eq!(
            dimension_0.multiply(dimension_1),
            Err(Error::NonAffineExpression { lhs: "d0".to_string(), operator: "*", rhs: "d1".to_string() }),
        );
        assert!(MulAffineExpressionRef::new(dimension_0, dimension_1).is_err());
    }

    #[test]
    fn test_mod_affine_expression() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let constant_0 = context.constant_affine_expression(8);

        let mod_expression = dimension_0.modulo(constant_0).unwrap();
        assert_eq!(&context, mod_expression.context());
        assert_eq!(mod_expression.to_string(), "d0 mod 8");
        assert!(mod_expression.is::<ModAffineExpressionRef>());
        assert_eq!(ModAffineExpressionRef::new(dimension_0, constant_0).unwrap(), mod_expression);

        let binary_expression = mod_expression.cast::<BinaryOperationAffineExpressionRef>().unwrap();
        assert_eq!(binary_expression.lhs_operand(), dimension_0);
        assert_eq!(binary_expression.rhs_operand(), constant_0);
    }

    #[test]
    fn test_floor_div_affine_expression() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let constant_0 = context.constant_affine_expression(4);

        let floor_div_expression = dimension_0.floor_div(constant_0).unwrap();
        assert_eq!(&context, floor_div_expression.context());
        assert_eq!(floor_div_expression.to_string(), "d0 floordiv 4");

        let binary_expression = floor_div_expression.cast::<BinaryOperationAffineExpressionRef>().unwrap();
        assert_eq!(binary_expression.lhs_operand(), dimension_0);
        assert_eq!(binary_expression.rhs_operand(), constant_0);
    }

    #[test]
    fn test_ceil_div_affine_expression() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let constant_0 = context.constant_affine_expression(4);

        let ceil_div_expression = dimension_0.ceil_div(constant_0).unwrap();
        assert_eq!(&context, ceil_div_expression.context());
        assert_eq!(ceil_div_expression.to_string(), "d0 ceildiv 4");

        let binary_expression = ceil_div_expression.cast::<BinaryOperationAffineExpressionRef>().unwrap();
        assert_eq!(binary_expression.lhs_operand(), dimension_0);
        assert_eq!(binary_expression.rhs_operand(), constant_0);
    }

    #[test]
    fn test_affine_expression_division_errors() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        assert_eq!(
            dimension_0.floor_div(dimension_1),
            Err(Error::NonAffineExpression { lhs: "d0".to_string(), operator: "floordiv", rhs: "d1".to_string() }),
        );
        assert_eq!(
            dimension_0.modulo(context.constant_affine_expression(0)),
            Err(Error::InvalidDivisor { divisor: "0".to_string() }),
        );
        assert_eq!(
            dimension_0.ceil_div(context.constant_affine_expression(-2)),
            Err(Error::InvalidDivisor { divisor: "-2".to_string() }),
        );
        assert!(CeilDivAffineExpressionRef::new(dimension_0, dimension_1).is_err());

        let other_context = Context::new();
        assert_eq!(dimension_0.floor_div(other_context.constant_affine_expression(2)), Err(Error::ContextMismatch));
    }

    #[test]
    fn test_complex_affine_expression() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let expression = ((dimension_0 * 2) + dimension_1) * 3;
        assert_eq!(expression.to_string(), "(d0 * 2 + d1) * 3");
        let expression = (dimension_0 + 1).floor_div(context.constant_affine_expression(2)).unwrap() * 4;
        assert_eq!(expression.to_string(), "((d0 + 1) floordiv 2) * 4");
    }

    #[test]
    fn test_affine_expression_subtraction_printing() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let dimension_2 = context.dimension_affine_expression(2);
        assert_eq!((dimension_0 - dimension_1).to_string(), "d0 - d1");
        assert_eq!((dimension_0 - dimension_1 * 2).to_string(), "d0 - d1 * 2");
        assert_eq!((dimension_0 - 3).to_string(), "d0 - 3");
        assert_eq!((-dimension_0).to_string(), "-d0");
        assert_eq!((dimension_0 - (dimension_1 + dimension_2)).to_string(), "d0 - (d1 + d2)");
        assert_eq!((dimension_0 - dimension_0).to_string(), "0");
    }

    #[test]
    fn test_affine_expression_folding() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let constant_2 = context.constant_affine_expression(2);
        let constant_3 = context.constant_affine_expression(3);
        assert_eq!(dimension_0 + 0, dimension_0);
        assert_eq!(dimension_0 * 1, dimension_0);
        assert_eq!(dimension_0 * 0, context.constant_affine_expression(0));
        assert_eq!(constant_2 + constant_3, context.constant_affine_expression(5));
        assert_eq!(((dimension_0 + 2) + 3).to_string(), "d0 + 5");
        assert_eq!((constant_2 + dimension_0).to_string(), "d0 + 2");
        assert_eq!(((dimension_0 + 2) + dimension_1).to_string(), "d0 + d1 + 2");
        assert_eq!(((dimension_0 * 2) * 3).to_string(), "d0 * 6");
        assert_eq!((dimension_0 * 4).floor_div(constant_2).unwrap().to_string(), "d0 * 2");
        assert_eq!((dimension_0 * 4).modulo(constant_2).unwrap().to_string(), "0");
        assert_eq!(dimension_0.floor_div(context.constant_affine_expression(1)), Ok(dimension_0.as_ref()));
        assert_eq!(context.constant_affine_expression(7).floor_div(constant_2).unwrap().to_string(), "3");
        assert_eq!(context.constant_affine_expression(-7).ceil_div(constant_2).unwrap().to_string(), "-3");
        assert_eq!(context.constant_affine_expression(-7).modulo(constant_3).unwrap().to_string(), "2");
    }

    #[test]
    fn test_affine_expression_casting() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_0_erased = dimension_0.as_ref();
        let dimension_0_erased_casted = dimension_0_erased.cast::<DimensionAffineExpressionRef>().unwrap();
        let constant_1 = context.constant_affine_expression(42);
        let symbol_0 = context.symbol_affine_expression(0);
        assert!(dimension_0.is::<AffineExpressionRef>());
        assert!(dimension_0.is::<DimensionAffineExpressionRef>());
        assert!(!dimension_0.is::<SymbolAffineExpressionRef>());
        assert!(!dimension_0.is::<ConstantAffineExpressionRef>());
        assert!(!dimension_0.is::<FloorDivAffineExpressionRef>());
        assert!(symbol_0.is::<AffineExpressionRef>());
        assert!(!symbol_0.is::<DimensionAffineExpressionRef>());
        assert!(symbol_0.is::<SymbolAffineExpressionRef>());
        assert!(!symbol_0.is::<ConstantAffineExpressionRef>());
        assert!(!symbol_0.is::<BinaryOperationAffineExpressionRef>());
        assert!(constant_1.is::<AffineExpressionRef>());
        assert!(!constant_1.is::<DimensionAffineExpressionRef>());
        assert!(!constant_1.is::<SymbolAffineExpressionRef>());
        assert!(constant_1.is::<ConstantAffineExpressionRef>());
        assert!(!constant_1.is::<FloorDivAffineExpressionRef>());
        assert_eq!(dimension_0_erased_casted, dimension_0);
        assert_eq!(format!("{dimension_0_erased:?}"), "AffineExpressionRef[d0]");
    }

    #[test]
    fn test_affine_expression_is_symbolic_or_constant() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let constant_0 = context.constant_affine_expression(42);
        let symbol_0 = context.symbol_affine_expression(0);
        assert!(!dimension_0.is_symbolic_or_constant());
        assert!(symbol_0.is_symbolic_or_constant());
        assert!(constant_0.is_symbolic_or_constant());
        assert!(!(dimension_0 + symbol_0).is_symbolic_or_constant());
        assert!((symbol_0 + constant_0).is_symbolic_or_constant());
    }

    #[test]
    fn test_affine_expression_is_pure_affine_and_semi_affine() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);

        let pure_expression = dimension_0 + dimension_1;
        assert!(pure_expression.is_pure_affine());
        assert!(!pure_expression.is_semi_affine());

        let pure_expression = (dimension_0 * 2).floor_div(context.constant_affine_expression(3)).unwrap();
        assert!(pure_expression.is_pure_affine());
    }

    #[test]
    fn test_affine_expression_largest_known_divisor() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let constant_3 = context.constant_affine_expression(3);
        let constant_4 = context.constant_affine_expression(4);
        assert_eq!((dimension_0 * 8).largest_known_divisor(), 8);
        assert_eq!((dimension_0 * 4).largest_known_divisor(), 4);
        assert_eq!(dimension_0.largest_known_divisor(), 1);
        assert_eq!(context.constant_affine_expression(-12).largest_known_divisor(), 12);
        assert_eq!(context.constant_affine_expression(0).largest_known_divisor(), 0);
        assert_eq!((dimension_0 * 4 + dimension_1 * 6).largest_known_divisor(), 2);
        assert_eq!(FloorDivAffineExpressionRef::new(dimension_0 * 6, constant_3).unwrap().largest_known_divisor(), 2);
        assert_eq!(FloorDivAffineExpressionRef::new(dimension_0 * 4, constant_3).unwrap().largest_known_divisor(), 1);
        assert_eq!(ModAffineExpressionRef::new(dimension_0 * 6, constant_4).unwrap().largest_known_divisor(), 2);
    }

    #[test]
    fn test_affine_expression_is_multiple_of() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let expression = dimension_0 * 8;
        assert!(expression.is_multiple_of(2));
        assert!(expression.is_multiple_of(4));
        assert!(expression.is_multiple_of(8));
        assert!(!expression.is_multiple_of(16));
        assert!(context.constant_affine_expression(0).is_multiple_of(16));
    }

    #[test]
    fn test_affine_expression_is_function_of_dimension_and_symbol() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let expression = dimension_0 + dimension_1;
        let symbol_0 = context.symbol_affine_expression(0);
        assert!(dimension_0.is_function_of_dimension(0));
        assert!(!dimension_0.is_function_of_dimension(1));
        assert!(!dimension_1.is_function_of_dimension(0));
        assert!(dimension_1.is_function_of_dimension(1));
        assert!(!symbol_0.is_function_of_dimension(0));
        assert!(symbol_0.is_function_of_symbol(0));
        assert!(!dimension_0.is_function_of_symbol(0));
        assert!(expression.is_function_of_dimension(0));
        assert!(expression.is_function_of_dimension(1));
    }

    #[test]
    fn test_affine_expression_walk() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let symbol_0 = context.symbol_affine_expression(0);
        let expression = dimension_0 * 2 + symbol_0;
        let mut visited = Vec::new();
        expression.walk(|expression| visited.push(expression.to_string()));
        assert_eq!(visited, vec!["d0", "2", "d0 * 2", "s0", "d0 * 2 + s0"]);
    }

    #[test]
    fn test_affine_expression_evaluate() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let symbol_0 = context.symbol_affine_expression(0);
        let constant_3 = context.constant_affine_expression(3);
        let expression = (dimension_0 * 2 + symbol_0).floor_div(constant_3).unwrap();
        assert_eq!(expression.evaluate(&[4], &[1]), Some(3));
        assert_eq!(expression.evaluate(&[-4], &[1]), Some(-3));
        assert_eq!(expression.evaluate(&[4], &[]), None);
        let expression = (dimension_0 - 1).modulo(constant_3).unwrap();
        assert_eq!(expression.evaluate(&[0], &[]), Some(2));
        let expression = dimension_0.ceil_div(constant_3).unwrap();
        assert_eq!(expression.evaluate(&[7], &[]), Some(3));
    }

    #[test]
    fn test_affine_expression_with_shifted_dimensions() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let dimension_2 = context.dimension_affine_expression(2);
        let expression = (dimension_0 + dimension_1) + dimension_2;
        let shifted_expression = expression.with_shifted_dimensions(1, 3, 2);
        assert_eq!(shifted_expression.to_string(), "d0 + d3 + d4");
    }

    #[test]
    fn test_affine_expression_with_shifted_symbols() {
        let context = Context::new();
        let symbol_0 = context.symbol_affine_expression(0);
        let symbol_1 = context.symbol_affine_expression(1);
        let symbol_2 = context.symbol_affine_expression(2);
        let expression = (symbol_0 + symbol_1) + symbol_2;
        let shifted_expression = expression.with_shifted_symbols(1, 3, 2);
        assert_eq!(shifted_expression.to_string(), "s0 + s3 + s4");
    }

    #[test]
    fn test_affine_expression_replace() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let symbol_0 = context.symbol_affine_expression(0);
        let expression = dimension_0 * 2 + dimension_1;
        let replaced = expression.replace_dimensions_and_symbols(&[symbol_0.as_ref()], &[]);
        assert_eq!(replaced.to_string(), "s0 * 2 + d1");
        let constant_3 = context.constant_affine_expression(3).as_ref();
        let replaced = expression.replace_dimensions_and_symbols(&[constant_3], &[]);
        assert_eq!(replaced.to_string(), "d1 + 6");
        let replaced = expression.replace(dimension_0 * 2, symbol_0);
        assert_eq!(replaced.to_string(), "s0 + d1");
    }

    #[test]
    fn test_affine_expression_compose() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let expression_0 = dimension_0 + dimension_1;
        let expression_1 = dimension_0 * 2;
        let expression_2 = dimension_1 * 3;
        let map = context.affine_map(2, 0, &[expression_1, expression_2]).unwrap();
        let composed = expression_0.compose(map);
        assert_eq!(composed.to_string(), "d0 * 2 + d1 * 3");
    }

    #[test]
    fn test_affine_expression_simplify() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let symbol_0 = context.symbol_affine_expression(0);
        let constant_2 = context.constant_affine_expression(2);
        let constant_4 = context.constant_affine_expression(4);
        assert_eq!(((dimension_0 * 2) + dimension_1).simplify(2, 0).to_string(), "d0 * 2 + d1");
        assert_eq!((dimension_0 + dimension_1).simplify(2, 0).to_string(), "d0 + d1");
        assert_eq!((symbol_0 + dimension_1 + dimension_0).simplify(2, 1).to_string(), "d0 + d1 + s0");
        assert_eq!(((dimension_0 * 3 + dimension_1) - dimension_0 * 3).simplify(2, 0).to_string(), "d1");
        assert_eq!((dimension_0 * 4 + 8).floor_div(constant_4).unwrap().simplify(1, 0).to_string(), "d0 + 2");
        assert_eq!((dimension_0 * 2 + 1).modulo(constant_2).unwrap().simplify(1, 0).to_string(), "1");
        assert_eq!((dimension_0 + 2).modulo(constant_4).unwrap().simplify(1, 0).to_string(), "(d0 + 2) mod 4");
        let half = dimension_0.floor_div(constant_2).unwrap();
        assert_eq!((half + half).simplify(1, 0).to_string(), "(d0 floordiv 2) * 2");

        // Expressions that refer to positions outside of the provided counts are returned unchanged.
        let expression = dimension_1 + dimension_0;
        assert_eq!(expression.simplify(1, 0), expression);
    }

    #[test]
    fn test_affine_expression_flatten() {
        let context = Context::new();
        let dimension_0 = context.dimension_affine_expression(0);
        let dimension_1 = context.dimension_affine_expression(1);
        let symbol_0 = context.symbol_affine_expression(0);
        let expression = dimension_0 * 2 - dimension_1 + symbol_0 * 3 + 7;
        assert_eq!(expression.flatten(2, 1), Some(vec![2, -1, 3, 7]));
        let expression = (dimension_0 * 4 + 4).floor_div(context.constant_affine_expression(2)).unwrap();
        assert_eq!(expression.flatten(1, 0), Some(vec![2, 2]));
        let expression = dimension_0.floor_div(context.constant_affine_expression(2)).unwrap();
        assert_eq!(expression.flatten(1, 0), None);
    }

    /// Recipe for building random affine expressions in property tests.
    #[derive(Clone, Debug)]
    enum Recipe {
        Dimension(usize),
        Symbol(usize),
        Constant(i64),
        Add(Box<Recipe>, Box<Recipe>),
        Mul(Box<Recipe>, i64),
        FloorDiv(Box<Recipe>, i64),
        CeilDiv(Box<Recipe>, i64),
        Mod(Box<Recipe>, i64),
    }

    fn recipe_strategy() -> impl Strategy<Value = Recipe> {
        let leaf = prop_oneof![
            (0..2usize).prop_map(Recipe::Dimension),
            (0..2usize).prop_map(Recipe::Symbol),
            (-8..8i64).prop_map(Recipe::Constant),
        ];
        leaf.prop_recursive(4, 32, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(lhs, rhs)| Recipe::Add(Box::new(lhs), Box::new(rhs))),
                (inner.clone(), -4..4i64).prop_map(|(lhs, rhs)| Recipe::Mul(Box::new(lhs), rhs)),
                (inner.clone(), 1..5i64).prop_map(|(lhs, rhs)| Recipe::FloorDiv(Box::new(lhs), rhs)),
                (inner.clone(), 1..5i64).prop_map(|(lhs, rhs)| Recipe::CeilDiv(Box::new(lhs), rhs)),
                (inner, 1..5i64).prop_map(|(lhs, rhs)| Recipe::Mod(Box::new(lhs), rhs)),
            ]
        })
    }

    fn build<'c>(context: &'c Context, recipe: &Recipe) -> AffineExpressionRef<'c> {
        match recipe {
            Recipe::Dimension(position) => context.dimension_affine_expression(*position).as_ref(),
            Recipe::Symbol(position) => context.symbol_affine_expression(*position).as_ref(),
            Recipe::Constant(value) => context.constant_affine_expression(*value).as_ref(),
            Recipe::Add(lhs, rhs) => build(context, lhs) + build(context, rhs),
            Recipe::Mul(lhs, rhs) => build(context, lhs) * *rhs,
            Recipe::FloorDiv(lhs, rhs) => {
                build(context, lhs).floor_div(context.constant_affine_expression(*rhs)).unwrap()
            }
            Recipe::CeilDiv(lhs, rhs) => {
                build(context, lhs).ceil_div(context.constant_affine_expression(*rhs)).unwrap()
            }
            Recipe::Mod(lhs, rhs) => build(context, lhs).modulo(context.constant_affine_expression(*rhs)).unwrap(),
        }
    }

    proptest! {
        #[test]
        fn test_affine_expression_simplify_preserves_evaluation(
            recipe in recipe_strategy(),
            dimensions in proptest::collection::vec(-20..20i64, 2),
            symbols in proptest::collection::vec(-20..20i64, 2),
        ) {
            let context = Context::new();
            let expression = build(&context, &recipe);
            let simplified = expression.simplify(2, 2);
            prop_assert_eq!(expression.evaluate(&dimensions, &symbols), simplified.evaluate(&dimensions, &symbols));
            prop_assert_eq!(simplified.simplify(2, 2), simplified);
        }
    }
}

use std::fmt::Display;

use crate::dialects::affine::affine_expressions::AffineExpressionStorage;
use crate::dialects::affine::canonicalization::{
    canonicalize_map_and_operands, canonicalize_set_and_operands, compose_affine_map_and_operands,
};
use crate::dialects::affine::legality::{
    affine_scope, is_valid_affine_index_operand, is_valid_dimension, is_valid_symbol,
    verify_dimension_and_symbol_operands,
};
use crate::dialects::affine::value_maps::AffineValueMap;
use crate::dialects::arith;
use crate::operations::OperationProperties;
use crate::support::ceil_div;
use crate::{
    AffineMap, BlockArgumentRef, BlockRef, Context, Error, IntegerSet, LogicalResult, MemRefTypeRef, Operation,
    OperationBuilder, OperationKind, OperationRef, OperationTrait, RegionRef, Type, TypeRef, Value, ValueRef,
    VectorTypeRef,
};

/// Result of folding an affine [`Operation`] without modifying the IR.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FoldResult<'c> {
    /// The operation computes a value that already exists in the IR.
    Value(ValueRef<'c>),

    /// The operation computes a known constant.
    Constant(i64),

    /// The operation computes the same value when its map is replaced by this one (over the same operands).
    Map(AffineMap<'c>),
}

/// [`Operation`]s that apply an [`AffineMap`] to a contiguous tail of their operands (i.e., their *map operands*,
/// which consist of the dimension operands followed by the symbol operands of the map).
pub trait AffineMapOperation<'c>: Operation<'c> {
    /// Position of the first map operand in the operand list of this operation.
    const MAP_OPERANDS_OFFSET: usize;

    /// Returns the [`AffineMap`] of this operation.
    fn map(&self) -> AffineMap<'c> {
        match self.as_ref().properties() {
            OperationProperties::Map(id) => AffineMap { id, context: self.context() },
            _ => unreachable!("affine map operations always have a map"),
        }
    }

    /// Returns the operands that are bound to the dimensions and symbols of [`AffineMapOperation::map`].
    fn map_operands(&self) -> Vec<ValueRef<'c>> {
        self.operands().into_iter().skip(Self::MAP_OPERANDS_OFFSET).collect()
    }

    /// Returns the operands that are bound to the dimensions of [`AffineMapOperation::map`].
    fn dimension_operands(&self) -> Vec<ValueRef<'c>> {
        let mut operands = self.map_operands();
        operands.truncate(self.map().dimension_count());
        operands
    }

    /// Returns the operands that are bound to the symbols of [`AffineMapOperation::map`].
    fn symbol_operands(&self) -> Vec<ValueRef<'c>> {
        self.map_operands().into_iter().skip(self.map().dimension_count()).collect()
    }

    /// Returns the [`AffineValueMap`] that consists of the map, the map operands, and the results of this operation.
    fn value_map(&self) -> AffineValueMap<'c> {
        let results = self.results().into_iter().map(|result| result.as_ref()).collect();
        AffineValueMap::from_parts(self.map(), self.map_operands(), results)
    }
}

/// Affine [`Operation`]s that read from or write to a memref at the position given by their [`AffineMap`].
pub trait AffineMemoryAccess<'c>: AffineMapOperation<'c> {
    /// Position of the accessed memref in the operand list of this operation.
    const MEMREF_OPERAND_INDEX: usize;

    /// Returns the accessed memref.
    fn memref(&self) -> ValueRef<'c> {
        self.operand(Self::MEMREF_OPERAND_INDEX).expect("affine memory accesses always have a memref operand")
    }

    /// Returns the type of the accessed memref.
    fn memref_type(&self) -> MemRefTypeRef<'c> {
        self.memref().r#type().cast::<MemRefTypeRef>().expect("affine memory accesses always access memrefs")
    }

    /// Returns the index operands of this access (i.e., its map operands).
    fn indices(&self) -> Vec<ValueRef<'c>> {
        self.map_operands()
    }
}

fn operand_constants(operands: &[ValueRef<'_>]) -> Vec<Option<i64>> {
    operands.iter().map(|operand| arith::constant_value(*operand)).collect()
}

fn operand_name(value: ValueRef<'_>) -> String {
    format!("%{}", value.id)
}

fn check_map_operands<'c, V: Value<'c>>(
    context: &'c Context,
    map: AffineMap<'c>,
    operands: &[V],
) -> Result<Vec<ValueRef<'c>>, Error> {
    if !std::ptr::eq(map.context(), context) {
        return Err(Error::ContextMismatch);
    }
    if operands.len() != map.input_count() {
        return Err(Error::OperandCountMismatch { expected_count: map.input_count(), actual_count: operands.len() });
    }
    Ok(operands.iter().map(|operand| operand.as_ref()).collect())
}

fn memref_type_of<'c>(operation_name: &str, memref: ValueRef<'c>) -> Result<MemRefTypeRef<'c>, Error> {
    memref.r#type().cast::<MemRefTypeRef>().ok_or_else(|| Error::InvalidOperation {
        message: format!("'{operation_name}' expects a memref operand but got a value of type '{}'", memref.r#type()),
    })
}

/// Creates a detached region with a single block that takes arguments of the provided types and that is terminated
/// by an `affine.yield` operation.
fn terminated_region<'c>(context: &'c Context, argument_types: &[TypeRef<'c>]) -> Result<RegionRef<'c>, Error> {
    let region = context.region();
    let block = region.append_block(context.block(argument_types))?;
    block.append_operation(r#yield::<ValueRef>(context, &[])?)?;
    Ok(region)
}

/// Inserts `operation` right before the terminator of `block`, or at the end of `block` if it has no terminator.
fn insert_before_terminator<'c, O: Operation<'c>>(block: BlockRef<'c>, operation: O) -> Result<O, Error> {
    match block.terminator() {
        Some(_) => block.insert_operation(block.operation_count() - 1, operation),
        None => block.append_operation(operation),
    }
}

fn has_yield_terminator(block: Option<BlockRef<'_>>) -> bool {
    block.and_then(|block| block.terminator()).is_some_and(|terminator| terminator.is::<AffineYieldOperationRef>())
}

fn single_region_block<'c>(region: RegionRef<'c>) -> BlockRef<'c> {
    region.entry_block().expect("affine operation regions always have a block")
}

// ======================================================= APPLY =======================================================

operation_ref!(
    /// Typed handle for `affine.apply` operations, which apply a single-result [`AffineMap`] to their operands and
    /// produce the resulting `index` value.
    AffineApply => AffineApply
);

impl<'c> AffineMapOperation<'c> for AffineApplyOperationRef<'c> {
    const MAP_OPERANDS_OFFSET: usize = 0;
}

impl<'c> AffineApplyOperationRef<'c> {
    /// Returns the value that this operation produces.
    pub fn result_value(&self) -> ValueRef<'c> {
        self.result(0).expect("`affine.apply` operations always have a result").as_ref()
    }

    /// Returns `true` if the result of this operation is a valid dimension within `scope` (i.e., if its dimension
    /// operands are valid dimensions and its symbol operands are valid symbols within `scope`).
    pub fn is_valid_dimension(&self, scope: Option<RegionRef<'c>>) -> bool {
        self.dimension_operands().into_iter().all(|operand| is_valid_dimension(operand, scope))
            && self.symbol_operands().into_iter().all(|operand| is_valid_symbol(operand, scope))
    }

    /// Returns `true` if the result of this operation is a valid symbol within `scope` (i.e., if all of its operands
    /// are valid symbols within `scope`).
    pub fn is_valid_symbol(&self, scope: Option<RegionRef<'c>>) -> bool {
        self.operands().into_iter().all(|operand| is_valid_symbol(operand, scope))
    }

    /// Folds this operation. A map whose result is a bare dimension or symbol folds to the operand that is bound to
    /// it, and a map whose result folds to a constant when given the constant operands of this operation folds to
    /// that constant.
    pub fn fold(&self) -> Option<FoldResult<'c>> {
        let map = self.map();
        let operands = self.map_operands();
        match map.result(0).storage() {
            AffineExpressionStorage::Dimension(position) => operands.get(position).copied().map(FoldResult::Value),
            AffineExpressionStorage::Symbol(position) => {
                operands.get(map.dimension_count() + position).copied().map(FoldResult::Value)
            }
            _ => {
                let values = map.constant_fold(&operand_constants(&operands)).ok().flatten()?;
                values.first().copied().map(FoldResult::Constant)
            }
        }
    }

    /// Verifies that this operation is well formed, emitting an error [`Diagnostic`](crate::Diagnostic) on it if
    /// it is not.
    pub fn verify(&self) -> LogicalResult {
        let map = self.map();
        if self.operand_count() != map.input_count() {
            self.emit_error("operand count and affine map dimension and symbol count must match");
            return LogicalResult::failure();
        }
        if map.result_count() != 1 {
            self.emit_error("mapping must produce one value");
            return LogicalResult::failure();
        }
        if !self.operands().into_iter().all(|operand| operand.r#type().is_index()) {
            self.emit_error("operands must be of type 'index'");
            return LogicalResult::failure();
        }
        verify_dimension_and_symbol_operands(*self, &self.operands(), map.dimension_count())
    }
}

/// Constructs a new detached `affine.apply` operation that applies `map` (which must have exactly one result) to
/// `operands`.
pub fn apply<'c, V: Value<'c>>(
    context: &'c Context,
    map: AffineMap<'c>,
    operands: &[V],
) -> Result<AffineApplyOperationRef<'c>, Error> {
    let operands = check_map_operands(context, map, operands)?;
    if map.result_count() != 1 {
        return Err(Error::ResultCountMismatch { expected_count: 1, actual_count: map.result_count() });
    }
    let operation = OperationBuilder::for_kind(context, OperationKind::AffineApply)
        .with_properties(OperationProperties::Map(map.id))
        .add_operands(&operands)
        .add_result(context.index_type())
        .build()?;
    Ok(operation.cast().expect("invalid arguments to `affine::apply`"))
}

/// Composes `map` with the `affine.apply` operations that define its operands, canonicalizes the result, and
/// constructs a new detached `affine.apply` operation over the composed map and operands. Refer to
/// [`compose_affine_map_and_operands`] for more information.
pub fn composed_apply<'c, V: Value<'c>>(
    context: &'c Context,
    map: AffineMap<'c>,
    operands: &[V],
) -> Result<AffineApplyOperationRef<'c>, Error> {
    let operands = check_map_operands(context, map, operands)?;
    let (map, operands) = compose_affine_map_and_operands(map, &operands)?;
    apply(context, map, &operands)
}

// ======================================================== FOR ========================================================

/// Kind of an [`AffineBound`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AffineBoundKind {
    /// Lower bound. Bounds with multiple results evaluate to the maximum of their results.
    Lower,

    /// Upper bound. Bounds with multiple results evaluate to the minimum of their results.
    Upper,
}

/// Lower or upper bound of an `affine.for` operation: an [`AffineMap`] along with the operands that are bound to its
/// inputs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AffineBound<'c> {
    kind: AffineBoundKind,
    map: AffineMap<'c>,
    operands: Vec<ValueRef<'c>>,
}

impl<'c> AffineBound<'c> {
    /// Returns the [`AffineBoundKind`] of this bound.
    pub fn kind(&self) -> AffineBoundKind {
        self.kind
    }

    /// Returns the [`AffineMap`] of this bound.
    pub fn map(&self) -> AffineMap<'c> {
        self.map
    }

    /// Returns the operands that are bound to the inputs of the map of this bound.
    pub fn operands(&self) -> &[ValueRef<'c>] {
        &self.operands
    }

    /// Returns the [`AffineValueMap`] that this bound represents.
    pub fn value_map(&self) -> AffineValueMap<'c> {
        AffineValueMap::from_parts(self.map, self.operands.clone(), Vec::new())
    }
}

/// Prints bounds the way they appear in `affine.for` operations: single constants are printed as they are, bounds
/// that consist of a single symbol are printed as the operand that is bound to it, and everything else is printed
/// as a map followed by its dimension operands (in parentheses) and its symbol operands (in brackets). Bounds with
/// multiple results are prefixed with `max` (for lower bounds) or `min` (for upper bounds).
impl Display for AffineBound<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let map = self.map;
        if map.result_count() == 1 {
            let result = map.result(0);
            match result.storage() {
                AffineExpressionStorage::Constant(value) if map.input_count() == 0 => {
                    return write!(formatter, "{value}");
                }
                AffineExpressionStorage::Symbol(_) if map.dimension_count() == 0 && map.symbol_count() == 1 => {
                    return write!(formatter, "{}", operand_name(self.operands[0]));
                }
                _ => {}
            }
        } else {
            match self.kind {
                AffineBoundKind::Lower => write!(formatter, "max ")?,
                AffineBoundKind::Upper => write!(formatter, "min ")?,
            }
        }
        let (dimensions, symbols) = self.operands.split_at(map.dimension_count());
        let dimensions = dimensions.iter().map(|operand| operand_name(*operand)).collect::<Vec<_>>();
        write!(formatter, "{map}({})", dimensions.join(", "))?;
        if !symbols.is_empty() {
            let symbols = symbols.iter().map(|operand| operand_name(*operand)).collect::<Vec<_>>();
            write!(formatter, "[{}]", symbols.join(", "))?;
        }
        Ok(())
    }
}

/// Bounds and step of an `affine.for` operation. Folding and canonicalization of loops produce new [`ForBounds`]
/// rather than modifying the loop in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForBounds<'c> {
    pub lower_bound_map: AffineMap<'c>,
    pub lower_bound_operands: Vec<ValueRef<'c>>,
    pub upper_bound_map: AffineMap<'c>,
    pub upper_bound_operands: Vec<ValueRef<'c>>,
    pub step: i64,
}

impl<'c> ForBounds<'c> {
    fn context(&self) -> &'c Context {
        self.lower_bound_map.context()
    }

    /// Returns the constant lower bound, if the lower bound map is a single constant.
    pub fn constant_lower_bound(&self) -> Option<i64> {
        self.lower_bound_map.constant()
    }

    /// Returns the constant upper bound, if the upper bound map is a single constant.
    pub fn constant_upper_bound(&self) -> Option<i64> {
        self.upper_bound_map.constant()
    }

    /// Folds each bound that is not already a single constant but whose results all fold to constants when given
    /// the constant operands of the bound. Lower bounds fold to the maximum of their results and upper bounds to the
    /// minimum. Returns [`None`] if neither bound folds.
    pub fn fold_constant_bounds(&self) -> Result<Option<Self>, Error> {
        fn fold_bound(
            map: AffineMap<'_>,
            operands: &[ValueRef<'_>],
            kind: AffineBoundKind,
        ) -> Result<Option<i64>, Error> {
            let values = map.constant_fold(&operand_constants(operands))?;
            Ok(values.and_then(|values| match kind {
                AffineBoundKind::Lower => values.into_iter().max(),
                AffineBoundKind::Upper => values.into_iter().min(),
            }))
        }

        let context = self.context();
        let mut bounds = self.clone();
        let mut folded = false;
        if self.constant_lower_bound().is_none() {
            if let Some(value) = fold_bound(self.lower_bound_map, &self.lower_bound_operands, AffineBoundKind::Lower)? {
                bounds.lower_bound_map = context.constant_affine_map(value);
                bounds.lower_bound_operands.clear();
                folded = true;
            }
        }
        if self.constant_upper_bound().is_none() {
            if let Some(value) = fold_bound(self.upper_bound_map, &self.upper_bound_operands, AffineBoundKind::Upper)? {
                bounds.upper_bound_map = context.constant_affine_map(value);
                bounds.upper_bound_operands.clear();
                folded = true;
            }
        }
        Ok(folded.then_some(bounds))
    }

    /// Composes each bound with the `affine.apply` operations that define its operands, canonicalizes it, and
    /// removes its duplicate results. Returns [`None`] if neither bound changed.
    pub fn canonicalize(&self) -> Result<Option<Self>, Error> {
        fn canonicalize_bound<'c>(
            map: AffineMap<'c>,
            operands: &[ValueRef<'c>],
        ) -> Result<(AffineMap<'c>, Vec<ValueRef<'c>>), Error> {
            let (map, operands) = compose_affine_map_and_operands(map, operands)?;
            let (map, operands) = canonicalize_map_and_operands(map, &operands)?.unwrap_or((map, operands));
            Ok((map.remove_duplicate_results(), operands))
        }

        let (lower_bound_map, lower_bound_operands) =
            canonicalize_bound(self.lower_bound_map, &self.lower_bound_operands)?;
        let (upper_bound_map, upper_bound_operands) =
            canonicalize_bound(self.upper_bound_map, &self.upper_bound_operands)?;
        let bounds =
            Self { lower_bound_map, lower_bound_operands, upper_bound_map, upper_bound_operands, step: self.step };
        Ok((bounds != *self).then_some(bounds))
    }
}

/// Result of normalizing the step of an `affine.for` operation to `1`. The normalized loop iterates from the same
/// lower bound `lb` to `lb + ceil((ub - lb) / step)` and the original induction variable is recovered from the new
/// one using [`StrideNormalization::induction_variable_map`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrideNormalization<'c> {
    pub bounds: ForBounds<'c>,
    pub induction_variable_map: AffineMap<'c>,
}

operation_ref!(
    /// Typed handle for `affine.for` operations. Their operands are the lower bound operands followed by the upper
    /// bound operands, and their single region contains a block that takes the induction variable as its only
    /// argument and that is terminated by an `affine.yield` operation.
    AffineFor => AffineFor
);

impl<'c> AffineForOperationRef<'c> {
    fn parts(&self) -> (AffineMap<'c>, AffineMap<'c>, i64) {
        match self.as_ref().properties() {
            OperationProperties::Bounds { lower, upper, step } => (
                AffineMap { id: lower, context: self.context },
                AffineMap { id: upper, context: self.context },
                step,
            ),
            _ => unreachable!("`affine.for` operations always have bounds"),
        }
    }

    /// Returns the lower bound map of this loop.
    pub fn lower_bound_map(&self) -> AffineMap<'c> {
        self.parts().0
    }

    /// Returns the upper bound map of this loop.
    pub fn upper_bound_map(&self) -> AffineMap<'c> {
        self.parts().1
    }

    /// Returns the step of this loop (which is always positive).
    pub fn step(&self) -> i64 {
        self.parts().2
    }

    /// Returns the operands that are bound to the inputs of the lower bound map of this loop.
    pub fn lower_bound_operands(&self) -> Vec<ValueRef<'c>> {
        let count = self.lower_bound_map().input_count();
        self.operands().into_iter().take(count).collect()
    }

    /// Returns the operands that are bound to the inputs of the upper bound map of this loop.
    pub fn upper_bound_operands(&self) -> Vec<ValueRef<'c>> {
        let count = self.lower_bound_map().input_count();
        self.operands().into_iter().skip(count).collect()
    }

    /// Returns the lower bound of this loop.
    pub fn lower_bound(&self) -> AffineBound<'c> {
        AffineBound {
            kind: AffineBoundKind::Lower,
            map: self.lower_bound_map(),
            operands: self.lower_bound_operands(),
        }
    }

    /// Returns the upper bound of this loop.
    pub fn upper_bound(&self) -> AffineBound<'c> {
        AffineBound {
            kind: AffineBoundKind::Upper,
            map: self.upper_bound_map(),
            operands: self.upper_bound_operands(),
        }
    }

    /// Returns the bounds and step of this loop.
    pub fn bounds(&self) -> ForBounds<'c> {
        let (lower_bound_map, upper_bound_map, step) = self.parts();
        ForBounds {
            lower_bound_map,
            lower_bound_operands: self.lower_bound_operands(),
            upper_bound_map,
            upper_bound_operands: self.upper_bound_operands(),
            step,
        }
    }

    /// Returns the constant lower bound of this loop, if its lower bound map is a single constant.
    pub fn constant_lower_bound(&self) -> Option<i64> {
        self.lower_bound_map().constant()
    }

    /// Returns the constant upper bound of this loop, if its upper bound map is a single constant.
    pub fn constant_upper_bound(&self) -> Option<i64> {
        self.upper_bound_map().constant()
    }

    /// Returns `true` if both bounds of this loop are single constants.
    pub fn has_constant_bounds(&self) -> bool {
        self.constant_lower_bound().is_some() && self.constant_upper_bound().is_some()
    }

    /// Returns the region that contains the body of this loop.
    pub fn body_region(&self) -> RegionRef<'c> {
        self.region(0).expect("`affine.for` operations always have a body region")
    }

    /// Returns the body of this loop.
    pub fn body(&self) -> BlockRef<'c> {
        single_region_block(self.body_region())
    }

    /// Returns the induction variable of this loop.
    pub fn induction_variable(&self) -> BlockArgumentRef<'c> {
        self.body().argument(0).expect("`affine.for` operations always have an induction variable")
    }

    /// Inserts the provided detached [`Operation`] at the end of the body of this loop (right before its
    /// terminator) and returns it.
    pub fn append_to_body<O: Operation<'c>>(&self, operation: O) -> Result<O, Error> {
        insert_before_terminator(self.body(), operation)
    }

    /// Returns `true` if the body of this loop contains nothing but its terminator.
    pub fn has_empty_body(&self) -> bool {
        self.body().operations().all(|operation| operation.has_trait(OperationTrait::Terminator))
    }

    /// Returns `true` if `value` is defined outside of the body of this loop.
    pub fn is_defined_outside_of_loop<V: Value<'c>>(&self, value: V) -> bool {
        value.parent_region().is_none_or(|region| !self.body_region().is_ancestor_of_region(region))
    }

    /// Returns `true` if the lower and upper bound maps of this loop have the same numbers of dimensions and symbols
    /// and are bound to the same operands.
    pub fn matching_bound_operand_list(&self) -> bool {
        let (lower, upper) = (self.lower_bound_map(), self.upper_bound_map());
        lower.dimension_count() == upper.dimension_count()
            && lower.symbol_count() == upper.symbol_count()
            && self.lower_bound_operands() == self.upper_bound_operands()
    }

    /// Folds the bounds of this loop that fold to constants. Refer to [`ForBounds::fold_constant_bounds`] for more
    /// information.
    pub fn fold_bounds(&self) -> Result<Option<ForBounds<'c>>, Error> {
        self.bounds().fold_constant_bounds()
    }

    /// Canonicalizes the bounds of this loop. Refer to [`ForBounds::canonicalize`] for more information.
    pub fn canonicalize_bounds(&self) -> Result<Option<ForBounds<'c>>, Error> {
        self.bounds().canonicalize()
    }

    /// Folds and then canonicalizes the bounds of this loop, returning the new bounds or [`None`] if neither step
    /// changed anything.
    pub fn fold(&self) -> Result<Option<ForBounds<'c>>, Error> {
        let folded = self.fold_bounds()?;
        let canonicalized = folded.clone().unwrap_or_else(|| self.bounds()).canonicalize()?;
        Ok(canonicalized.or(folded))
    }

    /// Normalizes the step of this loop to `1` when both of its bounds are constants and its step is greater than
    /// `1`. Returns [`None`] when that is not the case.
    pub fn normalize_stride(&self) -> Result<Option<StrideNormalization<'c>>, Error> {
        let step = self.step();
        let (Some(lower), Some(upper)) = (self.constant_lower_bound(), self.constant_upper_bound()) else {
            return Ok(None);
        };
        if step == 1 {
            return Ok(None);
        }
        let context = self.context;
        let Some(span) = upper.checked_sub(lower) else {
            return Ok(None);
        };
        let trip_count = ceil_div(span.max(0), step);
        let Some(normalized_upper) = lower.checked_add(trip_count) else {
            return Ok(None);
        };
        let bounds = ForBounds {
            lower_bound_map: context.constant_affine_map(lower),
            lower_bound_operands: Vec::new(),
            upper_bound_map: context.constant_affine_map(normalized_upper),
            upper_bound_operands: Vec::new(),
            step: 1,
        };
        let d0 = context.dimension_affine_expression(0);
        let induction_variable_map = context.affine_map(1, 0, &[(d0 - lower) * step + lower])?;
        tracing::debug!(step, lower, upper, trip_count, "normalized the stride of an 'affine.for' operation");
        Ok(Some(StrideNormalization { bounds, induction_variable_map }))
    }

    /// Verifies that this loop is well formed, emitting an error [`Diagnostic`](crate::Diagnostic) on it if it is
    /// not.
    pub fn verify(&self) -> LogicalResult {
        if !has_yield_terminator(self.body_region().entry_block()) {
            self.emit_error("expects the body to be terminated by 'affine.yield'");
            return LogicalResult::failure();
        }
        let (lower, upper) = (self.lower_bound(), self.upper_bound());
        if verify_dimension_and_symbol_operands(*self, lower.operands(), lower.map().dimension_count()).is_failure() {
            return LogicalResult::failure();
        }
        verify_dimension_and_symbol_operands(*self, upper.operands(), upper.map().dimension_count())
    }
}

/// Constructs a new detached `affine.for` operation that iterates from the lower bound given by
/// `lower_bound_map` (applied to `lower_bound_operands`) up to (but excluding) the upper bound given by
/// `upper_bound_map` (applied to `upper_bound_operands`), using the provided positive `step`. The body of the loop
/// contains only an `affine.yield` terminator.
pub fn r#for<'c, L: Value<'c>, U: Value<'c>>(
    context: &'c Context,
    lower_bound_map: AffineMap<'c>,
    lower_bound_operands: &[L],
    upper_bound_map: AffineMap<'c>,
    upper_bound_operands: &[U],
    step: i64,
) -> Result<AffineForOperationRef<'c>, Error> {
    if step <= 0 {
        return Err(Error::InvalidStep { step });
    }
    let lower_bound_operands = check_map_operands(context, lower_bound_map, lower_bound_operands)?;
    let upper_bound_operands = check_map_operands(context, upper_bound_map, upper_bound_operands)?;
    if lower_bound_map.result_count() == 0 || upper_bound_map.result_count() == 0 {
        return Err(Error::InvalidOperation {
            message: "'affine.for' bound maps must have at least one result".to_string(),
        });
    }
    let body = terminated_region(context, &[context.index_type().as_ref()])?;
    let operation = OperationBuilder::for_kind(context, OperationKind::AffineFor)
        .with_properties(OperationProperties::Bounds { lower: lower_bound_map.id, upper: upper_bound_map.id, step })
        .add_operands(&lower_bound_operands)
        .add_operands(&upper_bound_operands)
        .add_region(body)
        .build()?;
    Ok(operation.cast().expect("invalid arguments to `affine::for`"))
}

/// Constructs a new detached `affine.for` operation with constant bounds. Refer to [`r#for`] for more information.
pub fn for_constant(
    context: &Context,
    lower_bound: i64,
    upper_bound: i64,
    step: i64,
) -> Result<AffineForOperationRef<'_>, Error> {
    let (lower_bound_map, upper_bound_map) =
        (context.constant_affine_map(lower_bound), context.constant_affine_map(upper_bound));
    r#for::<ValueRef, ValueRef>(context, lower_bound_map, &[], upper_bound_map, &[], step)
}

/// Returns the `affine.for` operation whose induction variable is `value`, if any.
pub fn for_induction_variable_owner<'c, V: Value<'c>>(value: V) -> Option<AffineForOperationRef<'c>> {
    value.as_ref().cast::<BlockArgumentRef>()?.block().parent_operation()?.cast::<AffineForOperationRef>()
}

/// Returns `true` if `value` is the induction variable of an `affine.for` operation.
pub fn is_for_induction_variable<'c, V: Value<'c>>(value: V) -> bool {
    for_induction_variable_owner(value).is_some()
}

// ===================================================== PARALLEL =====================================================

operation_ref!(
    /// Typed handle for `affine.parallel` operations, which represent a band of parallel loops. The `i`-th loop
    /// iterates from the `i`-th result of the lower bounds map to the `i`-th result of the upper bounds map using
    /// the `i`-th step. Their operands are the lower bounds operands followed by the upper bounds operands, and their
    /// single region contains a block that takes one induction variable per loop.
    AffineParallel => AffineParallel
);

impl<'c> AffineParallelOperationRef<'c> {
    fn parts(&self) -> (AffineMap<'c>, AffineMap<'c>, Vec<i64>) {
        match self.as_ref().properties() {
            OperationProperties::ParallelBounds { lower, upper, steps } => (
                AffineMap { id: lower, context: self.context },
                AffineMap { id: upper, context: self.context },
                steps,
            ),
            _ => unreachable!("`affine.parallel` operations always have bounds"),
        }
    }

    /// Returns the number of loops in this band.
    pub fn loop_count(&self) -> usize {
        self.parts().2.len()
    }

    /// Returns the lower bounds map of this band (with one result per loop).
    pub fn lower_bounds_map(&self) -> AffineMap<'c> {
        self.parts().0
    }

    /// Returns the upper bounds map of this band (with one result per loop).
    pub fn upper_bounds_map(&self) -> AffineMap<'c> {
        self.parts().1
    }

    /// Returns the steps of the loops in this band.
    pub fn steps(&self) -> Vec<i64> {
        self.parts().2
    }

    /// Returns the operands that are bound to the inputs of the lower bounds map of this band.
    pub fn lower_bounds_operands(&self) -> Vec<ValueRef<'c>> {
        let count = self.lower_bounds_map().input_count();
        self.operands().into_iter().take(count).collect()
    }

    /// Returns the operands that are bound to the inputs of the upper bounds map of this band.
    pub fn upper_bounds_operands(&self) -> Vec<ValueRef<'c>> {
        let count = self.lower_bounds_map().input_count();
        self.operands().into_iter().skip(count).collect()
    }

    /// Returns the lower bounds of this band as an [`AffineValueMap`].
    pub fn lower_bounds_value_map(&self) -> AffineValueMap<'c> {
        AffineValueMap::from_parts(self.lower_bounds_map(), self.lower_bounds_operands(), Vec::new())
    }

    /// Returns the upper bounds of this band as an [`AffineValueMap`].
    pub fn upper_bounds_value_map(&self) -> AffineValueMap<'c> {
        AffineValueMap::from_parts(self.upper_bounds_map(), self.upper_bounds_operands(), Vec::new())
    }

    /// Returns the ranges of the loops in this band (i.e., their upper bounds minus their lower bounds).
    pub fn ranges_value_map(&self) -> Result<AffineValueMap<'c>, Error> {
        self.upper_bounds_value_map().difference(&self.lower_bounds_value_map())
    }

    /// Returns the ranges of the loops in this band if all of them are known constants.
    pub fn constant_ranges(&self) -> Option<Vec<i64>> {
        self.ranges_value_map().ok()?.map().constant_results()
    }

    /// Returns the region that contains the body of this band.
    pub fn body_region(&self) -> RegionRef<'c> {
        self.region(0).expect("`affine.parallel` operations always have a body region")
    }

    /// Returns the body of this band.
    pub fn body(&self) -> BlockRef<'c> {
        single_region_block(self.body_region())
    }

    /// Returns the induction variables of the loops in this band.
    pub fn induction_variables(&self) -> Vec<BlockArgumentRef<'c>> {
        self.body().arguments().collect()
    }

    /// Inserts the provided detached [`Operation`] at the end of the body of this band (right before its
    /// terminator) and returns it.
    pub fn append_to_body<O: Operation<'c>>(&self, operation: O) -> Result<O, Error> {
        insert_before_terminator(self.body(), operation)
    }

    /// Composes and canonicalizes the lower and upper bounds of this band, returning the new lower and upper bounds
    /// or [`None`] if neither changed. Duplicate results are kept since each result bounds a different loop.
    pub fn canonicalize_bounds(&self) -> Result<Option<(AffineValueMap<'c>, AffineValueMap<'c>)>, Error> {
        let lower = self.lower_bounds_value_map();
        let upper = self.upper_bounds_value_map();
        let new_lower = lower.canonicalize()?;
        let new_upper = upper.canonicalize()?;
        if new_lower.is_none() && new_upper.is_none() {
            return Ok(None);
        }
        Ok(Some((new_lower.unwrap_or(lower), new_upper.unwrap_or(upper))))
    }

    /// Verifies that this band is well formed, emitting an error [`Diagnostic`](crate::Diagnostic) on it if it is
    /// not.
    pub fn verify(&self) -> LogicalResult {
        if !has_yield_terminator(self.body_region().entry_block()) {
            self.emit_error("expects the body to be terminated by 'affine.yield'");
            return LogicalResult::failure();
        }
        let (lower, upper) = (self.lower_bounds_map(), self.upper_bounds_map());
        if verify_dimension_and_symbol_operands(*self, &self.lower_bounds_operands(), lower.dimension_count())
            .is_failure()
        {
            return LogicalResult::failure();
        }
        verify_dimension_and_symbol_operands(*self, &self.upper_bounds_operands(), upper.dimension_count())
    }
}

/// Constructs a new detached `affine.parallel` operation with one loop per entry of `steps`. Both bounds maps must
/// have one result per loop, and all steps must be positive.
pub fn parallel<'c, L: Value<'c>, U: Value<'c>>(
    context: &'c Context,
    lower_bounds_map: AffineMap<'c>,
    lower_bounds_operands: &[L],
    upper_bounds_map: AffineMap<'c>,
    upper_bounds_operands: &[U],
    steps: &[i64],
) -> Result<AffineParallelOperationRef<'c>, Error> {
    if let Some(step) = steps.iter().find(|step| **step <= 0) {
        return Err(Error::InvalidStep { step: *step });
    }
    let lower_bounds_operands = check_map_operands(context, lower_bounds_map, lower_bounds_operands)?;
    let upper_bounds_operands = check_map_operands(context, upper_bounds_map, upper_bounds_operands)?;
    for map in [lower_bounds_map, upper_bounds_map] {
        if map.result_count() != steps.len() {
            return Err(Error::ResultCountMismatch { expected_count: steps.len(), actual_count: map.result_count() });
        }
    }
    let argument_types = vec![context.index_type().as_ref(); steps.len()];
    let body = terminated_region(context, &argument_types)?;
    let operation = OperationBuilder::for_kind(context, OperationKind::AffineParallel)
        .with_properties(OperationProperties::ParallelBounds {
            lower: lower_bounds_map.id,
            upper: upper_bounds_map.id,
            steps: steps.to_vec(),
        })
        .add_operands(&lower_bounds_operands)
        .add_operands(&upper_bounds_operands)
        .add_region(body)
        .build()?;
    Ok(operation.cast().expect("invalid arguments to `affine::parallel`"))
}

// ======================================================== IF ========================================================

operation_ref!(
    /// Typed handle for `affine.if` operations. Their operands are bound to the inputs of their [`IntegerSet`]
    /// condition, and they have a *then* region and an *else* region (which is empty when there is no else branch).
    AffineIf => AffineIf
);

impl<'c> AffineIfOperationRef<'c> {
    /// Returns the condition of this operation.
    pub fn integer_set(&self) -> IntegerSet<'c> {
        match self.as_ref().properties() {
            OperationProperties::Set(id) => IntegerSet { id, context: self.context },
            _ => unreachable!("`affine.if` operations always have an integer set"),
        }
    }

    /// Returns the region that is executed when the condition of this operation holds.
    pub fn then_region(&self) -> RegionRef<'c> {
        self.region(0).expect("`affine.if` operations always have a then region")
    }

    /// Returns the region that is executed when the condition of this operation does not hold, if this operation
    /// has an else branch.
    pub fn else_region(&self) -> Option<RegionRef<'c>> {
        self.region(1).filter(|region| !region.is_empty())
    }

    /// Returns the block of the then region of this operation.
    pub fn then_block(&self) -> BlockRef<'c> {
        single_region_block(self.then_region())
    }

    /// Returns the block of the else region of this operation, if this operation has an else branch.
    pub fn else_block(&self) -> Option<BlockRef<'c>> {
        self.else_region().and_then(|region| region.entry_block())
    }

    /// Inserts the provided detached [`Operation`] at the end of the then branch of this operation (right before its
    /// terminator) and returns it.
    pub fn append_to_then<O: Operation<'c>>(&self, operation: O) -> Result<O, Error> {
        insert_before_terminator(self.then_block(), operation)
    }

    /// Inserts the provided detached [`Operation`] at the end of the else branch of this operation (right before its
    /// terminator) and returns it. Returns an [`Error::InvalidOperation`] if this operation has no else branch.
    pub fn append_to_else<O: Operation<'c>>(&self, operation: O) -> Result<O, Error> {
        let block = self.else_block().ok_or_else(|| Error::InvalidOperation {
            message: "'affine.if' operation has no else branch".to_string(),
        })?;
        insert_before_terminator(block, operation)
    }

    /// Canonicalizes the condition of this operation and its operands. Returns the new condition and operands when
    /// canonicalization dropped operands or promoted dimensions to symbols, and [`None`] otherwise.
    pub fn fold(&self) -> Result<Option<(IntegerSet<'c>, Vec<ValueRef<'c>>)>, Error> {
        let set = self.integer_set();
        let Some((new_set, operands)) = canonicalize_set_and_operands(set, &self.operands())? else {
            return Ok(None);
        };
        if operands.len() < set.input_count() || new_set.symbol_count() > set.symbol_count() {
            Ok(Some((new_set, operands)))
        } else {
            Ok(None)
        }
    }

    /// Verifies that this operation is well formed, emitting an error [`Diagnostic`](crate::Diagnostic) on it if it
    /// is not.
    pub fn verify(&self) -> LogicalResult {
        let set = self.integer_set();
        if self.operand_count() != set.input_count() {
            self.emit_error("operand count and condition integer set dimension and symbol count must match");
            return LogicalResult::failure();
        }
        if !has_yield_terminator(self.then_region().entry_block())
            || self.else_region().is_some_and(|region| !has_yield_terminator(region.entry_block()))
        {
            self.emit_error("expects its regions to be terminated by 'affine.yield'");
            return LogicalResult::failure();
        }
        verify_dimension_and_symbol_operands(*self, &self.operands(), set.dimension_count())
    }
}

/// Constructs a new detached `affine.if` operation that is conditioned on `set` (applied to `operands`). The then
/// branch (and the else branch when `with_else` is `true`) contains only an `affine.yield` terminator.
pub fn r#if<'c, V: Value<'c>>(
    context: &'c Context,
    set: IntegerSet<'c>,
    operands: &[V],
    with_else: bool,
) -> Result<AffineIfOperationRef<'c>, Error> {
    if !std::ptr::eq(set.context(), context) {
        return Err(Error::ContextMismatch);
    }
    if operands.len() != set.input_count() {
        return Err(Error::OperandCountMismatch { expected_count: set.input_count(), actual_count: operands.len() });
    }
    let then_region = terminated_region(context, &[])?;
    let else_region = if with_else { terminated_region(context, &[])? } else { context.region() };
    let operation = OperationBuilder::for_kind(context, OperationKind::AffineIf)
        .with_properties(OperationProperties::Set(set.id))
        .add_operands(operands)
        .add_region(then_region)
        .add_region(else_region)
        .build()?;
    Ok(operation.cast().expect("invalid arguments to `affine::if`"))
}

// ================================================== LOADS & STORES ==================================================

fn verify_memory_access<'c, O: AffineMemoryAccess<'c>>(operation: O) -> LogicalResult {
    let map = operation.map();
    let indices = operation.indices();
    if map.result_count() != operation.memref_type().rank() {
        operation.emit_error("affine map num results must equal memref rank");
        return LogicalResult::failure();
    }
    if map.input_count() != indices.len() {
        operation.emit_error("expects as many subscripts as affine map inputs");
        return LogicalResult::failure();
    }
    let scope = affine_scope(operation);
    for index in indices {
        if !index.r#type().is_index() {
            operation.emit_error("index to load must have 'index' type");
            return LogicalResult::failure();
        }
        if !is_valid_affine_index_operand(index, scope) {
            operation.emit_error("index must be a dimension or symbol identifier");
            return LogicalResult::failure();
        }
    }
    LogicalResult::success()
}

fn build_memory_access<'c, O: Operation<'c>>(
    context: &'c Context,
    kind: OperationKind,
    leading_operands: &[ValueRef<'c>],
    map: AffineMap<'c>,
    indices: &[ValueRef<'c>],
    result_type: Option<TypeRef<'c>>,
) -> Result<O, Error> {
    let mut builder = OperationBuilder::for_kind(context, kind)
        .with_properties(OperationProperties::Map(map.id))
        .add_operands(leading_operands)
        .add_operands(indices);
    if let Some(result_type) = result_type {
        builder = builder.add_result(result_type);
    }
    Ok(builder.build()?.cast().expect("invalid arguments to affine memory access constructor"))
}

operation_ref!(
    /// Typed handle for `affine.load` operations. Their operands are the accessed memref followed by the indices
    /// that are bound to the inputs of their map, and the results of their map are the accessed position.
    AffineLoad => AffineLoad
);

impl<'c> AffineMapOperation<'c> for AffineLoadOperationRef<'c> {
    const MAP_OPERANDS_OFFSET: usize = 1;
}

impl<'c> AffineMemoryAccess<'c> for AffineLoadOperationRef<'c> {
    const MEMREF_OPERAND_INDEX: usize = 0;
}

impl<'c> AffineLoadOperationRef<'c> {
    /// Verifies that this operation is well formed, emitting an error [`Diagnostic`](crate::Diagnostic) on it if it
    /// is not.
    pub fn verify(&self) -> LogicalResult {
        let result_type = self.result(0).map(|result| result.r#type());
        if result_type != Some(self.memref_type().element_type()) {
            self.emit_error("result type must match element type of memref");
            return LogicalResult::failure();
        }
        verify_memory_access(*self)
    }
}

/// Constructs a new detached `affine.load` operation that reads an element of `memref` at the position given by
/// applying `map` to `indices`.
pub fn load<'c, M: Value<'c>, V: Value<'c>>(
    context: &'c Context,
    memref: M,
    map: AffineMap<'c>,
    indices: &[V],
) -> Result<AffineLoadOperationRef<'c>, Error> {
    let memref = memref.as_ref();
    let memref_type = memref_type_of("affine.load", memref)?;
    let indices = check_map_operands(context, map, indices)?;
    let element_type = Some(memref_type.element_type());
    build_memory_access(context, OperationKind::AffineLoad, &[memref], map, &indices, element_type)
}

operation_ref!(
    /// Typed handle for `affine.store` operations. Their operands are the stored value, the accessed memref, and the
    /// indices that are bound to the inputs of their map.
    AffineStore => AffineStore
);

impl<'c> AffineMapOperation<'c> for AffineStoreOperationRef<'c> {
    const MAP_OPERANDS_OFFSET: usize = 2;
}

impl<'c> AffineMemoryAccess<'c> for AffineStoreOperationRef<'c> {
    const MEMREF_OPERAND_INDEX: usize = 1;
}

impl<'c> AffineStoreOperationRef<'c> {
    /// Returns the value that this operation stores.
    pub fn value_to_store(&self) -> ValueRef<'c> {
        self.operand(0).expect("`affine.store` operations always have a value to store")
    }

    /// Verifies that this operation is well formed, emitting an error [`Diagnostic`](crate::Diagnostic) on it if it
    /// is not.
    pub fn verify(&self) -> LogicalResult {
        if self.value_to_store().r#type() != self.memref_type().element_type() {
            self.emit_error("value to store must have the same type as memref element type");
            return LogicalResult::failure();
        }
        verify_memory_access(*self)
    }
}

/// Constructs a new detached `affine.store` operation that writes `value` into `memref` at the position given by
/// applying `map` to `indices`.
pub fn store<'c, S: Value<'c>, M: Value<'c>, V: Value<'c>>(
    context: &'c Context,
    value: S,
    memref: M,
    map: AffineMap<'c>,
    indices: &[V],
) -> Result<AffineStoreOperationRef<'c>, Error> {
    let memref = memref.as_ref();
    memref_type_of("affine.store", memref)?;
    let indices = check_map_operands(context, map, indices)?;
    build_memory_access(context, OperationKind::AffineStore, &[value.as_ref(), memref], map, &indices, None)
}

fn verify_vector_memory_access<'c, O: AffineMemoryAccess<'c>>(
    operation: O,
    vector_type: Option<VectorTypeRef<'c>>,
) -> LogicalResult {
    match vector_type {
        Some(vector_type) if vector_type.element_type() == operation.memref_type().element_type() => {
            verify_memory_access(operation)
        }
        _ => {
            operation.emit_error("requires memref and vector types of the same elemental type");
            LogicalResult::failure()
        }
    }
}

operation_ref!(
    /// Typed handle for `affine.vector_load` operations, which read a vector of consecutive elements from a memref.
    /// Their operands are laid out like those of `affine.load` operations.
    AffineVectorLoad => AffineVectorLoad
);

impl<'c> AffineMapOperation<'c> for AffineVectorLoadOperationRef<'c> {
    const MAP_OPERANDS_OFFSET: usize = 1;
}

impl<'c> AffineMemoryAccess<'c> for AffineVectorLoadOperationRef<'c> {
    const MEMREF_OPERAND_INDEX: usize = 0;
}

impl<'c> AffineVectorLoadOperationRef<'c> {
    /// Returns the type of the vector that this operation reads.
    pub fn vector_type(&self) -> VectorTypeRef<'c> {
        self.result(0)
            .and_then(|result| result.r#type().cast::<VectorTypeRef>())
            .expect("`affine.vector_load` operations always produce a vector")
    }

    /// Verifies that this operation is well formed, emitting an error [`Diagnostic`](crate::Diagnostic) on it if it
    /// is not.
    pub fn verify(&self) -> LogicalResult {
        verify_vector_memory_access(*self, Some(self.vector_type()))
    }
}

/// Constructs a new detached `affine.vector_load` operation that reads a vector of type `vector_type` from `memref`
/// starting at the position given by applying `map` to `indices`.
pub fn vector_load<'c, M: Value<'c>, V: Value<'c>>(
    context: &'c Context,
    vector_type: VectorTypeRef<'c>,
    memref: M,
    map: AffineMap<'c>,
    indices: &[V],
) -> Result<AffineVectorLoadOperationRef<'c>, Error> {
    let memref = memref.as_ref();
    memref_type_of("affine.vector_load", memref)?;
    let indices = check_map_operands(context, map, indices)?;
    let result_type = Some(vector_type.as_ref());
    build_memory_access(context, OperationKind::AffineVectorLoad, &[memref], map, &indices, result_type)
}

operation_ref!(
    /// Typed handle for `affine.vector_store` operations, which write a vector into consecutive elements of a
    /// memref. Their operands are laid out like those of `affine.store` operations.
    AffineVectorStore => AffineVectorStore
);

impl<'c> AffineMapOperation<'c> for AffineVectorStoreOperationRef<'c> {
    const MAP_OPERANDS_OFFSET: usize = 2;
}

impl<'c> AffineMemoryAccess<'c> for AffineVectorStoreOperationRef<'c> {
    const MEMREF_OPERAND_INDEX: usize = 1;
}

impl<'c> AffineVectorStoreOperationRef<'c> {
    /// Returns the vector that this operation stores.
    pub fn value_to_store(&self) -> ValueRef<'c> {
        self.operand(0).expect("`affine.vector_store` operations always have a value to store")
    }

    /// Verifies that this operation is well formed, emitting an error [`Diagnostic`](crate::Diagnostic) on it if it
    /// is not.
    pub fn verify(&self) -> LogicalResult {
        verify_vector_memory_access(*self, self.value_to_store().r#type().cast::<VectorTypeRef>())
    }
}

/// Constructs a new detached `affine.vector_store` operation that writes the vector `value` into `memref` starting
/// at the position given by applying `map` to `indices`.
pub fn vector_store<'c, S: Value<'c>, M: Value<'c>, V: Value<'c>>(
    context: &'c Context,
    value: S,
    memref: M,
    map: AffineMap<'c>,
    indices: &[V],
) -> Result<AffineVectorStoreOperationRef<'c>, Error> {
    let memref = memref.as_ref();
    memref_type_of("affine.vector_store", memref)?;
    let indices = check_map_operands(context, map, indices)?;
    build_memory_access(context, OperationKind::AffineVectorStore, &[value.as_ref(), memref], map, &indices, None)
}

// ===================================================== MIN & MAX =====================================================

fn fold_min_max<'c, O: AffineMapOperation<'c>>(operation: &O, kind: OperationKind) -> Option<FoldResult<'c>> {
    let map = operation.map();
    let (folded_map, values) = map.partial_constant_fold(&operand_constants(&operation.map_operands())).ok()?;
    match values {
        Some(values) => {
            let value = match kind {
                OperationKind::AffineMin => values.into_iter().min(),
                _ => values.into_iter().max(),
            };
            value.map(FoldResult::Constant)
        }
        None => (folded_map != map).then_some(FoldResult::Map(folded_map)),
    }
}

fn canonicalize_min_max<'c, O: AffineMapOperation<'c>>(
    operation: &O,
) -> Result<Option<(AffineMap<'c>, Vec<ValueRef<'c>>)>, Error> {
    let (map, operands) = (operation.map(), operation.map_operands());
    let (new_map, new_operands) = compose_affine_map_and_operands(map, &operands)?;
    let (new_map, new_operands) =
        canonicalize_map_and_operands(new_map, &new_operands)?.unwrap_or((new_map, new_operands));
    let new_map = new_map.remove_duplicate_results();
    if new_map == map && new_operands == operands {
        return Ok(None);
    }
    Ok(Some((new_map, new_operands)))
}

fn verify_min_max<'c, O: AffineMapOperation<'c>>(operation: O) -> LogicalResult {
    let map = operation.map();
    if operation.operand_count() != map.input_count() {
        operation.emit_error("operand count and affine map dimension and symbol count must match");
        return LogicalResult::failure();
    }
    verify_dimension_and_symbol_operands(operation, &operation.map_operands(), map.dimension_count())
}

fn build_min_max<'c, O: Operation<'c>, V: Value<'c>>(
    context: &'c Context,
    kind: OperationKind,
    map: AffineMap<'c>,
    operands: &[V],
) -> Result<O, Error> {
    let operands = check_map_operands(context, map, operands)?;
    if map.result_count() == 0 {
        let name = kind.name().unwrap_or_default();
        return Err(Error::InvalidOperation {
            message: format!("'{name}' requires an affine map with at least one result"),
        });
    }
    let operation = OperationBuilder::for_kind(context, kind)
        .with_properties(OperationProperties::Map(map.id))
        .add_operands(&operands)
        .add_result(context.index_type())
        .build()?;
    Ok(operation.cast().expect("invalid arguments to `affine.min` or `affine.max` constructor"))
}

operation_ref!(
    /// Typed handle for `affine.min` operations, which compute the minimum of the results of their map.
    AffineMin => AffineMin
);

impl<'c> AffineMapOperation<'c> for AffineMinOperationRef<'c> {
    const MAP_OPERANDS_OFFSET: usize = 0;
}

impl<'c> AffineMinOperationRef<'c> {
    /// Folds this operation to a constant when all results of its map fold to constants, or to a partially folded
    /// map when only some of them do.
    pub fn fold(&self) -> Option<FoldResult<'c>> {
        fold_min_max(self, OperationKind::AffineMin)
    }

    /// Composes and canonicalizes the map and operands of this operation and removes the duplicate results of its
    /// map. Returns [`None`] if nothing changed.
    pub fn canonicalize(&self) -> Result<Option<(AffineMap<'c>, Vec<ValueRef<'c>>)>, Error> {
        canonicalize_min_max(self)
    }

    pub fn verify(&self) -> LogicalResult {
        verify_min_max(*self)
    }
}

/// Constructs a new detached `affine.min` operation over `map` (which must have at least one result) applied to
/// `operands`.
pub fn min<'c, V: Value<'c>>(
    context: &'c Context,
    map: AffineMap<'c>,
    operands: &[V],
) -> Result<AffineMinOperationRef<'c>, Error> {
    build_min_max(context, OperationKind::AffineMin, map, operands)
}

operation_ref!(
    /// Typed handle for `affine.max` operations, which compute the maximum of the results of their map.
    AffineMax => AffineMax
);

impl<'c> AffineMapOperation<'c> for AffineMaxOperationRef<'c> {
    const MAP_OPERANDS_OFFSET: usize = 0;
}

impl<'c> AffineMaxOperationRef<'c> {
    /// Folds this operation. Refer to [`AffineMinOperationRef::fold`] for more information.
    pub fn fold(&self) -> Option<FoldResult<'c>> {
        fold_min_max(self, OperationKind::AffineMax)
    }

    /// Canonicalizes this operation. Refer to [`AffineMinOperationRef::canonicalize`] for more information.
    pub fn canonicalize(&self) -> Result<Option<(AffineMap<'c>, Vec<ValueRef<'c>>)>, Error> {
        canonicalize_min_max(self)
    }

    pub fn verify(&self) -> LogicalResult {
        verify_min_max(*self)
    }
}

/// Constructs a new detached `affine.max` operation over `map` (which must have at least one result) applied to
/// `operands`.
pub fn max<'c, V: Value<'c>>(
    context: &'c Context,
    map: AffineMap<'c>,
    operands: &[V],
) -> Result<AffineMaxOperationRef<'c>, Error> {
    build_min_max(context, OperationKind::AffineMax, map, operands)
}

// ======================================================= YIELD =======================================================

operation_ref!(
    /// Typed handle for `affine.yield` operations, which terminate the regions of the other affine operations.
    AffineYield => AffineYield
);

/// Constructs a new detached `affine.yield` operation that yields `operands`.
pub fn r#yield<'c, V: Value<'c>>(context: &'c Context, operands: &[V]) -> Result<AffineYieldOperationRef<'c>, Error> {
    let operation = OperationBuilder::for_kind(context, OperationKind::AffineYield).add_operands(operands).build()?;
    Ok(operation.cast().expect("invalid arguments to `affine::yield`"))
}

/// Returns `true` if `operation` is one of the affine operations that read from or write to memory.
pub(crate) fn is_affine_memory_access(operation: OperationRef<'_>) -> bool {
    matches!(
        operation.kind(),
        OperationKind::AffineLoad
            | OperationKind::AffineStore
            | OperationKind::AffineVectorLoad
            | OperationKind::AffineVectorStore
    )
}

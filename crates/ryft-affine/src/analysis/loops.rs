//! Analyses over `affine.for` loops: trip counts and their divisors, invariance and contiguity of memory accesses
//! along induction variables, vectorizability of loop bodies, and validity of operation-wise shift schedules.
//!
//! None of these analyses modify the IR. Facts that cannot be determined statically are reported as [`None`], and
//! checks that cannot prove a property conservatively report that it does not hold.

use crate::dialects::affine::affine_expressions::flatten_affine_expression;
use crate::dialects::affine::{
    AffineApplyOperationRef, AffineForOperationRef, AffineLoadOperationRef, AffineMapOperation, AffineMemoryAccess,
    AffineStoreOperationRef, AffineValueMap, for_induction_variable_owner, fully_compose_affine_map_and_operands,
};
use crate::dialects::arith;
use crate::support::{ceil_div, greatest_common_divisor};
use crate::{
    AffineExpression, AffineExpressionRef, AffineMap, Error, Operation, OperationKind, OperationRef, Type, Value,
    ValueRef, VectorTypeRef, WalkOrder, WalkResult,
};

// ==================================================== TRIP COUNTS ===================================================

/// Returns the trip count of `loop` as an [`AffineMap`] along with the operands bound to its inputs. The map has one
/// result per upper bound of the loop and the actual trip count is the minimum over these results. Loops with
/// constant bounds produce a zero-input constant map (clamped at zero). Returns [`None`] when the trip count cannot
/// be expressed as an affine map, which is the case when the lower bound has more than one result.
pub fn trip_count_map_and_operands<'c>(
    r#loop: AffineForOperationRef<'c>,
) -> Result<Option<(AffineMap<'c>, Vec<ValueRef<'c>>)>, Error> {
    let context = r#loop.context();
    let step = r#loop.step();
    if let (Some(lower_bound), Some(upper_bound)) = (r#loop.constant_lower_bound(), r#loop.constant_upper_bound()) {
        let span = upper_bound.saturating_sub(lower_bound).max(0);
        return Ok(Some((context.constant_affine_map(ceil_div(span, step)), Vec::new())));
    }

    let lower_bound_map = r#loop.lower_bound_map();
    if lower_bound_map.result_count() != 1 {
        return Ok(None);
    }

    // The single lower bound is subtracted from every upper bound.
    let upper_bound = r#loop.upper_bound().value_map();
    let splat = vec![lower_bound_map.result(0); upper_bound.result_count()];
    let (dimension_count, symbol_count) = (lower_bound_map.dimension_count(), lower_bound_map.symbol_count());
    let lower_bound_map = context.affine_map(dimension_count, symbol_count, &splat)?;
    let lower_bound = AffineValueMap::new(lower_bound_map, &r#loop.lower_bound_operands())?;
    let difference = upper_bound.difference(&lower_bound)?;
    let step = context.constant_affine_expression(step);
    let results = difference.map().results().map(|result| result.ceil_div(step)).collect::<Result<Vec<_>, _>>()?;
    let map = context.affine_map(difference.dimension_count(), difference.symbol_count(), &results)?.simplify();
    tracing::trace!(operation = %r#loop, trip_count = %map, "computed trip count map");
    Ok(Some((map, difference.operands().to_vec())))
}

/// Folds the results of a trip count map against the constant operands that are bound to its inputs.
fn folded_trip_count_map<'c>(r#loop: AffineForOperationRef<'c>) -> Option<AffineMap<'c>> {
    let (map, operands) = trip_count_map_and_operands(r#loop).ok()??;
    let constants = operands.iter().map(|operand| arith::constant_value(*operand)).collect::<Vec<_>>();
    let (folded, _) = map.partial_constant_fold(&constants).ok()?;
    Some(folded)
}

/// Returns the number of iterations that `loop` executes if it is a known constant, and [`None`] otherwise. When the
/// loop has multiple upper bounds, the trip count is the minimum over the trip counts induced by each of them.
pub fn constant_trip_count(r#loop: AffineForOperationRef<'_>) -> Option<u64> {
    let map = folded_trip_count_map(r#loop)?;
    let trip_counts = map.results().map(|result| result.constant_value()).collect::<Option<Vec<_>>>()?;
    trip_counts.into_iter().map(|trip_count| u64::try_from(trip_count).unwrap_or(0)).min()
}

/// Returns the largest known divisor of the trip count of `loop`. Loops that are known to execute no iterations are
/// divisible by anything and so their divisor is [`u64::MAX`]. Returns `1` when nothing is known about the trip
/// count.
pub fn largest_divisor_of_trip_count(r#loop: AffineForOperationRef<'_>) -> u64 {
    let Some(map) = folded_trip_count_map(r#loop) else {
        return 1;
    };
    let divisor = map
        .results()
        .map(|result| match result.constant_value() {
            Some(trip_count) if trip_count <= 0 => u64::MAX,
            Some(trip_count) => trip_count.unsigned_abs(),
            None => result.largest_known_divisor(),
        })
        .fold(0, greatest_common_divisor);
    if divisor == 0 { 1 } else { divisor }
}

// ==================================================== INVARIANCE ====================================================

/// Returns the `affine.apply` operations that are transitively reachable from `value` through the operands of
/// `affine.apply` operations (including the one that defines `value` itself).
fn reachable_affine_applies<'c>(value: ValueRef<'c>) -> Vec<AffineApplyOperationRef<'c>> {
    let mut applies = Vec::new();
    let mut worklist = vec![value];
    while let Some(value) = worklist.pop() {
        let Some(apply) = value.defining_operation().and_then(|operation| operation.cast::<AffineApplyOperationRef>())
        else {
            continue;
        };
        if !applies.contains(&apply) {
            applies.push(apply);
            worklist.extend(apply.operands());
        }
    }
    applies
}

/// Returns the `affine.for` operations (other than `loop` itself) that use the induction variable of `loop` as one of
/// their bound operands.
fn dependent_loops<'c>(r#loop: AffineForOperationRef<'c>) -> Vec<AffineForOperationRef<'c>> {
    let mut loops = Vec::new();
    for user in r#loop.induction_variable().users() {
        if let Some(dependent) = user.cast::<AffineForOperationRef>() {
            if dependent != r#loop && !loops.contains(&dependent) {
                loops.push(dependent);
            }
        }
    }
    loops
}

/// Returns `true` if `index` is known to be invariant along `induction_variable`. The check looks through at most
/// one `affine.apply` operation: indices that are computed by a chain of `affine.apply` operations are expected to
/// have been composed into a single one first, and are otherwise conservatively reported as varying (along with a
/// remark diagnostic on the first `affine.apply` operation in the chain).
pub fn is_access_index_invariant<'c, I: Value<'c>, V: Value<'c>>(induction_variable: I, index: V) -> bool {
    let (induction_variable, index) = (induction_variable.as_ref(), index.as_ref());
    match reachable_affine_applies(index).as_slice() {
        [] => index != induction_variable,
        [apply] => !apply.value_map().is_function_of(0, induction_variable),
        [apply, ..] => {
            apply.emit_remark(
                "affine map composition must have run: there should be at most one 'affine.apply' operation, \
                conservatively returning false",
            );
            false
        }
    }
}

/// Returns the subset of `indices` that are invariant along `induction_variable`, in order. Refer to
/// [`is_access_index_invariant`] for more information.
pub fn invariant_accesses<'c, I: Value<'c>, V: Value<'c>>(induction_variable: I, indices: &[V]) -> Vec<ValueRef<'c>> {
    indices
        .iter()
        .map(|index| index.as_ref())
        .filter(|index| is_access_index_invariant(induction_variable, *index))
        .collect()
}

/// Returns `true` if every index of `access` is invariant along the induction variable of `loop`. Loops whose bounds
/// depend on that induction variable vary along with it and so the access must also be invariant along their
/// induction variables.
pub fn is_invariant_access<'c, A: AffineMemoryAccess<'c>>(access: &A, r#loop: AffineForOperationRef<'c>) -> bool {
    let induction_variable = r#loop.induction_variable();
    access.indices().into_iter().all(|index| is_access_index_invariant(induction_variable, index))
        && dependent_loops(r#loop).into_iter().all(|dependent| is_invariant_access(access, dependent))
}

// ==================================================== CONTIGUITY ====================================================

/// Contiguity of a memory access along an induction variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AccessContiguity {
    /// The accessed position does not depend on the induction variable.
    Invariant,

    /// Exactly one memref dimension varies with unit stride along the induction variable. Dimensions are numbered
    /// from the innermost one (i.e., `0` is the fastest varying dimension of the memref).
    Varying { dimension: usize },
}

impl AccessContiguity {
    /// Combines two contiguity verdicts for the same induction variable. [`AccessContiguity::Invariant`] is neutral
    /// and two varying verdicts are only compatible if they refer to the same dimension.
    fn merge(self, other: Self) -> Option<Self> {
        match (self, other) {
            (Self::Invariant, other) | (other, Self::Invariant) => Some(other),
            (Self::Varying { dimension }, Self::Varying { dimension: other_dimension }) => {
                (dimension == other_dimension).then_some(self)
            }
        }
    }
}

/// Returns the [`AccessContiguity`] of `access` along `induction_variable`, or [`None`] if the access is not
/// contiguous (i.e., if more than one memref dimension varies along the induction variable, if one varies with a
/// non-unit stride, or if the induction variable appears inside a division or modulus). Accesses to memrefs with
/// non-identity layouts are not supported and result in an error diagnostic.
pub fn is_contiguous_access<'c, V: Value<'c>, A: AffineMemoryAccess<'c>>(
    induction_variable: V,
    access: &A,
) -> Option<AccessContiguity> {
    let induction_variable = induction_variable.as_ref();
    let memref_type = access.memref_type();
    if !memref_type.has_identity_layout() {
        access.emit_error("contiguity analysis does not support memrefs with non-identity layouts");
        return None;
    }

    let (map, operands) = fully_compose_affine_map_and_operands(access.map(), &access.indices()).ok()?;
    let (dimension_count, symbol_count) = (map.dimension_count(), map.symbol_count());
    let mut varying_result = None;
    if let Some(position) = operands.iter().position(|operand| *operand == induction_variable) {
        let depends_on_induction_variable = |expression: AffineExpressionRef<'c>| {
            if position < dimension_count {
                expression.is_function_of_dimension(position)
            } else {
                expression.is_function_of_symbol(position - dimension_count)
            }
        };
        for (index, result) in map.results().enumerate() {
            if !depends_on_induction_variable(result) {
                continue;
            }
            let flattened = flatten_affine_expression(result, dimension_count, symbol_count)?;
            let local_coefficients = &flattened.coefficients[dimension_count + symbol_count..];
            if flattened
                .locals
                .iter()
                .zip(local_coefficients)
                .any(|(local, coefficient)| *coefficient != 0 && depends_on_induction_variable(*local))
            {
                return None;
            }
            match flattened.coefficients[position] {
                0 => continue,
                1 | -1 => {}
                _ => return None,
            }
            if varying_result.is_some() {
                return None;
            }
            varying_result = Some(index);
        }
    }

    let contiguity = match varying_result {
        Some(index) => AccessContiguity::Varying { dimension: memref_type.rank().checked_sub(index + 1)? },
        None => AccessContiguity::Invariant,
    };
    let Some(owner) = for_induction_variable_owner(induction_variable) else {
        return Some(contiguity);
    };
    dependent_loops(owner).into_iter().try_fold(contiguity, |contiguity, dependent| {
        contiguity.merge(is_contiguous_access(dependent.induction_variable(), access)?)
    })
}

// ================================================== VECTORIZATION ===================================================

/// Returns the [`AccessContiguity`] of a scalar memory access, or [`None`] if it accesses a memref of vectors or is
/// not contiguous.
fn scalar_access_contiguity<'c, V: Value<'c>, A: AffineMemoryAccess<'c>>(
    induction_variable: V,
    access: &A,
) -> Option<AccessContiguity> {
    if access.memref_type().element_type().is::<VectorTypeRef>() {
        return None;
    }
    is_contiguous_access(induction_variable, access)
}

/// Returns the memref dimension along which the body of `loop` can be vectorized, or [`None`] if it cannot be
/// vectorized. The body must not contain `affine.if` operations, operations with regions other than nested
/// `affine.for` operations, or operations that already perform vector memory transfers. Every `affine.load` and
/// `affine.store` operation in it must access a memref of scalars contiguously along the induction variable of
/// `loop`, and all of these accesses must agree on the varying dimension (invariant accesses agree with any
/// dimension). The optional `predicate` must also accept every such access.
pub fn is_vectorizable_loop_body<'c>(
    r#loop: AffineForOperationRef<'c>,
    predicate: Option<&dyn Fn(AffineForOperationRef<'c>, OperationRef<'c>) -> bool>,
) -> Option<AccessContiguity> {
    let mut accesses = Vec::new();
    let completed = r#loop.walk(WalkOrder::PreOrder, |operation| {
        if operation == r#loop.as_ref() {
            return WalkResult::Advance;
        }
        match operation.kind() {
            OperationKind::AffineIf | OperationKind::AffineVectorLoad | OperationKind::AffineVectorStore => {
                WalkResult::Interrupt
            }
            OperationKind::AffineLoad | OperationKind::AffineStore => {
                accesses.push(operation);
                WalkResult::Advance
            }
            OperationKind::AffineFor => WalkResult::Advance,
            _ if operation.region_count() > 0 => WalkResult::Interrupt,
            _ => WalkResult::Advance,
        }
    });
    if !completed {
        tracing::debug!(operation = %r#loop, "loop body contains operations that prevent vectorization");
        return None;
    }

    let induction_variable = r#loop.induction_variable();
    let mut contiguity = AccessContiguity::Invariant;
    for operation in accesses {
        let access_contiguity = if let Some(load) = operation.cast::<AffineLoadOperationRef>() {
            scalar_access_contiguity(induction_variable, &load)
        } else {
            operation
                .cast::<AffineStoreOperationRef>()
                .and_then(|store| scalar_access_contiguity(induction_variable, &store))
        };
        contiguity = contiguity.merge(access_contiguity?)?;
        if predicate.is_some_and(|predicate| !predicate(r#loop, operation)) {
            return None;
        }
    }
    Some(contiguity)
}

// ===================================================== SHIFTS =======================================================

/// Returns `true` if shifting each operation in the body of `loop` by the corresponding entry of `shifts` preserves
/// the dependencies between them (i.e., if every operation in the body has the same shift as all of the operations in
/// the body that use its results, where uses nested inside other operations of the body are attributed to those
/// operations). Returns an [`Error::ShiftCountMismatch`] if `shifts` does not contain exactly one entry per body
/// operation (including the terminator).
pub fn is_opwise_shift_valid(r#loop: AffineForOperationRef<'_>, shifts: &[u64]) -> Result<bool, Error> {
    let body = r#loop.body();
    if shifts.len() != body.operation_count() {
        return Err(Error::ShiftCountMismatch { expected_count: body.operation_count(), actual_count: shifts.len() });
    }
    for (operation, shift) in body.operations().zip(shifts) {
        for result in operation.results() {
            for user in result.users() {
                let user_shift = body
                    .find_ancestor_operation_in_block(user)
                    .and_then(|ancestor| body.operation_index(ancestor))
                    .map(|index| shifts[index]);
                if user_shift.is_some_and(|user_shift| user_shift != *shift) {
                    tracing::debug!(producer = %operation, consumer = %user, "shift breaks a dependence");
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

//! Composition and canonicalization of [`AffineMap`]s and [`IntegerSet`]s together with the operands that are bound
//! to their inputs. Composition folds the maps of `affine.apply` operations that define operands into the map that
//! uses them, while canonicalization removes unused, duplicate, and constant operands, and promotes dimension operands
//! that are valid symbols to symbols.

use crate::dialects::affine::affine_expressions::AffineExpressionStorage;
use crate::dialects::affine::legality::is_valid_symbol_in_own_scope;
use crate::dialects::affine::operations::{AffineApplyOperationRef, AffineMapOperation};
use crate::dialects::arith;
use crate::{
    AffineExpression, AffineExpressionRef, AffineMap, AffineMapOrSet, Error, IntegerSet, Operation, Value, ValueRef,
};

fn check_operand_count<'c, M: AffineMapOrSet<'c>>(map_or_set: &M, operand_count: usize) -> Result<(), Error> {
    if operand_count != map_or_set.input_count() {
        return Err(Error::OperandCountMismatch {
            expected_count: map_or_set.input_count(),
            actual_count: operand_count,
        });
    }
    Ok(())
}

/// Returns the `affine.apply` operation that defines `value`, if any.
fn defining_apply<'c>(value: ValueRef<'c>) -> Option<AffineApplyOperationRef<'c>> {
    value.defining_operation().and_then(|operation| operation.cast::<AffineApplyOperationRef>())
}

/// Returns the position of `operand` in `operands`, appending it first if it is not already there.
fn position_of<'c>(operands: &mut Vec<ValueRef<'c>>, operand: ValueRef<'c>) -> usize {
    match operands.iter().position(|existing| *existing == operand) {
        Some(position) => position,
        None => {
            operands.push(operand);
            operands.len() - 1
        }
    }
}

/// Returns two lists of flags that indicate which dimensions and which symbols of `map_or_set` are used by at least
/// one of its expressions.
fn used_inputs<'c, M: AffineMapOrSet<'c>>(map_or_set: &M) -> (Vec<bool>, Vec<bool>) {
    let mut dimensions = vec![false; map_or_set.dimension_count()];
    let mut symbols = vec![false; map_or_set.symbol_count()];
    for expression in map_or_set.expressions() {
        expression.walk(|expression| match expression.storage() {
            AffineExpressionStorage::Dimension(position) => {
                if let Some(used) = dimensions.get_mut(position) {
                    *used = true;
                }
            }
            AffineExpressionStorage::Symbol(position) => {
                if let Some(used) = symbols.get_mut(position) {
                    *used = true;
                }
            }
            _ => {}
        });
    }
    (dimensions, symbols)
}

/// Single canonicalization pass. Symbols are processed before dimensions so that dimensions which get promoted to
/// symbols are placed after the original symbols.
fn canonicalize_once<'c, M: AffineMapOrSet<'c>>(map_or_set: M, operands: &[ValueRef<'c>]) -> (M, Vec<ValueRef<'c>>) {
    let context = map_or_set.context();
    let dimension_count = map_or_set.dimension_count();
    let (used_dimensions, used_symbols) = used_inputs(&map_or_set);
    let zero = context.constant_affine_expression(0).as_ref();

    let mut dimension_operands = Vec::new();
    let mut symbol_operands = Vec::new();

    let symbol_replacements = operands[dimension_count..]
        .iter()
        .zip(used_symbols)
        .map(|(operand, used)| {
            if !used {
                return zero;
            }
            match arith::constant_value(*operand) {
                Some(value) => context.constant_affine_expression(value).as_ref(),
                None => context.symbol_affine_expression(position_of(&mut symbol_operands, *operand)).as_ref(),
            }
        })
        .collect::<Vec<_>>();

    let dimension_replacements = operands[..dimension_count]
        .iter()
        .zip(used_dimensions)
        .map(|(operand, used)| {
            if !used {
                return zero;
            }
            if !is_valid_symbol_in_own_scope(*operand) {
                return context.dimension_affine_expression(position_of(&mut dimension_operands, *operand)).as_ref();
            }
            match arith::constant_value(*operand) {
                Some(value) => context.constant_affine_expression(value).as_ref(),
                None => context.symbol_affine_expression(position_of(&mut symbol_operands, *operand)).as_ref(),
            }
        })
        .collect::<Vec<_>>();

    let result = map_or_set.replace_dimensions_and_symbols(
        &dimension_replacements,
        &symbol_replacements,
        dimension_operands.len(),
        symbol_operands.len(),
    );
    dimension_operands.extend(symbol_operands);
    (result, dimension_operands)
}

fn canonicalize_map_or_set_and_operands<'c, M: AffineMapOrSet<'c>, V: Value<'c>>(
    map_or_set: M,
    operands: &[V],
) -> Result<Option<(M, Vec<ValueRef<'c>>)>, Error> {
    check_operand_count(&map_or_set, operands.len())?;
    if operands.is_empty() {
        return Ok(None);
    }

    let operands = operands.iter().map(|operand| operand.as_ref()).collect::<Vec<_>>();
    let (mut current, mut current_operands) = (map_or_set, operands.clone());
    loop {
        let (next, next_operands) = canonicalize_once(current, &current_operands);
        if next == current && next_operands == current_operands {
            break;
        }
        current = next;
        current_operands = next_operands;
    }

    if current == map_or_set && current_operands == operands {
        return Ok(None);
    }
    tracing::trace!(before = %map_or_set, after = %current, "canonicalized affine operands");
    Ok(Some((current, current_operands)))
}

/// Canonicalizes `map` together with the `operands` that are bound to its inputs (dimension operands first, followed
/// by symbol operands). Specifically, this function:
///
///   - drops operands that are not used by any result of `map`,
///   - folds operands that are results of constant operations into the results of `map`,
///   - promotes dimension operands that are valid symbols in their own scope to symbols,
///   - merges duplicate operands, such that every distinct value is bound to a single input, and
///   - renumbers the remaining dimensions and symbols densely, in order of first appearance.
///
/// Returns the canonical map and operands, or [`None`] if they are identical to the inputs. Applying this function
/// to its own output always returns [`None`]. Returns an [`Error::OperandCountMismatch`] if the number of operands
/// does not match the number of inputs of `map`.
pub fn canonicalize_map_and_operands<'c, V: Value<'c>>(
    map: AffineMap<'c>,
    operands: &[V],
) -> Result<Option<(AffineMap<'c>, Vec<ValueRef<'c>>)>, Error> {
    canonicalize_map_or_set_and_operands(map, operands)
}

/// Canonicalizes `set` together with the `operands` that are bound to its inputs. This works the same way as
/// [`canonicalize_map_and_operands`], but operates on the constraints of an [`IntegerSet`].
pub fn canonicalize_set_and_operands<'c, V: Value<'c>>(
    set: IntegerSet<'c>,
    operands: &[V],
) -> Result<Option<(IntegerSet<'c>, Vec<ValueRef<'c>>)>, Error> {
    canonicalize_map_or_set_and_operands(set, operands)
}

/// Canonicalizes and simplifies `map` and `operands` repeatedly until nothing changes. Simplification can make more
/// operands unused (e.g., `d0 - d0`) and canonicalization can expose more simplification opportunities (e.g., by
/// merging duplicate operands), which is why the two need to be interleaved.
pub(crate) fn canonicalize_and_simplify<'c>(
    map: AffineMap<'c>,
    operands: Vec<ValueRef<'c>>,
) -> Result<(AffineMap<'c>, Vec<ValueRef<'c>>), Error> {
    let (mut map, mut operands) = canonicalize_map_and_operands(map, &operands)?.unwrap_or((map, operands));
    map = map.simplify();
    while let Some((canonical_map, canonical_operands)) = canonicalize_map_and_operands(map, &operands)? {
        map = canonical_map.simplify();
        operands = canonical_operands;
    }
    Ok((map, operands))
}

/// Composes `map` with the maps of the `affine.apply` operations that define any of its `operands`, transitively,
/// and then canonicalizes the result. The returned operands are never results of `affine.apply` operations.
///
/// Each operand that is defined by an `affine.apply` operation is substituted by the (single) result of that
/// operation's map, with the dimensions and symbols of that map appended to the dimensions and symbols of the map
/// that is being composed, and with its operands appended accordingly. Substitution repeats until no operand is
/// defined by an `affine.apply` operation. Duplicate results are kept (i.e., this function does not deduplicate the
/// results of `map`).
///
/// Returns an [`Error::OperandCountMismatch`] if the number of operands does not match the number of inputs of `map`,
/// and an [`Error::CompositionLimitExceeded`] if the number of substitutions exceeds the
/// [`composition_step_limit`](crate::ContextOptions::composition_step_limit) of the owning [`Context`](crate::Context)
/// (which can only happen when the `affine.apply` operations form a cycle).
pub fn compose_affine_map_and_operands<'c, V: Value<'c>>(
    map: AffineMap<'c>,
    operands: &[V],
) -> Result<(AffineMap<'c>, Vec<ValueRef<'c>>), Error> {
    check_operand_count(&map, operands.len())?;
    let operands = operands.iter().map(|operand| operand.as_ref()).collect::<Vec<_>>();
    if map.result_count() == 0 {
        return canonicalize_and_simplify(map, operands);
    }

    let context = map.context();
    let limit = context.options().composition_step_limit;
    let dimension_count = map.dimension_count();
    let mut dimensions = operands[..dimension_count].iter().copied().map(Some).collect::<Vec<_>>();
    let mut symbols = operands[dimension_count..].iter().copied().map(Some).collect::<Vec<_>>();
    let mut results = map.results().collect::<Vec<AffineExpressionRef<'c>>>();

    let mut step_count = 0;
    loop {
        let next = dimensions
            .iter()
            .enumerate()
            .find_map(|(position, operand)| operand.and_then(defining_apply).map(|apply| (false, position, apply)))
            .or_else(|| {
                symbols.iter().enumerate().find_map(|(position, operand)| {
                    operand.and_then(defining_apply).map(|apply| (true, position, apply))
                })
            });
        let Some((is_symbol, position, apply)) = next else {
            break;
        };

        step_count += 1;
        if step_count > limit {
            return Err(Error::CompositionLimitExceeded { limit });
        }

        let apply_map = apply.map();
        let replacement = apply_map.shift_dimensions(dimensions.len(), 0).shift_symbols(symbols.len(), 0).result(0);
        let target = if is_symbol {
            symbols[position] = None;
            context.symbol_affine_expression(position).as_ref()
        } else {
            dimensions[position] = None;
            context.dimension_affine_expression(position).as_ref()
        };
        results = results.iter().map(|result| result.replace(target, replacement)).collect();
        dimensions.extend(apply.dimension_operands().into_iter().map(Some));
        symbols.extend(apply.symbol_operands().into_iter().map(Some));
        tracing::trace!(apply = %apply_map, target = %target, "substituted affine.apply into affine map");
    }

    // Substituted inputs are no longer referenced and the remaining ones are renumbered densely.
    let zero = context.constant_affine_expression(0).as_ref();
    let mut new_operands = Vec::with_capacity(dimensions.len() + symbols.len());
    let dimension_replacements = dimensions
        .iter()
        .map(|operand| match operand {
            Some(operand) => {
                new_operands.push(*operand);
                context.dimension_affine_expression(new_operands.len() - 1).as_ref()
            }
            None => zero,
        })
        .collect::<Vec<_>>();
    let new_dimension_count = new_operands.len();
    let symbol_replacements = symbols
        .iter()
        .map(|operand| match operand {
            Some(operand) => {
                new_operands.push(*operand);
                context.symbol_affine_expression(new_operands.len() - new_dimension_count - 1).as_ref()
            }
            None => zero,
        })
        .collect::<Vec<_>>();
    let results = results
        .iter()
        .map(|result| result.replace_dimensions_and_symbols(&dimension_replacements, &symbol_replacements))
        .collect::<Vec<_>>();
    let composed = context.affine_map(new_dimension_count, new_operands.len() - new_dimension_count, &results)?;
    if step_count > 0 {
        tracing::debug!(map = %map, composed = %composed, step_count, "composed affine map with its operands");
    }
    canonicalize_and_simplify(composed, new_operands)
}

/// Composes `map` and `operands` repeatedly using [`compose_affine_map_and_operands`] until none of the operands is
/// the result of an `affine.apply` operation.
pub fn fully_compose_affine_map_and_operands<'c, V: Value<'c>>(
    map: AffineMap<'c>,
    operands: &[V],
) -> Result<(AffineMap<'c>, Vec<ValueRef<'c>>), Error> {
    let limit = map.context().options().composition_step_limit;
    let (mut map, mut operands) = compose_affine_map_and_operands(map, operands)?;
    let mut round_count = 0;
    while operands.iter().any(|operand| defining_apply(*operand).is_some()) {
        round_count += 1;
        if round_count > limit {
            return Err(Error::CompositionLimitExceeded { limit });
        }
        (map, operands) = compose_affine_map_and_operands(map, &operands)?;
    }
    Ok((map, operands))
}

/// Composes and canonicalizes the map and map operands of `operation`, returning the simplified map and operands, or
/// [`None`] if they are identical to the current ones. The operation itself is not modified.
pub fn simplify_affine_operation<'c, O: AffineMapOperation<'c>>(
    operation: &O,
) -> Result<Option<(AffineMap<'c>, Vec<ValueRef<'c>>)>, Error> {
    let (map, operands) = (operation.map(), operation.map_operands());
    let (composed_map, composed_operands) = compose_affine_map_and_operands(map, &operands)?;
    let (new_map, new_operands) = canonicalize_map_and_operands(composed_map, &composed_operands)?
        .unwrap_or((composed_map, composed_operands));
    if new_map == map && new_operands == operands {
        return Ok(None);
    }
    tracing::debug!(operation = %operation.name(), map = %map, simplified = %new_map, "simplified affine operation");
    Ok(Some((new_map, new_operands)))
}

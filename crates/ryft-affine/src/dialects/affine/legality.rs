//! Classification of [`Value`]s as valid affine dimension and symbol identifiers. Affine maps can only be applied to
//! values that satisfy these rules, which depend on where the values are defined relative to the enclosing *affine
//! scope* (i.e., the nearest region whose parent operation has the [`OperationTrait::AffineScope`] trait).
//!
//! Refer to the [official MLIR documentation][mlir] for more information.
//!
//! [mlir]: https://mlir.llvm.org/docs/Dialects/Affine/#restrictions-on-dimensions-and-symbols

use std::collections::HashMap;

use crate::dialects::affine::operations::{
    AffineApplyOperationRef, AffineLoadOperationRef, AffineMapOperation, AffineStoreOperationRef,
    AffineVectorLoadOperationRef, AffineVectorStoreOperationRef,
};
use crate::dialects::arith::ConstantOperationRef;
use crate::dialects::memref::{self, DimOperationRef};
use crate::{
    BlockArgumentRef, LogicalResult, Operation, OperationKind, OperationRef, OperationTrait, RegionRef, Type, Value,
    ValueRef,
};

fn is_index<'c>(value: ValueRef<'c>) -> bool {
    value.r#type().is_index()
}

/// Returns `true` if `value` is defined at the top level of `region` (i.e., if it is an argument of the entry block
/// of `region`, or a result of an operation whose parent region is `region`).
pub fn is_top_level_value<'c, V: Value<'c>>(value: V, region: RegionRef<'c>) -> bool {
    let value = value.as_ref();
    match value.cast::<BlockArgumentRef>() {
        Some(argument) => region.entry_block() == Some(argument.block()),
        None => value.defining_operation().and_then(|operation| operation.parent_region()) == Some(region),
    }
}

/// Returns `true` if `value` is defined at the top level of the region of an operation that has the
/// [`OperationTrait::AffineScope`] trait, whichever that operation is.
pub fn is_top_level_value_of_affine_scope<'c, V: Value<'c>>(value: V) -> bool {
    let value = value.as_ref();
    let parent_operation = match value.cast::<BlockArgumentRef>() {
        Some(argument) => argument.block().parent_operation(),
        None => value.defining_operation().and_then(|operation| operation.parent_operation()),
    };
    parent_operation.is_some_and(|operation| operation.has_trait(OperationTrait::AffineScope))
}

/// Returns the affine scope of `operation` (i.e., the region that contains `operation`, or its closest ancestor, and
/// whose parent operation has the [`OperationTrait::AffineScope`] trait). Returns [`None`] if no ancestor of
/// `operation` is an affine scope (e.g., for IR that is not attached to a function).
pub fn affine_scope<'c, O: Operation<'c>>(operation: O) -> Option<RegionRef<'c>> {
    let mut current = operation.as_ref();
    while let Some(parent) = current.parent_operation() {
        if parent.has_trait(OperationTrait::AffineScope) {
            return current.parent_region();
        }
        current = parent;
    }
    None
}

/// Returns the region that encloses the parent operation of `scope`, unless that operation is
/// [`OperationTrait::IsolatedFromAbove`] (in which case values defined outside of it cannot be used inside of it).
fn enclosing_region(scope: Option<RegionRef<'_>>) -> Option<RegionRef<'_>> {
    let operation = scope?.parent_operation()?;
    if operation.has_trait(OperationTrait::IsolatedFromAbove) { None } else { operation.parent_region() }
}

/// Returns `true` if `value` can be used as a dimension identifier of affine maps that are applied within `scope`.
/// Every valid symbol is also a valid dimension. Beyond that, induction variables of `affine.for` and
/// `affine.parallel` operations, results of `affine.apply` operations whose operands are valid dimensions and
/// symbols, and results of `memref.dim` operations on memrefs that are defined at the top level of an affine scope
/// are valid dimensions.
pub fn is_valid_dimension<'c, V: Value<'c>>(value: V, scope: Option<RegionRef<'c>>) -> bool {
    let value = value.as_ref();
    if !is_index(value) {
        return false;
    }
    if is_valid_symbol(value, scope) {
        return true;
    }
    let Some(operation) = value.defining_operation() else {
        return value
            .cast::<BlockArgumentRef>()
            .and_then(|argument| argument.block().parent_operation())
            .is_some_and(|operation| {
                matches!(operation.kind(), OperationKind::AffineFor | OperationKind::AffineParallel)
            });
    };
    match operation.kind() {
        OperationKind::AffineApply => {
            operation.cast::<AffineApplyOperationRef>().is_some_and(|apply| apply.is_valid_dimension(scope))
        }
        OperationKind::Dim => operation
            .cast::<DimOperationRef>()
            .is_some_and(|dim| is_top_level_value_of_affine_scope(dim.source())),
        _ => false,
    }
}

/// Returns `true` if `value` can be used as a symbol identifier of affine maps that are applied within `scope`.
/// Symbols are values that are known to be invariant within `scope`: values that are defined at the top level of
/// `scope` (or of any region that encloses it without crossing an [`OperationTrait::IsolatedFromAbove`] operation),
/// results of constant operations, results of `affine.apply` operations whose operands are all valid symbols, and
/// results of `memref.dim` operations whose sizes are known to be valid symbols.
pub fn is_valid_symbol<'c, V: Value<'c>>(value: V, scope: Option<RegionRef<'c>>) -> bool {
    let value = value.as_ref();
    if !is_index(value) {
        return false;
    }
    if scope.is_some_and(|scope| is_top_level_value(value, scope)) {
        return true;
    }
    let Some(operation) = value.defining_operation() else {
        return enclosing_region(scope).is_some_and(|region| is_valid_symbol(value, Some(region)));
    };
    match operation.kind() {
        OperationKind::Constant => true,
        OperationKind::AffineApply => {
            operation.cast::<AffineApplyOperationRef>().is_some_and(|apply| apply.is_valid_symbol(scope))
        }
        OperationKind::Dim => {
            operation.cast::<DimOperationRef>().is_some_and(|dim| is_valid_dim_symbol(dim, scope))
        }
        _ => enclosing_region(scope).is_some_and(|region| is_valid_symbol(value, Some(region))),
    }
}

/// Returns `true` if the result of `dim` is a valid symbol within `scope`. This is the case when the queried memref
/// is defined at the top level of an affine scope, when the queried dimension is static, or when the queried
/// dimension is dynamic and the operand that holds its size in the operation that defines the memref is itself a
/// valid symbol. Memrefs that are block arguments below the top level of an affine scope are never considered.
fn is_valid_dim_symbol<'c>(dim: DimOperationRef<'c>, scope: Option<RegionRef<'c>>) -> bool {
    let source = dim.source();
    if is_top_level_value_of_affine_scope(source) {
        return true;
    }
    let Some((memref_type, dynamic_sizes)) = source.defining_operation().and_then(memref::sized_memref_operation)
    else {
        return false;
    };
    let Some(index) = dim.constant_index() else {
        return false;
    };
    if index >= memref_type.rank() {
        return false;
    }
    match memref_type.dynamic_dimension_index(index) {
        None => true,
        Some(position) => dynamic_sizes.get(position).is_some_and(|size| is_valid_symbol(*size, scope)),
    }
}

/// Returns `true` if `value` is a valid dimension identifier within its own affine scope (i.e., the affine scope of
/// its defining operation, or the affine scope implied by the block that owns it).
pub fn is_valid_dimension_in_own_scope<'c, V: Value<'c>>(value: V) -> bool {
    let value = value.as_ref();
    if !is_index(value) {
        return false;
    }
    match value.defining_operation() {
        Some(operation) => is_valid_dimension(value, affine_scope(operation)),
        None => value.cast::<BlockArgumentRef>().and_then(|argument| argument.block().parent_operation()).is_some_and(
            |operation| {
                operation.has_trait(OperationTrait::AffineScope)
                    || matches!(operation.kind(), OperationKind::AffineFor | OperationKind::AffineParallel)
            },
        ),
    }
}

/// Returns `true` if `value` is a valid symbol identifier within its own affine scope. Such values can be used as
/// symbols at all of their use sites, which is what makes it safe to promote dimension operands to symbols during
/// canonicalization.
pub fn is_valid_symbol_in_own_scope<'c, V: Value<'c>>(value: V) -> bool {
    let value = value.as_ref();
    if !is_index(value) {
        return false;
    }
    if is_top_level_value_of_affine_scope(value) {
        return true;
    }
    value.defining_operation().is_some_and(|operation| is_valid_symbol(value, affine_scope(operation)))
}

/// Returns `true` if `value` can be used as an index operand of an affine memory access within `scope` (i.e., if it
/// is either a valid dimension or a valid symbol).
pub fn is_valid_affine_index_operand<'c, V: Value<'c>>(value: V, scope: Option<RegionRef<'c>>) -> bool {
    is_valid_dimension(value, scope) || is_valid_symbol(value, scope)
}

/// Returns `true` if `value` would remain a legal affine identifier (as decided by `check`) if the body of `source`
/// were inlined into `destination`, with `mapping` mapping the block arguments of `source` to the values that replace
/// them. Values that are not defined at the top level of `source` are unaffected by inlining. Block arguments are
/// checked after remapping, and unmapped block arguments are never legal. Results of top-level operations are only
/// legal when they are defined by constant or `memref.dim` operations.
pub fn remains_legal_after_inline<'c, V, F>(
    value: V,
    source: RegionRef<'c>,
    destination: RegionRef<'c>,
    mapping: &HashMap<ValueRef<'c>, ValueRef<'c>>,
    check: F,
) -> bool
where
    V: Value<'c>,
    F: Fn(ValueRef<'c>, Option<RegionRef<'c>>) -> bool,
{
    let value = value.as_ref();
    if !is_top_level_value(value, source) {
        return true;
    }
    if value.is::<BlockArgumentRef>() {
        return mapping.get(&value).is_some_and(|mapped| check(*mapped, Some(destination)));
    }
    value
        .defining_operation()
        .is_some_and(|operation| operation.is::<ConstantOperationRef>() || operation.is::<DimOperationRef>())
}

fn map_operands_remain_legal_after_inline<'c, O: AffineMapOperation<'c>>(
    operation: O,
    source: RegionRef<'c>,
    destination: RegionRef<'c>,
    mapping: &HashMap<ValueRef<'c>, ValueRef<'c>>,
) -> bool {
    operation.dimension_operands().into_iter().all(|operand| {
        remains_legal_after_inline(operand, source, destination, mapping, is_valid_dimension)
    }) && operation.symbol_operands().into_iter().all(|operand| {
        remains_legal_after_inline(operand, source, destination, mapping, is_valid_symbol)
    })
}

/// Returns `true` if `operation` would remain legal if the body of `source`, which contains it, were inlined into
/// `destination` (refer to [`remains_legal_after_inline`] for more information). The operands of `affine.apply`
/// operations are checked as dimensions if the result of the operation is a valid dimension in `source`, and as
/// symbols otherwise. The dimension and symbol operands of affine memory accesses are checked as dimensions and
/// symbols, respectively. All other operations are unaffected.
pub fn operation_remains_legal_after_inline<'c, O: Operation<'c>>(
    operation: O,
    source: RegionRef<'c>,
    destination: RegionRef<'c>,
    mapping: &HashMap<ValueRef<'c>, ValueRef<'c>>,
) -> bool {
    let operation: OperationRef<'c> = operation.as_ref();
    match operation.kind() {
        OperationKind::AffineApply => {
            let Some(apply) = operation.cast::<AffineApplyOperationRef>() else {
                return true;
            };
            let is_dimension = is_valid_dimension(apply.result_value(), Some(source));
            let check: fn(ValueRef<'c>, Option<RegionRef<'c>>) -> bool =
                if is_dimension { is_valid_dimension } else { is_valid_symbol };
            apply
                .map_operands()
                .into_iter()
                .all(|operand| remains_legal_after_inline(operand, source, destination, mapping, check))
        }
        OperationKind::AffineLoad => operation
            .cast::<AffineLoadOperationRef>()
            .is_none_or(|load| map_operands_remain_legal_after_inline(load, source, destination, mapping)),
        OperationKind::AffineStore => operation
            .cast::<AffineStoreOperationRef>()
            .is_none_or(|store| map_operands_remain_legal_after_inline(store, source, destination, mapping)),
        OperationKind::AffineVectorLoad => operation
            .cast::<AffineVectorLoadOperationRef>()
            .is_none_or(|load| map_operands_remain_legal_after_inline(load, source, destination, mapping)),
        OperationKind::AffineVectorStore => operation
            .cast::<AffineVectorStoreOperationRef>()
            .is_none_or(|store| map_operands_remain_legal_after_inline(store, source, destination, mapping)),
        _ => true,
    }
}

/// Verifies that the first `dimension_count` of `operands` are valid dimensions and that the rest are valid symbols,
/// within the affine scope of `operation`. Emits an error [`Diagnostic`](crate::Diagnostic) on `operation` for the
/// first operand that violates these rules.
pub fn verify_dimension_and_symbol_operands<'c, O: Operation<'c>>(
    operation: O,
    operands: &[ValueRef<'c>],
    dimension_count: usize,
) -> LogicalResult {
    let scope = affine_scope(operation);
    for (index, operand) in operands.iter().enumerate() {
        if index < dimension_count {
            if !is_valid_dimension(*operand, scope) {
                operation.emit_error("operand cannot be used as a dimension id");
                return LogicalResult::failure();
            }
        } else if !is_valid_symbol(*operand, scope) {
            operation.emit_error("operand cannot be used as a symbol");
            return LogicalResult::failure();
        }
    }
    LogicalResult::success()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use crate::dialects::{affine, arith, func};
    use crate::{Context, ContextOptions, OperationBuilder, Size};

    use super::*;

    #[test]
    fn test_top_level_values_and_affine_scopes() {
        let context = Context::new();
        let function = func::func(&context, "f", &[context.index_type()]);
        let block = function.entry_block();
        let n = block.argument(0).unwrap();
        let constant = block.append_operation(arith::constant_index(&context, 1)).unwrap();
        let r#loop = block.append_operation(affine::for_constant(&context, 0, 10, 1).unwrap()).unwrap();
        let i = r#loop.induction_variable();
        let generic = OperationBuilder::new(&context, "test.opaque").add_result(context.index_type()).build().unwrap();
        let generic = r#loop.append_to_body(generic).unwrap();

        assert!(is_top_level_value(n, function.body()));
        assert!(is_top_level_value(constant.result(0).unwrap(), function.body()));
        assert!(!is_top_level_value(i, function.body()));
        assert!(is_top_level_value(i, r#loop.body_region()));
        assert!(!is_top_level_value(generic.result(0).unwrap(), function.body()));

        assert!(is_top_level_value_of_affine_scope(n));
        assert!(is_top_level_value_of_affine_scope(constant.result(0).unwrap()));
        assert!(!is_top_level_value_of_affine_scope(i));
        assert!(!is_top_level_value_of_affine_scope(generic.result(0).unwrap()));

        assert_eq!(affine_scope(function), None);
        assert_eq!(affine_scope(r#loop), Some(function.body()));
        assert_eq!(affine_scope(generic), Some(function.body()));
        assert_eq!(affine_scope(arith::constant_index(&context, 0)), None);
    }

    #[test]
    fn test_valid_dimensions_and_symbols() {
        let context = Context::new();
        let function = func::func(&context, "f", &[context.index_type().as_ref(), context.float_type(32).as_ref()]);
        let block = function.entry_block();
        let n = block.argument(0).unwrap();
        let x = block.argument(1).unwrap();
        let r#loop = block.append_operation(affine::for_constant(&context, 0, 10, 1).unwrap()).unwrap();
        let i = r#loop.induction_variable();
        let inner_constant = r#loop.append_to_body(arith::constant_index(&context, 4)).unwrap().result(0).unwrap();
        let generic = OperationBuilder::new(&context, "test.opaque").add_result(context.index_type()).build().unwrap();
        let generic = r#loop.append_to_body(generic).unwrap().result(0).unwrap();
        let d0 = context.dimension_affine_expression(0);
        let s0 = context.symbol_affine_expression(0);
        let dimension_apply = affine::apply(&context, context.affine_map(1, 0, &[d0 + 1]).unwrap(), &[i]).unwrap();
        let dimension_apply = r#loop.append_to_body(dimension_apply).unwrap().result(0).unwrap();
        let symbol_apply = affine::apply(&context, context.affine_map(0, 1, &[s0 + 1]).unwrap(), &[n]).unwrap();
        let symbol_apply = r#loop.append_to_body(symbol_apply).unwrap().result(0).unwrap();
        let scope = Some(function.body());

        assert!(is_valid_symbol(n, scope));
        assert!(is_valid_dimension(n, scope));
        assert!(!is_valid_symbol(i, scope));
        assert!(is_valid_dimension(i, scope));
        assert!(is_valid_symbol(inner_constant, scope));
        assert!(!is_valid_symbol(generic, scope));
        assert!(!is_valid_dimension(generic, scope));
        assert!(!is_valid_symbol(dimension_apply, scope));
        assert!(is_valid_dimension(dimension_apply, scope));
        assert!(is_valid_symbol(symbol_apply, scope));
        assert!(!is_valid_symbol(x, scope));
        assert!(!is_valid_dimension(x, scope));
        assert!(is_valid_affine_index_operand(i, scope));
        assert!(!is_valid_affine_index_operand(generic, scope));

        // Values that are defined above the loop are valid symbols within the loop body.
        assert!(is_valid_symbol(n, Some(r#loop.body_region())));
        assert!(!is_valid_symbol(n, None));
        assert!(is_valid_symbol(inner_constant, None));

        assert!(is_valid_symbol_in_own_scope(n));
        assert!(is_valid_symbol_in_own_scope(inner_constant));
        assert!(is_valid_symbol_in_own_scope(symbol_apply));
        assert!(!is_valid_symbol_in_own_scope(i));
        assert!(!is_valid_symbol_in_own_scope(generic));
        assert!(is_valid_dimension_in_own_scope(i));
        assert!(is_valid_dimension_in_own_scope(n));
        assert!(is_valid_dimension_in_own_scope(dimension_apply));
        assert!(!is_valid_dimension_in_own_scope(generic));
        assert!(!is_valid_dimension_in_own_scope(x));

        // Symbol operands of `affine.apply` operations must be valid symbols even when the result is a dimension.
        let mixed_map = context.affine_map(1, 1, &[d0 + s0]).unwrap();
        let mixed_apply = affine::apply(&context, mixed_map, &[i, n]).unwrap();
        let mixed_apply = r#loop.append_to_body(mixed_apply).unwrap().result(0).unwrap();
        assert!(is_valid_dimension(mixed_apply, scope));
        assert!(!is_valid_symbol(mixed_apply, scope));
        let misplaced_apply = affine::apply(&context, context.affine_map(0, 1, &[s0 + 1]).unwrap(), &[i]).unwrap();
        let misplaced_apply = r#loop.append_to_body(misplaced_apply).unwrap().result(0).unwrap();
        assert!(!is_valid_dimension(misplaced_apply, scope));
        assert!(!is_valid_symbol(misplaced_apply, scope));
        assert!(!is_valid_dimension_in_own_scope(misplaced_apply));
    }

    #[test]
    fn test_dim_legality() {
        let context = Context::new();
        let element_type = context.float_type(32);
        let dynamic_type = context.memref_type(&[Size::Dynamic, Size::Static(4)], element_type, &[]);
        let function = func::func(&context, "f", &[dynamic_type.as_ref(), context.index_type().as_ref()]);
        let block = function.entry_block();
        let memref = block.argument(0).unwrap();
        let n = block.argument(1).unwrap();
        let zero = block.append_operation(arith::constant_index(&context, 0)).unwrap().result(0).unwrap();
        let r#loop = block.append_operation(affine::for_constant(&context, 0, 10, 1).unwrap()).unwrap();
        let scope = Some(function.body());

        let dim = r#loop.append_to_body(memref::dim(&context, memref, zero).unwrap()).unwrap().result(0).unwrap();
        assert!(is_valid_symbol(dim, scope));
        assert!(is_valid_dimension(dim, scope));

        let opaque = OperationBuilder::new(&context, "test.opaque").add_result(context.index_type()).build().unwrap();
        let opaque = r#loop.append_to_body(opaque).unwrap().result(0).unwrap();
        let vector_type = context.memref_type(&[Size::Dynamic], element_type, &[]);
        let opaque_alloc = r#loop.append_to_body(memref::alloc(&context, vector_type, &[opaque]).unwrap()).unwrap();
        let opaque_dim = memref::dim(&context, opaque_alloc.result(0).unwrap(), zero).unwrap();
        let opaque_dim = r#loop.append_to_body(opaque_dim).unwrap().result(0).unwrap();
        assert!(!is_valid_symbol(opaque_dim, scope));

        let sized_alloc = r#loop.append_to_body(memref::alloc(&context, vector_type, &[n]).unwrap()).unwrap();
        let sized_dim = memref::dim(&context, sized_alloc.result(0).unwrap(), zero).unwrap();
        let sized_dim = r#loop.append_to_body(sized_dim).unwrap().result(0).unwrap();
        assert!(is_valid_symbol(sized_dim, scope));

        let static_type = context.memref_type(&[Size::Static(8)], element_type, &[]);
        let static_alloc = memref::alloc::<ValueRef>(&context, static_type, &[]).unwrap();
        let static_alloc = r#loop.append_to_body(static_alloc).unwrap();
        let static_dim = memref::dim(&context, static_alloc.result(0).unwrap(), zero).unwrap();
        let static_dim = r#loop.append_to_body(static_dim).unwrap().result(0).unwrap();
        assert!(is_valid_symbol(static_dim, scope));

        // Memrefs that are block arguments below the top level of an affine scope are conservatively rejected.
        let detached = context.block(&[dynamic_type]);
        let detached_dim = memref::dim(&context, detached.argument(0).unwrap(), zero).unwrap();
        let detached_dim = detached.append_operation(detached_dim).unwrap().result(0).unwrap();
        assert!(!is_valid_symbol(detached_dim, None));
        assert!(!is_valid_dimension(detached_dim, None));
    }

    #[test]
    fn test_legality_scoping() {
        let context = Context::new();
        let function = func::func(&context, "f", &[context.index_type()]);
        let block = function.entry_block();
        let n = block.argument(0).unwrap();

        // Nested affine scope that is not isolated from above.
        let scope_region = context.region();
        let scope_block = scope_region.append_block(context.block(&[] as &[crate::TypeRef])).unwrap();
        let scope_operation = OperationBuilder::new(&context, "test.scope")
            .add_trait(OperationTrait::AffineScope)
            .add_region(scope_region)
            .build()
            .unwrap();
        block.append_operation(scope_operation).unwrap();
        let opaque = OperationBuilder::new(&context, "test.opaque").add_result(context.index_type()).build().unwrap();
        let value = scope_block.append_operation(opaque).unwrap().result(0).unwrap();
        let r#loop = scope_block.append_operation(affine::for_constant(&context, 0, 10, 1).unwrap()).unwrap();

        assert!(is_valid_symbol(value, Some(scope_region)));
        assert!(is_valid_symbol(value, Some(r#loop.body_region())));
        assert!(!is_valid_symbol(value, Some(function.body())));
        assert!(is_valid_symbol(n, Some(scope_region)));
        assert!(is_valid_symbol(n, Some(r#loop.body_region())));

        // Values cannot be used as symbols across operations that are isolated from above.
        let isolated_region = context.region();
        let isolated_block = isolated_region.append_block(context.block(&[] as &[crate::TypeRef])).unwrap();
        let isolated_operation = OperationBuilder::new(&context, "test.isolated")
            .add_trait(OperationTrait::AffineScope)
            .add_trait(OperationTrait::IsolatedFromAbove)
            .add_region(isolated_region)
            .build()
            .unwrap();
        block.append_operation(isolated_operation).unwrap();
        let inner_loop = isolated_block.append_operation(affine::for_constant(&context, 0, 10, 1).unwrap()).unwrap();
        assert!(!is_valid_symbol(n, Some(isolated_region)));
        assert!(!is_valid_symbol(n, Some(inner_loop.body_region())));
    }

    #[test]
    fn test_remains_legal_after_inline() {
        let context = Context::new();
        let source_function = func::func(&context, "source", &[context.index_type()]);
        let source_block = source_function.entry_block();
        let source = source_function.body();
        let n = source_block.argument(0).unwrap().as_ref();
        let constant = source_block.append_operation(arith::constant_index(&context, 2)).unwrap();
        let opaque = OperationBuilder::new(&context, "test.opaque").add_result(context.index_type()).build().unwrap();
        let opaque = source_block.append_operation(opaque).unwrap();
        let source_loop =
            source_block.append_operation(affine::for_constant(&context, 0, 10, 1).unwrap()).unwrap();

        let destination_function = func::func(&context, "destination", &[context.index_type()]);
        let destination_block = destination_function.entry_block();
        let destination = destination_function.body();
        let m = destination_block.argument(0).unwrap().as_ref();
        let destination_loop =
            destination_block.append_operation(affine::for_constant(&context, 0, 10, 1).unwrap()).unwrap();
        let j = destination_loop.induction_variable().as_ref();

        let to_symbol = HashMap::from([(n, m)]);
        let to_induction_variable = HashMap::from([(n, j)]);
        let unmapped = HashMap::new();

        assert!(remains_legal_after_inline(n, source, destination, &to_symbol, is_valid_symbol));
        assert!(!remains_legal_after_inline(n, source, destination, &to_induction_variable, is_valid_symbol));
        assert!(remains_legal_after_inline(n, source, destination, &to_induction_variable, is_valid_dimension));
        assert!(!remains_legal_after_inline(n, source, destination, &unmapped, is_valid_symbol));
        let constant_result = constant.result(0).unwrap();
        assert!(remains_legal_after_inline(constant_result, source, destination, &unmapped, is_valid_symbol));
        let opaque_result = opaque.result(0).unwrap();
        assert!(!remains_legal_after_inline(opaque_result, source, destination, &unmapped, is_valid_symbol));
        let i = source_loop.induction_variable();
        assert!(remains_legal_after_inline(i, source, destination, &unmapped, is_valid_symbol));

        let s0 = context.symbol_affine_expression(0);
        let apply = affine::apply(&context, context.affine_map(0, 1, &[s0 * 2]).unwrap(), &[n]).unwrap();
        let apply = source_block.append_operation(apply).unwrap();
        assert!(operation_remains_legal_after_inline(apply, source, destination, &to_symbol));
        assert!(operation_remains_legal_after_inline(apply, source, destination, &to_induction_variable));
        assert!(!operation_remains_legal_after_inline(apply, source, destination, &unmapped));

        let memref_type = context.memref_type(&[Size::Static(16)], context.float_type(32), &[]);
        let memref = source_block.append_operation(memref::alloc::<ValueRef>(&context, memref_type, &[]).unwrap());
        let memref = memref.unwrap().result(0).unwrap();
        let load = affine::load(&context, memref, context.affine_map(0, 1, &[s0]).unwrap(), &[n]).unwrap();
        let load = source_loop.append_to_body(load).unwrap();
        assert!(operation_remains_legal_after_inline(load, source, destination, &to_symbol));
        assert!(!operation_remains_legal_after_inline(load, source, destination, &to_induction_variable));
        assert!(operation_remains_legal_after_inline(constant, source, destination, &unmapped));
    }

    #[test]
    fn test_verify_dimension_and_symbol_operands() {
        let context = Context::with_options(ContextOptions { log_unhandled_diagnostics: false, ..Default::default() });
        let messages = Rc::new(RefCell::new(Vec::new()));
        let captured = messages.clone();
        context.attach_diagnostics_handler(move |diagnostic| {
            captured.borrow_mut().push(diagnostic.message().to_string());
            true
        });

        let function = func::func(&context, "f", &[context.index_type()]);
        let block = function.entry_block();
        let n = block.argument(0).unwrap().as_ref();
        let r#loop = block.append_operation(affine::for_constant(&context, 0, 10, 1).unwrap()).unwrap();
        let i = r#loop.induction_variable().as_ref();
        let opaque = OperationBuilder::new(&context, "test.opaque").add_result(context.index_type()).build().unwrap();
        let opaque = r#loop.append_to_body(opaque).unwrap();
        let value = opaque.result(0).unwrap().as_ref();

        assert!(verify_dimension_and_symbol_operands(opaque, &[i, n], 1).is_success());
        assert!(verify_dimension_and_symbol_operands(opaque, &[value], 1).is_failure());
        assert!(verify_dimension_and_symbol_operands(opaque, &[n, i], 1).is_failure());
        assert_eq!(
            messages.borrow().as_slice(),
            &["operand cannot be used as a dimension id".to_string(), "operand cannot be used as a symbol".to_string()],
        );
    }
}

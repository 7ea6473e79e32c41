use std::fmt::{Debug, Display};

use crate::{BlockRef, Context, Operation, OperationRef, RegionRef, TypeRef};

/// Entity that defines a [`Value`]: either a block (for block arguments) or an operation (for operation results).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ValueOwner {
    BlockArgument { block: usize, index: usize },
    OperationResult { operation: usize, index: usize },
}

/// Storage of a single [`Value`] in the IR arena of a [`Context`]. `uses` holds one `(operation, operand index)`
/// pair for every operand slot that refers to this value, in the order in which those slots were created.
#[derive(Clone, Debug)]
pub(crate) struct ValueStorage {
    pub(crate) r#type: usize,
    pub(crate) owner: ValueOwner,
    pub(crate) uses: Vec<(usize, usize)>,
}

impl Context {
    /// Creates a new value with the provided type and owner in the IR arena of this [`Context`] and returns its
    /// identifier.
    pub(crate) fn create_value(&self, r#type: TypeRef<'_>, owner: ValueOwner) -> usize {
        let mut ir = self.ir.borrow_mut();
        ir.values.push(ValueStorage { r#type: r#type.id, owner, uses: Vec::new() });
        ir.values.len() - 1
    }
}

/// [`Value`]s represent the arguments of blocks and the results of [`Operation`]s, which are in turn used as the
/// operands of other [`Operation`]s. All values are in static single assignment (SSA) form and are owned by the
/// [`Context`] whose IR arena they live in. We only ever manipulate references to [`Value`]s via types like
/// [`ValueRef`], [`BlockArgumentRef`], and [`OperationResultRef`].
///
/// Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/LangRef/#high-level-structure)
/// for more information.
pub trait Value<'c>: Sized + Copy + PartialEq + Eq + Display + Debug {
    /// Tries to construct a new instance of this type from the provided type-erased [`ValueRef`], returning [`None`]
    /// if that value is not an instance of this type.
    fn from_ref(value: ValueRef<'c>) -> Option<Self>;

    /// Up-casts this [`Value`] to an instance of [`ValueRef`] (i.e., the most generic value reference type).
    fn as_ref(&self) -> ValueRef<'c>;

    /// Returns a reference to the [`Context`] that owns this [`Value`].
    fn context(&self) -> &'c Context {
        self.as_ref().context
    }

    /// Returns `true` if this [`Value`] is an instance of `V`.
    fn is<V: Value<'c>>(&self) -> bool {
        self.cast::<V>().is_some()
    }

    /// Tries to cast this [`Value`] to an instance of `V` (e.g., an instance of [`OperationResultRef`]).
    /// If it is not an instance of `V`, this function will return [`None`].
    fn cast<V: Value<'c>>(&self) -> Option<V> {
        V::from_ref(self.as_ref())
    }

    /// Returns the [`Type`] of this value.
    fn r#type(&self) -> TypeRef<'c> {
        let value = self.as_ref();
        TypeRef { id: value.with_storage(|storage| storage.r#type), context: value.context }
    }

    /// Returns all uses of this [`Value`] (i.e., instances where it appears as an operand in [`Operation`]s).
    fn uses(&self) -> Vec<OperandRef<'c>> {
        let value = self.as_ref();
        value
            .with_storage(|storage| storage.uses.clone())
            .into_iter()
            .map(|(operation, operand_index)| OperandRef { operation, operand_index, context: value.context })
            .collect()
    }

    /// Returns `true` if this [`Value`] has at least one use.
    fn has_uses(&self) -> bool {
        self.as_ref().with_storage(|storage| !storage.uses.is_empty())
    }

    /// Returns the [`Operation`]s that use this [`Value`] as one of their operands. An operation that uses this value
    /// multiple times appears once per use.
    fn users(&self) -> Vec<OperationRef<'c>> {
        self.uses().into_iter().map(|operand| operand.operation()).collect()
    }

    /// Returns the [`Operation`] that defines this [`Value`], or [`None`] if this value is a block argument.
    fn defining_operation(&self) -> Option<OperationRef<'c>> {
        self.cast::<OperationResultRef>().map(|result| result.operation())
    }

    /// Returns the block in which this [`Value`] is defined: the block that owns it for block arguments, and the
    /// block that contains the defining [`Operation`] for operation results.
    fn parent_block(&self) -> Option<BlockRef<'c>> {
        let value = self.as_ref();
        match value.with_storage(|storage| storage.owner) {
            ValueOwner::BlockArgument { block, .. } => Some(BlockRef { id: block, context: value.context }),
            ValueOwner::OperationResult { operation, .. } => {
                OperationRef { id: operation, context: value.context }.parent_block()
            }
        }
    }

    /// Returns the region in which this [`Value`] is defined, if any.
    fn parent_region(&self) -> Option<RegionRef<'c>> {
        self.parent_block().and_then(|block| block.parent_region())
    }
}

/// Reference to a [`Value`] that is owned by a [`Context`].
#[derive(Copy, Clone)]
pub struct ValueRef<'c> {
    /// Identifier of this [`Value`] in the IR arena of its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`Value`].
    pub(crate) context: &'c Context,
}

impl<'c> ValueRef<'c> {
    pub(crate) fn with_storage<R>(&self, callback: impl FnOnce(&ValueStorage) -> R) -> R {
        callback(&self.context.ir.borrow().values[self.id])
    }
}

impl<'c> Value<'c> for ValueRef<'c> {
    fn from_ref(value: ValueRef<'c>) -> Option<Self> {
        Some(value)
    }

    fn as_ref(&self) -> ValueRef<'c> {
        *self
    }
}

impl Display for ValueRef<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.with_storage(|storage| storage.owner) {
            ValueOwner::BlockArgument { index, .. } => {
                write!(formatter, "<block argument> of type '{}' at index: {index}", self.r#type())
            }
            ValueOwner::OperationResult { operation, index } => {
                let operation = OperationRef { id: operation, context: self.context };
                write!(formatter, "<result {index} of {}> of type '{}'", operation.name(), self.r#type())
            }
        }
    }
}

subtype_trait_impls!(ValueRef<'c> as Value);

/// Reference to a [`Value`] that represents a block argument.
#[derive(Copy, Clone)]
pub struct BlockArgumentRef<'c> {
    /// Identifier of this [`Value`] in the IR arena of its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`Value`].
    pub(crate) context: &'c Context,
}

impl<'c> BlockArgumentRef<'c> {
    fn owner(&self) -> (usize, usize) {
        match self.as_ref().with_storage(|storage| storage.owner) {
            ValueOwner::BlockArgument { block, index } => (block, index),
            ValueOwner::OperationResult { .. } => unreachable!("block arguments are always owned by blocks"),
        }
    }

    /// Returns a reference to the block in which this value is defined as an argument.
    pub fn block(&self) -> BlockRef<'c> {
        BlockRef { id: self.owner().0, context: self.context }
    }

    /// Returns the index of this value in the argument list of its owning block.
    pub fn argument_index(&self) -> usize {
        self.owner().1
    }
}

subtype_trait_impls!(
    BlockArgumentRef<'c> as Value,
    base = ValueRef,
    is = |value| matches!(value.with_storage(|storage| storage.owner), ValueOwner::BlockArgument { .. }),
);

impl<'c> From<BlockArgumentRef<'c>> for ValueRef<'c> {
    fn from(value: BlockArgumentRef<'c>) -> Self {
        value.as_ref()
    }
}

/// [`Value`] that represents the result of an [`Operation`].
#[derive(Copy, Clone)]
pub struct OperationResultRef<'c> {
    /// Identifier of this [`Value`] in the IR arena of its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`Value`].
    pub(crate) context: &'c Context,
}

impl<'c> OperationResultRef<'c> {
    fn owner(&self) -> (usize, usize) {
        match self.as_ref().with_storage(|storage| storage.owner) {
            ValueOwner::OperationResult { operation, index } => (operation, index),
            ValueOwner::BlockArgument { .. } => unreachable!("operation results are always owned by operations"),
        }
    }

    /// Returns a reference to the [`Operation`] that produced this value as its result.
    pub fn operation(&self) -> OperationRef<'c> {
        OperationRef { id: self.owner().0, context: self.context }
    }

    /// Returns the index of this value in the results of its owning [`Operation`].
    pub fn result_index(&self) -> usize {
        self.owner().1
    }
}

subtype_trait_impls!(
    OperationResultRef<'c> as Value,
    base = ValueRef,
    is = |value| matches!(value.with_storage(|storage| storage.owner), ValueOwner::OperationResult { .. }),
);

impl<'c> From<OperationResultRef<'c>> for ValueRef<'c> {
    fn from(value: OperationResultRef<'c>) -> Self {
        value.as_ref()
    }
}

/// Reference to a "use" of a [`Value`] as an operand of some [`Operation`].
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct OperandRef<'c> {
    operation: usize,
    operand_index: usize,
    context: &'c Context,
}

impl<'c> OperandRef<'c> {
    /// Returns a reference to the [`Context`] that owns the underlying [`Value`] of this operand.
    pub fn context(&self) -> &'c Context {
        self.context
    }

    /// Returns a reference to the underlying [`Value`] of this [`OperandRef`].
    pub fn value(&self) -> ValueRef<'c> {
        let id = self.context.ir.borrow().operations[self.operation].operands[self.operand_index];
        ValueRef { id, context: self.context }
    }

    /// Returns a reference to the [`Operation`] that takes this [`OperandRef`] as one of its operands.
    pub fn operation(&self) -> OperationRef<'c> {
        OperationRef { id: self.operation, context: self.context }
    }

    /// Returns the index of this [`OperandRef`] in the operand list of its owning [`Operation`].
    pub fn operand_index(&self) -> usize {
        self.operand_index
    }
}

impl std::hash::Hash for OperandRef<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.operation.hash(state);
        self.operand_index.hash(state);
    }
}

impl Display for OperandRef<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "operand #{} of {}", self.operand_index, self.operation())
    }
}

impl Debug for OperandRef<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "OperandRef[{self}]")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::dialects::{affine, arith, func};
    use crate::{Context, Type};

    use super::*;

    #[test]
    fn test_block_argument() {
        let context = Context::new();
        let index_type = context.index_type();
        let function = func::func(&context, "f", &[index_type.as_ref(), context.float_type(32).as_ref()]);
        let block = function.entry_block();
        let argument = block.argument(1).unwrap();
        assert_eq!(argument.block(), block);
        assert_eq!(argument.argument_index(), 1);
        assert_eq!(argument.r#type(), context.float_type(32));
        assert_eq!(argument.defining_operation(), None);
        assert_eq!(argument.parent_block(), Some(block));
        assert_eq!(argument.parent_region(), Some(function.body()));
        assert!(argument.is::<BlockArgumentRef>());
        assert!(!argument.is::<OperationResultRef>());
        assert_eq!(argument.to_string(), "<block argument> of type 'f32' at index: 1");
        assert_eq!(format!("{argument:?}"), "BlockArgumentRef[<block argument> of type 'f32' at index: 1]");
    }

    #[test]
    fn test_operation_result() {
        let context = Context::new();
        let function = func::func(&context, "f", &[] as &[crate::TypeRef]);
        let block = function.entry_block();
        let constant = block.append_operation(arith::constant_index(&context, 4)).unwrap();
        let result = constant.result(0).unwrap();
        assert_eq!(result.operation(), constant);
        assert_eq!(result.result_index(), 0);
        assert_eq!(result.r#type(), context.index_type());
        assert_eq!(result.defining_operation(), Some(constant.as_ref()));
        assert_eq!(result.parent_block(), Some(block));
        assert_eq!(result.to_string(), "<result 0 of arith.constant> of type 'index'");
        let value: ValueRef = result.into();
        assert_eq!(value.cast::<OperationResultRef>(), Some(result));
    }

    #[test]
    fn test_value_uses_and_users() {
        let context = Context::new();
        let function = func::func(&context, "f", &[context.index_type()]);
        let block = function.entry_block();
        let argument = block.argument(0).unwrap();
        assert!(!argument.has_uses());

        let sum = context.dimension_affine_expression(0) + context.dimension_affine_expression(1);
        let map = context.affine_map(2, 0, &[sum]).unwrap();
        let apply = block.append_operation(affine::apply(&context, map, &[argument, argument]).unwrap()).unwrap();
        assert!(argument.has_uses());
        let uses = argument.uses();
        assert_eq!(uses.len(), 2);
        assert_eq!(uses[0].operation(), apply);
        assert_eq!(uses[0].operand_index(), 0);
        assert_eq!(uses[1].operand_index(), 1);
        assert_eq!(uses[1].value(), argument);
        assert_eq!(argument.users(), vec![apply, apply]);
        assert_eq!(uses[0].to_string(), "operand #0 of affine.apply");
        assert_eq!(format!("{:?}", uses[1]), "OperandRef[operand #1 of affine.apply]");
    }
}

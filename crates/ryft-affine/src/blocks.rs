use std::fmt::{Debug, Display};

use crate::values::ValueOwner;
use crate::{BlockArgumentRef, Context, Error, Operation, OperationRef, OperationTrait, RegionRef, Type, Value};

/// Storage of a single block in the IR arena of a [`Context`].
#[derive(Clone, Debug, Default)]
pub(crate) struct BlockStorage {
    pub(crate) arguments: Vec<usize>,
    pub(crate) operations: Vec<usize>,
    pub(crate) parent_region: Option<usize>,
}

impl Context {
    /// Creates a new detached block with arguments of the provided [`Type`]s. The block can later be attached to a
    /// region using [`RegionRef::append_block`].
    pub fn block<'c, T: Type<'c>>(&'c self, argument_types: &[T]) -> BlockRef<'c> {
        let id = {
            let mut ir = self.ir.borrow_mut();
            ir.blocks.push(BlockStorage::default());
            ir.blocks.len() - 1
        };
        let arguments = argument_types
            .iter()
            .enumerate()
            .map(|(index, r#type)| self.create_value(r#type.as_ref(), ValueOwner::BlockArgument { block: id, index }))
            .collect();
        self.ir.borrow_mut().blocks[id].arguments = arguments;
        BlockRef { id, context: self }
    }
}

/// Reference to a block that is owned by a [`Context`]. A block is an ordered list of [`Operation`]s that takes a
/// list of arguments. Blocks live in regions, except for detached blocks that were created using [`Context::block`]
/// and have not been attached to any region yet.
///
/// Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/LangRef/#blocks) for more information.
#[derive(Copy, Clone)]
pub struct BlockRef<'c> {
    /// Identifier of this block in the IR arena of its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this block.
    pub(crate) context: &'c Context,
}

impl<'c> BlockRef<'c> {
    fn with_storage<R>(&self, callback: impl FnOnce(&BlockStorage) -> R) -> R {
        callback(&self.context.ir.borrow().blocks[self.id])
    }

    /// Returns a reference to the [`Context`] that owns this block.
    pub fn context(&self) -> &'c Context {
        self.context
    }

    /// Returns the number of arguments of this block.
    pub fn argument_count(&self) -> usize {
        self.with_storage(|storage| storage.arguments.len())
    }

    /// Returns the arguments of this block.
    pub fn arguments(&self) -> impl Iterator<Item = BlockArgumentRef<'c>> + use<'c> {
        let context = self.context;
        self.with_storage(|storage| storage.arguments.clone())
            .into_iter()
            .map(move |id| BlockArgumentRef { id, context })
    }

    /// Returns the `index`-th argument of this block, or [`None`] if the index is out of bounds.
    pub fn argument(&self, index: usize) -> Option<BlockArgumentRef<'c>> {
        self.with_storage(|storage| storage.arguments.get(index).copied())
            .map(|id| BlockArgumentRef { id, context: self.context })
    }

    /// Returns the number of [`Operation`]s in this block.
    pub fn operation_count(&self) -> usize {
        self.with_storage(|storage| storage.operations.len())
    }

    /// Returns `true` if this block contains no [`Operation`]s.
    pub fn is_empty(&self) -> bool {
        self.operation_count() == 0
    }

    /// Returns the [`Operation`]s in this block, in order.
    ///
    /// Note that the returned iterator does not hold a borrowed reference to the underlying [`Context`] because that
    /// would make it impossible to construct new IR while iterating over its contents.
    pub fn operations(&self) -> impl Iterator<Item = OperationRef<'c>> + use<'c> {
        let context = self.context;
        self.with_storage(|storage| storage.operations.clone())
            .into_iter()
            .map(move |id| OperationRef { id, context })
    }

    /// Returns the `index`-th [`Operation`] in this block, or [`None`] if the index is out of bounds.
    pub fn operation(&self, index: usize) -> Option<OperationRef<'c>> {
        self.with_storage(|storage| storage.operations.get(index).copied())
            .map(|id| OperationRef { id, context: self.context })
    }

    /// Returns the terminator of this block (i.e., its last [`Operation`] if that operation has the
    /// [`OperationTrait::Terminator`] trait), or [`None`] if the block has no terminator.
    pub fn terminator(&self) -> Option<OperationRef<'c>> {
        self.with_storage(|storage| storage.operations.last().copied())
            .map(|id| OperationRef { id, context: self.context })
            .filter(|operation| operation.has_trait(OperationTrait::Terminator))
    }

    /// Returns the region that contains this block, or [`None`] if this block is detached.
    pub fn parent_region(&self) -> Option<RegionRef<'c>> {
        self.with_storage(|storage| storage.parent_region).map(|id| RegionRef { id, context: self.context })
    }

    /// Returns the [`Operation`] that contains this block (i.e., the operation that owns its parent region), if any.
    pub fn parent_operation(&self) -> Option<OperationRef<'c>> {
        self.parent_region().and_then(|region| region.parent_operation())
    }

    /// Appends the provided detached [`Operation`] to the end of this block and returns it. Returns an
    /// [`Error::InvalidOperation`] if the operation is already contained in a block and an [`Error::ContextMismatch`]
    /// if it belongs to a different [`Context`].
    pub fn append_operation<O: Operation<'c>>(&self, operation: O) -> Result<O, Error> {
        self.insert_operation(self.operation_count(), operation)
    }

    /// Inserts the provided detached [`Operation`] at position `index` of this block and returns it. Refer to
    /// [`BlockRef::append_operation`] for information on the errors that this function may return.
    pub fn insert_operation<O: Operation<'c>>(&self, index: usize, operation: O) -> Result<O, Error> {
        let operation_ref = operation.as_ref();
        if !std::ptr::eq(operation_ref.context, self.context) {
            return Err(Error::ContextMismatch);
        }
        let mut ir = self.context.ir.borrow_mut();
        if ir.operations[operation_ref.id].parent_block.is_some() {
            return Err(Error::InvalidOperation {
                message: format!("'{}' is already contained in a block", ir.operations[operation_ref.id].name),
            });
        }
        if index > ir.blocks[self.id].operations.len() {
            return Err(Error::PositionOutOfBounds {
                kind: "operation",
                position: index,
                count: ir.blocks[self.id].operations.len(),
            });
        }
        ir.operations[operation_ref.id].parent_block = Some(self.id);
        ir.blocks[self.id].operations.insert(index, operation_ref.id);
        Ok(operation)
    }

    /// Returns the position of the provided [`Operation`] in this block, or [`None`] if it is not directly contained
    /// in this block.
    pub fn operation_index<O: Operation<'c>>(&self, operation: O) -> Option<usize> {
        let id = operation.as_ref().id;
        self.with_storage(|storage| storage.operations.iter().position(|operation| *operation == id))
    }

    /// Returns the ancestor of the provided [`Operation`] (possibly the operation itself) that is directly contained
    /// in this block, or [`None`] if the operation is not nested inside this block.
    pub fn find_ancestor_operation_in_block<O: Operation<'c>>(&self, operation: O) -> Option<OperationRef<'c>> {
        let mut current = Some(operation.as_ref());
        while let Some(operation) = current {
            if operation.parent_block() == Some(*self) {
                return Some(operation);
            }
            current = operation.parent_operation();
        }
        None
    }
}

impl PartialEq for BlockRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.context, other.context) && self.id == other.id
    }
}

impl Eq for BlockRef<'_> {}

impl std::hash::Hash for BlockRef<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Display for BlockRef<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let arguments = self.arguments().map(|argument| argument.r#type().to_string()).collect::<Vec<_>>();
        write!(formatter, "^bb{}({})", self.id, arguments.join(", "))
    }
}

impl Debug for BlockRef<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "BlockRef[{self}]")
    }
}

use std::fmt::{Debug, Display};

use crate::{BlockRef, Context, Error, Operation, OperationRef};

/// Storage of a single region in the IR arena of a [`Context`].
#[derive(Clone, Debug, Default)]
pub(crate) struct RegionStorage {
    pub(crate) blocks: Vec<usize>,
    pub(crate) parent_operation: Option<usize>,
}

impl Context {
    /// Creates a new detached and empty region. Regions become attached to [`Operation`]s when they are passed to
    /// [`OperationBuilder::add_region`](crate::OperationBuilder::add_region).
    pub fn region(&self) -> RegionRef<'_> {
        let mut ir = self.ir.borrow_mut();
        ir.regions.push(RegionStorage::default());
        RegionRef { id: ir.regions.len() - 1, context: self }
    }
}

/// Reference to a region that is owned by a [`Context`]. Regions are ordered lists of blocks that are owned by
/// [`Operation`]s, and they are what gives the IR its hierarchical structure: an operation in a block of a region may
/// itself own regions, and so on. Regions also define the scopes that the affine legality rules are expressed in
/// (e.g., a value is a "top-level" value of a region if it is defined directly in that region).
///
/// Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/LangRef/#regions) for more information.
#[derive(Copy, Clone)]
pub struct RegionRef<'c> {
    /// Identifier of this region in the IR arena of its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this region.
    pub(crate) context: &'c Context,
}

impl<'c> RegionRef<'c> {
    fn with_storage<R>(&self, callback: impl FnOnce(&RegionStorage) -> R) -> R {
        callback(&self.context.ir.borrow().regions[self.id])
    }

    /// Returns a reference to the [`Context`] that owns this region.
    pub fn context(&self) -> &'c Context {
        self.context
    }

    /// Returns the number of blocks in this region.
    pub fn block_count(&self) -> usize {
        self.with_storage(|storage| storage.blocks.len())
    }

    /// Returns `true` if this region contains no blocks.
    pub fn is_empty(&self) -> bool {
        self.block_count() == 0
    }

    /// Returns the blocks of this region, in order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockRef<'c>> + use<'c> {
        let context = self.context;
        self.with_storage(|storage| storage.blocks.clone()).into_iter().map(move |id| BlockRef { id, context })
    }

    /// Returns the first block of this region, or [`None`] if this region is empty.
    pub fn entry_block(&self) -> Option<BlockRef<'c>> {
        self.with_storage(|storage| storage.blocks.first().copied()).map(|id| BlockRef { id, context: self.context })
    }

    /// Returns the [`Operation`] that owns this region, or [`None`] if this region is detached.
    pub fn parent_operation(&self) -> Option<OperationRef<'c>> {
        self.with_storage(|storage| storage.parent_operation).map(|id| OperationRef { id, context: self.context })
    }

    /// Returns the region that contains the [`Operation`] that owns this region, if any.
    pub fn parent_region(&self) -> Option<RegionRef<'c>> {
        self.parent_operation().and_then(|operation| operation.parent_region())
    }

    /// Appends the provided detached block to the end of this region and returns it. Returns an
    /// [`Error::InvalidOperation`] if the block already belongs to a region and an [`Error::ContextMismatch`] if it
    /// belongs to a different [`Context`].
    pub fn append_block(&self, block: BlockRef<'c>) -> Result<BlockRef<'c>, Error> {
        if !std::ptr::eq(block.context, self.context) {
            return Err(Error::ContextMismatch);
        }
        let mut ir = self.context.ir.borrow_mut();
        if ir.blocks[block.id].parent_region.is_some() {
            return Err(Error::InvalidOperation { message: "block is already contained in a region".to_string() });
        }
        ir.blocks[block.id].parent_region = Some(self.id);
        ir.regions[self.id].blocks.push(block.id);
        Ok(block)
    }

    /// Returns `true` if this region is `other` or if it contains `other` at any nesting depth.
    pub fn is_ancestor_of_region(&self, other: RegionRef<'c>) -> bool {
        let mut current = Some(other);
        while let Some(region) = current {
            if region == *self {
                return true;
            }
            current = region.parent_region();
        }
        false
    }

    /// Returns `true` if the provided [`Operation`] is nested (at any depth) inside this region.
    pub fn is_ancestor_of<O: Operation<'c>>(&self, operation: O) -> bool {
        operation.parent_region().is_some_and(|region| self.is_ancestor_of_region(region))
    }

    /// Returns the ancestor of the provided [`Operation`] (possibly the operation itself) whose parent region is
    /// this region, or [`None`] if the operation is not nested inside this region.
    pub fn find_ancestor_operation_in_region<O: Operation<'c>>(&self, operation: O) -> Option<OperationRef<'c>> {
        let mut current = Some(operation.as_ref());
        while let Some(operation) = current {
            if operation.parent_region() == Some(*self) {
                return Some(operation);
            }
            current = operation.parent_operation();
        }
        None
    }
}

impl PartialEq for RegionRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.context, other.context) && self.id == other.id
    }
}

impl Eq for RegionRef<'_> {}

impl std::hash::Hash for RegionRef<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Display for RegionRef<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.parent_operation() {
            Some(operation) => write!(formatter, "<region #{} of {}>", self.id, operation),
            None => write!(formatter, "<region #{}>", self.id),
        }
    }
}

impl Debug for RegionRef<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "RegionRef[{self}]")
    }
}

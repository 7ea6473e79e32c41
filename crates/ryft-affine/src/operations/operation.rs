use std::fmt::{Debug, Display};

use crate::{BlockRef, Context, DiagnosticSeverity, OperationResultRef, RegionRef, Value, ValueRef};

/// Kinds of [`Operation`]s that this crate understands. All analyses in this crate dispatch on [`OperationKind`]s
/// instead of on operation names. Operations that do not belong to any of the known kinds are represented using
/// [`OperationKind::Generic`] and they keep the name that they were constructed with, along with any
/// [`OperationTrait`]s that they were given.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Function,
    Generic,
    Constant,
    Alloc,
    View,
    SubView,
    Dim,
    AffineApply,
    AffineFor,
    AffineParallel,
    AffineIf,
    AffineLoad,
    AffineStore,
    AffineVectorLoad,
    AffineVectorStore,
    AffineMin,
    AffineMax,
    AffineYield,
}

impl OperationKind {
    /// Returns the fully-qualified name (i.e., `<dialect>.<operation>`) of operations of this kind, or [`None`] for
    /// [`OperationKind::Generic`] operations whose name is chosen when they are built.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::Function => Some("func.func"),
            Self::Generic => None,
            Self::Constant => Some("arith.constant"),
            Self::Alloc => Some("memref.alloc"),
            Self::View => Some("memref.view"),
            Self::SubView => Some("memref.subview"),
            Self::Dim => Some("memref.dim"),
            Self::AffineApply => Some("affine.apply"),
            Self::AffineFor => Some("affine.for"),
            Self::AffineParallel => Some("affine.parallel"),
            Self::AffineIf => Some("affine.if"),
            Self::AffineLoad => Some("affine.load"),
            Self::AffineStore => Some("affine.store"),
            Self::AffineVectorLoad => Some("affine.vector_load"),
            Self::AffineVectorStore => Some("affine.vector_store"),
            Self::AffineMin => Some("affine.min"),
            Self::AffineMax => Some("affine.max"),
            Self::AffineYield => Some("affine.yield"),
        }
    }

    /// Returns the [`OperationTrait`]s that all operations of this kind have.
    pub(crate) fn traits(&self) -> &'static [OperationTrait] {
        match self {
            Self::Function => &[OperationTrait::AffineScope, OperationTrait::IsolatedFromAbove],
            Self::AffineYield => &[OperationTrait::Terminator],
            _ => &[],
        }
    }
}

/// Structural traits that [`Operation`]s may have and that the affine legality rules depend on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OperationTrait {
    /// The regions of the operation start a new affine scope. Values defined at the top level of such regions (along
    /// with the arguments of their entry blocks) are valid symbols for all affine operations nested in them.
    AffineScope,

    /// The regions of the operation cannot refer to values that are defined outside of them.
    IsolatedFromAbove,

    /// The operation must be the last operation in its parent block.
    Terminator,
}

/// Kind-specific data that is stored alongside [`Operation`]s. Affine maps and integer sets are stored using their
/// uniqued identifiers in the owning [`Context`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum OperationProperties {
    None,
    Symbol(String),
    Constant(i64),
    Map(usize),
    Bounds { lower: usize, upper: usize, step: i64 },
    ParallelBounds { lower: usize, upper: usize, steps: Vec<i64> },
    Set(usize),
}

/// Storage of a single operation in the IR arena of a [`Context`].
#[derive(Clone, Debug)]
pub(crate) struct OperationStorage {
    pub(crate) kind: OperationKind,
    pub(crate) name: String,
    pub(crate) properties: OperationProperties,
    pub(crate) traits: Vec<OperationTrait>,
    pub(crate) operands: Vec<usize>,
    pub(crate) results: Vec<usize>,
    pub(crate) regions: Vec<usize>,
    pub(crate) parent_block: Option<usize>,
}

/// [`Operation`]s are the basic unit of execution and analysis in the IR. Each operation has a kind, a list of
/// operands (i.e., [`Value`]s that it consumes), a list of results (i.e., [`Value`]s that it produces), and a list
/// of regions that may contain further nested operations. Operations are owned by the [`Context`] in which they were
/// built and we only ever manipulate references to them via types like [`OperationRef`] or the typed operation
/// references of each dialect (e.g., [`AffineForOperationRef`](crate::dialects::affine::AffineForOperationRef)).
///
/// Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/LangRef/#operations) for more information.
pub trait Operation<'c>: Sized + Copy + PartialEq + Eq + Display + Debug {
    /// Tries to construct a new instance of this type from the provided type-erased [`OperationRef`], returning
    /// [`None`] if that operation is not an instance of this type.
    fn from_ref(operation: OperationRef<'c>) -> Option<Self>;

    /// Up-casts this [`Operation`] to an instance of [`OperationRef`] (i.e., the most generic operation reference).
    fn as_ref(&self) -> OperationRef<'c>;

    /// Returns a reference to the [`Context`] that owns this [`Operation`].
    fn context(&self) -> &'c Context {
        self.as_ref().context
    }

    /// Returns `true` if this [`Operation`] is an instance of `O`.
    fn is<O: Operation<'c>>(&self) -> bool {
        self.cast::<O>().is_some()
    }

    /// Tries to cast this [`Operation`] to an instance of `O` (e.g., an instance of
    /// [`AffineApplyOperationRef`](crate::dialects::affine::AffineApplyOperationRef)). If it is not an instance of
    /// `O`, this function will return [`None`].
    fn cast<O: Operation<'c>>(&self) -> Option<O> {
        O::from_ref(self.as_ref())
    }

    /// Returns the [`OperationKind`] of this [`Operation`].
    fn kind(&self) -> OperationKind {
        self.as_ref().with_storage(|storage| storage.kind)
    }

    /// Returns the fully-qualified name of this [`Operation`] (e.g., `affine.for`).
    fn name(&self) -> String {
        self.as_ref().with_storage(|storage| storage.name.clone())
    }

    /// Returns `true` if this [`Operation`] has the provided [`OperationTrait`].
    fn has_trait(&self, r#trait: OperationTrait) -> bool {
        self.as_ref().with_storage(|storage| storage.traits.contains(&r#trait))
    }

    /// Returns the number of operands of this [`Operation`].
    fn operand_count(&self) -> usize {
        self.as_ref().with_storage(|storage| storage.operands.len())
    }

    /// Returns the operands of this [`Operation`], in order.
    fn operands(&self) -> Vec<ValueRef<'c>> {
        let operation = self.as_ref();
        operation
            .with_storage(|storage| storage.operands.clone())
            .into_iter()
            .map(|id| ValueRef { id, context: operation.context })
            .collect()
    }

    /// Returns the `index`-th operand of this [`Operation`], or [`None`] if the index is out of bounds.
    fn operand(&self, index: usize) -> Option<ValueRef<'c>> {
        let operation = self.as_ref();
        operation
            .with_storage(|storage| storage.operands.get(index).copied())
            .map(|id| ValueRef { id, context: operation.context })
    }

    /// Returns the number of results of this [`Operation`].
    fn result_count(&self) -> usize {
        self.as_ref().with_storage(|storage| storage.results.len())
    }

    /// Returns the results of this [`Operation`], in order.
    fn results(&self) -> Vec<OperationResultRef<'c>> {
        let operation = self.as_ref();
        operation
            .with_storage(|storage| storage.results.clone())
            .into_iter()
            .map(|id| OperationResultRef { id, context: operation.context })
            .collect()
    }

    /// Returns the `index`-th result of this [`Operation`], or [`None`] if the index is out of bounds.
    fn result(&self, index: usize) -> Option<OperationResultRef<'c>> {
        let operation = self.as_ref();
        operation
            .with_storage(|storage| storage.results.get(index).copied())
            .map(|id| OperationResultRef { id, context: operation.context })
    }

    /// Returns the number of regions of this [`Operation`].
    fn region_count(&self) -> usize {
        self.as_ref().with_storage(|storage| storage.regions.len())
    }

    /// Returns the regions of this [`Operation`], in order.
    fn regions(&self) -> Vec<RegionRef<'c>> {
        let operation = self.as_ref();
        operation
            .with_storage(|storage| storage.regions.clone())
            .into_iter()
            .map(|id| RegionRef { id, context: operation.context })
            .collect()
    }

    /// Returns the `index`-th region of this [`Operation`], or [`None`] if the index is out of bounds.
    fn region(&self, index: usize) -> Option<RegionRef<'c>> {
        let operation = self.as_ref();
        operation
            .with_storage(|storage| storage.regions.get(index).copied())
            .map(|id| RegionRef { id, context: operation.context })
    }

    /// Returns the block that contains this [`Operation`], or [`None`] if this operation is detached.
    fn parent_block(&self) -> Option<BlockRef<'c>> {
        let operation = self.as_ref();
        operation
            .with_storage(|storage| storage.parent_block)
            .map(|id| BlockRef { id, context: operation.context })
    }

    /// Returns the region that contains this [`Operation`], if any.
    fn parent_region(&self) -> Option<RegionRef<'c>> {
        self.parent_block().and_then(|block| block.parent_region())
    }

    /// Returns the closest surrounding [`Operation`] that contains this operation, if any.
    fn parent_operation(&self) -> Option<OperationRef<'c>> {
        self.parent_region().and_then(|region| region.parent_operation())
    }

    /// Returns `true` if this [`Operation`] is `other` or if `other` is nested (at any depth) in one of its regions.
    fn is_ancestor_of<O: Operation<'c>>(&self, other: O) -> bool {
        let this = self.as_ref();
        let mut current = Some(other.as_ref());
        while let Some(operation) = current {
            if operation == this {
                return true;
            }
            current = operation.parent_operation();
        }
        false
    }

    /// Returns `true` if `other` is nested (at any depth) in one of the regions of this [`Operation`].
    fn is_proper_ancestor_of<O: Operation<'c>>(&self, other: O) -> bool {
        other.parent_operation().is_some_and(|parent| self.is_ancestor_of(parent))
    }

    /// Returns `true` if this [`Operation`] and `other` are contained in the same block and this operation comes
    /// strictly before `other` in that block. Returns `false` for operations in different blocks.
    fn is_before_in_block<O: Operation<'c>>(&self, other: O) -> bool {
        match (self.parent_block(), other.parent_block()) {
            (Some(block), Some(other_block)) if block == other_block => {
                match (block.operation_index(*self), block.operation_index(other)) {
                    (Some(index), Some(other_index)) => index < other_index,
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Performs a walk over this [`Operation`] (i.e., itself and all of its nested operations) in the specified
    /// [`WalkOrder`], invoking `callback` on each operation it visits. The traversal is also controlled by the
    /// result of each `callback` invocation as it can determine whether to advance to the next operation, skip
    /// the children of the current operation, or completely interrupt the walk. Returns `false` if the walk was
    /// interrupted.
    ///
    /// The walk does not hold any borrow of the underlying [`Context`] while `callback` runs and so callbacks are
    /// free to inspect the IR and to build new operations.
    fn walk<F: FnMut(OperationRef<'c>) -> WalkResult>(&self, order: WalkOrder, mut callback: F) -> bool {
        fn walk_operation<'c, F: FnMut(OperationRef<'c>) -> WalkResult>(
            operation: OperationRef<'c>,
            order: WalkOrder,
            callback: &mut F,
        ) -> bool {
            if order == WalkOrder::PreOrder {
                match callback(operation) {
                    WalkResult::Advance => {}
                    WalkResult::Interrupt => return false,
                    WalkResult::Skip => return true,
                }
            }
            for region in operation.regions() {
                for block in region.blocks() {
                    for nested_operation in block.operations() {
                        if !walk_operation(nested_operation, order, callback) {
                            return false;
                        }
                    }
                }
            }
            order == WalkOrder::PreOrder || callback(operation) != WalkResult::Interrupt
        }

        walk_operation(self.as_ref(), order, &mut callback)
    }

    /// Emits an error [`Diagnostic`](crate::Diagnostic) attached to this [`Operation`].
    fn emit_error<S: Into<String>>(&self, message: S) {
        self.context().emit_diagnostic(DiagnosticSeverity::Error, message, Some(*self));
    }

    /// Emits a warning [`Diagnostic`](crate::Diagnostic) attached to this [`Operation`].
    fn emit_warning<S: Into<String>>(&self, message: S) {
        self.context().emit_diagnostic(DiagnosticSeverity::Warning, message, Some(*self));
    }

    /// Emits a remark [`Diagnostic`](crate::Diagnostic) attached to this [`Operation`].
    fn emit_remark<S: Into<String>>(&self, message: S) {
        self.context().emit_diagnostic(DiagnosticSeverity::Remark, message, Some(*self));
    }
}

/// Reference to an [`Operation`] that is owned by a [`Context`].
#[derive(Copy, Clone)]
pub struct OperationRef<'c> {
    /// Identifier of this [`Operation`] in the IR arena of its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`Operation`].
    pub(crate) context: &'c Context,
}

impl<'c> OperationRef<'c> {
    pub(crate) fn with_storage<R>(&self, callback: impl FnOnce(&OperationStorage) -> R) -> R {
        callback(&self.context.ir.borrow().operations[self.id])
    }

    pub(crate) fn properties(&self) -> OperationProperties {
        self.with_storage(|storage| storage.properties.clone())
    }

    /// Returns `true` if this operation is defined by `value` (i.e., `value` is one of its results).
    pub fn defines<V: Value<'c>>(&self, value: V) -> bool {
        value.defining_operation() == Some(*self)
    }
}

impl<'c> Operation<'c> for OperationRef<'c> {
    fn from_ref(operation: OperationRef<'c>) -> Option<Self> {
        Some(operation)
    }

    fn as_ref(&self) -> OperationRef<'c> {
        *self
    }
}

impl Display for OperationRef<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.name())
    }
}

subtype_trait_impls!(OperationRef<'c> as Operation);

/// Traversal order when performing a walk over [`Operation`]s.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WalkOrder {
    /// Each [`Operation`] will be visited before its nested regions are visited.
    PreOrder,

    /// Each [`Operation`] will be visited after its nested regions are visited.
    PostOrder,
}

/// Result returned by the callback that is used when performing walks over [`Operation`]s
/// and which determines the next action to take in the current walk.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WalkResult {
    /// The traversal should continue with the step in the walk.
    Advance,

    /// The traversal should terminate without continuing with the rest of the walk.
    Interrupt,

    /// The traversal should skip the current [`Operation`]'s children and move directly to its siblings
    /// (or to its parent's siblings if it does not have any siblings, etc.). This is only meaningful for
    /// [`WalkOrder::PreOrder`] walks.
    Skip,
}

use std::cell::{Cell, RefCell};
use std::fmt::Debug;

use crate::blocks::BlockStorage;
use crate::diagnostics::DiagnosticHandler;
use crate::dialects::affine::affine_expressions::AffineExpressionStorage;
use crate::dialects::affine::affine_maps::AffineMapStorage;
use crate::dialects::affine::integer_sets::IntegerSetStorage;
use crate::operations::OperationStorage;
use crate::regions::RegionStorage;
use crate::support::Uniquer;
use crate::types::TypeStorage;
use crate::values::ValueStorage;

/// Options that control the behavior of a [`Context`] and of the analyses that run on the IR it owns.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContextOptions {
    /// Maximum number of `affine.apply` substitutions that a single map composition may perform before giving up
    /// with [`Error::CompositionLimitExceeded`](crate::Error::CompositionLimitExceeded). Every operand can only be
    /// substituted once in an acyclic IR and so this limit is only ever reached when the IR contains an `affine.apply`
    /// cycle (which is not valid IR).
    pub composition_step_limit: usize,

    /// If `true`, [`Diagnostic`](crate::Diagnostic)s that are not consumed by any attached handler are logged using
    /// [`tracing`] at a level that matches their [`DiagnosticSeverity`](crate::DiagnosticSeverity).
    pub log_unhandled_diagnostics: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self { composition_step_limit: 65536, log_unhandled_diagnostics: true }
    }
}

/// Arena that holds all IR nodes (i.e., operations, blocks, regions, and values) that are owned by a [`Context`].
/// Nodes are never deallocated before the [`Context`] itself is dropped and are always addressed using their index
/// in the corresponding [`Vec`].
#[derive(Default)]
pub(crate) struct IrStorage {
    pub(crate) operations: Vec<OperationStorage>,
    pub(crate) blocks: Vec<BlockStorage>,
    pub(crate) regions: Vec<RegionStorage>,
    pub(crate) values: Vec<ValueStorage>,
}

/// [`Context`] is the top-level object that owns everything else in this crate. It holds the immortal uniqued objects
/// (i.e., [`AffineExpression`](crate::AffineExpression)s, [`AffineMap`](crate::AffineMap)s,
/// [`IntegerSet`](crate::IntegerSet)s, and [`Type`](crate::Type)s) along with the tables used to unique them, as well
/// as the arena that stores the IR (i.e., [`Operation`](crate::Operation)s, [`BlockRef`](crate::BlockRef)s,
/// [`RegionRef`](crate::RegionRef)s, and [`ValueRef`](crate::ValueRef)s). All handle types in this crate borrow the
/// [`Context`] that owns them and are only meaningful relative to that [`Context`].
///
/// Note that [`Context`] uses interior mutability internally (via [`RefCell`]) and is meant to be used from a single
/// thread. Analyses never keep any of these cells borrowed across calls into user-provided callbacks.
pub struct Context {
    pub(crate) affine_expressions: RefCell<Uniquer<AffineExpressionStorage>>,
    pub(crate) affine_maps: RefCell<Uniquer<AffineMapStorage>>,
    pub(crate) integer_sets: RefCell<Uniquer<IntegerSetStorage>>,
    pub(crate) types: RefCell<Uniquer<TypeStorage>>,
    pub(crate) ir: RefCell<IrStorage>,
    pub(crate) diagnostic_handlers: RefCell<Vec<(usize, DiagnosticHandler)>>,
    pub(crate) next_diagnostic_handler_id: Cell<usize>,
    options: ContextOptions,
}

impl Context {
    /// Creates a new [`Context`] that uses the default [`ContextOptions`].
    pub fn new() -> Self {
        Self::with_options(ContextOptions::default())
    }

    /// Creates a new [`Context`] that uses the provided [`ContextOptions`].
    pub fn with_options(options: ContextOptions) -> Self {
        Self {
            affine_expressions: RefCell::new(Uniquer::new()),
            affine_maps: RefCell::new(Uniquer::new()),
            integer_sets: RefCell::new(Uniquer::new()),
            types: RefCell::new(Uniquer::new()),
            ir: RefCell::new(IrStorage::default()),
            diagnostic_handlers: RefCell::new(Vec::new()),
            next_diagnostic_handler_id: Cell::new(0),
            options,
        }
    }

    /// Returns the [`ContextOptions`] of this [`Context`].
    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// Returns the number of operations that have been created in this [`Context`].
    pub fn operation_count(&self) -> usize {
        self.ir.borrow().operations.len()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Context {}

impl Debug for Context {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ir = self.ir.borrow();
        formatter
            .debug_struct("Context")
            .field("options", &self.options)
            .field("affine_expression_count", &self.affine_expressions.borrow().len())
            .field("affine_map_count", &self.affine_maps.borrow().len())
            .field("integer_set_count", &self.integer_sets.borrow().len())
            .field("type_count", &self.types.borrow().len())
            .field("operation_count", &ir.operations.len())
            .field("block_count", &ir.blocks.len())
            .field("region_count", &ir.regions.len())
            .field("value_count", &ir.values.len())
            .finish()
    }
}

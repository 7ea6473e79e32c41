use crate::dialects::arith;
use crate::{
    Context, Error, MemRefTypeRef, Operation, OperationBuilder, OperationKind, OperationRef, Type, Value, ValueRef,
};

/// [`Operation`]s that produce a memref whose dynamic dimensions are given by explicit size operands (one per
/// dynamic dimension of the result type, in order).
pub trait SizedMemRefOperation<'c>: Operation<'c> {
    /// Position of the first dynamic size operand in the operand list of this operation.
    const DYNAMIC_SIZES_OFFSET: usize;

    /// Returns the memref type of the result of this operation.
    fn result_type(&self) -> MemRefTypeRef<'c> {
        self.result(0)
            .and_then(|result| result.r#type().cast::<MemRefTypeRef>())
            .expect("invalid result type in sized `memref` operation")
    }

    /// Returns the dynamic size operands of this operation.
    fn dynamic_sizes(&self) -> Vec<ValueRef<'c>> {
        self.operands().into_iter().skip(Self::DYNAMIC_SIZES_OFFSET).collect()
    }

    /// Returns the operand that holds the size of the `index`-th dimension of the result of this operation, or
    /// [`None`] if that dimension is static or out of bounds.
    fn dynamic_size(&self, index: usize) -> Option<ValueRef<'c>> {
        self.result_type()
            .dynamic_dimension_index(index)
            .and_then(|position| self.operand(Self::DYNAMIC_SIZES_OFFSET + position))
    }
}

operation_ref!(
    /// Typed handle for `memref.alloc` operations.
    Alloc => Alloc
);

impl<'c> SizedMemRefOperation<'c> for AllocOperationRef<'c> {
    const DYNAMIC_SIZES_OFFSET: usize = 0;
}

operation_ref!(
    /// Typed handle for `memref.view` operations. Their operands are the source buffer, the byte shift, and the dynamic
    /// sizes of the result.
    View => View
);

impl<'c> ViewOperationRef<'c> {
    /// Returns the buffer that this view is taken from.
    pub fn source(&self) -> ValueRef<'c> {
        self.operand(0).expect("`memref.view` operations always have a source operand")
    }

    /// Returns the byte shift of this view into its source buffer.
    pub fn byte_shift(&self) -> ValueRef<'c> {
        self.operand(1).expect("`memref.view` operations always have a byte shift operand")
    }
}

impl<'c> SizedMemRefOperation<'c> for ViewOperationRef<'c> {
    const DYNAMIC_SIZES_OFFSET: usize = 2;
}

operation_ref!(
    /// Typed handle for `memref.subview` operations. Their operands are the source memref and the dynamic sizes of the
    /// result. Offsets and strides are not modeled.
    SubView => SubView
);

impl<'c> SubViewOperationRef<'c> {
    /// Returns the memref that this subview is taken from.
    pub fn source(&self) -> ValueRef<'c> {
        self.operand(0).expect("`memref.subview` operations always have a source operand")
    }
}

impl<'c> SizedMemRefOperation<'c> for SubViewOperationRef<'c> {
    const DYNAMIC_SIZES_OFFSET: usize = 1;
}

operation_ref!(
    /// Typed handle for `memref.dim` operations, which return the size of one dimension of a memref.
    Dim => Dim
);

impl<'c> DimOperationRef<'c> {
    /// Returns the memref whose dimension size this operation returns.
    pub fn source(&self) -> ValueRef<'c> {
        self.operand(0).expect("`memref.dim` operations always have a source operand")
    }

    /// Returns the operand that holds the index of the dimension whose size this operation returns.
    pub fn index(&self) -> ValueRef<'c> {
        self.operand(1).expect("`memref.dim` operations always have an index operand")
    }

    /// Returns the index of the dimension whose size this operation returns if it is a known non-negative constant.
    pub fn constant_index(&self) -> Option<usize> {
        arith::constant_value(self.index()).and_then(|index| usize::try_from(index).ok())
    }
}

/// Returns the memref type produced by `operation` along with its dynamic size operands if `operation` allocates or
/// views a memref (i.e., if it is a `memref.alloc`, `memref.view`, or `memref.subview` operation).
pub(crate) fn sized_memref_operation<'c>(
    operation: OperationRef<'c>,
) -> Option<(MemRefTypeRef<'c>, Vec<ValueRef<'c>>)> {
    fn parts<'c, O: SizedMemRefOperation<'c>>(operation: O) -> (MemRefTypeRef<'c>, Vec<ValueRef<'c>>) {
        (operation.result_type(), operation.dynamic_sizes())
    }

    match operation.kind() {
        OperationKind::Alloc => operation.cast::<AllocOperationRef>().map(parts),
        OperationKind::View => operation.cast::<ViewOperationRef>().map(parts),
        OperationKind::SubView => operation.cast::<SubViewOperationRef>().map(parts),
        _ => None,
    }
}

fn check_dynamic_size_count<'c, V: Value<'c>>(result_type: MemRefTypeRef<'c>, sizes: &[V]) -> Result<(), Error> {
    let expected_count = result_type.dynamic_dimension_count();
    if sizes.len() != expected_count {
        return Err(Error::OperandCountMismatch { expected_count, actual_count: sizes.len() });
    }
    Ok(())
}

fn build_sized<'c, O: Operation<'c>>(
    context: &'c Context,
    kind: OperationKind,
    leading_operands: &[ValueRef<'c>],
    sizes: &[ValueRef<'c>],
    result_type: MemRefTypeRef<'c>,
) -> Result<O, Error> {
    check_dynamic_size_count(result_type, sizes)?;
    let operation = OperationBuilder::for_kind(context, kind)
        .add_operands(leading_operands)
        .add_operands(sizes)
        .add_result(result_type)
        .build()?;
    Ok(operation.cast().expect("invalid arguments to sized `memref` operation constructor"))
}

/// Constructs a new detached `memref.alloc` operation that allocates a memref of the provided type. `dynamic_sizes`
/// must contain one `index` value per dynamic dimension of `memref_type`.
pub fn alloc<'c, V: Value<'c>>(
    context: &'c Context,
    memref_type: MemRefTypeRef<'c>,
    dynamic_sizes: &[V],
) -> Result<AllocOperationRef<'c>, Error> {
    let sizes = dynamic_sizes.iter().map(|size| size.as_ref()).collect::<Vec<_>>();
    build_sized(context, OperationKind::Alloc, &[], &sizes, memref_type)
}

/// Constructs a new detached `memref.view` operation over the `source` buffer. `sizes` must contain one `index` value
/// per dynamic dimension of `result_type`.
pub fn view<'c, S: Value<'c>, B: Value<'c>, V: Value<'c>>(
    context: &'c Context,
    source: S,
    byte_shift: B,
    sizes: &[V],
    result_type: MemRefTypeRef<'c>,
) -> Result<ViewOperationRef<'c>, Error> {
    let sizes = sizes.iter().map(|size| size.as_ref()).collect::<Vec<_>>();
    build_sized(context, OperationKind::View, &[source.as_ref(), byte_shift.as_ref()], &sizes, result_type)
}

/// Constructs a new detached `memref.subview` operation over the `source` memref. `sizes` must contain one `index`
/// value per dynamic dimension of `result_type`.
pub fn subview<'c, S: Value<'c>, V: Value<'c>>(
    context: &'c Context,
    source: S,
    sizes: &[V],
    result_type: MemRefTypeRef<'c>,
) -> Result<SubViewOperationRef<'c>, Error> {
    let sizes = sizes.iter().map(|size| size.as_ref()).collect::<Vec<_>>();
    build_sized(context, OperationKind::SubView, &[source.as_ref()], &sizes, result_type)
}

/// Constructs a new detached `memref.dim` operation that returns the size of the `index`-th dimension of `source`.
/// Returns an [`Error::InvalidOperation`] if `source` is not a memref.
pub fn dim<'c, S: Value<'c>, I: Value<'c>>(
    context: &'c Context,
    source: S,
    index: I,
) -> Result<DimOperationRef<'c>, Error> {
    if !source.r#type().is::<MemRefTypeRef>() {
        return Err(Error::InvalidOperation {
            message: format!("'memref.dim' expects a memref source but got a value of type '{}'", source.r#type()),
        });
    }
    let operation = OperationBuilder::for_kind(context, OperationKind::Dim)
        .add_operand(source)
        .add_operand(index)
        .add_result(context.index_type())
        .build()?;
    Ok(operation.cast().expect("invalid arguments to `memref::dim`"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{Context, Size};

    use super::*;

    #[test]
    fn test_alloc() {
        let context = Context::new();
        let block = context.block(&[context.index_type()]);
        let size = block.argument(0).unwrap();
        let memref_type = context.memref_type(&[Size::Static(4), Size::Dynamic], context.float_type(32), &[]);
        let alloc = alloc(&context, memref_type, &[size]).unwrap();
        assert_eq!(alloc.name(), "memref.alloc");
        assert_eq!(alloc.result_type(), memref_type);
        assert_eq!(alloc.dynamic_sizes(), vec![size.as_ref()]);
        assert_eq!(alloc.dynamic_size(0), None);
        assert_eq!(alloc.dynamic_size(1), Some(size.as_ref()));
        assert_eq!(
            super::alloc::<ValueRef>(&context, memref_type, &[]),
            Err(Error::OperandCountMismatch { expected_count: 1, actual_count: 0 }),
        );
    }

    #[test]
    fn test_view_and_subview() {
        let context = Context::new();
        let index_type = context.index_type();
        let block = context.block(&[index_type, index_type]);
        let shift = block.argument(0).unwrap();
        let size = block.argument(1).unwrap();
        let buffer_type = context.memref_type(&[Size::Static(64)], context.integer_type(8), &[]);
        let buffer = alloc::<ValueRef>(&context, buffer_type, &[]).unwrap();
        let view_type = context.memref_type(&[Size::Dynamic, Size::Static(4)], context.float_type(32), &[]);
        let view = view(&context, buffer.result(0).unwrap(), shift, &[size], view_type).unwrap();
        assert_eq!(view.source(), buffer.result(0).unwrap());
        assert_eq!(view.byte_shift(), shift);
        assert_eq!(view.dynamic_size(0), Some(size.as_ref()));
        assert_eq!(view.dynamic_size(1), None);

        let subview_type = context.memref_type(&[Size::Static(2), Size::Dynamic], context.float_type(32), &[]);
        let subview = subview(&context, view.result(0).unwrap(), &[size], subview_type).unwrap();
        assert_eq!(subview.source(), view.result(0).unwrap());
        assert_eq!(subview.dynamic_sizes(), vec![size.as_ref()]);
        assert_eq!(subview.dynamic_size(1), Some(size.as_ref()));

        let (result_type, dynamic_sizes) = sized_memref_operation(subview.as_ref()).unwrap();
        assert_eq!(result_type, subview_type);
        assert_eq!(dynamic_sizes, vec![size.as_ref()]);
        assert!(sized_memref_operation(arith::constant_index(&context, 0).as_ref()).is_none());
    }

    #[test]
    fn test_dim() {
        let context = Context::new();
        let memref_type = context.memref_type(&[Size::Dynamic], context.float_type(32), &[]);
        let block = context.block(&[memref_type.as_ref(), context.index_type().as_ref()]);
        let memref = block.argument(0).unwrap();
        let index = arith::constant_index(&context, 0);
        let dim = dim(&context, memref, index.result(0).unwrap()).unwrap();
        assert_eq!(dim.source(), memref);
        assert_eq!(dim.constant_index(), Some(0));
        assert!(dim.result(0).unwrap().r#type().is_index());

        let dynamic_dim = super::dim(&context, memref, block.argument(1).unwrap()).unwrap();
        assert_eq!(dynamic_dim.constant_index(), None);
        assert!(matches!(
            super::dim(&context, block.argument(1).unwrap(), index.result(0).unwrap()),
            Err(Error::InvalidOperation { .. }),
        ));
    }
}

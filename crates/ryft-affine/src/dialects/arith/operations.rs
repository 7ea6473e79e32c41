use crate::operations::OperationProperties;
use crate::{Context, Operation, OperationBuilder, OperationKind, OperationRef, Type, Value};

operation_ref!(
    /// Typed handle for `arith.constant` operations that produce integer or `index` constants.
    Constant => Constant
);

impl<'c> ConstantOperationRef<'c> {
    /// Returns the value of this constant.
    pub fn value(&self) -> i64 {
        match self.as_ref().properties() {
            OperationProperties::Constant(value) => value,
            _ => unreachable!("`arith.constant` operations always have a value"),
        }
    }
}

/// Constructs a new detached `arith.constant` operation that produces `value` as a constant of the provided [`Type`].
pub fn constant<'c, T: Type<'c>>(context: &'c Context, value: i64, r#type: T) -> ConstantOperationRef<'c> {
    OperationBuilder::for_kind(context, OperationKind::Constant)
        .with_properties(OperationProperties::Constant(value))
        .add_result(r#type)
        .build()
        .ok()
        .and_then(|operation: OperationRef<'c>| operation.cast())
        .expect("invalid arguments to `arith::constant`")
}

/// Constructs a new detached `arith.constant` operation that produces `value` as an `index` constant.
pub fn constant_index(context: &Context, value: i64) -> ConstantOperationRef<'_> {
    constant(context, value, context.index_type())
}

/// Returns the constant that `value` holds if it is the result of an `arith.constant` operation, and [`None`]
/// otherwise.
pub fn constant_value<'c, V: Value<'c>>(value: V) -> Option<i64> {
    value
        .defining_operation()
        .and_then(|operation| operation.cast::<ConstantOperationRef>())
        .map(|constant| constant.value())
}

use crate::operations::OperationProperties;
use crate::{BlockRef, Context, Operation, OperationBuilder, OperationKind, OperationRef, RegionRef, Type};

operation_ref!(
    /// Typed handle for `func.func` operations. Functions have a single region whose entry block takes the function
    /// arguments. They are [`AffineScope`](crate::OperationTrait::AffineScope)s and they are
    /// [`IsolatedFromAbove`](crate::OperationTrait::IsolatedFromAbove).
    Func => Function
);

impl<'c> FuncOperationRef<'c> {
    /// Returns the symbol name of this function.
    pub fn symbol_name(&self) -> String {
        match self.as_ref().properties() {
            OperationProperties::Symbol(name) => name,
            _ => unreachable!("`func.func` operations always have a symbol name"),
        }
    }

    /// Returns the body of this function.
    pub fn body(&self) -> RegionRef<'c> {
        self.region(0).expect("`func.func` operations always have a body region")
    }

    /// Returns the entry block of the body of this function (i.e., the block whose arguments are the function
    /// arguments).
    pub fn entry_block(&self) -> BlockRef<'c> {
        self.body().entry_block().expect("`func.func` operations always have an entry block")
    }
}

/// Constructs a new detached `func.func` operation with the provided symbol name and argument types. The body of the
/// function consists of a single empty block that takes one argument per argument type.
pub fn func<'c, T: Type<'c>>(context: &'c Context, name: &str, argument_types: &[T]) -> FuncOperationRef<'c> {
    let body = context.region();
    body.append_block(context.block(argument_types))
        .and_then(|_| {
            OperationBuilder::for_kind(context, OperationKind::Function)
                .with_properties(OperationProperties::Symbol(name.to_string()))
                .add_region(body)
                .build()
        })
        .ok()
        .and_then(|operation: OperationRef<'c>| operation.cast())
        .expect("invalid arguments to `func::func`")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{Context, OperationTrait, Value};

    use super::*;

    #[test]
    fn test_func() {
        let context = Context::new();
        let function = func(&context, "main", &[context.index_type().as_ref(), context.float_type(32).as_ref()]);
        assert_eq!(function.name(), "func.func");
        assert_eq!(function.symbol_name(), "main");
        assert_eq!(function.operand_count(), 0);
        assert_eq!(function.result_count(), 0);
        assert_eq!(function.region_count(), 1);
        assert!(function.has_trait(OperationTrait::AffineScope));
        assert!(function.has_trait(OperationTrait::IsolatedFromAbove));
        assert_eq!(function.body().block_count(), 1);
        assert_eq!(function.entry_block().argument_count(), 2);
        let argument = function.entry_block().argument(1).unwrap();
        assert_eq!(argument.r#type(), context.float_type(32));
        assert_eq!(function.parent_block(), None);
        assert_eq!(format!("{function:?}"), "FuncOperationRef[func.func]");
    }
}

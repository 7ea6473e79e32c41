/// Generates trait implementations for handle subtype structs (e.g., [`AffineExpression`](crate::AffineExpression)
/// subtypes like [`DimensionAffineExpressionRef`](crate::DimensionAffineExpressionRef), or
/// [`Operation`](crate::Operation) subtypes like [`AffineForOperationRef`](crate::AffineForOperationRef)).
///
/// All handle structs in this crate consist of an `id` that identifies the underlying object in its owning
/// [`Context`](crate::Context) and of a reference to that [`Context`](crate::Context). Two handles are equal when
/// they belong to the same [`Context`](crate::Context) and point to the same object, irrespective of their subtype.
///
/// # Parameters
///
///   - `subtype`: Name of the subtype struct (e.g., `DimensionAffineExpressionRef`).
///   - `lifetime`: Lifetime parameter of the subtype (e.g., `'c`).
///   - `type`: Name of the super-type trait (e.g., `AffineExpression`).
///   - `base`: Name of the type-erased handle for the super-type (e.g., `AffineExpressionRef`).
///   - `is`: Closure-like predicate over the type-erased handle that decides whether it is an instance of `subtype`.
///
/// # Example
///
/// ```ignore
/// subtype_trait_impls!(
///     DimensionAffineExpressionRef<'c> as AffineExpression,
///     base = AffineExpressionRef,
///     is = |expression| expression.kind() == AffineExpressionKind::Dimension,
/// );
/// ```
///
/// For this example, this macro will generate implementations for the following traits:
///   - `AffineExpression` (using the provided predicate for `from_ref`),
///   - [`PartialEq`] for any other `AffineExpression`,
///   - [`Eq`] and [`Hash`](std::hash::Hash),
///   - [`Display`](std::fmt::Display) delegating to the type-erased handle, and
///   - [`Debug`](std::fmt::Debug) wrapping the [`Display`](std::fmt::Display) output.
///
/// When only `subtype<lifetime> as type` is provided, the super-type trait and [`Display`](std::fmt::Display)
/// implementations are omitted (this is used for the type-erased handles themselves).
macro_rules! subtype_trait_impls {
    (
        $subtype:ident<$lifetime:lifetime> as $type:ident,
        base = $base:ident,
        is = |$value:ident| $predicate:expr $(,)?
    ) => {
        impl<$lifetime> $type<$lifetime> for $subtype<$lifetime> {
            fn from_ref($value: $base<$lifetime>) -> Option<Self> {
                if $predicate { Some(Self { id: $value.id, context: $value.context }) } else { None }
            }

            fn as_ref(&self) -> $base<$lifetime> {
                $base { id: self.id, context: self.context }
            }
        }

        impl<$lifetime> std::fmt::Display for $subtype<$lifetime> {
            fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.as_ref(), formatter)
            }
        }

        subtype_trait_impls!($subtype<$lifetime> as $type);
    };
    ($subtype:ident<$lifetime:lifetime> as $type:ident $(,)?) => {
        impl<$lifetime, T: $type<$lifetime>> PartialEq<T> for $subtype<$lifetime> {
            fn eq(&self, other: &T) -> bool {
                let other = other.as_ref();
                std::ptr::eq(self.context, other.context) && self.id == other.id
            }
        }

        impl<$lifetime> Eq for $subtype<$lifetime> {}

        impl<$lifetime> std::hash::Hash for $subtype<$lifetime> {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.id.hash(state);
            }
        }

        impl<$lifetime> std::fmt::Debug for $subtype<$lifetime> {
            fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(formatter, "{}[{}]", stringify!($subtype), self)
            }
        }
    };
}

/// Defines a typed handle for [`Operation`](crate::Operation)s of a specific [`OperationKind`](crate::OperationKind).
/// The generated struct is named `<name>OperationRef` and it can be obtained from any other operation handle using
/// [`Operation::cast`](crate::Operation::cast), which succeeds only when the underlying operation has the provided
/// kind.
///
/// # Example
///
/// ```ignore
/// operation_ref!(
///     /// Typed handle for `affine.for` operations.
///     AffineFor => AffineFor
/// );
/// ```
macro_rules! operation_ref {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        paste::paste! {
            $(#[$meta])*
            #[derive(Copy, Clone)]
            pub struct [<$name OperationRef>]<'c> {
                /// Identifier of this [`Operation`](crate::Operation) in the IR arena of its owning
                /// [`Context`](crate::Context).
                pub(crate) id: usize,

                /// [`Context`](crate::Context) that owns this [`Operation`](crate::Operation).
                pub(crate) context: &'c $crate::Context,
            }

            subtype_trait_impls!(
                [<$name OperationRef>]<'c> as Operation,
                base = OperationRef,
                is = |operation| operation.kind() == $crate::OperationKind::$kind,
            );
        }
    };
}

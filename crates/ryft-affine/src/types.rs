use std::fmt::{Debug, Display};

use crate::{AffineMap, Context};

/// Uniqued representation of a [`Type`] inside a [`Context`]. Nested types and layout maps are referred to using
/// their identifiers in the same [`Context`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum TypeStorage {
    Index,
    Integer { width: usize },
    Float { width: usize },
    MemRef { shape: Vec<Size>, element_type: usize, layouts: Vec<usize> },
    Vector { shape: Vec<usize>, element_type: usize },
}

/// Size of a single dimension of a [`MemRefTypeRef`]. Dynamic sizes are only known at runtime and are rendered as `?`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Size {
    Static(usize),
    Dynamic,
}

impl Size {
    /// Returns the value of this [`Size`] if it is static, and [`None`] otherwise.
    pub fn value(&self) -> Option<usize> {
        match self {
            Self::Static(value) => Some(*value),
            Self::Dynamic => None,
        }
    }

    /// Returns `true` if this [`Size`] is only known at runtime.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic)
    }
}

impl Display for Size {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(value) => write!(formatter, "{value}"),
            Self::Dynamic => write!(formatter, "?"),
        }
    }
}

/// Each [`Value`](crate::Value) has a [`Type`]. This crate only models the small set of builtin types that the affine
/// analyses need to inspect: the `index` type that all dimensions and symbols must have, integer and floating-point
/// types, and the `memref` and `vector` container types.
///
/// This trait acts effectively as the super-type of all [`Type`]s and can be checked and specialized using the
/// [`Type::is`] and [`Type::cast`] functions.
///
/// Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/LangRef/#type-system) for more information.
pub trait Type<'c>: Sized + Copy + PartialEq + Eq + Display + Debug {
    /// Tries to construct a new instance of this type from the provided type-erased [`TypeRef`], returning [`None`]
    /// if that type is not an instance of this type.
    fn from_ref(r#type: TypeRef<'c>) -> Option<Self>;

    /// Up-casts this type to an instance of [`TypeRef`] (i.e., the most generic type reference).
    fn as_ref(&self) -> TypeRef<'c>;

    /// Returns a reference to the [`Context`] that owns this type.
    fn context(&self) -> &'c Context {
        self.as_ref().context
    }

    /// Returns `true` if this type is an instance of `T`.
    fn is<T: Type<'c>>(&self) -> bool {
        self.cast::<T>().is_some()
    }

    /// Tries to cast this type to an instance of `T` (e.g., an instance of [`MemRefTypeRef`]). If this is not an
    /// instance of the specified type, this function will return [`None`].
    fn cast<T: Type<'c>>(&self) -> Option<T> {
        T::from_ref(self.as_ref())
    }

    /// Returns `true` if this is the `index` type.
    fn is_index(&self) -> bool {
        self.is::<IndexTypeRef>()
    }
}

/// Reference to a [`Type`] that is owned by a [`Context`].
#[derive(Copy, Clone)]
pub struct TypeRef<'c> {
    /// Identifier of this [`Type`] in its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`Type`].
    pub(crate) context: &'c Context,
}

impl<'c> TypeRef<'c> {
    pub(crate) fn storage(&self) -> TypeStorage {
        self.context.types.borrow().get(self.id).clone()
    }
}

impl<'c> Type<'c> for TypeRef<'c> {
    fn from_ref(r#type: TypeRef<'c>) -> Option<Self> {
        Some(r#type)
    }

    fn as_ref(&self) -> TypeRef<'c> {
        *self
    }
}

impl Display for TypeRef<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let element = |id: usize| TypeRef { id, context: self.context };
        match self.storage() {
            TypeStorage::Index => write!(formatter, "index"),
            TypeStorage::Integer { width } => write!(formatter, "i{width}"),
            TypeStorage::Float { width } => write!(formatter, "f{width}"),
            TypeStorage::MemRef { shape, element_type, layouts } => {
                write!(formatter, "memref<")?;
                for size in shape {
                    write!(formatter, "{size}x")?;
                }
                write!(formatter, "{}", element(element_type))?;
                for layout in layouts {
                    write!(formatter, ", {}", AffineMap { id: layout, context: self.context })?;
                }
                write!(formatter, ">")
            }
            TypeStorage::Vector { shape, element_type } => {
                write!(formatter, "vector<")?;
                for size in shape {
                    write!(formatter, "{size}x")?;
                }
                write!(formatter, "{}>", element(element_type))
            }
        }
    }
}

subtype_trait_impls!(TypeRef<'c> as Type);

/// Built-in `index` [`Type`]. Values of this type hold target-specific machine-word sized integers and are the only
/// values that can be bound to the dimensions and symbols of [`AffineMap`]s.
#[derive(Copy, Clone)]
pub struct IndexTypeRef<'c> {
    /// Identifier of this [`Type`] in its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`Type`].
    pub(crate) context: &'c Context,
}

subtype_trait_impls!(IndexTypeRef<'c> as Type, base = TypeRef, is = |r#type| r#type.storage() == TypeStorage::Index);

/// Built-in signless integer [`Type`] with a fixed bit width (e.g., `i32`).
#[derive(Copy, Clone)]
pub struct IntegerTypeRef<'c> {
    /// Identifier of this [`Type`] in its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`Type`].
    pub(crate) context: &'c Context,
}

impl IntegerTypeRef<'_> {
    /// Returns the bit width of this [`IntegerTypeRef`].
    pub fn width(&self) -> usize {
        match self.as_ref().storage() {
            TypeStorage::Integer { width } => width,
            _ => unreachable!("integer types are always backed by integer storage"),
        }
    }
}

subtype_trait_impls!(
    IntegerTypeRef<'c> as Type,
    base = TypeRef,
    is = |r#type| matches!(r#type.storage(), TypeStorage::Integer { .. }),
);

/// Built-in floating-point [`Type`] with a fixed bit width (e.g., `f32`).
#[derive(Copy, Clone)]
pub struct FloatTypeRef<'c> {
    /// Identifier of this [`Type`] in its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`Type`].
    pub(crate) context: &'c Context,
}

impl FloatTypeRef<'_> {
    /// Returns the bit width of this [`FloatTypeRef`].
    pub fn width(&self) -> usize {
        match self.as_ref().storage() {
            TypeStorage::Float { width } => width,
            _ => unreachable!("float types are always backed by float storage"),
        }
    }
}

subtype_trait_impls!(
    FloatTypeRef<'c> as Type,
    base = TypeRef,
    is = |r#type| matches!(r#type.storage(), TypeStorage::Float { .. }),
);

/// Built-in `memref` [`Type`] which represents a reference to a region of memory with a (possibly partially dynamic)
/// shape, an element type, and an optional list of layout [`AffineMap`]s that map logical indices to storage
/// locations. A `memref` without any layout maps uses the identity layout.
///
/// Refer to the [official MLIR documentation](https://mlir.llvm.org/docs/Dialects/Builtin/#memreftype)
/// for more information.
#[derive(Copy, Clone)]
pub struct MemRefTypeRef<'c> {
    /// Identifier of this [`Type`] in its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`Type`].
    pub(crate) context: &'c Context,
}

impl<'c> MemRefTypeRef<'c> {
    fn parts(&self) -> (Vec<Size>, usize, Vec<usize>) {
        match self.as_ref().storage() {
            TypeStorage::MemRef { shape, element_type, layouts } => (shape, element_type, layouts),
            _ => unreachable!("memref types are always backed by memref storage"),
        }
    }

    /// Returns the rank (i.e., number of dimensions) of this [`MemRefTypeRef`].
    pub fn rank(&self) -> usize {
        self.parts().0.len()
    }

    /// Returns the shape of this [`MemRefTypeRef`].
    pub fn shape(&self) -> Vec<Size> {
        self.parts().0
    }

    /// Returns the size of the `index`-th dimension of this [`MemRefTypeRef`], or [`None`] if it is out of bounds.
    pub fn dimension(&self, index: usize) -> Option<Size> {
        self.parts().0.get(index).copied()
    }

    /// Returns `true` if the `index`-th dimension of this [`MemRefTypeRef`] has a dynamic size.
    pub fn is_dynamic_dimension(&self, index: usize) -> bool {
        self.dimension(index).is_some_and(|size| size.is_dynamic())
    }

    /// Returns the number of dynamic dimensions of this [`MemRefTypeRef`].
    pub fn dynamic_dimension_count(&self) -> usize {
        self.parts().0.iter().filter(|size| size.is_dynamic()).count()
    }

    /// Returns the position of the `index`-th dimension among the dynamic dimensions of this [`MemRefTypeRef`] (which
    /// is also the position of its size among the dynamic size operands of the operation that allocates the memory),
    /// or [`None`] if that dimension is static.
    pub fn dynamic_dimension_index(&self, index: usize) -> Option<usize> {
        let shape = self.parts().0;
        match shape.get(index) {
            Some(Size::Dynamic) => Some(shape[..index].iter().filter(|size| size.is_dynamic()).count()),
            _ => None,
        }
    }

    /// Returns the element [`Type`] of this [`MemRefTypeRef`].
    pub fn element_type(&self) -> TypeRef<'c> {
        TypeRef { id: self.parts().1, context: self.context }
    }

    /// Returns the layout [`AffineMap`]s of this [`MemRefTypeRef`].
    pub fn layouts(&self) -> Vec<AffineMap<'c>> {
        self.parts().2.into_iter().map(|id| AffineMap { id, context: self.context }).collect()
    }

    /// Returns `true` if this [`MemRefTypeRef`] has no layout maps or a single identity layout map.
    pub fn has_identity_layout(&self) -> bool {
        match self.layouts().as_slice() {
            [] => true,
            [layout] => layout.is_identity(),
            _ => false,
        }
    }
}

subtype_trait_impls!(
    MemRefTypeRef<'c> as Type,
    base = TypeRef,
    is = |r#type| matches!(r#type.storage(), TypeStorage::MemRef { .. }),
);

/// Built-in `vector` [`Type`] with a static shape.
#[derive(Copy, Clone)]
pub struct VectorTypeRef<'c> {
    /// Identifier of this [`Type`] in its owning [`Context`].
    pub(crate) id: usize,

    /// [`Context`] that owns this [`Type`].
    pub(crate) context: &'c Context,
}

impl<'c> VectorTypeRef<'c> {
    fn parts(&self) -> (Vec<usize>, usize) {
        match self.as_ref().storage() {
            TypeStorage::Vector { shape, element_type } => (shape, element_type),
            _ => unreachable!("vector types are always backed by vector storage"),
        }
    }

    /// Returns the rank (i.e., number of dimensions) of this [`VectorTypeRef`].
    pub fn rank(&self) -> usize {
        self.parts().0.len()
    }

    /// Returns the shape of this [`VectorTypeRef`].
    pub fn shape(&self) -> Vec<usize> {
        self.parts().0
    }

    /// Returns the element [`Type`] of this [`VectorTypeRef`].
    pub fn element_type(&self) -> TypeRef<'c> {
        TypeRef { id: self.parts().1, context: self.context }
    }
}

subtype_trait_impls!(
    VectorTypeRef<'c> as Type,
    base = TypeRef,
    is = |r#type| matches!(r#type.storage(), TypeStorage::Vector { .. }),
);

impl Context {
    fn intern_type(&self, storage: TypeStorage) -> TypeRef<'_> {
        let id = self.types.borrow_mut().intern(storage);
        TypeRef { id, context: self }
    }

    /// Returns the `index` [`Type`].
    pub fn index_type(&self) -> IndexTypeRef<'_> {
        let r#type = self.intern_type(TypeStorage::Index);
        IndexTypeRef { id: r#type.id, context: self }
    }

    /// Returns the signless integer [`Type`] with the provided bit width.
    pub fn integer_type(&self, width: usize) -> IntegerTypeRef<'_> {
        let r#type = self.intern_type(TypeStorage::Integer { width });
        IntegerTypeRef { id: r#type.id, context: self }
    }

    /// Returns the floating-point [`Type`] with the provided bit width.
    pub fn float_type(&self, width: usize) -> FloatTypeRef<'_> {
        let r#type = self.intern_type(TypeStorage::Float { width });
        FloatTypeRef { id: r#type.id, context: self }
    }

    /// Returns the `memref` [`Type`] with the provided shape, element type, and layout maps.
    pub fn memref_type<'c, T: Type<'c>>(
        &'c self,
        shape: &[Size],
        element_type: T,
        layouts: &[AffineMap<'c>],
    ) -> MemRefTypeRef<'c> {
        let r#type = self.intern_type(TypeStorage::MemRef {
            shape: shape.to_vec(),
            element_type: element_type.as_ref().id,
            layouts: layouts.iter().map(|layout| layout.id).collect(),
        });
        MemRefTypeRef { id: r#type.id, context: self }
    }

    /// Returns the `vector` [`Type`] with the provided shape and element type.
    pub fn vector_type<'c, T: Type<'c>>(&'c self, shape: &[usize], element_type: T) -> VectorTypeRef<'c> {
        let r#type =
            self.intern_type(TypeStorage::Vector { shape: shape.to_vec(), element_type: element_type.as_ref().id });
        VectorTypeRef { id: r#type.id, context: self }
    }
}

use crate::operations::{OperationProperties, OperationStorage};
use crate::values::ValueOwner;
use crate::{Context, Error, OperationKind, OperationRef, OperationTrait, RegionRef, Type, TypeRef, Value, ValueRef};

/// [`OperationBuilder`]s are used to build [`Operation`](crate::Operation)s. Operations that are built using
/// [`OperationBuilder::new`] are [`OperationKind::Generic`] operations: they are opaque to the analyses in this
/// crate except for their operands, results, regions, and [`OperationTrait`]s. Operations of the known kinds are
/// built using the constructor functions of their dialects (e.g., [`affine::apply`](crate::dialects::affine::apply)).
pub struct OperationBuilder<'c> {
    context: &'c Context,
    kind: OperationKind,
    name: String,
    properties: OperationProperties,
    traits: Vec<OperationTrait>,
    operands: Vec<ValueRef<'c>>,
    result_types: Vec<TypeRef<'c>>,
    regions: Vec<RegionRef<'c>>,
}

impl<'c> OperationBuilder<'c> {
    /// Creates a new [`OperationBuilder`] for a generic operation with the provided name.
    pub fn new<S: Into<String>>(context: &'c Context, name: S) -> Self {
        Self {
            context,
            kind: OperationKind::Generic,
            name: name.into(),
            properties: OperationProperties::None,
            traits: Vec::new(),
            operands: Vec::new(),
            result_types: Vec::new(),
            regions: Vec::new(),
        }
    }

    /// Creates a new [`OperationBuilder`] for an operation of the provided (non-generic) [`OperationKind`].
    pub(crate) fn for_kind(context: &'c Context, kind: OperationKind) -> Self {
        let mut builder = Self::new(context, kind.name().unwrap_or("builtin.unknown"));
        builder.kind = kind;
        builder.traits = kind.traits().to_vec();
        builder
    }

    pub(crate) fn with_properties(mut self, properties: OperationProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Returns a reference to the [`Context`] associated with this [`OperationBuilder`].
    pub fn context(&self) -> &'c Context {
        self.context
    }

    /// Adds the provided [`OperationTrait`] to the [`Operation`](crate::Operation) that is being built.
    pub fn add_trait(mut self, r#trait: OperationTrait) -> Self {
        if !self.traits.contains(&r#trait) {
            self.traits.push(r#trait);
        }
        self
    }

    /// Adds the provided [`Value`] as an operand (i.e., input) to the [`Operation`](crate::Operation) that is being
    /// built.
    pub fn add_operand<V: Value<'c>>(mut self, operand: V) -> Self {
        self.operands.push(operand.as_ref());
        self
    }

    /// Adds the provided [`Value`]s as operands (i.e., inputs) to the [`Operation`](crate::Operation) that is being
    /// built.
    pub fn add_operands<V: Value<'c>>(mut self, operands: &[V]) -> Self {
        self.operands.extend(operands.iter().map(|operand| operand.as_ref()));
        self
    }

    /// Adds a result (i.e., output) with the provided [`Type`] to the [`Operation`](crate::Operation) that is being
    /// built.
    pub fn add_result<T: Type<'c>>(mut self, result_type: T) -> Self {
        self.result_types.push(result_type.as_ref());
        self
    }

    /// Adds results (i.e., outputs) with the provided [`Type`]s to the [`Operation`](crate::Operation) that is being
    /// built.
    pub fn add_results<T: Type<'c>>(mut self, result_types: &[T]) -> Self {
        self.result_types.extend(result_types.iter().map(|result_type| result_type.as_ref()));
        self
    }

    /// Adds the provided detached region to the [`Operation`](crate::Operation) that is being built. The region is
    /// attached to the operation when [`OperationBuilder::build`] is called.
    pub fn add_region(mut self, region: RegionRef<'c>) -> Self {
        self.regions.push(region);
        self
    }

    /// Builds a new detached [`Operation`](crate::Operation) using the information that was provided to this
    /// builder. Returns an [`Error::ContextMismatch`] if any of the operands, result types, or regions belongs to a
    /// different [`Context`], and an [`Error::InvalidOperation`] if any of the regions is already attached to an
    /// operation.
    pub fn build(self) -> Result<OperationRef<'c>, Error> {
        let context = self.context;
        let same_context = |other: &Context| std::ptr::eq(context, other);
        if !self.operands.iter().all(|operand| same_context(operand.context))
            || !self.result_types.iter().all(|result_type| same_context(result_type.context))
            || !self.regions.iter().all(|region| same_context(region.context))
        {
            return Err(Error::ContextMismatch);
        }

        {
            let ir = context.ir.borrow();
            for (index, region) in self.regions.iter().enumerate() {
                if ir.regions[region.id].parent_operation.is_some() || self.regions[..index].contains(region) {
                    let name = &self.name;
                    let message = format!("region #{} of '{name}' is already attached to an operation", region.id);
                    return Err(Error::InvalidOperation { message });
                }
            }
        }

        let id = {
            let mut ir = context.ir.borrow_mut();
            ir.operations.push(OperationStorage {
                kind: self.kind,
                name: self.name,
                properties: self.properties,
                traits: self.traits,
                operands: self.operands.iter().map(|operand| operand.id).collect(),
                results: Vec::new(),
                regions: self.regions.iter().map(|region| region.id).collect(),
                parent_block: None,
            });
            ir.operations.len() - 1
        };

        let results = self
            .result_types
            .iter()
            .enumerate()
            .map(|(index, result_type)| {
                context.create_value(*result_type, ValueOwner::OperationResult { operation: id, index })
            })
            .collect();

        let mut ir = context.ir.borrow_mut();
        ir.operations[id].results = results;
        for (operand_index, operand) in self.operands.iter().enumerate() {
            ir.values[operand.id].uses.push((id, operand_index));
        }
        for region in &self.regions {
            ir.regions[region.id].parent_operation = Some(id);
        }

        tracing::trace!(operation = %ir.operations[id].name, id, "built operation");
        Ok(OperationRef { id, context })
    }
}

use std::fmt::{Debug, Display};

use crate::{Context, Operation, OperationRef};

/// Severity level of a [`Diagnostic`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Note,
    Remark,
}

impl Display for DiagnosticSeverity {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(formatter, "error"),
            Self::Warning => write!(formatter, "warning"),
            Self::Note => write!(formatter, "note"),
            Self::Remark => write!(formatter, "remark"),
        }
    }
}

/// Diagnostic reported by an analysis or by a user of this crate through [`Context::emit_diagnostic`]. Diagnostics
/// are only guaranteed to be live for the duration of a diagnostics handler call and so they must not be stored
/// outside diagnostic handlers. Refer to [`Context::attach_diagnostics_handler`] for more information.
pub struct Diagnostic<'c> {
    /// [`Context`] that owns this [`Diagnostic`].
    context: &'c Context,

    /// [`DiagnosticSeverity`] of this [`Diagnostic`].
    severity: DiagnosticSeverity,

    /// Message of this [`Diagnostic`].
    message: String,

    /// Optional [`OperationRef`] at which this [`Diagnostic`] was reported.
    operation: Option<OperationRef<'c>>,
}

impl<'c> Diagnostic<'c> {
    /// Returns a reference to the [`Context`] that owns this [`Diagnostic`].
    pub fn context(&self) -> &'c Context {
        self.context
    }

    /// Returns the [`DiagnosticSeverity`] of this [`Diagnostic`].
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    /// Returns the message of this [`Diagnostic`].
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the [`OperationRef`] at which this [`Diagnostic`] was reported, if any.
    pub fn operation(&self) -> Option<OperationRef<'c>> {
        self.operation
    }
}

impl Display for Diagnostic<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.message)
    }
}

impl Debug for Diagnostic<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.operation {
            Some(operation) => write!(formatter, "Diagnostic[{}: {} @ {}]", self.severity, self.message, operation),
            None => write!(formatter, "Diagnostic[{}: {}]", self.severity, self.message),
        }
    }
}

/// Type of the [`Diagnostic`] handlers that are stored in a [`Context`].
pub(crate) type DiagnosticHandler = Box<dyn FnMut(&Diagnostic<'_>) -> bool>;

/// ID of a [`Diagnostic`] handler. Refer to [`Context::attach_diagnostics_handler`] for more information.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DiagnosticHandlerId {
    pub(crate) id: usize,
}

impl Context {
    /// Attaches a [`Diagnostic`]s handler to this [`Context`] and returns a [`DiagnosticHandlerId`] that can be used
    /// to detach the handler later on, if needed, using [`Context::detach_diagnostics_handler`]. Note that handlers
    /// will be invoked in the reverse order of attachment until one of them processes the [`Diagnostic`] completely.
    /// Handlers will be automatically dropped when detached from the [`Context`] or when the [`Context`] they are
    /// attached to is dropped.
    ///
    /// # Parameters
    ///
    ///   * `handler` - Function that accepts a [`Diagnostic`], which is only guaranteed to be live during the call,
    ///     and returns `true` when it processes the input [`Diagnostic`] completely (meaning that no other handler
    ///     will be invoked later on for the same [`Diagnostic`]), and `false` otherwise to let other handlers attempt
    ///     to process the [`Diagnostic`].
    pub fn attach_diagnostics_handler<F: FnMut(&Diagnostic<'_>) -> bool + 'static>(
        &self,
        handler: F,
    ) -> DiagnosticHandlerId {
        let id = self.next_diagnostic_handler_id.get();
        self.next_diagnostic_handler_id.set(id + 1);
        self.diagnostic_handlers.borrow_mut().push((id, Box::new(handler)));
        DiagnosticHandlerId { id }
    }

    /// Detaches a [`Diagnostic`]s handler from this [`Context`]. Note that this will also drop the underlying handler.
    /// Detaching a handler from within a diagnostics handler call has no effect.
    pub fn detach_diagnostics_handler(&self, id: DiagnosticHandlerId) {
        self.diagnostic_handlers.borrow_mut().retain(|(handler_id, _)| *handler_id != id.id);
    }

    /// Emits a new [`Diagnostic`] with the provided severity and message, optionally attached to an [`Operation`].
    /// The [`Diagnostic`] is passed to the attached handlers (newest first) until one of them consumes it. If none
    /// does, it is logged using [`tracing`] unless [`ContextOptions::log_unhandled_diagnostics`] is `false`.
    ///
    /// [`ContextOptions::log_unhandled_diagnostics`]: crate::ContextOptions::log_unhandled_diagnostics
    pub fn emit_diagnostic<'c, O: Operation<'c>>(
        &'c self,
        severity: DiagnosticSeverity,
        message: impl Into<String>,
        operation: Option<O>,
    ) {
        let diagnostic = Diagnostic {
            context: self,
            severity,
            message: message.into(),
            operation: operation.map(|operation| operation.as_ref()),
        };

        // The handlers are moved out of the cell while they run so that they can use this context freely.
        let mut handlers = std::mem::take(&mut *self.diagnostic_handlers.borrow_mut());
        let consumed = handlers.iter_mut().rev().any(|(_, handler)| handler(&diagnostic));
        {
            let mut current_handlers = self.diagnostic_handlers.borrow_mut();
            handlers.append(&mut current_handlers);
            *current_handlers = handlers;
        }

        if !consumed && self.options().log_unhandled_diagnostics {
            let operation = diagnostic.operation.map(|operation| operation.to_string()).unwrap_or_default();
            match severity {
                DiagnosticSeverity::Error => tracing::error!(%operation, "{}", diagnostic.message),
                DiagnosticSeverity::Warning => tracing::warn!(%operation, "{}", diagnostic.message),
                DiagnosticSeverity::Note => tracing::info!(%operation, "{}", diagnostic.message),
                DiagnosticSeverity::Remark => tracing::debug!(%operation, "{}", diagnostic.message),
            }
        }
    }
}

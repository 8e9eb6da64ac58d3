use std::borrow::Cow;

/// Errors that can occur during event bus operations.
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    /// Occurs when an internal dynamic cast fails.
    /// This usually indicates an invariant violation in the channel registry.
    #[error("Type mismatch{}: {message}", format_context(.context))]
    TypeMismatch { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Capacity must be greater than zero for event streams.
    #[error("Invalid capacity{}: {message}", format_context(.context))]
    InvalidCapacity { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

/// Attaches caller context to an event bus result.
pub trait EventBusErrorExt<T> {
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, EventBusError>;
}

impl<T> EventBusErrorExt<T> for Result<T, EventBusError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            match &mut e {
                EventBusError::TypeMismatch { context: c, .. }
                | EventBusError::InvalidCapacity { context: c, .. } => *c = Some(context.into()),
            }
            e
        })
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

use opforge_core::{Event, ExpressionScope};

/// Context handed to resolvers while a delegate is being built.
///
/// Borrows the initialiser event, so it cannot outlive the scope that owns
/// that event.
#[derive(Debug, Clone, Copy)]
pub struct ValueResolvingContext<'a> {
    event: &'a Event,
}

impl<'a> ValueResolvingContext<'a> {
    #[must_use]
    pub fn new(event: &'a Event) -> Self {
        Self { event }
    }

    #[must_use]
    pub fn event(&self) -> &'a Event {
        self.event
    }

    /// The scope expressions are evaluated against.
    #[must_use]
    pub fn scope(&self) -> &'a dyn ExpressionScope {
        self.event
    }
}

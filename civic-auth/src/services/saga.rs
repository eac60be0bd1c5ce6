//! Compensation stack for multi-resource writes.
//!
//! A saga is a linear sequence of steps, each optionally paired with a
//! compensating action. Steps run in order; after a step succeeds its
//! compensation is pushed here, and a later failure unwinds the stack in
//! reverse. A compensation that itself fails is logged and skipped so it
//! never masks the original error.

use futures::future::BoxFuture;

type Compensation = (&'static str, BoxFuture<'static, Result<(), anyhow::Error>>);

pub struct Saga {
    name: &'static str,
    compensations: Vec<Compensation>,
}

impl Saga {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            compensations: Vec::new(),
        }
    }

    /// Register the compensating action for a step that just committed.
    pub fn on_rollback<F>(&mut self, label: &'static str, action: F)
    where
        F: std::future::Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.compensations.push((label, Box::pin(action)));
    }

    /// All steps committed; discard the compensations.
    pub fn commit(mut self) {
        self.compensations.clear();
    }

    /// Run the registered compensations in reverse order.
    pub async fn unwind(mut self) {
        while let Some((label, action)) = self.compensations.pop() {
            tracing::warn!(saga = self.name, step = label, "Rolling back saga step");
            if let Err(e) = action.await {
                tracing::error!(
                    saga = self.name,
                    step = label,
                    error = %e,
                    "Saga compensation failed; continuing unwind"
                );
            }
        }
    }
}

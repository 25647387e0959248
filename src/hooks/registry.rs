use super::types::{HookContext, HookEvent, HookScope};
use anyhow::Result;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Receives stage lifecycle notifications. Every method defaults to a no-op.
pub trait StepObserver: Send + Sync {
    fn on_before(&self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_after(&self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_error(&self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_pause(&self, _ctx: &HookContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Adapts a closure into an observer that handles every event it is
/// registered for.
pub struct FnObserver<F>(F);

impl<F> FnObserver<F>
where
    F: Fn(&HookContext<'_>) -> Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> StepObserver for FnObserver<F>
where
    F: Fn(&HookContext<'_>) -> Result<()> + Send + Sync,
{
    fn on_before(&self, ctx: &HookContext<'_>) -> Result<()> {
        (self.0)(ctx)
    }

    fn on_after(&self, ctx: &HookContext<'_>) -> Result<()> {
        (self.0)(ctx)
    }

    fn on_error(&self, ctx: &HookContext<'_>) -> Result<()> {
        (self.0)(ctx)
    }

    fn on_pause(&self, ctx: &HookContext<'_>) -> Result<()> {
        (self.0)(ctx)
    }
}

/// Observers keyed by event and scope. At most one per key; registering again
/// replaces the previous observer.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    observers: HashMap<(HookEvent, HookScope), Arc<dyn StepObserver>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for one event.
    pub fn on(&mut self, event: HookEvent, scope: HookScope, observer: Arc<dyn StepObserver>) -> &mut Self {
        self.observers.insert((event, scope), observer);
        self
    }

    /// Register a closure for one event.
    pub fn on_fn<F>(&mut self, event: HookEvent, scope: HookScope, f: F) -> &mut Self
    where
        F: Fn(&HookContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.on(event, scope, Arc::new(FnObserver::new(f)))
    }

    /// Register one observer for all four events.
    pub fn observe(&mut self, scope: HookScope, observer: Arc<dyn StepObserver>) -> &mut Self {
        for event in HookEvent::all() {
            self.on(*event, scope, observer.clone());
        }
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Fire the stage-specific observer, then the global one.
    pub fn fire(&self, ctx: &HookContext<'_>) {
        for scope in [HookScope::Step(ctx.step), HookScope::All] {
            if let Some(observer) = self.observers.get(&(ctx.event, scope)) {
                invoke(observer.as_ref(), ctx);
            }
        }
    }
}

fn invoke(observer: &dyn StepObserver, ctx: &HookContext<'_>) {
    let outcome = catch_unwind(AssertUnwindSafe(|| match ctx.event {
        HookEvent::Before => observer.on_before(ctx),
        HookEvent::After => observer.on_after(ctx),
        HookEvent::OnError => observer.on_error(ctx),
        HookEvent::OnPause => observer.on_pause(ctx),
    }));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(
            session_id = ctx.session_id,
            step = %ctx.step,
            event = %ctx.event,
            error = %e,
            "Callback failed"
        ),
        Err(_) => tracing::warn!(
            session_id = ctx.session_id,
            step = %ctx.step,
            event = %ctx.event,
            "Callback panicked"
        ),
    }
}

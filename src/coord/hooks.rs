//! Event hook system for boot coordination
//!
//! Hooks observe events; they cannot change the outcome of a boot run.
//! They are called outside the coordinator's lock, possibly from the thread
//! or task that completed a step.

use std::sync::Arc;

use super::types::BootEvent;

/// Context provided to hooks for processing events
#[derive(Clone, Debug)]
pub struct HookContext {
    /// Run ID for this coordinator
    pub run_id: String,
    /// Configured name of the boot sequence
    pub name: String,
}

impl HookContext {
    pub fn new(run_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            name: name.into(),
        }
    }
}

/// Event hook trait
pub trait BootHook: Send + Sync {
    fn handle(&self, ctx: &HookContext, event: &BootEvent);
}

/// Composite hook that chains multiple hooks
#[derive(Default)]
pub struct CompositeHook {
    hooks: Vec<Arc<dyn BootHook>>,
}

impl CompositeHook {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn add_hook(&mut self, hook: Arc<dyn BootHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl BootHook for CompositeHook {
    fn handle(&self, ctx: &HookContext, event: &BootEvent) {
        for hook in &self.hooks {
            hook.handle(ctx, event);
        }
    }
}

/// Logging hook
pub struct LoggingHook;

impl BootHook for LoggingHook {
    fn handle(&self, ctx: &HookContext, event: &BootEvent) {
        match event {
            BootEvent::StepDispatched { step, kind } => {
                tracing::debug!("[{}:{}] Step dispatched: {} ({})", ctx.name, ctx.run_id, step, kind);
            }
            BootEvent::StepCompleted { step } => {
                tracing::debug!("[{}:{}] Step completed: {}", ctx.name, ctx.run_id, step);
            }
            BootEvent::StepFailed { step, captured: true } => {
                tracing::warn!("[{}:{}] Step failed: {}", ctx.name, ctx.run_id, step);
            }
            BootEvent::StepFailed { step, captured: false } => {
                tracing::debug!(
                    "[{}:{}] Step failed after an earlier failure, error discarded: {}",
                    ctx.name,
                    ctx.run_id,
                    step
                );
            }
            BootEvent::StepSkipped { step } => {
                tracing::debug!("[{}:{}] Step skipped after failure: {}", ctx.name, ctx.run_id, step);
            }
            BootEvent::Settled { failed } => {
                tracing::info!("[{}:{}] Boot sequence settled (failed: {})", ctx.name, ctx.run_id, failed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::types::StepRef;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHook(AtomicUsize);

    impl BootHook for CountingHook {
        fn handle(&self, _ctx: &HookContext, _event: &BootEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_composite_fans_out() {
        let first = Arc::new(CountingHook(AtomicUsize::new(0)));
        let second = Arc::new(CountingHook(AtomicUsize::new(0)));

        let mut composite = CompositeHook::new();
        composite.add_hook(first.clone());
        composite.add_hook(second.clone());
        composite.add_hook(Arc::new(LoggingHook));
        assert_eq!(composite.len(), 3);

        let ctx = HookContext::new("run-1", "boot");
        let step = StepRef {
            index: 0,
            name: "db".to_string(),
        };
        composite.handle(&ctx, &BootEvent::StepCompleted { step });
        composite.handle(&ctx, &BootEvent::Settled { failed: false });

        assert_eq!(first.0.load(Ordering::SeqCst), 2);
        assert_eq!(second.0.load(Ordering::SeqCst), 2);
    }
}

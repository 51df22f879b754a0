//! Steps - the units of work a coordinator dispatches
//!
//! A step is one of three calling conventions, chosen when it is built:
//! callback (`Step::callback`), synchronous (`Step::sync`) or future
//! (`Step::future`). `Step::deferred` covers steps that only decide at call
//! time whether they finished synchronously or handed back a future.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::core::errors::BootError;
use crate::core::latch::Latch;
use crate::coord::types::{StepKind, StepRef};

/// Future returned by future-style steps
pub type StepFuture = BoxFuture<'static, anyhow::Result<()>>;

pub(crate) type CallbackFn<C> = Box<dyn FnOnce(Arc<C>, Done) + Send>;
pub(crate) type SyncFn<C> = Box<dyn FnOnce(&C) -> anyhow::Result<()> + Send>;
pub(crate) type FutureFn<C> = Box<dyn FnOnce(Arc<C>) -> StepFuture + Send>;
pub(crate) type DeferredFn<C> = Box<dyn FnOnce(Arc<C>) -> StepReturn + Send>;

pub(crate) enum StepBody<C> {
    Callback(CallbackFn<C>),
    Sync(SyncFn<C>),
    Future(FutureFn<C>),
    Deferred(DeferredFn<C>),
}

/// A unit of boot work operating on a shared context of type `C`
pub struct Step<C> {
    pub(crate) name: Option<String>,
    pub(crate) body: StepBody<C>,
}

impl<C: Send + Sync + 'static> Step<C> {
    /// Step invoked with `(ctx, done)`; complete once `done` is signaled
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(Arc<C>, Done) + Send + 'static,
    {
        Self {
            name: None,
            body: StepBody::Callback(Box::new(f)),
        }
    }

    /// Step invoked with the context; complete when it returns
    pub fn sync<F>(f: F) -> Self
    where
        F: FnOnce(&C) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            name: None,
            body: StepBody::Sync(Box::new(f)),
        }
    }

    /// Step whose returned future is driven on the tokio runtime
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: FnOnce(Arc<C>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: None,
            body: StepBody::Future(Box::new(move |ctx| f(ctx).boxed())),
        }
    }

    /// Step called synchronously that may hand back a future to wait on
    pub fn deferred<F>(f: F) -> Self
    where
        F: FnOnce(Arc<C>) -> StepReturn + Send + 'static,
    {
        Self {
            name: None,
            body: StepBody::Deferred(Box::new(f)),
        }
    }

    /// Wrap a `BootStep` implementation as a future step named after it
    pub fn from_boot_step(step: Arc<dyn BootStep<C>>) -> Self {
        let name = step.name().to_string();
        Self::future(move |ctx| async move { step.run(ctx).await }).named(name)
    }
}

impl<C> Step<C> {
    /// Attach a name used in errors and tracing
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> StepKind {
        match self.body {
            StepBody::Callback(_) => StepKind::Callback,
            StepBody::Sync(_) => StepKind::Sync,
            StepBody::Future(_) => StepKind::Future,
            StepBody::Deferred(_) => StepKind::Deferred,
        }
    }
}

impl<C> fmt::Debug for Step<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .finish()
    }
}

/// What a deferred step hands back from its synchronous call
pub enum StepReturn {
    /// Finished during the call
    Ready(anyhow::Result<()>),
    /// Still running; complete when the future resolves
    Pending(StepFuture),
}

impl StepReturn {
    pub fn ready() -> Self {
        StepReturn::Ready(Ok(()))
    }

    pub fn pending<Fut>(fut: Fut) -> Self
    where
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        StepReturn::Pending(fut.boxed())
    }
}

impl From<anyhow::Result<()>> for StepReturn {
    fn from(result: anyhow::Result<()>) -> Self {
        StepReturn::Ready(result)
    }
}

/// Async step trait for steps that carry their own state
#[async_trait]
pub trait BootStep<C: Send + Sync + 'static>: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: Arc<C>) -> anyhow::Result<()>;
}

/// Receives the single completion of each tracked step
pub(crate) trait CompletionSink: Send + Sync {
    fn step_finished(&self, step: &StepRef, error: Option<BootError>);
}

struct StepSignal {
    step: StepRef,
    latch: Latch,
    sink: Arc<dyn CompletionSink>,
}

impl StepSignal {
    fn fire(&self, error: Option<BootError>) -> bool {
        if !self.latch.trip() {
            return false;
        }
        self.sink.step_finished(&self.step, error);
        true
    }
}

impl Drop for StepSignal {
    fn drop(&mut self) {
        if self.latch.trip() {
            self.sink
                .step_finished(&self.step, Some(BootError::abandoned(&self.step.name)));
        }
    }
}

/// Completion handle passed to callback steps.
///
/// Clones share one signal: the first `ok`/`fail`/`signal` on any clone
/// completes the step and every later call is ignored. If all clones are
/// dropped unsignaled the step fails with `BootError::Abandoned`.
#[derive(Clone)]
pub struct Done {
    signal: Arc<StepSignal>,
}

impl Done {
    pub(crate) fn new(step: StepRef, sink: Arc<dyn CompletionSink>) -> Self {
        Self {
            signal: Arc::new(StepSignal {
                step,
                latch: Latch::new(),
                sink,
            }),
        }
    }

    /// Signal success. Returns false if the step had already been signaled.
    pub fn ok(&self) -> bool {
        self.signal.fire(None)
    }

    /// Signal failure. Returns false if the step had already been signaled.
    pub fn fail(&self, err: impl Into<anyhow::Error>) -> bool {
        self.signal
            .fire(Some(BootError::step(&self.signal.step.name, err)))
    }

    /// Signal with a result, `Ok` meaning success
    pub fn signal(&self, result: anyhow::Result<()>) -> bool {
        match result {
            Ok(()) => self.ok(),
            Err(err) => self.fail(err),
        }
    }

    pub(crate) fn settle_with(&self, error: Option<BootError>) -> bool {
        self.signal.fire(error)
    }

    pub fn is_signaled(&self) -> bool {
        self.signal.latch.is_tripped()
    }

    /// The step this handle completes
    pub fn step(&self) -> &StepRef {
        &self.signal.step
    }
}

impl fmt::Debug for Done {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done")
            .field("step", &self.signal.step)
            .field("signaled", &self.is_signaled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl CompletionSink for RecordingSink {
        fn step_finished(&self, step: &StepRef, error: Option<BootError>) {
            self.calls
                .lock()
                .push((step.name.clone(), error.map(|e| e.category().to_string())));
        }
    }

    fn step_ref(name: &str) -> StepRef {
        StepRef {
            index: 0,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_done_fires_once_across_clones() {
        let sink = Arc::new(RecordingSink::default());
        let done = Done::new(step_ref("db"), sink.clone());
        let other = done.clone();

        assert!(done.ok());
        assert!(!other.fail(anyhow::anyhow!("late")));
        assert!(!done.ok());
        assert!(other.is_signaled());

        drop(done);
        drop(other);
        assert_eq!(*sink.calls.lock(), vec![("db".to_string(), None)]);
    }

    #[test]
    fn test_dropped_done_abandons_step() {
        let sink = Arc::new(RecordingSink::default());
        let done = Done::new(step_ref("cache"), sink.clone());
        let clone = done.clone();
        drop(done);
        assert!(sink.calls.lock().is_empty());
        drop(clone);

        assert_eq!(
            *sink.calls.lock(),
            vec![("cache".to_string(), Some("abandoned".to_string()))]
        );
    }

    #[test]
    fn test_signal_maps_result() {
        let sink = Arc::new(RecordingSink::default());
        let done = Done::new(step_ref("http"), sink.clone());
        assert!(done.signal(Err(anyhow::anyhow!("port in use"))));
        assert_eq!(
            *sink.calls.lock(),
            vec![("http".to_string(), Some("step".to_string()))]
        );
    }

    #[test]
    fn test_step_kinds() {
        let callback: Step<()> = Step::callback(|_, done| {
            done.ok();
        });
        let sync: Step<()> = Step::sync(|_| Ok(()));
        let future: Step<()> = Step::future(|_| async { Ok(()) });
        let deferred: Step<()> = Step::deferred(|_| StepReturn::ready());

        assert_eq!(callback.kind(), StepKind::Callback);
        assert_eq!(sync.kind(), StepKind::Sync);
        assert_eq!(future.kind(), StepKind::Future);
        assert_eq!(deferred.kind(), StepKind::Deferred);
        assert_eq!(sync.named("config").name(), Some("config"));
    }

    struct Migrations;

    #[async_trait]
    impl BootStep<()> for Migrations {
        fn name(&self) -> &str {
            "migrations"
        }

        async fn run(&self, _ctx: Arc<()>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_boot_step_is_named_future() {
        let step = Step::from_boot_step(Arc::new(Migrations));
        assert_eq!(step.name(), Some("migrations"));
        assert_eq!(step.kind(), StepKind::Future);
    }
}

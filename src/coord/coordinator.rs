//! Coordinator - the heart of boot sequencing
//!
//! The Coordinator dispatches steps as they are registered, counts the ones
//! still outstanding, keeps the first failure, and fires the completion
//! callback exactly once when nothing is pending any more.

use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::core::config::{BootConfig, DuplicateFinish};
use crate::core::errors::{BootError, Result};
use crate::core::latch::Latch;
use crate::core::stats::{BootStats, StepCounters};
use crate::coord::hooks::{BootHook, HookContext, LoggingHook};
use crate::coord::step::{CompletionSink, Done, Step, StepBody, StepFuture, StepReturn};
use crate::coord::types::{BootEvent, BootPhase, Completion, StepKind, StepRef};

type CompletionFn<C> = Box<dyn FnOnce(Option<BootError>, Arc<C>) + Send>;

/// A panic caught in step code, already converted for capture
struct Unwind {
    error: BootError,
    payload: Box<dyn Any + Send>,
}

struct State<C> {
    pending: usize,
    captured: Option<BootError>,
    failed: bool,
    failure_category: Option<&'static str>,
    completion: Option<CompletionFn<C>>,
    finish_installed: bool,
    next_index: usize,
}

struct Inner<C> {
    context: Arc<C>,
    config: BootConfig,
    hook_ctx: HookContext,
    hooks: Vec<Arc<dyn BootHook>>,
    runtime: Option<Handle>,
    state: Mutex<State<C>>,
    settle: Latch,
    counters: StepCounters,
}

/// Boot sequence coordinator.
///
/// Cloning yields another handle to the same coordinator, which lets a
/// running step register further steps.
pub struct Coordinator<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for Coordinator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Send + Sync + 'static> Coordinator<C> {
    /// Create a coordinator around a caller-owned context
    pub fn new(context: C) -> Self {
        Self::builder(Arc::new(context)).build()
    }

    /// Create a coordinator around an already shared context
    pub fn from_shared(context: Arc<C>) -> Self {
        Self::builder(context).build()
    }

    pub fn with_config(context: C, config: BootConfig) -> Self {
        Self::builder(Arc::new(context)).config(config).build()
    }

    /// Create a coordinator whose future steps run on `handle`
    pub fn with_runtime(context: C, handle: Handle) -> Self {
        Self::builder(Arc::new(context)).runtime(handle).build()
    }

    pub fn builder(context: Arc<C>) -> CoordinatorBuilder<C> {
        CoordinatorBuilder::new(context)
    }

    /// Register a step and dispatch it immediately.
    ///
    /// Once a failure has been captured this is a no-op. Step errors never
    /// surface here; they reach the completion callback.
    pub fn register(&self, step: Step<C>) -> &Self {
        let Step { name, body } = step;
        let (step, failed) = {
            let mut state = self.inner.state.lock();
            let index = state.next_index;
            state.next_index += 1;
            let name = name.unwrap_or_else(|| format!("step-{}", index));
            (StepRef { index, name }, state.failed)
        };
        self.inner.counters.record_registered();

        if failed {
            self.inner.counters.record_skipped();
            self.inner.emit(&BootEvent::StepSkipped { step });
            return self;
        }

        self.inner.dispatch(step, body);
        self
    }

    /// Install the completion callback.
    ///
    /// Fires inside this call when nothing is pending, otherwise from the
    /// completion that drains the last pending step. A second call is
    /// handled according to `BootConfig::on_duplicate_finish`.
    pub fn finish<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(Option<BootError>, Arc<C>) + Send + 'static,
    {
        {
            let mut state = self.inner.state.lock();
            if state.finish_installed {
                drop(state);
                tracing::warn!(
                    "[{}:{}] finish called more than once",
                    self.inner.hook_ctx.name,
                    self.inner.hook_ctx.run_id
                );
                return match self.inner.config.on_duplicate_finish {
                    DuplicateFinish::Reject => Err(BootError::AlreadyFinished),
                    DuplicateFinish::Ignore => Ok(()),
                };
            }
            state.finish_installed = true;
            state.completion = Some(Box::new(callback));
        }

        self.inner.try_settle();
        Ok(())
    }

    /// Install a completion callback that resolves the returned future
    pub fn wait(&self) -> impl Future<Output = Result<Completion<C>>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let installed = self.finish(move |error, context| {
            let _ = tx.send(Completion { error, context });
        });

        async move {
            installed?;
            rx.await.map_err(|_| BootError::Dropped)
        }
    }

    pub fn context(&self) -> &Arc<C> {
        &self.inner.context
    }

    pub fn config(&self) -> &BootConfig {
        &self.inner.config
    }

    pub fn run_id(&self) -> &str {
        &self.inner.hook_ctx.run_id
    }

    pub fn phase(&self) -> BootPhase {
        let state = self.inner.state.lock();
        if self.inner.settle.is_tripped() {
            BootPhase::Settled
        } else if state.failed {
            BootPhase::Failed
        } else {
            BootPhase::Running
        }
    }

    pub fn is_failed(&self) -> bool {
        self.inner.state.lock().failed
    }

    /// `BootError::category` of the captured failure, kept after settling
    pub fn failure_category(&self) -> Option<&'static str> {
        self.inner.state.lock().failure_category
    }

    /// True when no callback or future step is outstanding
    pub fn is_drained(&self) -> bool {
        self.inner.state.lock().pending == 0
    }

    pub fn is_settled(&self) -> bool {
        self.inner.settle.is_tripped()
    }

    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending
    }

    pub fn stats(&self) -> BootStats {
        let pending = self.pending();
        self.inner.counters.snapshot(pending)
    }
}

impl<C: Send + Sync + 'static> Inner<C> {
    fn dispatch(self: &Arc<Self>, step: StepRef, body: StepBody<C>) {
        match body {
            StepBody::Callback(f) => {
                self.begin_pending();
                self.announce(&step, StepKind::Callback);

                let done = self.done_for(&step);
                let guard = done.clone();
                let context = self.context.clone();
                if let Err(unwind) = self.invoke(&step, move || f(context, done)) {
                    guard.settle_with(Some(unwind.error));
                    drop(guard);
                    self.propagate(unwind.payload);
                }
            }
            StepBody::Sync(f) => {
                self.announce(&step, StepKind::Sync);

                let context = self.context.clone();
                let (error, payload) = match self.invoke(&step, move || f(context.as_ref())) {
                    Ok(Ok(())) => (None, None),
                    Ok(Err(err)) => (Some(BootError::step(&step.name, err)), None),
                    Err(unwind) => (Some(unwind.error), Some(unwind.payload)),
                };
                self.step_done(&step, error, false);
                if let Some(payload) = payload {
                    self.propagate(payload);
                }
            }
            StepBody::Future(f) => {
                let Some(handle) = self.runtime_handle() else {
                    self.announce(&step, StepKind::Future);
                    self.step_done(&step, Some(BootError::no_runtime(&step.name)), false);
                    return;
                };
                self.begin_pending();
                self.announce(&step, StepKind::Future);

                let done = self.done_for(&step);
                let context = self.context.clone();
                match self.invoke(&step, move || f(context)) {
                    Ok(fut) => self.spawn_tracked(&handle, &step, fut, done),
                    Err(unwind) => {
                        done.settle_with(Some(unwind.error));
                        drop(done);
                        self.propagate(unwind.payload);
                    }
                }
            }
            StepBody::Deferred(f) => {
                // Whether this ends up sync or future is only known after the call.
                self.announce(&step, StepKind::Deferred);

                let context = self.context.clone();
                match self.invoke(&step, move || f(context)) {
                    Ok(StepReturn::Ready(result)) => {
                        let error = result.err().map(|err| BootError::step(&step.name, err));
                        self.step_done(&step, error, false);
                    }
                    Ok(StepReturn::Pending(fut)) => match self.runtime_handle() {
                        Some(handle) => {
                            self.begin_pending();
                            let done = self.done_for(&step);
                            self.spawn_tracked(&handle, &step, fut, done);
                        }
                        None => {
                            self.step_done(&step, Some(BootError::no_runtime(&step.name)), false);
                        }
                    },
                    Err(unwind) => {
                        self.step_done(&step, Some(unwind.error), false);
                        self.propagate(unwind.payload);
                    }
                }
            }
        }
    }

    /// Run step code, catching a panic so it can be recorded as the step's failure
    fn invoke<R>(
        &self,
        step: &StepRef,
        call: impl FnOnce() -> R,
    ) -> std::result::Result<R, Unwind> {
        catch_unwind(AssertUnwindSafe(call)).map_err(|payload| Unwind {
            error: BootError::panicked(&step.name, panic_message(payload.as_ref())),
            payload,
        })
    }

    /// Continue a recorded panic unless panics are configured to be caught
    fn propagate(&self, payload: Box<dyn Any + Send>) {
        if !self.config.catch_panics {
            resume_unwind(payload);
        }
    }

    fn spawn_tracked(&self, handle: &Handle, step: &StepRef, fut: StepFuture, done: Done) {
        let catch_panics = self.config.catch_panics;
        let name = step.name.clone();
        handle.spawn(async move {
            let outcome = if catch_panics {
                match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(result) => result.map_err(|err| BootError::step(&name, err)),
                    Err(panic) => Err(BootError::panicked(&name, panic_message(panic.as_ref()))),
                }
            } else {
                fut.await.map_err(|err| BootError::step(&name, err))
            };
            done.settle_with(outcome.err());
        });
    }

    fn runtime_handle(&self) -> Option<Handle> {
        self.runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
    }

    fn done_for(self: &Arc<Self>, step: &StepRef) -> Done {
        let sink: Arc<dyn CompletionSink> = self.clone();
        Done::new(step.clone(), sink)
    }

    fn begin_pending(&self) {
        self.state.lock().pending += 1;
    }

    fn announce(&self, step: &StepRef, kind: StepKind) {
        self.counters.record_dispatched();
        self.emit(&BootEvent::StepDispatched {
            step: step.clone(),
            kind,
        });
    }

    /// Record a step's single completion. `tracked` steps hold a pending slot.
    fn step_done(&self, step: &StepRef, error: Option<BootError>, tracked: bool) {
        let outcome = {
            let mut state = self.state.lock();
            if tracked {
                state.pending = state.pending.saturating_sub(1);
            }
            error.map(|err| {
                if state.failed {
                    return false;
                }
                state.failed = true;
                state.failure_category = Some(err.category());
                state.captured = Some(err);
                true
            })
        };

        let event = match outcome {
            None => {
                self.counters.record_completed();
                BootEvent::StepCompleted { step: step.clone() }
            }
            Some(captured) => {
                self.counters.record_failed();
                BootEvent::StepFailed {
                    step: step.clone(),
                    captured,
                }
            }
        };
        self.emit(&event);
        self.try_settle();
    }

    fn try_settle(&self) {
        let (completion, error) = {
            let mut state = self.state.lock();
            if state.pending > 0 || state.completion.is_none() {
                return;
            }
            if !self.settle.trip() {
                return;
            }
            // The captured error moves into the callback; `failed` and
            // `failure_category` keep the record of it afterwards.
            match state.completion.take() {
                Some(completion) => (completion, state.captured.take()),
                None => return,
            }
        };

        self.emit(&BootEvent::Settled {
            failed: error.is_some(),
        });
        completion(error, self.context.clone());
    }

    fn emit(&self, event: &BootEvent) {
        for hook in &self.hooks {
            hook.handle(&self.hook_ctx, event);
        }
    }
}

impl<C: Send + Sync + 'static> CompletionSink for Inner<C> {
    fn step_finished(&self, step: &StepRef, error: Option<BootError>) {
        self.step_done(step, error, true);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Builder for `Coordinator`
pub struct CoordinatorBuilder<C> {
    context: Arc<C>,
    config: BootConfig,
    hooks: Vec<Arc<dyn BootHook>>,
    runtime: Option<Handle>,
}

impl<C: Send + Sync + 'static> CoordinatorBuilder<C> {
    pub fn new(context: Arc<C>) -> Self {
        Self {
            context,
            config: BootConfig::default(),
            hooks: Vec::new(),
            runtime: None,
        }
    }

    pub fn config(mut self, config: BootConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hook(mut self, hook: Arc<dyn BootHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Runtime that drives future steps, instead of the ambient one
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Coordinator<C> {
        let mut hooks = Vec::with_capacity(self.hooks.len() + 1);
        if self.config.trace_events {
            hooks.push(Arc::new(LoggingHook) as Arc<dyn BootHook>);
        }
        hooks.extend(self.hooks);

        let run_id = Uuid::new_v4().to_string();
        let hook_ctx = HookContext::new(run_id, self.config.name.clone());
        tracing::debug!("[{}:{}] Coordinator created", hook_ctx.name, hook_ctx.run_id);

        Coordinator {
            inner: Arc::new(Inner {
                context: self.context,
                config: self.config,
                hook_ctx,
                hooks,
                runtime: self.runtime,
                state: Mutex::new(State {
                    pending: 0,
                    captured: None,
                    failed: false,
                    failure_category: None,
                    completion: None,
                    finish_installed: false,
                    next_index: 0,
                }),
                settle: Latch::new(),
                counters: StepCounters::new(),
            }),
        }
    }
}

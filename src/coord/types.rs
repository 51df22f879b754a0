//! Core types shared by the coordinator, steps and hooks

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::core::errors::BootError;

/// Calling convention a step was dispatched with
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Invoked with `(ctx, done)`, completes when `done` is signaled
    Callback,
    /// Invoked with `ctx`, complete when the call returns
    Sync,
    /// Invoked with `ctx`, complete when the returned future resolves
    Future,
    /// Invoked with `ctx`, complete on return or once the future it hands back resolves
    Deferred,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Callback => write!(f, "callback"),
            StepKind::Sync => write!(f, "sync"),
            StepKind::Future => write!(f, "future"),
            StepKind::Deferred => write!(f, "deferred"),
        }
    }
}

/// Reference to a registered step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRef {
    /// Position in registration order, starting at zero
    pub index: usize,
    pub name: String,
}

impl fmt::Display for StepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.index, self.name)
    }
}

/// Events emitted over the life of a coordinator
#[derive(Clone, Debug)]
pub enum BootEvent {
    StepDispatched {
        step: StepRef,
        kind: StepKind,
    },
    /// A sync step returned, or a callback/future step signaled success
    StepCompleted {
        step: StepRef,
    },
    StepFailed {
        step: StepRef,
        /// False when an earlier failure was already captured
        captured: bool,
    },
    /// Registration refused after a failure
    StepSkipped {
        step: StepRef,
    },
    Settled {
        failed: bool,
    },
}

/// Lifecycle phase of a coordinator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootPhase {
    /// No failure captured, completion not yet fired
    Running,
    /// A failure is captured, completion not yet fired
    Failed,
    /// Completion callback has fired
    Settled,
}

/// Result delivered by `Coordinator::wait`
pub struct Completion<C> {
    pub error: Option<BootError>,
    pub context: Arc<C>,
}

impl<C> Completion<C> {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a `Result`, keeping the context on success
    pub fn into_result(self) -> Result<Arc<C>, BootError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.context),
        }
    }
}

impl<C> fmt::Debug for Completion<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

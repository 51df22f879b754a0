//! Coordinator-based boot sequencing
//!
//! Steps are dispatched as they are registered and joined back into a single
//! completion callback.

pub mod types;
pub mod hooks;
pub mod step;
pub mod coordinator;

pub use types::*;
pub use hooks::*;
pub use step::{BootStep, Done, Step, StepFuture, StepReturn};
pub use coordinator::*;

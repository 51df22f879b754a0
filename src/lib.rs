//! Boot sequence coordination.
//!
//! Register independent steps that share one context, then install a single
//! completion callback. The callback fires exactly once: when every step has
//! finished, or after the first failure once the steps already in flight have
//! drained. No step is started after a failure has been captured.
//!
//! ```
//! use bootseq::{Coordinator, Step};
//!
//! let boot = Coordinator::new("data");
//! boot.register(Step::callback(|_ctx, done| {
//!     done.ok();
//! }))
//! .register(Step::sync(|_ctx| Ok(())));
//!
//! boot.finish(|err, ctx| {
//!     assert!(err.is_none());
//!     assert_eq!(*ctx, "data");
//! })
//! .unwrap();
//! ```

// Core infrastructure modules
pub mod core {
    pub mod errors;
    pub mod config;
    pub mod latch;
    pub mod stats;
}

pub mod coord;

// Re-exports for convenience
pub use crate::core::errors::{BootError, Result};
pub use crate::core::config::{BootConfig, BootConfigBuilder, DuplicateFinish};
pub use crate::core::stats::BootStats;
pub use coord::*;

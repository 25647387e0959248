//! Observer hooks around stage execution.
//!
//! Observers are registered per event and per scope (one stage, or every
//! stage). For each stage the engine fires, in order:
//!
//! - `Before` - before the stage implementation is invoked
//! - `After` - after it returns, whatever the outcome
//! - `OnError` - only when the stage failed
//! - `OnPause` - only when the session pauses for review after the stage
//!
//! A stage-specific observer fires before the global one. Observer errors and
//! panics are logged and never interrupt the pipeline.
//!
//! # Usage
//!
//! ```ignore
//! use drawing_pipeline::hooks::{CallbackRegistry, HookEvent, HookScope};
//!
//! let mut hooks = CallbackRegistry::new();
//! hooks.on_fn(HookEvent::OnError, HookScope::All, |ctx| {
//!     eprintln!("step {} failed", ctx.step);
//!     Ok(())
//! });
//! ```

pub mod registry;
pub mod types;

pub use registry::{CallbackRegistry, FnObserver, StepObserver};
pub use types::{HookContext, HookEvent, HookScope};

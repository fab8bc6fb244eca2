//! Distributed task scheduler with durable state in the coordination store.
//!
//! Each scheduling process takes a fresh manager epoch from the store when
//! it starts. Every task runs in its own loop, which re-checks its epoch and
//! revision before each run and quietly stops once either is stale. Operator
//! overrides are merged on every tick; a changed effective schedule replaces
//! the task's loop under a new revision.

mod chain;
pub mod handler;
pub mod overrides;
pub mod runtime;
pub mod task;
pub mod timing;

pub use handler::{handler_fn, TaskContext, TaskHandler};
pub use overrides::{
    configured_source, merge, override_key, NoOverrides, OverrideFileSource, OverrideRecord, OverrideSource,
    StaticOverrides,
};
pub use runtime::{epoch_key, read_task_state, task_key, SchedulerRuntime};
pub use task::{EffectiveSchedule, TaskDescriptor, TaskMode, TaskRecord, TaskState, TaskStatus};
pub use timing::{delay_until, next_timing_run};

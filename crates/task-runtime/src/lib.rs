//! # Task Runtime
//!
//! Per-thread cooperative event loops, the task queues that feed them, and
//! a type-indexed task context propagated implicitly through thread-local
//! binding rather than threaded through every function signature.
//!
//! ```text
//! ┌──────────────┐   exec_async/exec_sync   ┌──────────────┐
//! │  any thread  │ ───────────────────────▶ │    Thread    │
//! └──────────────┘                          │  event loop  │
//!                                           │  + queue     │
//!                                           │  + timers    │
//!                                            └──────────────┘
//! ```
//!
//! A [`TaskContext`] is built once per top-level operation (an RPC request,
//! a bridge call) and bound into thread-local slots for the duration of
//! each handler invocation via [`ContextGuard`], so deep callees can reach
//! the logger, session, or env without an explicit parameter.

#![allow(clippy::missing_const_for_fn)]

pub mod context;
pub mod queue;
pub mod thread;

pub use context::{ContextGuard, TaskContext, TaskContextId, ThreadLocalContext};
pub use queue::{MpscQueue, MutexQueue, Queue, QueueStats, SimpleQueue};
pub use thread::{Thread, ThreadError, ThreadId, TimerId, DEFAULT_BATCH_SIZE};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn context_guard_travels_with_a_task_posted_to_another_thread() {
        struct RequestId(u64);

        let ctx = TaskContext::new().with(RequestId(42));
        let thread = Thread::new("ctx-worker").unwrap();
        thread.start().unwrap();

        let seen = thread
            .exec_sync(
                move || {
                    let _guard = ContextGuard::enter(&ctx);
                    ThreadLocalContext::<RequestId>::value().map(|r| r.0)
                },
                Duration::from_secs(1),
            )
            .unwrap();

        assert_eq!(seen, Some(42));
        thread.stop();
    }
}

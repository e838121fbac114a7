//! Type-indexed task context, propagated implicitly across handlers by
//! thread-local binding rather than by threading an argument through every
//! call site.
//!
//! A [`TaskContext`] is a heterogeneous bag of sub-contexts keyed by
//! `TypeId`. It is built once at the boundary of a top-level async
//! operation (an RPC request, a bridge call) and shared by every handler
//! that participates in it. While a handler runs under a [`ContextGuard`],
//! each sub-context type it carries is reachable through
//! [`ThreadLocalContext::value`] without being passed explicitly; when the
//! guard drops, those slots go back to `None`.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity for a [`TaskContext`]. Used to key coalesced operations
/// (e.g. session refresh callbacks) by the context that requested them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskContextId(u64);

impl fmt::Display for TaskContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// A bag of typed sub-contexts shared by every handler of one top-level
/// operation. Identity is the context's id, not its contents.
#[derive(Clone)]
pub struct TaskContext {
    id: TaskContextId,
    slots: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("id", &self.id)
            .field("slot_count", &self.slots.len())
            .finish()
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskContext {
    /// Create an empty context. Sub-contexts are attached with [`with`](Self::with).
    pub fn new() -> Self {
        Self {
            id: TaskContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
            slots: HashMap::new(),
        }
    }

    pub fn id(&self) -> TaskContextId {
        self.id
    }

    /// Attach a sub-context of type `T`, replacing any existing one of the
    /// same type. Returns `self` for builder-style construction at the
    /// operation boundary.
    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.slots.insert(TypeId::of::<T>(), Arc::new(value));
        self
    }

    /// Look up a sub-context by type. Returns `None` if the context does
    /// not carry one, which callers treat the same way hatn's `get<T>()`
    /// treats an unknown wrapper type: a programming error to be checked at
    /// the few call sites that build contexts, not a recoverable condition
    /// deep in a handler.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<T>())
    }

    fn type_ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.slots.keys().copied()
    }
}

thread_local! {
    static BOUND_SLOTS: RefCell<HashMap<TypeId, Arc<dyn Any + Send + Sync>>> = RefCell::new(HashMap::new());
}

/// Thread-local access to a bound sub-context, mirroring hatn's
/// `ThreadLocalContext<T>::value()`. Only meaningful while a
/// [`ContextGuard`] carrying a `T` sub-context is alive on the current
/// thread; otherwise returns `None`.
pub struct ThreadLocalContext<T>(std::marker::PhantomData<T>);

impl<T: Send + Sync + 'static> ThreadLocalContext<T> {
    pub fn value() -> Option<Arc<T>> {
        BOUND_SLOTS.with(|slots| {
            slots
                .borrow()
                .get(&TypeId::of::<T>())
                .and_then(|v| v.clone().downcast::<T>().ok())
        })
    }
}

/// RAII guard around one handler invocation. On construction it binds every
/// sub-context type the [`TaskContext`] carries into the current thread's
/// local slots (`beforeThreadProcessing`); on drop it clears exactly those
/// slots again (`afterThreadProcessing`), regardless of how the handler
/// exits (normal return, early `?`, or panic unwind).
pub struct ContextGuard {
    touched: Vec<TypeId>,
}

impl ContextGuard {
    pub fn enter(ctx: &TaskContext) -> Self {
        let mut touched = Vec::with_capacity(ctx.slots.len());
        BOUND_SLOTS.with(|slots| {
            let mut slots = slots.borrow_mut();
            for type_id in ctx.type_ids() {
                if let Some(value) = ctx.slots.get(&type_id) {
                    slots.insert(type_id, value.clone());
                    touched.push(type_id);
                }
            }
        });
        Self { touched }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        BOUND_SLOTS.with(|slots| {
            let mut slots = slots.borrow_mut();
            for type_id in self.touched.drain(..) {
                slots.remove(&type_id);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Logger(&'static str);
    struct Env(u32);

    #[test]
    fn get_returns_attached_subcontext() {
        let ctx = TaskContext::new().with(Logger("service")).with(Env(7));
        assert_eq!(ctx.get::<Logger>().unwrap().0, "service");
        assert_eq!(ctx.get::<Env>().unwrap().0, 7);
        assert!(ctx.get::<u64>().is_none());
    }

    #[test]
    fn thread_local_slot_is_bound_only_while_guard_is_alive() {
        let ctx = TaskContext::new().with(Logger("bound"));
        assert!(ThreadLocalContext::<Logger>::value().is_none());
        {
            let _guard = ContextGuard::enter(&ctx);
            let bound = ThreadLocalContext::<Logger>::value().expect("bound while guard is alive");
            assert_eq!(bound.0, "bound");
        }
        assert!(ThreadLocalContext::<Logger>::value().is_none());
    }

    #[test]
    fn later_with_replaces_earlier_same_type_value() {
        let ctx = TaskContext::new().with(Env(1)).with(Env(2));
        assert_eq!(ctx.get::<Env>().unwrap().0, 2);
    }

    #[test]
    fn each_context_has_a_distinct_id() {
        let a = TaskContext::new();
        let b = TaskContext::new();
        assert_ne!(a.id(), b.id());
    }
}

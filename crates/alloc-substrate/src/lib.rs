//! # Allocator Substrate
//!
//! A polymorphic memory resource abstraction, in the spirit of
//! `std::pmr::memory_resource`: callers depend on the [`MemoryResource`]
//! trait object rather than a concrete allocator, so the same container code
//! can run over the system allocator, a fixed-block pool, or a bump-pointer
//! arena depending on the caller's lifetime and size profile.
//!
//! Two concrete resources are provided:
//!
//! - [`pool::PoolResource`] — a free-list of fixed-size blocks, for
//!   high-churn allocations of a single size (task context cells, queue
//!   items).
//! - [`arena::ArenaResource`] — a bump-pointer allocator over one
//!   pre-allocated buffer, reset in bulk when its scope ends (a single RPC
//!   request, a single transaction).
//!
//! Both fall back to the global allocator when a request does not fit their
//! shape, so misuse degrades gracefully instead of failing outright.

pub mod arena;
pub mod pool;

use std::alloc::Layout;
use std::ptr::NonNull;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    #[error("memory resource exhausted")]
    Exhausted,
    #[error("requested layout is invalid for this resource")]
    InvalidLayout,
}

/// A source of raw memory. Implementations must be safe to share across
/// threads behind an `Arc`; internal mutability is the implementation's
/// responsibility.
pub trait MemoryResource: Send + Sync {
    /// Allocate memory satisfying `layout`.
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError>;

    /// Return memory previously obtained from [`allocate`](Self::allocate).
    ///
    /// # Safety
    /// `ptr` must have been returned by this resource for a request with
    /// `layout`, and must not be deallocated more than once.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// A short name for diagnostics.
    fn name(&self) -> &'static str;
}

/// The process-wide default resource: the system allocator, wrapped so it
/// can be passed anywhere a `dyn MemoryResource` is expected.
pub struct SystemResource;

impl MemoryResource for SystemResource {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.size() == 0 {
            return Err(AllocError::InvalidLayout);
        }
        // SAFETY: layout has non-zero size, checked above.
        let ptr = unsafe { std::alloc::alloc(layout) };
        let ptr = NonNull::new(ptr).ok_or(AllocError::Exhausted)?;
        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout);
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

/// Returns the process-wide default resource. Equivalent to hatn's
/// `pmr::get_default_resource()`: a single, explicit, documented
/// process-wide object rather than a hidden global.
pub fn default_resource() -> &'static dyn MemoryResource {
    static DEFAULT: SystemResource = SystemResource;
    &DEFAULT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_resource_roundtrips() {
        let layout = Layout::from_size_align(64, 8).unwrap();
        let mem = default_resource().allocate(layout).unwrap();
        unsafe {
            default_resource().deallocate(mem.as_non_null_ptr(), layout);
        }
    }
}

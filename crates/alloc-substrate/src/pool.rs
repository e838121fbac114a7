//! Fixed-block pool resource: a free-list of equally-sized blocks carved out
//! of chunks requested from an upstream resource as the pool grows.

use crate::{AllocError, MemoryResource};
use parking_lot::Mutex;
use std::alloc::Layout;
use std::ptr::NonNull;

const CHUNK_BLOCKS: usize = 64;

struct PoolState {
    free_list: Vec<NonNull<u8>>,
    chunks: Vec<(NonNull<u8>, Layout)>,
}

// SAFETY: the pointers stored are raw allocations this struct owns
// exclusively; access is always serialized through the outer `Mutex`.
unsafe impl Send for PoolState {}

/// A pool of fixed-size, fixed-alignment blocks. Requests for any other
/// layout fall back to the global allocator so the resource never refuses a
/// legitimate request outright; callers that want pool behavior guaranteed
/// should size their allocations to match `block_layout`.
pub struct PoolResource {
    block_layout: Layout,
    state: Mutex<PoolState>,
}

impl PoolResource {
    pub fn new(block_size: usize, block_align: usize) -> Self {
        let block_layout = Layout::from_size_align(block_size.max(1), block_align.max(1))
            .expect("invalid pool block layout")
            .pad_to_align();
        Self {
            block_layout,
            state: Mutex::new(PoolState {
                free_list: Vec::new(),
                chunks: Vec::new(),
            }),
        }
    }

    pub fn block_layout(&self) -> Layout {
        self.block_layout
    }

    fn grow(&self, state: &mut PoolState) -> Result<(), AllocError> {
        let chunk_layout = Layout::from_size_align(
            self.block_layout.size() * CHUNK_BLOCKS,
            self.block_layout.align(),
        )
        .map_err(|_| AllocError::InvalidLayout)?;
        // SAFETY: chunk_layout.size() > 0 since block_layout.size() >= 1.
        let base = unsafe { std::alloc::alloc(chunk_layout) };
        let base = NonNull::new(base).ok_or(AllocError::Exhausted)?;
        for i in 0..CHUNK_BLOCKS {
            // SAFETY: offset stays within the just-allocated chunk.
            let block = unsafe { base.as_ptr().add(i * self.block_layout.size()) };
            state.free_list.push(NonNull::new(block).unwrap());
        }
        state.chunks.push((base, chunk_layout));
        Ok(())
    }

    /// Number of blocks immediately available without growing.
    pub fn free_count(&self) -> usize {
        self.state.lock().free_list.len()
    }
}

impl MemoryResource for PoolResource {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.size() > self.block_layout.size() || layout.align() > self.block_layout.align()
        {
            // Doesn't fit the pool's shape; defer to the system allocator.
            return crate::default_resource().allocate(layout);
        }
        let mut state = self.state.lock();
        if state.free_list.is_empty() {
            self.grow(&mut state)?;
        }
        let ptr = state.free_list.pop().expect("grow populates free_list");
        Ok(NonNull::slice_from_raw_parts(ptr, self.block_layout.size()))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() > self.block_layout.size() || layout.align() > self.block_layout.align()
        {
            crate::default_resource().deallocate(ptr, layout);
            return;
        }
        self.state.lock().free_list.push(ptr);
    }

    fn name(&self) -> &'static str {
        "pool"
    }
}

impl Drop for PoolResource {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for (base, layout) in state.chunks.drain(..) {
            // SAFETY: each chunk was allocated with this exact layout and is
            // dropped exactly once, here.
            unsafe { std::alloc::dealloc(base.as_ptr(), layout) };
        }
    }
}

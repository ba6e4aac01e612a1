//! Task dispatch used by the step pipeline.
//!
//! The world never owns threads. Parallel phases go through a
//! [`TaskExecutor`]: a parallel-for over an index range that hands every
//! invocation a worker index in `[0, worker_count)` identifying the
//! worker's scratch slot. The built-in executors are a synchronous
//! fallback and a rayon-backed pool; embedders can plug in their own.

use crate::utils::{allocator::EntityId, bitset::BitSet};

/// Per-worker scratch storage selected by worker index.
///
/// Workers never synchronize during a phase; the orchestrator merges these
/// buffers at the barrier that ends it.
#[derive(Debug, Default)]
pub struct TaskContext {
    /// Bits align with contact ids and mark a touching-state transition.
    pub contact_state_bits: BitSet,
    /// Bits align with joint ids and mark a joint event candidate.
    pub joint_state_bits: BitSet,
    /// Bodies whose shapes outgrew their fat AABBs during finalize.
    pub enlarged_body_bits: BitSet,
    /// Islands seen still awake during sleep evaluation.
    pub awake_island_bits: BitSet,
    /// Sensor overlaps discovered by this worker.
    pub sensor_hits: Vec<SensorHit>,
    /// Best split candidate seen by this worker.
    pub split_sleep_time: f32,
    pub split_island_id: EntityId,
}

#[derive(Debug, Clone, Copy)]
pub struct SensorHit {
    pub sensor_shape: EntityId,
    pub visitor_shape: EntityId,
}

impl TaskContext {
    pub fn reset(&mut self, contact_capacity: usize, joint_capacity: usize, body_capacity: usize) {
        self.contact_state_bits.clear();
        self.contact_state_bits.grow(contact_capacity);
        self.joint_state_bits.clear();
        self.joint_state_bits.grow(joint_capacity);
        self.enlarged_body_bits.clear();
        self.enlarged_body_bits.grow(body_capacity);
        self.awake_island_bits.clear();
        self.sensor_hits.clear();
        self.split_sleep_time = 0.0;
        self.split_island_id = EntityId::NULL;
    }
}

/// Shared mutable slice for scatter writes from parallel-for workers.
///
/// Each worker owns a disjoint index range, so concurrent `get_mut` calls
/// never alias. The caller upholds that invariant.
pub struct SharedSlice<'a, T> {
    ptr: *mut T,
    len: usize,
    _lifetime: std::marker::PhantomData<&'a mut [T]>,
}

unsafe impl<'a, T: Send> Send for SharedSlice<'a, T> {}
unsafe impl<'a, T: Send> Sync for SharedSlice<'a, T> {}

impl<'a, T> SharedSlice<'a, T> {
    pub fn new(slice: &'a mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            _lifetime: std::marker::PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// # Safety
    /// No two live references to the same index may exist; callers must
    /// partition indices across workers.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, index: usize) -> &mut T {
        debug_assert!(index < self.len);
        &mut *self.ptr.add(index)
    }
}

/// Parallel-for provider. Implementations must invoke `task` over disjoint
/// subranges covering `[0, item_count)` and return only once all invocations
/// finished.
pub trait TaskExecutor: Send + Sync {
    /// Number of distinct worker indices `task` may observe.
    fn worker_count(&self) -> usize {
        1
    }

    /// Runs `task(start, end, worker_index)`. `min_range` is the suggested
    /// smallest grain; executors may merge ranges below it.
    fn for_each(&self, item_count: usize, min_range: usize, task: &(dyn Fn(usize, usize, usize) + Sync));
}

/// Runs everything on the calling thread. This is the deterministic
/// reference executor.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialExecutor;

impl TaskExecutor for SequentialExecutor {
    fn for_each(&self, item_count: usize, _min_range: usize, task: &(dyn Fn(usize, usize, usize) + Sync)) {
        if item_count > 0 {
            task(0, item_count, 0);
        }
    }
}

/// Dispatches ranges onto the global rayon pool.
#[cfg(feature = "parallel")]
#[derive(Debug, Clone, Copy)]
pub struct RayonExecutor {
    workers: usize,
}

#[cfg(feature = "parallel")]
impl Default for RayonExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "parallel")]
impl RayonExecutor {
    pub fn new() -> Self {
        Self {
            workers: rayon::current_num_threads(),
        }
    }
}

#[cfg(feature = "parallel")]
impl TaskExecutor for RayonExecutor {
    fn worker_count(&self) -> usize {
        self.workers
    }

    fn for_each(&self, item_count: usize, min_range: usize, task: &(dyn Fn(usize, usize, usize) + Sync)) {
        if item_count == 0 {
            return;
        }

        let grain = min_range.max(item_count / (4 * self.workers.max(1))).max(1);
        rayon::scope(|scope| {
            let mut start = 0;
            while start < item_count {
                let end = (start + grain).min(item_count);
                scope.spawn(move |_| {
                    let worker = rayon::current_thread_index().unwrap_or(0);
                    task(start, end, worker);
                });
                start = end;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn sequential_covers_full_range() {
        let sum = AtomicUsize::new(0);
        SequentialExecutor.for_each(10, 1, &|start, end, worker| {
            assert_eq!(worker, 0);
            sum.fetch_add(end - start, Ordering::Relaxed);
        });
        assert_eq!(sum.load(Ordering::Relaxed), 10);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn rayon_covers_full_range_with_bounded_workers() {
        let executor = RayonExecutor::new();
        let sum = AtomicUsize::new(0);
        executor.for_each(1000, 16, &|start, end, worker| {
            assert!(worker < executor.worker_count());
            sum.fetch_add(end - start, Ordering::Relaxed);
        });
        assert_eq!(sum.load(Ordering::Relaxed), 1000);
    }
}

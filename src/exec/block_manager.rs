//! Recycles block allocations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::block::{BlockStorage, ItemBlockBuilder, RowKind};
use super::value::Value;

type Buffers = (Vec<Value>, Vec<RowKind>);

pub(crate) struct PoolInner {
    free: Mutex<Vec<Buffers>>,
    capacity: usize,
    requested: AtomicUsize,
    reused: AtomicUsize,
    live: AtomicUsize,
}

impl PoolInner {
    pub(crate) fn release(&self, values: Vec<Value>, kinds: Vec<RowKind>) {
        self.live.fetch_sub(1, Ordering::Relaxed);
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push((values, kinds));
        }
    }
}

/// Snapshot of [`BlockManager`] counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockManagerStats {
    /// Blocks handed out so far.
    pub requested: usize,
    /// Requests served from a recycled buffer.
    pub reused: usize,
    /// Blocks currently alive, frozen or not.
    pub live: usize,
    /// Buffers waiting for reuse.
    pub pooled: usize,
}

/// Allocator for item blocks that recycles the buffers of dropped blocks.
#[derive(Clone)]
pub struct BlockManager {
    inner: Arc<PoolInner>,
}

impl BlockManager {
    /// Creates a manager retaining up to `capacity` unused buffers.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                capacity,
                requested: AtomicUsize::new(0),
                reused: AtomicUsize::new(0),
                live: AtomicUsize::new(0),
            }),
        }
    }

    /// Hands out a block of `rows` data rows with all registers null.
    pub fn request_block(&self, rows: usize, regs: usize) -> ItemBlockBuilder {
        self.inner.requested.fetch_add(1, Ordering::Relaxed);
        self.inner.live.fetch_add(1, Ordering::Relaxed);
        let recycled = self.inner.free.lock().pop();
        let (values, kinds) = match recycled {
            Some(buffers) => {
                self.inner.reused.fetch_add(1, Ordering::Relaxed);
                buffers
            }
            None => (Vec::new(), Vec::new()),
        };
        trace!(rows, regs, "block requested");
        ItemBlockBuilder::from_storage(BlockStorage::from_buffers(
            values,
            kinds,
            rows,
            regs,
            Arc::downgrade(&self.inner),
        ))
    }

    /// Current counters.
    pub fn stats(&self) -> BlockManagerStats {
        BlockManagerStats {
            requested: self.inner.requested.load(Ordering::Relaxed),
            reused: self.inner.reused.load(Ordering::Relaxed),
            live: self.inner.live.load(Ordering::Relaxed),
            pooled: self.inner.free.lock().len(),
        }
    }
}

impl std::fmt::Debug for BlockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockManager")
            .field("capacity", &self.inner.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

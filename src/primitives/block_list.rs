//! Primitive storage as a list of fixed size blocks, with a per-thread block cache.

use std::sync::Mutex;

use arrayvec::ArrayVec;

use super::{ListChunks, PrimRef};

pub const BLOCK_CAPACITY: usize = 256;

#[derive(Clone, Debug, Default)]
pub struct PrimRefBlock {
    prims: ArrayVec<PrimRef, BLOCK_CAPACITY>,
}

impl PrimRefBlock {
    /// Appends a primitive, returns false if the block is already full.
    #[inline]
    pub fn insert(&mut self, prim: PrimRef) -> bool {
        self.prims.try_push(prim).is_ok()
    }

    pub fn prims(&self) -> &[PrimRef] {
        &self.prims
    }

    pub fn len(&self) -> usize {
        self.prims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prims.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.prims.is_full()
    }

    pub fn clear(&mut self) {
        self.prims.clear();
    }
}

#[derive(Debug, Default)]
pub struct PrimRefList {
    blocks: Vec<Box<PrimRefBlock>>,
}

impl PrimRefList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list by packing primitives into freshly allocated blocks.
    pub fn from_prims(prims: impl IntoIterator<Item = PrimRef>) -> Self {
        let mut list = PrimRefList::new();
        let mut block = Box::<PrimRefBlock>::default();
        for prim in prims {
            if !block.insert(prim) {
                list.insert(std::mem::take(&mut block));
                let inserted = block.insert(prim);
                debug_assert!(inserted);
            }
        }
        if !block.is_empty() {
            list.insert(block);
        }
        list
    }

    pub fn insert(&mut self, block: Box<PrimRefBlock>) {
        self.blocks.push(block);
    }

    /// Removes one block from the list.
    pub fn take(&mut self) -> Option<Box<PrimRefBlock>> {
        self.blocks.pop()
    }

    pub fn append(&mut self, mut other: PrimRefList) {
        self.blocks.append(&mut other.blocks);
    }

    /// Number of primitives in all blocks.
    pub fn len(&self) -> usize {
        self.blocks.iter().map(|block| block.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|block| block.is_empty())
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn chunks(&self) -> ListChunks<'_> {
        ListChunks::new(&self.blocks)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrimRef> {
        self.blocks.iter().flat_map(|block| block.prims().iter())
    }
}

/// Hands out blocks, caching freed ones per thread.
#[derive(Debug)]
pub struct BlockAllocator {
    free_lists: Vec<Mutex<Vec<Box<PrimRefBlock>>>>,
}

impl BlockAllocator {
    pub fn new(max_threads: usize) -> Self {
        assert!(max_threads > 0);
        BlockAllocator {
            free_lists: (0..max_threads).map(|_| Mutex::default()).collect(),
        }
    }

    pub fn max_threads(&self) -> usize {
        self.free_lists.len()
    }

    /// Returns an empty block, reusing one freed by this thread if possible.
    pub fn allocate(&self, thread_id: usize) -> Box<PrimRefBlock> {
        self.free_lists[thread_id]
            .lock()
            .expect("Poisoned lock!")
            .pop()
            .unwrap_or_default()
    }

    pub fn free(&self, thread_id: usize, mut block: Box<PrimRefBlock>) {
        block.clear();
        self.free_lists[thread_id]
            .lock()
            .expect("Poisoned lock!")
            .push(block);
    }

    /// Returns all blocks of the list to the cache of the given thread.
    pub fn free_list(&self, thread_id: usize, mut list: PrimRefList) {
        while let Some(block) = list.take() {
            self.free(thread_id, block);
        }
    }

    /// Number of blocks waiting for reuse, over all threads.
    pub fn cached_blocks(&self) -> usize {
        self.free_lists
            .iter()
            .map(|list| list.lock().expect("Poisoned lock!").len())
            .sum()
    }
}

/// Appends primitives to a list, allocating blocks from the allocator on demand.
#[derive(Debug)]
pub struct ListWriter<'a> {
    list: PrimRefList,
    current: Box<PrimRefBlock>,
    alloc: &'a BlockAllocator,
    thread_id: usize,
}

impl<'a> ListWriter<'a> {
    pub fn new(alloc: &'a BlockAllocator, thread_id: usize) -> Self {
        ListWriter {
            list: PrimRefList::new(),
            current: alloc.allocate(thread_id),
            alloc,
            thread_id,
        }
    }

    #[inline]
    pub fn push(&mut self, prim: PrimRef) {
        if self.current.insert(prim) {
            return;
        }
        let full = std::mem::replace(&mut self.current, self.alloc.allocate(self.thread_id));
        self.list.insert(full);
        let inserted = self.current.insert(prim);
        debug_assert!(inserted);
    }

    pub fn finish(mut self) -> PrimRefList {
        if self.current.is_empty() {
            self.alloc.free(self.thread_id, self.current);
        } else {
            self.list.insert(self.current);
        }
        self.list
    }
}

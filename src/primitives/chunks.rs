//! Uniform "give me the next contiguous chunk" access to primitive storage.
//!
//! The cursor is atomic, so one source can be drained by a single thread or
//! shared by a group of tasks; every chunk is handed out exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::{PrimRef, PrimRefBlock};

pub trait PrimChunks<'a>: Sync {
    /// Returns the next unclaimed chunk, or None once the source is drained.
    fn next_chunk(&self) -> Option<&'a [PrimRef]>;
}

/// Chunks of a flat primitive array.
#[derive(Debug)]
pub struct SliceChunks<'a> {
    prims: &'a [PrimRef],
    chunk_len: usize,
    next: AtomicUsize,
}

impl<'a> SliceChunks<'a> {
    pub const DEFAULT_CHUNK_LEN: usize = 1024;

    pub fn new(prims: &'a [PrimRef]) -> Self {
        Self::with_chunk_len(prims, Self::DEFAULT_CHUNK_LEN)
    }

    pub fn with_chunk_len(prims: &'a [PrimRef], chunk_len: usize) -> Self {
        assert!(chunk_len > 0);
        SliceChunks {
            prims,
            chunk_len,
            next: AtomicUsize::new(0),
        }
    }
}

impl<'a> PrimChunks<'a> for SliceChunks<'a> {
    fn next_chunk(&self) -> Option<&'a [PrimRef]> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        let start = index.checked_mul(self.chunk_len)?;
        if start >= self.prims.len() {
            return None;
        }
        let end = (start + self.chunk_len).min(self.prims.len());
        Some(&self.prims[start..end])
    }
}

/// One chunk per block of a block list.
#[derive(Debug)]
pub struct ListChunks<'a> {
    blocks: &'a [Box<PrimRefBlock>],
    next: AtomicUsize,
}

impl<'a> ListChunks<'a> {
    pub fn new(blocks: &'a [Box<PrimRefBlock>]) -> Self {
        ListChunks {
            blocks,
            next: AtomicUsize::new(0),
        }
    }
}

impl<'a> PrimChunks<'a> for ListChunks<'a> {
    fn next_chunk(&self) -> Option<&'a [PrimRef]> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        self.blocks.get(index).map(|block| block.prims())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{primitives::PrimRefList, scene::random_boxes};

    use assert2::assert;
    use test_case::test_case;

    fn drain_ids<'a>(chunks: &impl PrimChunks<'a>) -> Vec<u32> {
        let mut ids = Vec::new();
        while let Some(chunk) = chunks.next_chunk() {
            ids.extend(chunk.iter().map(|p| p.prim_id));
        }
        ids
    }

    #[test_case(0, 16)]
    #[test_case(1, 16)]
    #[test_case(16, 16)]
    #[test_case(17, 16)]
    #[test_case(1000, 7)]
    fn slice_chunks_cover_everything_once(len: usize, chunk_len: usize) {
        let prims = random_boxes(len, 1.0, 0);
        let chunks = SliceChunks::with_chunk_len(&prims, chunk_len);

        assert!(drain_ids(&chunks) == (0..len as u32).collect::<Vec<_>>());
        assert!(chunks.next_chunk().is_none());
    }

    #[test]
    fn list_chunks_cover_everything_once() {
        let prims = random_boxes(1000, 1.0, 0);
        let list = PrimRefList::from_prims(prims.iter().copied());

        let mut ids = drain_ids(&list.chunks());
        ids.sort();
        assert!(ids == (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn shared_between_threads() {
        let prims = random_boxes(10_000, 1.0, 0);
        let chunks = SliceChunks::with_chunk_len(&prims, 13);

        let mut ids: Vec<u32> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| drain_ids(&chunks)))
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });
        ids.sort();

        assert!(ids == (0..10_000).collect::<Vec<_>>());
    }
}

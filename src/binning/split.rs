use assert2::{assert, debug_assert};

use crate::{
    geometry::FloatType,
    primitives::{
        BlockAllocator, BuildRecord, CentGeomBounds, PrimChunks, PrimInfo, PrimRef, PrimRefList,
        SliceChunks, block_list::ListWriter,
    },
};

use super::{BinInfo, Mapping};

/// Result of the SAH evaluation.
///
/// Primitives whose centroid bin in `axis` is below `pos` go left, the rest goes right.
/// `axis == None` means no valid split exists; choosing a fallback is up to the caller.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Split {
    pub sah: FloatType,
    pub axis: Option<usize>,
    pub pos: usize,
    pub mapping: Mapping,
}

impl Split {
    pub fn invalid(mapping: Mapping) -> Split {
        Split {
            sah: FloatType::INFINITY,
            axis: None,
            pos: 0,
            mapping,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.axis.is_some()
    }

    /// Axis of a valid split. Partitioning around an invalid split is a bug in the caller.
    fn valid_axis(&self) -> usize {
        let Some(axis) = self.axis else {
            panic!("Cannot partition around an invalid split");
        };
        axis
    }

    /// Returns true if the primitive belongs to the left side.
    /// The bin index is always recomputed from the primitive itself.
    #[inline]
    pub(crate) fn goes_left(&self, axis: usize, prim: &PrimRef) -> bool {
        self.mapping.bin_unchecked(&prim.center2(), axis) < self.pos as i32
    }

    /// Reorders `prims[begin..end]` in place so that left primitives come first.
    ///
    /// Runs a two-pointer scan from both ends, swapping misplaced pairs and collecting the
    /// bounds of both sides on the way. Order within each side is unspecified.
    pub fn partition(
        &self,
        prims: &mut [PrimRef],
        begin: usize,
        end: usize,
    ) -> (BuildRecord, BuildRecord) {
        let axis = self.valid_axis();
        assert!(begin <= end && end <= prims.len());

        let mut left_bounds = CentGeomBounds::empty();
        let mut right_bounds = CentGeomBounds::empty();

        // Invariant: prims[begin..l] are left, prims[r..end] are right
        let mut l = begin;
        let mut r = end;
        loop {
            while l < r && self.goes_left(axis, &prims[l]) {
                left_bounds.extend_prim(&prims[l]);
                l += 1;
            }
            while l < r && !self.goes_left(axis, &prims[r - 1]) {
                right_bounds.extend_prim(&prims[r - 1]);
                r -= 1;
            }
            if l >= r {
                break;
            }

            prims.swap(l, r - 1);
            left_bounds.extend_prim(&prims[l]);
            right_bounds.extend_prim(&prims[r - 1]);
            l += 1;
            r -= 1;
        }
        debug_assert!(l == r);

        let left = BuildRecord::new(left_bounds, begin, l);
        let right = BuildRecord::new(right_bounds, l, end);
        debug_assert!(left.bounds.is_valid());
        debug_assert!(right.bounds.is_valid());
        (left, right)
    }

    /// Moves all primitives of the list into two new lists.
    /// Consumed blocks are returned to the allocator.
    pub fn split_list(
        &self,
        alloc: &BlockAllocator,
        thread_id: usize,
        mut prims: PrimRefList,
    ) -> ListSplit {
        let mut router = ListRouter::new(self, alloc, thread_id);
        while let Some(block) = prims.take() {
            router.route_all(block.prims());
            alloc.free(thread_id, block);
        }
        router.finish()
    }
}

/// Two output lists of a list split, with their aggregate info.
#[derive(Debug, Default)]
pub struct ListSplit {
    pub left: PrimRefList,
    pub left_info: PrimInfo,
    pub right: PrimRefList,
    pub right_info: PrimInfo,
}

impl ListSplit {
    pub fn merge(&mut self, other: ListSplit) {
        self.left.append(other.left);
        self.left_info.merge(&other.left_info);
        self.right.append(other.right);
        self.right_info.merge(&other.right_info);
    }
}

/// Routes primitives of a list split into the left or right writer.
pub(crate) struct ListRouter<'a> {
    split: &'a Split,
    axis: usize,
    left: ListWriter<'a>,
    left_info: PrimInfo,
    right: ListWriter<'a>,
    right_info: PrimInfo,
}

impl<'a> ListRouter<'a> {
    pub(crate) fn new(split: &'a Split, alloc: &'a BlockAllocator, thread_id: usize) -> Self {
        ListRouter {
            split,
            axis: split.valid_axis(),
            left: ListWriter::new(alloc, thread_id),
            left_info: PrimInfo::default(),
            right: ListWriter::new(alloc, thread_id),
            right_info: PrimInfo::default(),
        }
    }

    pub(crate) fn route_all(&mut self, prims: &[PrimRef]) {
        for prim in prims {
            let center2 = prim.center2();
            if self.split.goes_left(self.axis, prim) {
                self.left_info.add(&prim.bounds, &center2);
                self.left.push(*prim);
            } else {
                self.right_info.add(&prim.bounds, &center2);
                self.right.push(*prim);
            }
        }
    }

    pub(crate) fn finish(self) -> ListSplit {
        ListSplit {
            left: self.left.finish(),
            left_info: self.left_info,
            right: self.right.finish(),
            right_info: self.right_info,
        }
    }
}

/// Bins `prims[info.begin..info.end]` and returns the best SAH split.
pub fn evaluate_split(prims: &[PrimRef], info: &PrimInfo, log_block_size: u32) -> Split {
    let mapping = Mapping::new(info);
    let mut bins = BinInfo::new();
    bins.bin(&prims[info.begin..info.end], &mapping);
    bins.best(&mapping, log_block_size)
}

/// Bins everything the chunk source yields and returns the best SAH split.
pub fn evaluate_split_chunks<'a>(
    chunks: &impl PrimChunks<'a>,
    info: &PrimInfo,
    log_block_size: u32,
) -> Split {
    let mapping = Mapping::new(info);
    let mut bins = BinInfo::new();
    bins.bin_chunks(chunks, &mapping);
    bins.best(&mapping, log_block_size)
}

/// Same as `evaluate_split` for a block list.
pub fn evaluate_split_list(prims: &PrimRefList, info: &PrimInfo, log_block_size: u32) -> Split {
    evaluate_split_chunks(&prims.chunks(), info, log_block_size)
}

/// Same as `evaluate_split`, the range is chunked first.
pub fn evaluate_split_chunked(prims: &[PrimRef], info: &PrimInfo, log_block_size: u32) -> Split {
    evaluate_split_chunks(
        &SliceChunks::new(&prims[info.begin..info.end]),
        info,
        log_block_size,
    )
}

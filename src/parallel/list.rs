use assert2::assert;

use crate::{
    binning::{BinInfo, ListRouter, ListSplit, Mapping, Split},
    primitives::{BlockAllocator, PrimChunks, PrimInfo, PrimRefList},
};

use super::TaskPool;

/// Bins everything the chunk source yields using all tasks of the pool and returns the best split.
/// Tasks pull chunks from the shared cursor until it runs dry.
pub fn evaluate_split_parallel<'a>(
    pool: &TaskPool,
    chunks: &impl PrimChunks<'a>,
    info: &PrimInfo,
    log_block_size: u32,
) -> Split {
    let mapping = Mapping::new(info);
    let mut task_bins = vec![BinInfo::default(); pool.num_tasks()];
    pool.dispatch_with(&mut task_bins, |_, bins| bins.bin_chunks(chunks, &mapping));
    BinInfo::reduce(&task_bins).best(&mapping, log_block_size)
}

/// Same as `evaluate_split_parallel` for a block list.
pub fn evaluate_split_list_parallel(
    pool: &TaskPool,
    prims: &PrimRefList,
    info: &PrimInfo,
    log_block_size: u32,
) -> Split {
    evaluate_split_parallel(pool, &prims.chunks(), info, log_block_size)
}

/// Splits a block list in parallel.
///
/// Every task routes the blocks it pulls into its own pair of output lists, allocating from
/// the free list of its task index. The per-task results are concatenated after the join and
/// the consumed input blocks are handed back to the allocator.
pub fn split_list_parallel(
    pool: &TaskPool,
    alloc: &BlockAllocator,
    split: &Split,
    prims: PrimRefList,
) -> ListSplit {
    assert!(split.is_valid(), "Cannot split a list around an invalid split");
    let num_tasks = pool.num_tasks().min(alloc.max_threads());
    let mut results: Vec<ListSplit> = (0..num_tasks).map(|_| ListSplit::default()).collect();

    {
        let chunks = prims.chunks();
        pool.dispatch_with(&mut results, |task, result| {
            let mut router = ListRouter::new(split, alloc, task);
            while let Some(chunk) = chunks.next_chunk() {
                router.route_all(chunk);
            }
            *result = router.finish();
        });
    }

    let mut ret = ListSplit::default();
    for result in results {
        ret.merge(result);
    }

    alloc.free_list(0, prims);

    log::trace!(
        "Parallel list split in {} tasks: {} left, {} right",
        num_tasks,
        ret.left_info.count,
        ret.right_info.count
    );
    ret
}

use std::{
    marker::PhantomData,
    ops::Range,
    sync::atomic::{AtomicUsize, Ordering},
};

use assert2::{assert, debug_assert};

use crate::{
    binning::{BinInfo, Mapping, Split},
    primitives::{BuildRecord, CentGeomBounds, PrimInfo, PrimRef},
};

use super::TaskPool;

/// What one task of a parallel partition reserved and collected.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskPartition {
    /// Destination indices reserved for left primitives.
    pub left_range: Range<usize>,
    /// Destination indices reserved for right primitives.
    pub right_range: Range<usize>,
    pub left: CentGeomBounds,
    pub right: CentGeomBounds,
}

/// Scratch state for parallel binning and partitioning of a flat primitive array.
///
/// The range is cut into one contiguous slice per task. `find` bins each slice into a
/// private table and merges them; `partition` then reuses the per-task tables to know
/// how many left and right primitives each slice has, reserves destination ranges via two
/// atomic counters and copies the primitives over.
///
/// `partition` must be called after `find`, with the same source array.
#[derive(Debug)]
pub struct ParallelBinner {
    task_bins: Vec<BinInfo>,
    task_partitions: Vec<TaskPartition>,
    num_tasks: usize,
    info: PrimInfo,
    bins: BinInfo,
    split: Option<Split>,
    left_counter: AtomicUsize,
    right_counter: AtomicUsize,
}

impl ParallelBinner {
    pub fn new(max_tasks: usize) -> ParallelBinner {
        assert!(max_tasks > 0);
        ParallelBinner {
            task_bins: vec![BinInfo::default(); max_tasks],
            task_partitions: vec![TaskPartition::default(); max_tasks],
            num_tasks: 0,
            info: PrimInfo::default(),
            bins: BinInfo::default(),
            split: None,
            left_counter: AtomicUsize::new(0),
            right_counter: AtomicUsize::new(0),
        }
    }

    /// Bins `prims[info.begin..info.end]` in parallel and returns the best split.
    pub fn find(
        &mut self,
        pool: &TaskPool,
        prims: &[PrimRef],
        info: &PrimInfo,
        log_block_size: u32,
    ) -> Split {
        assert!(info.end <= prims.len());
        let num_tasks = pool.num_tasks().min(self.task_bins.len());
        let mapping = Mapping::new(info);
        let range = info.begin..info.end;

        log::trace!("Parallel binning of {} primitives in {} tasks", info.count, num_tasks);

        pool.dispatch_with(&mut self.task_bins[..num_tasks], |task, bins| {
            bins.clear();
            bins.bin(&prims[task_range(&range, task, num_tasks)], &mapping);
        });

        self.bins = BinInfo::reduce(&self.task_bins[..num_tasks]);
        let split = self.bins.best(&mapping, log_block_size);

        self.num_tasks = num_tasks;
        self.info = *info;
        self.split = Some(split);
        split
    }

    /// Merged histogram of the last `find`.
    pub fn bins(&self) -> &BinInfo {
        &self.bins
    }

    /// Per-task reservations and bounds of the last `partition`.
    pub fn task_partitions(&self) -> &[TaskPartition] {
        &self.task_partitions[..self.num_tasks]
    }

    /// Copies `src[begin..end]` of the last `find` into `dst[begin..end]`, left primitives first.
    /// `src` must be the same array that was binned. Order within each side depends on scheduling.
    pub fn partition(
        &mut self,
        pool: &TaskPool,
        src: &[PrimRef],
        dst: &mut [PrimRef],
    ) -> (BuildRecord, BuildRecord) {
        let Some(split) = self.split else {
            panic!("Parallel partition without a preceding find");
        };
        let Some(axis) = split.axis else {
            panic!("Cannot partition around an invalid split");
        };
        let info = self.info;
        let num_tasks = self.num_tasks;
        let range = info.begin..info.end;
        assert!(range.end <= src.len());
        assert!(range.end <= dst.len());

        let num_left = self.bins.num_left(&split);
        let mid = info.begin + num_left;

        self.left_counter.store(0, Ordering::Relaxed);
        self.right_counter.store(0, Ordering::Relaxed);

        let (left_dst, right_dst) = dst[range.clone()].split_at_mut(num_left);
        let left_dst = DisjointSlice::new(left_dst);
        let right_dst = DisjointSlice::new(right_dst);
        let left_counter = &self.left_counter;
        let right_counter = &self.right_counter;
        let task_bins = &self.task_bins;

        log::trace!(
            "Parallel partition of {} primitives in {} tasks, {} left",
            info.count,
            num_tasks,
            num_left
        );

        pool.dispatch_with(&mut self.task_partitions[..num_tasks], |task, result| {
            let slice = task_range(&range, task, num_tasks);
            let local_left = task_bins[task].num_left(&split);
            let local_right = slice.len() - local_left;

            let left_start = left_counter.fetch_add(local_left, Ordering::Relaxed);
            let right_start = right_counter.fetch_add(local_right, Ordering::Relaxed);

            // SAFETY: ranges come from fetch_add on a per-side counter, so no two tasks get
            // overlapping ones.
            let left_out = unsafe { left_dst.range_mut(left_start, local_left) };
            let right_out = unsafe { right_dst.range_mut(right_start, local_right) };

            let mut left_bounds = CentGeomBounds::empty();
            let mut right_bounds = CentGeomBounds::empty();
            let mut written_left = 0;
            let mut written_right = 0;
            for prim in &src[slice] {
                if split.goes_left(axis, prim) {
                    left_bounds.extend_prim(prim);
                    left_out[written_left] = *prim;
                    written_left += 1;
                } else {
                    right_bounds.extend_prim(prim);
                    right_out[written_right] = *prim;
                    written_right += 1;
                }
            }
            assert!(written_left == local_left);
            assert!(written_right == local_right);

            *result = TaskPartition {
                left_range: info.begin + left_start..info.begin + left_start + local_left,
                right_range: mid + right_start..mid + right_start + local_right,
                left: left_bounds,
                right: right_bounds,
            };
        });

        assert!(self.left_counter.load(Ordering::Relaxed) == num_left);
        assert!(self.right_counter.load(Ordering::Relaxed) == info.count - num_left);

        let mut left_bounds = CentGeomBounds::empty();
        let mut right_bounds = CentGeomBounds::empty();
        for result in &self.task_partitions[..num_tasks] {
            left_bounds.merge(&result.left);
            right_bounds.merge(&result.right);
        }

        let left = BuildRecord::new(left_bounds, info.begin, mid);
        let right = BuildRecord::new(right_bounds, mid, info.end);
        debug_assert!(left.bounds.is_valid());
        debug_assert!(right.bounds.is_valid());
        (left, right)
    }
}

/// Contiguous slice of the range handled by one task.
fn task_range(range: &Range<usize>, task: usize, num_tasks: usize) -> Range<usize> {
    let len = range.end - range.start;
    range.start + task * len / num_tasks..range.start + (task + 1) * len / num_tasks
}

/// Destination slice that can be written by many tasks at once, each into its own range.
struct DisjointSlice<'a> {
    ptr: *mut PrimRef,
    len: usize,
    _marker: PhantomData<&'a mut [PrimRef]>,
}

// SAFETY: only hands out non-overlapping ranges (see `range_mut`), `PrimRef` is plain data.
unsafe impl Sync for DisjointSlice<'_> {}

impl<'a> DisjointSlice<'a> {
    fn new(slice: &'a mut [PrimRef]) -> Self {
        DisjointSlice {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            _marker: PhantomData,
        }
    }

    /// # Safety
    /// Ranges requested while any returned slice is alive must not overlap.
    #[allow(clippy::mut_from_ref)]
    unsafe fn range_mut(&self, start: usize, len: usize) -> &'a mut [PrimRef] {
        assert!(
            start.checked_add(len).is_some_and(|end| end <= self.len),
            "Reserved range {start}+{len} exceeds destination size {}",
            self.len
        );
        unsafe { std::slice::from_raw_parts_mut(self.ptr.add(start), len) }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        binning::evaluate_split,
        parallel::WorkerCount,
        scene::{random_boxes, unit_box_at},
    };

    use std::num::NonZeroUsize;

    use assert2::{assert, let_assert};
    use test_case::test_case;

    fn pool(num_tasks: usize) -> TaskPool {
        TaskPool::with_max_tasks(
            WorkerCount::Manual(NonZeroUsize::new(num_tasks).unwrap()),
            num_tasks,
        )
    }

    fn sorted_ids(prims: &[PrimRef]) -> Vec<u32> {
        let mut ids: Vec<_> = prims.iter().map(|p| p.prim_id).collect();
        ids.sort();
        ids
    }

    #[test]
    fn binning_is_independent_of_task_count() {
        let prims = random_boxes(10_000, 1.0, 42);
        let info = PrimInfo::from_prims(&prims);

        let mapping = Mapping::new(&info);
        let mut serial_bins = BinInfo::new();
        serial_bins.bin(&prims, &mapping);
        let serial_split = evaluate_split(&prims, &info, 2);

        for num_tasks in [1, 2, 4, 8] {
            let mut binner = ParallelBinner::new(num_tasks);
            let split = binner.find(&pool(num_tasks), &prims, &info, 2);
            assert!(binner.bins() == &serial_bins, "{num_tasks} tasks");
            assert!(split == serial_split, "{num_tasks} tasks");
        }
    }

    #[test_case(1)]
    #[test_case(3)]
    #[test_case(8)]
    fn partition_matches_serial(num_tasks: usize) {
        let prims = random_boxes(5000, 1.0, 1);
        let info = PrimInfo::from_range(&prims, 100, 4900);
        let pool = pool(num_tasks);

        let mut binner = ParallelBinner::new(num_tasks);
        let split = binner.find(&pool, &prims, &info, 2);
        let mut dst = prims.clone();
        let (left, right) = binner.partition(&pool, &prims, &mut dst);

        let mut serial = prims.clone();
        let (serial_left, serial_right) = split.partition(&mut serial, info.begin, info.end);

        assert!(left == serial_left);
        assert!(right == serial_right);
        assert!(sorted_ids(&dst[left.range()]) == sorted_ids(&serial[serial_left.range()]));
        assert!(sorted_ids(&dst[right.range()]) == sorted_ids(&serial[serial_right.range()]));
        // Outside of the range the destination is untouched
        assert!(dst[..100] == prims[..100]);
        assert!(dst[4900..] == prims[4900..]);
    }

    #[test_case(2)]
    #[test_case(4)]
    #[test_case(7)]
    fn reservations_tile_the_output(num_tasks: usize) {
        let prims = random_boxes(3001, 1.0, 9);
        let info = PrimInfo::from_prims(&prims);
        let pool = pool(num_tasks);

        let mut binner = ParallelBinner::new(num_tasks);
        binner.find(&pool, &prims, &info, 0);
        let mut dst = vec![prims[0]; prims.len()];
        let (left, right) = binner.partition(&pool, &prims, &mut dst);

        let reservations = binner.task_partitions();
        assert!(reservations.len() == num_tasks);

        let left_total: usize = reservations.iter().map(|r| r.left_range.len()).sum();
        let right_total: usize = reservations.iter().map(|r| r.right_range.len()).sum();
        assert!(left_total == left.len());
        assert!(right_total == right.len());

        for side in [
            reservations.iter().map(|r| r.left_range.clone()).collect::<Vec<_>>(),
            reservations.iter().map(|r| r.right_range.clone()).collect::<Vec<_>>(),
        ] {
            let mut side = side;
            side.sort_by_key(|r| r.start);
            for pair in side.windows(2) {
                assert!(pair[0].end == pair[1].start, "{:?}", pair);
            }
        }

        assert!(sorted_ids(&dst) == sorted_ids(&prims));
    }

    #[test_case(2)]
    #[test_case(5)]
    fn partition_bounds_are_exact(num_tasks: usize) {
        let prims = random_boxes(4000, 3.0, 21);
        let info = PrimInfo::from_range(&prims, 500, 3500);
        let pool = pool(num_tasks);

        let mut binner = ParallelBinner::new(num_tasks);
        binner.find(&pool, &prims, &info, 1);
        let mut dst = prims.clone();
        let (left, right) = binner.partition(&pool, &prims, &mut dst);

        for side in [left, right] {
            assert!(side.bounds.is_valid());
            assert!(!side.bounds.geometry.is_empty());
            assert!(side.bounds == PrimInfo::from_range(&dst, side.begin, side.end).bounds);
        }
    }

    #[test]
    fn more_tasks_than_primitives() {
        let mut prims: Vec<_> = (0..3)
            .map(|i| unit_box_at(crate::geometry::WorldPoint::new(i as f32, 0.0, 0.0), i))
            .collect();
        prims.reverse();
        let info = PrimInfo::from_prims(&prims);
        let pool = pool(8);

        let mut binner = ParallelBinner::new(8);
        let split = binner.find(&pool, &prims, &info, 0);
        let_assert!(Some(0) = split.axis);

        let mut dst = prims.clone();
        let (left, right) = binner.partition(&pool, &prims, &mut dst);
        assert!(left.len() + right.len() == 3);
        assert!(sorted_ids(&dst) == vec![0, 1, 2]);
    }

    #[test]
    #[should_panic]
    fn partition_without_find_panics() {
        let prims = random_boxes(10, 1.0, 0);
        let mut dst = prims.clone();
        ParallelBinner::new(2).partition(&pool(2), &prims, &mut dst);
    }

    #[test]
    fn task_ranges_cover_the_range() {
        let range = 17..1017;
        for num_tasks in 1..12 {
            let ranges: Vec<_> = (0..num_tasks)
                .map(|t| task_range(&range, t, num_tasks))
                .collect();
            assert!(ranges[0].start == range.start);
            assert!(ranges[num_tasks - 1].end == range.end);
            for pair in ranges.windows(2) {
                assert!(pair[0].end == pair[1].start);
            }
        }
    }
}

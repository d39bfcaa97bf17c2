use wide::{CmpLt as _, f32x4};

use crate::{
    geometry::{AXES, FloatType, WorldBox},
    primitives::{PrimChunks, PrimRef},
};

use super::{MAX_BINS, Mapping, Split};

/// Per-axis histogram of primitive counts and bounds.
///
/// Merging is a per-bin box union and count sum, both associative and commutative,
/// with the empty table as identity. Binning can therefore be split over any number
/// of tasks and merged in any order with bit-identical results.
#[derive(Clone, Debug, PartialEq)]
pub struct BinInfo {
    bounds: [[WorldBox; AXES]; MAX_BINS],
    counts: [[usize; AXES]; MAX_BINS],
}

impl Default for BinInfo {
    fn default() -> Self {
        BinInfo {
            bounds: [[WorldBox::empty(); AXES]; MAX_BINS],
            counts: [[0; AXES]; MAX_BINS],
        }
    }
}

impl BinInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn count(&self, bin: usize, axis: usize) -> usize {
        self.counts[bin][axis]
    }

    pub fn bounds(&self, bin: usize, axis: usize) -> &WorldBox {
        &self.bounds[bin][axis]
    }

    /// Total number of binned primitives. Every axis sees all of them.
    pub fn total_count(&self) -> usize {
        self.counts.iter().map(|c| c[0]).sum()
    }

    #[inline]
    fn bin_one(&mut self, prim: &PrimRef, mapping: &Mapping) {
        let bins = mapping.bin(&prim.center2());
        for axis in 0..AXES {
            self.counts[bins[axis]][axis] += 1;
            self.bounds[bins[axis]][axis].extend(&prim.bounds);
        }
    }

    /// Adds all primitives of the slice to the histogram.
    pub fn bin(&mut self, prims: &[PrimRef], mapping: &Mapping) {
        for prim in prims {
            self.bin_one(prim, mapping);
        }
    }

    /// Drains the chunk source into the histogram.
    pub fn bin_chunks<'a>(&mut self, chunks: &impl PrimChunks<'a>, mapping: &Mapping) {
        while let Some(chunk) = chunks.next_chunk() {
            self.bin(chunk, mapping);
        }
    }

    pub fn merge(&mut self, other: &BinInfo) {
        for bin in 0..MAX_BINS {
            for axis in 0..AXES {
                self.counts[bin][axis] += other.counts[bin][axis];
                self.bounds[bin][axis].extend(&other.bounds[bin][axis]);
            }
        }
    }

    /// Merges a group of per-task tables into one.
    pub fn reduce(tables: &[BinInfo]) -> BinInfo {
        let mut ret = BinInfo::default();
        for table in tables {
            ret.merge(table);
        }
        ret
    }

    /// Number of primitives the histogram sends to the left of the split.
    pub fn num_left(&self, split: &Split) -> usize {
        let Some(axis) = split.axis else {
            return 0;
        };
        self.counts[..split.pos].iter().map(|c| c[axis]).sum()
    }

    pub fn num_right(&self, split: &Split) -> usize {
        let Some(axis) = split.axis else {
            return self.total_count();
        };
        self.counts[split.pos..].iter().map(|c| c[axis]).sum()
    }

    /// Finds the split with minimal SAH cost.
    ///
    /// Cost of a boundary is `left_area * blocks(left_count) + right_area * blocks(right_count)`,
    /// where blocks rounds the count up to multiples of `1 << log_block_size`.
    /// Returns a split with `axis == None` if no axis has a usable boundary.
    pub fn best(&self, mapping: &Mapping, log_block_size: u32) -> Split {
        let num_bins = mapping.num_bins();
        let blocks = |count: usize| -> FloatType {
            ((count + (1 << log_block_size) - 1) >> log_block_size) as FloatType
        };

        // Sweep from right to left, remembering area and count right of each boundary
        let mut right_areas = [f32x4::ZERO; MAX_BINS];
        let mut right_counts = [[0usize; AXES]; MAX_BINS];
        let mut count = [0usize; AXES];
        let mut boxes = [WorldBox::empty(); AXES];
        for i in (1..num_bins).rev() {
            for axis in 0..AXES {
                count[axis] += self.counts[i][axis];
                boxes[axis].extend(&self.bounds[i][axis]);
            }
            right_counts[i] = count;
            right_areas[i] = half_areas(&boxes);
        }

        // Sweep from left to right, evaluating the cost at each boundary
        let mut best_sah = f32x4::splat(FloatType::INFINITY);
        let mut best_pos = f32x4::ZERO;
        let mut count = [0usize; AXES];
        let mut boxes = [WorldBox::empty(); AXES];
        for i in 1..num_bins {
            for axis in 0..AXES {
                count[axis] += self.counts[i - 1][axis];
                boxes[axis].extend(&self.bounds[i - 1][axis]);
            }
            let left_blocks = f32x4::from([
                blocks(count[0]),
                blocks(count[1]),
                blocks(count[2]),
                0.0,
            ]);
            let right_blocks = f32x4::from([
                blocks(right_counts[i][0]),
                blocks(right_counts[i][1]),
                blocks(right_counts[i][2]),
                0.0,
            ]);
            let sah = half_areas(&boxes) * left_blocks + right_areas[i] * right_blocks;
            let better = sah.cmp_lt(best_sah);
            best_pos = better.blend(f32x4::splat(i as FloatType), best_pos);
            best_sah = better.blend(sah, best_sah);
        }

        let best_sah = best_sah.to_array();
        let best_pos = best_pos.to_array();
        let mut split = Split::invalid(*mapping);
        for axis in 0..AXES {
            if mapping.invalid(axis) {
                continue;
            }
            if best_sah[axis] < split.sah && best_pos[axis] != 0.0 {
                split = Split {
                    sah: best_sah[axis],
                    axis: Some(axis),
                    pos: best_pos[axis] as usize,
                    mapping: *mapping,
                };
            }
        }
        split
    }
}

#[inline]
fn half_areas(boxes: &[WorldBox; AXES]) -> f32x4 {
    f32x4::from([
        boxes[0].half_area(),
        boxes[1].half_area(),
        boxes[2].half_area(),
        0.0,
    ])
}

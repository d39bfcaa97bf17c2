use std::array;

use assert2::debug_assert;

use crate::{
    geometry::{AXES, FloatType, WorldPoint, WorldVector},
    primitives::PrimInfo,
};

/// Upper bound on the number of bins per axis.
pub const MAX_BINS: usize = 16;

/// Scale factor keeping the largest centroid strictly below `num_bins` after scaling.
/// Expressed in machine epsilons, so the margin follows the precision of `FloatType`.
const BIN_SCALE_MARGIN: FloatType = 1.0 - 1024.0 * FloatType::EPSILON;

/// Maps doubled centroids to bin indices, independently in each axis.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Mapping {
    num_bins: usize,
    scale: WorldVector,
    offset: WorldVector,
}

impl Mapping {
    pub fn new(info: &PrimInfo) -> Mapping {
        let num_bins = ((4.0 + 0.05 * info.count as FloatType) as usize).clamp(1, MAX_BINS);
        let centroid_bounds = &info.bounds.centroid2;
        let extent = centroid_bounds.size();
        let scale = extent.map(|d| {
            let s = BIN_SCALE_MARGIN * num_bins as FloatType / d;
            if d > 0.0 && s.is_finite() { s } else { 0.0 }
        });
        let offset = if centroid_bounds.is_empty() {
            WorldVector::zeros()
        } else {
            centroid_bounds.min.coords
        };

        Mapping {
            num_bins,
            scale,
            offset,
        }
    }

    /// Number of bins, shared by all axes.
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Zero centroid extent in this axis, no split is possible there.
    pub fn invalid(&self, axis: usize) -> bool {
        self.scale[axis] == 0.0
    }

    /// Bin index of a doubled centroid in a single axis, without range checks.
    /// Partitioning compares this against the split position, so it has to stay
    /// bit-identical with what `bin` computes.
    #[inline]
    pub fn bin_unchecked(&self, center2: &WorldPoint, axis: usize) -> i32 {
        ((center2[axis] - self.offset[axis]) * self.scale[axis]).floor() as i32
    }

    /// Bin indices of a doubled centroid in all three axes.
    /// The centroid must lie inside the centroid bounds the mapping was built from.
    #[inline]
    pub fn bin(&self, center2: &WorldPoint) -> [usize; AXES] {
        array::from_fn(|axis| {
            let i = self.bin_unchecked(center2, axis);
            debug_assert!(
                i >= 0 && (i as usize) < self.num_bins,
                "centroid {center2:?} maps outside of the bins in axis {axis}: {i}"
            );
            i as usize
        })
    }
}

//! Primitive references and the aggregate bounds carried between build steps.

pub mod block_list;
pub mod chunks;

pub use block_list::{BLOCK_CAPACITY, BlockAllocator, PrimRefBlock, PrimRefList};
pub use chunks::{ListChunks, PrimChunks, SliceChunks};

use crate::geometry::{WorldBox, WorldPoint};

/// Bounding box of a single scene primitive, plus where it came from.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PrimRef {
    pub bounds: WorldBox,
    pub geom_id: u32,
    pub prim_id: u32,
}

impl PrimRef {
    pub fn new(bounds: WorldBox, geom_id: u32, prim_id: u32) -> PrimRef {
        PrimRef {
            bounds,
            geom_id,
            prim_id,
        }
    }

    /// Doubled centroid of the bounding box.
    #[inline]
    pub fn center2(&self) -> WorldPoint {
        self.bounds.center2()
    }
}

/// Geometry bounds together with bounds of the doubled centroids.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct CentGeomBounds {
    pub geometry: WorldBox,
    pub centroid2: WorldBox,
}

impl CentGeomBounds {
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn extend(&mut self, bounds: &WorldBox, center2: &WorldPoint) {
        self.geometry.extend(bounds);
        self.centroid2.extend_point(center2);
    }

    #[inline]
    pub fn extend_prim(&mut self, prim: &PrimRef) {
        self.extend(&prim.bounds, &prim.center2());
    }

    pub fn merge(&mut self, other: &Self) {
        self.geometry.extend(&other.geometry);
        self.centroid2.extend(&other.centroid2);
    }

    pub fn is_valid(&self) -> bool {
        self.geometry.is_valid() && self.centroid2.is_valid()
    }
}

/// Aggregate information over a range of primitives.
///
/// For flat arrays `begin..end` is the index range and `count == end - begin`.
/// Block lists have no meaningful range and only track the count.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PrimInfo {
    pub bounds: CentGeomBounds,
    pub count: usize,
    pub begin: usize,
    pub end: usize,
}

impl PrimInfo {
    pub fn new(bounds: CentGeomBounds, begin: usize, end: usize) -> PrimInfo {
        assert!(begin <= end);
        PrimInfo {
            bounds,
            count: end - begin,
            begin,
            end,
        }
    }

    /// Computes the info for `prims[begin..end]`.
    pub fn from_range(prims: &[PrimRef], begin: usize, end: usize) -> PrimInfo {
        let mut bounds = CentGeomBounds::empty();
        for prim in &prims[begin..end] {
            bounds.extend_prim(prim);
        }
        PrimInfo::new(bounds, begin, end)
    }

    /// Computes the info for a whole slice.
    pub fn from_prims(prims: &[PrimRef]) -> PrimInfo {
        Self::from_range(prims, 0, prims.len())
    }

    /// Drains the chunk source and accumulates every primitive in it.
    pub fn from_chunks<'a>(chunks: &impl PrimChunks<'a>) -> PrimInfo {
        let mut info = PrimInfo::default();
        while let Some(chunk) = chunks.next_chunk() {
            for prim in chunk {
                info.add(&prim.bounds, &prim.center2());
            }
        }
        info
    }

    /// Adds a single primitive. Does not touch the index range.
    #[inline]
    pub fn add(&mut self, bounds: &WorldBox, center2: &WorldPoint) {
        self.bounds.extend(bounds, center2);
        self.count += 1;
    }

    pub fn merge(&mut self, other: &PrimInfo) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            self.begin = other.begin;
            self.end = other.end;
        } else {
            self.begin = self.begin.min(other.begin);
            self.end = self.end.max(other.end);
        }
        self.bounds.merge(&other.bounds);
        self.count += other.count;
    }

    pub fn size(&self) -> usize {
        self.count
    }
}

/// Index range with its aggregate bounds, produced by partitioning.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BuildRecord {
    pub bounds: CentGeomBounds,
    pub begin: usize,
    pub end: usize,
}

impl BuildRecord {
    pub fn new(bounds: CentGeomBounds, begin: usize, end: usize) -> BuildRecord {
        assert!(begin <= end);
        BuildRecord { bounds, begin, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.begin..self.end
    }

    pub fn prim_info(&self) -> PrimInfo {
        PrimInfo::new(self.bounds, self.begin, self.end)
    }
}

impl From<PrimInfo> for BuildRecord {
    fn from(info: PrimInfo) -> Self {
        BuildRecord::new(info.bounds, info.begin, info.end)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scene::{random_boxes, unit_box_at};

    use assert2::assert;

    #[test]
    fn prim_info_from_prims() {
        let prims = [
            unit_box_at(WorldPoint::new(0.0, 0.0, 0.0), 0),
            unit_box_at(WorldPoint::new(4.0, 2.0, -2.0), 1),
        ];
        let info = PrimInfo::from_prims(&prims);

        assert!(info.count == 2);
        assert!(info.begin == 0);
        assert!(info.end == 2);
        assert!(info.bounds.geometry.min == WorldPoint::new(-0.5, -0.5, -2.5));
        assert!(info.bounds.geometry.max == WorldPoint::new(4.5, 2.5, 0.5));
        assert!(info.bounds.centroid2.min == WorldPoint::new(0.0, 0.0, -4.0));
        assert!(info.bounds.centroid2.max == WorldPoint::new(8.0, 4.0, 0.0));
    }

    #[test]
    fn merge_matches_whole_range() {
        let prims = random_boxes(100, 1.0, 7);
        let mut left = PrimInfo::from_range(&prims, 0, 40);
        let right = PrimInfo::from_range(&prims, 40, 100);
        left.merge(&right);

        assert!(left == PrimInfo::from_prims(&prims));
    }

    #[test]
    fn merge_with_empty_keeps_range() {
        let prims = random_boxes(10, 1.0, 7);
        let info = PrimInfo::from_range(&prims, 3, 8);

        let mut merged = PrimInfo::default();
        merged.merge(&info);
        assert!(merged == info);

        let mut merged = info;
        merged.merge(&PrimInfo::default());
        assert!(merged == info);
    }

    #[test]
    fn from_chunks_matches_from_prims() {
        let prims = random_boxes(1000, 1.0, 3);
        let info = PrimInfo::from_chunks(&SliceChunks::with_chunk_len(&prims, 77));
        let expected = PrimInfo::from_prims(&prims);

        assert!(info.count == expected.count);
        assert!(info.bounds == expected.bounds);
    }

    #[test]
    fn build_record_round_trip() {
        let prims = random_boxes(20, 1.0, 1);
        let info = PrimInfo::from_range(&prims, 5, 15);
        let record = BuildRecord::from(info);
        assert!(record.len() == 10);
        assert!(record.range() == (5..15));
        assert!(record.prim_info() == info);
    }
}

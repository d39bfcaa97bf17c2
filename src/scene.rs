//! Synthetic primitive sets for the CLI, benchmarks and tests.

use rand::{Rng as _, SeedableRng, rngs::SmallRng};

use crate::{
    geometry::{FloatType, WorldBox, WorldPoint, WorldVector},
    primitives::PrimRef,
};

/// Side of the cube the random boxes are scattered in.
pub const SCENE_EXTENT: FloatType = 100.0;

/// Generates `count` cubes with edge length `size`, uniformly placed inside `[0, SCENE_EXTENT]^3`.
/// Primitive ids are consecutive from zero, geometry id is always zero.
pub fn random_boxes(count: usize, size: FloatType, seed: u64) -> Vec<PrimRef> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let max_corner = (SCENE_EXTENT - size).max(0.0);
    (0..count)
        .map(|i| {
            let min = WorldPoint::new(
                rng.random_range(0.0..=max_corner),
                rng.random_range(0.0..=max_corner),
                rng.random_range(0.0..=max_corner),
            );
            let bounds = WorldBox::new(min, min + WorldVector::repeat(size));
            PrimRef::new(bounds, 0, i as u32)
        })
        .collect()
}

/// Unit cube centered at `center`.
pub fn unit_box_at(center: WorldPoint, prim_id: u32) -> PrimRef {
    let half = WorldVector::repeat(0.5);
    PrimRef::new(WorldBox::new(center - half, center + half), 0, prim_id)
}

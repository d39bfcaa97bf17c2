mod aabb;

pub use aabb::AABB;

pub type FloatType = f32;
pub type WorldPoint = nalgebra::Point3<FloatType>;
pub type WorldVector = nalgebra::Vector3<FloatType>;
pub type WorldBox = AABB<WorldPoint>;

/// Number of spatial axes the binning works with.
pub const AXES: usize = 3;

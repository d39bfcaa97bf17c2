use std::ops::Sub;

use nalgebra::{ClosedSubAssign, Point3, Scalar};
use num_traits::Float;

/// Axis aligned box.
/// Empty box has min at +infinity and max at -infinity, so that extending it by
/// anything yields the other operand.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AABB<Point> {
    pub min: Point,
    pub max: Point,
}

impl<Point> AABB<Point> {
    pub fn new(min: Point, max: Point) -> AABB<Point> {
        AABB { min, max }
    }
}

impl<Point: Sub + Copy> AABB<Point> {
    pub fn size(&self) -> Point::Output {
        self.max - self.min
    }
}

impl<T: Scalar + Float + ClosedSubAssign> AABB<Point3<T>> {
    pub fn empty() -> Self {
        AABB {
            min: Point3::new(T::infinity(), T::infinity(), T::infinity()),
            max: Point3::new(T::neg_infinity(), T::neg_infinity(), T::neg_infinity()),
        }
    }

    pub fn from_point(point: Point3<T>) -> Self {
        AABB {
            min: point,
            max: point,
        }
    }

    /// Returns the smallest box containing all the points, or None if the iterator is empty.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<T>>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut ret = Self::from_point(*first);
        for p in points {
            ret.extend_point(p);
        }
        Some(ret)
    }

    /// True if the box contains no points (some max coordinate is below its min).
    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| self.min[axis] > self.max[axis])
    }

    /// Box is either the canonical empty box or has min <= max in all axes, no NaNs.
    pub fn is_valid(&self) -> bool {
        let no_nan = self.min.iter().chain(self.max.iter()).all(|x| !x.is_nan());
        no_nan && (*self == Self::empty() || !self.is_empty())
    }

    pub fn extend_point(&mut self, point: &Point3<T>) {
        self.min = self.min.coords.zip_map(&point.coords, Float::min).into();
        self.max = self.max.coords.zip_map(&point.coords, Float::max).into();
    }

    pub fn extend(&mut self, other: &Self) {
        self.min = self.min.coords.zip_map(&other.min.coords, Float::min).into();
        self.max = self.max.coords.zip_map(&other.max.coords, Float::max).into();
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut ret = *self;
        ret.extend(other);
        ret
    }

    /// Half of the surface area, zero for empty boxes.
    pub fn half_area(&self) -> T {
        if self.is_empty() {
            return T::zero();
        }
        let d = self.size();
        d.x * d.y + d.y * d.z + d.z * d.x
    }

    /// Sum of min and max corner, twice the center.
    pub fn center2(&self) -> Point3<T> {
        self.min.coords.zip_map(&self.max.coords, |a, b| a + b).into()
    }

    pub fn contains(&self, other: &Self) -> bool {
        (0..3).all(|axis| self.min[axis] <= other.min[axis] && other.max[axis] <= self.max[axis])
    }

    /// Index of the axis with the largest extent. Ties go to the lower axis.
    pub fn largest_axis(&self) -> usize {
        let d = self.size();
        let mut best = 0;
        for axis in 1..3 {
            if d[axis] > d[best] {
                best = axis;
            }
        }
        best
    }
}

impl<T: Scalar + Float + ClosedSubAssign> Default for AABB<Point3<T>> {
    fn default() -> Self {
        Self::empty()
    }
}

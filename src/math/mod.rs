//! Small integer grid and bounding volume helpers shared by the clipmap subsystems.

use bevy::math::{IRect, IVec2, Vec3};

/// Rounds `value` down to the nearest multiple of `granularity`.
///
/// Works for negative values as well, `snap_down(-1, 4) == -4`.
#[inline]
pub fn snap_down(value: i32, granularity: i32) -> i32 {
    value.div_euclid(granularity) * granularity
}

#[inline]
pub fn snap_down_2d(value: IVec2, granularity: i32) -> IVec2 {
    IVec2::new(
        snap_down(value.x, granularity),
        snap_down(value.y, granularity),
    )
}

/// Wraps a grid coordinate into the range `0..size`.
#[inline]
pub fn wrap(value: i32, size: u32) -> u32 {
    value.rem_euclid(size as i32) as u32
}

/// The number of cells of an integer rectangle (half open, `min` inclusive, `max` exclusive).
#[inline]
pub fn rect_area(rect: IRect) -> u64 {
    if rect.is_empty() {
        0
    } else {
        rect.width() as u64 * rect.height() as u64
    }
}

#[inline]
pub fn inverse_mix(lower: f32, upper: f32, value: f32) -> f32 {
    f32::clamp((value - lower) / (upper - lower), 0.0, 1.0)
}

#[inline]
pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// An axis aligned bounding box in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn center(&self) -> Vec3 {
        0.5 * (self.min + self.max)
    }

    pub fn half_extents(&self) -> Vec3 {
        0.5 * (self.max - self.min)
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (min, max) = (self.min, self.max);

        [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapping_rounds_towards_negative_infinity() {
        assert_eq!(snap_down(5, 2), 4);
        assert_eq!(snap_down(4, 2), 4);
        assert_eq!(snap_down(-1, 4), -4);
        assert_eq!(snap_down(-4, 4), -4);
        assert_eq!(snap_down_2d(IVec2::new(-3, 7), 4), IVec2::new(-4, 4));
    }

    #[test]
    fn wrapping_is_always_positive() {
        assert_eq!(wrap(-1, 256), 255);
        assert_eq!(wrap(256, 256), 0);
        assert_eq!(wrap(-513, 256), 255);
    }

    #[test]
    fn empty_rects_have_no_area() {
        assert_eq!(rect_area(IRect::new(0, 0, 0, 5)), 0);
        assert_eq!(rect_area(IRect::new(-2, -2, 2, 3)), 20);
    }

    #[test]
    fn smoothstep_is_clamped() {
        assert_eq!(smoothstep(-1.0), 0.0);
        assert_eq!(smoothstep(0.5), 0.5);
        assert_eq!(smoothstep(2.0), 1.0);
    }
}

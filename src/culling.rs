use crate::{clipmap::Block, math::Aabb};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// The depth range of clip space produced by the projection.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClipDepth {
    /// `0 <= z <= w`, used by wgpu and bevy (including reverse-Z projections).
    #[default]
    ZeroToOne,
    /// `-w <= z <= w`, the OpenGL convention.
    NegativeOneToOne,
}

/// A plane `normal . p + distance = 0`, with the inside on the side the normal points to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    /// Whether every corner of the box lies strictly outside of the plane.
    pub fn excludes(&self, aabb: &Aabb) -> bool {
        aabb.corners()
            .iter()
            .all(|&corner| self.signed_distance(corner) < 0.0)
    }
}

/// The view frustum as a set of inward facing, normalized planes.
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    planes: Vec<Plane>,
}

impl Frustum {
    /// Extracts the planes from the rows of a combined view projection matrix.
    ///
    /// Returns `None` if the matrix does not describe a usable frustum.
    /// Planes that vanish because the projection is unbounded in their direction
    /// (an infinite far plane for example) are left out.
    pub fn from_view_projection(view_projection: Mat4, clip_depth: ClipDepth) -> Option<Self> {
        if !view_projection.is_finite() {
            return None;
        }

        let [x, y, z, w] = [0, 1, 2, 3].map(|index| view_projection.row(index));

        let near = match clip_depth {
            ClipDepth::ZeroToOne => z,
            ClipDepth::NegativeOneToOne => w + z,
        };
        let sides = [w + x, w - x, w + y, w - y];
        let depth = [near, w - z];

        let mut planes = Vec::with_capacity(6);

        for (index, row) in sides.into_iter().chain(depth).enumerate() {
            let normal = row.truncate();
            let length = normal.length();

            if length <= f32::EPSILON * row.abs().max_element().max(1.0) {
                if index < sides.len() || row.w < 0.0 {
                    return None;
                }
                continue;
            }

            planes.push(Plane {
                normal: normal / length,
                distance: row.w / length,
            });
        }

        Some(Self { planes })
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Conservative visibility test, a box is only rejected if one plane excludes it entirely.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        !self.planes.iter().any(|plane| plane.excludes(aabb))
    }
}

/// The result of culling one frame's blocks.
#[derive(Clone, Debug, Default)]
pub struct Culled {
    pub visible: Vec<Block>,
    /// False if the frustum was degenerate and every block was kept.
    pub culling_enabled: bool,
}

/// Drops the blocks whose bounding boxes are provably outside of the view frustum.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrustumCuller {
    pub clip_depth: ClipDepth,
}

impl FrustumCuller {
    pub fn new(clip_depth: ClipDepth) -> Self {
        Self { clip_depth }
    }

    pub fn cull(&self, mut blocks: Vec<Block>, view_projection: Mat4) -> Culled {
        let Some(frustum) = Frustum::from_view_projection(view_projection, self.clip_depth) else {
            debug!("the view projection is degenerate, culling is disabled for this frame");

            return Culled {
                visible: blocks,
                culling_enabled: false,
            };
        };

        blocks.retain(|block| frustum.intersects_aabb(&block.aabb));

        Culled {
            visible: blocks,
            culling_enabled: true,
        }
    }
}

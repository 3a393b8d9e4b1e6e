//! Placement of the clipmap levels around the viewer.
//!
//! Every level is a square of `n = 4m - 1` vertices, centred on its snapped origin.
//! Level `L + 1` has twice the vertex spacing of level `L` and leaves a hole of
//! `2m` quads in its centre, into which level `L` fits with exactly one coarse quad to spare
//! along one x side and one z side. That L-shaped gap is filled by a pair of trims.
//!
//! ```text
//!  +-----+-----+-+-----+-----+
//!  |  B  |  B  |F|  B  |  B  |      B  body (m x m)
//!  +-----+-----+-+-----+-----+      F  fixup (3 x m or m x 3)
//!  |  B  |           |T|  B  |      T  trims around the finer level
//!  +-----+   finer   |T+-----+
//!  |--F--|   level   |T|--F--|
//!  +-----+           |T+-----+
//!  |  B  |TTTTTTTTTTTTT|  B  |
//!  +-----+-----+-+-----+-----+
//!  |  B  |  B  |F|  B  |  B  |
//!  +-----+-----+-+-----+-----+
//! ```

use crate::{math::Aabb, mesh::BlockType};
use bevy::math::IVec2;

mod level;
mod manager;

pub use level::ClipmapLevel;
pub use manager::ClipmapLevelManager;

/// The x and z side of a level's hole that a trim pair occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quadrant {
    LowXLowZ,
    HighXLowZ,
    LowXHighZ,
    HighXHighZ,
}

impl Quadrant {
    pub fn new(high_x: bool, high_z: bool) -> Self {
        match (high_x, high_z) {
            (false, false) => Quadrant::LowXLowZ,
            (true, false) => Quadrant::HighXLowZ,
            (false, true) => Quadrant::LowXHighZ,
            (true, true) => Quadrant::HighXHighZ,
        }
    }

    pub fn high_x(self) -> bool {
        matches!(self, Quadrant::HighXLowZ | Quadrant::HighXHighZ)
    }

    pub fn high_z(self) -> bool {
        matches!(self, Quadrant::LowXHighZ | Quadrant::HighXHighZ)
    }
}

/// A single placed piece of a clipmap level, valid for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub block_type: BlockType,
    /// The level whose vertex spacing and height texture the block uses.
    pub level: u32,
    /// The world space xz position of the block's first vertex.
    pub offset: IVec2,
    /// Set for the trims around a finer level.
    pub quadrant: Option<Quadrant>,
    pub aabb: Aabb,
}

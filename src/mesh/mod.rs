//! The static base geometry of the clipmap blocks.
//!
//! Every block type has exactly one mesh, generated once from the block size.
//! All meshes live in the local vertex grid of a level: a vertex at `(x, z)` is placed
//! at `offset + (x, z) * step` by the vertex stage, where `offset` and `step` come from
//! the per-instance data. The horizontal and vertical variants of the trims and fixups
//! are distinct meshes, so the type alone selects the geometry.

use bevy::math::UVec2;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

mod library;

pub use library::{BlockMesh, BlockMeshLibrary};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockType {
    /// An m x m grid, the bulk of every level.
    Body,
    /// A (2m + 1) x 2 strip along x, filling one side of the seam to the finer level.
    TrimHorizontal,
    /// A 2 x 2m strip along z, filling the other side of the seam to the finer level.
    TrimVertical,
    /// An m x 3 strip along x, closing the gap in the middle of the block columns.
    FixupHorizontal,
    /// A 3 x m strip along z, closing the gap in the middle of the block rows.
    FixupVertical,
    /// Zero area triangles along the outer boundary, hiding T-junctions to the coarser level.
    DegenerateSkirt,
}

impl BlockType {
    pub const ALL: [BlockType; 6] = [
        BlockType::Body,
        BlockType::TrimHorizontal,
        BlockType::TrimVertical,
        BlockType::FixupHorizontal,
        BlockType::FixupVertical,
        BlockType::DegenerateSkirt,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// The count of vertices along x and z covered by this block type.
    pub fn vertex_extent(self, block_size: u32) -> UVec2 {
        let m = block_size;

        match self {
            BlockType::Body => UVec2::new(m, m),
            BlockType::TrimHorizontal => UVec2::new(2 * m + 1, 2),
            BlockType::TrimVertical => UVec2::new(2, 2 * m),
            BlockType::FixupHorizontal => UVec2::new(m, 3),
            BlockType::FixupVertical => UVec2::new(3, m),
            BlockType::DegenerateSkirt => UVec2::splat(4 * m - 1),
        }
    }

    pub fn is_trim(self) -> bool {
        matches!(self, BlockType::TrimHorizontal | BlockType::TrimVertical)
    }

    pub fn is_fixup(self) -> bool {
        matches!(self, BlockType::FixupHorizontal | BlockType::FixupVertical)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    TriangleStrip,
    TriangleList,
}

/// A vertex of a block mesh in level local grid units.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BlockVertex {
    pub position: [f32; 2],
}

impl BlockVertex {
    fn new(x: u32, z: u32) -> Self {
        Self {
            position: [x as f32, z as f32],
        }
    }
}

/// The CPU side geometry of a block type.
#[derive(Clone, Debug)]
pub struct BlockGeometry {
    pub block_type: BlockType,
    pub topology: Topology,
    pub vertices: Vec<BlockVertex>,
    pub indices: Vec<u32>,
}

impl BlockGeometry {
    pub fn new(block_type: BlockType, block_size: u32) -> Self {
        match block_type {
            BlockType::DegenerateSkirt => Self {
                block_type,
                topology: Topology::TriangleList,
                vertices: generate_perimeter_positions(4 * block_size - 1),
                indices: generate_skirt_indices(4 * block_size - 1),
            },
            _ => {
                let extent = block_type.vertex_extent(block_size);

                Self {
                    block_type,
                    topology: Topology::TriangleStrip,
                    vertices: generate_grid_positions(extent.x, extent.y),
                    indices: generate_grid_strip_indices(extent.x, extent.y),
                }
            }
        }
    }

    /// The count of triangles with a non zero index distance, degenerate strip joints excluded.
    pub fn triangle_count(&self) -> usize {
        match self.topology {
            Topology::TriangleList => self.indices.len() / 3,
            Topology::TriangleStrip => self
                .indices
                .windows(3)
                .filter(|w| w[0] != w[1] && w[1] != w[2] && w[0] != w[2])
                .count(),
        }
    }
}

fn generate_grid_positions(width: u32, height: u32) -> Vec<BlockVertex> {
    (0..height)
        .flat_map(|z| (0..width).map(move |x| BlockVertex::new(x, z)))
        .collect()
}

/// Generates a single triangle strip for a grid of `width` x `height` vertices.
///  2  8---9---10--11
///     | \ | \ | \ |
///  1  4---5---6---7        row=1  4,8,5,9,6,10,7,11
///     | \ | \ | \ |
///  0  0---1---2---3        row=0  0,4,1,5,2,6,3,7
///
/// z/x 0   1   2   3
///
/// Rows are joined by repeating the last index of a row and the first index
/// of the next one (7,4), which yields four zero area triangles and keeps the
/// winding of the following row intact.
fn generate_grid_strip_indices(width: u32, height: u32) -> Vec<u32> {
    let mut indices = Vec::with_capacity(((height - 1) * (2 * width + 2)) as usize);

    for row in 0..height - 1 {
        if row > 0 {
            indices.push(row * width);
        }

        for x in 0..width {
            indices.push(row * width + x);
            indices.push((row + 1) * width + x);
        }

        if row < height - 2 {
            indices.push((row + 1) * width + width - 1);
        }
    }

    indices
}

/// Walks the boundary of a `size` x `size` grid counter clockwise, starting at the origin.
fn generate_perimeter_positions(size: u32) -> Vec<BlockVertex> {
    let last = size - 1;

    let bottom = (0..last).map(|x| BlockVertex::new(x, 0));
    let right = (0..last).map(|z| BlockVertex::new(last, z));
    let top = (0..last).map(|x| BlockVertex::new(last - x, last));
    let left = (0..last).map(|z| BlockVertex::new(0, last - z));

    bottom.chain(right).chain(top).chain(left).collect()
}

/// Generates the degenerate triangles along the boundary of a level.
///  0---1---2---3---4
///   \_____/ \_____/        (0,1,2) (2,3,4)
///
/// Each triangle spans two edges of the finer level, which share the line of
/// a single edge of the coarser level. The odd vertex lies on that line, so the
/// triangle has zero area as long as the odd vertex matches the coarser height,
/// and fills the crack otherwise.
fn generate_skirt_indices(size: u32) -> Vec<u32> {
    let count = 4 * (size - 1);

    (0..count)
        .step_by(2)
        .flat_map(|i| [i, (i + 1) % count, (i + 2) % count])
        .collect()
}

use crate::{clipmap::Block, mesh::BlockType};
use bytemuck::{Pod, Zeroable};
use std::mem;

pub(crate) const INSTANCE_SIZE: u64 = mem::size_of::<InstanceData>() as u64;

/// The per instance data of a block, read by the vertex stage.
///
/// A vertex `(x, z)` of the block mesh is placed at `offset + (x, z) * step(level)`
/// and its height is taken from the level's layer of the height texture.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub level: u32,
    pub offset_x: f32,
    pub offset_z: f32,
    /// How far the block is morphed towards the coarser level, in `0..=1`.
    pub blend: f32,
}

impl InstanceData {
    pub fn new(block: &Block, blend: f32) -> Self {
        Self {
            level: block.level,
            offset_x: block.offset.x as f32,
            offset_z: block.offset.y as f32,
            blend,
        }
    }
}

/// Rounds `value` up to the next multiple of `alignment`.
#[inline]
pub(crate) fn align_to(value: u64, alignment: u64) -> u64 {
    // only works for non zero alignments
    value.div_ceil(alignment) * alignment
}

/// The instances of one block type and their place inside the instance buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceGroup {
    pub block_type: BlockType,
    pub instances: Vec<InstanceData>,
    /// The byte offset of the group's first instance, aligned for storage buffer bindings.
    pub offset: u64,
}

/// Lays the groups out back to back, each starting at an aligned offset.
/// Returns the total byte size of the layout.
pub(crate) fn layout_groups(groups: &mut [InstanceGroup], alignment: u64) -> u64 {
    groups.iter_mut().fold(0, |offset, group| {
        group.offset = align_to(offset, alignment);
        group.offset + group.instances.len() as u64 * INSTANCE_SIZE
    })
}

/// Serializes the groups into a single buffer following their layout.
pub(crate) fn write_groups(groups: &[InstanceGroup], size: u64, bytes: &mut Vec<u8>) {
    bytes.clear();
    bytes.resize(size as usize, 0);

    for group in groups {
        let data: &[u8] = bytemuck::cast_slice(&group.instances);
        let start = group.offset as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(block_type: BlockType, count: usize) -> InstanceGroup {
        InstanceGroup {
            block_type,
            instances: vec![InstanceData::default(); count],
            offset: 0,
        }
    }

    #[test]
    fn instances_are_sixteen_bytes() {
        assert_eq!(INSTANCE_SIZE, 16);
    }

    #[test]
    fn groups_start_at_aligned_offsets() {
        let mut groups = vec![
            group(BlockType::Body, 17),
            group(BlockType::TrimVertical, 1),
            group(BlockType::DegenerateSkirt, 20),
        ];

        let size = layout_groups(&mut groups, 256);

        assert_eq!(
            groups.iter().map(|group| group.offset).collect::<Vec<_>>(),
            [0, 512, 768]
        );
        assert_eq!(size, 768 + 320);
    }

    #[test]
    fn written_groups_land_at_their_offsets() {
        let mut groups = vec![group(BlockType::Body, 1), group(BlockType::TrimHorizontal, 1)];
        groups[1].instances[0] = InstanceData {
            level: 3,
            offset_x: -8.0,
            offset_z: 4.0,
            blend: 0.5,
        };

        let size = layout_groups(&mut groups, 64);
        let mut bytes = Vec::new();
        write_groups(&groups, size, &mut bytes);

        assert_eq!(bytes.len(), 80);
        let instance: InstanceData = bytemuck::pod_read_unaligned(&bytes[64..80]);
        assert_eq!(instance, groups[1].instances[0]);
    }
}

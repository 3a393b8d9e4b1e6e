use crate::{
    clipmap::{Block, ClipmapLevel},
    config::ClipmapConfig,
    device::{BufferDescriptor, BufferId, BufferUsage, DrawCommand, TerrainDevice},
    math::inverse_mix,
    mesh::{BlockMeshLibrary, BlockType},
    render::{
        instance::{layout_groups, write_groups, InstanceData, InstanceGroup},
        BlendCurve,
    },
    streaming::HeightmapStreamer,
};
use bevy::prelude::*;
use std::array;

/// Everything the renderer needs to know about the current frame besides the blocks.
pub struct FrameContext<'a> {
    pub viewer: Vec3,
    pub levels: &'a [ClipmapLevel],
    pub streamer: &'a HeightmapStreamer,
}

/// What the renderer submitted in one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub draw_calls: u32,
    pub instances: u32,
    /// Blocks left out because their level has no height data yet.
    pub skipped_blocks: u32,
}

/// Groups the visible blocks by type and issues one instanced draw per type.
pub struct InstanceRenderer {
    transition_width: f32,
    blend_curve: BlendCurve,
    instance_buffer: Option<(BufferId, u64)>,
    bytes: Vec<u8>,
    groups: Vec<InstanceGroup>,
}

impl InstanceRenderer {
    pub fn new(config: &ClipmapConfig) -> Self {
        Self {
            transition_width: config.transition_width,
            blend_curve: config.blend_curve,
            instance_buffer: None,
            bytes: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// The instance groups of the last rendered frame, ordered by block type.
    pub fn groups(&self) -> &[InstanceGroup] {
        &self.groups
    }

    pub fn render(
        &mut self,
        device: &mut impl TerrainDevice,
        library: &BlockMeshLibrary,
        blocks: &[Block],
        frame: &FrameContext,
    ) -> RenderStats {
        let mut stats = RenderStats::default();
        let mut instances: [Vec<InstanceData>; BlockType::ALL.len()] = array::from_fn(|_| Vec::new());

        for block in blocks {
            if !frame.streamer.is_bound(block.level) {
                stats.skipped_blocks += 1;
                continue;
            }

            let blend = self.blend_factor(block, frame);
            instances[block.block_type.index()].push(InstanceData::new(block, blend));
        }

        self.groups = BlockType::ALL
            .into_iter()
            .zip(instances)
            .filter(|(_, instances)| !instances.is_empty())
            .map(|(block_type, instances)| InstanceGroup {
                block_type,
                instances,
                offset: 0,
            })
            .collect();

        if self.groups.is_empty() {
            return stats;
        }

        let alignment = device.limits().min_storage_buffer_offset_alignment as u64;
        let size = layout_groups(&mut self.groups, alignment);
        write_groups(&self.groups, size, &mut self.bytes);

        let Some(instance_buffer) = self.upload(device, size) else {
            return stats;
        };

        let height_texture = frame.streamer.texture();

        for group in &self.groups {
            let mesh = library.get_mesh(group.block_type);

            device.draw_instanced(&DrawCommand {
                block_type: group.block_type,
                vertex_buffer: mesh.vertex_buffer,
                index_buffer: mesh.index_buffer,
                index_count: mesh.index_count,
                instance_buffer,
                instance_offset: group.offset,
                instance_count: group.instances.len() as u32,
                height_texture,
            });

            stats.draw_calls += 1;
            stats.instances += group.instances.len() as u32;
        }

        stats
    }

    /// Writes the serialized instances, growing the instance buffer if needed.
    fn upload(&mut self, device: &mut impl TerrainDevice, size: u64) -> Option<BufferId> {
        let buffer = match self.instance_buffer {
            Some((buffer, capacity)) if capacity >= size => buffer,
            _ => {
                let capacity = size.next_power_of_two();
                let contents = vec![0; capacity as usize];

                match device.create_buffer(BufferDescriptor {
                    label: "clipmap instances",
                    usage: BufferUsage::Instance,
                    contents: &contents,
                }) {
                    Ok(buffer) => {
                        debug!("grew the clipmap instance buffer to {capacity} bytes");
                        self.instance_buffer = Some((buffer, capacity));
                        buffer
                    }
                    Err(error) => {
                        error!("Something went wrong, failed to allocate the instance buffer: {error}");
                        return None;
                    }
                }
            }
        };

        if let Err(error) = device.write_buffer(buffer, 0, &self.bytes) {
            error!("Something went wrong, failed to write the instance buffer: {error}");
            return None;
        }

        Some(buffer)
    }

    /// How far the block is morphed towards the coarser level.
    ///
    /// Zero in the inner part of the level, rising to one across the transition band
    /// at the outer edge. Skirts lie on the edge itself and are fully morphed.
    pub fn blend_factor(&self, block: &Block, frame: &FrameContext) -> f32 {
        if block.block_type == BlockType::DegenerateSkirt {
            return 1.0;
        }

        let Some(level) = frame.levels.get(block.level as usize) else {
            return 0.0;
        };

        let radius = level.half_extent();
        let width = self.transition_width * radius;
        let center = block.aabb.center();
        let distance = f32::max(
            (center.x - frame.viewer.x).abs(),
            (center.z - frame.viewer.z).abs(),
        );

        let t = if width <= f32::EPSILON {
            if distance >= radius {
                1.0
            } else {
                0.0
            }
        } else {
            inverse_mix(radius - width, radius, distance)
        };

        self.blend_curve.apply(t)
    }
}

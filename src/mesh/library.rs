use crate::{
    device::{BufferDescriptor, BufferId, BufferUsage, TerrainDevice},
    error::ClipmapResult,
    mesh::{BlockGeometry, BlockType, Topology},
};
use bevy::{
    prelude::*,
    render::{
        mesh::{Indices, PrimitiveTopology},
        render_asset::RenderAssetUsages,
    },
};

/// The device resources of a single block type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockMesh {
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub index_count: u32,
    pub topology: Topology,
}

/// Owns the immutable base geometry of all block types for the lifetime of the terrain.
pub struct BlockMeshLibrary {
    block_size: u32,
    geometry: Vec<BlockGeometry>,
    meshes: Vec<BlockMesh>,
}

impl BlockMeshLibrary {
    /// Generates the geometry of every block type and uploads it to the device.
    ///
    /// A failed allocation is fatal, the terrain can not be rendered without its geometry.
    pub fn new(device: &mut impl TerrainDevice, block_size: u32) -> ClipmapResult<Self> {
        let geometry = BlockType::ALL
            .iter()
            .map(|&block_type| BlockGeometry::new(block_type, block_size))
            .collect::<Vec<_>>();

        let meshes = geometry
            .iter()
            .map(|geometry| -> ClipmapResult<BlockMesh> {
                let label = format!("{:?}", geometry.block_type);

                let vertex_buffer = device.create_buffer(BufferDescriptor {
                    label: &format!("{label} vertices"),
                    usage: BufferUsage::Vertex,
                    contents: bytemuck::cast_slice(&geometry.vertices),
                })?;
                let index_buffer = device.create_buffer(BufferDescriptor {
                    label: &format!("{label} indices"),
                    usage: BufferUsage::Index,
                    contents: bytemuck::cast_slice(&geometry.indices),
                })?;

                Ok(BlockMesh {
                    vertex_buffer,
                    index_buffer,
                    index_count: geometry.indices.len() as u32,
                    topology: geometry.topology,
                })
            })
            .collect::<ClipmapResult<Vec<_>>>()?;

        info!(
            "initialized the clipmap block meshes with a block size of {}",
            block_size
        );

        Ok(Self {
            block_size,
            geometry,
            meshes,
        })
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn get_mesh(&self, block_type: BlockType) -> BlockMesh {
        self.meshes[block_type.index()]
    }

    pub fn geometry(&self, block_type: BlockType) -> &BlockGeometry {
        &self.geometry[block_type.index()]
    }

    /// Builds a bevy mesh of the block type, for rendering through bevy's mesh pipeline.
    pub fn to_mesh(&self, block_type: BlockType) -> Mesh {
        let geometry = self.geometry(block_type);

        let topology = match geometry.topology {
            Topology::TriangleStrip => PrimitiveTopology::TriangleStrip,
            Topology::TriangleList => PrimitiveTopology::TriangleList,
        };

        let positions = geometry
            .vertices
            .iter()
            .map(|vertex| [vertex.position[0], 0.0, vertex.position[1]])
            .collect::<Vec<_>>();
        let normals = vec![[0.0, 1.0, 0.0]; positions.len()];

        Mesh::new(topology, RenderAssetUsages::default())
            .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
            .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, normals)
            .with_inserted_indices(Indices::U32(geometry.indices.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::{DeviceLimits, HeadlessDevice},
        error::{ClipmapError, DeviceError},
    };

    #[test]
    fn uploads_one_mesh_per_block_type() {
        let mut device = HeadlessDevice::default();
        let library = BlockMeshLibrary::new(&mut device, 16).unwrap();

        for block_type in BlockType::ALL {
            let mesh = library.get_mesh(block_type);
            let geometry = library.geometry(block_type);

            assert_eq!(mesh.index_count as usize, geometry.indices.len());
            assert_eq!(
                device.buffer_data(mesh.index_buffer).unwrap(),
                bytemuck::cast_slice::<u32, u8>(&geometry.indices)
            );
            assert_eq!(
                device.buffer_usage(mesh.vertex_buffer),
                Some(BufferUsage::Vertex)
            );
        }
    }

    #[test]
    fn allocation_failures_are_fatal() {
        let mut device = HeadlessDevice::new(DeviceLimits::default()).with_memory_budget(1024);

        let result = BlockMeshLibrary::new(&mut device, 64);

        assert!(matches!(
            result,
            Err(ClipmapError::Device(DeviceError::Allocation { .. }))
        ));
    }

    #[test]
    fn bevy_mesh_matches_the_geometry() {
        let mut device = HeadlessDevice::default();
        let library = BlockMeshLibrary::new(&mut device, 8).unwrap();

        let mesh = library.to_mesh(BlockType::DegenerateSkirt);

        assert_eq!(mesh.primitive_topology(), PrimitiveTopology::TriangleList);
        assert_eq!(
            mesh.count_vertices(),
            library.geometry(BlockType::DegenerateSkirt).vertices.len()
        );
    }
}

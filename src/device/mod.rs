//! The boundary between the clipmap core and the graphics device.
//!
//! The core never talks to a graphics API directly. Instead it allocates its static
//! geometry and height textures, submits texture copies and issues instanced draws
//! through a [`TerrainDevice`]. Transfers are asynchronous: a copy returns a
//! [`TransferId`] immediately and its completion is observed by polling on a later frame.
//!
//! Two devices are provided: the [`HeadlessDevice`], which mirrors everything in CPU
//! memory, and the bevy backed [`ImageDevice`], which writes the height data into an
//! [`Image`](bevy::image::Image) asset.

use crate::{error::DeviceError, mesh::BlockType};
use bevy::math::UVec2;
use derive_more::{Display, From};

mod headless;
mod image_device;

pub use headless::HeadlessDevice;
pub use image_device::{ClipmapDeviceState, ImageDevice};

/// The texel stored in the height texture: `[height, height of the coarser level]`.
pub type HeightTexel = [f32; 2];

#[derive(Clone, Copy, Debug, Display, From, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("buffer {_0}")]
pub struct BufferId(pub u32);

#[derive(Clone, Copy, Debug, Display, From, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("texture {_0}")]
pub struct TextureId(pub u32);

#[derive(Clone, Copy, Debug, Display, From, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("transfer {_0}")]
pub struct TransferId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    Instance,
}

pub struct BufferDescriptor<'a> {
    pub label: &'a str,
    pub usage: BufferUsage,
    pub contents: &'a [u8],
}

/// Describes a two channel float texture array with one layer per clipmap level.
#[derive(Clone, Debug)]
pub struct TextureArrayDescriptor {
    pub label: String,
    pub size: u32,
    pub layers: u32,
}

/// A copy of a contiguous (non wrapping) rectangle of texels into one layer of a texture array.
pub struct TextureCopy<'a> {
    pub texture: TextureId,
    pub layer: u32,
    pub origin: UVec2,
    pub extent: UVec2,
    /// Row major texels, `extent.x * extent.y` of them.
    pub texels: &'a [HeightTexel],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    Complete,
    Failed,
}

/// One instanced draw of a block mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCommand {
    pub block_type: BlockType,
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub index_count: u32,
    pub instance_buffer: BufferId,
    /// The byte offset of the first instance inside the instance buffer.
    pub instance_offset: u64,
    pub instance_count: u32,
    pub height_texture: TextureId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceLimits {
    pub min_storage_buffer_offset_alignment: u32,
    pub max_texture_dimension_2d: u32,
    pub max_texture_array_layers: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        // the wgpu downlevel defaults
        Self {
            min_storage_buffer_offset_alignment: 256,
            max_texture_dimension_2d: 2048,
            max_texture_array_layers: 256,
        }
    }
}

pub trait TerrainDevice {
    fn limits(&self) -> DeviceLimits;

    fn create_buffer(&mut self, descriptor: BufferDescriptor<'_>) -> Result<BufferId, DeviceError>;

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8])
        -> Result<(), DeviceError>;

    fn buffer_size(&self, buffer: BufferId) -> Option<u64>;

    fn create_texture_array(
        &mut self,
        descriptor: &TextureArrayDescriptor,
    ) -> Result<TextureId, DeviceError>;

    /// Enqueues an asynchronous copy into the texture and returns without waiting for it.
    fn copy_to_texture(&mut self, copy: TextureCopy<'_>) -> Result<TransferId, DeviceError>;

    /// Polls the state of a previously issued copy.
    /// Once a terminal status has been reported, the id may be forgotten by the device.
    fn transfer_status(&mut self, transfer: TransferId) -> TransferStatus;

    fn draw_instanced(&mut self, draw: &DrawCommand);
}

/// Validates a texture copy against the texture dimensions shared by both devices.
pub(crate) fn validate_copy(
    copy: &TextureCopy<'_>,
    size: u32,
    layers: u32,
) -> Result<(), DeviceError> {
    let end = copy.origin + copy.extent;

    if copy.layer >= layers {
        return Err(DeviceError::InvalidCopy(format!(
            "layer {} of {layers}",
            copy.layer
        )));
    }
    if end.x > size || end.y > size {
        return Err(DeviceError::InvalidCopy(format!(
            "region {:?}..{:?} outside of {size}x{size}",
            copy.origin, end
        )));
    }
    if copy.texels.len() != (copy.extent.x * copy.extent.y) as usize {
        return Err(DeviceError::InvalidCopy(format!(
            "{} texels for an extent of {:?}",
            copy.texels.len(),
            copy.extent
        )));
    }

    Ok(())
}

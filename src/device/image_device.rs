use crate::device::{
    validate_copy, BufferDescriptor, BufferId, DeviceLimits, DrawCommand, HeightTexel,
    TerrainDevice, TextureArrayDescriptor, TextureCopy, TextureId, TransferId, TransferStatus,
};
use crate::error::DeviceError;
use bevy::{
    image::Image,
    prelude::*,
    render::{
        render_asset::RenderAssetUsages,
        render_resource::{Extent3d, TextureDimension, TextureFormat},
    },
    utils::HashSet,
};
use std::mem;

struct ImageTexture {
    handle: Handle<Image>,
    size: u32,
    layers: u32,
}

/// The persistent part of the [`ImageDevice`], stored next to the terrain.
///
/// Buffers are mirrored in CPU memory, textures live in [`Image`] assets
/// and the draws of the last frame are kept for a render side consumer.
#[derive(Component, Default)]
pub struct ClipmapDeviceState {
    limits: DeviceLimits,
    buffers: Vec<Vec<u8>>,
    textures: Vec<ImageTexture>,
    failed_transfers: HashSet<TransferId>,
    next_transfer: u64,
    draws: Vec<DrawCommand>,
}

impl ClipmapDeviceState {
    pub fn new(limits: DeviceLimits) -> Self {
        Self {
            limits,
            ..default()
        }
    }

    /// The image backing the texture, to be bound by a terrain material.
    pub fn image(&self, texture: TextureId) -> Option<Handle<Image>> {
        self.textures
            .get(texture.0 as usize)
            .map(|texture| texture.handle.clone())
    }

    pub fn buffer(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(buffer.0 as usize).map(Vec::as_slice)
    }

    /// Hands out the draws recorded since the last call.
    pub fn take_draws(&mut self) -> Vec<DrawCommand> {
        mem::take(&mut self.draws)
    }
}

/// A [`TerrainDevice`] backed by bevy's asset storage.
///
/// Height data is written into the image asset, from where bevy uploads it
/// to the GPU during extraction. Copies therefore complete immediately.
pub struct ImageDevice<'a> {
    pub state: &'a mut ClipmapDeviceState,
    pub images: &'a mut Assets<Image>,
}

impl<'a> ImageDevice<'a> {
    pub fn new(state: &'a mut ClipmapDeviceState, images: &'a mut Assets<Image>) -> Self {
        Self { state, images }
    }
}

impl TerrainDevice for ImageDevice<'_> {
    fn limits(&self) -> DeviceLimits {
        self.state.limits
    }

    fn create_buffer(&mut self, descriptor: BufferDescriptor<'_>) -> Result<BufferId, DeviceError> {
        self.state.buffers.push(descriptor.contents.to_vec());
        Ok(BufferId(self.state.buffers.len() as u32 - 1))
    }

    fn write_buffer(
        &mut self,
        buffer: BufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let target = self
            .state
            .buffers
            .get_mut(buffer.0 as usize)
            .ok_or(DeviceError::UnknownBuffer(buffer.0))?;

        let end = offset + data.len() as u64;
        if end > target.len() as u64 {
            return Err(DeviceError::OutOfBounds {
                offset,
                len: data.len() as u64,
                size: target.len() as u64,
            });
        }

        target[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    fn buffer_size(&self, buffer: BufferId) -> Option<u64> {
        self.state
            .buffers
            .get(buffer.0 as usize)
            .map(|buffer| buffer.len() as u64)
    }

    fn create_texture_array(
        &mut self,
        descriptor: &TextureArrayDescriptor,
    ) -> Result<TextureId, DeviceError> {
        let limits = self.state.limits;

        if descriptor.size > limits.max_texture_dimension_2d
            || descriptor.layers > limits.max_texture_array_layers
        {
            return Err(DeviceError::Allocation {
                label: descriptor.label.clone(),
                size: 0,
            });
        }

        let image = Image::new_fill(
            Extent3d {
                width: descriptor.size,
                height: descriptor.size,
                depth_or_array_layers: descriptor.layers,
            },
            TextureDimension::D2,
            &[0; mem::size_of::<HeightTexel>()],
            TextureFormat::Rg32Float,
            RenderAssetUsages::MAIN_WORLD | RenderAssetUsages::RENDER_WORLD,
        );

        info!(
            "created clipmap height texture {} ({}x{}x{})",
            descriptor.label, descriptor.size, descriptor.size, descriptor.layers
        );

        self.state.textures.push(ImageTexture {
            handle: self.images.add(image),
            size: descriptor.size,
            layers: descriptor.layers,
        });

        Ok(TextureId(self.state.textures.len() as u32 - 1))
    }

    fn copy_to_texture(&mut self, copy: TextureCopy<'_>) -> Result<TransferId, DeviceError> {
        let texture = self
            .state
            .textures
            .get(copy.texture.0 as usize)
            .ok_or(DeviceError::UnknownTexture(copy.texture.0))?;
        validate_copy(&copy, texture.size, texture.layers)?;

        let id = TransferId(self.state.next_transfer);
        self.state.next_transfer += 1;

        let Some(image) = self.images.get_mut(&texture.handle) else {
            error!("Something went wrong, the clipmap height image is not available!");
            self.state.failed_transfers.insert(id);
            return Ok(id);
        };

        let texel_size = mem::size_of::<HeightTexel>();
        let row_bytes = copy.extent.x as usize * texel_size;

        for row in 0..copy.extent.y {
            let y = copy.origin.y + row;
            let start = (((copy.layer * texture.size + y) * texture.size + copy.origin.x) as usize)
                * texel_size;
            let source = (row * copy.extent.x) as usize;
            let texels = &copy.texels[source..source + copy.extent.x as usize];

            image.data[start..start + row_bytes].copy_from_slice(bytemuck::cast_slice(texels));
        }

        Ok(id)
    }

    fn transfer_status(&mut self, transfer: TransferId) -> TransferStatus {
        if self.state.failed_transfers.remove(&transfer) {
            TransferStatus::Failed
        } else {
            TransferStatus::Complete
        }
    }

    fn draw_instanced(&mut self, draw: &DrawCommand) {
        self.state.draws.push(draw.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::UVec2;

    #[test]
    fn copies_are_written_into_the_image() {
        let mut images = Assets::<Image>::default();
        let mut state = ClipmapDeviceState::default();
        let mut device = ImageDevice::new(&mut state, &mut images);

        let texture = device
            .create_texture_array(&TextureArrayDescriptor {
                label: "heights".to_string(),
                size: 4,
                layers: 2,
            })
            .unwrap();

        let transfer = device
            .copy_to_texture(TextureCopy {
                texture,
                layer: 1,
                origin: UVec2::new(1, 2),
                extent: UVec2::new(2, 1),
                texels: &[[1.0, 2.0], [3.0, 4.0]],
            })
            .unwrap();

        assert_eq!(device.transfer_status(transfer), TransferStatus::Complete);

        let handle = state.image(texture).unwrap();
        let image = images.get(&handle).unwrap();
        let texel = |index: usize| -> HeightTexel {
            bytemuck::pod_read_unaligned(&image.data[index * 8..index * 8 + 8])
        };

        assert_eq!(texel((4 + 2) * 4 + 1), [1.0, 2.0]);
        assert_eq!(texel((4 + 2) * 4 + 2), [3.0, 4.0]);
        assert_eq!(texel(2 * 4 + 1), [0.0, 0.0]);
    }
}

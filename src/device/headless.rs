use crate::{
    device::{
        validate_copy, BufferDescriptor, BufferId, BufferUsage, DeviceLimits, DrawCommand,
        HeightTexel, TerrainDevice, TextureArrayDescriptor, TextureCopy, TextureId, TransferId,
        TransferStatus,
    },
    error::DeviceError,
};
use bevy::{math::UVec2, prelude::default, utils::HashMap};
use std::mem;

struct HeadlessBuffer {
    usage: BufferUsage,
    data: Vec<u8>,
}

struct HeadlessTexture {
    size: u32,
    layers: u32,
    texels: Vec<HeightTexel>,
}

impl HeadlessTexture {
    fn index(&self, layer: u32, x: u32, y: u32) -> usize {
        ((layer * self.size + y) * self.size + x) as usize
    }
}

struct QueuedCopy {
    texture: TextureId,
    layer: u32,
    origin: UVec2,
    extent: UVec2,
    texels: Vec<HeightTexel>,
}

enum TransferState {
    /// The copy lands once the device reaches the frame.
    InFlight { ready_frame: u64, copy: QueuedCopy },
    Complete,
    Failed,
}

/// A device that keeps all of its resources in CPU memory.
///
/// Texture copies are applied once the configured latency (in frames) has elapsed,
/// which mimics the queue of a real GPU: data written by a copy is never visible
/// before the copy completes and a failed copy leaves the texture untouched.
/// Draws are recorded and can be inspected until the next [`advance_frame`](Self::advance_frame).
pub struct HeadlessDevice {
    limits: DeviceLimits,
    buffers: Vec<HeadlessBuffer>,
    textures: Vec<HeadlessTexture>,
    transfers: HashMap<TransferId, TransferState>,
    next_transfer: u64,
    frame: u64,
    latency: u64,
    failures_to_inject: u32,
    rejections_to_inject: u32,
    memory_budget: Option<u64>,
    allocated: u64,
    draws: Vec<DrawCommand>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(DeviceLimits::default())
    }
}

impl HeadlessDevice {
    pub fn new(limits: DeviceLimits) -> Self {
        Self {
            limits,
            buffers: default(),
            textures: default(),
            transfers: default(),
            next_transfer: 0,
            frame: 0,
            latency: 0,
            failures_to_inject: 0,
            rejections_to_inject: 0,
            memory_budget: None,
            allocated: 0,
            draws: default(),
        }
    }

    /// Copies complete `latency` frames after they were issued.
    pub fn with_latency(mut self, latency: u64) -> Self {
        self.latency = latency;
        self
    }

    /// Allocations beyond this amount of bytes fail.
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    /// The next `count` copies will be reported as failed and never land.
    pub fn fail_next_transfers(&mut self, count: u32) {
        self.failures_to_inject += count;
    }

    /// The next `count` copies will be refused when they are submitted.
    pub fn reject_next_copies(&mut self, count: u32) {
        self.rejections_to_inject += count;
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Ends the current frame: forgets the recorded draws and lands every copy that is due.
    pub fn advance_frame(&mut self) {
        self.frame += 1;
        self.draws.clear();
        self.land_due_copies();
    }

    pub fn draws(&self) -> &[DrawCommand] {
        &self.draws
    }

    pub fn in_flight_transfers(&self) -> usize {
        self.transfers
            .values()
            .filter(|state| matches!(state, TransferState::InFlight { .. }))
            .count()
    }

    pub fn buffer_data(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers
            .get(buffer.0 as usize)
            .map(|buffer| buffer.data.as_slice())
    }

    pub fn buffer_usage(&self, buffer: BufferId) -> Option<BufferUsage> {
        self.buffers.get(buffer.0 as usize).map(|buffer| buffer.usage)
    }

    /// Reads a single texel of a texture layer.
    pub fn texel(&self, texture: TextureId, layer: u32, x: u32, y: u32) -> Option<HeightTexel> {
        let texture = self.textures.get(texture.0 as usize)?;

        if layer >= texture.layers || x >= texture.size || y >= texture.size {
            return None;
        }

        Some(texture.texels[texture.index(layer, x, y)])
    }

    fn allocate(&mut self, label: &str, size: u64) -> Result<(), DeviceError> {
        if let Some(budget) = self.memory_budget {
            if self.allocated + size > budget {
                return Err(DeviceError::Allocation {
                    label: label.to_string(),
                    size,
                });
            }
        }

        self.allocated += size;
        Ok(())
    }

    fn land_due_copies(&mut self) {
        let frame = self.frame;
        let mut due = self
            .transfers
            .iter()
            .filter(|(_, state)| {
                matches!(state, TransferState::InFlight { ready_frame, .. } if *ready_frame <= frame)
            })
            .map(|(&id, _)| id)
            .collect::<Vec<_>>();

        // copies land in submission order, like on a device queue
        due.sort_unstable();

        for id in due {
            if let Some(TransferState::InFlight { copy, .. }) =
                self.transfers.insert(id, TransferState::Complete)
            {
                self.apply(copy);
            }
        }
    }

    fn apply(&mut self, copy: QueuedCopy) {
        let texture = &mut self.textures[copy.texture.0 as usize];

        for row in 0..copy.extent.y {
            let start = texture.index(copy.layer, copy.origin.x, copy.origin.y + row);
            let source = (row * copy.extent.x) as usize;
            let width = copy.extent.x as usize;

            texture.texels[start..start + width]
                .copy_from_slice(&copy.texels[source..source + width]);
        }
    }
}

impl TerrainDevice for HeadlessDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&mut self, descriptor: BufferDescriptor<'_>) -> Result<BufferId, DeviceError> {
        self.allocate(descriptor.label, descriptor.contents.len() as u64)?;

        self.buffers.push(HeadlessBuffer {
            usage: descriptor.usage,
            data: descriptor.contents.to_vec(),
        });

        Ok(BufferId(self.buffers.len() as u32 - 1))
    }

    fn write_buffer(
        &mut self,
        buffer: BufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let target = self
            .buffers
            .get_mut(buffer.0 as usize)
            .ok_or(DeviceError::UnknownBuffer(buffer.0))?;

        let size = target.data.len() as u64;
        let end = offset + data.len() as u64;

        if end > size {
            return Err(DeviceError::OutOfBounds {
                offset,
                len: data.len() as u64,
                size,
            });
        }

        target.data[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    fn buffer_size(&self, buffer: BufferId) -> Option<u64> {
        self.buffers
            .get(buffer.0 as usize)
            .map(|buffer| buffer.data.len() as u64)
    }

    fn create_texture_array(
        &mut self,
        descriptor: &TextureArrayDescriptor,
    ) -> Result<TextureId, DeviceError> {
        if descriptor.size > self.limits.max_texture_dimension_2d
            || descriptor.layers > self.limits.max_texture_array_layers
        {
            return Err(DeviceError::Allocation {
                label: descriptor.label.clone(),
                size: 0,
            });
        }

        let texel_count = (descriptor.size * descriptor.size * descriptor.layers) as u64;
        self.allocate(
            &descriptor.label,
            texel_count * mem::size_of::<HeightTexel>() as u64,
        )?;

        self.textures.push(HeadlessTexture {
            size: descriptor.size,
            layers: descriptor.layers,
            texels: vec![[0.0; 2]; texel_count as usize],
        });

        Ok(TextureId(self.textures.len() as u32 - 1))
    }

    fn copy_to_texture(&mut self, copy: TextureCopy<'_>) -> Result<TransferId, DeviceError> {
        let texture = self
            .textures
            .get(copy.texture.0 as usize)
            .ok_or(DeviceError::UnknownTexture(copy.texture.0))?;
        validate_copy(&copy, texture.size, texture.layers)?;

        if self.rejections_to_inject > 0 {
            self.rejections_to_inject -= 1;
            return Err(DeviceError::CopyRejected);
        }

        let id = TransferId(self.next_transfer);
        self.next_transfer += 1;

        let queued = QueuedCopy {
            texture: copy.texture,
            layer: copy.layer,
            origin: copy.origin,
            extent: copy.extent,
            texels: copy.texels.to_vec(),
        };

        let state = if self.failures_to_inject > 0 {
            self.failures_to_inject -= 1;
            TransferState::Failed
        } else if self.latency == 0 {
            self.apply(queued);
            TransferState::Complete
        } else {
            TransferState::InFlight {
                ready_frame: self.frame + self.latency,
                copy: queued,
            }
        };

        self.transfers.insert(id, state);
        Ok(id)
    }

    fn transfer_status(&mut self, transfer: TransferId) -> TransferStatus {
        let status = match self.transfers.get(&transfer) {
            Some(TransferState::InFlight { .. }) => TransferStatus::Pending,
            Some(TransferState::Complete) | None => TransferStatus::Complete,
            Some(TransferState::Failed) => TransferStatus::Failed,
        };

        if status != TransferStatus::Pending {
            self.transfers.remove(&transfer);
        }

        status
    }

    fn draw_instanced(&mut self, draw: &DrawCommand) {
        self.draws.push(draw.clone());
    }
}

use crate::{
    config::ClipmapConfig,
    device::{TerrainDevice, TextureArrayDescriptor, TextureCopy, TextureId, TransferStatus},
    error::ClipmapResult,
    device::HeightTexel,
    streaming::{
        split_wrapped, window, Exposure, HeightField, LevelSampler, StagingRing, TileRegion,
        WindowUpdate,
    },
};
use bevy::{
    math::{IRect, IVec2},
    prelude::*,
};
use std::{collections::VecDeque, sync::Arc};

/// The streaming activity of a single frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Texels newly requested by window moves.
    pub texels_requested: u64,
    /// Texels handed to the device.
    pub texels_issued: u64,
    pub transfers_issued: u32,
    pub transfers_completed: u32,
    pub transfers_failed: u32,
    /// Regions still waiting for a staging slot.
    pub backlog: usize,
}

#[derive(Clone, Copy, Debug)]
struct PendingRegion {
    region: TileRegion,
    /// Part of the initial or a re-centering full upload.
    full: bool,
}

#[derive(Clone, Debug, Default)]
struct LayerState {
    /// The texture window currently assigned to the layer, in level grid coordinates.
    anchor: Option<IVec2>,
    /// Once set, the layer holds a complete window of valid or previous data.
    bound: bool,
    full_regions_pending: u32,
}

/// Keeps the toroidal height texture of every clipmap level in sync with its window.
///
/// Each level owns one layer of a two channel texture array. The texel at
/// `g mod size` holds the height of level grid coordinate `g` and the height of the
/// coarser level at the same place (see [`LevelSampler`]), for every `g` inside the
/// window `[anchor, anchor + size)`. Window moves enqueue the
/// newly exposed regions, which are staged and copied to the device over the following
/// frames at a rate bounded by the available staging slots.
pub struct HeightmapStreamer {
    sampler: LevelSampler,
    texture: TextureId,
    texture_size: u32,
    layers: Vec<LayerState>,
    pending: VecDeque<PendingRegion>,
    staging: StagingRing,
    stats: StreamStats,
}

impl HeightmapStreamer {
    /// Allocates the height texture array. Failing to do so is fatal.
    pub fn new(
        device: &mut impl TerrainDevice,
        config: &ClipmapConfig,
        source: Arc<HeightField>,
    ) -> ClipmapResult<Self> {
        let texture = device.create_texture_array(&TextureArrayDescriptor {
            label: "clipmap heights".to_string(),
            size: config.texture_size,
            layers: config.level_count,
        })?;

        info!(
            "streaming {} clipmap levels into a {}x{} height texture",
            config.level_count, config.texture_size, config.texture_size
        );

        Ok(Self {
            sampler: LevelSampler::new(config, source),
            texture,
            texture_size: config.texture_size,
            layers: vec![LayerState::default(); config.level_count as usize],
            pending: VecDeque::new(),
            staging: StagingRing::new(config.staging_slots),
            stats: StreamStats::default(),
        })
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn texture_size(&self) -> u32 {
        self.texture_size
    }

    pub fn source(&self) -> &HeightField {
        self.sampler.source()
    }

    /// The texel the level's layer holds at a grid coordinate inside its window.
    pub fn texel(&self, level: u32, grid: IVec2) -> HeightTexel {
        self.sampler.texel(level, grid)
    }

    /// Moves the texture window of a level to `anchor` and requests the exposed texels.
    ///
    /// The first window of a level, and any move of a whole texture size or more,
    /// re-uploads the entire layer. Returns the count of requested texels.
    pub fn move_window(&mut self, level: u32, anchor: IVec2) -> u64 {
        let previous = self.layers[level as usize].anchor;

        self.apply_update(&WindowUpdate::between(
            level,
            previous,
            anchor,
            self.texture_size,
        ))
    }

    /// Requests the texels exposed by a window move computed elsewhere.
    pub fn apply_update(&mut self, update: &WindowUpdate) -> u64 {
        let level = update.level;

        if update.exposure == Exposure::Full {
            return self.request_full(level, update.anchor);
        }

        self.layers[level as usize].anchor = Some(update.anchor);

        match &update.exposure {
            Exposure::Partial(strips) => strips
                .iter()
                .map(|&strip| self.request_region(level, strip))
                .sum(),
            _ => 0,
        }
    }

    /// Requests the whole window of a level, dropping the level's queued regions.
    pub fn request_full(&mut self, level: u32, anchor: IVec2) -> u64 {
        self.pending.retain(|pending| pending.region.level != level);

        let regions = split_wrapped(level, window(anchor, self.texture_size), self.texture_size);
        let layer = &mut self.layers[level as usize];
        layer.anchor = Some(anchor);
        layer.full_regions_pending = regions.len() as u32;

        debug!("requested a full upload of clipmap level {level} at {anchor}");

        regions
            .into_iter()
            .map(|region| {
                self.stats.texels_requested += region.texel_count();
                self.pending.push_back(PendingRegion { region, full: true });
                region.texel_count()
            })
            .sum()
    }

    /// Requests a rectangle of level grid coordinates, split at the wrap boundaries.
    pub fn request_region(&mut self, level: u32, rect: IRect) -> u64 {
        split_wrapped(level, rect, self.texture_size)
            .into_iter()
            .map(|region| {
                self.request_update(region);
                region.texel_count()
            })
            .sum()
    }

    /// Enqueues a single contiguous region behind all earlier requests.
    pub fn request_update(&mut self, region: TileRegion) {
        self.stats.texels_requested += region.texel_count();
        self.pending.push_back(PendingRegion {
            region,
            full: false,
        });
    }

    /// Retires finished transfers and issues queued regions while staging slots are free.
    ///
    /// Failed transfers are logged and re-queued ahead of everything else. Never blocks
    /// on the device, a level whose data is late keeps rendering its previous texels.
    pub fn pump(&mut self, device: &mut impl TerrainDevice) -> StreamStats {
        self.retire(device);
        self.issue(device);

        self.stats.backlog = self.pending.len();
        std::mem::take(&mut self.stats)
    }

    fn retire(&mut self, device: &mut impl TerrainDevice) {
        let mut failed = Vec::new();
        let stats = &mut self.stats;

        self.staging
            .retire(|transfer| match device.transfer_status(transfer.transfer) {
                TransferStatus::Pending => true,
                TransferStatus::Complete => {
                    stats.transfers_completed += 1;
                    false
                }
                TransferStatus::Failed => {
                    warn!(
                        "{} of clipmap level {} failed, retrying",
                        transfer.transfer, transfer.region.level
                    );
                    stats.transfers_failed += 1;
                    failed.push(transfer.region);
                    false
                }
            });

        for region in failed.into_iter().rev() {
            self.pending.push_front(PendingRegion {
                region,
                full: false,
            });
        }
    }

    fn issue(&mut self, device: &mut impl TerrainDevice) {
        while self.staging.has_free_slot() {
            let Some(pending) = self.pending.pop_front() else {
                break;
            };

            // the window may have moved on since the region was requested
            let Some(region) = self.layers[pending.region.level as usize]
                .anchor
                .and_then(|anchor| clip_region(pending.region, anchor, self.texture_size))
            else {
                self.count_issued(pending);
                continue;
            };

            let Some(buffer) = self.staging.next_buffer() else {
                self.pending.push_front(pending);
                break;
            };

            let sampler = &self.sampler;
            buffer.extend((0..region.extent.y as i32).flat_map(|z| {
                (0..region.extent.x as i32)
                    .map(move |x| sampler.texel(region.level, region.source + IVec2::new(x, z)))
            }));

            let result = device.copy_to_texture(TextureCopy {
                texture: self.texture,
                layer: region.level,
                origin: region.origin,
                extent: region.extent,
                texels: buffer,
            });

            match result {
                Ok(transfer) => {
                    self.staging.submit(transfer, region);
                    self.count_issued(pending);
                    self.stats.transfers_issued += 1;
                    self.stats.texels_issued += region.texel_count();
                }
                Err(error) => {
                    error!(
                        "Something went wrong, the device rejected a copy into clipmap level {}, retrying next frame: {error}",
                        region.level
                    );
                    self.pending.push_front(pending);
                    break;
                }
            }
        }
    }

    /// Binds the level once the last region of its full upload is out of the queue.
    fn count_issued(&mut self, pending: PendingRegion) {
        let layer = &mut self.layers[pending.region.level as usize];

        if pending.full {
            layer.full_regions_pending = layer.full_regions_pending.saturating_sub(1);
            if layer.full_regions_pending == 0 {
                layer.bound = true;
            }
        }
    }

    /// Whether the level's initial upload has been issued, so it may be rendered.
    pub fn is_bound(&self, level: u32) -> bool {
        self.layers
            .get(level as usize)
            .is_some_and(|layer| layer.bound)
    }

    /// Whether every requested texel of the level has landed in the texture.
    pub fn sample_ready(&self, level: u32) -> bool {
        self.is_bound(level)
            && !self
                .pending
                .iter()
                .any(|pending| pending.region.level == level)
            && !self
                .staging
                .in_flight()
                .any(|transfer| transfer.region.level == level)
    }

    /// The count of regions waiting for a staging slot.
    pub fn backlog(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight(&self) -> usize {
        self.staging.in_flight_count()
    }
}

/// Restricts a region to the current window of its level.
fn clip_region(region: TileRegion, anchor: IVec2, size: u32) -> Option<TileRegion> {
    let rect = IRect::from_corners(region.source, region.source + region.extent.as_ivec2());
    let clipped = rect.intersect(window(anchor, size));

    if clipped.is_empty() {
        return None;
    }

    Some(TileRegion {
        level: region.level,
        origin: region.origin + (clipped.min - region.source).as_uvec2(),
        extent: clipped.size().as_uvec2(),
        source: clipped.min,
    })
}

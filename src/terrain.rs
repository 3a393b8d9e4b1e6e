use crate::{
    clipmap::ClipmapLevelManager,
    config::ClipmapConfig,
    culling::FrustumCuller,
    device::TerrainDevice,
    error::ClipmapResult,
    mesh::BlockMeshLibrary,
    render::{FrameContext, InstanceRenderer},
    streaming::{HeightField, HeightmapStreamer},
};
use bevy::prelude::*;
use std::sync::Arc;

/// A summary of the work done for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub candidate_blocks: u32,
    pub visible_blocks: u32,
    pub draw_calls: u32,
    pub texels_requested: u64,
    pub transfers_issued: u32,
    pub transfers_failed: u32,
    /// Regions still waiting to be streamed.
    pub backlog: u32,
    pub culling_enabled: bool,
}

/// A clipmap terrain: the static block meshes, the streamed height textures and the
/// placement state of the levels, driven once per frame by [`ClipmapTerrain::update`].
#[derive(Component)]
pub struct ClipmapTerrain {
    config: ClipmapConfig,
    library: BlockMeshLibrary,
    streamer: HeightmapStreamer,
    manager: ClipmapLevelManager,
    culler: FrustumCuller,
    renderer: InstanceRenderer,
}

impl ClipmapTerrain {
    /// Validates the configuration and allocates all device resources.
    pub fn new(
        device: &mut impl TerrainDevice,
        config: ClipmapConfig,
        source: Arc<HeightField>,
    ) -> ClipmapResult<Self> {
        config.validate()?;

        let (min_height, max_height) = source.height_range();
        let (low, high) = (min_height * config.height_scale, max_height * config.height_scale);
        let height_range = (low.min(high), low.max(high));

        let library = BlockMeshLibrary::new(device, config.block_size)?;
        let streamer = HeightmapStreamer::new(device, &config, source)?;
        let manager = ClipmapLevelManager::new(&config, height_range);

        info!(
            "initialized a clipmap terrain with {} levels of {}x{} vertices",
            config.level_count,
            config.level_vertices(),
            config.level_vertices()
        );

        Ok(Self {
            culler: FrustumCuller::new(config.clip_depth),
            renderer: InstanceRenderer::new(&config),
            config,
            library,
            streamer,
            manager,
        })
    }

    pub fn config(&self) -> &ClipmapConfig {
        &self.config
    }

    pub fn library(&self) -> &BlockMeshLibrary {
        &self.library
    }

    pub fn streamer(&self) -> &HeightmapStreamer {
        &self.streamer
    }

    pub fn manager(&self) -> &ClipmapLevelManager {
        &self.manager
    }

    pub fn renderer(&self) -> &InstanceRenderer {
        &self.renderer
    }

    /// Runs one frame: places the levels, streams the exposed height data,
    /// culls the blocks against the view frustum and draws the visible ones.
    ///
    /// Never blocks on outstanding transfers and never fails, problems are logged
    /// and the frame renders with whatever data is available.
    pub fn update(
        &mut self,
        device: &mut impl TerrainDevice,
        viewer: Vec3,
        view_projection: Mat4,
    ) -> FrameStats {
        let blocks = self.manager.update(viewer);

        for update in self.manager.take_window_updates() {
            self.streamer.apply_update(&update);
        }
        let stream = self.streamer.pump(device);

        let candidate_blocks = blocks.len() as u32;
        let culled = self.culler.cull(blocks, view_projection);

        let frame = FrameContext {
            viewer,
            levels: self.manager.levels(),
            streamer: &self.streamer,
        };
        let render = self
            .renderer
            .render(device, &self.library, &culled.visible, &frame);

        let stats = FrameStats {
            candidate_blocks,
            visible_blocks: culled.visible.len() as u32,
            draw_calls: render.draw_calls,
            texels_requested: stream.texels_requested,
            transfers_issued: stream.transfers_issued,
            transfers_failed: stream.transfers_failed,
            backlog: stream.backlog as u32,
            culling_enabled: culled.culling_enabled,
        };

        debug!("clipmap frame: {stats:?}");

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::HeadlessDevice,
        error::{ClipmapError, DeviceError},
        math::wrap,
        mesh::BlockType,
    };
    use std::f32::consts::FRAC_PI_3;

    fn source() -> Arc<HeightField> {
        Arc::new(
            HeightField::from_fn(UVec2::new(300, 200), |x, z| {
                ((x as f32 * 0.05).sin() + (z as f32 * 0.03).cos()) * 20.0
            })
            .unwrap(),
        )
    }

    fn view_projection(eye: Vec3, target: Vec3) -> Mat4 {
        Mat4::perspective_rh(FRAC_PI_3, 16.0 / 9.0, 0.1, 20_000.0)
            * Mat4::look_at_rh(eye, target, Vec3::Y)
    }

    #[test]
    fn reference_terrain_draws_with_at_most_six_calls() {
        let mut device = HeadlessDevice::default();
        let mut terrain =
            ClipmapTerrain::new(&mut device, ClipmapConfig::default(), source()).unwrap();

        let eye = Vec3::new(10.0, 60.0, -4.0);
        let matrix = view_projection(eye, Vec3::new(300.0, 0.0, 300.0));

        let mut stats = FrameStats::default();
        for _ in 0..10 {
            device.advance_frame();
            stats = terrain.update(&mut device, eye, matrix);
        }

        assert!((0..10).all(|level| terrain.streamer().sample_ready(level)));
        assert_eq!(stats.candidate_blocks, 195);
        assert!(stats.culling_enabled);
        assert!(stats.visible_blocks > 0 && stats.visible_blocks < stats.candidate_blocks);
        assert!(stats.draw_calls <= 6);
        assert_eq!(device.draws().len() as u32, stats.draw_calls);
    }

    #[test]
    fn degenerate_projections_draw_everything() {
        let mut device = HeadlessDevice::default();
        let mut terrain =
            ClipmapTerrain::new(&mut device, ClipmapConfig::new(4, 8), source()).unwrap();

        terrain.update(&mut device, Vec3::ZERO, Mat4::ZERO);
        device.advance_frame();
        let stats = terrain.update(&mut device, Vec3::ZERO, Mat4::ZERO);

        assert!(!stats.culling_enabled);
        assert_eq!(stats.visible_blocks, stats.candidate_blocks);
        assert_eq!(stats.draw_calls, 6);
    }

    #[test]
    fn walking_keeps_the_textures_in_sync() {
        let mut device = HeadlessDevice::default().with_latency(2);
        let config = ClipmapConfig::new(3, 8).with_staging_slots(8);
        let mut terrain = ClipmapTerrain::new(&mut device, config, source()).unwrap();

        let mut viewer = Vec3::new(-5.0, 10.0, 7.0);
        for frame in 0..200 {
            if frame < 60 {
                viewer += Vec3::new(1.7, 0.0, -0.9);
            }

            let matrix = view_projection(viewer, viewer + Vec3::new(1.0, -0.5, 0.0));
            terrain.update(&mut device, viewer, matrix);
            device.advance_frame();
        }

        let size = terrain.config().texture_size;
        for level in terrain.manager().levels() {
            assert!(terrain.streamer().sample_ready(level.index));

            let anchor = level.grid_min();

            for z in anchor.y..anchor.y + size as i32 {
                for x in anchor.x..anchor.x + size as i32 {
                    let texel = device.texel(
                        terrain.streamer().texture(),
                        level.index,
                        wrap(x, size),
                        wrap(z, size),
                    );
                    let expected = terrain.streamer().texel(level.index, IVec2::new(x, z));

                    assert_eq!(texel, Some(expected));
                }
            }
        }
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let mut device = HeadlessDevice::default();
        let config = ClipmapConfig::new(4, 8).with_texture_size(16);

        let result = ClipmapTerrain::new(&mut device, config, source());

        assert!(matches!(result, Err(ClipmapError::InvalidConfig(_))));
    }

    #[test]
    fn missing_texture_memory_is_fatal() {
        let mut device = HeadlessDevice::default();
        let config = ClipmapConfig::default().with_texture_size(4096);
        let result = ClipmapTerrain::new(&mut device, config, source());

        assert!(matches!(
            result,
            Err(ClipmapError::Device(DeviceError::Allocation { .. }))
        ));
    }

    #[test]
    fn many_blocks_collapse_into_six_draws() {
        let mut device = HeadlessDevice::default();
        let mut terrain =
            ClipmapTerrain::new(&mut device, ClipmapConfig::new(24, 8), source()).unwrap();

        let mut stats = FrameStats::default();
        for _ in 0..30 {
            device.advance_frame();
            stats = terrain.update(&mut device, Vec3::ZERO, Mat4::ZERO);
        }

        assert!(stats.visible_blocks > 400);
        assert_eq!(stats.draw_calls, 6);

        let types = device.draws().iter().map(|draw| draw.block_type).collect::<Vec<_>>();
        assert_eq!(types, BlockType::ALL);
    }
}

use crate::{
    config::ClipmapConfig,
    device::{ClipmapDeviceState, DeviceLimits, DrawCommand, ImageDevice},
    streaming::HeightField,
    terrain::{ClipmapTerrain, FrameStats},
};
use bevy::{image::Image, prelude::*};
use std::sync::Arc;

/// Marks the camera the clipmap terrains follow.
#[derive(Component, Default, Clone, Copy, Debug)]
pub struct ClipmapViewer;

/// Requests a clipmap terrain on the entity, which is built once by the plugin.
#[derive(Component, Clone)]
pub struct ClipmapTerrainDescriptor {
    pub config: ClipmapConfig,
    pub source: Arc<HeightField>,
    pub limits: DeviceLimits,
}

impl ClipmapTerrainDescriptor {
    pub fn new(config: ClipmapConfig, source: Arc<HeightField>) -> Self {
        Self {
            config,
            source,
            limits: DeviceLimits::default(),
        }
    }
}

/// The output of the last frame of a terrain, for a render side consumer.
#[derive(Component, Default, Clone, Debug)]
pub struct ClipmapDrawList {
    pub draws: Vec<DrawCommand>,
    /// The image holding the height texture array.
    pub height_image: Option<Handle<Image>>,
    pub stats: FrameStats,
}

/// The plugin for the clipmap terrain.
///
/// Builds a [`ClipmapTerrain`] for every entity with a [`ClipmapTerrainDescriptor`]
/// and updates it each frame from the camera marked with [`ClipmapViewer`].
pub struct ClipmapTerrainPlugin;

impl Plugin for ClipmapTerrainPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Assets<Image>>().add_systems(
            Last,
            (
                initialize_clipmap_terrain,
                update_clipmap_terrain.after(initialize_clipmap_terrain),
            ),
        );
    }
}

pub fn initialize_clipmap_terrain(
    mut commands: Commands,
    mut images: ResMut<Assets<Image>>,
    descriptors: Query<(Entity, &ClipmapTerrainDescriptor), Without<ClipmapTerrain>>,
) {
    for (entity, descriptor) in &descriptors {
        let mut state = ClipmapDeviceState::new(descriptor.limits);
        let mut device = ImageDevice::new(&mut state, &mut images);

        match ClipmapTerrain::new(
            &mut device,
            descriptor.config.clone(),
            descriptor.source.clone(),
        ) {
            Ok(terrain) => {
                let draw_list = ClipmapDrawList {
                    height_image: state.image(terrain.streamer().texture()),
                    ..default()
                };

                commands.entity(entity).insert((terrain, state, draw_list));
            }
            Err(error) => {
                error!("Something went wrong, failed to create the clipmap terrain: {error}");
                commands
                    .entity(entity)
                    .remove::<ClipmapTerrainDescriptor>();
            }
        }
    }
}

pub fn update_clipmap_terrain(
    mut images: ResMut<Assets<Image>>,
    viewers: Query<(&Camera, &GlobalTransform), With<ClipmapViewer>>,
    mut terrains: Query<(
        &mut ClipmapTerrain,
        &mut ClipmapDeviceState,
        &mut ClipmapDrawList,
    )>,
) {
    let Ok((camera, transform)) = viewers.get_single() else {
        return;
    };

    let view_projection = camera.clip_from_view() * transform.compute_matrix().inverse();
    let viewer = transform.translation();

    for (mut terrain, mut state, mut draw_list) in &mut terrains {
        let mut device = ImageDevice::new(&mut state, &mut images);
        draw_list.stats = terrain.update(&mut device, viewer, view_projection);
        draw_list.draws = state.take_draws();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mesh::BlockType, render::InstanceData};

    fn app() -> App {
        let mut app = App::new();
        app.add_plugins(ClipmapTerrainPlugin);
        app
    }

    fn descriptor() -> ClipmapTerrainDescriptor {
        let source = HeightField::from_fn(UVec2::splat(64), |x, z| (x + z) as f32).unwrap();
        ClipmapTerrainDescriptor::new(ClipmapConfig::new(3, 8), Arc::new(source))
    }

    #[test]
    fn terrains_follow_the_viewer() {
        let mut app = app();

        app.world_mut().spawn((
            Camera::default(),
            GlobalTransform::from_translation(Vec3::new(5.0, 20.0, -3.0)),
            ClipmapViewer,
        ));
        let terrain = app.world_mut().spawn(descriptor()).id();

        for _ in 0..3 {
            app.update();
        }

        let world = app.world();
        let draw_list = world.get::<ClipmapDrawList>(terrain).unwrap();
        let state = world.get::<ClipmapDeviceState>(terrain).unwrap();

        assert!(!draw_list.draws.is_empty());
        assert!(draw_list.draws.len() <= BlockType::ALL.len());
        assert_eq!(draw_list.stats.draw_calls as usize, draw_list.draws.len());

        let handle = draw_list.height_image.clone().unwrap();
        assert!(world.resource::<Assets<Image>>().get(&handle).is_some());

        let first = &draw_list.draws[0];
        let bytes = state.buffer(first.instance_buffer).unwrap();
        let instance: InstanceData =
            bytemuck::pod_read_unaligned(&bytes[first.instance_offset as usize..][..16]);
        assert_eq!(instance.level, 0);
    }

    #[test]
    fn invalid_descriptors_are_dropped() {
        let mut app = app();

        let mut descriptor = descriptor();
        descriptor.config.block_size = 2;
        let terrain = app.world_mut().spawn(descriptor).id();

        app.update();

        let entity = app.world().entity(terrain);
        assert!(!entity.contains::<ClipmapTerrainDescriptor>());
        assert!(!entity.contains::<ClipmapTerrain>());
    }

    #[test]
    fn nothing_is_drawn_without_a_viewer() {
        let mut app = app();
        let terrain = app.world_mut().spawn(descriptor()).id();

        app.update();

        let draw_list = app.world().get::<ClipmapDrawList>(terrain).unwrap();
        assert!(draw_list.draws.is_empty());
    }
}

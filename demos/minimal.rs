use bevy::{app::AppExit, log::LogPlugin, prelude::*};
use bevy_clipmap_terrain::prelude::*;
use std::{f32::consts::FRAC_PI_3, sync::Arc};

const SOURCE_SIZE: u32 = 1024;
const HEIGHT: f32 = 120.0;
const LEVEL_COUNT: u32 = 8;
const BLOCK_SIZE: u32 = 32;
const SPEED: f32 = 6.0;
const FRAME_COUNT: u32 = 600;

#[derive(Resource)]
struct Flight {
    device: HeadlessDevice,
    terrain: ClipmapTerrain,
    viewer: Vec3,
    frame: u32,
}

fn main() {
    App::new()
        .add_plugins((MinimalPlugins, LogPlugin::default()))
        .add_systems(Startup, setup)
        .add_systems(Update, fly)
        .run();
}

fn setup(mut commands: Commands) {
    // A few octaves of sine waves stand in for a real height map.
    let source = HeightField::from_fn(UVec2::splat(SOURCE_SIZE), |x, z| {
        let (x, z) = (x as f32, z as f32);
        (x * 0.011).sin() * (z * 0.013).cos()
            + 0.5 * (x * 0.037 + z * 0.029).sin()
            + 0.25 * (x * 0.091).cos() * (z * 0.087).sin()
    })
    .expect("the source height field is not empty");

    let config = ClipmapConfig::new(LEVEL_COUNT, BLOCK_SIZE).with_height_scale(HEIGHT);

    let mut device = HeadlessDevice::default().with_latency(1);
    let terrain = ClipmapTerrain::new(&mut device, config, Arc::new(source))
        .expect("failed to create the clipmap terrain");

    commands.insert_resource(Flight {
        device,
        terrain,
        viewer: Vec3::new(0.0, HEIGHT * 1.5, 0.0),
        frame: 0,
    });
}

fn fly(mut flight: ResMut<Flight>, mut exit: EventWriter<AppExit>) {
    let Flight {
        device,
        terrain,
        viewer,
        frame,
    } = &mut *flight;

    let direction = Vec3::new(1.0, 0.0, 0.4).normalize();
    *viewer += direction * SPEED;

    let view_projection = Mat4::perspective_rh(FRAC_PI_3, 16.0 / 9.0, 0.1, 50_000.0)
        * Mat4::look_at_rh(*viewer, *viewer + direction - Vec3::Y * 0.3, Vec3::Y);

    device.advance_frame();
    let stats = terrain.update(device, *viewer, view_projection);

    if *frame % 60 == 0 {
        info!(
            "frame {frame}: {} of {} blocks visible in {} draws, {} texels requested, backlog {}",
            stats.visible_blocks,
            stats.candidate_blocks,
            stats.draw_calls,
            stats.texels_requested,
            stats.backlog
        );
    }

    *frame += 1;
    if *frame == FRAME_COUNT {
        exit.send(AppExit::Success);
    }
}

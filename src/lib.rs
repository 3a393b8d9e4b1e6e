//! This crate renders height field terrains of effectively infinite size with
//! geometry clipmaps.
//!
//! # Background
//! A geometry clipmap caches the terrain as a set of nested, regular grids centered
//! around the viewer. Every level has the same count of vertices, but twice the
//! vertex spacing of the previous one, so the triangle density falls off with the
//! distance to the viewer while the cost per level stays constant.
//!
//! ## How is the geometry built?
//! Each level is assembled from a handful of static block meshes, which are shared by
//! all levels and instanced with a per level offset and scale.
//! The levels are snapped to a grid of twice their vertex spacing, so that their
//! vertices never swim and the seams between neighbouring levels line up.
//! The gaps this snapping leaves between two levels are filled with L shaped trims.
//! See the [`clipmap`] and [`mesh`] modules for more information.
//!
//! ## How is the height data managed?
//! Each level samples its heights from one layer of a texture array, which is
//! addressed toroidally. When the viewer moves, only the newly exposed strips of
//! each level have to be streamed in, and the copies are issued asynchronously
//! without ever stalling the frame.
//! See the [`streaming`] module for more information.
//!
//! ## How is it drawn?
//! The blocks are culled against the view frustum and the surviving ones are grouped
//! by their block type, resulting in at most one instanced draw per type.
//! See the [`culling`] and [`render`] modules for more information.
//!
//! All graphics work goes through the [`TerrainDevice`](device::TerrainDevice) trait.
//! The [`ClipmapTerrainPlugin`](plugin::ClipmapTerrainPlugin) wires everything into a
//! bevy app, writing the height data into an image asset and handing the draws of
//! every frame to a render side consumer.

pub mod clipmap;
pub mod config;
pub mod culling;
pub mod device;
pub mod error;
pub mod math;
pub mod mesh;
pub mod plugin;
pub mod render;
pub mod streaming;
pub mod terrain;

#[allow(missing_docs)]
pub mod prelude {
    #[doc(hidden)]
    pub use crate::{
        clipmap::{Block, ClipmapLevel, ClipmapLevelManager},
        config::ClipmapConfig,
        culling::{ClipDepth, FrustumCuller},
        device::{ClipmapDeviceState, DeviceLimits, DrawCommand, HeadlessDevice, TerrainDevice},
        error::{ClipmapError, ClipmapResult},
        mesh::{BlockMeshLibrary, BlockType},
        plugin::{
            ClipmapDrawList, ClipmapTerrainDescriptor, ClipmapTerrainPlugin, ClipmapViewer,
        },
        render::{BlendCurve, InstanceData, InstanceRenderer},
        streaming::{HeightField, HeightmapStreamer},
        terrain::{ClipmapTerrain, FrameStats},
    };
}
